//! Tar archive marshalling for the container archive endpoints.
//!
//! Uploads are POSIX ustar, files and directories only; ownership is
//! reset to root and modes normalized so extraction inside the container
//! never depends on host uids. Downloads preserve symlinks.

use bytes::Bytes;
use pocketdock_error::{Error, Result};
use std::fs::File;
use std::io::{Cursor, Read};
use std::path::Path;

const FILE_MODE: u32 = 0o644;
const DIR_MODE: u32 = 0o755;

/// Packs a single in-memory file into a tar archive.
///
/// The entry is named `name` (a basename); the destination directory is
/// chosen by the caller via the archive endpoint's `path` parameter.
///
/// # Errors
///
/// Returns an error if archive construction fails.
pub fn pack_file(name: &str, content: &[u8]) -> Result<Bytes> {
    let mut builder = tar::Builder::new(Vec::new());
    let mut header = tar::Header::new_ustar();
    header.set_size(content.len() as u64);
    header.set_mode(FILE_MODE);
    header.set_uid(0);
    header.set_gid(0);
    header.set_entry_type(tar::EntryType::Regular);
    builder
        .append_data(&mut header, name, content)
        .map_err(Error::Io)?;
    let data = builder.into_inner().map_err(Error::Io)?;
    Ok(Bytes::from(data))
}

/// Packs a host file or directory tree into a tar archive rooted at
/// `arcname`.
///
/// Symlinks are rejected: pushing one into a container would dangle or
/// escape, and the engine API offers no way to express the intent safely.
///
/// # Errors
///
/// Returns `InvalidInput` for missing sources and symlinks, `Io` for
/// filesystem failures.
pub fn pack_path(src: &Path, arcname: &str) -> Result<Bytes> {
    let meta = std::fs::symlink_metadata(src)
        .map_err(|_| Error::invalid_input(format!("source path does not exist: {}", src.display())))?;

    let mut builder = tar::Builder::new(Vec::new());
    if meta.is_symlink() {
        return Err(Error::invalid_input(format!(
            "symlinks are not supported: {}",
            src.display()
        )));
    }
    if meta.is_dir() {
        append_dir_entry(&mut builder, arcname)?;
        append_tree(&mut builder, src, arcname)?;
    } else {
        append_file_entry(&mut builder, src, arcname)?;
    }
    let data = builder.into_inner().map_err(Error::Io)?;
    Ok(Bytes::from(data))
}

fn append_tree(builder: &mut tar::Builder<Vec<u8>>, dir: &Path, arcname: &str) -> Result<()> {
    let mut entries: Vec<_> = std::fs::read_dir(dir)
        .map_err(Error::Io)?
        .collect::<std::io::Result<_>>()
        .map_err(Error::Io)?;
    entries.sort_by_key(std::fs::DirEntry::file_name);

    for entry in entries {
        let path = entry.path();
        let child_arcname = format!("{arcname}/{}", entry.file_name().to_string_lossy());
        let meta = std::fs::symlink_metadata(&path).map_err(Error::Io)?;
        if meta.is_symlink() {
            return Err(Error::invalid_input(format!(
                "symlinks are not supported: {}",
                path.display()
            )));
        }
        if meta.is_dir() {
            append_dir_entry(builder, &child_arcname)?;
            append_tree(builder, &path, &child_arcname)?;
        } else {
            append_file_entry(builder, &path, &child_arcname)?;
        }
    }
    Ok(())
}

fn append_dir_entry(builder: &mut tar::Builder<Vec<u8>>, arcname: &str) -> Result<()> {
    let mut header = tar::Header::new_ustar();
    header.set_size(0);
    header.set_mode(DIR_MODE);
    header.set_uid(0);
    header.set_gid(0);
    header.set_entry_type(tar::EntryType::Directory);
    builder
        .append_data(&mut header, format!("{arcname}/"), std::io::empty())
        .map_err(Error::Io)
}

fn append_file_entry(builder: &mut tar::Builder<Vec<u8>>, path: &Path, arcname: &str) -> Result<()> {
    let mut file = File::open(path).map_err(Error::Io)?;
    let len = file.metadata().map_err(Error::Io)?.len();
    let mut header = tar::Header::new_ustar();
    header.set_size(len);
    header.set_mode(FILE_MODE);
    header.set_uid(0);
    header.set_gid(0);
    header.set_entry_type(tar::EntryType::Regular);
    builder
        .append_data(&mut header, arcname, &mut file)
        .map_err(Error::Io)
}

/// Extracts the first regular file from a tar archive.
///
/// # Errors
///
/// Returns `SocketCommunication` when the archive is malformed or
/// contains no regular file (the engine promised one).
pub fn unpack_first_file(tar_data: &[u8]) -> Result<Vec<u8>> {
    let mut archive = tar::Archive::new(Cursor::new(tar_data));
    for entry in archive
        .entries()
        .map_err(|e| Error::communication(format!("malformed archive: {e}")))?
    {
        let mut entry = entry.map_err(|e| Error::communication(format!("malformed archive: {e}")))?;
        if entry.header().entry_type().is_file() {
            let mut content = Vec::with_capacity(entry.size() as usize);
            entry
                .read_to_end(&mut content)
                .map_err(|e| Error::communication(format!("malformed archive: {e}")))?;
            return Ok(content);
        }
    }
    Err(Error::communication("archive contains no regular file"))
}

/// Unpacks an engine archive to the host.
///
/// A single-file archive lands at `dest` itself; anything else is
/// extracted under `dest` as a directory. Entries attempting path
/// traversal are rejected by the extraction layer; symlinks inside the
/// archive are preserved.
///
/// # Errors
///
/// Returns `SocketCommunication` for malformed archives, `Io` for
/// filesystem failures.
pub fn unpack_to(tar_data: &[u8], dest: &Path) -> Result<()> {
    // Count regular entries first to decide the single-file case.
    let mut probe = tar::Archive::new(Cursor::new(tar_data));
    let mut files = 0usize;
    let mut others = 0usize;
    for entry in probe
        .entries()
        .map_err(|e| Error::communication(format!("malformed archive: {e}")))?
    {
        let entry = entry.map_err(|e| Error::communication(format!("malformed archive: {e}")))?;
        if entry.header().entry_type().is_file() {
            files += 1;
        } else {
            others += 1;
        }
    }

    if files == 1 && others == 0 {
        let content = unpack_first_file(tar_data)?;
        if let Some(parent) = dest.parent() {
            std::fs::create_dir_all(parent).map_err(Error::Io)?;
        }
        std::fs::write(dest, content).map_err(Error::Io)?;
        return Ok(());
    }

    std::fs::create_dir_all(dest).map_err(Error::Io)?;
    let mut archive = tar::Archive::new(Cursor::new(tar_data));
    archive.set_preserve_permissions(true);
    for entry in archive
        .entries()
        .map_err(|e| Error::communication(format!("malformed archive: {e}")))?
    {
        let mut entry = entry.map_err(|e| Error::communication(format!("malformed archive: {e}")))?;
        // unpack_in refuses absolute paths and `..` traversal.
        entry
            .unpack_in(dest)
            .map_err(|e| Error::communication(format!("archive entry rejected: {e}")))?;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_pack_file_roundtrip() {
        let data = pack_file("hello.txt", b"hi there\n").unwrap();
        let content = unpack_first_file(&data).unwrap();
        assert_eq!(content, b"hi there\n");
    }

    #[test]
    fn test_pack_file_binary_content() {
        let payload: Vec<u8> = (0..=255).cycle().take(64 * 1024).collect();
        let data = pack_file("blob.bin", &payload).unwrap();
        assert_eq!(unpack_first_file(&data).unwrap(), payload);
    }

    #[test]
    fn test_pack_file_entry_is_basename() {
        let data = pack_file("name.txt", b"x").unwrap();
        let mut archive = tar::Archive::new(Cursor::new(&data[..]));
        let entry = archive.entries().unwrap().next().unwrap().unwrap();
        assert_eq!(entry.path().unwrap().to_string_lossy(), "name.txt");
    }

    #[test]
    fn test_pack_path_tree_roundtrip() {
        let src = TempDir::new().unwrap();
        std::fs::create_dir(src.path().join("sub")).unwrap();
        std::fs::write(src.path().join("a.txt"), b"alpha").unwrap();
        std::fs::write(src.path().join("sub/b.txt"), b"beta").unwrap();

        let data = pack_path(src.path(), "tree").unwrap();

        let dest = TempDir::new().unwrap();
        unpack_to(&data, dest.path()).unwrap();
        assert_eq!(
            std::fs::read(dest.path().join("tree/a.txt")).unwrap(),
            b"alpha"
        );
        assert_eq!(
            std::fs::read(dest.path().join("tree/sub/b.txt")).unwrap(),
            b"beta"
        );
    }

    #[test]
    fn test_pack_path_resets_ownership() {
        let src = TempDir::new().unwrap();
        std::fs::write(src.path().join("f"), b"x").unwrap();
        let data = pack_path(src.path(), "d").unwrap();

        let mut archive = tar::Archive::new(Cursor::new(&data[..]));
        for entry in archive.entries().unwrap() {
            let entry = entry.unwrap();
            assert_eq!(entry.header().uid().unwrap(), 0);
            assert_eq!(entry.header().gid().unwrap(), 0);
        }
    }

    #[test]
    fn test_pack_path_rejects_symlink() {
        let src = TempDir::new().unwrap();
        std::fs::write(src.path().join("real"), b"x").unwrap();
        std::os::unix::fs::symlink(src.path().join("real"), src.path().join("link")).unwrap();
        let err = pack_path(src.path(), "d").unwrap_err();
        assert!(err.to_string().contains("symlink"));
    }

    #[test]
    fn test_pack_missing_source() {
        let err = pack_path(Path::new("/nonexistent/path"), "d").unwrap_err();
        assert!(err.to_string().contains("does not exist"));
    }

    #[test]
    fn test_unpack_single_file_to_exact_dest() {
        let data = pack_file("only.txt", b"content").unwrap();
        let dest = TempDir::new().unwrap();
        let target = dest.path().join("deep/only.txt");
        unpack_to(&data, &target).unwrap();
        assert_eq!(std::fs::read(&target).unwrap(), b"content");
    }

    #[test]
    fn test_unpack_first_file_empty_archive() {
        let builder = tar::Builder::new(Vec::new());
        let data = builder.into_inner().unwrap();
        assert!(unpack_first_file(&data).is_err());
    }
}
