//! Size-string parsing and byte formatting.

use pocketdock_error::{Error, Result};

const KIB: u64 = 1024;

/// Parses a size string like `256m`, `1g`, or `10MB` into bytes.
///
/// Suffixes `b`, `k`, `m`, `g`, `t` are case-insensitive; an optional
/// trailing `b` after the unit (`MB`, `KiB`-style without the `i`) is
/// accepted. Plain integers are bytes.
///
/// # Errors
///
/// Returns `InvalidInput` for anything else.
pub fn parse_size(s: &str) -> Result<u64> {
    let s = s.trim();
    let digits_end = s.find(|c: char| !c.is_ascii_digit()).unwrap_or(s.len());
    let (digits, suffix) = s.split_at(digits_end);
    if digits.is_empty() {
        return Err(Error::invalid_input(format!("invalid size: {s:?}")));
    }
    let value: u64 = digits
        .parse()
        .map_err(|_| Error::invalid_input(format!("invalid size: {s:?}")))?;

    let suffix = suffix.trim().to_ascii_lowercase();
    let multiplier = match suffix.as_str() {
        "" | "b" => 1,
        "k" | "kb" => KIB,
        "m" | "mb" => KIB.pow(2),
        "g" | "gb" => KIB.pow(3),
        "t" | "tb" => KIB.pow(4),
        _ => return Err(Error::invalid_input(format!("invalid size: {s:?}"))),
    };
    Ok(value * multiplier)
}

/// Formats a byte count as a human-readable string (e.g. `42.1 MB`).
#[must_use]
pub fn format_bytes(n: u64) -> String {
    let mut value = n as f64;
    for unit in ["B", "KB", "MB", "GB"] {
        if value < KIB as f64 {
            if unit == "B" {
                return format!("{n} B");
            }
            return format!("{value:.1} {unit}");
        }
        value /= KIB as f64;
    }
    format!("{value:.1} TB")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_size_suffixes() {
        assert_eq!(parse_size("512").unwrap(), 512);
        assert_eq!(parse_size("64m").unwrap(), 64 * 1024 * 1024);
        assert_eq!(parse_size("1g").unwrap(), 1024 * 1024 * 1024);
        assert_eq!(parse_size("10MB").unwrap(), 10 * 1024 * 1024);
        assert_eq!(parse_size("2K").unwrap(), 2048);
    }

    #[test]
    fn test_parse_size_rejects_garbage() {
        assert!(parse_size("").is_err());
        assert!(parse_size("abc").is_err());
        assert!(parse_size("10x").is_err());
        assert!(parse_size("m10").is_err());
    }

    #[test]
    fn test_format_bytes() {
        assert_eq!(format_bytes(0), "0 B");
        assert_eq!(format_bytes(512), "512 B");
        assert_eq!(format_bytes(2048), "2.0 KB");
        assert_eq!(format_bytes(64 * 1024 * 1024), "64.0 MB");
    }
}
