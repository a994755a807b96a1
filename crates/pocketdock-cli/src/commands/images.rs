//! Image commands: build, export, import, profiles.

use crate::output;
use anyhow::Result;
use bytes::Bytes;
use clap::Args;
use pocketdock_core::profiles;
use pocketdock_engine::{archive, EngineClient};
use pocketdock_transport::detect_socket;
use serde_json::json;
use std::path::PathBuf;

/// Arguments for the build command.
#[derive(Args)]
pub struct BuildArgs {
    /// Profile to build (all profiles if omitted)
    pub profile: Option<String>,
}

/// Arguments for the export command.
#[derive(Args)]
pub struct ExportArgs {
    /// Image name or id
    pub image: String,
    /// Output tar file
    pub output: PathBuf,
}

/// Arguments for the import command.
#[derive(Args)]
pub struct ImportArgs {
    /// Input tar file produced by export
    pub input: PathBuf,
}

/// Arguments for the profiles command.
#[derive(Args)]
pub struct ProfilesArgs {
    /// Output as JSON
    #[arg(long)]
    pub json: bool,
}

async fn engine(socket: Option<PathBuf>) -> Result<EngineClient> {
    let socket = match socket {
        Some(path) => path,
        None => detect_socket().await?,
    };
    Ok(EngineClient::new(socket))
}

/// Executes the build command: builds profile images from their bundled
/// Dockerfiles.
pub async fn execute_build(args: BuildArgs, socket: Option<PathBuf>) -> Result<()> {
    let engine = engine(socket).await?;
    let to_build: Vec<&profiles::ProfileInfo> = match &args.profile {
        Some(name) => vec![profiles::resolve_profile(name)?],
        None => profiles::list_profiles().iter().collect(),
    };
    for profile in to_build {
        println!("Building {} ({})...", profile.name, profile.image_tag);
        let context = archive::pack_file("Dockerfile", profile.dockerfile.as_bytes())?;
        engine.build_image(context, profile.image_tag).await?;
        println!("Built {}", profile.image_tag);
    }
    Ok(())
}

/// Executes the export command.
pub async fn execute_export(args: ExportArgs, socket: Option<PathBuf>) -> Result<()> {
    let engine = engine(socket).await?;
    let tar = engine.save_image(&args.image).await?;
    if let Some(parent) = args.output.parent().filter(|p| !p.as_os_str().is_empty()) {
        std::fs::create_dir_all(parent)?;
    }
    std::fs::write(&args.output, &tar)?;
    println!("Exported {} to {}", args.image, args.output.display());
    Ok(())
}

/// Executes the import command.
pub async fn execute_import(args: ImportArgs, socket: Option<PathBuf>) -> Result<()> {
    let engine = engine(socket).await?;
    let tar = std::fs::read(&args.input)?;
    engine.load_image(Bytes::from(tar)).await?;
    println!("Imported images from {}", args.input.display());
    Ok(())
}

/// Executes the profiles command.
pub fn execute_profiles(args: ProfilesArgs) -> Result<()> {
    let profiles = profiles::list_profiles();
    if args.json {
        let items: Vec<_> = profiles
            .iter()
            .map(|p| {
                json!({
                    "name": p.name,
                    "image_tag": p.image_tag,
                    "network_default": p.network_default,
                    "description": p.description,
                    "size_estimate": p.size_estimate,
                })
            })
            .collect();
        return output::print_json(&items);
    }
    println!(
        "{:<14} {:<26} {:<8} {}",
        "NAME", "IMAGE", "SIZE", "DESCRIPTION"
    );
    for profile in profiles {
        println!(
            "{:<14} {:<26} {:<8} {}",
            profile.name, profile.image_tag, profile.size_estimate, profile.description
        );
    }
    Ok(())
}
