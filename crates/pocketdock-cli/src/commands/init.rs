//! Init command.

use anyhow::Result;
use clap::Args;
use pocketdock_core::projects;
use std::path::PathBuf;

/// Arguments for the init command.
#[derive(Args)]
pub struct InitArgs {
    /// Project directory (default: current directory)
    pub path: Option<PathBuf>,

    /// Project name (default: directory name)
    #[arg(long)]
    pub name: Option<String>,
}

/// Executes the init command.
pub fn execute(args: InitArgs) -> Result<()> {
    let root = projects::init_project(args.path.as_deref(), args.name.as_deref())?;
    println!("Project initialized at {}", root.display());
    Ok(())
}
