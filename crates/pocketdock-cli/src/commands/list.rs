//! List and info commands.

use crate::output;
use anyhow::Result;
use clap::Args;
use pocketdock_core::{list_containers, resume_container};
use std::path::PathBuf;

/// Arguments for the list command.
#[derive(Args)]
pub struct ListArgs {
    /// Filter by project name
    #[arg(long)]
    pub project: Option<String>,

    /// Output as JSON
    #[arg(long)]
    pub json: bool,
}

/// Arguments for the info command.
#[derive(Args)]
pub struct InfoArgs {
    /// Container name
    pub container: String,

    /// Output as JSON
    #[arg(long)]
    pub json: bool,
}

/// Executes the list command.
pub async fn execute_list(args: ListArgs, socket: Option<PathBuf>) -> Result<()> {
    let items = list_containers(socket.as_deref(), args.project.as_deref()).await?;
    if args.json {
        return output::print_json(&items);
    }
    output::print_container_list(&items);
    Ok(())
}

/// Executes the info command.
pub async fn execute_info(args: InfoArgs, socket: Option<PathBuf>) -> Result<()> {
    let container = resume_container(&args.container, socket.as_deref()).await?;
    let info = container.info().await?;
    if args.json {
        return output::print_json(&info);
    }
    output::print_container_info(&info);
    Ok(())
}
