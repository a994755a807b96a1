//! Push and pull commands.

use anyhow::Result;
use clap::Args;
use pocketdock_core::resume_container;
use std::path::PathBuf;

/// Arguments for the push command.
#[derive(Args)]
pub struct PushArgs {
    /// Container name
    pub container: String,
    /// Source path on the host
    pub src: String,
    /// Destination path inside the container
    pub dest: String,
}

/// Arguments for the pull command.
#[derive(Args)]
pub struct PullArgs {
    /// Container name
    pub container: String,
    /// Source path inside the container
    pub src: String,
    /// Destination path on the host
    pub dest: String,
}

/// Executes the push command.
pub async fn execute_push(args: PushArgs, socket: Option<PathBuf>) -> Result<()> {
    let container = resume_container(&args.container, socket.as_deref()).await?;
    container.push(&args.src, &args.dest).await?;
    println!("Pushed {} -> {}:{}", args.src, args.container, args.dest);
    Ok(())
}

/// Executes the pull command.
pub async fn execute_pull(args: PullArgs, socket: Option<PathBuf>) -> Result<()> {
    let container = resume_container(&args.container, socket.as_deref()).await?;
    container.pull(&args.src, &args.dest).await?;
    println!("Pulled {}:{} -> {}", args.container, args.src, args.dest);
    Ok(())
}
