//! Container lifecycle commands: reboot, stop, resume, shutdown,
//! snapshot, destroy, prune.

use anyhow::Result;
use clap::Args;
use pocketdock_core::{destroy_container, prune, resume_container, stop_container};
use std::path::PathBuf;

/// Arguments for the reboot command.
#[derive(Args)]
pub struct RebootArgs {
    /// Container name
    pub container: String,

    /// Recreate the container instead of restarting in place
    #[arg(long)]
    pub fresh: bool,
}

/// Arguments for the stop command.
#[derive(Args)]
pub struct StopArgs {
    /// Container name
    pub container: String,
}

/// Arguments for the resume command.
#[derive(Args)]
pub struct ResumeArgs {
    /// Container name
    pub container: String,
}

/// Arguments for the shutdown command.
#[derive(Args)]
pub struct ShutdownArgs {
    /// Container name
    pub container: String,
}

/// Arguments for the snapshot command.
#[derive(Args)]
pub struct SnapshotArgs {
    /// Container name
    pub container: String,
    /// Image name, optionally with tag (default tag: latest)
    pub image: String,
}

/// Arguments for the destroy command.
#[derive(Args)]
pub struct DestroyArgs {
    /// Container name
    pub container: String,
}

/// Arguments for the prune command.
#[derive(Args)]
pub struct PruneArgs {
    /// Only prune containers belonging to this project
    #[arg(long)]
    pub project: Option<String>,
}

/// Executes the reboot command.
pub async fn execute_reboot(args: RebootArgs, socket: Option<PathBuf>) -> Result<()> {
    let container = resume_container(&args.container, socket.as_deref()).await?;
    container.reboot(args.fresh).await?;
    println!("Rebooted {}", args.container);
    Ok(())
}

/// Executes the stop command.
pub async fn execute_stop(args: StopArgs, socket: Option<PathBuf>) -> Result<()> {
    stop_container(&args.container, socket.as_deref()).await?;
    println!("Stopped {}", args.container);
    Ok(())
}

/// Executes the resume command.
pub async fn execute_resume(args: ResumeArgs, socket: Option<PathBuf>) -> Result<()> {
    let container = resume_container(&args.container, socket.as_deref()).await?;
    println!(
        "{}  {}",
        container.name(),
        crate::output::short_id(&container.id())
    );
    Ok(())
}

/// Executes the shutdown command.
pub async fn execute_shutdown(args: ShutdownArgs, socket: Option<PathBuf>) -> Result<()> {
    let container = resume_container(&args.container, socket.as_deref()).await?;
    container.shutdown().await?;
    println!("Shut down {}", args.container);
    Ok(())
}

/// Executes the snapshot command.
pub async fn execute_snapshot(args: SnapshotArgs, socket: Option<PathBuf>) -> Result<()> {
    let container = resume_container(&args.container, socket.as_deref()).await?;
    let image_id = container.snapshot(&args.image).await?;
    println!("{}", crate::output::short_id(&image_id));
    Ok(())
}

/// Executes the destroy command.
pub async fn execute_destroy(args: DestroyArgs, socket: Option<PathBuf>) -> Result<()> {
    destroy_container(&args.container, socket.as_deref()).await?;
    println!("Destroyed {}", args.container);
    Ok(())
}

/// Executes the prune command.
pub async fn execute_prune(args: PruneArgs, socket: Option<PathBuf>) -> Result<()> {
    let removed = prune(socket.as_deref(), args.project.as_deref()).await?;
    println!("Removed {removed} container(s)");
    Ok(())
}
