//! CLI surface: one subcommand per container operation.

use clap::{Parser, Subcommand};
use std::path::PathBuf;

pub mod create;
pub mod doctor;
pub mod files;
pub mod images;
pub mod init;
pub mod lifecycle;
pub mod list;
pub mod logs;
pub mod run;
pub mod shell;

/// pocketdock - container sandboxes over Podman/Docker sockets.
#[derive(Parser)]
#[command(name = "pocketdock", version, about)]
pub struct Cli {
    /// Engine socket path (overrides auto-detection)
    #[arg(long, global = true)]
    pub socket: Option<PathBuf>,

    /// Enable debug logging
    #[arg(long, global = true)]
    pub debug: bool,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Create and start a new container
    Create(create::CreateArgs),
    /// Run a command in a container
    Run(run::RunArgs),
    /// Copy a host file or directory into a container
    Push(files::PushArgs),
    /// Copy a container file or directory to the host
    Pull(files::PullArgs),
    /// Show detailed container information
    Info(list::InfoArgs),
    /// List managed containers
    List(list::ListArgs),
    /// Restart a container
    Reboot(lifecycle::RebootArgs),
    /// Stop a container without removing it
    Stop(lifecycle::StopArgs),
    /// Resume a stopped container
    Resume(lifecycle::ResumeArgs),
    /// Stop a container and, unless persistent, remove it
    Shutdown(lifecycle::ShutdownArgs),
    /// Commit a container's filesystem as a new image
    Snapshot(lifecycle::SnapshotArgs),
    /// Remove a container completely
    Destroy(lifecycle::DestroyArgs),
    /// Remove all stopped managed containers
    Prune(lifecycle::PruneArgs),
    /// Open an interactive shell session
    Shell(shell::ShellArgs),
    /// View command history from instance logs
    Logs(logs::LogsArgs),
    /// Diagnose project health
    Doctor(doctor::DoctorArgs),
    /// Build a profile image
    Build(images::BuildArgs),
    /// Export an image to a tar file
    Export(images::ExportArgs),
    /// Import images from a tar file
    Import(images::ImportArgs),
    /// Initialize a pocketdock project
    Init(init::InitArgs),
    /// List built-in image profiles
    Profiles(images::ProfilesArgs),
}
