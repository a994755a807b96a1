//! Doctor command.

use crate::output;
use anyhow::Result;
use clap::Args;
use pocketdock_core::projects;
use std::path::PathBuf;

/// Arguments for the doctor command.
#[derive(Args)]
pub struct DoctorArgs {
    /// Output as JSON
    #[arg(long)]
    pub json: bool,
}

/// Executes the doctor command.
pub async fn execute(args: DoctorArgs, socket: Option<PathBuf>) -> Result<()> {
    let report = projects::doctor(None, socket.as_deref()).await?;
    if args.json {
        return output::print_json(&report);
    }
    output::print_doctor_report(&report);
    Ok(())
}
