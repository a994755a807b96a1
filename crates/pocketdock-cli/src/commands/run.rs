//! Run command: blocking, streaming, and detached modes.

use anyhow::Result;
use clap::Args;
use pocketdock_core::units::parse_size;
use pocketdock_core::{resume_container, RunOptions, StreamKind};
use std::io::Write;
use std::path::PathBuf;
use std::time::Duration;

/// Arguments for the run command.
#[derive(Args)]
pub struct RunArgs {
    /// Container name
    pub container: String,

    /// Command to execute (passed to sh -c)
    pub command: String,

    /// Stream output as it arrives
    #[arg(long, conflicts_with = "detach")]
    pub stream: bool,

    /// Run in the background and print the exec id
    #[arg(long)]
    pub detach: bool,

    /// Language shorthand (e.g. python)
    #[arg(long)]
    pub lang: Option<String>,

    /// Timeout in seconds
    #[arg(long)]
    pub timeout: Option<u64>,

    /// Output cap for blocking runs (size string, default 10m)
    #[arg(long)]
    pub max_output: Option<String>,
}

/// Executes the run command.
pub async fn execute(args: RunArgs, socket: Option<PathBuf>) -> Result<()> {
    let container = resume_container(&args.container, socket.as_deref()).await?;

    let mut options = RunOptions {
        timeout: args.timeout.map(Duration::from_secs),
        lang: args.lang.clone(),
        ..Default::default()
    };
    if let Some(cap) = &args.max_output {
        options.max_output = usize::try_from(parse_size(cap)?)?;
    }

    if args.stream {
        let mut stream = container.run_stream(&args.command, options).await?;
        while let Some(chunk) = stream.next_chunk().await? {
            match chunk.kind {
                StreamKind::Stdout => {
                    print!("{}", chunk.data);
                    std::io::stdout().flush().ok();
                }
                StreamKind::Stderr => {
                    eprint!("{}", chunk.data);
                    std::io::stderr().flush().ok();
                }
            }
        }
        if let Some(result) = stream.result() {
            if result.exit_code != 0 {
                std::process::exit(1);
            }
        }
        return Ok(());
    }

    if args.detach {
        let process = container.run_detached(&args.command, options).await?;
        println!("{}", process.id());
        return Ok(());
    }

    let result = container.run(&args.command, options).await?;
    print!("{}", result.stdout);
    eprint!("{}", result.stderr);
    if result.timed_out {
        eprintln!("command timed out");
    }
    if !result.ok() {
        std::process::exit(1);
    }
    Ok(())
}
