//! Interactive shell command over a persistent session.

use anyhow::Result;
use clap::Args;
use pocketdock_core::resume_container;
use std::io::Write;
use std::path::PathBuf;
use std::time::Duration;
use tokio::io::{AsyncBufReadExt, BufReader};

const COMMAND_TIMEOUT: Duration = Duration::from_secs(300);

/// Arguments for the shell command.
#[derive(Args)]
pub struct ShellArgs {
    /// Container name
    pub container: String,
}

/// Executes the shell command: a line-oriented REPL over one shared
/// shell process, so `cd` and variables persist between commands.
pub async fn execute(args: ShellArgs, socket: Option<PathBuf>) -> Result<()> {
    let container = resume_container(&args.container, socket.as_deref()).await?;
    let session = container.session().await?;

    println!("Connected to {} (exit or Ctrl-D to leave)", args.container);
    let mut lines = BufReader::new(tokio::io::stdin()).lines();

    loop {
        print!("{}> ", args.container);
        std::io::stdout().flush().ok();

        let Some(line) = lines.next_line().await? else {
            break;
        };
        let command = line.trim();
        if command.is_empty() {
            continue;
        }
        if command == "exit" {
            break;
        }

        match session.send_and_wait(command, Some(COMMAND_TIMEOUT)).await {
            Ok(result) => {
                print!("{}", result.stdout);
                eprint!("{}", result.stderr);
                if result.timed_out {
                    eprintln!("(command timed out)");
                }
            }
            Err(e) => {
                eprintln!("error: {e}");
                break;
            }
        }
    }

    session.close().await?;
    Ok(())
}
