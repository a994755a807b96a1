//! pocketdock CLI - container sandboxes over Podman/Docker sockets.

use anyhow::Result;
use clap::Parser;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

mod commands;
mod output;

use commands::{Cli, Commands};

/// Exit code for "engine not reachable".
const EXIT_ENGINE_UNREACHABLE: i32 = 3;

#[tokio::main]
async fn main() {
    let cli = Cli::parse();

    let filter = if cli.debug {
        "pocketdock=debug"
    } else {
        "pocketdock=warn"
    };
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| filter.into()),
        )
        .with(tracing_subscriber::fmt::layer().with_target(false))
        .init();

    if let Err(err) = dispatch(cli).await {
        eprintln!("error: {err:#}");
        let code = err
            .downcast_ref::<pocketdock_error::Error>()
            .map_or(1, |e| {
                if e.is_engine_unreachable() {
                    EXIT_ENGINE_UNREACHABLE
                } else {
                    1
                }
            });
        std::process::exit(code);
    }
}

async fn dispatch(cli: Cli) -> Result<()> {
    let socket = cli.socket.clone();
    match cli.command {
        Commands::Create(args) => commands::create::execute(args, socket).await,
        Commands::Run(args) => commands::run::execute(args, socket).await,
        Commands::Push(args) => commands::files::execute_push(args, socket).await,
        Commands::Pull(args) => commands::files::execute_pull(args, socket).await,
        Commands::Info(args) => commands::list::execute_info(args, socket).await,
        Commands::List(args) => commands::list::execute_list(args, socket).await,
        Commands::Reboot(args) => commands::lifecycle::execute_reboot(args, socket).await,
        Commands::Stop(args) => commands::lifecycle::execute_stop(args, socket).await,
        Commands::Resume(args) => commands::lifecycle::execute_resume(args, socket).await,
        Commands::Shutdown(args) => commands::lifecycle::execute_shutdown(args, socket).await,
        Commands::Snapshot(args) => commands::lifecycle::execute_snapshot(args, socket).await,
        Commands::Destroy(args) => commands::lifecycle::execute_destroy(args, socket).await,
        Commands::Prune(args) => commands::lifecycle::execute_prune(args, socket).await,
        Commands::Shell(args) => commands::shell::execute(args, socket).await,
        Commands::Logs(args) => commands::logs::execute(args).await,
        Commands::Doctor(args) => commands::doctor::execute(args, socket).await,
        Commands::Build(args) => commands::images::execute_build(args, socket).await,
        Commands::Export(args) => commands::images::execute_export(args, socket).await,
        Commands::Import(args) => commands::images::execute_import(args, socket).await,
        Commands::Init(args) => commands::init::execute(args),
        Commands::Profiles(args) => commands::images::execute_profiles(args),
    }
}
