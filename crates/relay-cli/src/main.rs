//! Relay CLI entry point.
//!
//! Binary name: `relay`
//!
//! Parses CLI arguments, wires up the workflow engine against `base_dir`,
//! then dispatches to the appropriate command handler.

mod cli;
mod state;

use clap::Parser;
use console::style;

use cli::{Cli, Commands};
use state::AppState;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let filter = match cli.verbose {
        0 => "warn",
        1 => "info,relay=debug",
        _ => "trace",
    };
    relay_observe::tracing_setup::init_tracing(Some(filter))
        .map_err(|e| anyhow::anyhow!("failed to initialize tracing: {e}"))?;

    let base_dir = cli.base_dir.clone().unwrap_or_else(|| std::env::current_dir().expect("current dir"));
    let state = AppState::init(&base_dir)?;

    match cli.command {
        Commands::Create { file } => cli::workflow::handle_create(&state, &file, cli.json).await?,
        Commands::Trigger { name, overrides } => {
            cli::workflow::handle_trigger(&state, &name, &overrides, cli.json).await?
        }
        Commands::List => cli::workflow::handle_list(&state, cli.json).await?,
        Commands::Status { name, limit, offset } => {
            cli::workflow::handle_status(&state, &name, limit, offset, cli.json).await?
        }
        Commands::Logs { name, run_id } => {
            cli::workflow::handle_logs(&state, &name, run_id.as_deref(), cli.json).await?
        }
        Commands::Cancel { name } => cli::workflow::handle_cancel(&state, &name, cli.json).await?,
        Commands::Backups { name } => cli::workflow::handle_backups(&state, &name, cli.json).await?,
        Commands::Schedule { action } => cli::schedule::handle_schedule_command(action, &state, cli.json).await?,
        Commands::Serve => {
            let registered = state
                .scheduler
                .start()
                .await
                .map_err(|e| anyhow::anyhow!("failed to start scheduler: {e}"))?;

            println!();
            println!(
                "  {} Scheduler running ({registered} scheduled workflow(s) registered)",
                style("*").green().bold()
            );
            println!("  {}", style("Press Ctrl+C to stop").dim());
            println!();

            shutdown_signal().await;

            state
                .scheduler
                .stop()
                .await
                .map_err(|e| anyhow::anyhow!("failed to stop scheduler: {e}"))?;
            println!("\n  Scheduler stopped.");
        }
    }

    Ok(())
}

/// Wait for Ctrl+C or SIGTERM for graceful shutdown.
async fn shutdown_signal() {
    let ctrl_c = async {
        tokio::signal::ctrl_c()
            .await
            .expect("failed to install Ctrl+C handler");
    };

    #[cfg(unix)]
    let terminate = async {
        tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate())
            .expect("failed to install SIGTERM handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }
}
