//! `schedule preview`: show upcoming fire times for a cron expression
//! without registering anything.

use anyhow::Result;
use clap::Subcommand;
use console::style;

use crate::state::AppState;

#[derive(Subcommand)]
pub enum ScheduleCommand {
    /// Preview the next N fire times for a cron expression.
    Preview {
        /// Five-field cron expression, evaluated in the configured timezone.
        cron: String,

        /// Number of upcoming fire times to show.
        #[arg(long, default_value = "5")]
        count: usize,
    },
}

pub async fn handle_schedule_command(cmd: ScheduleCommand, state: &AppState, json: bool) -> Result<()> {
    match cmd {
        ScheduleCommand::Preview { cron, count } => {
            let fires = state
                .scheduler
                .preview(&cron, count)
                .map_err(|e| anyhow::anyhow!("invalid cron expression '{cron}': {e}"))?;

            if json {
                let out: Vec<String> = fires.iter().map(|t| t.to_rfc3339()).collect();
                println!("{}", serde_json::to_string_pretty(&out)?);
                return Ok(());
            }

            println!();
            println!("  Next {} fire times for '{}'", count, style(&cron).cyan());
            println!();
            for fire in &fires {
                println!("  {}", fire.format("%Y-%m-%d %H:%M:%S %z"));
            }
            println!();
            Ok(())
        }
    }
}
