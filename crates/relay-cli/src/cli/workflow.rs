//! `create`, `trigger`, `list`, `status`, `logs`, `cancel`, `backups`.

use anyhow::{bail, Context, Result};
use comfy_table::{presets, Cell, Color, ContentArrangement, Table};
use console::style;
use relay_types::workflow::{RunStatus, StepStatus};

use crate::state::AppState;

pub async fn handle_create(state: &AppState, file: &std::path::Path, json: bool) -> Result<()> {
    let raw = std::fs::read_to_string(file).with_context(|| format!("failed to read {}", file.display()))?;
    let workflow = relay_core::workflow::definition::parse_workflow_yaml(&raw)
        .map_err(|e| anyhow::anyhow!("failed to parse {}: {}", file.display(), e.message()))?;

    if let Ok(existing) = state.loader.load(&workflow.name) {
        let previous_yaml = relay_core::workflow::definition::serialize_workflow_yaml(&existing)
            .map_err(|e| anyhow::anyhow!("failed to serialize previous workflow: {}", e.message()))?;
        state
            .backups
            .backup(&workflow.name, &previous_yaml)
            .map_err(|e| anyhow::anyhow!("failed to snapshot previous workflow: {e}"))?;
    }

    let saved_path = state
        .loader
        .save(&workflow)
        .map_err(|e| anyhow::anyhow!("failed to save workflow: {}", e.message()))?;

    if json {
        let out = serde_json::json!({
            "name": workflow.name,
            "path": saved_path.display().to_string(),
            "steps": workflow.steps.len(),
            "trigger": format!("{:?}", workflow.trigger),
        });
        println!("{}", serde_json::to_string_pretty(&out)?);
    } else {
        println!();
        println!("  {} Registered workflow '{}'", style("*").green().bold(), style(&workflow.name).cyan());
        println!("  Path: {}", saved_path.display());
        println!("  Steps: {}", workflow.steps.len());
        println!();
    }
    Ok(())
}

pub async fn handle_trigger(state: &AppState, name: &str, overrides: &[String], json: bool) -> Result<()> {
    let mut workflow = state
        .loader
        .load(name)
        .map_err(|e| anyhow::anyhow!("failed to load workflow '{name}': {}", e.message()))?;

    if !overrides.is_empty() {
        let first = workflow
            .steps
            .first_mut()
            .ok_or_else(|| anyhow::anyhow!("workflow '{name}' has no steps to override"))?;
        for raw in overrides {
            let (key, value) = raw
                .split_once('=')
                .ok_or_else(|| anyhow::anyhow!("override '{raw}' must be in key=value form"))?;
            first.params.insert(key.to_string(), serde_json::Value::String(value.to_string()));
        }
    }

    let Some(cancel) = state.run_manager.register(name).await else {
        bail!("workflow '{name}' already has a run in progress");
    };

    let run_log = state.executor.run(&workflow, cancel).await;
    state.run_manager.unregister(name).await;

    if let Err(e) = state.journal.save(&run_log) {
        tracing::error!(error = %e, "failed to persist run log");
    }

    if json {
        println!("{}", serde_json::to_string_pretty(&run_log)?);
    } else {
        println!();
        println!("  {} Run {} for '{}'", style("*").green().bold(), run_log.run_id, style(name).cyan());
        println!("  Status: {}", format_status_text(run_log.status));
        if let Some(err) = &run_log.error {
            println!("  Error: {}", style(err).red());
        }
        println!();
    }

    if run_log.status == RunStatus::Failed {
        std::process::exit(1);
    }
    Ok(())
}

pub async fn handle_list(state: &AppState, json: bool) -> Result<()> {
    let infos = state.loader.list();

    if json {
        println!("{}", serde_json::to_string_pretty(&infos)?);
        return Ok(());
    }

    if infos.is_empty() {
        println!();
        println!("  No workflows registered.");
        println!("  Create one with: {}", style("relay create <file.yaml>").dim());
        println!();
        return Ok(());
    }

    let mut table = Table::new();
    table
        .load_preset(presets::UTF8_FULL_CONDENSED)
        .set_content_arrangement(ContentArrangement::Dynamic)
        .set_header(vec![
            Cell::new("Name").fg(Color::Cyan),
            Cell::new("Enabled"),
            Cell::new("Trigger"),
            Cell::new("Steps"),
            Cell::new("File"),
        ]);

    for info in &infos {
        let trigger = match &info.cron {
            Some(cron) => format!("{} ({cron})", info.trigger_type),
            None => info.trigger_type.clone(),
        };
        table.add_row(vec![
            Cell::new(&info.name),
            Cell::new(info.enabled),
            Cell::new(trigger),
            Cell::new(info.step_count),
            Cell::new(&info.filename),
        ]);
    }

    println!();
    println!("{table}");
    println!();
    Ok(())
}

pub async fn handle_status(state: &AppState, name: &str, limit: usize, offset: usize, json: bool) -> Result<()> {
    let runs = state.journal.runs_for(name, limit, offset);

    if json {
        println!("{}", serde_json::to_string_pretty(&runs)?);
        return Ok(());
    }

    if runs.is_empty() {
        println!();
        println!("  No runs for workflow '{name}'.");
        if state.run_manager.is_running(name).await {
            println!("  (a run is currently in progress)");
        }
        println!();
        return Ok(());
    }

    let mut table = Table::new();
    table
        .load_preset(presets::UTF8_FULL_CONDENSED)
        .set_content_arrangement(ContentArrangement::Dynamic)
        .set_header(vec![
            Cell::new("Run ID").fg(Color::Cyan),
            Cell::new("Status"),
            Cell::new("Started"),
            Cell::new("Ended"),
            Cell::new("Steps"),
        ]);

    for run in &runs {
        let ended = run
            .ended_at
            .map(|t| t.format("%Y-%m-%d %H:%M:%S").to_string())
            .unwrap_or_else(|| "-".to_string());
        table.add_row(vec![
            Cell::new(&run.run_id),
            format_status_cell(run.status),
            Cell::new(run.started_at.format("%Y-%m-%d %H:%M:%S").to_string()),
            Cell::new(ended),
            Cell::new(run.steps.len()),
        ]);
    }

    println!();
    println!("  Runs for workflow '{}'", style(name).cyan());
    if state.run_manager.is_running(name).await {
        println!("  ({} a run is currently in progress)", style("!").yellow());
    }
    println!();
    println!("{table}");
    println!();
    Ok(())
}

pub async fn handle_logs(state: &AppState, name: &str, run_id: Option<&str>, json: bool) -> Result<()> {
    let run = match run_id {
        Some(id) => state
            .journal
            .runs_for(name, usize::MAX, 0)
            .into_iter()
            .find(|r| r.run_id == id)
            .ok_or_else(|| anyhow::anyhow!("run '{id}' not found for workflow '{name}'"))?,
        None => state
            .journal
            .latest(name)
            .ok_or_else(|| anyhow::anyhow!("no runs for workflow '{name}'"))?,
    };

    if json {
        println!("{}", serde_json::to_string_pretty(&run)?);
        return Ok(());
    }

    let mut table = Table::new();
    table
        .load_preset(presets::UTF8_FULL_CONDENSED)
        .set_content_arrangement(ContentArrangement::Dynamic)
        .set_header(vec![
            Cell::new("Step").fg(Color::Cyan),
            Cell::new("Type"),
            Cell::new("Status"),
            Cell::new("Error"),
        ]);

    for step in &run.steps {
        let error = step.error.as_deref().unwrap_or("-");
        table.add_row(vec![
            Cell::new(&step.id),
            Cell::new(&step.step_type),
            format_step_status_cell(step.status),
            Cell::new(error.chars().take(60).collect::<String>()),
        ]);
    }

    println!();
    println!("  Run {} ({})", style(&run.run_id).cyan(), format_status_text(run.status));
    println!();
    println!("{table}");
    println!();
    Ok(())
}

pub async fn handle_cancel(state: &AppState, name: &str, json: bool) -> Result<()> {
    let cancelled = state.run_manager.cancel(name).await;
    if !cancelled {
        bail!("workflow '{name}' has no run in progress");
    }

    if json {
        println!("{}", serde_json::json!({"cancelled": name}));
    } else {
        println!();
        println!("  {} Cancellation requested for '{}'", style("*").green().bold(), style(name).cyan());
        println!();
    }
    Ok(())
}

pub async fn handle_backups(state: &AppState, name: &str, json: bool) -> Result<()> {
    let entries = state.backups.list(name);

    if json {
        println!("{}", serde_json::to_string_pretty(&entries)?);
        return Ok(());
    }

    if entries.is_empty() {
        println!();
        println!("  No backups for workflow '{name}'.");
        println!();
        return Ok(());
    }

    let mut table = Table::new();
    table
        .load_preset(presets::UTF8_FULL_CONDENSED)
        .set_content_arrangement(ContentArrangement::Dynamic)
        .set_header(vec![Cell::new("File").fg(Color::Cyan), Cell::new("Timestamp"), Cell::new("Size")]);

    for entry in &entries {
        table.add_row(vec![Cell::new(&entry.filename), Cell::new(&entry.timestamp), Cell::new(entry.size)]);
    }

    println!();
    println!("  Backups for workflow '{}'", style(name).cyan());
    println!();
    println!("{table}");
    println!();
    Ok(())
}

fn format_status_text(status: RunStatus) -> &'static str {
    match status {
        RunStatus::Running => "running",
        RunStatus::Success => "success",
        RunStatus::Failed => "failed",
        RunStatus::Stopped => "stopped",
    }
}

fn format_status_cell(status: RunStatus) -> Cell {
    match status {
        RunStatus::Running => Cell::new("running").fg(Color::Blue),
        RunStatus::Success => Cell::new("success").fg(Color::Green),
        RunStatus::Failed => Cell::new("failed").fg(Color::Red),
        RunStatus::Stopped => Cell::new("stopped").fg(Color::DarkYellow),
    }
}

fn format_step_status_cell(status: StepStatus) -> Cell {
    match status {
        StepStatus::Success => Cell::new("success").fg(Color::Green),
        StepStatus::Failed => Cell::new("failed").fg(Color::Red),
        StepStatus::Skipped => Cell::new("skipped").fg(Color::DarkYellow),
    }
}
