//! Application state wiring the engine's components together for the CLI.

use std::sync::Arc;

use relay_core::actions::register_builtins;
use relay_core::config::RelayConfig;
use relay_core::workflow::backup::BackupManager;
use relay_core::workflow::definition::Loader;
use relay_core::workflow::executor::Executor;
use relay_core::workflow::journal::Journal;
use relay_core::workflow::registry::ActionRegistry;
use relay_core::workflow::run_manager::RunManager;
use relay_core::workflow::scheduler::Scheduler;

/// Holds the concrete instances every CLI subcommand needs.
#[derive(Clone)]
pub struct AppState {
    pub config: RelayConfig,
    pub loader: Arc<Loader>,
    pub executor: Arc<Executor>,
    pub journal: Arc<Journal>,
    pub backups: Arc<BackupManager>,
    pub run_manager: RunManager,
    pub scheduler: Arc<Scheduler>,
}

impl AppState {
    /// Resolve configuration from `base_dir` and wire up the loader,
    /// registry (with built-in actions), executor, journal, backup
    /// manager, and scheduler.
    pub fn init(base_dir: &std::path::Path) -> anyhow::Result<Self> {
        let config = RelayConfig::load(base_dir)?;
        let timezone = config.timezone_offset();

        let loader = Arc::new(Loader::new(
            config.workflows_dir(),
            config.workflow_primary_ext.clone(),
            config.workflow_secondary_ext.clone(),
        ));

        let registry = ActionRegistry::new();
        let default_step_timeout = std::time::Duration::from_secs(config.default_step_timeout_secs);
        let executor = Arc::new(Executor::new(
            registry.clone(),
            config.base_dir.clone(),
            default_step_timeout,
            timezone,
        ));
        register_builtins(&registry, loader.clone(), executor.clone());

        let journal = Arc::new(Journal::new(config.runs_dir(), config.journal_ext.clone(), timezone));
        let backups = Arc::new(BackupManager::new(
            config.backups_dir(),
            config.workflow_primary_ext.clone(),
            config.max_backups,
            timezone,
        ));
        let run_manager = RunManager::new();

        let scheduler = Arc::new(Scheduler::new(
            loader.clone(),
            executor.clone(),
            journal.clone(),
            run_manager.clone(),
            timezone,
            config.journal_retention_days,
        ));

        Ok(Self {
            config,
            loader,
            executor,
            journal,
            backups,
            run_manager,
            scheduler,
        })
    }
}
