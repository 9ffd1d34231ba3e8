//! Engine crate for the Relay workflow automation host.
//!
//! - `config` -- `RelayConfig` resolution (defaults, `relay.toml`, env, CLI)
//! - `secrets` -- environment-variable-first secret lookup
//! - `workflow` -- the execution substrate: registry, templating, loader,
//!   retry, executor, run manager, journal, scheduler, backups
//! - `actions` -- built-in action implementations (log, file_write, http,
//!   subworkflow)

pub mod actions;
pub mod config;
pub mod secrets;
pub mod workflow;
