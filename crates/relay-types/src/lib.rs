//! Shared domain types for the Relay workflow engine.
//!
//! Zero infrastructure dependencies -- only serde, serde_json, chrono.
//! Parsing, validation, and persistence live in `relay-core`.

pub mod workflow;
