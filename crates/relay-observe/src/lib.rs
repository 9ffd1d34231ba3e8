//! Tracing subscriber initialization shared by the CLI and any embedder.

pub mod tracing_setup;
