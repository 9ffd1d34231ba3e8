//! Tracing subscriber initialization with structured logging.
//!
//! # Usage
//!
//! ```no_run
//! relay_observe::tracing_setup::init_tracing(None).unwrap();
//! ```

use tracing_subscriber::fmt::format::FmtSpan;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::EnvFilter;

/// Initialize the global tracing subscriber.
///
/// Installs a structured `fmt` layer with target visibility and span close
/// timing. `default_filter` is used as the `EnvFilter` directive when
/// `RUST_LOG` isn't set (e.g. a CLI's `-v`/`-vv` verbosity mapping); pass
/// `None` to fall back to `EnvFilter::from_default_env()`'s own default
/// (`error`-level only).
///
/// # Errors
///
/// Returns an error if the global subscriber has already been set.
pub fn init_tracing(default_filter: Option<&str>) -> Result<(), Box<dyn std::error::Error>> {
    let fmt_layer = tracing_subscriber::fmt::layer()
        .with_target(true)
        .with_span_events(FmtSpan::CLOSE);

    let env_filter = match default_filter {
        Some(default) => {
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default))
        }
        None => EnvFilter::from_default_env(),
    };

    tracing_subscriber::registry().with(env_filter).with(fmt_layer).try_init()?;

    Ok(())
}
