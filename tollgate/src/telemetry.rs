//! Telemetry initialization: tracing-subscriber with an env-filter and a
//! console fmt layer.
//!
//! Log verbosity is controlled via `RUST_LOG` (standard `tracing` env-filter
//! syntax, e.g. `RUST_LOG=tollgate=debug,tower_http=info`), defaulting to
//! `info` when unset.

use tracing_subscriber::EnvFilter;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;

/// Initialize tracing for the process.
///
/// Safe to call once at startup; returns an error if a global subscriber is
/// already installed.
pub fn init_telemetry() -> anyhow::Result<()> {
    let env_filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));

    tracing_subscriber::registry()
        .with(env_filter)
        .with(tracing_subscriber::fmt::layer())
        .try_init()?;

    tracing::info!("Telemetry initialized");

    Ok(())
}
