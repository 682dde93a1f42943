//! # docmind-telemetry
//!
//! Logging setup for DocuMind binaries and tests.
//!
//! All DocuMind crates log through `tracing`; this crate installs the global
//! subscriber. `RUST_LOG` is honoured and defaults to `info`.
//!
//! ```rust,ignore
//! docmind_telemetry::init_telemetry("docmind-cli")?;
//! tracing::info!(query_id = %id, "rag query completed");
//! ```
//!
//! [`SpanCapture`] records closed spans in memory, keyed by `query.id`, so
//! tests and tools can inspect per-stage timings of a single query.

mod memory;

pub use memory::{CapturedSpan, SpanCapture, SpanCaptureLayer};

use std::sync::Arc;

use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::{EnvFilter, fmt};

/// Error returned when a global subscriber is already installed.
pub type InitError = Box<dyn std::error::Error + Send + Sync + 'static>;

fn env_filter(default: &str) -> EnvFilter {
    EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default))
}

/// Install a human-readable subscriber on stderr.
pub fn init_telemetry(service_name: &str) -> Result<(), InitError> {
    init_with_filter(service_name, "info")
}

/// Install a human-readable subscriber with `default_filter` used when
/// `RUST_LOG` is unset.
pub fn init_with_filter(service_name: &str, default_filter: &str) -> Result<(), InitError> {
    tracing_subscriber::registry()
        .with(env_filter(default_filter))
        .with(fmt::layer().with_writer(std::io::stderr).with_target(true))
        .try_init()?;
    tracing::debug!(service = service_name, "telemetry initialized");
    Ok(())
}

/// Install a JSON-lines subscriber on stderr for log shipping.
pub fn init_json_telemetry(service_name: &str) -> Result<(), InitError> {
    tracing_subscriber::registry()
        .with(env_filter("info"))
        .with(fmt::layer().json().with_current_span(true).with_writer(std::io::stderr))
        .try_init()?;
    tracing::debug!(service = service_name, "json telemetry initialized");
    Ok(())
}

/// Install a human-readable subscriber plus a [`SpanCaptureLayer`] feeding
/// `capture`.
pub fn init_with_capture(service_name: &str, capture: Arc<SpanCapture>) -> Result<(), InitError> {
    tracing_subscriber::registry()
        .with(env_filter("info"))
        .with(fmt::layer().with_writer(std::io::stderr))
        .with(SpanCaptureLayer::new(capture))
        .try_init()?;
    tracing::debug!(service = service_name, "telemetry with span capture initialized");
    Ok(())
}
