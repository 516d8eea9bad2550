//! Tracing setup for hosts embedding the pipeline.

use tracing_subscriber::{fmt, EnvFilter};

/// Installs an env-filtered fmt subscriber as the global default.
///
/// The filter honors `RUST_LOG` and falls back to `info` for this crate.
/// Safe to call more than once; later calls are no-ops.
pub fn init_tracing() {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("gateflow=info"));
    let _ = fmt().with_env_filter(filter).try_init();
}

/// Like [`init_tracing`] but emitting one JSON object per line, for
/// log collectors.
pub fn init_json_tracing() {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("gateflow=info"));
    let _ = fmt().json().with_env_filter(filter).try_init();
}
