//! Process-wide logging.
//!
//! `init` is called once at startup, before anything else logs. The returned guard is
//! held for the life of `main`; dropping it flushes whatever is still buffered on
//! stdout so the final lines of a run are never lost.

use std::io::Write;

use tracing_subscriber::EnvFilter;

use crate::config::LogFormat;

pub struct TelemetryGuard;

impl Drop for TelemetryGuard {
    fn drop(&mut self) {
        let _ = std::io::stdout().flush();
    }
}

fn filter() -> EnvFilter {
    EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"))
}

pub fn init(format: LogFormat) -> TelemetryGuard {
    match format {
        LogFormat::Json => tracing_subscriber::fmt().json().with_env_filter(filter()).init(),
        LogFormat::Pretty => tracing_subscriber::fmt().with_env_filter(filter()).init(),
    }
    TelemetryGuard
}
