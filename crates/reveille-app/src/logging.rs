//! Tracing setup. The subscriber comes up before the config file is read so
//! load warnings are not lost; the configured level is swapped in afterwards.

use tracing_subscriber::filter::EnvFilter;
use tracing_subscriber::prelude::*;
use tracing_subscriber::{fmt, reload, Registry};

/// `RUST_LOG` wins over `level` when it parses.
pub fn filter_for(rust_log: Option<&str>, level: &str) -> EnvFilter {
    rust_log
        .and_then(|directives| EnvFilter::try_new(directives).ok())
        .unwrap_or_else(|| EnvFilter::new(level))
}

pub struct LogHandle {
    handle: reload::Handle<EnvFilter, Registry>,
    rust_log: Option<String>,
}

impl LogHandle {
    /// Switch to `level` unless `RUST_LOG` pinned the filter at startup.
    pub fn apply_level(&self, level: &str) {
        if self.rust_log.is_some() {
            return;
        }
        if let Err(e) = self.handle.reload(filter_for(None, level)) {
            tracing::warn!(level, error = %e, "Failed to apply log level");
        }
    }
}

/// Install the global subscriber. Logs go to stderr so stdout stays a clean
/// JSON line stream.
pub fn init(level: &str) -> LogHandle {
    let rust_log = std::env::var(EnvFilter::DEFAULT_ENV).ok();
    let (filter, handle) = reload::Layer::new(filter_for(rust_log.as_deref(), level));
    tracing_subscriber::registry()
        .with(filter)
        .with(fmt::layer().with_writer(std::io::stderr))
        .init();
    LogHandle { handle, rust_log }
}
