//! Structured logging.
//!
//! # Responsibilities
//! - Initialize the tracing subscriber once per process
//! - Pick the output stream: the front logs to stdout, workers to stderr
//!
//! # Design Decisions
//! - `RUST_LOG` wins over the configured level when set
//! - A worker's stdout carries envelopes, so nothing else may write there

use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

/// Where log lines go.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogOutput {
    Stdout,
    Stderr,
}

/// Default filter for a given level, e.g. `cluster_proxy=info,tower_http=info`.
pub fn default_filter(level: &str) -> String {
    format!("cluster_proxy={level},tower_http={level}")
}

/// Install the global subscriber. Later calls are ignored.
pub fn init(level: &str, output: LogOutput) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| default_filter(level).into());
    let registry = tracing_subscriber::registry().with(filter);

    let result = match output {
        LogOutput::Stdout => registry.with(fmt::layer()).try_init(),
        LogOutput::Stderr => registry.with(fmt::layer().with_writer(std::io::stderr)).try_init(),
    };
    if result.is_err() {
        tracing::debug!("Logging already initialized");
    }
}
