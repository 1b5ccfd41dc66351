//! Tracing setup for structured logging.

use serde::Deserialize;
use tracing_subscriber::{
    fmt::{self, format::FmtSpan},
    layer::SubscriberExt,
    util::SubscriberInitExt,
    EnvFilter,
};

/// Quiet sqlx statement logs and hyper internals unless asked for.
pub const DEFAULT_FILTER: &str = "info,sqlx=warn,hyper=warn";

/// Tracing configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct TracingConfig {
    /// Filter directives, e.g. `info,worker=debug,jobq=debug`
    #[serde(default = "default_filter")]
    pub filter: String,
    /// One JSON object per line instead of the human format
    #[serde(default)]
    pub json: bool,
    /// Log span open/close, which shows job durations
    #[serde(default)]
    pub span_events: bool,
}

fn default_filter() -> String {
    DEFAULT_FILTER.to_string()
}

impl Default for TracingConfig {
    fn default() -> Self {
        Self {
            filter: default_filter(),
            json: false,
            span_events: false,
        }
    }
}

impl TracingConfig {
    /// Read `RUST_LOG`, `LOG_JSON` and `LOG_SPANS`.
    pub fn from_env() -> Self {
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        let flag = |name: &str| lookup(name).map(|v| is_truthy(&v)).unwrap_or(false);
        Self {
            filter: lookup("RUST_LOG")
                .filter(|f| !f.trim().is_empty())
                .unwrap_or_else(default_filter),
            json: flag("LOG_JSON"),
            span_events: flag("LOG_SPANS"),
        }
    }
}

fn is_truthy(value: &str) -> bool {
    matches!(value.trim().to_ascii_lowercase().as_str(), "1" | "true" | "yes" | "on")
}

/// Install the global subscriber. A second call is a no-op.
pub fn init_tracing(config: &TracingConfig) {
    let env_filter =
        EnvFilter::try_new(&config.filter).unwrap_or_else(|_| EnvFilter::new(DEFAULT_FILTER));

    let span_events = if config.span_events {
        FmtSpan::NEW | FmtSpan::CLOSE
    } else {
        FmtSpan::NONE
    };

    let installed = if config.json {
        tracing_subscriber::registry()
            .with(env_filter)
            .with(
                fmt::layer()
                    .json()
                    .with_current_span(true)
                    .with_span_list(false)
                    .with_span_events(span_events)
                    .with_target(true),
            )
            .try_init()
    } else {
        tracing_subscriber::registry()
            .with(env_filter)
            .with(fmt::layer().with_span_events(span_events).with_target(true))
            .try_init()
    };

    if installed.is_ok() {
        tracing::info!(filter = %config.filter, json = config.json, "Tracing initialized");
    }
}

/// Initialize tracing from the environment.
pub fn init_tracing_from_env() {
    init_tracing(&TracingConfig::from_env());
}
