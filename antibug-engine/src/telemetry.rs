//! Tracing subscriber initialization

use antibug_core::{AntibugError, AntibugResult, ConfigError};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

const DEFAULT_FILTER: &str = "antibug_engine=info,antibug_storage=info,warn";

/// Log output format.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum LogFormat {
    #[default]
    Pretty,
    Json,
}

/// Logging configuration from environment variables.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TelemetryConfig {
    /// `EnvFilter` directives
    pub filter: String,
    pub format: LogFormat,
}

impl Default for TelemetryConfig {
    fn default() -> Self {
        Self {
            filter: DEFAULT_FILTER.to_string(),
            format: LogFormat::Pretty,
        }
    }
}

impl TelemetryConfig {
    /// Environment variables:
    /// - `ANTIBUG_LOG`: filter directives, falling back to `RUST_LOG`
    /// - `ANTIBUG_LOG_FORMAT`: `json` for JSON lines, anything else for text
    pub fn from_env() -> Self {
        let filter = std::env::var("ANTIBUG_LOG")
            .or_else(|_| std::env::var("RUST_LOG"))
            .unwrap_or_else(|_| DEFAULT_FILTER.to_string());
        let format = match std::env::var("ANTIBUG_LOG_FORMAT") {
            Ok(f) if f.eq_ignore_ascii_case("json") => LogFormat::Json,
            _ => LogFormat::Pretty,
        };
        Self { filter, format }
    }
}

/// Install the global tracing subscriber.
///
/// Call once at startup; a second call fails.
pub fn init_tracing(config: &TelemetryConfig) -> AntibugResult<()> {
    let env_filter = EnvFilter::try_new(&config.filter).map_err(|e| {
        AntibugError::Config(ConfigError::InvalidValue {
            field: "ANTIBUG_LOG".to_string(),
            value: config.filter.clone(),
            reason: e.to_string(),
        })
    })?;

    let registry = tracing_subscriber::registry().with(env_filter);
    let result = match config.format {
        LogFormat::Json => registry
            .with(tracing_subscriber::fmt::layer().json().with_writer(std::io::stderr))
            .try_init(),
        LogFormat::Pretty => registry
            .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
            .try_init(),
    };

    result.map_err(|e| {
        AntibugError::Config(ConfigError::InvalidValue {
            field: "tracing subscriber".to_string(),
            value: format!("{:?}", config.format),
            reason: e.to_string(),
        })
    })?;

    tracing::debug!(filter = %config.filter, format = ?config.format, "tracing initialized");
    Ok(())
}
