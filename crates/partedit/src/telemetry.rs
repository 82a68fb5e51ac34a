//! Structured logging setup for embedding applications.
//!
//! The library only emits `tracing` events. Binaries and tests that want
//! them on stderr call [`initialise`] once with the loaded configuration.

use std::io::{self, IsTerminal};

use once_cell::sync::OnceCell;
use tracing::{Subscriber, subscriber::SetGlobalDefaultError};
use tracing_subscriber::EnvFilter;
use tracing_subscriber::fmt;

use partedit_config::{Config, LogFormat};

static TELEMETRY_GUARD: OnceCell<()> = OnceCell::new();

/// Handle returned when telemetry has been initialised.
#[derive(Debug, Default, Clone, Copy)]
pub struct TelemetryHandle;

/// Errors encountered while configuring telemetry.
#[derive(Debug, thiserror::Error)]
pub enum TelemetryError {
    /// The configured log filter expression did not parse.
    #[error("invalid log filter: {0}")]
    Filter(String),
    /// Another global subscriber was already installed.
    #[error("failed to install telemetry subscriber: {0}")]
    Subscriber(SetGlobalDefaultError),
}

/// Installs the global tracing subscriber on first use.
///
/// Later calls return a new [`TelemetryHandle`] without touching the global
/// subscriber again, even if `config` differs.
///
/// # Errors
///
/// Returns [`TelemetryError::Filter`] for an invalid filter and
/// [`TelemetryError::Subscriber`] when some other subscriber is already
/// installed.
///
/// # Examples
///
/// ```rust
/// use partedit::telemetry;
/// use partedit_config::Config;
///
/// # fn main() -> Result<(), telemetry::TelemetryError> {
/// let config = Config::default();
/// let first = telemetry::initialise(&config)?;
/// let second = telemetry::initialise(&config)?;
/// drop(first);
/// drop(second);
/// # Ok(())
/// # }
/// ```
pub fn initialise(config: &Config) -> Result<TelemetryHandle, TelemetryError> {
    TELEMETRY_GUARD
        .get_or_try_init(|| install_subscriber(config))
        .map(|_| TelemetryHandle)
}

fn install_subscriber(config: &Config) -> Result<(), TelemetryError> {
    let filter = EnvFilter::try_new(config.log_filter())
        .map_err(|error| TelemetryError::Filter(error.to_string()))?;

    let builder = |env_filter: EnvFilter| {
        fmt::Subscriber::builder()
            .with_env_filter(env_filter)
            .with_target(true)
            .with_level(true)
            .with_thread_ids(true)
            .with_writer(io::stderr)
            // No colour codes when stderr is redirected.
            .with_ansi(io::stderr().is_terminal())
            .with_timer(fmt::time::UtcTime::rfc_3339())
    };

    let subscriber: Box<dyn Subscriber + Send + Sync> = match config.log_format() {
        LogFormat::Json => Box::new(builder(filter).json().flatten_event(true).finish()),
        LogFormat::Compact => Box::new(builder(filter).compact().finish()),
    };

    tracing::subscriber::set_global_default(subscriber).map_err(TelemetryError::Subscriber)
}
