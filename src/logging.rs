/// Structured logging for the hydrology dashboard service.
///
/// `init` installs a `tracing` subscriber once at startup. The helpers
/// below classify provider failures so an offline gauge logs quietly while
/// transport or parse trouble is loud, and summarise per-site loads.

use std::fmt;
use tracing::{debug, error, info, warn};
use tracing_subscriber::EnvFilter;

use crate::model::ProviderError;

/// Crate targets that receive log output at the configured level.
const CRATE_TARGETS: &[&str] = &["hydromon_service"];

/// Installs the global subscriber.
///
/// Verbosity: 0 → warn, 1 → info, 2 → debug, 3+ → trace. `RUST_LOG`
/// overrides the flag when set.
pub fn init(verbosity: u8) {
    let level = match verbosity {
        0 => "warn",
        1 => "info",
        2 => "debug",
        _ => "trace",
    };

    let default_filter = CRATE_TARGETS
        .iter()
        .map(|t| format!("{t}={level}"))
        .collect::<Vec<_>>()
        .join(",");

    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_filter));

    // A second init (tests, embedding) keeps the first subscriber.
    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .try_init();
}

// ---------------------------------------------------------------------------
// Failure classification
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FailureType {
    /// Gauge offline or nothing recorded in the window.
    Expected,
    /// Transport, HTTP or parse failure: the service is degraded.
    Unexpected,
    /// Server-side error we can't attribute.
    Unknown,
}

impl fmt::Display for FailureType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FailureType::Expected => write!(f, "EXPECTED"),
            FailureType::Unexpected => write!(f, "UNEXPECTED"),
            FailureType::Unknown => write!(f, "UNKNOWN"),
        }
    }
}

pub fn classify_provider_failure(err: &ProviderError) -> FailureType {
    match err {
        ProviderError::Http(_) | ProviderError::Parse(_) => FailureType::Unexpected,
        ProviderError::HttpStatus(status) if *status >= 500 => FailureType::Unexpected,
        ProviderError::HttpStatus(_) => FailureType::Unknown,
        ProviderError::Server(msg) => {
            let msg = msg.to_ascii_lowercase();
            if msg.contains("no data") || msg.contains("not found") {
                FailureType::Expected
            } else {
                FailureType::Unknown
            }
        }
    }
}

/// Logs a provider failure with the request context, at a level set by
/// its classification.
pub fn log_provider_failure(measurement: &str, site: Option<&str>, err: &ProviderError) {
    let failure = classify_provider_failure(err);
    let site = site.unwrap_or("*");

    match failure {
        FailureType::Expected => {
            debug!(measurement, site, failure = %failure, error = %err, "provider request failed")
        }
        FailureType::Unexpected => {
            error!(measurement, site, failure = %failure, error = %err, "provider request failed")
        }
        FailureType::Unknown => {
            warn!(measurement, site, failure = %failure, error = %err, "provider request failed")
        }
    }
}

/// Summary of a per-site dataset load.
pub fn log_dataset_summary(measurement: &str, requested: usize, returned: usize) {
    let missing = requested.saturating_sub(returned);
    if missing == 0 {
        info!(measurement, "dataset loaded: {}/{} sites returned data", returned, requested);
    } else if returned == 0 {
        error!(measurement, "dataset load failed: 0/{} sites returned data", requested);
    } else {
        warn!(
            measurement,
            "dataset partially loaded: {}/{} sites returned data, {} missing",
            returned,
            requested,
            missing
        );
    }
}
