//! Tracing/logging initialization.

use tracing_subscriber::EnvFilter;

/// Baseline filter when `RUST_LOG` is unset. sqlx logs every statement at
/// info, which drowns the request-level spans, so it is capped at warn.
const DEFAULT_FILTER: &str = "info,sqlx=warn";

/// Install the process-wide subscriber: JSON lines on stdout, filtered by
/// `RUST_LOG` when present.
///
/// Safe to call multiple times (subsequent calls are no-ops).
pub fn init() {
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(DEFAULT_FILTER));

    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .json()
        .with_target(true)
        .with_current_span(true)
        .try_init();
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_filter_parses() {
        assert!(EnvFilter::try_new(DEFAULT_FILTER).is_ok());
    }
}
