//! Subscriber installation.

use serde::{Deserialize, Serialize};
use std::sync::Once;
use tracing_subscriber::fmt::format::FmtSpan;
use tracing_subscriber::EnvFilter;

static INIT_TEST_TRACING: Once = Once::new();

/// Output format for [`init_tracing`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LogFormat {
    /// Human-readable lines.
    #[default]
    Plain,
    /// One JSON object per event.
    Json,
}

/// Installs a global fmt subscriber.
///
/// The filter comes from `RUST_LOG` when set, otherwise from
/// `default_filter` (for example `"completes=debug"`). Returns false if a
/// global subscriber was already installed.
pub fn init_tracing(default_filter: &str, format: LogFormat) -> bool {
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_filter));
    let builder = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_thread_names(true);

    match format {
        LogFormat::Plain => builder.try_init().is_ok(),
        LogFormat::Json => builder.json().try_init().is_ok(),
    }
}

/// Routes trace output through the test harness's captured writer.
///
/// The first call wins; later calls are no-ops.
pub fn init_test_tracing() {
    INIT_TEST_TRACING.call_once(|| {
        let _ = tracing_subscriber::fmt()
            .with_env_filter(EnvFilter::new("completes=trace"))
            .with_test_writer()
            .with_thread_names(true)
            .with_span_events(FmtSpan::CLOSE)
            .with_ansi(false)
            .try_init();
    });
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_log_format_serde() {
        assert_eq!(serde_json::to_string(&LogFormat::Json).unwrap(), "\"json\"");
        let parsed: LogFormat = serde_json::from_str("\"plain\"").unwrap();
        assert_eq!(parsed, LogFormat::Plain);
    }

    #[test]
    fn test_init_test_tracing_idempotent() {
        init_test_tracing();
        init_test_tracing();
        tracing::debug!("Test subscriber installed");
    }

    #[test]
    fn test_init_tracing_after_test_subscriber() {
        init_test_tracing();
        assert!(!init_tracing("completes=info", LogFormat::Plain));
    }
}
