//! Logging setup
//!
//! Diagnostics always go to stderr; stdout is reserved for the CSV report.

use std::fmt;
use std::str::FromStr;
use std::sync::Once;
use tracing::Span;
use tracing_subscriber::{fmt as fmt_layer, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

static INIT: Once = Once::new();

/// Log output format
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum LogFormat {
    /// Multi-line human readable output
    Pretty,
    /// One line per event
    #[default]
    Compact,
    /// JSON structured logs
    Json,
}

impl LogFormat {
    /// Name accepted on the command line
    #[inline]
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            LogFormat::Pretty => "pretty",
            LogFormat::Compact => "compact",
            LogFormat::Json => "json",
        }
    }
}

impl fmt::Display for LogFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for LogFormat {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "pretty" => Ok(LogFormat::Pretty),
            "compact" => Ok(LogFormat::Compact),
            "json" => Ok(LogFormat::Json),
            other => Err(format!(
                "unknown log format {other:?}, expected pretty, compact or json"
            )),
        }
    }
}

/// Initialize the global subscriber
///
/// `RUST_LOG` overrides the default `info` level. Safe to call more than
/// once; later calls are no-ops.
pub fn init_logging(format: LogFormat) {
    INIT.call_once(|| {
        let env_filter =
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
        let registry = tracing_subscriber::registry().with(env_filter);

        match format {
            LogFormat::Json => registry
                .with(fmt_layer::layer().json().with_writer(std::io::stderr))
                .init(),
            LogFormat::Pretty => registry
                .with(fmt_layer::layer().pretty().with_writer(std::io::stderr))
                .init(),
            LogFormat::Compact => registry
                .with(fmt_layer::layer().compact().with_writer(std::io::stderr))
                .init(),
        }
    });
}

/// Span covering one probe session
#[must_use]
pub fn session_span(secret: &str, pod: &str) -> Span {
    tracing::info_span!("probe", secret = secret, pod = pod)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_formats() {
        assert_eq!("json".parse::<LogFormat>().unwrap(), LogFormat::Json);
        assert_eq!("Pretty".parse::<LogFormat>().unwrap(), LogFormat::Pretty);
        assert_eq!("compact".parse::<LogFormat>().unwrap(), LogFormat::Compact);
        assert!("xml".parse::<LogFormat>().is_err());
    }

    #[test]
    fn display_round_trips() {
        for format in [LogFormat::Pretty, LogFormat::Compact, LogFormat::Json] {
            assert_eq!(format.to_string().parse::<LogFormat>().unwrap(), format);
        }
    }

    #[test]
    fn init_logging_is_idempotent() {
        init_logging(LogFormat::Compact);
        init_logging(LogFormat::Json);
    }

    #[test]
    fn session_span_enters() {
        let span = session_span("my-secret", "my-pod");
        let _guard = span.enter();
        tracing::info!("inside session span");
    }
}
