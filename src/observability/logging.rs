//! Structured logging configuration.

use serde::Deserialize;
use std::fmt;
use tracing_subscriber::EnvFilter;

/// Environment variable consulted before the configured filter.
pub const LOG_FILTER_ENV: &str = "MEMORYGRAPH_LOG";

/// Log output format.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    /// Human-readable multi-line output.
    #[default]
    Pretty,
    /// One JSON object per event.
    Json,
}

impl LogFormat {
    /// Returns the format as a string slice.
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Pretty => "pretty",
            Self::Json => "json",
        }
    }

    /// Parses a format from a string.
    #[must_use]
    pub fn parse(s: &str) -> Option<Self> {
        match s.trim().to_lowercase().as_str() {
            "pretty" | "text" => Some(Self::Pretty),
            "json" => Some(Self::Json),
            _ => None,
        }
    }
}

impl fmt::Display for LogFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Logging configuration.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// Output format.
    pub format: LogFormat,
    /// `EnvFilter` directives used when `MEMORYGRAPH_LOG` is unset.
    pub filter: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            format: LogFormat::Pretty,
            filter: "memorygraph=info".to_string(),
        }
    }
}

impl LoggingConfig {
    /// Builds the filter: `MEMORYGRAPH_LOG` first, then the configured directives.
    #[must_use]
    pub fn env_filter(&self) -> EnvFilter {
        EnvFilter::try_from_env(LOG_FILTER_ENV)
            .or_else(|_| EnvFilter::try_new(&self.filter))
            .unwrap_or_else(|_| EnvFilter::new("info"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_log_format_parse() {
        assert_eq!(LogFormat::parse("JSON"), Some(LogFormat::Json));
        assert_eq!(LogFormat::parse("text"), Some(LogFormat::Pretty));
        assert_eq!(LogFormat::parse("xml"), None);
    }

    #[test]
    fn test_invalid_filter_falls_back() {
        let config = LoggingConfig {
            format: LogFormat::Pretty,
            filter: "[[[not a filter".to_string(),
        };
        // Must not panic regardless of the environment.
        let _ = config.env_filter();
    }
}
