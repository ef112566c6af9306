//! Logging configuration

use serde::{Deserialize, Serialize};
use std::fmt;

/// Log output format; workers under a scheduler usually want `json`
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    #[default]
    Text,
    Json,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogLevel {
    Error,
    Warn,
    #[default]
    Info,
    Debug,
    Trace,
}

impl LogLevel {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Error => "error",
            Self::Warn => "warn",
            Self::Info => "info",
            Self::Debug => "debug",
            Self::Trace => "trace",
        }
    }

    /// Level after applying `-v` flags on top of the configured one.
    ///
    /// Flags only ever make output chattier.
    pub fn raised_by(self, verbosity: u8) -> LogLevel {
        let raised = match verbosity {
            0 => self,
            1 => Self::Debug,
            _ => Self::Trace,
        };
        self.max(raised)
    }
}

impl fmt::Display for LogLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    pub format: LogFormat,
    pub level: LogLevel,
    /// Include the emitting module in each line
    pub with_target: bool,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_verbosity_never_lowers_level() {
        assert_eq!(LogLevel::Warn.raised_by(0), LogLevel::Warn);
        assert_eq!(LogLevel::Warn.raised_by(1), LogLevel::Debug);
        assert_eq!(LogLevel::Trace.raised_by(1), LogLevel::Trace);
        assert_eq!(LogLevel::Info.raised_by(5), LogLevel::Trace);
    }

    #[test]
    fn test_parses_lowercase_names() {
        let config: LoggingConfig = toml::from_str("format = \"json\"\nlevel = \"debug\"").unwrap();
        assert_eq!(config.format, LogFormat::Json);
        assert_eq!(config.level, LogLevel::Debug);
        assert!(!config.with_target);
    }
}
