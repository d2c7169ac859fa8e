//! Client Configuration
//!
//! Defaults, optionally overridden by a JSON file and then by command line
//! arguments in `main`.
//!
//! ```json
//! {"host": "mud.example.org", "port": 4000, "line_ending": "crlf"}
//! ```

use std::path::Path;
use std::str::FromStr;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::ConfigError;

/// Terminator appended to each outbound command.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LineEnding {
    #[default]
    Lf,
    Crlf,
    Cr,
}

impl LineEnding {
    pub fn as_bytes(self) -> &'static [u8] {
        match self {
            LineEnding::Lf => b"\n",
            LineEnding::Crlf => b"\r\n",
            LineEnding::Cr => b"\r",
        }
    }

}

impl FromStr for LineEnding {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "lf" => Ok(LineEnding::Lf),
            "crlf" => Ok(LineEnding::Crlf),
            "cr" => Ok(LineEnding::Cr),
            _ => Err(ConfigError::LineEnding(s.to_string())),
        }
    }
}

/// Settings for one client connection.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ClientConfig {
    pub host: String,
    pub port: u16,
    /// Read timeout; also the latency before an unterminated prompt is shown
    pub read_timeout_ms: u64,
    pub connect_timeout_ms: u64,
    pub read_buffer_size: usize,
    /// Capacity of the output and input channels
    pub channel_capacity: usize,
    /// Capacity of the error and echo-state channels
    pub notify_capacity: usize,
    pub line_ending: LineEnding,
    /// Echo submitted commands into the transcript (never while masked)
    pub local_echo: bool,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            host: "127.0.0.1".to_string(),
            port: 4000,
            read_timeout_ms: 100,
            connect_timeout_ms: 10_000,
            read_buffer_size: 4096,
            channel_capacity: 100,
            notify_capacity: 16,
            line_ending: LineEnding::Lf,
            local_echo: false,
        }
    }
}

impl ClientConfig {
    /// Parse a JSON document. Missing fields keep their defaults.
    pub fn from_json_str(json: &str) -> Result<Self, ConfigError> {
        Ok(serde_json::from_str(json)?)
    }

    pub fn from_json_file(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let json = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_json_str(&json)
    }

    pub fn address(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }

    pub fn read_timeout(&self) -> Duration {
        // A zero timeout would spin the read loop
        Duration::from_millis(self.read_timeout_ms.max(1))
    }

    pub fn connect_timeout(&self) -> Duration {
        Duration::from_millis(self.connect_timeout_ms)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = ClientConfig::default();
        assert_eq!(config.read_timeout(), Duration::from_millis(100));
        assert_eq!(config.channel_capacity, 100);
        assert_eq!(config.line_ending.as_bytes(), b"\n");
    }

    #[test]
    fn test_partial_json_keeps_defaults() {
        let config =
            ClientConfig::from_json_str(r#"{"host":"mud.example.org","line_ending":"crlf"}"#)
                .unwrap();
        assert_eq!(config.host, "mud.example.org");
        assert_eq!(config.port, 4000);
        assert_eq!(config.line_ending, LineEnding::Crlf);
        assert_eq!(config.address(), "mud.example.org:4000");
    }

    #[test]
    fn test_invalid_json_is_error() {
        let err = ClientConfig::from_json_str(r#"{"port":"four thousand"}"#).unwrap_err();
        assert!(matches!(err, ConfigError::Parse(_)));
    }

    #[test]
    fn test_missing_file_is_error() {
        let err = ClientConfig::from_json_file("/nonexistent/mudlink.json").unwrap_err();
        assert!(matches!(err, ConfigError::Read { .. }));
    }

    #[test]
    fn test_line_ending_from_str() {
        assert_eq!("CRLF".parse::<LineEnding>().unwrap(), LineEnding::Crlf);
        assert_eq!("cr".parse::<LineEnding>().unwrap(), LineEnding::Cr);
        assert_eq!("lf".parse::<LineEnding>().unwrap(), LineEnding::Lf);

        let err = "crlf\n".parse::<LineEnding>().unwrap_err();
        assert!(matches!(err, ConfigError::LineEnding(ref given) if given == "crlf\n"));
    }
}
