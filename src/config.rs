//! Configuration module for netsift
//!
//! Parser limits and policies, deserialized from JSON supplied by the
//! embedder. The crate never reads files or environment variables itself.

use serde::Deserialize;
use thiserror::Error;

use crate::protocols::http::MAX_HEADERS;

/// Largest header name or value accepted
pub const MAX_HEADER_FIELD_LEN: usize = 65535;

/// What to do with a request that carries both `Transfer-Encoding: chunked`
/// and `Content-Length`
#[derive(Clone, Copy, Debug, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FramingConflict {
    /// Fail with BAD_REQUEST
    Reject,
    /// Ignore Content-Length and decode the chunked body
    ChunkedWins,
}

/// Parser configuration
#[derive(Clone, Debug, Deserialize)]
pub struct ParserConfig {
    /// Header array capacity actually used (clamped to `MAX_HEADERS`)
    #[serde(default = "default_max_headers")]
    pub max_headers: usize,

    /// Header name/value length limit (clamped to `MAX_HEADER_FIELD_LEN`)
    #[serde(default = "default_max_header_field_len")]
    pub max_header_field_len: usize,

    /// Chunked-vs-Content-Length policy
    #[serde(default = "default_framing_conflict")]
    pub framing_conflict: FramingConflict,

    /// WebSocket payloads above this fail with TOO_LARGE
    #[serde(default)]
    pub ws_max_payload_len: Option<u64>,

    /// Whether fatal rejections are reported through telemetry
    #[serde(default = "default_log_rejections")]
    pub log_rejections: bool,
}

fn default_max_headers() -> usize {
    MAX_HEADERS
}

fn default_max_header_field_len() -> usize {
    MAX_HEADER_FIELD_LEN
}

fn default_framing_conflict() -> FramingConflict {
    FramingConflict::Reject
}

fn default_log_rejections() -> bool {
    true
}

impl Default for ParserConfig {
    fn default() -> Self {
        Self {
            max_headers: default_max_headers(),
            max_header_field_len: default_max_header_field_len(),
            framing_conflict: default_framing_conflict(),
            ws_max_payload_len: None,
            log_rejections: default_log_rejections(),
        }
    }
}

impl ParserConfig {
    /// Parse configuration from JSON bytes
    pub fn from_bytes(bytes: &[u8]) -> Result<Self, ConfigError> {
        let config_str = std::str::from_utf8(bytes)
            .map_err(|e| ConfigError::InvalidUtf8(e.to_string()))?;

        serde_json::from_str(config_str)
            .map_err(|e| ConfigError::InvalidJson(e.to_string()))
    }

    /// Limits consumed by the HTTP state machine
    pub fn http_limits(&self) -> HttpLimits {
        HttpLimits {
            max_headers: self.max_headers.min(MAX_HEADERS),
            max_field_len: self.max_header_field_len.min(MAX_HEADER_FIELD_LEN),
            framing_conflict: self.framing_conflict,
        }
    }

    /// Limits consumed by the WebSocket frame decoder
    pub fn ws_limits(&self) -> WsLimits {
        WsLimits {
            max_payload_len: self.ws_max_payload_len.unwrap_or(u64::MAX),
        }
    }
}

/// HTTP parser limits
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct HttpLimits {
    pub max_headers: usize,
    pub max_field_len: usize,
    pub framing_conflict: FramingConflict,
}

impl Default for HttpLimits {
    fn default() -> Self {
        ParserConfig::default().http_limits()
    }
}

/// WebSocket decoder limits
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct WsLimits {
    pub max_payload_len: u64,
}

impl Default for WsLimits {
    fn default() -> Self {
        Self { max_payload_len: u64::MAX }
    }
}

/// Configuration parsing errors
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Invalid UTF-8: {0}")]
    InvalidUtf8(String),
    #[error("Invalid JSON: {0}")]
    InvalidJson(String),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = ParserConfig::default();
        assert_eq!(config.max_headers, MAX_HEADERS);
        assert_eq!(config.framing_conflict, FramingConflict::Reject);
        assert_eq!(config.ws_limits().max_payload_len, u64::MAX);
        assert!(config.log_rejections);
    }

    #[test]
    fn test_parse_config() {
        let json = r#"{"max_headers": 8, "framing_conflict": "chunked_wins", "ws_max_payload_len": 4096}"#;
        let config = ParserConfig::from_bytes(json.as_bytes()).unwrap();
        assert_eq!(config.max_headers, 8);
        assert_eq!(config.framing_conflict, FramingConflict::ChunkedWins);
        assert_eq!(config.ws_limits().max_payload_len, 4096);
        assert_eq!(config.max_header_field_len, MAX_HEADER_FIELD_LEN);
    }

    #[test]
    fn test_limits_are_clamped() {
        let json = r#"{"max_headers": 1000, "max_header_field_len": 1000000}"#;
        let limits = ParserConfig::from_bytes(json.as_bytes()).unwrap().http_limits();
        assert_eq!(limits.max_headers, MAX_HEADERS);
        assert_eq!(limits.max_field_len, MAX_HEADER_FIELD_LEN);
    }

    #[test]
    fn test_invalid_config() {
        assert!(matches!(
            ParserConfig::from_bytes(&[0xff, 0xfe]),
            Err(ConfigError::InvalidUtf8(_))
        ));
        assert!(matches!(
            ParserConfig::from_bytes(b"{\"framing_conflict\": \"maybe\"}"),
            Err(ConfigError::InvalidJson(_))
        ));
    }
}
