//! Telemetry Module for netsift
//!
//! Structured parse events, serialized to JSON and handed to the `log`
//! facade so whatever logger the embedder installed can collect them.
//! Nothing is built or serialized unless the target level is enabled.

use log::{debug, log_enabled, warn, Level};
use serde::Serialize;

use crate::error::{ErrorKind, ParseError};

/// Parse event types
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ParseEventType {
    /// A complete message was decoded
    MessageParsed,
    /// A message was rejected with a fatal status
    MessageRejected,
    /// A stream prefix was classified
    ProtocolDetected,
}

/// Parse event for logging
#[derive(Debug, Clone, Serialize)]
pub struct ParseEvent {
    /// Event type
    pub event_type: ParseEventType,
    /// Protocol name ("http/1.1", "websocket", "dns", ...)
    pub protocol: &'static str,
    /// Decoder status code
    #[serde(skip_serializing_if = "Option::is_none")]
    pub status_code: Option<i32>,
    /// Error class of a rejection
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error_class: Option<ErrorKind>,
    /// Human-readable reason
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,
    /// Bytes consumed from the input buffer
    #[serde(skip_serializing_if = "Option::is_none")]
    pub bytes_consumed: Option<usize>,
}

impl ParseEvent {
    /// Create a new parse event
    pub fn new(event_type: ParseEventType, protocol: &'static str) -> Self {
        Self {
            event_type,
            protocol,
            status_code: None,
            error_class: None,
            reason: None,
            bytes_consumed: None,
        }
    }

    /// Set status code
    pub fn with_status(mut self, code: i32) -> Self {
        self.status_code = Some(code);
        self
    }

    /// Set error class
    pub fn with_error_class(mut self, kind: ErrorKind) -> Self {
        self.error_class = Some(kind);
        self
    }

    /// Set reason
    pub fn with_reason(mut self, reason: &str) -> Self {
        self.reason = Some(reason.to_string());
        self
    }

    /// Set consumed byte count
    pub fn with_bytes_consumed(mut self, n: usize) -> Self {
        self.bytes_consumed = Some(n);
        self
    }

    fn level(&self) -> Level {
        match self.event_type {
            ParseEventType::MessageRejected => Level::Warn,
            _ => Level::Debug,
        }
    }

    /// Serialize to JSON
    pub fn to_json(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string(self)
    }

    /// Log the event
    pub fn emit(&self) {
        if !log_enabled!(self.level()) {
            return;
        }
        match self.to_json() {
            Ok(json) => match self.level() {
                Level::Warn => warn!("[NETSIFT] {}", json),
                _ => debug!("[NETSIFT] {}", json),
            },
            Err(e) => {
                warn!("Failed to serialize parse event: {}", e);
            }
        }
    }
}

/// Create a rejection event from a decoder status
pub fn rejected<E: ParseError>(protocol: &'static str, err: &E) -> ParseEvent {
    ParseEvent::new(ParseEventType::MessageRejected, protocol)
        .with_status(err.code())
        .with_error_class(err.kind())
        .with_reason(&err.to_string())
}

/// Create a parsed-message event
pub fn parsed(protocol: &'static str, bytes_consumed: usize) -> ParseEvent {
    ParseEvent::new(ParseEventType::MessageParsed, protocol)
        .with_status(crate::error::OK)
        .with_bytes_consumed(bytes_consumed)
}

/// Create a protocol-detected event
pub fn detected(protocol: &'static str) -> ParseEvent {
    ParseEvent::new(ParseEventType::ProtocolDetected, protocol)
}

/// Emit a rejection, skipping all formatting when warnings are disabled
pub fn report_rejection<E: ParseError>(protocol: &'static str, err: &E) {
    if log_enabled!(Level::Warn) {
        rejected(protocol, err).emit();
    }
}
