//! Keep-alive pipelining over a single buffer.
//!
//! A client may write several requests back to back before reading any
//! response. `HttpConnection` parses them one after another out of the same
//! buffer: after each finished request only the per-request state is reset,
//! and the next parse starts where the previous request ended.

use super::{HttpError, HttpRequest, HttpStream};
use crate::config::ParserConfig;
use crate::error::ParseError;
use crate::telemetry;

/// Pipelined request parser for one connection
#[derive(Debug, Clone)]
pub struct HttpConnection {
    stream: HttpStream,
    completed: u64,
    log_rejections: bool,
}

impl HttpConnection {
    /// Create a connection parser with default configuration
    pub fn new() -> Self {
        Self::with_config(&ParserConfig::default())
    }

    pub fn with_config(config: &ParserConfig) -> Self {
        Self {
            stream: HttpStream::with_limits(config.http_limits()),
            completed: 0,
            log_rejections: config.log_rejections,
        }
    }

    /// Advance the current request; see [`HttpStream::execute`]
    pub fn execute(&mut self, buf: &mut [u8]) -> Result<usize, HttpError> {
        let fresh_error = self.stream.error().is_none();
        let result = self.stream.execute(buf);
        if let Err(e) = &result {
            if e.is_fatal() && fresh_error && self.log_rejections {
                telemetry::report_rejection("http/1.1", e);
            }
        }
        result
    }

    /// Hand out the finished request and rearm for the next one.
    ///
    /// Returns `None` while the current request is incomplete.
    pub fn next_request(&mut self) -> Option<HttpRequest> {
        let request = *self.stream.request()?;
        self.completed += 1;
        telemetry::parsed("http/1.1", self.stream.consumed()).emit();
        self.stream.reinit_for_next();
        Some(request)
    }

    /// Parse the next complete request out of `buf`, if one is there
    pub fn poll(&mut self, buf: &mut [u8]) -> Result<Option<HttpRequest>, HttpError> {
        match self.execute(buf) {
            Ok(_) => Ok(self.next_request()),
            Err(HttpError::Truncated) => Ok(None),
            Err(e) => Err(e),
        }
    }

    /// Offset where the next request starts (or the current one resumes)
    pub fn position(&self) -> usize {
        self.stream.consumed()
    }

    /// Whether `buf` holds bytes beyond the last finished request
    pub fn has_pending(&self, buf: &[u8]) -> bool {
        buf.len() > self.position()
    }

    /// Requests handed out so far
    pub fn completed(&self) -> u64 {
        self.completed
    }

    pub fn stream(&self) -> &HttpStream {
        &self.stream
    }
}

impl Default for HttpConnection {
    fn default() -> Self {
        Self::new()
    }
}
