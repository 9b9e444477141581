//! HTTP/1.x Request Parser
//!
//! Incremental, zero-copy request parsing:
//! - **stream** - the resumable state machine (`HttpStream`)
//! - **connection** - keep-alive pipelining over one buffer (`HttpConnection`)
//! - **chunked** - chunked transfer-coding encode/decode helpers
//!
//! A parsed [`HttpRequest`] holds [`Span`]s (offsets from the start of the
//! caller's buffer) instead of references, so the same request value stays
//! valid while the caller keeps appending to that buffer. Resolve spans with
//! the accessor methods, passing the buffer back in.

mod parser;
pub mod chunked;
pub mod connection;
pub mod stream;

pub use chunked::{decode_chunked, encode_chunked};
pub use connection::HttpConnection;
pub use stream::{HttpState, HttpStream};

use thiserror::Error;

use crate::config::HttpLimits;
use crate::error::{ErrorKind, ParseError};

/// Fixed capacity of the header array
pub const MAX_HEADERS: usize = 32;

/// A byte range inside the caller's buffer
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Span {
    pub start: usize,
    pub len: usize,
}

impl Span {
    pub const fn new(start: usize, len: usize) -> Self {
        Self { start, len }
    }

    pub const fn end(&self) -> usize {
        self.start + self.len
    }

    pub const fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// Resolve against the buffer this span was produced from.
    ///
    /// Returns an empty slice if the buffer is shorter than the span, which
    /// only happens when a span is used with the wrong buffer.
    pub fn slice<'a>(&self, buf: &'a [u8]) -> &'a [u8] {
        buf.get(self.start..self.end()).unwrap_or(&[])
    }
}

/// HTTP version from the request line
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Default)]
pub struct HttpVersion {
    pub major: u8,
    pub minor: u8,
}

impl HttpVersion {
    pub const HTTP_10: HttpVersion = HttpVersion { major: 1, minor: 0 };
    pub const HTTP_11: HttpVersion = HttpVersion { major: 1, minor: 1 };
}

impl std::fmt::Display for HttpVersion {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "HTTP/{}.{}", self.major, self.minor)
    }
}

/// One header field; both spans are trimmed of surrounding spaces and tabs
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct HttpHeader {
    pub name: Span,
    pub value: Span,
}

/// METHOD SP URI SP VERSION
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct HttpRequestLine {
    pub method: Span,
    pub uri: Span,
    pub version: HttpVersion,
}

/// A parsed request
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct HttpRequest {
    pub line: HttpRequestLine,
    headers: [HttpHeader; MAX_HEADERS],
    header_count: usize,
    /// Body bytes; for chunked requests this is the decoded, contiguous body
    pub body: Span,
    /// Declared Content-Length, if any
    pub content_length: Option<u64>,
    /// Whether the body used chunked transfer-coding
    pub chunked: bool,
}

impl Default for HttpRequest {
    fn default() -> Self {
        Self {
            line: HttpRequestLine::default(),
            headers: [HttpHeader::default(); MAX_HEADERS],
            header_count: 0,
            body: Span::default(),
            content_length: None,
            chunked: false,
        }
    }
}

impl HttpRequest {
    pub fn method<'a>(&self, buf: &'a [u8]) -> &'a [u8] {
        self.line.method.slice(buf)
    }

    pub fn uri<'a>(&self, buf: &'a [u8]) -> &'a [u8] {
        self.line.uri.slice(buf)
    }

    pub fn version(&self) -> HttpVersion {
        self.line.version
    }

    pub fn header_count(&self) -> usize {
        self.header_count
    }

    /// Header spans in arrival order
    pub fn header_spans(&self) -> &[HttpHeader] {
        &self.headers[..self.header_count]
    }

    /// Header (name, value) pairs in arrival order
    pub fn headers<'a>(&'a self, buf: &'a [u8]) -> impl Iterator<Item = (&'a [u8], &'a [u8])> + 'a {
        self.header_spans()
            .iter()
            .map(move |h| (h.name.slice(buf), h.value.slice(buf)))
    }

    /// First header whose name matches case-insensitively
    pub fn header<'a>(&self, buf: &'a [u8], name: &str) -> Option<&'a [u8]> {
        self.header_spans()
            .iter()
            .find(|h| h.name.slice(buf).eq_ignore_ascii_case(name.as_bytes()))
            .map(|h| h.value.slice(buf))
    }

    pub fn body<'a>(&self, buf: &'a [u8]) -> &'a [u8] {
        self.body.slice(buf)
    }

    /// Whether the connection stays open after this request
    pub fn keep_alive(&self, buf: &[u8]) -> bool {
        let connection = self.header(buf, "connection");
        if self.line.version >= HttpVersion::HTTP_11 {
            !connection.is_some_and(|v| parser::contains_ignore_case(v, b"close"))
        } else {
            connection.is_some_and(|v| parser::contains_ignore_case(v, b"keep-alive"))
        }
    }

    pub(crate) fn push_header(&mut self, header: HttpHeader) {
        if let Some(slot) = self.headers.get_mut(self.header_count) {
            *slot = header;
            self.header_count += 1;
        }
    }
}

/// HTTP parse status
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
#[repr(i32)]
pub enum HttpError {
    /// More bytes are needed; append and call again
    #[error("request truncated")]
    Truncated = -1,
    /// Malformed request
    #[error("bad request")]
    BadRequest = -2,
    /// Header array capacity exceeded
    #[error("too many headers")]
    TooManyHeaders = -3,
}

impl ParseError for HttpError {
    fn code(&self) -> i32 {
        *self as i32
    }

    fn kind(&self) -> ErrorKind {
        match self {
            HttpError::Truncated => ErrorKind::Recoverable,
            HttpError::BadRequest => ErrorKind::Malformed,
            HttpError::TooManyHeaders => ErrorKind::ResourceLimit,
        }
    }
}

/// Parse one complete request with default limits.
///
/// The buffer must hold the whole request; `Truncated` means it does not.
/// It is mutable because a chunked body is decoded in place.
pub fn parse(buf: &mut [u8]) -> Result<HttpRequest, HttpError> {
    parse_with_limits(buf, HttpLimits::default())
}

/// Parse one complete request with explicit limits
pub fn parse_with_limits(buf: &mut [u8], limits: HttpLimits) -> Result<HttpRequest, HttpError> {
    let mut stream = HttpStream::with_limits(limits);
    stream.execute(buf)?;
    stream.request().copied().ok_or(HttpError::Truncated)
}
