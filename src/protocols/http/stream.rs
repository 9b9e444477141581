//! Resumable HTTP/1.x request state machine.
//!
//! ```text
//! ReqLine -> Headers -> BodyContentLength ---------------------------> Done
//!                    \-> BodyChunkSize <-> BodyChunkData
//!                              \-> BodyChunkTrailers ------------------> Done
//! any state -> Error
//! ```
//!
//! The caller passes the same growing buffer to [`HttpStream::execute`] until
//! it returns `Ok`. Progress is committed per complete line or body fragment,
//! so a `Truncated` return never causes work to be redone or headers to be
//! recorded twice.
//!
//! Chunked bodies are defragmented in place: each chunk's data is moved
//! down to a write cursor starting at the body's first byte, so the decoded
//! body ends up contiguous. Raw bytes between the end of the decoded body
//! and the stream cursor are meaningless afterwards.

use log::{debug, trace};

use super::parser::{self, HeaderLine};
use super::{HttpError, HttpRequest, Span};
use crate::config::{FramingConflict, HttpLimits};

/// Chunk-size lines longer than this are rejected
const MAX_CHUNK_LINE_LEN: usize = 1024;

/// Parser states
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HttpState {
    ReqLine,
    Headers,
    BodyContentLength,
    BodyChunkSize,
    BodyChunkData,
    BodyChunkTrailers,
    Done,
    Error,
}

/// Incremental request parser for one connection
#[derive(Debug, Clone)]
pub struct HttpStream {
    state: HttpState,
    /// Absolute cursor into the caller's buffer
    pos: usize,
    request: HttpRequest,
    limits: HttpLimits,
    content_length: u64,
    has_content_length: bool,
    is_chunked: bool,
    /// First byte of the body
    body_start: usize,
    /// Decoded body bytes so far
    body_written: usize,
    chunk_bytes_remaining: u64,
    error: Option<HttpError>,
}

impl HttpStream {
    /// Create a parser with default limits
    pub fn new() -> Self {
        Self::with_limits(HttpLimits::default())
    }

    pub fn with_limits(limits: HttpLimits) -> Self {
        Self {
            state: HttpState::ReqLine,
            pos: 0,
            request: HttpRequest::default(),
            limits,
            content_length: 0,
            has_content_length: false,
            is_chunked: false,
            body_start: 0,
            body_written: 0,
            chunk_bytes_remaining: 0,
            error: None,
        }
    }

    /// A parser positioned at the start of a bare chunked body
    pub(crate) fn chunked_body(limits: HttpLimits) -> Self {
        let mut stream = Self::with_limits(limits);
        stream.is_chunked = true;
        stream.request.chunked = true;
        stream.state = HttpState::BodyChunkSize;
        stream
    }

    pub fn state(&self) -> HttpState {
        self.state
    }

    pub fn is_done(&self) -> bool {
        self.state == HttpState::Done
    }

    /// Absolute offset of the first unconsumed byte
    pub fn consumed(&self) -> usize {
        self.pos
    }

    pub fn limits(&self) -> HttpLimits {
        self.limits
    }

    /// The finished request, once `Done`
    pub fn request(&self) -> Option<&HttpRequest> {
        self.is_done().then_some(&self.request)
    }

    /// The fatal error that moved the parser into `Error`
    pub fn error(&self) -> Option<HttpError> {
        self.error
    }

    /// Forget everything, including the cursor
    pub fn reset(&mut self) {
        *self = Self::with_limits(self.limits);
    }

    /// Prepare for the next pipelined request.
    ///
    /// Clears per-request state but keeps the cursor, so parsing resumes
    /// right after the request that just finished in the same buffer.
    pub fn reinit_for_next(&mut self) {
        let pos = self.pos;
        self.reset();
        self.pos = pos;
    }

    fn set_state(&mut self, next: HttpState) {
        trace!("http: {:?} -> {:?} at {}", self.state, next, self.pos);
        self.state = next;
    }

    fn fail(&mut self, err: HttpError) -> HttpError {
        if err != HttpError::Truncated {
            debug!("http: rejecting request in {:?} at offset {}: {}", self.state, self.pos, err);
            self.error = Some(err);
            self.state = HttpState::Error;
        }
        err
    }

    /// Advance as far as `buf` allows.
    ///
    /// Returns the absolute end offset of the request once `Done`.
    /// `Truncated` asks for more bytes appended to the same buffer; every
    /// other error is terminal and is returned again by later calls.
    pub fn execute(&mut self, buf: &mut [u8]) -> Result<usize, HttpError> {
        if let Some(err) = self.error {
            return Err(err);
        }
        self.run(buf).map_err(|e| self.fail(e))
    }

    fn run(&mut self, buf: &mut [u8]) -> Result<usize, HttpError> {
        loop {
            match self.state {
                HttpState::ReqLine => self.on_request_line(buf)?,
                HttpState::Headers => self.on_header_line(buf)?,
                HttpState::BodyContentLength => self.on_content_length_body(buf)?,
                HttpState::BodyChunkSize => self.on_chunk_size(buf)?,
                HttpState::BodyChunkData => self.on_chunk_data(buf)?,
                HttpState::BodyChunkTrailers => self.on_trailer_line(buf)?,
                HttpState::Done => return Ok(self.pos),
                HttpState::Error => return Err(self.error.unwrap_or(HttpError::BadRequest)),
            }
        }
    }

    fn on_request_line(&mut self, buf: &[u8]) -> Result<(), HttpError> {
        self.pos = parser::skip_leading_crlf(buf, self.pos);
        let (line, next) = parser::parse_request_line(buf, self.pos)?;
        self.request.line = line;
        self.pos = next;
        self.set_state(HttpState::Headers);
        Ok(())
    }

    fn on_header_line(&mut self, buf: &[u8]) -> Result<(), HttpError> {
        match parser::parse_header_line(buf, self.pos, self.limits.max_field_len)? {
            HeaderLine::Field(header, next) => {
                if self.request.header_count() >= self.limits.max_headers {
                    return Err(HttpError::TooManyHeaders);
                }
                let name = header.name.slice(buf);
                let value = header.value.slice(buf);
                if name.eq_ignore_ascii_case(b"content-length") {
                    self.content_length = parser::parse_decimal(value).ok_or(HttpError::BadRequest)?;
                    self.has_content_length = true;
                } else if name.eq_ignore_ascii_case(b"transfer-encoding") {
                    self.is_chunked = parser::contains_ignore_case(value, b"chunked");
                }
                self.request.push_header(header);
                self.pos = next;
            }
            HeaderLine::End(next) => {
                self.pos = next;
                self.begin_body()?;
            }
        }
        Ok(())
    }

    fn begin_body(&mut self) -> Result<(), HttpError> {
        self.body_start = self.pos;
        self.body_written = 0;
        self.request.body = Span::new(self.pos, 0);
        if self.has_content_length {
            self.request.content_length = Some(self.content_length);
        }

        if self.is_chunked && self.has_content_length && self.limits.framing_conflict == FramingConflict::Reject {
            debug!("http: both Transfer-Encoding: chunked and Content-Length present");
            return Err(HttpError::BadRequest);
        }

        if self.is_chunked {
            self.request.chunked = true;
            self.set_state(HttpState::BodyChunkSize);
        } else if self.has_content_length && self.content_length > 0 {
            self.set_state(HttpState::BodyContentLength);
        } else {
            self.set_state(HttpState::Done);
        }
        Ok(())
    }

    fn on_content_length_body(&mut self, buf: &[u8]) -> Result<(), HttpError> {
        let available = buf.len().saturating_sub(self.body_start);
        self.body_written = available;
        if (available as u64) < self.content_length {
            return Err(HttpError::Truncated);
        }
        // content_length <= available, so it fits in usize
        let len = self.content_length as usize;
        self.request.body = Span::new(self.body_start, len);
        self.body_written = len;
        self.pos = self.body_start + len;
        self.set_state(HttpState::Done);
        Ok(())
    }

    fn on_chunk_size(&mut self, buf: &[u8]) -> Result<(), HttpError> {
        let (size, next) = parser::parse_chunk_size_line(buf, self.pos, MAX_CHUNK_LINE_LEN)?;
        self.pos = next;
        if size == 0 {
            self.set_state(HttpState::BodyChunkTrailers);
        } else {
            self.chunk_bytes_remaining = size;
            self.set_state(HttpState::BodyChunkData);
        }
        Ok(())
    }

    fn on_chunk_data(&mut self, buf: &mut [u8]) -> Result<(), HttpError> {
        if self.chunk_bytes_remaining > 0 {
            let available = buf.len().saturating_sub(self.pos);
            let n = (available as u64).min(self.chunk_bytes_remaining) as usize;
            if n > 0 {
                let dst = self.body_start + self.body_written;
                buf.copy_within(self.pos..self.pos + n, dst);
                self.body_written += n;
                self.pos += n;
                self.chunk_bytes_remaining -= n as u64;
                self.request.body = Span::new(self.body_start, self.body_written);
            }
            if self.chunk_bytes_remaining > 0 {
                return Err(HttpError::Truncated);
            }
        }

        match buf.get(self.pos..self.pos + 2) {
            Some(b"\r\n") => {
                self.pos += 2;
                self.set_state(HttpState::BodyChunkSize);
                Ok(())
            }
            Some(_) => Err(HttpError::BadRequest),
            None if buf.get(self.pos).is_some_and(|&b| b != b'\r') => Err(HttpError::BadRequest),
            None => Err(HttpError::Truncated),
        }
    }

    fn on_trailer_line(&mut self, buf: &[u8]) -> Result<(), HttpError> {
        // Trailer lines are skipped without looking inside them
        let (line_len, next) = parser::line_end(buf, self.pos, self.limits.max_field_len)?;
        self.pos = next;
        if line_len == 0 {
            self.request.body = Span::new(self.body_start, self.body_written);
            self.set_state(HttpState::Done);
        }
        Ok(())
    }
}

impl Default for HttpStream {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::ParserConfig;
    use proptest::prelude::*;

    /// Feed `raw` in pieces cut at `cuts`, returning the final buffer and result
    fn feed_in_pieces(raw: &[u8], cuts: &[usize]) -> (Vec<u8>, Result<usize, HttpError>, HttpStream) {
        let mut stream = HttpStream::new();
        let mut buf = Vec::new();
        let mut last = 0;
        for &cut in cuts.iter().chain(std::iter::once(&raw.len())) {
            let cut = cut.clamp(last, raw.len());
            buf.extend_from_slice(&raw[last..cut]);
            last = cut;
            match stream.execute(&mut buf) {
                Err(HttpError::Truncated) => continue,
                other => return (buf, other, stream),
            }
        }
        let result = stream.execute(&mut buf);
        (buf, result, stream)
    }

    #[test]
    fn test_byte_at_a_time_get() {
        let raw = b"GET /a HTTP/1.1\r\nHost: h\r\nAccept: */*\r\n\r\n";
        let cuts: Vec<usize> = (1..raw.len()).collect();
        let (buf, result, stream) = feed_in_pieces(raw, &cuts);
        assert_eq!(result, Ok(raw.len()));
        let req = stream.request().unwrap();
        assert_eq!(req.header_count(), 2);
        assert_eq!(req.header(&buf, "accept"), Some(&b"*/*"[..]));
    }

    #[test]
    fn test_truncated_does_not_duplicate_headers() {
        let raw = b"GET / HTTP/1.1\r\nA: 1\r\nB: 2\r\n\r\n";
        let mut stream = HttpStream::new();
        let mut buf = raw[..25].to_vec();
        assert_eq!(stream.execute(&mut buf), Err(HttpError::Truncated));
        assert_eq!(stream.execute(&mut buf), Err(HttpError::Truncated));
        buf.extend_from_slice(&raw[25..]);
        assert!(stream.execute(&mut buf).is_ok());
        assert_eq!(stream.request().unwrap().header_count(), 2);
    }

    #[test]
    fn test_content_length_accumulates() {
        let raw = b"PUT /x HTTP/1.1\r\nContent-Length: 10\r\n\r\n0123456789";
        let mut stream = HttpStream::new();
        let mut buf = raw[..raw.len() - 4].to_vec();
        assert_eq!(stream.execute(&mut buf), Err(HttpError::Truncated));
        assert_eq!(stream.state(), HttpState::BodyContentLength);
        buf.extend_from_slice(&raw[raw.len() - 4..]);
        assert_eq!(stream.execute(&mut buf), Ok(raw.len()));
        assert_eq!(stream.request().unwrap().body(&buf), b"0123456789");
    }

    #[test]
    fn test_content_length_zero_is_done() {
        let mut buf = b"POST / HTTP/1.1\r\nContent-Length: 0\r\n\r\n".to_vec();
        let mut stream = HttpStream::new();
        assert!(stream.execute(&mut buf).is_ok());
        assert_eq!(stream.request().unwrap().content_length, Some(0));
    }

    #[test]
    fn test_chunk_crlf_split_across_calls() {
        let raw = b"POST / HTTP/1.1\r\nTransfer-Encoding: chunked\r\n\r\n3\r\nabc\r\n0\r\n\r\n";
        let data_end = raw.len() - b"\r\n0\r\n\r\n".len();

        let mut stream = HttpStream::new();
        let mut buf = raw[..data_end].to_vec();
        assert_eq!(stream.execute(&mut buf), Err(HttpError::Truncated));
        buf.push(b'\r');
        assert_eq!(stream.execute(&mut buf), Err(HttpError::Truncated));
        buf.extend_from_slice(&raw[data_end + 1..]);
        assert_eq!(stream.execute(&mut buf), Ok(raw.len()));
        assert_eq!(stream.request().unwrap().body(&buf), b"abc");
    }

    #[test]
    fn test_chunk_missing_crlf_is_bad_request() {
        let mut buf = b"POST / HTTP/1.1\r\nTransfer-Encoding: chunked\r\n\r\n3\r\nabcX\r\n0\r\n\r\n".to_vec();
        let mut stream = HttpStream::new();
        assert_eq!(stream.execute(&mut buf), Err(HttpError::BadRequest));
    }

    #[test]
    fn test_chunked_with_extensions_and_trailers() {
        let mut buf = b"POST / HTTP/1.1\r\nTransfer-Encoding: gzip, chunked\r\n\r\n\
            5;name=val\r\nhello\r\n1\r\n!\r\n0\r\nExpires: never\r\nX-Sum: 1\r\n\r\n"
            .to_vec();
        let total = buf.len();
        let mut stream = HttpStream::new();
        assert_eq!(stream.execute(&mut buf), Ok(total));
        let req = stream.request().unwrap();
        assert_eq!(req.body(&buf), b"hello!");
        // trailers are not headers
        assert_eq!(req.header_count(), 1);
    }

    #[test]
    fn test_trailer_lines_are_discarded_unparsed() {
        let raw = b"POST / HTTP/1.1\r\nTransfer-Encoding: chunked\r\n\r\n\
            2\r\nok\r\n0\r\nnot a header line\r\n: odd\r\n\r\n";
        let cuts: Vec<usize> = (1..raw.len()).collect();
        let (buf, result, stream) = feed_in_pieces(raw, &cuts);
        assert_eq!(result, Ok(raw.len()));
        assert_eq!(stream.request().unwrap().body(&buf), b"ok");
    }

    #[test]
    fn test_long_chunk_extension_whole_or_split() {
        let mut raw = b"POST / HTTP/1.1\r\nTransfer-Encoding: chunked\r\n\r\n3;ext=".to_vec();
        raw.extend(vec![b'a'; 2000]);
        let cr = raw.len();
        raw.extend_from_slice(b"\r\nabc\r\n0\r\n\r\n");

        let (_, whole, _) = feed_in_pieces(&raw, &[]);
        let (_, split, _) = feed_in_pieces(&raw, &[cr]);
        assert_eq!(whole, Err(HttpError::BadRequest));
        assert_eq!(split, whole);
    }

    #[test]
    fn test_padded_header_value_whole_or_split() {
        let config = ParserConfig {
            max_header_field_len: 16,
            ..Default::default()
        };
        let mut raw = b"GET / HTTP/1.1\r\nX-Pad: ".to_vec();
        raw.extend(vec![b'v'; 16]);
        raw.extend(vec![b' '; 100]);
        let cr = raw.len();
        raw.extend_from_slice(b"\r\n\r\n");

        for cuts in [&[][..], &[cr][..]] {
            let mut stream = HttpStream::with_limits(config.http_limits());
            let mut buf = Vec::new();
            let mut last = 0;
            let mut result = Err(HttpError::Truncated);
            for &cut in cuts.iter().chain(std::iter::once(&raw.len())) {
                buf.extend_from_slice(&raw[last..cut]);
                last = cut;
                result = stream.execute(&mut buf);
                if result != Err(HttpError::Truncated) {
                    break;
                }
            }
            assert_eq!(result, Ok(raw.len()), "cuts={:?}", cuts);
            assert_eq!(stream.request().unwrap().header(&buf, "x-pad"), Some(&[b'v'; 16][..]));
        }
    }

    #[test]
    fn test_later_transfer_encoding_overwrites() {
        let mut buf = b"POST / HTTP/1.1\r\nTransfer-Encoding: chunked\r\nTransfer-Encoding: identity\r\nContent-Length: 2\r\n\r\nok"
            .to_vec();
        let mut stream = HttpStream::new();
        assert!(stream.execute(&mut buf).is_ok());
        let req = stream.request().unwrap();
        assert!(!req.chunked);
        assert_eq!(req.body(&buf), b"ok");
    }

    #[test]
    fn test_too_many_headers() {
        let mut raw = b"GET / HTTP/1.1\r\n".to_vec();
        for i in 0..33 {
            raw.extend_from_slice(format!("H{}: v\r\n", i).as_bytes());
        }
        raw.extend_from_slice(b"\r\n");
        let mut stream = HttpStream::new();
        assert_eq!(stream.execute(&mut raw), Err(HttpError::TooManyHeaders));
        assert_eq!(stream.state(), HttpState::Error);
    }

    #[test]
    fn test_configured_header_limit() {
        let config = ParserConfig {
            max_headers: 1,
            ..Default::default()
        };
        let mut buf = b"GET / HTTP/1.1\r\nA: 1\r\nB: 2\r\n\r\n".to_vec();
        let mut stream = HttpStream::with_limits(config.http_limits());
        assert_eq!(stream.execute(&mut buf), Err(HttpError::TooManyHeaders));
    }

    #[test]
    fn test_error_is_sticky() {
        let mut buf = b"G(T / HTTP/1.1\r\n\r\n".to_vec();
        let mut stream = HttpStream::new();
        assert_eq!(stream.execute(&mut buf), Err(HttpError::BadRequest));
        let mut fine = b"GET / HTTP/1.1\r\n\r\n".to_vec();
        assert_eq!(stream.execute(&mut fine), Err(HttpError::BadRequest));
        assert_eq!(stream.error(), Some(HttpError::BadRequest));
        stream.reset();
        assert!(stream.execute(&mut fine).is_ok());
    }

    #[test]
    fn test_invalid_content_length() {
        let mut buf = b"POST / HTTP/1.1\r\nContent-Length: 1x\r\n\r\n".to_vec();
        assert_eq!(HttpStream::new().execute(&mut buf), Err(HttpError::BadRequest));
    }

    #[test]
    fn test_huge_content_length_saturates() {
        let mut buf = b"POST / HTTP/1.1\r\nContent-Length: 999999999999999999999999\r\n\r\nabc".to_vec();
        let mut stream = HttpStream::new();
        assert_eq!(stream.execute(&mut buf), Err(HttpError::Truncated));
        assert_eq!(stream.state(), HttpState::BodyContentLength);
    }

    #[test]
    fn test_done_is_idempotent() {
        let mut buf = b"GET / HTTP/1.1\r\n\r\nGET /next".to_vec();
        let mut stream = HttpStream::new();
        assert_eq!(stream.execute(&mut buf), Ok(18));
        assert_eq!(stream.execute(&mut buf), Ok(18));
    }

    fn request_strategy() -> impl Strategy<Value = Vec<u8>> {
        let body = proptest::collection::vec(any::<u8>(), 0..200);
        let chunk = 1usize..50;
        (body, chunk, any::<bool>()).prop_map(|(body, chunk, chunked)| {
            let mut raw = b"POST /upload?q=1 HTTP/1.1\r\nHost: example.com\r\nX-Id: 42\r\n".to_vec();
            if chunked {
                raw.extend_from_slice(b"Transfer-Encoding: chunked\r\n\r\n");
                crate::protocols::http::encode_chunked(&body, chunk, &mut raw);
            } else {
                raw.extend_from_slice(format!("Content-Length: {}\r\n\r\n", body.len()).as_bytes());
                raw.extend_from_slice(&body);
            }
            raw
        })
    }

    proptest! {
        #[test]
        fn prop_chunk_boundary_independence(raw in request_strategy(), mut cuts in proptest::collection::vec(0usize..400, 0..12)) {
            cuts.sort_unstable();
            let mut whole = raw.clone();
            let expected = crate::protocols::http::parse(&mut whole).unwrap();

            let (buf, result, stream) = feed_in_pieces(&raw, &cuts);
            prop_assert_eq!(result, Ok(raw.len()));
            let req = stream.request().unwrap();
            prop_assert_eq!(req.method(&buf), expected.method(&whole));
            prop_assert_eq!(req.uri(&buf), expected.uri(&whole));
            prop_assert_eq!(req.version(), expected.version());
            let got: Vec<_> = req.headers(&buf).collect();
            let want: Vec<_> = expected.headers(&whole).collect();
            prop_assert_eq!(got, want);
            prop_assert_eq!(req.body(&buf), expected.body(&whole));
        }
    }
}
