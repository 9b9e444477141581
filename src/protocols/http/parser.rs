//! Request-line, header-line and number lexing.
//!
//! Every function takes the whole buffer plus an absolute start offset and
//! reports the absolute offset just past what it consumed, so the state
//! machine can commit progress one complete line at a time.

use super::{HttpError, HttpHeader, HttpRequestLine, HttpVersion, Span};
use crate::scan;

/// RFC 7230 tchar: visible ASCII minus separators
#[inline]
pub(crate) fn is_token_char(b: u8) -> bool {
    if b <= b' ' || b >= 0x7f {
        return false;
    }
    !matches!(
        b,
        b'(' | b')'
            | b'<'
            | b'>'
            | b'@'
            | b','
            | b';'
            | b':'
            | b'\\'
            | b'"'
            | b'/'
            | b'['
            | b']'
            | b'?'
            | b'='
            | b'{'
            | b'}'
    )
}

#[inline]
fn is_ows(b: u8) -> bool {
    b == b' ' || b == b'\t'
}

/// Shrink `span` past leading and trailing spaces/tabs
fn trim(buf: &[u8], span: Span) -> Span {
    let bytes = span.slice(buf);
    let lead = bytes.iter().take_while(|&&b| is_ows(b)).count();
    let trail = bytes[lead..].iter().rev().take_while(|&&b| is_ows(b)).count();
    Span::new(span.start + lead, span.len - lead - trail)
}

/// Case-insensitive substring search
pub(crate) fn contains_ignore_case(haystack: &[u8], needle: &[u8]) -> bool {
    if needle.is_empty() {
        return true;
    }
    haystack
        .windows(needle.len())
        .any(|w| w.eq_ignore_ascii_case(needle))
}

/// Decimal with overflow saturation; `None` unless all bytes are digits
pub(crate) fn parse_decimal(bytes: &[u8]) -> Option<u64> {
    if bytes.is_empty() {
        return None;
    }
    let mut value: u64 = 0;
    for &b in bytes {
        if !b.is_ascii_digit() {
            return None;
        }
        value = value.saturating_mul(10).saturating_add(u64::from(b - b'0'));
    }
    Some(value)
}

/// Hex chunk size with overflow saturation.
///
/// Stops at `;` (chunk extension), space or tab. At least one digit is
/// required and nothing but hex digits may precede the stop byte.
pub(crate) fn parse_hex(bytes: &[u8]) -> Option<u64> {
    let mut value: u64 = 0;
    let mut digits = 0usize;
    for &b in bytes {
        let d = match b {
            b'0'..=b'9' => b - b'0',
            b'a'..=b'f' => b - b'a' + 10,
            b'A'..=b'F' => b - b'A' + 10,
            b';' | b' ' | b'\t' => break,
            _ => return None,
        };
        value = value.saturating_mul(16).saturating_add(u64::from(d));
        digits += 1;
    }
    (digits > 0).then_some(value)
}

/// Skip blank lines a client may send between pipelined requests
pub(crate) fn skip_leading_crlf(buf: &[u8], mut pos: usize) -> usize {
    while let Some(b'\r' | b'\n') = buf.get(pos) {
        pos += 1;
    }
    pos
}

fn check_token(bytes: &[u8]) -> Result<(), HttpError> {
    if bytes.iter().all(|&b| is_token_char(b)) {
        Ok(())
    } else {
        Err(HttpError::BadRequest)
    }
}

fn skip_spaces(buf: &[u8], mut pos: usize) -> usize {
    while buf.get(pos) == Some(&b' ') {
        pos += 1;
    }
    pos
}

/// Match `HTTP/d.d\r\n` at `pos` against whatever is available
fn parse_version(buf: &[u8], pos: usize) -> Result<(HttpVersion, usize), HttpError> {
    const SHAPE: &[u8; 10] = b"HTTP/0.0\r\n";
    let avail = &buf[pos.min(buf.len())..];
    for (i, (&have, &want)) in avail.iter().zip(SHAPE.iter()).enumerate() {
        let ok = match i {
            5 | 7 => have.is_ascii_digit(),
            _ => have == want,
        };
        if !ok {
            return Err(HttpError::BadRequest);
        }
    }
    if avail.len() < SHAPE.len() {
        return Err(HttpError::Truncated);
    }
    let version = HttpVersion {
        major: avail[5] - b'0',
        minor: avail[7] - b'0',
    };
    Ok((version, pos + SHAPE.len()))
}

/// Parse `METHOD SP URI SP HTTP/d.d CRLF` starting at `start`
pub(crate) fn parse_request_line(buf: &[u8], start: usize) -> Result<(HttpRequestLine, usize), HttpError> {
    let rest = &buf[start..];

    let method_len = scan::find_set2(rest, b' ', b'\r');
    check_token(&rest[..method_len])?;
    if method_len == rest.len() {
        return Err(HttpError::Truncated);
    }
    if rest[method_len] == b'\r' || method_len == 0 {
        return Err(HttpError::BadRequest);
    }
    let method = Span::new(start, method_len);

    let uri_start = skip_spaces(buf, method.end());
    let rest = &buf[uri_start..];
    let uri_len = scan::find_set2(rest, b' ', b'\r');
    if uri_len == rest.len() {
        return Err(HttpError::Truncated);
    }
    if rest[uri_len] == b'\r' || uri_len == 0 {
        return Err(HttpError::BadRequest);
    }
    let uri = Span::new(uri_start, uri_len);

    let version_start = skip_spaces(buf, uri.end());
    let (version, next) = parse_version(buf, version_start)?;

    Ok((HttpRequestLine { method, uri, version }, next))
}

/// One line of the header section
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum HeaderLine {
    /// `name: value CRLF`
    Field(HttpHeader, usize),
    /// The empty line closing the section
    End(usize),
}

/// Parse one header line (or the terminating CRLF) at `start`
pub(crate) fn parse_header_line(buf: &[u8], start: usize, max_field_len: usize) -> Result<HeaderLine, HttpError> {
    let rest = &buf[start..];
    match rest {
        [] | [b'\r'] => return Err(HttpError::Truncated),
        [b'\r', b'\n', ..] => return Ok(HeaderLine::End(start + 2)),
        [b'\r', ..] => return Err(HttpError::BadRequest),
        _ => {}
    }

    let name_len = scan::find_set2(rest, b':', b'\r');
    check_token(&rest[..name_len])?;
    if name_len > max_field_len {
        return Err(HttpError::BadRequest);
    }
    if name_len == rest.len() {
        return Err(HttpError::Truncated);
    }
    if rest[name_len] == b'\r' || name_len == 0 {
        return Err(HttpError::BadRequest);
    }
    let name = Span::new(start, name_len);

    let value_start = name.end() + 1;
    let rest = &buf[value_start..];
    let raw_len = scan::find_char(rest, b'\r');
    if raw_len == rest.len() {
        // The trimmed prefix can only grow as more bytes arrive
        if trim(buf, Span::new(value_start, raw_len)).len > max_field_len {
            return Err(HttpError::BadRequest);
        }
        return Err(HttpError::Truncated);
    }
    match rest.get(raw_len + 1) {
        None => return Err(HttpError::Truncated),
        Some(b'\n') => {}
        Some(_) => return Err(HttpError::BadRequest),
    }
    let value = trim(buf, Span::new(value_start, raw_len));
    if value.len > max_field_len {
        return Err(HttpError::BadRequest);
    }

    Ok(HeaderLine::Field(HttpHeader { name, value }, value_start + raw_len + 2))
}

/// Find the CRLF ending the line at `start`; returns `(line_len, next)`.
///
/// Lines longer than `max_line_len` are rejected whether or not their CR
/// has arrived yet.
pub(crate) fn line_end(buf: &[u8], start: usize, max_line_len: usize) -> Result<(usize, usize), HttpError> {
    let rest = &buf[start..];
    let line_len = scan::find_char(rest, b'\r');
    if line_len > max_line_len {
        return Err(HttpError::BadRequest);
    }
    if line_len == rest.len() {
        return Err(HttpError::Truncated);
    }
    match rest.get(line_len + 1) {
        None => Err(HttpError::Truncated),
        Some(b'\n') => Ok((line_len, start + line_len + 2)),
        Some(_) => Err(HttpError::BadRequest),
    }
}

/// Parse a `hex[;ext] CRLF` chunk-size line at `start`
pub(crate) fn parse_chunk_size_line(buf: &[u8], start: usize, max_line_len: usize) -> Result<(u64, usize), HttpError> {
    let (line_len, next) = line_end(buf, start, max_line_len)?;
    let size = parse_hex(&buf[start..start + line_len]).ok_or(HttpError::BadRequest)?;
    Ok((size, next))
}
