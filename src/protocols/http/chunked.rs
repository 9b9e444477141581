//! Chunked transfer-coding helpers.

use super::{HttpError, HttpStream};
use crate::config::HttpLimits;

/// Append `body` to `out` as a chunked envelope with chunks of at most
/// `chunk_size` bytes, followed by the terminating zero-size chunk.
pub fn encode_chunked(body: &[u8], chunk_size: usize, out: &mut Vec<u8>) {
    for chunk in body.chunks(chunk_size.max(1)) {
        out.extend_from_slice(format!("{:x}\r\n", chunk.len()).as_bytes());
        out.extend_from_slice(chunk);
        out.extend_from_slice(b"\r\n");
    }
    out.extend_from_slice(b"0\r\n\r\n");
}

/// Decode a bare chunked body in place.
///
/// On success the decoded body occupies `buf[..body_len]`; returns
/// `(body_len, consumed)` where `consumed` counts the raw bytes read,
/// trailers included.
pub fn decode_chunked(buf: &mut [u8]) -> Result<(usize, usize), HttpError> {
    let mut stream = HttpStream::chunked_body(HttpLimits::default());
    let consumed = stream.execute(buf)?;
    let body_len = stream.request().map(|r| r.body.len).unwrap_or(0);
    Ok((body_len, consumed))
}
