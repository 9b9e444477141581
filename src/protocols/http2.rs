//! HTTP/2 Detection
//!
//! Connection-preface matching and frame-header decoding only; there is no
//! stream multiplexing or HPACK here.

use thiserror::Error;

use crate::error::{ErrorKind, ParseError};

/// Client connection preface
pub const PREFACE: &[u8; 24] = b"PRI * HTTP/2.0\r\n\r\nSM\r\n\r\n";

/// Fixed frame header size
pub const FRAME_HEADER_LEN: usize = 9;

/// Whether `buf` starts with the full client preface
pub fn is_preface(buf: &[u8]) -> bool {
    buf.starts_with(PREFACE)
}

/// Whether `buf` is a (possibly incomplete) prefix of the preface
pub fn may_be_preface(buf: &[u8]) -> bool {
    let n = buf.len().min(PREFACE.len());
    buf[..n] == PREFACE[..n]
}

/// Frame types from RFC 7540 section 6
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FrameType {
    Data,
    Headers,
    Priority,
    RstStream,
    Settings,
    PushPromise,
    Ping,
    GoAway,
    WindowUpdate,
    Continuation,
    /// Extension types are ignored by receivers, not rejected
    Unknown(u8),
}

impl From<u8> for FrameType {
    fn from(byte: u8) -> Self {
        match byte {
            0x0 => FrameType::Data,
            0x1 => FrameType::Headers,
            0x2 => FrameType::Priority,
            0x3 => FrameType::RstStream,
            0x4 => FrameType::Settings,
            0x5 => FrameType::PushPromise,
            0x6 => FrameType::Ping,
            0x7 => FrameType::GoAway,
            0x8 => FrameType::WindowUpdate,
            0x9 => FrameType::Continuation,
            other => FrameType::Unknown(other),
        }
    }
}

/// Decoded 9-byte frame header
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FrameHeader {
    /// Payload length (24 bits)
    pub length: u32,
    pub frame_type: FrameType,
    pub flags: u8,
    /// Stream identifier with the reserved bit cleared
    pub stream_id: u32,
}

impl FrameHeader {
    pub const FLAG_END_STREAM: u8 = 0x1;
    pub const FLAG_ACK: u8 = 0x1;
    pub const FLAG_END_HEADERS: u8 = 0x4;
    pub const FLAG_PADDED: u8 = 0x8;
    pub const FLAG_PRIORITY: u8 = 0x20;

    pub fn has_flag(&self, flag: u8) -> bool {
        self.flags & flag != 0
    }
}

/// HTTP/2 parse status
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
#[repr(i32)]
pub enum Http2Error {
    #[error("frame header truncated")]
    Truncated = -1,
}

impl ParseError for Http2Error {
    fn code(&self) -> i32 {
        *self as i32
    }

    fn kind(&self) -> ErrorKind {
        ErrorKind::Recoverable
    }
}

/// Decode the frame header at the start of `buf`
pub fn parse_frame_header(buf: &[u8]) -> Result<FrameHeader, Http2Error> {
    let h: &[u8; FRAME_HEADER_LEN] = buf
        .get(..FRAME_HEADER_LEN)
        .and_then(|s| s.try_into().ok())
        .ok_or(Http2Error::Truncated)?;
    Ok(FrameHeader {
        length: u32::from_be_bytes([0, h[0], h[1], h[2]]),
        frame_type: FrameType::from(h[3]),
        flags: h[4],
        stream_id: u32::from_be_bytes([h[5], h[6], h[7], h[8]]) & 0x7fff_ffff,
    })
}
