//! WebSocket Frame Parser
//!
//! RFC 6455 framing, decoded in one shot from a byte buffer:
//! - FIN / RSV / opcode byte
//! - MASK bit with 7, 16 or 64-bit payload length
//! - optional 4-byte masking key
//! - payload, borrowed from the input
//!
//! Unmasking is never done implicitly. Call [`unmask`] (or
//! [`unmask_payload`]) on a mutable buffer once the frame is known to be
//! complete. The opening handshake helpers ([`accept_key`],
//! [`validate_upgrade`]) work on a request parsed by the HTTP module.

use base64_simd::STANDARD;
use log::debug;
use sha1::{Digest, Sha1};
use thiserror::Error;

use crate::config::WsLimits;
use crate::error::{ErrorKind, ParseError};
use crate::protocols::http::{HttpRequest, HttpVersion};
use crate::scan;

/// GUID appended to the client key before hashing
pub const WS_GUID: &str = "258EAFA5-E914-47DA-95CA-C5AB0DC85B11";

/// Control frame payloads may not exceed this
pub const MAX_CONTROL_PAYLOAD: u64 = 125;

/// WebSocket opcode
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum WsOpcode {
    /// Continuation frame
    Continuation = 0x0,
    /// Text frame (UTF-8)
    Text = 0x1,
    /// Binary frame
    Binary = 0x2,
    /// Connection close
    Close = 0x8,
    /// Ping
    Ping = 0x9,
    /// Pong
    Pong = 0xA,
}

impl WsOpcode {
    /// Close, Ping and Pong
    pub fn is_control(self) -> bool {
        (self as u8) & 0x8 != 0
    }
}

impl TryFrom<u8> for WsOpcode {
    type Error = WsError;

    fn try_from(byte: u8) -> Result<Self, WsError> {
        match byte & 0x0F {
            0x0 => Ok(WsOpcode::Continuation),
            0x1 => Ok(WsOpcode::Text),
            0x2 => Ok(WsOpcode::Binary),
            0x8 => Ok(WsOpcode::Close),
            0x9 => Ok(WsOpcode::Ping),
            0xA => Ok(WsOpcode::Pong),
            _ => Err(WsError::Invalid),
        }
    }
}

/// Close status codes (RFC 6455 section 7.4.1)
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CloseCode {
    Normal,
    GoingAway,
    ProtocolError,
    Unsupported,
    Reserved,
    NoStatus,
    Abnormal,
    InvalidPayload,
    PolicyViolation,
    TooBig,
    MandatoryExtension,
    InternalError,
    Other(u16),
}

impl From<u16> for CloseCode {
    fn from(code: u16) -> Self {
        match code {
            1000 => CloseCode::Normal,
            1001 => CloseCode::GoingAway,
            1002 => CloseCode::ProtocolError,
            1003 => CloseCode::Unsupported,
            1004 => CloseCode::Reserved,
            1005 => CloseCode::NoStatus,
            1006 => CloseCode::Abnormal,
            1007 => CloseCode::InvalidPayload,
            1008 => CloseCode::PolicyViolation,
            1009 => CloseCode::TooBig,
            1010 => CloseCode::MandatoryExtension,
            1011 => CloseCode::InternalError,
            other => CloseCode::Other(other),
        }
    }
}

impl From<CloseCode> for u16 {
    fn from(code: CloseCode) -> u16 {
        match code {
            CloseCode::Normal => 1000,
            CloseCode::GoingAway => 1001,
            CloseCode::ProtocolError => 1002,
            CloseCode::Unsupported => 1003,
            CloseCode::Reserved => 1004,
            CloseCode::NoStatus => 1005,
            CloseCode::Abnormal => 1006,
            CloseCode::InvalidPayload => 1007,
            CloseCode::PolicyViolation => 1008,
            CloseCode::TooBig => 1009,
            CloseCode::MandatoryExtension => 1010,
            CloseCode::InternalError => 1011,
            CloseCode::Other(c) => c,
        }
    }
}

/// WebSocket parse status
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
#[repr(i32)]
pub enum WsError {
    #[error("frame truncated")]
    Truncated = -1,
    #[error("invalid frame")]
    Invalid = -2,
    #[error("frame payload too large")]
    TooLarge = -3,
}

impl ParseError for WsError {
    fn code(&self) -> i32 {
        *self as i32
    }

    fn kind(&self) -> ErrorKind {
        match self {
            WsError::Truncated => ErrorKind::Recoverable,
            WsError::Invalid => ErrorKind::Malformed,
            WsError::TooLarge => ErrorKind::ResourceLimit,
        }
    }
}

/// Everything before the payload
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WsFrameHeader {
    pub fin: bool,
    /// RSV1..RSV3 in the low three bits
    pub rsv: u8,
    pub opcode: WsOpcode,
    pub mask_key: Option<[u8; 4]>,
    pub payload_len: u64,
    /// Bytes before the payload (2 to 14)
    pub header_len: usize,
}

impl WsFrameHeader {
    pub fn is_masked(&self) -> bool {
        self.mask_key.is_some()
    }

    /// Header plus payload
    pub fn frame_len(&self) -> u64 {
        self.header_len as u64 + self.payload_len
    }
}

/// A complete frame with its payload borrowed from the input
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WsFrame<'a> {
    pub header: WsFrameHeader,
    /// Still masked if `header.mask_key` is set
    pub payload: &'a [u8],
}

impl<'a> WsFrame<'a> {
    pub fn fin(&self) -> bool {
        self.header.fin
    }

    pub fn opcode(&self) -> WsOpcode {
        self.header.opcode
    }
}

/// Decode just the frame header at the start of `buf`
pub fn parse_frame_header(buf: &[u8], limits: WsLimits) -> Result<WsFrameHeader, WsError> {
    let (&b0, &b1) = match buf {
        [b0, b1, ..] => (b0, b1),
        [b0] => {
            WsOpcode::try_from(*b0)?;
            return Err(WsError::Truncated);
        }
        [] => return Err(WsError::Truncated),
    };

    let fin = b0 & 0x80 != 0;
    let rsv = (b0 >> 4) & 0x07;
    let opcode = WsOpcode::try_from(b0)?;
    let masked = b1 & 0x80 != 0;

    let (payload_len, mut pos) = match b1 & 0x7F {
        126 => {
            let ext = buf.get(2..4).ok_or(WsError::Truncated)?;
            (u64::from(u16::from_be_bytes([ext[0], ext[1]])), 4)
        }
        127 => {
            let ext: [u8; 8] = buf
                .get(2..10)
                .and_then(|s| s.try_into().ok())
                .ok_or(WsError::Truncated)?;
            let len = u64::from_be_bytes(ext);
            if len >> 63 != 0 {
                return Err(WsError::Invalid);
            }
            (len, 10)
        }
        n => (u64::from(n), 2),
    };

    if opcode.is_control() && (!fin || payload_len > MAX_CONTROL_PAYLOAD) {
        return Err(WsError::Invalid);
    }
    if payload_len > limits.max_payload_len {
        debug!("websocket: payload {} exceeds limit {}", payload_len, limits.max_payload_len);
        return Err(WsError::TooLarge);
    }

    let mask_key = if masked {
        let key: [u8; 4] = buf
            .get(pos..pos + 4)
            .and_then(|s| s.try_into().ok())
            .ok_or(WsError::Truncated)?;
        pos += 4;
        Some(key)
    } else {
        None
    };

    Ok(WsFrameHeader {
        fin,
        rsv,
        opcode,
        mask_key,
        payload_len,
        header_len: pos,
    })
}

/// Decode one frame with default limits.
///
/// Returns the frame and the number of bytes it occupies in `buf`.
pub fn parse_frame(buf: &[u8]) -> Result<(WsFrame<'_>, usize), WsError> {
    parse_frame_with_limits(buf, WsLimits::default())
}

/// Decode one frame with explicit limits
pub fn parse_frame_with_limits(buf: &[u8], limits: WsLimits) -> Result<(WsFrame<'_>, usize), WsError> {
    let header = parse_frame_header(buf, limits)?;
    let available = (buf.len() - header.header_len) as u64;
    if header.payload_len > available {
        return Err(WsError::Truncated);
    }
    // payload_len <= available, so it fits in usize
    let end = header.header_len + header.payload_len as usize;
    let payload = &buf[header.header_len..end];
    Ok((WsFrame { header, payload }, end))
}

/// XOR `payload` with the masking key in place; applying it twice restores
/// the original bytes.
pub fn unmask(payload: &mut [u8], key: [u8; 4]) {
    scan::xor_stream(payload, key);
}

/// Unmask the payload of the frame at the start of `buf`, if it is masked.
///
/// Returns the payload range within `buf`.
pub fn unmask_payload(buf: &mut [u8], header: &WsFrameHeader) -> Result<std::ops::Range<usize>, WsError> {
    let start = header.header_len;
    let end = usize::try_from(header.frame_len()).map_err(|_| WsError::TooLarge)?;
    let payload = buf.get_mut(start..end).ok_or(WsError::Truncated)?;
    if let Some(key) = header.mask_key {
        unmask(payload, key);
    }
    Ok(start..end)
}

/// Split an (unmasked) Close payload into status code and reason
pub fn parse_close_payload(payload: &[u8]) -> Result<(Option<CloseCode>, &[u8]), WsError> {
    match payload {
        [] => Ok((None, payload)),
        [_] => Err(WsError::Invalid),
        [hi, lo, reason @ ..] => Ok((Some(CloseCode::from(u16::from_be_bytes([*hi, *lo]))), reason)),
    }
}

/// `Sec-WebSocket-Accept` for a client's `Sec-WebSocket-Key`
pub fn accept_key(client_key: &[u8]) -> String {
    let mut hasher = Sha1::new();
    hasher.update(client_key);
    hasher.update(WS_GUID.as_bytes());
    STANDARD.encode_to_string(hasher.finalize())
}

/// Why an upgrade request was refused
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum UpgradeError {
    #[error("upgrade requires GET")]
    NotGet,
    #[error("upgrade requires HTTP/1.1 or later")]
    OldHttpVersion,
    #[error("missing Upgrade: websocket")]
    MissingUpgrade,
    #[error("Connection header lacks upgrade")]
    MissingConnectionUpgrade,
    #[error("unsupported Sec-WebSocket-Version")]
    UnsupportedVersion,
    #[error("missing Sec-WebSocket-Key")]
    MissingKey,
}

fn has_token(value: &[u8], token: &[u8]) -> bool {
    value
        .split(|&b| b == b',')
        .any(|t| t.trim_ascii().eq_ignore_ascii_case(token))
}

/// Check a parsed request is a valid opening handshake; returns the client key
pub fn validate_upgrade<'a>(req: &HttpRequest, buf: &'a [u8]) -> Result<&'a [u8], UpgradeError> {
    if req.method(buf) != b"GET" {
        return Err(UpgradeError::NotGet);
    }
    if req.version() < HttpVersion::HTTP_11 {
        return Err(UpgradeError::OldHttpVersion);
    }
    if !req.header(buf, "upgrade").is_some_and(|v| has_token(v, b"websocket")) {
        return Err(UpgradeError::MissingUpgrade);
    }
    if !req.header(buf, "connection").is_some_and(|v| has_token(v, b"upgrade")) {
        return Err(UpgradeError::MissingConnectionUpgrade);
    }
    if req.header(buf, "sec-websocket-version") != Some(&b"13"[..]) {
        return Err(UpgradeError::UnsupportedVersion);
    }
    match req.header(buf, "sec-websocket-key") {
        Some(key) if !key.is_empty() => Ok(key),
        _ => Err(UpgradeError::MissingKey),
    }
}
