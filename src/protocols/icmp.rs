//! ICMP Parser
//!
//! Decodes the fixed 8-byte ICMPv4 header and verifies the Internet
//! checksum (RFC 1071) over the whole message before returning anything.
//! Identifier and sequence number are only meaningful for echo messages.

use thiserror::Error;

use crate::error::{ErrorKind, ParseError};

pub const HEADER_LEN: usize = 8;

/// ICMP parse status
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
#[repr(i32)]
pub enum IcmpError {
    #[error("packet truncated")]
    Truncated = -1,
    #[error("invalid packet")]
    Invalid = -2,
    #[error("checksum mismatch")]
    Checksum = -3,
}

impl ParseError for IcmpError {
    fn code(&self) -> i32 {
        *self as i32
    }

    fn kind(&self) -> ErrorKind {
        match self {
            IcmpError::Truncated => ErrorKind::Recoverable,
            IcmpError::Invalid | IcmpError::Checksum => ErrorKind::Malformed,
        }
    }
}

/// ICMP message types
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IcmpType {
    EchoReply,
    DestinationUnreachable,
    SourceQuench,
    Redirect,
    EchoRequest,
    TimeExceeded,
    ParameterProblem,
    Timestamp,
    TimestampReply,
    Other(u8),
}

impl From<u8> for IcmpType {
    fn from(v: u8) -> Self {
        match v {
            0 => IcmpType::EchoReply,
            3 => IcmpType::DestinationUnreachable,
            4 => IcmpType::SourceQuench,
            5 => IcmpType::Redirect,
            8 => IcmpType::EchoRequest,
            11 => IcmpType::TimeExceeded,
            12 => IcmpType::ParameterProblem,
            13 => IcmpType::Timestamp,
            14 => IcmpType::TimestampReply,
            other => IcmpType::Other(other),
        }
    }
}

impl From<IcmpType> for u8 {
    fn from(t: IcmpType) -> u8 {
        match t {
            IcmpType::EchoReply => 0,
            IcmpType::DestinationUnreachable => 3,
            IcmpType::SourceQuench => 4,
            IcmpType::Redirect => 5,
            IcmpType::EchoRequest => 8,
            IcmpType::TimeExceeded => 11,
            IcmpType::ParameterProblem => 12,
            IcmpType::Timestamp => 13,
            IcmpType::TimestampReply => 14,
            IcmpType::Other(v) => v,
        }
    }
}

impl IcmpType {
    pub fn is_echo(self) -> bool {
        matches!(self, IcmpType::EchoRequest | IcmpType::EchoReply)
    }
}

/// Echo identifier and sequence number
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct IcmpEcho {
    pub identifier: u16,
    pub sequence: u16,
}

/// A verified ICMP message
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct IcmpPacket<'a> {
    pub icmp_type: IcmpType,
    pub code: u8,
    pub checksum: u16,
    /// Bytes 4..8 of the header, whatever the type puts there
    pub rest_of_header: [u8; 4],
    /// Present only for echo request/reply
    pub echo: Option<IcmpEcho>,
    pub payload: &'a [u8],
}

/// Ones'-complement sum of 16-bit big-endian words, folded and inverted.
///
/// An odd trailing byte is padded with zero.
pub fn internet_checksum(bytes: &[u8]) -> u16 {
    let mut sum: u32 = 0;
    let mut words = bytes.chunks_exact(2);
    for w in &mut words {
        sum += u32::from(u16::from_be_bytes([w[0], w[1]]));
    }
    if let [last] = words.remainder() {
        sum += u32::from(*last) << 8;
    }
    while sum >> 16 != 0 {
        sum = (sum & 0xffff) + (sum >> 16);
    }
    !(sum as u16)
}

/// Decode and checksum-verify the ICMP message filling `buf`
pub fn parse(buf: &[u8]) -> Result<IcmpPacket<'_>, IcmpError> {
    if buf.len() < HEADER_LEN {
        return Err(IcmpError::Truncated);
    }
    // Summing a message that includes a correct checksum yields zero
    if internet_checksum(buf) != 0 {
        return Err(IcmpError::Checksum);
    }

    let icmp_type = IcmpType::from(buf[0]);
    let code = buf[1];
    if icmp_type.is_echo() && code != 0 {
        return Err(IcmpError::Invalid);
    }
    let rest_of_header = [buf[4], buf[5], buf[6], buf[7]];
    let echo = icmp_type.is_echo().then(|| IcmpEcho {
        identifier: u16::from_be_bytes([buf[4], buf[5]]),
        sequence: u16::from_be_bytes([buf[6], buf[7]]),
    });

    Ok(IcmpPacket {
        icmp_type,
        code,
        checksum: u16::from_be_bytes([buf[2], buf[3]]),
        rest_of_header,
        echo,
        payload: &buf[HEADER_LEN..],
    })
}

/// Build an echo request or reply into `out`; returns the bytes written
pub fn write_echo(
    out: &mut [u8],
    icmp_type: IcmpType,
    echo: IcmpEcho,
    payload: &[u8],
) -> Result<usize, IcmpError> {
    if !icmp_type.is_echo() {
        return Err(IcmpError::Invalid);
    }
    let total = HEADER_LEN + payload.len();
    let msg = out.get_mut(..total).ok_or(IcmpError::Truncated)?;
    msg[0] = u8::from(icmp_type);
    msg[1] = 0;
    msg[2..4].fill(0);
    msg[4..6].copy_from_slice(&echo.identifier.to_be_bytes());
    msg[6..8].copy_from_slice(&echo.sequence.to_be_bytes());
    msg[HEADER_LEN..].copy_from_slice(payload);
    let checksum = internet_checksum(msg);
    msg[2..4].copy_from_slice(&checksum.to_be_bytes());
    Ok(total)
}
