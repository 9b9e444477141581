//! UDP Envelope Extraction
//!
//! Pulls the UDP datagram out of a raw IPv4 or IPv6 packet. IPv4 options
//! are skipped using the IHL; IPv6 extension headers are not followed, so a
//! packet whose next header is not UDP is reported as `NotUdp`.

use std::net::{IpAddr, Ipv4Addr, Ipv6Addr};

use thiserror::Error;

use crate::error::{ErrorKind, ParseError};

pub const IPV4_MIN_HEADER_LEN: usize = 20;
pub const IPV6_HEADER_LEN: usize = 40;
pub const UDP_HEADER_LEN: usize = 8;
pub const PROTO_UDP: u8 = 17;

/// UDP/IP parse status
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
#[repr(i32)]
pub enum UdpError {
    #[error("packet truncated")]
    Truncated = -1,
    #[error("malformed IP header")]
    BadIp = -2,
    #[error("malformed UDP header")]
    BadUdp = -3,
    #[error("not a UDP packet")]
    NotUdp = -4,
}

impl ParseError for UdpError {
    fn code(&self) -> i32 {
        *self as i32
    }

    fn kind(&self) -> ErrorKind {
        match self {
            UdpError::Truncated => ErrorKind::Recoverable,
            UdpError::BadIp | UdpError::BadUdp => ErrorKind::Malformed,
            UdpError::NotUdp => ErrorKind::DomainMismatch,
        }
    }
}

/// A UDP datagram and the addresses it travelled between
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct UdpPacket<'a> {
    pub src_addr: IpAddr,
    pub dst_addr: IpAddr,
    /// IP header length, options included
    pub ip_header_len: usize,
    pub src_port: u16,
    pub dst_port: u16,
    /// UDP length field (header plus payload)
    pub length: u16,
    pub checksum: u16,
    pub payload: &'a [u8],
}

fn be16(b: &[u8], at: usize) -> u16 {
    u16::from_be_bytes([b[at], b[at + 1]])
}

/// Decode the UDP header at `udp_start`; `limit` is where the IP payload ends
fn parse_udp<'a>(
    buf: &'a [u8],
    udp_start: usize,
    limit: usize,
    src_addr: IpAddr,
    dst_addr: IpAddr,
) -> Result<UdpPacket<'a>, UdpError> {
    let header = buf
        .get(udp_start..udp_start + UDP_HEADER_LEN)
        .ok_or(UdpError::Truncated)?;
    let length = be16(header, 4);
    let udp_len = usize::from(length);
    if udp_len < UDP_HEADER_LEN || udp_start + udp_len > limit {
        return Err(UdpError::BadUdp);
    }
    let payload = buf
        .get(udp_start + UDP_HEADER_LEN..udp_start + udp_len)
        .ok_or(UdpError::Truncated)?;
    Ok(UdpPacket {
        src_addr,
        dst_addr,
        ip_header_len: udp_start,
        src_port: be16(header, 0),
        dst_port: be16(header, 2),
        length,
        checksum: be16(header, 6),
        payload,
    })
}

/// Extract UDP from an IPv4 packet
pub fn parse_ipv4(buf: &[u8]) -> Result<UdpPacket<'_>, UdpError> {
    if buf.len() < IPV4_MIN_HEADER_LEN + UDP_HEADER_LEN {
        return Err(UdpError::Truncated);
    }
    let version = buf[0] >> 4;
    let ihl = usize::from(buf[0] & 0x0F) * 4;
    if version != 4 || ihl < IPV4_MIN_HEADER_LEN {
        return Err(UdpError::BadIp);
    }
    let total_len = usize::from(be16(buf, 2));
    if total_len < ihl + UDP_HEADER_LEN {
        return Err(UdpError::BadIp);
    }
    if buf.len() < total_len {
        return Err(UdpError::Truncated);
    }
    if buf[9] != PROTO_UDP {
        return Err(UdpError::NotUdp);
    }
    let src = Ipv4Addr::new(buf[12], buf[13], buf[14], buf[15]);
    let dst = Ipv4Addr::new(buf[16], buf[17], buf[18], buf[19]);
    parse_udp(buf, ihl, total_len, IpAddr::V4(src), IpAddr::V4(dst))
}

/// Extract UDP from an IPv6 packet without extension headers
pub fn parse_ipv6(buf: &[u8]) -> Result<UdpPacket<'_>, UdpError> {
    if buf.len() < IPV6_HEADER_LEN + UDP_HEADER_LEN {
        return Err(UdpError::Truncated);
    }
    if buf[0] >> 4 != 6 {
        return Err(UdpError::BadIp);
    }
    if buf[6] != PROTO_UDP {
        return Err(UdpError::NotUdp);
    }
    let total_len = IPV6_HEADER_LEN + usize::from(be16(buf, 4));
    if buf.len() < total_len {
        return Err(UdpError::Truncated);
    }
    let mut src = [0u8; 16];
    let mut dst = [0u8; 16];
    src.copy_from_slice(&buf[8..24]);
    dst.copy_from_slice(&buf[24..40]);
    parse_udp(
        buf,
        IPV6_HEADER_LEN,
        total_len,
        IpAddr::V6(Ipv6Addr::from(src)),
        IpAddr::V6(Ipv6Addr::from(dst)),
    )
}

/// Dispatch on the IP version nibble
pub fn parse(buf: &[u8]) -> Result<UdpPacket<'_>, UdpError> {
    match buf.first().map(|b| b >> 4) {
        None => Err(UdpError::Truncated),
        Some(4) => parse_ipv4(buf),
        Some(6) => parse_ipv6(buf),
        Some(_) => Err(UdpError::BadIp),
    }
}
