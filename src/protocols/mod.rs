//! Protocol Decoders for netsift
//!
//! This module provides decoders for:
//! - HTTP/1.x - incremental request parsing with pipelining
//! - HTTP/2 - connection preface and frame headers
//! - WebSocket - RFC 6455 framing and handshake helpers
//! - DNS - messages with name decompression
//! - TLS - ClientHello with SNI/ALPN extraction
//! - ICMP - checksum-verified messages
//! - UDP - datagrams inside IPv4/IPv6 packets
//!
//! [`detect`] sniffs which stream protocol a connection is speaking from
//! its first bytes, using only the cheap gates each decoder offers.

pub mod dns;
pub mod http;
pub mod http2;
pub mod icmp;
pub mod tls;
pub mod udp;
pub mod websocket;

use crate::telemetry;

/// Stream protocols recognizable from a connection's first bytes
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Protocol {
    Tls,
    Http2,
    Http1,
}

impl Protocol {
    pub fn as_str(self) -> &'static str {
        match self {
            Protocol::Tls => "tls",
            Protocol::Http2 => "http/2",
            Protocol::Http1 => "http/1.1",
        }
    }
}

/// Longest method token considered when sniffing HTTP/1.x
const MAX_SNIFF_METHOD_LEN: usize = 16;

/// An upper-case method token followed by a space
fn looks_like_http1(buf: &[u8]) -> bool {
    let window = &buf[..buf.len().min(MAX_SNIFF_METHOD_LEN + 1)];
    let method_len = crate::scan::find_char(window, b' ');
    method_len > 0
        && method_len < window.len()
        && window[..method_len].iter().all(|b| b.is_ascii_uppercase())
}

/// Classify a stream prefix.
///
/// Returns `None` when the bytes seen so far are not enough to decide or
/// match nothing known.
pub fn detect(buf: &[u8]) -> Option<Protocol> {
    let found = if buf.is_empty() {
        None
    } else if tls::is_handshake(buf) {
        Some(Protocol::Tls)
    } else if http2::is_preface(buf) {
        Some(Protocol::Http2)
    } else if http2::may_be_preface(buf) {
        None
    } else if looks_like_http1(buf) {
        Some(Protocol::Http1)
    } else {
        None
    };

    if let Some(p) = found {
        telemetry::detected(p.as_str()).emit();
    }
    found
}
