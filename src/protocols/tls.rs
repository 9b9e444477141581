//! TLS ClientHello Detection
//!
//! [`is_handshake`] is a two-byte gate (content type 22, major version 3)
//! meant to reject non-TLS streams before any real parsing.
//! [`parse_client_hello`] then walks the ClientHello in order: record
//! header, handshake header, version, random, session id, cipher suites,
//! compression methods and extensions. SNI (type 0) and ALPN (type 16) are
//! copied into fixed inline buffers; other extensions are skipped by length.
//!
//! Every variable-length field is checked against the declared record
//! length before it is read. Running past the declared length is `Invalid`;
//! running past the bytes received so far, while still inside the declared
//! record, is `Truncated`.

use log::trace;
use thiserror::Error;

use crate::error::{ErrorKind, ParseError};
use crate::inline::InlineBytes;

pub const CONTENT_TYPE_HANDSHAKE: u8 = 22;
pub const HANDSHAKE_CLIENT_HELLO: u8 = 1;
pub const RECORD_HEADER_LEN: usize = 5;

pub const EXT_SERVER_NAME: u16 = 0;
pub const EXT_ALPN: u16 = 16;
pub const EXT_SUPPORTED_VERSIONS: u16 = 43;

/// Capacity for the server name
pub const MAX_SNI_LEN: usize = 256;
/// Capacity for one ALPN protocol id
pub const MAX_ALPN_LEN: usize = 255;

pub type ServerName = InlineBytes<MAX_SNI_LEN>;
pub type AlpnProtocol = InlineBytes<MAX_ALPN_LEN>;

/// TLS parse status
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
#[repr(i32)]
pub enum TlsError {
    #[error("record truncated")]
    Truncated = -1,
    #[error("malformed ClientHello")]
    Invalid = -2,
    #[error("not a TLS handshake")]
    NotTls = -3,
}

impl ParseError for TlsError {
    fn code(&self) -> i32 {
        *self as i32
    }

    fn kind(&self) -> ErrorKind {
        match self {
            TlsError::Truncated => ErrorKind::Recoverable,
            TlsError::Invalid => ErrorKind::Malformed,
            TlsError::NotTls => ErrorKind::DomainMismatch,
        }
    }
}

/// Cheap gate: handshake content type and TLS major version 3
pub fn is_handshake(buf: &[u8]) -> bool {
    matches!(buf, [CONTENT_TYPE_HANDSHAKE, 3, ..])
}

/// Bounds-checked reader over a region whose declared length may exceed
/// the bytes actually received.
#[derive(Debug, Clone, Copy)]
struct Reader<'a> {
    data: &'a [u8],
    declared: usize,
    pos: usize,
}

impl<'a> Reader<'a> {
    /// `data` may be shorter than `declared` but never longer
    fn new(data: &'a [u8], declared: usize) -> Self {
        let data = &data[..data.len().min(declared)];
        Self { data, declared, pos: 0 }
    }

    fn remaining_declared(&self) -> usize {
        self.declared - self.pos
    }

    fn take(&mut self, n: usize) -> Result<&'a [u8], TlsError> {
        if n > self.remaining_declared() {
            return Err(TlsError::Invalid);
        }
        let bytes = self.data.get(self.pos..self.pos + n).ok_or(TlsError::Truncated)?;
        self.pos += n;
        Ok(bytes)
    }

    fn u8(&mut self) -> Result<u8, TlsError> {
        Ok(self.take(1)?[0])
    }

    fn u16(&mut self) -> Result<u16, TlsError> {
        let b = self.take(2)?;
        Ok(u16::from_be_bytes([b[0], b[1]]))
    }

    fn u24(&mut self) -> Result<usize, TlsError> {
        let b = self.take(3)?;
        Ok((usize::from(b[0]) << 16) | (usize::from(b[1]) << 8) | usize::from(b[2]))
    }

    /// Nested reader over the next `n` bytes, which must all be present
    fn sub(&mut self, n: usize) -> Result<Reader<'a>, TlsError> {
        let bytes = self.take(n)?;
        Ok(Reader::new(bytes, n))
    }

    fn is_done(&self) -> bool {
        self.pos == self.declared
    }
}

/// Decoded ClientHello; slices borrow from the input
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TlsClientHello<'a> {
    /// Version from the record header
    pub record_version: u16,
    /// legacy_version from the hello body
    pub client_version: u16,
    pub random: &'a [u8],
    pub session_id: &'a [u8],
    /// Raw cipher suite list, two bytes per suite
    pub cipher_suites: &'a [u8],
    pub compression_methods: &'a [u8],
    /// First host_name from the server_name extension
    pub sni: Option<ServerName>,
    /// First protocol from the ALPN extension
    pub alpn: Option<AlpnProtocol>,
    /// Raw ALPN protocol list (length-prefixed entries)
    pub alpn_list: &'a [u8],
    /// Raw supported_versions list
    pub supported_versions: &'a [u8],
    pub extension_count: usize,
}

impl<'a> TlsClientHello<'a> {
    pub fn cipher_suites(&self) -> impl Iterator<Item = u16> + 'a {
        self.cipher_suites
            .chunks_exact(2)
            .map(|c| u16::from_be_bytes([c[0], c[1]]))
    }

    /// Every protocol id offered through ALPN
    pub fn alpn_protocols(&self) -> impl Iterator<Item = &'a [u8]> + 'a {
        let mut rest = self.alpn_list;
        std::iter::from_fn(move || {
            let (&len, tail) = rest.split_first()?;
            let proto = tail.get(..usize::from(len))?;
            rest = &tail[usize::from(len)..];
            Some(proto)
        })
    }

    /// Versions listed in supported_versions (TLS 1.3 clients)
    pub fn supported_versions(&self) -> impl Iterator<Item = u16> + 'a {
        self.supported_versions
            .chunks_exact(2)
            .map(|c| u16::from_be_bytes([c[0], c[1]]))
    }

    pub fn offers_tls13(&self) -> bool {
        self.supported_versions().any(|v| v == 0x0304)
    }

    pub fn server_name(&self) -> Option<&str> {
        self.sni.as_ref().and_then(|s| s.as_str())
    }
}

/// Parse a ClientHello at the start of `buf`
pub fn parse_client_hello(buf: &[u8]) -> Result<TlsClientHello<'_>, TlsError> {
    if buf.len() < RECORD_HEADER_LEN {
        // Decide NotTls as early as the available bytes allow
        return match buf {
            [] => Err(TlsError::Truncated),
            [t, ..] if *t != CONTENT_TYPE_HANDSHAKE => Err(TlsError::NotTls),
            [_, major, ..] if *major != 3 => Err(TlsError::NotTls),
            _ => Err(TlsError::Truncated),
        };
    }
    if !is_handshake(buf) {
        return Err(TlsError::NotTls);
    }
    let record_version = u16::from_be_bytes([buf[1], buf[2]]);
    let record_len = usize::from(u16::from_be_bytes([buf[3], buf[4]]));
    let mut record = Reader::new(&buf[RECORD_HEADER_LEN..], record_len);

    if record.u8()? != HANDSHAKE_CLIENT_HELLO {
        return Err(TlsError::Invalid);
    }
    let hs_len = record.u24()?;
    let mut hello = record.sub(hs_len)?;

    let client_version = hello.u16()?;
    let random = hello.take(32)?;

    let sid_len = usize::from(hello.u8()?);
    if sid_len > 32 {
        return Err(TlsError::Invalid);
    }
    let session_id = hello.take(sid_len)?;

    let cs_len = usize::from(hello.u16()?);
    if cs_len % 2 != 0 {
        return Err(TlsError::Invalid);
    }
    let cipher_suites = hello.take(cs_len)?;

    let cm_len = usize::from(hello.u8()?);
    let compression_methods = hello.take(cm_len)?;

    let mut out = TlsClientHello {
        record_version,
        client_version,
        random,
        session_id,
        cipher_suites,
        compression_methods,
        sni: None,
        alpn: None,
        alpn_list: &[],
        supported_versions: &[],
        extension_count: 0,
    };

    // Pre-TLS 1.2 hellos may end here
    if hello.is_done() {
        return Ok(out);
    }

    let ext_len = usize::from(hello.u16()?);
    let mut exts = hello.sub(ext_len)?;
    while !exts.is_done() {
        let ext_type = exts.u16()?;
        let len = usize::from(exts.u16()?);
        let mut body = exts.sub(len)?;
        out.extension_count += 1;
        trace!("tls: extension {} ({} bytes)", ext_type, len);
        match ext_type {
            EXT_SERVER_NAME if out.sni.is_none() => out.sni = parse_sni(&mut body)?,
            EXT_ALPN if out.alpn.is_none() => {
                let (first, list) = parse_alpn(&mut body)?;
                out.alpn = Some(first);
                out.alpn_list = list;
            }
            EXT_SUPPORTED_VERSIONS => {
                let n = usize::from(body.u8()?);
                if n % 2 != 0 {
                    return Err(TlsError::Invalid);
                }
                out.supported_versions = body.take(n)?;
            }
            _ => {}
        }
    }

    Ok(out)
}

fn parse_sni(body: &mut Reader<'_>) -> Result<Option<ServerName>, TlsError> {
    let list_len = usize::from(body.u16()?);
    let mut list = body.sub(list_len)?;
    while !list.is_done() {
        let name_type = list.u8()?;
        let name_len = usize::from(list.u16()?);
        let name = list.take(name_len)?;
        if name_type == 0 {
            // A host name that does not fit is skipped, not fatal
            return Ok(ServerName::from_slice(name));
        }
    }
    Ok(None)
}

fn parse_alpn<'a>(body: &mut Reader<'a>) -> Result<(AlpnProtocol, &'a [u8]), TlsError> {
    let list_len = usize::from(body.u16()?);
    let all = body.take(list_len)?;
    let mut list = Reader::new(all, list_len);
    let proto_len = usize::from(list.u8()?);
    if proto_len == 0 {
        return Err(TlsError::Invalid);
    }
    let first = list.take(proto_len)?;
    Ok((AlpnProtocol::from_slice(first).ok_or(TlsError::Invalid)?, all))
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;

    fn ext(ty: u16, body: &[u8]) -> Vec<u8> {
        let mut v = ty.to_be_bytes().to_vec();
        v.extend_from_slice(&(body.len() as u16).to_be_bytes());
        v.extend_from_slice(body);
        v
    }

    fn sni_ext(host: &str) -> Vec<u8> {
        let mut entry = vec![0u8];
        entry.extend_from_slice(&(host.len() as u16).to_be_bytes());
        entry.extend_from_slice(host.as_bytes());
        let mut body = (entry.len() as u16).to_be_bytes().to_vec();
        body.extend(entry);
        ext(EXT_SERVER_NAME, &body)
    }

    fn alpn_ext(protos: &[&str]) -> Vec<u8> {
        let mut list = Vec::new();
        for p in protos {
            list.push(p.len() as u8);
            list.extend_from_slice(p.as_bytes());
        }
        let mut body = (list.len() as u16).to_be_bytes().to_vec();
        body.extend(list);
        ext(EXT_ALPN, &body)
    }

    /// Build a ClientHello record carrying `extensions`
    pub(crate) fn client_hello(extensions: &[u8]) -> Vec<u8> {
        let mut hello = vec![0x03, 0x03];
        hello.extend_from_slice(&[0x11; 32]);
        hello.push(32);
        hello.extend_from_slice(&[0x22; 32]);
        hello.extend_from_slice(&[0x00, 0x04, 0x13, 0x01, 0xC0, 0x2F]);
        hello.extend_from_slice(&[0x01, 0x00]);
        hello.extend_from_slice(&(extensions.len() as u16).to_be_bytes());
        hello.extend_from_slice(extensions);

        let mut hs = vec![HANDSHAKE_CLIENT_HELLO];
        hs.extend_from_slice(&(hello.len() as u32).to_be_bytes()[1..]);
        hs.extend(hello);

        let mut record = vec![CONTENT_TYPE_HANDSHAKE, 0x03, 0x01];
        record.extend_from_slice(&(hs.len() as u16).to_be_bytes());
        record.extend(hs);
        record
    }

    fn full_extensions() -> Vec<u8> {
        let mut exts = ext(0xff01, &[0x00]);
        exts.extend(sni_ext("example.com"));
        exts.extend(alpn_ext(&["h2", "http/1.1"]));
        exts.extend(ext(EXT_SUPPORTED_VERSIONS, &[0x04, 0x03, 0x04, 0x03, 0x03]));
        exts
    }

    #[test]
    fn test_is_handshake() {
        assert!(is_handshake(&[22, 3]));
        assert!(is_handshake(&[22, 3, 1, 0, 5]));
        assert!(!is_handshake(&[23, 3, 3]));
        assert!(!is_handshake(&[22, 2]));
        assert!(!is_handshake(b"GET / HTTP/1.1"));
        assert!(!is_handshake(&[22]));
    }

    #[test]
    fn test_parse_full_hello() {
        let buf = client_hello(&full_extensions());
        let hello = parse_client_hello(&buf).unwrap();
        assert_eq!(hello.record_version, 0x0301);
        assert_eq!(hello.client_version, 0x0303);
        assert_eq!(hello.session_id.len(), 32);
        assert_eq!(hello.cipher_suites().collect::<Vec<_>>(), vec![0x1301, 0xC02F]);
        assert_eq!(hello.compression_methods, &[0u8]);
        assert_eq!(hello.server_name(), Some("example.com"));
        assert_eq!(hello.alpn.unwrap(), "h2");
        let protos: Vec<&[u8]> = hello.alpn_protocols().collect();
        assert_eq!(protos, vec![&b"h2"[..], &b"http/1.1"[..]]);
        assert!(hello.offers_tls13());
        assert_eq!(hello.extension_count, 4);
    }

    #[test]
    fn test_hello_without_extensions() {
        let mut buf = client_hello(&[]);
        // drop the empty extensions block and fix up both lengths
        buf.truncate(buf.len() - 2);
        let hs_len = buf.len() - 9;
        buf[6..9].copy_from_slice(&(hs_len as u32).to_be_bytes()[1..]);
        let rec_len = (buf.len() - 5) as u16;
        buf[3..5].copy_from_slice(&rec_len.to_be_bytes());
        let hello = parse_client_hello(&buf).unwrap();
        assert!(hello.sni.is_none());
        assert_eq!(hello.extension_count, 0);
    }

    #[test]
    fn test_not_tls() {
        assert_eq!(parse_client_hello(b"GET / HTTP/1.1\r\n"), Err(TlsError::NotTls));
        assert_eq!(parse_client_hello(&[23]), Err(TlsError::NotTls));
        assert_eq!(parse_client_hello(&[22, 3]), Err(TlsError::Truncated));
        assert_eq!(parse_client_hello(&[]), Err(TlsError::Truncated));
    }

    #[test]
    fn test_wrong_handshake_type() {
        let mut buf = client_hello(&full_extensions());
        buf[5] = 2;
        assert_eq!(parse_client_hello(&buf), Err(TlsError::Invalid));
    }

    #[test]
    fn test_truncated_at_every_prefix() {
        let buf = client_hello(&full_extensions());
        for cut in 0..buf.len() {
            assert_eq!(
                parse_client_hello(&buf[..cut]),
                Err(TlsError::Truncated),
                "cut={}",
                cut
            );
        }
    }

    #[test]
    fn test_overrun_of_declared_length_is_invalid() {
        let mut buf = client_hello(&full_extensions());
        // claim a 0xFFFF-byte extension block inside a short record
        let ext_len_pos = 5 + 4 + 2 + 32 + 1 + 32 + 2 + 4 + 2;
        buf[ext_len_pos..ext_len_pos + 2].copy_from_slice(&0xFFFFu16.to_be_bytes());
        assert_eq!(parse_client_hello(&buf), Err(TlsError::Invalid));
    }

    #[test]
    fn test_oversized_sni_is_skipped() {
        let host = "a".repeat(MAX_SNI_LEN + 1);
        let mut exts = sni_ext(&host);
        exts.extend(alpn_ext(&["h2"]));
        let buf = client_hello(&exts);
        let hello = parse_client_hello(&buf).unwrap();
        assert!(hello.sni.is_none());
        assert_eq!(hello.alpn.unwrap(), "h2");
        assert_eq!(hello.extension_count, 2);
    }

    #[test]
    fn test_session_id_too_long() {
        let mut buf = client_hello(&[]);
        buf[5 + 4 + 2 + 32] = 33;
        assert_eq!(parse_client_hello(&buf), Err(TlsError::Invalid));
    }
}
