//! DNS Message Parser
//!
//! RFC 1035 wire format: 12-byte header, questions and resource records.
//! All integers are read big-endian. Names are decompressed into
//! caller-owned storage because a compressed name can be stitched together
//! from labels that are not contiguous in the message; record data is
//! borrowed from the message.
//!
//! Decompression follows at most [`MAX_POINTER_JUMPS`] pointers, so a
//! pointer loop fails quickly with `Loop` instead of spinning.

use std::net::{Ipv4Addr, Ipv6Addr};

use thiserror::Error;

use crate::error::{ErrorKind, ParseError};
use crate::inline::InlineBytes;

/// Fixed header size
pub const HEADER_LEN: usize = 12;

/// Compression pointers followed before giving up
pub const MAX_POINTER_JUMPS: usize = 5;

/// Capacity of a decoded (dotted) name
pub const MAX_NAME_LEN: usize = 256;

/// Decoded domain name, dotted, without the trailing root dot
pub type DnsName = InlineBytes<MAX_NAME_LEN>;

/// DNS parse status
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
#[repr(i32)]
pub enum DnsError {
    #[error("message truncated")]
    Truncated = -1,
    #[error("invalid message")]
    Invalid = -2,
    #[error("name exceeds output buffer")]
    NameTooLong = -3,
    #[error("too many compression pointers")]
    Loop = -4,
}

impl ParseError for DnsError {
    fn code(&self) -> i32 {
        *self as i32
    }

    fn kind(&self) -> ErrorKind {
        match self {
            DnsError::Truncated => ErrorKind::Recoverable,
            DnsError::Invalid => ErrorKind::Malformed,
            DnsError::NameTooLong | DnsError::Loop => ErrorKind::ResourceLimit,
        }
    }
}

/// Record types
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DnsType {
    A,
    Ns,
    Cname,
    Soa,
    Ptr,
    Mx,
    Txt,
    Aaaa,
    Srv,
    Any,
    Other(u16),
}

impl From<u16> for DnsType {
    fn from(v: u16) -> Self {
        match v {
            1 => DnsType::A,
            2 => DnsType::Ns,
            5 => DnsType::Cname,
            6 => DnsType::Soa,
            12 => DnsType::Ptr,
            15 => DnsType::Mx,
            16 => DnsType::Txt,
            28 => DnsType::Aaaa,
            33 => DnsType::Srv,
            255 => DnsType::Any,
            other => DnsType::Other(other),
        }
    }
}

impl From<DnsType> for u16 {
    fn from(t: DnsType) -> u16 {
        match t {
            DnsType::A => 1,
            DnsType::Ns => 2,
            DnsType::Cname => 5,
            DnsType::Soa => 6,
            DnsType::Ptr => 12,
            DnsType::Mx => 15,
            DnsType::Txt => 16,
            DnsType::Aaaa => 28,
            DnsType::Srv => 33,
            DnsType::Any => 255,
            DnsType::Other(v) => v,
        }
    }
}

/// Record classes
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DnsClass {
    In,
    Ch,
    Hs,
    Any,
    Other(u16),
}

impl From<u16> for DnsClass {
    fn from(v: u16) -> Self {
        match v {
            1 => DnsClass::In,
            3 => DnsClass::Ch,
            4 => DnsClass::Hs,
            255 => DnsClass::Any,
            other => DnsClass::Other(other),
        }
    }
}

/// Message header
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct DnsHeader {
    pub id: u16,
    pub flags: u16,
    pub qdcount: u16,
    pub ancount: u16,
    pub nscount: u16,
    pub arcount: u16,
}

impl DnsHeader {
    pub const FLAG_QR: u16 = 0x8000;
    pub const FLAG_AA: u16 = 0x0400;
    pub const FLAG_TC: u16 = 0x0200;
    pub const FLAG_RD: u16 = 0x0100;
    pub const FLAG_RA: u16 = 0x0080;
    const OPCODE_MASK: u16 = 0x7800;
    const RCODE_MASK: u16 = 0x000F;

    pub fn is_response(&self) -> bool {
        self.flags & Self::FLAG_QR != 0
    }

    pub fn opcode(&self) -> u8 {
        ((self.flags & Self::OPCODE_MASK) >> 11) as u8
    }

    pub fn is_authoritative(&self) -> bool {
        self.flags & Self::FLAG_AA != 0
    }

    pub fn is_truncated(&self) -> bool {
        self.flags & Self::FLAG_TC != 0
    }

    pub fn recursion_desired(&self) -> bool {
        self.flags & Self::FLAG_RD != 0
    }

    pub fn recursion_available(&self) -> bool {
        self.flags & Self::FLAG_RA != 0
    }

    pub fn rcode(&self) -> u8 {
        (self.flags & Self::RCODE_MASK) as u8
    }
}

/// Question section entry
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DnsQuestion {
    pub name: DnsName,
    pub qtype: DnsType,
    pub qclass: DnsClass,
}

/// Resource record with borrowed rdata
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DnsRecord<'a> {
    pub name: DnsName,
    pub rtype: DnsType,
    pub class: DnsClass,
    pub ttl: u32,
    pub rdata: &'a [u8],
    /// Offset of `rdata` within the message, for names inside rdata
    pub rdata_offset: usize,
}

impl<'a> DnsRecord<'a> {
    /// Address of an A record
    pub fn ipv4(&self) -> Option<Ipv4Addr> {
        if self.rtype != DnsType::A {
            return None;
        }
        let octets: [u8; 4] = self.rdata.try_into().ok()?;
        Some(Ipv4Addr::from(octets))
    }

    /// Address of an AAAA record
    pub fn ipv6(&self) -> Option<Ipv6Addr> {
        if self.rtype != DnsType::Aaaa {
            return None;
        }
        let octets: [u8; 16] = self.rdata.try_into().ok()?;
        Some(Ipv6Addr::from(octets))
    }

    /// Target name of an NS, CNAME or PTR record
    pub fn target_name(&self, msg: &[u8]) -> Result<DnsName, DnsError> {
        if !matches!(self.rtype, DnsType::Ns | DnsType::Cname | DnsType::Ptr) {
            return Err(DnsError::Invalid);
        }
        let mut pos = self.rdata_offset;
        read_name(msg, &mut pos)
    }

    /// Preference and exchange of an MX record
    pub fn mx(&self, msg: &[u8]) -> Result<(u16, DnsName), DnsError> {
        if self.rtype != DnsType::Mx {
            return Err(DnsError::Invalid);
        }
        let mut pos = self.rdata_offset;
        let preference = read_u16(msg, &mut pos)?;
        Ok((preference, read_name(msg, &mut pos)?))
    }
}

fn read_u16(msg: &[u8], pos: &mut usize) -> Result<u16, DnsError> {
    let b = msg.get(*pos..*pos + 2).ok_or(DnsError::Truncated)?;
    *pos += 2;
    Ok(u16::from_be_bytes([b[0], b[1]]))
}

fn read_u32(msg: &[u8], pos: &mut usize) -> Result<u32, DnsError> {
    let b = msg.get(*pos..*pos + 4).ok_or(DnsError::Truncated)?;
    *pos += 4;
    Ok(u32::from_be_bytes([b[0], b[1], b[2], b[3]]))
}

/// Decode the 12-byte header
pub fn parse_header(msg: &[u8]) -> Result<DnsHeader, DnsError> {
    if msg.len() < HEADER_LEN {
        return Err(DnsError::Truncated);
    }
    let mut pos = 0;
    Ok(DnsHeader {
        id: read_u16(msg, &mut pos)?,
        flags: read_u16(msg, &mut pos)?,
        qdcount: read_u16(msg, &mut pos)?,
        ancount: read_u16(msg, &mut pos)?,
        nscount: read_u16(msg, &mut pos)?,
        arcount: read_u16(msg, &mut pos)?,
    })
}

/// Decompress the name at `*offset` into `out` as dotted text.
///
/// Returns the number of bytes written. `*offset` moves past the name as
/// it appears at its original position, i.e. past the first pointer if the
/// name is compressed. Fails with `NameTooLong` instead of writing beyond
/// `out`.
pub fn parse_name(msg: &[u8], offset: &mut usize, out: &mut [u8]) -> Result<usize, DnsError> {
    let mut pos = *offset;
    let mut resume: Option<usize> = None;
    let mut jumps = 0;
    let mut written = 0;

    loop {
        let len = *msg.get(pos).ok_or(DnsError::Truncated)?;
        match len & 0xC0 {
            0x00 if len == 0 => {
                pos += 1;
                break;
            }
            0x00 => {
                let label_len = len as usize;
                let label = msg
                    .get(pos + 1..pos + 1 + label_len)
                    .ok_or(DnsError::Truncated)?;
                let dot = usize::from(written > 0);
                let dst = out
                    .get_mut(written..written + dot + label_len)
                    .ok_or(DnsError::NameTooLong)?;
                if dot == 1 {
                    dst[0] = b'.';
                }
                dst[dot..].copy_from_slice(label);
                written += dot + label_len;
                pos += 1 + label_len;
            }
            0xC0 => {
                let lo = *msg.get(pos + 1).ok_or(DnsError::Truncated)?;
                let target = (usize::from(len & 0x3F) << 8) | usize::from(lo);
                if target >= msg.len() {
                    return Err(DnsError::Invalid);
                }
                if resume.is_none() {
                    resume = Some(pos + 2);
                }
                jumps += 1;
                if jumps > MAX_POINTER_JUMPS {
                    return Err(DnsError::Loop);
                }
                pos = target;
            }
            // 0x40 and 0x80 label types are reserved
            _ => return Err(DnsError::Invalid),
        }
    }

    *offset = resume.unwrap_or(pos);
    Ok(written)
}

/// Decompress the name at `*offset` into an inline buffer
pub fn read_name(msg: &[u8], offset: &mut usize) -> Result<DnsName, DnsError> {
    let mut buf = [0u8; MAX_NAME_LEN];
    let n = parse_name(msg, offset, &mut buf)?;
    DnsName::from_slice(&buf[..n]).ok_or(DnsError::NameTooLong)
}

/// Decode one question at `*offset`
pub fn parse_question(msg: &[u8], offset: &mut usize) -> Result<DnsQuestion, DnsError> {
    let mut pos = *offset;
    let name = read_name(msg, &mut pos)?;
    let qtype = DnsType::from(read_u16(msg, &mut pos)?);
    let qclass = DnsClass::from(read_u16(msg, &mut pos)?);
    *offset = pos;
    Ok(DnsQuestion { name, qtype, qclass })
}

/// Decode one resource record at `*offset`
pub fn parse_record<'a>(msg: &'a [u8], offset: &mut usize) -> Result<DnsRecord<'a>, DnsError> {
    let mut pos = *offset;
    let name = read_name(msg, &mut pos)?;
    let rtype = DnsType::from(read_u16(msg, &mut pos)?);
    let class = DnsClass::from(read_u16(msg, &mut pos)?);
    let ttl = read_u32(msg, &mut pos)?;
    let rdlength = usize::from(read_u16(msg, &mut pos)?);
    let rdata = msg.get(pos..pos + rdlength).ok_or(DnsError::Truncated)?;
    let rdata_offset = pos;
    *offset = pos + rdlength;
    Ok(DnsRecord {
        name,
        rtype,
        class,
        ttl,
        rdata,
        rdata_offset,
    })
}

/// Section a record came from
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Section {
    Answer,
    Authority,
    Additional,
}

/// Sequential reader honoring the header's section counts
#[derive(Debug, Clone)]
pub struct DnsReader<'a> {
    msg: &'a [u8],
    header: DnsHeader,
    pos: usize,
    questions_read: u16,
    records_read: u32,
}

impl<'a> DnsReader<'a> {
    pub fn new(msg: &'a [u8]) -> Result<Self, DnsError> {
        let header = parse_header(msg)?;
        Ok(Self {
            msg,
            header,
            pos: HEADER_LEN,
            questions_read: 0,
            records_read: 0,
        })
    }

    pub fn header(&self) -> &DnsHeader {
        &self.header
    }

    pub fn position(&self) -> usize {
        self.pos
    }

    fn total_records(&self) -> u32 {
        u32::from(self.header.ancount) + u32::from(self.header.nscount) + u32::from(self.header.arcount)
    }

    /// Next question, `None` once all `qdcount` have been read
    pub fn next_question(&mut self) -> Option<Result<DnsQuestion, DnsError>> {
        if self.questions_read >= self.header.qdcount {
            return None;
        }
        self.questions_read += 1;
        Some(parse_question(self.msg, &mut self.pos))
    }

    /// Next record from the answer, authority or additional section.
    ///
    /// Remaining questions are skipped first.
    pub fn next_record(&mut self) -> Option<Result<(Section, DnsRecord<'a>), DnsError>> {
        while self.questions_read < self.header.qdcount {
            if let Some(Err(e)) = self.next_question() {
                return Some(Err(e));
            }
        }
        if self.records_read >= self.total_records() {
            return None;
        }
        let index = self.records_read;
        self.records_read += 1;
        let an = u32::from(self.header.ancount);
        let ns = u32::from(self.header.nscount);
        let section = if index < an {
            Section::Answer
        } else if index < an + ns {
            Section::Authority
        } else {
            Section::Additional
        };
        Some(parse_record(self.msg, &mut self.pos).map(|r| (section, r)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    /// Response to `www.example.com A` with a compressed CNAME and an A record
    fn sample_response() -> Vec<u8> {
        let mut m = vec![
            0xAB, 0xCD, // id
            0x81, 0x80, // QR RD RA
            0x00, 0x01, 0x00, 0x02, 0x00, 0x00, 0x00, 0x00,
        ];
        // question at 12
        m.extend_from_slice(b"\x03www\x07example\x03com\x00");
        m.extend_from_slice(&[0x00, 0x01, 0x00, 0x01]);
        // CNAME: name -> ptr 12, target "cdn" + ptr to "example.com" (offset 16)
        m.extend_from_slice(&[0xC0, 0x0C, 0x00, 0x05, 0x00, 0x01, 0x00, 0x00, 0x0E, 0x10, 0x00, 0x06]);
        m.extend_from_slice(b"\x03cdn\xC0\x10");
        // A: name -> ptr to "cdn.example.com" (rdata of CNAME)
        let cdn_offset = (m.len() - 6) as u8;
        m.extend_from_slice(&[0xC0, cdn_offset, 0x00, 0x01, 0x00, 0x01, 0x00, 0x00, 0x00, 0x3C, 0x00, 0x04]);
        m.extend_from_slice(&[93, 184, 216, 34]);
        m
    }

    #[test]
    fn test_parse_header() {
        let msg = sample_response();
        let h = parse_header(&msg).unwrap();
        assert_eq!(h.id, 0xABCD);
        assert!(h.is_response());
        assert!(h.recursion_desired());
        assert!(h.recursion_available());
        assert!(!h.is_authoritative());
        assert!(!h.is_truncated());
        assert_eq!(h.opcode(), 0);
        assert_eq!(h.rcode(), 0);
        assert_eq!(h.qdcount, 1);
        assert_eq!(h.ancount, 2);
        assert_eq!(parse_header(&msg[..11]), Err(DnsError::Truncated));
    }

    #[test]
    fn test_reader_walks_message() {
        let msg = sample_response();
        let mut reader = DnsReader::new(&msg).unwrap();

        let q = reader.next_question().unwrap().unwrap();
        assert_eq!(q.name, "www.example.com");
        assert_eq!(q.qtype, DnsType::A);
        assert_eq!(q.qclass, DnsClass::In);
        assert!(reader.next_question().is_none());

        let (section, cname) = reader.next_record().unwrap().unwrap();
        assert_eq!(section, Section::Answer);
        assert_eq!(cname.name, "www.example.com");
        assert_eq!(cname.rtype, DnsType::Cname);
        assert_eq!(cname.ttl, 3600);
        assert_eq!(cname.target_name(&msg).unwrap(), "cdn.example.com");

        let (_, a) = reader.next_record().unwrap().unwrap();
        assert_eq!(a.name, "cdn.example.com");
        assert_eq!(a.ipv4(), Some(Ipv4Addr::new(93, 184, 216, 34)));
        assert_eq!(a.ipv6(), None);
        assert!(reader.next_record().is_none());
        assert_eq!(reader.position(), msg.len());
    }

    #[test]
    fn test_pointer_offset_advances_past_first_pointer() {
        let msg = sample_response();
        let mut offset = 33;
        let name = read_name(&msg, &mut offset).unwrap();
        assert_eq!(name, "www.example.com");
        assert_eq!(offset, 35);
    }

    #[test]
    fn test_root_name() {
        let msg = [0u8];
        let mut offset = 0;
        let name = read_name(&msg, &mut offset).unwrap();
        assert!(name.is_empty());
        assert_eq!(offset, 1);
    }

    #[test]
    fn test_self_pointer_is_loop() {
        let msg = [0xC0, 0x00];
        let mut offset = 0;
        assert_eq!(read_name(&msg, &mut offset), Err(DnsError::Loop));
    }

    #[test]
    fn test_mutual_pointers_are_loop() {
        let msg = [0xC0, 0x02, 0xC0, 0x00];
        let mut offset = 0;
        assert_eq!(read_name(&msg, &mut offset), Err(DnsError::Loop));
    }

    #[test]
    fn test_pointer_chain_within_ceiling() {
        // label "a" at 0, then five pointers each pointing at the previous
        let mut msg = b"\x01a\x00".to_vec();
        let mut prev = 0u8;
        for _ in 0..5 {
            let here = msg.len() as u8;
            msg.extend_from_slice(&[0xC0, prev]);
            prev = here;
        }
        let mut offset = prev as usize;
        assert_eq!(read_name(&msg, &mut offset).unwrap(), "a");
    }

    #[test]
    fn test_pointer_out_of_range() {
        let msg = [0xC0, 0x10];
        let mut offset = 0;
        assert_eq!(read_name(&msg, &mut offset), Err(DnsError::Invalid));
    }

    #[test]
    fn test_reserved_label_types() {
        for prefix in [0x40u8, 0x80] {
            let msg = [prefix | 1, b'a', 0];
            let mut offset = 0;
            assert_eq!(read_name(&msg, &mut offset), Err(DnsError::Invalid));
        }
    }

    #[test]
    fn test_name_too_long_for_output() {
        let msg = b"\x05hello\x05world\x00";
        let mut offset = 0;
        let mut small = [0u8; 8];
        assert_eq!(parse_name(msg, &mut offset, &mut small), Err(DnsError::NameTooLong));
        let mut exact = [0u8; 11];
        assert_eq!(parse_name(msg, &mut offset, &mut exact), Ok(11));
        assert_eq!(&exact, b"hello.world");
    }

    #[test]
    fn test_truncated_label() {
        let msg = b"\x05hel";
        let mut offset = 0;
        assert_eq!(read_name(msg, &mut offset), Err(DnsError::Truncated));
    }

    #[test]
    fn test_record_rdata_truncated() {
        let mut msg = b"\x00".to_vec();
        msg.extend_from_slice(&[0x00, 0x01, 0x00, 0x01, 0, 0, 0, 1, 0x00, 0x04, 1, 2]);
        let mut offset = 0;
        assert_eq!(parse_record(&msg, &mut offset), Err(DnsError::Truncated));
    }

    #[test]
    fn test_mx_record() {
        let mut msg = b"\x04mail\x00".to_vec();
        let rec_start = msg.len();
        msg.extend_from_slice(&[0xC0, 0x00, 0x00, 0x0F, 0x00, 0x01, 0, 0, 0, 60, 0x00, 0x04, 0x00, 0x0A, 0xC0, 0x00]);
        let mut offset = rec_start;
        let rec = parse_record(&msg, &mut offset).unwrap();
        let (pref, exchange) = rec.mx(&msg).unwrap();
        assert_eq!(pref, 10);
        assert_eq!(exchange, "mail");
        assert_eq!(rec.target_name(&msg), Err(DnsError::Invalid));
    }

    #[test]
    fn test_type_round_trip() {
        for v in [1u16, 2, 5, 6, 12, 15, 16, 28, 33, 255, 999] {
            assert_eq!(u16::from(DnsType::from(v)), v);
        }
    }

    proptest! {
        #[test]
        fn prop_name_decoding_is_bounded(msg in proptest::collection::vec(any::<u8>(), 1..128), start in 0usize..128, cap in 0usize..64) {
            let start = start % msg.len();
            let mut offset = start;
            let mut out = vec![0u8; cap];
            if let Ok(n) = parse_name(&msg, &mut offset, &mut out) {
                prop_assert!(n <= cap);
                prop_assert!(offset <= msg.len());
            }
        }
    }
}
