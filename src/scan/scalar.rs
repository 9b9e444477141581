//! Portable byte-at-a-time reference kernels.
//!
//! Every vector kernel falls back to these for its remainder, and the tests
//! treat them as the source of truth.

/// Index of the first byte in `buf` equal to any of `needles`, or `buf.len()`.
#[inline]
pub fn find_any<const N: usize>(buf: &[u8], needles: [u8; N]) -> usize {
    buf.iter()
        .position(|b| needles.contains(b))
        .unwrap_or(buf.len())
}

pub fn find_char(buf: &[u8], c: u8) -> usize {
    find_any(buf, [c])
}

pub fn find_set2(buf: &[u8], a: u8, b: u8) -> usize {
    find_any(buf, [a, b])
}

pub fn find_set4(buf: &[u8], set: [u8; 4]) -> usize {
    find_any(buf, set)
}

/// XOR `buf` with the repeating 4-byte `key`, starting at key phase 0.
pub fn xor_stream(buf: &mut [u8], key: [u8; 4]) {
    for (i, b) in buf.iter_mut().enumerate() {
        *b ^= key[i & 3];
    }
}

// Adapters matching the dispatcher's function pointer signatures.

pub(super) unsafe fn find_char_kernel(buf: &[u8], c: u8) -> usize {
    find_char(buf, c)
}

pub(super) unsafe fn find_set2_kernel(buf: &[u8], a: u8, b: u8) -> usize {
    find_set2(buf, a, b)
}

pub(super) unsafe fn find_set4_kernel(buf: &[u8], set: [u8; 4]) -> usize {
    find_set4(buf, set)
}

pub(super) unsafe fn xor_stream_kernel(buf: &mut [u8], key: [u8; 4]) {
    xor_stream(buf, key)
}
