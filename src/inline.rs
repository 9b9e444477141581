//! Fixed-capacity inline byte storage.
//!
//! Decoders that must copy rather than borrow (DNS name decompression, TLS
//! SNI/ALPN) write into an `InlineBytes<N>` so nothing touches the heap.

use std::fmt;

/// Up to `N` bytes stored inline.
#[derive(Clone, Copy)]
pub struct InlineBytes<const N: usize> {
    buf: [u8; N],
    len: usize,
}

impl<const N: usize> InlineBytes<N> {
    pub const CAPACITY: usize = N;

    pub const fn new() -> Self {
        Self { buf: [0; N], len: 0 }
    }

    /// Copy `bytes` in; `None` if they do not fit
    pub fn from_slice(bytes: &[u8]) -> Option<Self> {
        let mut out = Self::new();
        out.extend_from_slice(bytes).then_some(out)
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.buf[..self.len]
    }

    /// View as `&str` when the contents are UTF-8
    pub fn as_str(&self) -> Option<&str> {
        std::str::from_utf8(self.as_bytes()).ok()
    }

    pub fn len(&self) -> usize {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    pub fn remaining(&self) -> usize {
        N - self.len
    }

    pub fn clear(&mut self) {
        self.len = 0;
    }

    /// Append one byte; false when full
    pub fn push(&mut self, b: u8) -> bool {
        if self.len == N {
            return false;
        }
        self.buf[self.len] = b;
        self.len += 1;
        true
    }

    /// Append all of `bytes`, or nothing; false when they do not fit
    pub fn extend_from_slice(&mut self, bytes: &[u8]) -> bool {
        if bytes.len() > self.remaining() {
            return false;
        }
        self.buf[self.len..self.len + bytes.len()].copy_from_slice(bytes);
        self.len += bytes.len();
        true
    }
}

impl<const N: usize> Default for InlineBytes<N> {
    fn default() -> Self {
        Self::new()
    }
}

impl<const N: usize> AsRef<[u8]> for InlineBytes<N> {
    fn as_ref(&self) -> &[u8] {
        self.as_bytes()
    }
}

impl<const N: usize> PartialEq for InlineBytes<N> {
    fn eq(&self, other: &Self) -> bool {
        self.as_bytes() == other.as_bytes()
    }
}

impl<const N: usize> Eq for InlineBytes<N> {}

impl<const N: usize> PartialEq<[u8]> for InlineBytes<N> {
    fn eq(&self, other: &[u8]) -> bool {
        self.as_bytes() == other
    }
}

impl<const N: usize> PartialEq<&str> for InlineBytes<N> {
    fn eq(&self, other: &&str) -> bool {
        self.as_bytes() == other.as_bytes()
    }
}

impl<const N: usize> fmt::Debug for InlineBytes<N> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:?}", String::from_utf8_lossy(self.as_bytes()))
    }
}
