//! SIMD Byte Scanner
//!
//! The delimiter search and masking primitives every decoder in this crate
//! builds on:
//!
//! - **find_char** - first occurrence of one byte
//! - **find_set2 / find_set4** - first occurrence of any of 2 or 4 bytes
//! - **xor_stream** - in-place XOR with a repeating 4-byte key
//!
//! A `find_*` result is always a valid exclusive bound: the index of the
//! first match, or `buf.len()` when nothing matched.
//!
//! # Runtime dispatch
//!
//! | Level    | Width | Availability                   |
//! |----------|-------|--------------------------------|
//! | AVX-512  | 64    | x86_64 with avx512f + avx512bw |
//! | AVX2     | 32    | x86_64 with avx2               |
//! | SSE2     | 16    | x86_64 baseline                |
//! | NEON     | 16    | aarch64 baseline               |
//! | SCALAR   | 1     | everywhere                     |
//!
//! [`Scanner::detect`] probes the CPU once and resolves one function pointer
//! per operation. The free functions go through a process-wide scanner
//! cached in a `OnceLock`.

use std::sync::OnceLock;

use log::debug;

pub mod scalar;

#[cfg(target_arch = "x86_64")]
mod x86;

#[cfg(target_arch = "aarch64")]
mod neon;

/// SIMD capability level.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SimdLevel {
    /// Byte-at-a-time fallback
    Scalar,
    /// x86_64 SSE2, 16 bytes per step
    #[cfg(target_arch = "x86_64")]
    Sse2,
    /// x86_64 AVX2, 32 bytes per step
    #[cfg(target_arch = "x86_64")]
    Avx2,
    /// x86_64 AVX-512BW, 64 bytes per step
    #[cfg(target_arch = "x86_64")]
    Avx512,
    /// aarch64 NEON, 16 bytes per step
    #[cfg(target_arch = "aarch64")]
    Neon,
}

impl SimdLevel {
    /// Human-readable backend name
    pub fn name(self) -> &'static str {
        match self {
            SimdLevel::Scalar => "SCALAR",
            #[cfg(target_arch = "x86_64")]
            SimdLevel::Sse2 => "SSE2",
            #[cfg(target_arch = "x86_64")]
            SimdLevel::Avx2 => "AVX2",
            #[cfg(target_arch = "x86_64")]
            SimdLevel::Avx512 => "AVX-512",
            #[cfg(target_arch = "aarch64")]
            SimdLevel::Neon => "NEON",
        }
    }

    /// Vector width in bytes
    pub fn width(self) -> usize {
        match self {
            SimdLevel::Scalar => 1,
            #[cfg(target_arch = "x86_64")]
            SimdLevel::Sse2 => 16,
            #[cfg(target_arch = "x86_64")]
            SimdLevel::Avx2 => 32,
            #[cfg(target_arch = "x86_64")]
            SimdLevel::Avx512 => 64,
            #[cfg(target_arch = "aarch64")]
            SimdLevel::Neon => 16,
        }
    }

    /// Whether the current CPU can run this level
    pub fn is_supported(self) -> bool {
        match self {
            SimdLevel::Scalar => true,
            #[cfg(target_arch = "x86_64")]
            SimdLevel::Sse2 => true,
            #[cfg(target_arch = "x86_64")]
            SimdLevel::Avx2 => is_x86_feature_detected!("avx2"),
            #[cfg(target_arch = "x86_64")]
            SimdLevel::Avx512 => {
                is_x86_feature_detected!("avx512f") && is_x86_feature_detected!("avx512bw")
            }
            #[cfg(target_arch = "aarch64")]
            SimdLevel::Neon => true,
        }
    }

    /// Every level compiled for this target, best first
    pub fn all() -> &'static [SimdLevel] {
        ALL_LEVELS
    }
}

#[cfg(target_arch = "x86_64")]
const ALL_LEVELS: &[SimdLevel] = &[SimdLevel::Avx512, SimdLevel::Avx2, SimdLevel::Sse2, SimdLevel::Scalar];

#[cfg(target_arch = "aarch64")]
const ALL_LEVELS: &[SimdLevel] = &[SimdLevel::Neon, SimdLevel::Scalar];

#[cfg(not(any(target_arch = "x86_64", target_arch = "aarch64")))]
const ALL_LEVELS: &[SimdLevel] = &[SimdLevel::Scalar];

type FindCharFn = unsafe fn(&[u8], u8) -> usize;
type FindSet2Fn = unsafe fn(&[u8], u8, u8) -> usize;
type FindSet4Fn = unsafe fn(&[u8], [u8; 4]) -> usize;
type XorStreamFn = unsafe fn(&mut [u8], [u8; 4]);

/// Resolved kernels for one [`SimdLevel`].
///
/// Construction is the only place a level is matched on; every call after
/// that is a direct function pointer call.
#[derive(Clone, Copy)]
pub struct Scanner {
    level: SimdLevel,
    find_char_fn: FindCharFn,
    find_set2_fn: FindSet2Fn,
    find_set4_fn: FindSet4Fn,
    xor_stream_fn: XorStreamFn,
}

impl std::fmt::Debug for Scanner {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Scanner")
            .field("level", &self.level)
            .finish()
    }
}

impl Scanner {
    /// Probe the CPU and resolve the best available kernels
    pub fn detect() -> Self {
        let level = SimdLevel::all()
            .iter()
            .copied()
            .find(|l| l.is_supported())
            .unwrap_or(SimdLevel::Scalar);
        Self::resolve(level)
    }

    /// Force a specific level; `None` if this CPU cannot run it
    pub fn with_level(level: SimdLevel) -> Option<Self> {
        if level.is_supported() {
            Some(Self::resolve(level))
        } else {
            None
        }
    }

    fn resolve(level: SimdLevel) -> Self {
        match level {
            SimdLevel::Scalar => Scanner {
                level,
                find_char_fn: scalar::find_char_kernel,
                find_set2_fn: scalar::find_set2_kernel,
                find_set4_fn: scalar::find_set4_kernel,
                xor_stream_fn: scalar::xor_stream_kernel,
            },
            #[cfg(target_arch = "x86_64")]
            SimdLevel::Sse2 => Scanner {
                level,
                find_char_fn: x86::find_char_sse2,
                find_set2_fn: x86::find_set2_sse2,
                find_set4_fn: x86::find_set4_sse2,
                xor_stream_fn: x86::xor_stream_sse2,
            },
            #[cfg(target_arch = "x86_64")]
            SimdLevel::Avx2 => Scanner {
                level,
                find_char_fn: x86::find_char_avx2,
                find_set2_fn: x86::find_set2_avx2,
                find_set4_fn: x86::find_set4_avx2,
                xor_stream_fn: x86::xor_stream_avx2,
            },
            #[cfg(target_arch = "x86_64")]
            SimdLevel::Avx512 => Scanner {
                level,
                find_char_fn: x86::find_char_avx512,
                find_set2_fn: x86::find_set2_avx512,
                find_set4_fn: x86::find_set4_avx512,
                xor_stream_fn: x86::xor_stream_avx512,
            },
            #[cfg(target_arch = "aarch64")]
            SimdLevel::Neon => Scanner {
                level,
                find_char_fn: neon::find_char_neon,
                find_set2_fn: neon::find_set2_neon,
                find_set4_fn: neon::find_set4_neon,
                xor_stream_fn: neon::xor_stream_neon,
            },
        }
    }

    /// Resolved level
    pub fn level(&self) -> SimdLevel {
        self.level
    }

    /// Index of the first `c` in `buf`, or `buf.len()`
    #[inline]
    pub fn find_char(&self, buf: &[u8], c: u8) -> usize {
        // SAFETY: the kernel was resolved for a level whose CPU features were
        // verified in `with_level`/`detect`; kernels only read within `buf`.
        unsafe { (self.find_char_fn)(buf, c) }
    }

    /// Index of the first `a` or `b` in `buf`, or `buf.len()`
    #[inline]
    pub fn find_set2(&self, buf: &[u8], a: u8, b: u8) -> usize {
        // SAFETY: see `find_char`
        unsafe { (self.find_set2_fn)(buf, a, b) }
    }

    /// Index of the first byte of `set` in `buf`, or `buf.len()`
    #[inline]
    pub fn find_set4(&self, buf: &[u8], set: [u8; 4]) -> usize {
        // SAFETY: see `find_char`
        unsafe { (self.find_set4_fn)(buf, set) }
    }

    /// `buf[i] ^= key[i % 4]` over the whole slice
    #[inline]
    pub fn xor_stream(&self, buf: &mut [u8], key: [u8; 4]) {
        // SAFETY: see `find_char`; writes stay within `buf`.
        unsafe { (self.xor_stream_fn)(buf, key) }
    }
}

impl Default for Scanner {
    fn default() -> Self {
        Self::detect()
    }
}

static SCANNER: OnceLock<Scanner> = OnceLock::new();

/// Process-wide scanner, detected on first use
#[inline]
pub fn scanner() -> &'static Scanner {
    SCANNER.get_or_init(|| {
        let s = Scanner::detect();
        debug!("byte scanner backend: {}", s.level().name());
        s
    })
}

/// Name of the active backend ("AVX-512", "AVX2", "SSE2", "NEON", "SCALAR")
pub fn backend() -> &'static str {
    scanner().level().name()
}

/// Index of the first `c` in `buf`, or `buf.len()` when absent
#[inline]
pub fn find_char(buf: &[u8], c: u8) -> usize {
    scanner().find_char(buf, c)
}

/// Index of the first `a` or `b` in `buf`, or `buf.len()` when absent
#[inline]
pub fn find_set2(buf: &[u8], a: u8, b: u8) -> usize {
    scanner().find_set2(buf, a, b)
}

/// Index of the first byte of `set` in `buf`, or `buf.len()` when absent
#[inline]
pub fn find_set4(buf: &[u8], set: [u8; 4]) -> usize {
    scanner().find_set4(buf, set)
}

/// XOR `buf` in place with the repeating 4-byte `key`
#[inline]
pub fn xor_stream(buf: &mut [u8], key: [u8; 4]) {
    scanner().xor_stream(buf, key)
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    fn supported() -> Vec<Scanner> {
        SimdLevel::all()
            .iter()
            .filter_map(|&l| Scanner::with_level(l))
            .collect()
    }

    /// Lengths straddling every vector width
    fn boundary_lengths() -> Vec<usize> {
        let mut lens = vec![0, 1, 2, 3, 4, 5];
        for w in [16usize, 32, 64, 128] {
            lens.extend([w - 1, w, w + 1]);
        }
        lens
    }

    #[test]
    fn test_backend_name_matches_level() {
        assert_eq!(backend(), scanner().level().name());
        assert!(scanner().level().is_supported());
    }

    #[test]
    fn test_scalar_always_available() {
        assert!(Scanner::with_level(SimdLevel::Scalar).is_some());
    }

    #[test]
    fn test_find_char_every_position_every_level() {
        for s in supported() {
            for len in boundary_lengths() {
                let mut buf = vec![b'a'; len];
                assert_eq!(s.find_char(&buf, b'x'), len, "{:?} len={}", s.level(), len);
                for pos in 0..len {
                    buf[pos] = b'x';
                    assert_eq!(s.find_char(&buf, b'x'), pos, "{:?} len={} pos={}", s.level(), len, pos);
                    buf[pos] = b'a';
                }
            }
        }
    }

    #[test]
    fn test_find_char_returns_first_match() {
        for s in supported() {
            let mut buf = vec![0u8; 200];
            buf[70] = b'\n';
            buf[3] = b'\n';
            assert_eq!(s.find_char(&buf, b'\n'), 3);
            assert_eq!(s.find_char(&buf[4..], b'\n'), 66);
        }
    }

    #[test]
    fn test_find_set2_and_set4_every_level() {
        for s in supported() {
            for len in boundary_lengths() {
                let mut buf = vec![b'-'; len];
                assert_eq!(s.find_set2(&buf, b' ', b'\r'), len);
                assert_eq!(s.find_set4(&buf, *b"\r\n:;"), len);
                if len > 0 {
                    buf[len - 1] = b'\r';
                    assert_eq!(s.find_set2(&buf, b' ', b'\r'), len - 1);
                    assert_eq!(s.find_set4(&buf, *b"\r\n:;"), len - 1);
                }
                if len > 1 {
                    buf[len / 2] = b' ';
                    assert_eq!(s.find_set2(&buf, b' ', b'\r'), len / 2);
                }
            }
        }
    }

    #[test]
    fn test_xor_stream_matches_scalar_every_level() {
        let key = [0x37, 0xfa, 0x21, 0x3d];
        for s in supported() {
            for len in boundary_lengths() {
                let src: Vec<u8> = (0..len).map(|i| (i * 7 + 3) as u8).collect();
                let mut fast = src.clone();
                let mut slow = src.clone();
                s.xor_stream(&mut fast, key);
                scalar::xor_stream(&mut slow, key);
                assert_eq!(fast, slow, "{:?} len={}", s.level(), len);
            }
        }
    }

    #[test]
    fn test_high_bytes_are_not_sign_confused() {
        for s in supported() {
            let mut buf = vec![0x7f; 80];
            buf[65] = 0xff;
            assert_eq!(s.find_char(&buf, 0xff), 65);
            assert_eq!(s.find_set2(&buf, 0x80, 0xff), 65);
        }
    }

    proptest! {
        #[test]
        fn prop_find_matches_scalar(buf in proptest::collection::vec(any::<u8>(), 0..300), c in any::<u8>(), d in any::<u8>()) {
            let expected = buf.iter().position(|&b| b == c).unwrap_or(buf.len());
            for s in supported() {
                prop_assert_eq!(s.find_char(&buf, c), expected);
                prop_assert_eq!(s.find_set2(&buf, c, d), scalar::find_set2(&buf, c, d));
                prop_assert_eq!(s.find_set4(&buf, [c, d, 0, b'\n']), scalar::find_set4(&buf, [c, d, 0, b'\n']));
            }
        }

        #[test]
        fn prop_xor_stream_is_involution(buf in proptest::collection::vec(any::<u8>(), 0..300), key in any::<[u8; 4]>()) {
            let mut work = buf.clone();
            xor_stream(&mut work, key);
            xor_stream(&mut work, key);
            prop_assert_eq!(work, buf);
        }
    }
}
