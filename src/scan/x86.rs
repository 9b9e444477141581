//! x86_64 kernels: SSE2 (baseline), AVX2 and AVX-512BW.
//!
//! Each `find_*` kernel compares a vector load against every broadcast
//! needle, ORs the equality masks, and takes the trailing-zero count of the
//! resulting bitmask. Remainders go to the scalar kernels.
//!
//! # Safety
//! Callers must have verified the matching CPU feature before calling any
//! `unsafe fn` here. The dispatcher in `scan::mod` only resolves a kernel
//! after `is_x86_feature_detected!` succeeded for it.

use std::arch::x86_64::*;

use super::scalar;

// ---------------------------------------------------------------------------
// SSE2, 16 bytes per step
// ---------------------------------------------------------------------------

#[target_feature(enable = "sse2")]
unsafe fn find_any_sse2<const N: usize>(buf: &[u8], needles: [u8; N]) -> usize {
    let len = buf.len();
    let ptr = buf.as_ptr();
    let mut splat = [_mm_setzero_si128(); N];
    for (v, &n) in splat.iter_mut().zip(needles.iter()) {
        *v = _mm_set1_epi8(n as i8);
    }

    let mut i = 0;
    while i + 16 <= len {
        let chunk = _mm_loadu_si128(ptr.add(i).cast());
        let mut hits = _mm_setzero_si128();
        for v in &splat {
            hits = _mm_or_si128(hits, _mm_cmpeq_epi8(chunk, *v));
        }
        let mask = _mm_movemask_epi8(hits) as u32;
        if mask != 0 {
            return i + mask.trailing_zeros() as usize;
        }
        i += 16;
    }

    i + scalar::find_any(&buf[i..], needles)
}

#[target_feature(enable = "sse2")]
pub unsafe fn find_char_sse2(buf: &[u8], c: u8) -> usize {
    find_any_sse2(buf, [c])
}

#[target_feature(enable = "sse2")]
pub unsafe fn find_set2_sse2(buf: &[u8], a: u8, b: u8) -> usize {
    find_any_sse2(buf, [a, b])
}

#[target_feature(enable = "sse2")]
pub unsafe fn find_set4_sse2(buf: &[u8], set: [u8; 4]) -> usize {
    find_any_sse2(buf, set)
}

#[target_feature(enable = "sse2")]
pub unsafe fn xor_stream_sse2(buf: &mut [u8], key: [u8; 4]) {
    let len = buf.len();
    let ptr = buf.as_mut_ptr();
    let k = _mm_set1_epi32(i32::from_ne_bytes(key));

    let mut i = 0;
    while i + 16 <= len {
        let p = ptr.add(i);
        let v = _mm_loadu_si128(p.cast_const().cast());
        _mm_storeu_si128(p.cast(), _mm_xor_si128(v, k));
        i += 16;
    }

    // i is a multiple of 4, so the key phase restarts at 0
    scalar::xor_stream(&mut buf[i..], key);
}

// ---------------------------------------------------------------------------
// AVX2, 32 bytes per step
// ---------------------------------------------------------------------------

#[target_feature(enable = "avx2")]
unsafe fn find_any_avx2<const N: usize>(buf: &[u8], needles: [u8; N]) -> usize {
    let len = buf.len();
    let ptr = buf.as_ptr();
    let mut splat = [_mm256_setzero_si256(); N];
    for (v, &n) in splat.iter_mut().zip(needles.iter()) {
        *v = _mm256_set1_epi8(n as i8);
    }

    let mut i = 0;
    while i + 32 <= len {
        let chunk = _mm256_loadu_si256(ptr.add(i).cast());
        let mut hits = _mm256_setzero_si256();
        for v in &splat {
            hits = _mm256_or_si256(hits, _mm256_cmpeq_epi8(chunk, *v));
        }
        let mask = _mm256_movemask_epi8(hits) as u32;
        if mask != 0 {
            return i + mask.trailing_zeros() as usize;
        }
        i += 32;
    }

    i + find_any_sse2(&buf[i..], needles)
}

#[target_feature(enable = "avx2")]
pub unsafe fn find_char_avx2(buf: &[u8], c: u8) -> usize {
    find_any_avx2(buf, [c])
}

#[target_feature(enable = "avx2")]
pub unsafe fn find_set2_avx2(buf: &[u8], a: u8, b: u8) -> usize {
    find_any_avx2(buf, [a, b])
}

#[target_feature(enable = "avx2")]
pub unsafe fn find_set4_avx2(buf: &[u8], set: [u8; 4]) -> usize {
    find_any_avx2(buf, set)
}

#[target_feature(enable = "avx2")]
pub unsafe fn xor_stream_avx2(buf: &mut [u8], key: [u8; 4]) {
    let len = buf.len();
    let ptr = buf.as_mut_ptr();
    let k = _mm256_set1_epi32(i32::from_ne_bytes(key));

    let mut i = 0;
    while i + 32 <= len {
        let p = ptr.add(i);
        let v = _mm256_loadu_si256(p.cast_const().cast());
        _mm256_storeu_si256(p.cast(), _mm256_xor_si256(v, k));
        i += 32;
    }

    xor_stream_sse2(&mut buf[i..], key);
}

// ---------------------------------------------------------------------------
// AVX-512BW, 64 bytes per step
// ---------------------------------------------------------------------------

#[target_feature(enable = "avx512f,avx512bw")]
unsafe fn find_any_avx512<const N: usize>(buf: &[u8], needles: [u8; N]) -> usize {
    let len = buf.len();
    let ptr = buf.as_ptr();
    let mut splat = [_mm512_setzero_si512(); N];
    for (v, &n) in splat.iter_mut().zip(needles.iter()) {
        *v = _mm512_set1_epi8(n as i8);
    }

    let mut i = 0;
    while i + 64 <= len {
        let chunk = _mm512_loadu_si512(ptr.add(i).cast());
        let mut mask: u64 = 0;
        for v in &splat {
            mask |= _mm512_cmpeq_epi8_mask(chunk, *v);
        }
        if mask != 0 {
            return i + mask.trailing_zeros() as usize;
        }
        i += 64;
    }

    i + find_any_sse2(&buf[i..], needles)
}

#[target_feature(enable = "avx512f,avx512bw")]
pub unsafe fn find_char_avx512(buf: &[u8], c: u8) -> usize {
    find_any_avx512(buf, [c])
}

#[target_feature(enable = "avx512f,avx512bw")]
pub unsafe fn find_set2_avx512(buf: &[u8], a: u8, b: u8) -> usize {
    find_any_avx512(buf, [a, b])
}

#[target_feature(enable = "avx512f,avx512bw")]
pub unsafe fn find_set4_avx512(buf: &[u8], set: [u8; 4]) -> usize {
    find_any_avx512(buf, set)
}

#[target_feature(enable = "avx512f,avx512bw")]
pub unsafe fn xor_stream_avx512(buf: &mut [u8], key: [u8; 4]) {
    let len = buf.len();
    let ptr = buf.as_mut_ptr();
    let k = _mm512_set1_epi32(i32::from_ne_bytes(key));

    let mut i = 0;
    while i + 64 <= len {
        let p = ptr.add(i);
        let v = _mm512_loadu_si512(p.cast_const().cast());
        _mm512_storeu_si512(p.cast(), _mm512_xor_si512(v, k));
        i += 64;
    }

    xor_stream_sse2(&mut buf[i..], key);
}
