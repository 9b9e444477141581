//! aarch64 NEON kernels, 16 bytes per step.
//!
//! NEON has no movemask, so a block is first tested with a horizontal max
//! ("any lane matched?") and only then scanned byte by byte.

use std::arch::aarch64::*;

use super::scalar;

#[target_feature(enable = "neon")]
unsafe fn find_any_neon<const N: usize>(buf: &[u8], needles: [u8; N]) -> usize {
    let len = buf.len();
    let ptr = buf.as_ptr();
    let mut splat = [vdupq_n_u8(0); N];
    for (v, &n) in splat.iter_mut().zip(needles.iter()) {
        *v = vdupq_n_u8(n);
    }

    let mut i = 0;
    while i + 16 <= len {
        let chunk = vld1q_u8(ptr.add(i));
        let mut hits = vdupq_n_u8(0);
        for v in &splat {
            hits = vorrq_u8(hits, vceqq_u8(chunk, *v));
        }
        if vmaxvq_u8(hits) != 0 {
            return i + scalar::find_any(&buf[i..i + 16], needles);
        }
        i += 16;
    }

    i + scalar::find_any(&buf[i..], needles)
}

#[target_feature(enable = "neon")]
pub unsafe fn find_char_neon(buf: &[u8], c: u8) -> usize {
    find_any_neon(buf, [c])
}

#[target_feature(enable = "neon")]
pub unsafe fn find_set2_neon(buf: &[u8], a: u8, b: u8) -> usize {
    find_any_neon(buf, [a, b])
}

#[target_feature(enable = "neon")]
pub unsafe fn find_set4_neon(buf: &[u8], set: [u8; 4]) -> usize {
    find_any_neon(buf, set)
}

#[target_feature(enable = "neon")]
pub unsafe fn xor_stream_neon(buf: &mut [u8], key: [u8; 4]) {
    let len = buf.len();
    let ptr = buf.as_mut_ptr();
    let k = vreinterpretq_u8_u32(vdupq_n_u32(u32::from_ne_bytes(key)));

    let mut i = 0;
    while i + 16 <= len {
        let p = ptr.add(i);
        vst1q_u8(p, veorq_u8(vld1q_u8(p), k));
        i += 16;
    }

    scalar::xor_stream(&mut buf[i..], key);
}
