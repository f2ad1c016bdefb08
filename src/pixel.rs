//! Byte-level pixel primitives: wide XOR and grey-to-RGBX expansion.
//!
//! Both operations are specified by their scalar reference implementations;
//! the SSE2 and NEON paths produce bit-identical output and exist only for
//! throughput. Dispatch is compile-time: SSE2 is baseline on x86_64 and NEON
//! is baseline on aarch64, so no runtime feature detection is needed.

/// XOR `delta` into `frame`, byte by byte.
///
/// Panics if the slices differ in length.
pub fn xor_in_place(frame: &mut [u8], delta: &[u8]) {
    assert_eq!(frame.len(), delta.len());
    imp::xor_in_place(frame, delta);
}

/// Expand each grey byte `g` into the 4-byte tuple `(g, g, g, 0xFF)`.
///
/// `out` must be exactly four times the length of `grey`.
pub fn expand_grey_to_rgbx(grey: &[u8], out: &mut [u8]) {
    assert_eq!(out.len(), grey.len() * 4);
    imp::expand_grey_to_rgbx(grey, out);
}

mod scalar {
    pub fn xor_in_place(frame: &mut [u8], delta: &[u8]) {
        for (f, d) in frame.iter_mut().zip(delta) {
            *f ^= *d;
        }
    }

    pub fn expand_grey_to_rgbx(grey: &[u8], out: &mut [u8]) {
        for (g, px) in grey.iter().zip(out.chunks_exact_mut(4)) {
            px[0] = *g;
            px[1] = *g;
            px[2] = *g;
            px[3] = 0xFF;
        }
    }
}

#[cfg(target_arch = "x86_64")]
mod imp {
    use core::arch::x86_64::*;

    pub fn xor_in_place(frame: &mut [u8], delta: &[u8]) {
        let len = frame.len();
        let mut i = 0;
        unsafe {
            // Four XMM lanes per iteration, matching the 64-byte cache line.
            while i + 64 <= len {
                let f = frame.as_mut_ptr().add(i);
                let d = delta.as_ptr().add(i);
                let x0 = _mm_xor_si128(
                    _mm_loadu_si128(f as *const __m128i),
                    _mm_loadu_si128(d as *const __m128i),
                );
                let x1 = _mm_xor_si128(
                    _mm_loadu_si128(f.add(16) as *const __m128i),
                    _mm_loadu_si128(d.add(16) as *const __m128i),
                );
                let x2 = _mm_xor_si128(
                    _mm_loadu_si128(f.add(32) as *const __m128i),
                    _mm_loadu_si128(d.add(32) as *const __m128i),
                );
                let x3 = _mm_xor_si128(
                    _mm_loadu_si128(f.add(48) as *const __m128i),
                    _mm_loadu_si128(d.add(48) as *const __m128i),
                );
                _mm_storeu_si128(f as *mut __m128i, x0);
                _mm_storeu_si128(f.add(16) as *mut __m128i, x1);
                _mm_storeu_si128(f.add(32) as *mut __m128i, x2);
                _mm_storeu_si128(f.add(48) as *mut __m128i, x3);
                i += 64;
            }
            while i + 16 <= len {
                let f = frame.as_mut_ptr().add(i) as *mut __m128i;
                let d = delta.as_ptr().add(i) as *const __m128i;
                _mm_storeu_si128(f, _mm_xor_si128(_mm_loadu_si128(f), _mm_loadu_si128(d)));
                i += 16;
            }
        }
        super::scalar::xor_in_place(&mut frame[i..], &delta[i..]);
    }

    pub fn expand_grey_to_rgbx(grey: &[u8], out: &mut [u8]) {
        let len = grey.len();
        let mut i = 0;
        unsafe {
            let alpha = _mm_set1_epi8(-1);
            while i + 16 <= len {
                let g = _mm_loadu_si128(grey.as_ptr().add(i) as *const __m128i);
                // Interleave g with itself and with 0xFF: 16-bit lanes of
                // (g,g) zipped with (g,FF) yield g,g,g,FF per pixel.
                let gg_lo = _mm_unpacklo_epi8(g, g);
                let gg_hi = _mm_unpackhi_epi8(g, g);
                let ga_lo = _mm_unpacklo_epi8(g, alpha);
                let ga_hi = _mm_unpackhi_epi8(g, alpha);
                let dst = out.as_mut_ptr().add(i * 4);
                _mm_storeu_si128(dst as *mut __m128i, _mm_unpacklo_epi16(gg_lo, ga_lo));
                _mm_storeu_si128(
                    dst.add(16) as *mut __m128i,
                    _mm_unpackhi_epi16(gg_lo, ga_lo),
                );
                _mm_storeu_si128(
                    dst.add(32) as *mut __m128i,
                    _mm_unpacklo_epi16(gg_hi, ga_hi),
                );
                _mm_storeu_si128(
                    dst.add(48) as *mut __m128i,
                    _mm_unpackhi_epi16(gg_hi, ga_hi),
                );
                i += 16;
            }
        }
        super::scalar::expand_grey_to_rgbx(&grey[i..], &mut out[i * 4..]);
    }
}

#[cfg(target_arch = "aarch64")]
mod imp {
    use core::arch::aarch64::*;

    pub fn xor_in_place(frame: &mut [u8], delta: &[u8]) {
        let len = frame.len();
        let mut i = 0;
        unsafe {
            while i + 64 <= len {
                let f = frame.as_mut_ptr().add(i);
                let d = delta.as_ptr().add(i);
                let x0 = veorq_u8(vld1q_u8(f), vld1q_u8(d));
                let x1 = veorq_u8(vld1q_u8(f.add(16)), vld1q_u8(d.add(16)));
                let x2 = veorq_u8(vld1q_u8(f.add(32)), vld1q_u8(d.add(32)));
                let x3 = veorq_u8(vld1q_u8(f.add(48)), vld1q_u8(d.add(48)));
                vst1q_u8(f, x0);
                vst1q_u8(f.add(16), x1);
                vst1q_u8(f.add(32), x2);
                vst1q_u8(f.add(48), x3);
                i += 64;
            }
            while i + 16 <= len {
                let f = frame.as_mut_ptr().add(i);
                let d = delta.as_ptr().add(i);
                vst1q_u8(f, veorq_u8(vld1q_u8(f), vld1q_u8(d)));
                i += 16;
            }
        }
        super::scalar::xor_in_place(&mut frame[i..], &delta[i..]);
    }

    pub fn expand_grey_to_rgbx(grey: &[u8], out: &mut [u8]) {
        let len = grey.len();
        let mut i = 0;
        unsafe {
            let alpha = vdupq_n_u8(0xFF);
            while i + 16 <= len {
                let g = vld1q_u8(grey.as_ptr().add(i));
                let rgbx = uint8x16x4_t(g, g, g, alpha);
                vst4q_u8(out.as_mut_ptr().add(i * 4), rgbx);
                i += 16;
            }
        }
        super::scalar::expand_grey_to_rgbx(&grey[i..], &mut out[i * 4..]);
    }
}

#[cfg(not(any(target_arch = "x86_64", target_arch = "aarch64")))]
mod imp {
    pub use super::scalar::{expand_grey_to_rgbx, xor_in_place};
}
