//! 4-way bucket compare, scalar and AVX2, spec §4.3 / §9 ("SIMD hot paths
//! must have a scalar fallback producing identical results; tests must
//! run both paths").
//!
//! Dispatch is a runtime [`is_x86_feature_detected!`] check, grounded on
//! the pack's AVX2 gather/compare pattern (gobble's `x86_64` bucket scan):
//! no build-time target-feature requirement, so the same binary runs on
//! any host and only takes the wide path where the CPU actually supports
//! it.

use crate::entry::{ADDR_AND_OCCUPIED_MASK, Entry, OCCUPIED_BIT_VALUE};

/// Finds the index of the entry matching `addr` within `bucket`, if any.
/// `bucket.len()` is 1, 2, or 4 (spec §4.3's three supported widths).
#[must_use]
pub fn find_match(bucket: &[Entry], addr: u64) -> Option<usize> {
    #[cfg(target_arch = "x86_64")]
    {
        if bucket.len() == 4 && is_x86_feature_detected!("avx2") {
            // SAFETY: length checked above, feature checked above.
            return unsafe { find_match_avx2(bucket, addr) };
        }
    }
    find_match_scalar(bucket, addr)
}

/// Portable fallback: a plain linear scan.
#[must_use]
pub fn find_match_scalar(bucket: &[Entry], addr: u64) -> Option<usize> {
    bucket.iter().position(|e| e.matches(addr))
}

#[cfg(target_arch = "x86_64")]
#[target_feature(enable = "avx2")]
unsafe fn find_match_avx2(bucket: &[Entry], addr: u64) -> Option<usize> {
    use std::arch::x86_64::{
        __m256i, _mm256_and_si256, _mm256_castsi256_pd, _mm256_cmpeq_epi64, _mm256_loadu_si256,
        _mm256_movemask_pd, _mm256_set1_epi64x,
    };

    debug_assert_eq!(bucket.len(), 4);
    let target = (addr & ADDR_AND_OCCUPIED_MASK) | OCCUPIED_BIT_VALUE;

    // SAFETY: `bucket` is exactly four contiguous `Entry(u64)` (an
    // `#[repr(Rust)]` newtype over `u64`, same layout as `u64`), so the
    // 32-byte unaligned load covers the whole bucket.
    let data = unsafe { _mm256_loadu_si256(bucket.as_ptr().cast::<__m256i>()) };
    let mask = _mm256_set1_epi64x(ADDR_AND_OCCUPIED_MASK as i64);
    let target_vec = _mm256_set1_epi64x(target as i64);
    let masked = _mm256_and_si256(data, mask);
    let cmp = _mm256_cmpeq_epi64(masked, target_vec);
    let bits = _mm256_movemask_pd(_mm256_castsi256_pd(cmp));
    if bits == 0 {
        None
    } else {
        Some(bits.trailing_zeros() as usize)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_bucket() -> [Entry; 4] {
        [
            Entry::new(0x1111_1111_1111, 1),
            Entry::EMPTY,
            Entry::new(0x3333_3333_3333, 3),
            Entry::EMPTY,
        ]
    }

    #[test]
    fn scalar_finds_present_and_misses_absent() {
        let bucket = sample_bucket();
        assert_eq!(find_match_scalar(&bucket, 0x1111_1111_1111), Some(0));
        assert_eq!(find_match_scalar(&bucket, 0x3333_3333_3333), Some(2));
        assert_eq!(find_match_scalar(&bucket, 0x9999_9999_9999), None);
    }

    #[test]
    fn dispatch_agrees_with_scalar_on_every_width() {
        let bucket = sample_bucket();
        for mac in [0x1111_1111_1111, 0x3333_3333_3333, 0x9999_9999_9999, 0] {
            assert_eq!(find_match(&bucket, mac), find_match_scalar(&bucket, mac));
        }
        assert_eq!(find_match(&bucket[..1], 0x1111_1111_1111), Some(0));
        assert_eq!(find_match(&bucket[..2], 0x3333_3333_3333), None);
    }

    #[cfg(target_arch = "x86_64")]
    #[test]
    fn avx2_path_agrees_with_scalar_when_available() {
        if !is_x86_feature_detected!("avx2") {
            return;
        }
        let bucket = sample_bucket();
        for mac in [0x1111_1111_1111, 0x3333_3333_3333, 0x9999_9999_9999, 0] {
            let scalar = find_match_scalar(&bucket, mac);
            let avx2 = unsafe { find_match_avx2(&bucket, mac) };
            assert_eq!(scalar, avx2);
        }
    }
}
