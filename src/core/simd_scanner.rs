// Vectorized first-match search over 16/32-byte chunks.
//
// ## Stabilization-safe API subset (std::simd)
//
// We use only: Simd::from_slice, splat, simd_eq, to_bitmask, bitwise ops.
// These are the most stable parts of portable_simd. We avoid: swizzle,
// scatter, gather, and any SIMD shuffles.
//
// ## Bitmask types
//
// On current nightly, `Mask::to_bitmask()` returns u64 regardless of lane
// count. We mask to the relevant bits (lower 16 for CHUNK=16, lower 32 for
// WIDE=32) and operate on u64 uniformly.
//
// Unlike a structural-index scanner we only need the FIRST match per call,
// so each chunk reduces to "any bit set?" followed by trailing_zeros.
// The scalar tail (and inputs shorter than one vector) go through the
// reference implementations in scanner.rs.

use std::simd::prelude::*;

use super::scanner::{find_any_special_scalar, find_byte_scalar};

/// Baseline SIMD chunk size (128-bit).
const CHUNK: usize = 16;

/// Wide chunk size for AVX2 targets.
#[cfg(target_feature = "avx2")]
const WIDE: usize = 32;

const MASK_16: u64 = (1u64 << 16) - 1;
#[cfg(target_feature = "avx2")]
const MASK_32: u64 = (1u64 << 32) - 1;

/// Vectorized `find_byte`.
pub fn find_byte_simd(data: &[u8], target: u8, start: usize) -> Option<usize> {
    let mut pos = start.min(data.len());

    #[cfg(target_feature = "avx2")]
    {
        let splat = Simd::<u8, WIDE>::splat(target);
        while pos + WIDE <= data.len() {
            let chunk = Simd::<u8, WIDE>::from_slice(&data[pos..pos + WIDE]);
            let mask = chunk.simd_eq(splat).to_bitmask() & MASK_32;
            if mask != 0 {
                return Some(pos + mask.trailing_zeros() as usize);
            }
            pos += WIDE;
        }
    }

    {
        let splat = Simd::<u8, CHUNK>::splat(target);
        while pos + CHUNK <= data.len() {
            let chunk = Simd::<u8, CHUNK>::from_slice(&data[pos..pos + CHUNK]);
            let mask = chunk.simd_eq(splat).to_bitmask() & MASK_16;
            if mask != 0 {
                return Some(pos + mask.trailing_zeros() as usize);
            }
            pos += CHUNK;
        }
    }

    find_byte_scalar(data, target, pos)
}

/// Vectorized three-way search for {delim, quote, `\n`}: three equality
/// masks ORed before reduction.
pub fn find_any_special_simd(
    data: &[u8],
    delim: u8,
    quote: u8,
    start: usize,
) -> Option<(usize, u8)> {
    let mut pos = start.min(data.len());

    #[cfg(target_feature = "avx2")]
    {
        let delim_splat = Simd::<u8, WIDE>::splat(delim);
        let quote_splat = Simd::<u8, WIDE>::splat(quote);
        let lf_splat = Simd::<u8, WIDE>::splat(b'\n');
        while pos + WIDE <= data.len() {
            let chunk = Simd::<u8, WIDE>::from_slice(&data[pos..pos + WIDE]);
            let hits = chunk.simd_eq(delim_splat) | chunk.simd_eq(quote_splat)
                | chunk.simd_eq(lf_splat);
            let mask = hits.to_bitmask() & MASK_32;
            if mask != 0 {
                let idx = pos + mask.trailing_zeros() as usize;
                return Some((idx, data[idx]));
            }
            pos += WIDE;
        }
    }

    {
        let delim_splat = Simd::<u8, CHUNK>::splat(delim);
        let quote_splat = Simd::<u8, CHUNK>::splat(quote);
        let lf_splat = Simd::<u8, CHUNK>::splat(b'\n');
        while pos + CHUNK <= data.len() {
            let chunk = Simd::<u8, CHUNK>::from_slice(&data[pos..pos + CHUNK]);
            let hits = chunk.simd_eq(delim_splat) | chunk.simd_eq(quote_splat)
                | chunk.simd_eq(lf_splat);
            let mask = hits.to_bitmask() & MASK_16;
            if mask != 0 {
                let idx = pos + mask.trailing_zeros() as usize;
                return Some((idx, data[idx]));
            }
            pos += CHUNK;
        }
    }

    find_any_special_scalar(data, delim, quote, pos)
}
