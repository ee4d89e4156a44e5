//! Distance scoring between two similarity digests.
//!
//! The score is a weighted, saturating sum of header and body differences.
//! Smaller means more similar; identical digests score exactly 0. The
//! function is total over all digest pairs, symmetric, and never panics.

use once_cell::sync::Lazy;

use super::Digest;

/// Weight multiplier for header differences beyond the adjacent band.
const HEADER_STEP_WEIGHT: u32 = 12;

/// Score for a bucket pair quantized to opposite extremes (code distance 3).
const OUTLIER_PAIR_SCORE: u16 = 6;

/// Per-byte body difference: each byte packs four 2-bit bucket codes, so a
/// full 256x256 table collapses the inner loop to one lookup per body byte.
static BIT_PAIRS_DIFF: Lazy<Box<[[u16; 256]; 256]>> = Lazy::new(|| {
    let mut table = Box::new([[0u16; 256]; 256]);
    for a in 0..256usize {
        for b in 0..256usize {
            let mut total = 0u16;
            for shift in [0u32, 2, 4, 6] {
                let ca = (a >> shift) & 0b11;
                let cb = (b >> shift) & 0b11;
                let d = ca.abs_diff(cb) as u16;
                total += if d == 3 { OUTLIER_PAIR_SCORE } else { d };
            }
            table[a][b] = total;
        }
    }
    table
});

/// Circular difference on a ring of `range` values.
#[inline]
fn mod_diff(a: u8, b: u8, range: u16) -> u32 {
    let a = a as u16 % range;
    let b = b as u16 % range;
    let forward = (a + range - b) % range;
    let backward = (b + range - a) % range;
    forward.min(backward) as u32
}

/// Distance contributed by the length-bucket term alone. This is a lower
/// bound on the full distance, which the query engine's banding prefilter
/// relies on; it must stay consistent with [`distance`].
pub(crate) fn length_term(a: u8, b: u8) -> u32 {
    match mod_diff(a, b, 256) {
        0 => 0,
        1 => 1,
        d => d.saturating_mul(HEADER_STEP_WEIGHT),
    }
}

/// Compute the distance between two digests.
///
/// Terms: length-bucket difference (adjacent buckets score 1, anything wider
/// scales by [`HEADER_STEP_WEIGHT`]), the two quartile-ratio differences on a
/// mod-16 ring with the same banding, a single point when the stream
/// checksums differ, and the summed body-code differences.
pub fn distance(a: &Digest, b: &Digest) -> u32 {
    let mut score: u32 = 0;

    score = score.saturating_add(length_term(a.length_bucket(), b.length_bucket()));

    for (ra, rb) in [
        (a.q1_ratio(), b.q1_ratio()),
        (a.q2_ratio(), b.q2_ratio()),
    ] {
        let rd = mod_diff(ra, rb, 16);
        score = score.saturating_add(if rd <= 1 {
            rd
        } else {
            (rd - 1).saturating_mul(HEADER_STEP_WEIGHT)
        });
    }

    if a.checksum() != b.checksum() {
        score = score.saturating_add(1);
    }

    let table = &*BIT_PAIRS_DIFF;
    for (&ba, &bb) in a.body().iter().zip(b.body().iter()) {
        score = score.saturating_add(table[ba as usize][bb as usize] as u32);
    }

    score
}
