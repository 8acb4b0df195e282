// SPDX-License-Identifier: LGPL-3.0-or-later
/*
 * rawspeed - decompressors/vc5/codebook.rs
 *
 * Copyright (C) 2024-2026 Hubert Figuière
 *
 * This library is free software: you can redistribute it and/or
 * modify it under the terms of the GNU Lesser General Public License
 * as published by the Free Software Foundation, either version 3 of
 * the License, or (at your option) any later version.
 *
 * This library is distributed in the hope that it will be useful,
 * but WITHOUT ANY WARRANTY; without even the implied warranty of
 * MERCHANTABILITY or FITNESS FOR A PARTICULAR PURPOSE.  See the GNU
 * Lesser General Public License for more details.
 *
 * You should have received a copy of the GNU Lesser General Public
 * License along with this library.  If not, see
 * <http://www.gnu.org/licenses/>.
 */

//! The run length / value codebook for the VC-5 highpass bands.
//!
//! Every subband except the lowpass raster is coded as (run, value)
//! pairs against this fixed prefix code, ordered by code size so the
//! decoder can scan it front to back. Values are stored companded;
//! [`decompanded`] yields the working copy with the curve inverted.
//! The band end marker is the all ones code with a zero run.

use once_cell::sync::Lazy;

/// One codebook entry: a `size` bit code word (right justified in
/// `bits`), decoding to `count` pixels of `value`.
#[derive(Clone, Copy, Debug)]
pub(crate) struct Rlv {
    pub size: u32,
    pub bits: u32,
    pub count: u16,
    pub value: i16,
}

/// The value a band terminates with, zero count.
pub(crate) const MARKER_BAND_END: i16 = 1;

const fn e(size: u32, bits: u32, count: u16, value: i16) -> Rlv {
    Rlv {
        size,
        bits,
        count,
        value,
    }
}

/// The codebook, shortest codes first. Zero runs dominate wavelet
/// highpass data, so they get the shortest codes; magnitudes
/// alternate with longer runs further down.
pub(crate) const TABLE: [Rlv; 26] = [
    e(1, 0b0, 1, 0),
    e(2, 0b10, 2, 0),
    e(3, 0b110, 1, 1),
    e(4, 0b1110, 4, 0),
    e(5, 0b11110, 1, 2),
    e(6, 0b111110, 8, 0),
    e(7, 0b1111110, 1, 3),
    e(8, 0b11111110, 16, 0),
    e(9, 0b111111110, 1, 4),
    e(10, 0b1111111110, 32, 0),
    e(11, 0b11111111110, 1, 5),
    e(12, 0b111111111110, 64, 0),
    e(13, 0b1111111111110, 1, 6),
    e(14, 0b11111111111110, 128, 0),
    e(15, 0b111111111111110, 1, 8),
    e(16, 0b1111111111111110, 256, 0),
    e(17, 0b11111111111111110, 1, 12),
    e(18, 0b111111111111111110, 512, 0),
    e(19, 0b1111111111111111110, 1, 18),
    e(20, 0b11111111111111111110, 1024, 0),
    e(21, 0b111111111111111111110, 1, 27),
    e(22, 0b1111111111111111111110, 1, 41),
    e(23, 0b11111111111111111111110, 1, 62),
    e(24, 0b111111111111111111111110, 1, 93),
    e(25, 0b1111111111111111111111110, 1, 140),
    // the band end marker terminates every subband
    e(26, 0b11111111111111111111111111, 0, MARKER_BAND_END),
];

/// The longest code word, plus the trailing sign bit.
pub(crate) const MAX_CODE_BITS: u32 = 26 + 1;

/// Invert the companding curve applied to coded magnitudes.
pub(crate) fn decompand(val: i16) -> i16 {
    let c = f64::from(val);
    let c = c + (c * c * c * 768.0) / (255.0 * 255.0 * 255.0);
    c.clamp(f64::from(i16::MIN), f64::from(i16::MAX)) as i16
}

/// The codebook with every value decompanded.
pub(crate) fn decompanded() -> &'static [Rlv; 26] {
    static DECOMPANDED: Lazy<[Rlv; 26]> = Lazy::new(|| {
        let mut table = TABLE;
        for entry in table.iter_mut() {
            entry.value = decompand(entry.value);
        }
        table
    });
    &DECOMPANDED
}

#[cfg(test)]
mod test {
    use super::{decompand, decompanded, TABLE, MARKER_BAND_END};

    #[test]
    fn test_prefix_free() {
        // no code word is a prefix of a longer one
        for (i, a) in TABLE.iter().enumerate() {
            for b in TABLE.iter().skip(i + 1) {
                assert!(b.size >= a.size);
                assert_ne!(b.bits >> (b.size - a.size), a.bits, "{a:?} prefixes {b:?}");
            }
        }
    }

    #[test]
    fn test_decompand() {
        assert_eq!(decompand(0), 0);
        // the band end marker passes through unchanged
        assert_eq!(decompand(MARKER_BAND_END), MARKER_BAND_END);
        // negation commutes with decompanding
        for v in [0_i16, 1, 5, 100, 1000, 8000] {
            assert_eq!(decompand(-v), -decompand(v));
        }
        // the curve expands large magnitudes
        assert!(decompand(1000) > 1000);
    }

    #[test]
    fn test_decompanded_table() {
        let table = decompanded();
        assert_eq!(table[0].value, 0);
        assert_eq!(table.last().unwrap().count, 0);
        assert_eq!(table.last().unwrap().value, MARKER_BAND_END);
    }
}
