// SPDX-License-Identifier: LGPL-3.0-or-later
/*
 * rawspeed - decompressors/nikon.rs
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

//! Nikon NEF "quantized" decompression.
//!
//! The maker note meta blob (tag 0x96, or 0x8C on older bodies)
//! declares which of the six fixed Huffman trees to use, the initial
//! vertical predictors, a sampled linearization curve, and on lossy
//! files the row where the stream switches to the post split tree.

use crate::bitstream::BitPumpMsb;
use crate::bytestream::ByteStream;
use crate::decompressors::huffman::HuffmanTable;
use crate::rawimage::{RawImage, RawImageType};
use crate::utils::clamp_bits;
use crate::{Error, Result};

/// The six fixed trees, from the reference decoder: 16 length counts
/// then the values. Values above 15 carry a shift in the high
/// nibble (14 bit lossy and lossless trees).
const NIKON_TREE: [[u8; 32]; 6] = [
    // 12-bit lossy
    [
        0, 1, 5, 1, 1, 1, 1, 1, 1, 2, 0, 0, 0, 0, 0, 0, //
        5, 4, 3, 6, 2, 7, 1, 0, 8, 9, 11, 10, 12, 0, 0, 0,
    ],
    // 12-bit lossy after split
    [
        0, 1, 5, 1, 1, 1, 1, 1, 1, 2, 0, 0, 0, 0, 0, 0, //
        0x39, 0x5a, 0x38, 0x27, 0x16, 5, 4, 3, 2, 1, 0, 11, 12, 12, 0, 0,
    ],
    // 12-bit lossless
    [
        0, 1, 4, 2, 3, 1, 2, 0, 0, 0, 0, 0, 0, 0, 0, 0, //
        5, 4, 6, 3, 7, 2, 8, 1, 9, 0, 10, 11, 12, 0, 0, 0,
    ],
    // 14-bit lossy
    [
        0, 1, 4, 3, 1, 1, 1, 1, 1, 2, 0, 0, 0, 0, 0, 0, //
        5, 6, 4, 7, 8, 3, 9, 2, 1, 0, 10, 11, 12, 13, 14, 0,
    ],
    // 14-bit lossy after split
    [
        0, 1, 5, 1, 1, 1, 1, 1, 1, 1, 2, 0, 0, 0, 0, 0, //
        8, 0x5c, 0x4b, 0x3a, 0x29, 7, 6, 5, 4, 3, 2, 1, 0, 13, 14, 0,
    ],
    // 14-bit lossless
    [
        0, 1, 4, 2, 2, 3, 1, 2, 0, 0, 0, 0, 0, 0, 0, 0, //
        7, 6, 8, 5, 9, 4, 10, 3, 11, 12, 2, 0, 1, 13, 14, 0,
    ],
];

fn create_huffman_table(select: usize) -> Result<HuffmanTable> {
    let tree = NIKON_TREE
        .get(select)
        .ok_or_else(|| Error::Decoder(format!("NEF: no Huffman tree {select}")))?;
    let mut counts = [0_u8; 16];
    counts.copy_from_slice(&tree[..16]);
    let total: usize = counts.iter().map(|c| *c as usize).sum();
    HuffmanTable::new(&counts, &tree[16..16 + total])
}

/// A length code with an optional shift in the high nibble.
fn get_diff(pump: &mut BitPumpMsb, value: u8) -> Result<i32> {
    let len = i32::from(value & 15);
    let shl = i32::from(value >> 4);
    if len == 0 {
        return Ok(0);
    }
    let bits = pump.get_bits((len - shl) as u32)? as i32;
    let mut diff = ((bits << 1) + 1) << shl >> 1;
    if diff & (1 << (len - 1)) == 0 {
        diff -= (1 << len) - i32::from(shl == 0);
    }
    Ok(diff)
}

pub(crate) struct NikonDecompressor {
    huff_select: usize,
    split: usize,
    vpred: [[i32; 2]; 2],
    curve: Vec<u16>,
    bits_per_sample: u32,
}

impl NikonDecompressor {
    pub fn new(image: &RawImage, mut metadata: ByteStream, bits_per_sample: u32) -> Result<NikonDecompressor> {
        if image.cpp() != 1 || image.data_type() != RawImageType::U16 {
            return Err(Error::Decoder(
                "NEF: unexpected component count / data type".to_string(),
            ));
        }
        if bits_per_sample != 12 && bits_per_sample != 14 {
            return Err(Error::Decoder(format!(
                "NEF: invalid bits per sample {bits_per_sample}"
            )));
        }

        let v0 = metadata.get_u8()?;
        let v1 = metadata.get_u8()?;
        let mut huff_select = 0_usize;
        if v0 == 73 || v1 == 88 {
            metadata.skip(2110)?;
        }
        if v0 == 70 {
            huff_select = 2;
        }
        if bits_per_sample == 14 {
            huff_select += 3;
        }

        let mut vpred = [[0_i32; 2]; 2];
        for row in vpred.iter_mut() {
            for p in row.iter_mut() {
                *p = i32::from(metadata.get_u16()?);
            }
        }

        // the curve: sampled control points on lossy files, a full
        // table on lossless ones, identity otherwise
        let max = 1 << bits_per_sample;
        let mut curve: Vec<u16> = (0..=65535_u16).collect();
        let mut split = 0_usize;
        let csize = metadata.get_u16()? as usize;
        let mut step = 0_usize;
        if csize > 1 {
            step = max / (csize - 1);
        }
        if v0 == 68 && v1 == 32 && step > 0 {
            for i in 0..csize {
                curve[i * step] = metadata.get_u16()?;
            }
            for i in 0..max {
                let base = i - i % step;
                curve[i] = ((u32::from(curve[base]) * (step - i % step) as u32
                    + u32::from(curve[base + step]) * (i % step) as u32)
                    / step as u32) as u16;
            }
            metadata.seek(562)?;
            split = metadata.get_u16()? as usize;
        } else if v0 != 70 && csize <= 0x4001 {
            for c in curve.iter_mut().take(csize) {
                *c = metadata.get_u16()?;
            }
        }
        Ok(NikonDecompressor {
            huff_select,
            split,
            vpred,
            curve,
            bits_per_sample,
        })
    }

    /// The white point implied by the linearization curve.
    pub fn white_point(&self) -> u16 {
        self.curve[(1 << self.bits_per_sample) - 1]
    }

    pub fn decompress(
        &self,
        image: &mut RawImage,
        input: ByteStream,
        uncorrected_raw_values: bool,
    ) -> Result<()> {
        let dim = image.uncropped_dim();
        if !uncorrected_raw_values {
            image.set_table(Some((&self.curve, true)));
        }
        let table = image.table();

        let mut ht = create_huffman_table(self.huff_select)?;
        let mut pump = BitPumpMsb::new(input.peek_bytes(input.remaining())?);
        let mut random = pump.peek_bits(24)?;
        let mut vpred = self.vpred;
        let pitch = image.pitch_u16();
        let data = image.u16_data_mut();

        for row in 0..dim.y {
            if self.split != 0 && row == self.split {
                ht = create_huffman_table(self.huff_select + 1)?;
            }
            let mut hpred = [0_i32; 2];
            for col in 0..dim.x {
                let len = ht.decode(&mut pump)?;
                let diff = get_diff(&mut pump, len)?;
                if col < 2 {
                    vpred[row & 1][col] += diff;
                    hpred[col] = vpred[row & 1][col];
                } else {
                    hpred[col & 1] += diff;
                }
                let value = clamp_bits(i64::from(hpred[col & 1]), 15);
                let dst = &mut data[row * pitch + col];
                match &table {
                    Some(t) => *dst = t.apply(value, &mut random),
                    None => *dst = value,
                }
            }
        }

        if uncorrected_raw_values {
            // keep the curve available for a later lookup pass
            image.set_table(Some((&self.curve, false)));
        } else {
            image.set_table(None);
        }
        Ok(())
    }
}

#[cfg(test)]
mod test {
    use super::{create_huffman_table, get_diff, NikonDecompressor, NIKON_TREE};
    use crate::bitstream::BitPumpMsb;
    use crate::bytestream::{ByteStream, Endian};
    use crate::rawimage::{Point, RawImage};

    #[test]
    fn test_all_trees_build() {
        for select in 0..NIKON_TREE.len() {
            assert!(create_huffman_table(select).is_ok(), "tree {select}");
        }
    }

    #[test]
    fn test_get_diff_plain() {
        // value 3, bits 0b101 = 5 -> positive 5
        let data = [0b1010_0000_u8];
        let mut pump = BitPumpMsb::new(&data);
        assert_eq!(get_diff(&mut pump, 3).unwrap(), 5);

        // value 3, bits 0b010 -> negative: 2 - 7 = -5
        let data = [0b0100_0000_u8];
        let mut pump = BitPumpMsb::new(&data);
        assert_eq!(get_diff(&mut pump, 3).unwrap(), -5);
    }

    #[test]
    fn test_get_diff_with_shift() {
        // value 0x16: len 6, shl 1: read 5 bits
        let data = [0b1111_1000_u8];
        let mut pump = BitPumpMsb::new(&data);
        // bits 0b11111 -> diff = ((31 << 1) + 1) << 1 >> 1 = 63,
        // top bit of len 6 set so it stays positive
        assert_eq!(get_diff(&mut pump, 0x16).unwrap(), 63);
    }

    #[test]
    fn test_metadata_parse() {
        let mut img = RawImage::new_u16(Point::new(16, 2), 1);
        img.create_data();
        // v0, v1, vpred[4], csize=0 -> identity curve
        let mut meta = vec![0x44_u8, 0x40];
        for v in [100_u16, 200, 300, 400] {
            meta.extend_from_slice(&v.to_le_bytes());
        }
        meta.extend_from_slice(&0_u16.to_le_bytes());
        let d = NikonDecompressor::new(
            &img,
            ByteStream::new(&meta, Endian::Little),
            12,
        )
        .unwrap();
        assert_eq!(d.vpred, [[100, 200], [300, 400]]);
        assert_eq!(d.split, 0);
        // identity curve keeps the 12 bit ceiling
        assert_eq!(d.white_point(), 4095);
    }
}
