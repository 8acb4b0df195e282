// SPDX-License-Identifier: LGPL-3.0-or-later
/*
 * rawspeed - decompressors/olympus.rs
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

//! Olympus ORF decompression.
//!
//! A carry state difference coder: per column parity a three element
//! carry drives the expected bit count, a 4096 entry table maps the
//! 12 bit lookahead to the run length of the "high" part, and the
//! predictor picks between left, up and an average depending on the
//! local gradient.

use crate::bitstream::BitPumpMsb;
use crate::bytestream::ByteStream;
use crate::rawimage::{RawImage, RawImageType};
use crate::{Error, Result};

pub(crate) struct OlympusDecompressor {
    /// Leading zero count of the low 12 lookahead bits.
    bittable: [u8; 4096],
    width: usize,
    height: usize,
}

fn get_pred(row: usize, x: usize, dest: &[u16], up: &[u16]) -> i32 {
    if row < 2 && x < 2 {
        return 0;
    }
    if row < 2 {
        return i32::from(dest[x - 2]);
    }
    if x < 2 {
        return i32::from(up[x]);
    }
    let left = i32::from(dest[x - 2]);
    let up_v = i32::from(up[x]);
    let left_up = i32::from(up[x - 2]);
    let left_minus_nw = left - left_up;
    let up_minus_nw = up_v - left_up;
    if (left_minus_nw < 0) != (up_minus_nw < 0) && left_minus_nw != 0 && up_minus_nw != 0 {
        if left_minus_nw.abs() > 32 || up_minus_nw.abs() > 32 {
            left + up_minus_nw
        } else {
            (left + up_v) >> 1
        }
    } else if left_minus_nw.abs() > up_minus_nw.abs() {
        left
    } else {
        up_v
    }
}

impl OlympusDecompressor {
    pub fn new(image: &RawImage) -> Result<OlympusDecompressor> {
        if image.cpp() != 1 || image.data_type() != RawImageType::U16 {
            return Err(Error::Decoder(
                "ORF: unexpected component count / data type".to_string(),
            ));
        }
        let dim = image.uncropped_dim();
        if dim.x == 0 || dim.y == 0 || dim.x % 2 != 0 || dim.x > 10400 || dim.y > 7792 {
            return Err(Error::Decoder(format!(
                "ORF: unexpected image dimensions ({}; {})",
                dim.x, dim.y
            )));
        }
        let mut bittable = [12_u8; 4096];
        for (i, value) in bittable.iter_mut().enumerate() {
            for high in 0..12 {
                if (i >> (11 - high)) & 1 != 0 {
                    *value = high as u8;
                    break;
                }
            }
        }
        Ok(OlympusDecompressor {
            bittable,
            width: dim.x,
            height: dim.y,
        })
    }

    fn parse_carry(&self, pump: &mut BitPumpMsb, carry: &mut [i32; 3]) -> Result<i32> {
        let i = 2 * i32::from(carry[2] < 3);
        let mut nbits = 2 + i;
        while (carry[0] as u16 as u32) >> (nbits + i) != 0 {
            nbits += 1;
        }

        let b = pump.peek_bits(15)? as i32;
        let sign = -(b >> 14);
        let low = (b >> 12) & 3;
        let mut high = i32::from(self.bittable[(b & 4095) as usize]);
        if high == 12 {
            pump.skip_bits_no_fill(15);
            high = (pump.get_bits((16 - nbits) as u32)? >> 1) as i32;
        } else {
            pump.skip_bits_no_fill((high + 1 + 3) as u32);
        }

        carry[0] = (high << nbits) | pump.get_bits(nbits as u32)? as i32;
        let diff = (carry[0] ^ sign) + carry[1];
        carry[1] = (diff * 3 + carry[1]) >> 5;
        carry[2] = if carry[0] > 16 { 0 } else { carry[2] + 1 };
        Ok((diff * 4) | low)
    }

    pub fn decompress(&self, image: &mut RawImage, input: ByteStream) -> Result<()> {
        if input.remaining() < 8 {
            return Err(Error::Decoder("ORF: compressed data too small".to_string()));
        }
        // the stream starts after a 7 byte preamble; pad the tail so
        // the 15 bit lookahead never runs dry on the last pixels
        let mut padded = input.peek_bytes(input.remaining())?[7..].to_vec();
        padded.extend_from_slice(&[0_u8; 4]);
        let mut pump = BitPumpMsb::new(&padded);

        let pitch = image.pitch_u16();
        let w = self.width;
        let data = image.u16_data_mut();
        for row in 0..self.height {
            let mut acarry = [[0_i32; 3]; 2];
            let (before, current) = data.split_at_mut(row * pitch);
            let dest = &mut current[..w];
            let up: &[u16] = if row > 1 {
                &before[(row - 2) * pitch..(row - 2) * pitch + w]
            } else {
                &[]
            };
            for x in 0..w {
                let diff = self.parse_carry(&mut pump, &mut acarry[x & 1])?;
                let pred = get_pred(row, x, dest, up);
                dest[x] = (pred + diff) as u16;
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod test {
    use super::{get_pred, OlympusDecompressor};
    use crate::rawimage::{Point, RawImage};

    #[test]
    fn test_bittable() {
        let mut img = RawImage::new_u16(Point::new(16, 2), 1);
        img.create_data();
        let d = OlympusDecompressor::new(&img).unwrap();
        // top bit set: zero leading zeros
        assert_eq!(d.bittable[0x800], 0);
        assert_eq!(d.bittable[0x400], 1);
        assert_eq!(d.bittable[0x001], 11);
        assert_eq!(d.bittable[0x000], 12);
    }

    #[test]
    fn test_get_pred() {
        // first rows predict from the left
        let dest = [100_u16, 0, 0, 0];
        assert_eq!(get_pred(0, 0, &dest, &[]), 0);
        assert_eq!(get_pred(0, 2, &dest, &[]), 100);
        // later rows with x < 2 predict from two rows up
        let up = [55_u16, 0, 60, 0];
        assert_eq!(get_pred(2, 0, &dest, &up), 55);
        // gradients of the same sign pick the neighbour further
        // from the corner
        assert_eq!(get_pred(2, 2, &dest, &up), 100);
    }

    #[test]
    fn test_too_small_input() {
        let mut img = RawImage::new_u16(Point::new(16, 2), 1);
        img.create_data();
        let d = OlympusDecompressor::new(&img).unwrap();
        let input = [0_u8; 4];
        let stream = crate::bytestream::ByteStream::new(&input, crate::bytestream::Endian::Little);
        assert!(d.decompress(&mut img, stream).is_err());
    }
}
