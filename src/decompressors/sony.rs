// SPDX-License-Identifier: LGPL-3.0-or-later
/*
 * rawspeed - decompressors/sony.rs
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

//! Sony ARW decompression.
//!
//! ARW1 is a column major delta coder with a running sum clamped to
//! 12 bits. ARW2 packs every 16 pixels of a row pair into exactly
//! 128 bits: an 11 bit max and min, their 4 bit positions, and seven
//! bit residuals for the rest, scaled by a per group shift.

use rayon::prelude::*;

use crate::bitstream::{BitPumpLsb, BitPumpMsb};
use crate::bytestream::ByteStream;
use crate::decompressors::check_error_log;
use crate::rawimage::{RawImage, RawImageData, RawImageType, TableLookUp};
use crate::utils::sign_extend;
use crate::{Error, Result};

pub(crate) struct SonyArw1Decompressor {
    width: usize,
    height: usize,
}

impl SonyArw1Decompressor {
    pub fn new(image: &RawImage) -> Result<SonyArw1Decompressor> {
        if image.cpp() != 1 || image.data_type() != RawImageType::U16 {
            return Err(Error::Decoder(
                "ARW1: unexpected component count / data type".to_string(),
            ));
        }
        let dim = image.uncropped_dim();
        if dim.x == 0 || dim.y == 0 || dim.y % 2 != 0 || dim.x > 4600 || dim.y > 3072 {
            return Err(Error::Decoder(format!(
                "ARW1: unexpected image dimensions ({}; {})",
                dim.x, dim.y
            )));
        }
        Ok(SonyArw1Decompressor {
            width: dim.x,
            height: dim.y,
        })
    }

    fn get_diff(pump: &mut BitPumpMsb, len: u32) -> Result<i32> {
        if len == 0 {
            return Ok(0);
        }
        Ok(sign_extend(pump.get_bits(len)?, len))
    }

    pub fn decompress(&self, image: &mut RawImage, input: ByteStream) -> Result<()> {
        let w = self.width;
        let h = self.height;
        let pitch = image.pitch_u16();
        let data = image.u16_data_mut();
        let mut pump = BitPumpMsb::new(input.peek_bytes(input.remaining())?);

        let mut sum = 0_i32;
        // Columns right to left; within a column all even rows, then
        // all odd ones (the cursor jumps back to row 1 when it runs
        // off the bottom). The running sum carries across columns.
        for x in (0..w).rev() {
            let mut y = 0_usize;
            while y < h + 1 {
                if y == h {
                    y = 1;
                }
                let mut len = 4 - pump.get_bits(2)?;
                if len == 3 && pump.get_bits(1)? != 0 {
                    len = 0;
                } else if len == 4 {
                    while len < 17 && pump.get_bits(1)? == 0 {
                        len += 1;
                    }
                }
                sum += Self::get_diff(&mut pump, len)?;
                if sum < 0 || (sum >> 12) > 0 {
                    return Err(Error::Decoder("ARW1: sum out of range".to_string()));
                }
                data[y * pitch + x] = sum as u16;
                y += 2;
            }
        }
        Ok(())
    }
}

/// ARW2. Rows decode independently, one worker per row.
pub(crate) struct SonyArw2Decompressor<'a> {
    input: ByteStream<'a>,
    width: usize,
    height: usize,
}

impl<'a> SonyArw2Decompressor<'a> {
    pub fn new(image: &RawImage, input: ByteStream<'a>) -> Result<SonyArw2Decompressor<'a>> {
        if image.cpp() != 1 || image.data_type() != RawImageType::U16 {
            return Err(Error::Decoder(
                "ARW2: unexpected component count / data type".to_string(),
            ));
        }
        let dim = image.uncropped_dim();
        if dim.x == 0 || dim.y == 0 || dim.x % 32 != 0 || dim.x > 9600 || dim.y > 6376 {
            return Err(Error::Decoder(format!(
                "ARW2: unexpected image dimensions ({}; {})",
                dim.x, dim.y
            )));
        }
        // exactly one byte of input per pixel
        let input = input.sub_stream(input.position(), dim.x * dim.y)?;
        Ok(SonyArw2Decompressor {
            input,
            width: dim.x,
            height: dim.y,
        })
    }

    fn decompress_row(
        out: &mut [u16],
        row_input: &[u8],
        table: Option<&TableLookUp>,
    ) -> Result<()> {
        let w = out.len();
        let mut pump = BitPumpLsb::new(row_input);
        // seed for the dither aware lookup write path
        let mut random = pump.peek_bits(24)?;

        // Each iteration handles 16 pixels two columns apart,
        // consuming exactly 128 bits; a group pair covers 32 columns.
        let mut col = 0_usize;
        while col < w {
            let max = i32::try_from(pump.get_bits(11)?).unwrap();
            let min = i32::try_from(pump.get_bits(11)?).unwrap();
            let imax = pump.get_bits(4)? as i32;
            let imin = pump.get_bits(4)? as i32;
            // 98 bits remain for 14 full pixels; the other two are
            // pinned to max and min, so their indices cannot match.
            if imax == imin {
                return Err(Error::Decoder(
                    "ARW2 invariant failed, same pixel is both min and max".to_string(),
                ));
            }
            let mut sh = 0_i32;
            while sh < 4 && (0x80 << sh) <= max - min {
                sh += 1;
            }
            for i in 0..16 {
                let p = if i == imax {
                    max
                } else if i == imin {
                    min
                } else {
                    let p = ((pump.get_bits(7)? as i32) << sh) + min;
                    p.min(0x7ff)
                };
                // scale 11 bit to 12 bit, then the linearization
                // curve through the lookup table
                let value = (p as u16) << 1;
                let dst = &mut out[col + i as usize * 2];
                match table {
                    Some(t) => *dst = t.apply(value, &mut random),
                    None => *dst = value,
                }
            }
            col += if col & 1 != 0 { 31 } else { 1 };
        }
        Ok(())
    }

    pub fn decompress(&self, image: &mut RawImage) -> Result<()> {
        let w = self.width;
        let h = self.height;
        let pitch = image.pitch_u16();
        let table = image.table();
        let input = self.input.full_buffer();
        let (data, errors) = image.data_and_errors();
        let data = match data {
            RawImageData::U16(d) => d,
            _ => unreachable!("checked in the constructor"),
        };
        data.par_chunks_mut(pitch)
            .take(h)
            .enumerate()
            .for_each(|(row, out)| {
                let row_input = &input[row * w..(row + 1) * w];
                if let Err(err) = Self::decompress_row(&mut out[..w], row_input, table.as_deref())
                {
                    errors.set_error(&format!("ARW2 row {row}: {err}"));
                }
            });
        check_error_log(&errors, 1)
    }
}

#[cfg(test)]
mod test {
    use super::SonyArw2Decompressor;
    use crate::bytestream::{ByteStream, Endian};
    use crate::rawimage::{Point, RawImage};

    /// Append `n` low bits of `v` into an LSB-first bit sink.
    struct LsbWriter {
        bytes: Vec<u8>,
        bitpos: usize,
    }

    impl LsbWriter {
        fn new() -> LsbWriter {
            LsbWriter {
                bytes: Vec::new(),
                bitpos: 0,
            }
        }

        fn push(&mut self, v: u32, n: usize) {
            for i in 0..n {
                if self.bitpos % 8 == 0 {
                    self.bytes.push(0);
                }
                if (v >> i) & 1 != 0 {
                    *self.bytes.last_mut().unwrap() |= 1 << (self.bitpos % 8);
                }
                self.bitpos += 1;
            }
        }
    }

    #[test]
    fn test_arw1_column() {
        use super::SonyArw1Decompressor;
        // one column, two rows. First sample: len code 0b00 gives
        // len 4, stop bit, delta 7. Second: len code 0b01 gives len
        // 3, gate bit 0, delta 3. Running sum: 7 then 10.
        let input = [0b0010_1110_u8, 0b1001_1000];
        let mut img = RawImage::new_u16(Point::new(1, 2), 1);
        img.create_data();
        let stream = ByteStream::new(&input, Endian::Little);
        let d = SonyArw1Decompressor::new(&img).unwrap();
        d.decompress(&mut img, stream).unwrap();
        assert_eq!(img.u16_at(0, 0, 0), 7);
        assert_eq!(img.u16_at(0, 1, 0), 10);
    }

    #[test]
    fn test_arw2_group() {
        // max=100 at index 0, min=50 at index 1,
        // fourteen 7 bit samples of 0x7F. sh is 0 since 0x80 > 50.
        let mut img = RawImage::new_u16(Point::new(32, 1), 1);
        img.create_data();

        let mut w = LsbWriter::new();
        for _ in 0..2 {
            w.push(100, 11);
            w.push(50, 11);
            w.push(0, 4);
            w.push(1, 4);
            for _ in 0..14 {
                w.push(0x7f, 7);
            }
        }
        assert_eq!(w.bytes.len(), 32);

        let stream = ByteStream::new(&w.bytes, Endian::Little);
        let d = SonyArw2Decompressor::new(&img, stream).unwrap();
        d.decompress(&mut img).unwrap();

        // group 0 lands on even columns; no curve installed, so the
        // output is the 12 bit scaled value
        assert_eq!(img.u16_at(0, 0, 0), 100 << 1);
        assert_eq!(img.u16_at(2, 0, 0), 50 << 1);
        for i in 2..16 {
            let p = (0x7f + 50).min(0x7ff);
            assert_eq!(img.u16_at(2 * i, 0, 0), (p as u16) << 1);
        }
    }

    #[test]
    fn test_arw2_imax_imin_collision_fails() {
        let mut img = RawImage::new_u16(Point::new(32, 1), 1);
        img.create_data();
        let mut w = LsbWriter::new();
        for _ in 0..2 {
            w.push(100, 11);
            w.push(50, 11);
            w.push(3, 4);
            w.push(3, 4);
            for _ in 0..14 {
                w.push(0, 7);
            }
        }
        let stream = ByteStream::new(&w.bytes, Endian::Little);
        let d = SonyArw2Decompressor::new(&img, stream).unwrap();
        assert!(d.decompress(&mut img).is_err());
    }

    #[test]
    fn test_arw2_bad_dimensions() {
        // width must be a multiple of 32
        let mut img = RawImage::new_u16(Point::new(30, 1), 1);
        img.create_data();
        let stream = ByteStream::new(&[0u8; 30], Endian::Little);
        assert!(SonyArw2Decompressor::new(&img, stream).is_err());
    }
}
