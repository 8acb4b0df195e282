// SPDX-License-Identifier: LGPL-3.0-or-later
/*
 * rawspeed - decompressors/uncompressed.rs
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

//! Uncompressed packed pixel reading.
//!
//! Covers the whole family of "just bits in a row" layouts: 8 to 16
//! bit integer samples in any of the four pump orders, the 12 bit
//! packed variants (plain, interlaced fields, left aligned, with a
//! control byte every 10 pixels) and the 16/24/32 bit float formats.

use crate::bitstream::{BitPump, BitOrder, Jpeg, Lsb, Msb, Msb16, Msb32, PumpVariant};
use crate::bytestream::{ByteStream, Endian};
use crate::fp::{fp16_to_fp32, fp24_to_fp32};
use crate::rawimage::{Point, RawImage, RawImageType};
use crate::{Error, IoError, Result};

pub(crate) struct UncompressedDecompressor<'a> {
    input: ByteStream<'a>,
}

impl<'a> UncompressedDecompressor<'a> {
    pub fn new(input: ByteStream<'a>) -> UncompressedDecompressor<'a> {
        UncompressedDecompressor { input }
    }

    /// The input must hold `h` full lines of `bytes_per_line`.
    fn sanity_check(&self, h: usize, bytes_per_line: usize) -> Result<()> {
        debug_assert!(h > 0 && bytes_per_line > 0);
        let full_rows = self.input.remaining() / bytes_per_line;
        if full_rows >= h {
            return Ok(());
        }
        if full_rows == 0 {
            return Err(Error::Decoder(
                "Not enough data to decode a single line. Image file truncated.".to_string(),
            ));
        }
        Err(Error::Decoder(format!(
            "Image truncated, only {full_rows} of {h} lines found"
        )))
    }

    /// Packed 12 bit bytes per line, with a skip byte every 10
    /// pixels when `skips`.
    fn bytes_per_line_12(w: usize, skips: bool) -> Result<usize> {
        if (12 * w) % 8 != 0 {
            return Err(Error::Decoder("Bad image width for 12 bit packing".to_string()));
        }
        let mut perline = 12 * w / 8;
        if skips {
            perline += (w + 2) / 10;
        }
        Ok(perline)
    }

    /// The generic path: `size.x * cpp` samples of `bit_per_pixel`
    /// per row from the selected pump, then skip the input pitch
    /// padding. `offset` positions the output inside the image.
    pub fn read_uncompressed_raw(
        &mut self,
        image: &mut RawImage,
        size: Point,
        offset: Point,
        input_pitch_bytes: usize,
        bit_per_pixel: u32,
        order: BitOrder,
    ) -> Result<()> {
        let cpp = image.cpp();
        if bit_per_pixel > 16 && image.data_type() == RawImageType::U16 {
            return Err(Error::Decoder("Unsupported bit depth".to_string()));
        }
        let out_pixel_bits = size.x * cpp * bit_per_pixel as usize;
        if out_pixel_bits % 8 != 0 {
            return Err(Error::Decoder(format!(
                "Bad combination of cpp ({cpp}), bps ({bit_per_pixel}) and width ({}): the row is not byte aligned",
                size.x
            )));
        }
        let out_pixel_bytes = out_pixel_bits / 8;
        if input_pitch_bytes < out_pixel_bytes {
            return Err(Error::Decoder(
                "Specified pitch is smaller than minimally-required pitch".to_string(),
            ));
        }
        self.sanity_check(size.y, input_pitch_bytes)?;
        let skip_bytes = input_pitch_bytes - out_pixel_bytes;

        let dim = image.uncropped_dim();
        if offset.y > dim.y || offset.x + size.x > dim.x {
            return Err(Error::Decoder("Invalid output offset".to_string()));
        }
        let h = std::cmp::min(size.y + offset.y, dim.y);

        if image.data_type() == RawImageType::F32 {
            return self.decode_fp(image, size, offset, skip_bytes, h, bit_per_pixel, order);
        }

        match order {
            BitOrder::Msb => {
                self.decode_int_rows::<Msb>(image, size, offset, skip_bytes, h, bit_per_pixel)
            }
            BitOrder::Msb16 => {
                self.decode_int_rows::<Msb16>(image, size, offset, skip_bytes, h, bit_per_pixel)
            }
            BitOrder::Msb32 => {
                self.decode_int_rows::<Msb32>(image, size, offset, skip_bytes, h, bit_per_pixel)
            }
            BitOrder::Jpeg => {
                self.decode_int_rows::<Jpeg>(image, size, offset, skip_bytes, h, bit_per_pixel)
            }
            BitOrder::Lsb => {
                // 16 bit little endian rows are a straight copy
                if bit_per_pixel == 16 {
                    return self.copy_16bit_rows(image, size, offset, input_pitch_bytes, h);
                }
                self.decode_int_rows::<Lsb>(image, size, offset, skip_bytes, h, bit_per_pixel)
            }
        }
    }

    fn decode_int_rows<V: PumpVariant>(
        &mut self,
        image: &mut RawImage,
        size: Point,
        offset: Point,
        skip_bytes: usize,
        h: usize,
        bit_per_pixel: u32,
    ) -> Result<()> {
        let cpp = image.cpp();
        let w = size.x * cpp;
        let pitch = image.pitch_u16();
        let data = image.u16_data_mut();
        let mut pump: BitPump<V> = BitPump::new(self.input.peek_bytes(self.input.remaining())?);
        for y in offset.y..h {
            let dest = &mut data[y * pitch + offset.x * cpp..];
            for x in 0..w {
                dest[x] = pump.get_bits(bit_per_pixel)? as u16;
            }
            pump.skip_bytes(skip_bytes)?;
        }
        Ok(())
    }

    fn copy_16bit_rows(
        &mut self,
        image: &mut RawImage,
        size: Point,
        offset: Point,
        input_pitch_bytes: usize,
        h: usize,
    ) -> Result<()> {
        let cpp = image.cpp();
        let w = size.x * cpp;
        let pitch = image.pitch_u16();
        let data = image.u16_data_mut();
        for y in offset.y..h {
            let row = self.input.get_bytes(input_pitch_bytes)?;
            let dest = &mut data[y * pitch + offset.x * cpp..];
            for (x, bytes) in row.chunks_exact(2).take(w).enumerate() {
                dest[x] = u16::from_le_bytes([bytes[0], bytes[1]]);
            }
        }
        Ok(())
    }

    fn decode_fp(
        &mut self,
        image: &mut RawImage,
        size: Point,
        offset: Point,
        skip_bytes: usize,
        h: usize,
        bit_per_pixel: u32,
        order: BitOrder,
    ) -> Result<()> {
        let cpp = image.cpp();
        let w = size.x * cpp;
        let pitch = image.pitch_f32();
        let endian = self.input.endian();

        if bit_per_pixel == 32 {
            let data = image.f32_data_mut();
            for y in offset.y..h {
                let row = self.input.get_bytes(w * 4 + skip_bytes)?;
                let dest = &mut data[y * pitch + offset.x * cpp..];
                for (x, bytes) in row.chunks_exact(4).take(w).enumerate() {
                    let bits = match endian {
                        Endian::Little => u32::from_le_bytes([bytes[0], bytes[1], bytes[2], bytes[3]]),
                        Endian::Big => u32::from_be_bytes([bytes[0], bytes[1], bytes[2], bytes[3]]),
                    };
                    dest[x] = f32::from_bits(bits);
                }
            }
            return Ok(());
        }

        match (order, bit_per_pixel) {
            (BitOrder::Msb, 16) => self.decode_fp_rows::<Msb>(image, w, offset, skip_bytes, h, 16),
            (BitOrder::Lsb, 16) => self.decode_fp_rows::<Lsb>(image, w, offset, skip_bytes, h, 16),
            (BitOrder::Msb, 24) => self.decode_fp_rows::<Msb>(image, w, offset, skip_bytes, h, 24),
            (BitOrder::Lsb, 24) => self.decode_fp_rows::<Lsb>(image, w, offset, skip_bytes, h, 24),
            _ => Err(Error::Decoder(format!(
                "Unsupported floating-point input bitwidth/bit packing: {bit_per_pixel} / {order:?}"
            ))),
        }
    }

    fn decode_fp_rows<V: PumpVariant>(
        &mut self,
        image: &mut RawImage,
        w: usize,
        offset: Point,
        skip_bytes: usize,
        h: usize,
        bits: u32,
    ) -> Result<()> {
        let cpp = image.cpp();
        let pitch = image.pitch_f32();
        let data = image.f32_data_mut();
        let mut pump: BitPump<V> = BitPump::new(self.input.peek_bytes(self.input.remaining())?);
        for y in offset.y..h {
            let dest = &mut data[y * pitch + offset.x * cpp..];
            for x in 0..w {
                let b = pump.get_bits(bits)?;
                dest[x] = f32::from_bits(if bits == 16 {
                    fp16_to_fp32(b as u16)
                } else {
                    fp24_to_fp32(b)
                });
            }
            pump.skip_bytes(skip_bytes)?;
        }
        Ok(())
    }

    /// 8 bit samples, optionally through the image lookup table.
    pub fn decode_8bit_raw(&mut self, image: &mut RawImage, w: usize, h: usize) -> Result<()> {
        self.sanity_check(h, w)?;
        let table = image.table();
        let pitch = image.pitch_u16();
        let mut random = 0_u32;
        let input = self.input.get_bytes(w * h)?;
        let data = image.u16_data_mut();
        for y in 0..h {
            let dest = &mut data[y * pitch..];
            for x in 0..w {
                let v = u16::from(input[y * w + x]);
                dest[x] = match &table {
                    Some(t) => t.apply(v, &mut random),
                    None => v,
                };
            }
        }
        Ok(())
    }

    /// Packed 12 bit, two pixels in three bytes. `interlaced` files
    /// store all even rows then all odd rows, the second field
    /// starting on a 2048 byte boundary. `skips` drops a control
    /// byte every 10 pixels.
    pub fn decode_12bit_raw(
        &mut self,
        image: &mut RawImage,
        w: usize,
        h: usize,
        big_endian: bool,
        interlaced: bool,
        skips: bool,
    ) -> Result<()> {
        let perline = Self::bytes_per_line_12(w, skips)?;
        self.sanity_check(h, perline)?;

        let pitch = image.pitch_u16();
        let data = image.u16_data_mut();
        let half = (h + 1) >> 1;
        let mut pos = self.input.position();
        let base = self.input.full_buffer();
        for row in 0..h {
            let y = if interlaced {
                row % half * 2 + row / half
            } else {
                row
            };
            if interlaced && y == 1 {
                // the second field starts at a 2048 byte alignment
                let offset = (((half * w * 3 / 2) >> 11) + 1) << 11;
                pos = self.input.position() + offset;
            }
            let dest = &mut data[y * pitch..];
            let mut x = 0;
            while x < w {
                if pos + 3 > base.len() {
                    return Err(IoError::PastEnd.into());
                }
                let g1 = u16::from(base[pos]);
                let g2 = u16::from(base[pos + 1]);
                let g3 = u16::from(base[pos + 2]);
                if big_endian {
                    dest[x] = (g1 << 4) | (g2 >> 4);
                    dest[x + 1] = ((g2 & 0x0f) << 8) | g3;
                } else {
                    dest[x] = ((g2 & 0x0f) << 8) | g1;
                    dest[x + 1] = (g3 << 4) | (g2 >> 4);
                }
                pos += 3;
                if skips && x % 10 == 8 {
                    pos += 1;
                }
                x += 2;
            }
        }
        self.input.seek(self.input.size())?;
        Ok(())
    }

    /// 12 bit in 16 bit big endian words, value in the high bits.
    pub fn decode_12bit_left_aligned(
        &mut self,
        image: &mut RawImage,
        w: usize,
        h: usize,
    ) -> Result<()> {
        self.sanity_check(h, w * 2)?;
        let pitch = image.pitch_u16();
        let input = self.input.get_bytes(w * h * 2)?;
        let data = image.u16_data_mut();
        for y in 0..h {
            let dest = &mut data[y * pitch..];
            for x in 0..w {
                let g1 = u16::from(input[(y * w + x) * 2]);
                let g2 = u16::from(input[(y * w + x) * 2 + 1]);
                dest[x] = ((g1 << 8) | (g2 & 0xf0)) >> 4;
            }
        }
        Ok(())
    }

    /// One sample per 16 bit word, 12/14/16 significant bits.
    pub fn decode_raw_unpacked(
        &mut self,
        image: &mut RawImage,
        w: usize,
        h: usize,
        bits: u32,
        endian: Endian,
    ) -> Result<()> {
        debug_assert!(bits == 12 || bits == 14 || bits == 16);
        self.sanity_check(h, w * 2)?;
        let shift = 16 - bits;
        let mask = (1_u16 << (8 - shift)) - 1;
        let pitch = image.pitch_u16();
        let input = self.input.get_bytes(w * h * 2)?;
        let data = image.u16_data_mut();
        for y in 0..h {
            let dest = &mut data[y * pitch..];
            for x in 0..w {
                let g1 = u16::from(input[(y * w + x) * 2]);
                let g2 = u16::from(input[(y * w + x) * 2 + 1]);
                dest[x] = match endian {
                    Endian::Little => ((g2 << 8) | g1) >> shift,
                    Endian::Big => ((g1 & mask) << 8) | g2,
                };
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod test {
    use super::UncompressedDecompressor;
    use crate::bitstream::BitOrder;
    use crate::bytestream::{ByteStream, Endian};
    use crate::rawimage::{Point, RawImage};

    fn image(w: usize, h: usize) -> RawImage {
        let mut img = RawImage::new_u16(Point::new(w, h), 1);
        img.create_data();
        img
    }

    #[test]
    fn test_packed_12bit_msb() {
        // two pixels: 0xABC and 0x123 packed big endian
        let input = [0xab_u8, 0xc1, 0x23];
        let mut img = image(2, 1);
        let stream = ByteStream::new(&input, Endian::Little);
        let mut d = UncompressedDecompressor::new(stream);
        d.read_uncompressed_raw(&mut img, Point::new(2, 1), Point::default(), 3, 12, BitOrder::Msb)
            .unwrap();
        assert_eq!(img.u16_at(0, 0, 0), 0xabc);
        assert_eq!(img.u16_at(1, 0, 0), 0x123);
    }

    #[test]
    fn test_decode_12bit_le_pairs() {
        // little endian 12 bit packing: lo byte, split, hi nibble
        let input = [0xbc_u8, 0x3a, 0x12];
        let mut img = image(2, 1);
        let stream = ByteStream::new(&input, Endian::Little);
        let mut d = UncompressedDecompressor::new(stream);
        d.decode_12bit_raw(&mut img, 2, 1, false, false, false).unwrap();
        assert_eq!(img.u16_at(0, 0, 0), 0xabc);
        assert_eq!(img.u16_at(1, 0, 0), 0x123);
    }

    #[test]
    fn test_unpacked_16bit_le() {
        let input = [0x34_u8, 0x12, 0xff, 0x0f];
        let mut img = image(2, 1);
        let stream = ByteStream::new(&input, Endian::Little);
        let mut d = UncompressedDecompressor::new(stream);
        d.decode_raw_unpacked(&mut img, 2, 1, 16, Endian::Little).unwrap();
        assert_eq!(img.u16_at(0, 0, 0), 0x1234);
        assert_eq!(img.u16_at(1, 0, 0), 0x0fff);
    }

    #[test]
    fn test_left_aligned_12bit() {
        // 0x123 stored left aligned in a big endian word: 0x1230
        let input = [0x12_u8, 0x30];
        let mut img = image(1, 1);
        let stream = ByteStream::new(&input, Endian::Big);
        let mut d = UncompressedDecompressor::new(stream);
        d.decode_12bit_left_aligned(&mut img, 1, 1).unwrap();
        assert_eq!(img.u16_at(0, 0, 0), 0x123);
    }

    #[test]
    fn test_truncated_input_fails() {
        let input = [0u8; 8];
        let mut img = image(4, 4);
        let stream = ByteStream::new(&input, Endian::Little);
        let mut d = UncompressedDecompressor::new(stream);
        assert!(d
            .read_uncompressed_raw(
                &mut img,
                Point::new(4, 4),
                Point::default(),
                8,
                16,
                BitOrder::Lsb
            )
            .is_err());
    }

    #[test]
    fn test_every_ten_pixels_skip() {
        // 10 pixels packed 12 bit plus one control byte after pixel 8
        let mut input = Vec::new();
        for _ in 0..5 {
            input.extend_from_slice(&[0x10, 0x01, 0x00]);
        }
        // control byte, must be discarded
        input.push(0xee);
        let mut img = image(10, 1);
        let stream = ByteStream::new(&input, Endian::Little);
        let mut d = UncompressedDecompressor::new(stream);
        d.decode_12bit_raw(&mut img, 10, 1, true, false, true).unwrap();
        assert_eq!(img.u16_at(0, 0, 0), 0x100);
        assert_eq!(img.u16_at(9, 0, 0), 0x100);
    }
}
