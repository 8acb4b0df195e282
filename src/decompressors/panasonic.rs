// SPDX-License-Identifier: LGPL-3.0-or-later
/*
 * rawspeed - decompressors/panasonic.rs
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

//! Panasonic RW2 decompression, versions 4 through 7.
//!
//! Every variant slices the input into fixed size blocks decoded in
//! parallel. V4 and V5 rotate each 0x4000 block at a split offset;
//! V6 and V7 use plain 16 byte blocks. A decoded zero is a dead
//! pixel on these sensors and is recorded for later interpolation.

use std::sync::Arc;

use rayon::prelude::*;

use crate::bitstream::BitPumpLsb;
use crate::bytestream::ByteStream;
use crate::decompressors::SharedRaster;
use crate::rawimage::{BadPixelList, RawImage, RawImageType};
use crate::utils::{round_up, round_up_division};
use crate::{Error, Result};

const BLOCK_SIZE: usize = 0x4000;

/// A run of pixels `[begin, end)` in flat pixel coordinates, decoded
/// from one input block.
#[derive(Clone, Copy, Debug)]
struct Block {
    input_offset: usize,
    input_len: usize,
    begin_pixel: usize,
    end_pixel: usize,
}

fn plan_blocks(
    input_len: usize,
    block_size: usize,
    bytes_per_packet: usize,
    pixels_per_packet: usize,
    total_pixels: usize,
) -> Vec<Block> {
    let blocks_total = round_up_division(input_len, block_size);
    let mut blocks = Vec::with_capacity(blocks_total);
    let mut pixel = 0_usize;
    let mut offset = 0_usize;
    for _ in 0..blocks_total {
        let len = std::cmp::min(block_size, input_len - offset);
        let pixels = len / bytes_per_packet * pixels_per_packet;
        blocks.push(Block {
            input_offset: offset,
            input_len: len,
            begin_pixel: pixel,
            end_pixel: pixel + pixels,
        });
        offset += len;
        pixel += pixels;
    }
    if let Some(last) = blocks.last_mut() {
        last.end_pixel = last.end_pixel.min(total_pixels);
    }
    blocks
}

fn validate_u16_image(image: &RawImage, what: &str) -> Result<()> {
    if image.cpp() != 1 || image.data_type() != RawImageType::U16 {
        return Err(Error::Decoder(format!(
            "{what}: unexpected component count / data type"
        )));
    }
    let dim = image.uncropped_dim();
    if dim.x == 0 || dim.y == 0 {
        return Err(Error::Decoder(format!(
            "{what}: unexpected image dimensions ({}; {})",
            dim.x, dim.y
        )));
    }
    Ok(())
}

/// The dcraw style rotated block reader of V4. The first
/// `section_split_offset` bytes of each block logically belong after
/// the rest, and bits are consumed by a backwards running cursor.
struct V4BlockBits {
    buf: Vec<u8>,
    vbits: i32,
}

impl V4BlockBits {
    fn new(block: &[u8], section_split_offset: usize) -> V4BlockBits {
        let split = section_split_offset.min(block.len());
        let mut buf = Vec::with_capacity(BLOCK_SIZE + 1);
        // second section first, so it becomes the first section
        buf.extend_from_slice(&block[split..]);
        buf.extend_from_slice(&block[..split]);
        // zero pad so the two byte read below never special cases
        buf.resize(BLOCK_SIZE + 1, 0);
        V4BlockBits { buf, vbits: 0 }
    }

    fn get_bits(&mut self, nbits: i32) -> u32 {
        self.vbits = (self.vbits - nbits) & 0x1ffff;
        let byte = ((self.vbits >> 3) ^ 0x3ff0) as usize;
        let word = u32::from(self.buf[byte]) | (u32::from(self.buf[byte + 1]) << 8);
        (word >> (self.vbits & 7)) & ((1 << nbits) - 1)
    }
}

/// V4 (GH4 era): 0x4000 byte blocks of 16 byte packets holding 14
/// pixels, decoded with a per pair predictor and shift state.
pub(crate) struct PanasonicV4Decompressor<'a> {
    input: ByteStream<'a>,
    blocks: Vec<Block>,
    zero_is_bad: bool,
    section_split_offset: usize,
    width: usize,
}

impl<'a> PanasonicV4Decompressor<'a> {
    const PIXELS_PER_PACKET: usize = 14;
    const BYTES_PER_PACKET: usize = 16;

    pub fn new(
        image: &RawImage,
        input: ByteStream<'a>,
        zero_is_not_bad: bool,
        section_split_offset: usize,
    ) -> Result<PanasonicV4Decompressor<'a>> {
        validate_u16_image(image, "Panasonic V4")?;
        let dim = image.uncropped_dim();
        if dim.x % Self::PIXELS_PER_PACKET != 0 {
            return Err(Error::Decoder(format!(
                "Panasonic V4: width {} not a packet multiple",
                dim.x
            )));
        }
        if section_split_offset > BLOCK_SIZE {
            return Err(Error::Decoder(format!(
                "Panasonic V4: bad section split offset {section_split_offset}"
            )));
        }
        let total_pixels = dim.x * dim.y;
        let bytes_total = total_pixels / Self::PIXELS_PER_PACKET * Self::BYTES_PER_PACKET;
        let buf_size = if section_split_offset == 0 {
            bytes_total
        } else {
            round_up(bytes_total, BLOCK_SIZE)
        };
        let input = input.sub_stream(input.position(), buf_size)?;
        let blocks = plan_blocks(
            buf_size,
            BLOCK_SIZE,
            Self::BYTES_PER_PACKET,
            Self::PIXELS_PER_PACKET,
            total_pixels,
        );
        Ok(PanasonicV4Decompressor {
            input,
            blocks,
            zero_is_bad: !zero_is_not_bad,
            section_split_offset,
            width: dim.x,
        })
    }

    fn process_block(
        &self,
        out: &mut [u16],
        pitch: usize,
        block: &Block,
        zero_pos: &mut Vec<(usize, usize)>,
    ) {
        let bytes =
            &self.input.full_buffer()[block.input_offset..block.input_offset + block.input_len];
        let mut bits = V4BlockBits::new(bytes, self.section_split_offset);

        let mut pixel = block.begin_pixel;
        while pixel < block.end_pixel {
            let row = pixel / self.width;
            let col_base = pixel % self.width;
            let mut sh = 0_i32;
            let mut pred = [0_i32; 2];
            let mut nonz = [0_i32; 2];
            let mut u = 0_i32;
            for p in 0..Self::PIXELS_PER_PACKET {
                let c = p & 1;
                if u == 2 {
                    // shift selector, one of 0, 1, 2, 4
                    sh = 4 >> (3 - bits.get_bits(2) as i32);
                    u = -1;
                }
                if nonz[c] != 0 {
                    let j = bits.get_bits(8) as i32;
                    if j != 0 {
                        pred[c] -= 0x80 << sh;
                        if pred[c] < 0 || sh == 4 {
                            pred[c] &= (1 << sh) - 1;
                        }
                        pred[c] += j << sh;
                    }
                } else {
                    nonz[c] = bits.get_bits(8) as i32;
                    if nonz[c] != 0 || p > 11 {
                        pred[c] = (nonz[c] << 4) | bits.get_bits(4) as i32;
                    }
                }
                let col = col_base + p;
                out[row * pitch + col] = pred[c] as u16;
                if self.zero_is_bad && pred[c] == 0 {
                    zero_pos.push((col, row));
                }
                u += 1;
            }
            pixel += Self::PIXELS_PER_PACKET;
        }
    }

    pub fn decompress(&self, image: &mut RawImage) -> Result<()> {
        let pitch = image.pitch_u16();
        let bad_pixels: Arc<BadPixelList> = image.bad_pixels();
        let zero_is_bad = self.zero_is_bad;
        let raster = SharedRaster::new(image.u16_data_mut());
        self.blocks.par_iter().for_each(|block| {
            // Safety: the blocks cover disjoint pixel ranges.
            let out = unsafe { raster.inner_mut() };
            let mut zero_pos = Vec::new();
            self.process_block(out, pitch, block, &mut zero_pos);
            if zero_is_bad {
                for (x, y) in zero_pos {
                    bad_pixels.add(x, y);
                }
            }
        });
        Ok(())
    }
}

/// V5: 0x4000 byte blocks rotated at 0x1FF8, plain LSB packets of
/// 16 bytes each holding `128 / bps` pixels.
pub(crate) struct PanasonicV5Decompressor<'a> {
    input: ByteStream<'a>,
    blocks: Vec<Block>,
    bps: u32,
    width: usize,
}

impl<'a> PanasonicV5Decompressor<'a> {
    const SECTION_SPLIT_OFFSET: usize = 0x1ff8;
    const BYTES_PER_PACKET: usize = 16;
    const BITS_PER_PACKET: u32 = 128;

    fn pixels_per_packet(bps: u32) -> Result<usize> {
        match bps {
            12 | 14 => Ok((Self::BITS_PER_PACKET / bps) as usize),
            _ => Err(Error::Decoder(format!("Panasonic V5: unsupported bps {bps}"))),
        }
    }

    pub fn new(
        image: &RawImage,
        input: ByteStream<'a>,
        bps: u32,
    ) -> Result<PanasonicV5Decompressor<'a>> {
        validate_u16_image(image, "Panasonic V5")?;
        let pixels_per_packet = Self::pixels_per_packet(bps)?;
        let dim = image.uncropped_dim();
        if dim.x % pixels_per_packet != 0 {
            return Err(Error::Decoder(format!(
                "Panasonic V5: width {} not a packet multiple",
                dim.x
            )));
        }
        let total_pixels = dim.x * dim.y;
        let num_packets = total_pixels / pixels_per_packet;
        let packets_per_block = BLOCK_SIZE / Self::BYTES_PER_PACKET;
        let num_blocks = round_up_division(num_packets, packets_per_block);
        if input.remaining() / BLOCK_SIZE < num_blocks {
            return Err(Error::Decoder(
                "Panasonic V5: insufficient count of input blocks for a given image".to_string(),
            ));
        }
        let input = input.sub_stream(input.position(), num_blocks * BLOCK_SIZE)?;
        let blocks = plan_blocks(
            num_blocks * BLOCK_SIZE,
            BLOCK_SIZE,
            Self::BYTES_PER_PACKET,
            pixels_per_packet,
            total_pixels,
        );
        Ok(PanasonicV5Decompressor {
            input,
            blocks,
            bps,
            width: dim.x,
        })
    }

    fn process_block(&self, out: &mut [u16], pitch: usize, block: &Block) -> Result<()> {
        let bytes =
            &self.input.full_buffer()[block.input_offset..block.input_offset + block.input_len];
        // rotate: the tail section comes first
        let mut buf = Vec::with_capacity(BLOCK_SIZE);
        buf.extend_from_slice(&bytes[Self::SECTION_SPLIT_OFFSET.min(bytes.len())..]);
        buf.extend_from_slice(&bytes[..Self::SECTION_SPLIT_OFFSET.min(bytes.len())]);

        let pixels_per_packet = Self::pixels_per_packet(self.bps)?;
        let padding = Self::BITS_PER_PACKET - pixels_per_packet as u32 * self.bps;
        let mut pump = BitPumpLsb::new(&buf);
        let mut pixel = block.begin_pixel;
        while pixel < block.end_pixel {
            // one packet; the cache drains at the packet boundary so
            // a pixel never straddles packets
            for p in 0..pixels_per_packet {
                let row = (pixel + p) / self.width;
                let col = (pixel + p) % self.width;
                out[row * pitch + col] = pump.get_bits(self.bps)? as u16;
            }
            pump.skip_bits(padding)?;
            pixel += pixels_per_packet;
        }
        Ok(())
    }

    pub fn decompress(&self, image: &mut RawImage) -> Result<()> {
        let pitch = image.pitch_u16();
        let errors = image.error_log();
        let raster = SharedRaster::new(image.u16_data_mut());
        self.blocks.par_iter().enumerate().for_each(|(i, block)| {
            // Safety: the blocks cover disjoint pixel ranges.
            let out = unsafe { raster.inner_mut() };
            if let Err(err) = self.process_block(out, pitch, block) {
                errors.set_error(&format!("Panasonic V5 block {i}: {err}"));
            }
        });
        super::check_error_log(&errors, 1)
    }
}

/// V6 16 byte block: eleven pixels plus three 2 bit shift selectors,
/// bytes consumed back to front. Entries 2, 6 and 10 are the
/// selectors.
fn v6_unpack_block(b: &[u8]) -> [u16; 14] {
    let w = |i: usize| u16::from(b[15 - i]);
    [
        (w(0) << 6) | (w(1) >> 2),
        (((w(1) & 0x3) << 12) | (w(2) << 4) | (w(3) >> 4)) & 0x3fff,
        (w(3) >> 2) & 0x3,
        ((w(3) & 0x3) << 8) | w(4),
        ((w(5) << 2) | (w(6) >> 6)) & 0x3ff,
        ((w(6) & 0x3f) << 4) | (w(7) >> 4),
        (w(7) >> 2) & 0x3,
        ((w(7) & 0x3) << 8) | w(8),
        ((w(9) << 2) & 0x3fc) | (w(10) >> 6),
        ((w(10) << 4) | (w(11) >> 4)) & 0x3ff,
        (w(11) >> 2) & 0x3,
        ((w(11) & 0x3) << 8) | w(12),
        (((w(13) << 2) & 0x3fc) | (w(14) >> 6)) & 0x3ff,
        ((w(14) << 4) | (w(15) >> 4)) & 0x3ff,
    ]
}

/// V6 (S1 class): 16 byte blocks of 11 pixels with an explicit bit
/// layout and a scaled odd/even reconstruction.
pub(crate) struct PanasonicV6Decompressor<'a> {
    input: ByteStream<'a>,
    width: usize,
    height: usize,
}

impl<'a> PanasonicV6Decompressor<'a> {
    const PIXELS_PER_BLOCK: usize = 11;
    const BYTES_PER_BLOCK: usize = 16;

    pub fn new(
        image: &RawImage,
        input: ByteStream<'a>,
        bps: u32,
    ) -> Result<PanasonicV6Decompressor<'a>> {
        validate_u16_image(image, "Panasonic V6")?;
        if bps != 14 {
            return Err(Error::Decoder(format!("Panasonic V6: unsupported bps {bps}")));
        }
        let dim = image.uncropped_dim();
        if dim.x % Self::PIXELS_PER_BLOCK != 0 {
            return Err(Error::Decoder(format!(
                "Panasonic V6: width {} not a block multiple",
                dim.x
            )));
        }
        let num_blocks = dim.x * dim.y / Self::PIXELS_PER_BLOCK;
        if input.remaining() / Self::BYTES_PER_BLOCK < num_blocks {
            return Err(Error::Decoder(
                "Panasonic V6: insufficient count of input blocks for a given image".to_string(),
            ));
        }
        let input = input.sub_stream(input.position(), num_blocks * Self::BYTES_PER_BLOCK)?;
        Ok(PanasonicV6Decompressor {
            input,
            width: dim.x,
            height: dim.y,
        })
    }

    fn decompress_block(out: &mut [u16], block: &[u8]) {
        let buffer = v6_unpack_block(block);
        let mut next = buffer.iter();
        let mut oddeven = [0_u32; 2];
        let mut nonzero = [0_u32; 2];
        let mut pmul = 0_u32;
        let mut pixel_base = 0_u32;
        for pix in 0..Self::PIXELS_PER_BLOCK {
            if pix % 3 == 2 {
                let mut base = u32::from(*next.next().unwrap());
                if base == 3 {
                    base = 4;
                }
                pixel_base = 0x200 << base;
                pmul = 1 << base;
            }
            let mut epixel = u32::from(*next.next().unwrap());
            if oddeven[pix % 2] != 0 {
                epixel *= pmul;
                if pixel_base < 0x2000 && nonzero[pix % 2] > pixel_base {
                    epixel += nonzero[pix % 2] - pixel_base;
                }
                nonzero[pix % 2] = epixel;
            } else {
                oddeven[pix % 2] = epixel;
                if epixel != 0 {
                    nonzero[pix % 2] = epixel;
                } else {
                    epixel = nonzero[pix % 2];
                }
            }
            let spix = epixel.wrapping_sub(0xf);
            out[pix] = if spix <= 0xffff {
                spix as u16
            } else {
                (((epixel.wrapping_add(0x7ffffff1) as i32) >> 0x1f) & 0x3fff) as u16
            };
        }
    }

    pub fn decompress(&self, image: &mut RawImage) -> Result<()> {
        let pitch = image.pitch_u16();
        let w = self.width;
        let blocks_per_row = w / Self::PIXELS_PER_BLOCK;
        let bytes_per_row = blocks_per_row * Self::BYTES_PER_BLOCK;
        let input = self.input.full_buffer();
        let data = image.u16_data_mut();
        data.par_chunks_mut(pitch)
            .take(self.height)
            .enumerate()
            .for_each(|(row, out)| {
                let row_input = &input[row * bytes_per_row..(row + 1) * bytes_per_row];
                for (rblock, block) in row_input.chunks_exact(Self::BYTES_PER_BLOCK).enumerate() {
                    let col = rblock * Self::PIXELS_PER_BLOCK;
                    Self::decompress_block(&mut out[col..col + Self::PIXELS_PER_BLOCK], block);
                }
            });
        Ok(())
    }
}

/// V7 (GH6 class): 16 byte blocks of nine 14 bit or ten 12 bit
/// samples read by a plain LSB pump.
pub(crate) struct PanasonicV7Decompressor<'a> {
    input: ByteStream<'a>,
    bps: u32,
    width: usize,
    height: usize,
}

impl<'a> PanasonicV7Decompressor<'a> {
    const BYTES_PER_BLOCK: usize = 16;

    fn pixels_per_block(bps: u32) -> Result<usize> {
        match bps {
            14 => Ok(9),
            12 => Ok(10),
            _ => Err(Error::Decoder(format!("Panasonic V7: unsupported bps {bps}"))),
        }
    }

    pub fn new(
        image: &RawImage,
        input: ByteStream<'a>,
        bps: u32,
    ) -> Result<PanasonicV7Decompressor<'a>> {
        validate_u16_image(image, "Panasonic V7")?;
        let pixels_per_block = Self::pixels_per_block(bps)?;
        let dim = image.uncropped_dim();
        if dim.x % pixels_per_block != 0 {
            return Err(Error::Decoder(format!(
                "Panasonic V7: width {} not a block multiple",
                dim.x
            )));
        }
        let num_blocks = dim.x * dim.y / pixels_per_block;
        if input.remaining() / Self::BYTES_PER_BLOCK < num_blocks {
            return Err(Error::Decoder(
                "Panasonic V7: insufficient count of input blocks for a given image".to_string(),
            ));
        }
        let input = input.sub_stream(input.position(), num_blocks * Self::BYTES_PER_BLOCK)?;
        Ok(PanasonicV7Decompressor {
            input,
            bps,
            width: dim.x,
            height: dim.y,
        })
    }

    pub fn decompress(&self, image: &mut RawImage) -> Result<()> {
        let pixels_per_block = Self::pixels_per_block(self.bps)?;
        let pitch = image.pitch_u16();
        let blocks_per_row = self.width / pixels_per_block;
        let bytes_per_row = blocks_per_row * Self::BYTES_PER_BLOCK;
        let bps = self.bps;
        let input = self.input.full_buffer();
        let errors = image.error_log();
        let data = image.u16_data_mut();
        data.par_chunks_mut(pitch)
            .take(self.height)
            .enumerate()
            .for_each(|(row, out)| {
                let row_input = &input[row * bytes_per_row..(row + 1) * bytes_per_row];
                for (rblock, block) in row_input.chunks_exact(Self::BYTES_PER_BLOCK).enumerate() {
                    let mut pump = BitPumpLsb::new(block);
                    for pix in 0..pixels_per_block {
                        match pump.get_bits(bps) {
                            Ok(v) => out[rblock * pixels_per_block + pix] = v as u16,
                            Err(err) => {
                                errors.set_error(&format!("Panasonic V7 row {row}: {err}"));
                                return;
                            }
                        }
                    }
                }
            });
        super::check_error_log(&errors, 1)
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::bytestream::Endian;
    use crate::rawimage::Point;

    #[test]
    fn test_v7_block_layout() {
        // 9 samples of 14 bits, LSB packed into a 16 byte block
        let mut img = RawImage::new_u16(Point::new(9, 1), 1);
        img.create_data();
        let mut bits = 0_u128;
        for i in 0..9_u128 {
            bits |= (100 + i) << (14 * i);
        }
        let block = bits.to_le_bytes();
        let stream = ByteStream::new(&block, Endian::Little);
        let d = PanasonicV7Decompressor::new(&img, stream, 14).unwrap();
        d.decompress(&mut img).unwrap();
        for i in 0..9 {
            assert_eq!(img.u16_at(i, 0, 0), 100 + i as u16);
        }
    }

    #[test]
    fn test_v7_too_little_input() {
        let mut img = RawImage::new_u16(Point::new(18, 1), 1);
        img.create_data();
        let block = [0_u8; 16];
        let stream = ByteStream::new(&block, Endian::Little);
        assert!(PanasonicV7Decompressor::new(&img, stream, 14).is_err());
    }

    #[test]
    fn test_v5_packet_boundary() {
        // 20 pixels of 12 bits: two packets, each drained after 10
        // pixels so pixel 10 starts the second packet exactly.
        let mut img = RawImage::new_u16(Point::new(20, 1), 1);
        img.create_data();

        let mut input = vec![0_u8; BLOCK_SIZE];
        for packet in 0..2_usize {
            let mut bits = 0_u128;
            for i in 0..10_u128 {
                bits |= (0x800 + 16 * packet as u128 + i) << (12 * i);
            }
            // the payload region sits after the rotation point
            let dst = PanasonicV5Decompressor::SECTION_SPLIT_OFFSET + 16 * packet;
            input[dst..dst + 16].copy_from_slice(&bits.to_le_bytes());
        }
        let stream = ByteStream::new(&input, Endian::Little);
        let d = PanasonicV5Decompressor::new(&img, stream, 12).unwrap();
        d.decompress(&mut img).unwrap();
        for i in 0..10 {
            assert_eq!(img.u16_at(i, 0, 0), 0x800 + i as u16);
        }
        for i in 0..10 {
            assert_eq!(img.u16_at(10 + i, 0, 0), 0x810 + i as u16);
        }
    }

    #[test]
    fn test_v6_all_zero_block() {
        // an all zero block must decode without panicking; the
        // negative reconstruction path clamps every pixel to zero
        let mut out = [0_u16; 11];
        PanasonicV6Decompressor::decompress_block(&mut out, &[0_u8; 16]);
        for v in out {
            assert_eq!(v, 0);
        }
    }
}
