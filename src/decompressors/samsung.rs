// SPDX-License-Identifier: LGPL-3.0-or-later
/*
 * rawspeed - decompressors/samsung.rs
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

//! Samsung SRW decompression.
//!
//! V0 (NX300 class) encodes each line independently behind an offset
//! table, predicting upward or leftward per 16 pixel group with four
//! adaptive bit length state machines. V2 (NX1 class) is the scheme
//! from Samsung's open source DNG converter: motion compensated
//! baselines and interleaved difference blocks.

use crate::bitstream::BitPumpMsb32;
use crate::bytestream::ByteStream;
use crate::rawimage::{RawImage, RawImageType};
use crate::utils::{clamp_bits, sign_extend};
use crate::{Error, Result};

fn get_diff(pump: &mut BitPumpMsb32, len: u32) -> Result<i32> {
    if len == 0 {
        return Ok(0);
    }
    Ok(sign_extend(pump.get_bits(len)?, len))
}

/// V0: one compressed strip per line, located by a 32 bit offset
/// table preceding the payload.
pub(crate) struct SamsungV0Decompressor<'a> {
    strips: Vec<ByteStream<'a>>,
    width: usize,
    height: usize,
}

impl<'a> SamsungV0Decompressor<'a> {
    pub fn new(
        image: &RawImage,
        mut offsets: ByteStream<'a>,
        raw: ByteStream<'a>,
    ) -> Result<SamsungV0Decompressor<'a>> {
        let dim = image.uncropped_dim();
        if dim.x < 16 || dim.x > 5546 || dim.y == 0 || dim.y > 3714 {
            return Err(Error::Decoder(format!(
                "SRW V0: unexpected image dimensions ({}; {})",
                dim.x, dim.y
            )));
        }
        // line offsets must be strictly increasing; the last strip
        // ends at the end of the payload
        let mut line_offsets = Vec::with_capacity(dim.y + 1);
        for _ in 0..dim.y {
            line_offsets.push(offsets.get_u32()? as usize);
        }
        line_offsets.push(raw.size());
        let mut strips = Vec::with_capacity(dim.y);
        for pair in line_offsets.windows(2) {
            if pair[0] >= pair[1] {
                return Err(Error::Decoder(
                    "SRW V0: line offsets are out of sequence or slice is empty".to_string(),
                ));
            }
            strips.push(raw.sub_stream(pair[0], pair[1] - pair[0])?);
        }
        Ok(SamsungV0Decompressor {
            strips,
            width: dim.x,
            height: dim.y,
        })
    }

    pub fn decompress(&self, image: &mut RawImage) -> Result<()> {
        let pitch = image.pitch_u16();
        let w = self.width;
        let data = image.u16_data_mut();
        for y in 0..self.height {
            self.decompress_strip(data, pitch, y, &self.strips[y])?;
        }

        // Swap red and blue within each 2x2 block to get the final
        // CFA pattern.
        for y in (0..self.height.saturating_sub(1)).step_by(2) {
            for x in (0..w.saturating_sub(1)).step_by(2) {
                data.swap(y * pitch + x + 1, (y + 1) * pitch + x);
            }
        }
        Ok(())
    }

    fn decompress_strip(
        &self,
        data: &mut [u16],
        pitch: usize,
        y: usize,
        strip: &ByteStream<'a>,
    ) -> Result<()> {
        let w = self.width;
        let mut pump = BitPumpMsb32::new(strip.full_buffer());

        let mut len = [if y < 2 { 7_i32 } else { 4 }; 4];
        let row = y * pitch;
        let row_up = y.saturating_sub(1) * pitch;
        let row_up2 = y.saturating_sub(2) * pitch;

        // the line is arranged in groups of 16 pixels
        for x in (0..w).step_by(16) {
            let dir = pump.get_bits(1)? != 0;
            let mut op = [0_u32; 4];
            for o in op.iter_mut() {
                *o = pump.get_bits(2)?;
            }
            for i in 0..4 {
                match op[i] {
                    3 => len[i] = pump.get_bits(4)? as i32,
                    2 => len[i] -= 1,
                    1 => len[i] += 1,
                    _ => {}
                }
                if len[i] < 0 {
                    return Err(Error::Decoder("SRW V0: bit length less than 0".to_string()));
                }
                if len[i] > 16 {
                    return Err(Error::Decoder("SRW V0: bit length more than 16".to_string()));
                }
            }

            if dir {
                // upward: evens predict from one line up, odds from
                // two lines up
                for c in (0..16).step_by(2) {
                    let b = len[c >> 3] as u32;
                    let adj = get_diff(&mut pump, b)?;
                    if x + c < w {
                        data[row + x + c] = (adj + i32::from(data[row_up + x + c])) as u16;
                    }
                }
                for c in (1..16).step_by(2) {
                    let b = len[2 | (c >> 3)] as u32;
                    let adj = get_diff(&mut pump, b)?;
                    if x + c < w {
                        data[row + x + c] = (adj + i32::from(data[row_up2 + x + c])) as u16;
                    }
                }
            } else {
                // left to right, 128 seeds the row start
                let mut pred_left = if x != 0 {
                    i32::from(data[row + x - 2])
                } else {
                    128
                };
                for c in (0..16).step_by(2) {
                    let b = len[c >> 3] as u32;
                    let adj = get_diff(&mut pump, b)?;
                    if x + c < w {
                        data[row + x + c] = (adj + pred_left) as u16;
                    }
                }
                pred_left = if x != 0 {
                    i32::from(data[row + x - 1])
                } else {
                    128
                };
                for c in (1..16).step_by(2) {
                    let b = len[2 | (c >> 3)] as u32;
                    let adj = get_diff(&mut pump, b)?;
                    if x + c < w {
                        data[row + x + c] = (adj + pred_left) as u16;
                    }
                }
            }
        }
        Ok(())
    }
}

/// V2 optimization flags from the stream header.
#[derive(Clone, Copy, Debug, Default)]
struct OptFlags {
    /// Never gate the per block difference lengths.
    skip: bool,
    /// Motion vector is a single bit.
    mv: bool,
    /// Do not scale the difference values.
    qp: bool,
}

impl OptFlags {
    fn from_bits(bits: u32) -> Result<OptFlags> {
        if bits > 7 {
            return Err(Error::Decoder(format!("SRW V2: invalid opt flags {bits:#x}")));
        }
        Ok(OptFlags {
            skip: bits & 1 != 0,
            mv: bits & 2 != 0,
            qp: bits & 4 != 0,
        })
    }
}

/// V2: 16 byte header, then rows of motion compensated 16 pixel
/// blocks, each row padded to a 16 byte boundary.
pub(crate) struct SamsungV2Decompressor<'a> {
    data: ByteStream<'a>,
    flags: OptFlags,
    width: usize,
    height: usize,
    bits: u32,
    bit_depth: u32,
    init_val: u16,
}

struct V2RowState {
    motion: u32,
    scale: i32,
    /// (last, previous) difference length per colour: green, blue,
    /// red.
    diff_bits_mode: [[u32; 2]; 3],
}

impl<'a> SamsungV2Decompressor<'a> {
    pub fn new(
        image: &RawImage,
        input: ByteStream<'a>,
        bits: u32,
    ) -> Result<SamsungV2Decompressor<'a>> {
        if image.cpp() != 1 || image.data_type() != RawImageType::U16 {
            return Err(Error::Decoder(
                "SRW V2: unexpected component count / data type".to_string(),
            ));
        }
        if bits != 12 && bits != 14 {
            return Err(Error::Decoder(format!("SRW V2: unexpected bits per pixel {bits}")));
        }

        let header = input.peek_bytes(16)?;
        let mut pump = BitPumpMsb32::new(header);
        pump.get_bits(16)?; // version
        pump.get_bits(4)?; // image format
        let bit_depth = pump.get_bits(4)? + 1;
        if bit_depth != 12 && bit_depth != 14 {
            return Err(Error::Decoder(format!(
                "SRW V2: unexpected bit depth {bit_depth}, expected 12 or 14"
            )));
        }
        pump.get_bits(4)?; // blocks per unit
        pump.get_bits(4)?; // compression ratio
        let width = pump.get_bits(16)? as usize;
        let height = pump.get_bits(16)? as usize;
        pump.get_bits(16)?; // tile width
        pump.get_bits(4)?; // reserved
        let flags = OptFlags::from_bits(pump.get_bits(4)?)?;
        pump.get_bits(8)?; // overlap width
        pump.get_bits(8)?; // reserved
        pump.get_bits(8)?; // inc
        pump.get_bits(2)?; // reserved
        let init_val = pump.get_bits(14)? as u16;

        if width == 0 || height == 0 || width % 16 != 0 || width > 6496 || height > 4336 {
            return Err(Error::Decoder(format!(
                "SRW V2: unexpected image dimensions ({width}; {height})"
            )));
        }
        let dim = image.uncropped_dim();
        if width != dim.x || height != dim.y {
            return Err(Error::Decoder(
                "SRW V2: EXIF dimensions do not match the raw header".to_string(),
            ));
        }
        let data = input.sub_stream(input.position() + 16, input.remaining() - 16)?;
        Ok(SamsungV2Decompressor {
            data,
            flags,
            width,
            height,
            bits,
            bit_depth,
            init_val,
        })
    }

    pub fn decompress(&self, image: &mut RawImage) -> Result<()> {
        let pitch = image.pitch_u16();
        let data = image.u16_data_mut();
        let mut stream = self.data.clone();
        for row in 0..self.height {
            // every line starts 16 byte aligned
            let line_offset = stream.position();
            if line_offset & 0xf != 0 {
                stream.skip(16 - (line_offset & 0xf))?;
            }
            let mut pump = BitPumpMsb32::new(stream.peek_bytes(stream.remaining())?);
            self.decompress_row(data, pitch, row, &mut pump)?;
            stream.skip(pump.buffer_position())?;
        }
        Ok(())
    }

    fn decompress_row(
        &self,
        data: &mut [u16],
        pitch: usize,
        row: usize,
        pump: &mut BitPumpMsb32,
    ) -> Result<()> {
        let mut state = V2RowState {
            motion: 7,
            scale: 0,
            diff_bits_mode: [[if row < 2 { 7 } else { 4 }; 2]; 3],
        };
        for col in (0..self.width).step_by(16) {
            self.process_block(data, pitch, row, col, pump, &mut state)?;
        }
        Ok(())
    }

    fn prepare_baseline(
        &self,
        data: &[u16],
        pitch: usize,
        row: usize,
        col: usize,
        pump: &mut BitPumpMsb32,
        state: &mut V2RowState,
    ) -> Result<[u16; 16]> {
        if !self.flags.qp && col & 63 == 0 {
            // scale update every 64 columns
            const SCALE_VALS: [i32; 3] = [0, -2, 2];
            let i = pump.get_bits(2)? as usize;
            state.scale = if i < 3 {
                state.scale + SCALE_VALS[i]
            } else {
                pump.get_bits(12)? as i32
            };
        }

        // reference pixel mode
        if self.flags.mv {
            state.motion = if pump.get_bits(1)? != 0 { 3 } else { 7 };
        } else if pump.get_bits(1)? == 0 {
            state.motion = pump.get_bits(3)?;
        }
        if row < 2 && state.motion != 7 {
            return Err(Error::Decoder(
                "SRW V2: at start of image and motion is not 7".to_string(),
            ));
        }

        let mut baseline = [0_u16; 16];
        if state.motion == 7 {
            // base case: copy the previous two pixels on this row,
            // or the initial value at the left edge
            if col == 0 {
                baseline.fill(self.init_val);
                return Ok(baseline);
            }
            let prev = [data[row * pitch + col - 2], data[row * pitch + col - 1]];
            for (i, b) in baseline.iter_mut().enumerate() {
                *b = prev[i & 1];
            }
            return Ok(baseline);
        }

        // lookup one or two lines above, possibly averaged
        const MOTION_OFFSET: [i32; 7] = [-4, -2, -2, 0, 0, 2, 4];
        const MOTION_DO_AVERAGE: [bool; 7] = [false, false, true, false, true, false, false];
        let slide_offset = MOTION_OFFSET[state.motion as usize];
        let do_average = MOTION_DO_AVERAGE[state.motion as usize];

        for (i, b) in baseline.iter_mut().enumerate() {
            let mut ref_row = row as i32;
            let mut ref_col = col as i32 + i as i32 + slide_offset;
            if (row + i) & 1 != 0 {
                // red and blue take the same colour two lines up
                ref_row -= 2;
            } else {
                // green takes the diagonal green from the row above
                ref_row -= 1;
                ref_col += if i & 1 != 0 { -1 } else { 1 };
            }
            if ref_col < 0 {
                return Err(Error::Decoder(format!(
                    "SRW V2: bad motion {} at the beginning of the row",
                    state.motion
                )));
            }
            let ref_col = ref_col as usize;
            if ref_col >= self.width || (do_average && ref_col + 2 >= self.width) {
                return Err(Error::Decoder(format!(
                    "SRW V2: bad motion {} at the end of the row",
                    state.motion
                )));
            }
            let base = data[ref_row as usize * pitch + ref_col];
            *b = if do_average {
                ((u32::from(base) + u32::from(data[ref_row as usize * pitch + ref_col + 2]) + 1)
                    >> 1) as u16
            } else {
                base
            };
        }
        Ok(baseline)
    }

    fn decode_diff_lengths(
        &self,
        row: usize,
        pump: &mut BitPumpMsb32,
        state: &mut V2RowState,
    ) -> Result<[u32; 4]> {
        // without SKIP a gate bit of 1 means "no differences"
        if !self.flags.skip && pump.get_bits(1)? != 0 {
            return Ok([0; 4]);
        }
        let mut flags = [0_u32; 4];
        for f in flags.iter_mut() {
            *f = pump.get_bits(2)?;
        }
        let mut diff_bits = [0_u32; 4];
        for i in 0..4 {
            // colour: 0 green, 1 blue, 2 red
            let colornum = if row % 2 != 0 {
                i >> 1
            } else {
                ((i >> 1) + 2) % 3
            };
            diff_bits[i] = match flags[i] {
                0 => state.diff_bits_mode[colornum][0],
                1 => state.diff_bits_mode[colornum][0] + 1,
                2 => {
                    if state.diff_bits_mode[colornum][0] == 0 {
                        return Err(Error::Decoder(
                            "SRW V2: difference bits underflow".to_string(),
                        ));
                    }
                    state.diff_bits_mode[colornum][0] - 1
                }
                _ => pump.get_bits(4)?,
            };
            state.diff_bits_mode[colornum][0] = state.diff_bits_mode[colornum][1];
            state.diff_bits_mode[colornum][1] = diff_bits[i];
            if diff_bits[i] > self.bit_depth + 1 {
                return Err(Error::Decoder(format!(
                    "SRW V2: too many difference bits ({})",
                    diff_bits[i]
                )));
            }
        }
        Ok(diff_bits)
    }

    fn decode_differences(
        &self,
        row: usize,
        pump: &mut BitPumpMsb32,
        state: &mut V2RowState,
    ) -> Result<[i32; 16]> {
        let diff_bits = self.decode_diff_lengths(row, pump, state)?;

        let mut diffs = [0_i32; 16];
        for (i, d) in diffs.iter_mut().enumerate() {
            *d = get_diff(pump, diff_bits[i >> 2])?;
        }

        // the differences are stored pairwise interleaved:
        // 0 2 4 6 8 10 12 14 1 3 5 7 9 11 13 15
        let mut shuffled = [0_i32; 16];
        for (i, d) in diffs.iter().enumerate() {
            let p = if row % 2 != 0 {
                ((i % 8) << 1) + 1 - (i >> 3)
            } else {
                ((i % 8) << 1) + (i >> 3)
            };
            shuffled[p] = *d;
        }

        let mut scaled = [0_i32; 16];
        for (i, s) in scaled.iter_mut().enumerate() {
            *s = shuffled[i] * (state.scale * 2 + 1) + state.scale;
        }
        Ok(scaled)
    }

    fn process_block(
        &self,
        data: &mut [u16],
        pitch: usize,
        row: usize,
        col: usize,
        pump: &mut BitPumpMsb32,
        state: &mut V2RowState,
    ) -> Result<()> {
        let baseline = self.prepare_baseline(data, pitch, row, col, pump, state)?;
        let diffs = self.decode_differences(row, pump, state)?;
        for i in 0..16 {
            data[row * pitch + col + i] =
                clamp_bits(i64::from(baseline[i]) + i64::from(diffs[i]), self.bits);
        }
        Ok(())
    }
}

#[cfg(test)]
mod test {
    use super::{OptFlags, SamsungV0Decompressor};
    use crate::bytestream::{ByteStream, Endian};
    use crate::rawimage::{Point, RawImage};

    #[test]
    fn test_opt_flags() {
        let all = OptFlags::from_bits(7).unwrap();
        assert!(all.skip && all.mv && all.qp);
        let none = OptFlags::from_bits(0).unwrap();
        assert!(!none.skip && !none.mv && !none.qp);
        assert!(OptFlags::from_bits(8).is_err());
    }

    #[test]
    fn test_v0_offsets_must_increase() {
        let mut img = RawImage::new_u16(Point::new(16, 2), 1);
        img.create_data();
        let offsets = [0_u32.to_le_bytes(), 0_u32.to_le_bytes()].concat();
        let raw = vec![0_u8; 64];
        let r = SamsungV0Decompressor::new(
            &img,
            ByteStream::new(&offsets, Endian::Little),
            ByteStream::new(&raw, Endian::Little),
        );
        assert!(r.is_err());
    }

    #[test]
    fn test_v0_left_prediction_row() {
        // Row 0, single group, direction bit 0 (left prediction),
        // all four ops 0 keep len at 7; all sixteen 7 bit deltas are
        // 1, so evens run 129, 130, ... from the seed 128.
        let mut img = RawImage::new_u16(Point::new(16, 2), 1);
        img.create_data();

        // strip bits, MSB32 order: 1 dir bit + 4*2 op bits + 16*7
        // delta bits = 121 bits
        let mut bits_vec: Vec<bool> = Vec::new();
        bits_vec.push(false);
        for _ in 0..8 {
            bits_vec.push(false);
        }
        for _ in 0..16 {
            for b in [false, false, false, false, false, false, true] {
                bits_vec.push(b);
            }
        }
        while bits_vec.len() % 32 != 0 {
            bits_vec.push(false);
        }
        // pack into 32 bit little endian words, bits from the top
        let mut strip = Vec::new();
        for word_bits in bits_vec.chunks(32) {
            let mut word = 0_u32;
            for (i, b) in word_bits.iter().enumerate() {
                if *b {
                    word |= 1 << (31 - i);
                }
            }
            strip.extend_from_slice(&word.to_le_bytes());
        }
        let strip2 = strip.clone();

        let mut offsets = Vec::new();
        offsets.extend_from_slice(&0_u32.to_le_bytes());
        offsets.extend_from_slice(&(strip.len() as u32).to_le_bytes());
        let mut raw = strip;
        raw.extend_from_slice(&strip2);

        let d = SamsungV0Decompressor::new(
            &img,
            ByteStream::new(&offsets, Endian::Little),
            ByteStream::new(&raw, Endian::Little),
        )
        .unwrap();
        d.decompress(&mut img).unwrap();

        // evens: 128+1, then previous-even+1... but the fixed seed
        // means every even pixel is 129 and every odd one 129
        // (before the red/blue corner swap, which only touches
        // columns 1 and 0 of the two rows)
        assert_eq!(img.u16_at(0, 0, 0), 129);
        assert_eq!(img.u16_at(2, 0, 0), 129);
        assert_eq!(img.u16_at(3, 0, 0), 129);
    }
}
