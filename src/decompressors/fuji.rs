// SPDX-License-Identifier: LGPL-3.0-or-later
/*
 * rawspeed - decompressors/fuji.rs
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

//! Fujifilm compressed RAF decompression.
//!
//! The image splits into vertical strips of `block_size` columns;
//! strips decode independently. Each strip line yields six output
//! rows through eighteen rolling line buffers (five red, eight
//! green, five blue). Samples are coded against per gradient
//! adaptive `(value1, value2)` pairs quantized through a table built
//! from the bit depth, with distinct even and odd position
//! predictors, for both Bayer and X-Trans mosaics.

use rayon::prelude::*;

use crate::bitstream::BitPumpMsb;
use crate::bytestream::{ByteStream, Endian};
use crate::cfa::CfaColor;
use crate::decompressors::{check_error_log, SharedRaster};
use crate::rawimage::{RawImage, RawImageType};
use crate::{Error, Result};

// line buffer indices; each colour keeps `n` rolling rows
const R0: usize = 0;
const R1: usize = 1;
const R2: usize = 2;
const R3: usize = 3;
const R4: usize = 4;
const G0: usize = 5;
const G1: usize = 6;
const G2: usize = 7;
const G3: usize = 8;
const G4: usize = 9;
const G5: usize = 10;
const G6: usize = 11;
const G7: usize = 12;
const B0: usize = 13;
const B1: usize = 14;
const B2: usize = 15;
const B3: usize = 16;
const B4: usize = 17;
const LTOTAL: usize = 18;

/// Six output rows per strip line.
const LINE_HEIGHT: usize = 6;

#[derive(Clone, Copy, Debug, Default)]
pub(crate) struct FujiHeader {
    pub signature: u16,
    pub version: u8,
    pub raw_type: u8,
    pub raw_bits: u8,
    pub raw_height: u16,
    pub raw_rounded_width: u16,
    pub raw_width: u16,
    pub block_size: u16,
    pub blocks_in_row: u8,
    pub total_lines: u16,
}

impl FujiHeader {
    pub fn parse(stream: &mut ByteStream) -> Result<FujiHeader> {
        let mut s = stream.clone();
        s.set_endian(Endian::Big);
        let header = FujiHeader {
            signature: s.get_u16()?,
            version: s.get_u8()?,
            raw_type: s.get_u8()?,
            raw_bits: s.get_u8()?,
            raw_height: s.get_u16()?,
            raw_rounded_width: s.get_u16()?,
            raw_width: s.get_u16()?,
            block_size: s.get_u16()?,
            blocks_in_row: s.get_u8()?,
            total_lines: s.get_u16()?,
        };
        stream.seek(s.position())?;
        Ok(header)
    }

    pub fn is_valid(&self) -> bool {
        let h = usize::from(self.raw_height);
        let w = usize::from(self.raw_width);
        let rw = usize::from(self.raw_rounded_width);
        let bs = usize::from(self.block_size);
        let bir = usize::from(self.blocks_in_row);
        let tl = usize::from(self.total_lines);
        !(self.signature != 0x4953
            || self.version != 1
            || h > 0x3000
            || h < LINE_HEIGHT
            || h % LINE_HEIGHT != 0
            || w > 0x3000
            || w < 0x300
            || w % 24 != 0
            || rw > 0x3000
            || bs != 0x300
            || rw < bs
            || rw % bs != 0
            || rw - w >= bs
            || bir > 0x10
            || bir == 0
            || bir != rw / bs
            || bir != w.div_euclid(bs) + usize::from(w % bs != 0)
            || tl > 0x800
            || tl == 0
            || tl != h / LINE_HEIGHT
            || (self.raw_bits != 12 && self.raw_bits != 14 && self.raw_bits != 16)
            || (self.raw_type != 16 && self.raw_type != 0))
    }
}

#[derive(Clone, Debug)]
struct Params {
    q_table: Vec<i8>,
    q_point: [i32; 5],
    max_bits: i32,
    min_value: i32,
    raw_bits: u32,
    total_values: i32,
    max_diff: i32,
    line_width: usize,
}

impl Params {
    fn new(header: &FujiHeader) -> Result<Params> {
        let block_size = usize::from(header.block_size);
        if (block_size % 3 != 0 && header.raw_type == 16)
            || (block_size & 1 != 0 && header.raw_type == 0)
        {
            return Err(Error::Decoder("RAF: block size check failed".to_string()));
        }
        let line_width = if header.raw_type == 16 {
            block_size * 2 / 3
        } else {
            block_size >> 1
        };

        let q_point = [0, 0x12, 0x43, 0x114, (1_i32 << header.raw_bits) - 1];
        let mut q_table = vec![0_i8; 2 * (1 << header.raw_bits)];
        for (i, qt) in q_table.iter_mut().enumerate() {
            let cur_val = i as i32 - q_point[4];
            *qt = if cur_val <= -q_point[3] {
                -4
            } else if cur_val <= -q_point[2] {
                -3
            } else if cur_val <= -q_point[1] {
                -2
            } else if cur_val < 0 {
                -1
            } else if cur_val == 0 {
                0
            } else if cur_val < q_point[1] {
                1
            } else if cur_val < q_point[2] {
                2
            } else if cur_val < q_point[3] {
                3
            } else {
                4
            };
        }

        let (total_values, raw_bits, max_bits, max_diff) = match q_point[4] {
            0xffff => (0x10000, 16, 64, 1024),
            0x3fff => (0x4000, 14, 56, 256),
            0xfff => {
                return Err(Error::Decoder(
                    "RAF: 12-bit compressed data is not supported".to_string(),
                ));
            }
            _ => return Err(Error::Decoder("RAF: bad quantization ceiling".to_string())),
        };

        Ok(Params {
            q_table,
            q_point,
            max_bits,
            min_value: 0x40,
            raw_bits,
            total_values,
            max_diff,
            line_width,
        })
    }
}

/// An adaptive gradient: accumulated magnitude and count.
#[derive(Clone, Copy, Debug)]
struct Grad {
    value1: i32,
    value2: i32,
}

type Grads = [Grad; 41];

/// Per strip decode state: the pump, the rolling line buffers and
/// the gradient tables.
struct BlockState<'a> {
    pump: BitPumpMsb<'a>,
    /// `LTOTAL` lines of `line_width + 2` samples each, contiguous
    /// so a line can reach into the line above it by offset.
    lines: Vec<u16>,
    grad_even: [Grads; 3],
    grad_odd: [Grads; 3],
}

impl<'a> BlockState<'a> {
    fn new(params: &Params, strip_data: &'a [u8]) -> BlockState<'a> {
        let grads = [Grad {
            value1: params.max_diff,
            value2: 1,
        }; 41];
        BlockState {
            pump: BitPumpMsb::new(strip_data),
            lines: vec![0; LTOTAL * (params.line_width + 2)],
            grad_even: [grads; 3],
            grad_odd: [grads; 3],
        }
    }

    /// Count the leading zeros up to the terminating one bit.
    fn zerobits(&mut self) -> Result<i32> {
        let mut count = 0_i32;
        loop {
            let batch = (self.pump.peek_bits(31)? << 1) | 1;
            let zeros = batch.leading_zeros();
            count += zeros as i32;
            let all_zeros = zeros == 31;
            self.pump
                .skip_bits_no_fill(zeros + u32::from(!all_zeros));
            if !all_zeros {
                return Ok(count);
            }
        }
    }
}

fn bit_diff(value1: i32, value2: i32) -> u32 {
    if value2 >= value1 {
        return 0;
    }
    let mut dec_bits = 0;
    while dec_bits <= 14 {
        dec_bits += 1;
        if (value2 << dec_bits) >= value1 {
            return dec_bits;
        }
    }
    dec_bits
}

pub(crate) struct FujiDecompressor<'a> {
    header: FujiHeader,
    params: Params,
    cfa: [[CfaColor; 6]; 6],
    strips: Vec<ByteStream<'a>>,
}

impl<'a> FujiDecompressor<'a> {
    pub fn new(image: &RawImage, mut input: ByteStream<'a>) -> Result<FujiDecompressor<'a>> {
        if image.cpp() != 1 || image.data_type() != RawImageType::U16 {
            return Err(Error::Decoder(
                "RAF: unexpected component count / data type".to_string(),
            ));
        }
        input.set_endian(Endian::Big);
        let header = FujiHeader::parse(&mut input)?;
        if !header.is_valid() {
            return Err(Error::Decoder("RAF: compressed header check".to_string()));
        }
        let dim = image.uncropped_dim();
        if dim.x != usize::from(header.raw_width) || dim.y != usize::from(header.raw_height) {
            return Err(Error::Decoder(
                "RAF: header specifies different dimensions".to_string(),
            ));
        }
        let params = Params::new(&header)?;

        let mut cfa = [[CfaColor::Unknown; 6]; 6];
        for (i, cfa_row) in cfa.iter_mut().enumerate() {
            for (j, c) in cfa_row.iter_mut().enumerate() {
                *c = image.cfa.color_at(j, i);
                if !matches!(*c, CfaColor::Red | CfaColor::Green | CfaColor::Blue) {
                    return Err(Error::Decoder(format!("RAF: unexpected colour {c:?}")));
                }
            }
        }

        // per strip byte counts, then padding to a 16 byte boundary
        let blocks_in_row = usize::from(header.blocks_in_row);
        let mut block_sizes = Vec::with_capacity(blocks_in_row);
        for _ in 0..blocks_in_row {
            block_sizes.push(input.get_u32()? as usize);
        }
        let raw_offset = 4 * blocks_in_row;
        if raw_offset & 0xc != 0 {
            input.skip(0x10 - (raw_offset & 0xc))?;
        }
        let mut strips = Vec::with_capacity(blocks_in_row);
        for block_size in block_sizes {
            let start = input.position();
            input.skip(block_size)?;
            strips.push(input.sub_stream(start, block_size)?);
        }

        Ok(FujiDecompressor {
            header,
            params,
            cfa,
            strips,
        })
    }

    fn quant_gradient(&self, v1: i32, v2: i32) -> i32 {
        let q4 = self.params.q_point[4];
        9 * i32::from(self.params.q_table[(q4 + v1) as usize])
            + i32::from(self.params.q_table[(q4 + v2) as usize])
    }

    /// Decode one coded sample into `lines[line]` at even/odd
    /// position `pos`. `even` selects the neighbourhood formula.
    fn decode_sample(
        &self,
        state_pump: &mut BitPumpMsb,
        lines: &mut [u16],
        line: usize,
        pos: &mut usize,
        grads: &mut Grads,
        even: bool,
        zeros: i32,
    ) -> Result<()> {
        let lw = self.params.line_width as isize;
        let cur = (line * (self.params.line_width + 2)) as isize + 1 + *pos as isize;
        let l = |i: isize| i32::from(lines[(cur + i) as usize]);

        let (grad, gradient, interp_val);
        if even {
            let rb = l(-2 - lw);
            let rc = l(-3 - lw);
            let rd = l(-1 - lw);
            let rf = l(-4 - 2 * lw);
            grad = self.quant_gradient(rb - rf, rc - rb);
            gradient = grad.abs();
            let diff_rc_rb = (rc - rb).abs();
            let diff_rf_rb = (rf - rb).abs();
            let diff_rd_rb = (rd - rb).abs();
            interp_val = if diff_rc_rb > diff_rf_rb && diff_rc_rb > diff_rd_rb {
                rf + rd + 2 * rb
            } else if diff_rd_rb > diff_rc_rb && diff_rd_rb > diff_rf_rb {
                rf + rc + 2 * rb
            } else {
                rd + rc + 2 * rb
            };
        } else {
            let ra = l(-1);
            let rb = l(-2 - lw);
            let rc = l(-3 - lw);
            let rd = l(-1 - lw);
            let rg = l(1);
            grad = self.quant_gradient(rb - rc, rc - ra);
            gradient = grad.abs();
            interp_val = if (rb > rc && rb > rd) || (rb < rc && rb < rd) {
                (rg + ra + 2 * rb) >> 2
            } else {
                (ra + rg) >> 1
            };
        }

        let sample = zeros;
        let mut code;
        if sample < self.params.max_bits - self.params.raw_bits as i32 - 1 {
            let dec_bits = bit_diff(grads[gradient as usize].value1, grads[gradient as usize].value2);
            code = if dec_bits != 0 {
                state_pump.get_bits(dec_bits)? as i32
            } else {
                0
            };
            code += sample << dec_bits;
        } else {
            code = state_pump.get_bits(self.params.raw_bits)? as i32;
            code += 1;
        }
        if code < 0 || code >= self.params.total_values {
            return Err(Error::Decoder("RAF: sample out of range".to_string()));
        }
        if code & 1 != 0 {
            code = -1 - code / 2;
        } else {
            code /= 2;
        }

        let g = &mut grads[gradient as usize];
        g.value1 += code.abs();
        if g.value2 == self.params.min_value {
            g.value1 >>= 1;
            g.value2 >>= 1;
        }
        g.value2 += 1;

        let mut value = if even {
            if grad < 0 {
                (interp_val >> 2) - code
            } else {
                (interp_val >> 2) + code
            }
        } else if grad < 0 {
            interp_val - code
        } else {
            interp_val + code
        };
        if value < 0 {
            value += self.params.total_values;
        } else if value > self.params.q_point[4] {
            value -= self.params.total_values;
        }
        lines[cur as usize] = if value >= 0 {
            value.min(self.params.q_point[4]) as u16
        } else {
            0
        };
        *pos += 2;
        Ok(())
    }

    fn decode_sample_even(
        &self,
        state: &mut BlockState,
        line: usize,
        pos: &mut usize,
        grad: usize,
    ) -> Result<()> {
        let zeros = state.zerobits()?;
        let grads = &mut state.grad_even[grad];
        self.decode_sample(&mut state.pump, &mut state.lines, line, pos, grads, true, zeros)
    }

    fn decode_sample_odd(
        &self,
        state: &mut BlockState,
        line: usize,
        pos: &mut usize,
        grad: usize,
    ) -> Result<()> {
        let zeros = state.zerobits()?;
        let grads = &mut state.grad_odd[grad];
        self.decode_sample(&mut state.pump, &mut state.lines, line, pos, grads, false, zeros)
    }

    /// The even position interpolation only variant, no coded bits.
    fn interpolation_even(&self, lines: &mut [u16], line: usize, pos: &mut usize) {
        let lw = self.params.line_width as isize;
        let cur = (line * (self.params.line_width + 2)) as isize + 1 + *pos as isize;
        let l = |i: isize| i32::from(lines[(cur + i) as usize]);
        let rb = l(-2 - lw);
        let rc = l(-3 - lw);
        let rd = l(-1 - lw);
        let rf = l(-4 - 2 * lw);
        let diff_rc_rb = (rc - rb).abs();
        let diff_rf_rb = (rf - rb).abs();
        let diff_rd_rb = (rd - rb).abs();
        let value = if diff_rc_rb > diff_rf_rb && diff_rc_rb > diff_rd_rb {
            (rf + rd + 2 * rb) >> 2
        } else if diff_rd_rb > diff_rc_rb && diff_rd_rb > diff_rf_rb {
            (rf + rc + 2 * rb) >> 2
        } else {
            (rd + rc + 2 * rb) >> 2
        };
        lines[cur as usize] = value as u16;
        *pos += 2;
    }

    fn extend(&self, lines: &mut [u16], start: usize, end: usize) {
        let stride = self.params.line_width + 2;
        let lw = self.params.line_width;
        for i in start..=end {
            lines[i * stride] = lines[(i - 1) * stride + 1];
            lines[i * stride + lw + 1] = lines[(i - 1) * stride + lw];
        }
    }

    fn extend_red(&self, lines: &mut [u16]) {
        self.extend(lines, R2, R4);
    }

    fn extend_green(&self, lines: &mut [u16]) {
        self.extend(lines, G2, G7);
    }

    fn extend_blue(&self, lines: &mut [u16]) {
        self.extend(lines, B2, B4);
    }

    /// One pass over a line pair. Every pass starts with fresh
    /// positions; the green line drives the loop. `mode` selects the
    /// per position choice between a coded sample and plain
    /// interpolation on the even positions:
    /// 0: interpolate c0, decode c1
    /// 1: decode c0, interpolate c1
    /// 2: decode both
    /// 3: c0 decoded except on positions divisible by 4; c1 interpolated
    /// 4: c0 decoded; c1 interpolated on positions 2 mod 4
    /// 5: c0 interpolated on positions 2 mod 4; c1 decoded
    /// 6: c0 interpolated; c1 decoded except on positions divisible by 4
    fn pass(
        &self,
        state: &mut BlockState,
        mode: u32,
        c0: usize,
        c1: usize,
        grad: usize,
        green_is_c0: bool,
    ) -> Result<()> {
        let lw = self.params.line_width;
        // (even, odd) cursor per line
        let mut pos0 = (0_usize, 1_usize);
        let mut pos1 = (0_usize, 1_usize);
        loop {
            let green = if green_is_c0 { pos0 } else { pos1 };
            if green.0 >= lw && green.1 >= lw {
                break;
            }
            if green.0 < lw {
                match mode {
                    0 => {
                        self.interpolation_even(&mut state.lines, c0, &mut pos0.0);
                        self.decode_sample_even(state, c1, &mut pos1.0, grad)?;
                    }
                    1 => {
                        self.decode_sample_even(state, c0, &mut pos0.0, grad)?;
                        self.interpolation_even(&mut state.lines, c1, &mut pos1.0);
                    }
                    2 => {
                        self.decode_sample_even(state, c0, &mut pos0.0, grad)?;
                        self.decode_sample_even(state, c1, &mut pos1.0, grad)?;
                    }
                    3 => {
                        if pos0.0 & 3 != 0 {
                            self.decode_sample_even(state, c0, &mut pos0.0, grad)?;
                        } else {
                            self.interpolation_even(&mut state.lines, c0, &mut pos0.0);
                        }
                        self.interpolation_even(&mut state.lines, c1, &mut pos1.0);
                    }
                    4 => {
                        self.decode_sample_even(state, c0, &mut pos0.0, grad)?;
                        if pos1.0 & 3 == 2 {
                            self.interpolation_even(&mut state.lines, c1, &mut pos1.0);
                        } else {
                            self.decode_sample_even(state, c1, &mut pos1.0, grad)?;
                        }
                    }
                    5 => {
                        if pos0.0 & 3 == 2 {
                            self.interpolation_even(&mut state.lines, c0, &mut pos0.0);
                        } else {
                            self.decode_sample_even(state, c0, &mut pos0.0, grad)?;
                        }
                        self.decode_sample_even(state, c1, &mut pos1.0, grad)?;
                    }
                    _ => {
                        self.interpolation_even(&mut state.lines, c0, &mut pos0.0);
                        if pos1.0 & 3 != 0 {
                            self.decode_sample_even(state, c1, &mut pos1.0, grad)?;
                        } else {
                            self.interpolation_even(&mut state.lines, c1, &mut pos1.0);
                        }
                    }
                }
            }
            let green = if green_is_c0 { pos0 } else { pos1 };
            if green.0 > 8 {
                self.decode_sample_odd(state, c0, &mut pos0.1, grad)?;
                self.decode_sample_odd(state, c1, &mut pos1.1, grad)?;
            }
        }
        Ok(())
    }

    fn xtrans_decode_block(&self, state: &mut BlockState) -> Result<()> {
        self.pass(state, 0, R2, G2, 0, false)?;
        self.extend_red(&mut state.lines);
        self.extend_green(&mut state.lines);

        self.pass(state, 1, G3, B2, 1, true)?;
        self.extend_green(&mut state.lines);
        self.extend_blue(&mut state.lines);

        self.pass(state, 3, R3, G4, 2, false)?;
        self.extend_red(&mut state.lines);
        self.extend_green(&mut state.lines);

        self.pass(state, 4, G5, B3, 0, true)?;
        self.extend_green(&mut state.lines);
        self.extend_blue(&mut state.lines);

        self.pass(state, 5, R4, G6, 1, false)?;
        self.extend_red(&mut state.lines);
        self.extend_green(&mut state.lines);

        self.pass(state, 6, G7, B4, 2, true)?;
        self.extend_green(&mut state.lines);
        self.extend_blue(&mut state.lines);
        Ok(())
    }

    fn bayer_decode_block(&self, state: &mut BlockState) -> Result<()> {
        for (c0, c1, grad, green_is_c0) in [
            (R2, G2, 0, false),
            (G3, B2, 1, true),
            (R3, G4, 2, false),
            (G5, B3, 0, true),
            (R4, G6, 1, false),
            (G7, B4, 2, true),
        ] {
            self.pass(state, 2, c0, c1, grad, green_is_c0)?;
            if green_is_c0 {
                self.extend_green(&mut state.lines);
                self.extend_blue(&mut state.lines);
            } else {
                self.extend_red(&mut state.lines);
                self.extend_green(&mut state.lines);
            }
        }
        Ok(())
    }

    fn strip_width(&self, n: usize) -> usize {
        let bs = usize::from(self.header.block_size);
        if n + 1 != usize::from(self.header.blocks_in_row) {
            bs
        } else {
            usize::from(self.header.raw_width) - bs * n
        }
    }

    fn copy_line(
        &self,
        out: &mut [u16],
        pitch: usize,
        lines: &[u16],
        n: usize,
        cur_line: usize,
    ) {
        let stride = self.params.line_width + 2;
        let xtrans = self.header.raw_type == 16;
        let offset_x = usize::from(self.header.block_size) * n;
        for row_count in 0..LINE_HEIGHT {
            let out_row = (cur_line * LINE_HEIGHT + row_count) * pitch + offset_x;
            for pixel_count in 0..self.strip_width(n) {
                let line = match self.cfa[row_count][pixel_count % 6] {
                    CfaColor::Red => R2 + (row_count >> 1),
                    CfaColor::Green => G2 + row_count,
                    _ => B2 + (row_count >> 1),
                };
                let index = if xtrans {
                    (((pixel_count * 2 / 3) & !1) | ((pixel_count % 3) & 1))
                        + ((pixel_count % 3) >> 1)
                } else {
                    pixel_count >> 1
                };
                out[out_row + pixel_count] = lines[line * stride + 1 + index];
            }
        }
    }

    fn decode_strip(&self, out: &mut [u16], pitch: usize, n: usize, strip: &ByteStream) -> Result<()> {
        let mut state = BlockState::new(&self.params, strip.full_buffer());
        let stride = self.params.line_width + 2;

        // (dst, src) rotations after each line; the zero table
        // clears a colour's working rows and reseeds the edges
        const MTABLE: [(usize, usize); 6] =
            [(R0, R3), (R1, R4), (G0, G6), (G1, G7), (B0, B3), (B1, B4)];
        const ZTABLE: [(usize, usize); 3] = [(R2, 3), (G2, 6), (B2, 3)];

        for cur_line in 0..usize::from(self.header.total_lines) {
            if self.header.raw_type == 16 {
                self.xtrans_decode_block(&mut state)?;
            } else {
                self.bayer_decode_block(&mut state)?;
            }

            for (dst, src) in MTABLE {
                state.lines.copy_within(src * stride..(src + 1) * stride, dst * stride);
            }

            self.copy_line(out, pitch, &state.lines, n, cur_line);

            for (start, count) in ZTABLE {
                state.lines[start * stride..(start + count) * stride].fill(0);
                state.lines[start * stride] = state.lines[(start - 1) * stride + 1];
                state.lines[start * stride + self.params.line_width + 1] =
                    state.lines[(start - 1) * stride + self.params.line_width];
            }
        }
        Ok(())
    }

    pub fn decompress(&self, image: &mut RawImage) -> Result<()> {
        let pitch = image.pitch_u16();
        let errors = image.error_log();
        let raster = SharedRaster::new(image.u16_data_mut());
        self.strips.par_iter().enumerate().for_each(|(n, strip)| {
            // Safety: strips cover disjoint column ranges.
            let out = unsafe { raster.inner_mut() };
            if let Err(err) = self.decode_strip(out, pitch, n, strip) {
                errors.set_error(&format!("RAF strip {n}: {err}"));
            }
        });
        check_error_log(&errors, 1)
    }
}

#[cfg(test)]
mod test {
    use super::{bit_diff, FujiHeader};
    use crate::bytestream::{ByteStream, Endian};

    fn header_bytes() -> Vec<u8> {
        let mut out = Vec::new();
        out.extend_from_slice(&0x4953_u16.to_be_bytes());
        out.push(1); // version
        out.push(16); // raw type: X-Trans
        out.push(14); // bits
        out.extend_from_slice(&4158_u16.to_be_bytes()); // height: 693 * 6
        out.extend_from_slice(&6144_u16.to_be_bytes()); // rounded width
        out.extend_from_slice(&6048_u16.to_be_bytes()); // width
        out.extend_from_slice(&0x300_u16.to_be_bytes()); // block size
        out.push(8); // blocks in row
        out.extend_from_slice(&693_u16.to_be_bytes()); // total lines
        out
    }

    #[test]
    fn test_header_parse() {
        let bytes = header_bytes();
        let mut stream = ByteStream::new(&bytes, Endian::Big);
        let h = FujiHeader::parse(&mut stream).unwrap();
        assert!(h.is_valid());
        assert_eq!(h.raw_width, 6048);
        assert_eq!(h.blocks_in_row, 8);
    }

    #[test]
    fn test_header_rejects_bad_signature() {
        let mut bytes = header_bytes();
        bytes[0] = 0;
        let mut stream = ByteStream::new(&bytes, Endian::Big);
        let h = FujiHeader::parse(&mut stream).unwrap();
        assert!(!h.is_valid());
    }

    #[test]
    fn test_bit_diff() {
        assert_eq!(bit_diff(10, 20), 0);
        assert_eq!(bit_diff(20, 10), 1);
        assert_eq!(bit_diff(41, 10), 3);
        // never more than 15
        assert_eq!(bit_diff(1 << 20, 1), 15);
    }
}
