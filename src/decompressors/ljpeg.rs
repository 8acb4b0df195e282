// SPDX-License-Identifier: LGPL-3.0-or-later
/*
 * rawspeed - decompressors/ljpeg.rs
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

//! Lossless JPEG (ITU T.81 process 14, SOF3).
//!
//! The flavour used inside DNG tiles and most TIFF based raws: DC
//! prediction only, Huffman coded differences, two to four
//! components per MCU, predictors 1 through 7 and an optional point
//! transform.

use crate::bitstream::BitPumpJpeg;
use crate::bytestream::{ByteStream, Endian};
use crate::decompressors::huffman::HuffmanTable;
use crate::rawimage::{Point, RawImage, RawImageType};
use crate::{Error, Result};

const M_SOI: u8 = 0xd8;
const M_SOF3: u8 = 0xc3;
const M_DHT: u8 = 0xc4;
const M_SOS: u8 = 0xda;
const M_EOI: u8 = 0xd9;
const M_DQT: u8 = 0xdb;

/// A parsed SOF3 frame plus scan parameters; `decompress` runs the
/// scan into a caller provided image region.
pub(crate) struct LJpegDecompressor<'a> {
    /// The entropy coded scan payload.
    scan: ByteStream<'a>,
    tables: Vec<Option<HuffmanTable>>,
    /// Per component DC table selector.
    dc_table: [usize; 4],
    pub precision: u32,
    /// MCUs per row (samples per component).
    pub frame_width: usize,
    pub frame_height: usize,
    pub components: usize,
    predictor: u32,
    point_transform: u32,
}

impl<'a> LJpegDecompressor<'a> {
    /// Parse the headers. `input` must start at the SOI marker.
    pub fn new(input: ByteStream<'a>) -> Result<LJpegDecompressor<'a>> {
        let mut stream = input;
        stream.set_endian(Endian::Big);
        if stream.get_u8()? != 0xff || stream.get_u8()? != M_SOI {
            return Err(Error::Decoder("LJPEG: no SOI marker".to_string()));
        }

        let mut tables: Vec<Option<HuffmanTable>> = (0..4).map(|_| None).collect();
        let mut frame: Option<(u32, usize, usize, Vec<u8>)> = None;

        loop {
            // markers may be preceded by fill bytes
            let mut marker = stream.get_u8()?;
            while marker == 0xff {
                marker = stream.get_u8()?;
            }
            if marker == 0 {
                continue;
            }
            match marker {
                M_SOF3 => {
                    let len = stream.get_u16()? as usize;
                    if len < 8 {
                        return Err(Error::Decoder("LJPEG: short SOF3".to_string()));
                    }
                    let precision = u32::from(stream.get_u8()?);
                    if !(2..=16).contains(&precision) {
                        return Err(Error::Decoder(format!(
                            "LJPEG: unsupported sample precision {precision}"
                        )));
                    }
                    let height = stream.get_u16()? as usize;
                    let width = stream.get_u16()? as usize;
                    let n_comp = stream.get_u8()? as usize;
                    if n_comp == 0 || n_comp > 4 {
                        return Err(Error::Decoder(format!(
                            "LJPEG: unsupported component count {n_comp}"
                        )));
                    }
                    let mut ids = Vec::with_capacity(n_comp);
                    for _ in 0..n_comp {
                        let id = stream.get_u8()?;
                        let sampling = stream.get_u8()?;
                        if sampling != 0x11 {
                            return Err(Error::Decoder(
                                "LJPEG: subsampled components are not supported".to_string(),
                            ));
                        }
                        stream.skip(1)?; // quantization selector, unused
                        ids.push(id);
                    }
                    frame = Some((precision, width, height, ids));
                }
                M_DHT => {
                    let len = stream.get_u16()? as usize;
                    let mut remaining = len.saturating_sub(2);
                    while remaining > 0 {
                        let index = stream.get_u8()? as usize;
                        if index >= 4 {
                            return Err(Error::Decoder(format!(
                                "LJPEG: bad DHT table index {index}"
                            )));
                        }
                        let mut counts = [0_u8; 16];
                        counts.copy_from_slice(stream.get_bytes(16)?);
                        let total: usize = counts.iter().map(|c| *c as usize).sum();
                        let values = stream.get_bytes(total)?;
                        tables[index] = Some(HuffmanTable::new(&counts, values)?);
                        remaining = remaining.saturating_sub(17 + total);
                    }
                }
                M_SOS => {
                    let (precision, width, height, ids) = frame
                        .ok_or_else(|| Error::Decoder("LJPEG: SOS before SOF3".to_string()))?;
                    stream.get_u16()?; // length
                    let n_scan = stream.get_u8()? as usize;
                    if n_scan != ids.len() {
                        return Err(Error::Decoder(
                            "LJPEG: scan component count mismatch".to_string(),
                        ));
                    }
                    let mut dc_table = [0_usize; 4];
                    for i in 0..n_scan {
                        stream.get_u8()?; // component selector
                        dc_table[i] = (stream.get_u8()? >> 4) as usize;
                        if dc_table[i] >= 4 || tables[dc_table[i]].is_none() {
                            return Err(Error::Decoder(
                                "LJPEG: scan references an undefined table".to_string(),
                            ));
                        }
                    }
                    let predictor = u32::from(stream.get_u8()?); // Ss
                    if !(1..=7).contains(&predictor) {
                        return Err(Error::Decoder(format!(
                            "LJPEG: unsupported predictor {predictor}"
                        )));
                    }
                    stream.get_u8()?; // Se, unused
                    let point_transform = u32::from(stream.get_u8()? & 0x0f); // Al
                    let scan = stream.tail_stream();
                    return Ok(LJpegDecompressor {
                        scan,
                        tables,
                        dc_table,
                        precision,
                        frame_width: width,
                        frame_height: height,
                        components: n_scan,
                        predictor,
                        point_transform,
                    });
                }
                M_EOI => {
                    return Err(Error::Decoder("LJPEG: EOI before SOS".to_string()));
                }
                M_DQT => {
                    return Err(Error::Decoder("LJPEG: DQT in a lossless stream".to_string()));
                }
                _ => {
                    // APPn, COM and anything else: skip by length
                    let len = stream.get_u16()? as usize;
                    stream.skip(len.saturating_sub(2))?;
                }
            }
        }
    }

    fn predict(
        psv: u32,
        left: i32,
        above: i32,
        above_left: i32,
        row: usize,
        col: usize,
        default: i32,
    ) -> i32 {
        if row == 0 && col == 0 {
            return default;
        }
        if row == 0 {
            return left;
        }
        if col == 0 {
            return above;
        }
        match psv {
            1 => left,
            2 => above,
            3 => above_left,
            4 => left + above - above_left,
            5 => left + ((above - above_left) >> 1),
            6 => above + ((left - above_left) >> 1),
            7 => (left + above) >> 1,
            _ => unreachable!("validated in new()"),
        }
    }

    /// Run the scan, writing `size` pixels at `offset` into a u16
    /// image. The frame may be wider than the wanted area (edge
    /// tiles); the surplus samples are decoded and dropped.
    pub fn decompress(&self, image: &mut RawImage, offset: Point, size: Point) -> Result<()> {
        debug_assert!(image.data_type() == RawImageType::U16);
        let cpp = image.cpp();
        let dim = image.uncropped_dim();
        let pitch = image.pitch_u16();
        self.decompress_into(image.u16_data_mut(), pitch, cpp, dim, offset, size)
    }

    /// As [`LJpegDecompressor::decompress`] but over a raw raster,
    /// for callers running one scan per tile in parallel.
    pub fn decompress_into(
        &self,
        data: &mut [u16],
        pitch: usize,
        cpp: usize,
        dim: Point,
        offset: Point,
        size: Point,
    ) -> Result<()> {
        let out_samples = size.x * cpp;
        let frame_samples = self.frame_width * self.components;
        if frame_samples < out_samples {
            return Err(Error::Decoder(format!(
                "LJPEG: frame too narrow: {} samples, need {}",
                frame_samples, out_samples
            )));
        }
        if self.frame_height < size.y {
            return Err(Error::Decoder(format!(
                "LJPEG: frame too short: {} rows, need {}",
                self.frame_height, size.y
            )));
        }
        if offset.x + size.x > dim.x || offset.y + size.y > dim.y {
            return Err(Error::Decoder("LJPEG: output outside the image".to_string()));
        }

        let mut pump = BitPumpJpeg::new(self.scan.full_buffer());
        let default = 1_i32 << (self.precision - self.point_transform - 1);

        let mut prev_row = vec![0_i32; frame_samples];
        let mut row_buf = vec![0_i32; frame_samples];
        for row in 0..size.y {
            for mcu in 0..self.frame_width {
                for c in 0..self.components {
                    let s = mcu * self.components + c;
                    let table = self.tables[self.dc_table[c]]
                        .as_ref()
                        .expect("validated in new()");
                    let diff = table.decode_difference(&mut pump)?;
                    let left = if mcu > 0 {
                        row_buf[s - self.components]
                    } else {
                        0
                    };
                    let above = prev_row[s];
                    let above_left = if mcu > 0 {
                        prev_row[s - self.components]
                    } else {
                        0
                    };
                    let pred = Self::predict(
                        self.predictor,
                        left,
                        above,
                        above_left,
                        row,
                        mcu,
                        default,
                    );
                    row_buf[s] = pred + diff;
                }
            }
            let out_row = &mut data[(offset.y + row) * pitch + offset.x * cpp..];
            for s in 0..out_samples {
                out_row[s] = (row_buf[s] << self.point_transform) as u16;
            }
            std::mem::swap(&mut prev_row, &mut row_buf);
        }
        Ok(())
    }
}

#[cfg(test)]
mod test {
    use super::LJpegDecompressor;
    use crate::bytestream::{ByteStream, Endian};
    use crate::rawimage::{Point, RawImage};

    /// Serialize a minimal one component SOF3 stream.
    fn build_ljpeg(width: u16, height: u16, precision: u8, scan_bits: &[u8]) -> Vec<u8> {
        let mut out = vec![0xff, 0xd8];
        // DHT: table 0, code lengths for values 0..=3 as in the
        // classic two bit prefix code
        out.extend_from_slice(&[0xff, 0xc4]);
        let counts: [u8; 16] = [0, 1, 1, 2, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0];
        let values = [0_u8, 1, 2, 3];
        out.extend_from_slice(&((2 + 1 + 16 + 4) as u16).to_be_bytes());
        out.push(0);
        out.extend_from_slice(&counts);
        out.extend_from_slice(&values);
        // SOF3
        out.extend_from_slice(&[0xff, 0xc3]);
        out.extend_from_slice(&(8 + 3_u16).to_be_bytes());
        out.push(precision);
        out.extend_from_slice(&height.to_be_bytes());
        out.extend_from_slice(&width.to_be_bytes());
        out.push(1); // one component
        out.extend_from_slice(&[0, 0x11, 0]);
        // SOS
        out.extend_from_slice(&[0xff, 0xda]);
        out.extend_from_slice(&(6 + 2_u16).to_be_bytes());
        out.push(1);
        out.extend_from_slice(&[0, 0x00]);
        out.extend_from_slice(&[1, 0, 0]); // predictor 1, Se, Al
        out.extend_from_slice(scan_bits);
        out
    }

    #[test]
    fn test_parse_headers() {
        let data = build_ljpeg(4, 2, 12, &[0; 8]);
        let d = LJpegDecompressor::new(ByteStream::new(&data, Endian::Big)).unwrap();
        assert_eq!(d.frame_width, 4);
        assert_eq!(d.frame_height, 2);
        assert_eq!(d.precision, 12);
        assert_eq!(d.components, 1);
    }

    #[test]
    fn test_decode_flat() {
        // All differences are the 1 bit code "0" for value 0: every
        // pixel equals the initial predictor 1 << 11 = 2048.
        let data = build_ljpeg(4, 2, 12, &[0x00, 0x00]);
        let d = LJpegDecompressor::new(ByteStream::new(&data, Endian::Big)).unwrap();
        let mut img = RawImage::new_u16(Point::new(4, 2), 1);
        img.create_data();
        d.decompress(&mut img, Point::default(), Point::new(4, 2))
            .unwrap();
        for y in 0..2 {
            for x in 0..4 {
                assert_eq!(img.u16_at(x, y, 0), 2048);
            }
        }
    }

    #[test]
    fn test_missing_sof_fails() {
        let data = [0xff_u8, 0xd8, 0xff, 0xd9];
        assert!(LJpegDecompressor::new(ByteStream::new(&data, Endian::Big)).is_err());
    }
}
