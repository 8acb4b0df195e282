// SPDX-License-Identifier: LGPL-3.0-or-later
/*
 * rawspeed - decoders/nef.rs
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

//! Nikon NEF and NRW.
//!
//! Next to the quantized Huffman scheme there is a zoo of
//! uncompressed layouts, several of them mislabeled by the firmware,
//! told apart by heuristics on the strip sizes. The sNEF path stores
//! white balanced YCbCr that is converted back to pre white balance
//! values through an inverse sRGB-like gamma.

use crate::bitstream::BitOrder;
use crate::bytestream::{ByteStream, Endian};
use crate::buffer::Buffer;
use crate::cfa::ColorFilterArray;
use crate::decompressors::nikon::NikonDecompressor;
use crate::decompressors::uncompressed::UncompressedDecompressor;
use crate::bitstream::BitPumpMsb;
use crate::metadata::CameraMetaData;
use crate::rawimage::{Point, RawImage};
use crate::tiff::{tags, Ifd, RootIfd, TagType};
use crate::utils::clamp_bits;
use crate::{Error, Result};

use super::RawDecoder;

const NIKON_META_NEW: u16 = 0x0096;
const NIKON_META_OLD: u16 = 0x008c;
const NIKON_WB_LEVELS: u16 = 0x000c;

pub(crate) struct NefDecoder<'a> {
    buffer: &'a Buffer,
    root: RootIfd<'a>,
}

impl<'a> NefDecoder<'a> {
    pub fn new(buffer: &'a Buffer, root: RootIfd<'a>) -> Result<NefDecoder<'a>> {
        Ok(NefDecoder { buffer, root })
    }

    /// The D100 tags even uncompressed files as compressed; real
    /// compressed data has non zero bytes at the block tails.
    fn d100_is_compressed(&self, offset: usize) -> Result<bool> {
        let test = self.buffer.get_data(offset, 256)?;
        for i in (15..256).step_by(16) {
            if test[i] != 0 {
                return Ok(true);
            }
        }
        Ok(false)
    }

    /// Firmware of at least the D810 mislabels uncompressed files;
    /// detect them by the strip size matching the packed pixel
    /// count, modulo a little row padding.
    fn nef_is_uncompressed(raw: &Ifd) -> Result<bool> {
        let counts = raw.required_entry(tags::STRIP_BYTE_COUNTS)?;
        let width = raw.required_entry(tags::IMAGE_WIDTH)?.get_u32(0)? as u64;
        let height = raw.required_entry(tags::IMAGE_LENGTH)?.get_u32(0)? as u64;
        let bpp = raw.required_entry(tags::BITS_PER_SAMPLE)?.get_u32(0)? as u64;
        if width == 0 || height == 0 || bpp == 0 {
            return Ok(false);
        }
        let available_bytes = u64::from(counts.get_u32(0)?);
        let required_pixels = width * height;
        let available_pixels = available_bytes * 8 / bpp;
        if available_pixels < required_pixels {
            return Ok(false);
        }
        if available_pixels == required_pixels {
            return Ok(true);
        }
        let required_bytes = (bpp * required_pixels).div_euclid(8)
            + u64::from((bpp * required_pixels) % 8 != 0);
        let total_padding = available_bytes - required_bytes;
        if total_padding % height != 0 {
            return Ok(false);
        }
        Ok(total_padding / height < 16)
    }

    fn nef_is_uncompressed_rgb(raw: &Ifd) -> Result<bool> {
        let count = u64::from(raw.required_entry(tags::STRIP_BYTE_COUNTS)?.get_u32(0)?);
        let width = raw.required_entry(tags::IMAGE_WIDTH)?.get_u32(0)? as u64;
        let height = raw.required_entry(tags::IMAGE_LENGTH)?.get_u32(0)? as u64;
        Ok(count % 3 == 0 && count / 3 == width * height)
    }

    fn decode_uncompressed(&self, meta: &CameraMetaData) -> Result<RawImage> {
        let raw = super::get_ifd_with_largest_image(&self.root, tags::CFA_PATTERN)?;
        let (width, height) = super::get_checked_dim(raw, 8288, 5520)?;
        let offsets = raw.required_entry(tags::STRIP_OFFSETS)?;
        let counts = raw.required_entry(tags::STRIP_BYTE_COUNTS)?;
        if counts.count != offsets.count {
            return Err(Error::Decoder(format!(
                "NEF: byte count number does not match strip size: count {}, strips {}",
                counts.count, offsets.count
            )));
        }
        let y_per_slice = raw.required_entry(tags::ROWS_PER_STRIP)?.get_u32(0)? as usize;
        if y_per_slice == 0
            || y_per_slice > height
            || height.div_euclid(y_per_slice) + usize::from(height % y_per_slice != 0)
                != offsets.count as usize
        {
            return Err(Error::Decoder(format!(
                "NEF: invalid y per slice {y_per_slice} or strip count {}",
                offsets.count
            )));
        }

        let mut bit_per_pixel = raw.required_entry(tags::BITS_PER_SAMPLE)?.get_u32(0)?;
        let first_count = counts.get_u32(0)? as usize;
        let first_h = y_per_slice.min(height);
        if bit_per_pixel == 14 && width * first_h * 2 == first_count {
            // D3 and D810 store 14 bits in 16 bit words
            bit_per_pixel = 16;
        }
        let hints = self
            .root
            .get_id()
            .ok()
            .and_then(|id| meta.get_camera_any_mode(&id.make, &id.model))
            .map(|camera| camera.hints.clone())
            .unwrap_or_default();
        let bit_per_pixel = hints.get("real_bpp", bit_per_pixel);
        if !matches!(bit_per_pixel, 12 | 14 | 16) {
            return Err(Error::Decoder(format!("NEF: invalid bpp found: {bit_per_pixel}")));
        }

        let mut image = RawImage::new_u16(Point::new(width, height), 1);
        image.create_data();

        let bitorder = if hints.has("msb_override") {
            BitOrder::Lsb
        } else {
            BitOrder::Msb
        };

        let mut off_y = 0_usize;
        for s in 0..offsets.count {
            let offset = offsets.get_u32(s)? as usize;
            let count = counts.get_u32(s)? as usize;
            if count < 1 {
                return Err(Error::Decoder(format!("NEF: slice {s} is empty")));
            }
            let slice_h = y_per_slice.min(height - off_y);
            let input = ByteStream::new(self.buffer.get_data(offset, count)?, Endian::Little);

            if hints.has("coolpixmangled") {
                let mut d = UncompressedDecompressor::new(input);
                d.read_uncompressed_raw(
                    &mut image,
                    Point::new(width, slice_h),
                    Point::new(0, off_y),
                    width * bit_per_pixel as usize / 8,
                    12,
                    BitOrder::Msb32,
                )?;
            } else if hints.has("coolpixsplit") {
                Self::read_coolpix_split(&mut image, input, width, slice_h, off_y)?;
            } else {
                if count % slice_h != 0 {
                    return Err(Error::Decoder("NEF: inconsistent row size".to_string()));
                }
                let input_pitch = count / slice_h;
                let mut d = UncompressedDecompressor::new(input);
                d.read_uncompressed_raw(
                    &mut image,
                    Point::new(width, slice_h),
                    Point::new(0, off_y),
                    input_pitch,
                    bit_per_pixel,
                    bitorder,
                )?;
            }
            off_y += slice_h;
        }
        Ok(image)
    }

    /// Coolpix split rows: all even rows packed first, then all odd
    /// rows.
    fn read_coolpix_split(
        image: &mut RawImage,
        input: ByteStream,
        width: usize,
        height: usize,
        off_y: usize,
    ) -> Result<()> {
        if height % 2 != 0 {
            return Err(Error::Decoder("NEF: odd number of rows".to_string()));
        }
        if width % 8 != 0 {
            return Err(Error::Decoder("NEF: column count is not a multiple of 8".to_string()));
        }
        let input_pitch = 3 * width / 2;
        let field_bytes = height / 2 * input_pitch;
        let even_bytes = input.sub_stream(0, field_bytes)?;
        let odd_bytes = input.sub_stream(field_bytes, field_bytes)?;
        let mut even = BitPumpMsb::new(even_bytes.full_buffer());
        let mut odd = BitPumpMsb::new(odd_bytes.full_buffer());

        let pitch = image.pitch_u16();
        let data = image.u16_data_mut();
        for row in (0..height).step_by(2) {
            for col in 0..width {
                data[(off_y + row) * pitch + col] = even.get_bits(12)? as u16;
            }
            for col in 0..width {
                data[(off_y + row + 1) * pitch + col] = odd.get_bits(12)? as u16;
            }
        }
        Ok(())
    }

    fn decode_snef(&self) -> Result<RawImage> {
        let raw = super::get_ifd_with_largest_image(&self.root, tags::CFA_PATTERN)?;
        let (width, height) = super::get_checked_dim(raw, 3680, 2456)?;
        if width % 2 != 0 || width < 6 {
            return Err(Error::Decoder(format!("NEF: got a {width} wide sNEF, aborting")));
        }
        let offset = raw.required_entry(tags::STRIP_OFFSETS)?.get_u32(0)? as usize;

        let mut image = RawImage::new_u16(Point::new(width, height), 3);
        image.is_cfa = false;
        image.create_data();

        // the applied white balance must be undone to return pre
        // white balance values
        let wb = self
            .root
            .get_entry_recursive(NIKON_WB_LEVELS)
            .filter(|e| e.count == 4 && e.tag_type == TagType::Rational)
            .ok_or_else(|| {
                Error::Decoder("NEF: unable to locate whitebalance needed for decompression".to_string())
            })?;
        let wb_r = wb.get_float(0)?;
        let wb_b = wb.get_float(1)?;
        let lower_limit = 13_421_568.0 / 429_496_627.0;
        if wb_r < lower_limit || wb_b < lower_limit || wb_r > 10.0 || wb_b > 10.0 {
            return Err(Error::Decoder(format!(
                "NEF: whitebalance has bad values ({wb_r}, {wb_b})"
            )));
        }
        image.metadata.wb_coeffs = [wb_r, 1.0, wb_b, f32::NAN];
        let inv_wb_r = (1024.0 / f64::from(wb_r)) as i64;
        let inv_wb_b = (1024.0 / f64::from(wb_b)) as i64;

        let mut curve = gamma_curve(1.0 / 2.4, 12.92, 1, 4095)?;
        // scale to 16 bits
        for c in curve.iter_mut().take(4096) {
            *c = clamp_bits(i64::from(*c) << 2, 16);
        }
        curve.truncate(4095);
        image.set_table(Some((&curve, true)));
        let table = image.table();

        let len = width * height * 3;
        let input = self.buffer.get_data(offset, len)?;
        let pitch = image.pitch_u16();
        let data = image.u16_data_mut();

        let mut tmp = 0_u16;
        for row in 0..height {
            let in_row = &input[row * width * 3..];
            let mut random = u32::from(in_row[0])
                | (u32::from(in_row[1]) << 8)
                | (u32::from(in_row[2]) << 16);
            let out = &mut data[row * pitch..];
            let mut i = 0_usize;
            for col in (0..width * 3).step_by(6) {
                let g1 = f32::from(in_row[i]);
                let g2 = u32::from(in_row[i + 1]);
                let g3 = f32::from(in_row[i + 2]);
                let g4 = f32::from(in_row[i + 3]);
                let g5 = u32::from(in_row[i + 4]);
                let g6 = f32::from(in_row[i + 5]);
                i += 6;

                let y1 = g1 + ((g2 & 0x0f) << 8) as f32;
                let y2 = (g2 >> 4) as f32 + g3 * 16.0;
                let mut cb = g4 + ((g5 & 0x0f) << 8) as f32;
                let mut cr = (g5 >> 4) as f32 + g6 * 16.0;

                let mut cb2 = cb;
                let mut cr2 = cr;
                // interpolate the right pixel against the next pair
                if i + 5 < in_row.len().min(width * 3) {
                    let h4 = f32::from(in_row[i + 3]);
                    let h5 = u32::from(in_row[i + 4]);
                    let h6 = f32::from(in_row[i + 5]);
                    cb2 = (h4 + ((h5 & 0x0f) << 8) as f32 + cb) * 0.5;
                    cr2 = ((h5 >> 4) as f32 + h6 * 16.0 + cr) * 0.5;
                }

                cb -= 2048.0;
                cr -= 2048.0;
                cb2 -= 2048.0;
                cr2 -= 2048.0;

                let table = table.as_deref().expect("curve installed above");
                let mut lookup = |value: f32, dst: &mut u16| {
                    *dst = table.apply(clamp_bits(value as i64, 12), &mut random);
                };

                lookup(y1 + 1.370705 * cr, &mut tmp);
                out[col] = clamp_bits((inv_wb_r * i64::from(tmp) + (1 << 9)) >> 10, 15);
                lookup(y1 - 0.337633 * cb - 0.698001 * cr, &mut out[col + 1]);
                lookup(y1 + 1.732446 * cb, &mut tmp);
                out[col + 2] = clamp_bits((inv_wb_b * i64::from(tmp) + (1 << 9)) >> 10, 15);

                lookup(y2 + 1.370705 * cr2, &mut tmp);
                out[col + 3] = clamp_bits((inv_wb_r * i64::from(tmp) + (1 << 9)) >> 10, 15);
                lookup(y2 - 0.337633 * cb2 - 0.698001 * cr2, &mut out[col + 4]);
                lookup(y2 + 1.732446 * cb2, &mut tmp);
                out[col + 5] = clamp_bits((inv_wb_b * i64::from(tmp) + (1 << 9)) >> 10, 15);
            }
        }
        image.set_table(None);
        Ok(image)
    }
}

impl<'a> RawDecoder<'a> for NefDecoder<'a> {
    fn check_support(&self, meta: &CameraMetaData) -> Result<()> {
        let id = self.root.get_id()?;
        super::check_camera_supported(meta, &id.make, &id.model, "", self.decoder_version())
    }

    fn decode_raw(&self, meta: &CameraMetaData) -> Result<RawImage> {
        let raw = self
            .root
            .get_ifd_with_tag(tags::CFA_PATTERN, 0)
            .ok_or(crate::TiffError::MissingTag(tags::CFA_PATTERN))?;
        let compression = raw.required_entry(tags::COMPRESSION)?.get_u32(0)?;
        let offsets = raw.required_entry(tags::STRIP_OFFSETS)?;
        let counts = raw.required_entry(tags::STRIP_BYTE_COUNTS)?;

        let model = self
            .root
            .get_entry_recursive(tags::MODEL)
            .and_then(|e| e.get_string().ok())
            .unwrap_or_default();
        if model == "NIKON D100 " && !self.d100_is_compressed(offsets.get_u32(0)? as usize)? {
            // hardcoded dimensions, the width tag lies
            let (width, height) = (3040, 2024);
            let mut image = RawImage::new_u16(Point::new(width, height), 1);
            image.create_data();
            let offset = offsets.get_u32(0)? as usize;
            let len = self.buffer.size() - offset.min(self.buffer.size());
            let input = ByteStream::new(self.buffer.get_data(offset, len)?, Endian::Little);
            let mut d = UncompressedDecompressor::new(input);
            d.decode_12bit_raw(&mut image, width, height, true, false, true)?;
            return Ok(image);
        }

        if compression == 1 || Self::nef_is_uncompressed(raw)? {
            return self.decode_uncompressed(meta);
        }
        if Self::nef_is_uncompressed_rgb(raw)? {
            return self.decode_snef();
        }

        if offsets.count != 1 || counts.count != 1 {
            return Err(Error::Decoder(format!(
                "NEF: multiple strips found: {}",
                offsets.count
            )));
        }
        if compression != 34713 {
            return Err(Error::Decoder(format!("NEF: unsupported compression {compression}")));
        }

        let (width, height) = super::get_checked_dim(raw, 8288, 5520)?;
        let bit_per_pixel = raw.required_entry(tags::BITS_PER_SAMPLE)?.get_u32(0)?;

        // the quantized meta blob lives in the maker note
        let meta_ifd = self
            .root
            .get_ifd_with_tag(NIKON_META_OLD, 0)
            .ok_or(crate::TiffError::MissingTag(NIKON_META_OLD))?;
        let meta_entry = meta_ifd
            .entry(NIKON_META_NEW)
            .or_else(|| meta_ifd.entry(NIKON_META_OLD))
            .ok_or(crate::TiffError::MissingTag(NIKON_META_NEW))?;

        let mut image = RawImage::new_u16(Point::new(width, height), 1);
        let decompressor =
            NikonDecompressor::new(&image, meta_entry.data(), bit_per_pixel)?;
        image.create_data();
        image.white_point = u32::from(decompressor.white_point());

        let offset = offsets.get_u32(0)? as usize;
        let count = counts.get_u32(0)? as usize;
        let input = ByteStream::new(self.buffer.get_data(offset, count)?, Endian::Little);
        decompressor.decompress(&mut image, input, false)?;
        Ok(image)
    }

    fn decode_metadata(&self, image: &mut RawImage, meta: &CameraMetaData) -> Result<()> {
        let id = self.root.get_id()?;
        image.cfa = ColorFilterArray::rggb();
        let mode = if image.cpp() == 3 { "sNEF" } else { "" };
        super::set_meta_data(image, meta, &id.make, &id.model, mode, super::get_iso(&self.root))
    }
}

/// The gamma curve builder from the reference decoder, used to
/// linearize sNEF data (mode 1, an sRGB like curve).
fn gamma_curve(pwr: f64, ts: f64, mode: i32, imax: i32) -> Result<Vec<u16>> {
    let mut curve = vec![0_u16; 65536];
    let mut g = [pwr, ts, 0.0, 0.0, 0.0, 0.0];
    let mut bnd = [0.0_f64; 2];
    bnd[usize::from(g[1] >= 1.0)] = 1.0;
    if g[1] != 0.0 && (g[1] - 1.0) * (g[0] - 1.0) <= 0.0 {
        for _ in 0..48 {
            g[2] = (bnd[0] + bnd[1]) / 2.0;
            if g[0] != 0.0 {
                let idx = usize::from(
                    ((g[2] / g[1]).powf(-g[0]) - 1.0) / g[0] - 1.0 / g[2] > -1.0,
                );
                bnd[idx] = g[2];
            } else {
                let idx = usize::from(g[2] / (1.0 - 1.0 / g[2]).exp() < g[1]);
                bnd[idx] = g[2];
            }
        }
        g[3] = g[2] / g[1];
        if g[0] != 0.0 {
            g[4] = g[2] * (1.0 / g[0] - 1.0);
        }
    }
    if g[0] != 0.0 {
        g[5] = 1.0
            / (g[1] * g[3] * g[3] / 2.0 - g[4] * (1.0 - g[3])
                + (1.0 - g[3].powf(1.0 + g[0])) * (1.0 + g[4]) / (1.0 + g[0]))
            - 1.0;
    } else {
        g[5] = 1.0 / (g[1] * g[3] * g[3] / 2.0 + 1.0 - g[2] - g[3] - g[2] * g[3] * (g[3].ln() - 1.0))
            - 1.0;
    }

    if mode == 0 {
        return Err(Error::Decoder("NEF: unimplemented gamma mode".to_string()));
    }
    let mode = mode - 1;

    for (i, c) in curve.iter_mut().enumerate() {
        *c = 0xffff;
        let r = i as f64 / f64::from(imax);
        if r < 1.0 {
            let v = if mode != 0 {
                if r < g[3] {
                    r * g[1]
                } else if g[0] != 0.0 {
                    r.powf(g[0]) * (1.0 + g[4]) - g[4]
                } else {
                    r.ln() * g[2] + 1.0
                }
            } else if r < g[2] {
                r / g[1]
            } else if g[0] != 0.0 {
                ((r + g[4]) / (1.0 + g[4])).powf(1.0 / g[0])
            } else {
                ((r - 1.0) / g[2]).exp()
            };
            *c = (65536.0 * v).min(65535.0) as u16;
        }
    }
    Ok(curve)
}

#[cfg(test)]
mod test {
    use super::gamma_curve;

    #[test]
    fn test_gamma_curve_monotonic() {
        let curve = gamma_curve(1.0 / 2.4, 12.92, 1, 4095).unwrap();
        assert_eq!(curve.len(), 65536);
        for i in 1..4095 {
            assert!(curve[i] >= curve[i - 1], "not monotonic at {i}");
        }
        // values past imax saturate
        assert_eq!(curve[4095], 0xffff);
        assert_eq!(curve[65535], 0xffff);
    }
}
