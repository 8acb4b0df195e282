// SPDX-License-Identifier: LGPL-3.0-or-later
/*
 * rawspeed - decoders/dng.rs
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

//! Adobe DNG (and DNG based formats like GPR).
//!
//! The raw sub image is the IFD with a CFA or LinearRaw photometric
//! interpretation whose NewSubFileType does not mark it subsampled
//! or alpha. Tiles or strips then dispatch to the per compression
//! decompressors, and the opcode lists run over the result.

use crate::buffer::Buffer;
use crate::bytestream::{ByteStream, Endian};
use crate::cfa::{CfaColor, ColorFilterArray};
use crate::decompressors::dng::{AbstractDngDecompressor, DngTilingDescription};
use crate::metadata::CameraMetaData;
use crate::opcodes::DngOpcodes;
use crate::rawimage::{Point, RawImage, Rect};
use crate::tiff::{tags, Ifd, RootIfd};
use crate::{Error, Result};

use super::RawDecoder;

const PHOTOMETRIC_CFA: u32 = 32803;
const PHOTOMETRIC_LINEAR_RAW: u32 = 34892;
const PREDICTOR: u16 = 0x013d;

pub(crate) fn is_appropriate(root: &RootIfd) -> bool {
    // a DNG of any vendor: the DNGVersion tag with major version 1
    root.get_entry_recursive(tags::DNG_VERSION)
        .and_then(|e| e.get_byte(0).ok())
        .map(|major| major == 1)
        .unwrap_or(false)
}

pub(crate) struct DngDecoder<'a> {
    buffer: &'a Buffer,
    root: RootIfd<'a>,
}

impl<'a> DngDecoder<'a> {
    pub fn new(buffer: &'a Buffer, root: RootIfd<'a>) -> Result<DngDecoder<'a>> {
        Ok(DngDecoder { buffer, root })
    }

    /// The main raw sub image: CFA or LinearRaw, and not a reduced
    /// resolution, subsampled or alpha plane.
    fn find_raw_ifd(&self) -> Result<&Ifd<'a>> {
        for ifd in self.root.get_ifds_with_tag(tags::PHOTOMETRIC_INTERPRETATION) {
            let photometric = ifd
                .required_entry(tags::PHOTOMETRIC_INTERPRETATION)?
                .get_u32(0)?;
            if photometric != PHOTOMETRIC_CFA && photometric != PHOTOMETRIC_LINEAR_RAW {
                continue;
            }
            let subfile = ifd
                .entry(tags::NEW_SUBFILE_TYPE)
                .map(|e| e.get_u32(0))
                .transpose()?
                .unwrap_or(0);
            // bit 0: reduced resolution, bit 2: transparency mask
            if subfile & 0b101 != 0 {
                continue;
            }
            return Ok(ifd);
        }
        Err(Error::Decoder("DNG: no image data found".to_string()))
    }

    fn parse_cfa(&self, raw: &Ifd, image: &mut RawImage) -> Result<()> {
        let dims = raw.required_entry(tags::CFA_REPEAT_PATTERN_DIM)?;
        let w = dims.get_u16(0)? as usize;
        let h = dims.get_u16(1)? as usize;
        if w == 0 || h == 0 || w > 6 || h > 6 {
            return Err(Error::Decoder(format!("DNG: bad CFA pattern size {w}x{h}")));
        }
        let pattern = raw.required_entry(tags::CFA_PATTERN)?;
        if pattern.count as usize != w * h {
            return Err(Error::Decoder(
                "DNG: CFA pattern does not match its repeat dimensions".to_string(),
            ));
        }
        let mut colors = Vec::with_capacity(w * h);
        for i in 0..w * h {
            let c = pattern.get_byte(i as u32)?;
            colors.push(
                CfaColor::try_from(c)
                    .map_err(|_| Error::Decoder(format!("DNG: unknown CFA colour {c}")))?,
            );
        }
        image.cfa = ColorFilterArray::new(w, h, colors);
        Ok(())
    }

    fn apply_opcodes(&self, raw: &Ifd<'a>, tag: u16, image: &mut RawImage) -> Result<()> {
        if let Some(entry) = raw.entry(tag) {
            let opcodes = DngOpcodes::parse(image, entry.data())?;
            opcodes.apply(image)?;
        }
        Ok(())
    }

    fn parse_black_levels(&self, raw: &Ifd, image: &mut RawImage) -> Result<()> {
        let repeat = raw
            .entry(tags::BLACK_LEVEL_REPEAT_DIM)
            .map(|e| -> Result<(u32, u32)> { Ok((e.get_u32(0)?, e.get_u32(1)?)) })
            .transpose()?
            .unwrap_or((1, 1));
        if let Some(black) = raw.entry(tags::BLACK_LEVEL) {
            if repeat == (2, 2) && black.count >= 4 {
                for i in 0..4 {
                    image.black_level_separate[i] = black.get_float(i as u32)? as i32;
                }
            } else {
                image.black_level = black.get_float(0)? as i32;
            }
        }
        if let Some(white) = raw.entry(tags::WHITE_LEVEL) {
            image.white_point = white.get_u32(0)?;
        }
        Ok(())
    }
}

impl<'a> RawDecoder<'a> for DngDecoder<'a> {
    fn check_support(&self, meta: &CameraMetaData) -> Result<()> {
        // DNGs decode even without a database entry; an entry can
        // still mark a camera as broken
        let id = self.root.get_id()?;
        if let Some(camera) = meta.get_camera_any_mode(&id.make, &id.model) {
            if !camera.supported {
                return Err(Error::UnsupportedCamera(format!(
                    "{} {} is marked unsupported",
                    id.make, id.model
                )));
            }
        }
        Ok(())
    }

    fn decode_raw(&self, _meta: &CameraMetaData) -> Result<RawImage> {
        let raw = self.find_raw_ifd()?;
        let photometric = raw
            .required_entry(tags::PHOTOMETRIC_INTERPRETATION)?
            .get_u32(0)?;
        let compression = raw
            .entry(tags::COMPRESSION)
            .map(|e| e.get_u32(0))
            .transpose()?
            .unwrap_or(1);
        let sample_format = raw
            .entry(tags::SAMPLE_FORMAT)
            .map(|e| e.get_u32(0))
            .transpose()?
            .unwrap_or(1);
        let bps = raw.required_entry(tags::BITS_PER_SAMPLE)?.get_u32(0)?;
        let cpp = raw
            .entry(tags::SAMPLES_PER_PIXEL)
            .map(|e| e.get_u32(0))
            .transpose()?
            .unwrap_or(1) as usize;
        if !(1..=4).contains(&cpp) {
            return Err(Error::Decoder(format!("DNG: unsupported sample count {cpp}")));
        }
        let (width, height) = super::get_checked_dim(raw, super::MAX_DIM, super::MAX_DIM)?;

        let mut image = match sample_format {
            1 => {
                if bps == 0 || bps > 32 {
                    return Err(Error::Decoder(format!("DNG: invalid bits per sample {bps}")));
                }
                RawImage::new_u16(Point::new(width, height), cpp)
            }
            3 => RawImage::new_f32(Point::new(width, height), cpp),
            f => {
                return Err(Error::Decoder(format!("DNG: unsupported sample format {f}")));
            }
        };
        image.is_cfa = photometric == PHOTOMETRIC_CFA;
        if image.is_cfa {
            self.parse_cfa(raw, &mut image)?;
        }
        // VC-5 needs this before decode for its inverse log table
        self.parse_black_levels(raw, &mut image)?;
        image.create_data();

        // tiles, or strips as full width tiles
        let (dsc, streams) = if raw.has_entry(tags::TILE_OFFSETS) {
            let tile_w = raw.required_entry(tags::TILE_WIDTH)?.get_u32(0)? as usize;
            let tile_h = raw.required_entry(tags::TILE_LENGTH)?.get_u32(0)? as usize;
            let offsets = raw.required_entry(tags::TILE_OFFSETS)?;
            let counts = raw.required_entry(tags::TILE_BYTE_COUNTS)?;
            if counts.count != offsets.count {
                return Err(Error::Decoder(
                    "DNG: tile byte counts do not match tile offsets".to_string(),
                ));
            }
            let dsc = DngTilingDescription::new(Point::new(width, height), tile_w, tile_h)?;
            if dsc.num_tiles != offsets.count as usize {
                return Err(Error::Decoder(format!(
                    "DNG: expected {} tiles, got {}",
                    dsc.num_tiles, offsets.count
                )));
            }
            let mut streams = Vec::with_capacity(dsc.num_tiles);
            for i in 0..offsets.count {
                let off = offsets.get_u32(i)? as usize;
                let count = counts.get_u32(i)? as usize;
                streams.push(ByteStream::new(
                    self.buffer.get_data(off, count)?,
                    self.root.endian(),
                ));
            }
            (dsc, streams)
        } else {
            let offsets = raw.required_entry(tags::STRIP_OFFSETS)?;
            let counts = raw.required_entry(tags::STRIP_BYTE_COUNTS)?;
            if counts.count != offsets.count {
                return Err(Error::Decoder(
                    "DNG: strip byte counts do not match strip offsets".to_string(),
                ));
            }
            let rows_per_strip = raw
                .entry(tags::ROWS_PER_STRIP)
                .map(|e| e.get_u32(0))
                .transpose()?
                .unwrap_or(height as u32) as usize;
            if rows_per_strip == 0 {
                return Err(Error::Decoder("DNG: zero rows per strip".to_string()));
            }
            let dsc = DngTilingDescription::new(Point::new(width, height), width, rows_per_strip)?;
            if dsc.num_tiles != offsets.count as usize {
                return Err(Error::Decoder(format!(
                    "DNG: expected {} strips, got {}",
                    dsc.num_tiles, offsets.count
                )));
            }
            let mut streams = Vec::with_capacity(dsc.num_tiles);
            for i in 0..offsets.count {
                let off = offsets.get_u32(i)? as usize;
                let count = counts.get_u32(i)? as usize;
                streams.push(ByteStream::new(
                    self.buffer.get_data(off, count)?,
                    self.root.endian(),
                ));
            }
            (dsc, streams)
        };

        let predictor = raw
            .entry(PREDICTOR)
            .map(|e| e.get_u32(0))
            .transpose()?
            .unwrap_or(1);
        let decompressor =
            AbstractDngDecompressor::new(dsc, streams, compression, bps, predictor)?;
        decompressor.decompress(&mut image)?;

        // stage one opcodes run on the raw data
        self.apply_opcodes(raw, tags::OPCODE_LIST1, &mut image)?;

        // the sensor active area, then the recommended crop
        if let Some(active) = raw.entry(tags::ACTIVE_AREA) {
            let top = active.get_u32(0)? as usize;
            let left = active.get_u32(1)? as usize;
            let bottom = active.get_u32(2)? as usize;
            let right = active.get_u32(3)? as usize;
            if right > width || bottom > height || left > right || top > bottom {
                return Err(Error::Decoder("DNG: invalid active area".to_string()));
            }
            image.sub_frame(Rect::new(left, top, right - left, bottom - top));
        }
        if let (Some(origin), Some(size)) = (
            raw.entry(tags::DEFAULT_CROP_ORIGIN),
            raw.entry(tags::DEFAULT_CROP_SIZE),
        ) {
            let ox = origin.get_float(0)? as usize;
            let oy = origin.get_float(1)? as usize;
            let cw = size.get_float(0)? as usize;
            let ch = size.get_float(1)? as usize;
            let dim = image.dim();
            if ox + cw <= dim.x && oy + ch <= dim.y && cw > 0 && ch > 0 {
                image.sub_frame(Rect::new(ox, oy, cw, ch));
            }
        }

        self.parse_black_levels(raw, &mut image)?;
        self.apply_opcodes(raw, tags::OPCODE_LIST2, &mut image)?;
        Ok(image)
    }

    fn decode_metadata(&self, image: &mut RawImage, meta: &CameraMetaData) -> Result<()> {
        let id = self.root.get_id()?;
        let iso = super::get_iso(&self.root);
        image.metadata.make = id.make.clone();
        image.metadata.model = id.model.clone();
        image.metadata.iso_speed = iso;

        if let Some(camera) = meta.get_camera_any_mode(&id.make, &id.model) {
            // a database entry can override the file's own levels
            super::apply_camera(image, camera, iso);
        } else if let Some(unique) = self
            .root
            .get_entry_recursive(tags::UNIQUE_CAMERA_MODEL)
            .and_then(|e| e.get_string().ok())
        {
            image.metadata.canonical_model = unique;
        }

        if let Some(neutral) = self.root.get_entry_recursive(tags::AS_SHOT_NEUTRAL) {
            if neutral.count == 3 {
                // as-shot neutral is the inverse of the multipliers
                let r = neutral.get_float(0)?;
                let g = neutral.get_float(1)?;
                let b = neutral.get_float(2)?;
                if r > 0.0 && g > 0.0 && b > 0.0 {
                    image.metadata.wb_coeffs = [g / r, 1.0, g / b, f32::NAN];
                }
            }
        }

        if let Some(matrix) = self.root.get_entry_recursive(tags::COLOR_MATRIX2) {
            let mut values = Vec::with_capacity(matrix.count as usize);
            for i in 0..matrix.count {
                values.push((matrix.get_float(i)? * 10000.0) as i32);
            }
            image.metadata.color_matrix = values;
        }

        // repair whatever the opcodes flagged
        image.transfer_bad_pixels_to_map();
        image.fix_bad_pixels();
        Ok(())
    }
}
