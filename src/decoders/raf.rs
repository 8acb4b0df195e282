// SPDX-License-Identifier: LGPL-3.0-or-later
/*
 * rawspeed - decoders/raf.rs
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

//! Fujifilm RAF.
//!
//! A wrapper around an embedded JPEG (whose Exif identifies the
//! camera), a binary meta directory with the sensor geometry, and
//! the CFA payload: either the compressed format or one of several
//! packed layouts. SuperCCD sensors are stored rotated 45 degrees
//! and get unrotated here.

use crate::bitstream::BitOrder;
use crate::buffer::Buffer;
use crate::bytestream::{ByteStream, Endian};
use crate::cfa::{CfaColor, ColorFilterArray};
use crate::decompressors::fuji::{FujiDecompressor, FujiHeader};
use crate::decompressors::uncompressed::UncompressedDecompressor;
use crate::metadata::{CameraMetaData, Hints};
use crate::rawimage::{Point, RawImage, Rect};
use crate::tiff;
use crate::utils::trim_spaces;
use crate::{Error, Result};

use super::RawDecoder;

/// Offsets into the RAF header.
const RAF_JPEG_OFFSET: usize = 0x54;
const RAF_META_OFFSET: usize = 0x5c;
const RAF_CFA_OFFSET: usize = 0x64;
const RAF_MODEL_STRING: usize = 0x1c;

pub(crate) struct RafDecoder<'a> {
    buffer: &'a Buffer,
    make: String,
    model: String,
    iso: i32,
    raw_width: usize,
    raw_height: usize,
    /// SuperCCD layout flag from the meta directory.
    alt_layout: bool,
    xtrans: Option<ColorFilterArray>,
    wb_grb: Option<[f32; 3]>,
    cfa_offset: usize,
    cfa_length: usize,
}

impl<'a> RafDecoder<'a> {
    pub fn new(buffer: &'a Buffer) -> Result<RafDecoder<'a>> {
        let data = buffer.as_ref();
        let mut header = ByteStream::new(data, Endian::Big);
        header.seek(RAF_JPEG_OFFSET)?;
        let jpeg_offset = header.get_u32()? as usize;
        header.seek(RAF_META_OFFSET)?;
        let meta_offset = header.get_u32()? as usize;
        let meta_length = header.get_u32()? as usize;
        header.seek(RAF_CFA_OFFSET)?;
        let cfa_offset = header.get_u32()? as usize;
        let cfa_length = header.get_u32()? as usize;
        buffer.get_data(cfa_offset, cfa_length)?;

        // identification: the Exif of the embedded JPEG, with the
        // model string of the RAF header as fallback
        let mut make = "FUJIFILM".to_string();
        let mut model = String::new();
        let mut iso = 0;
        if jpeg_offset + 12 < data.len() {
            if let Ok(root) = tiff::parse(&data[jpeg_offset + 12..]) {
                if let Ok(id) = root.get_id() {
                    make = id.make;
                    model = id.model;
                }
                iso = super::get_iso(&root);
            }
        }
        if model.is_empty() {
            let raw = buffer.get_data(RAF_MODEL_STRING, 32)?;
            model = trim_spaces(&String::from_utf8_lossy(raw));
        }

        // the binary meta directory
        let mut raw_width = 0;
        let mut raw_height = 0;
        let mut alt_layout = false;
        let mut xtrans = None;
        let mut wb_grb = None;
        let mut meta = ByteStream::new(buffer.get_data(meta_offset, meta_length)?, Endian::Big);
        let entries = meta.get_u32()?;
        if entries > 255 {
            return Err(Error::Parse("RAF: implausible meta directory".to_string()));
        }
        for _ in 0..entries {
            let tag = meta.get_u16()?;
            let len = meta.get_u16()? as usize;
            let next = meta.position() + len;
            match tag {
                0x0100 => {
                    raw_height = meta.get_u16()? as usize;
                    raw_width = meta.get_u16()? as usize;
                }
                0x0130 => {
                    alt_layout = (meta.get_u8()? >> 7) != 0;
                }
                0x0131 => {
                    // X-Trans pattern, bottom right to top left
                    let mut colors = vec![CfaColor::Unknown; 36];
                    for i in 0..36.min(len) {
                        let c = meta.get_u8()? & 3;
                        colors[35 - i] = match c {
                            0 => CfaColor::Red,
                            1 => CfaColor::Green,
                            _ => CfaColor::Blue,
                        };
                    }
                    xtrans = Some(ColorFilterArray::new(6, 6, colors));
                }
                0x2ff0 => {
                    // GRB white balance levels
                    let g = meta.get_u16()?;
                    let r = meta.get_u16()?;
                    let b = meta.get_u16()?;
                    wb_grb = Some([f32::from(r), f32::from(g), f32::from(b)]);
                }
                _ => {}
            }
            meta.seek(next)?;
        }

        if raw_width == 0 || raw_height == 0 || raw_width > 9216 || raw_height > 6210 {
            return Err(Error::Decoder(format!(
                "RAF: unexpected image dimensions found: ({raw_width}; {raw_height})"
            )));
        }

        Ok(RafDecoder {
            buffer,
            make,
            model,
            iso,
            raw_width,
            raw_height,
            alt_layout,
            xtrans,
            wb_grb,
            cfa_offset,
            cfa_length,
        })
    }

    fn input(&self) -> Result<ByteStream<'a>> {
        Ok(ByteStream::new(
            self.buffer.get_data(self.cfa_offset, self.cfa_length)?,
            Endian::Big,
        ))
    }

    fn is_compressed(&self) -> bool {
        let Ok(mut input) = self.input() else {
            return false;
        };
        FujiHeader::parse(&mut input)
            .map(|h| h.is_valid())
            .unwrap_or(false)
    }

    fn hints(&self, meta: &CameraMetaData) -> Hints {
        meta.get_camera_any_mode(&self.make, &self.model)
            .map(|camera| camera.hints.clone())
            .unwrap_or_default()
    }
}

impl<'a> RawDecoder<'a> for RafDecoder<'a> {
    fn check_support(&self, meta: &CameraMetaData) -> Result<()> {
        let mode = if self.is_compressed() { "compressed" } else { "" };
        super::check_camera_supported(meta, &self.make, &self.model, mode, self.decoder_version())
    }

    fn decode_raw(&self, meta: &CameraMetaData) -> Result<RawImage> {
        let input = self.input()?;
        if self.is_compressed() {
            let mut image = RawImage::new_u16(Point::new(self.raw_width, self.raw_height), 1);
            image.metadata.mode = "compressed".to_string();
            if let Some(xtrans) = &self.xtrans {
                image.cfa = xtrans.clone();
            } else if let Some(camera) =
                meta.get_camera(&self.make, &self.model, "compressed")
            {
                image.cfa = camera.cfa.clone();
            }
            if image.cfa.is_empty() {
                image.cfa = ColorFilterArray::rggb();
            }
            image.create_data();
            let d = FujiDecompressor::new(&image, input)?;
            d.decompress(&mut image)?;
            return Ok(image);
        }

        let hints = self.hints(meta);
        let count = self.cfa_length;
        let (width, height) = (self.raw_width, self.raw_height);
        // bit depth is not declared, infer it from the payload size
        let bps = if 8 * count >= 16 * width * height {
            16
        } else if 8 * count >= 14 * width * height {
            14
        } else if 8 * count >= 12 * width * height {
            12
        } else {
            return Err(Error::Decoder(format!(
                "RAF: can not detect bitdepth, byte count {count} for {width}x{height}"
            )));
        };
        let double_width = hints.has("double_width_unpacked");
        let real_width = if double_width { 2 * width } else { width };

        let mut image = RawImage::new_u16(Point::new(real_width, height), 1);
        image.create_data();

        let mut d = UncompressedDecompressor::new(input.clone());
        if double_width {
            d.decode_raw_unpacked(&mut image, 2 * width, height, 16, Endian::Little)?;
        } else if input.endian() == Endian::Big && Endian::host() == Endian::Little {
            d.decode_raw_unpacked(&mut image, width, height, 16, Endian::Big)?;
        } else if hints.has("jpeg32_bitorder") {
            d.read_uncompressed_raw(
                &mut image,
                Point::new(width, height),
                Point::default(),
                width * bps / 8,
                bps as u32,
                BitOrder::Msb32,
            )?;
        } else {
            d.read_uncompressed_raw(
                &mut image,
                Point::new(width, height),
                Point::default(),
                width * bps / 8,
                bps as u32,
                BitOrder::Lsb,
            )?;
        }
        Ok(image)
    }

    fn decode_metadata(&self, image: &mut RawImage, meta: &CameraMetaData) -> Result<()> {
        image.metadata.iso_speed = self.iso;
        let mode = image.metadata.mode.clone();
        let camera = meta
            .get_camera(&self.make, &self.model, &mode)
            .ok_or_else(|| {
                Error::UnsupportedCamera(format!("{} {}", self.make, self.model))
            })?;

        let hints = &camera.hints;
        let double_width = hints.has("double_width_unpacked");

        // resolve the crop, negative sizes count from the edge
        let dim = image.dim();
        let mut new_size = (camera.crop_size.0, camera.crop_size.1);
        let crop_offset = camera.crop_pos;
        if new_size.0 <= 0 {
            new_size.0 =
                dim.x as i64 / if double_width { 2 } else { 1 } - crop_offset.0 as i64 + new_size.0;
        } else if double_width {
            new_size.0 /= 2;
        }
        if new_size.1 <= 0 {
            new_size.1 = dim.y as i64 - crop_offset.1 as i64 + new_size.1;
        }
        if new_size.0 <= 0 || new_size.1 <= 0 {
            return Err(Error::Decoder("RAF: empty crop".to_string()));
        }
        let new_size = (new_size.0 as usize, new_size.1 as usize);

        if hints.has("fuji_rotate") {
            // SuperCCD: unrotate the 45 degree sensor grid
            let (rotated_size, rotation_pos) = if self.alt_layout {
                (new_size.1 + new_size.0 / 2, new_size.0 / 2 - 1)
            } else {
                (new_size.0 + new_size.1 / 2, new_size.0 - 1)
            };
            let mut rotated =
                RawImage::new_u16(Point::new(rotated_size, rotated_size - 1), 1);
            rotated.create_data();
            rotated.metadata = image.metadata.clone();
            rotated.metadata.fuji_rotation_pos = rotation_pos as u32;
            rotated.metadata.pixel_aspect_ratio = 0.5;

            let dest_pitch = rotated.pitch_u16();
            let rot_dim = rotated.uncropped_dim();
            {
                let src_pitch = image.pitch_u16();
                let src = image.u16_data();
                let dst = rotated.u16_data_mut();
                for y in 0..new_size.1 {
                    let src_row =
                        &src[(crop_offset.1 + y) * src_pitch + crop_offset.0..];
                    for x in 0..new_size.0 {
                        let (h, w) = if self.alt_layout {
                            (
                                rotated_size as i64 - (new_size.1 as i64 + 1 - y as i64 + (x as i64 >> 1)),
                                ((x + 1) >> 1) + y,
                            )
                        } else {
                            (
                                new_size.0 as i64 - 1 - x as i64 + (y as i64 >> 1),
                                ((y + 1) >> 1) + x,
                            )
                        };
                        if h < 0 || h as usize >= rot_dim.y || w >= rot_dim.x {
                            return Err(Error::Decoder(
                                "RAF: rotation writes out of bounds".to_string(),
                            ));
                        }
                        dst[h as usize * dest_pitch + w] = src_row[x];
                    }
                }
            }
            *image = rotated;
        } else {
            image.sub_frame(Rect::new(crop_offset.0, crop_offset.1, new_size.0, new_size.1));
        }

        if let Some(sensor) = camera.sensor_info(self.iso) {
            image.black_level = sensor.black_level;
            image.white_point = sensor.white_level as u32;
        }
        image.black_areas = camera.black_areas.clone();
        if !camera.cfa.is_empty() {
            image.cfa = camera.cfa.clone();
        }
        image.metadata.make = self.make.clone();
        image.metadata.model = self.model.clone();
        image.metadata.canonical_make = camera.canonical_make.clone();
        image.metadata.canonical_model = camera.canonical_model.clone();
        image.metadata.canonical_alias = camera.canonical_alias.clone();
        image.metadata.canonical_id = camera.canonical_id.clone();

        if let Some([r, g, b]) = self.wb_grb {
            image.metadata.wb_coeffs = [r, g, b, f32::NAN];
        }
        Ok(())
    }
}
