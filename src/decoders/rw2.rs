// SPDX-License-Identifier: LGPL-3.0-or-later
/*
 * rawspeed - decoders/rw2.rs
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

//! Panasonic RW2 (and the older RAW).
//!
//! The private tags carry the sensor geometry and the raw format
//! version that selects among the V4 to V7 block schemes.

use crate::buffer::Buffer;
use crate::bytestream::{ByteStream, Endian};
use crate::decompressors::panasonic::{
    PanasonicV4Decompressor, PanasonicV5Decompressor, PanasonicV6Decompressor,
    PanasonicV7Decompressor,
};
use crate::metadata::CameraMetaData;
use crate::rawimage::{Point, RawImage};
use crate::tiff::{tags, RootIfd};
use crate::{Error, Result};

use super::RawDecoder;

/// V4 rotates each block at this offset.
const V4_SECTION_SPLIT_OFFSET: usize = 0x1ff8;

const PANASONIC_WB_RED: u16 = 0x0024;
const PANASONIC_WB_GREEN: u16 = 0x0025;
const PANASONIC_WB_BLUE: u16 = 0x0026;
const PANASONIC_ISO: u16 = 0x0017;

pub(crate) struct Rw2Decoder<'a> {
    buffer: &'a Buffer,
    root: RootIfd<'a>,
}

impl<'a> Rw2Decoder<'a> {
    pub fn new(buffer: &'a Buffer, root: RootIfd<'a>) -> Result<Rw2Decoder<'a>> {
        Ok(Rw2Decoder { buffer, root })
    }

    fn raw_data(&self, raw: &crate::tiff::Ifd<'a>) -> Result<ByteStream<'a>> {
        // newer files point at the payload with the RawData offset
        // tag, older ones use the strip pair
        if let Some(entry) = raw.entry(tags::PANASONIC_RAW_DATA) {
            let offset = entry.get_u32(0)? as usize;
            let len = self.buffer.size().saturating_sub(offset);
            return Ok(ByteStream::new(
                self.buffer.get_data(offset, len)?,
                Endian::Little,
            ));
        }
        if let Some(entry) = raw.entry(tags::PANASONIC_STRIP_OFFSET) {
            let offset = entry.get_u32(0)? as usize;
            let len = self.buffer.size().saturating_sub(offset);
            return Ok(ByteStream::new(
                self.buffer.get_data(offset, len)?,
                Endian::Little,
            ));
        }
        super::get_strip(self.buffer, raw, Endian::Little)
    }
}

impl<'a> RawDecoder<'a> for Rw2Decoder<'a> {
    fn check_support(&self, meta: &CameraMetaData) -> Result<()> {
        let id = self.root.get_id()?;
        super::check_camera_supported(meta, &id.make, &id.model, "", self.decoder_version())
    }

    fn decode_raw(&self, meta: &CameraMetaData) -> Result<RawImage> {
        let raw = self
            .root
            .ifd(0)
            .ok_or_else(|| Error::Decoder("RW2: no IFD0".to_string()))?;
        let width = raw
            .required_entry(tags::PANASONIC_SENSOR_WIDTH)?
            .get_u32(0)? as usize;
        let height = raw
            .required_entry(tags::PANASONIC_SENSOR_HEIGHT)?
            .get_u32(0)? as usize;
        if width == 0 || height == 0 || width > 9440 || height > 7080 {
            return Err(Error::Decoder(format!(
                "RW2: unexpected image dimensions found: ({width}; {height})"
            )));
        }
        let bps = raw
            .entry(tags::PANASONIC_BITS_PER_SAMPLE)
            .map(|e| e.get_u32(0))
            .transpose()?
            .unwrap_or(12);
        let version = raw
            .entry(tags::PANASONIC_RAW_FORMAT)
            .map(|e| e.get_u32(0))
            .transpose()?
            .unwrap_or(4);

        let zero_is_not_bad = self
            .root
            .get_id()
            .ok()
            .and_then(|id| meta.get_camera_any_mode(&id.make, &id.model))
            .map(|camera| camera.hints.get_bool("zero_is_not_bad", false))
            .unwrap_or(false);

        let mut image = RawImage::new_u16(Point::new(width, height), 1);
        image.create_data();

        let input = self.raw_data(raw)?;
        match version {
            4 => {
                let d = PanasonicV4Decompressor::new(
                    &image,
                    input,
                    zero_is_not_bad,
                    V4_SECTION_SPLIT_OFFSET,
                )?;
                d.decompress(&mut image)?;
            }
            5 => {
                let d = PanasonicV5Decompressor::new(&image, input, bps)?;
                d.decompress(&mut image)?;
            }
            6 => {
                let d = PanasonicV6Decompressor::new(&image, input, bps)?;
                d.decompress(&mut image)?;
            }
            7 => {
                let d = PanasonicV7Decompressor::new(&image, input, bps)?;
                d.decompress(&mut image)?;
            }
            v => {
                return Err(Error::Decoder(format!("RW2: unsupported raw format {v}")));
            }
        }
        Ok(image)
    }

    fn decode_metadata(&self, image: &mut RawImage, meta: &CameraMetaData) -> Result<()> {
        let id = self.root.get_id()?;
        let iso = self
            .root
            .get_entry_recursive(PANASONIC_ISO)
            .and_then(|e| e.get_u32(0).ok())
            .map(|v| v as i32)
            .unwrap_or_else(|| super::get_iso(&self.root));
        super::set_meta_data(image, meta, &id.make, &id.model, "", iso)?;

        let wb = |tag: u16| {
            self.root
                .get_entry_recursive(tag)
                .and_then(|e| e.get_u16(0).ok())
                .map(f32::from)
        };
        if let (Some(r), Some(g), Some(b)) = (
            wb(PANASONIC_WB_RED),
            wb(PANASONIC_WB_GREEN),
            wb(PANASONIC_WB_BLUE),
        ) {
            image.metadata.wb_coeffs = [r, g, b, f32::NAN];
        }

        // interpolate away the dead sensor pixels recorded during
        // decompression
        image.transfer_bad_pixels_to_map();
        image.fix_bad_pixels();
        Ok(())
    }
}
