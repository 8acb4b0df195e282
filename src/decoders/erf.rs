// SPDX-License-Identifier: LGPL-3.0-or-later
/*
 * rawspeed - decoders/erf.rs
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

//! Epson ERF: 12 bit packed with a control byte every ten pixels.

use crate::buffer::Buffer;
use crate::decompressors::uncompressed::UncompressedDecompressor;
use crate::metadata::CameraMetaData;
use crate::rawimage::{Point, RawImage};
use crate::tiff::{tags, RootIfd};
use crate::Result;

use super::RawDecoder;

const EPSON_WB: u16 = 0x0e80;

pub(crate) struct ErfDecoder<'a> {
    buffer: &'a Buffer,
    root: RootIfd<'a>,
}

impl<'a> ErfDecoder<'a> {
    pub fn new(buffer: &'a Buffer, root: RootIfd<'a>) -> Result<ErfDecoder<'a>> {
        Ok(ErfDecoder { buffer, root })
    }
}

impl<'a> RawDecoder<'a> for ErfDecoder<'a> {
    fn check_support(&self, meta: &CameraMetaData) -> Result<()> {
        let id = self.root.get_id()?;
        super::check_camera_supported(meta, &id.make, &id.model, "", self.decoder_version())
    }

    fn decode_raw(&self, _meta: &CameraMetaData) -> Result<RawImage> {
        let raw = super::get_ifd_with_largest_image(&self.root, tags::STRIP_OFFSETS)?;
        let (width, height) = super::get_checked_dim(raw, 3040, 2024)?;

        let mut image = RawImage::new_u16(Point::new(width, height), 1);
        image.create_data();

        let input = super::get_strip(self.buffer, raw, self.root.endian())?;
        let mut d = UncompressedDecompressor::new(input);
        d.decode_12bit_raw(&mut image, width, height, true, false, true)?;
        Ok(image)
    }

    fn decode_metadata(&self, image: &mut RawImage, meta: &CameraMetaData) -> Result<()> {
        let id = self.root.get_id()?;
        super::set_meta_data(image, meta, &id.make, &id.model, "", super::get_iso(&self.root))?;

        if let Some(wb) = self.root.get_entry_recursive(EPSON_WB) {
            if wb.count == 256 {
                // magic values from the reference decoder
                image.metadata.wb_coeffs[0] =
                    f32::from(wb.get_u16(24)?) * 508.0 * 1.078 / 65536.0;
                image.metadata.wb_coeffs[1] = 1.0;
                image.metadata.wb_coeffs[2] =
                    f32::from(wb.get_u16(25)?) * 382.0 * 1.173 / 65536.0;
            }
        }
        Ok(())
    }
}
