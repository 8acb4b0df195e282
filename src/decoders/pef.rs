// SPDX-License-Identifier: LGPL-3.0-or-later
/*
 * rawspeed - decoders/pef.rs
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

//! Pentax PEF.
//!
//! The packed and unpacked layouts decode here; the Pentax Huffman
//! scheme has no decompressor in this crate yet.

use crate::buffer::Buffer;
use crate::bytestream::Endian;
use crate::decompressors::uncompressed::UncompressedDecompressor;
use crate::metadata::CameraMetaData;
use crate::rawimage::{Point, RawImage};
use crate::tiff::{tags, RootIfd};
use crate::{Error, Result};

use super::RawDecoder;

pub(crate) struct PefDecoder<'a> {
    buffer: &'a Buffer,
    root: RootIfd<'a>,
}

impl<'a> PefDecoder<'a> {
    pub fn new(buffer: &'a Buffer, root: RootIfd<'a>) -> Result<PefDecoder<'a>> {
        Ok(PefDecoder { buffer, root })
    }
}

impl<'a> RawDecoder<'a> for PefDecoder<'a> {
    fn check_support(&self, meta: &CameraMetaData) -> Result<()> {
        let id = self.root.get_id()?;
        super::check_camera_supported(meta, &id.make, &id.model, "", self.decoder_version())
    }

    fn decode_raw(&self, _meta: &CameraMetaData) -> Result<RawImage> {
        let raw = super::get_ifd_with_largest_image(&self.root, tags::STRIP_OFFSETS)?;
        let (width, height) = super::get_checked_dim(raw, super::MAX_DIM, super::MAX_DIM)?;
        let compression = raw.required_entry(tags::COMPRESSION)?.get_u32(0)?;

        let mut image = RawImage::new_u16(Point::new(width, height), 1);
        image.create_data();

        let input = super::get_strip(self.buffer, raw, self.root.endian())?;
        let mut d = UncompressedDecompressor::new(input);
        match compression {
            1 => d.decode_raw_unpacked(&mut image, width, height, 16, Endian::Little)?,
            32773 => d.decode_12bit_raw(&mut image, width, height, true, false, false)?,
            65535 => {
                return Err(Error::Decoder(
                    "PEF: Pentax Huffman compression is not supported".to_string(),
                ));
            }
            c => {
                return Err(Error::Decoder(format!("PEF: unsupported compression {c}")));
            }
        }
        Ok(image)
    }

    fn decode_metadata(&self, image: &mut RawImage, meta: &CameraMetaData) -> Result<()> {
        let id = self.root.get_id()?;
        super::set_meta_data(image, meta, &id.make, &id.model, "", super::get_iso(&self.root))
    }
}
