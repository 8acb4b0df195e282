// SPDX-License-Identifier: LGPL-3.0-or-later
/*
 * rawspeed - decoders/srw.rs
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

//! Samsung SRW.

use crate::buffer::Buffer;
use crate::bytestream::{ByteStream, Endian};
use crate::decompressors::samsung::{SamsungV0Decompressor, SamsungV2Decompressor};
use crate::decompressors::uncompressed::UncompressedDecompressor;
use crate::metadata::CameraMetaData;
use crate::rawimage::{Point, RawImage};
use crate::tiff::{tags, RootIfd, TagType};
use crate::{Error, Result};

use super::RawDecoder;

/// Per line offset table of the V0 scheme.
const SRW_LINE_OFFSETS: u16 = 40976;

pub(crate) struct SrwDecoder<'a> {
    buffer: &'a Buffer,
    root: RootIfd<'a>,
}

impl<'a> SrwDecoder<'a> {
    pub fn new(buffer: &'a Buffer, root: RootIfd<'a>) -> Result<SrwDecoder<'a>> {
        Ok(SrwDecoder { buffer, root })
    }
}

impl<'a> RawDecoder<'a> for SrwDecoder<'a> {
    fn check_support(&self, meta: &CameraMetaData) -> Result<()> {
        let id = self.root.get_id()?;
        super::check_camera_supported(meta, &id.make, &id.model, "", self.decoder_version())
    }

    fn decode_raw(&self, _meta: &CameraMetaData) -> Result<RawImage> {
        let raw = super::get_ifd_with_largest_image(&self.root, tags::STRIP_OFFSETS)?;
        let compression = raw.required_entry(tags::COMPRESSION)?.get_u32(0)?;
        let bits = raw.required_entry(tags::BITS_PER_SAMPLE)?.get_u32(0)?;
        let (width, height) = super::get_checked_dim(raw, 6496, 4336)?;

        let mut image = RawImage::new_u16(Point::new(width, height), 1);
        image.create_data();

        match compression {
            32770 => {
                if let Some(offsets_entry) = raw.entry(SRW_LINE_OFFSETS) {
                    // NX300 class, one offset per line
                    if offsets_entry.tag_type != TagType::Long || offsets_entry.count != 1 {
                        return Err(Error::Decoder("SRW: entry 40976 is corrupt".to_string()));
                    }
                    let offsets_pos = offsets_entry.get_u32(0)? as usize;
                    let offsets = ByteStream::new(
                        self.buffer.get_data(offsets_pos, 4 * height)?,
                        Endian::Little,
                    );
                    let data = super::get_strip(self.buffer, raw, Endian::Little)?;
                    let d = SamsungV0Decompressor::new(&image, offsets, data)?;
                    d.decompress(&mut image)?;
                } else {
                    // packed 12 bit
                    let input = super::get_strip(self.buffer, raw, Endian::Little)?;
                    let mut d = UncompressedDecompressor::new(input);
                    d.decode_12bit_raw(&mut image, width, height, false, false, false)?;
                }
            }
            32772 => {
                return Err(Error::Decoder(
                    "SRW: the V1 entropy scheme is not supported".to_string(),
                ));
            }
            32773 => {
                let input = super::get_strip(self.buffer, raw, Endian::Little)?;
                let d = SamsungV2Decompressor::new(&image, input, bits)?;
                d.decompress(&mut image)?;
            }
            1 => {
                let input = super::get_strip(self.buffer, raw, Endian::Little)?;
                let mut d = UncompressedDecompressor::new(input);
                d.decode_raw_unpacked(&mut image, width, height, 16, Endian::Little)?;
            }
            c => {
                return Err(Error::Decoder(format!("SRW: unsupported compression {c}")));
            }
        }
        Ok(image)
    }

    fn decode_metadata(&self, image: &mut RawImage, meta: &CameraMetaData) -> Result<()> {
        let id = self.root.get_id()?;
        super::set_meta_data(image, meta, &id.make, &id.model, "", super::get_iso(&self.root))
    }
}
