// SPDX-License-Identifier: LGPL-3.0-or-later
/*
 * rawspeed - decoders/mrw.rs
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

//! Minolta MRW.
//!
//! A block container: PRD carries the sensor geometry, WBG the white
//! balance, TTW an embedded TIFF with the Exif, and the pixel data
//! follows the header as packed 12 bit big endian.

use crate::buffer::Buffer;
use crate::bytestream::{ByteStream, Endian};
use crate::decompressors::uncompressed::UncompressedDecompressor;
use crate::metadata::CameraMetaData;
use crate::rawimage::{Point, RawImage};
use crate::tiff;
use crate::{Error, Result};

use super::RawDecoder;

pub(crate) struct MrwDecoder<'a> {
    buffer: &'a Buffer,
    raw_width: usize,
    raw_height: usize,
    /// 12 bits packed, or 16 bit words.
    packed: bool,
    data_offset: usize,
    wb_coeffs: [f32; 4],
    make: String,
    model: String,
}

impl<'a> MrwDecoder<'a> {
    pub fn new(buffer: &'a Buffer) -> Result<MrwDecoder<'a>> {
        let mut stream = ByteStream::new(buffer.as_ref(), Endian::Big);
        if stream.get_bytes(4)? != b"\x00MRM" {
            return Err(Error::Parse("not an MRW file".to_string()));
        }
        let header_len = stream.get_u32()? as usize;
        let data_offset = header_len + 8;

        let mut raw_width = 0;
        let mut raw_height = 0;
        let mut packed = true;
        let mut wb_coeffs = [f32::NAN; 4];
        let mut make = String::new();
        let mut model = String::new();

        while stream.position() < data_offset && stream.remaining() >= 8 {
            let block = stream.get_bytes(4)?;
            let len = stream.get_u32()? as usize;
            let next = stream.position() + len;
            match block {
                b"\x00PRD" => {
                    let mut prd = stream.clone();
                    prd.skip(8)?; // version string
                    raw_height = prd.get_u16()? as usize;
                    raw_width = prd.get_u16()? as usize;
                    prd.skip(4)?; // image dimensions
                    prd.skip(2)?; // data and pixel size
                    // 0x59 means 12 bit packed storage
                    packed = prd.get_u8()? == 0x59;
                }
                b"\x00WBG" => {
                    let mut wbg = stream.clone();
                    let denominators = wbg.get_bytes(4)?.to_vec();
                    for (i, den) in denominators.iter().enumerate() {
                        let coeff = wbg.get_u16()?;
                        wb_coeffs[i] = f32::from(coeff) / f32::from(1_u16 << (den & 3) as u16);
                    }
                }
                b"\x00TTW" => {
                    // embedded TIFF with the Exif identification
                    let tiff_bytes = stream.peek_bytes(len)?;
                    if let Ok(root) = tiff::parse(tiff_bytes) {
                        if let Ok(id) = root.get_id() {
                            make = id.make;
                            model = id.model;
                        }
                    }
                }
                _ => {}
            }
            stream.seek(next)?;
        }

        if raw_width == 0 || raw_height == 0 || raw_width > 3280 || raw_height > 2456 {
            return Err(Error::Decoder(format!(
                "MRW: unexpected image dimensions ({raw_width}; {raw_height})"
            )));
        }

        Ok(MrwDecoder {
            buffer,
            raw_width,
            raw_height,
            packed,
            data_offset,
            wb_coeffs,
            make,
            model,
        })
    }
}

impl<'a> RawDecoder<'a> for MrwDecoder<'a> {
    fn check_support(&self, meta: &CameraMetaData) -> Result<()> {
        super::check_camera_supported(meta, &self.make, &self.model, "", self.decoder_version())
    }

    fn decode_raw(&self, _meta: &CameraMetaData) -> Result<RawImage> {
        let mut image = RawImage::new_u16(Point::new(self.raw_width, self.raw_height), 1);
        image.create_data();

        let len = self.buffer.size() - self.data_offset.min(self.buffer.size());
        let input = ByteStream::new(self.buffer.get_data(self.data_offset, len)?, Endian::Big);
        let mut d = UncompressedDecompressor::new(input);
        if self.packed {
            d.decode_12bit_raw(&mut image, self.raw_width, self.raw_height, true, false, false)?;
        } else {
            d.decode_raw_unpacked(&mut image, self.raw_width, self.raw_height, 12, Endian::Big)?;
        }
        Ok(image)
    }

    fn decode_metadata(&self, image: &mut RawImage, meta: &CameraMetaData) -> Result<()> {
        super::set_meta_data(image, meta, &self.make, &self.model, "", 0)?;
        // WBG stores GRBG order
        image.metadata.wb_coeffs[0] = self.wb_coeffs[1];
        image.metadata.wb_coeffs[1] = self.wb_coeffs[0];
        image.metadata.wb_coeffs[2] = self.wb_coeffs[3];
        Ok(())
    }
}
