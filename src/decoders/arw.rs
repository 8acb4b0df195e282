// SPDX-License-Identifier: LGPL-3.0-or-later
/*
 * rawspeed - decoders/arw.rs
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

//! Sony ARW and SR2.
//!
//! Compression 32767 hides two schemes: the ARW1 column coder (when
//! the strip is shorter than the pixel count implies) and the ARW2
//! group coder. The linearization curve comes from four sampled
//! points in the SonyCurve tag.

use crate::buffer::Buffer;
use crate::bytestream::Endian;
use crate::cfa::ColorFilterArray;
use crate::decompressors::sony::{SonyArw1Decompressor, SonyArw2Decompressor};
use crate::decompressors::uncompressed::UncompressedDecompressor;
use crate::metadata::CameraMetaData;
use crate::rawimage::{Point, RawImage};
use crate::tiff::{tags, RootIfd};
use crate::{Error, Result};

use super::RawDecoder;

const SONY_CURVE: u16 = 0x7010;
const SONY_RGGB_LEVELS: u16 = 0x7313;

pub(crate) struct ArwDecoder<'a> {
    buffer: &'a Buffer,
    root: RootIfd<'a>,
}

impl<'a> ArwDecoder<'a> {
    pub fn new(buffer: &'a Buffer, root: RootIfd<'a>) -> Result<ArwDecoder<'a>> {
        Ok(ArwDecoder { buffer, root })
    }

    /// The piecewise linearization curve: four sampled points, with
    /// slopes doubling per segment.
    fn sony_curve(raw: &crate::tiff::Ifd) -> Result<Vec<u16>> {
        let c = raw.required_entry(SONY_CURVE)?;
        let mut sony_curve = [0_u32, 0, 0, 0, 0, 4095];
        for i in 0..4 {
            sony_curve[i + 1] = (u32::from(c.get_u16(i as u32)?) >> 2) & 0xfff;
        }
        let mut curve: Vec<u16> = (0..=0x4000_u16).collect();
        for i in 0..5 {
            for j in sony_curve[i] + 1..=sony_curve[i + 1] {
                curve[j as usize] = curve[j as usize - 1] + (1_u16 << i);
            }
        }
        Ok(curve)
    }

    fn decode_uncompressed(&self, raw: &crate::tiff::Ifd<'a>) -> Result<RawImage> {
        let (width, height) = super::get_checked_dim(raw, 8000, 5320)?;
        let mut image = RawImage::new_u16(Point::new(width, height), 1);
        image.create_data();
        let input = super::get_strip(self.buffer, raw, self.root.endian())?;
        let mut d = UncompressedDecompressor::new(input);
        // SR2 stores big endian 14 bit words
        let bits = raw.required_entry(tags::BITS_PER_SAMPLE)?.get_u32(0)?;
        if bits == 14 && self.root.endian() == Endian::Big {
            d.decode_raw_unpacked(&mut image, width, height, 14, Endian::Big)?;
        } else {
            d.decode_raw_unpacked(&mut image, width, height, 16, Endian::Little)?;
        }
        Ok(image)
    }
}

impl<'a> RawDecoder<'a> for ArwDecoder<'a> {
    fn check_support(&self, meta: &CameraMetaData) -> Result<()> {
        let id = self.root.get_id()?;
        super::check_camera_supported(meta, &id.make, &id.model, "", self.decoder_version())
    }

    fn decode_raw(&self, _meta: &CameraMetaData) -> Result<RawImage> {
        let data = self.root.get_ifds_with_tag(tags::STRIP_OFFSETS);
        if data.is_empty() {
            // the A100 hides its ARW1 stream behind a bare SubIFDs
            // offset
            let model = self
                .root
                .get_entry_recursive(tags::MODEL)
                .and_then(|e| e.get_string().ok());
            if model.as_deref() == Some("DSLR-A100") {
                let raw = self
                    .root
                    .get_ifds_with_tag(tags::SUB_IFDS)
                    .first()
                    .copied()
                    .ok_or(crate::TiffError::MissingTag(tags::SUB_IFDS))?;
                let off = raw.required_entry(tags::SUB_IFDS)?.get_u32(0)? as usize;
                let (width, height) = (3881, 2608);
                let mut image = RawImage::new_u16(Point::new(width, height), 1);
                image.create_data();
                let len = self.buffer.size() - off.min(self.buffer.size());
                let input = crate::bytestream::ByteStream::new(
                    self.buffer.get_data(off, len)?,
                    Endian::Little,
                );
                let d = SonyArw1Decompressor::new(&image)?;
                d.decompress(&mut image, input)?;
                return Ok(image);
            }
            return Err(Error::Decoder("ARW: no image data found".to_string()));
        }

        let raw = data[0];
        let compression = raw.required_entry(tags::COMPRESSION)?.get_u32(0)?;
        if compression == 1 {
            return self.decode_uncompressed(raw);
        }
        if compression != 32767 {
            return Err(Error::Decoder(format!("ARW: unsupported compression {compression}")));
        }

        let offsets = raw.required_entry(tags::STRIP_OFFSETS)?;
        let counts = raw.required_entry(tags::STRIP_BYTE_COUNTS)?;
        if offsets.count != 1 || counts.count != 1 {
            return Err(Error::Decoder(format!(
                "ARW: multiple strips found: {}",
                offsets.count
            )));
        }
        let (width, mut height) = super::get_checked_dim(raw, 8000, 5320)?;
        if height % 2 != 0 {
            return Err(Error::Decoder("ARW: odd height".to_string()));
        }
        let bits = raw.required_entry(tags::BITS_PER_SAMPLE)?.get_u32(0)?;
        if !matches!(bits, 8 | 12 | 14) {
            return Err(Error::Decoder(format!("ARW: unexpected bits per pixel {bits}")));
        }

        let count = counts.get_u32(0)? as usize;
        // a strip shorter than the pixel count implies is ARW1
        let arw1 = count as u64 * 8 != (width * height) as u64 * u64::from(bits);
        if arw1 {
            height += 8;
        }

        let mut image = RawImage::new_u16(Point::new(width, height), 1);
        image.create_data();

        let curve = Self::sony_curve(raw)?;
        image.set_table(Some((&curve, true)));

        let off = offsets.get_u32(0)? as usize;
        let mut len = count;
        if off + len > self.buffer.size() {
            len = self.buffer.size() - off;
        }
        let input =
            crate::bytestream::ByteStream::new(self.buffer.get_data(off, len)?, Endian::Little);

        if arw1 {
            let d = SonyArw1Decompressor::new(&image)?;
            d.decompress(&mut image, input)?;
        } else {
            match bits {
                8 => {
                    let d = SonyArw2Decompressor::new(&image, input)?;
                    d.decompress(&mut image)?;
                }
                12 => {
                    let mut d = UncompressedDecompressor::new(input);
                    d.decode_12bit_raw(&mut image, width, height, false, false, false)?;
                }
                _ => {
                    return Err(Error::Decoder("ARW: unsupported bit depth".to_string()));
                }
            }
        }
        image.set_table(None);
        Ok(image)
    }

    fn decode_metadata(&self, image: &mut RawImage, meta: &CameraMetaData) -> Result<()> {
        image.cfa = ColorFilterArray::rggb();
        let id = self.root.get_id()?;
        super::set_meta_data(image, meta, &id.make, &id.model, "", super::get_iso(&self.root))?;

        if let Some(wb) = self.root.get_entry_recursive(SONY_RGGB_LEVELS) {
            if wb.count == 4 {
                image.metadata.wb_coeffs[0] = wb.get_u16(0)? as f32;
                image.metadata.wb_coeffs[1] = wb.get_u16(1)? as f32;
                image.metadata.wb_coeffs[2] = wb.get_u16(3)? as f32;
            }
        }
        Ok(())
    }
}
