// SPDX-License-Identifier: LGPL-3.0-or-later
/*
 * rawspeed - decoders/orf.rs
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

//! Olympus ORF.
//!
//! Several uncompressed packings are told apart by the strip size
//! alone; everything else goes through the Olympus carry state
//! decompressor.

use crate::bitstream::BitOrder;
use crate::buffer::Buffer;
use crate::bytestream::{ByteStream, Endian};
use crate::cfa::{CfaColor, ColorFilterArray};
use crate::decompressors::olympus::OlympusDecompressor;
use crate::decompressors::uncompressed::UncompressedDecompressor;
use crate::metadata::CameraMetaData;
use crate::rawimage::{Point, RawImage};
use crate::tiff::{tags, RootIfd, TagType};
use crate::{Error, Result};

use super::RawDecoder;

const OLYMPUS_RED_MULTIPLIER: u16 = 0x1017;
const OLYMPUS_BLUE_MULTIPLIER: u16 = 0x1018;

pub(crate) struct OrfDecoder<'a> {
    buffer: &'a Buffer,
    root: RootIfd<'a>,
}

impl<'a> OrfDecoder<'a> {
    pub fn new(buffer: &'a Buffer, root: RootIfd<'a>) -> Result<OrfDecoder<'a>> {
        Ok(OrfDecoder { buffer, root })
    }

    /// Merge the strips into one contiguous stream, keeping the
    /// padding between the first slices of the packed-with-control
    /// layout.
    fn handle_slices(&self, raw: &crate::tiff::Ifd<'a>) -> Result<ByteStream<'a>> {
        let offsets = raw.required_entry(tags::STRIP_OFFSETS)?;
        let counts = raw.required_entry(tags::STRIP_BYTE_COUNTS)?;
        if counts.count != offsets.count {
            return Err(Error::Decoder(format!(
                "ORF: byte count number does not match strip size: count {}, strips {}",
                counts.count, offsets.count
            )));
        }
        let off = offsets.get_u32(0)? as usize;
        let mut size = counts.get_u32(0)? as usize;
        for i in 1..offsets.count {
            let offset = offsets.get_u32(i)? as usize;
            let count = counts.get_u32(i)? as usize;
            if count < 1 {
                return Err(Error::Decoder("ORF: empty slice".to_string()));
            }
            let end = off + size;
            if offset < end {
                return Err(Error::Decoder("ORF: slices overlap".to_string()));
            }
            size += (offset - end) + count;
        }
        Ok(ByteStream::new(
            self.buffer.get_data(off, size)?,
            Endian::Little,
        ))
    }

    /// The uncompressed layouts, recognized by their exact size.
    fn decode_uncompressed(
        &self,
        image: &mut RawImage,
        input: &ByteStream<'a>,
        w: usize,
        h: usize,
    ) -> Result<bool> {
        let size = input.size();
        let mut d = UncompressedDecompressor::new(input.clone());
        if size == h * (w * 12 / 8 + (w + 2) / 10) {
            // 12 bit packed with a control byte
            d.decode_12bit_raw(image, w, h, false, false, true)?;
            return Ok(true);
        }
        if size == w * h * 12 / 8 {
            // plain 12 bit packed
            d.read_uncompressed_raw(
                image,
                Point::new(w, h),
                Point::default(),
                w * 12 / 8,
                12,
                BitOrder::Msb32,
            )?;
            return Ok(true);
        }
        if size == w * h * 2 {
            // unpacked
            if input.endian() == Endian::Little {
                d.decode_raw_unpacked(image, w, h, 12, Endian::Little)?;
            } else {
                d.decode_12bit_left_aligned(image, w, h)?;
            }
            return Ok(true);
        }
        if size > w * h * 3 / 2 {
            // the interlaced field layout
            d.decode_12bit_raw(image, w, h, true, true, false)?;
            return Ok(true);
        }
        Ok(false)
    }

    fn parse_cfa(&self, image: &mut RawImage) -> Result<()> {
        let cfa = self
            .root
            .get_entry_recursive(tags::CFA_PATTERN)
            .filter(|e| e.tag_type == TagType::Undefined && e.count == 8)
            .ok_or_else(|| Error::Decoder("ORF: no usable CFA pattern entry".to_string()))?;
        if cfa.get_u16(0)? != 2 || cfa.get_u16(1)? != 2 {
            return Err(Error::Decoder("ORF: bad CFA size".to_string()));
        }
        let mut colors = Vec::with_capacity(4);
        for i in 0..4 {
            let c = cfa.get_byte(4 + i)?;
            colors.push(
                CfaColor::try_from(c)
                    .ok()
                    .filter(|c| {
                        matches!(c, CfaColor::Red | CfaColor::Green | CfaColor::Blue)
                    })
                    .ok_or_else(|| Error::Decoder(format!("ORF: unexpected CFA colour {c}")))?,
            );
        }
        image.cfa = ColorFilterArray::new(2, 2, colors);
        Ok(())
    }
}

impl<'a> RawDecoder<'a> for OrfDecoder<'a> {
    fn check_support(&self, meta: &CameraMetaData) -> Result<()> {
        let id = self.root.get_id()?;
        super::check_camera_supported(meta, &id.make, &id.model, "", self.decoder_version())
    }

    fn decode_raw(&self, _meta: &CameraMetaData) -> Result<RawImage> {
        let raw = self
            .root
            .get_ifd_with_tag(tags::STRIP_OFFSETS, 0)
            .ok_or(crate::TiffError::MissingTag(tags::STRIP_OFFSETS))?;
        let compression = raw.required_entry(tags::COMPRESSION)?.get_u32(0)?;
        if compression != 1 {
            return Err(Error::Decoder(format!("ORF: unsupported compression {compression}")));
        }
        let (width, height) = super::get_checked_dim(raw, 10400, 7796)?;
        if width % 2 != 0 {
            return Err(Error::Decoder("ORF: odd width".to_string()));
        }

        let mut image = RawImage::new_u16(Point::new(width, height), 1);
        image.create_data();

        let input = self.handle_slices(raw)?;
        if self.decode_uncompressed(&mut image, &input, width, height)? {
            return Ok(image);
        }

        if raw.required_entry(tags::STRIP_OFFSETS)?.count != 1 {
            return Err(Error::Decoder(
                "ORF: multiple strips, and not uncompressed".to_string(),
            ));
        }
        let d = OlympusDecompressor::new(&image)?;
        d.decompress(&mut image, input)?;
        Ok(image)
    }

    fn decode_metadata(&self, image: &mut RawImage, meta: &CameraMetaData) -> Result<()> {
        self.parse_cfa(image)?;
        let id = self.root.get_id()?;
        super::set_meta_data(image, meta, &id.make, &id.model, "", super::get_iso(&self.root))?;

        if let (Some(red), Some(blue)) = (
            self.root.get_entry_recursive(OLYMPUS_RED_MULTIPLIER),
            self.root.get_entry_recursive(OLYMPUS_BLUE_MULTIPLIER),
        ) {
            image.metadata.wb_coeffs[0] = f32::from(red.get_u16(0)?);
            image.metadata.wb_coeffs[1] = 256.0;
            image.metadata.wb_coeffs[2] = f32::from(blue.get_u16(0)?);
        }
        Ok(())
    }
}
