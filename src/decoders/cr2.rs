// SPDX-License-Identifier: LGPL-3.0-or-later
/*
 * rawspeed - decoders/cr2.rs
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

//! Canon CR2.
//!
//! A lossless JPEG stream chopped into vertical slices: the scan
//! fills slice zero top to bottom, then slice one, and so on. The
//! slice widths come from tag 0xC640.

use crate::buffer::Buffer;
use crate::bytestream::{ByteStream, Endian};
use crate::cfa::ColorFilterArray;
use crate::decompressors::ljpeg::LJpegDecompressor;
use crate::metadata::CameraMetaData;
use crate::rawimage::{Point, RawImage};
use crate::tiff::{tags, RootIfd};
use crate::{Error, Result};

use super::RawDecoder;

const CANON_CR2_SLICE: u16 = 0xc640;

pub(crate) struct Cr2Decoder<'a> {
    buffer: &'a Buffer,
    root: RootIfd<'a>,
}

impl<'a> Cr2Decoder<'a> {
    pub fn new(buffer: &'a Buffer, root: RootIfd<'a>) -> Result<Cr2Decoder<'a>> {
        Ok(Cr2Decoder { buffer, root })
    }
}

impl<'a> RawDecoder<'a> for Cr2Decoder<'a> {
    fn check_support(&self, meta: &CameraMetaData) -> Result<()> {
        let id = self.root.get_id()?;
        super::check_camera_supported(meta, &id.make, &id.model, "", self.decoder_version())
    }

    fn decode_raw(&self, _meta: &CameraMetaData) -> Result<RawImage> {
        // the raw IFD is the last of the chain, the earlier ones
        // hold previews
        let raw = self
            .root
            .ifds()
            .iter()
            .rev()
            .find(|ifd| ifd.has_entry(tags::STRIP_OFFSETS))
            .ok_or(crate::TiffError::MissingTag(tags::STRIP_OFFSETS))?;

        let offset = raw.required_entry(tags::STRIP_OFFSETS)?.get_u32(0)? as usize;
        let count = raw.required_entry(tags::STRIP_BYTE_COUNTS)?.get_u32(0)? as usize;
        let input = ByteStream::new(self.buffer.get_data(offset, count)?, Endian::Big);

        let ljpeg = LJpegDecompressor::new(input)?;
        let frame_samples = ljpeg.frame_width * ljpeg.components;
        let frame_h = ljpeg.frame_height;

        // slice widths in samples; without the tag there is a single
        // slice covering the frame
        let slices: Vec<usize> = if let Some(entry) = raw.entry(CANON_CR2_SLICE) {
            let n = entry.get_u16(0)? as usize;
            let w = entry.get_u16(1)? as usize;
            let last_w = entry.get_u16(2)? as usize;
            if n == 0 || w == 0 || last_w == 0 || n * w + last_w != frame_samples {
                return Err(Error::Decoder(format!(
                    "CR2: slice layout {n}x{w}+{last_w} does not cover the frame ({frame_samples})"
                )));
            }
            let mut v = vec![w; n];
            v.push(last_w);
            v
        } else {
            vec![frame_samples]
        };

        let width = frame_samples;
        let height = frame_h;
        if width == 0 || height == 0 || width > 9000 || height > 7000 {
            return Err(Error::Decoder(format!(
                "CR2: unexpected image dimensions found: ({width}; {height})"
            )));
        }

        let mut image = RawImage::new_u16(Point::new(width, height), 1);
        image.create_data();

        // decode the whole frame, then spread the scan order into
        // the vertical slices
        let mut frame = vec![0_u16; frame_samples * frame_h];
        ljpeg.decompress_into(
            &mut frame,
            frame_samples,
            1,
            Point::new(frame_samples, frame_h),
            Point::default(),
            Point::new(frame_samples, frame_h),
        )?;

        let pitch = image.pitch_u16();
        let data = image.u16_data_mut();
        let mut jidx = 0_usize;
        for (i, slice_w) in slices.iter().enumerate() {
            let slice_x: usize = slices[..i].iter().sum();
            for row in 0..height {
                for col in 0..*slice_w {
                    data[row * pitch + slice_x + col] = frame[jidx];
                    jidx += 1;
                }
            }
        }
        Ok(image)
    }

    fn decode_metadata(&self, image: &mut RawImage, meta: &CameraMetaData) -> Result<()> {
        image.cfa = ColorFilterArray::rggb();
        let id = self.root.get_id()?;
        super::set_meta_data(image, meta, &id.make, &id.model, "", super::get_iso(&self.root))
    }
}
