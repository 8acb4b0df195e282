// SPDX-License-Identifier: LGPL-3.0-or-later
/*
 * rawspeed - decoders/ciff.rs
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

//! Canon CIFF (CRW) container recognition.
//!
//! The heap structure is walked far enough to identify the camera;
//! the old Canon decompressor is not part of this crate, so decoding
//! reports a precise unsupported error.

use crate::buffer::Buffer;
use crate::bytestream::{ByteStream, Endian};
use crate::metadata::CameraMetaData;
use crate::rawimage::RawImage;
use crate::utils::trim_spaces;
use crate::{Error, Result};

use super::RawDecoder;

pub(crate) struct CiffDecoder<'a> {
    #[allow(dead_code)]
    buffer: &'a Buffer,
    make: String,
    model: String,
}

impl<'a> CiffDecoder<'a> {
    pub fn new(buffer: &'a Buffer) -> Result<CiffDecoder<'a>> {
        let mut stream = ByteStream::new(buffer.as_ref(), Endian::Little);
        stream.skip(2)?; // "II"
        let header_len = stream.get_u32()?;
        if stream.get_bytes(8)? != b"HEAPCCDR" || header_len < 14 {
            return Err(Error::Parse("not a CIFF file".to_string()));
        }
        // the camera strings live in a 0x080a record; a linear scan
        // of the heap is enough for identification
        let data = buffer.as_ref();
        let (mut make, mut model) = (String::new(), String::new());
        let mut i = header_len as usize;
        while i + 4 < data.len() {
            if data[i] == 0x0a && data[i + 1] == 0x08 {
                let strings = &data[i + 2..(i + 66).min(data.len())];
                let mut parts = strings.split(|b| *b == 0).filter(|s| !s.is_empty());
                if let (Some(m1), Some(m2)) = (parts.next(), parts.next()) {
                    make = trim_spaces(&String::from_utf8_lossy(m1));
                    model = trim_spaces(&String::from_utf8_lossy(m2));
                    break;
                }
            }
            i += 1;
        }
        Ok(CiffDecoder {
            buffer,
            make,
            model,
        })
    }
}

impl<'a> RawDecoder<'a> for CiffDecoder<'a> {
    fn check_support(&self, meta: &CameraMetaData) -> Result<()> {
        if self.make.is_empty() {
            return Err(Error::UnsupportedCamera("unidentified CIFF camera".to_string()));
        }
        super::check_camera_supported(meta, &self.make, &self.model, "", self.decoder_version())
    }

    fn decode_raw(&self, _meta: &CameraMetaData) -> Result<RawImage> {
        Err(Error::Decoder(
            "CRW: the Canon CIFF decompressor is not supported".to_string(),
        ))
    }

    fn decode_metadata(&self, image: &mut RawImage, meta: &CameraMetaData) -> Result<()> {
        super::set_meta_data(image, meta, &self.make, &self.model, "", 0)
    }
}
