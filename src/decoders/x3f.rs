// SPDX-License-Identifier: LGPL-3.0-or-later
/*
 * rawspeed - decoders/x3f.rs
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

//! Sigma X3F container recognition.
//!
//! The file is identified and the section directory validated; the
//! Foveon payload decoders are not part of this crate, so decoding
//! reports a precise unsupported error instead of guessing.

use crate::buffer::Buffer;
use crate::bytestream::{ByteStream, Endian};
use crate::metadata::CameraMetaData;
use crate::rawimage::RawImage;
use crate::{Error, Result};

use super::RawDecoder;

pub(crate) struct X3fDecoder<'a> {
    #[allow(dead_code)]
    buffer: &'a Buffer,
    version: u32,
}

impl<'a> X3fDecoder<'a> {
    pub fn new(buffer: &'a Buffer) -> Result<X3fDecoder<'a>> {
        let mut stream = ByteStream::new(buffer.as_ref(), Endian::Little);
        if stream.get_bytes(4)? != b"FOVb" {
            return Err(Error::Parse("not an X3F file".to_string()));
        }
        let version = stream.get_u32()?;
        // the section directory pointer sits in the last 4 bytes
        let size = buffer.size();
        if size < 8 {
            return Err(Error::Parse("X3F too short".to_string()));
        }
        let mut tail = ByteStream::new(buffer.get_data(size - 4, 4)?, Endian::Little);
        let dir_offset = tail.get_u32()? as usize;
        if dir_offset + 8 > size {
            return Err(Error::Parse("X3F section directory out of file".to_string()));
        }
        let mut dir = ByteStream::new(buffer.get_data(dir_offset, 8)?, Endian::Little);
        if dir.get_bytes(4)? != b"SECd" {
            return Err(Error::Parse("X3F section directory not found".to_string()));
        }
        Ok(X3fDecoder { buffer, version })
    }
}

impl<'a> RawDecoder<'a> for X3fDecoder<'a> {
    fn check_support(&self, _meta: &CameraMetaData) -> Result<()> {
        Err(Error::UnsupportedCamera(format!(
            "Sigma X3F (version {:#x})",
            self.version
        )))
    }

    fn decode_raw(&self, _meta: &CameraMetaData) -> Result<RawImage> {
        Err(Error::Decoder(
            "X3F: the Foveon decompressors are not supported".to_string(),
        ))
    }

    fn decode_metadata(&self, _image: &mut RawImage, _meta: &CameraMetaData) -> Result<()> {
        Ok(())
    }
}
