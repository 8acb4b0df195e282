// SPDX-License-Identifier: LGPL-3.0-or-later
/*
 * rawspeed - parser.rs
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

//! Top level format identification.
//!
//! Sniffs the first bytes of the input, parses the container and
//! hands the file to the decoder claiming it. TIFF files resolve
//! through the decoder factory map: the DNG check (keyed on the
//! DNGVersion tag) runs first, then the make string selects the
//! vendor decoder. A make maps to exactly one decoder, so selection
//! is deterministic.

use crate::buffer::Buffer;
use crate::decoders::{self, RawDecoder};
use crate::tiff;
use crate::{Error, Result};

/// Magic for the FujiFilm RAF wrapper.
pub(crate) const RAF_MAGIC: &[u8] = b"FUJIFILMCCD-RAW ";

/// Identify `buffer` and return the decoder for it.
pub fn get_decoder<'a>(buffer: &'a Buffer) -> Result<Box<dyn RawDecoder<'a> + 'a>> {
    let data = buffer.as_ref();
    if data.len() < 16 {
        return Err(Error::Parse("file too small to identify".to_string()));
    }

    if data.starts_with(RAF_MAGIC) {
        return decoders::raf::RafDecoder::new(buffer).map(|d| Box::new(d) as _);
    }
    if data.starts_with(b"FOVb") {
        return decoders::x3f::X3fDecoder::new(buffer).map(|d| Box::new(d) as _);
    }
    if data.starts_with(b"\x00MRM") {
        return decoders::mrw::MrwDecoder::new(buffer).map(|d| Box::new(d) as _);
    }
    if data.starts_with(b"II\x1a\x00\x00\x00HEAPCCDR") {
        return decoders::ciff::CiffDecoder::new(buffer).map(|d| Box::new(d) as _);
    }
    if data.starts_with(b"II\x2a\x00") || data.starts_with(b"MM\x00\x2a") {
        let root = tiff::parse(data)?;
        return decoders::get_tiff_decoder(buffer, root);
    }

    Err(Error::Parse("unknown file format".to_string()))
}

#[cfg(test)]
mod test {
    use super::get_decoder;
    use crate::buffer::Buffer;
    use crate::Error;

    #[test]
    fn test_unknown_magic() {
        let buffer = Buffer::new(vec![0x42; 64]);
        assert!(matches!(get_decoder(&buffer), Err(Error::Parse(_))));
    }

    #[test]
    fn test_too_small() {
        let buffer = Buffer::new(vec![0x49, 0x49]);
        assert!(matches!(get_decoder(&buffer), Err(Error::Parse(_))));
    }
}
