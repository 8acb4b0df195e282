// SPDX-License-Identifier: LGPL-3.0-or-later
/*
 * rawspeed - tiff.rs
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

//! TIFF format (Image File Directories)
//!
//! Almost every RAW format is a TIFF variant. The tree of IFDs is
//! parsed eagerly and defensively: the file bytes are untrusted, so
//! every out of line value is bounds checked, a byte range is never
//! parsed twice, and the tree depth and fan out are limited.

mod entry;
mod ifd;
mod makernote;

pub use entry::{Entry, TagType};
pub use ifd::{Ifd, RootIfd, TiffId};

use crate::buffer::NoOverlapRanges;
use crate::bytestream::{ByteStream, Endian};
use crate::{Result, TiffError};

/// TIFF tags used by the decoders.
pub mod tags {
    pub const NEW_SUBFILE_TYPE: u16 = 0x00fe;
    pub const IMAGE_WIDTH: u16 = 0x0100;
    pub const IMAGE_LENGTH: u16 = 0x0101;
    pub const BITS_PER_SAMPLE: u16 = 0x0102;
    pub const COMPRESSION: u16 = 0x0103;
    pub const PHOTOMETRIC_INTERPRETATION: u16 = 0x0106;
    pub const MAKE: u16 = 0x010f;
    pub const MODEL: u16 = 0x0110;
    pub const STRIP_OFFSETS: u16 = 0x0111;
    pub const ORIENTATION: u16 = 0x0112;
    pub const SAMPLES_PER_PIXEL: u16 = 0x0115;
    pub const ROWS_PER_STRIP: u16 = 0x0116;
    pub const STRIP_BYTE_COUNTS: u16 = 0x0117;
    pub const SUB_IFDS: u16 = 0x014a;
    pub const TILE_WIDTH: u16 = 0x0142;
    pub const TILE_LENGTH: u16 = 0x0143;
    pub const TILE_OFFSETS: u16 = 0x0144;
    pub const TILE_BYTE_COUNTS: u16 = 0x0145;
    pub const SAMPLE_FORMAT: u16 = 0x0153;
    pub const CFA_REPEAT_PATTERN_DIM: u16 = 0x828d;
    pub const CFA_PATTERN: u16 = 0x828e;
    pub const EXIF_IFD: u16 = 0x8769;
    pub const ISO_SPEED_RATINGS: u16 = 0x8827;
    pub const MAKER_NOTE: u16 = 0x927c;
    pub const MAKER_NOTE_ALT: u16 = 0xc634;
    /// DNG 1.x marker, first byte is the spec major version.
    pub const DNG_VERSION: u16 = 0xc612;
    pub const LINEARIZATION_TABLE: u16 = 0xc618;
    pub const BLACK_LEVEL_REPEAT_DIM: u16 = 0xc619;
    pub const BLACK_LEVEL: u16 = 0xc61a;
    pub const WHITE_LEVEL: u16 = 0xc61d;
    pub const DEFAULT_CROP_ORIGIN: u16 = 0xc61f;
    pub const DEFAULT_CROP_SIZE: u16 = 0xc620;
    pub const ACTIVE_AREA: u16 = 0xc68d;
    pub const OPCODE_LIST1: u16 = 0xc740;
    pub const OPCODE_LIST2: u16 = 0xc741;
    pub const UNIQUE_CAMERA_MODEL: u16 = 0xc614;
    pub const AS_SHOT_NEUTRAL: u16 = 0xc628;
    pub const COLOR_MATRIX2: u16 = 0xc622;

    // Panasonic RW2 private tags
    pub const PANASONIC_SENSOR_WIDTH: u16 = 0x0002;
    pub const PANASONIC_SENSOR_HEIGHT: u16 = 0x0003;
    pub const PANASONIC_SENSOR_TOP_BORDER: u16 = 0x0004;
    pub const PANASONIC_SENSOR_LEFT_BORDER: u16 = 0x0005;
    pub const PANASONIC_IMAGE_HEIGHT: u16 = 0x0006;
    pub const PANASONIC_IMAGE_WIDTH: u16 = 0x0007;
    pub const PANASONIC_BITS_PER_SAMPLE: u16 = 0x000a;
    pub const PANASONIC_RAW_FORMAT: u16 = 0x002d;
    pub const PANASONIC_STRIP_OFFSET: u16 = 0x0118;
    pub const PANASONIC_RAW_DATA: u16 = 0x002e;
}

/// Read the endian marker and magic of a TIFF header at the cursor.
/// Returns the endian and the offset of IFD0.
pub(crate) fn parse_tiff_header(stream: &mut ByteStream) -> Result<(Endian, u32)> {
    let endian = match stream.get_bytes(2)? {
        b"II" => Endian::Little,
        b"MM" => Endian::Big,
        _ => {
            return Err(TiffError::BadEntry("not a TIFF byte order marker".to_string()).into());
        }
    };
    stream.set_endian(endian);
    if stream.get_u16()? != 0x002a {
        return Err(TiffError::BadEntry("wrong TIFF magic".to_string()).into());
    }
    let ifd0 = stream.get_u32()?;
    Ok((endian, ifd0))
}

/// Parse a complete TIFF structure: header, then every IFD on the
/// `next_ifd` chain, descending into sub IFDs and maker notes.
pub fn parse(buffer: &[u8]) -> Result<RootIfd> {
    let mut stream = ByteStream::new(buffer, Endian::Little);
    let (endian, ifd0_offset) = parse_tiff_header(&mut stream)?;

    let mut ranges = NoOverlapRanges::new();
    let mut ifds = Vec::new();
    let mut offset = ifd0_offset;
    while offset != 0 {
        let data = ByteStream::new(buffer, endian);
        let ifd = Ifd::parse(&data, offset, &mut ranges, 1)?;
        offset = ifd.next_ifd();
        ifds.push(ifd);
    }
    if ifds.is_empty() {
        return Err(TiffError::BadEntry("TIFF has no IFD".to_string()).into());
    }
    Ok(RootIfd::new(ifds, endian))
}

#[cfg(test)]
pub(crate) mod testutil {
    use super::tags;

    /// Build a minimal little endian TIFF in memory for tests.
    pub struct TiffBuilder {
        pub entries: Vec<(u16, u16, u32, Vec<u8>)>,
    }

    impl TiffBuilder {
        pub fn new() -> TiffBuilder {
            TiffBuilder {
                entries: Vec::new(),
            }
        }

        pub fn short(mut self, tag: u16, value: u16) -> Self {
            self.entries
                .push((tag, 3, 1, value.to_le_bytes().to_vec()));
            self
        }

        pub fn long(mut self, tag: u16, value: u32) -> Self {
            self.entries
                .push((tag, 4, 1, value.to_le_bytes().to_vec()));
            self
        }

        pub fn ascii(mut self, tag: u16, value: &str) -> Self {
            let mut bytes = value.as_bytes().to_vec();
            bytes.push(0);
            let count = bytes.len() as u32;
            self.entries.push((tag, 2, count, bytes));
            self
        }

        pub fn undefined(mut self, tag: u16, bytes: &[u8]) -> Self {
            self.entries
                .push((tag, 7, bytes.len() as u32, bytes.to_vec()));
            self
        }

        pub fn strip_image(self, width: u32, height: u32, data_offset: u32, byte_count: u32) -> Self {
            self.long(tags::IMAGE_WIDTH, width)
                .long(tags::IMAGE_LENGTH, height)
                .long(tags::STRIP_OFFSETS, data_offset)
                .long(tags::STRIP_BYTE_COUNTS, byte_count)
        }

        /// One raw entry with the given type value and 4 inline value
        /// bytes, serialized. For malformed entry tests.
        pub fn entries_raw(self, tag: u16, type_: u16, count: u32, inline: Vec<u8>) -> Vec<u8> {
            let mut out = vec![0x49, 0x49, 0x2a, 0x00, 8, 0, 0, 0];
            out.extend_from_slice(&1_u16.to_le_bytes());
            out.extend_from_slice(&tag.to_le_bytes());
            out.extend_from_slice(&type_.to_le_bytes());
            out.extend_from_slice(&count.to_le_bytes());
            let mut value = inline;
            value.resize(4, 0);
            out.extend_from_slice(&value);
            out.extend_from_slice(&0_u32.to_le_bytes());
            out
        }

        /// Serialize: header, IFD at offset 8, out of line data after.
        pub fn build(mut self) -> Vec<u8> {
            self.entries.sort_by_key(|e| e.0);
            let n = self.entries.len();
            let ifd_start = 8_u32;
            let data_start = ifd_start + 2 + 12 * n as u32 + 4;
            let mut out = vec![0x49, 0x49, 0x2a, 0x00, 8, 0, 0, 0];
            out.extend_from_slice(&(n as u16).to_le_bytes());
            let mut tail: Vec<u8> = Vec::new();
            for (tag, type_, count, bytes) in &self.entries {
                out.extend_from_slice(&tag.to_le_bytes());
                out.extend_from_slice(&type_.to_le_bytes());
                out.extend_from_slice(&count.to_le_bytes());
                if bytes.len() <= 4 {
                    let mut inline = bytes.clone();
                    inline.resize(4, 0);
                    out.extend_from_slice(&inline);
                } else {
                    let offset = data_start + tail.len() as u32;
                    out.extend_from_slice(&offset.to_le_bytes());
                    tail.extend_from_slice(bytes);
                }
            }
            // no next IFD
            out.extend_from_slice(&0_u32.to_le_bytes());
            out.extend_from_slice(&tail);
            out
        }
    }
}

#[cfg(test)]
mod test {
    use super::testutil::TiffBuilder;
    use super::{parse, tags};
    use crate::{Error, TiffError};

    #[test]
    fn test_parse_minimal() {
        let data = TiffBuilder::new()
            .ascii(tags::MAKE, "SONY")
            .ascii(tags::MODEL, " ILCE-7 ")
            .short(tags::IMAGE_WIDTH, 16)
            .build();
        let root = parse(&data).unwrap();
        let id = root.get_id().unwrap();
        assert_eq!(id.make, "SONY");
        // whitespace is trimmed
        assert_eq!(id.model, "ILCE-7");
        assert_eq!(
            root.get_entry_recursive(tags::IMAGE_WIDTH)
                .unwrap()
                .get_u32(0)
                .unwrap(),
            16
        );
    }

    #[test]
    fn test_bad_magic() {
        let data = b"II\x2b\x00\x08\x00\x00\x00".to_vec();
        assert!(matches!(parse(&data), Err(Error::Tiff(_))));
    }

    #[test]
    fn test_cyclic_ifd_chain() {
        // IFD0 at offset 8 whose next-IFD pointer loops back to 8
        let mut data = TiffBuilder::new().short(tags::IMAGE_WIDTH, 16).build();
        // next-IFD field sits right after the single 12 byte entry
        let next_pos = 8 + 2 + 12;
        data[next_pos..next_pos + 4].copy_from_slice(&8_u32.to_le_bytes());
        assert_eq!(parse(&data), Err(Error::Tiff(TiffError::CyclicIfd)));
    }

    #[test]
    fn test_sub_ifd_cycle() {
        // IFD0 lists a SubIFD at its own offset
        let data = TiffBuilder::new().long(tags::SUB_IFDS, 8).build();
        assert_eq!(parse(&data), Err(Error::Tiff(TiffError::CyclicIfd)));
    }
}
