// SPDX-License-Identifier: LGPL-3.0-or-later
/*
 * rawspeed - tiff/makernote.rs
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

//! Maker note parsing.
//!
//! Maker notes are vendor sub containers behind tag 0x927C. Each
//! known vendor header selects a byte order override and an offset
//! adjustment; the remainder is a standard IFD. Vendors disagree on
//! whether value offsets are relative to the note or to the file, so
//! the IFD is parsed either over the note bytes or over the root
//! buffer.

use crate::buffer::NoOverlapRanges;
use crate::bytestream::{ByteStream, Endian};
use crate::tiff::{parse_tiff_header, Entry, Ifd};
use crate::{Result, TiffError};

fn note_endian(bytes: &[u8]) -> Endian {
    if bytes.len() >= 2 && &bytes[..2] == b"MM" {
        Endian::Big
    } else {
        Endian::Little
    }
}

/// Parse one IFD rooted at `data[offset..]` with a fresh cycle set.
fn parse_ifd_at<'a>(data: ByteStream<'a>, offset: u32, depth: u32) -> Result<Ifd<'a>> {
    let mut ranges = NoOverlapRanges::new();
    Ifd::parse(&data, offset, &mut ranges, depth)
}

/// Parse the maker note in `entry`. `root` is the stream over the
/// whole file, used by the vendors whose value offsets are file
/// absolute.
pub(crate) fn parse<'a>(
    entry: &Entry<'a>,
    root: &ByteStream<'a>,
    depth: u32,
) -> Result<Ifd<'a>> {
    let note = entry.data();
    let bytes = note.full_buffer();
    if bytes.len() < 16 {
        return Err(TiffError::BadEntry("maker note too short".to_string()).into());
    }
    // Where the note sits in the file, for the absolute offset
    // vendors. Both slices borrow the same root buffer.
    let note_offset = bytes.as_ptr() as usize - root.full_buffer().as_ptr() as usize;

    if bytes.starts_with(b"Nikon\x00") {
        // a complete TIFF container at offset 10
        let mut inner = note.sub_stream(10, bytes.len() - 10)?;
        let (endian, ifd0) = parse_tiff_header(&mut inner)?;
        return parse_ifd_at(ByteStream::new(inner.full_buffer(), endian), ifd0, depth);
    }
    if bytes.starts_with(b"OLYMPUS\x00") {
        // note relative offsets
        let endian = note_endian(&bytes[8..]);
        return parse_ifd_at(ByteStream::new(bytes, endian), 12, depth);
    }
    if bytes.starts_with(b"OLYMP\x00") {
        // old style: entries follow the header, offsets are absolute
        let data = ByteStream::new(root.full_buffer(), root.endian());
        return parse_ifd_at(data, (note_offset + 8) as u32, depth);
    }
    if bytes.starts_with(b"FUJIFILM") {
        // always little endian, IFD offset at 8, note relative
        let mut s = ByteStream::new(bytes, Endian::Little);
        s.seek(8)?;
        let ifd_offset = s.get_u32()?;
        return parse_ifd_at(ByteStream::new(bytes, Endian::Little), ifd_offset, depth);
    }
    if bytes.starts_with(b"AOC\x00") {
        // Pentax old: byte order at 4, offsets absolute
        let endian = note_endian(&bytes[4..]);
        let data = ByteStream::new(root.full_buffer(), endian);
        return parse_ifd_at(data, (note_offset + 6) as u32, depth);
    }
    if bytes.starts_with(b"PENTAX ") {
        // Pentax new: byte order at 8, offsets note relative
        let endian = note_endian(&bytes[8..]);
        return parse_ifd_at(ByteStream::new(bytes, endian), 10, depth);
    }
    if bytes.starts_with(b"Panasonic\x00\x00\x00") {
        let data = ByteStream::new(root.full_buffer(), Endian::Little);
        return parse_ifd_at(data, (note_offset + 12) as u32, depth);
    }
    if bytes.starts_with(b"SONY DSC \x00\x00\x00") || bytes.starts_with(b"SONY CAM \x00\x00\x00") {
        let data = ByteStream::new(root.full_buffer(), root.endian());
        return parse_ifd_at(data, (note_offset + 12) as u32, depth);
    }

    // No header (Canon and others): a plain IFD with file absolute
    // offsets right at the entry position.
    let data = ByteStream::new(root.full_buffer(), root.endian());
    parse_ifd_at(data, note_offset as u32, depth)
}

#[cfg(test)]
mod test {
    use crate::bytestream::{ByteStream, Endian};
    use crate::tiff::{Entry, TagType};

    fn ifd_one_short(tag: u16, value: u16) -> Vec<u8> {
        let mut out = Vec::new();
        out.extend_from_slice(&1_u16.to_le_bytes());
        out.extend_from_slice(&tag.to_le_bytes());
        out.extend_from_slice(&3_u16.to_le_bytes());
        out.extend_from_slice(&1_u32.to_le_bytes());
        out.extend_from_slice(&u32::from(value).to_le_bytes());
        out.extend_from_slice(&0_u32.to_le_bytes());
        out
    }

    #[test]
    fn test_fujifilm_note() {
        // "FUJIFILM" + IFD offset 12, then the IFD
        let mut note = b"FUJIFILM".to_vec();
        note.extend_from_slice(&12_u32.to_le_bytes());
        note.extend_from_slice(&ifd_one_short(0x1301, 7));
        let root = ByteStream::new(&note, Endian::Little);
        let entry = Entry::new(
            0x927c,
            TagType::Undefined,
            note.len() as u32,
            root.clone(),
        );
        let ifd = super::parse(&entry, &root, 2).unwrap();
        assert_eq!(ifd.entry(0x1301).unwrap().get_u16(0), Ok(7));
    }

    #[test]
    fn test_headerless_note() {
        // a bare IFD, parsed at its absolute position
        let note = ifd_one_short(0x0001, 2);
        let root = ByteStream::new(&note, Endian::Little);
        let entry = Entry::new(
            0x927c,
            TagType::Undefined,
            note.len() as u32,
            root.clone(),
        );
        let ifd = super::parse(&entry, &root, 2).unwrap();
        assert_eq!(ifd.entry(0x0001).unwrap().get_u16(0), Ok(2));
    }
}
