// SPDX-License-Identifier: LGPL-3.0-or-later
/*
 * rawspeed - tiff/ifd.rs
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

//! The IFD tree.
//!
//! IFDs form a tree with branches. A hostile file can produce
//! degenerate trees: loops through the `next_ifd` chain, IFDs nested
//! in themselves, or exponential fan out. The byte range of every
//! parsed IFD goes into a non overlapping range set and three hard
//! limits bound the tree shape.

use std::collections::BTreeMap;

use crate::buffer::NoOverlapRanges;
use crate::bytestream::{ByteStream, Endian};
use crate::tiff::{makernote, tags, Entry, TagType};
use crate::utils::trim_spaces;
use crate::{Result, TiffError};

/// How many layers of IFDs can there be? All real samples are fine
/// with 4; pad it by one.
const LIMIT_DEPTH: u32 = 4 + 1;
/// How many sub IFDs can one IFD have, not counting their children?
const LIMIT_SUB_IFDS: usize = 10;
/// How many sub IFDs can one IFD have, recursively?
const LIMIT_RECURSIVE_SUB_IFDS: usize = 28;

/// A single image file directory.
#[derive(Debug, PartialEq)]
pub struct Ifd<'a> {
    endian: Endian,
    entries: BTreeMap<u16, Entry<'a>>,
    pub sub_ifds: Vec<Ifd<'a>>,
    next_ifd: u32,
}

impl<'a> Ifd<'a> {
    pub(crate) fn new(endian: Endian) -> Ifd<'a> {
        Ifd {
            endian,
            entries: BTreeMap::new(),
            sub_ifds: Vec::new(),
            next_ifd: 0,
        }
    }

    /// Parse the IFD at `offset` in `data` (a stream over the root
    /// buffer). Descends into sub IFDs and maker notes.
    pub(crate) fn parse(
        data: &ByteStream<'a>,
        offset: u32,
        ranges: &mut NoOverlapRanges,
        depth: u32,
    ) -> Result<Ifd<'a>> {
        if depth > LIMIT_DEPTH {
            return Err(TiffError::LimitExceeded("IFD depth").into());
        }
        let mut stream = data.clone();
        stream.seek(offset as usize)?;
        let num_entries = stream.get_u16()?;
        let byte_size = 2 + 12 * u64::from(num_entries) + 4;
        if !ranges.insert(u64::from(offset), u64::from(offset) + byte_size) {
            return Err(TiffError::CyclicIfd.into());
        }

        let mut ifd = Ifd::new(data.endian());
        for _ in 0..num_entries {
            ifd.parse_entry(data, &mut stream, ranges, depth)?;
        }
        ifd.next_ifd = stream.get_u32()?;

        if ifd.recursive_sub_ifd_count() > LIMIT_RECURSIVE_SUB_IFDS {
            return Err(TiffError::LimitExceeded("recursive sub IFD count").into());
        }
        Ok(ifd)
    }

    fn parse_entry(
        &mut self,
        data: &ByteStream<'a>,
        stream: &mut ByteStream<'a>,
        ranges: &mut NoOverlapRanges,
        depth: u32,
    ) -> Result<()> {
        let tag = stream.get_u16()?;
        let type_value = stream.get_u16()?;
        let count = stream.get_u32()?;
        let tag_type = TagType::try_from(type_value).map_err(|_| {
            TiffError::BadEntry(format!("unknown type {type_value} for tag {tag:#06x}"))
        })?;
        let byte_size = tag_type.size() as u64 * u64::from(count);
        if byte_size > u64::from(u32::MAX) {
            return Err(TiffError::BadEntry(format!("count overflow for tag {tag:#06x}")).into());
        }
        let value = if byte_size <= 4 {
            // inline value, 4 bytes in the entry itself
            let inline = stream.position();
            stream.skip(4)?;
            data.sub_stream(inline, byte_size as usize)?
        } else {
            let value_offset = stream.get_u32()? as usize;
            data.sub_stream(value_offset, byte_size as usize).map_err(|_| {
                TiffError::BadEntry(format!("value of tag {tag:#06x} out of the file"))
            })?
        };
        let entry = Entry::new(tag, tag_type, count, value);

        match tag {
            tags::SUB_IFDS | tags::EXIF_IFD => {
                for i in 0..count {
                    let sub_offset = entry.get_u32(i)?;
                    self.add_sub_ifd(Ifd::parse(data, sub_offset, ranges, depth + 1)?)?;
                }
            }
            tags::MAKER_NOTE | tags::MAKER_NOTE_ALT => {
                // vendor junk must not break the whole file
                match makernote::parse(&entry, data, depth + 1) {
                    Ok(maker_ifd) => self.add_sub_ifd(maker_ifd)?,
                    Err(err) => log::warn!("maker note not parsed: {err}"),
                }
            }
            _ => {}
        }
        self.entries.insert(tag, entry);
        Ok(())
    }

    fn add_sub_ifd(&mut self, sub: Ifd<'a>) -> Result<()> {
        if self.sub_ifds.len() >= LIMIT_SUB_IFDS {
            return Err(TiffError::LimitExceeded("sub IFD count").into());
        }
        self.sub_ifds.push(sub);
        Ok(())
    }

    fn recursive_sub_ifd_count(&self) -> usize {
        self.sub_ifds.len()
            + self
                .sub_ifds
                .iter()
                .map(Ifd::recursive_sub_ifd_count)
                .sum::<usize>()
    }

    pub fn endian(&self) -> Endian {
        self.endian
    }

    pub(crate) fn next_ifd(&self) -> u32 {
        self.next_ifd
    }

    pub fn num_entries(&self) -> usize {
        self.entries.len()
    }

    pub fn entry(&self, tag: u16) -> Option<&Entry<'a>> {
        self.entries.get(&tag)
    }

    pub fn has_entry(&self, tag: u16) -> bool {
        self.entries.contains_key(&tag)
    }

    /// First entry for `tag` in pre-order.
    pub fn get_entry_recursive(&self, tag: u16) -> Option<&Entry<'a>> {
        self.entry(tag)
            .or_else(|| self.sub_ifds.iter().find_map(|sub| sub.get_entry_recursive(tag)))
    }

    /// Every IFD of this subtree with `tag`, pre-order.
    pub fn get_ifds_with_tag(&self, tag: u16) -> Vec<&Ifd<'a>> {
        let mut result = Vec::new();
        self.collect_ifds_with_tag(tag, &mut result);
        result
    }

    fn collect_ifds_with_tag<'s>(&'s self, tag: u16, result: &mut Vec<&'s Ifd<'a>>) {
        if self.has_entry(tag) {
            result.push(self);
        }
        for sub in &self.sub_ifds {
            sub.collect_ifds_with_tag(tag, result);
        }
    }

    /// A required entry; absence is a hard error.
    pub fn required_entry(&self, tag: u16) -> Result<&Entry<'a>> {
        self.entry(tag).ok_or_else(|| TiffError::MissingTag(tag).into())
    }
}

/// The make and model identifying the camera, trimmed.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct TiffId {
    pub make: String,
    pub model: String,
}

/// The parsed TIFF structure: the chained top level IFDs.
#[derive(Debug, PartialEq)]
pub struct RootIfd<'a> {
    ifds: Vec<Ifd<'a>>,
    endian: Endian,
}

impl<'a> RootIfd<'a> {
    pub(crate) fn new(ifds: Vec<Ifd<'a>>, endian: Endian) -> RootIfd<'a> {
        RootIfd { ifds, endian }
    }

    pub fn endian(&self) -> Endian {
        self.endian
    }

    pub fn ifds(&self) -> &[Ifd<'a>] {
        &self.ifds
    }

    pub fn ifd(&self, index: usize) -> Option<&Ifd<'a>> {
        self.ifds.get(index)
    }

    pub fn get_entry_recursive(&self, tag: u16) -> Option<&Entry<'a>> {
        self.ifds.iter().find_map(|ifd| ifd.get_entry_recursive(tag))
    }

    pub fn get_ifds_with_tag(&self, tag: u16) -> Vec<&Ifd<'a>> {
        let mut result = Vec::new();
        for ifd in &self.ifds {
            ifd.collect_ifds_with_tag(tag, &mut result);
        }
        result
    }

    /// The `index`-th IFD carrying `tag`, pre-order.
    pub fn get_ifd_with_tag(&self, tag: u16, index: usize) -> Option<&Ifd<'a>> {
        self.get_ifds_with_tag(tag).into_iter().nth(index)
    }

    pub fn has_entry_recursive(&self, tag: u16) -> bool {
        self.get_entry_recursive(tag).is_some()
    }

    /// The `(make, model)` pair, whitespace trimmed.
    pub fn get_id(&self) -> Result<TiffId> {
        let make = self
            .get_entry_recursive(tags::MAKE)
            .ok_or(TiffError::MissingTag(tags::MAKE))?
            .get_string()?;
        let model = self
            .get_entry_recursive(tags::MODEL)
            .ok_or(TiffError::MissingTag(tags::MODEL))?
            .get_string()?;
        Ok(TiffId {
            make: trim_spaces(&make),
            model: trim_spaces(&model),
        })
    }
}

#[cfg(test)]
mod test {
    use crate::tiff::testutil::TiffBuilder;
    use crate::tiff::{parse, tags};
    use crate::{Error, TiffError};

    #[test]
    fn test_sub_ifd_descent() {
        // main IFD with a SubIFDs entry pointing at a second IFD
        let mut data = TiffBuilder::new()
            .long(tags::SUB_IFDS, 0) // patched below
            .ascii(tags::MAKE, "FUJIFILM")
            .build();
        let sub_start = data.len() as u32;
        // sub IFD: one SHORT entry
        let mut sub = Vec::new();
        sub.extend_from_slice(&1_u16.to_le_bytes());
        sub.extend_from_slice(&tags::IMAGE_WIDTH.to_le_bytes());
        sub.extend_from_slice(&3_u16.to_le_bytes());
        sub.extend_from_slice(&1_u32.to_le_bytes());
        sub.extend_from_slice(&640_u32.to_le_bytes());
        sub.extend_from_slice(&0_u32.to_le_bytes());
        data.extend_from_slice(&sub);
        // patch the SubIFDs value (first entry, sorted by tag 0x014a
        // comes after nothing -- find it: entry area starts at 10)
        // entries are sorted by tag: 0x010f (MAKE) first, 0x014a second
        let value_pos = 10 + 12 + 8;
        data[value_pos..value_pos + 4].copy_from_slice(&sub_start.to_le_bytes());

        let root = parse(&data).unwrap();
        assert_eq!(root.ifd(0).unwrap().sub_ifds.len(), 1);
        let found = root.get_ifds_with_tag(tags::IMAGE_WIDTH);
        assert_eq!(found.len(), 1);
        assert_eq!(
            root.get_entry_recursive(tags::IMAGE_WIDTH)
                .unwrap()
                .get_u32(0)
                .unwrap(),
            640
        );
    }

    #[test]
    fn test_unknown_entry_type_fails() {
        let data = TiffBuilder::new().entries_raw(0x0100, 0x00ff, 1, vec![0, 0, 0, 0]);
        assert!(matches!(
            parse(&data),
            Err(Error::Tiff(TiffError::BadEntry(_)))
        ));
    }

    #[test]
    fn test_out_of_file_value_fails() {
        // LONG count 100 at offset way past the end
        let data = TiffBuilder::new().entries_raw(0x0100, 4, 100, 0xdead_0000_u32.to_le_bytes().to_vec());
        assert!(matches!(
            parse(&data),
            Err(Error::Tiff(TiffError::BadEntry(_)))
        ));
    }
}
