// SPDX-License-Identifier: LGPL-3.0-or-later
/*
 * rawspeed - buffer.rs
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

//! The root byte buffer.
//!
//! The whole RAW file is memory resident before decoding starts.
//! Every stream and bit pump in the crate is a borrow of this buffer;
//! none of them copy pixel data.

use crate::{IoError, Result};

/// The input file bytes. All reads are bounds checked.
#[derive(Debug)]
pub struct Buffer {
    data: Vec<u8>,
}

impl Buffer {
    pub fn new(data: Vec<u8>) -> Buffer {
        Buffer { data }
    }

    /// Load a whole file. The caller usually maps or reads the file
    /// itself and uses [`Buffer::new`].
    pub fn from_file<P: AsRef<std::path::Path>>(path: P) -> Result<Buffer> {
        Ok(Buffer {
            data: std::fs::read(path)?,
        })
    }

    pub fn size(&self) -> usize {
        self.data.len()
    }

    /// A bounds checked view of `count` bytes at `offset`.
    pub fn get_data(&self, offset: usize, count: usize) -> Result<&[u8]> {
        if offset.checked_add(count).filter(|end| *end <= self.data.len()).is_none() {
            return Err(IoError::OutOfBounds.into());
        }
        Ok(&self.data[offset..offset + count])
    }
}

impl AsRef<[u8]> for Buffer {
    fn as_ref(&self) -> &[u8] {
        &self.data
    }
}

/// A set of non overlapping `[begin, end)` byte ranges.
///
/// The TIFF parser records every IFD byte range it enters here. A
/// malicious file that loops its IFD chain or nests an IFD inside an
/// already parsed one is caught by the overlap check instead of
/// recursing forever.
#[derive(Debug, Default)]
pub(crate) struct NoOverlapRanges {
    ranges: Vec<(u64, u64)>,
}

impl NoOverlapRanges {
    pub fn new() -> NoOverlapRanges {
        NoOverlapRanges::default()
    }

    /// Insert `[begin, end)`. Returns `false` if it overlaps any
    /// range already in the set, in which case nothing is inserted.
    pub fn insert(&mut self, begin: u64, end: u64) -> bool {
        if self.ranges.iter().any(|(b, e)| begin < *e && *b < end) {
            return false;
        }
        self.ranges.push((begin, end));
        true
    }
}

#[cfg(test)]
mod test {
    use super::{Buffer, NoOverlapRanges};
    use crate::{Error, IoError};

    #[test]
    fn test_bounds() {
        let buf = Buffer::new(vec![0xde, 0xad, 0xbe, 0xef]);
        assert_eq!(buf.size(), 4);
        assert_eq!(buf.get_data(0, 4).unwrap(), &[0xde, 0xad, 0xbe, 0xef]);
        assert_eq!(buf.get_data(2, 2).unwrap(), &[0xbe, 0xef]);
        assert_eq!(buf.get_data(2, 3), Err(Error::Io(IoError::OutOfBounds)));
        assert_eq!(buf.get_data(4, 1), Err(Error::Io(IoError::OutOfBounds)));
        // offset + count overflows
        assert_eq!(
            buf.get_data(usize::MAX, 2),
            Err(Error::Io(IoError::OutOfBounds))
        );
    }

    #[test]
    fn test_no_overlap_ranges() {
        let mut set = NoOverlapRanges::new();
        assert!(set.insert(0, 10));
        assert!(set.insert(10, 20));
        // same range again
        assert!(!set.insert(0, 10));
        // partial overlap on either side
        assert!(!set.insert(5, 12));
        assert!(!set.insert(19, 30));
        // nested
        assert!(!set.insert(2, 4));
        // disjoint
        assert!(set.insert(30, 40));
    }
}
