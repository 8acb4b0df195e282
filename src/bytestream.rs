// SPDX-License-Identifier: LGPL-3.0-or-later
/*
 * rawspeed - bytestream.rs
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

//! Endian aware byte stream over a borrowed buffer.

use byteorder::{BigEndian, ByteOrder, LittleEndian};

use crate::{IoError, Result};

/// Endian of a stream or container.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Endian {
    Big,
    Little,
}

impl Endian {
    /// The endian of the host.
    pub fn host() -> Endian {
        if cfg!(target_endian = "little") {
            Endian::Little
        } else {
            Endian::Big
        }
    }
}

/// A cursor over a borrowed byte slice with a fixed endianness for
/// multi byte reads. Reading past the end fails with
/// [`IoError::PastEnd`]; nothing is ever read outside the slice.
#[derive(Clone, Debug, PartialEq)]
pub struct ByteStream<'a> {
    data: &'a [u8],
    pos: usize,
    endian: Endian,
}

macro_rules! get_impl {
    ($get:ident, $peek:ident, $ty:ty, $le_read:ident, $be_read:ident) => {
        pub fn $peek(&self) -> Result<$ty> {
            const N: usize = std::mem::size_of::<$ty>();
            let bytes = self.peek_bytes(N)?;
            Ok(match self.endian {
                Endian::Little => LittleEndian::$le_read(bytes),
                Endian::Big => BigEndian::$be_read(bytes),
            })
        }

        pub fn $get(&mut self) -> Result<$ty> {
            let v = self.$peek()?;
            self.pos += std::mem::size_of::<$ty>();
            Ok(v)
        }
    };
}

impl<'a> ByteStream<'a> {
    pub fn new(data: &'a [u8], endian: Endian) -> ByteStream<'a> {
        ByteStream {
            data,
            pos: 0,
            endian,
        }
    }

    pub fn endian(&self) -> Endian {
        self.endian
    }

    pub fn set_endian(&mut self, endian: Endian) {
        self.endian = endian;
    }

    pub fn position(&self) -> usize {
        self.pos
    }

    pub fn size(&self) -> usize {
        self.data.len()
    }

    pub fn remaining(&self) -> usize {
        self.data.len() - self.pos
    }

    /// Reposition the cursor. `pos` may be one past the last byte.
    pub fn seek(&mut self, pos: usize) -> Result<()> {
        if pos > self.data.len() {
            return Err(IoError::PastEnd.into());
        }
        self.pos = pos;
        Ok(())
    }

    pub fn skip(&mut self, n: usize) -> Result<()> {
        if n > self.remaining() {
            return Err(IoError::PastEnd.into());
        }
        self.pos += n;
        Ok(())
    }

    /// The whole underlying slice, ignoring the cursor.
    pub fn full_buffer(&self) -> &'a [u8] {
        self.data
    }

    pub fn peek_bytes(&self, n: usize) -> Result<&'a [u8]> {
        if n > self.remaining() {
            return Err(IoError::PastEnd.into());
        }
        Ok(&self.data[self.pos..self.pos + n])
    }

    pub fn get_bytes(&mut self, n: usize) -> Result<&'a [u8]> {
        let bytes = self.peek_bytes(n)?;
        self.pos += n;
        Ok(bytes)
    }

    pub fn peek_u8(&self) -> Result<u8> {
        self.peek_bytes(1).map(|b| b[0])
    }

    pub fn get_u8(&mut self) -> Result<u8> {
        let b = self.peek_u8()?;
        self.pos += 1;
        Ok(b)
    }

    get_impl!(get_u16, peek_u16, u16, read_u16, read_u16);
    get_impl!(get_u32, peek_u32, u32, read_u32, read_u32);
    get_impl!(get_u64, peek_u64, u64, read_u64, read_u64);
    get_impl!(get_i16, peek_i16, i16, read_i16, read_i16);
    get_impl!(get_i32, peek_i32, i32, read_i32, read_i32);
    get_impl!(get_f32, peek_f32, f32, read_f32, read_f32);
    get_impl!(get_f64, peek_f64, f64, read_f64, read_f64);

    /// A sub stream over `[offset, offset + len)` of the underlying
    /// slice, with the cursor at 0. Endianness is inherited.
    pub fn sub_stream(&self, offset: usize, len: usize) -> Result<ByteStream<'a>> {
        if offset.checked_add(len).filter(|end| *end <= self.data.len()).is_none() {
            return Err(IoError::OutOfBounds.into());
        }
        Ok(ByteStream {
            data: &self.data[offset..offset + len],
            pos: 0,
            endian: self.endian,
        })
    }

    /// The rest of the stream from the cursor as a new stream.
    pub fn tail_stream(&self) -> ByteStream<'a> {
        ByteStream {
            data: &self.data[self.pos..],
            pos: 0,
            endian: self.endian,
        }
    }
}

#[cfg(test)]
mod test {
    use super::{ByteStream, Endian};
    use crate::{Error, IoError};

    #[test]
    fn test_get_le() {
        // little endian reads and the past-end failure
        let buf = [0xde_u8, 0xad, 0xbe, 0xef];
        let mut stream = ByteStream::new(&buf, Endian::Little);
        assert_eq!(stream.get_u16(), Ok(0xadde));
        assert_eq!(stream.get_u16(), Ok(0xefbe));
        assert_eq!(stream.get_u8(), Err(Error::Io(IoError::PastEnd)));
    }

    #[test]
    fn test_get_be() {
        let buf = [0x12_u8, 0x34, 0x56, 0x78];
        let mut stream = ByteStream::new(&buf, Endian::Big);
        assert_eq!(stream.get_u32(), Ok(0x12345678));
        assert_eq!(stream.remaining(), 0);
    }

    #[test]
    fn test_sub_stream() {
        let buf = [0_u8, 1, 2, 3, 4, 5, 6, 7];
        let stream = ByteStream::new(&buf, Endian::Little);
        let mut sub = stream.sub_stream(4, 2).unwrap();
        assert_eq!(sub.get_u16(), Ok(0x0504));
        assert_eq!(sub.remaining(), 0);
        assert!(stream.sub_stream(6, 4).is_err());
    }

    #[test]
    fn test_endian_round_trip() {
        // serializing then reading back is the identity, both orders
        let mut bytes = Vec::new();
        bytes.extend_from_slice(&0x1234_u16.to_be_bytes());
        bytes.extend_from_slice(&0xdead_beef_u32.to_be_bytes());
        bytes.extend_from_slice(&0x0123_4567_89ab_cdef_u64.to_be_bytes());
        bytes.extend_from_slice(&1.5_f32.to_be_bytes());
        bytes.extend_from_slice(&(-2.25_f64).to_be_bytes());
        let mut stream = ByteStream::new(&bytes, Endian::Big);
        assert_eq!(stream.get_u16(), Ok(0x1234));
        assert_eq!(stream.get_u32(), Ok(0xdead_beef));
        assert_eq!(stream.get_u64(), Ok(0x0123_4567_89ab_cdef));
        assert_eq!(stream.get_f32(), Ok(1.5));
        assert_eq!(stream.get_f64(), Ok(-2.25));

        let mut bytes = Vec::new();
        bytes.extend_from_slice(&0x1234_u16.to_le_bytes());
        bytes.extend_from_slice(&1.5_f32.to_le_bytes());
        let mut stream = ByteStream::new(&bytes, Endian::Little);
        assert_eq!(stream.get_u16(), Ok(0x1234));
        assert_eq!(stream.get_f32(), Ok(1.5));
    }

    #[test]
    fn test_peek_does_not_advance() {
        let buf = [0xaa_u8, 0xbb];
        let mut stream = ByteStream::new(&buf, Endian::Big);
        assert_eq!(stream.peek_u16(), Ok(0xaabb));
        assert_eq!(stream.position(), 0);
        assert_eq!(stream.get_u16(), Ok(0xaabb));
        assert_eq!(stream.position(), 2);
    }
}
