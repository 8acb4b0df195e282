// SPDX-License-Identifier: LGPL-3.0-or-later
/*
 * rawspeed - tiff/entry.rs
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

//! A single IFD entry and its typed accessors.

use num_enum::TryFromPrimitive;

use crate::bytestream::ByteStream;
use crate::{Result, TiffError};

/// Tag data type. RATIONALs are the ratio of two 32 bit integers.
#[derive(Clone, Copy, Debug, PartialEq, Eq, TryFromPrimitive)]
#[repr(u16)]
pub enum TagType {
    /// 8 bit unsigned
    Byte = 1,
    /// 8 bit bytes with the last byte null
    Ascii = 2,
    /// 16 bit unsigned
    Short = 3,
    /// 32 bit unsigned
    Long = 4,
    /// Two LONGs, numerator then denominator
    Rational = 5,
    /// 8 bit signed
    SByte = 6,
    /// Untyped 8 bit data
    Undefined = 7,
    /// 16 bit signed
    SShort = 8,
    /// 32 bit signed
    SLong = 9,
    /// Two SLONGs
    SRational = 10,
    /// 32 bit IEEE float
    Float = 11,
    /// 64 bit IEEE float
    Double = 12,
    /// 32 bit unsigned offset, used for IFDs
    Offset = 13,
}

impl TagType {
    /// Element size in bytes.
    pub fn size(self) -> usize {
        match self {
            Self::Byte | Self::Ascii | Self::SByte | Self::Undefined => 1,
            Self::Short | Self::SShort => 2,
            Self::Long | Self::SLong | Self::Float | Self::Offset => 4,
            Self::Rational | Self::SRational | Self::Double => 8,
        }
    }
}

/// One IFD entry. `data` is a stream over the value bytes, inline or
/// out of line, with the container's endianness.
#[derive(Clone, Debug, PartialEq)]
pub struct Entry<'a> {
    pub tag: u16,
    pub tag_type: TagType,
    pub count: u32,
    data: ByteStream<'a>,
}

macro_rules! checked_get {
    ($self:ident, $index:ident, $size:expr, $read:ident) => {{
        $self.check_index($index)?;
        let mut s = $self.data.clone();
        s.skip($index as usize * $size)?;
        Ok(s.$read()?)
    }};
}

impl<'a> Entry<'a> {
    pub fn new(tag: u16, tag_type: TagType, count: u32, data: ByteStream<'a>) -> Entry<'a> {
        Entry {
            tag,
            tag_type,
            count,
            data,
        }
    }

    /// The value bytes.
    pub fn data(&self) -> ByteStream<'a> {
        self.data.clone()
    }

    pub fn byte_size(&self) -> usize {
        self.tag_type.size() * self.count as usize
    }

    pub fn is_int(&self) -> bool {
        matches!(
            self.tag_type,
            TagType::Byte | TagType::Short | TagType::Long | TagType::Offset
        )
    }

    fn check_index(&self, index: u32) -> Result<()> {
        if index >= self.count {
            return Err(TiffError::BadEntry(format!(
                "index {index} out of range for tag {:#06x} count {}",
                self.tag, self.count
            ))
            .into());
        }
        Ok(())
    }

    fn type_mismatch<T>(&self, wanted: &str) -> Result<T> {
        Err(TiffError::BadEntry(format!(
            "tag {:#06x} has type {:?}, wanted {wanted}",
            self.tag, self.tag_type
        ))
        .into())
    }

    pub fn get_byte(&self, index: u32) -> Result<u8> {
        match self.tag_type {
            TagType::Byte | TagType::Undefined | TagType::Ascii => {
                self.check_index(index)?;
                let mut s = self.data.clone();
                s.skip(index as usize)?;
                Ok(s.get_u8()?)
            }
            _ => self.type_mismatch("BYTE"),
        }
    }

    pub fn get_u16(&self, index: u32) -> Result<u16> {
        match self.tag_type {
            TagType::Byte | TagType::Undefined => self.get_byte(index).map(u16::from),
            TagType::Short => checked_get!(self, index, 2, get_u16),
            _ => self.type_mismatch("SHORT"),
        }
    }

    pub fn get_u32(&self, index: u32) -> Result<u32> {
        match self.tag_type {
            TagType::Byte | TagType::Undefined => self.get_byte(index).map(u32::from),
            TagType::Short => self.get_u16(index).map(u32::from),
            TagType::Long | TagType::Offset => checked_get!(self, index, 4, get_u32),
            _ => self.type_mismatch("LONG"),
        }
    }

    pub fn get_i16(&self, index: u32) -> Result<i16> {
        match self.tag_type {
            TagType::SShort => checked_get!(self, index, 2, get_i16),
            TagType::Byte | TagType::Short => self.get_u16(index).map(|v| v as i16),
            _ => self.type_mismatch("SSHORT"),
        }
    }

    pub fn get_i32(&self, index: u32) -> Result<i32> {
        match self.tag_type {
            TagType::SLong => checked_get!(self, index, 4, get_i32),
            TagType::SShort => self.get_i16(index).map(i32::from),
            TagType::Byte | TagType::Short | TagType::Long | TagType::Offset => {
                self.get_u32(index).map(|v| v as i32)
            }
            _ => self.type_mismatch("SLONG"),
        }
    }

    pub fn get_float(&self, index: u32) -> Result<f32> {
        match self.tag_type {
            TagType::Float => checked_get!(self, index, 4, get_f32),
            TagType::Double => {
                self.check_index(index)?;
                let mut s = self.data.clone();
                s.skip(index as usize * 8)?;
                Ok(s.get_f64()? as f32)
            }
            TagType::Rational => {
                self.check_index(index)?;
                let mut s = self.data.clone();
                s.skip(index as usize * 8)?;
                let num = s.get_u32()?;
                let den = s.get_u32()?;
                Ok(if den == 0 {
                    0.0
                } else {
                    num as f32 / den as f32
                })
            }
            TagType::SRational => {
                self.check_index(index)?;
                let mut s = self.data.clone();
                s.skip(index as usize * 8)?;
                let num = s.get_i32()?;
                let den = s.get_i32()?;
                Ok(if den == 0 {
                    0.0
                } else {
                    num as f32 / den as f32
                })
            }
            _ if self.is_int() => self.get_u32(index).map(|v| v as f32),
            _ => self.type_mismatch("FLOAT"),
        }
    }

    /// The value as a string, up to the first nul.
    pub fn get_string(&self) -> Result<String> {
        if self.tag_type != TagType::Ascii && self.tag_type != TagType::Byte {
            return self.type_mismatch("ASCII");
        }
        let bytes = self.data.clone().get_bytes(self.count as usize)?;
        let end = bytes.iter().position(|b| *b == 0).unwrap_or(bytes.len());
        Ok(String::from_utf8_lossy(&bytes[..end]).to_string())
    }

    pub fn get_u16_array(&self) -> Result<Vec<u16>> {
        (0..self.count).map(|i| self.get_u16(i)).collect()
    }

    pub fn get_u32_array(&self) -> Result<Vec<u32>> {
        (0..self.count).map(|i| self.get_u32(i)).collect()
    }

    pub fn get_float_array(&self) -> Result<Vec<f32>> {
        (0..self.count).map(|i| self.get_float(i)).collect()
    }
}

#[cfg(test)]
mod test {
    use super::{Entry, TagType};
    use crate::bytestream::{ByteStream, Endian};

    #[test]
    fn test_typed_access() {
        let bytes = [0x10_u8, 0x00, 0x20, 0x00];
        let entry = Entry::new(
            0x0100,
            TagType::Short,
            2,
            ByteStream::new(&bytes, Endian::Little),
        );
        assert_eq!(entry.get_u16(0), Ok(0x10));
        assert_eq!(entry.get_u16(1), Ok(0x20));
        assert_eq!(entry.get_u32(1), Ok(0x20));
        // index out of range
        assert!(entry.get_u16(2).is_err());
        // wrong type
        assert!(entry.get_string().is_err());
    }

    #[test]
    fn test_string() {
        let bytes = b"PENTAX\x00junk";
        let entry = Entry::new(
            0x0110,
            TagType::Ascii,
            7,
            ByteStream::new(bytes, Endian::Little),
        );
        assert_eq!(entry.get_string().unwrap(), "PENTAX");
    }

    #[test]
    fn test_rational_as_float() {
        let mut bytes = Vec::new();
        bytes.extend_from_slice(&3_u32.to_be_bytes());
        bytes.extend_from_slice(&2_u32.to_be_bytes());
        let entry = Entry::new(
            0x0000,
            TagType::Rational,
            1,
            ByteStream::new(&bytes, Endian::Big),
        );
        assert_eq!(entry.get_float(0), Ok(1.5));
    }
}
