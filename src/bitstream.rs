// SPDX-License-Identifier: LGPL-3.0-or-later
/*
 * rawspeed - bitstream.rs
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

//! Bit pumps.
//!
//! A pump reads bits out of a byte slice in one of five orders. The
//! variant is a type parameter so the decompressors monomorphize; the
//! per variant refill chunk size stays attached to the variant type.
//!
//! After `fill(n)` (`n <= 32`) at least `n` bits are cached and
//! `peek_bits(n)` does no further input. The JPEG variant removes
//! `0xFF 0x00` stuffing and turns any other `0xFF` marker into a
//! silent, zero filled end of stream; all other variants fail with
//! `PastEnd` the first time a request cannot be covered.

use std::marker::PhantomData;

use byteorder::{ByteOrder, LittleEndian};

use crate::{IoError, Result};

/// Bit orders, for runtime selection of a pump variant.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum BitOrder {
    /// Bits from the low end of each byte group, memory order.
    Lsb,
    /// Bits from the high end, byte by byte.
    Msb,
    /// Bits from the high end of 16 bit little endian groups.
    Msb16,
    /// Bits from the high end of 32 bit little endian groups.
    Msb32,
    /// MSB plus JPEG byte stuffing and marker detection.
    Jpeg,
}

/// Compile time description of a pump variant.
pub trait PumpVariant {
    /// How many bytes a single cache refill consumes, at most.
    const MAX_PROCESS_BYTES: usize;
    /// Cache geometry: `true` inserts new bits above the old ones and
    /// reads from the low end (LSB), `false` reads from the high end
    /// (the MSB family).
    const LEFT_IN_RIGHT_OUT: bool;
    /// JPEG stuffed byte and marker handling.
    const STUFFED: bool = false;
}

pub struct Lsb;
impl PumpVariant for Lsb {
    const MAX_PROCESS_BYTES: usize = 4;
    const LEFT_IN_RIGHT_OUT: bool = true;
}

pub struct Msb;
impl PumpVariant for Msb {
    const MAX_PROCESS_BYTES: usize = 1;
    const LEFT_IN_RIGHT_OUT: bool = false;
}

pub struct Msb16;
impl PumpVariant for Msb16 {
    const MAX_PROCESS_BYTES: usize = 2;
    const LEFT_IN_RIGHT_OUT: bool = false;
}

pub struct Msb32;
impl PumpVariant for Msb32 {
    const MAX_PROCESS_BYTES: usize = 4;
    const LEFT_IN_RIGHT_OUT: bool = false;
}

pub struct Jpeg;
impl PumpVariant for Jpeg {
    const MAX_PROCESS_BYTES: usize = 1;
    const LEFT_IN_RIGHT_OUT: bool = false;
    const STUFFED: bool = true;
}

pub type BitPumpLsb<'a> = BitPump<'a, Lsb>;
pub type BitPumpMsb<'a> = BitPump<'a, Msb>;
pub type BitPumpMsb16<'a> = BitPump<'a, Msb16>;
pub type BitPumpMsb32<'a> = BitPump<'a, Msb32>;
pub type BitPumpJpeg<'a> = BitPump<'a, Jpeg>;

/// A bit pump over a borrowed byte slice.
pub struct BitPump<'a, V: PumpVariant> {
    data: &'a [u8],
    /// Next byte to feed into the cache.
    pos: usize,
    cache: u64,
    /// Bits currently in the cache.
    fill_level: u32,
    /// JPEG only: a marker was seen, everything further is zero.
    eos: bool,
    _variant: PhantomData<V>,
}

impl<'a, V: PumpVariant> BitPump<'a, V> {
    pub fn new(data: &'a [u8]) -> BitPump<'a, V> {
        BitPump {
            data,
            pos: 0,
            cache: 0,
            fill_level: 0,
            eos: false,
            _variant: PhantomData,
        }
    }

    fn push(&mut self, bits: u64, count: u32) {
        if V::LEFT_IN_RIGHT_OUT {
            self.cache |= bits << self.fill_level;
        } else {
            self.cache = (self.cache << count) | bits;
        }
        self.fill_level += count;
    }

    /// Feed one chunk into the cache. The tail of the input counts as
    /// zero filled up to the chunk size.
    fn fill_once(&mut self) -> Result<()> {
        if V::STUFFED {
            // Byte at a time with 0xFF handling.
            if self.eos || self.pos >= self.data.len() {
                self.eos = true;
                self.push(0, 8);
                return Ok(());
            }
            let mut c = self.data[self.pos];
            self.pos += 1;
            if c == 0xff {
                match self.data.get(self.pos) {
                    Some(0x00) => {
                        // stuffed byte, the 0xFF is data
                        self.pos += 1;
                    }
                    _ => {
                        // a real marker, or the input just ended
                        self.eos = true;
                        c = 0;
                    }
                }
            }
            self.push(u64::from(c), 8);
            return Ok(());
        }

        if self.pos >= self.data.len() {
            return Err(IoError::PastEnd.into());
        }
        let mut chunk = [0_u8; 4];
        let avail = std::cmp::min(V::MAX_PROCESS_BYTES, self.data.len() - self.pos);
        chunk[..avail].copy_from_slice(&self.data[self.pos..self.pos + avail]);
        self.pos += avail;
        match V::MAX_PROCESS_BYTES {
            1 => self.push(u64::from(chunk[0]), 8),
            2 => self.push(u64::from(LittleEndian::read_u16(&chunk)), 16),
            4 => self.push(u64::from(LittleEndian::read_u32(&chunk)), 32),
            _ => unreachable!("invalid chunk size"),
        }
        Ok(())
    }

    /// Ensure at least `n` bits are cached, `n <= 32`.
    #[inline]
    pub fn fill(&mut self, n: u32) -> Result<()> {
        debug_assert!(n <= 32);
        while self.fill_level < n {
            self.fill_once()?;
        }
        Ok(())
    }

    #[inline]
    pub fn peek_bits(&mut self, n: u32) -> Result<u32> {
        if n == 0 {
            return Ok(0);
        }
        self.fill(n)?;
        let mask = if n == 32 { u64::MAX } else { (1_u64 << n) - 1 };
        let bits = if V::LEFT_IN_RIGHT_OUT {
            self.cache & mask
        } else {
            (self.cache >> (self.fill_level - n)) & mask
        };
        Ok(bits as u32)
    }

    #[inline]
    pub fn get_bits(&mut self, n: u32) -> Result<u32> {
        let bits = self.peek_bits(n)?;
        self.skip_bits_no_fill(n);
        Ok(bits)
    }

    /// Skip `n` bits, refilling the cache as needed.
    #[inline]
    pub fn skip_bits(&mut self, n: u32) -> Result<()> {
        self.fill(n)?;
        self.skip_bits_no_fill(n);
        Ok(())
    }

    /// Skip whole bytes, in cache sized chunks. For per row input
    /// padding, which can exceed one cache refill.
    pub fn skip_bytes(&mut self, n: usize) -> Result<()> {
        let mut bits = 8 * n;
        while bits > 0 {
            let chunk = bits.min(32) as u32;
            self.skip_bits(chunk)?;
            bits -= chunk as usize;
        }
        Ok(())
    }

    /// Skip `n` already cached bits.
    #[inline]
    pub fn skip_bits_no_fill(&mut self, n: u32) {
        debug_assert!(n <= self.fill_level);
        if V::LEFT_IN_RIGHT_OUT {
            self.cache >>= n;
        }
        self.fill_level -= n;
    }

    /// Byte offset into the input, accounting for cached bits.
    pub fn get_position(&self) -> usize {
        self.pos - (self.fill_level as usize >> 3)
    }

    /// Bytes fed into the cache so far, a multiple of the chunk
    /// size. Used when the outer stream resumes after the pump.
    pub fn buffer_position(&self) -> usize {
        self.pos
    }

    pub fn remaining_bytes(&self) -> usize {
        self.data.len().saturating_sub(self.get_position())
    }
}

#[cfg(test)]
mod test {
    use super::{BitPumpJpeg, BitPumpLsb, BitPumpMsb, BitPumpMsb16, BitPumpMsb32};
    use crate::{Error, IoError};

    #[test]
    fn test_lsb() {
        let data = [0b1011_0010_u8, 0b0101_1101];
        let mut pump = BitPumpLsb::new(&data);
        // low bits of the first byte come out first
        assert_eq!(pump.get_bits(4), Ok(0b0010));
        assert_eq!(pump.get_bits(4), Ok(0b1011));
        assert_eq!(pump.get_bits(8), Ok(0b0101_1101));
    }

    #[test]
    fn test_msb() {
        let data = [0b1011_0010_u8, 0b0101_1101];
        let mut pump = BitPumpMsb::new(&data);
        assert_eq!(pump.get_bits(4), Ok(0b1011));
        assert_eq!(pump.get_bits(4), Ok(0b0010));
        assert_eq!(pump.get_bits(8), Ok(0b0101_1101));
    }

    #[test]
    fn test_msb16() {
        // 16 bit little endian groups, bits from the high end
        let data = [0x34_u8, 0x12, 0x78, 0x56];
        let mut pump = BitPumpMsb16::new(&data);
        assert_eq!(pump.get_bits(8), Ok(0x12));
        assert_eq!(pump.get_bits(8), Ok(0x34));
        assert_eq!(pump.get_bits(16), Ok(0x5678));
    }

    #[test]
    fn test_msb32() {
        let data = [0x78_u8, 0x56, 0x34, 0x12];
        let mut pump = BitPumpMsb32::new(&data);
        assert_eq!(pump.get_bits(16), Ok(0x1234));
        assert_eq!(pump.get_bits(16), Ok(0x5678));
    }

    #[test]
    fn test_all_ones() {
        let data = [0xff_u8; 8];
        let mut pump = BitPumpMsb::new(&data);
        for n in 1..=16_u32 {
            assert_eq!(pump.get_bits(n), Ok((1 << n) - 1));
        }
        let data = [0xff_u8; 8];
        let mut pump = BitPumpLsb::new(&data);
        for n in 1..=16_u32 {
            assert_eq!(pump.get_bits(n), Ok((1 << n) - 1));
        }
    }

    #[test]
    fn test_fill_invariant() {
        let data = [0xa5_u8; 4];
        let mut pump = BitPumpMsb::new(&data);
        pump.fill(17).unwrap();
        // peeking must not consume
        let first = pump.peek_bits(17).unwrap();
        assert_eq!(pump.peek_bits(17).unwrap(), first);
        assert_eq!(pump.get_position(), 0);
    }

    #[test]
    fn test_zero_width() {
        let data = [0xff_u8];
        let mut pump = BitPumpMsb::new(&data);
        assert_eq!(pump.get_bits(0), Ok(0));
        assert_eq!(pump.peek_bits(0), Ok(0));
    }

    #[test]
    fn test_past_end() {
        let data = [0xff_u8, 0xff];
        let mut pump = BitPumpMsb::new(&data);
        assert_eq!(pump.get_bits(16), Ok(0xffff));
        assert_eq!(pump.get_bits(1), Err(Error::Io(IoError::PastEnd)));
    }

    #[test]
    fn test_position() {
        let data = [0_u8; 16];
        let mut pump = BitPumpMsb32::new(&data);
        assert_eq!(pump.get_position(), 0);
        pump.get_bits(8).unwrap();
        assert_eq!(pump.get_position(), 1);
        pump.get_bits(24).unwrap();
        assert_eq!(pump.get_position(), 4);
    }

    #[test]
    fn test_jpeg_stuffing() {
        // 0xFF 0x00 decodes as a data 0xFF
        let data = [0xff_u8, 0x00, 0xab];
        let mut pump = BitPumpJpeg::new(&data);
        assert_eq!(pump.get_bits(8), Ok(0xff));
        assert_eq!(pump.get_bits(8), Ok(0xab));
    }

    #[test]
    fn test_jpeg_marker_is_silent_end() {
        // 0xFF followed by a non zero byte ends the stream; further
        // reads yield zeroes, never an error.
        let data = [0x12_u8, 0xff, 0xd9];
        let mut pump = BitPumpJpeg::new(&data);
        assert_eq!(pump.get_bits(8), Ok(0x12));
        assert_eq!(pump.get_bits(8), Ok(0));
        assert_eq!(pump.get_bits(32), Ok(0));
    }
}
