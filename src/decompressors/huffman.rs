// SPDX-License-Identifier: LGPL-3.0-or-later
/*
 * rawspeed - decompressors/huffman.rs
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

//! Canonical JPEG style Huffman decoding.
//!
//! Tables come either from a DHT segment (lossless JPEG) or from the
//! fixed Nikon trees. Decoding walks the canonical code ranges per
//! bit length; the decoded value is a bit length for the difference
//! that follows, which is then sign extended the JPEG way.

use crate::bitstream::{BitPump, PumpVariant};
use crate::{Error, Result};

/// A canonical Huffman table: `counts[l]` codes of length `l+1`, in
/// value order.
pub(crate) struct HuffmanTable {
    /// Largest code of each length, -1 where the length is unused.
    max_code: [i32; 17],
    /// Smallest code of each length.
    min_code: [i32; 17],
    /// Index of the first value of each length.
    val_ptr: [usize; 17],
    values: Vec<u8>,
}

impl HuffmanTable {
    /// Build from the 16 length counts and the value list, as stored
    /// in a DHT segment.
    pub fn new(counts: &[u8; 16], values: &[u8]) -> Result<HuffmanTable> {
        let total: usize = counts.iter().map(|c| *c as usize).sum();
        if total == 0 || total > 162 || values.len() < total {
            return Err(Error::Decoder("bad Huffman table".to_string()));
        }
        let mut max_code = [-1_i32; 17];
        let mut min_code = [0_i32; 17];
        let mut val_ptr = [0_usize; 17];
        let mut code = 0_i32;
        let mut k = 0_usize;
        for l in 1..=16 {
            let n = counts[l - 1] as usize;
            if n > 0 {
                val_ptr[l] = k;
                min_code[l] = code;
                code += n as i32;
                k += n;
                max_code[l] = code - 1;
            }
            code <<= 1;
        }
        // codes must fit in their lengths
        for l in 1..=16 {
            if max_code[l] >= (1 << l) {
                return Err(Error::Decoder("Huffman table overflows".to_string()));
            }
        }
        Ok(HuffmanTable {
            max_code,
            min_code,
            val_ptr,
            values: values[..total].to_vec(),
        })
    }

    /// Decode the next value from the pump.
    #[inline]
    pub fn decode<V: PumpVariant>(&self, pump: &mut BitPump<V>) -> Result<u8> {
        let mut code = pump.get_bits(1)? as i32;
        let mut length = 1_usize;
        while self.max_code[length] < code {
            if length >= 16 {
                return Err(Error::Decoder("corrupt Huffman stream".to_string()));
            }
            code = (code << 1) | pump.get_bits(1)? as i32;
            length += 1;
        }
        let index = self.val_ptr[length] + (code - self.min_code[length]) as usize;
        self.values
            .get(index)
            .copied()
            .ok_or_else(|| Error::Decoder("corrupt Huffman stream".to_string()))
    }

    /// JPEG `EXTEND`: interpret `bits` read after a length code as a
    /// signed difference.
    #[inline]
    pub fn extend(bits: u32, len: u32) -> i32 {
        if len == 0 {
            return 0;
        }
        let value = bits as i32;
        if value < (1 << (len - 1)) {
            value - (1 << len) + 1
        } else {
            value
        }
    }

    /// Decode a length code then its difference bits.
    #[inline]
    pub fn decode_difference<V: PumpVariant>(&self, pump: &mut BitPump<V>) -> Result<i32> {
        let len = u32::from(self.decode(pump)?);
        if len == 16 {
            // not followed by bits, the difference is fixed
            return Ok(-32768);
        }
        let bits = pump.get_bits(len)?;
        Ok(Self::extend(bits, len))
    }
}

#[cfg(test)]
mod test {
    use super::HuffmanTable;
    use crate::bitstream::BitPumpMsb;

    fn simple_table() -> HuffmanTable {
        // 0 -> value 0; 10 -> value 1; 110 -> value 2; 111 -> value 3
        let mut counts = [0_u8; 16];
        counts[0] = 1;
        counts[1] = 1;
        counts[2] = 2;
        HuffmanTable::new(&counts, &[0, 1, 2, 3]).unwrap()
    }

    #[test]
    fn test_decode() {
        let table = simple_table();
        // 0 10 110 111 -> 0, 1, 2, 3
        let data = [0b0101_1011, 0b1000_0000];
        let mut pump = BitPumpMsb::new(&data);
        assert_eq!(table.decode(&mut pump).unwrap(), 0);
        assert_eq!(table.decode(&mut pump).unwrap(), 1);
        assert_eq!(table.decode(&mut pump).unwrap(), 2);
        assert_eq!(table.decode(&mut pump).unwrap(), 3);
    }

    #[test]
    fn test_extend() {
        assert_eq!(HuffmanTable::extend(0, 0), 0);
        // positive values have the top bit set
        assert_eq!(HuffmanTable::extend(0b1, 1), 1);
        assert_eq!(HuffmanTable::extend(0b0, 1), -1);
        assert_eq!(HuffmanTable::extend(0b111, 3), 7);
        assert_eq!(HuffmanTable::extend(0b011, 3), 3 - 7);
        assert_eq!(HuffmanTable::extend(0b000, 3), -7);
    }

    #[test]
    fn test_empty_table_fails() {
        let counts = [0_u8; 16];
        assert!(HuffmanTable::new(&counts, &[]).is_err());
    }
}
