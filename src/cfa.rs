// SPDX-License-Identifier: LGPL-3.0-or-later
/*
 * rawspeed - cfa.rs
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

//! Colour filter array descriptions.

use num_enum::TryFromPrimitive;

/// A colour of the filter mosaic. The discriminants match the DNG
/// `CFAPattern` encoding.
#[derive(Clone, Copy, Debug, PartialEq, Eq, TryFromPrimitive)]
#[repr(u8)]
pub enum CfaColor {
    Red = 0,
    Green = 1,
    Blue = 2,
    Cyan = 3,
    Magenta = 4,
    Yellow = 5,
    White = 6,
    FujiGreen = 7,
    Unknown = 255,
}

impl CfaColor {
    /// The dcraw colour number, 2 bits.
    fn to_dcraw(self) -> Option<u32> {
        match self {
            Self::Red => Some(0),
            Self::Green | Self::FujiGreen => Some(1),
            Self::Blue => Some(2),
            _ => None,
        }
    }

    fn from_dcraw(c: u32) -> CfaColor {
        match c {
            0 => Self::Red,
            1 => Self::Green,
            2 => Self::Blue,
            _ => Self::Unknown,
        }
    }

    pub fn to_char(self) -> char {
        match self {
            Self::Red => 'R',
            Self::Green => 'G',
            Self::Blue => 'B',
            Self::Cyan => 'C',
            Self::Magenta => 'M',
            Self::Yellow => 'Y',
            Self::White => 'W',
            Self::FujiGreen => 'F',
            Self::Unknown => '?',
        }
    }
}

/// The filter mosaic of the sensor, a `width` x `height` tile of
/// colours repeated over the image.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct ColorFilterArray {
    colors: Vec<CfaColor>,
    width: usize,
    height: usize,
}

/// The dcraw value for the Fuji X-Trans 6x6 mosaic.
const DCRAW_FILTER_XTRANS: u32 = 9;

impl ColorFilterArray {
    pub fn new(width: usize, height: usize, colors: Vec<CfaColor>) -> ColorFilterArray {
        assert_eq!(colors.len(), width * height);
        ColorFilterArray {
            colors,
            width,
            height,
        }
    }

    /// The classic RGGB Bayer 2x2.
    pub fn rggb() -> ColorFilterArray {
        use CfaColor::*;
        Self::new(2, 2, vec![Red, Green, Green, Blue])
    }

    pub fn empty() -> ColorFilterArray {
        ColorFilterArray::default()
    }

    pub fn is_empty(&self) -> bool {
        self.colors.is_empty()
    }

    pub fn size(&self) -> (usize, usize) {
        (self.width, self.height)
    }

    /// Colour at `(x, y)`, with both coordinates wrapping around the
    /// tile size.
    pub fn color_at(&self, x: usize, y: usize) -> CfaColor {
        if self.colors.is_empty() {
            return CfaColor::Unknown;
        }
        self.colors[(y % self.height) * self.width + (x % self.width)]
    }

    pub fn set_color_at(&mut self, x: usize, y: usize, color: CfaColor) {
        let idx = (y % self.height) * self.width + (x % self.width);
        self.colors[idx] = color;
    }

    /// The effective CFA after moving the origin `n` pixels to the
    /// right.
    pub fn shift_right(&self, n: usize) -> ColorFilterArray {
        self.shifted(n, 0)
    }

    /// The effective CFA after moving the origin `n` pixels down.
    pub fn shift_down(&self, n: usize) -> ColorFilterArray {
        self.shifted(0, n)
    }

    pub fn shifted(&self, x: usize, y: usize) -> ColorFilterArray {
        if self.colors.is_empty() {
            return self.clone();
        }
        let mut out = self.clone();
        for oy in 0..self.height {
            for ox in 0..self.width {
                out.colors[oy * self.width + ox] = self.color_at(ox + x, oy + y);
            }
        }
        out
    }

    /// Render to the 32 bit dcraw `filters` encoding: 2 bits per
    /// position, laid out as in the dcraw `FC` macro. Only 2x2
    /// R/G/B mosaics and the 6x6 X-Trans have an encoding.
    pub fn to_dcraw_filter(&self) -> Option<u32> {
        if self.width == 6 && self.height == 6 {
            return Some(DCRAW_FILTER_XTRANS);
        }
        if self.width != 2 || self.height != 2 {
            return None;
        }
        let mut filter = 0_u32;
        for y in 0..8 {
            for x in 0..2 {
                let c = self.color_at(x, y).to_dcraw()?;
                let pos = (((y << 1) & 14) + (x & 1)) << 1;
                filter |= c << pos;
            }
        }
        Some(filter)
    }

    /// Reconstruct a 2x2 pattern from a dcraw `filters` value.
    pub fn from_dcraw_filter(filter: u32) -> ColorFilterArray {
        let mut cfa = ColorFilterArray::new(2, 2, vec![CfaColor::Unknown; 4]);
        for y in 0..2 {
            for x in 0..2 {
                let pos = (((y << 1) & 14) + (x & 1)) << 1;
                cfa.set_color_at(x, y, CfaColor::from_dcraw((filter >> pos) & 3));
            }
        }
        cfa
    }

    pub fn as_string(&self) -> String {
        self.colors.iter().map(|c| c.to_char()).collect()
    }
}

#[cfg(test)]
mod test {
    use super::{CfaColor::*, ColorFilterArray};

    #[test]
    fn test_dcraw_filter() {
        // RGGB maps to the well known dcraw constant
        let cfa = ColorFilterArray::rggb();
        assert_eq!(cfa.to_dcraw_filter(), Some(0x94949494));
        assert_eq!(ColorFilterArray::from_dcraw_filter(0x94949494), cfa);

        let gbrg = ColorFilterArray::new(2, 2, vec![Green, Blue, Red, Green]);
        let filter = gbrg.to_dcraw_filter().unwrap();
        assert_eq!(ColorFilterArray::from_dcraw_filter(filter), gbrg);
    }

    #[test]
    fn test_xtrans_filter() {
        let xtrans = ColorFilterArray::new(
            6,
            6,
            vec![
                Green, Green, Red, Green, Green, Blue, Green, Green, Blue, Green, Green, Red, Blue,
                Red, Green, Red, Blue, Green, Green, Green, Blue, Green, Green, Red, Green, Green,
                Red, Green, Green, Blue, Red, Blue, Green, Blue, Red, Green,
            ],
        );
        assert_eq!(xtrans.to_dcraw_filter(), Some(9));
    }

    #[test]
    fn test_non_rgb_has_no_filter() {
        let cmyw = ColorFilterArray::new(2, 2, vec![Cyan, Magenta, Yellow, White]);
        assert_eq!(cmyw.to_dcraw_filter(), None);
    }

    #[test]
    fn test_shift_commutes() {
        let cfa = ColorFilterArray::rggb();
        assert_eq!(
            cfa.shift_right(1).shift_down(1),
            cfa.shift_down(1).shift_right(1)
        );
        // shifting by the tile size is the identity
        assert_eq!(cfa.shift_right(2), cfa);
        assert_eq!(cfa.shift_down(2), cfa);
        // single shift moves the origin
        assert_eq!(cfa.shift_right(1).color_at(0, 0), Green);
        assert_eq!(cfa.shift_down(1).color_at(0, 0), Green);
        assert_eq!(cfa.shifted(1, 1).color_at(0, 0), Blue);
    }
}
