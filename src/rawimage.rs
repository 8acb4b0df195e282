// SPDX-License-Identifier: LGPL-3.0-or-later
/*
 * rawspeed - rawimage.rs
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

//! The decoded RAW image.
//!
//! A rectangular u16 or f32 raster plus the metadata a demosaicer
//! needs. The buffer is written by the decompressors, possibly from
//! several worker threads at once into disjoint row ranges; the error
//! log and the bad pixel list are the only shared mutable state and
//! both sit behind a mutex.

use std::sync::{Arc, Mutex};

use crate::cfa::ColorFilterArray;
use crate::metadata::BlackArea;
use crate::utils::{clamp_bits, round_up, round_up_division};
use crate::{Error, Result};

/// A position or a dimension in pixels.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct Point {
    pub x: usize,
    pub y: usize,
}

impl Point {
    pub fn new(x: usize, y: usize) -> Point {
        Point { x, y }
    }
}

/// Rectangle struct.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct Rect {
    pub x: usize,
    pub y: usize,
    pub width: usize,
    pub height: usize,
}

impl Rect {
    pub fn new(x: usize, y: usize, width: usize, height: usize) -> Rect {
        Rect {
            x,
            y,
            width,
            height,
        }
    }

    pub fn right(&self) -> usize {
        self.x + self.width
    }

    pub fn bottom(&self) -> usize {
        self.y + self.height
    }

    /// Is `other` fully inside this rectangle?
    pub fn contains(&self, other: &Rect) -> bool {
        other.x >= self.x
            && other.y >= self.y
            && other.right() <= self.right()
            && other.bottom() <= self.bottom()
    }
}

/// The pixel storage. Rows are `pitch` bytes apart; the row padding
/// past the last pixel is part of the allocation.
#[derive(Clone, Debug)]
pub enum RawImageData {
    U16(Vec<u16>),
    F32(Vec<f32>),
}

/// Camera and shot description filled by `decode_metadata`.
#[derive(Clone, Debug)]
pub struct ImageMetadata {
    pub make: String,
    pub model: String,
    pub mode: String,
    pub canonical_make: String,
    pub canonical_model: String,
    pub canonical_alias: String,
    pub canonical_id: String,
    /// White balance coefficients of the shot.
    pub wb_coeffs: [f32; 4],
    /// ISO speed, 0 when unknown.
    pub iso_speed: i32,
    /// Corner position for Fuji rotated sensors.
    pub fuji_rotation_pos: u32,
    /// <1 stretches vertically, >1 horizontally.
    pub pixel_aspect_ratio: f64,
    /// Divisor 10000 row major XYZ to camera matrix, D65.
    pub color_matrix: Vec<i32>,
}

impl Default for ImageMetadata {
    fn default() -> ImageMetadata {
        ImageMetadata {
            make: String::new(),
            model: String::new(),
            mode: String::new(),
            canonical_make: String::new(),
            canonical_model: String::new(),
            canonical_alias: String::new(),
            canonical_id: String::new(),
            wb_coeffs: [f32::NAN; 4],
            iso_speed: 0,
            fuji_rotation_pos: 0,
            pixel_aspect_ratio: 1.0,
            color_matrix: Vec::new(),
        }
    }
}

/// The shared error log. Workers append, nobody removes.
#[derive(Debug, Default)]
pub struct ErrorLog {
    errors: Mutex<Vec<String>>,
}

impl ErrorLog {
    pub fn set_error(&self, error: &str) {
        log::error!("{error}");
        self.errors.lock().unwrap().push(error.to_string());
    }

    pub fn errors(&self) -> Vec<String> {
        self.errors.lock().unwrap().clone()
    }

    pub fn is_too_many_errors(&self, how_many: usize) -> bool {
        self.errors.lock().unwrap().len() >= how_many
    }
}

/// Positions of pixels that must be interpolated, `x | y << 16`.
#[derive(Debug, Default)]
pub struct BadPixelList {
    positions: Mutex<Vec<u32>>,
}

impl BadPixelList {
    pub fn add(&self, x: usize, y: usize) {
        debug_assert!(x <= 0xffff && y <= 0xffff);
        self.positions
            .lock()
            .unwrap()
            .push((x as u32) | ((y as u32) << 16));
    }

    pub fn positions(&self) -> Vec<u32> {
        self.positions.lock().unwrap().clone()
    }

    fn take(&self) -> Vec<u32> {
        std::mem::take(&mut *self.positions.lock().unwrap())
    }
}

/// A 16 bit lookup table, optionally dithered.
///
/// The dithered form stores a `(base, spread)` pair per input value;
/// the written pixel is `base` plus a pseudo random fraction of the
/// spread driven by a 16 bit LCG, which hides banding when the curve
/// is steep.
#[derive(Debug)]
pub struct TableLookUp {
    dither: bool,
    table: Vec<u16>,
}

pub(crate) const TABLE_SIZE: usize = 65536;

impl TableLookUp {
    pub fn new(lut: &[u16], dither: bool) -> TableLookUp {
        assert!(!lut.is_empty());
        let n = lut.len();
        let mut table = vec![0_u16; if dither { 2 * TABLE_SIZE } else { TABLE_SIZE }];
        if !dither {
            for (i, t) in table.iter_mut().enumerate() {
                *t = lut[std::cmp::min(i, n - 1)];
            }
        } else {
            for i in 0..n.min(TABLE_SIZE) {
                let center = i32::from(lut[i]);
                let lower = if i > 0 { i32::from(lut[i - 1]) } else { center };
                let upper = if i + 1 < n {
                    i32::from(lut[i + 1])
                } else {
                    center
                };
                let delta = upper - lower;
                table[i * 2] = (center - delta / 4).clamp(0, 65535) as u16;
                table[i * 2 + 1] = (delta / 2).clamp(0, 65535) as u16;
            }
            for i in n..TABLE_SIZE {
                table[i * 2] = lut[n - 1];
                table[i * 2 + 1] = 0;
            }
        }
        TableLookUp { dither, table }
    }

    /// Look `value` up, advancing the dither state in `random`.
    /// This is on the per pixel hot path of several decompressors.
    #[inline]
    pub fn apply(&self, value: u16, random: &mut u32) -> u16 {
        if !self.dither {
            return self.table[value as usize];
        }
        let base = u32::from(self.table[2 * value as usize]);
        let delta = u32::from(self.table[2 * value as usize + 1]);
        let r = *random;
        let pix = base + ((delta * (r & 2047) + 1024) >> 12);
        *random = 15700 * (r & 65535) + (r >> 16);
        pix as u16
    }

    pub fn dither(&self) -> bool {
        self.dither
    }
}

/// The image data type.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum RawImageType {
    U16,
    F32,
}

/// The decoded image. See the module documentation.
#[derive(Debug)]
pub struct RawImage {
    data_type: RawImageType,
    /// Components per pixel, 1 to 4.
    cpp: usize,
    /// Bytes per pixel, all components.
    bpp: usize,
    uncropped_dim: Point,
    crop_offset: Point,
    /// The cropped (default view) dimensions.
    dim: Point,
    /// Bytes per row, 16 byte aligned, may exceed `bpp * dim.x`.
    pitch: usize,
    data: RawImageData,
    pub cfa: ColorFilterArray,
    pub is_cfa: bool,
    /// -1 when not known yet.
    pub black_level: i32,
    /// Per 2x2 position black level, -1 when not computed.
    pub black_level_separate: [i32; 4],
    pub white_point: u32,
    pub black_areas: Vec<BlackArea>,
    bad_pixels: Arc<BadPixelList>,
    bad_pixel_map: Vec<u8>,
    bad_pixel_map_pitch: usize,
    errors: Arc<ErrorLog>,
    table: Option<Arc<TableLookUp>>,
    pub metadata: ImageMetadata,
}

impl RawImage {
    pub fn new_u16(dim: Point, cpp: usize) -> RawImage {
        Self::new(dim, cpp, RawImageType::U16, 2 * cpp)
    }

    pub fn new_f32(dim: Point, cpp: usize) -> RawImage {
        Self::new(dim, cpp, RawImageType::F32, 4 * cpp)
    }

    fn new(dim: Point, cpp: usize, data_type: RawImageType, bpp: usize) -> RawImage {
        assert!((1..=4).contains(&cpp));
        RawImage {
            data_type,
            cpp,
            bpp,
            uncropped_dim: dim,
            crop_offset: Point::default(),
            dim,
            pitch: 0,
            data: match data_type {
                RawImageType::U16 => RawImageData::U16(Vec::new()),
                RawImageType::F32 => RawImageData::F32(Vec::new()),
            },
            cfa: ColorFilterArray::empty(),
            is_cfa: true,
            black_level: -1,
            black_level_separate: [-1; 4],
            white_point: 65536,
            black_areas: Vec::new(),
            bad_pixels: Arc::new(BadPixelList::default()),
            bad_pixel_map: Vec::new(),
            bad_pixel_map_pitch: 0,
            errors: Arc::new(ErrorLog::default()),
            table: None,
            metadata: ImageMetadata::default(),
        }
    }

    /// Allocate the pixel storage. Row starts are 16 byte aligned.
    pub fn create_data(&mut self) {
        assert!(self.uncropped_dim.x > 0 && self.uncropped_dim.y > 0);
        self.pitch = round_up(self.bpp * self.uncropped_dim.x, 16);
        let len = self.pitch * self.uncropped_dim.y;
        match self.data_type {
            RawImageType::U16 => self.data = RawImageData::U16(vec![0; len / 2]),
            RawImageType::F32 => self.data = RawImageData::F32(vec![0.0; len / 4]),
        }
    }

    pub fn is_allocated(&self) -> bool {
        match &self.data {
            RawImageData::U16(d) => !d.is_empty(),
            RawImageData::F32(d) => !d.is_empty(),
        }
    }

    pub fn data_type(&self) -> RawImageType {
        self.data_type
    }

    pub fn cpp(&self) -> usize {
        self.cpp
    }

    /// Bytes per pixel.
    pub fn bpp(&self) -> usize {
        self.bpp
    }

    /// Bytes per row.
    pub fn pitch(&self) -> usize {
        self.pitch
    }

    /// u16 per row, including padding.
    pub fn pitch_u16(&self) -> usize {
        self.pitch / 2
    }

    /// f32 per row, including padding.
    pub fn pitch_f32(&self) -> usize {
        self.pitch / 4
    }

    pub fn uncropped_dim(&self) -> Point {
        self.uncropped_dim
    }

    pub fn crop_offset(&self) -> Point {
        self.crop_offset
    }

    /// The cropped dimensions, the default view.
    pub fn dim(&self) -> Point {
        self.dim
    }

    /// Reinterpret the buffer as a logical crop without copying.
    /// `rect` is relative to the current crop.
    pub fn sub_frame(&mut self, rect: Rect) {
        let abs_x = self.crop_offset.x + rect.x;
        let abs_y = self.crop_offset.y + rect.y;
        if abs_x + rect.width > self.uncropped_dim.x || abs_y + rect.height > self.uncropped_dim.y {
            log::warn!("sub_frame outside of the image, ignoring");
            return;
        }
        self.crop_offset = Point::new(abs_x, abs_y);
        self.dim = Point::new(rect.width, rect.height);
    }

    pub fn u16_data(&self) -> &[u16] {
        match &self.data {
            RawImageData::U16(d) => d,
            _ => panic!("not a u16 image"),
        }
    }

    pub fn u16_data_mut(&mut self) -> &mut [u16] {
        match &mut self.data {
            RawImageData::U16(d) => d,
            _ => panic!("not a u16 image"),
        }
    }

    pub fn f32_data(&self) -> &[f32] {
        match &self.data {
            RawImageData::F32(d) => d,
            _ => panic!("not a f32 image"),
        }
    }

    pub fn f32_data_mut(&mut self) -> &mut [f32] {
        match &mut self.data {
            RawImageData::F32(d) => d,
            _ => panic!("not a f32 image"),
        }
    }

    pub fn data(&self) -> &RawImageData {
        &self.data
    }

    /// Uncropped row `y` of a u16 image, pixels only (no padding).
    pub fn u16_row(&self, y: usize) -> &[u16] {
        let pitch = self.pitch_u16();
        let w = self.cpp * self.uncropped_dim.x;
        &self.u16_data()[y * pitch..y * pitch + w]
    }

    pub fn u16_row_mut(&mut self, y: usize) -> &mut [u16] {
        let pitch = self.pitch_u16();
        let w = self.cpp * self.uncropped_dim.x;
        match &mut self.data {
            RawImageData::U16(d) => &mut d[y * pitch..y * pitch + w],
            _ => panic!("not a u16 image"),
        }
    }

    /// Pixel component at uncropped coordinates.
    pub fn u16_at(&self, x: usize, y: usize, component: usize) -> u16 {
        self.u16_data()[y * self.pitch_u16() + x * self.cpp + component]
    }

    /// Pixel component at cropped coordinates.
    pub fn u16_at_cropped(&self, x: usize, y: usize, component: usize) -> u16 {
        self.u16_at(x + self.crop_offset.x, y + self.crop_offset.y, component)
    }

    pub fn f32_at(&self, x: usize, y: usize, component: usize) -> f32 {
        self.f32_data()[y * self.pitch_f32() + x * self.cpp + component]
    }

    /// The mutable pixel storage plus the shared error log, for the
    /// parallel decompressors: the pixels are chunked into disjoint
    /// row ranges, the log is cloned into every worker.
    pub(crate) fn data_and_errors(&mut self) -> (&mut RawImageData, Arc<ErrorLog>) {
        (&mut self.data, self.errors.clone())
    }

    pub fn error_log(&self) -> Arc<ErrorLog> {
        self.errors.clone()
    }

    pub fn set_error(&self, error: &str) {
        self.errors.set_error(error);
    }

    pub fn errors(&self) -> Vec<String> {
        self.errors.errors()
    }

    pub fn bad_pixels(&self) -> Arc<BadPixelList> {
        self.bad_pixels.clone()
    }

    pub fn add_bad_pixel(&self, x: usize, y: usize) {
        self.bad_pixels.add(x, y);
    }

    /// Install (or clear) the pixel lookup table. The table is
    /// immutable during decompression.
    pub fn set_table(&mut self, lut: Option<(&[u16], bool)>) {
        self.table = lut.map(|(lut, dither)| Arc::new(TableLookUp::new(lut, dither)));
    }

    pub fn table(&self) -> Option<Arc<TableLookUp>> {
        self.table.clone()
    }

    /// Write one pixel through the lookup table, if any. `random` is
    /// the dither state carried across calls.
    #[inline]
    pub fn set_with_lookup(&self, value: u16, dst: &mut u16, random: &mut u32) {
        match &self.table {
            None => *dst = value,
            Some(table) => *dst = table.apply(value, random),
        }
    }

    /// Convert the accumulated bad pixel positions into a packed
    /// bitmap usable by [`RawImage::fix_bad_pixels`].
    pub fn transfer_bad_pixels_to_map(&mut self) {
        let positions = self.bad_pixels.take();
        if positions.is_empty() {
            return;
        }
        self.create_bad_pixel_map();
        for pos in positions {
            let x = (pos & 0xffff) as usize;
            let y = (pos >> 16) as usize;
            if x >= self.uncropped_dim.x || y >= self.uncropped_dim.y {
                continue;
            }
            self.bad_pixel_map[y * self.bad_pixel_map_pitch + (x >> 3)] |= 1 << (x & 7);
        }
    }

    pub fn create_bad_pixel_map(&mut self) {
        if self.bad_pixel_map.is_empty() {
            self.bad_pixel_map_pitch = round_up(round_up_division(self.uncropped_dim.x, 8), 16);
            self.bad_pixel_map = vec![0; self.bad_pixel_map_pitch * self.uncropped_dim.y];
        }
    }

    pub fn has_bad_pixel(&self, x: usize, y: usize) -> bool {
        if self.bad_pixel_map.is_empty() {
            return false;
        }
        self.bad_pixel_map[y * self.bad_pixel_map_pitch + (x >> 3)] & (1 << (x & 7)) != 0
    }

    /// Replace every mapped bad pixel with the mean of its nearest
    /// good neighbours of the same CFA colour (2 pixels apart on a
    /// Bayer mosaic). U16, single component only.
    pub fn fix_bad_pixels(&mut self) {
        if self.bad_pixel_map.is_empty()
            || self.data_type != RawImageType::U16
            || self.cpp != 1
        {
            return;
        }
        let step = if self.is_cfa { 2_isize } else { 1 };
        let dim = self.uncropped_dim;
        let mut fixes = Vec::new();
        for y in 0..dim.y {
            for x in 0..dim.x {
                if !self.has_bad_pixel(x, y) {
                    continue;
                }
                let mut sum = 0_u32;
                let mut count = 0_u32;
                for (dx, dy) in [(-step, 0), (step, 0), (0, -step), (0, step)] {
                    let nx = x as isize + dx;
                    let ny = y as isize + dy;
                    if nx < 0 || ny < 0 || nx >= dim.x as isize || ny >= dim.y as isize {
                        continue;
                    }
                    let (nx, ny) = (nx as usize, ny as usize);
                    if self.has_bad_pixel(nx, ny) {
                        continue;
                    }
                    sum += u32::from(self.u16_at(nx, ny, 0));
                    count += 1;
                }
                if count > 0 {
                    fixes.push((x, y, (sum / count) as u16));
                }
            }
        }
        let pitch = self.pitch_u16();
        let data = self.u16_data_mut();
        for (x, y, v) in fixes {
            data[y * pitch + x] = v;
        }
    }

    /// Average the declared black areas into the per 2x2 component
    /// black levels.
    pub fn calculate_black_areas(&mut self) -> Result<()> {
        debug_assert!(self.data_type == RawImageType::U16);
        let mut sums = [0_u64; 4];
        let mut counts = [0_u64; 4];
        let dim = self.dim;
        let off = self.crop_offset;
        let areas = self.black_areas.clone();
        for area in &areas {
            // keep pixel counts even per CFA group
            let size = area.size & !1;
            if area.is_vertical {
                if area.offset + size > self.uncropped_dim.x {
                    return Err(Error::Decoder(
                        "Vertical black area outside image".to_string(),
                    ));
                }
                for y in off.y..off.y + dim.y {
                    for x in area.offset..area.offset + size {
                        let idx = ((y & 1) << 1) | (x & 1);
                        sums[idx] += u64::from(self.u16_at(x, y, 0));
                        counts[idx] += 1;
                    }
                }
            } else {
                if area.offset + size > self.uncropped_dim.y {
                    return Err(Error::Decoder(
                        "Horizontal black area outside image".to_string(),
                    ));
                }
                for y in area.offset..area.offset + size {
                    for x in off.x..off.x + dim.x {
                        let idx = ((y & 1) << 1) | (x & 1);
                        sums[idx] += u64::from(self.u16_at(x, y, 0));
                        counts[idx] += 1;
                    }
                }
            }
        }
        if counts.iter().all(|c| *c == 0) {
            let black = self.black_level.max(0);
            self.black_level_separate = [black; 4];
            return Ok(());
        }
        for i in 0..4 {
            self.black_level_separate[i] = if counts[i] > 0 {
                (sums[i] / counts[i]).min(65535) as i32
            } else {
                self.black_level.max(0)
            };
        }
        if !self.is_cfa {
            let total: i32 = self.black_level_separate.iter().sum();
            self.black_level_separate = [(total + 2) >> 2; 4];
        }
        Ok(())
    }

    /// Rescale so black maps to 0 and the white point to the type's
    /// full range: 65535 for u16, 1.0 for f32.
    pub fn scale_black_white(&mut self) -> Result<()> {
        if self.black_level_separate[0] < 0 {
            if !self.black_areas.is_empty() {
                self.calculate_black_areas()?;
            } else {
                let black = self.black_level.max(0);
                self.black_level_separate = [black; 4];
            }
        }
        match self.data_type {
            RawImageType::U16 => self.scale_values_u16(),
            RawImageType::F32 => self.scale_values_f32(),
        }
        Ok(())
    }

    fn scale_values_u16(&mut self) {
        let white = i64::from(self.white_point);
        // 14 bit fixed point multipliers, one per 2x2 position,
        // rotated by the crop offset parity
        let mut mul = [0_i64; 4];
        let mut sub = [0_i64; 4];
        for (i, (m, s)) in mul.iter_mut().zip(sub.iter_mut()).enumerate() {
            let mut v = i;
            if self.crop_offset.x & 1 != 0 {
                v ^= 1;
            }
            if self.crop_offset.y & 1 != 0 {
                v ^= 2;
            }
            let black = i64::from(self.black_level_separate[v]);
            let range = (white - black).max(1);
            *m = (16384.0 * 65535.0 / range as f64) as i64;
            *s = black;
        }
        let off = self.crop_offset;
        let dim = self.dim;
        let cpp = self.cpp;
        let pitch = self.pitch_u16();
        let data = self.u16_data_mut();
        for y in 0..dim.y {
            let row = &mut data[(off.y + y) * pitch..];
            let qy = 2 * ((off.y + y) & 1);
            for x in 0..dim.x * cpp {
                let q = qy + ((off.x + x / cpp) & 1);
                let v = i64::from(row[off.x * cpp + x]);
                row[off.x * cpp + x] = clamp_bits(((v - sub[q]) * mul[q] + 8192) >> 14, 16);
            }
        }
    }

    fn scale_values_f32(&mut self) {
        let black = self.black_level_separate[0].max(0) as f32;
        let white = self.white_point as f32;
        let range = (white - black).max(1.0);
        let off = self.crop_offset;
        let dim = self.dim;
        let cpp = self.cpp;
        let pitch = self.pitch_f32();
        let data = self.f32_data_mut();
        for y in 0..dim.y {
            let row = &mut data[(off.y + y) * pitch..];
            for x in 0..dim.x * cpp {
                let v = row[off.x * cpp + x];
                row[off.x * cpp + x] = (v - black) / range;
            }
        }
    }
}

#[cfg(test)]
mod test {
    use super::{Point, RawImage, Rect, TableLookUp};
    use crate::metadata::BlackArea;

    #[test]
    fn test_pitch_alignment() {
        let mut img = RawImage::new_u16(Point::new(99, 4), 1);
        img.create_data();
        assert!(img.pitch() >= 2 * 99);
        assert_eq!(img.pitch() % 16, 0);
        assert_eq!(img.u16_data().len(), img.pitch_u16() * 4);
    }

    #[test]
    fn test_sub_frame() {
        let mut img = RawImage::new_u16(Point::new(20, 20), 1);
        img.create_data();
        img.sub_frame(Rect::new(2, 3, 10, 12));
        assert_eq!(img.crop_offset(), Point::new(2, 3));
        assert_eq!(img.dim(), Point::new(10, 12));
        assert_eq!(img.uncropped_dim(), Point::new(20, 20));
        // nested crop accumulates
        img.sub_frame(Rect::new(1, 1, 5, 5));
        assert_eq!(img.crop_offset(), Point::new(3, 4));
        assert_eq!(img.dim(), Point::new(5, 5));
    }

    #[test]
    fn test_lookup_identity() {
        let identity: Vec<u16> = (0..=65535).collect();
        let mut img = RawImage::new_u16(Point::new(4, 4), 1);
        img.set_table(Some((&identity, false)));
        let mut random = 0_u32;
        let mut dst = 0_u16;
        img.set_with_lookup(1234, &mut dst, &mut random);
        assert_eq!(dst, 1234);
        // clearing the table goes back to verbatim writes
        img.set_table(None);
        img.set_with_lookup(4321, &mut dst, &mut random);
        assert_eq!(dst, 4321);
    }

    #[test]
    fn test_lookup_dither_stays_in_range() {
        let lut: Vec<u16> = (0..=65535).map(|i| (i / 2) as u16).collect();
        let table = TableLookUp::new(&lut, true);
        let mut random = 0x12345678_u32;
        for v in [0_u16, 1, 100, 30000, 65535] {
            let out = table.apply(v, &mut random);
            let expect = lut[v as usize];
            assert!(out.abs_diff(expect) <= 1, "value {v} out {out}");
        }
    }

    #[test]
    fn test_bad_pixel_map() {
        let mut img = RawImage::new_u16(Point::new(8, 4), 1);
        img.create_data();
        for p in img.u16_data_mut() {
            *p = 100;
        }
        img.add_bad_pixel(3, 1);
        img.u16_row_mut(1)[3] = 9999;
        img.transfer_bad_pixels_to_map();
        assert!(img.has_bad_pixel(3, 1));
        assert!(!img.has_bad_pixel(2, 1));
        img.fix_bad_pixels();
        assert_eq!(img.u16_at(3, 1, 0), 100);
    }

    #[test]
    fn test_black_areas() {
        let mut img = RawImage::new_u16(Point::new(8, 8), 1);
        img.create_data();
        // masked strip: 2 left columns at value 64, rest at 1000
        for y in 0..8 {
            for x in 0..8 {
                img.u16_row_mut(y)[x] = if x < 2 { 64 } else { 1000 };
            }
        }
        img.sub_frame(Rect::new(2, 0, 6, 8));
        img.black_areas.push(BlackArea::new(0, 2, true));
        img.calculate_black_areas().unwrap();
        assert_eq!(img.black_level_separate, [64; 4]);
    }

    #[test]
    fn test_scale_black_white() {
        let mut img = RawImage::new_u16(Point::new(4, 4), 1);
        img.create_data();
        for p in img.u16_data_mut() {
            *p = 2048;
        }
        img.black_level = 0;
        img.white_point = 4095;
        img.scale_black_white().unwrap();
        let v = img.u16_at(0, 0, 0);
        // 2048/4095 of full range
        assert!((i32::from(v) - 32776).abs() <= 16, "got {v}");
    }
}
