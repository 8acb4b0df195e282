// SPDX-License-Identifier: LGPL-3.0-or-later
/*
 * rawspeed - opcodes.rs
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

//! The DNG opcode engine.
//!
//! OpcodeList1/2 hold a big endian list of post decode fixups: bad
//! pixel maps, lookup curves, per row or column offsets and scales,
//! and a crop. Opcodes run in list order; TrimBounds changes the
//! tracked sub image that later opcodes' regions validate against,
//! so that state threads through parsing explicitly.

use crate::bytestream::{ByteStream, Endian};
use crate::rawimage::{RawImage, RawImageType, Rect};
use crate::utils::{clamp_bits, round_up_division};
use crate::{Error, Result};

/// Region and plane parameters every pixel opcode starts with.
#[derive(Clone, Debug)]
struct PixelParams {
    /// Relative to the tracked sub image at parse time.
    roi: Rect,
    first_plane: usize,
    planes: usize,
    row_pitch: usize,
    col_pitch: usize,
}

impl PixelParams {
    fn parse(bs: &mut ByteStream, sub_img: Rect, cpp: usize) -> Result<PixelParams> {
        let roi = parse_roi(bs, sub_img)?;
        let first_plane = bs.get_u32()? as usize;
        let planes = bs.get_u32()? as usize;
        if planes == 0 || first_plane + planes > cpp {
            return Err(Error::Decoder(format!(
                "DNG opcode: bad plane params (first {first_plane}, num {planes}, cpp {cpp})"
            )));
        }
        let row_pitch = bs.get_u32()? as usize;
        let col_pitch = bs.get_u32()? as usize;
        if row_pitch < 1 || row_pitch > roi.height || col_pitch < 1 || col_pitch > roi.width {
            return Err(Error::Decoder("DNG opcode: invalid pitch".to_string()));
        }
        Ok(PixelParams {
            roi,
            first_plane,
            planes,
            row_pitch,
            col_pitch,
        })
    }

    /// Visit every addressed pixel of the cropped image with
    /// `op(x_step, y_step, value) -> value`.
    fn apply_u16<F: FnMut(usize, usize, u16) -> u16>(
        &self,
        image: &mut RawImage,
        mut op: F,
    ) {
        let cpp = image.cpp();
        let off = image.crop_offset();
        let pitch = image.pitch_u16();
        let affected_x = round_up_division(self.roi.width, self.col_pitch);
        let affected_y = round_up_division(self.roi.height, self.row_pitch);
        let data = image.u16_data_mut();
        for y in 0..affected_y {
            let row = off.y + self.roi.y + self.row_pitch * y;
            for x in 0..affected_x {
                let col = off.x + self.roi.x + self.col_pitch * x;
                for p in 0..self.planes {
                    let idx = row * pitch + col * cpp + self.first_plane + p;
                    data[idx] = op(x, y, data[idx]);
                }
            }
        }
    }

    fn apply_f32<F: FnMut(usize, usize, f32) -> f32>(&self, image: &mut RawImage, mut op: F) {
        let cpp = image.cpp();
        let off = image.crop_offset();
        let pitch = image.pitch_f32();
        let affected_x = round_up_division(self.roi.width, self.col_pitch);
        let affected_y = round_up_division(self.roi.height, self.row_pitch);
        let data = image.f32_data_mut();
        for y in 0..affected_y {
            let row = off.y + self.roi.y + self.row_pitch * y;
            for x in 0..affected_x {
                let col = off.x + self.roi.x + self.col_pitch * x;
                for p in 0..self.planes {
                    let idx = row * pitch + col * cpp + self.first_plane + p;
                    data[idx] = op(x, y, data[idx]);
                }
            }
        }
    }
}

/// Read a top/left/bottom/right rectangle and validate it against
/// the tracked sub image.
fn parse_roi(bs: &mut ByteStream, sub_img: Rect) -> Result<Rect> {
    let top = bs.get_u32()? as usize;
    let left = bs.get_u32()? as usize;
    let bottom = bs.get_u32()? as usize;
    let right = bs.get_u32()? as usize;
    if right < left || bottom < top || right > sub_img.width || bottom > sub_img.height {
        return Err(Error::Decoder(format!(
            "DNG opcode: rectangle ({top}, {left}, {bottom}, {right}) not inside the {}x{} sub image",
            sub_img.width, sub_img.height
        )));
    }
    Ok(Rect::new(left, top, right - left, bottom - top))
}

/// Per row or per column orientation of the delta and scale opcodes.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum Axis {
    Row,
    Column,
}

impl Axis {
    /// The delta index for a visited pixel.
    fn select(self, x: usize, y: usize) -> usize {
        match self {
            Axis::Row => y,
            Axis::Column => x,
        }
    }
}

enum Opcode {
    FixBadPixelsConstant {
        value: u32,
    },
    FixBadPixelsList {
        bad_pixels: Vec<u32>,
    },
    TrimBounds {
        roi: Rect,
    },
    Lookup {
        params: PixelParams,
        lookup: Vec<u16>,
    },
    OffsetPerRowOrCol {
        params: PixelParams,
        axis: Axis,
        delta_f: Vec<f32>,
        delta_i: Vec<i32>,
    },
    ScalePerRowOrCol {
        params: PixelParams,
        axis: Axis,
        delta_f: Vec<f32>,
        delta_i: Vec<i32>,
    },
}

pub(crate) struct DngOpcodes {
    opcodes: Vec<Opcode>,
}

impl DngOpcodes {
    /// Parse an opcode list. `image` provides the shape the regions
    /// validate against; pixels are not touched until
    /// [`DngOpcodes::apply`].
    pub fn parse(image: &RawImage, bs: ByteStream) -> Result<DngOpcodes> {
        let mut bs = bs;
        bs.set_endian(Endian::Big);
        let opcode_count = bs.get_u32()?;

        let mut opcodes = Vec::new();
        // the tracked sub image, updated by TrimBounds
        let mut sub_img = Rect::new(0, 0, image.dim().x, image.dim().y);
        for _ in 0..opcode_count {
            let code = bs.get_u32()?;
            bs.skip(4)?; // version, advisory
            let flags = bs.get_u32()?;
            let optional = flags & 1 != 0;
            let payload_size = bs.get_u32()? as usize;
            let start = bs.position();
            bs.skip(payload_size)?;
            let mut payload = bs.sub_stream(start, payload_size)?;

            let opcode = match code {
                4 => Some(Self::parse_fix_bad_pixels_constant(image, &mut payload)?),
                5 => Some(Self::parse_fix_bad_pixels_list(image, &mut payload)?),
                6 => {
                    let roi = parse_roi(&mut payload, sub_img)?;
                    // later opcodes see the trimmed sub image
                    sub_img = Rect::new(
                        sub_img.x + roi.x,
                        sub_img.y + roi.y,
                        roi.width,
                        roi.height,
                    );
                    Some(Opcode::TrimBounds { roi })
                }
                7 => Some(Self::parse_table_map(image, &mut payload, sub_img)?),
                8 => Some(Self::parse_polynomial_map(image, &mut payload, sub_img)?),
                10 | 11 => Some(Self::parse_delta(
                    image,
                    &mut payload,
                    sub_img,
                    if code == 10 { Axis::Row } else { Axis::Column },
                )?),
                12 | 13 => Some(Self::parse_scale(
                    image,
                    &mut payload,
                    sub_img,
                    if code == 12 { Axis::Row } else { Axis::Column },
                )?),
                1 | 2 | 3 | 9 => {
                    // WarpRectilinear, WarpFisheye, FixVignetteRadial
                    // and GainMap are known but not implemented
                    if !optional {
                        return Err(Error::Decoder(format!(
                            "DNG opcode: unsupported opcode {code}"
                        )));
                    }
                    log::warn!("DNG opcode: skipping optional unsupported opcode {code}");
                    None
                }
                _ => {
                    if !optional {
                        return Err(Error::Decoder(format!("DNG opcode: unknown opcode {code}")));
                    }
                    log::warn!("DNG opcode: skipping optional unknown opcode {code}");
                    None
                }
            };
            if let Some(opcode) = opcode {
                if payload.remaining() != 0 {
                    return Err(Error::Decoder(
                        "DNG opcode: inconsistent length of opcode".to_string(),
                    ));
                }
                opcodes.push(opcode);
            }
        }
        Ok(DngOpcodes { opcodes })
    }

    fn parse_fix_bad_pixels_constant(image: &RawImage, bs: &mut ByteStream) -> Result<Opcode> {
        if image.data_type() != RawImageType::U16 || image.cpp() != 1 {
            return Err(Error::Decoder(
                "FixBadPixelsConstant: only 16 bit single component images supported".to_string(),
            ));
        }
        let value = bs.get_u32()?;
        bs.skip(4)?; // Bayer phase, unused
        Ok(Opcode::FixBadPixelsConstant { value })
    }

    fn parse_fix_bad_pixels_list(image: &RawImage, bs: &mut ByteStream) -> Result<Opcode> {
        // coordinates are global, against the uncropped image
        let dim = image.uncropped_dim();
        bs.skip(4)?; // Bayer phase, unused
        let point_count = bs.get_u32()? as usize;
        let rect_count = bs.get_u32()? as usize;

        let mut bad_pixels = Vec::with_capacity(point_count);
        for _ in 0..point_count {
            let y = bs.get_u32()? as usize;
            let x = bs.get_u32()? as usize;
            if x >= dim.x || y >= dim.y {
                return Err(Error::Decoder(
                    "FixBadPixelsList: bad point not inside image".to_string(),
                ));
            }
            bad_pixels.push((x as u32) | ((y as u32) << 16));
        }
        for _ in 0..rect_count {
            let rect = parse_roi(bs, Rect::new(0, 0, dim.x, dim.y))?;
            for y in rect.y..rect.bottom() {
                for x in rect.x..rect.right() {
                    bad_pixels.push((x as u32) | ((y as u32) << 16));
                }
            }
        }
        Ok(Opcode::FixBadPixelsList { bad_pixels })
    }

    fn parse_table_map(image: &RawImage, bs: &mut ByteStream, sub_img: Rect) -> Result<Opcode> {
        if image.data_type() != RawImageType::U16 {
            return Err(Error::Decoder("TableMap: only 16 bit images supported".to_string()));
        }
        let params = PixelParams::parse(bs, sub_img, image.cpp())?;
        let count = bs.get_u32()? as usize;
        if count == 0 || count > 65536 {
            return Err(Error::Decoder("TableMap: invalid size of lookup table".to_string()));
        }
        let mut lookup = vec![0_u16; 65536];
        for l in lookup.iter_mut().take(count) {
            *l = bs.get_u16()?;
        }
        let last = lookup[count - 1];
        for l in lookup.iter_mut().skip(count) {
            *l = last;
        }
        Ok(Opcode::Lookup { params, lookup })
    }

    fn parse_polynomial_map(
        image: &RawImage,
        bs: &mut ByteStream,
        sub_img: Rect,
    ) -> Result<Opcode> {
        if image.data_type() != RawImageType::U16 {
            return Err(Error::Decoder(
                "PolynomialMap: only 16 bit images supported".to_string(),
            ));
        }
        let params = PixelParams::parse(bs, sub_img, image.cpp())?;
        let degree = bs.get_u32()? as usize;
        if degree > 8 {
            return Err(Error::Decoder(
                "PolynomialMap: a polynomial with more than 8 degrees not allowed".to_string(),
            ));
        }
        let mut polynomial = Vec::with_capacity(degree + 1);
        for _ in 0..=degree {
            polynomial.push(bs.get_f64()?);
        }
        let mut lookup = vec![0_u16; 65536];
        for (i, l) in lookup.iter_mut().enumerate() {
            let x = i as f64 / 65536.0;
            let mut value = polynomial[0];
            for (j, a) in polynomial.iter().enumerate().skip(1) {
                value += a * x.powi(j as i32);
            }
            *l = (value * 65535.5).clamp(0.0, 65535.0) as u16;
        }
        Ok(Opcode::Lookup { params, lookup })
    }

    fn parse_delta_floats(
        bs: &mut ByteStream,
        params: &PixelParams,
        axis: Axis,
    ) -> Result<Vec<f32>> {
        let count = bs.get_u32()? as usize;
        let expected = round_up_division(
            axis.select(params.roi.width, params.roi.height),
            axis.select(params.col_pitch, params.row_pitch),
        );
        if count != expected {
            return Err(Error::Decoder(format!(
                "DNG opcode: got {count} delta elements, expected {expected}"
            )));
        }
        let mut deltas = Vec::with_capacity(count);
        for _ in 0..count {
            let f = bs.get_f32()?;
            if !f.is_finite() {
                return Err(Error::Decoder(format!("DNG opcode: got bad float {f}")));
            }
            deltas.push(f);
        }
        Ok(deltas)
    }

    fn parse_delta(
        image: &RawImage,
        bs: &mut ByteStream,
        sub_img: Rect,
        axis: Axis,
    ) -> Result<Opcode> {
        let params = PixelParams::parse(bs, sub_img, image.cpp())?;
        let delta_f = Self::parse_delta_floats(bs, &params, axis)?;
        // offsets scale by 65535 into integer space; anything that
        // cannot land back into 16 bits is rejected
        let mut delta_i = Vec::new();
        if image.data_type() == RawImageType::U16 {
            delta_i.reserve(delta_f.len());
            for f in &delta_f {
                if f.abs() > 1.0 {
                    return Err(Error::Decoder(format!(
                        "DNG opcode: offset {f} out of range"
                    )));
                }
                delta_i.push((65535.0 * f) as i32);
            }
        }
        Ok(Opcode::OffsetPerRowOrCol {
            params,
            axis,
            delta_f,
            delta_i,
        })
    }

    fn parse_scale(
        image: &RawImage,
        bs: &mut ByteStream,
        sub_img: Rect,
        axis: Axis,
    ) -> Result<Opcode> {
        let params = PixelParams::parse(bs, sub_img, image.cpp())?;
        let delta_f = Self::parse_delta_floats(bs, &params, axis)?;
        // scales turn into 10 bit fixed point factors
        let mut delta_i = Vec::new();
        if image.data_type() == RawImageType::U16 {
            let max_limit = (f64::from(i32::MAX - 512) / 65535.0) / 1024.0;
            delta_i.reserve(delta_f.len());
            for f in &delta_f {
                if *f < 0.0 || f64::from(*f) > max_limit {
                    return Err(Error::Decoder(format!(
                        "DNG opcode: scale {f} out of range"
                    )));
                }
                delta_i.push((1024.0 * f) as i32);
            }
        }
        Ok(Opcode::ScalePerRowOrCol {
            params,
            axis,
            delta_f,
            delta_i,
        })
    }

    /// Run every opcode, in list order.
    pub fn apply(&self, image: &mut RawImage) -> Result<()> {
        for opcode in &self.opcodes {
            match opcode {
                Opcode::FixBadPixelsConstant { value } => {
                    let dim = image.dim();
                    let off = image.crop_offset();
                    for y in 0..dim.y {
                        for x in 0..dim.x {
                            if u32::from(image.u16_at_cropped(x, y, 0)) == *value {
                                image.add_bad_pixel(off.x + x, off.y + y);
                            }
                        }
                    }
                }
                Opcode::FixBadPixelsList { bad_pixels } => {
                    for pos in bad_pixels {
                        image.add_bad_pixel((pos & 0xffff) as usize, (pos >> 16) as usize);
                    }
                }
                Opcode::TrimBounds { roi } => {
                    image.sub_frame(*roi);
                }
                Opcode::Lookup { params, lookup } => {
                    params.apply_u16(image, |_, _, v| lookup[v as usize]);
                }
                Opcode::OffsetPerRowOrCol {
                    params,
                    axis,
                    delta_f,
                    delta_i,
                } => match image.data_type() {
                    RawImageType::U16 => params.apply_u16(image, |x, y, v| {
                        clamp_bits(i64::from(delta_i[axis.select(x, y)]) + i64::from(v), 16)
                    }),
                    RawImageType::F32 => params.apply_f32(image, |x, y, v| {
                        delta_f[axis.select(x, y)] + v
                    }),
                },
                Opcode::ScalePerRowOrCol {
                    params,
                    axis,
                    delta_f,
                    delta_i,
                } => match image.data_type() {
                    RawImageType::U16 => params.apply_u16(image, |x, y, v| {
                        clamp_bits(
                            (i64::from(delta_i[axis.select(x, y)]) * i64::from(v) + 512) >> 10,
                            16,
                        )
                    }),
                    RawImageType::F32 => params.apply_f32(image, |x, y, v| {
                        delta_f[axis.select(x, y)] * v
                    }),
                },
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod test {
    use super::DngOpcodes;
    use crate::bytestream::{ByteStream, Endian};
    use crate::rawimage::{Point, RawImage};

    /// Serialize an opcode list from (code, optional, payload).
    fn opcode_list(ops: &[(u32, bool, Vec<u8>)]) -> Vec<u8> {
        let mut out = Vec::new();
        out.extend_from_slice(&(ops.len() as u32).to_be_bytes());
        for (code, optional, payload) in ops {
            out.extend_from_slice(&code.to_be_bytes());
            out.extend_from_slice(&1_u32.to_be_bytes()); // version
            out.extend_from_slice(&u32::from(*optional).to_be_bytes());
            out.extend_from_slice(&(payload.len() as u32).to_be_bytes());
            out.extend_from_slice(payload);
        }
        out
    }

    fn roi_bytes(top: u32, left: u32, bottom: u32, right: u32) -> Vec<u8> {
        let mut out = Vec::new();
        for v in [top, left, bottom, right] {
            out.extend_from_slice(&v.to_be_bytes());
        }
        out
    }

    fn pixel_params(roi: Vec<u8>, planes: u32) -> Vec<u8> {
        let mut out = roi;
        out.extend_from_slice(&0_u32.to_be_bytes()); // first plane
        out.extend_from_slice(&planes.to_be_bytes());
        out.extend_from_slice(&1_u32.to_be_bytes()); // row pitch
        out.extend_from_slice(&1_u32.to_be_bytes()); // col pitch
        out
    }

    fn image_20x20(value: u16) -> RawImage {
        let mut img = RawImage::new_u16(Point::new(20, 20), 1);
        img.create_data();
        for p in img.u16_data_mut() {
            *p = value;
        }
        img
    }

    #[test]
    fn test_unknown_opcode() {
        let img = image_20x20(0);
        // unknown non-optional fails
        let list = opcode_list(&[(100, false, vec![])]);
        assert!(DngOpcodes::parse(&img, ByteStream::new(&list, Endian::Big)).is_err());
        // unknown optional is skipped silently
        let list = opcode_list(&[(100, true, vec![1, 2, 3])]);
        assert!(DngOpcodes::parse(&img, ByteStream::new(&list, Endian::Big)).is_ok());
        // known but unimplemented behaves the same
        let list = opcode_list(&[(9, false, vec![])]);
        assert!(DngOpcodes::parse(&img, ByteStream::new(&list, Endian::Big)).is_err());
    }

    #[test]
    fn test_identity_table_map_is_noop() {
        let mut img = image_20x20(1234);
        let mut payload = pixel_params(roi_bytes(0, 0, 20, 20), 1);
        payload.extend_from_slice(&65536_u32.to_be_bytes());
        for i in 0..=65535_u16 {
            payload.extend_from_slice(&i.to_be_bytes());
        }
        let list = opcode_list(&[(7, false, payload)]);
        let codes = DngOpcodes::parse(&img, ByteStream::new(&list, Endian::Big)).unwrap();
        codes.apply(&mut img).unwrap();
        assert_eq!(img.u16_at(5, 5, 0), 1234);
    }

    #[test]
    fn test_trim_delta_scale_ordering() {
        // trim to 10x10, add a per row offset of 5
        // output units, then scale by 1.0
        let mut img = image_20x20(1000);

        let trim = roi_bytes(0, 0, 10, 10);

        let mut delta = pixel_params(roi_bytes(0, 0, 10, 10), 1);
        delta.extend_from_slice(&10_u32.to_be_bytes());
        for _ in 0..10 {
            delta.extend_from_slice(&(5.0_f32 / 65535.0).to_be_bytes());
        }

        let mut scale = pixel_params(roi_bytes(0, 0, 10, 10), 1);
        scale.extend_from_slice(&10_u32.to_be_bytes());
        for _ in 0..10 {
            scale.extend_from_slice(&1.0_f32.to_be_bytes());
        }

        let list = opcode_list(&[(6, false, trim), (10, false, delta), (12, false, scale)]);
        let codes = DngOpcodes::parse(&img, ByteStream::new(&list, Endian::Big)).unwrap();
        codes.apply(&mut img).unwrap();

        assert_eq!(img.dim(), Point::new(10, 10));
        // the trimmed region went 1000 -> 1005 -> 1005
        assert_eq!(img.u16_at_cropped(0, 0, 0), 1005);
        assert_eq!(img.u16_at_cropped(9, 9, 0), 1005);
        // the surrounding border is untouched
        assert_eq!(img.u16_at(15, 15, 0), 1000);
        assert_eq!(img.u16_at(5, 12, 0), 1000);
    }

    #[test]
    fn test_scale_doubles() {
        let mut img = image_20x20(1000);
        let mut scale = pixel_params(roi_bytes(0, 0, 20, 20), 1);
        scale.extend_from_slice(&20_u32.to_be_bytes());
        for _ in 0..20 {
            scale.extend_from_slice(&2.0_f32.to_be_bytes());
        }
        let list = opcode_list(&[(12, false, scale)]);
        let codes = DngOpcodes::parse(&img, ByteStream::new(&list, Endian::Big)).unwrap();
        codes.apply(&mut img).unwrap();
        // (2048 * 1000 + 512) >> 10
        assert_eq!(img.u16_at(0, 0, 0), 2000);
    }

    #[test]
    fn test_bad_pixels_constant() {
        let mut img = image_20x20(0);
        img.u16_row_mut(3)[7] = 99;
        let mut payload = Vec::new();
        payload.extend_from_slice(&0_u32.to_be_bytes()); // look for 0
        payload.extend_from_slice(&0_u32.to_be_bytes()); // phase
        let list = opcode_list(&[(4, false, payload)]);
        let codes = DngOpcodes::parse(&img, ByteStream::new(&list, Endian::Big)).unwrap();
        codes.apply(&mut img).unwrap();
        // every pixel but (7, 3) is bad
        assert_eq!(img.bad_pixels().positions().len(), 20 * 20 - 1);
    }

    #[test]
    fn test_roi_outside_subimage_fails() {
        let img = image_20x20(0);
        let delta = pixel_params(roi_bytes(0, 0, 25, 25), 1);
        let list = opcode_list(&[(10, false, delta)]);
        assert!(DngOpcodes::parse(&img, ByteStream::new(&list, Endian::Big)).is_err());
    }
}
