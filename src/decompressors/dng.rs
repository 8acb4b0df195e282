// SPDX-License-Identifier: LGPL-3.0-or-later
/*
 * rawspeed - decompressors/dng.rs
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

//! The unified DNG tile dispatcher.
//!
//! A DNG raster is a grid of tiles (or strips), each compressed on
//! its own: uncompressed packing, lossless JPEG, deflate, VC-5 or
//! lossy JPEG. Tiles decode in parallel into disjoint regions; a
//! failed tile lands in the error log and fails the image once the
//! log crosses the threshold.

use std::io::Read;

use rayon::prelude::*;

use crate::bitstream::BitOrder;
use crate::bytestream::{ByteStream, Endian};
use crate::decompressors::ljpeg::LJpegDecompressor;
use crate::decompressors::uncompressed::UncompressedDecompressor;
use crate::decompressors::vc5::VC5Decompressor;
use crate::decompressors::{check_error_log, SharedRaster};
use crate::fp::{fp16_to_fp32, fp24_to_fp32};
use crate::rawimage::{Point, RawImage, RawImageType};
use crate::utils::round_up_division;
use crate::{Error, Result};

/// The tile grid of the raster.
#[derive(Clone, Copy, Debug)]
pub(crate) struct DngTilingDescription {
    pub dim: Point,
    pub tile_w: usize,
    pub tile_h: usize,
    pub tiles_x: usize,
    pub tiles_y: usize,
    pub num_tiles: usize,
}

impl DngTilingDescription {
    pub fn new(dim: Point, tile_w: usize, tile_h: usize) -> Result<DngTilingDescription> {
        if tile_w == 0 || tile_h == 0 {
            return Err(Error::Decoder("DNG: zero tile dimensions".to_string()));
        }
        let tiles_x = round_up_division(dim.x, tile_w);
        let tiles_y = round_up_division(dim.y, tile_h);
        let num_tiles = tiles_x * tiles_y;
        if num_tiles == 0 {
            return Err(Error::Decoder("DNG: no tiles".to_string()));
        }
        Ok(DngTilingDescription {
            dim,
            tile_w,
            tile_h,
            tiles_x,
            tiles_y,
            num_tiles,
        })
    }
}

/// One tile: its data and its place in the image. Edge tiles are
/// clamped to what remains of the image.
pub(crate) struct DngSliceElement<'a> {
    pub n: usize,
    pub bs: ByteStream<'a>,
    pub off_x: usize,
    pub off_y: usize,
    pub width: usize,
    pub height: usize,
}

pub(crate) struct AbstractDngDecompressor<'a> {
    dsc: DngTilingDescription,
    slices: Vec<DngSliceElement<'a>>,
    compression: u32,
    bps: u32,
    predictor: u32,
}

impl<'a> AbstractDngDecompressor<'a> {
    pub fn new(
        dsc: DngTilingDescription,
        tile_streams: Vec<ByteStream<'a>>,
        compression: u32,
        bps: u32,
        predictor: u32,
    ) -> Result<AbstractDngDecompressor<'a>> {
        if tile_streams.len() != dsc.num_tiles {
            return Err(Error::Decoder(format!(
                "DNG: expected {} tiles, got {}",
                dsc.num_tiles,
                tile_streams.len()
            )));
        }
        let mut slices = Vec::with_capacity(dsc.num_tiles);
        for (n, bs) in tile_streams.into_iter().enumerate() {
            let column = n % dsc.tiles_x;
            let row = n / dsc.tiles_x;
            let off_x = column * dsc.tile_w;
            let off_y = row * dsc.tile_h;
            let last_column = column + 1 == dsc.tiles_x;
            let last_row = row + 1 == dsc.tiles_y;
            slices.push(DngSliceElement {
                n,
                bs,
                off_x,
                off_y,
                width: if last_column {
                    dsc.dim.x - off_x
                } else {
                    dsc.tile_w
                },
                height: if last_row {
                    dsc.dim.y - off_y
                } else {
                    dsc.tile_h
                },
            });
        }
        Ok(AbstractDngDecompressor {
            dsc,
            slices,
            compression,
            bps,
            predictor,
        })
    }

    pub fn decompress(&self, image: &mut RawImage) -> Result<()> {
        match self.compression {
            1 => self.decompress_uncompressed(image)?,
            7 => self.decompress_ljpeg(image)?,
            8 => self.decompress_deflate(image)?,
            9 => self.decompress_vc5(image)?,
            0x884c => self.decompress_lossy(image)?,
            c => {
                return Err(Error::Decoder(format!("DNG: unknown compression {c}")));
            }
        }
        check_error_log(&image.error_log(), 1)
    }

    fn decompress_uncompressed(&self, image: &mut RawImage) -> Result<()> {
        let errors = image.error_log();
        for e in &self.slices {
            // if not 8/16/32 bits per sample, integer data is
            // big endian regardless of the container
            let mut order = match e.bs.endian() {
                Endian::Big => BitOrder::Msb,
                Endian::Little => BitOrder::Lsb,
            };
            if !matches!(self.bps, 8 | 16 | 32) && image.data_type() == RawImageType::U16 {
                order = BitOrder::Msb;
            }
            let input_pitch_bits = image.cpp() * self.bps as usize * self.dsc.tile_w;
            if input_pitch_bits % 8 != 0 {
                errors.set_error(&format!(
                    "DNG tile {}: input row is not byte aligned",
                    e.n
                ));
                continue;
            }
            let mut d = UncompressedDecompressor::new(e.bs.clone());
            if let Err(err) = d.read_uncompressed_raw(
                image,
                Point::new(e.width, e.height),
                Point::new(e.off_x, e.off_y),
                input_pitch_bits / 8,
                self.bps,
                order,
            ) {
                errors.set_error(&format!("DNG tile {}: {err}", e.n));
            }
        }
        Ok(())
    }

    fn decompress_ljpeg(&self, image: &mut RawImage) -> Result<()> {
        let cpp = image.cpp();
        let dim = image.uncropped_dim();
        let pitch = image.pitch_u16();
        let errors = image.error_log();
        let raster = SharedRaster::new(image.u16_data_mut());
        self.slices.par_iter().for_each(|e| {
            // Safety: tiles cover disjoint regions.
            let out = unsafe { raster.inner_mut() };
            let result = LJpegDecompressor::new(e.bs.clone()).and_then(|d| {
                d.decompress_into(
                    out,
                    pitch,
                    cpp,
                    dim,
                    Point::new(e.off_x, e.off_y),
                    Point::new(e.width, e.height),
                )
            });
            if let Err(err) = result {
                errors.set_error(&format!("DNG tile {}: {err}", e.n));
            }
        });
        Ok(())
    }

    fn decompress_deflate(&self, image: &mut RawImage) -> Result<()> {
        if image.data_type() != RawImageType::F32 {
            return Err(Error::Decoder(
                "DNG: deflate is only used with floating point data".to_string(),
            ));
        }
        let cpp = image.cpp();
        let bytesps = self.bps as usize / 8;
        if !matches!(self.bps, 16 | 24 | 32) {
            return Err(Error::Decoder(format!(
                "DNG: unsupported floating point bit depth {}",
                self.bps
            )));
        }
        // TIFF floating point predictors: byte delta with the row
        // bytes planarized
        let pred_factor = match self.predictor {
            3 => 1,
            34894 => 2,
            34895 => 4,
            _ => 0,
        } * cpp;

        let errors = image.error_log();
        let pitch = image.pitch_f32();
        let dim = image.uncropped_dim();
        for e in &self.slices {
            if let Err(err) = self.deflate_slice(image, e, cpp, bytesps, pred_factor, pitch, dim) {
                errors.set_error(&format!("DNG tile {}: {err}", e.n));
            }
        }
        Ok(())
    }

    #[allow(clippy::too_many_arguments)]
    fn deflate_slice(
        &self,
        image: &mut RawImage,
        e: &DngSliceElement,
        cpp: usize,
        bytesps: usize,
        pred_factor: usize,
        pitch: usize,
        dim: Point,
    ) -> Result<()> {
        if e.off_x + e.width > dim.x || e.off_y + e.height > dim.y {
            return Err(Error::Decoder("tile outside the image".to_string()));
        }
        let row_bytes = self.dsc.tile_w * cpp * bytesps;
        let expected = row_bytes * self.dsc.tile_h;
        let mut inflated = Vec::with_capacity(expected);
        let mut decoder = flate2::read::ZlibDecoder::new(e.bs.full_buffer());
        decoder
            .read_to_end(&mut inflated)
            .map_err(|err| Error::Decoder(format!("inflate failed: {err}")))?;
        if inflated.len() < expected {
            return Err(Error::Decoder(format!(
                "deflate yielded {} bytes, expected {expected}",
                inflated.len()
            )));
        }

        let data = image.f32_data_mut();
        let mut row_buf = vec![0_u8; row_bytes];
        for y in 0..e.height {
            let src = &mut inflated[y * row_bytes..(y + 1) * row_bytes];
            let row: &[u8] = if pred_factor != 0 {
                // undo the horizontal byte deltas
                for i in pred_factor..row_bytes {
                    src[i] = src[i].wrapping_add(src[i - pred_factor]);
                }
                // deplanarize: sample bytes are spread across the
                // row, most significant plane first
                let planes = self.dsc.tile_w * cpp;
                for col in 0..planes {
                    for byte in 0..bytesps {
                        row_buf[col * bytesps + byte] = src[col + planes * byte];
                    }
                }
                &row_buf
            } else {
                src
            };
            let dest = &mut data[(e.off_y + y) * pitch + e.off_x * cpp..];
            for col in 0..e.width * cpp {
                let bits = match bytesps {
                    2 => fp16_to_fp32(u16::from_be_bytes([row[col * 2], row[col * 2 + 1]])),
                    3 => fp24_to_fp32(
                        (u32::from(row[col * 3]) << 16)
                            | (u32::from(row[col * 3 + 1]) << 8)
                            | u32::from(row[col * 3 + 2]),
                    ),
                    _ => u32::from_be_bytes([
                        row[col * 4],
                        row[col * 4 + 1],
                        row[col * 4 + 2],
                        row[col * 4 + 3],
                    ]),
                };
                dest[col] = f32::from_bits(bits);
            }
        }
        Ok(())
    }

    fn decompress_vc5(&self, image: &mut RawImage) -> Result<()> {
        let errors = image.error_log();
        for e in &self.slices {
            if e.off_x != 0 || e.off_y != 0 || e.width != self.dsc.dim.x || e.height != self.dsc.dim.y
            {
                errors.set_error(&format!(
                    "DNG tile {}: VC-5 expects to fill the whole image, not a tile",
                    e.n
                ));
                continue;
            }
            let result =
                VC5Decompressor::new(image, e.bs.clone()).and_then(|d| d.decompress(image));
            if let Err(err) = result {
                errors.set_error(&format!("DNG tile {}: {err}", e.n));
            }
        }
        Ok(())
    }

    fn decompress_lossy(&self, image: &mut RawImage) -> Result<()> {
        let cpp = image.cpp();
        let dim = image.uncropped_dim();
        let pitch = image.pitch_u16();
        let errors = image.error_log();
        let raster = SharedRaster::new(image.u16_data_mut());
        self.slices.par_iter().for_each(|e| {
            // Safety: tiles cover disjoint regions.
            let out = unsafe { raster.inner_mut() };
            if let Err(err) = Self::lossy_slice(out, pitch, cpp, dim, e) {
                errors.set_error(&format!("DNG tile {}: {err}", e.n));
            }
        });
        Ok(())
    }

    fn lossy_slice(
        out: &mut [u16],
        pitch: usize,
        cpp: usize,
        dim: Point,
        e: &DngSliceElement,
    ) -> Result<()> {
        let mut decoder = jpeg_decoder::Decoder::new(std::io::Cursor::new(e.bs.full_buffer()));
        let pixels = decoder
            .decode()
            .map_err(|err| Error::Decoder(format!("JPEG: {err}")))?;
        let info = decoder
            .info()
            .ok_or_else(|| Error::Decoder("JPEG: no frame info".to_string()))?;
        let jpeg_cpp = match info.pixel_format {
            jpeg_decoder::PixelFormat::L8 => 1,
            jpeg_decoder::PixelFormat::RGB24 => 3,
            f => {
                return Err(Error::Decoder(format!("JPEG: unsupported pixel format {f:?}")));
            }
        };
        if jpeg_cpp != cpp {
            return Err(Error::Decoder(format!(
                "JPEG: component count {jpeg_cpp} does not match image ({cpp})"
            )));
        }
        let jw = usize::from(info.width);
        let jh = usize::from(info.height);
        if jw < e.width || jh < e.height {
            return Err(Error::Decoder("JPEG: tile smaller than expected".to_string()));
        }
        if e.off_x + e.width > dim.x || e.off_y + e.height > dim.y {
            return Err(Error::Decoder("tile outside the image".to_string()));
        }
        for y in 0..e.height {
            let src = &pixels[y * jw * cpp..];
            let dest = &mut out[(e.off_y + y) * pitch + e.off_x * cpp..];
            for s in 0..e.width * cpp {
                dest[s] = u16::from(src[s]);
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod test {
    use super::DngTilingDescription;
    use crate::rawimage::Point;

    #[test]
    fn test_tiling_description() {
        let dsc = DngTilingDescription::new(Point::new(100, 60), 32, 32).unwrap();
        assert_eq!(dsc.tiles_x, 4);
        assert_eq!(dsc.tiles_y, 2);
        assert_eq!(dsc.num_tiles, 8);
        assert!(DngTilingDescription::new(Point::new(100, 60), 0, 32).is_err());
    }

    #[test]
    fn test_edge_tile_clamping() {
        use super::AbstractDngDecompressor;
        use crate::bytestream::{ByteStream, Endian};

        let dsc = DngTilingDescription::new(Point::new(100, 60), 32, 32).unwrap();
        let data = vec![0_u8; 16];
        let streams: Vec<ByteStream> = (0..8)
            .map(|_| ByteStream::new(&data, Endian::Little))
            .collect();
        let d = AbstractDngDecompressor::new(dsc, streams, 7, 16, 1).unwrap();
        // last column tile is 100 - 3*32 = 4 wide
        assert_eq!(d.slices[3].width, 4);
        assert_eq!(d.slices[3].off_x, 96);
        // last row tile is 60 - 32 = 28 tall
        assert_eq!(d.slices[7].height, 28);
        assert_eq!(d.slices[7].off_y, 32);
    }
}
