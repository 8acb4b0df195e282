// SPDX-License-Identifier: LGPL-3.0-or-later
/*
 * rawspeed - decoders/mod.rs
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

//! The per format decoder frontends.
//!
//! One decoder per file family. Each one locates the raw strip or
//! tiles in the container, validates dimensions against hard upper
//! bounds, picks the decompressor and fills the [`RawImage`].

pub(crate) mod arw;
pub(crate) mod ciff;
pub(crate) mod cr2;
pub(crate) mod dcs;
pub(crate) mod dng;
pub(crate) mod erf;
pub(crate) mod mef;
pub(crate) mod mrw;
pub(crate) mod nef;
pub(crate) mod orf;
pub(crate) mod pef;
pub(crate) mod raf;
pub(crate) mod rw2;
pub(crate) mod srw;
pub(crate) mod x3f;

use std::collections::HashMap;

use crate::buffer::Buffer;
use crate::bytestream::{ByteStream, Endian};
use crate::metadata::{Camera, CameraMetaData};
use crate::rawimage::{RawImage, Rect};
use crate::tiff::{tags, Ifd, RootIfd};
use crate::{Error, Result};

/// Guard against pathological dimensions in hostile files. No
/// supported sensor comes close.
pub(crate) const MAX_DIM: usize = 20000;

/// The decoder interface. `check_support` consults the camera
/// database, `decode_raw` produces the pixels, `decode_metadata`
/// resolves camera metadata into the image.
pub trait RawDecoder<'a> {
    fn check_support(&self, meta: &CameraMetaData) -> Result<()>;
    fn decode_raw(&self, meta: &CameraMetaData) -> Result<RawImage>;
    fn decode_metadata(&self, image: &mut RawImage, meta: &CameraMetaData) -> Result<()>;

    /// Decoder version, compared against the database entry so stale
    /// support files do not claim newer decodings.
    fn decoder_version(&self) -> u32 {
        0
    }
}

/// Constructor for a TIFF based decoder.
pub(crate) type TiffDecoderFactory =
    for<'a> fn(&'a Buffer, RootIfd<'a>) -> Result<Box<dyn RawDecoder<'a> + 'a>>;

macro_rules! tiff_factory {
    ($name:ident, $decoder:ty) => {
        fn $name<'a>(buffer: &'a Buffer, root: RootIfd<'a>) -> Result<Box<dyn RawDecoder<'a> + 'a>> {
            Ok(Box::new(<$decoder>::new(buffer, root)?))
        }
    };
}

tiff_factory!(arw_factory, arw::ArwDecoder);
tiff_factory!(cr2_factory, cr2::Cr2Decoder);
tiff_factory!(dcs_factory, dcs::DcsDecoder);
tiff_factory!(erf_factory, erf::ErfDecoder);
tiff_factory!(mef_factory, mef::MefDecoder);
tiff_factory!(nef_factory, nef::NefDecoder);
tiff_factory!(orf_factory, orf::OrfDecoder);
tiff_factory!(pef_factory, pef::PefDecoder);
tiff_factory!(rw2_factory, rw2::Rw2Decoder);
tiff_factory!(srw_factory, srw::SrwDecoder);

lazy_static::lazy_static! {
    /// Factory map, keyed by the Exif make string. This is where
    /// new makes are registered; a make never maps to more than one
    /// decoder, so selection has no ordering to get wrong.
    static ref TIFF_FACTORY_MAP: HashMap<&'static str, TiffDecoderFactory> = HashMap::from([
        ("SONY", arw_factory as TiffDecoderFactory),
        ("Canon", cr2_factory as TiffDecoderFactory),
        ("KODAK", dcs_factory as TiffDecoderFactory),
        ("SEIKO EPSON CORP.", erf_factory as TiffDecoderFactory),
        ("Mamiya-OP Co.,Ltd.", mef_factory as TiffDecoderFactory),
        ("NIKON CORPORATION", nef_factory as TiffDecoderFactory),
        ("NIKON", nef_factory as TiffDecoderFactory),
        ("OLYMPUS IMAGING CORP.", orf_factory as TiffDecoderFactory),
        ("OLYMPUS CORPORATION", orf_factory as TiffDecoderFactory),
        ("OLYMPUS OPTICAL CO.,LTD", orf_factory as TiffDecoderFactory),
        ("PENTAX Corporation", pef_factory as TiffDecoderFactory),
        ("RICOH IMAGING COMPANY, LTD.", pef_factory as TiffDecoderFactory),
        ("PENTAX", pef_factory as TiffDecoderFactory),
        ("Panasonic", rw2_factory as TiffDecoderFactory),
        ("LEICA", rw2_factory as TiffDecoderFactory),
        ("LEICA CAMERA AG", rw2_factory as TiffDecoderFactory),
        ("SAMSUNG", srw_factory as TiffDecoderFactory),
    ]);
}

/// Select the decoder for a parsed TIFF. The DNG check runs first,
/// keyed on the DNGVersion tag; everything else resolves through the
/// factory map on its make string.
pub(crate) fn get_tiff_decoder<'a>(
    buffer: &'a Buffer,
    root: RootIfd<'a>,
) -> Result<Box<dyn RawDecoder<'a> + 'a>> {
    if dng::is_appropriate(&root) {
        return Ok(Box::new(dng::DngDecoder::new(buffer, root)?));
    }
    let id = root.get_id()?;
    match TIFF_FACTORY_MAP.get(id.make.as_str()) {
        Some(factory) => factory(buffer, root),
        None => Err(Error::Parse(format!(
            "no decoder for TIFF from make \"{}\"",
            id.make
        ))),
    }
}

/// Look the camera up and fail precisely when it is not supported.
pub(crate) fn check_camera_supported(
    meta: &CameraMetaData,
    make: &str,
    model: &str,
    mode: &str,
    decoder_version: u32,
) -> Result<()> {
    let camera = meta.get_camera(make, model, mode).ok_or_else(|| {
        Error::UnsupportedCamera(format!("{make} {model} mode \"{mode}\" not in database"))
    })?;
    if !camera.supported {
        return Err(Error::UnsupportedCamera(format!(
            "{make} {model} is marked unsupported"
        )));
    }
    if camera.decoder_version > decoder_version {
        return Err(Error::UnsupportedCamera(format!(
            "{make} {model} needs decoder version {} but this is {}",
            camera.decoder_version, decoder_version
        )));
    }
    Ok(())
}

/// Common `decode_metadata` body: look the camera up and apply crop,
/// mosaic, black areas and per ISO sensor levels to the image.
pub(crate) fn set_meta_data(
    image: &mut RawImage,
    meta: &CameraMetaData,
    make: &str,
    model: &str,
    mode: &str,
    iso_speed: i32,
) -> Result<()> {
    image.metadata.make = make.to_string();
    image.metadata.model = model.to_string();
    image.metadata.mode = mode.to_string();
    image.metadata.iso_speed = iso_speed;

    let camera = match meta.get_camera(make, model, mode) {
        Some(camera) => camera,
        None => {
            log::warn!("{make} {model} not in database, using file defaults");
            return Ok(());
        }
    };
    apply_camera(image, camera, iso_speed);
    Ok(())
}

pub(crate) fn apply_camera(image: &mut RawImage, camera: &Camera, iso_speed: i32) {
    image.metadata.canonical_make = camera.canonical_make.clone();
    image.metadata.canonical_model = camera.canonical_model.clone();
    image.metadata.canonical_alias = camera.canonical_alias.clone();
    image.metadata.canonical_id = camera.canonical_id.clone();

    if !camera.cfa.is_empty() {
        image.cfa = camera.cfa.clone();
    }

    // negative crop sizes count from the opposite edge
    let dim = image.dim();
    let (pos_x, pos_y) = camera.crop_pos;
    if pos_x < dim.x && pos_y < dim.y {
        let width = if camera.crop_size.0 <= 0 {
            (dim.x as i64 - pos_x as i64 + camera.crop_size.0).max(0) as usize
        } else {
            (camera.crop_size.0 as usize).min(dim.x - pos_x)
        };
        let height = if camera.crop_size.1 <= 0 {
            (dim.y as i64 - pos_y as i64 + camera.crop_size.1).max(0) as usize
        } else {
            (camera.crop_size.1 as usize).min(dim.y - pos_y)
        };
        if width > 0 && height > 0 {
            image.sub_frame(Rect::new(pos_x, pos_y, width, height));
            // keep the mosaic origin on the cropped view
            if !image.cfa.is_empty() {
                image.cfa = image.cfa.shifted(pos_x, pos_y);
            }
        }
    }

    image.black_areas = camera.black_areas.clone();
    if let Some(sensor) = camera.sensor_info(iso_speed) {
        image.black_level = sensor.black_level;
        image.white_point = sensor.white_level as u32;
        if sensor.black_level_separate.len() >= 4 {
            for i in 0..4 {
                image.black_level_separate[i] = sensor.black_level_separate[i];
            }
        }
    }
}

/// Among the IFDs carrying `tag`, the one with the widest image.
/// Most raws hide thumbnails behind the same tag set.
pub(crate) fn get_ifd_with_largest_image<'r, 'a>(
    root: &'r RootIfd<'a>,
    tag: u16,
) -> Result<&'r Ifd<'a>> {
    root.get_ifds_with_tag(tag)
        .into_iter()
        .max_by_key(|ifd| {
            ifd.entry(tags::IMAGE_WIDTH)
                .and_then(|e| e.get_u32(0).ok())
                .unwrap_or(0)
        })
        .ok_or_else(|| Error::Tiff(crate::TiffError::MissingTag(tag)))
}

/// The ISO speed, 0 when the file does not say.
pub(crate) fn get_iso(root: &RootIfd) -> i32 {
    root.get_entry_recursive(tags::ISO_SPEED_RATINGS)
        .and_then(|e| e.get_u32(0).ok())
        .map(|v| v as i32)
        .unwrap_or(0)
}

/// The strip described by the usual offset/count tag pair of `ifd`,
/// bounds checked against the file.
pub(crate) fn get_strip<'a>(
    buffer: &'a Buffer,
    ifd: &Ifd<'a>,
    endian: Endian,
) -> Result<ByteStream<'a>> {
    let offset = ifd.required_entry(tags::STRIP_OFFSETS)?.get_u32(0)? as usize;
    let count = ifd.required_entry(tags::STRIP_BYTE_COUNTS)?.get_u32(0)? as usize;
    if count == 0 {
        return Err(Error::Decoder("strip is empty, nothing to decode".to_string()));
    }
    Ok(ByteStream::new(buffer.get_data(offset, count)?, endian))
}

/// Raw dimensions of `ifd`, guarded against pathological values.
pub(crate) fn get_checked_dim(ifd: &Ifd, max_w: usize, max_h: usize) -> Result<(usize, usize)> {
    let width = ifd.required_entry(tags::IMAGE_WIDTH)?.get_u32(0)? as usize;
    let height = ifd.required_entry(tags::IMAGE_LENGTH)?.get_u32(0)? as usize;
    if width == 0 || height == 0 || width > max_w || height > max_h {
        return Err(Error::Decoder(format!(
            "unexpected image dimensions found: ({width}; {height})"
        )));
    }
    Ok((width, height))
}

#[cfg(test)]
mod test {
    use super::{apply_camera, check_camera_supported};
    use crate::cfa::{CfaColor, ColorFilterArray};
    use crate::metadata::{Camera, CameraMetaData, CameraSensorInfo};
    use crate::rawimage::{Point, RawImage};
    use crate::Error;

    #[test]
    fn test_check_camera_supported() {
        let mut meta = CameraMetaData::new();
        let mut camera = Camera::new("SONY", "ILCE-7", "");
        camera.decoder_version = 1;
        meta.add_camera(camera);

        assert!(matches!(
            check_camera_supported(&meta, "SONY", "ILCE-9", "", 1),
            Err(Error::UnsupportedCamera(_))
        ));
        assert!(matches!(
            check_camera_supported(&meta, "SONY", "ILCE-7", "", 0),
            Err(Error::UnsupportedCamera(_))
        ));
        assert!(check_camera_supported(&meta, "SONY", "ILCE-7", "", 2).is_ok());
    }

    #[test]
    fn test_apply_camera_crop_and_levels() {
        let mut camera = Camera::new("Make", "Model", "");
        camera.cfa = ColorFilterArray::rggb();
        camera.crop_pos = (1, 1);
        camera.crop_size = (-1, -1);
        camera.sensor_info = vec![CameraSensorInfo::new(128, 4000, 0, 0, vec![])];

        let mut image = RawImage::new_u16(Point::new(10, 8), 1);
        image.create_data();
        apply_camera(&mut image, &camera, 200);

        assert_eq!(image.dim(), Point::new(8, 6));
        assert_eq!(image.crop_offset(), Point::new(1, 1));
        assert_eq!(image.black_level, 128);
        assert_eq!(image.white_point, 4000);
        // CFA origin follows the crop: RGGB shifted by (1,1) is BGGR
        assert_eq!(image.cfa.color_at(0, 0), CfaColor::Blue);
    }
}
