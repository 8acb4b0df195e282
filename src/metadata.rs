// SPDX-License-Identifier: LGPL-3.0-or-later
/*
 * rawspeed - metadata.rs
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

//! The camera support database.
//!
//! Maps `(make, model, mode)` to a support profile: mosaic, crop,
//! masked sensor areas, per ISO sensor levels and decoder hints. The
//! database is filled by the caller, typically from `cameras.xml`;
//! the XML parsing itself is not this crate's concern.

use std::collections::HashMap;

use crate::cfa::ColorFilterArray;
use crate::utils::trim_spaces;

/// A strip of masked pixels along one edge of the sensor. Their mean
/// defines the per channel black level.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct BlackArea {
    /// Distance from the edge, in pixels.
    pub offset: usize,
    /// Width of the strip, in pixels.
    pub size: usize,
    /// A vertical strip runs along the left edge, a horizontal one
    /// along the top.
    pub is_vertical: bool,
}

impl BlackArea {
    pub fn new(offset: usize, size: usize, is_vertical: bool) -> BlackArea {
        BlackArea {
            offset,
            size,
            is_vertical,
        }
    }
}

/// Sensor levels for a range of ISO speeds. `iso_max == 0` leaves the
/// range open ended.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct CameraSensorInfo {
    pub black_level: i32,
    pub white_level: i32,
    pub iso_min: i32,
    pub iso_max: i32,
    pub black_level_separate: Vec<i32>,
}

impl CameraSensorInfo {
    pub fn new(
        black_level: i32,
        white_level: i32,
        iso_min: i32,
        iso_max: i32,
        black_level_separate: Vec<i32>,
    ) -> CameraSensorInfo {
        CameraSensorInfo {
            black_level,
            white_level,
            iso_min,
            iso_max,
            black_level_separate,
        }
    }

    /// A default profile applies to any ISO.
    pub fn is_default(&self) -> bool {
        self.iso_min == 0 && self.iso_max == 0
    }

    pub fn covers_iso(&self, iso: i32) -> bool {
        (iso >= self.iso_min && iso <= self.iso_max) || (iso >= self.iso_min && self.iso_max == 0)
    }
}

/// Decoder hints, free form key/value strings from the database.
#[derive(Clone, Debug, Default)]
pub struct Hints {
    data: HashMap<String, String>,
}

impl Hints {
    pub fn add(&mut self, key: &str, value: &str) {
        self.data.insert(key.to_string(), value.to_string());
    }

    pub fn has(&self, key: &str) -> bool {
        self.data.contains_key(key)
    }

    /// Parse the hint value, falling back to `default` when the hint
    /// is absent or does not parse.
    pub fn get<T: std::str::FromStr>(&self, key: &str, default: T) -> T {
        self.data
            .get(key)
            .and_then(|v| v.parse().ok())
            .unwrap_or(default)
    }

    pub fn get_bool(&self, key: &str, default: bool) -> bool {
        self.data
            .get(key)
            .map(|v| v == "true")
            .unwrap_or(default)
    }
}

/// A camera support profile.
#[derive(Clone, Debug, Default)]
pub struct Camera {
    pub make: String,
    pub model: String,
    pub mode: String,
    pub canonical_make: String,
    pub canonical_model: String,
    pub canonical_alias: String,
    pub canonical_id: String,
    pub aliases: Vec<String>,
    pub canonical_aliases: Vec<String>,
    pub cfa: ColorFilterArray,
    pub supported: bool,
    pub crop_pos: (usize, usize),
    /// Negative values crop from the opposite edge.
    pub crop_size: (i64, i64),
    pub black_areas: Vec<BlackArea>,
    pub sensor_info: Vec<CameraSensorInfo>,
    pub decoder_version: u32,
    pub hints: Hints,
}

impl Camera {
    pub fn new(make: &str, model: &str, mode: &str) -> Camera {
        Camera {
            make: make.to_string(),
            model: model.to_string(),
            mode: mode.to_string(),
            canonical_make: make.to_string(),
            canonical_model: model.to_string(),
            canonical_alias: model.to_string(),
            supported: true,
            ..Default::default()
        }
    }

    /// A synthetic camera for `aliases[alias_num]`, sharing every
    /// field but the model and canonical alias.
    fn for_alias(&self, alias_num: usize) -> Camera {
        let mut camera = self.clone();
        camera.model = self.aliases[alias_num].clone();
        camera.canonical_alias = self
            .canonical_aliases
            .get(alias_num)
            .cloned()
            .unwrap_or_else(|| camera.model.clone());
        camera.aliases.clear();
        camera.canonical_aliases.clear();
        camera
    }

    /// The best sensor profile for `iso`. An ISO specific profile
    /// wins over the default one; with no covering profile and no
    /// default there is nothing to return.
    pub fn sensor_info(&self, iso: i32) -> Option<&CameraSensorInfo> {
        if self.sensor_info.len() <= 1 {
            return self.sensor_info.first();
        }
        let candidates: Vec<&CameraSensorInfo> = self
            .sensor_info
            .iter()
            .filter(|info| info.covers_iso(iso))
            .collect();
        // a default profile covers every ISO, so it is always among
        // the candidates; an ISO specific profile wins over it
        candidates
            .iter()
            .find(|info| !info.is_default())
            .or_else(|| candidates.first())
            .copied()
    }
}

#[derive(Clone, Debug, Hash, PartialEq, Eq)]
struct CameraId {
    make: String,
    model: String,
    mode: String,
}

impl CameraId {
    fn new(make: &str, model: &str, mode: &str) -> CameraId {
        CameraId {
            make: trim_spaces(make),
            model: trim_spaces(model),
            mode: trim_spaces(mode),
        }
    }
}

/// All known cameras, keyed by `(make, model, mode)`.
#[derive(Debug, Default)]
pub struct CameraMetaData {
    cameras: HashMap<CameraId, Camera>,
    /// CHDK dumps carry no metadata and are recognized by their
    /// exact file length.
    chdk_cameras: HashMap<usize, CameraId>,
}

impl CameraMetaData {
    pub fn new() -> CameraMetaData {
        CameraMetaData::default()
    }

    /// Add a camera, then synthesize one entry per alias. A
    /// duplicate `(make, model, mode)` key is skipped with a warning.
    pub fn add_camera(&mut self, camera: Camera) {
        for i in 0..camera.aliases.len() {
            self.add_one(camera.for_alias(i));
        }
        self.add_one(camera);
    }

    fn add_one(&mut self, camera: Camera) {
        let id = CameraId::new(&camera.make, &camera.model, &camera.mode);
        if self.cameras.contains_key(&id) {
            log::warn!(
                "CameraMetaData: duplicate entry for camera {} {}, skipping",
                camera.make,
                camera.model
            );
            return;
        }
        if camera.mode.contains("chdk") {
            let filesize = camera.hints.get("filesize", 0_usize);
            if filesize == 0 {
                log::warn!(
                    "CameraMetaData: CHDK camera {} {} has no filesize hint",
                    camera.make,
                    camera.model
                );
            } else {
                self.chdk_cameras.insert(filesize, id.clone());
            }
        }
        self.cameras.insert(id, camera);
    }

    pub fn get_camera(&self, make: &str, model: &str, mode: &str) -> Option<&Camera> {
        self.cameras.get(&CameraId::new(make, model, mode))
    }

    /// Any mode for `(make, model)`.
    pub fn get_camera_any_mode(&self, make: &str, model: &str) -> Option<&Camera> {
        let make = trim_spaces(make);
        let model = trim_spaces(model);
        self.cameras
            .iter()
            .find(|(id, _)| id.make == make && id.model == model)
            .map(|(_, camera)| camera)
    }

    pub fn has_camera(&self, make: &str, model: &str, mode: &str) -> bool {
        self.get_camera(make, model, mode).is_some()
    }

    pub fn chdk_camera(&self, filesize: usize) -> Option<&Camera> {
        self.chdk_cameras
            .get(&filesize)
            .and_then(|id| self.cameras.get(id))
    }

    /// Mark every camera of `make` unsupported.
    pub fn disable_make(&mut self, make: &str) {
        for camera in self.cameras.values_mut() {
            if camera.make == make {
                camera.supported = false;
            }
        }
    }

    pub fn disable_camera(&mut self, make: &str, model: &str) {
        for camera in self.cameras.values_mut() {
            if camera.make == make && camera.model == model {
                camera.supported = false;
            }
        }
    }
}

#[cfg(test)]
mod test {
    use super::{Camera, CameraMetaData, CameraSensorInfo};

    #[test]
    fn test_sensor_info_selection() {
        // an ISO specific profile wins, a gap yields nothing
        let mut camera = Camera::new("Make", "Model", "");
        camera.sensor_info = vec![
            CameraSensorInfo::new(100, 4095, 100, 800, vec![]),
            CameraSensorInfo::new(120, 4095, 1600, 0, vec![]),
        ];
        assert_eq!(camera.sensor_info(400).unwrap().black_level, 100);
        assert_eq!(camera.sensor_info(3200).unwrap().black_level, 120);
        assert!(camera.sensor_info(1200).is_none());
    }

    #[test]
    fn test_sensor_info_default_fallback() {
        let mut camera = Camera::new("Make", "Model", "");
        camera.sensor_info = vec![
            CameraSensorInfo::new(128, 4095, 0, 0, vec![]),
            CameraSensorInfo::new(140, 4095, 1600, 3200, vec![]),
        ];
        // ISO specific profile wins over the default
        assert_eq!(camera.sensor_info(1600).unwrap().black_level, 140);
        // anything else falls back to the default
        assert_eq!(camera.sensor_info(100).unwrap().black_level, 128);
    }

    #[test]
    fn test_covers_iso_open_range() {
        let info = CameraSensorInfo::new(0, 0, 200, 0, vec![]);
        assert!(!info.covers_iso(100));
        assert!(info.covers_iso(200));
        assert!(info.covers_iso(102400));

        let closed = CameraSensorInfo::new(0, 0, 200, 400, vec![]);
        assert!(closed.covers_iso(400));
        assert!(!closed.covers_iso(401));
    }

    #[test]
    fn test_aliases_and_duplicates() {
        let mut meta = CameraMetaData::new();
        let mut camera = Camera::new("NIKON CORPORATION", "NIKON D90", "");
        camera.aliases = vec!["D90".to_string()];
        meta.add_camera(camera);

        assert!(meta.has_camera("NIKON CORPORATION", "NIKON D90", ""));
        assert!(meta.has_camera("NIKON CORPORATION", "D90", ""));
        // whitespace is trimmed on lookup
        assert!(meta.has_camera(" NIKON CORPORATION ", "NIKON D90 ", ""));

        // later duplicate is skipped, the original entry stays
        let mut dup = Camera::new("NIKON CORPORATION", "NIKON D90", "");
        dup.supported = false;
        meta.add_camera(dup);
        assert!(
            meta.get_camera("NIKON CORPORATION", "NIKON D90", "")
                .unwrap()
                .supported
        );
    }

    #[test]
    fn test_chdk_lookup() {
        let mut meta = CameraMetaData::new();
        let mut camera = Camera::new("Canon", "PowerShot A530", "chdk");
        camera.hints.add("filesize", "7448640");
        meta.add_camera(camera);
        assert!(meta.chdk_camera(7448640).is_some());
        assert!(meta.chdk_camera(1234).is_none());
    }
}
