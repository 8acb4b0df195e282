// SPDX-License-Identifier: LGPL-3.0-or-later
/*
 * rawspeed - tests/testsuite.rs
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

//! End to end decoding over synthetic files.

use rawspeed::{decode, Buffer, Camera, CameraMetaData, CameraSensorInfo, Error, RawImageData};

/// Minimal little endian TIFF writer for the tests.
struct TiffWriter {
    entries: Vec<(u16, u16, u32, Vec<u8>)>,
}

impl TiffWriter {
    fn new() -> TiffWriter {
        TiffWriter {
            entries: Vec::new(),
        }
    }

    fn short(mut self, tag: u16, value: u16) -> Self {
        self.entries.push((tag, 3, 1, value.to_le_bytes().to_vec()));
        self
    }

    fn shorts(mut self, tag: u16, values: &[u16]) -> Self {
        let bytes: Vec<u8> = values.iter().flat_map(|v| v.to_le_bytes()).collect();
        self.entries.push((tag, 3, values.len() as u32, bytes));
        self
    }

    fn long(mut self, tag: u16, value: u32) -> Self {
        self.entries.push((tag, 4, 1, value.to_le_bytes().to_vec()));
        self
    }

    fn ascii(mut self, tag: u16, value: &str) -> Self {
        let mut bytes = value.as_bytes().to_vec();
        bytes.push(0);
        let count = bytes.len() as u32;
        self.entries.push((tag, 2, count, bytes));
        self
    }

    fn bytes(mut self, tag: u16, value: &[u8]) -> Self {
        self.entries.push((tag, 1, value.len() as u32, value.to_vec()));
        self
    }

    fn serialize(&self, payload_offset_tag: u16, payload: &[u8]) -> Vec<u8> {
        // two passes so the strip offset can point past the header
        let probe = self.serialize_with(payload_offset_tag, 0);
        let data_offset = probe.len() as u32;
        let mut out = self.serialize_with(payload_offset_tag, data_offset);
        out.extend_from_slice(payload);
        out
    }

    fn serialize_with(&self, payload_offset_tag: u16, payload_offset: u32) -> Vec<u8> {
        let mut entries = self.entries.clone();
        entries.sort_by_key(|e| e.0);
        let n = entries.len();
        let data_start = 8 + 2 + 12 * n as u32 + 4;
        let mut out = vec![0x49, 0x49, 0x2a, 0x00, 8, 0, 0, 0];
        out.extend_from_slice(&(n as u16).to_le_bytes());
        let mut tail: Vec<u8> = Vec::new();
        for (tag, type_, count, bytes) in &entries {
            out.extend_from_slice(&tag.to_le_bytes());
            out.extend_from_slice(&type_.to_le_bytes());
            out.extend_from_slice(&count.to_le_bytes());
            if *tag == payload_offset_tag {
                out.extend_from_slice(&payload_offset.to_le_bytes());
            } else if bytes.len() <= 4 {
                let mut inline = bytes.clone();
                inline.resize(4, 0);
                out.extend_from_slice(&inline);
            } else {
                let offset = data_start + tail.len() as u32;
                out.extend_from_slice(&offset.to_le_bytes());
                tail.extend_from_slice(bytes);
            }
        }
        out.extend_from_slice(&0_u32.to_le_bytes());
        out.extend_from_slice(&tail);
        out
    }
}

fn checksum(image: &rawspeed::RawImage) -> u16 {
    let crc = crc::Crc::<u16>::new(&crc::CRC_16_IBM_3740);
    let mut digest = crc.digest();
    match image.data() {
        RawImageData::U16(data) => {
            for v in data {
                digest.update(&v.to_le_bytes());
            }
        }
        RawImageData::F32(data) => {
            for v in data {
                digest.update(&v.to_le_bytes());
            }
        }
    }
    digest.finalize()
}

mod tags {
    pub const IMAGE_WIDTH: u16 = 0x0100;
    pub const IMAGE_LENGTH: u16 = 0x0101;
    pub const BITS_PER_SAMPLE: u16 = 0x0102;
    pub const COMPRESSION: u16 = 0x0103;
    pub const PHOTOMETRIC: u16 = 0x0106;
    pub const MAKE: u16 = 0x010f;
    pub const MODEL: u16 = 0x0110;
    pub const STRIP_OFFSETS: u16 = 0x0111;
    pub const SAMPLES_PER_PIXEL: u16 = 0x0115;
    pub const ROWS_PER_STRIP: u16 = 0x0116;
    pub const STRIP_BYTE_COUNTS: u16 = 0x0117;
    pub const CFA_REPEAT_PATTERN_DIM: u16 = 0x828d;
    pub const CFA_PATTERN: u16 = 0x828e;
    pub const DNG_VERSION: u16 = 0xc612;
    pub const BLACK_LEVEL: u16 = 0xc61a;
    pub const WHITE_LEVEL: u16 = 0xc61d;
}

/// A 4x4 uncompressed 16 bit CFA DNG.
fn build_dng(pixels: &[u16]) -> Vec<u8> {
    assert_eq!(pixels.len(), 16);
    let payload: Vec<u8> = pixels.iter().flat_map(|v| v.to_le_bytes()).collect();
    TiffWriter::new()
        .ascii(tags::MAKE, "SomeVendor")
        .ascii(tags::MODEL, "Some Camera")
        .bytes(tags::DNG_VERSION, &[1, 4, 0, 0])
        .long(tags::IMAGE_WIDTH, 4)
        .long(tags::IMAGE_LENGTH, 4)
        .short(tags::BITS_PER_SAMPLE, 16)
        .short(tags::COMPRESSION, 1)
        .short(tags::PHOTOMETRIC, 32803)
        .short(tags::SAMPLES_PER_PIXEL, 1)
        .long(tags::ROWS_PER_STRIP, 4)
        .long(tags::STRIP_BYTE_COUNTS, 32)
        .shorts(tags::CFA_REPEAT_PATTERN_DIM, &[2, 2])
        .bytes(tags::CFA_PATTERN, &[0, 1, 1, 2])
        .short(tags::BLACK_LEVEL, 100)
        .short(tags::WHITE_LEVEL, 4000)
        .long(tags::STRIP_OFFSETS, 0)
        .serialize(tags::STRIP_OFFSETS, &payload)
}

#[test]
fn test_unknown_format() {
    let buffer = Buffer::new(vec![0_u8; 64]);
    let meta = CameraMetaData::new();
    assert!(matches!(
        decode(&buffer, &meta, false),
        Err(Error::Parse(_))
    ));
}

#[test]
fn test_dng_end_to_end() {
    let pixels: Vec<u16> = (0..16).map(|i| 1000 + 100 * i).collect();
    let buffer = Buffer::new(build_dng(&pixels));
    let meta = CameraMetaData::new();

    let image = decode(&buffer, &meta, false).unwrap();
    assert_eq!(image.dim().x, 4);
    assert_eq!(image.dim().y, 4);
    assert_eq!(image.cfa.as_string(), "RGGB");
    assert_eq!(image.black_level, 100);
    assert_eq!(image.white_point, 4000);
    assert_eq!(image.metadata.make, "SomeVendor");
    for (i, expect) in pixels.iter().enumerate() {
        assert_eq!(image.u16_at(i % 4, i / 4, 0), *expect);
    }
}

#[test]
fn test_decode_is_deterministic() {
    let pixels: Vec<u16> = (0..16).map(|i| 4000 - 13 * i).collect();
    let data = build_dng(&pixels);

    let buffer = Buffer::new(data.clone());
    let meta = CameraMetaData::new();
    let first = decode(&buffer, &meta, false).unwrap();

    let buffer2 = Buffer::new(data);
    let second = decode(&buffer2, &meta, false).unwrap();

    // decoding the same bytes twice is bit identical
    assert_eq!(checksum(&first), checksum(&second));
}

#[test]
fn test_unknown_camera_gate() {
    let pixels: Vec<u16> = vec![1000; 16];
    let buffer = Buffer::new(build_dng(&pixels));

    // an empty database fails only when the caller demands support
    let meta = CameraMetaData::new();
    assert!(decode(&buffer, &meta, false).is_ok());

    // DNGs are decodable regardless; but a database entry marking
    // the camera unsupported is honoured
    let mut meta = CameraMetaData::new();
    let mut camera = Camera::new("SomeVendor", "Some Camera", "");
    camera.supported = false;
    meta.add_camera(camera);
    assert!(matches!(
        decode(&buffer, &meta, true),
        Err(Error::UnsupportedCamera(_))
    ));
}

#[test]
fn test_camera_levels_apply() {
    let pixels: Vec<u16> = vec![2000; 16];
    let buffer = Buffer::new(build_dng(&pixels));

    let mut meta = CameraMetaData::new();
    let mut camera = Camera::new("SomeVendor", "Some Camera", "");
    camera.sensor_info = vec![CameraSensorInfo::new(128, 3500, 0, 0, vec![])];
    meta.add_camera(camera);

    let image = decode(&buffer, &meta, true).unwrap();
    // the database sensor levels win over the file tags
    assert_eq!(image.black_level, 128);
    assert_eq!(image.white_point, 3500);
}

#[test]
fn test_truncated_dng_fails_cleanly() {
    let pixels: Vec<u16> = vec![1000; 16];
    let mut data = build_dng(&pixels);
    // chop most of the pixel payload off
    data.truncate(data.len() - 24);
    let buffer = Buffer::new(data);
    let meta = CameraMetaData::new();
    // a named error, not a panic, and no partial image
    assert!(decode(&buffer, &meta, false).is_err());
}
