// SPDX-License-Identifier: LGPL-3.0-or-later
/*
 * rawspeed - bin/rsidentify.rs
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

//! Identify and decode one RAW file, printing the camera, the
//! dimensions and a pixel checksum. Exit code 2 on any failure.

use getopts::Options;
use log::LevelFilter;
use simple_logger::SimpleLogger;

use rawspeed::{decode, Buffer, CameraMetaData, RawImageData};

fn process_file(name: &str) -> rawspeed::Result<()> {
    let buffer = Buffer::from_file(name)?;
    // an empty database: decoding proceeds with file defaults
    let meta = CameraMetaData::new();
    let image = decode(&buffer, &meta, false)?;

    println!("File: {name}");
    println!("Make: {}", image.metadata.make);
    println!("Model: {}", image.metadata.model);
    println!("Canonical: {}", image.metadata.canonical_model);
    println!("ISO: {}", image.metadata.iso_speed);
    let dim = image.dim();
    let uncropped = image.uncropped_dim();
    println!("Dimensions: {}x{}", dim.x, dim.y);
    println!("Uncropped: {}x{}", uncropped.x, uncropped.y);
    println!("CFA: {}", image.cfa.as_string());
    println!("Black: {} White: {}", image.black_level, image.white_point);

    let (sum, count) = match image.data() {
        RawImageData::U16(data) => (
            data.iter().map(|v| u64::from(*v)).sum::<u64>(),
            data.len(),
        ),
        RawImageData::F32(data) => (
            data.iter().map(|v| *v as u64).sum::<u64>(),
            data.len(),
        ),
    };
    println!("Pixel sum: {sum}");
    if count > 0 {
        println!("Pixel avg: {}", sum / count as u64);
    }
    for error in image.errors() {
        println!("Warning: {error}");
    }
    Ok(())
}

pub fn main() {
    let args: Vec<String> = std::env::args().collect();

    let mut opts = Options::new();
    opts.optflag("d", "", "Debug");
    opts.optflag("h", "", "Help");

    let matches = match opts.parse(&args[1..]) {
        Ok(m) => m,
        Err(f) => panic!("{}", f),
    };

    if matches.opt_present("h") || matches.free.len() != 1 {
        eprintln!("Usage: rsidentify [-d] <file>");
        std::process::exit(2);
    }

    let loglevel = if matches.opt_present("d") {
        LevelFilter::Debug
    } else {
        LevelFilter::Error
    };
    SimpleLogger::new()
        .with_module_level("rawspeed", loglevel)
        .init()
        .unwrap();

    if let Err(err) = process_file(&matches.free[0]) {
        eprintln!("ERROR: {err}");
        std::process::exit(2);
    }
}
