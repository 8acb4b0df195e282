// SPDX-License-Identifier: LGPL-3.0-or-later
/*
 * rawspeed - lib.rs
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

//! Decoding of camera RAW files.
//!
//! The input is a memory resident byte buffer; the output is a
//! [`RawImage`]: the sensor pixels plus the metadata needed by a
//! demosaicer. Use [`decode`] for the whole pipeline, or
//! [`parser::get_decoder`] to drive the steps separately.

mod bitstream;
mod buffer;
mod bytestream;
mod cfa;
pub mod decoders;
mod decompressors;
mod fp;
pub mod metadata;
mod opcodes;
pub mod parser;
mod rawimage;
pub mod tiff;
mod utils;

pub use bitstream::{
    BitOrder, BitPump, BitPumpJpeg, BitPumpLsb, BitPumpMsb, BitPumpMsb16, BitPumpMsb32,
};
pub use buffer::Buffer;
pub use bytestream::{ByteStream, Endian};
pub use cfa::{CfaColor, ColorFilterArray};
pub use metadata::{BlackArea, Camera, CameraMetaData, CameraSensorInfo};
pub use rawimage::{Point, RawImage, RawImageData, Rect};

/// Standard Result for rawspeed
pub type Result<T> = std::result::Result<T, Error>;

/// IO failures. Every buffer read is bounds checked against the
/// declared size; the bit pumps additionally fail on refill past the
/// end of their stream.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum IoError {
    /// A read was attempted outside of `[0, size)`.
    OutOfBounds,
    /// The stream ended before the requested data.
    PastEnd,
    /// Underlying IO failure.
    File(String),
}

impl std::fmt::Display for IoError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match *self {
            Self::OutOfBounds => write!(f, "Out of bounds read"),
            Self::PastEnd => write!(f, "Read past end of stream"),
            Self::File(ref err) => write!(f, "File error: {err}"),
        }
    }
}

/// Malformed TIFF structure.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum TiffError {
    /// An entry with an unknown type or an overflowing count.
    BadEntry(String),
    /// An IFD byte range was entered twice.
    CyclicIfd,
    /// The IFD tree exceeded a depth or sub-IFD count limit.
    LimitExceeded(&'static str),
    /// A tag required by the decoder is absent.
    MissingTag(u16),
}

impl std::fmt::Display for TiffError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match *self {
            Self::BadEntry(ref err) => write!(f, "Bad TIFF entry: {err}"),
            Self::CyclicIfd => write!(f, "Cyclic IFD structure"),
            Self::LimitExceeded(limit) => write!(f, "IFD limit exceeded: {limit}"),
            Self::MissingTag(tag) => write!(f, "Required TIFF tag {tag:#06x} not found"),
        }
    }
}

/// Standard Error for rawspeed
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Error {
    /// IO failure, see [`IoError`].
    Io(IoError),
    /// Malformed TIFF structure, see [`TiffError`].
    Tiff(TiffError),
    /// The top level magic is unrecognized, or the container variant
    /// is unsupported.
    Parse(String),
    /// The camera is not in the metadata database.
    UnsupportedCamera(String),
    /// A decoder or decompressor invariant was violated.
    Decoder(String),
    /// Camera metadata lookup failure.
    Metadata(String),
}

impl From<IoError> for Error {
    fn from(err: IoError) -> Error {
        Error::Io(err)
    }
}

impl From<TiffError> for Error {
    fn from(err: TiffError) -> Error {
        Error::Tiff(err)
    }
}

impl From<std::io::Error> for Error {
    fn from(err: std::io::Error) -> Error {
        Error::Io(IoError::File(err.to_string()))
    }
}

impl std::fmt::Display for Error {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match *self {
            Self::Io(ref err) => write!(f, "IO error: {err}"),
            Self::Tiff(ref err) => write!(f, "TIFF error: {err}"),
            Self::Parse(ref err) => write!(f, "Parse error: {err}"),
            Self::UnsupportedCamera(ref err) => write!(f, "Unsupported camera: {err}"),
            Self::Decoder(ref err) => write!(f, "Decoder error: {err}"),
            Self::Metadata(ref err) => write!(f, "Metadata error: {err}"),
        }
    }
}

impl std::error::Error for Error {}

/// Decode `buffer` into a [`RawImage`].
///
/// This runs the full pipeline: container identification, camera
/// lookup in `meta`, raw decompression and metadata resolution.
/// When `fail_on_unknown` is false, an unknown camera is demoted to a
/// warning and decoding proceeds with generic settings.
pub fn decode(buffer: &Buffer, meta: &CameraMetaData, fail_on_unknown: bool) -> Result<RawImage> {
    let decoder = parser::get_decoder(buffer)?;
    if let Err(err) = decoder.check_support(meta) {
        if fail_on_unknown {
            return Err(err);
        }
        log::warn!("{err}, decoding anyway");
    }
    let mut image = decoder.decode_raw(meta)?;
    decoder.decode_metadata(&mut image, meta)?;
    Ok(image)
}
