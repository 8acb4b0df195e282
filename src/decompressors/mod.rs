// SPDX-License-Identifier: LGPL-3.0-or-later
/*
 * rawspeed - decompressors/mod.rs
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

//! The per format decompressors.
//!
//! Construction validates the image shape and pre slices the input;
//! `decompress` fills a provisioned [`crate::RawImage`]. A failing
//! strip or tile appends to the image error log and the siblings
//! carry on; the caller re-raises when the log crossed its threshold.

pub(crate) mod dng;
pub(crate) mod fuji;
pub(crate) mod huffman;
pub(crate) mod ljpeg;
pub(crate) mod nikon;
pub(crate) mod olympus;
pub(crate) mod panasonic;
pub(crate) mod samsung;
pub(crate) mod sony;
pub(crate) mod uncompressed;
pub(crate) mod vc5;

use std::marker::PhantomData;

use crate::rawimage::ErrorLog;
use crate::{Error, Result};

/// Shared mutable access to the pixel raster for workers whose units
/// are not whole rows (Panasonic blocks span row boundaries). The
/// workers write disjoint pixel ranges by construction of the block
/// plan.
pub(crate) struct SharedRaster<'a> {
    ptr: *mut u16,
    len: usize,
    _marker: PhantomData<&'a mut [u16]>,
}

unsafe impl Sync for SharedRaster<'_> {}

impl<'a> SharedRaster<'a> {
    pub fn new(data: &'a mut [u16]) -> SharedRaster<'a> {
        SharedRaster {
            ptr: data.as_mut_ptr(),
            len: data.len(),
            _marker: PhantomData,
        }
    }

    /// Get the raster.
    ///
    /// # Safety
    /// Only use inside a parallel iterator whose work items write
    /// disjoint pixel ranges.
    #[allow(clippy::mut_from_ref)]
    pub unsafe fn inner_mut(&self) -> &mut [u16] {
        unsafe { std::slice::from_raw_parts_mut(self.ptr, self.len) }
    }
}

/// After a parallel decode, fail the whole image once the error log
/// crossed `threshold`, quoting the first error.
pub(crate) fn check_error_log(log: &ErrorLog, threshold: usize) -> Result<()> {
    if log.is_too_many_errors(threshold) {
        let errors = log.errors();
        return Err(Error::Decoder(format!(
            "too many errors ({}), first: {}",
            errors.len(),
            errors.first().map(String::as_str).unwrap_or("")
        )));
    }
    Ok(())
}
