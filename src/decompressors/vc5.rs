// SPDX-License-Identifier: LGPL-3.0-or-later
/*
 * rawspeed - decompressors/vc5.rs
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

//! VC-5 decompression (GoPro GPR).
//!
//! Four channels carry a green sum / red green / blue green / green
//! difference transform of the Bayer mosaic, each as three levels of
//! 2-D wavelet subbands. The smallest LL is a plain raster of
//! `lowpass_precision` bit samples; every other subband is run
//! length / value coded against the fixed codebook with a per
//! subband quantization scalar. Reconstruction combines bands
//! vertically then horizontally, level by level, and the final four
//! low pass rasters recombine into RGGB through the inverse log
//! table.

mod codebook;

use rayon::prelude::*;

use crate::bitstream::BitPumpMsb;
use crate::bytestream::{ByteStream, Endian};
use crate::decompressors::check_error_log;
use crate::rawimage::{RawImage, RawImageType};
use crate::utils::{clamp_bits, round_up_division};
use crate::{Error, Result};

use codebook::MARKER_BAND_END;

const NUM_CHANNELS: usize = 4;
const NUM_WAVELET_LEVELS: usize = 3;
const NUM_SUBBANDS: usize = 10;
const PRECISION_MIN: u16 = 8;
const PRECISION_MAX: u16 = 16;
const LOG_TABLE_BITWIDTH: u32 = 12;

// tag values from the bitstream syntax
const TAG_CHANNEL_COUNT: i16 = 0x000c;
const TAG_IMAGE_WIDTH: i16 = 0x0014;
const TAG_IMAGE_HEIGHT: i16 = 0x0015;
const TAG_LOWPASS_PRECISION: i16 = 0x0023;
const TAG_SUBBAND_COUNT: i16 = 0x000e;
const TAG_SUBBAND_NUMBER: i16 = 0x0030;
const TAG_QUANTIZATION: i16 = 0x0035;
const TAG_CHANNEL_NUMBER: i16 = 0x003e;
const TAG_IMAGE_FORMAT: i16 = 0x0054;
const TAG_MAX_BITS_PER_COMPONENT: i16 = 0x0066;
const TAG_PATTERN_WIDTH: i16 = 0x006a;
const TAG_PATTERN_HEIGHT: i16 = 0x006b;
const TAG_COMPONENTS_PER_SAMPLE: i16 = 0x006c;
const TAG_PRESCALE_SHIFT: i16 = 0x006d;
const TAG_MASK_LARGE_CHUNK: i16 = 0x2000;
const TAG_MASK_SMALL_CHUNK: i16 = 0x4000;
const TAG_LARGE_CODEBLOCK: i16 = 0x6000;

const IMAGE_FORMAT_RAW: u16 = 4;
const PATTERN_WIDTH: u16 = 2;
const PATTERN_HEIGHT: u16 = 2;
const COMPONENTS_PER_SAMPLE: u16 = 1;

/// A decoded (or reconstructed) subband raster.
#[derive(Clone, Debug, Default)]
struct Band {
    data: Vec<i16>,
    width: usize,
    height: usize,
}

impl Band {
    fn new(width: usize, height: usize) -> Band {
        Band {
            data: vec![0; width * height],
            width,
            height,
        }
    }

    #[inline]
    fn at(&self, row: usize, col: usize) -> i32 {
        i32::from(self.data[row * self.width + col])
    }

    #[inline]
    fn set(&mut self, row: usize, col: usize, value: i32) {
        self.data[row * self.width + col] = value as i16;
    }
}

/// Where a subband's bits live, waiting to be decoded.
enum BandSource<'a> {
    LowPass {
        bs: ByteStream<'a>,
        precision: u16,
    },
    HighPass {
        bs: ByteStream<'a>,
        quant: i16,
    },
}

/// One wavelet of one channel: its dimensions, prescale, and the
/// four band sources (the LL of non smallest wavelets is
/// reconstructed, not coded).
struct Wavelet<'a> {
    width: usize,
    height: usize,
    prescale: u32,
    bands: [Option<BandSource<'a>>; 4],
    band_mask: u32,
}

impl Wavelet<'_> {
    fn all_bands_valid(&self) -> bool {
        self.band_mask == 0b1111
    }
}

pub(crate) struct VC5Decompressor<'a> {
    /// `channels[c][0]` is the largest wavelet (half the image),
    /// `channels[c][2]` the smallest.
    channels: Vec<Vec<Wavelet<'a>>>,
    output_bits: u32,
    width: usize,
    height: usize,
}

/// The first/middle/last 4-tap kernels of the inverse wavelet, for
/// the even and odd output sample.
struct Segment {
    mul_even: [i32; 4],
    mul_odd: [i32; 4],
    coord_shift: i32,
}

const SEG_FIRST: Segment = Segment {
    mul_even: [1, 11, -4, 1],
    mul_odd: [-1, 5, 4, -1],
    coord_shift: 0,
};
const SEG_MIDDLE: Segment = Segment {
    mul_even: [1, 1, 8, -1],
    mul_odd: [-1, -1, 8, 1],
    coord_shift: -1,
};
const SEG_LAST: Segment = Segment {
    mul_even: [1, -1, 4, 5],
    mul_odd: [-1, 1, -4, 11],
    coord_shift: -2,
};

fn convolute(muls: &[i32; 4], high: i32, lows: [i32; 3], descale_shift: u32) -> i32 {
    let high_combined = muls[0] * high;
    let mut lows_combined = 0;
    for i in 0..3 {
        lows_combined += muls[1 + i] * lows[i];
    }
    lows_combined += 4;
    let total = high_combined + (lows_combined >> 3);
    (total << descale_shift) >> 1
}

/// Vertical pass: combine a low and a high band into a band of twice
/// the height.
fn reconstruct_pass(dst: &mut Band, high: &Band, low: &Band) {
    for row in 0..dst.height / 2 {
        let segment = if row == 0 {
            &SEG_FIRST
        } else if row + 1 < dst.height / 2 {
            &SEG_MIDDLE
        } else {
            &SEG_LAST
        };
        for col in 0..dst.width {
            let base = (row as i32 + segment.coord_shift) as usize;
            let lows = [
                low.at(base, col),
                low.at(base + 1, col),
                low.at(base + 2, col),
            ];
            let even = convolute(&segment.mul_even, high.at(row, col), lows, 0);
            let odd = convolute(&segment.mul_odd, high.at(row, col), lows, 0);
            dst.set(2 * row, col, even);
            dst.set(2 * row + 1, col, odd);
        }
    }
}

/// Horizontal pass: interleave a low and a high band into a band of
/// twice the width.
fn combine_low_high_pass(
    dst: &mut Band,
    low: &Band,
    high: &Band,
    descale_shift: u32,
    clamp_uint: bool,
) {
    for row in 0..dst.height {
        for col in 0..dst.width / 2 {
            let segment = if col == 0 {
                &SEG_FIRST
            } else if col + 1 < dst.width / 2 {
                &SEG_MIDDLE
            } else {
                &SEG_LAST
            };
            let base = (col as i32 + segment.coord_shift) as usize;
            let lows = [
                low.at(row, base),
                low.at(row, base + 1),
                low.at(row, base + 2),
            ];
            let mut even = convolute(&segment.mul_even, high.at(row, col), lows, descale_shift);
            let mut odd = convolute(&segment.mul_odd, high.at(row, col), lows, descale_shift);
            if clamp_uint {
                even = i32::from(clamp_bits(i64::from(even), 14));
                odd = i32::from(clamp_bits(i64::from(odd), 14));
            }
            dst.set(row, 2 * col, even);
            dst.set(row, 2 * col + 1, odd);
        }
    }
}

/// Read one (value, count) group off the codebook.
fn get_rlv(pump: &mut BitPumpMsb) -> Result<(i16, u16)> {
    let table = codebook::decompanded();
    for entry in table {
        if pump.peek_bits(entry.size)? == entry.bits {
            pump.skip_bits_no_fill(entry.size);
            let mut value = entry.value;
            if value != 0 && pump.get_bits(1)? != 0 {
                value = -value;
            }
            return Ok((value, entry.count));
        }
    }
    Err(Error::Decoder("VC5: code not found in codebook".to_string()))
}

/// Stateful run length decoder for one highpass band.
struct DeRlver<'a, 'b> {
    pump: &'b mut BitPumpMsb<'a>,
    quant: i16,
    pixel_value: i16,
    pixels_left: u16,
}

impl DeRlver<'_, '_> {
    fn decode(&mut self) -> Result<i16> {
        if self.pixels_left == 0 {
            let (value, count) = get_rlv(self.pump)?;
            self.pixel_value = value.saturating_mul(self.quant);
            self.pixels_left = count;
            if count == 0 {
                return Err(Error::Decoder(
                    "VC5: got band end marker while looking for next pixel".to_string(),
                ));
            }
        }
        self.pixels_left -= 1;
        Ok(self.pixel_value)
    }

    fn verify_is_at_end(&mut self) -> Result<()> {
        if self.pixels_left != 0 {
            return Err(Error::Decoder("VC5: not all pixels consumed".to_string()));
        }
        let (value, count) = get_rlv(self.pump)?;
        if value != MARKER_BAND_END || count != 0 {
            return Err(Error::Decoder("VC5: band end marker not found".to_string()));
        }
        Ok(())
    }
}

fn decode_lowpass(bs: &ByteStream, precision: u16, width: usize, height: usize) -> Result<Band> {
    let mut band = Band::new(width, height);
    let mut pump = BitPumpMsb::new(bs.full_buffer());
    for row in 0..height {
        for col in 0..width {
            band.set(row, col, pump.get_bits(u32::from(precision))? as i32);
        }
    }
    Ok(band)
}

fn decode_highpass(bs: &ByteStream, quant: i16, width: usize, height: usize) -> Result<Band> {
    let mut pump = BitPumpMsb::new(bs.full_buffer());
    let mut d = DeRlver {
        pump: &mut pump,
        quant,
        pixel_value: 0,
        pixels_left: 0,
    };
    let mut band = Band::new(width, height);
    for row in 0..height {
        for col in 0..width {
            let v = d.decode()?;
            band.set(row, col, i32::from(v));
        }
    }
    d.verify_is_at_end()?;
    Ok(band)
}

impl<'a> VC5Decompressor<'a> {
    pub fn new(image: &RawImage, input: ByteStream<'a>) -> Result<VC5Decompressor<'a>> {
        if image.cpp() != 1 || image.data_type() != RawImageType::U16 {
            return Err(Error::Decoder(
                "VC5: unexpected component count / data type".to_string(),
            ));
        }
        let dim = image.uncropped_dim();
        if dim.x == 0 || dim.y == 0 {
            return Err(Error::Decoder("VC5: bad image dimensions".to_string()));
        }
        if dim.x % usize::from(PATTERN_WIDTH) != 0 || dim.y % usize::from(PATTERN_HEIGHT) != 0 {
            return Err(Error::Decoder(format!(
                "VC5: dimensions ({}; {}) not a multiple of the pattern",
                dim.x, dim.y
            )));
        }
        // the smallest wavelet must keep at least 3 rows and columns
        // for the 4 tap reconstruction kernels
        if dim.x < 48 || dim.y < 48 {
            return Err(Error::Decoder(format!(
                "VC5: image too small for three wavelet levels ({}; {})",
                dim.x, dim.y
            )));
        }
        if image.white_point == 0 || image.white_point > 65535 {
            return Err(Error::Decoder(format!(
                "VC5: bad white level {}",
                image.white_point
            )));
        }
        let mut output_bits = 0;
        let mut wp = image.white_point;
        while wp != 0 {
            output_bits += 1;
            wp >>= 1;
        }

        let mut channels = Vec::with_capacity(NUM_CHANNELS);
        for _ in 0..NUM_CHANNELS {
            let mut wavelets = Vec::with_capacity(NUM_WAVELET_LEVELS);
            // each channel is one quarter of the mosaic; the coded
            // wavelets sit below that
            let mut w = round_up_division(dim.x, 2);
            let mut h = round_up_division(dim.y, 2);
            for _ in 0..NUM_WAVELET_LEVELS {
                w = round_up_division(w, 2);
                h = round_up_division(h, 2);
                wavelets.push(Wavelet {
                    width: w,
                    height: h,
                    prescale: 0,
                    bands: [None, None, None, None],
                    band_mask: 0,
                });
            }
            channels.push(wavelets);
        }

        let mut decompressor = VC5Decompressor {
            channels,
            output_bits,
            width: dim.x,
            height: dim.y,
        };
        decompressor.parse(input)?;
        Ok(decompressor)
    }

    fn parse(&mut self, mut bs: ByteStream<'a>) -> Result<()> {
        bs.set_endian(Endian::Big);
        if bs.get_u32()? != 0x5643_2d35 {
            return Err(Error::Decoder("VC5: not a valid VC-5 datablock".to_string()));
        }

        // which wavelet and band a subband number addresses
        const SUBBAND_WAVELET: [usize; NUM_SUBBANDS] = [2, 2, 2, 2, 1, 1, 1, 0, 0, 0];
        const SUBBAND_BAND: [usize; NUM_SUBBANDS] = [0, 1, 2, 3, 1, 2, 3, 1, 2, 3];

        let mut i_channel = 0_usize;
        let mut i_subband: Option<usize> = None;
        let mut lowpass_precision: Option<u16> = None;
        let mut quantization: Option<i16> = None;

        loop {
            let tag = bs.get_u16()? as i16;
            let val = bs.get_u16()?;

            let optional = tag < 0;
            let tag = if optional { tag.wrapping_neg() } else { tag };

            match tag {
                TAG_CHANNEL_COUNT => {
                    if usize::from(val) != NUM_CHANNELS {
                        return Err(Error::Decoder(format!("VC5: bad channel count {val}")));
                    }
                }
                TAG_IMAGE_WIDTH => {
                    if usize::from(val) != self.width {
                        return Err(Error::Decoder(format!("VC5: image width mismatch {val}")));
                    }
                }
                TAG_IMAGE_HEIGHT => {
                    if usize::from(val) != self.height {
                        return Err(Error::Decoder(format!("VC5: image height mismatch {val}")));
                    }
                }
                TAG_LOWPASS_PRECISION => {
                    if !(PRECISION_MIN..=PRECISION_MAX).contains(&val) {
                        return Err(Error::Decoder(format!("VC5: invalid precision {val}")));
                    }
                    lowpass_precision = Some(val);
                }
                TAG_CHANNEL_NUMBER => {
                    if usize::from(val) >= NUM_CHANNELS {
                        return Err(Error::Decoder(format!("VC5: bad channel number {val}")));
                    }
                    i_channel = usize::from(val);
                }
                TAG_IMAGE_FORMAT => {
                    if val != IMAGE_FORMAT_RAW {
                        return Err(Error::Decoder(format!("VC5: image format {val} is not RAW")));
                    }
                }
                TAG_SUBBAND_COUNT => {
                    if usize::from(val) != NUM_SUBBANDS {
                        return Err(Error::Decoder(format!("VC5: unexpected subband count {val}")));
                    }
                }
                TAG_MAX_BITS_PER_COMPONENT => {
                    if u32::from(val) != LOG_TABLE_BITWIDTH {
                        return Err(Error::Decoder(format!("VC5: bad bits per component {val}")));
                    }
                }
                TAG_PATTERN_WIDTH => {
                    if val != PATTERN_WIDTH {
                        return Err(Error::Decoder(format!("VC5: bad pattern width {val}")));
                    }
                }
                TAG_PATTERN_HEIGHT => {
                    if val != PATTERN_HEIGHT {
                        return Err(Error::Decoder(format!("VC5: bad pattern height {val}")));
                    }
                }
                TAG_SUBBAND_NUMBER => {
                    if usize::from(val) >= NUM_SUBBANDS {
                        return Err(Error::Decoder(format!("VC5: bad subband number {val}")));
                    }
                    i_subband = Some(usize::from(val));
                }
                TAG_QUANTIZATION => {
                    quantization = Some(val as i16);
                }
                TAG_COMPONENTS_PER_SAMPLE => {
                    if val != COMPONENTS_PER_SAMPLE {
                        return Err(Error::Decoder(format!(
                            "VC5: bad components per sample {val}"
                        )));
                    }
                }
                TAG_PRESCALE_SHIFT => {
                    for (i, wavelet) in self.channels[i_channel].iter_mut().enumerate() {
                        wavelet.prescale = (u32::from(val) >> (14 - 2 * i)) & 0x03;
                    }
                }
                _ => {
                    let mut chunk_size = 0_usize;
                    if tag & TAG_MASK_LARGE_CHUNK != 0 {
                        chunk_size = ((tag as usize & 0xff) << 16) | usize::from(val);
                    } else if tag & TAG_MASK_SMALL_CHUNK != 0 {
                        chunk_size = usize::from(val);
                    }

                    if tag & TAG_LARGE_CODEBLOCK == TAG_LARGE_CODEBLOCK {
                        let start = bs.position();
                        bs.skip(4 * chunk_size)?;
                        let chunk = bs.sub_stream(start, 4 * chunk_size)?;
                        self.parse_large_codeblock(
                            chunk,
                            i_channel,
                            &mut i_subband,
                            &mut lowpass_precision,
                            &mut quantization,
                            &SUBBAND_WAVELET,
                            &SUBBAND_BAND,
                        )?;
                    } else {
                        // every other large chunk is implicitly
                        // optional and carries no skippable payload
                        let optional = optional || tag & TAG_MASK_LARGE_CHUNK != 0;
                        let chunk_size = if tag & TAG_MASK_LARGE_CHUNK != 0 {
                            0
                        } else {
                            chunk_size
                        };
                        if !optional {
                            return Err(Error::Decoder(format!(
                                "VC5: unknown non-optional tag {tag:#06x}"
                            )));
                        }
                        bs.skip(4 * chunk_size)?;
                    }
                }
            }

            // done once every channel's largest wavelet reconstructs
            let done = self
                .channels
                .iter()
                .all(|wavelets| wavelets[0].all_bands_valid());
            if done {
                return Ok(());
            }
        }
    }

    #[allow(clippy::too_many_arguments)]
    fn parse_large_codeblock(
        &mut self,
        bs: ByteStream<'a>,
        i_channel: usize,
        i_subband: &mut Option<usize>,
        lowpass_precision: &mut Option<u16>,
        quantization: &mut Option<i16>,
        subband_wavelet: &[usize; NUM_SUBBANDS],
        subband_band: &[usize; NUM_SUBBANDS],
    ) -> Result<()> {
        let subband = i_subband
            .take()
            .ok_or_else(|| Error::Decoder("VC5: codeblock before subband number".to_string()))?;
        let idx = subband_wavelet[subband];
        let band = subband_band[subband];

        let wavelet = &mut self.channels[i_channel][idx];
        if wavelet.band_mask & (1 << band) != 0 {
            return Err(Error::Decoder(format!(
                "VC5: band {band} of wavelet {idx} on channel {i_channel} was already seen"
            )));
        }
        wavelet.bands[band] = Some(if subband == 0 {
            let precision = lowpass_precision
                .take()
                .ok_or_else(|| Error::Decoder("VC5: codeblock before lowpass precision".to_string()))?;
            // clamp to the bits the raster actually needs
            let area = wavelet.width * wavelet.height;
            let bytes = round_up_division(area * usize::from(precision), 8);
            let bs = bs.sub_stream(0, bytes.min(bs.size()))?;
            BandSource::LowPass { bs, precision }
        } else {
            let quant = quantization
                .take()
                .ok_or_else(|| Error::Decoder("VC5: codeblock before quantization".to_string()))?;
            BandSource::HighPass { bs, quant }
        });
        wavelet.band_mask |= 1 << band;
        // smallest wavelet's LL is coded; the others' reconstruct
        if wavelet.all_bands_valid() && idx > 0 {
            self.channels[i_channel][idx - 1].band_mask |= 1;
        }
        Ok(())
    }

    fn log_table(&self) -> Vec<u16> {
        let size = 1_usize << LOG_TABLE_BITWIDTH;
        let scale = 16 - self.output_bits;
        (0..size)
            .map(|i| {
                let normalized = i as f64 / (size - 1) as f64;
                let curve = (113.0_f64.powf(normalized) - 1.0) / 112.0;
                ((65535.0 * curve) as u32 >> scale) as u16
            })
            .collect()
    }

    pub fn decompress(&self, image: &mut RawImage) -> Result<()> {
        // phase one: every coded subband, in parallel
        struct Job<'s, 'a> {
            channel: usize,
            wavelet: usize,
            band: usize,
            source: &'s BandSource<'a>,
            width: usize,
            height: usize,
        }
        let mut jobs = Vec::new();
        for (c, wavelets) in self.channels.iter().enumerate() {
            for (w, wavelet) in wavelets.iter().enumerate() {
                for (b, source) in wavelet.bands.iter().enumerate() {
                    if let Some(source) = source {
                        jobs.push(Job {
                            channel: c,
                            wavelet: w,
                            band: b,
                            source,
                            width: wavelet.width,
                            height: wavelet.height,
                        });
                    }
                }
            }
        }
        let errors = image.error_log();
        let decoded_list: Vec<(usize, usize, usize, Band)> = jobs
            .par_iter()
            .filter_map(|job| {
                let result = match job.source {
                    BandSource::LowPass { bs, precision } => {
                        decode_lowpass(bs, *precision, job.width, job.height)
                    }
                    BandSource::HighPass { bs, quant } => {
                        decode_highpass(bs, *quant, job.width, job.height)
                    }
                };
                match result {
                    Ok(band) => Some((job.channel, job.wavelet, job.band, band)),
                    Err(err) => {
                        errors.set_error(&format!(
                            "VC5 channel {} wavelet {} band {}: {err}",
                            job.channel, job.wavelet, job.band
                        ));
                        None
                    }
                }
            })
            .collect();
        check_error_log(&errors, 1)?;

        let mut decoded: Vec<Vec<[Option<Band>; 4]>> = (0..NUM_CHANNELS)
            .map(|_| {
                (0..NUM_WAVELET_LEVELS)
                    .map(|_| [None, None, None, None])
                    .collect()
            })
            .collect();
        for (c, w, b, band) in decoded_list {
            decoded[c][w][b] = Some(band);
        }

        // phase two: per channel, reconstruct level by level, with a
        // barrier between levels by construction
        let mut finals: Vec<Band> = Vec::with_capacity(NUM_CHANNELS);
        for (c, wavelets) in self.channels.iter().enumerate() {
            let mut ll: Band = decoded[c][NUM_WAVELET_LEVELS - 1][0]
                .take()
                .ok_or_else(|| Error::Decoder("VC5: missing lowpass band".to_string()))?;
            for idx in (0..NUM_WAVELET_LEVELS).rev() {
                let wavelet = &wavelets[idx];
                let take = |b: usize, decoded: &mut [Option<Band>; 4]| {
                    decoded[b]
                        .take()
                        .ok_or_else(|| Error::Decoder("VC5: missing highpass band".to_string()))
                };
                let (lh, hl, hh);
                {
                    let bands = &mut decoded[c][idx];
                    lh = take(1, bands)?;
                    hl = take(2, bands)?;
                    hh = take(3, bands)?;
                }
                // vertical: LL+HL and LH+HH, then horizontal
                let mut lowpass = Band::new(wavelet.width, 2 * wavelet.height);
                reconstruct_pass(&mut lowpass, &hl, &ll);
                let mut highpass = Band::new(wavelet.width, 2 * wavelet.height);
                reconstruct_pass(&mut highpass, &hh, &lh);

                let descale_shift = if wavelet.prescale == 2 { 2 } else { 0 };
                let mut combined = Band::new(2 * wavelet.width, 2 * wavelet.height);
                combine_low_high_pass(
                    &mut combined,
                    &lowpass,
                    &highpass,
                    descale_shift,
                    idx == 0,
                );
                ll = combined;
            }
            finals.push(ll);
        }

        // phase three: recombine the colour transform into RGGB
        let log_table = self.log_table();
        let lut = |v: i32| {
            let index = v.clamp(0, (1 << LOG_TABLE_BITWIDTH) - 1) as usize;
            log_table[index]
        };
        let half_w = self.width / 2;
        let half_h = self.height / 2;
        let pitch = image.pitch_u16();
        let out = image.u16_data_mut();
        for row in 0..half_h {
            for col in 0..half_w {
                const MID: i32 = 2048;
                let gs = finals[0].at(row, col);
                let rg = finals[1].at(row, col) - MID;
                let bg = finals[2].at(row, col) - MID;
                let gd = finals[3].at(row, col) - MID;

                let r = gs + 2 * rg;
                let b = gs + 2 * bg;
                let g1 = gs + gd;
                let g2 = gs - gd;

                out[2 * row * pitch + 2 * col] = lut(r);
                out[2 * row * pitch + 2 * col + 1] = lut(g1);
                out[(2 * row + 1) * pitch + 2 * col] = lut(g2);
                out[(2 * row + 1) * pitch + 2 * col + 1] = lut(b);
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod test {
    use super::codebook::MARKER_BAND_END;
    use super::{decode_highpass, get_rlv};
    use crate::bitstream::BitPumpMsb;
    use crate::bytestream::{ByteStream, Endian};

    #[test]
    fn test_rlv_zero_run() {
        // the single 0 bit decodes one zero pixel, no sign bit
        let data = [0b0000_0000_u8];
        let mut pump = BitPumpMsb::new(&data);
        assert_eq!(get_rlv(&mut pump).unwrap(), (0, 1));
    }

    #[test]
    fn test_rlv_band_end() {
        // 26 ones terminate the band: value is the marker, count 0
        let data = [0xff_u8, 0xff, 0xff, 0xff];
        let mut pump = BitPumpMsb::new(&data);
        let (value, count) = get_rlv(&mut pump).unwrap();
        assert_eq!(value, MARKER_BAND_END);
        assert_eq!(count, 0);
    }

    #[test]
    fn test_band_end_only_stream_is_empty_band() {
        // a stream that is just the band end marker holds zero
        // pixels; decoding any pixel from it must fail, and a zero
        // sized band must verify the marker
        let data = [0xff_u8, 0xff, 0xff, 0xff];
        let bs = ByteStream::new(&data, Endian::Big);
        assert!(decode_highpass(&bs, 1, 1, 1).is_err());
        let empty = decode_highpass(&bs, 1, 0, 0);
        assert!(empty.is_ok());
    }

    #[test]
    fn test_highpass_run_decode() {
        // "10" = run of two zeros, then "110" + sign 0 = value 1,
        // quantized by 3, then the band end marker
        let mut bits = String::new();
        bits.push_str("10");
        bits.push_str("110");
        bits.push('0');
        bits.push_str("11111111111111111111111111");
        while bits.len() % 8 != 0 {
            bits.push('0');
        }
        let bytes: Vec<u8> = bits
            .as_bytes()
            .chunks(8)
            .map(|c| {
                c.iter()
                    .fold(0_u8, |acc, b| (acc << 1) | u8::from(*b == b'1'))
            })
            .collect();
        let bs = ByteStream::new(&bytes, Endian::Big);
        let band = decode_highpass(&bs, 3, 3, 1).unwrap();
        assert_eq!(band.data, vec![0, 0, 3]);
    }
}
