// SPDX-License-Identifier: LGPL-3.0-or-later
/*
 * rawspeed - benches/the_benchmark.rs
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

use criterion::{criterion_group, criterion_main, Criterion, Throughput};

use rawspeed::{BitPumpLsb, BitPumpMsb};

fn bench_bit_pumps(c: &mut Criterion) {
    let data: Vec<u8> = (0..1_000_000_u32).map(|i| (i * 7) as u8).collect();

    let mut group = c.benchmark_group("bitpump");
    group.throughput(Throughput::Bytes(data.len() as u64));

    group.bench_function("msb_get12", |b| {
        b.iter(|| {
            let mut pump = BitPumpMsb::new(&data);
            let mut sum = 0_u64;
            for _ in 0..(data.len() * 8 / 12) {
                sum += u64::from(pump.get_bits(12).unwrap());
            }
            sum
        })
    });

    group.bench_function("lsb_get14", |b| {
        b.iter(|| {
            let mut pump = BitPumpLsb::new(&data);
            let mut sum = 0_u64;
            for _ in 0..(data.len() * 8 / 14) {
                sum += u64::from(pump.get_bits(14).unwrap());
            }
            sum
        })
    });
    group.finish();
}

criterion_group!(benches, bench_bit_pumps);
criterion_main!(benches);
