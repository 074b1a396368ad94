//! Benchmarks for payload encoding and the transform kernels
//!
//! Run with: cargo bench

use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion, Throughput};
use ndarray::{Array1, Array2, Array3};
use nifty_components::array::{decode, encode, DynArray};
use nifty_components::kernel::{DegridGeometry, GridGeometry, Kernel, KernelKind, SPEED_OF_LIGHT};
use num_complex::Complex64;

fn visibilities(rows: usize, chans: usize) -> (Array2<f64>, Array1<f64>, Array2<Complex64>, Array2<f64>) {
    let uvw = Array2::from_shape_fn((rows, 3), |(r, k)| ((r * 7 + k * 13) % 97) as f64 - 48.0);
    let freq = Array1::from_shape_fn(chans, |c| SPEED_OF_LIGHT * (1.0 + c as f64 * 0.01));
    let vis = Array2::from_shape_fn((rows, chans), |(r, c)| {
        Complex64::new((r % 5) as f64, (c % 3) as f64)
    });
    let weights = Array2::from_elem((rows, chans), 1.0);
    (uvw, freq, vis, weights)
}

fn bench_codec(c: &mut Criterion) {
    let mut group = c.benchmark_group("codec");

    for rows in [1_000, 10_000, 100_000].iter() {
        let data = DynArray::from(Array3::from_shape_fn((*rows, 4, 2), |(r, c, p)| {
            Complex64::new(r as f64, (c + p) as f64)
        }));
        let bytes = encode(&data);

        group.throughput(Throughput::Bytes(bytes.len() as u64));
        group.bench_with_input(BenchmarkId::new("encode", rows), &data, |b, data| {
            b.iter(|| black_box(encode(data)));
        });
        group.bench_with_input(BenchmarkId::new("decode", rows), &bytes, |b, bytes| {
            b.iter(|| black_box(decode(bytes)));
        });
    }

    group.finish();
}

fn bench_grid(c: &mut Criterion) {
    let mut group = c.benchmark_group("grid");
    group.sample_size(10);

    let (uvw, freq, vis, weights) = visibilities(256, 4);
    for npix in [32usize, 64].iter() {
        let geometry = GridGeometry {
            npix_x: *npix,
            npix_y: *npix,
            pixsize_x: 1.0 / *npix as f64,
            pixsize_y: 1.0 / *npix as f64,
            epsilon: 1e-6,
            do_wstacking: true,
        };
        group.throughput(Throughput::Elements((npix * npix) as u64));
        for kind in [KernelKind::Cpu, KernelKind::Parallel] {
            let kernel = kind.build();
            group.bench_with_input(BenchmarkId::new(kind.name(), npix), &geometry, |b, g| {
                b.iter(|| black_box(kernel.grid(&uvw, &freq, &vis, &weights, g)));
            });
        }
    }

    group.finish();
}

fn bench_degrid(c: &mut Criterion) {
    let mut group = c.benchmark_group("degrid");
    group.sample_size(10);

    let (uvw, freq, _, weights) = visibilities(256, 4);
    // Sparse sky: degridding cost scales with the non-zero pixels.
    let mut image = Array2::<f64>::zeros((64, 64));
    for i in (0..64).step_by(8) {
        image[[i, 63 - i]] = 1.0;
    }
    let geometry = DegridGeometry {
        pixsize_x: 1.0 / 64.0,
        pixsize_y: 1.0 / 64.0,
        epsilon: 1e-6,
        do_wstacking: false,
    };
    for kind in [KernelKind::Cpu, KernelKind::Parallel] {
        let kernel = kind.build();
        group.bench_function(kind.name(), |b| {
            b.iter(|| black_box(kernel.degrid(&uvw, &freq, &image, &weights, &geometry)));
        });
    }

    group.finish();
}

criterion_group!(benches, bench_codec, bench_grid, bench_degrid);

criterion_main!(benches);
