//! Benchmark whole-array writes and reads of each storage backend.
#![allow(missing_docs)]

use criterion::{BenchmarkId, Criterion, Throughput, criterion_group, criterion_main};
use zarr_benchmarks::ZarrSpec;
use zarr_benchmarks::backend::{BackendKind, WriteOptions, create_backend};
use zarr_benchmarks::compressor::{BloscCname, BloscShuffle, Compressor};
use zarr_benchmarks::image::Image;

fn write_options(spec: ZarrSpec) -> WriteOptions {
    let compressor = Compressor::Blosc {
        cname: BloscCname::Zstd,
        clevel: 3,
        shuffle: BloscShuffle::Shuffle,
    };
    WriteOptions::new(vec![64; 3], compressor, spec).with_overwrite(true)
}

fn backend_write(c: &mut Criterion) {
    let image = Image::dev(Some(0));
    let dir = tempfile::TempDir::new().unwrap();
    let mut group = c.benchmark_group("backend_write");
    group.throughput(Throughput::Bytes(image.nbytes()));
    for kind in BackendKind::ALL {
        let backend = create_backend(kind);
        let spec = backend.default_spec();
        let path = dir.path().join(kind.package());
        let options = write_options(spec);
        group.bench_function(BenchmarkId::from_parameter(kind), |b| {
            b.iter(|| backend.write_array(&image, &path, &options).unwrap());
        });
    }
    group.finish();
}

fn backend_read(c: &mut Criterion) {
    let image = Image::dev(Some(0));
    let dir = tempfile::TempDir::new().unwrap();
    let mut group = c.benchmark_group("backend_read");
    group.throughput(Throughput::Bytes(image.nbytes()));
    for kind in BackendKind::ALL {
        let backend = create_backend(kind);
        let spec = backend.default_spec();
        let path = dir.path().join(kind.package());
        backend
            .write_array(&image, &path, &write_options(spec))
            .unwrap();
        group.bench_function(BenchmarkId::from_parameter(kind), |b| {
            b.iter(|| backend.read_array(&path, spec).unwrap());
        });
    }
    group.finish();
}

criterion_group!(benches, backend_write, backend_read);
criterion_main!(benches);
