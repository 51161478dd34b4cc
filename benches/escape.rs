//! Benchmark for unit-name path escaping
//!
//! Every StorageClass, PV and policy datastore goes through one escape per run.

use criterion::{black_box, criterion_group, criterion_main, Criterion, Throughput};
use vsphere_problem_detector::validation::{escape_path, DatastoreValidator, VolumeNameValidator};

fn bench_escape_paths(c: &mut Criterion) {
    let mut group = c.benchmark_group("escape");
    group.throughput(Throughput::Elements(1));

    let short = VolumeNameValidator::mount_path("[LocalDS_0] kubevols/pvc-1.vmdk");
    group.bench_function("short_volume_path", |b| {
        b.iter(|| escape_path(black_box(&short)))
    });

    let dynamic = VolumeNameValidator::mount_path(&DatastoreValidator::dynamic_volume_path(
        "vsanDatastore (1) - production",
        "ocp-cluster-long-name-x7k2p",
    ));
    group.bench_function("dynamic_volume_path", |b| {
        b.iter(|| escape_path(black_box(&dynamic)))
    });

    let unicode = VolumeNameValidator::mount_path("[データストア] kubevols/pvc-ü.vmdk");
    group.bench_function("non_ascii_volume_path", |b| {
        b.iter(|| escape_path(black_box(&unicode)))
    });

    group.finish();
}

fn bench_many_datastores(c: &mut Criterion) {
    let mut group = c.benchmark_group("escape");

    let names: Vec<String> = (0..1000).map(|i| format!("datastore-{:04}", i)).collect();
    group.throughput(Throughput::Elements(names.len() as u64));
    group.bench_function("1000_datastores", |b| {
        b.iter(|| {
            for name in &names {
                let path = VolumeNameValidator::mount_path(&DatastoreValidator::dynamic_volume_path(
                    name,
                    "ocp-4xk2p",
                ));
                let _ = black_box(escape_path(&path));
            }
        })
    });

    group.finish();
}

criterion_group!(benches, bench_escape_paths, bench_many_datastores);
criterion_main!(benches);
