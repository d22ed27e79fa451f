//! # Perception Benchmark

use criterion::{criterion_group, criterion_main, Criterion};

use image::{Rgb, RgbImage};
use nalgebra::Point2;
use rov_lib::{
    loc::Pose,
    per::{PerInput, PerMgr, PerParams},
};
use util::module::State;

fn per_benchmark(c: &mut Criterion) {
    // ---- Build the manager and a representative frame ----

    let params = PerParams::default();
    let mut per_mgr = PerMgr::with_params(params.clone()).unwrap();

    // Bright ground, dark far band, one target blob - exercises all three
    // classifiers and the target argmin path
    let frame = RgbImage::from_fn(params.frame_width, params.frame_height, |x, y| {
        if x >= 120 && x < 220 && y >= 100 && y < 140 {
            Rgb([200, 180, 10])
        } else if y < 40 {
            Rgb([90, 70, 50])
        } else {
            Rgb([210, 190, 170])
        }
    });

    let input = PerInput {
        frame,
        pose: Pose {
            pos: Point2::new(100.0, 100.0),
            yaw_deg: 45.0,
            ..Default::default()
        },
    };

    // ---- Benchmark the full perception step ----

    c.bench_function("per_proc", |b| {
        b.iter(|| per_mgr.proc(&input).unwrap());
    });
}

criterion_group!(benches, per_benchmark);
criterion_main!(benches);
