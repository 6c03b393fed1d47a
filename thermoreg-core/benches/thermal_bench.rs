//! Benchmarks for the heat balance and the stiff solve.
//!
//! Run with: cargo bench -p thermoreg-core

use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion};
use thermoreg_core::prelude::*;

fn model<G: GeometryIndexing>(indexing: G) -> ThermalModel<G> {
    let bundle = Anthropometrics::standard()
        .personalize(&ReferenceBody::standard().unwrap())
        .unwrap();
    let mut model = ThermalModel::new(bundle, indexing, ModelParams::default()).unwrap();
    model.set_ambient_temperature(24.0).unwrap();
    model.set_relative_humidity(0.5).unwrap();
    model.set_met(1.2).unwrap();
    model.initialize_from_set_points();
    model
}

fn bench_heat_balance(c: &mut Criterion) {
    let mut group = c.benchmark_group("heat_balance");
    for per_segment in [1usize, 8, 64] {
        let areas = Anthropometrics::standard()
            .personalize(&ReferenceBody::standard().unwrap())
            .unwrap()
            .surface_area;
        let mesh = MeshGeometry::uniform_split(areas.view(), per_segment);
        let model = model(MeshIndexing::new(mesh).unwrap());
        group.bench_with_input(
            BenchmarkId::from_parameter(per_segment * N_SEGMENTS),
            &model,
            |b, model| b.iter(|| black_box(model.heat_balance())),
        );
    }
    group.finish();
}

fn bench_solve(c: &mut Criterion) {
    c.bench_function("solve_projected_10min", |b| {
        b.iter_batched(
            || model(ProjectedIndexing::new()),
            |mut model| {
                model.solve(600.0).unwrap();
                black_box(model.mean_skin_temperature())
            },
            criterion::BatchSize::SmallInput,
        )
    });
}

criterion_group!(benches, bench_heat_balance, bench_solve);
criterion_main!(benches);
