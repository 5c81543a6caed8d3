// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at http://mozilla.org/MPL/2.0/.

use criterion::*;

use ubercal::{
    design::{target_and_weights, DesignMatrix},
    gauge::GaugeFix,
    index::FitIndex,
    simulate::SimulationParams,
    solver::NormalEquations,
    FamilyDescriptor, FamilyKind, FitModel, ObservationTable, SolverParams, SolverType,
};

fn survey() -> (ObservationTable, FitModel) {
    let table = SimulationParams {
        num_stars: 5000,
        num_exposures: 100,
        min_stars_per_exposure: 100,
        max_stars_per_exposure: 800,
        num_channels: 16,
        ..Default::default()
    }
    .simulate()
    .unwrap();
    let model = FitModel::configure(vec![
        FamilyDescriptor::new(FamilyKind::StarMag),
        FamilyDescriptor::new(FamilyKind::Zp).reference_key(0),
        FamilyDescriptor::new(FamilyKind::ChannelOff).reference_key(0),
    ])
    .unwrap();
    (table, model)
}

fn assembly(c: &mut Criterion) {
    let (table, model) = survey();
    let index = FitIndex::build(&table, &model).unwrap();
    let gauge = GaugeFix::build(&table, &model, &index).unwrap();
    let (mags, weights) =
        target_and_weights(&table, model.magnitude_column(), model.error_column()).unwrap();

    c.bench_function("index families", |b| {
        b.iter(|| FitIndex::build(&table, &model).unwrap())
    });

    c.bench_function("assemble design matrix", |b| {
        b.iter(|| DesignMatrix::assemble(&table, &model, &index).unwrap())
    });

    let full = DesignMatrix::assemble(&table, &model, &index).unwrap();
    let reduced = gauge.apply(&full);
    c.bench_function("build normal equations", |b| {
        b.iter(|| NormalEquations::build(&reduced, &weights, &mags))
    });
}

fn solvers(c: &mut Criterion) {
    let (table, model) = survey();
    let index = FitIndex::build(&table, &model).unwrap();
    let gauge = GaugeFix::build(&table, &model, &index).unwrap();
    let (mags, weights) =
        target_and_weights(&table, model.magnitude_column(), model.error_column()).unwrap();
    let full = DesignMatrix::assemble(&table, &model, &index).unwrap();
    let normal = NormalEquations::build(&gauge.apply(&full), &weights, &mags);

    let mut group = c.benchmark_group("solve");
    group.sample_size(10);
    for solver in [SolverType::Cholesky, SolverType::Lsqr] {
        let params = SolverParams {
            solver,
            ..Default::default()
        };
        group.bench_function(solver.to_string(), |b| {
            b.iter(|| params.solve(&normal).unwrap())
        });
    }
    group.finish();
}

fn full_fit(c: &mut Criterion) {
    let (table, model) = survey();
    let params = SolverParams::default();

    let mut group = c.benchmark_group("fit");
    group.sample_size(10);
    group.bench_function("star_mag zp channel_off", |b| {
        b.iter(|| ubercal::run(&table, &model, &params).unwrap())
    });
    group.finish();
}

criterion_group!(benches, assembly, solvers, full_fit);
criterion_main!(benches);
