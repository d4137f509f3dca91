// ─────────────────────────────────────────────────────────────────────
// HPGe Siggen — Relaxation Benchmarks
// © 1998–2026 Miroslav Šotek. All rights reserved.
// Contact: www.anulum.li | protoscience@anulum.li
// License: GNU AGPL v3 | Commercial licensing available
// ─────────────────────────────────────────────────────────────────────

use criterion::{criterion_group, criterion_main, Criterion};
use hpge_field::boundary::bias_tables;
use hpge_field::grid::GridDims;
use hpge_field::relax::{relax_sweep, PassKind};
use hpge_field::solver::FieldSolver;
use hpge_types::config::DetectorConfig;
use ndarray::Array2;
use std::hint::black_box;

fn ppc_config() -> DetectorConfig {
    DetectorConfig {
        xtal_length: 50.5,
        xtal_radius: 34.5,
        pc_length: 2.1,
        pc_radius: 1.4,
        taper_length: 4.5,
        xtal_grid: 0.5,
        xtal_hv: 2500.0,
        impurity_z0: -0.318,
        impurity_gradient: 0.025,
        max_iterations: 2000,
        ..Default::default()
    }
}

/// One Poisson sweep over the full 101×69 PPC grid.
fn bench_bias_sweep(c: &mut Criterion) {
    let cfg = ppc_config();
    let dims = GridDims::for_bias(&cfg, cfg.xtal_grid);
    let shape = (dims.l + 1, dims.r + 1);
    let mut va = Array2::zeros(shape);
    let mut vb = Array2::zeros(shape);
    let tables = bias_tables(&dims, cfg.xtal_hv, &mut va, &mut vb);
    let pass = PassKind::Bias {
        n0: cfg.impurity_z0,
        gradient_per_cell: 0.1 * cfg.impurity_gradient * cfg.xtal_grid,
        kappa: 0.7072 * 4.0 * cfg.xtal_grid * cfg.xtal_grid,
    };

    c.bench_function("bias_sweep_101x69", |b| {
        b.iter(|| {
            let mut new = vb.clone();
            let stats = relax_sweep(
                black_box(&va),
                &mut new,
                black_box(&tables),
                black_box(&dims),
                black_box(&pass),
                None,
            );
            black_box(stats);
        })
    });
}

/// Full bias solve with a reduced iteration ceiling.
fn bench_bias_solve_capped(c: &mut Criterion) {
    let cfg = ppc_config();
    c.bench_function("bias_solve_2000iter", |b| {
        b.iter(|| {
            let solver = FieldSolver::new(cfg.clone()).unwrap();
            let sol = solver.solve_bias().unwrap();
            black_box(sol.v);
        })
    });
}

criterion_group!(relax_benches, bench_bias_sweep, bench_bias_solve_capped);
criterion_main!(relax_benches);
