//! End-to-end pipeline: solve the fields, write the ASCII files, read them
//! back through the signal stage and simulate an event.

use hpge_field::output::{capacitance, write_field_file, write_wp_file};
use hpge_field::solver::FieldSolver;
use hpge_signal::signal::SignalSimulator;
use hpge_types::config::DetectorConfig;
use hpge_types::error::HpgeError;
use hpge_types::point::Point;
use std::path::PathBuf;

fn workspace_root() -> PathBuf {
    PathBuf::from(env!("CARGO_MANIFEST_DIR")).join("..").join("..")
}

fn small_config(tag: &str) -> DetectorConfig {
    let dir = std::env::temp_dir();
    let id = std::process::id();
    DetectorConfig {
        xtal_length: 10.0,
        xtal_radius: 10.0,
        pc_length: 2.0,
        pc_radius: 2.0,
        xtal_grid: 0.5,
        xtal_hv: 1000.0,
        impurity_z0: -0.1,
        max_iterations: 20000,
        xtal_temp: 90.0,
        time_steps_calc: 500,
        step_time_calc: 1.0,
        step_time_out: 5.0,
        preamp_tau: 0.0,
        drift_name: workspace_root()
            .join("config/drift_vel_tb.dat")
            .to_string_lossy()
            .into_owned(),
        field_name: dir
            .join(format!("hpge-pipeline-{id}-{tag}-ev.dat"))
            .to_string_lossy()
            .into_owned(),
        wp_name: dir
            .join(format!("hpge-pipeline-{id}-{tag}-wp.dat"))
            .to_string_lossy()
            .into_owned(),
        ..Default::default()
    }
}

#[test]
fn test_solve_write_read_simulate() {
    let cfg = small_config("roundtrip");
    let solver = FieldSolver::new(cfg.clone()).unwrap();
    let bias = solver.solve_bias().unwrap();
    assert!(bias.report.converged);
    assert!(bias.fully_depleted);
    let wp = solver.solve_weighting(&bias).unwrap();

    write_field_file(&cfg.field_name, &bias, solver.polarity()).unwrap();
    write_wp_file(&cfg.wp_name, &wp).unwrap();

    let mut sim = SignalSimulator::new(cfg.clone()).unwrap();
    let mut out = vec![0.0; sim.output_len()];
    sim.simulate(Point::new(0.0, 0.0, 6.0), Some(&mut out)).unwrap();

    std::fs::remove_file(&cfg.field_name).ok();
    std::fs::remove_file(&cfg.wp_name).ok();

    let last = *out.last().unwrap();
    assert!(
        (last - 1.0).abs() < 0.05,
        "collected charge should approach 1, got {last}"
    );
    // the hole path must end near the point contact
    let h_end = sim
        .drift_path_hole()
        .iter()
        .rev()
        .find(|p| *p != &Point::default())
        .copied()
        .unwrap();
    assert!(h_end.z < 3.0, "hole should end near the contact: {h_end:?}");
}

#[test]
fn test_outside_start_point_is_skipped() {
    let cfg = small_config("outside");
    let solver = FieldSolver::new(cfg.clone()).unwrap();
    let bias = solver.solve_bias().unwrap();
    let wp = solver.solve_weighting(&bias).unwrap();
    write_field_file(&cfg.field_name, &bias, solver.polarity()).unwrap();
    write_wp_file(&cfg.wp_name, &wp).unwrap();

    let mut sim = SignalSimulator::new(cfg.clone()).unwrap();
    let mut out = vec![0.0; sim.output_len()];
    let err = sim
        .simulate(Point::new(0.0, 0.0, 60.0), Some(&mut out))
        .unwrap_err();
    std::fs::remove_file(&cfg.field_name).ok();
    std::fs::remove_file(&cfg.wp_name).ok();
    assert!(matches!(err, HpgeError::OutsideDetector));
}

/// Full-size PPC solve of the example setup. Slow; run with `--ignored`.
#[test]
#[ignore]
fn test_full_ppc_solve() {
    let cfg = DetectorConfig::from_file(workspace_root().join("config/ppc.config")).unwrap();
    let solver = FieldSolver::new(cfg).unwrap();
    let bias = solver.solve_bias().unwrap();
    assert!(bias.report.converged, "must converge within 30000 iterations");
    assert!(bias.fully_depleted);

    let wp = solver.solve_weighting(&bias).unwrap();
    let (esum, esum2) = capacitance(&wp);
    assert!(
        (esum - esum2).abs() / esum < 0.1,
        "capacitance estimates disagree: {esum} vs {esum2}"
    );
}
