//! Field-generation command line.
//!
//! Solves the bias potential (and optionally the weighting potential) for
//! the detector described by a setup file, and writes the ASCII field files
//! consumed by the signal stage.

use std::path::PathBuf;
use std::process::ExitCode;

use anyhow::Context;
use clap::Parser;
use hpge_field::output::{capacitance, write_field_file, write_undepleted_map, write_wp_file};
use hpge_field::solver::FieldSolver;
use hpge_types::config::DetectorConfig;

#[derive(Parser, Debug)]
#[command(name = "fieldgen", about = "HPGe detector field solver")]
struct Cli {
    /// Setup file
    #[arg(short = 'c', value_name = "FILE")]
    config: PathBuf,

    /// Override the bias voltage from the setup file (volts)
    #[arg(short = 'b', value_name = "VOLTS")]
    bias: Option<f64>,

    /// Write the V/E field file: 0 = no, 1 = yes
    #[arg(short = 'w', value_name = "0|1")]
    write_field: Option<u32>,

    /// Calculate and write the weighting potential: 0 = no, 1 = yes
    #[arg(short = 'p', value_name = "0|1")]
    write_wp: Option<u32>,
}

fn main() -> ExitCode {
    let cli = Cli::parse();
    match run(cli) {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("fieldgen: {e:#}");
            ExitCode::FAILURE
        }
    }
}

fn run(cli: Cli) -> anyhow::Result<()> {
    let mut cfg = DetectorConfig::from_file(&cli.config)
        .with_context(|| format!("cannot read setup file {}", cli.config.display()))?;
    init_logging(cfg.verbosity);

    if let Some(bias) = cli.bias {
        cfg.xtal_hv = bias;
    }
    if let Some(wv) = cli.write_field {
        cfg.write_field = wv;
    }
    if let Some(wp) = cli.write_wp {
        cfg.write_wp = wp;
    }

    log::info!(
        "crystal: radius x length: {:.1} x {:.1} mm, taper {:.1} mm",
        cfg.xtal_radius,
        cfg.xtal_length,
        cfg.taper_length
    );
    if cfg.wrap_around_radius > 0.0 {
        log::info!(
            "wrap-around: radius x ditch x gap: {:.1} x {:.1} x {:.1} mm",
            cfg.wrap_around_radius,
            cfg.ditch_depth,
            cfg.ditch_thickness
        );
    }
    log::info!(
        "bias: {:.0} V, impurities: ({:.3} + {:.3} z) e10/cm3",
        cfg.xtal_hv,
        cfg.impurity_z0,
        cfg.impurity_gradient
    );

    let solver = FieldSolver::new(cfg.clone())?;
    let bias = solver.solve_bias()?;
    write_undepleted_map("undepleted.txt", &bias.undepleted)
        .context("cannot write undepleted.txt")?;

    if cfg.write_field > 0 {
        log::info!("writing electric field data to {}", cfg.field_name);
        write_field_file(&cfg.field_name, &bias, solver.polarity())
            .with_context(|| format!("cannot write field file {}", cfg.field_name))?;
    }

    if cfg.write_wp > 0 {
        let wp = solver.solve_weighting(&bias)?;
        let (esum, esum2) = capacitance(&wp);
        log::info!(
            "capacitance at {:.0} V: {:.3} pF",
            solver.bias_volts(),
            esum
        );
        if bias.fully_depleted {
            log::info!("alternative capacitance estimate: {esum2:.3} pF");
        }
        if cfg.write_wp == 1 {
            log::info!("writing weighting potential to {}", cfg.wp_name);
            write_wp_file(&cfg.wp_name, &wp)
                .with_context(|| format!("cannot write WP file {}", cfg.wp_name))?;
        }
    }

    Ok(())
}

/// Map the setup verbosity to a log filter; RUST_LOG still wins when set.
fn init_logging(verbosity: u32) {
    let level = match verbosity {
        0 => log::LevelFilter::Warn,
        1 => log::LevelFilter::Info,
        _ => log::LevelFilter::Debug,
    };
    env_logger::Builder::from_default_env()
        .filter_level(level)
        .format_timestamp(None)
        .try_init()
        .ok();
}
