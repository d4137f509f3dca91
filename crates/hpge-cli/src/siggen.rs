//! Signal-generation command line.
//!
//! Loads the solved field and weighting-potential files named by a setup
//! file and prints the charge waveform induced by an electron–hole pair
//! created at the given Cartesian point.

use std::path::PathBuf;
use std::process::ExitCode;

use anyhow::Context;
use clap::Parser;
use hpge_signal::signal::SignalSimulator;
use hpge_types::config::DetectorConfig;
use hpge_types::error::HpgeError;
use hpge_types::point::Point;

#[derive(Parser, Debug)]
#[command(name = "siggen", about = "HPGe detector signal calculation")]
struct Cli {
    /// Setup file
    #[arg(short = 'c', value_name = "FILE")]
    config: PathBuf,

    /// Interaction point, mm
    #[arg(value_name = "X")]
    x: f64,
    #[arg(value_name = "Y")]
    y: f64,
    #[arg(value_name = "Z")]
    z: f64,
}

fn main() -> ExitCode {
    let cli = Cli::parse();
    match run(cli) {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("siggen: {e:#}");
            ExitCode::FAILURE
        }
    }
}

fn run(cli: Cli) -> anyhow::Result<()> {
    let cfg = DetectorConfig::from_file(&cli.config)
        .with_context(|| format!("cannot read setup file {}", cli.config.display()))?;
    init_logging(cfg.verbosity);

    let step_out = cfg.step_time_out;
    let mut sim = SignalSimulator::new(cfg)?;
    let mut out = vec![0.0; sim.output_len()];
    let pt = Point::new(cli.x, cli.y, cli.z);

    match sim.simulate(pt, Some(&mut out)) {
        Ok(()) => {}
        Err(HpgeError::OutsideDetector) => {
            // skipped event, not an error worth a stack of context
            log::warn!("point ({} {} {}) is outside the detector", pt.x, pt.y, pt.z);
            return Ok(());
        }
        Err(e) => return Err(e.into()),
    }

    println!("# t (ns)   charge");
    for (j, q) in out.iter().enumerate() {
        println!("{:8.1} {:9.5}", j as f64 * step_out, q);
    }
    Ok(())
}

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
