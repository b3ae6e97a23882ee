use crate::io::{
    frame_to_geometry, read_file_to_frame, read_input, write_footer, write_header, Configuration,
    Geometry,
};
use crate::polarization::run_polarization;
use crate::scf::{HubbardChain, ScfError, SelfConsistentField};
use crate::utils::Timer;
use anyhow::{bail, Context, Result};
use chemfiles::Frame;
use clap::{Arg, Command};
use env_logger::Builder;
use log::{error, info, warn, LevelFilter};
use std::io::Write;
use std::process;

mod constants;
mod defaults;
mod io;
mod matrix;
mod polarization;
mod scf;
mod utils;

#[macro_use]
extern crate clap;

fn main() {
    // Input.
    let matches = Command::new(crate_name!())
        .version(crate_version!())
        .about("convergence acceleration of SCF iterations and induced multipole solvers")
        .arg(
            Arg::new("geometry")
                .help("Sets the xyz file of the polarization job")
                .required(false)
                .index(1),
        )
        .get_matches();
    let geometry_file: Option<&str> = matches.value_of("geometry");

    // The configuration file is read or created with the default settings.
    let config: Configuration = match read_input() {
        Ok(config) => config,
        Err(err) => {
            eprintln!("Error: {:?}", err);
            process::exit(1);
        }
    };

    // Multithreading.
    rayon::ThreadPoolBuilder::new()
        .num_threads(config.parallelization.number_of_cores)
        .build_global()
        .unwrap();

    // Logging.
    // The log level is set.
    let log_level: LevelFilter = match config.verbose {
        2 => LevelFilter::Trace,
        1 => LevelFilter::Debug,
        0 => LevelFilter::Info,
        -1 => LevelFilter::Warn,
        -2 => LevelFilter::Error,
        _ => LevelFilter::Info,
    };
    // and the logger is build.
    Builder::new()
        .format(|buf, record| writeln!(buf, "{}", record.args()))
        .filter(None, log_level)
        .init();

    // The program header is written to the command line.
    write_header();
    // and the total wall-time timer is started.
    let timer: Timer = Timer::start();

    // Computations.
    // ................................................................
    if let Err(err) = run_job(&config, geometry_file) {
        match err.downcast_ref::<ScfError>() {
            // non-converged SCF calculations are reported, but they are not fatal
            Some(scf_error) => warn!("{}", scf_error),
            None => {
                error!("Error: {:?}", err);
                write_footer(timer);
                process::exit(1);
            }
        }
    }

    // ................................................................
    write_footer(timer);
}

fn run_job(config: &Configuration, geometry_file: Option<&str>) -> Result<()> {
    match config.jobtype.as_str() {
        "scf" | "ls_scf" | "charges" => {
            let model: HubbardChain = HubbardChain::new(&config.model)?;
            let energy: f64 = match config.jobtype.as_str() {
                "scf" => model.run_scf(config)?,
                "ls_scf" => model.run_ls_scf(config)?,
                _ => model.run_charge_scf(config)?,
            };
            info!("{: <25} {:18.14} Hartree", "final SCF energy:", energy);
        }
        "polarization" => {
            let filename: &str = geometry_file
                .context("The polarization job needs a geometry file as argument")?;
            let frame: Frame = read_file_to_frame(filename)?;
            let geometry: Geometry = frame_to_geometry(&frame)?;
            info!("{: <25} {}", "number of atoms:", geometry.atomic_numbers.len());
            run_polarization(
                &geometry,
                &config.polarization,
                config.parallelization.number_of_ranks,
            )?;
        }
        jobtype => bail!(
            "Unknown jobtype {}, use scf, ls_scf, charges or polarization",
            jobtype
        ),
    }
    Ok(())
}
