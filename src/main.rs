mod aligner;
mod call;
mod cli;
mod discordant_pair;
mod genome_ref;
mod globals;
mod logger;
mod report;
mod run_stats;
mod softclip;
mod sv_cluster;
mod utils;

use std::process;

use hhmmss::Hhmmss;
use log::{error, info};

use crate::call::run_call;
use crate::cli::Commands;
use crate::globals::{PROGRAM_NAME, PROGRAM_VERSION};
use crate::logger::setup_output_dir_and_logger;

fn run(settings: &cli::Settings) -> simple_error::SimpleResult<()> {
    info!("Starting {PROGRAM_NAME} {PROGRAM_VERSION}");
    info!(
        "cmdline: {}",
        std::env::args().collect::<Vec<_>>().join(" ")
    );
    info!("Running on {} threads", settings.shared.thread_count);

    let start = std::time::Instant::now();

    match &settings.command {
        Commands::Call(x) => {
            run_call(&settings.shared, x)?;
        }
    }

    info!(
        "{PROGRAM_NAME} completed. Total Runtime: {}",
        start.elapsed().hhmmssxxx()
    );
    Ok(())
}

fn main() {
    let settings = cli::validate_and_fix_settings(cli::parse_settings());

    // Setup logger, including creation of the output directory for the log file:
    setup_output_dir_and_logger(
        settings.get_output_dir(),
        settings.shared.clobber,
        settings.shared.debug,
    );

    if let Err(err) = run(&settings) {
        error!("{err}");
        eprintln!("{err}");
        process::exit(exitcode::DATAERR);
    }
}
