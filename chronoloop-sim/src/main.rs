use std::{path::PathBuf, process::ExitCode};

use chronoloop_sim::{config::Config, setup_logger, simulation};
use clap::Parser;
use tracing_subscriber::filter::LevelFilter;

#[derive(Parser, Debug)]
#[clap(author, version, about, long_about = None)]
struct Args {
    /// Configuration file to use
    #[clap(long = "config", short = 'c', default_value = "chronoloop-sim/sim.toml")]
    config_file: PathBuf,

    /// Overrides the log level of the config
    #[clap(long, short)]
    log_level: Option<LevelFilter>,

    /// Overrides the random seed of the config
    #[clap(long)]
    seed: Option<u64>,

    /// Overrides the simulated duration in seconds
    #[clap(long)]
    duration: Option<u64>,

    /// Print the summary as JSON
    #[clap(long)]
    json: bool,
}

fn main() -> ExitCode {
    let args = Args::parse();

    let mut config = match Config::from_file(&args.config_file) {
        Ok(config) => config,
        Err(error) => {
            eprintln!("Could not load {}: {error}", args.config_file.display());
            return ExitCode::FAILURE;
        }
    };

    if let Some(seed) = args.seed {
        config.simulation.seed = seed;
    }
    if let Some(duration) = args.duration {
        config.simulation.duration = duration;
    }
    if let Err(error) = config.check() {
        eprintln!("{error}");
        return ExitCode::FAILURE;
    }

    let level = args.log_level.unwrap_or(config.simulation.log_level);
    if let Err(error) = setup_logger(level) {
        eprintln!("Could not set up logging: {error}");
        return ExitCode::FAILURE;
    }

    let summary = match simulation::run(&config) {
        Ok(summary) => summary,
        Err(error) => {
            tracing::error!("{error}");
            return ExitCode::FAILURE;
        }
    };

    if args.json {
        match serde_json::to_string_pretty(&summary) {
            Ok(json) => println!("{json}"),
            Err(error) => {
                tracing::error!("Could not serialize summary: {error}");
                return ExitCode::FAILURE;
            }
        }
    } else {
        println!("{summary}");
    }

    ExitCode::SUCCESS
}
