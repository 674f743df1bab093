mod cli;
mod config;
mod engine;
#[cfg(test)]
mod fixtures;
mod inspect;
mod logging;
mod progress;
mod resolution;
mod run;
mod window;

use anyhow::Result;
use clap::Parser;

use crate::cli::{Cli, Command};

fn main() -> Result<()> {
    let cli = Cli::parse();
    let verbose = if cli.verbose {
        true
    } else {
        logging::env_flag()
    };
    logging::init(verbose);
    match cli.command {
        Command::Run(args) => run::run_from_config(&cli.config, &args),
        Command::Check => run::check_from_config(&cli.config),
        Command::Inspect { file, json } => inspect::inspect(&file, json),
        Command::Merge {
            inputs,
            output,
            overwrite,
        } => inspect::merge(&inputs, &output, overwrite),
    }
}
