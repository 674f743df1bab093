use std::path::PathBuf;

use clap::{ArgAction, Args, Parser, Subcommand};

#[derive(Parser, Debug)]
#[command(
    name = "ionobatch",
    about = "Ionogram batch accumulation and inspection",
    version
)]
pub struct Cli {
    #[arg(long, global = true, action = ArgAction::SetTrue)]
    pub verbose: bool,
    /// Pipeline configuration file.
    #[arg(long, global = true, default_value = "ionobatch.toml")]
    pub config: PathBuf,
    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Average every window of the configured date range.
    Run(RunArgs),
    /// Report records whose height resolution differs from the first one seen.
    Check,
    /// Decode a single record.
    Inspect {
        file: PathBuf,
        #[arg(long, default_value_t = false)]
        json: bool,
    },
    /// Average an arbitrary set of records into one file.
    Merge {
        #[arg(required = true)]
        inputs: Vec<PathBuf>,
        #[arg(long)]
        output: PathBuf,
        #[arg(long, default_value_t = false)]
        overwrite: bool,
    },
}

#[derive(Args, Debug, Default, Clone)]
pub struct RunArgs {
    /// Run the resolution check before accumulating.
    #[arg(long, default_value_t = false)]
    pub check: bool,
    #[arg(long)]
    pub workers: Option<usize>,
    /// Replace window outputs that already exist.
    #[arg(long, default_value_t = false)]
    pub overwrite: bool,
}
