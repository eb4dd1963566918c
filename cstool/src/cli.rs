use crate::pipeline::{MixArgs, TrainCrfArgs, TrainLibArgs};
use clap::{Args, Parser, Subcommand};

#[derive(Args, Debug, Clone)]
pub struct CommonArgs {
    /// The number of threads to use
    #[arg(
        short = 't',
        long = "threads",
        default_value_t = 8usize,
        value_name = "n"
    )]
    pub num_threads: usize,

    /// Seed for all random sampling
    #[arg(long = "seed", default_value_t = 0u64, value_name = "n")]
    pub seed: u64,

    /// Logging filter (error, warn, info, debug, trace)
    #[arg(long = "log-level", default_value = "info", value_name = "level")]
    pub log_level: String,
}

impl Cli {
    pub fn common_args(&self) -> &CommonArgs {
        match &self.command {
            SubCommands::TrainLib(args) => &args.common_args,
            SubCommands::TrainCrf(args) => &args.common_args,
            SubCommands::Mix(args) => &args.common_args,
        }
    }
}

#[derive(Subcommand)]
pub enum SubCommands {
    #[command(about = "Train a context library on count profiles by expectation-maximization")]
    TrainLib(TrainLibArgs),
    #[command(about = "Train a CRF on count profiles by L-BFGS or hybrid Monte-Carlo")]
    TrainCrf(TrainCrfArgs),
    #[command(about = "Mix context-specific pseudocounts into query sequences or profiles")]
    Mix(MixArgs),
}

#[derive(Parser)]
#[command(name = "cstool")]
#[command(
    about = "Train context libraries and CRFs for context-specific pseudocounts, \
             and mix them into query profiles"
)]
pub struct Cli {
    #[command(subcommand)]
    pub command: SubCommands,
}
