mod cli;
mod pipeline;

use cli::Cli;

use crate::cli::SubCommands;
use anyhow::Result;
use clap::Parser;

fn main() -> Result<()> {
    let cli = Cli::parse();

    let log_level = cli.common_args().log_level.clone();
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(log_level.as_str()))
        .init();

    match cli.command {
        SubCommands::TrainLib(args) => {
            pipeline::train_lib(&args)?;
        }
        SubCommands::TrainCrf(args) => {
            pipeline::train_crf(&args)?;
        }
        SubCommands::Mix(args) => {
            pipeline::mix(&args)?;
        }
    }
    Ok(())
}
