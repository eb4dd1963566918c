use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::{Args, ValueEnum};
use log::info;
use rand::SeedableRng;
use rand_pcg::Pcg64;
use thiserror::Error;

use libcs::emission::{Emission, DEFAULT_WEIGHT_CENTER, DEFAULT_WEIGHT_DECAY};
use libcs::pseudocounts::{Admix, MatrixPseudocounts};
use libcs::structs::{ContextLibrary, Crf};
use libcs::substitution::SubstitutionMatrix;
use libcs::train::func::{DEFAULT_SIGMA_BIAS, DEFAULT_SIGMA_CONTEXT, DEFAULT_SIGMA_DECAY};
use libcs::train::{
    sample_windows, train_hmc, train_lbfgs, DerivCrfFunc, HmcParams, LbfgsParams, TrainingPair,
};

use crate::cli::CommonArgs;
use crate::pipeline::{guess_file_format, read_input_profiles, set_num_threads, FileFormat,
    TrainingReport};

#[derive(Error, Debug)]
#[error("either --num-states or --jumpstart must be provided")]
pub struct NoInitializationError;

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum CrfAlgorithm {
    Lbfgs,
    Hmc,
}

#[derive(Debug, Args)]
pub struct TrainCrfArgs {
    /// Training file with count profiles or sequences
    #[arg(value_name = "TRAIN.[prf:fasta]")]
    pub train_path: PathBuf,

    /// Where to place the trained CRF
    #[arg(short = 'o', long = "outfile", default_value = "train.crf", value_name = "path")]
    pub out_path: PathBuf,

    /// Number of states in the CRF to be trained
    #[arg(short = 'K', long = "num-states", value_name = "N")]
    pub num_states: Option<usize>,

    /// Jumpstart training from a serialized library or CRF
    #[arg(short = 'j', long = "jumpstart", value_name = "MODEL.[lib:crf]")]
    pub jumpstart_path: Option<PathBuf>,

    /// Length of the context window
    #[arg(short = 'W', long = "window-length", default_value_t = 13, value_name = "N")]
    pub window_length: usize,

    /// Training algorithm
    #[arg(long = "algo", value_enum, default_value_t = CrfAlgorithm::Lbfgs)]
    pub algorithm: CrfAlgorithm,

    /// Fraction of profile windows sampled per training subject
    #[arg(short = 's', long = "sample-rate", default_value_t = 0.2, value_name = "F")]
    pub sample_rate: f64,

    /// Constant pseudocount admixture added to training data
    #[arg(long = "data-pc", default_value_t = 0.01, value_name = "F")]
    pub data_pseudocounts: f64,

    /// Constant pseudocount admixture added to sampled profiles
    /// before they seed CRF states
    #[arg(long = "state-pc", default_value_t = 1.0, value_name = "F")]
    pub state_pseudocounts: f64,

    /// Gaussian prior width for context weights
    #[arg(long = "sigma-context", default_value_t = DEFAULT_SIGMA_CONTEXT, value_name = "F")]
    pub sigma_context: f64,

    /// Exponential decay of the context prior width
    #[arg(long = "sigma-decay", default_value_t = DEFAULT_SIGMA_DECAY, value_name = "F")]
    pub sigma_decay: f64,

    /// Gaussian prior width for bias weights
    #[arg(long = "sigma-bias", default_value_t = DEFAULT_SIGMA_BIAS, value_name = "F")]
    pub sigma_bias: f64,

    /// L-BFGS: maximal number of iterations
    #[arg(long = "max-iterations", default_value_t = 500, value_name = "N")]
    pub max_iterations: usize,

    /// L-BFGS: convergence epsilon on the gradient norm
    #[arg(long = "epsilon", default_value_t = 1e-5, value_name = "F")]
    pub epsilon: f64,

    /// HMC: passes over the training set
    #[arg(long = "epochs", default_value_t = 10, value_name = "N")]
    pub epochs: usize,

    /// HMC: mini-batches per epoch
    #[arg(short = 'B', long = "blocks", default_value_t = 4, value_name = "N")]
    pub num_blocks: usize,

    /// HMC: leap-frog steps per trajectory
    #[arg(long = "leapfrog", default_value_t = 16, value_name = "N")]
    pub leapfrog_steps: usize,

    /// HMC: initial leap-frog step size
    #[arg(long = "step-size", default_value_t = 1e-3, value_name = "F")]
    pub step_size: f64,

    /// Weight of the central column in the context window
    #[arg(long = "weight-center", default_value_t = DEFAULT_WEIGHT_CENTER, value_name = "F")]
    pub weight_center: f64,

    /// Exponential decay of positional window weights
    #[arg(long = "weight-decay", default_value_t = DEFAULT_WEIGHT_DECAY, value_name = "F")]
    pub weight_decay: f64,

    /// Where to place a JSON training report
    #[arg(long = "report", value_name = "path")]
    pub report_path: Option<PathBuf>,

    /// Arguments that are common across all cstool subcommands
    #[command(flatten)]
    pub common_args: CommonArgs,
}

pub fn train_crf(args: &TrainCrfArgs) -> Result<()> {
    if args.num_states.is_none() && args.jumpstart_path.is_none() {
        return Err(NoInitializationError.into());
    }
    set_num_threads(args.common_args.num_threads)?;

    let mut profiles = read_input_profiles(&args.train_path)?;
    info!(
        "read {} training profiles from {}",
        profiles.len(),
        args.train_path.display()
    );

    let sm = SubstitutionMatrix::blosum62();
    let matrix_pc = MatrixPseudocounts::new(&sm);
    let data_admix = Admix::constant(args.data_pseudocounts)?;
    for cp in profiles.iter_mut() {
        matrix_pc.add_to_profile(&data_admix, cp);
    }

    let mut rng = Pcg64::seed_from_u64(args.common_args.seed);
    let windows = sample_windows(&profiles, args.window_length, args.sample_rate, &mut rng)?;
    let pairs: Vec<TrainingPair> = windows
        .iter()
        .map(TrainingPair::from_profile_window)
        .collect::<Result<_>>()?;
    info!("sampled {} training pairs", pairs.len());

    let mut crf = match &args.jumpstart_path {
        Some(path) => match guess_file_format(path)? {
            FileFormat::Crf => Crf::read_from(path)?,
            _ => Crf::from_library(&ContextLibrary::read_from(path)?)?,
        },
        None => {
            // seed states get their own, stronger admixture so the
            // log-space initialization stays finite
            let state_admix = Admix::constant(args.state_pseudocounts)?;
            let init_windows: Vec<_> = windows
                .iter()
                .map(|w| {
                    let mut w = w.clone();
                    matrix_pc.add_to_profile(&state_admix, &mut w);
                    w
                })
                .collect();
            let lib = ContextLibrary::init_by_sampling(
                args.num_states.unwrap(),
                args.window_length,
                sm.alphabet(),
                &init_windows,
                &mut rng,
            )
            .context("failed to initialize CRF states from training windows")?;
            Crf::from_library(&lib)?
        }
    };

    let emission = Emission::new(crf.num_cols(), args.weight_center, args.weight_decay)?;
    let mut func = DerivCrfFunc::new(
        &pairs,
        &sm,
        args.sigma_context,
        args.sigma_decay,
        args.sigma_bias,
    )?;

    let outcome = match args.algorithm {
        CrfAlgorithm::Lbfgs => {
            let params = LbfgsParams {
                max_iterations: args.max_iterations,
                epsilon: args.epsilon,
            };
            train_lbfgs(&mut crf, &func, &emission, &params)?
        }
        CrfAlgorithm::Hmc => {
            let params = HmcParams {
                epochs: args.epochs,
                nblocks: args.num_blocks,
                leapfrog_steps: args.leapfrog_steps,
                epsilon: args.step_size,
                target_acceptance: 0.9,
                seed: args.common_args.seed,
            };
            train_hmc(&mut crf, &mut func, &emission, &params)?
        }
    };
    info!(
        "final objective: log(L) = {:.5}, prior = {:.5}",
        outcome.loglike, outcome.prior
    );

    crf.write_to(&args.out_path)?;
    info!("wrote CRF to {}", args.out_path.display());

    if let Some(report_path) = &args.report_path {
        TrainingReport {
            command: "train-crf".to_string(),
            input: args.train_path.display().to_string(),
            output: args.out_path.display().to_string(),
            num_training_points: pairs.len(),
            scans: None,
            log_likelihood: outcome.loglike,
            converged: None,
        }
        .write_to(report_path)?;
    }

    Ok(())
}
