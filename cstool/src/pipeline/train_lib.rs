use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::Args;
use log::{info, warn};
use rand::SeedableRng;
use rand_pcg::Pcg64;

use libcs::emission::{Emission, DEFAULT_WEIGHT_CENTER, DEFAULT_WEIGHT_DECAY};
use libcs::progress::ProgressTable;
use libcs::pseudocounts::{Admix, MatrixPseudocounts};
use libcs::structs::ContextLibrary;
use libcs::substitution::SubstitutionMatrix;
use libcs::train::{
    sample_windows, Clustering, ClusteringParams, ContextLibFunc, Subject, TrainingPair,
};

use crate::cli::CommonArgs;
use crate::pipeline::{read_input_profiles, set_num_threads, TrainingReport};

#[derive(Debug, Args)]
pub struct TrainLibArgs {
    /// Training file with count profiles or sequences
    #[arg(value_name = "TRAIN.[prf:fasta]")]
    pub train_path: PathBuf,

    /// Where to place the trained library
    #[arg(short = 'o', long = "outfile", default_value = "train.lib", value_name = "path")]
    pub out_path: PathBuf,

    /// Number of profiles in the library to be trained
    #[arg(short = 'K', long = "num-profiles", value_name = "N")]
    pub num_profiles: usize,

    /// Length of the context window
    #[arg(short = 'W', long = "window-length", default_value_t = 13, value_name = "N")]
    pub window_length: usize,

    /// Fraction of profile windows sampled per training subject
    #[arg(short = 's', long = "sample-rate", default_value_t = 0.2, value_name = "F")]
    pub sample_rate: f64,

    /// Constant pseudocount admixture added to training data
    #[arg(long = "data-pc", default_value_t = 0.01, value_name = "F")]
    pub data_pseudocounts: f64,

    /// Constant pseudocount admixture added to sampled profiles
    /// before they seed library components
    #[arg(long = "state-pc", default_value_t = 1.0, value_name = "F")]
    pub state_pseudocounts: f64,

    /// Number of blocks for online training (default: N^(3/8))
    #[arg(short = 'B', long = "blocks", value_name = "N")]
    pub num_blocks: Option<usize>,

    /// Retention of sufficient statistics between blocks
    #[arg(long = "blending", default_value_t = 1.0, value_name = "F")]
    pub blending: f64,

    /// Maximal likelihood change per column for convergence
    #[arg(short = 'l', long = "likelihood-change", default_value_t = 2e-4, value_name = "F")]
    pub log_likelihood_change: f64,

    /// Minimal number of training data scans
    #[arg(long = "min-scans", default_value_t = 10, value_name = "N")]
    pub min_scans: usize,

    /// Maximal number of training data scans
    #[arg(long = "max-scans", default_value_t = 100, value_name = "N")]
    pub max_scans: usize,

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

pub fn train_lib(args: &TrainLibArgs) -> Result<()> {
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
        cp.convert_to_counts();
    }

    let mut rng = Pcg64::seed_from_u64(args.common_args.seed);
    let windows = sample_windows(&profiles, args.window_length, args.sample_rate, &mut rng)?;
    info!("sampled {} training windows", windows.len());

    // seed components get their own, stronger admixture so no
    // initial emission starts at zero
    let state_admix = Admix::constant(args.state_pseudocounts)?;
    let init_windows: Vec<_> = windows
        .iter()
        .map(|w| {
            let mut w = w.clone();
            matrix_pc.add_to_profile(&state_admix, &mut w);
            w
        })
        .collect();

    let mut lib = ContextLibrary::init_by_sampling(
        args.num_profiles,
        args.window_length,
        sm.alphabet(),
        &init_windows,
        &mut rng,
    )
    .context("failed to initialize the library from training windows")?;

    let subjects: Vec<Subject> = windows.into_iter().map(Subject::Profile).collect();

    let params = ClusteringParams {
        max_scans: args.max_scans,
        min_scans: args.min_scans,
        log_likelihood_change: args.log_likelihood_change,
        num_blocks: args.num_blocks,
        blending: args.blending,
        weight_center: args.weight_center,
        weight_decay: args.weight_decay,
    };
    let mut clustering = Clustering::new(&mut lib, &subjects, params)?;
    let mut table = ProgressTable::new(std::io::stdout());
    let outcome = clustering.run(Some(&mut table))?;

    if !outcome.converged {
        info!(
            "likelihood change {:.2e} still above threshold after {} scans",
            outcome.log_likelihood_change, outcome.scans
        );
    }

    // conditional pseudocount-prediction objective of the trained
    // mixture, relative to the background
    let pairs: Vec<TrainingPair> = subjects
        .iter()
        .filter_map(|s| match s {
            Subject::Profile(cp) => TrainingPair::from_profile_window(cp).ok(),
            Subject::Window(_) => None,
        })
        .collect();
    let emission = Emission::new(args.window_length, args.weight_center, args.weight_decay)?;
    let func = ContextLibFunc::new(&pairs, &sm, Admix::constant(1.0)?);
    match func.evaluate(&lib, &emission) {
        Ok(ll) => info!(
            "pseudocount objective: {:.5} per training pair",
            ll / pairs.len() as f64
        ),
        Err(err) => warn!("could not evaluate pseudocount objective: {err}"),
    }

    lib.write_to(&args.out_path)?;
    info!("wrote library to {}", args.out_path.display());

    if let Some(report_path) = &args.report_path {
        TrainingReport {
            command: "train-lib".to_string(),
            input: args.train_path.display().to_string(),
            output: args.out_path.display().to_string(),
            num_training_points: subjects.len(),
            scans: Some(outcome.scans),
            log_likelihood: outcome.log_likelihood,
            converged: Some(outcome.converged),
        }
        .write_to(report_path)?;
    }

    Ok(())
}
