use std::path::PathBuf;

use anyhow::Result;
use clap::{Args, ValueEnum};
use log::info;

use libcs::emission::{DEFAULT_WEIGHT_CENTER, DEFAULT_WEIGHT_DECAY};
use libcs::pseudocounts::{Admix, CrfPseudocounts, LibraryPseudocounts};
use libcs::structs::{ContextLibrary, CountProfile, Crf, Sequence};

use crate::cli::CommonArgs;
use crate::pipeline::{guess_file_format, set_num_threads, FileFormat};

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum AdmixMode {
    /// tau = pca
    Constant,
    /// tau = pca / (1 + (neff - 1) / pcb)
    Neff,
}

#[derive(Debug, Args)]
pub struct MixArgs {
    /// Query file with sequences or count profiles
    #[arg(value_name = "QUERY.[fasta:prf]")]
    pub query_path: PathBuf,

    /// The trained model to take pseudocounts from
    #[arg(short = 'm', long = "model", value_name = "MODEL.[lib:crf]")]
    pub model_path: PathBuf,

    /// Where to place the smoothed profiles
    #[arg(short = 'o', long = "outfile", default_value = "query.prf", value_name = "path")]
    pub out_path: PathBuf,

    /// Admixture rule
    #[arg(long = "admix", value_enum, default_value_t = AdmixMode::Neff)]
    pub admix_mode: AdmixMode,

    /// Overall pseudocount admixture
    #[arg(short = 'x', long = "pca", default_value_t = 0.9, value_name = "F")]
    pub pca: f64,

    /// Neff scale of the divergence-dependent admixture
    #[arg(short = 'c', long = "pcb", default_value_t = 10.0, value_name = "F")]
    pub pcb: f64,

    /// Weight of the central column in the context window
    #[arg(long = "weight-center", default_value_t = DEFAULT_WEIGHT_CENTER, value_name = "F")]
    pub weight_center: f64,

    /// Exponential decay of positional window weights
    #[arg(long = "weight-decay", default_value_t = DEFAULT_WEIGHT_DECAY, value_name = "F")]
    pub weight_decay: f64,

    /// Arguments that are common across all cstool subcommands
    #[command(flatten)]
    pub common_args: CommonArgs,
}

enum Model {
    Library(Box<ContextLibrary>),
    Crf(Box<Crf>),
}

pub fn mix(args: &MixArgs) -> Result<()> {
    set_num_threads(args.common_args.num_threads)?;

    let admix = match args.admix_mode {
        AdmixMode::Constant => Admix::constant(args.pca)?,
        AdmixMode::Neff => Admix::divergence_dependent(args.pca, args.pcb)?,
    };

    let model = match guess_file_format(&args.model_path)? {
        FileFormat::Crf => Model::Crf(Box::new(Crf::read_from(&args.model_path)?)),
        _ => Model::Library(Box::new(ContextLibrary::read_from(&args.model_path)?)),
    };

    let smoothed = match guess_file_format(&args.query_path)? {
        FileFormat::Fasta => {
            let seqs = Sequence::amino_from_fasta(&args.query_path)?;
            info!("read {} query sequences", seqs.len());
            match &model {
                Model::Library(lib) => {
                    let pc = LibraryPseudocounts::new(lib, args.weight_center, args.weight_decay)?;
                    seqs.iter()
                        .map(|seq| pc.add_to_sequence(seq, &admix))
                        .collect::<Result<Vec<_>>>()?
                }
                Model::Crf(crf) => {
                    let pc = CrfPseudocounts::new(crf, args.weight_center, args.weight_decay)?;
                    seqs.iter()
                        .map(|seq| pc.add_to_sequence(seq, &admix))
                        .collect::<Result<Vec<_>>>()?
                }
            }
        }
        _ => {
            let mut profiles = CountProfile::read_from(&args.query_path)?;
            info!("read {} query profiles", profiles.len());
            match &model {
                Model::Library(lib) => {
                    let pc = LibraryPseudocounts::new(lib, args.weight_center, args.weight_decay)?;
                    for cp in profiles.iter_mut() {
                        pc.add_to_profile(&admix, cp)?;
                    }
                }
                Model::Crf(crf) => {
                    let pc = CrfPseudocounts::new(crf, args.weight_center, args.weight_decay)?;
                    for cp in profiles.iter_mut() {
                        pc.add_to_profile(&admix, cp)?;
                    }
                }
            }
            profiles
        }
    };

    CountProfile::write_to(&smoothed, &args.out_path)?;
    info!(
        "wrote {} smoothed profiles to {}",
        smoothed.len(),
        args.out_path.display()
    );
    Ok(())
}
