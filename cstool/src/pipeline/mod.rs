mod train_lib;
pub use train_lib::*;

mod train_crf;
pub use train_crf::*;

mod mix;
pub use mix::*;

use std::path::Path;

use anyhow::{Context, Result};
use serde::Serialize;
use thiserror::Error;

use libcs::structs::{CountProfile, Sequence};

#[derive(Error, Debug)]
#[error("unrecognized input file format: {extension}")]
pub struct UnrecognizedFileFormatError {
    extension: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FileFormat {
    Fasta,
    Profile,
    Library,
    Crf,
}

pub fn guess_file_format(path: &Path) -> Result<FileFormat> {
    let extension = path
        .extension()
        .map(|ext| ext.to_string_lossy().to_lowercase())
        .unwrap_or_default();

    match extension.as_str() {
        "fasta" | "fa" | "seq" => Ok(FileFormat::Fasta),
        "prf" => Ok(FileFormat::Profile),
        "lib" => Ok(FileFormat::Library),
        "crf" => Ok(FileFormat::Crf),
        _ => Err(UnrecognizedFileFormatError { extension }.into()),
    }
}

/// Reads training or query input as count profiles: either
/// serialized profile records or fasta sequences converted to
/// single-sequence profiles.
pub fn read_input_profiles(path: &Path) -> Result<Vec<CountProfile>> {
    match guess_file_format(path)? {
        FileFormat::Profile => CountProfile::read_from(path),
        FileFormat::Fasta => {
            let seqs = Sequence::amino_from_fasta(path)?;
            Ok(seqs.iter().map(CountProfile::from_sequence).collect())
        }
        _ => Err(UnrecognizedFileFormatError {
            extension: path.extension().unwrap_or_default().to_string_lossy().into(),
        }
        .into()),
    }
}

pub fn set_num_threads(num_threads: usize) -> Result<()> {
    rayon::ThreadPoolBuilder::new()
        .num_threads(num_threads)
        .build_global()
        .context("failed to build rayon thread pool")
}

/// Summary of a training run, optionally written as JSON next to
/// the model artifact.
#[derive(Debug, Serialize)]
pub struct TrainingReport {
    pub command: String,
    pub input: String,
    pub output: String,
    pub num_training_points: usize,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub scans: Option<usize>,
    pub log_likelihood: f64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub converged: Option<bool>,
}

impl TrainingReport {
    pub fn write_to(&self, path: &Path) -> Result<()> {
        let out = std::fs::File::create(path)
            .with_context(|| format!("failed to create report file: {}", path.display()))?;
        serde_json::to_writer_pretty(out, self).context("failed to serialize training report")
    }
}
