//! Expectation-maximization training of context libraries, with
//! online mini-batch sufficient statistics.

use std::io::Write;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use anyhow::Result;
use log::debug;
use rayon::prelude::*;
use thiserror::Error;

use crate::emission::{Emission, DEFAULT_WEIGHT_CENTER, DEFAULT_WEIGHT_DECAY};
use crate::progress::ProgressTable;
use crate::pseudocounts::{library_posteriors, library_posteriors_window};
use crate::structs::{ContextLibrary, CountProfile};

/// Training pairs per parallel work unit; partial statistics are
/// merged in chunk order so the reduction is deterministic.
const SUBJECT_CHUNK: usize = 64;

#[derive(Error, Debug)]
#[error("blending factor {value} is outside (0, 1]")]
pub struct BlendingRangeError {
    value: f64,
}

#[derive(Error, Debug)]
#[error("weight_center must be positive, got {value}")]
pub struct WeightCenterRangeError {
    value: f64,
}

#[derive(Error, Debug)]
#[error("training subject has {found} columns but the library window is {expected}")]
pub struct SubjectShapeError {
    expected: usize,
    found: usize,
}

#[derive(Error, Debug)]
#[error("training set is empty")]
pub struct EmptyTrainingSetError;

/// One training subject for the E-step: a count-profile window or
/// a window of digital letters.
#[derive(Clone, Debug)]
pub enum Subject {
    Profile(CountProfile),
    Window(Vec<u8>),
}

impl Subject {
    pub fn num_cols(&self) -> usize {
        match self {
            Subject::Profile(cp) => cp.num_cols(),
            Subject::Window(x) => x.len(),
        }
    }
}

#[derive(Debug, Clone)]
pub struct ClusteringParams {
    pub max_scans: usize,
    pub min_scans: usize,
    /// Convergence threshold on the change of the per-column
    /// log-likelihood between scans.
    pub log_likelihood_change: f64,
    /// Number of mini-batches per scan; None derives it from the
    /// corpus size as ceil(N^(3/8)).
    pub num_blocks: Option<usize>,
    /// Retention of global sufficient statistics when a block is
    /// merged: S <- eta * S + S_block.
    pub blending: f64,
    pub weight_center: f64,
    pub weight_decay: f64,
}

impl Default for ClusteringParams {
    fn default() -> Self {
        ClusteringParams {
            max_scans: 100,
            min_scans: 10,
            log_likelihood_change: 2e-4,
            num_blocks: None,
            blending: 1.0,
            weight_center: DEFAULT_WEIGHT_CENTER,
            weight_decay: DEFAULT_WEIGHT_DECAY,
        }
    }
}

#[derive(Debug, Clone)]
pub struct ClusteringOutcome {
    pub scans: usize,
    /// Final per-column log-likelihood.
    pub log_likelihood: f64,
    pub log_likelihood_change: f64,
    pub converged: bool,
}

/// Per-component sufficient statistics: the prior accumulator and
/// the weighted emission counts.
#[derive(Clone)]
struct SuffStats {
    prior: f64,
    counts: Vec<Vec<f64>>,
}

impl SuffStats {
    fn new(num_cols: usize, nalph: usize) -> Self {
        SuffStats {
            prior: 0.0,
            counts: vec![vec![0.0; nalph]; num_cols],
        }
    }

    fn merge(&mut self, other: &SuffStats) {
        self.prior += other.prior;
        for (col, other_col) in self.counts.iter_mut().zip(other.counts.iter()) {
            for (v, &o) in col.iter_mut().zip(other_col.iter()) {
                *v += o;
            }
        }
    }
}

/// The EM driver: owns the global and per-block sufficient
/// statistics and mutates the library in place.
pub struct Clustering<'a> {
    params: ClusteringParams,
    data: &'a [Subject],
    lib: &'a mut ContextLibrary,
    emission: Emission,
    stats: Vec<SuffStats>,
    num_eff_cols: f64,
    stop: Option<Arc<AtomicBool>>,
}

impl<'a> Clustering<'a> {
    pub fn new(
        lib: &'a mut ContextLibrary,
        data: &'a [Subject],
        params: ClusteringParams,
    ) -> Result<Self> {
        if params.blending <= 0.0 || params.blending > 1.0 {
            return Err(BlendingRangeError {
                value: params.blending,
            }
            .into());
        }
        if params.weight_center <= 0.0 {
            return Err(WeightCenterRangeError {
                value: params.weight_center,
            }
            .into());
        }
        if data.is_empty() {
            return Err(EmptyTrainingSetError.into());
        }
        for subject in data {
            if subject.num_cols() != lib.num_cols() {
                return Err(SubjectShapeError {
                    expected: lib.num_cols(),
                    found: subject.num_cols(),
                }
                .into());
            }
        }

        let emission = Emission::new(lib.num_cols(), params.weight_center, params.weight_decay)?;
        let num_eff_cols = emission.sum_weights() * data.len() as f64;
        let stats = (0..lib.num_profiles())
            .map(|_| SuffStats::new(lib.num_cols(), lib.alphabet_size()))
            .collect();

        // emission scores are read many times per scan; keep the
        // library in log space for the duration of training
        lib.transform_to_logspace();

        Ok(Clustering {
            params,
            data,
            lib,
            emission,
            stats,
            num_eff_cols,
            stop: None,
        })
    }

    /// Installs a cooperative stop flag, consulted between scans.
    pub fn with_stop_flag(mut self, stop: Arc<AtomicBool>) -> Self {
        self.stop = Some(stop);
        self
    }

    pub fn num_blocks(&self) -> usize {
        match self.params.num_blocks {
            Some(b) => b.clamp(1, self.data.len().max(1)),
            None => (self.data.len() as f64).powf(3.0 / 8.0).ceil() as usize,
        }
    }

    pub fn run_quiet(&mut self) -> Result<ClusteringOutcome> {
        self.run(None::<&mut ProgressTable<std::io::Sink>>)
    }

    pub fn run<W: Write>(
        &mut self,
        mut progress: Option<&mut ProgressTable<W>>,
    ) -> Result<ClusteringOutcome> {
        let num_blocks = self.num_blocks();
        let block_size = self.data.len().div_ceil(num_blocks);

        if let Some(table) = progress.as_deref_mut() {
            table.set_total_work(self.lib.num_profiles() * self.data.len());
            table.print_header()?;
        }

        let mut prev_ll = 0.0;
        let mut outcome = ClusteringOutcome {
            scans: 0,
            log_likelihood: 0.0,
            log_likelihood_change: 0.0,
            converged: false,
        };

        for scan in 1..=self.params.max_scans {
            if let Some(stop) = &self.stop {
                if stop.load(Ordering::Relaxed) {
                    break;
                }
            }
            if let Some(table) = progress.as_deref_mut() {
                table.row_begin(scan, num_blocks, self.params.blending)?;
            }

            let mut scan_ll = 0.0;
            let data = self.data;
            for block in data.chunks(block_size) {
                let (block_stats, block_ll) = self.expectation_step(block)?;
                scan_ll += block_ll;
                self.merge_block(&block_stats);
                self.maximization_step();

                if let Some(table) = progress.as_deref_mut() {
                    table.advance(self.lib.num_profiles() * block.len())?;
                }
            }
            self.lib.iterations += 1;

            let ll = scan_ll / self.num_eff_cols;
            let delta = ll - prev_ll;
            debug!("scan {scan}: log(L) = {ll:.5} ({delta:+.5})");
            if let Some(table) = progress.as_deref_mut() {
                table.row_end(ll, if scan > 1 { Some(delta) } else { None })?;
            }

            outcome.scans = scan;
            outcome.log_likelihood = ll;
            outcome.log_likelihood_change = delta;
            if scan >= self.params.min_scans && delta.abs() < self.params.log_likelihood_change {
                outcome.converged = true;
                break;
            }
            prev_ll = ll;
        }

        Ok(outcome)
    }

    /// Computes posteriors for every subject of the block and
    /// accumulates block-level sufficient statistics. Parallel over
    /// subjects; per-chunk partials are merged in chunk order.
    fn expectation_step(&self, block: &[Subject]) -> Result<(Vec<SuffStats>, f64)> {
        let lib = &*self.lib;
        let emission = &self.emission;
        let num_profiles = lib.num_profiles();
        let num_cols = lib.num_cols();
        let nalph = lib.alphabet_size();
        let center = lib.center();

        let partials: Result<Vec<(Vec<SuffStats>, f64)>> = block
            .par_chunks(SUBJECT_CHUNK)
            .map(|subjects| {
                let mut stats: Vec<SuffStats> = (0..num_profiles)
                    .map(|_| SuffStats::new(num_cols, nalph))
                    .collect();
                let mut pp = vec![0.0; num_profiles];
                let mut ll = 0.0;

                for subject in subjects {
                    match subject {
                        Subject::Profile(cp) => {
                            ll += library_posteriors(lib, emission, cp, center, &mut pp)?;
                            for (k, stat) in stats.iter_mut().enumerate() {
                                stat.prior += pp[k];
                                for (col, cp_col) in stat.counts.iter_mut().zip(cp.data.iter()) {
                                    for (v, &c) in col.iter_mut().zip(cp_col.iter()) {
                                        *v += c * pp[k];
                                    }
                                }
                            }
                        }
                        Subject::Window(x) => {
                            ll += library_posteriors_window(lib, emission, x, &mut pp)?;
                            for (k, stat) in stats.iter_mut().enumerate() {
                                stat.prior += pp[k];
                                for (j, &xj) in x.iter().enumerate() {
                                    if (xj as usize) < nalph {
                                        stat.counts[j][xj as usize] += pp[k];
                                    }
                                }
                            }
                        }
                    }
                }
                Ok((stats, ll))
            })
            .collect();

        // reduce partials in chunk order
        let mut block_stats: Vec<SuffStats> = (0..num_profiles)
            .map(|_| SuffStats::new(num_cols, nalph))
            .collect();
        let mut block_ll = 0.0;
        for (stats, ll) in partials?.into_iter() {
            for (acc, s) in block_stats.iter_mut().zip(stats.iter()) {
                acc.merge(s);
            }
            block_ll += ll;
        }
        Ok((block_stats, block_ll))
    }

    /// Blends block statistics into the global statistics:
    /// S <- eta * S + S_block.
    fn merge_block(&mut self, block_stats: &[SuffStats]) {
        let eta = self.params.blending;
        for (stat, block_stat) in self.stats.iter_mut().zip(block_stats.iter()) {
            stat.prior = eta * stat.prior + block_stat.prior;
            for (col, block_col) in stat.counts.iter_mut().zip(block_stat.counts.iter()) {
                for (v, &b) in col.iter_mut().zip(block_col.iter()) {
                    *v = eta * *v + b;
                }
            }
        }
    }

    /// Normalizes the statistics into new priors and emission
    /// probabilities. Components without evidence keep their
    /// previous emissions.
    fn maximization_step(&mut self) {
        let prior_sum: f64 = self.stats.iter().map(|s| s.prior).sum();
        if prior_sum == 0.0 {
            return;
        }
        let fac = 1.0 / prior_sum;
        let center = self.lib.center();
        let logspace = self.lib.logspace();

        for (profile, stat) in self.lib.profiles_mut().iter_mut().zip(self.stats.iter()) {
            profile.prior = stat.prior * fac;

            if stat.counts.iter().any(|col| col.iter().sum::<f64>() == 0.0) {
                continue;
            }
            let mut columns = stat.counts.clone();
            for col in columns.iter_mut() {
                let sum: f64 = col.iter().sum();
                col.iter_mut().for_each(|v| *v /= sum);
            }
            profile.pc = columns[center].clone();
            profile.data = columns;
            profile.logspace = false;
            if logspace {
                profile.transform_to_logspace();
            }
        }
    }
}
