//! Likelihood objectives over training pairs: the evaluation
//! functions for context libraries and CRFs, and the CRF
//! value+gradient oracle consumed by the optimizers.

use anyhow::Result;
use rayon::prelude::*;
use thiserror::Error;

use crate::emission::Emission;
use crate::pseudocounts::{library_posteriors_window, Admix};
use crate::structs::record::iround;
use crate::structs::{ContextLibrary, Crf};
use crate::substitution::SubstitutionMatrix;
use crate::train::TrainingPair;
use crate::util::log_sum_exp;

/// Fixed number of training pairs per parallel work unit. Partial
/// log-likelihoods are collected per chunk and summed in chunk
/// order, which keeps the reduction independent of thread
/// scheduling.
const PAIR_CHUNK: usize = 256;

pub const DEFAULT_SIGMA_CONTEXT: f64 = 0.3;
pub const DEFAULT_SIGMA_DECAY: f64 = 0.9;
pub const DEFAULT_SIGMA_BIAS: f64 = 10.0;

#[derive(Error, Debug)]
#[error("regularization width {name} must be positive, got {value}")]
pub struct SigmaRangeError {
    name: &'static str,
    value: f64,
}

#[derive(Error, Debug)]
#[error("predicted pseudocount mass is zero for a letter with positive target mass")]
pub struct ZeroPseudocountMassError;

#[derive(Error, Debug)]
#[error("training set is empty")]
pub struct EmptyTrainingSetError;

/// A contiguous slice [beg, end) of the (shuffled) training set,
/// with its fraction of the corpus.
#[derive(Debug, Clone, Copy)]
pub struct TrainingBlock {
    pub beg: usize,
    pub end: usize,
    pub size: usize,
    pub frac: f64,
}

fn make_block(n: usize, b: usize, nblocks: usize) -> TrainingBlock {
    assert!(b < nblocks);
    let block_size = (iround(n as f64 / nblocks as f64) as usize).max(1);
    let beg = (b * block_size).min(n);
    let end = if b == nblocks - 1 {
        n
    } else {
        ((b + 1) * block_size).min(n)
    };
    TrainingBlock {
        beg,
        end,
        size: end - beg,
        frac: (end - beg) as f64 / n as f64,
    }
}

/// Conditional log-likelihood of a context library on a training
/// set: how well the admixed pseudocount predictions explain the
/// observed target distributions, relative to the background.
pub struct ContextLibFunc<'a> {
    pub trainset: &'a [TrainingPair],
    pub sm: &'a SubstitutionMatrix,
    pub admix: Admix,
}

impl<'a> ContextLibFunc<'a> {
    pub fn new(trainset: &'a [TrainingPair], sm: &'a SubstitutionMatrix, admix: Admix) -> Self {
        ContextLibFunc {
            trainset,
            sm,
            admix,
        }
    }

    pub fn evaluate(&self, lib: &ContextLibrary, emission: &Emission) -> Result<f64> {
        let nalph = lib.alphabet_size();
        let nprofiles = lib.num_profiles();
        let center = lib.center();
        let tau = self.admix.tau(1.0);

        let partials: Result<Vec<f64>> = self
            .trainset
            .par_chunks(PAIR_CHUNK)
            .map(|pairs| {
                let mut pp = vec![0.0; nprofiles];
                let mut ll = 0.0;
                for pair in pairs {
                    debug_assert_eq!(pair.center(), center);
                    library_posteriors_window(lib, emission, &pair.x, &mut pp)?;

                    let mut pa = vec![0.0; nalph];
                    for (k, profile) in lib.profiles().iter().enumerate() {
                        for (a, &pc) in profile.pc.iter().enumerate() {
                            pa[a] += pp[k] * pc;
                        }
                    }
                    let x_center = pair.x[center] as usize;
                    for (a, p) in pa.iter_mut().enumerate() {
                        let observed = if x_center == a { 1.0 } else { 0.0 };
                        *p = (1.0 - tau) * observed + tau * *p;
                    }

                    for a in 0..nalph {
                        if pair.y[a] > 0.0 {
                            if pa[a] <= 0.0 {
                                return Err(ZeroPseudocountMassError.into());
                            }
                            ll += pair.y[a] * (pa[a].ln() - self.sm.f(a).ln());
                        }
                    }
                }
                Ok(ll)
            })
            .collect();

        Ok(partials?.iter().sum())
    }
}

/// Conditional log-likelihood of a CRF on a training set.
pub struct CrfFunc<'a> {
    pub trainset: &'a [TrainingPair],
    pub sm: &'a SubstitutionMatrix,
}

impl<'a> CrfFunc<'a> {
    pub fn new(trainset: &'a [TrainingPair], sm: &'a SubstitutionMatrix) -> Self {
        CrfFunc { trainset, sm }
    }

    pub fn evaluate(&self, crf: &Crf, emission: &Emission) -> Result<f64> {
        let nalph = crf.alphabet_size();
        let nstates = crf.size();
        let pcs: Vec<Vec<f64>> = crf.states().iter().map(|s| s.pc()).collect();

        let partials: Result<Vec<f64>> = self
            .trainset
            .par_chunks(PAIR_CHUNK)
            .map(|pairs| {
                let mut pp = vec![0.0; nstates];
                let mut ll = 0.0;
                for pair in pairs {
                    debug_assert_eq!(pair.center(), crf.center());
                    for (k, state) in crf.states().iter().enumerate() {
                        pp[k] = emission.context_score(state, &pair.x, pair.center());
                    }
                    let norm = log_sum_exp(&pp);

                    let mut pa = vec![0.0; nalph];
                    for k in 0..nstates {
                        let p = (pp[k] - norm).exp();
                        for (a, &pc) in pcs[k].iter().enumerate() {
                            pa[a] += p * pc;
                        }
                    }

                    for a in 0..nalph {
                        if pair.y[a] > 0.0 {
                            if pa[a] <= 0.0 {
                                return Err(ZeroPseudocountMassError.into());
                            }
                            ll += pair.y[a] * (pa[a].ln() - self.sm.f(a).ln());
                        }
                    }
                }
                Ok(ll)
            })
            .collect();

        Ok(partials?.iter().sum())
    }
}

/// Everything one oracle call produces: the block's conditional
/// log-likelihood, the prior, and both gradients as flat vectors
/// ordered per state as [bias, context weights row-major, pc
/// logits].
#[derive(Debug, Clone)]
pub struct CrfFuncEval {
    pub loglike: f64,
    pub prior: f64,
    pub grad_loglike: Vec<f64>,
    pub grad_prior: Vec<f64>,
}

/// The CRF value+gradient oracle: evaluates the conditional
/// log-likelihood, its gradient, and the position-dependent
/// Gaussian prior over a block of training pairs. Block (0, 1)
/// denotes the full corpus.
pub struct DerivCrfFunc<'a> {
    pub trainset: &'a [TrainingPair],
    pub sm: &'a SubstitutionMatrix,
    /// Permutation of training indices defining block membership.
    pub shuffle: Vec<usize>,
    pub sigma_context: f64,
    pub sigma_decay: f64,
    pub sigma_bias: f64,
}

impl<'a> DerivCrfFunc<'a> {
    pub fn new(
        trainset: &'a [TrainingPair],
        sm: &'a SubstitutionMatrix,
        sigma_context: f64,
        sigma_decay: f64,
        sigma_bias: f64,
    ) -> Result<Self> {
        for (name, value) in [
            ("sigma_context", sigma_context),
            ("sigma_decay", sigma_decay),
            ("sigma_bias", sigma_bias),
        ] {
            if value <= 0.0 {
                return Err(SigmaRangeError { name, value }.into());
            }
        }
        if trainset.is_empty() {
            return Err(EmptyTrainingSetError.into());
        }
        Ok(DerivCrfFunc {
            trainset,
            sm,
            shuffle: (0..trainset.len()).collect(),
            sigma_context,
            sigma_decay,
            sigma_bias,
        })
    }

    pub fn reshuffle<R: rand::Rng>(&mut self, rng: &mut R) {
        use rand::seq::SliceRandom;
        self.shuffle.shuffle(rng);
    }

    pub fn block(&self, b: usize, nblocks: usize) -> TrainingBlock {
        make_block(self.trainset.len(), b, nblocks)
    }

    /// Evaluates log-likelihood, prior, and both gradients on block
    /// `b` of `nblocks`.
    pub fn evaluate(
        &self,
        crf: &Crf,
        emission: &Emission,
        b: usize,
        nblocks: usize,
    ) -> Result<CrfFuncEval> {
        let block = self.block(b, nblocks);
        let nstates = crf.size();
        let nalph = crf.alphabet_size();
        let pcs: Vec<Vec<f64>> = crf.states().iter().map(|s| s.pc()).collect();

        // posteriors P(k|x_n) and predicted pseudocounts p(a|x_n)
        // for every pair in the block
        let mut mpp = vec![0.0; block.size * nstates];
        let mut mpa = vec![0.0; block.size * nalph];

        let partials: Result<Vec<f64>> = mpp
            .par_chunks_mut(nstates * PAIR_CHUNK)
            .zip(mpa.par_chunks_mut(nalph * PAIR_CHUNK))
            .enumerate()
            .map(|(chunk_idx, (pp_chunk, pa_chunk))| {
                let mut ll = 0.0;
                let chunk_beg = block.beg + chunk_idx * PAIR_CHUNK;
                for (row, (pp, pa)) in pp_chunk
                    .chunks_mut(nstates)
                    .zip(pa_chunk.chunks_mut(nalph))
                    .enumerate()
                {
                    let pair = &self.trainset[self.shuffle[chunk_beg + row]];
                    debug_assert_eq!(pair.center(), crf.center());

                    for (k, state) in crf.states().iter().enumerate() {
                        pp[k] = emission.context_score(state, &pair.x, pair.center());
                    }
                    let norm = log_sum_exp(pp);
                    for k in 0..nstates {
                        pp[k] = (pp[k] - norm).exp();
                        for (a, &pc) in pcs[k].iter().enumerate() {
                            pa[a] += pp[k] * pc;
                        }
                    }

                    for a in 0..nalph {
                        if pair.y[a] > 0.0 {
                            if pa[a] <= 0.0 {
                                return Err(ZeroPseudocountMassError.into());
                            }
                            ll += pair.y[a] * (pa[a].ln() - self.sm.f(a).ln());
                        }
                    }
                }
                Ok(ll)
            })
            .collect();
        let loglike: f64 = partials?.iter().sum();

        let mut grad_loglike = vec![0.0; crf.nweights()];
        self.likelihood_gradient(crf, emission, &block, &mpp, &mpa, &pcs, &mut grad_loglike);

        let mut grad_prior = vec![0.0; crf.nweights()];
        self.prior_gradient(crf, block.frac, &mut grad_prior);

        Ok(CrfFuncEval {
            loglike,
            prior: block.frac * self.prior(crf),
            grad_loglike,
            grad_prior,
        })
    }

    /// The performance-critical routine: the gradient of the block
    /// conditional log-likelihood. Parallelism is per-state so each
    /// worker owns its gradient slice and no updates race.
    fn likelihood_gradient(
        &self,
        crf: &Crf,
        emission: &Emission,
        block: &TrainingBlock,
        mpp: &[f64],
        mpa: &[f64],
        pcs: &[Vec<f64>],
        grad: &mut [f64],
    ) {
        let nstates = crf.size();
        let nalph = crf.alphabet_size();
        let wlen = crf.num_cols();
        let pc_offset = 1 + wlen * nalph;

        grad.par_chunks_mut(crf.state_nweights())
            .enumerate()
            .for_each(|(k, g)| {
                let pc = &pcs[k];

                for n in block.beg..block.end {
                    let m = n - block.beg;
                    let pair = &self.trainset[self.shuffle[n]];
                    let pp = mpp[m * nstates + k];
                    let pa = &mpa[m * nalph..(m + 1) * nalph];

                    // fit = Σ_a y[a] (pc[a]/pa[a] - 1); terms with
                    // zero target mass vanish
                    let mut fit = 0.0;
                    for a in 0..nalph {
                        if pair.y[a] > 0.0 {
                            fit += pair.y[a] * (pc[a] / pa[a] - 1.0);
                        }
                    }

                    // bias weight
                    g[0] += pp * fit;

                    // context weights; the chain rule carries the
                    // positional weight of the observed column
                    for (j, &xj) in pair.x.iter().enumerate() {
                        let a = xj as usize;
                        if a < nalph {
                            g[1 + j * nalph + a] += emission.weight(j) * pp * fit;
                        }
                    }

                    // pseudocount logits
                    let mut sum = 0.0;
                    for a in 0..nalph {
                        if pair.y[a] > 0.0 {
                            sum += pc[a] * pair.y[a] / pa[a];
                        }
                    }
                    for a in 0..nalph {
                        let y_over_pa = if pair.y[a] > 0.0 { pair.y[a] / pa[a] } else { 0.0 };
                        g[pc_offset + a] += pp * pc[a] * (y_over_pa - sum);
                    }
                }
            });
    }

    /// Gaussian log-prior of the CRF weights. Pseudocount logits
    /// are not regularized: their softmax is shift-invariant.
    pub fn prior(&self, crf: &Crf) -> f64 {
        let fac_bias = -0.5 / (self.sigma_bias * self.sigma_bias);
        let fac_context = self.context_factors(crf, -0.5);

        let mut prior = 0.0;
        for state in crf.states() {
            prior += fac_bias * state.bias * state.bias;
            for (j, col) in state.weights.iter().enumerate() {
                for &w in col.iter() {
                    prior += fac_context[j] * w * w;
                }
            }
        }
        prior
    }

    fn prior_gradient(&self, crf: &Crf, frac: f64, grad: &mut [f64]) {
        let fac_bias = -frac / (self.sigma_bias * self.sigma_bias);
        let fac_context = self.context_factors(crf, -frac);

        let mut i = 0;
        for state in crf.states() {
            grad[i] = fac_bias * state.bias;
            i += 1;
            for (j, col) in state.weights.iter().enumerate() {
                for &w in col.iter() {
                    grad[i] = fac_context[j] * w;
                    i += 1;
                }
            }
            i += state.alphabet_size();
        }
    }

    /// Per-column prior factors scale / sigma_j^2 with
    /// sigma_j = sigma_context * sigma_decay^|j - center|.
    fn context_factors(&self, crf: &Crf, scale: f64) -> Vec<f64> {
        let center = crf.center() as i32;
        (0..crf.num_cols())
            .map(|j| {
                let sigma = self.sigma_context * self.sigma_decay.powi((j as i32 - center).abs());
                scale / (sigma * sigma)
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::alphabet::Alphabet;
    use crate::emission::Emission;
    use crate::structs::ContextProfile;
    use approx::{assert_abs_diff_eq, assert_relative_eq};
    use rand::Rng;
    use rand::SeedableRng;
    use rand_pcg::Pcg64;

    fn uniform_pairs(n: usize, wlen: usize) -> Vec<TrainingPair> {
        let mut rng = Pcg64::seed_from_u64(99);
        (0..n)
            .map(|_| {
                let x: Vec<u8> = (0..wlen).map(|_| rng.gen_range(0..20u8)).collect();
                TrainingPair::new(x, vec![0.05; 20]).unwrap()
            })
            .collect()
    }

    fn random_pairs(n: usize, wlen: usize, seed: u64) -> Vec<TrainingPair> {
        let mut rng = Pcg64::seed_from_u64(seed);
        (0..n)
            .map(|_| {
                let x: Vec<u8> = (0..wlen).map(|_| rng.gen_range(0..20u8)).collect();
                let mut y: Vec<f64> = (0..20).map(|_| rng.gen_range(0.01..1.0)).collect();
                let sum: f64 = y.iter().sum();
                y.iter_mut().for_each(|v| *v /= sum);
                TrainingPair::new(x, y).unwrap()
            })
            .collect()
    }

    fn random_crf(nstates: usize, wlen: usize, seed: u64) -> Crf {
        let mut crf = Crf::new_zeroed(nstates, wlen, Alphabet::Amino).unwrap();
        let mut rng = Pcg64::seed_from_u64(seed);
        let mut weights = vec![0.0; crf.nweights()];
        weights
            .iter_mut()
            .for_each(|w| *w = rng.gen_range(-0.5..0.5));
        crf.set_weights(&weights);
        crf
    }

    #[test]
    fn test_crf_loglike_zero_at_uniform() {
        // all weights zero, uniform targets: posteriors 1/K,
        // pseudocounts 1/20, so every pair contributes
        // Σ 0.05 (ln 0.05 - ln f(a))
        let pairs = uniform_pairs(16, 1);
        let sm = SubstitutionMatrix::blosum62();
        let crf = Crf::new_zeroed(3, 1, Alphabet::Amino).unwrap();
        let emission = Emission::new(1, 1.6, 0.85).unwrap();
        let func = CrfFunc::new(&pairs, &sm);

        let per_pair: f64 = (0..20)
            .map(|a| 0.05 * (0.05f64.ln() - sm.f(a).ln()))
            .sum();
        let ll = func.evaluate(&crf, &emission).unwrap();
        assert_relative_eq!(ll, per_pair * 16.0, epsilon = 1e-9);
    }

    #[test]
    fn test_gradient_zero_at_theta_zero_uniform_targets() {
        // theta = 0 with uniform targets over a uniform background:
        // posteriors are 1/K, pseudocounts 1/A, the log-likelihood
        // is exactly zero, and the whole gradient vanishes by
        // symmetry
        let mut rng = Pcg64::seed_from_u64(99);
        let pairs: Vec<TrainingPair> = (0..8)
            .map(|_| {
                TrainingPair::new(vec![rng.gen_range(0..4u8)], vec![0.25; 4]).unwrap()
            })
            .collect();
        let sm = SubstitutionMatrix::dna();
        let crf = Crf::new_zeroed(3, 1, Alphabet::Dna).unwrap();
        let emission = Emission::new(1, 1.6, 0.85).unwrap();
        let func = DerivCrfFunc::new(&pairs, &sm, 0.3, 0.9, 10.0).unwrap();

        let eval = func.evaluate(&crf, &emission, 0, 1).unwrap();
        assert_abs_diff_eq!(eval.loglike, 0.0, epsilon = 1e-9);
        for g in eval.grad_loglike {
            assert_abs_diff_eq!(g, 0.0, epsilon = 1e-9);
        }
    }

    #[test]
    fn test_prior_value_and_gradient_bias_only() {
        // b_k = 2 for all states, everything else zero,
        // sigma_bias = 10: prior = -K/50, d/db = -0.02
        let pairs = uniform_pairs(4, 1);
        let sm = SubstitutionMatrix::blosum62();
        let mut crf = Crf::new_zeroed(5, 1, Alphabet::Amino).unwrap();
        for state in crf.states_mut() {
            state.bias = 2.0;
        }
        let emission = Emission::new(1, 1.6, 0.85).unwrap();
        let func = DerivCrfFunc::new(&pairs, &sm, 0.3, 0.9, 10.0).unwrap();

        let eval = func.evaluate(&crf, &emission, 0, 1).unwrap();
        assert_relative_eq!(eval.prior, -(5.0) / 50.0, epsilon = 1e-12);
        let snw = crf.state_nweights();
        for k in 0..5 {
            assert_relative_eq!(eval.grad_prior[k * snw], -0.02, epsilon = 1e-12);
        }
    }

    #[test]
    fn test_softmax_shift_invariance() {
        // adding a constant to every pc logit of a state leaves
        // the predicted pseudocounts, and hence the likelihood,
        // unchanged
        let pairs = random_pairs(32, 3, 5);
        let sm = SubstitutionMatrix::blosum62();
        let mut crf = random_crf(4, 3, 17);
        let emission = Emission::new(3, 1.6, 0.85).unwrap();
        let func = CrfFunc::new(&pairs, &sm);

        let before = func.evaluate(&crf, &emission).unwrap();
        for state in crf.states_mut() {
            state.pc_weights.iter_mut().for_each(|q| *q += 7.0);
        }
        let after = func.evaluate(&crf, &emission).unwrap();
        assert_abs_diff_eq!(before, after, epsilon = 1e-8);
    }

    #[test]
    fn test_analytic_gradient_matches_central_differences() {
        let pairs = random_pairs(24, 3, 11);
        let sm = SubstitutionMatrix::blosum62();
        let mut crf = random_crf(3, 3, 23);
        let emission = Emission::new(3, 1.6, 0.85).unwrap();
        let func = DerivCrfFunc::new(&pairs, &sm, 0.3, 0.9, 10.0).unwrap();

        let eval = func.evaluate(&crf, &emission, 0, 1).unwrap();
        let n = crf.nweights();
        let mut weights = vec![0.0; n];
        crf.to_weights(&mut weights);

        let h = 1e-5;
        // probe every parameter group: bias, a handful of context
        // weights, and pc logits of each state
        let snw = crf.state_nweights();
        let probes: Vec<usize> = (0..3)
            .flat_map(|k| {
                [
                    k * snw,                   // bias
                    k * snw + 1,               // context weight
                    k * snw + 1 + 20 + 7,      // context weight, col 1
                    k * snw + snw - 20 + 3,    // pc logit
                    k * snw + snw - 1,         // pc logit
                ]
            })
            .collect();

        for &i in probes.iter() {
            let mut theta = weights.clone();
            theta[i] += h;
            crf.set_weights(&theta);
            let up = func.evaluate(&crf, &emission, 0, 1).unwrap();
            theta[i] -= 2.0 * h;
            crf.set_weights(&theta);
            let down = func.evaluate(&crf, &emission, 0, 1).unwrap();

            let numeric_ll = (up.loglike - down.loglike) / (2.0 * h);
            let numeric_prior = (up.prior - down.prior) / (2.0 * h);

            assert_relative_eq!(
                eval.grad_loglike[i],
                numeric_ll,
                max_relative = 1e-4,
                epsilon = 1e-8
            );
            assert_relative_eq!(
                eval.grad_prior[i],
                numeric_prior,
                max_relative = 1e-4,
                epsilon = 1e-8
            );
        }
        crf.set_weights(&weights);
    }

    #[test]
    fn test_block_gradients_sum_to_full_gradient() {
        let pairs = random_pairs(30, 1, 3);
        let sm = SubstitutionMatrix::blosum62();
        let crf = random_crf(3, 1, 29);
        let emission = Emission::new(1, 1.6, 0.85).unwrap();
        let func = DerivCrfFunc::new(&pairs, &sm, 0.3, 0.9, 10.0).unwrap();

        let full = func.evaluate(&crf, &emission, 0, 1).unwrap();

        for nblocks in [2usize, 3] {
            let mut loglike = 0.0;
            let mut prior = 0.0;
            let mut grad_ll = vec![0.0; crf.nweights()];
            let mut grad_prior = vec![0.0; crf.nweights()];
            for b in 0..nblocks {
                let eval = func.evaluate(&crf, &emission, b, nblocks).unwrap();
                loglike += eval.loglike;
                prior += eval.prior;
                for (acc, g) in grad_ll.iter_mut().zip(eval.grad_loglike.iter()) {
                    *acc += g;
                }
                for (acc, g) in grad_prior.iter_mut().zip(eval.grad_prior.iter()) {
                    *acc += g;
                }
            }
            assert_relative_eq!(loglike, full.loglike, max_relative = 1e-12);
            assert_relative_eq!(prior, full.prior, max_relative = 1e-12);
            for (a, b) in grad_prior.iter().zip(full.grad_prior.iter()) {
                assert_relative_eq!(*a, *b, max_relative = 1e-12, epsilon = 1e-15);
            }
            for (a, b) in grad_ll.iter().zip(full.grad_loglike.iter()) {
                assert_relative_eq!(*a, *b, max_relative = 1e-9, epsilon = 1e-12);
            }
        }
    }

    #[test]
    fn test_evaluate_is_deterministic() {
        let pairs = random_pairs(64, 3, 13);
        let sm = SubstitutionMatrix::blosum62();
        let crf = random_crf(4, 3, 31);
        let emission = Emission::new(3, 1.6, 0.85).unwrap();
        let func = DerivCrfFunc::new(&pairs, &sm, 0.3, 0.9, 10.0).unwrap();

        let first = func.evaluate(&crf, &emission, 0, 1).unwrap();
        for _ in 0..3 {
            let again = func.evaluate(&crf, &emission, 0, 1).unwrap();
            assert_eq!(first.loglike.to_bits(), again.loglike.to_bits());
            for (a, b) in first.grad_loglike.iter().zip(again.grad_loglike.iter()) {
                assert_eq!(a.to_bits(), b.to_bits());
            }
        }
    }

    #[test]
    fn test_library_func_uniform_is_zero_against_uniform_background() {
        // K=1, uniform prior and pseudocounts equal to the
        // background: log-likelihood contributions cancel exactly
        let sm = SubstitutionMatrix::dna();
        let mut profile = ContextProfile::new(0, 1, Alphabet::Dna).unwrap();
        profile.data[0] = vec![0.25; 4];
        profile.pc = vec![0.25; 4];
        profile.prior = 1.0;
        let lib = ContextLibrary::from_profiles(vec![profile], 1).unwrap();

        let pairs: Vec<TrainingPair> = (0..4)
            .map(|a| TrainingPair::new(vec![a as u8], vec![0.25; 4]).unwrap())
            .collect();
        let emission = Emission::new(1, 1.6, 0.85).unwrap();
        let func = ContextLibFunc::new(&pairs, &sm, Admix::constant(1.0).unwrap());
        let ll = func.evaluate(&lib, &emission).unwrap();
        assert_abs_diff_eq!(ll, 0.0, epsilon = 1e-12);
    }
}
