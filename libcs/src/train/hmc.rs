//! Hybrid Monte-Carlo training of CRF weights: leap-frog
//! trajectories on mini-batch gradients with a Metropolis
//! correction, the stochastic alternative to batched L-BFGS.

use anyhow::Result;
use log::{debug, info};
use rand::{Rng, SeedableRng};
use rand_distr::StandardNormal;
use rand_pcg::Pcg64;
use thiserror::Error;

use crate::emission::Emission;
use crate::structs::Crf;
use crate::train::lbfgs::CrfTrainOutcome;
use crate::train::{CrfFuncEval, DerivCrfFunc};

#[derive(Error, Debug)]
#[error("HMC parameter {name} must be positive, got {value}")]
pub struct HmcParamError {
    name: &'static str,
    value: f64,
}

#[derive(Debug, Clone)]
pub struct HmcParams {
    /// Passes over the training set.
    pub epochs: usize,
    /// Mini-batches per epoch; each defines one trajectory.
    pub nblocks: usize,
    /// Leap-frog steps per trajectory.
    pub leapfrog_steps: usize,
    /// Initial leap-frog step size; adapted toward the target
    /// acceptance rate.
    pub epsilon: f64,
    pub target_acceptance: f64,
    pub seed: u64,
}

impl Default for HmcParams {
    fn default() -> Self {
        HmcParams {
            epochs: 10,
            nblocks: 4,
            leapfrog_steps: 16,
            epsilon: 1e-3,
            target_acceptance: 0.9,
            seed: 0,
        }
    }
}

pub fn train_hmc(
    crf: &mut Crf,
    func: &mut DerivCrfFunc,
    emission: &Emission,
    params: &HmcParams,
) -> Result<CrfTrainOutcome> {
    for (name, value) in [
        ("epochs", params.epochs as f64),
        ("nblocks", params.nblocks as f64),
        ("leapfrog_steps", params.leapfrog_steps as f64),
        ("epsilon", params.epsilon),
        ("target_acceptance", params.target_acceptance),
    ] {
        if value <= 0.0 {
            return Err(HmcParamError { name, value }.into());
        }
    }

    let n = crf.nweights();
    let mut rng = Pcg64::seed_from_u64(params.seed);
    let mut theta = vec![0.0; n];
    crf.to_weights(&mut theta);
    let mut scratch = crf.clone();

    let mut epsilon = params.epsilon;
    let mut accepted: usize = 0;
    let mut proposals: usize = 0;

    // gradient of the log-posterior on the current block
    fn posterior_grad(eval: &CrfFuncEval) -> Vec<f64> {
        eval.grad_loglike
            .iter()
            .zip(eval.grad_prior.iter())
            .map(|(gl, gp)| gl + gp)
            .collect()
    }

    for epoch in 1..=params.epochs {
        func.reshuffle(&mut rng);

        for b in 0..params.nblocks {
            scratch.set_weights(&theta);
            let eval0 = func.evaluate(&scratch, emission, b, params.nblocks)?;
            let mut grad = posterior_grad(&eval0);
            let potential0 = -(eval0.loglike + eval0.prior);

            // momenta from a unit Gaussian
            let mut momentum: Vec<f64> =
                (0..n).map(|_| rng.sample::<f64, _>(StandardNormal)).collect();
            let kinetic0: f64 = 0.5 * momentum.iter().map(|p| p * p).sum::<f64>();

            // leap-frog trajectory
            let mut theta_new = theta.clone();
            for (p, g) in momentum.iter_mut().zip(grad.iter()) {
                *p += 0.5 * epsilon * g;
            }
            let mut eval = eval0;
            for step in 0..params.leapfrog_steps {
                for (t, p) in theta_new.iter_mut().zip(momentum.iter()) {
                    *t += epsilon * p;
                }
                scratch.set_weights(&theta_new);
                eval = func.evaluate(&scratch, emission, b, params.nblocks)?;
                grad = posterior_grad(&eval);
                if step + 1 < params.leapfrog_steps {
                    for (p, g) in momentum.iter_mut().zip(grad.iter()) {
                        *p += epsilon * g;
                    }
                }
            }
            for (p, g) in momentum.iter_mut().zip(grad.iter()) {
                *p += 0.5 * epsilon * g;
            }

            let potential1 = -(eval.loglike + eval.prior);
            let kinetic1: f64 = 0.5 * momentum.iter().map(|p| p * p).sum::<f64>();
            let delta_h = (potential0 + kinetic0) - (potential1 + kinetic1);

            proposals += 1;
            let accept = delta_h >= 0.0 || rng.gen::<f64>() < delta_h.exp();
            if accept {
                theta = theta_new;
                accepted += 1;
            }

            // step-size adaptation toward the target acceptance
            let accept_prob = delta_h.exp().min(1.0);
            epsilon *= if accept_prob > params.target_acceptance {
                1.05
            } else {
                0.95
            };
            debug!(
                "epoch {epoch} block {b}: dH = {delta_h:.4}, accepted = {accept}, \
                 epsilon = {epsilon:.2e}"
            );
        }

        info!(
            "epoch {epoch}: acceptance = {:.2}, epsilon = {epsilon:.2e}",
            accepted as f64 / proposals as f64
        );
    }

    crf.set_weights(&theta);
    let eval = func.evaluate(crf, emission, 0, 1)?;
    Ok(CrfTrainOutcome {
        loglike: eval.loglike,
        prior: eval.prior,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::alphabet::Alphabet;
    use crate::substitution::SubstitutionMatrix;
    use crate::train::TrainingPair;

    fn learnable_pairs() -> Vec<TrainingPair> {
        (0..4u8)
            .flat_map(|a| {
                let mut y = vec![0.0; 4];
                y[a as usize] = 1.0;
                vec![TrainingPair::new(vec![a], y).unwrap(); 8]
            })
            .collect()
    }

    #[test]
    fn test_hmc_improves_objective() {
        let pairs = learnable_pairs();
        let sm = SubstitutionMatrix::dna();
        let emission = Emission::new(1, 1.6, 0.85).unwrap();
        let mut func = DerivCrfFunc::new(&pairs, &sm, 0.3, 0.9, 10.0).unwrap();

        let mut crf = Crf::new_zeroed(4, 1, Alphabet::Dna).unwrap();
        let before = func.evaluate(&crf, &emission, 0, 1).unwrap();

        let params = HmcParams {
            epochs: 20,
            nblocks: 2,
            leapfrog_steps: 8,
            epsilon: 0.05,
            ..Default::default()
        };
        let outcome = train_hmc(&mut crf, &mut func, &emission, &params).unwrap();
        assert!(outcome.loglike + outcome.prior > before.loglike + before.prior);
    }

    #[test]
    fn test_hmc_is_deterministic_under_fixed_seed() {
        let pairs = learnable_pairs();
        let sm = SubstitutionMatrix::dna();
        let emission = Emission::new(1, 1.6, 0.85).unwrap();

        let run = || {
            let mut func = DerivCrfFunc::new(&pairs, &sm, 0.3, 0.9, 10.0).unwrap();
            let mut crf = Crf::new_zeroed(3, 1, Alphabet::Dna).unwrap();
            let params = HmcParams {
                epochs: 3,
                nblocks: 2,
                leapfrog_steps: 4,
                epsilon: 0.02,
                seed: 1234,
                ..Default::default()
            };
            train_hmc(&mut crf, &mut func, &emission, &params).unwrap();
            crf.to_string()
        };

        let first = run();
        assert_eq!(run(), first);
    }

    #[test]
    fn test_hmc_rejects_bad_params() {
        let pairs = learnable_pairs();
        let sm = SubstitutionMatrix::dna();
        let emission = Emission::new(1, 1.6, 0.85).unwrap();
        let mut func = DerivCrfFunc::new(&pairs, &sm, 0.3, 0.9, 10.0).unwrap();
        let mut crf = Crf::new_zeroed(3, 1, Alphabet::Dna).unwrap();
        let params = HmcParams {
            epsilon: 0.0,
            ..Default::default()
        };
        assert!(train_hmc(&mut crf, &mut func, &emission, &params).is_err());
    }
}
