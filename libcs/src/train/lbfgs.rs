//! Batched L-BFGS training of CRF weights: maximizes conditional
//! log-likelihood plus prior by minimizing the negated objective on
//! the full corpus.

use anyhow::Result;
use log::info;

use crate::emission::Emission;
use crate::structs::Crf;
use crate::train::DerivCrfFunc;

#[derive(Debug, Clone)]
pub struct LbfgsParams {
    pub max_iterations: usize,
    /// Convergence epsilon on the gradient norm.
    pub epsilon: f64,
}

impl Default for LbfgsParams {
    fn default() -> Self {
        LbfgsParams {
            max_iterations: 500,
            epsilon: 1e-5,
        }
    }
}

/// Final objective values after optimizer training.
#[derive(Debug, Clone)]
pub struct CrfTrainOutcome {
    pub loglike: f64,
    pub prior: f64,
}

pub fn train_lbfgs(
    crf: &mut Crf,
    func: &DerivCrfFunc,
    emission: &Emission,
    params: &LbfgsParams,
) -> Result<CrfTrainOutcome> {
    let n = crf.nweights();
    let mut weights = vec![0.0; n];
    crf.to_weights(&mut weights);

    let mut scratch = crf.clone();

    // objective: negative (log-likelihood + prior) on block (0, 1)
    let evaluate = |x: &[f64], gx: &mut [f64]| -> Result<f64, anyhow::Error> {
        scratch.set_weights(x);
        let eval = func.evaluate(&scratch, emission, 0, 1)?;
        for (g, (gl, gp)) in gx
            .iter_mut()
            .zip(eval.grad_loglike.iter().zip(eval.grad_prior.iter()))
        {
            *g = -(gl + gp);
        }
        Ok(-(eval.loglike + eval.prior))
    };

    let progress = |prgr: &liblbfgs::Progress| -> bool {
        info!(
            "iteration {}: objective = {:.6}, ||x|| = {:.6}, ||g|| = {:.6}",
            prgr.niter, prgr.fx, prgr.xnorm, prgr.gnorm
        );
        false // continue optimization
    };

    liblbfgs::lbfgs()
        .with_max_iterations(params.max_iterations)
        .with_epsilon(params.epsilon)
        .minimize(&mut weights, evaluate, progress)
        .map_err(|e| anyhow::anyhow!("L-BFGS error: {e}"))?;

    crf.set_weights(&weights);
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

    #[test]
    fn test_lbfgs_improves_objective() {
        // a corpus whose targets always put their mass on the
        // window's central letter is learnable; training must beat
        // the zero initialization
        let pairs: Vec<TrainingPair> = (0..4u8)
            .flat_map(|a| {
                let mut y = vec![0.0; 4];
                y[a as usize] = 1.0;
                vec![TrainingPair::new(vec![a], y).unwrap(); 8]
            })
            .collect();
        let sm = SubstitutionMatrix::dna();
        let emission = Emission::new(1, 1.6, 0.85).unwrap();
        let func = DerivCrfFunc::new(&pairs, &sm, 0.3, 0.9, 10.0).unwrap();

        let mut crf = Crf::new_zeroed(4, 1, Alphabet::Dna).unwrap();
        let before = func.evaluate(&crf, &emission, 0, 1).unwrap();

        let params = LbfgsParams {
            max_iterations: 50,
            ..Default::default()
        };
        let outcome = train_lbfgs(&mut crf, &func, &emission, &params).unwrap();

        assert!(
            outcome.loglike + outcome.prior > before.loglike + before.prior,
            "objective did not improve: {} -> {}",
            before.loglike + before.prior,
            outcome.loglike + outcome.prior
        );
    }
}
