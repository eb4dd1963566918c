use anyhow::Result;
use thiserror::Error;

use crate::emission::Emission;
use crate::structs::{ContextLibrary, CountProfile, Crf, Sequence};
use crate::substitution::SubstitutionMatrix;
use crate::util::log_sum_exp;

#[derive(Error, Debug)]
#[error("admixture coefficient {value} is outside [0, 1]")]
pub struct AdmixtureRangeError {
    value: f64,
}

#[derive(Error, Debug)]
#[error("admixture divergence scale {value} must be positive")]
pub struct AdmixtureScaleError {
    value: f64,
}

#[derive(Error, Debug)]
#[error("posterior normalizer is zero for a query window")]
pub struct ZeroPosteriorError;

/// How strongly predicted pseudocounts are admixed into observed
/// frequencies.
#[derive(Debug, Clone, Copy)]
pub enum Admix {
    /// tau = c
    Constant(f64),
    /// tau = a / (1 + (neff - 1) / b)
    DivergenceDependent { a: f64, b: f64 },
}

impl Admix {
    pub fn constant(c: f64) -> Result<Self> {
        if !(0.0..=1.0).contains(&c) {
            return Err(AdmixtureRangeError { value: c }.into());
        }
        Ok(Admix::Constant(c))
    }

    pub fn divergence_dependent(a: f64, b: f64) -> Result<Self> {
        if !(0.0..=1.0).contains(&a) {
            return Err(AdmixtureRangeError { value: a }.into());
        }
        if b <= 0.0 {
            return Err(AdmixtureScaleError { value: b }.into());
        }
        Ok(Admix::DivergenceDependent { a, b })
    }

    pub fn tau(&self, neff: f64) -> f64 {
        match *self {
            Admix::Constant(c) => c,
            Admix::DivergenceDependent { a, b } => a / (1.0 + (neff - 1.0) / b),
        }
    }
}

/// Fills `pp` with the posterior P(z=k | window) of every library
/// component for the count-profile window centered on `index`, and
/// returns the log2 of the unnormalized sum (the window's emission
/// log-likelihood under the mixture).
pub fn library_posteriors(
    lib: &ContextLibrary,
    emission: &Emission,
    counts: &CountProfile,
    index: usize,
    pp: &mut [f64],
) -> Result<f64> {
    for (k, profile) in lib.profiles().iter().enumerate() {
        pp[k] = profile.prior * emission.score_profile(profile, counts, index).exp2();
    }
    normalize_posteriors(pp)
}

/// Same as [`library_posteriors`] for a window of digital letters.
pub fn library_posteriors_window(
    lib: &ContextLibrary,
    emission: &Emission,
    window: &[u8],
    pp: &mut [f64],
) -> Result<f64> {
    for (k, profile) in lib.profiles().iter().enumerate() {
        pp[k] = profile.prior * emission.score_window(profile, window).exp2();
    }
    normalize_posteriors(pp)
}

/// Same as [`library_posteriors`] for a sequence position.
pub fn library_posteriors_seq(
    lib: &ContextLibrary,
    emission: &Emission,
    seq: &Sequence,
    index: usize,
    pp: &mut [f64],
) -> Result<f64> {
    for (k, profile) in lib.profiles().iter().enumerate() {
        pp[k] = profile.prior * emission.score_sequence(profile, seq, index).exp2();
    }
    normalize_posteriors(pp)
}

fn normalize_posteriors(pp: &mut [f64]) -> Result<f64> {
    let sum: f64 = pp.iter().sum();
    if sum <= 0.0 || !sum.is_finite() {
        return Err(ZeroPosteriorError.into());
    }
    pp.iter_mut().for_each(|p| *p /= sum);
    Ok(sum.log2())
}

/// Fills `pp` with the posterior P(z=k | window) of every CRF state
/// for the window of digital letters centered on `index`, using the
/// log-sum-exp trick. Returns the log normalizer.
pub fn crf_posteriors(
    crf: &Crf,
    emission: &Emission,
    letters: &[u8],
    index: usize,
    pp: &mut [f64],
) -> Result<f64> {
    for (k, state) in crf.states().iter().enumerate() {
        pp[k] = emission.context_score(state, letters, index);
    }
    let norm = log_sum_exp(pp);
    if !norm.is_finite() {
        return Err(ZeroPosteriorError.into());
    }
    pp.iter_mut().for_each(|u| *u = (*u - norm).exp());
    Ok(norm)
}

/// Context-specific pseudocounts from a trained context library.
pub struct LibraryPseudocounts<'a> {
    lib: &'a ContextLibrary,
    emission: Emission,
}

impl<'a> LibraryPseudocounts<'a> {
    pub fn new(lib: &'a ContextLibrary, weight_center: f64, weight_decay: f64) -> Result<Self> {
        let emission = Emission::new(lib.num_cols(), weight_center, weight_decay)?;
        Ok(LibraryPseudocounts { lib, emission })
    }

    /// The mixed pseudocount distribution Σ_k P(z=k|·) pc_k for one
    /// position of a sequence.
    fn predict_seq(&self, seq: &Sequence, index: usize, pp: &mut [f64]) -> Result<Vec<f64>> {
        library_posteriors_seq(self.lib, &self.emission, seq, index, pp)?;
        Ok(self.mix(pp))
    }

    fn predict_profile(&self, cp: &CountProfile, index: usize, pp: &mut [f64]) -> Result<Vec<f64>> {
        library_posteriors(self.lib, &self.emission, cp, index, pp)?;
        Ok(self.mix(pp))
    }

    fn mix(&self, pp: &[f64]) -> Vec<f64> {
        let mut pa = vec![0.0; self.lib.alphabet_size()];
        for (k, profile) in self.lib.profiles().iter().enumerate() {
            for (a, &pc) in profile.pc.iter().enumerate() {
                pa[a] += pp[k] * pc;
            }
        }
        pa
    }

    /// Smooths a single sequence into a frequency profile:
    /// p'(a) = (1 - tau) delta(s_i = a) + tau p(a|window).
    pub fn add_to_sequence(&self, seq: &Sequence, admix: &Admix) -> Result<CountProfile> {
        let nalph = self.lib.alphabet_size();
        let tau = admix.tau(1.0);
        let mut out = CountProfile::new(seq.len(), seq.alphabet);
        let mut pp = vec![0.0; self.lib.num_profiles()];

        for i in 0..seq.len() {
            let pa = self.predict_seq(seq, i, &mut pp)?;
            let col = &mut out.data[i];
            for a in 0..nalph {
                let observed = if seq.digital[i] as usize == a { 1.0 } else { 0.0 };
                col[a] = (1.0 - tau) * observed + tau * pa[a];
            }
        }
        Ok(out)
    }

    /// Smooths a count profile in place; the profile is converted
    /// to frequencies first, neff is preserved.
    pub fn add_to_profile(&self, admix: &Admix, cp: &mut CountProfile) -> Result<()> {
        let nalph = self.lib.alphabet_size();
        cp.convert_to_frequencies();
        let mut pp = vec![0.0; self.lib.num_profiles()];

        for i in 0..cp.num_cols() {
            let pa = self.predict_profile(cp, i, &mut pp)?;
            let tau = admix.tau(cp.neff[i]);
            let col = &mut cp.data[i];
            for a in 0..nalph {
                col[a] = (1.0 - tau) * col[a] + tau * pa[a];
            }
        }
        cp.normalize_columns();
        Ok(())
    }
}

/// Context-specific pseudocounts from a trained CRF.
pub struct CrfPseudocounts<'a> {
    crf: &'a Crf,
    emission: Emission,
}

impl<'a> CrfPseudocounts<'a> {
    pub fn new(crf: &'a Crf, weight_center: f64, weight_decay: f64) -> Result<Self> {
        let emission = Emission::new(crf.num_cols(), weight_center, weight_decay)?;
        Ok(CrfPseudocounts { crf, emission })
    }

    fn predict(&self, letters: &[u8], index: usize, pp: &mut [f64]) -> Result<Vec<f64>> {
        crf_posteriors(self.crf, &self.emission, letters, index, pp)?;
        let mut pa = vec![0.0; self.crf.alphabet_size()];
        for (k, state) in self.crf.states().iter().enumerate() {
            for (a, pc) in state.pc().into_iter().enumerate() {
                pa[a] += pp[k] * pc;
            }
        }
        Ok(pa)
    }

    pub fn add_to_sequence(&self, seq: &Sequence, admix: &Admix) -> Result<CountProfile> {
        let nalph = self.crf.alphabet_size();
        let tau = admix.tau(1.0);
        let mut out = CountProfile::new(seq.len(), seq.alphabet);
        let mut pp = vec![0.0; self.crf.size()];

        for i in 0..seq.len() {
            let pa = self.predict(&seq.digital, i, &mut pp)?;
            let col = &mut out.data[i];
            for a in 0..nalph {
                let observed = if seq.digital[i] as usize == a { 1.0 } else { 0.0 };
                col[a] = (1.0 - tau) * observed + tau * pa[a];
            }
        }
        Ok(out)
    }

    /// Smooths a count profile in place against the consensus
    /// letters of its columns.
    pub fn add_to_profile(&self, admix: &Admix, cp: &mut CountProfile) -> Result<()> {
        use crate::util::VecMath;

        let nalph = self.crf.alphabet_size();
        cp.convert_to_frequencies();

        // CRF states score discrete letters; the subject is
        // represented by its per-column consensus
        let letters: Vec<u8> = cp
            .data
            .iter()
            .map(|col| col.argmax().unwrap_or(0) as u8)
            .collect();

        let mut pp = vec![0.0; self.crf.size()];
        for i in 0..cp.num_cols() {
            let pa = self.predict(&letters, i, &mut pp)?;
            let tau = admix.tau(cp.neff[i]);
            let col = &mut cp.data[i];
            for a in 0..nalph {
                col[a] = (1.0 - tau) * col[a] + tau * pa[a];
            }
        }
        cp.normalize_columns();
        Ok(())
    }
}

/// Substitution-matrix pseudocounts: the context-free fallback used
/// to regularize training profiles before windows are sampled.
pub struct MatrixPseudocounts<'a> {
    sm: &'a SubstitutionMatrix,
}

impl<'a> MatrixPseudocounts<'a> {
    pub fn new(sm: &'a SubstitutionMatrix) -> Self {
        MatrixPseudocounts { sm }
    }

    /// Mixes conditional-substitution pseudocounts into every
    /// column: p'(a) = (1 - tau) p(a) + tau Σ_b f(a|b) p(b).
    pub fn add_to_profile(&self, admix: &Admix, cp: &mut CountProfile) {
        let nalph = cp.alphabet_size();
        cp.convert_to_frequencies();

        for i in 0..cp.num_cols() {
            let tau = admix.tau(cp.neff[i]);
            let col = &cp.data[i];
            let mut mixed = vec![0.0; nalph];
            for a in 0..nalph {
                let mut g = 0.0;
                for (b, &p_b) in col.iter().enumerate() {
                    g += self.sm.r(a, b) * p_b;
                }
                mixed[a] = (1.0 - tau) * col[a] + tau * g;
            }
            cp.data[i] = mixed;
        }
        cp.normalize_columns();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::alphabet::Alphabet;
    use crate::structs::ContextProfile;
    use approx::assert_relative_eq;

    fn uniform_library(num_profiles: usize) -> ContextLibrary {
        let profiles = (0..num_profiles)
            .map(|k| {
                let mut profile = ContextProfile::new(k, 1, Alphabet::Amino).unwrap();
                profile.data[0] = vec![0.05; 20];
                profile.pc = vec![0.05; 20];
                profile.prior = 1.0 / num_profiles as f64;
                profile
            })
            .collect();
        ContextLibrary::from_profiles(profiles, 1).unwrap()
    }

    #[test]
    fn test_admixture_validation() {
        assert!(Admix::constant(0.9).is_ok());
        assert!(Admix::constant(1.5).is_err());
        assert!(Admix::divergence_dependent(1.0, 10.0).is_ok());
        assert!(Admix::divergence_dependent(1.0, 0.0).is_err());
        assert!(Admix::divergence_dependent(-0.1, 10.0).is_err());
    }

    #[test]
    fn test_divergence_dependent_tau() {
        let admix = Admix::divergence_dependent(1.0, 10.0).unwrap();
        assert_relative_eq!(admix.tau(1.0), 1.0);
        assert_relative_eq!(admix.tau(11.0), 0.5);
    }

    #[test]
    fn test_single_component_full_admix_gives_pc() {
        // a K=1 library with uniform pc and tau=1 predicts 0.05
        // everywhere, whatever the query
        let lib = uniform_library(1);
        let pc = LibraryPseudocounts::new(&lib, 1.6, 0.85).unwrap();
        let seq = Sequence::from_utf8(b"W", Alphabet::Amino).unwrap();
        let admix = Admix::constant(1.0).unwrap();
        let out = pc.add_to_sequence(&seq, &admix).unwrap();
        for a in 0..20 {
            assert_relative_eq!(out.data[0][a], 0.05, epsilon = 1e-9);
        }
    }

    #[test]
    fn test_two_identical_components_split_posterior() {
        // identical profiles and priors, one-hot pseudocounts on A
        // and R: the mix puts 0.5 on each
        let profiles = [0usize, 14]
            .iter()
            .enumerate()
            .map(|(k, &letter)| {
                let mut profile = ContextProfile::new(k, 1, Alphabet::Amino).unwrap();
                profile.data[0] = vec![0.05; 20];
                profile.pc = vec![0.0; 20];
                profile.pc[letter] = 1.0;
                profile.prior = 0.5;
                profile
            })
            .collect();
        let lib = ContextLibrary::from_profiles(profiles, 1).unwrap();
        let pc = LibraryPseudocounts::new(&lib, 1.6, 0.85).unwrap();
        let seq = Sequence::from_utf8(b"A", Alphabet::Amino).unwrap();
        let admix = Admix::constant(1.0).unwrap();
        let out = pc.add_to_sequence(&seq, &admix).unwrap();
        assert_relative_eq!(out.data[0][0], 0.5, epsilon = 1e-9); // A
        assert_relative_eq!(out.data[0][14], 0.5, epsilon = 1e-9); // R
        for a in (0..20).filter(|&a| a != 0 && a != 14) {
            assert_relative_eq!(out.data[0][a], 0.0, epsilon = 1e-9);
        }
    }

    #[test]
    fn test_posteriors_sum_to_one() {
        let lib = uniform_library(5);
        let em = Emission::new(1, 1.6, 0.85).unwrap();
        let seq = Sequence::from_utf8(b"K", Alphabet::Amino).unwrap();
        let mut pp = vec![0.0; 5];
        library_posteriors_seq(&lib, &em, &seq, 0, &mut pp).unwrap();
        let sum: f64 = pp.iter().sum();
        assert_relative_eq!(sum, 1.0, epsilon = 1e-9);
    }

    #[test]
    fn test_crf_posteriors_sum_to_one() {
        let crf = Crf::new_zeroed(3, 1, Alphabet::Amino).unwrap();
        let em = Emission::new(1, 1.6, 0.85).unwrap();
        let mut pp = vec![0.0; 3];
        crf_posteriors(&crf, &em, &[4], 0, &mut pp).unwrap();
        for p in pp {
            assert_relative_eq!(p, 1.0 / 3.0, epsilon = 1e-12);
        }
    }

    #[test]
    fn test_crf_mixing_column_sums() {
        let mut crf = Crf::new_zeroed(4, 3, Alphabet::Amino).unwrap();
        for (k, state) in crf.states_mut().iter_mut().enumerate() {
            state.bias = k as f64 * 0.1;
            state.pc_weights[k] = 1.0;
        }
        let pc = CrfPseudocounts::new(&crf, 1.6, 0.85).unwrap();
        let seq = Sequence::from_utf8(b"ACDEF", Alphabet::Amino).unwrap();
        let admix = Admix::constant(0.7).unwrap();
        let out = pc.add_to_sequence(&seq, &admix).unwrap();
        for col in out.data.iter() {
            let sum: f64 = col.iter().sum();
            assert_relative_eq!(sum, 1.0, epsilon = 1e-9);
        }
    }

    #[test]
    fn test_matrix_pseudocounts_keep_columns_normalized() {
        let sm = SubstitutionMatrix::blosum62();
        let mpc = MatrixPseudocounts::new(&sm);
        let seq = Sequence::from_utf8(b"ACDEF", Alphabet::Amino).unwrap();
        let mut cp = CountProfile::from_sequence(&seq);
        mpc.add_to_profile(&Admix::constant(0.1).unwrap(), &mut cp);
        for col in cp.data.iter() {
            let sum: f64 = col.iter().sum();
            assert_relative_eq!(sum, 1.0, epsilon = 1e-9);
            assert!(col.iter().all(|&p| p > 0.0));
        }
    }
}
