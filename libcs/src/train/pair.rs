use anyhow::Result;
use rand::seq::SliceRandom;
use rand::Rng;
use thiserror::Error;

use crate::structs::context_profile::EvenWindowError;
use crate::structs::CountProfile;
use crate::util::VecMath;

#[derive(Error, Debug)]
#[error("training target sums to {sum}, expected 1")]
pub struct TargetNotNormalizedError {
    sum: f64,
}

#[derive(Error, Debug)]
#[error("training window length {x_len} does not match target over {y_len} letters")]
pub struct PairShapeError {
    x_len: usize,
    y_len: usize,
}

/// One supervised example: a context window of digital letters and
/// the observed residue distribution at its central column.
#[derive(Clone, Debug)]
pub struct TrainingPair {
    pub x: Vec<u8>,
    pub y: Vec<f64>,
}

impl TrainingPair {
    pub fn new(x: Vec<u8>, y: Vec<f64>) -> Result<Self> {
        if x.len() % 2 == 0 {
            return Err(EvenWindowError { num_cols: x.len() }.into());
        }
        let sum: f64 = y.iter().sum();
        if (sum - 1.0).abs() > 1e-6 {
            return Err(TargetNotNormalizedError { sum }.into());
        }
        Ok(TrainingPair { x, y })
    }

    /// Derives a pair from a count-profile window: the window's
    /// per-column consensus letters paired with the normalized
    /// central-column frequencies.
    pub fn from_profile_window(window: &CountProfile) -> Result<Self> {
        let num_cols = window.num_cols();
        if num_cols % 2 == 0 {
            return Err(EvenWindowError { num_cols }.into());
        }
        let center = (num_cols - 1) / 2;

        let x: Vec<u8> = window
            .data
            .iter()
            .map(|col| {
                if col.iter().sum::<f64>() == 0.0 {
                    window.alphabet().any()
                } else {
                    col.argmax().unwrap_or(0) as u8
                }
            })
            .collect();

        let mut y = window.data[center].clone();
        if !y.as_mut_slice().normalize() {
            return Err(PairShapeError {
                x_len: x.len(),
                y_len: 0,
            }
            .into());
        }

        TrainingPair::new(x, y)
    }

    pub fn wlen(&self) -> usize {
        self.x.len()
    }

    pub fn center(&self) -> usize {
        (self.x.len() - 1) / 2
    }
}

/// Samples full-length window sub-profiles from each training
/// profile: per subject, a `sample_rate` fraction of the available
/// window positions, chosen with the supplied RNG.
pub fn sample_windows<R: Rng>(
    profiles: &[CountProfile],
    wlen: usize,
    sample_rate: f64,
    rng: &mut R,
) -> Result<Vec<CountProfile>> {
    if wlen % 2 == 0 {
        return Err(EvenWindowError { num_cols: wlen }.into());
    }

    let mut windows = vec![];
    for profile in profiles {
        if profile.num_cols() < wlen {
            continue;
        }
        let mut positions: Vec<usize> = (0..=profile.num_cols() - wlen).collect();
        let take = ((positions.len() as f64 * sample_rate).ceil() as usize).min(positions.len());
        positions.shuffle(rng);
        positions.truncate(take);

        for beg in positions {
            windows.push(profile.window(beg, wlen)?);
        }
    }
    Ok(windows)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::alphabet::{Alphabet, AMINO_ANY};
    use crate::structs::Sequence;
    use approx::assert_relative_eq;
    use rand::SeedableRng;
    use rand_pcg::Pcg64;

    #[test]
    fn test_pair_validation() {
        assert!(TrainingPair::new(vec![0, 1, 2], vec![1.0]).is_ok());
        assert!(TrainingPair::new(vec![0, 1], vec![1.0]).is_err());
        assert!(TrainingPair::new(vec![0], vec![0.5, 0.1]).is_err());
    }

    #[test]
    fn test_from_profile_window() {
        let seq = Sequence::from_utf8(b"ACDEF", Alphabet::Amino).unwrap();
        let cp = CountProfile::from_sequence(&seq);
        let pair = TrainingPair::from_profile_window(&cp).unwrap();
        assert_eq!(pair.x, seq.digital);
        assert_relative_eq!(pair.y[2], 1.0); // D at the center
    }

    #[test]
    fn test_empty_column_becomes_any() {
        let seq = Sequence::from_utf8(b"AXDEF", Alphabet::Amino).unwrap();
        let cp = CountProfile::from_sequence(&seq);
        let pair = TrainingPair::from_profile_window(&cp).unwrap();
        assert_eq!(pair.x[1], AMINO_ANY);
    }

    #[test]
    fn test_sample_windows_rate_one() {
        let seq = Sequence::from_utf8(b"ACDEFGHIK", Alphabet::Amino).unwrap();
        let profiles = vec![CountProfile::from_sequence(&seq)];
        let mut rng = Pcg64::seed_from_u64(1);
        let windows = sample_windows(&profiles, 5, 1.0, &mut rng).unwrap();
        assert_eq!(windows.len(), 5);
        for w in windows {
            assert_eq!(w.num_cols(), 5);
        }
    }

    #[test]
    fn test_sample_windows_skips_short_profiles() {
        let seq = Sequence::from_utf8(b"ACD", Alphabet::Amino).unwrap();
        let profiles = vec![CountProfile::from_sequence(&seq)];
        let mut rng = Pcg64::seed_from_u64(1);
        let windows = sample_windows(&profiles, 5, 1.0, &mut rng).unwrap();
        assert!(windows.is_empty());
    }
}
