use anyhow::Result;

use crate::structs::context_profile::EvenWindowError;
use crate::structs::{ContextProfile, CountProfile, CrfState, Sequence};
use crate::util::LogAbuse;

pub const DEFAULT_WEIGHT_CENTER: f64 = 1.6;
pub const DEFAULT_WEIGHT_DECAY: f64 = 0.85;

/// Computes positional-weighted multinomial log2 scores of context
/// windows against library components and CRF states. The central
/// column carries `weight_center`; the weight of the flanking
/// columns decays geometrically with distance from the center.
#[derive(Clone, Debug)]
pub struct Emission {
    num_cols: usize,
    center: usize,
    weights: Vec<f64>,
}

impl Emission {
    pub fn new(num_cols: usize, weight_center: f64, weight_decay: f64) -> Result<Self> {
        if num_cols % 2 != 1 {
            return Err(EvenWindowError { num_cols }.into());
        }

        let center = (num_cols - 1) / 2;
        let mut weights = vec![0.0; num_cols];
        weights[center] = weight_center;
        for i in 1..=center {
            let weight = weight_center * weight_decay.powi(i as i32);
            weights[center - i] = weight;
            weights[center + i] = weight;
        }

        Ok(Emission {
            num_cols,
            center,
            weights,
        })
    }

    pub fn num_cols(&self) -> usize {
        self.num_cols
    }

    pub fn center(&self) -> usize {
        self.center
    }

    /// The total positional weight mass, used to convert summed
    /// log-likelihoods into per-effective-column values.
    pub fn sum_weights(&self) -> f64 {
        self.weights.iter().sum()
    }

    #[inline(always)]
    pub fn weight(&self, j: usize) -> f64 {
        self.weights[j]
    }

    /// Log2 score of the count-profile window centered on `index`
    /// against a library component. Columns outside the subject
    /// contribute zero.
    pub fn score_profile(
        &self,
        profile: &ContextProfile,
        counts: &CountProfile,
        index: usize,
    ) -> f64 {
        let center = self.center;
        let beg = index.saturating_sub(center);
        let end = (counts.num_cols() - 1).min(index + center);

        let mut score = 0.0;
        for i in beg..=end {
            let j = i + center - index;
            let counts_col = &counts.data[i];
            let profile_col = &profile.data[j];

            // with a log-space component the inner sum already is
            // the weighted log2 term; otherwise one log2 per column
            if profile.logspace {
                let mut sum = 0.0;
                for (&c, &p) in counts_col.iter().zip(profile_col.iter()) {
                    // zero counts contribute nothing, even against
                    // a -inf log probability
                    if c != 0.0 {
                        sum += c * p;
                    }
                }
                score += self.weights[j] * sum;
            } else {
                let mut sum = 0.0;
                for (&c, &p) in counts_col.iter().zip(profile_col.iter()) {
                    sum += c * p;
                }
                score += self.weights[j] * sum.log2_or_inf();
            }
        }
        score
    }

    /// Log2 score of the sequence window centered on `index`
    /// against a library component. Any-symbol positions contribute
    /// zero.
    pub fn score_sequence(&self, profile: &ContextProfile, seq: &Sequence, index: usize) -> f64 {
        self.score_letters(profile, &seq.digital, index)
    }

    /// Log2 score of a full window of digital letters against a
    /// library component.
    pub fn score_window(&self, profile: &ContextProfile, window: &[u8]) -> f64 {
        debug_assert_eq!(window.len(), self.num_cols);
        self.score_letters(profile, window, self.center)
    }

    fn score_letters(&self, profile: &ContextProfile, letters: &[u8], index: usize) -> f64 {
        let center = self.center;
        let nalph = profile.alphabet_size();
        let beg = index.saturating_sub(center);
        let end = (letters.len() - 1).min(index + center);

        let mut score = 0.0;
        for i in beg..=end {
            let a = letters[i] as usize;
            if a >= nalph {
                continue;
            }
            let j = i + center - index;
            let p = profile.data[j][a];
            score += self.weights[j] * if profile.logspace { p } else { p.log2_or_inf() };
        }
        score
    }

    /// Linear score of a CRF state against the window of digital
    /// letters centered on `index`: the bias plus the weighted
    /// context weights of the observed letters.
    pub fn context_score(&self, state: &CrfState, letters: &[u8], index: usize) -> f64 {
        let center = self.center;
        let nalph = state.alphabet_size();
        let beg = index.saturating_sub(center);
        let end = (letters.len() - 1).min(index + center);

        let mut score = state.bias;
        for i in beg..=end {
            let a = letters[i] as usize;
            if a >= nalph {
                continue;
            }
            let j = i + center - index;
            score += self.weights[j] * state.weights[j][a];
        }
        score
    }
}
