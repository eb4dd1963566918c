use std::fmt;

use anyhow::{Context, Result};
use thiserror::Error;

use crate::alphabet::Alphabet;
use crate::structs::count_profile::ColumnCountError;
use crate::structs::record::{
    decode_fixed, encode_fixed, expect_tag, header_usize, next_line, BodyFieldCountError,
    TruncatedRecordError, RECORD_END,
};
use crate::structs::CountProfile;
use crate::util::LogAbuse;

#[derive(Error, Debug)]
#[error("context window length must be odd, got {num_cols}")]
pub struct EvenWindowError {
    pub num_cols: usize,
}

#[derive(Error, Debug)]
#[error("profile alphabet size should be {expected} but is {found}")]
pub struct AlphabetSizeError {
    pub expected: usize,
    pub found: usize,
}

/// One mixture component of a context library: a window profile
/// with a prior weight and the pseudocount distribution emitted
/// when the component explains a query window.
#[derive(Clone, Debug)]
pub struct ContextProfile {
    pub index: usize,
    pub prior: f64,
    alphabet: Alphabet,
    /// num_cols x alphabet_size; probabilities, or log2
    /// probabilities when `logspace` is set
    pub data: Vec<Vec<f64>>,
    /// pseudocount distribution over the alphabet (always linear)
    pub pc: Vec<f64>,
    pub logspace: bool,
}

impl ContextProfile {
    pub fn new(index: usize, num_cols: usize, alphabet: Alphabet) -> Result<Self> {
        if num_cols % 2 == 0 {
            return Err(EvenWindowError { num_cols }.into());
        }
        Ok(ContextProfile {
            index,
            prior: 0.0,
            alphabet,
            data: vec![vec![0.0; alphabet.size()]; num_cols],
            pc: vec![0.0; alphabet.size()],
            logspace: false,
        })
    }

    /// Builds a component from a count-profile window: columns are
    /// normalized to frequencies and the central column becomes the
    /// pseudocount distribution.
    pub fn from_counts(index: usize, counts: &CountProfile) -> Result<Self> {
        let mut profile = ContextProfile::new(index, counts.num_cols(), counts.alphabet())?;
        let mut freqs = counts.clone();
        freqs.convert_to_frequencies();
        freqs.normalize_columns();
        profile.data = freqs.data;
        profile.pc = profile.data[profile.center()].clone();
        Ok(profile)
    }

    pub fn num_cols(&self) -> usize {
        self.data.len()
    }

    pub fn center(&self) -> usize {
        (self.num_cols() - 1) / 2
    }

    pub fn alphabet(&self) -> Alphabet {
        self.alphabet
    }

    pub fn alphabet_size(&self) -> usize {
        self.alphabet.size()
    }

    pub fn transform_to_logspace(&mut self) {
        if !self.logspace {
            for col in self.data.iter_mut() {
                for v in col.iter_mut() {
                    *v = v.log2_or_inf();
                }
            }
            self.logspace = true;
        }
    }

    pub fn transform_to_linspace(&mut self) {
        if self.logspace {
            for col in self.data.iter_mut() {
                for v in col.iter_mut() {
                    *v = v.exp2();
                }
            }
            self.logspace = false;
        }
    }

    /// Normalizes every column in linear space. Returns false (and
    /// leaves the profile untouched) when any column has zero mass.
    pub fn normalize(&mut self) -> bool {
        assert!(!self.logspace);
        if self.data.iter().any(|col| col.iter().sum::<f64>() == 0.0) {
            return false;
        }
        for col in self.data.iter_mut() {
            let sum: f64 = col.iter().sum();
            col.iter_mut().for_each(|v| *v /= sum);
        }
        true
    }

    pub fn parse<'a, I>(lines: &mut I, logspace: bool) -> Result<Self>
    where
        I: Iterator<Item = &'a str>,
    {
        expect_tag(lines, "ContextProfile")?;
        let index = header_usize(lines, "INDEX")?;
        let num_cols = header_usize(lines, "NCOLS")?;
        let nalph = header_usize(lines, "ALPH")?;
        let alphabet = Alphabet::from_size(nalph).ok_or(AlphabetSizeError {
            expected: Alphabet::Amino.size(),
            found: nalph,
        })?;

        let prior_line = next_line(lines).ok_or(TruncatedRecordError)?;
        let mut prior_tokens = prior_line.split_whitespace();
        let prior = match (prior_tokens.next(), prior_tokens.next()) {
            (Some("PRIOR"), Some(tok)) => decode_fixed(tok)?.exp2(),
            _ => return Err(anyhow::anyhow!("profile does not contain 'PRIOR' record")),
        };

        // skip the alphabet ruler line
        next_line(lines).ok_or(TruncatedRecordError)?;

        let mut profile = ContextProfile::new(index, num_cols, alphabet)?;
        profile.prior = prior;
        profile.logspace = logspace;

        let mut cols_read = 0;
        loop {
            let line = next_line(lines).ok_or(TruncatedRecordError)?;
            if line.trim() == RECORD_END {
                break;
            }
            let tokens: Vec<&str> = line.split_whitespace().collect();
            if tokens[0] == "PC" {
                if tokens.len() != nalph + 1 {
                    return Err(BodyFieldCountError {
                        expected: nalph + 1,
                        found: tokens.len(),
                    }
                    .into());
                }
                for a in 0..nalph {
                    profile.pc[a] = decode_fixed(tokens[a + 1])?.exp2();
                }
                continue;
            }
            if tokens.len() != nalph + 1 {
                return Err(BodyFieldCountError {
                    expected: nalph + 1,
                    found: tokens.len(),
                }
                .into());
            }
            let i: usize = tokens[0]
                .parse()
                .with_context(|| format!("failed to parse column index \"{}\"", tokens[0]))?;
            if i == 0 || i > num_cols {
                return Err(ColumnCountError {
                    expected: num_cols,
                    found: i,
                }
                .into());
            }
            let i = i - 1;
            for a in 0..nalph {
                let log_p = decode_fixed(tokens[a + 1])?;
                profile.data[i][a] = if logspace { log_p } else { log_p.exp2() };
            }
            cols_read = i + 1;
        }
        if cols_read != num_cols {
            return Err(ColumnCountError {
                expected: num_cols,
                found: cols_read,
            }
            .into());
        }

        Ok(profile)
    }
}

impl fmt::Display for ContextProfile {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "ContextProfile")?;
        writeln!(f, "INDEX\t{}", self.index)?;
        writeln!(f, "NCOLS\t{}", self.num_cols())?;
        writeln!(f, "ALPH\t{}", self.alphabet_size())?;
        writeln!(f, "PRIOR\t{}", encode_fixed(self.prior.log2_or_inf()))?;
        writeln!(f, "\t{}", self.alphabet.ruler())?;

        for (i, col) in self.data.iter().enumerate() {
            write!(f, "{}", i + 1)?;
            for &v in col.iter() {
                let log_p = if self.logspace { v } else { v.log2_or_inf() };
                write!(f, "\t{}", encode_fixed(log_p))?;
            }
            writeln!(f)?;
        }

        write!(f, "PC")?;
        for &p in self.pc.iter() {
            write!(f, "\t{}", encode_fixed(p.log2_or_inf()))?;
        }
        writeln!(f)?;
        writeln!(f, "{RECORD_END}")
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::structs::Sequence;
    use approx::assert_relative_eq;

    fn test_component() -> ContextProfile {
        let seq = Sequence::from_utf8(b"ACDEF", Alphabet::Amino).unwrap();
        let cp = CountProfile::from_sequence(&seq);
        let mut profile = ContextProfile::from_counts(3, &cp).unwrap();
        profile.prior = 0.25;
        profile
    }

    #[test]
    fn test_even_window_rejected() {
        assert!(ContextProfile::new(0, 4, Alphabet::Amino).is_err());
    }

    #[test]
    fn test_from_counts_pc_is_center_column() {
        let profile = test_component();
        assert_eq!(profile.center(), 2);
        assert_relative_eq!(profile.pc[2], 1.0); // D at center
    }

    #[test]
    fn test_logspace_round_trip() {
        let mut profile = test_component();
        profile.transform_to_logspace();
        assert!(profile.logspace);
        assert_relative_eq!(profile.data[0][0], 0.0); // log2(1.0)
        profile.transform_to_linspace();
        assert_relative_eq!(profile.data[0][0], 1.0);
    }

    #[test]
    fn test_serialization_round_trip_linear() {
        let profile = test_component();
        let text = profile.to_string();
        let parsed = ContextProfile::parse(&mut text.lines(), false).unwrap();
        assert_eq!(parsed.to_string(), text);
        assert_relative_eq!(parsed.prior, 0.25);
    }

    #[test]
    fn test_serialization_round_trip_logspace() {
        let mut profile = test_component();
        profile.transform_to_logspace();
        let text = profile.to_string();
        let parsed = ContextProfile::parse(&mut text.lines(), true).unwrap();
        assert!(parsed.logspace);
        assert_eq!(parsed.to_string(), text);
    }

    #[test]
    fn test_zero_evidence_normalize_refused() {
        let mut profile = ContextProfile::new(0, 3, Alphabet::Amino).unwrap();
        assert!(!profile.normalize());
        profile.data[0][0] = 2.0;
        assert!(!profile.normalize()); // other columns still empty
    }
}
