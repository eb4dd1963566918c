use std::fmt;
use std::fs::File;
use std::io::{Read, Write};
use std::path::Path;

use anyhow::{Context, Result};
use thiserror::Error;

use crate::alphabet::Alphabet;
use crate::structs::context_profile::{AlphabetSizeError, EvenWindowError};
use crate::structs::count_profile::ColumnCountError;
use crate::structs::record::{
    decode_fixed, encode_fixed, expect_tag, header_usize, header_value, next_line,
    BodyFieldCountError, TruncatedRecordError, RECORD_END,
};
use crate::structs::{ContextLibrary, ContextProfile};
use crate::util::{softmax, LogAbuse};

#[derive(Error, Debug)]
#[error("CRF has {found} states but should have {expected}")]
pub struct StateCountError {
    pub expected: usize,
    pub found: usize,
}

/// One linear scorer of a CRF: a bias, a window of context weights,
/// and pseudocount logits whose softmax is the state's emitted
/// pseudocount distribution.
#[derive(Clone, Debug)]
pub struct CrfState {
    pub index: usize,
    pub bias: f64,
    alphabet: Alphabet,
    /// num_cols x alphabet_size context weights
    pub weights: Vec<Vec<f64>>,
    /// pseudocount logits over the alphabet
    pub pc_weights: Vec<f64>,
}

impl CrfState {
    pub fn new(index: usize, num_cols: usize, alphabet: Alphabet) -> Result<Self> {
        if num_cols % 2 == 0 {
            return Err(EvenWindowError { num_cols }.into());
        }
        Ok(CrfState {
            index,
            bias: 0.0,
            alphabet,
            weights: vec![vec![0.0; alphabet.size()]; num_cols],
            pc_weights: vec![0.0; alphabet.size()],
        })
    }

    /// Initializes a state from a context profile: context weights
    /// are the profile's log2 probabilities and the pseudocount
    /// logits come from the central column.
    pub fn from_profile(index: usize, profile: &ContextProfile) -> Result<Self> {
        let mut state = CrfState::new(index, profile.num_cols(), profile.alphabet())?;

        for (i, col) in profile.data.iter().enumerate() {
            for (a, &v) in col.iter().enumerate() {
                state.weights[i][a] = if profile.logspace { v } else { v.log2_or_inf() };
            }
        }
        for (a, &p) in profile.pc.iter().enumerate() {
            state.pc_weights[a] = p.log2_or_inf();
        }

        Ok(state)
    }

    pub fn num_cols(&self) -> usize {
        self.weights.len()
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

    /// The state's pseudocount distribution softmax(q); invariant
    /// under a constant shift of the logits.
    pub fn pc(&self) -> Vec<f64> {
        softmax(&self.pc_weights)
    }

    pub fn parse<'a, I>(lines: &mut I) -> Result<Self>
    where
        I: Iterator<Item = &'a str>,
    {
        expect_tag(lines, "CrfState")?;
        let index = header_usize(lines, "INDEX")?;
        let num_cols = header_usize(lines, "NCOLS")?;
        let nalph = header_usize(lines, "ALPH")?;
        let alphabet = Alphabet::from_size(nalph).ok_or(AlphabetSizeError {
            expected: Alphabet::Amino.size(),
            found: nalph,
        })?;
        let bias = decode_fixed(header_value(lines, "BIAS")?)?;

        // skip the CWT ruler line
        next_line(lines).ok_or(TruncatedRecordError)?;

        let mut state = CrfState::new(index, num_cols, alphabet)?;
        state.bias = bias;

        let mut cols_read = 0;
        loop {
            let line = next_line(lines).ok_or(TruncatedRecordError)?;
            if line.trim() == RECORD_END {
                break;
            }
            let tokens: Vec<&str> = line.split_whitespace().collect();
            if tokens.len() != nalph + 1 {
                return Err(BodyFieldCountError {
                    expected: nalph + 1,
                    found: tokens.len(),
                }
                .into());
            }
            if tokens[0] == "PC" {
                for a in 0..nalph {
                    state.pc_weights[a] = decode_fixed(tokens[a + 1])?;
                }
                continue;
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
                state.weights[i][a] = decode_fixed(tokens[a + 1])?;
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

        Ok(state)
    }
}

impl fmt::Display for CrfState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "CrfState")?;
        writeln!(f, "INDEX\t{}", self.index)?;
        writeln!(f, "NCOLS\t{}", self.num_cols())?;
        writeln!(f, "ALPH\t{}", self.alphabet_size())?;
        writeln!(f, "BIAS\t{}", encode_fixed(self.bias))?;
        writeln!(f, "CWT\t{}", self.alphabet.ruler())?;

        for (i, col) in self.weights.iter().enumerate() {
            write!(f, "{}", i + 1)?;
            for &w in col.iter() {
                write!(f, "\t{}", encode_fixed(w))?;
            }
            writeln!(f)?;
        }

        write!(f, "PC")?;
        for &q in self.pc_weights.iter() {
            write!(f, "\t{}", encode_fixed(q))?;
        }
        writeln!(f)?;
        writeln!(f, "{RECORD_END}")
    }
}

/// A conditional random field over context windows: an ordered set
/// of states sharing the window length and alphabet.
#[derive(Clone, Debug)]
pub struct Crf {
    num_cols: usize,
    alphabet: Alphabet,
    states: Vec<CrfState>,
}

impl Crf {
    /// A CRF with all weights zero.
    pub fn new_zeroed(num_states: usize, num_cols: usize, alphabet: Alphabet) -> Result<Self> {
        let states = (0..num_states)
            .map(|k| CrfState::new(k, num_cols, alphabet))
            .collect::<Result<Vec<_>>>()?;
        Ok(Crf {
            num_cols,
            alphabet,
            states,
        })
    }

    /// Jumpstarts a CRF from a trained context library.
    pub fn from_library(lib: &ContextLibrary) -> Result<Self> {
        let states = lib
            .profiles()
            .iter()
            .enumerate()
            .map(|(k, p)| CrfState::from_profile(k, p))
            .collect::<Result<Vec<_>>>()?;
        Ok(Crf {
            num_cols: lib.num_cols(),
            alphabet: lib.alphabet(),
            states,
        })
    }

    pub fn size(&self) -> usize {
        self.states.len()
    }

    pub fn num_cols(&self) -> usize {
        self.num_cols
    }

    pub fn center(&self) -> usize {
        (self.num_cols - 1) / 2
    }

    pub fn alphabet(&self) -> Alphabet {
        self.alphabet
    }

    pub fn alphabet_size(&self) -> usize {
        self.alphabet.size()
    }

    pub fn states(&self) -> &[CrfState] {
        &self.states
    }

    pub fn states_mut(&mut self) -> &mut [CrfState] {
        &mut self.states
    }

    /// Number of parameters per state: bias + context weights +
    /// pseudocount logits.
    pub fn state_nweights(&self) -> usize {
        1 + self.num_cols * self.alphabet_size() + self.alphabet_size()
    }

    /// Total number of parameters.
    pub fn nweights(&self) -> usize {
        self.size() * self.state_nweights()
    }

    /// Flattens all parameters into `out`, ordered per state as
    /// [bias, context weights row-major, pc logits].
    pub fn to_weights(&self, out: &mut [f64]) {
        assert_eq!(out.len(), self.nweights());
        let mut i = 0;
        for state in self.states.iter() {
            out[i] = state.bias;
            i += 1;
            for col in state.weights.iter() {
                out[i..i + col.len()].copy_from_slice(col);
                i += col.len();
            }
            out[i..i + state.pc_weights.len()].copy_from_slice(&state.pc_weights);
            i += state.pc_weights.len();
        }
    }

    /// Inverse of [`Crf::to_weights`].
    pub fn set_weights(&mut self, weights: &[f64]) {
        assert_eq!(weights.len(), self.nweights());
        let mut i = 0;
        for state in self.states.iter_mut() {
            state.bias = weights[i];
            i += 1;
            for col in state.weights.iter_mut() {
                let len = col.len();
                col.copy_from_slice(&weights[i..i + len]);
                i += len;
            }
            let n = state.pc_weights.len();
            state.pc_weights.copy_from_slice(&weights[i..i + n]);
            i += n;
        }
    }

    pub fn read_from<P: AsRef<Path>>(path: P) -> Result<Self> {
        let mut text = String::new();
        File::open(&path)
            .with_context(|| format!("failed to open CRF file: {}", path.as_ref().display()))?
            .read_to_string(&mut text)?;
        text.parse()
    }

    pub fn write_to<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        let mut out = File::create(&path)
            .with_context(|| format!("failed to create CRF file: {}", path.as_ref().display()))?;
        out.write_all(self.to_string().as_bytes())?;
        Ok(())
    }
}

impl std::str::FromStr for Crf {
    type Err = anyhow::Error;

    fn from_str(text: &str) -> Result<Self> {
        let mut lines = text.lines().peekable();
        expect_tag(&mut lines, "Crf")?;
        let num_states = header_usize(&mut lines, "NSTATES")?;
        let num_cols = header_usize(&mut lines, "NCOLS")?;
        let nalph = header_usize(&mut lines, "ALPH")?;
        let alphabet = Alphabet::from_size(nalph).ok_or(AlphabetSizeError {
            expected: Alphabet::Amino.size(),
            found: nalph,
        })?;

        let mut crf = Crf {
            num_cols,
            alphabet,
            states: Vec::with_capacity(num_states),
        };

        while crf.states.len() < num_states {
            if lines.peek().map(|l| l.trim().is_empty()) == Some(true) {
                lines.next();
                continue;
            }
            if lines.peek().is_none() {
                break;
            }
            let state = CrfState::parse(&mut lines)?;
            if state.num_cols() != num_cols {
                return Err(ColumnCountError {
                    expected: num_cols,
                    found: state.num_cols(),
                }
                .into());
            }
            crf.states.push(state);
        }
        if crf.states.len() != num_states {
            return Err(StateCountError {
                expected: num_states,
                found: crf.states.len(),
            }
            .into());
        }

        Ok(crf)
    }
}

impl fmt::Display for Crf {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "Crf")?;
        writeln!(f, "NSTATES\t{}", self.size())?;
        writeln!(f, "NCOLS\t{}", self.num_cols)?;
        writeln!(f, "ALPH\t{}", self.alphabet_size())?;

        for state in self.states.iter() {
            write!(f, "{state}")?;
        }
        Ok(())
    }
}
