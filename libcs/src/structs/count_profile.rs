use std::fmt;
use std::fs::File;
use std::io::{BufWriter, Read, Write};
use std::path::Path;

use anyhow::{Context, Result};
use thiserror::Error;

use crate::alphabet::Alphabet;
use crate::structs::record::{
    decode_fixed, decode_linear, encode_fixed, encode_linear, expect_tag, header_usize, next_line,
    BodyFieldCountError, TruncatedRecordError, RECORD_END,
};
use crate::structs::Sequence;
use crate::util::LogAbuse;

#[derive(Error, Debug)]
#[error("profile alphabet size {found} does not match any known alphabet")]
pub struct UnknownAlphabetSizeError {
    found: usize,
}

#[derive(Error, Debug)]
#[error("profile has {found} columns but should have {expected}")]
pub struct ColumnCountError {
    pub expected: usize,
    pub found: usize,
}

#[derive(Error, Debug)]
#[error("window [{beg}, {beg}+{len}) is out of bounds for profile with {num_cols} columns")]
pub struct WindowBoundsError {
    beg: usize,
    len: usize,
    num_cols: usize,
}

/// A profile of per-column residue counts (or frequencies) together
/// with the per-column effective sequence count of the alignment it
/// was computed from.
#[derive(Clone, Debug)]
pub struct CountProfile {
    alphabet: Alphabet,
    /// num_cols x alphabet_size, non-negative
    pub data: Vec<Vec<f64>>,
    /// per-column effective sequence count
    pub neff: Vec<f64>,
    /// true when `data` holds counts (frequencies times neff)
    pub is_counts: bool,
}

impl CountProfile {
    pub fn new(num_cols: usize, alphabet: Alphabet) -> Self {
        CountProfile {
            alphabet,
            data: vec![vec![0.0; alphabet.size()]; num_cols],
            neff: vec![1.0; num_cols],
            is_counts: false,
        }
    }

    /// A single sequence as a profile: one-hot frequency columns
    /// with neff 1. Any-symbol positions are left empty.
    pub fn from_sequence(seq: &Sequence) -> Self {
        let mut cp = CountProfile::new(seq.len(), seq.alphabet);
        for (i, &d) in seq.digital.iter().enumerate() {
            if (d as usize) < seq.alphabet.size() {
                cp.data[i][d as usize] = 1.0;
            }
        }
        cp
    }

    pub fn num_cols(&self) -> usize {
        self.data.len()
    }

    pub fn alphabet(&self) -> Alphabet {
        self.alphabet
    }

    pub fn alphabet_size(&self) -> usize {
        self.alphabet.size()
    }

    /// Extracts the sub-profile covering columns [beg, beg + len).
    pub fn window(&self, beg: usize, len: usize) -> Result<CountProfile> {
        if beg + len > self.num_cols() {
            return Err(WindowBoundsError {
                beg,
                len,
                num_cols: self.num_cols(),
            }
            .into());
        }
        Ok(CountProfile {
            alphabet: self.alphabet,
            data: self.data[beg..beg + len].to_vec(),
            neff: self.neff[beg..beg + len].to_vec(),
            is_counts: self.is_counts,
        })
    }

    pub fn convert_to_counts(&mut self) {
        if !self.is_counts {
            for (col, &neff) in self.data.iter_mut().zip(self.neff.iter()) {
                for v in col.iter_mut() {
                    *v *= neff;
                }
            }
            self.is_counts = true;
        }
    }

    pub fn convert_to_frequencies(&mut self) {
        if self.is_counts {
            self.normalize_columns();
            self.is_counts = false;
        }
    }

    /// Scales every column to sum to one. Columns with zero mass are
    /// left untouched and reported by the return value.
    pub fn normalize_columns(&mut self) -> bool {
        let mut all_normalized = true;
        for col in self.data.iter_mut() {
            let sum: f64 = col.iter().sum();
            if sum == 0.0 {
                all_normalized = false;
            } else {
                col.iter_mut().for_each(|v| *v /= sum);
            }
        }
        all_normalized
    }

    pub fn read_from<P: AsRef<Path>>(path: P) -> Result<Vec<Self>> {
        let mut text = String::new();
        File::open(&path)
            .with_context(|| format!("failed to open profile file: {}", path.as_ref().display()))?
            .read_to_string(&mut text)?;
        Self::read_all(&text)
    }

    /// Reads consecutive CountProfile records until the text is
    /// exhausted.
    pub fn read_all(text: &str) -> Result<Vec<Self>> {
        let mut profiles = vec![];
        let mut lines = text.lines().peekable();
        while lines.peek().is_some() {
            if lines.peek().map(|l| l.trim().is_empty()) == Some(true) {
                lines.next();
                continue;
            }
            profiles.push(Self::parse(&mut lines)?);
        }
        Ok(profiles)
    }

    pub fn parse<'a, I>(lines: &mut I) -> Result<Self>
    where
        I: Iterator<Item = &'a str>,
    {
        expect_tag(lines, "CountProfile")?;
        let num_cols = header_usize(lines, "ncols")?;
        let nalph = header_usize(lines, "nalph")?;
        let has_counts = header_usize(lines, "has_counts")? == 1;

        let alphabet =
            Alphabet::from_size(nalph).ok_or(UnknownAlphabetSizeError { found: nalph })?;

        // skip the alphabet ruler line
        next_line(lines).ok_or(TruncatedRecordError)?;

        let mut cp = CountProfile::new(num_cols, alphabet);
        cp.is_counts = has_counts;

        let mut cols_read = 0;
        loop {
            let line = next_line(lines).ok_or(TruncatedRecordError)?;
            if line.trim() == RECORD_END {
                break;
            }
            let tokens: Vec<&str> = line.split_whitespace().collect();
            if tokens.len() != nalph + 2 {
                return Err(BodyFieldCountError {
                    expected: nalph + 2,
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
                cp.data[i][a] = decode_fixed(tokens[a + 1])?.exp2();
            }
            cp.neff[i] = decode_linear(tokens[nalph + 1])?;
            cols_read = i + 1;
        }
        if cols_read != num_cols {
            return Err(ColumnCountError {
                expected: num_cols,
                found: cols_read,
            }
            .into());
        }

        Ok(cp)
    }

    pub fn write_to<P: AsRef<Path>>(profiles: &[Self], path: P) -> Result<()> {
        let mut out = BufWriter::new(File::create(&path).with_context(|| {
            format!("failed to create profile file: {}", path.as_ref().display())
        })?);
        for cp in profiles {
            write!(out, "{cp}")?;
        }
        Ok(())
    }
}

impl fmt::Display for CountProfile {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "CountProfile")?;
        writeln!(f, "ncols\t{}", self.num_cols())?;
        writeln!(f, "nalph\t{}", self.alphabet_size())?;
        writeln!(f, "has_counts\t{}", if self.is_counts { 1 } else { 0 })?;
        writeln!(f, "\t{}\tNeff", self.alphabet.ruler())?;

        for (i, col) in self.data.iter().enumerate() {
            write!(f, "{}", i + 1)?;
            for &v in col.iter() {
                write!(f, "\t{}", encode_fixed(v.log2_or_inf()))?;
            }
            writeln!(f, "\t{}", encode_linear(self.neff[i]))?;
        }
        writeln!(f, "{RECORD_END}")
    }
}
