use std::fmt;
use std::fs::File;
use std::io::{Read, Write};
use std::path::Path;

use anyhow::{Context, Result};
use rand::seq::SliceRandom;
use rand::Rng;
use thiserror::Error;

use crate::alphabet::Alphabet;
use crate::structs::context_profile::EvenWindowError;
use crate::structs::record::{expect_tag, header_usize};
use crate::structs::{ContextProfile, CountProfile};

#[derive(Error, Debug)]
#[error("context library already contains {num_profiles} profiles")]
pub struct LibraryFullError {
    pub num_profiles: usize,
}

#[derive(Error, Debug)]
#[error("profile to add has {found} columns but should have {expected}")]
pub struct ProfileColumnsError {
    pub expected: usize,
    pub found: usize,
}

#[derive(Error, Debug)]
#[error("context library has {found} profiles but should have {expected}")]
pub struct ProfileCountError {
    pub expected: usize,
    pub found: usize,
}

#[derive(Error, Debug)]
#[error(
    "could not fully initialize all {expected} library profiles; \
     only {found} training windows provided"
)]
pub struct TooFewWindowsError {
    pub expected: usize,
    pub found: usize,
}

/// A mixture of context profiles: the generative model trained by
/// EM and queried for pseudocounts at inference time.
#[derive(Clone, Debug)]
pub struct ContextLibrary {
    num_profiles: usize,
    num_cols: usize,
    alphabet: Alphabet,
    pub iterations: usize,
    logspace: bool,
    profiles: Vec<ContextProfile>,
}

impl ContextLibrary {
    pub fn new(num_profiles: usize, num_cols: usize, alphabet: Alphabet) -> Result<Self> {
        if num_cols % 2 == 0 {
            return Err(EvenWindowError { num_cols }.into());
        }
        Ok(ContextLibrary {
            num_profiles,
            num_cols,
            alphabet,
            iterations: 0,
            logspace: false,
            profiles: Vec::with_capacity(num_profiles),
        })
    }

    /// Initializes a library with profile windows randomly sampled
    /// from the training windows.
    pub fn init_by_sampling<R: Rng>(
        num_profiles: usize,
        num_cols: usize,
        alphabet: Alphabet,
        windows: &[CountProfile],
        rng: &mut R,
    ) -> Result<Self> {
        let mut lib = ContextLibrary::new(num_profiles, num_cols, alphabet)?;

        let mut order: Vec<usize> = (0..windows.len()).collect();
        order.shuffle(rng);

        for idx in order {
            if lib.full() {
                break;
            }
            lib.add(&windows[idx])?;
        }
        if !lib.full() {
            return Err(TooFewWindowsError {
                expected: num_profiles,
                found: windows.len(),
            }
            .into());
        }
        Ok(lib)
    }

    /// Builds a library directly from ready-made components, e.g.
    /// when assembling a hand-tuned mixture. Components must share
    /// the window length.
    pub fn from_profiles(profiles: Vec<ContextProfile>, num_cols: usize) -> Result<Self> {
        for p in profiles.iter() {
            if p.num_cols() != num_cols {
                return Err(ProfileColumnsError {
                    expected: num_cols,
                    found: p.num_cols(),
                }
                .into());
            }
        }
        let alphabet = profiles
            .first()
            .map(|p| p.alphabet())
            .unwrap_or(Alphabet::Amino);
        let mut lib = ContextLibrary::new(profiles.len(), num_cols, alphabet)?;
        lib.profiles = profiles;
        Ok(lib)
    }

    /// Adds a component built from a count-profile window. New
    /// components receive the uniform prior.
    pub fn add(&mut self, counts: &CountProfile) -> Result<usize> {
        if self.full() {
            return Err(LibraryFullError {
                num_profiles: self.num_profiles,
            }
            .into());
        }
        if counts.num_cols() != self.num_cols {
            return Err(ProfileColumnsError {
                expected: self.num_cols,
                found: counts.num_cols(),
            }
            .into());
        }

        let mut profile = ContextProfile::from_counts(self.profiles.len(), counts)?;
        profile.prior = 1.0 / self.num_profiles as f64;
        if self.logspace {
            profile.transform_to_logspace();
        }
        self.profiles.push(profile);
        Ok(self.profiles.len() - 1)
    }

    pub fn full(&self) -> bool {
        self.profiles.len() == self.num_profiles
    }

    pub fn num_profiles(&self) -> usize {
        self.num_profiles
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

    pub fn logspace(&self) -> bool {
        self.logspace
    }

    pub fn profiles(&self) -> &[ContextProfile] {
        &self.profiles
    }

    pub fn profiles_mut(&mut self) -> &mut [ContextProfile] {
        &mut self.profiles
    }

    pub fn transform_to_logspace(&mut self) {
        if !self.logspace {
            for p in self.profiles.iter_mut() {
                p.transform_to_logspace();
            }
            self.logspace = true;
        }
    }

    pub fn transform_to_linspace(&mut self) {
        if self.logspace {
            for p in self.profiles.iter_mut() {
                p.transform_to_linspace();
            }
            self.logspace = false;
        }
    }

    pub fn read_from<P: AsRef<Path>>(path: P) -> Result<Self> {
        let mut text = String::new();
        File::open(&path)
            .with_context(|| format!("failed to open library file: {}", path.as_ref().display()))?
            .read_to_string(&mut text)?;
        text.parse()
    }

    pub fn write_to<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        let mut out = File::create(&path).with_context(|| {
            format!("failed to create library file: {}", path.as_ref().display())
        })?;
        out.write_all(self.to_string().as_bytes())?;
        Ok(())
    }
}

impl std::str::FromStr for ContextLibrary {
    type Err = anyhow::Error;

    fn from_str(text: &str) -> Result<Self> {
        let mut lines = text.lines().peekable();
        expect_tag(&mut lines, "ContextLibrary")?;
        let num_profiles = header_usize(&mut lines, "num_profiles")?;
        let num_cols = header_usize(&mut lines, "num_cols")?;
        let iterations = header_usize(&mut lines, "iterations")?;
        let logspace = header_usize(&mut lines, "logspace")? == 1;

        let mut lib = ContextLibrary::new(num_profiles, num_cols, Alphabet::Amino)?;
        lib.iterations = iterations;
        lib.logspace = logspace;

        while !lib.full() {
            if lines.peek().map(|l| l.trim().is_empty()) == Some(true) {
                lines.next();
                continue;
            }
            if lines.peek().is_none() {
                break;
            }
            let profile = ContextProfile::parse(&mut lines, logspace)?;
            if profile.num_cols() != num_cols {
                return Err(ProfileColumnsError {
                    expected: num_cols,
                    found: profile.num_cols(),
                }
                .into());
            }
            lib.alphabet = profile.alphabet();
            lib.profiles.push(profile);
        }
        if !lib.full() {
            return Err(ProfileCountError {
                expected: num_profiles,
                found: lib.profiles.len(),
            }
            .into());
        }

        Ok(lib)
    }
}

impl fmt::Display for ContextLibrary {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "ContextLibrary")?;
        writeln!(f, "num_profiles\t{}", self.num_profiles)?;
        writeln!(f, "num_cols\t{}", self.num_cols)?;
        writeln!(f, "iterations\t{}", self.iterations)?;
        writeln!(f, "logspace\t{}", if self.logspace { 1 } else { 0 })?;

        for profile in self.profiles.iter() {
            write!(f, "{profile}")?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::structs::Sequence;
    use approx::assert_relative_eq;
    use rand::SeedableRng;
    use rand_pcg::Pcg64;

    pub fn test_windows() -> Vec<CountProfile> {
        ["ACDEF", "GHIKL", "MNPQR", "STVWY", "AAAAA"]
            .iter()
            .map(|s| {
                CountProfile::from_sequence(
                    &Sequence::from_utf8(s.as_bytes(), Alphabet::Amino).unwrap(),
                )
            })
            .collect()
    }

    #[test]
    fn test_init_by_sampling() {
        let windows = test_windows();
        let mut rng = Pcg64::seed_from_u64(42);
        let lib =
            ContextLibrary::init_by_sampling(3, 5, Alphabet::Amino, &windows, &mut rng).unwrap();
        assert!(lib.full());
        for p in lib.profiles() {
            assert_relative_eq!(p.prior, 1.0 / 3.0);
        }
    }

    #[test]
    fn test_init_by_sampling_too_few() {
        let windows = test_windows();
        let mut rng = Pcg64::seed_from_u64(42);
        assert!(
            ContextLibrary::init_by_sampling(9, 5, Alphabet::Amino, &windows, &mut rng).is_err()
        );
    }

    #[test]
    fn test_add_past_capacity_is_error() {
        let windows = test_windows();
        let mut lib = ContextLibrary::new(1, 5, Alphabet::Amino).unwrap();
        lib.add(&windows[0]).unwrap();
        assert!(lib.add(&windows[1]).is_err());
    }

    #[test]
    fn test_add_wrong_columns_is_error() {
        let mut lib = ContextLibrary::new(2, 3, Alphabet::Amino).unwrap();
        assert!(lib.add(&test_windows()[0]).is_err());
    }

    #[test]
    fn test_serialization_round_trip() {
        let windows = test_windows();
        let mut rng = Pcg64::seed_from_u64(7);
        let mut lib =
            ContextLibrary::init_by_sampling(4, 5, Alphabet::Amino, &windows, &mut rng).unwrap();
        lib.iterations = 12;
        lib.transform_to_logspace();

        let text = lib.to_string();
        let parsed: ContextLibrary = text.parse().unwrap();
        assert_eq!(parsed.num_profiles(), 4);
        assert!(parsed.logspace());
        assert_eq!(parsed.iterations, 12);
        assert_eq!(parsed.to_string(), text);
    }

    #[test]
    fn test_canonical_text_format() {
        // the on-disk format pinned down: tag lines, header keys,
        // tab-delimited fixed-point columns (-log2(p) * 1000), and
        // the record terminator
        let ruler = crate::alphabet::AMINO_ALPHABET.join("\t");
        let uniform_row = "\t4322".repeat(20);
        let canonical = format!(
            "ContextLibrary\n\
             num_profiles\t1\n\
             num_cols\t1\n\
             iterations\t0\n\
             logspace\t0\n\
             ContextProfile\n\
             INDEX\t0\n\
             NCOLS\t1\n\
             ALPH\t20\n\
             PRIOR\t0\n\
             \t{ruler}\n\
             1{uniform_row}\n\
             PC{uniform_row}\n\
             //\n"
        );

        let lib: ContextLibrary = canonical.parse().unwrap();
        assert_eq!(lib.num_profiles(), 1);
        assert_eq!(lib.num_cols(), 1);
        assert!(!lib.logspace());
        assert_relative_eq!(lib.profiles()[0].prior, 1.0);
        // 4322 decodes to 2^-4.322, i.e. 0.05 up to quantization
        assert_relative_eq!(lib.profiles()[0].data[0][0], 0.05, epsilon = 1e-4);

        // deserialize -> serialize is byte-identical
        assert_eq!(lib.to_string(), canonical);
    }

    #[test]
    fn test_missing_profiles_is_error() {
        let windows = test_windows();
        let mut rng = Pcg64::seed_from_u64(7);
        let lib =
            ContextLibrary::init_by_sampling(4, 5, Alphabet::Amino, &windows, &mut rng).unwrap();
        let text = lib.to_string();
        // drop the last record
        let cut = text.rfind("ContextProfile").unwrap();
        assert!(text[..cut].parse::<ContextLibrary>().is_err());
    }
}
