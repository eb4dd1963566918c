use seq_io::fasta::{Reader, Record};
use std::fmt::{Debug, Display, Formatter};
use std::path::Path;

use crate::alphabet::{Alphabet, UTF8_SPACE};
use anyhow::{Context, Result};
use thiserror::Error;

#[derive(Error, Debug)]
#[error("unknown UTF8 sequence byte: {byte}")]
pub struct UnknownUtf8SequenceByteError {
    byte: u8,
}

#[derive(Error, Debug)]
#[error("unknown digital sequence byte: {byte}")]
pub struct UnknownDigitalSequenceByteError {
    byte: u8,
}

/// This holds both the "digital" data and string data of a
/// biological sequence.
#[derive(Clone)]
pub struct Sequence {
    /// The name of the sequence
    pub name: String,
    /// The sequence details. If the sequence comes from a fasta, this
    /// is the information following the sequence name in the header
    pub details: Option<String>,
    /// The sequence alphabet
    pub alphabet: Alphabet,
    /// The "digital" data of the sequence: string bytes mapped to
    /// alphabet indices, with degenerate letters collapsed onto the
    /// any-symbol
    pub digital: Vec<u8>,
    /// The string data of the sequence in the "normal" alphabet
    pub utf8: Vec<u8>,
}

impl Sequence {
    pub fn amino_from_fasta<P: AsRef<Path>>(path: P) -> Result<Vec<Self>> {
        let mut seqs: Vec<Self> = vec![];

        let mut reader = Reader::from_path(&path).with_context(|| {
            format!("failed to open fasta file: {}", path.as_ref().display())
        })?;

        while let Some(record) = reader.next() {
            let record = record.with_context(|| "failed to read fasta record")?;
            let mut header_bytes = record.head().to_vec();
            let first_space_idx = header_bytes.iter().position(|&b| b == UTF8_SPACE);

            let error_context: fn() -> &'static str =
                || "failed to create String from fasta header bytes";

            let (name, details) = match first_space_idx {
                Some(idx) => {
                    let details_bytes = header_bytes.split_off(idx + 1);
                    header_bytes.pop();
                    (
                        String::from_utf8(header_bytes).with_context(error_context)?,
                        Some(String::from_utf8(details_bytes).with_context(error_context)?),
                    )
                }
                None => (
                    String::from_utf8(header_bytes).with_context(error_context)?,
                    None,
                ),
            };

            let mut utf8: Vec<u8> = vec![];
            for line in record.seq_lines() {
                utf8.extend_from_slice(line);
            }

            let mut seq = Sequence::from_utf8(&utf8, Alphabet::Amino)?;
            seq.name = name;
            seq.details = details;
            seqs.push(seq);
        }
        Ok(seqs)
    }

    pub fn from_utf8(bytes: &[u8], alphabet: Alphabet) -> Result<Self> {
        let mut digital: Vec<u8> = vec![0; bytes.len()];

        for (idx, utf8_byte) in bytes.iter().enumerate() {
            match alphabet.to_digital(*utf8_byte) {
                Some(b) => digital[idx] = b,
                None => return Err(UnknownUtf8SequenceByteError { byte: *utf8_byte }.into()),
            }
        }

        Ok(Sequence {
            name: "".to_string(),
            details: None,
            alphabet,
            digital,
            utf8: bytes.to_vec(),
        })
    }

    pub fn from_digital(bytes: &[u8], alphabet: Alphabet) -> Result<Self> {
        let mut utf8: Vec<u8> = vec![0; bytes.len()];

        for (idx, digital_byte) in bytes.iter().enumerate() {
            match alphabet.to_utf8(*digital_byte) {
                Some(b) => utf8[idx] = b,
                None => {
                    return Err(UnknownDigitalSequenceByteError {
                        byte: *digital_byte,
                    }
                    .into())
                }
            }
        }

        Ok(Sequence {
            name: "".to_string(),
            details: None,
            alphabet,
            digital: bytes.to_vec(),
            utf8,
        })
    }

    pub fn len(&self) -> usize {
        self.digital.len()
    }

    pub fn is_empty(&self) -> bool {
        self.digital.is_empty()
    }

    /// The full window of odd length `wlen` centered on `center`,
    /// or None when the window would cross a sequence boundary.
    pub fn full_window(&self, center: usize, wlen: usize) -> Option<&[u8]> {
        let half = (wlen - 1) / 2;
        if center < half || center + half >= self.len() {
            return None;
        }
        Some(&self.digital[center - half..=center + half])
    }
}

impl Display for Sequence {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, ">{}", self.name)?;

        if let Some(ref details) = self.details {
            write!(f, " {details}")?
        };

        writeln!(f)?;

        let mut iter = self.utf8.chunks(80).peekable();

        while let Some(byte_chunk) = iter.next() {
            match std::str::from_utf8(byte_chunk) {
                Ok(seq_line) => {
                    write!(f, "{}", seq_line)?;
                    if iter.peek().is_some() {
                        writeln!(f)?;
                    }
                }
                Err(_) => return Err(std::fmt::Error),
            }
        }
        Ok(())
    }
}

impl Debug for Sequence {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", std::str::from_utf8(&self.utf8).unwrap())?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::alphabet::AMINO_ANY;

    #[test]
    fn test_from_utf8_round_trip() {
        let seq = Sequence::from_utf8(b"ACDEFGHIKLMNPQRSTVWY", Alphabet::Amino).unwrap();
        assert_eq!(seq.len(), 20);
        for (idx, &d) in seq.digital.iter().enumerate() {
            assert_eq!(d as usize, idx);
        }
        let back = Sequence::from_digital(&seq.digital, Alphabet::Amino).unwrap();
        assert_eq!(back.utf8, seq.utf8);
    }

    #[test]
    fn test_degenerate_byte() {
        let seq = Sequence::from_utf8(b"AXC", Alphabet::Amino).unwrap();
        assert_eq!(seq.digital[1], AMINO_ANY);
    }

    #[test]
    fn test_unknown_byte_is_error() {
        assert!(Sequence::from_utf8(b"AC7", Alphabet::Amino).is_err());
    }

    #[test]
    fn test_full_window() {
        let seq = Sequence::from_utf8(b"ACDEF", Alphabet::Amino).unwrap();
        assert_eq!(seq.full_window(2, 5).unwrap(), seq.digital.as_slice());
        assert_eq!(seq.full_window(2, 3).unwrap(), &seq.digital[1..4]);
        assert!(seq.full_window(1, 5).is_none());
        assert!(seq.full_window(3, 5).is_none());
    }
}
