//! Shared plumbing for the text record formats: fixed-point
//! log-scale encoding and line/token helpers.

use anyhow::{Context, Result};
use thiserror::Error;

/// Fixed-point scale for serialized scores: a value v is stored as
/// the integer -round(v * LOG_SCALE).
pub const LOG_SCALE: f64 = 1000.0;

/// Record terminator line.
pub const RECORD_END: &str = "//";

#[derive(Error, Debug)]
#[error("record does not contain '{key}' header")]
pub struct MissingHeaderError {
    pub key: &'static str,
}

#[derive(Error, Debug)]
#[error("record does not start with '{tag}' tag")]
pub struct MissingTagError {
    pub tag: &'static str,
}

#[derive(Error, Debug)]
#[error("record body ended before '{RECORD_END}' terminator")]
pub struct TruncatedRecordError;

#[derive(Error, Debug)]
#[error("body line has {found} fields but should have {expected}")]
pub struct BodyFieldCountError {
    pub expected: usize,
    pub found: usize,
}

pub fn iround(x: f64) -> i64 {
    (x + 0.5).floor() as i64
}

/// Encodes a log-scale value (a log2 probability or a raw weight)
/// as a fixed-point integer token, with "*" for -inf.
pub fn encode_fixed(v: f64) -> String {
    if v == -f64::INFINITY {
        "*".to_string()
    } else {
        (-iround(v * LOG_SCALE)).to_string()
    }
}

/// Inverse of [`encode_fixed`].
pub fn decode_fixed(token: &str) -> Result<f64> {
    if token == "*" {
        return Ok(-f64::INFINITY);
    }
    let i: i64 = token
        .parse()
        .with_context(|| format!("failed to parse fixed-point token \"{token}\""))?;
    Ok(-(i as f64) / LOG_SCALE)
}

/// Encodes a linear-scale value (e.g. a Neff column) as a
/// fixed-point integer token.
pub fn encode_linear(v: f64) -> String {
    iround(v * LOG_SCALE).to_string()
}

pub fn decode_linear(token: &str) -> Result<f64> {
    let i: i64 = token
        .parse()
        .with_context(|| format!("failed to parse fixed-point token \"{token}\""))?;
    Ok(i as f64 / LOG_SCALE)
}

/// Pulls the next non-empty line off the iterator.
pub fn next_line<'a, I>(lines: &mut I) -> Option<&'a str>
where
    I: Iterator<Item = &'a str>,
{
    lines.find(|line| !line.trim().is_empty())
}

/// Consumes the record tag line.
pub fn expect_tag<'a, I>(lines: &mut I, tag: &'static str) -> Result<()>
where
    I: Iterator<Item = &'a str>,
{
    match next_line(lines) {
        Some(line) if line.trim() == tag => Ok(()),
        _ => Err(MissingTagError { tag }.into()),
    }
}

/// Reads a "KEY\tvalue" header line and returns the value slice.
pub fn header_value<'a, I>(lines: &mut I, key: &'static str) -> Result<&'a str>
where
    I: Iterator<Item = &'a str>,
{
    let line = next_line(lines).ok_or(MissingHeaderError { key })?;
    let mut tokens = line.split_whitespace();
    match tokens.next() {
        Some(tok) if tok == key => {}
        _ => return Err(MissingHeaderError { key }.into()),
    }
    tokens.next().ok_or_else(|| MissingHeaderError { key }.into())
}

pub fn header_usize<'a, I>(lines: &mut I, key: &'static str) -> Result<usize>
where
    I: Iterator<Item = &'a str>,
{
    header_value(lines, key)?
        .parse()
        .with_context(|| format!("failed to parse '{key}' header as integer"))
}
