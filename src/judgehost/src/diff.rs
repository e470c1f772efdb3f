//! Default grading when no output validator is configured.
//!
//! Group validator flags are interpreted as tolerance options:
//! - `case_sensitive`
//! - `space_change_sensitive`
//! - `float_tolerance <v>` (sets both tolerances)
//! - `float_relative_tolerance <v>`
//! - `float_absolute_tolerance <v>`
use crate::error::EvalError;
use std::{
    fmt::Debug,
    fs,
    io::{self, Read},
    num::ParseFloatError,
    path::Path,
};

#[derive(Debug, thiserror::Error)]
pub enum DiffFlagError {
    #[error("flag {flag} requires a value")]
    MissingValue { flag: String },
    #[error("flag {flag}: value {value:?} is not a number")]
    BadNumber {
        flag: String,
        value: String,
        #[source]
        source: ParseFloatError,
    },
    #[error("unknown flag {0}")]
    Unknown(String),
}

#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct DiffArgs {
    pub case_sensitive: bool,
    pub space_sensitive: bool,
    pub relative_prec: f64,
    pub absolute_prec: f64,
}

impl DiffArgs {
    pub fn from_flags(flags: &[String]) -> Result<DiffArgs, DiffFlagError> {
        let mut args = DiffArgs::default();
        let mut it = flags.iter();
        while let Some(flag) = it.next() {
            match flag.as_str() {
                "case_sensitive" => args.case_sensitive = true,
                "space_change_sensitive" => args.space_sensitive = true,
                "float_tolerance" | "float_relative_tolerance" | "float_absolute_tolerance" => {
                    let value = it.next().ok_or_else(|| DiffFlagError::MissingValue {
                        flag: flag.clone(),
                    })?;
                    let tolerance: f64 =
                        value.parse().map_err(|source| DiffFlagError::BadNumber {
                            flag: flag.clone(),
                            value: value.clone(),
                            source,
                        })?;
                    if flag != "float_absolute_tolerance" {
                        args.relative_prec = tolerance;
                    }
                    if flag != "float_relative_tolerance" {
                        args.absolute_prec = tolerance;
                    }
                }
                other => return Err(DiffFlagError::Unknown(other.to_string())),
            }
        }
        Ok(args)
    }

    fn has_float_tolerance(&self) -> bool {
        self.relative_prec > 0.0 || self.absolute_prec > 0.0
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DiffResult {
    pub matched: bool,
    pub description: String,
}

/// Compares a reference answer with produced output
pub trait DiffEngine: Debug + Send + Sync {
    fn diff(
        &self,
        reference: &mut dyn Read,
        produced: &mut dyn Read,
        args: &DiffArgs,
    ) -> io::Result<DiffResult>;
}

/// Token-wise comparison with optional numeric tolerance.
///
/// Case-insensitive mode compares Unicode lowercase forms.
#[derive(Debug, Clone, Copy, Default)]
pub struct TokenDiff;

fn tokenize(data: &str, keep_space: bool) -> Vec<&str> {
    if !keep_space {
        return data.split_whitespace().collect();
    }
    let mut tokens = Vec::new();
    let mut start = 0;
    let mut in_space = None;
    for (pos, ch) in data.char_indices() {
        let space = ch.is_whitespace();
        if in_space != Some(space) {
            if pos > start {
                tokens.push(&data[start..pos]);
            }
            start = pos;
            in_space = Some(space);
        }
    }
    if start < data.len() {
        tokens.push(&data[start..]);
    }
    tokens
}

fn tokens_match(expected: &str, got: &str, args: &DiffArgs) -> bool {
    let same_text = if args.case_sensitive {
        expected == got
    } else {
        let lower = |s: &str| s.chars().flat_map(char::to_lowercase).collect::<Vec<_>>();
        lower(expected) == lower(got)
    };
    if same_text {
        return true;
    }
    if !args.has_float_tolerance() {
        return false;
    }
    match (expected.parse::<f64>(), got.parse::<f64>()) {
        (Ok(e), Ok(g)) if e.is_finite() && g.is_finite() => {
            let delta = (e - g).abs();
            delta <= args.absolute_prec || delta <= args.relative_prec * e.abs()
        }
        _ => false,
    }
}

fn show(token: &str) -> String {
    format!("{:?}", token)
}

impl DiffEngine for TokenDiff {
    fn diff(
        &self,
        reference: &mut dyn Read,
        produced: &mut dyn Read,
        args: &DiffArgs,
    ) -> io::Result<DiffResult> {
        let mut expected = String::new();
        reference.read_to_string(&mut expected)?;
        let mut got = Vec::new();
        produced.read_to_end(&mut got)?;
        let got = String::from_utf8_lossy(&got);

        let expected = tokenize(&expected, args.space_sensitive);
        let got = tokenize(&got, args.space_sensitive);
        for (idx, (e, g)) in expected.iter().zip(got.iter()).enumerate() {
            if !tokens_match(e, g, args) {
                return Ok(DiffResult {
                    matched: false,
                    description: format!(
                        "token {}: expected {}, got {}",
                        idx + 1,
                        show(e),
                        show(g)
                    ),
                });
            }
        }
        let description = if got.len() < expected.len() {
            format!(
                "output ended early: expected {} at token {}",
                show(expected[got.len()]),
                got.len() + 1
            )
        } else if got.len() > expected.len() {
            format!(
                "trailing output: {} at token {}",
                show(got[expected.len()]),
                expected.len() + 1
            )
        } else {
            return Ok(DiffResult {
                matched: true,
                description: "output matches".to_string(),
            });
        };
        Ok(DiffResult {
            matched: false,
            description,
        })
    }
}

/// Compares the reference answer at `ref_path` with output at `out_path`
pub fn diff_output(
    engine: &dyn DiffEngine,
    ref_path: &Path,
    out_path: &Path,
    flags: &[String],
) -> Result<DiffResult, EvalError> {
    let args = DiffArgs::from_flags(flags)?;
    let mut reference = fs::File::open(ref_path).map_err(EvalError::Diff)?;
    let mut produced = fs::File::open(out_path).map_err(EvalError::Diff)?;
    engine
        .diff(&mut reference, &mut produced, &args)
        .map_err(EvalError::Diff)
}
