//! Named line transforms the CLI can run over its input.

use std::fmt;
use std::str::FromStr;

use prim_core::PrimError;
use sha2::{Digest, Sha256};

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Op {
    Upper,
    Lower,
    Trim,
    Reverse,
    Sha256,
    Int,
    NonEmpty,
}

impl Op {
    pub const ALL: [Op; 7] = [
        Op::Upper,
        Op::Lower,
        Op::Trim,
        Op::Reverse,
        Op::Sha256,
        Op::Int,
        Op::NonEmpty,
    ];

    pub fn name(self) -> &'static str {
        match self {
            Op::Upper => "upper",
            Op::Lower => "lower",
            Op::Trim => "trim",
            Op::Reverse => "reverse",
            Op::Sha256 => "sha256",
            Op::Int => "int",
            Op::NonEmpty => "nonempty",
        }
    }

    pub fn describe(self) -> &'static str {
        match self {
            Op::Upper => "uppercase the line",
            Op::Lower => "lowercase the line",
            Op::Trim => "strip leading and trailing whitespace",
            Op::Reverse => "reverse the characters of the line",
            Op::Sha256 => "hex SHA-256 digest of the line",
            Op::Int => "normalize a decimal integer; fails on anything else",
            Op::NonEmpty => "pass the line through; fails on blank lines",
        }
    }

    pub fn run(self, line: &str) -> Result<String, PrimError> {
        match self {
            Op::Upper => Ok(line.to_uppercase()),
            Op::Lower => Ok(line.to_lowercase()),
            Op::Trim => Ok(line.trim().to_string()),
            Op::Reverse => Ok(line.chars().rev().collect()),
            Op::Sha256 => Ok(format!("{:x}", Sha256::digest(line.as_bytes()))),
            Op::Int => line
                .trim()
                .parse::<i128>()
                .map(|n| n.to_string())
                .map_err(|e| PrimError::msg(format!("not an integer {:?}: {}", line, e))),
            Op::NonEmpty => {
                if line.trim().is_empty() {
                    Err(PrimError::msg("blank line"))
                } else {
                    Ok(line.to_string())
                }
            }
        }
    }
}

impl fmt::Display for Op {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for Op {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Op::ALL
            .iter()
            .copied()
            .find(|op| op.name() == s)
            .ok_or_else(|| format!("unknown op '{}'", s))
    }
}
