//! Cadence patterns.
//!
//! A pattern of `2k` letters describes one block of `k` telecined frames:
//! letters at even positions label the even fields of frames `0..k`,
//! letters at odd positions label their odd fields. Each label names a
//! reconstructed frame, `A` being the first one of the block. `"AABBBCCDDD"`
//! is the classic 3:2 pulldown, where five telecined frames carry four
//! film frames.

use framemap_core::{Error, Result};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Field parity.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Parity {
    /// Even lines (0, 2, 4, ...).
    Even,
    /// Odd lines (1, 3, 5, ...).
    Odd,
}

impl Parity {
    /// Both parities, even first.
    pub const BOTH: [Parity; 2] = [Parity::Even, Parity::Odd];

    /// 0 for even, 1 for odd.
    pub fn index(self) -> usize {
        match self {
            Parity::Even => 0,
            Parity::Odd => 1,
        }
    }

    /// Parity of field number `f` (fields alternate even/odd).
    pub fn of_field(f: usize) -> Self {
        if f % 2 == 0 {
            Parity::Even
        } else {
            Parity::Odd
        }
    }
}

/// A validated cadence pattern.
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct Pattern {
    text: String,
    evens: Vec<usize>,
    odds: Vec<usize>,
    new_blksize: usize,
}

impl Pattern {
    /// Parse and validate a pattern.
    pub fn parse(text: &str) -> Result<Self> {
        if text.is_empty() || text.len() % 2 != 0 {
            return Err(Error::config(format!(
                "pattern {:?} must have a positive even length",
                text
            )));
        }
        if let Some(c) = text.chars().find(|c| !c.is_ascii_uppercase()) {
            return Err(Error::config(format!(
                "pattern {:?} contains {:?}, labels must be letters A-Z",
                text, c
            )));
        }
        let bytes = text.as_bytes();
        if bytes[0] != b'A' && bytes[1] != b'A' {
            return Err(Error::config(format!(
                "pattern {:?} must start its first frame with label A",
                text
            )));
        }

        let labels: Vec<usize> = bytes.iter().map(|&b| (b - b'A') as usize).collect();
        let new_blksize = labels.iter().max().map_or(0, |&m| m + 1);
        if let Some(missing) = (0..new_blksize).find(|l| !labels.contains(l)) {
            return Err(Error::config(format!(
                "pattern {:?} skips label {}",
                text,
                (b'A' + missing as u8) as char
            )));
        }

        Ok(Self {
            text: text.to_string(),
            evens: labels.iter().step_by(2).copied().collect(),
            odds: labels.iter().skip(1).step_by(2).copied().collect(),
            new_blksize,
        })
    }

    /// `"AA"`: one progressive frame per block, passed through unchanged.
    pub fn progressive() -> Self {
        Self {
            text: "AA".to_string(),
            evens: vec![0],
            odds: vec![0],
            new_blksize: 1,
        }
    }

    /// Pattern text.
    pub fn as_str(&self) -> &str {
        &self.text
    }

    /// Telecined frames per block.
    pub fn old_blksize(&self) -> usize {
        self.evens.len()
    }

    /// Reconstructed frames per block.
    pub fn new_blksize(&self) -> usize {
        self.new_blksize
    }

    /// Label of field `parity` of frame `j` of a block.
    pub fn label(&self, j: usize, parity: Parity) -> usize {
        match parity {
            Parity::Even => self.evens[j],
            Parity::Odd => self.odds[j],
        }
    }

    /// Check whether blended reconstruction is supported: the block must
    /// open with a frame whose two fields belong to `A`.
    pub fn is_blend_compatible(&self) -> bool {
        self.text.starts_with("AA")
    }
}

impl fmt::Debug for Pattern {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Pattern({})", self.text)
    }
}

impl fmt::Display for Pattern {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.text)
    }
}

impl TryFrom<String> for Pattern {
    type Error = Error;

    fn try_from(text: String) -> Result<Self> {
        Self::parse(&text)
    }
}

impl From<Pattern> for String {
    fn from(pattern: Pattern) -> String {
        pattern.text
    }
}
