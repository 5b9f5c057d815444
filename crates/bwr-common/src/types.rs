//! Small domain types shared by the parsers and fetchers

use serde::{Deserialize, Serialize};
use std::str::FromStr;

use crate::error::BwrError;

/// Strand of a genomic feature
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
pub enum Strand {
    Forward,
    Reverse,
    /// `.` in GFF/BED, also used for `?`
    #[default]
    Unknown,
}

impl Strand {
    pub fn is_reverse(self) -> bool {
        self == Strand::Reverse
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Strand::Forward => "+",
            Strand::Reverse => "-",
            Strand::Unknown => ".",
        }
    }
}

impl FromStr for Strand {
    type Err = BwrError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "+" => Ok(Strand::Forward),
            "-" => Ok(Strand::Reverse),
            "." | "?" => Ok(Strand::Unknown),
            other => Err(BwrError::invalid_input(format!("invalid strand '{other}'"))),
        }
    }
}

impl std::fmt::Display for Strand {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Checksum algorithm type
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ChecksumAlgorithm {
    Md5,
    Sha256,
}

impl std::fmt::Display for ChecksumAlgorithm {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ChecksumAlgorithm::Md5 => write!(f, "md5"),
            ChecksumAlgorithm::Sha256 => write!(f, "sha256"),
        }
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;

    #[test]
    fn test_strand_round_trip() {
        for s in ["+", "-", "."] {
            assert_eq!(s.parse::<Strand>().unwrap().to_string(), s);
        }
        assert_eq!("?".parse::<Strand>().unwrap(), Strand::Unknown);
        assert!("x".parse::<Strand>().is_err());
    }
}
