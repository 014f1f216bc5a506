//! Query regions for indexed access.
//!
//! A region addresses the name column of a .hap file: a chromosome (to
//! fetch haplotypes) or a haplotype ID (to fetch its variants). The text
//! forms are the usual samtools-style `name:start-end` and bare `name` for
//! the whole contig.

use crate::error::{HapError, Result};
use std::fmt;
use std::str::FromStr;

/// A contig name plus an inclusive interval.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Region {
    /// Chromosome name or haplotype ID (the file's name column)
    pub contig: String,
    /// Inclusive query start
    pub start: u64,
    /// Inclusive query end
    pub end: u64,
}

impl Region {
    /// A bounded region. Fails if `start > end`.
    pub fn new(contig: impl Into<String>, start: u64, end: u64) -> Result<Self> {
        if start > end {
            return Err(HapError::InvalidRegion(format!(
                "start ({}) is greater than end ({})",
                start, end
            )));
        }
        Ok(Region {
            contig: contig.into(),
            start,
            end,
        })
    }

    /// The whole of one contig.
    pub fn contig(name: impl Into<String>) -> Self {
        Region {
            contig: name.into(),
            start: 0,
            end: u64::MAX,
        }
    }

    /// Whether this region spans its entire contig.
    pub fn is_whole_contig(&self) -> bool {
        self.start == 0 && self.end == u64::MAX
    }
}

impl FromStr for Region {
    type Err = HapError;

    /// Parses `"chr1:1234-34566"` or `"chr7"`.
    fn from_str(s: &str) -> Result<Self> {
        let bad = || HapError::InvalidRegion(format!("{:?} (expected 'name' or 'name:start-end')", s));
        match s.split_once(':') {
            None => {
                if s.is_empty() {
                    return Err(bad());
                }
                Ok(Region::contig(s))
            }
            Some((contig, span)) => {
                if contig.is_empty() {
                    return Err(bad());
                }
                let (start, end) = span.split_once('-').ok_or_else(bad)?;
                let start: u64 = start.parse().map_err(|_| bad())?;
                let end: u64 = end.parse().map_err(|_| bad())?;
                Region::new(contig, start, end)
            }
        }
    }
}

impl fmt::Display for Region {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.is_whole_contig() {
            write!(f, "{}", self.contig)
        } else {
            write!(f, "{}:{}-{}", self.contig, self.start, self.end)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_bounded() {
        let region: Region = "chr1:1234-34566".parse().unwrap();
        assert_eq!(region.contig, "chr1");
        assert_eq!(region.start, 1234);
        assert_eq!(region.end, 34566);
        assert_eq!(region.to_string(), "chr1:1234-34566");
    }

    #[test]
    fn test_parse_whole_contig() {
        let region: Region = "chr7".parse().unwrap();
        assert!(region.is_whole_contig());
        assert_eq!(region.to_string(), "chr7");
    }

    #[test]
    fn test_parse_rejects_garbage() {
        for bad in ["", ":100-200", "chr1:", "chr1:100", "chr1:a-b", "chr1:200-100"] {
            assert!(bad.parse::<Region>().is_err(), "{:?} should not parse", bad);
        }
    }

    #[test]
    fn test_new_checks_order() {
        assert!(Region::new("chr1", 200, 100).is_err());
        assert!(Region::new("chr1", 100, 100).is_ok());
    }
}
