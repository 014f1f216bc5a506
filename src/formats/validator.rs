//! Cross-record validation.
//!
//! Field-level conformance (column counts, type coercion) is enforced by
//! the codec as each line is parsed. What remains are the invariants that
//! span records:
//!
//! - haplotype IDs are unique within a file
//! - every variant's haplotype reference resolves within the same set
//! - for indexing: records are sorted by (line type, name, start, end)
//!   ascending, and no name is used both as a chromosome and as a
//!   haplotype ID
//!
//! [`Validator`] is the incremental form: feed it records as they stream
//! by, then call [`Validator::finish`]. In [`ValidationMode::WholeFile`]
//! unresolved variant references are buffered and reported in aggregate at
//! the end, since a variant may legally precede its haplotype in an
//! unsorted file. [`ValidationMode::Streaming`] is for sorted input, where
//! every `H` line precedes the `V` lines that reference it, so a reference
//! to an unseen haplotype is immediately an error.

use crate::error::{DanglingRef, HapError, Result};
use crate::formats::record::HapRecord;
use crate::formats::schema::LineType;
use std::collections::{HashMap, HashSet};

/// When unresolved variant references are reported.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ValidationMode {
    /// Buffer unresolved references; report them all at `finish`.
    WholeFile,
    /// Report an unresolved reference at first detection. Only valid for
    /// files in sorted order, where haplotypes precede their variants.
    Streaming,
}

/// Incremental cross-record validator.
#[derive(Debug)]
pub struct Validator {
    mode: ValidationMode,
    /// Haplotype ID → line it was declared on
    haplotypes: HashMap<String, u64>,
    /// Variant references not yet resolved (WholeFile mode)
    unresolved: Vec<DanglingRef>,
}

impl Validator {
    /// Creates a validator in the given mode.
    pub fn new(mode: ValidationMode) -> Self {
        Validator {
            mode,
            haplotypes: HashMap::new(),
            unresolved: Vec::new(),
        }
    }

    /// Feeds one record, with its 1-based line number for diagnostics.
    ///
    /// # Errors
    ///
    /// [`HapError::DuplicateHaplotype`] immediately on a repeated ID; in
    /// streaming mode, [`HapError::DanglingVariants`] immediately on a
    /// reference to a haplotype not yet seen.
    pub fn observe(&mut self, record: &HapRecord, line: u64) -> Result<()> {
        match record {
            HapRecord::Haplotype(h) => {
                if self.haplotypes.insert(h.id.clone(), line).is_some() {
                    return Err(HapError::DuplicateHaplotype {
                        line,
                        id: h.id.clone(),
                    });
                }
            }
            HapRecord::Variant(v) => {
                if !self.haplotypes.contains_key(&v.haplotype) {
                    let dangling = DanglingRef {
                        variant: v.id.clone(),
                        haplotype: v.haplotype.clone(),
                        line,
                    };
                    match self.mode {
                        ValidationMode::Streaming => {
                            return Err(HapError::DanglingVariants {
                                refs: vec![dangling],
                            });
                        }
                        ValidationMode::WholeFile => self.unresolved.push(dangling),
                    }
                }
            }
        }
        Ok(())
    }

    /// Resolves deferred checks.
    ///
    /// # Errors
    ///
    /// [`HapError::DanglingVariants`] carrying every reference that still
    /// fails to resolve, in file order.
    pub fn finish(self) -> Result<()> {
        let refs: Vec<DanglingRef> = self
            .unresolved
            .into_iter()
            .filter(|d| !self.haplotypes.contains_key(&d.haplotype))
            .collect();
        if refs.is_empty() {
            Ok(())
        } else {
            Err(HapError::DanglingVariants { refs })
        }
    }
}

/// Whole-file validation of an in-memory record sequence.
///
/// Line numbers in errors are 1-based positions within `records`.
pub fn validate_records(records: &[HapRecord]) -> Result<()> {
    let mut validator = Validator::new(ValidationMode::WholeFile);
    for (i, record) in records.iter().enumerate() {
        validator.observe(record, i as u64 + 1)?;
    }
    validator.finish()
}

/// Checks index-compatible sort order: (line type, name, start, end)
/// ascending, names compared bytewise.
///
/// # Errors
///
/// [`HapError::UnsortedFile`] naming the first out-of-order position
/// (1-based within `records`).
pub fn check_sorted(records: &[HapRecord]) -> Result<()> {
    for (i, pair) in records.windows(2).enumerate() {
        let (prev, next) = (&pair[0], &pair[1]);
        if next.sort_key() < prev.sort_key() {
            return Err(unsorted_error(prev, next, i as u64 + 2));
        }
    }
    Ok(())
}

pub(crate) fn unsorted_error(prev: &HapRecord, next: &HapRecord, line: u64) -> HapError {
    let msg = if next.line_type() < prev.line_type() {
        format!(
            "{} line after the first {} line",
            next.line_type(),
            prev.line_type()
        )
    } else if next.name() < prev.name() {
        format!("name '{}' after '{}'", next.name(), prev.name())
    } else {
        format!(
            "interval {}-{} after {}-{} on '{}'",
            next.start(),
            next.end(),
            prev.start(),
            prev.end(),
            next.name()
        )
    };
    HapError::UnsortedFile { line, msg }
}

/// Full index-readiness check: sorted order plus disjoint chromosome and
/// haplotype-ID namespaces. Both are required before the shared name
/// column can serve as the index's contig key.
pub fn ensure_index_ready(records: &[HapRecord]) -> Result<()> {
    check_sorted(records)?;
    let chroms: HashSet<&str> = records
        .iter()
        .filter(|r| r.line_type() == LineType::Haplotype)
        .map(|r| r.name())
        .collect();
    for record in records {
        if let HapRecord::Haplotype(h) = record {
            if chroms.contains(h.id.as_str()) {
                return Err(HapError::ContigCollision { name: h.id.clone() });
            }
        }
    }
    Ok(())
}
