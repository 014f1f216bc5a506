//! Error types for hapfile

use crate::formats::schema::LineType;
use thiserror::Error;

/// Result type alias for hapfile operations
pub type Result<T> = std::result::Result<T, HapError>;

/// A single unresolved variant→haplotype reference.
///
/// Collected by whole-file validation, which reports every dangling
/// reference at once rather than stopping at the first.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DanglingRef {
    /// ID of the variant record holding the reference
    pub variant: String,
    /// The haplotype ID that failed to resolve
    pub haplotype: String,
    /// Line number of the variant record (1-based)
    pub line: u64,
}

/// Error types that can occur in hapfile
#[derive(Debug, Error)]
pub enum HapError {
    /// I/O error
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Wrong column count or an unparseable mandatory field.
    #[error("malformed line {line}: {msg}")]
    MalformedLine {
        /// Line number where the error occurred (1-based)
        line: u64,
        /// What was wrong with the line
        msg: String,
    },

    /// An extra-field value does not parse under its declared format tag.
    #[error("line {line}: value {value:?} for field '{field}' does not conform to format tag '{tag}'")]
    TypeCoercion {
        /// Line number where the error occurred (1-based)
        line: u64,
        /// Name of the extra field
        field: String,
        /// The declared format tag
        tag: String,
        /// The offending textual value
        value: String,
    },

    /// The schema declares the same field name twice for one line type.
    #[error("field '{name}' is already declared for {line_type} lines")]
    DuplicateField {
        /// Line type of the duplicate declaration
        line_type: LineType,
        /// The duplicated field name
        name: String,
    },

    /// A data line carries more extra columns than its line type declares.
    #[error("line {line}: {line_type} record has {actual} column(s) but only {expected} are declared")]
    UndeclaredField {
        /// Line number where the error occurred (1-based)
        line: u64,
        /// Line type of the offending record
        line_type: LineType,
        /// Expected total column count (mandatory + declared extras)
        expected: usize,
        /// Actual column count found
        actual: usize,
    },

    /// Two haplotype records share the same ID.
    #[error("line {line}: duplicate haplotype ID '{id}'")]
    DuplicateHaplotype {
        /// Line number of the second occurrence (1-based)
        line: u64,
        /// The duplicated haplotype ID
        id: String,
    },

    /// One or more variants reference a haplotype that is not present.
    #[error("{}", dangling_summary(.refs))]
    DanglingVariants {
        /// Every unresolved reference, in file order. Never empty.
        refs: Vec<DanglingRef>,
    },

    /// Index construction or an indexed query was requested over a file
    /// that is not in (line type, name, start, end) ascending order.
    #[error("file is not sorted for indexing: line {line}: {msg}")]
    UnsortedFile {
        /// First out-of-order line (1-based)
        line: u64,
        /// Which ordering rule was violated
        msg: String,
    },

    /// A haplotype ID collides with a chromosome name, which would make
    /// region queries over the shared name column ambiguous.
    #[error("name '{name}' is used both as a chromosome and as a haplotype ID")]
    ContigCollision {
        /// The colliding name
        name: String,
    },

    /// Invalid region specification (bad syntax or start > end).
    #[error("invalid region: {0}")]
    InvalidRegion(String),

    /// Corrupt or truncated block-compressed data or index sidecar.
    #[error("invalid index data: {0}")]
    InvalidIndex(String),
}

fn dangling_summary(refs: &[DanglingRef]) -> String {
    match refs.first() {
        Some(first) => format!(
            "{} variant record(s) reference unknown haplotypes (first: variant '{}' at line {} references '{}')",
            refs.len(),
            first.variant,
            first.line,
            first.haplotype
        ),
        None => "variant records reference unknown haplotypes".to_string(),
    }
}
