//! Extra-field schema declarations for .hap files.
//!
//! Beyond its mandatory columns, each line type of a .hap file may carry
//! additional typed columns. Which ones, in what order, and with what type
//! is fixed by *schema declaration* lines in the header:
//!
//! ```text
//! #H	ancestry	s	Ancestral population of the haplotype
//! #V	score	.2f	Per-variant quality score
//! ```
//!
//! Declarations for a line type are ordered; that order is the column order
//! of the extra fields on every data line of that type. The [`Schema`] is
//! built once, from the header or by the caller, and never changes while a
//! file is being read or written.
//!
//! # Format tags
//!
//! The closed set of tags follows the original format's printf-flavored
//! vocabulary:
//!
//! | tag    | kind    | rendering            |
//! |--------|---------|----------------------|
//! | `d`    | integer | decimal              |
//! | `s`    | string  | verbatim             |
//! | `.Nf`  | float   | exactly `N` decimals |
//!
//! # Examples
//!
//! ```
//! use hapfile::formats::schema::{FieldType, LineType, Schema};
//!
//! let mut schema = Schema::new();
//! schema.declare(LineType::Haplotype, "beta", FieldType::Float { precision: 2 }, "Effect size")?;
//! schema.declare(LineType::Variant, "score", FieldType::Integer, "Quality score")?;
//!
//! assert_eq!(schema.fields_for(LineType::Haplotype).len(), 1);
//! assert_eq!(schema.fields_for(LineType::Variant)[0].name, "score");
//! # Ok::<(), hapfile::HapError>(())
//! ```

use crate::error::{HapError, Result};
use std::fmt;
use std::str::FromStr;

/// The two data line types of a .hap file.
///
/// Ordering matters: all `H` lines sort before all `V` lines in an
/// index-compatible file, which `derive(PartialOrd, Ord)` captures here.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum LineType {
    /// `H` line: a named genomic interval representing one haplotype
    Haplotype,
    /// `V` line: a variant belonging to exactly one haplotype
    Variant,
}

impl LineType {
    /// The single-character type symbol used in column 1.
    pub fn symbol(&self) -> char {
        match self {
            LineType::Haplotype => 'H',
            LineType::Variant => 'V',
        }
    }

    /// Number of mandatory columns after the type symbol.
    ///
    /// `H`: chrom, start, end, ID. `V`: haplotype ID, start, end, ID, allele.
    pub fn mandatory_columns(&self) -> usize {
        match self {
            LineType::Haplotype => 4,
            LineType::Variant => 5,
        }
    }
}

impl FromStr for LineType {
    type Err = HapError;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "H" => Ok(LineType::Haplotype),
            "V" => Ok(LineType::Variant),
            _ => Err(HapError::MalformedLine {
                line: 0,
                msg: format!("unknown line type symbol {:?}", s),
            }),
        }
    }
}

impl fmt::Display for LineType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.symbol())
    }
}

/// The type of an extra field, as fixed by its declared format tag.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FieldType {
    /// `d`: a signed decimal integer
    Integer,
    /// `.Nf`: a float rendered with exactly `precision` decimals.
    ///
    /// Rendering uses round-half-to-even on the decimal expansion of the
    /// exact binary value (Rust's `{:.N}` formatting), so repeated
    /// parse→serialize cycles are byte-stable.
    Float {
        /// Number of decimal places in the serialized form
        precision: u8,
    },
    /// `s`: an opaque string, passed through verbatim
    Text,
}

impl FieldType {
    /// Parse a format tag as it appears in a schema declaration line.
    ///
    /// Returns `None` for anything outside the closed tag set.
    pub fn from_tag(tag: &str) -> Option<Self> {
        match tag {
            "d" => Some(FieldType::Integer),
            "s" => Some(FieldType::Text),
            _ => {
                let digits = tag.strip_prefix('.')?.strip_suffix('f')?;
                if digits.is_empty() {
                    return None;
                }
                digits.parse::<u8>().ok().map(|precision| FieldType::Float { precision })
            }
        }
    }

    /// The tag this type serializes back to in a declaration line.
    pub fn tag(&self) -> String {
        match self {
            FieldType::Integer => "d".to_string(),
            FieldType::Text => "s".to_string(),
            FieldType::Float { precision } => format!(".{}f", precision),
        }
    }
}

impl fmt::Display for FieldType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.tag())
    }
}

/// One declared extra field: name, type, and free-text description.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FieldDef {
    /// Field name, unique within its line type
    pub name: String,
    /// Declared type (fixed for the lifetime of the file)
    pub ty: FieldType,
    /// Human-readable description, carried into regenerated headers
    pub description: String,
}

/// The per-file registry of extra-field declarations.
///
/// Built once per file (from the header) or once per writer (from the
/// caller), then read-only. The record codec consults it to know how many
/// extra columns to expect on each line type and how to coerce them.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Schema {
    haplotype_fields: Vec<FieldDef>,
    variant_fields: Vec<FieldDef>,
}

impl Schema {
    /// Creates an empty schema: no extra fields on either line type.
    pub fn new() -> Self {
        Self::default()
    }

    /// Appends a declaration to `line_type`'s ordered list.
    ///
    /// # Errors
    ///
    /// Returns [`HapError::DuplicateField`] if `name` is already declared
    /// for `line_type`. The same name on the *other* line type is fine.
    pub fn declare(
        &mut self,
        line_type: LineType,
        name: impl Into<String>,
        ty: FieldType,
        description: impl Into<String>,
    ) -> Result<()> {
        let name = name.into();
        let fields = self.fields_mut(line_type);
        if fields.iter().any(|f| f.name == name) {
            return Err(HapError::DuplicateField { line_type, name });
        }
        fields.push(FieldDef {
            name,
            ty,
            description: description.into(),
        });
        Ok(())
    }

    /// The ordered declarations for `line_type`.
    pub fn fields_for(&self, line_type: LineType) -> &[FieldDef] {
        match line_type {
            LineType::Haplotype => &self.haplotype_fields,
            LineType::Variant => &self.variant_fields,
        }
    }

    /// Total column count (type symbol + mandatory + extras) a data line of
    /// `line_type` must have under this schema.
    pub fn expected_columns(&self, line_type: LineType) -> usize {
        1 + line_type.mandatory_columns() + self.fields_for(line_type).len()
    }

    /// Whether any extra fields are declared at all.
    pub fn is_empty(&self) -> bool {
        self.haplotype_fields.is_empty() && self.variant_fields.is_empty()
    }

    fn fields_mut(&mut self, line_type: LineType) -> &mut Vec<FieldDef> {
        match line_type {
            LineType::Haplotype => &mut self.haplotype_fields,
            LineType::Variant => &mut self.variant_fields,
        }
    }
}
