//! The .hap header: comment lines, the version pragma, and the schema.
//!
//! A header is the contiguous block of `#`-prefixed lines before the first
//! data line. Three forms live in it:
//!
//! - `#H\t<name>\t<tag>\t<description>` / `#V\t...`: schema declarations
//!   (see [`crate::formats::schema`])
//! - `#\tversion\t<version>`: the format version pragma
//! - anything else starting with `#`: a plain comment, preserved verbatim
//!
//! Comments round-trip untouched. Declarations and the version pragma do
//! not: the writer regenerates them from the live [`Schema`], so the header
//! that reaches disk always describes the schema actually used for the
//! body.

use crate::error::{HapError, Result};
use crate::formats::schema::{FieldType, LineType, Schema};

/// Parsed header of a .hap file.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Header {
    /// Plain comment lines, verbatim (leading `#` included)
    pub comments: Vec<String>,
    /// Value of the version pragma, if one was present
    pub version: Option<String>,
    /// Extra-field declarations
    pub schema: Schema,
}

impl Header {
    /// A header with no comments or version around an existing schema.
    pub fn with_schema(schema: Schema) -> Self {
        Header {
            comments: Vec::new(),
            version: None,
            schema,
        }
    }

    /// Absorb one `#`-prefixed line.
    ///
    /// `line` must already be newline-stripped; `line_number` is 1-based.
    pub(crate) fn parse_comment_line(&mut self, line: &str, line_number: u64) -> Result<()> {
        if line.starts_with("#H\t") {
            return self.parse_declaration(line, LineType::Haplotype, line_number);
        }
        if line.starts_with("#V\t") {
            return self.parse_declaration(line, LineType::Variant, line_number);
        }
        if line.starts_with("#\t") {
            let fields: Vec<&str> = line.split('\t').collect();
            if fields.get(1) == Some(&"version") {
                if fields.len() < 3 || fields[2].is_empty() {
                    return Err(HapError::MalformedLine {
                        line: line_number,
                        msg: "version pragma is missing its value".to_string(),
                    });
                }
                if self.version.is_some() {
                    return Err(HapError::MalformedLine {
                        line: line_number,
                        msg: "duplicate version pragma".to_string(),
                    });
                }
                self.version = Some(fields[2].to_string());
                return Ok(());
            }
        }
        self.comments.push(line.to_string());
        Ok(())
    }

    fn parse_declaration(&mut self, line: &str, line_type: LineType, line_number: u64) -> Result<()> {
        let fields: Vec<&str> = line.split('\t').collect();
        if fields.len() < 4 {
            return Err(HapError::MalformedLine {
                line: line_number,
                msg: format!(
                    "schema declaration needs name, format tag, and description, got {} column(s)",
                    fields.len() - 1
                ),
            });
        }
        let name = fields[1];
        if name.is_empty() {
            return Err(HapError::MalformedLine {
                line: line_number,
                msg: "schema declaration has an empty field name".to_string(),
            });
        }
        let ty = FieldType::from_tag(fields[2]).ok_or_else(|| HapError::MalformedLine {
            line: line_number,
            msg: format!("unknown format tag {:?} (expected d, s, or .Nf)", fields[2]),
        })?;
        // A tab inside the free-text description is tolerated on input.
        let description = fields[3..].join("\t");
        self.schema.declare(line_type, name, ty, description)
    }

    /// The regenerated pragma/declaration lines, in emission order:
    /// version first, then `H` declarations, then `V` declarations.
    pub fn generated_lines(&self) -> Vec<String> {
        let mut lines = Vec::new();
        if let Some(version) = &self.version {
            lines.push(format!("#\tversion\t{}", version));
        }
        for line_type in [LineType::Haplotype, LineType::Variant] {
            for def in self.schema.fields_for(line_type) {
                lines.push(format!(
                    "#{}\t{}\t{}\t{}",
                    line_type,
                    def.name,
                    def.ty.tag(),
                    def.description
                ));
            }
        }
        lines
    }
}
