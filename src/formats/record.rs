//! Haplotype and variant records, and the line codec for both.
//!
//! Data lines are tab-delimited with the line type symbol in column 1:
//!
//! ```text
//! H	chr1	100	200	hap1	0.50
//! V	hap1	100	150	rs123	A
//! ```
//!
//! `H` lines carry (chrom, start, end, ID); `V` lines carry
//! (haplotype ID, start, end, ID, allele). Any further columns are extra
//! fields and must match the file's [`Schema`] exactly, both in count and
//! in declared type. A variant's haplotype ID is a plain identifier, not a
//! pointer; whether it resolves is checked by the validator, never assumed.
//!
//! # Round-trip laws
//!
//! Parsing a line and serializing the record back yields the input
//! byte-for-byte whenever the input already used the canonical formatting
//! implied by the schema (notably float precision). Serializing a record
//! and re-parsing it yields an equal record for any value representable at
//! its declared precision.
//!
//! # Examples
//!
//! ```
//! use hapfile::formats::record::{FieldValue, HapRecord};
//! use hapfile::formats::schema::{FieldType, LineType, Schema};
//!
//! let mut schema = Schema::new();
//! schema.declare(LineType::Haplotype, "beta", FieldType::Float { precision: 2 }, "Effect size")?;
//!
//! let record = HapRecord::from_line("H\tchr1\t100\t200\thap1\t0.5", &schema, 1)?;
//! let hap = record.as_haplotype().unwrap();
//! assert_eq!(hap.chrom, "chr1");
//! assert_eq!(hap.extra("beta"), Some(&FieldValue::Float(0.5)));
//!
//! // 0.5 renders at the declared precision
//! assert_eq!(record.to_line(&schema)?, "H\tchr1\t100\t200\thap1\t0.50");
//! # Ok::<(), hapfile::HapError>(())
//! ```

use crate::error::{HapError, Result};
use crate::formats::schema::{FieldDef, FieldType, LineType, Schema};

/// A typed extra-field value.
///
/// The kind is fixed by the field's schema declaration; parsing and
/// rendering both dispatch on the declared [`FieldType`], not on the value.
#[derive(Debug, Clone, PartialEq)]
pub enum FieldValue {
    /// Value of a `d`-tagged field
    Integer(i64),
    /// Value of a `.Nf`-tagged field
    Float(f64),
    /// Value of an `s`-tagged field
    Text(String),
}

impl FieldValue {
    /// Coerce a raw column under `def`'s declared type.
    fn parse(raw: &str, def: &FieldDef, line: u64) -> Result<Self> {
        let coercion_error = || HapError::TypeCoercion {
            line,
            field: def.name.clone(),
            tag: def.ty.tag(),
            value: raw.to_string(),
        };
        match def.ty {
            FieldType::Integer => raw
                .parse::<i64>()
                .map(FieldValue::Integer)
                .map_err(|_| coercion_error()),
            FieldType::Float { .. } => raw
                .parse::<f64>()
                .map(FieldValue::Float)
                .map_err(|_| coercion_error()),
            FieldType::Text => Ok(FieldValue::Text(raw.to_string())),
        }
    }

    /// Render under a declared type. Floats use `{:.N}` formatting, which
    /// rounds half to even on the decimal expansion of the exact binary
    /// value; the result is byte-stable across parse→serialize cycles.
    fn render(&self, ty: FieldType) -> Option<String> {
        match (self, ty) {
            (FieldValue::Integer(v), FieldType::Integer) => Some(v.to_string()),
            (FieldValue::Float(v), FieldType::Float { precision }) => {
                Some(format!("{:.*}", precision as usize, v))
            }
            (FieldValue::Text(v), FieldType::Text) => Some(v.clone()),
            _ => None,
        }
    }

    fn raw_display(&self) -> String {
        match self {
            FieldValue::Integer(v) => v.to_string(),
            FieldValue::Float(v) => v.to_string(),
            FieldValue::Text(v) => v.clone(),
        }
    }
}

/// A named genomic interval representing one haplotype (`H` line).
#[derive(Debug, Clone, PartialEq)]
pub struct Haplotype {
    /// Chromosome/contig name
    pub chrom: String,
    /// Start position (non-negative)
    pub start: u64,
    /// End position, `>= start`
    pub end: u64,
    /// Haplotype ID, unique within the file
    pub id: String,
    /// Extra-field values in declaration order
    pub extras: Vec<(String, FieldValue)>,
}

/// A variant belonging to exactly one haplotype (`V` line).
#[derive(Debug, Clone, PartialEq)]
pub struct Variant {
    /// ID of the owning haplotype. A weak reference: resolution is checked
    /// by validation, not by construction.
    pub haplotype: String,
    /// Start position (non-negative)
    pub start: u64,
    /// End position, `>= start`
    pub end: u64,
    /// Variant ID
    pub id: String,
    /// Allele carried by the haplotype at this variant
    pub allele: String,
    /// Extra-field values in declaration order
    pub extras: Vec<(String, FieldValue)>,
}

impl Haplotype {
    /// Look up an extra field by name.
    pub fn extra(&self, name: &str) -> Option<&FieldValue> {
        lookup_extra(&self.extras, name)
    }

    fn parse(fields: &[&str], schema: &Schema, line: u64) -> Result<Self> {
        let extras = parse_extras(fields, LineType::Haplotype, schema, line)?;
        let (start, end) = parse_interval(fields[2], fields[3], line)?;
        Ok(Haplotype {
            chrom: fields[1].to_string(),
            start,
            end,
            id: fields[4].to_string(),
            extras,
        })
    }

    /// Serialize to a data line (no trailing newline) under `schema`.
    pub fn to_line(&self, schema: &Schema) -> Result<String> {
        let mut out = format!("H\t{}\t{}\t{}\t{}", self.chrom, self.start, self.end, self.id);
        render_extras(&mut out, &self.extras, LineType::Haplotype, schema)?;
        Ok(out)
    }
}

impl Variant {
    /// Look up an extra field by name.
    pub fn extra(&self, name: &str) -> Option<&FieldValue> {
        lookup_extra(&self.extras, name)
    }

    fn parse(fields: &[&str], schema: &Schema, line: u64) -> Result<Self> {
        let extras = parse_extras(fields, LineType::Variant, schema, line)?;
        let (start, end) = parse_interval(fields[2], fields[3], line)?;
        Ok(Variant {
            haplotype: fields[1].to_string(),
            start,
            end,
            id: fields[4].to_string(),
            allele: fields[5].to_string(),
            extras,
        })
    }

    /// Serialize to a data line (no trailing newline) under `schema`.
    pub fn to_line(&self, schema: &Schema) -> Result<String> {
        let mut out = format!(
            "V\t{}\t{}\t{}\t{}\t{}",
            self.haplotype, self.start, self.end, self.id, self.allele
        );
        render_extras(&mut out, &self.extras, LineType::Variant, schema)?;
        Ok(out)
    }
}

/// Either data record of a .hap file.
#[derive(Debug, Clone, PartialEq)]
pub enum HapRecord {
    /// An `H` line
    Haplotype(Haplotype),
    /// A `V` line
    Variant(Variant),
}

impl HapRecord {
    /// Parse one data line against `schema`.
    ///
    /// `line_number` (1-based) is carried into any error for diagnostics.
    ///
    /// # Errors
    ///
    /// - [`HapError::MalformedLine`] on an unknown type symbol, too few
    ///   columns, an unparseable mandatory field, or `end < start`
    /// - [`HapError::UndeclaredField`] on more columns than mandatory plus
    ///   declared extras
    /// - [`HapError::TypeCoercion`] when an extra column does not parse
    ///   under its declared format tag
    pub fn from_line(line: &str, schema: &Schema, line_number: u64) -> Result<Self> {
        let fields: Vec<&str> = line.split('\t').collect();
        let line_type: LineType = fields[0].parse().map_err(|_| HapError::MalformedLine {
            line: line_number,
            msg: format!("unknown line type symbol {:?}", fields[0]),
        })?;

        let expected = schema.expected_columns(line_type);
        if fields.len() < expected {
            return Err(HapError::MalformedLine {
                line: line_number,
                msg: format!("expected {} columns, got {}", expected, fields.len()),
            });
        }
        if fields.len() > expected {
            return Err(HapError::UndeclaredField {
                line: line_number,
                line_type,
                expected,
                actual: fields.len(),
            });
        }

        match line_type {
            LineType::Haplotype => Haplotype::parse(&fields, schema, line_number).map(HapRecord::Haplotype),
            LineType::Variant => Variant::parse(&fields, schema, line_number).map(HapRecord::Variant),
        }
    }

    /// Serialize to a data line (no trailing newline) under `schema`.
    ///
    /// The exact inverse of [`HapRecord::from_line`]: type symbol, mandatory
    /// columns, then each extra rendered by its declared format tag.
    pub fn to_line(&self, schema: &Schema) -> Result<String> {
        match self {
            HapRecord::Haplotype(h) => h.to_line(schema),
            HapRecord::Variant(v) => v.to_line(schema),
        }
    }

    /// This record's line type.
    pub fn line_type(&self) -> LineType {
        match self {
            HapRecord::Haplotype(_) => LineType::Haplotype,
            HapRecord::Variant(_) => LineType::Variant,
        }
    }

    /// The name column (column 2): chromosome for `H`, haplotype ID for `V`.
    ///
    /// This is the column region indexing keys on, so the two namespaces
    /// must not collide.
    pub fn name(&self) -> &str {
        match self {
            HapRecord::Haplotype(h) => &h.chrom,
            HapRecord::Variant(v) => &v.haplotype,
        }
    }

    /// Start position.
    pub fn start(&self) -> u64 {
        match self {
            HapRecord::Haplotype(h) => h.start,
            HapRecord::Variant(v) => v.start,
        }
    }

    /// End position.
    pub fn end(&self) -> u64 {
        match self {
            HapRecord::Haplotype(h) => h.end,
            HapRecord::Variant(v) => v.end,
        }
    }

    /// Record ID (haplotype ID for `H`, variant ID for `V`).
    pub fn id(&self) -> &str {
        match self {
            HapRecord::Haplotype(h) => &h.id,
            HapRecord::Variant(v) => &v.id,
        }
    }

    /// Whether this record's interval intersects `[qstart, qend]`
    /// (both ends inclusive).
    pub fn intersects(&self, qstart: u64, qend: u64) -> bool {
        self.start() <= qend && self.end() >= qstart
    }

    /// Borrow the inner haplotype, if this is an `H` record.
    pub fn as_haplotype(&self) -> Option<&Haplotype> {
        match self {
            HapRecord::Haplotype(h) => Some(h),
            HapRecord::Variant(_) => None,
        }
    }

    /// Borrow the inner variant, if this is a `V` record.
    pub fn as_variant(&self) -> Option<&Variant> {
        match self {
            HapRecord::Haplotype(_) => None,
            HapRecord::Variant(v) => Some(v),
        }
    }

    /// The key this record sorts by in an index-compatible file.
    pub fn sort_key(&self) -> (LineType, &str, u64, u64) {
        (self.line_type(), self.name(), self.start(), self.end())
    }
}

fn lookup_extra<'a>(extras: &'a [(String, FieldValue)], name: &str) -> Option<&'a FieldValue> {
    extras.iter().find(|(n, _)| n == name).map(|(_, v)| v)
}

fn parse_interval(start: &str, end: &str, line: u64) -> Result<(u64, u64)> {
    let start = parse_position(start, "start", line)?;
    let end = parse_position(end, "end", line)?;
    if end < start {
        return Err(HapError::MalformedLine {
            line,
            msg: format!("end ({}) is less than start ({})", end, start),
        });
    }
    Ok((start, end))
}

fn parse_position(raw: &str, which: &str, line: u64) -> Result<u64> {
    raw.parse::<u64>().map_err(|_| HapError::MalformedLine {
        line,
        msg: format!("{} position {:?} is not a non-negative integer", which, raw),
    })
}

/// Consume the extra columns of a line whose count has already been checked.
fn parse_extras(
    fields: &[&str],
    line_type: LineType,
    schema: &Schema,
    line: u64,
) -> Result<Vec<(String, FieldValue)>> {
    let decls = schema.fields_for(line_type);
    let first_extra = 1 + line_type.mandatory_columns();
    fields[first_extra..]
        .iter()
        .zip(decls)
        .map(|(raw, def)| FieldValue::parse(raw, def, line).map(|v| (def.name.clone(), v)))
        .collect()
}

/// Append rendered extras to a partially-built line, verifying that the
/// record's extras match the schema's declarations exactly.
fn render_extras(
    out: &mut String,
    extras: &[(String, FieldValue)],
    line_type: LineType,
    schema: &Schema,
) -> Result<()> {
    let decls = schema.fields_for(line_type);
    if extras.len() != decls.len() {
        let expected = schema.expected_columns(line_type);
        let actual = 1 + line_type.mandatory_columns() + extras.len();
        if extras.len() > decls.len() {
            return Err(HapError::UndeclaredField {
                line: 0,
                line_type,
                expected,
                actual,
            });
        }
        return Err(HapError::MalformedLine {
            line: 0,
            msg: format!(
                "{} record has {} extra field(s) but {} are declared",
                line_type,
                extras.len(),
                decls.len()
            ),
        });
    }
    for ((name, value), def) in extras.iter().zip(decls) {
        let rendered = if name == &def.name {
            value.render(def.ty)
        } else {
            None
        };
        let rendered = rendered.ok_or_else(|| HapError::TypeCoercion {
            line: 0,
            field: def.name.clone(),
            tag: def.ty.tag(),
            value: value.raw_display(),
        })?;
        out.push('\t');
        out.push_str(&rendered);
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn schema_with_beta() -> Schema {
        let mut schema = Schema::new();
        schema
            .declare(LineType::Haplotype, "beta", FieldType::Float { precision: 2 }, "Effect size")
            .unwrap();
        schema
    }

    #[test]
    fn test_parse_haplotype_basic() {
        let schema = Schema::new();
        let record = HapRecord::from_line("H\tchr1\t100\t200\thap1", &schema, 1).unwrap();
        let hap = record.as_haplotype().unwrap();
        assert_eq!(hap.chrom, "chr1");
        assert_eq!(hap.start, 100);
        assert_eq!(hap.end, 200);
        assert_eq!(hap.id, "hap1");
        assert!(hap.extras.is_empty());
    }

    #[test]
    fn test_parse_variant_basic() {
        let schema = Schema::new();
        let record = HapRecord::from_line("V\thap1\t100\t150\trs123\tA", &schema, 2).unwrap();
        let var = record.as_variant().unwrap();
        assert_eq!(var.haplotype, "hap1");
        assert_eq!(var.start, 100);
        assert_eq!(var.end, 150);
        assert_eq!(var.id, "rs123");
        assert_eq!(var.allele, "A");
    }

    #[test]
    fn test_parse_with_extra_field() {
        let schema = schema_with_beta();
        let record = HapRecord::from_line("H\tchr1\t100\t200\thap1\t0.5", &schema, 1).unwrap();
        let hap = record.as_haplotype().unwrap();
        assert_eq!(hap.extra("beta"), Some(&FieldValue::Float(0.5)));
    }

    #[test]
    fn test_end_to_end_formatting() {
        // Header declares `#H beta .2f`; 0.5 must render as 0.50.
        let schema = schema_with_beta();
        let record = HapRecord::from_line("H\tchr1\t100\t200\thap1\t0.5", &schema, 1).unwrap();
        assert_eq!(
            record.to_line(&schema).unwrap(),
            "H\tchr1\t100\t200\thap1\t0.50"
        );
    }

    #[test]
    fn test_canonical_line_round_trips_byte_identical() {
        let schema = schema_with_beta();
        let line = "H\tchr1\t100\t200\thap1\t0.50";
        let record = HapRecord::from_line(line, &schema, 1).unwrap();
        assert_eq!(record.to_line(&schema).unwrap(), line);
    }

    #[test]
    fn test_too_few_columns_is_malformed() {
        let schema = Schema::new();
        let err = HapRecord::from_line("H\tchr1\t100\t200", &schema, 4).unwrap_err();
        assert!(matches!(err, HapError::MalformedLine { line: 4, .. }));
    }

    #[test]
    fn test_undeclared_extra_column_rejected() {
        let schema = Schema::new();
        let err = HapRecord::from_line("V\thap1\t100\t150\trs123\tA\t0.9", &schema, 5).unwrap_err();
        assert!(matches!(
            err,
            HapError::UndeclaredField {
                line: 5,
                line_type: LineType::Variant,
                expected: 6,
                actual: 7,
            }
        ));
    }

    #[test]
    fn test_missing_declared_extra_is_malformed() {
        let schema = schema_with_beta();
        let err = HapRecord::from_line("H\tchr1\t100\t200\thap1", &schema, 2).unwrap_err();
        assert!(matches!(err, HapError::MalformedLine { line: 2, .. }));
    }

    #[test]
    fn test_type_coercion_failure() {
        let schema = schema_with_beta();
        let err = HapRecord::from_line("H\tchr1\t100\t200\thap1\tnot_a_number", &schema, 3).unwrap_err();
        match err {
            HapError::TypeCoercion { line, field, tag, value } => {
                assert_eq!(line, 3);
                assert_eq!(field, "beta");
                assert_eq!(tag, ".2f");
                assert_eq!(value, "not_a_number");
            }
            other => panic!("expected TypeCoercion, got {:?}", other),
        }
    }

    #[test]
    fn test_unparseable_position_is_malformed() {
        let schema = Schema::new();
        let err = HapRecord::from_line("H\tchr1\tabc\t200\thap1", &schema, 1).unwrap_err();
        assert!(matches!(err, HapError::MalformedLine { line: 1, .. }));

        // negative positions are not non-negative integers
        let err = HapRecord::from_line("H\tchr1\t-5\t200\thap1", &schema, 1).unwrap_err();
        assert!(matches!(err, HapError::MalformedLine { .. }));
    }

    #[test]
    fn test_end_before_start_rejected() {
        let schema = Schema::new();
        let err = HapRecord::from_line("H\tchr1\t200\t100\thap1", &schema, 1).unwrap_err();
        assert!(matches!(err, HapError::MalformedLine { .. }));

        // zero-length interval (end == start) is fine
        assert!(HapRecord::from_line("H\tchr1\t100\t100\thap1", &schema, 1).is_ok());
    }

    #[test]
    fn test_unknown_symbol_rejected() {
        let schema = Schema::new();
        let err = HapRecord::from_line("X\tchr1\t100\t200\thap1", &schema, 9).unwrap_err();
        assert!(matches!(err, HapError::MalformedLine { line: 9, .. }));
    }

    #[test]
    fn test_float_rounding_half_to_even() {
        let schema = schema_with_beta();
        // 0.125 and 0.375 are exact in binary: ties round to even.
        let hap = Haplotype {
            chrom: "chr1".into(),
            start: 0,
            end: 1,
            id: "h".into(),
            extras: vec![("beta".into(), FieldValue::Float(0.125))],
        };
        assert!(hap.to_line(&schema).unwrap().ends_with("\t0.12"));

        let hap = Haplotype {
            extras: vec![("beta".into(), FieldValue::Float(0.375))],
            ..hap
        };
        assert!(hap.to_line(&schema).unwrap().ends_with("\t0.38"));

        // 1.005 in binary is just below 1.005, so it rounds down.
        let hap = Haplotype {
            extras: vec![("beta".into(), FieldValue::Float(1.005))],
            ..hap
        };
        assert!(hap.to_line(&schema).unwrap().ends_with("\t1.00"));
    }

    #[test]
    fn test_serialize_mismatched_extra_type() {
        let schema = schema_with_beta();
        let hap = Haplotype {
            chrom: "chr1".into(),
            start: 0,
            end: 1,
            id: "h".into(),
            extras: vec![("beta".into(), FieldValue::Text("oops".into()))],
        };
        assert!(matches!(
            hap.to_line(&schema).unwrap_err(),
            HapError::TypeCoercion { .. }
        ));
    }

    #[test]
    fn test_serialize_extra_count_mismatch() {
        let schema = Schema::new();
        let hap = Haplotype {
            chrom: "chr1".into(),
            start: 0,
            end: 1,
            id: "h".into(),
            extras: vec![("beta".into(), FieldValue::Float(0.5))],
        };
        assert!(matches!(
            hap.to_line(&schema).unwrap_err(),
            HapError::UndeclaredField { .. }
        ));
    }

    #[test]
    fn test_intersects_inclusive() {
        let schema = Schema::new();
        let record = HapRecord::from_line("H\tchr1\t100\t200\thap1", &schema, 1).unwrap();
        assert!(record.intersects(200, 300)); // touch at end
        assert!(record.intersects(50, 100)); // touch at start
        assert!(record.intersects(150, 160)); // contained
        assert!(!record.intersects(201, 300));
        assert!(!record.intersects(0, 99));
    }

    #[test]
    fn test_integer_and_text_extras() {
        let mut schema = Schema::new();
        schema
            .declare(LineType::Variant, "score", FieldType::Integer, "")
            .unwrap();
        schema
            .declare(LineType::Variant, "source", FieldType::Text, "")
            .unwrap();

        let line = "V\thap1\t100\t150\trs123\tA\t-3\tgnomAD";
        let record = HapRecord::from_line(line, &schema, 1).unwrap();
        let var = record.as_variant().unwrap();
        assert_eq!(var.extra("score"), Some(&FieldValue::Integer(-3)));
        assert_eq!(var.extra("source"), Some(&FieldValue::Text("gnomAD".into())));
        assert_eq!(record.to_line(&schema).unwrap(), line);
    }
}
