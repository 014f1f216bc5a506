//! Streaming .hap parsing.
//!
//! [`HapReader`] reads the header eagerly on construction (the schema must
//! be known before any data line can be interpreted), then yields records
//! one at a time with constant memory. [`HapFile`] is the load-everything
//! convenience on top: header plus the full record sequence, in file order.
//!
//! # Examples
//!
//! ```
//! use hapfile::formats::reader::HapReader;
//!
//! let data = "\
//! #\tversion\t0.2.0
//! #H\tbeta\t.2f\tEffect size
//! H\tchr1\t100\t200\thap1\t0.50
//! V\thap1\t100\t150\trs123\tA
//! ";
//! let mut reader = HapReader::new(data.as_bytes())?;
//! assert_eq!(reader.header().version.as_deref(), Some("0.2.0"));
//!
//! let records: Vec<_> = reader.by_ref().collect::<hapfile::Result<_>>()?;
//! assert_eq!(records.len(), 2);
//! assert_eq!(records[0].name(), "chr1");
//! # Ok::<(), hapfile::HapError>(())
//! ```

use crate::error::{HapError, Result};
use crate::formats::header::Header;
use crate::formats::record::{HapRecord, Haplotype, Variant};
use crate::formats::schema::Schema;
use crate::formats::validator;
use crate::formats::writer::HapWriter;
use crate::io::CompressedReader;
use log::debug;
use std::io::{BufRead, Write};
use std::path::Path;

/// Streaming parser for .hap data.
///
/// Construction consumes the header (all leading `#` lines); iteration
/// yields one [`HapRecord`] per data line. Empty lines are skipped. A `#`
/// line after the first data line is an error: the header is only valid as
/// a contiguous prefix, because a schema change mid-stream would invalidate
/// the interpretation of every line around it.
pub struct HapReader<R: BufRead> {
    reader: R,
    header: Header,
    line_buf: String,
    line_number: u64,
    /// First data line, found while scanning the header
    pending: Option<String>,
}

impl HapReader<CompressedReader> {
    /// Opens a file, transparently decompressing gzip/BGZF content.
    pub fn from_path(path: impl AsRef<Path>) -> Result<Self> {
        Self::new(CompressedReader::open(path)?)
    }
}

impl<R: BufRead> HapReader<R> {
    /// Wraps a reader and parses the header.
    ///
    /// # Errors
    ///
    /// Any header defect (bad declaration, duplicate field, malformed
    /// pragma) aborts construction: a corrupt schema would invalidate
    /// every subsequent line's interpretation.
    pub fn new(reader: R) -> Result<Self> {
        let mut this = HapReader {
            reader,
            header: Header::default(),
            line_buf: String::new(),
            line_number: 0,
            pending: None,
        };
        loop {
            match this.next_line()? {
                None => break,
                Some(line) => {
                    if line.starts_with('#') {
                        let line_number = this.line_number;
                        this.header.parse_comment_line(&line, line_number)?;
                    } else {
                        this.pending = Some(line);
                        break;
                    }
                }
            }
        }
        debug!(
            "parsed .hap header: {} comment(s), {} H + {} V extra field(s)",
            this.header.comments.len(),
            this.header.schema.fields_for(crate::formats::schema::LineType::Haplotype).len(),
            this.header.schema.fields_for(crate::formats::schema::LineType::Variant).len(),
        );
        Ok(this)
    }

    /// The parsed header.
    pub fn header(&self) -> &Header {
        &self.header
    }

    /// The schema the header declared.
    pub fn schema(&self) -> &Schema {
        &self.header.schema
    }

    /// Current line number (1-based), for error reporting.
    pub fn line_number(&self) -> u64 {
        self.line_number
    }

    /// Consumes the reader, keeping only its parsed header.
    pub fn into_header(self) -> Header {
        self.header
    }

    /// Reads the next non-empty line, newline-stripped. None at EOF.
    fn next_line(&mut self) -> Result<Option<String>> {
        loop {
            self.line_buf.clear();
            if self.reader.read_line(&mut self.line_buf)? == 0 {
                return Ok(None);
            }
            self.line_number += 1;
            let line = self
                .line_buf
                .trim_end_matches('\n')
                .trim_end_matches('\r');
            if line.is_empty() {
                continue;
            }
            return Ok(Some(line.to_string()));
        }
    }
}

impl<R: BufRead> Iterator for HapReader<R> {
    type Item = Result<HapRecord>;

    fn next(&mut self) -> Option<Self::Item> {
        let line = match self.pending.take() {
            Some(line) => line,
            None => match self.next_line() {
                Ok(Some(line)) => line,
                Ok(None) => return None,
                Err(e) => return Some(Err(e)),
            },
        };
        if line.starts_with('#') {
            return Some(Err(HapError::MalformedLine {
                line: self.line_number,
                msg: "header line after the first data line".to_string(),
            }));
        }
        Some(HapRecord::from_line(&line, &self.header.schema, self.line_number))
    }
}

/// A whole .hap file held in memory: header plus records in file order.
///
/// Reading does not validate cross-record invariants; call
/// [`HapFile::validate`] for that, and [`HapFile::sort`] to put records
/// into index-compatible order before writing an indexable file.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct HapFile {
    /// Header: comments, version, schema
    pub header: Header,
    /// Data records in file order
    pub records: Vec<HapRecord>,
}

impl HapFile {
    /// An empty record set over `schema`, for programmatic construction.
    pub fn with_schema(schema: Schema) -> Self {
        HapFile {
            header: Header::with_schema(schema),
            records: Vec::new(),
        }
    }

    /// Loads a file, transparently decompressing gzip/BGZF content.
    pub fn from_path(path: impl AsRef<Path>) -> Result<Self> {
        let mut reader = HapReader::from_path(path)?;
        let records = reader.by_ref().collect::<Result<Vec<_>>>()?;
        Ok(HapFile {
            header: std::mem::take(&mut reader.header),
            records,
        })
    }

    /// Loads from any buffered reader.
    pub fn read_from<R: BufRead>(reader: R) -> Result<Self> {
        let mut reader = HapReader::new(reader)?;
        let records = reader.by_ref().collect::<Result<Vec<_>>>()?;
        Ok(HapFile {
            header: std::mem::take(&mut reader.header),
            records,
        })
    }

    /// The schema in effect for this record set.
    pub fn schema(&self) -> &Schema {
        &self.header.schema
    }

    /// Appends a record (no validation; see [`HapFile::validate`]).
    pub fn push(&mut self, record: HapRecord) {
        self.records.push(record);
    }

    /// All haplotype records, in file order.
    pub fn haplotypes(&self) -> impl Iterator<Item = &Haplotype> {
        self.records.iter().filter_map(HapRecord::as_haplotype)
    }

    /// All variant records, in file order.
    pub fn variants(&self) -> impl Iterator<Item = &Variant> {
        self.records.iter().filter_map(HapRecord::as_variant)
    }

    /// The haplotype with `id`, if present.
    pub fn haplotype(&self, id: &str) -> Option<&Haplotype> {
        self.haplotypes().find(|h| h.id == id)
    }

    /// The variants belonging to haplotype `id`, in file order.
    pub fn variants_of<'a>(&'a self, id: &'a str) -> impl Iterator<Item = &'a Variant> + 'a {
        self.variants().filter(move |v| v.haplotype == id)
    }

    /// Checks haplotype-ID uniqueness and variant→haplotype resolution over
    /// the whole set. Dangling references are reported in aggregate.
    ///
    /// Line numbers in errors are 1-based record positions within this set.
    pub fn validate(&self) -> Result<()> {
        validator::validate_records(&self.records)
    }

    /// Whether records are already in index-compatible order.
    pub fn is_sorted(&self) -> bool {
        validator::check_sorted(&self.records).is_ok()
    }

    /// Sorts records into index-compatible order:
    /// (line type, name column, start, end) ascending. Stable, so records
    /// with equal keys keep their relative order.
    pub fn sort(&mut self) {
        self.records
            .sort_by(|a, b| a.sort_key().cmp(&b.sort_key()));
    }

    /// Writes the set: comments, regenerated header lines, then records.
    ///
    /// Order is emitted as stored; sort first (or validate) if the output
    /// is meant to be indexed.
    pub fn write_to<W: Write>(&self, out: W) -> Result<()> {
        let mut writer = HapWriter::new(out, self.header.schema.clone());
        if let Some(version) = &self.header.version {
            writer.set_version(version)?;
        }
        for comment in &self.header.comments {
            writer.write_comment(comment)?;
        }
        for record in &self.records {
            writer.write_record(record)?;
        }
        writer.finish()
    }
}
