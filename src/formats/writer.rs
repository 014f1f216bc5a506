//! .hap output.
//!
//! A [`HapWriter`] owns its destination for the duration of the write: one
//! writer per output, flushed and finalized by [`HapWriter::finish`]. The
//! header is emitted once, just before the first record (or at finish for
//! an empty file): user comments verbatim, then the version pragma and
//! schema declarations regenerated from the live [`Schema`], never from
//! replayed text, so the header on disk always matches the schema the body
//! was serialized under.
//!
//! With [`HapWriter::require_sorted`] the writer refuses out-of-order
//! records with [`HapError::UnsortedFile`] instead of reordering them.
//! Silent reordering would hide caller bugs and break line-for-line
//! provenance; a caller who wants sorted output sorts first.
//!
//! # Examples
//!
//! ```
//! use hapfile::formats::record::{FieldValue, Haplotype};
//! use hapfile::formats::schema::{FieldType, LineType, Schema};
//! use hapfile::formats::writer::HapWriter;
//!
//! let mut schema = Schema::new();
//! schema.declare(LineType::Haplotype, "beta", FieldType::Float { precision: 2 }, "Effect size")?;
//!
//! let mut out = Vec::new();
//! let mut writer = HapWriter::new(&mut out, schema);
//! writer.write_comment("# simulated effects")?;
//! writer.write_haplotype(&Haplotype {
//!     chrom: "chr1".into(),
//!     start: 100,
//!     end: 200,
//!     id: "hap1".into(),
//!     extras: vec![("beta".into(), FieldValue::Float(0.5))],
//! })?;
//! writer.finish()?;
//!
//! assert_eq!(
//!     String::from_utf8(out).unwrap(),
//!     "# simulated effects\n#H\tbeta\t.2f\tEffect size\nH\tchr1\t100\t200\thap1\t0.50\n"
//! );
//! # Ok::<(), hapfile::HapError>(())
//! ```

use crate::error::{HapError, Result};
use crate::formats::header::Header;
use crate::formats::record::{HapRecord, Haplotype, Variant};
use crate::formats::schema::Schema;
use crate::formats::validator::unsorted_error;
use crate::io::CompressedWriter;
use std::fs::File;
use std::io::Write;
use std::path::Path;

/// Streaming writer for .hap data.
pub struct HapWriter<W: Write> {
    out: W,
    header: Header,
    require_sorted: bool,
    previous: Option<HapRecord>,
    header_written: bool,
    header_lines: u64,
    records_written: u64,
}

impl HapWriter<CompressedWriter<File>> {
    /// Creates a writer for `path`. A `.gz` or `.bgz` extension selects
    /// BGZF output, which is what the region index requires.
    pub fn create(path: impl AsRef<Path>, schema: Schema) -> Result<Self> {
        Ok(Self::new(CompressedWriter::create(path)?, schema))
    }
}

impl<W: Write> HapWriter<W> {
    /// Wraps any byte sink. Output is written as-is (no compression).
    pub fn new(out: W, schema: Schema) -> Self {
        HapWriter {
            out,
            header: Header::with_schema(schema),
            require_sorted: false,
            previous: None,
            header_written: false,
            header_lines: 0,
            records_written: 0,
        }
    }

    /// Rejects records that arrive out of index-compatible order.
    pub fn require_sorted(&mut self, yes: bool) {
        self.require_sorted = yes;
    }

    /// Sets the version pragma. Must precede the first record.
    pub fn set_version(&mut self, version: &str) -> Result<()> {
        self.ensure_header_not_written("version pragma")?;
        self.header.version = Some(version.to_string());
        Ok(())
    }

    /// Queues a verbatim comment line. Must precede the first record, since
    /// the header is a contiguous prefix.
    pub fn write_comment(&mut self, text: &str) -> Result<()> {
        self.ensure_header_not_written("comment")?;
        if !text.starts_with('#') {
            return Err(HapError::MalformedLine {
                line: 0,
                msg: format!("comment {:?} does not start with '#'", text),
            });
        }
        if text.contains('\n') {
            return Err(HapError::MalformedLine {
                line: 0,
                msg: "comment spans multiple lines".to_string(),
            });
        }
        self.header.comments.push(text.to_string());
        Ok(())
    }

    /// Writes one haplotype record.
    pub fn write_haplotype(&mut self, haplotype: &Haplotype) -> Result<()> {
        // Cheap clone relative to the serialization it precedes; keeps a
        // single code path for ordering checks.
        self.write_record(&HapRecord::Haplotype(haplotype.clone()))
    }

    /// Writes one variant record.
    pub fn write_variant(&mut self, variant: &Variant) -> Result<()> {
        self.write_record(&HapRecord::Variant(variant.clone()))
    }

    /// Writes one record of either type.
    ///
    /// # Errors
    ///
    /// - [`HapError::MalformedLine`] for a record that cannot form a valid
    ///   line (empty name/ID, embedded tab or newline, `end < start`)
    /// - [`HapError::UnsortedFile`] in sorted mode, on the first record
    ///   that breaks (line type, name, start, end) ascending order
    /// - serialization errors from the codec when extras do not match the
    ///   schema
    pub fn write_record(&mut self, record: &HapRecord) -> Result<()> {
        self.ensure_header()?;
        let line_number = self.header_lines + self.records_written + 1;
        self.check_fields(record, line_number)?;

        if self.require_sorted {
            if let Some(previous) = &self.previous {
                if record.sort_key() < previous.sort_key() {
                    return Err(unsorted_error(previous, record, line_number));
                }
            }
        }

        let line = record.to_line(&self.header.schema)?;
        writeln!(self.out, "{}", line)?;
        self.records_written += 1;
        if self.require_sorted {
            self.previous = Some(record.clone());
        }
        Ok(())
    }

    /// Number of records written so far.
    pub fn records_written(&self) -> u64 {
        self.records_written
    }

    /// The schema this writer serializes under.
    pub fn schema(&self) -> &Schema {
        &self.header.schema
    }

    /// Flushes buffered data without finalizing the stream.
    pub fn flush(&mut self) -> Result<()> {
        self.out.flush()?;
        Ok(())
    }

    fn ensure_header_not_written(&self, what: &str) -> Result<()> {
        if self.header_written {
            return Err(HapError::MalformedLine {
                line: 0,
                msg: format!("{} after the first data line", what),
            });
        }
        Ok(())
    }

    fn ensure_header(&mut self) -> Result<()> {
        if self.header_written {
            return Ok(());
        }
        for comment in &self.header.comments {
            writeln!(self.out, "{}", comment)?;
            self.header_lines += 1;
        }
        for line in self.header.generated_lines() {
            writeln!(self.out, "{}", line)?;
            self.header_lines += 1;
        }
        self.header_written = true;
        Ok(())
    }

    fn check_fields(&self, record: &HapRecord, line: u64) -> Result<()> {
        let malformed = |msg: String| HapError::MalformedLine { line, msg };
        if record.end() < record.start() {
            return Err(malformed(format!(
                "end ({}) is less than start ({})",
                record.end(),
                record.start()
            )));
        }
        let mut texts: Vec<(&str, &str)> =
            vec![("name", record.name()), ("ID", record.id())];
        if let HapRecord::Variant(v) = record {
            texts.push(("allele", &v.allele));
        }
        for (what, value) in texts {
            if value.is_empty() {
                return Err(malformed(format!("{} column is empty", what)));
            }
            if value.contains('\t') || value.contains('\n') {
                return Err(malformed(format!(
                    "{} column contains a tab or newline",
                    what
                )));
            }
        }
        Ok(())
    }
}

impl<W: Write> HapWriter<W> {
    /// Writes the header if nothing forced it yet, then flushes.
    ///
    /// For plain sinks this completes the file. When the sink is a
    /// [`CompressedWriter`], use [`HapWriter::into_inner`] and call its
    /// `finish` to seal the BGZF stream.
    pub fn finish(mut self) -> Result<()> {
        self.ensure_header()?;
        self.out.flush()?;
        Ok(())
    }

    /// As [`HapWriter::finish`], but hands back the sink for finalization.
    pub fn into_inner(mut self) -> Result<W> {
        self.ensure_header()?;
        self.out.flush()?;
        Ok(self.out)
    }
}

impl HapWriter<CompressedWriter<File>> {
    /// Writes the header if needed, flushes, and seals the stream
    /// (including the BGZF EOF marker for compressed output).
    pub fn close(mut self) -> Result<()> {
        self.ensure_header()?;
        self.out.finish()?;
        Ok(())
    }
}
