//! Region index over sorted, BGZF-compressed .hap files.
//!
//! The index maps (contig, 16 kb window) to the virtual offset of the
//! first record that could overlap the window, in the style of the tabix
//! linear index. "Contig" here means the file's name column: chromosomes
//! for `H` records, haplotype IDs for `V` records, which is why those two
//! namespaces must not collide.
//!
//! Building scans the compressed file once, recording a checkpoint per
//! window and verifying sort order as it goes. A query seeks to the
//! checkpoint for the query start's window, streams records in file order,
//! and stops at the first record of the target contig whose start exceeds
//! the query end; sort order guarantees nothing further can match, and no
//! block before the checkpoint is ever touched.
//!
//! The index serializes to a little-endian binary sidecar (`.hpi`) so it
//! can be built once and reused across processes.
//!
//! # Examples
//!
//! ```no_run
//! use hapfile::formats::index::IndexedHapReader;
//! use hapfile::formats::region::Region;
//!
//! # fn main() -> hapfile::Result<()> {
//! let mut reader = IndexedHapReader::open("cohort.hap.gz")?;
//! let region: Region = "chr1:100000-200000".parse()?;
//! for result in reader.query(&region)? {
//!     let record = result?;
//!     println!("{}\t{}\t{}", record.name(), record.start(), record.end());
//! }
//! # Ok(())
//! # }
//! ```

use crate::error::{HapError, Result};
use crate::formats::header::Header;
use crate::formats::reader::HapReader;
use crate::formats::record::{HapRecord, Haplotype, Variant};
use crate::formats::region::Region;
use crate::formats::schema::{LineType, Schema};
use crate::io::bgzf::{BgzfReader, VirtualOffset};
use log::{debug, warn};
use std::collections::{HashMap, HashSet};
use std::fs::File;
use std::io::{Read, Write};
use std::path::{Path, PathBuf};

/// Index file magic
const HPI_MAGIC: &[u8; 4] = b"HPI\x01";

/// Window width exponent: 16 kb windows, as in the tabix linear index.
const LINEAR_SHIFT: u32 = 14;

/// Positions are clamped to 32 bits for windowing, which bounds a contig's
/// window table at 2 MB. Both build and query clamp identically, so
/// correctness is unaffected for coordinates beyond the clamp.
const MAX_POS: u64 = (1 << 32) - 1;

fn window(pos: u64) -> usize {
    (pos.min(MAX_POS) >> LINEAR_SHIFT) as usize
}

/// Linear index for one contig.
#[derive(Debug, Clone, PartialEq, Eq)]
struct ContigIndex {
    name: String,
    /// Which section of the file this contig lives in
    section: LineType,
    /// Per-window minimum virtual offset of any overlapping record
    intervals: Vec<VirtualOffset>,
}

/// Linear region index over a sorted, BGZF-compressed .hap file.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct HapIndex {
    contigs: Vec<ContigIndex>,
    by_name: HashMap<String, usize>,
}

impl HapIndex {
    /// Scans a BGZF-compressed .hap file and builds its index.
    ///
    /// # Errors
    ///
    /// [`HapError::UnsortedFile`] at the first out-of-order line,
    /// [`HapError::ContigCollision`] when a name appears in both sections,
    /// and the usual structural errors for malformed lines. An index is
    /// never produced for a non-conforming file.
    pub fn build_from_path(path: impl AsRef<Path>) -> Result<Self> {
        let mut reader = BgzfReader::open(path.as_ref())?;
        let mut builder = IndexBuilder::default();
        let mut line = String::new();
        loop {
            let offset = reader.virtual_offset();
            line.clear();
            if reader.read_line(&mut line)? == 0 {
                break;
            }
            builder.observe_line(&line, offset)?;
        }
        let index = builder.finish();
        debug!(
            "built .hap index over {:?}: {} contig(s)",
            path.as_ref(),
            index.contigs.len()
        );
        Ok(index)
    }

    /// Contig names in file order.
    pub fn contig_names(&self) -> impl Iterator<Item = &str> {
        self.contigs.iter().map(|c| c.name.as_str())
    }

    /// Which section a contig's records live in, if the contig is known.
    pub fn section_of(&self, contig: &str) -> Option<LineType> {
        self.by_name.get(contig).map(|&i| self.contigs[i].section)
    }

    /// The seek target for a query starting at `start` on `contig`.
    ///
    /// `None` means the index proves no record can intersect at or after
    /// `start`, or the contig is absent entirely.
    pub fn min_offset(&self, contig: &str, start: u64) -> Option<VirtualOffset> {
        let contig = &self.contigs[*self.by_name.get(contig)?];
        contig.intervals.get(window(start)).copied()
    }

    /// The conventional sidecar path for a data file: `<path>.hpi`.
    pub fn sidecar_path(data_path: impl AsRef<Path>) -> PathBuf {
        let mut name = data_path.as_ref().as_os_str().to_os_string();
        name.push(".hpi");
        PathBuf::from(name)
    }

    /// Writes the index to its binary sidecar form.
    pub fn save(&self, path: impl AsRef<Path>) -> Result<()> {
        let mut out = std::io::BufWriter::new(File::create(path)?);
        out.write_all(HPI_MAGIC)?;
        out.write_all(&(self.contigs.len() as i32).to_le_bytes())?;
        for contig in &self.contigs {
            out.write_all(&[contig.section.symbol() as u8])?;
            out.write_all(&(contig.name.len() as i32).to_le_bytes())?;
            out.write_all(contig.name.as_bytes())?;
            out.write_all(&(contig.intervals.len() as i32).to_le_bytes())?;
            for offset in &contig.intervals {
                out.write_all(&offset.as_raw().to_le_bytes())?;
            }
        }
        out.flush()?;
        Ok(())
    }

    /// Loads an index from its binary sidecar form.
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let mut reader = std::io::BufReader::new(File::open(path)?);

        let mut magic = [0u8; 4];
        reader.read_exact(&mut magic)?;
        if &magic != HPI_MAGIC {
            return Err(HapError::InvalidIndex(format!(
                "bad magic: expected {:?}, got {:?}",
                HPI_MAGIC, magic
            )));
        }

        let n_contigs = read_i32(&mut reader)?;
        if n_contigs < 0 {
            return Err(HapError::InvalidIndex(format!(
                "negative contig count {}",
                n_contigs
            )));
        }

        let mut contigs = Vec::with_capacity(n_contigs as usize);
        let mut by_name = HashMap::new();
        for i in 0..n_contigs as usize {
            let section = match read_u8(&mut reader)? {
                b'H' => LineType::Haplotype,
                b'V' => LineType::Variant,
                other => {
                    return Err(HapError::InvalidIndex(format!(
                        "unknown section byte {:#04x}",
                        other
                    )))
                }
            };
            let name_len = read_i32(&mut reader)?;
            if name_len <= 0 {
                return Err(HapError::InvalidIndex(format!(
                    "contig name length {}",
                    name_len
                )));
            }
            let mut name_buf = vec![0u8; name_len as usize];
            reader.read_exact(&mut name_buf)?;
            let name = String::from_utf8(name_buf)
                .map_err(|e| HapError::InvalidIndex(format!("contig name not UTF-8: {}", e)))?;

            let n_intv = read_i32(&mut reader)?;
            if n_intv < 0 {
                return Err(HapError::InvalidIndex(format!(
                    "negative interval count {}",
                    n_intv
                )));
            }
            let mut intervals = Vec::with_capacity(n_intv as usize);
            for _ in 0..n_intv {
                intervals.push(VirtualOffset::from_raw(read_u64(&mut reader)?));
            }

            by_name.insert(name.clone(), i);
            contigs.push(ContigIndex {
                name,
                section,
                intervals,
            });
        }

        Ok(HapIndex { contigs, by_name })
    }
}

/// Streaming index construction state.
#[derive(Debug, Default)]
struct IndexBuilder {
    contigs: Vec<ContigIndex>,
    by_name: HashMap<String, usize>,
    last_key: Option<(LineType, String, u64, u64)>,
    line_number: u64,
    seen_data: bool,
}

impl IndexBuilder {
    fn observe_line(&mut self, line: &str, offset: VirtualOffset) -> Result<()> {
        self.line_number += 1;
        let line_number = self.line_number;
        if line.is_empty() {
            return Ok(());
        }
        if line.starts_with('#') {
            if self.seen_data {
                return Err(HapError::MalformedLine {
                    line: line_number,
                    msg: "header line after the first data line".to_string(),
                });
            }
            return Ok(());
        }
        self.seen_data = true;

        // Only the indexed columns matter here; full schema conformance is
        // the codec's business.
        let malformed = |msg: String| HapError::MalformedLine {
            line: line_number,
            msg,
        };
        let mut fields = line.split('\t');
        let line_type: LineType = fields
            .next()
            .unwrap_or("")
            .parse()
            .map_err(|_| malformed("unknown line type symbol".to_string()))?;
        let name = fields
            .next()
            .ok_or_else(|| malformed("missing name column".to_string()))?;
        let start: u64 = fields
            .next()
            .and_then(|f| f.parse().ok())
            .ok_or_else(|| malformed("missing or non-numeric start column".to_string()))?;
        let end: u64 = fields
            .next()
            .and_then(|f| f.parse().ok())
            .ok_or_else(|| malformed("missing or non-numeric end column".to_string()))?;
        if end < start {
            return Err(malformed(format!(
                "end ({}) is less than start ({})",
                end, start
            )));
        }
        let id_columns = line_type.mandatory_columns() - 3;
        if fields.by_ref().take(id_columns).count() < id_columns {
            return Err(malformed(format!(
                "{} line is missing mandatory columns",
                line_type
            )));
        }

        let key = (line_type, name.to_string(), start, end);
        if let Some(last) = &self.last_key {
            if key < *last {
                return Err(HapError::UnsortedFile {
                    line: line_number,
                    msg: format!(
                        "key ({}, {}, {}, {}) precedes ({}, {}, {}, {})",
                        key.0, key.1, key.2, key.3, last.0, last.1, last.2, last.3
                    ),
                });
            }
        }

        let idx = match self.by_name.get(name) {
            Some(&idx) => {
                if self.contigs[idx].section != line_type {
                    return Err(HapError::ContigCollision {
                        name: name.to_string(),
                    });
                }
                idx
            }
            None => {
                self.by_name.insert(name.to_string(), self.contigs.len());
                self.contigs.push(ContigIndex {
                    name: name.to_string(),
                    section: line_type,
                    intervals: Vec::new(),
                });
                self.contigs.len() - 1
            }
        };

        let (first, last) = (window(start), window(end));
        let intervals = &mut self.contigs[idx].intervals;
        while intervals.len() <= last {
            intervals.push(offset);
        }
        for w in first..=last {
            if offset < intervals[w] {
                intervals[w] = offset;
            }
        }

        self.last_key = Some(key);
        Ok(())
    }

    fn finish(self) -> HapIndex {
        HapIndex {
            contigs: self.contigs,
            by_name: self.by_name,
        }
    }
}

/// Random-access reader over an indexed, BGZF-compressed .hap file.
///
/// The header (and so the schema) is parsed at open. Each query seeks
/// independently; the index itself is immutable and a query holds no state
/// beyond the reader's file cursor, so a discarded query leaves nothing to
/// clean up.
pub struct IndexedHapReader {
    reader: BgzfReader<File>,
    index: HapIndex,
    header: Header,
}

impl IndexedHapReader {
    /// Opens a BGZF-compressed .hap file for region queries.
    ///
    /// Uses the `<path>.hpi` sidecar when present; otherwise builds the
    /// index in memory (without persisting it; call
    /// [`IndexedHapReader::index`] and [`HapIndex::save`] to keep it).
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let sidecar = HapIndex::sidecar_path(path);
        let index = if sidecar.exists() {
            debug!("loading .hap index sidecar {:?}", sidecar);
            HapIndex::load(&sidecar)?
        } else {
            HapIndex::build_from_path(path)?
        };
        Self::with_index(path, index)
    }

    /// Opens a file with a caller-supplied index.
    pub fn with_index(path: impl AsRef<Path>, index: HapIndex) -> Result<Self> {
        let header = HapReader::from_path(path.as_ref())?.into_header();
        let reader = BgzfReader::open(path)?;
        Ok(IndexedHapReader {
            reader,
            index,
            header,
        })
    }

    /// The parsed header.
    pub fn header(&self) -> &Header {
        &self.header
    }

    /// The schema records are decoded under.
    pub fn schema(&self) -> &Schema {
        &self.header.schema
    }

    /// The index in use.
    pub fn index(&self) -> &HapIndex {
        &self.index
    }

    /// Lazily yields the records on `region.contig` whose intervals
    /// intersect `[region.start, region.end]`, in file order, without
    /// duplicates or omissions. An unknown contig yields nothing.
    pub fn query(&mut self, region: &Region) -> Result<RegionQuery<'_>> {
        let Self {
            reader,
            index,
            header,
        } = self;
        let section = index.section_of(&region.contig);
        let target = section.and_then(|_| index.min_offset(&region.contig, region.start));
        let live = match target {
            Some(offset) => {
                reader.seek_virtual(offset)?;
                true
            }
            None => false,
        };
        Ok(RegionQuery {
            reader,
            schema: &header.schema,
            section: section.unwrap_or(LineType::Haplotype),
            contig: region.contig.clone(),
            qstart: region.start,
            qend: region.end,
            line: String::new(),
            done: !live,
        })
    }

    /// Fetches the haplotypes overlapping a chromosome region together
    /// with each one's variants, grouped in file order.
    pub fn fetch_region(&mut self, region: &Region) -> Result<Vec<(Haplotype, Vec<Variant>)>> {
        let haplotypes: Vec<Haplotype> = self
            .query(region)?
            .filter_map(|r| match r {
                Ok(record) => record.as_haplotype().cloned().map(Ok),
                Err(e) => Some(Err(e)),
            })
            .collect::<Result<_>>()?;
        self.attach_variants(haplotypes)
    }

    /// Fetches the named haplotypes (those present) and their variants,
    /// grouped in file order. Requested IDs with no record are skipped.
    pub fn fetch_haplotypes<'a, I>(&mut self, ids: I) -> Result<Vec<(Haplotype, Vec<Variant>)>>
    where
        I: IntoIterator<Item = &'a str>,
    {
        let wanted: HashSet<&str> = ids.into_iter().collect();
        let mut found = Vec::new();

        // H records lead the file, so scanning the head section is cheap.
        self.reader.seek_virtual(VirtualOffset::default())?;
        let mut line = String::new();
        loop {
            line.clear();
            if self.reader.read_line(&mut line)? == 0 {
                break;
            }
            if line.is_empty() || line.starts_with('#') {
                continue;
            }
            let record = HapRecord::from_line(&line, &self.header.schema, 0)?;
            match record {
                HapRecord::Haplotype(h) => {
                    if wanted.contains(h.id.as_str()) {
                        found.push(h);
                    }
                }
                HapRecord::Variant(_) => break,
            }
        }

        let missing: Vec<&str> = wanted
            .iter()
            .filter(|id| !found.iter().any(|h| h.id == **id))
            .copied()
            .collect();
        if !missing.is_empty() {
            warn!("requested haplotype ID(s) not present: {}", missing.join(", "));
        }

        self.attach_variants(found)
    }

    fn attach_variants(
        &mut self,
        haplotypes: Vec<Haplotype>,
    ) -> Result<Vec<(Haplotype, Vec<Variant>)>> {
        let mut groups = Vec::with_capacity(haplotypes.len());
        for haplotype in haplotypes {
            let variants: Vec<Variant> = self
                .query(&Region::contig(haplotype.id.clone()))?
                .filter_map(|r| match r {
                    Ok(record) => record.as_variant().cloned().map(Ok),
                    Err(e) => Some(Err(e)),
                })
                .collect::<Result<_>>()?;
            groups.push((haplotype, variants));
        }
        Ok(groups)
    }
}

/// Lazy result sequence of one region query.
///
/// Stops as soon as sort order proves no further record can match. May be
/// dropped early without side effects: it only reads.
pub struct RegionQuery<'a> {
    reader: &'a mut BgzfReader<File>,
    schema: &'a Schema,
    section: LineType,
    contig: String,
    qstart: u64,
    qend: u64,
    line: String,
    done: bool,
}

impl Iterator for RegionQuery<'_> {
    type Item = Result<HapRecord>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.done {
            return None;
        }
        loop {
            self.line.clear();
            match self.reader.read_line(&mut self.line) {
                Ok(0) => {
                    self.done = true;
                    return None;
                }
                Ok(_) => {}
                Err(e) => {
                    self.done = true;
                    return Some(Err(e.into()));
                }
            }
            // The seek target may fall before the contig of interest, or
            // even inside the header when the file is small.
            if self.line.is_empty() || self.line.starts_with('#') {
                continue;
            }
            let record = match HapRecord::from_line(&self.line, self.schema, 0) {
                Ok(record) => record,
                Err(e) => {
                    self.done = true;
                    return Some(Err(e));
                }
            };
            if record.line_type() < self.section {
                continue;
            }
            if record.line_type() > self.section {
                self.done = true;
                return None;
            }
            match record.name().cmp(self.contig.as_str()) {
                std::cmp::Ordering::Less => continue,
                std::cmp::Ordering::Greater => {
                    self.done = true;
                    return None;
                }
                std::cmp::Ordering::Equal => {
                    if record.start() > self.qend {
                        // Sorted by start: nothing after this can intersect.
                        self.done = true;
                        return None;
                    }
                    if record.end() >= self.qstart {
                        return Some(Ok(record));
                    }
                }
            }
        }
    }
}

fn read_u8<R: Read>(reader: &mut R) -> Result<u8> {
    let mut buf = [0u8; 1];
    reader.read_exact(&mut buf)?;
    Ok(buf[0])
}

fn read_i32<R: Read>(reader: &mut R) -> Result<i32> {
    let mut buf = [0u8; 4];
    reader.read_exact(&mut buf)?;
    Ok(i32::from_le_bytes(buf))
}

fn read_u64<R: Read>(reader: &mut R) -> Result<u64> {
    let mut buf = [0u8; 8];
    reader.read_exact(&mut buf)?;
    Ok(u64::from_le_bytes(buf))
}
