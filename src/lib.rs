//! hapfile: streaming reader, writer, and region index for the .hap
//! haplotype format.
//!
//! # Overview
//!
//! The .hap format is a line-oriented, tab-delimited text format that
//! describes genomic haplotypes (`H` lines) and the variants that make
//! them up (`V` lines). This crate provides the format's core machinery:
//!
//! - **Schema-driven parsing**: a header-declared registry of typed extra
//!   columns per line type, resolved once and immutable thereafter
//! - **Strict codec**: exact column counts, typed coercion, and
//!   byte-stable serialization (floats render at their declared precision)
//! - **Validation**: haplotype-ID uniqueness, variant→haplotype reference
//!   resolution, and index-readiness (sort order, disjoint namespaces)
//! - **Indexed region queries**: a tabix-style linear index over sorted,
//!   BGZF-compressed files, so a region's records are fetched without a
//!   full-file scan
//!
//! # Quick start
//!
//! ```
//! use hapfile::{HapFile, HapReader};
//!
//! let data = "\
//! #H\tbeta\t.2f\tEffect size
//! H\tchr1\t100\t200\thap1\t0.50
//! V\thap1\t100\t150\trs123\tA
//! ";
//!
//! let file = HapFile::read_from(data.as_bytes())?;
//! file.validate()?;
//! assert_eq!(file.haplotypes().count(), 1);
//! assert_eq!(file.variants_of("hap1").count(), 1);
//! # Ok::<(), hapfile::HapError>(())
//! ```
//!
//! Region-scoped access over a compressed file:
//!
//! ```no_run
//! use hapfile::{IndexedHapReader, Region};
//!
//! # fn main() -> hapfile::Result<()> {
//! let mut reader = IndexedHapReader::open("cohort.hap.gz")?;
//! let region: Region = "chr1:100000-200000".parse()?;
//! for (haplotype, variants) in reader.fetch_region(&region)? {
//!     println!("{}: {} variant(s)", haplotype.id, variants.len());
//! }
//! # Ok(())
//! # }
//! ```

#![warn(missing_docs)]
#![warn(rustdoc::missing_crate_level_docs)]

pub mod error;
pub mod formats;
pub mod io;

// Re-export commonly used types
pub use error::{DanglingRef, HapError, Result};
pub use formats::{
    FieldType, FieldValue, HapFile, HapIndex, HapReader, HapRecord, HapWriter, Haplotype, Header,
    IndexedHapReader, LineType, Region, Schema, Variant,
};

/// Library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
