//! The .hap format: schema, records, header, streaming I/O, validation,
//! and indexed region access.
//!
//! A .hap file is UTF-8 text, one tab-delimited record per line, with the
//! line type in column 1. `H` lines name haplotypes as genomic intervals;
//! `V` lines attach variants to them by haplotype ID. A header of `#`
//! lines may declare typed extra columns per line type (see [`schema`]).
//!
//! Module layout:
//!
//! - [`schema`]: extra-field declarations and format tags
//! - [`record`]: `H`/`V` records and the line codec
//! - [`header`]: comments, version pragma, declaration parsing
//! - [`reader`]: streaming parser and the in-memory [`reader::HapFile`]
//! - [`writer`]: streaming writer with header regeneration
//! - [`validator`]: cross-record invariants and sort checking
//! - [`index`]: linear region index over BGZF-compressed files
//! - [`region`]: query region parsing

pub mod header;
pub mod index;
pub mod reader;
pub mod record;
pub mod region;
pub mod schema;
pub mod validator;
pub mod writer;

pub use header::Header;
pub use index::{HapIndex, IndexedHapReader, RegionQuery};
pub use reader::{HapFile, HapReader};
pub use record::{FieldValue, HapRecord, Haplotype, Variant};
pub use region::Region;
pub use schema::{FieldDef, FieldType, LineType, Schema};
pub use validator::{ValidationMode, Validator};
pub use writer::HapWriter;
