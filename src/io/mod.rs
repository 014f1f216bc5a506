//! I/O plumbing: BGZF block compression and transparent (de)compression.

pub mod bgzf;
pub mod compression;

pub use bgzf::{BgzfReader, BgzfWriter, VirtualOffset};
pub use compression::{CompressedReader, CompressedWriter};
