//! Transparent compression for streaming reads and writes.
//!
//! Readers sniff the gzip magic bytes, so plain-text and compressed .hap
//! files go through the same code path. Writers pick the output form from
//! the file extension: `.gz` and `.bgz` both produce BGZF, which every
//! gzip consumer can read and which is the only form the region index can
//! seek into.

use crate::io::bgzf::BgzfWriter;
use flate2::bufread::MultiGzDecoder;
use std::fs::File;
use std::io::{self, BufRead, BufReader, Read, Write};
use std::path::Path;

/// Buffered reader over a possibly-compressed byte source.
///
/// Detection is by content (gzip magic `1f 8b`), not extension, so a
/// mislabelled file still opens correctly.
pub struct CompressedReader {
    inner: Box<dyn BufRead + Send>,
}

impl CompressedReader {
    /// Opens a file, decompressing transparently if it is gzip/BGZF.
    pub fn open(path: impl AsRef<Path>) -> io::Result<Self> {
        let file = File::open(path)?;
        Self::new(BufReader::new(file))
    }

    /// Wraps an already-buffered reader, sniffing the first two bytes.
    pub fn new<R: BufRead + Send + 'static>(mut reader: R) -> io::Result<Self> {
        let is_gzip = {
            let peek = reader.fill_buf()?;
            peek.len() >= 2 && peek[0] == 0x1f && peek[1] == 0x8b
        };
        let inner: Box<dyn BufRead + Send> = if is_gzip {
            Box::new(BufReader::new(MultiGzDecoder::new(reader)))
        } else {
            Box::new(reader)
        };
        Ok(CompressedReader { inner })
    }
}

impl Read for CompressedReader {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        self.inner.read(buf)
    }
}

impl BufRead for CompressedReader {
    fn fill_buf(&mut self) -> io::Result<&[u8]> {
        self.inner.fill_buf()
    }

    fn consume(&mut self, amt: usize) {
        self.inner.consume(amt)
    }
}

/// Buffered writer over a possibly-compressed byte sink.
///
/// Call [`CompressedWriter::finish`] when done; for BGZF output that is
/// what appends the EOF marker.
pub enum CompressedWriter<W: Write> {
    /// Uncompressed output
    Plain(io::BufWriter<W>),
    /// BGZF output (seekable, index-compatible, gzip-readable)
    Bgzf(BgzfWriter<W>),
}

impl CompressedWriter<File> {
    /// Creates a writer for `path`, choosing the form from its extension:
    /// `.gz`/`.bgz` produce BGZF, anything else plain text.
    pub fn create(path: impl AsRef<Path>) -> io::Result<Self> {
        let path = path.as_ref();
        let compressed = matches!(
            path.extension().and_then(|s| s.to_str()),
            Some("gz") | Some("bgz")
        );
        let file = File::create(path)?;
        Ok(if compressed {
            CompressedWriter::Bgzf(BgzfWriter::new(file))
        } else {
            CompressedWriter::Plain(io::BufWriter::new(file))
        })
    }
}

impl<W: Write> CompressedWriter<W> {
    /// Wraps a sink without compression.
    pub fn plain(writer: W) -> Self {
        CompressedWriter::Plain(io::BufWriter::new(writer))
    }

    /// Wraps a sink with BGZF compression.
    pub fn bgzf(writer: W) -> Self {
        CompressedWriter::Bgzf(BgzfWriter::new(writer))
    }

    /// Flushes everything and finalizes the stream.
    pub fn finish(self) -> io::Result<()> {
        match self {
            CompressedWriter::Plain(mut w) => w.flush(),
            CompressedWriter::Bgzf(w) => w.finish(),
        }
    }
}

impl<W: Write> Write for CompressedWriter<W> {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        match self {
            CompressedWriter::Plain(w) => w.write(buf),
            CompressedWriter::Bgzf(w) => w.write(buf),
        }
    }

    fn flush(&mut self) -> io::Result<()> {
        match self {
            CompressedWriter::Plain(w) => w.flush(),
            CompressedWriter::Bgzf(w) => w.flush(),
        }
    }
}
