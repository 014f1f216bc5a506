//! BGZF block compression with virtual-offset random access.
//!
//! BGZF (Blocked GNU Zip Format) is the seekable gzip variant used for
//! indexed genomic files. A BGZF file is a series of independent gzip
//! members, each at most 64 KB uncompressed, each carrying its own
//! compressed size in a `BC` extra subfield so a reader can jump from block
//! header to block header without inflating anything.
//!
//! # Virtual offsets
//!
//! A position inside a BGZF file is a 64-bit *virtual offset*: the upper
//! 48 bits are the compressed byte offset of a block, the lower 16 bits the
//! uncompressed offset within that block. Virtual offsets compare in file
//! order, which is what makes them usable as index checkpoints.
//!
//! # Block structure
//!
//! Each block:
//! - Bytes 0-9: gzip header (ID1=31, ID2=139, CM=8, FLG=4, MTIME=0, XFL=0, OS=255)
//! - Bytes 10-11: XLEN (extra field length)
//! - Extra subfield: SI1='B', SI2='C', SLEN=2, BSIZE (total block size - 1)
//! - Deflate-compressed payload
//! - CRC32 of the payload, then ISIZE (payload length)
//!
//! A file ends with a fixed 28-byte empty block (the EOF marker).

use crate::error::Result;
use flate2::read::DeflateDecoder;
use flate2::write::DeflateEncoder;
use flate2::Compression;
use rayon::prelude::*;
use std::fmt;
use std::fs::File;
use std::io::{self, Read, Seek, SeekFrom, Write};
use std::path::Path;

/// Maximum uncompressed payload per block.
///
/// The BGZF spec caps uncompressed blocks at 64 KB; 60 KB leaves headroom
/// so the compressed block stays under the cap even on incompressible data.
const BLOCK_SIZE: usize = 60 * 1024;

/// Number of pending blocks compressed together in one parallel batch.
const PARALLEL_BLOCK_COUNT: usize = 8;

/// The fixed empty block that terminates every BGZF file.
const EOF_MARKER: [u8; 28] = [
    31, 139, 8, 4, 0, 0, 0, 0, 0, 255, // gzip header
    6, 0, 66, 67, 2, 0, 27, 0, // extra field: BC, BSIZE=27
    3, 0, // empty deflate block
    0, 0, 0, 0, // CRC32
    0, 0, 0, 0, // ISIZE
];

/// A position inside a BGZF file: compressed block offset plus
/// uncompressed offset within the block.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default)]
pub struct VirtualOffset(u64);

impl VirtualOffset {
    /// Compose from a compressed block offset and an intra-block offset.
    pub fn new(compressed: u64, within_block: u16) -> Self {
        VirtualOffset((compressed << 16) | u64::from(within_block))
    }

    /// Reinterpret a raw 64-bit value (as stored in an index).
    pub fn from_raw(raw: u64) -> Self {
        VirtualOffset(raw)
    }

    /// The raw 64-bit value.
    pub fn as_raw(self) -> u64 {
        self.0
    }

    /// Compressed byte offset of the containing block.
    pub fn compressed_offset(self) -> u64 {
        self.0 >> 16
    }

    /// Uncompressed offset within the block.
    pub fn block_offset(self) -> u16 {
        (self.0 & 0xffff) as u16
    }
}

impl fmt::Display for VirtualOffset {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.compressed_offset(), self.block_offset())
    }
}

fn invalid_data(msg: String) -> io::Error {
    io::Error::new(io::ErrorKind::InvalidData, msg)
}

/// One decoded block: payload plus how many compressed bytes it occupied.
struct Block {
    data: Vec<u8>,
    compressed_len: u64,
}

/// Read and inflate the block starting at the reader's current position.
///
/// Returns `None` on clean EOF (no bytes left).
fn read_block<R: Read>(reader: &mut R) -> io::Result<Option<Block>> {
    let mut header = [0u8; 12];
    let mut filled = 0;
    while filled < header.len() {
        let n = reader.read(&mut header[filled..])?;
        if n == 0 {
            if filled == 0 {
                return Ok(None);
            }
            return Err(invalid_data(format!(
                "truncated BGZF block header ({} of 12 bytes)",
                filled
            )));
        }
        filled += n;
    }

    if header[0] != 31 || header[1] != 139 {
        return Err(invalid_data(format!(
            "invalid gzip magic: [{}, {}]",
            header[0], header[1]
        )));
    }
    if header[3] & 0x04 == 0 {
        return Err(invalid_data(
            "gzip member without extra field is not BGZF".to_string(),
        ));
    }

    let xlen = u16::from_le_bytes([header[10], header[11]]) as usize;
    let mut extra = vec![0u8; xlen];
    reader.read_exact(&mut extra)?;

    // Locate the BC subfield carrying the block size.
    let mut bsize: Option<u16> = None;
    let mut pos = 0;
    while pos + 4 <= xlen {
        let slen = u16::from_le_bytes([extra[pos + 2], extra[pos + 3]]) as usize;
        if extra[pos] == b'B' && extra[pos + 1] == b'C' && slen == 2 {
            if pos + 6 > xlen {
                return Err(invalid_data("incomplete BSIZE field".to_string()));
            }
            bsize = Some(u16::from_le_bytes([extra[pos + 4], extra[pos + 5]]));
            break;
        }
        pos += 4 + slen;
    }
    let block_size = match bsize {
        Some(bs) => bs as usize + 1,
        None => return Err(invalid_data("missing BGZF BC subfield".to_string())),
    };

    let overhead = 12 + xlen + 8;
    if block_size < overhead {
        return Err(invalid_data(format!(
            "BGZF block size {} smaller than its own framing",
            block_size
        )));
    }
    let mut payload = vec![0u8; block_size - overhead];
    reader.read_exact(&mut payload)?;

    let mut trailer = [0u8; 8];
    reader.read_exact(&mut trailer)?;
    let crc = u32::from_le_bytes([trailer[0], trailer[1], trailer[2], trailer[3]]);
    let isize = u32::from_le_bytes([trailer[4], trailer[5], trailer[6], trailer[7]]);

    let mut data = Vec::with_capacity(isize as usize);
    DeflateDecoder::new(&payload[..]).read_to_end(&mut data)?;

    if data.len() != isize as usize {
        return Err(invalid_data(format!(
            "BGZF block inflated to {} bytes, expected {}",
            data.len(),
            isize
        )));
    }
    if crc32fast::hash(&data) != crc {
        return Err(invalid_data("BGZF block CRC mismatch".to_string()));
    }

    Ok(Some(Block {
        data,
        compressed_len: block_size as u64,
    }))
}

/// Random-access BGZF reader.
///
/// Decodes one block at a time, tracks the virtual offset of every byte it
/// hands out, and can jump to any previously recorded [`VirtualOffset`].
/// Each reader owns its own file cursor, so independent readers over the
/// same file can run concurrently.
pub struct BgzfReader<R: Read + Seek> {
    inner: R,
    /// Decompressed payload of the current block
    block: Vec<u8>,
    /// Read position within `block`
    pos: usize,
    /// Compressed offset of the current block
    block_offset: u64,
    /// Compressed offset of the block after the current one
    next_offset: u64,
    eof: bool,
}

impl BgzfReader<File> {
    /// Opens a BGZF file for random access.
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        Ok(Self::new(File::open(path)?))
    }
}

impl<R: Read + Seek> BgzfReader<R> {
    /// Wraps a seekable byte source positioned at the start of a BGZF stream.
    pub fn new(inner: R) -> Self {
        BgzfReader {
            inner,
            block: Vec::new(),
            pos: 0,
            block_offset: 0,
            next_offset: 0,
            eof: false,
        }
    }

    /// Virtual offset of the next byte this reader will yield.
    pub fn virtual_offset(&self) -> VirtualOffset {
        if self.pos < self.block.len() {
            VirtualOffset::new(self.block_offset, self.pos as u16)
        } else {
            VirtualOffset::new(self.next_offset, 0)
        }
    }

    /// Repositions the reader at `offset`.
    pub fn seek_virtual(&mut self, offset: VirtualOffset) -> io::Result<()> {
        let compressed = offset.compressed_offset();
        self.inner.seek(SeekFrom::Start(compressed))?;
        self.eof = false;
        match read_block(&mut self.inner)? {
            Some(block) => {
                let within = offset.block_offset() as usize;
                if within > block.data.len() {
                    return Err(invalid_data(format!(
                        "virtual offset {} points past the end of its block",
                        offset
                    )));
                }
                self.block = block.data;
                self.pos = within;
                self.block_offset = compressed;
                self.next_offset = compressed + block.compressed_len;
            }
            None => {
                if offset.block_offset() != 0 {
                    return Err(invalid_data(format!(
                        "virtual offset {} points past end of file",
                        offset
                    )));
                }
                self.block.clear();
                self.pos = 0;
                self.block_offset = compressed;
                self.next_offset = compressed;
                self.eof = true;
            }
        }
        Ok(())
    }

    /// Loads the next block in sequence. Returns false at end of stream.
    fn advance_block(&mut self) -> io::Result<bool> {
        if self.eof {
            return Ok(false);
        }
        loop {
            match read_block(&mut self.inner)? {
                Some(block) => {
                    self.block_offset = self.next_offset;
                    self.next_offset += block.compressed_len;
                    self.pos = 0;
                    // The EOF marker (and any other empty block) carries no
                    // payload; keep going until data or end of stream.
                    if block.data.is_empty() {
                        continue;
                    }
                    self.block = block.data;
                    return Ok(true);
                }
                None => {
                    self.eof = true;
                    self.block.clear();
                    self.pos = 0;
                    return Ok(false);
                }
            }
        }
    }

    /// Reads one line (up to and including `\n`, which is stripped along
    /// with a preceding `\r`) into `buf`. Returns the number of raw bytes
    /// consumed; 0 means end of stream.
    pub fn read_line(&mut self, buf: &mut String) -> io::Result<usize> {
        let mut bytes: Vec<u8> = Vec::new();
        let mut consumed = 0;
        loop {
            if self.pos >= self.block.len() {
                if !self.advance_block()? {
                    break;
                }
            }
            let rest = &self.block[self.pos..];
            match rest.iter().position(|&b| b == b'\n') {
                Some(idx) => {
                    bytes.extend_from_slice(&rest[..idx]);
                    self.pos += idx + 1;
                    consumed += idx + 1;
                    break;
                }
                None => {
                    bytes.extend_from_slice(rest);
                    consumed += rest.len();
                    self.pos = self.block.len();
                }
            }
        }
        if bytes.last() == Some(&b'\r') {
            bytes.pop();
        }
        let text = String::from_utf8(bytes)
            .map_err(|e| invalid_data(format!("line is not valid UTF-8: {}", e)))?;
        buf.push_str(&text);
        Ok(consumed)
    }
}

/// Compress one payload into a complete BGZF block.
fn compress_block(data: &[u8]) -> io::Result<Vec<u8>> {
    let mut deflate = DeflateEncoder::new(Vec::new(), Compression::default());
    deflate.write_all(data)?;
    let deflated = deflate.finish()?;

    let crc = crc32fast::hash(data);
    let isize = data.len() as u32;

    let mut block = Vec::with_capacity(deflated.len() + 26);
    block.extend_from_slice(&[31, 139, 8, 4, 0, 0, 0, 0, 0, 255]);
    block.extend_from_slice(&6u16.to_le_bytes()); // XLEN
    block.extend_from_slice(b"BC");
    block.extend_from_slice(&2u16.to_le_bytes()); // SLEN
    let bsize_pos = block.len();
    block.extend_from_slice(&0u16.to_le_bytes()); // BSIZE, patched below
    block.extend_from_slice(&deflated);
    block.extend_from_slice(&crc.to_le_bytes());
    block.extend_from_slice(&isize.to_le_bytes());

    let bsize = (block.len() - 1) as u16;
    block[bsize_pos..bsize_pos + 2].copy_from_slice(&bsize.to_le_bytes());
    Ok(block)
}

/// Streaming BGZF writer with parallel block compression.
///
/// Buffers up to [`PARALLEL_BLOCK_COUNT`] 60 KB payloads, compresses the
/// batch in parallel, and writes the blocks out in order, so memory stays
/// bounded (~1 MB) regardless of output size. Call [`BgzfWriter::finish`]
/// to flush the tail and append the EOF marker; dropping without it leaves
/// a visibly truncated file rather than a silently corrupt one.
pub struct BgzfWriter<W: Write> {
    writer: W,
    pending: Vec<Vec<u8>>,
    current: Vec<u8>,
    finished: bool,
}

impl BgzfWriter<File> {
    /// Creates a BGZF writer over a new file.
    pub fn create(path: impl AsRef<Path>) -> Result<Self> {
        Ok(Self::new(File::create(path)?))
    }
}

impl<W: Write> BgzfWriter<W> {
    /// Wraps a byte sink.
    pub fn new(writer: W) -> Self {
        BgzfWriter {
            writer,
            pending: Vec::with_capacity(PARALLEL_BLOCK_COUNT),
            current: Vec::with_capacity(BLOCK_SIZE),
            finished: false,
        }
    }

    fn flush_pending(&mut self) -> io::Result<()> {
        if self.pending.is_empty() {
            return Ok(());
        }
        let compressed: Vec<Vec<u8>> = self
            .pending
            .par_iter()
            .map(|payload| compress_block(payload))
            .collect::<io::Result<_>>()?;
        for block in compressed {
            self.writer.write_all(&block)?;
        }
        self.pending.clear();
        Ok(())
    }

    /// Compresses the tail, appends the BGZF EOF marker, and flushes.
    pub fn finish(mut self) -> io::Result<()> {
        self.finish_inner()
    }

    fn finish_inner(&mut self) -> io::Result<()> {
        if self.finished {
            return Ok(());
        }
        if !self.current.is_empty() {
            let payload = std::mem::take(&mut self.current);
            self.pending.push(payload);
        }
        self.flush_pending()?;
        self.writer.write_all(&EOF_MARKER)?;
        self.writer.flush()?;
        self.finished = true;
        Ok(())
    }
}

impl<W: Write> Write for BgzfWriter<W> {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        let mut remaining = buf;
        while !remaining.is_empty() {
            let space = BLOCK_SIZE - self.current.len();
            let take = remaining.len().min(space);
            self.current.extend_from_slice(&remaining[..take]);
            remaining = &remaining[take..];

            if self.current.len() >= BLOCK_SIZE {
                let payload =
                    std::mem::replace(&mut self.current, Vec::with_capacity(BLOCK_SIZE));
                self.pending.push(payload);
                if self.pending.len() >= PARALLEL_BLOCK_COUNT {
                    self.flush_pending()?;
                }
            }
        }
        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        self.writer.flush()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Cursor;

    fn bgzf_bytes(text: &[u8]) -> Vec<u8> {
        let mut out = Vec::new();
        {
            let mut writer = BgzfWriter::new(&mut out);
            writer.write_all(text).unwrap();
            writer.finish().unwrap();
        }
        out
    }

    #[test]
    fn test_virtual_offset_parts() {
        let v = VirtualOffset::new(0x1234, 0x56);
        assert_eq!(v.compressed_offset(), 0x1234);
        assert_eq!(v.block_offset(), 0x56);
        assert_eq!(VirtualOffset::from_raw(v.as_raw()), v);
    }

    #[test]
    fn test_virtual_offsets_order_like_file_positions() {
        let a = VirtualOffset::new(0, 100);
        let b = VirtualOffset::new(0, 200);
        let c = VirtualOffset::new(1, 0);
        assert!(a < b);
        assert!(b < c);
    }

    #[test]
    fn test_round_trip_small() {
        let text = b"H\tchr1\t100\t200\thap1\nV\thap1\t100\t150\trs1\tA\n";
        let compressed = bgzf_bytes(text);

        // Ends with the canonical EOF marker
        assert_eq!(&compressed[compressed.len() - 28..], &EOF_MARKER[..]);

        let mut reader = BgzfReader::new(Cursor::new(compressed));
        let mut line = String::new();
        reader.read_line(&mut line).unwrap();
        assert_eq!(line, "H\tchr1\t100\t200\thap1");
        line.clear();
        reader.read_line(&mut line).unwrap();
        assert_eq!(line, "V\thap1\t100\t150\trs1\tA");
        line.clear();
        assert_eq!(reader.read_line(&mut line).unwrap(), 0);
    }

    #[test]
    fn test_round_trip_multi_block() {
        // Force several blocks and a parallel batch.
        let mut text = Vec::new();
        for i in 0..40_000 {
            text.extend_from_slice(format!("line_{}\n", i).as_bytes());
        }
        let compressed = bgzf_bytes(&text);

        let mut reader = BgzfReader::new(Cursor::new(compressed));
        let mut line = String::new();
        let mut count = 0;
        while reader.read_line(&mut line).unwrap() > 0 {
            assert_eq!(line, format!("line_{}", count));
            line.clear();
            count += 1;
        }
        assert_eq!(count, 40_000);
    }

    #[test]
    fn test_seek_virtual_resumes_mid_stream() {
        let mut text = Vec::new();
        for i in 0..5_000 {
            text.extend_from_slice(format!("record_{:05}\n", i).as_bytes());
        }
        let compressed = bgzf_bytes(&text);

        // First pass: remember the offset of record 3000.
        let mut reader = BgzfReader::new(Cursor::new(compressed.clone()));
        let mut line = String::new();
        let mut target = None;
        for i in 0..5_000 {
            let offset = reader.virtual_offset();
            line.clear();
            reader.read_line(&mut line).unwrap();
            if i == 3_000 {
                target = Some((offset, line.clone()));
            }
        }
        let (offset, expected) = target.unwrap();

        // Second pass: jump straight there.
        let mut reader = BgzfReader::new(Cursor::new(compressed));
        reader.seek_virtual(offset).unwrap();
        line.clear();
        reader.read_line(&mut line).unwrap();
        assert_eq!(line, expected);
    }

    #[test]
    fn test_garbage_input_rejected() {
        let mut reader = BgzfReader::new(Cursor::new(b"this is not bgzf data at all".to_vec()));
        let mut line = String::new();
        assert!(reader.read_line(&mut line).is_err());
    }

    #[test]
    fn test_empty_file_is_clean_eof() {
        let compressed = bgzf_bytes(b"");
        let mut reader = BgzfReader::new(Cursor::new(compressed));
        let mut line = String::new();
        assert_eq!(reader.read_line(&mut line).unwrap(), 0);
    }

    #[test]
    fn test_crc_corruption_detected() {
        let mut compressed = bgzf_bytes(b"hello bgzf\n");
        // Flip a payload byte in the first (data) block, past the 18-byte
        // header, well before the EOF marker.
        compressed[20] ^= 0xff;
        let mut reader = BgzfReader::new(Cursor::new(compressed));
        let mut line = String::new();
        assert!(reader.read_line(&mut line).is_err());
    }
}
