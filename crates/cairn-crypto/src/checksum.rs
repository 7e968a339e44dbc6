use std::fs::File;
use std::io::{self, Read, Seek, SeekFrom, Write};

/// Width of the BLAKE3 trailer appended to pack and index files.
pub const CHECKSUM_LEN: usize = 32;

/// Sinks that can be cut back to a shorter length and keep appending from
/// there.
pub trait Truncate {
    /// Discard everything past `len` bytes and position further writes at
    /// `len`.
    fn truncate_to(&mut self, len: u64) -> io::Result<()>;
}

impl Truncate for File {
    fn truncate_to(&mut self, len: u64) -> io::Result<()> {
        self.set_len(len)?;
        self.seek(SeekFrom::Start(len))?;
        Ok(())
    }
}

impl Truncate for Vec<u8> {
    fn truncate_to(&mut self, len: u64) -> io::Result<()> {
        let len = usize::try_from(len)
            .map_err(|_| io::Error::new(io::ErrorKind::InvalidInput, "length exceeds usize"))?;
        self.truncate(len);
        Ok(())
    }
}

/// Rollback point for a [`ChecksumWriter`]: the byte offset and the running
/// hash state at that offset.
#[derive(Clone, Debug)]
pub struct Checkpoint {
    offset: u64,
    hasher: blake3::Hasher,
}

impl Checkpoint {
    /// Byte offset the checkpoint was taken at.
    pub fn offset(&self) -> u64 {
        self.offset
    }
}

/// Writer that tracks the running BLAKE3 checksum and byte count of
/// everything passing through it.
///
/// A CRC32 can additionally be tracked over a window of writes between
/// [`crc32_begin`](Self::crc32_begin) and [`crc32_end`](Self::crc32_end);
/// pack entries record this CRC in their index.
pub struct ChecksumWriter<W> {
    inner: W,
    hasher: blake3::Hasher,
    offset: u64,
    crc: Option<crc32fast::Hasher>,
}

impl<W: Write> ChecksumWriter<W> {
    /// Wrap a sink positioned at offset zero.
    pub fn new(inner: W) -> Self {
        Self {
            inner,
            hasher: blake3::Hasher::new(),
            offset: 0,
            crc: None,
        }
    }

    /// Bytes written so far.
    pub fn offset(&self) -> u64 {
        self.offset
    }

    /// Record a rollback point at the current offset.
    pub fn checkpoint(&self) -> Checkpoint {
        Checkpoint {
            offset: self.offset,
            hasher: self.hasher.clone(),
        }
    }

    /// Start accumulating a CRC32 over subsequent writes.
    pub fn crc32_begin(&mut self) {
        self.crc = Some(crc32fast::Hasher::new());
    }

    /// Stop accumulating and return the CRC32 of the bytes written since
    /// [`crc32_begin`](Self::crc32_begin). Returns the empty CRC if no
    /// window was open.
    pub fn crc32_end(&mut self) -> u32 {
        self.crc.take().map(|c| c.finalize()).unwrap_or(0)
    }

    /// Checksum of everything written so far.
    pub fn checksum(&self) -> [u8; CHECKSUM_LEN] {
        *self.hasher.finalize().as_bytes()
    }

    /// Append the checksum trailer, flush, and hand back the sink along with
    /// the checksum.
    pub fn finish(mut self) -> io::Result<(W, [u8; CHECKSUM_LEN])> {
        let sum = self.checksum();
        self.inner.write_all(&sum)?;
        self.inner.flush()?;
        Ok((self.inner, sum))
    }

    /// Flush and hand back the sink without writing a trailer.
    pub fn into_inner(mut self) -> io::Result<W> {
        self.inner.flush()?;
        Ok(self.inner)
    }

    pub fn get_ref(&self) -> &W {
        &self.inner
    }
}

impl<W: Write + Truncate> ChecksumWriter<W> {
    /// Roll the sink and hash state back to `checkpoint`.
    pub fn truncate(&mut self, checkpoint: &Checkpoint) -> io::Result<()> {
        self.inner.flush()?;
        self.inner.truncate_to(checkpoint.offset)?;
        self.offset = checkpoint.offset;
        self.hasher = checkpoint.hasher.clone();
        Ok(())
    }
}

impl<W: Write> Write for ChecksumWriter<W> {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        let n = self.inner.write(buf)?;
        let written = &buf[..n];
        self.hasher.update(written);
        if let Some(crc) = self.crc.as_mut() {
            crc.update(written);
        }
        self.offset += n as u64;
        Ok(n)
    }

    fn flush(&mut self) -> io::Result<()> {
        self.inner.flush()
    }
}

/// Checksum exactly `len` bytes read from `reader`.
pub fn checksum_reader<R: Read>(reader: &mut R, len: u64) -> io::Result<[u8; CHECKSUM_LEN]> {
    let mut hasher = blake3::Hasher::new();
    let copied = io::copy(&mut reader.take(len), &mut hasher)?;
    if copied != len {
        return Err(io::Error::new(
            io::ErrorKind::UnexpectedEof,
            format!("expected {len} bytes to checksum, found {copied}"),
        ));
    }
    Ok(*hasher.finalize().as_bytes())
}
