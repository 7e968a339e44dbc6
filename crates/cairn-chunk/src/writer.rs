use std::io::{self, Write};

use crate::{toc_len, CHUNK_LOOKUP_WIDTH};

type WriteFn<'a> = Box<dyn FnOnce(&mut dyn Write) -> io::Result<()> + 'a>;

struct ChunkInfo<'a> {
    id: u32,
    /// Bytes `write` is expected to produce.
    size: u64,
    write: WriteFn<'a>,
}

/// Collects chunks and writes them, table of contents first.
///
/// ```
/// # use std::io::Write;
/// use cairn_chunk::{chunk_id, ChunkWriter};
///
/// let fanout = vec![0u8; 1024];
/// let mut out = Vec::new();
/// let mut writer = ChunkWriter::new();
/// writer.add_chunk(chunk_id(b"OIDF"), fanout.len() as u64, |sink: &mut dyn Write| {
///     sink.write_all(&fanout)
/// });
/// let end = writer.write_to(&mut out, 0).unwrap();
/// assert_eq!(end as usize, out.len());
/// ```
#[derive(Default)]
pub struct ChunkWriter<'a> {
    chunks: Vec<ChunkInfo<'a>>,
}

impl<'a> ChunkWriter<'a> {
    pub fn new() -> Self {
        Self { chunks: Vec::new() }
    }

    /// Queue a chunk whose writer will produce exactly `size` bytes.
    ///
    /// # Panics
    ///
    /// If `id` is zero (reserved for the terminator) or already queued.
    pub fn add_chunk<F>(&mut self, id: u32, size: u64, write: F)
    where
        F: FnOnce(&mut dyn Write) -> io::Result<()> + 'a,
    {
        assert!(id != 0, "chunk id 0 is reserved for the terminator");
        assert!(
            self.chunks.iter().all(|c| c.id != id),
            "chunk id {id:08x} added twice"
        );
        self.chunks.push(ChunkInfo {
            id,
            size,
            write: Box::new(write),
        });
    }

    /// Number of chunks queued.
    pub fn len(&self) -> usize {
        self.chunks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.chunks.is_empty()
    }

    /// Write the table of contents and every chunk to `sink`.
    ///
    /// `base_offset` is the absolute file offset `sink` is positioned at;
    /// the offsets in the table are absolute. Returns the offset just past
    /// the last chunk.
    ///
    /// # Panics
    ///
    /// If a chunk writer produces a different number of bytes than it
    /// declared: the table already promised those offsets.
    pub fn write_to<W: Write>(self, sink: &mut W, base_offset: u64) -> io::Result<u64> {
        let mut cur_offset = base_offset + toc_len(self.chunks.len()) as u64;

        let mut record = [0u8; CHUNK_LOOKUP_WIDTH];
        for chunk in &self.chunks {
            record[..4].copy_from_slice(&chunk.id.to_be_bytes());
            record[4..].copy_from_slice(&cur_offset.to_be_bytes());
            sink.write_all(&record)?;
            cur_offset += chunk.size;
        }

        // Terminator marks the end of the last chunk.
        record[..4].copy_from_slice(&0u32.to_be_bytes());
        record[4..].copy_from_slice(&cur_offset.to_be_bytes());
        sink.write_all(&record)?;

        for chunk in self.chunks {
            let mut counted = CountingWriter {
                inner: &mut *sink,
                written: 0,
            };
            (chunk.write)(&mut counted)?;
            if counted.written != chunk.size {
                panic!(
                    "expected to write {} bytes to chunk {:08x}, but wrote {} instead",
                    chunk.size, chunk.id, counted.written
                );
            }
        }

        tracing::trace!(end = cur_offset, "chunked container written");
        Ok(cur_offset)
    }
}

struct CountingWriter<'w, W> {
    inner: &'w mut W,
    written: u64,
}

impl<W: Write> Write for CountingWriter<'_, W> {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        let n = self.inner.write(buf)?;
        self.written += n as u64;
        Ok(n)
    }

    fn flush(&mut self) -> io::Result<()> {
        self.inner.flush()
    }
}
