use std::io::{self, Read};

use flate2::{Compress, Compression, FlushCompress, Status};

use cairn_crypto::{object_header, ObjectHasher};
use cairn_types::ObjectKind;

use crate::batch::PackBatch;
use crate::error::{StoreError, StoreResult};

/// Size of the input and output blocks used while streaming.
pub const STREAM_BLOCK_SIZE: usize = 16 * 1024;

/// Whether a check-in stores the object or only computes its ID.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum HashMode {
    Write,
    HashOnly,
}

/// Result of one attempt at streaming an object into the current pack.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum StreamOutcome {
    Completed,
    /// The object does not fit under the pack size limit; the caller must
    /// roll back, start a new pack, rewind the source, and try again.
    RestartNeeded,
}

/// Read exactly `buf.len()` bytes, classifying failures as fatal.
fn read_block<R: Read + ?Sized>(source: &mut R, buf: &mut [u8], offset: u64) -> StoreResult<()> {
    let mut filled = 0;
    while filled < buf.len() {
        match source.read(&mut buf[filled..]) {
            Ok(0) => {
                return Err(StoreError::ShortRead {
                    expected: buf.len() as u64,
                    actual: filled as u64,
                })
            }
            Ok(n) => filled += n,
            Err(err) if err.kind() == io::ErrorKind::Interrupted => {}
            Err(source) => {
                return Err(StoreError::SourceRead {
                    offset: offset + filled as u64,
                    source,
                })
            }
        }
    }
    Ok(())
}

/// Hash `size` bytes of `source` without storing anything.
pub fn hash_stream<R: Read + ?Sized>(
    source: &mut R,
    hasher: &mut ObjectHasher,
    size: u64,
) -> StoreResult<()> {
    let mut buf = vec![0u8; STREAM_BLOCK_SIZE];
    let mut offset = 0u64;
    while offset < size {
        let rsize = (size - offset).min(STREAM_BLOCK_SIZE as u64) as usize;
        read_block(source, &mut buf[..rsize], offset)?;
        hasher.update(&buf[..rsize]);
        offset += rsize as u64;
    }
    Ok(())
}

/// Deflate `size` bytes of `source` into the batch's open pack, feeding the
/// hasher with every byte past `already_hashed_to`.
///
/// The deflated stream starts with the object header, so the entry inflates
/// to exactly the bytes the ID was computed over. Output is written in
/// blocks of [`STREAM_BLOCK_SIZE`]; before each block goes out the size
/// limit is checked, and if it would be exceeded the attempt is abandoned
/// with [`StreamOutcome::RestartNeeded`]. Bytes already written for this
/// object stay in the pack for the caller to truncate.
///
/// `already_hashed_to` is advanced as bytes are hashed and must be kept by
/// the caller across restarts so no byte is hashed twice.
pub fn stream_to_pack<R: Read + ?Sized>(
    batch: &mut PackBatch,
    hasher: &mut ObjectHasher,
    already_hashed_to: &mut u64,
    source: &mut R,
    kind: ObjectKind,
    size: u64,
    level: Compression,
) -> StoreResult<StreamOutcome> {
    let mut deflater = Compress::new(level, true);
    let mut ibuf = vec![0u8; STREAM_BLOCK_SIZE];
    let mut obuf: Vec<u8> = Vec::with_capacity(STREAM_BLOCK_SIZE);

    // The header goes through the deflater ahead of the content.
    let header = object_header(kind, size);
    ibuf[..header.len()].copy_from_slice(&header);
    let mut in_pos = 0;
    let mut in_len = header.len();

    let mut remaining = size;
    let mut offset = 0u64;

    loop {
        if in_pos == in_len && remaining > 0 {
            let rsize = remaining.min(STREAM_BLOCK_SIZE as u64) as usize;
            read_block(source, &mut ibuf[..rsize], offset)?;
            offset += rsize as u64;
            if *already_hashed_to < offset {
                let hsize = ((offset - *already_hashed_to) as usize).min(rsize);
                hasher.update(&ibuf[rsize - hsize..rsize]);
                *already_hashed_to = offset;
            }
            in_pos = 0;
            in_len = rsize;
            remaining -= rsize as u64;
        }

        let flush = if remaining == 0 {
            FlushCompress::Finish
        } else {
            FlushCompress::None
        };
        let before = deflater.total_in();
        let status = deflater
            .compress_vec(&ibuf[in_pos..in_len], &mut obuf, flush)
            .map_err(|e| StoreError::Compression(e.to_string()))?;
        in_pos += (deflater.total_in() - before) as usize;

        let done = status == Status::StreamEnd;
        if obuf.len() == obuf.capacity() || (done && !obuf.is_empty()) {
            if batch.would_exceed(obuf.len()) {
                return Ok(StreamOutcome::RestartNeeded);
            }
            batch.write(&obuf)?;
            obuf.clear();
        }
        if done {
            return Ok(StreamOutcome::Completed);
        }
    }
}
