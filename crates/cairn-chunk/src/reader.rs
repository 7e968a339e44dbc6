use std::collections::HashMap;

use cairn_crypto::CHECKSUM_LEN;

use crate::error::{ChunkError, ChunkResult};
use crate::CHUNK_LOOKUP_WIDTH;

/// A validated table of contents over a chunked file held in memory.
///
/// Chunk slices borrow from the backing bytes, so a memory map can be handed
/// in directly without copying.
#[derive(Debug)]
pub struct TableOfContents<'a> {
    chunks: HashMap<u32, &'a [u8]>,
    order: Vec<u32>,
}

impl<'a> TableOfContents<'a> {
    /// Decode `toc_length` records starting at `toc_offset`, followed by the
    /// terminator record.
    ///
    /// Rejects a terminator (id 0) before the last slot, a non-zero final
    /// id, duplicate ids, and any chunk whose end precedes its start or that
    /// would overlap the trailing file checksum.
    pub fn read(data: &'a [u8], toc_offset: u64, toc_length: usize) -> ChunkResult<Self> {
        let out_of_bounds = || ChunkError::TocOutOfBounds {
            offset: toc_offset,
            entries: toc_length,
            file_len: data.len(),
        };
        let start = usize::try_from(toc_offset).map_err(|_| out_of_bounds())?;
        let table_len = toc_length
            .checked_add(1)
            .and_then(|n| n.checked_mul(CHUNK_LOOKUP_WIDTH))
            .ok_or_else(out_of_bounds)?;
        let table = start
            .checked_add(table_len)
            .and_then(|end| data.get(start..end))
            .ok_or_else(out_of_bounds)?;
        let data_limit = data.len().saturating_sub(CHECKSUM_LEN) as u64;

        let mut chunks = HashMap::with_capacity(toc_length);
        let mut order = Vec::with_capacity(toc_length);
        let mut records = table.chunks_exact(CHUNK_LOOKUP_WIDTH);

        let mut current = records.next().map(decode_record).ok_or_else(out_of_bounds)?;
        for next in records {
            let (chunk_id, chunk_offset) = current;
            let next = decode_record(next);
            if chunk_id == 0 {
                return Err(ChunkError::EarlyTerminator);
            }

            let next_offset = next.1;
            if next_offset < chunk_offset || next_offset > data_limit {
                return Err(ChunkError::ImproperOffsets {
                    start: chunk_offset,
                    end: next_offset,
                });
            }
            if chunks.contains_key(&chunk_id) {
                return Err(ChunkError::DuplicateId(chunk_id));
            }

            // Both offsets are bounded by `data_limit`, itself a usize.
            let slice = &data[chunk_offset as usize..next_offset as usize];
            chunks.insert(chunk_id, slice);
            order.push(chunk_id);
            current = next;
        }

        let (final_id, _) = current;
        if final_id != 0 {
            return Err(ChunkError::NonZeroTerminator(final_id));
        }

        Ok(Self { chunks, order })
    }

    /// Number of chunks in the table, terminator excluded.
    pub fn len(&self) -> usize {
        self.order.len()
    }

    pub fn is_empty(&self) -> bool {
        self.order.is_empty()
    }

    /// Chunk ids in table order.
    pub fn ids(&self) -> &[u32] {
        &self.order
    }

    /// The bytes of chunk `id`, or `None` if the file has no such chunk.
    pub fn pair_chunk(&self, id: u32) -> Option<&'a [u8]> {
        self.chunks.get(&id).copied()
    }

    /// Run `read` over chunk `id` if it is present.
    pub fn read_chunk<T, F>(&self, id: u32, read: F) -> ChunkResult<Option<T>>
    where
        F: FnOnce(&'a [u8]) -> ChunkResult<T>,
    {
        self.pair_chunk(id).map(read).transpose()
    }
}

fn decode_record(record: &[u8]) -> (u32, u64) {
    let mut id = [0u8; 4];
    let mut offset = [0u8; 8];
    id.copy_from_slice(&record[..4]);
    offset.copy_from_slice(&record[4..CHUNK_LOOKUP_WIDTH]);
    (u32::from_be_bytes(id), u64::from_be_bytes(offset))
}

#[cfg(test)]
mod tests {
    use super::*;

    /// Hand-assemble a file: table at offset 0, `body` bytes, then a zeroed
    /// checksum.
    fn raw_file(records: &[(u32, u64)], body: usize) -> Vec<u8> {
        let mut out = Vec::new();
        for (id, offset) in records {
            out.extend_from_slice(&id.to_be_bytes());
            out.extend_from_slice(&offset.to_be_bytes());
        }
        out.resize(out.len() + body + CHECKSUM_LEN, 0);
        out
    }

    #[test]
    fn valid_table() {
        let file = raw_file(&[(7, 24), (0, 30)], 6);
        let toc = TableOfContents::read(&file, 0, 1).unwrap();
        assert_eq!(toc.ids(), &[7]);
        assert_eq!(toc.pair_chunk(7).unwrap().len(), 6);
    }

    #[test]
    fn duplicate_id_rejected() {
        let file = raw_file(&[(5, 36), (5, 40), (0, 44)], 8);
        let err = TableOfContents::read(&file, 0, 2).unwrap_err();
        assert_eq!(err, ChunkError::DuplicateId(5));
    }

    #[test]
    fn non_zero_terminator_rejected() {
        let file = raw_file(&[(1, 24), (9, 28)], 4);
        let err = TableOfContents::read(&file, 0, 1).unwrap_err();
        assert_eq!(err, ChunkError::NonZeroTerminator(9));
    }

    #[test]
    fn early_terminator_rejected() {
        let file = raw_file(&[(0, 36), (1, 36), (0, 40)], 4);
        let err = TableOfContents::read(&file, 0, 2).unwrap_err();
        assert_eq!(err, ChunkError::EarlyTerminator);
    }

    #[test]
    fn decreasing_offsets_rejected() {
        let file = raw_file(&[(1, 40), (2, 36), (0, 44)], 8);
        let err = TableOfContents::read(&file, 0, 2).unwrap_err();
        assert_eq!(err, ChunkError::ImproperOffsets { start: 40, end: 36 });
    }

    #[test]
    fn chunk_overlapping_checksum_rejected() {
        // Body is 4 bytes, but the terminator claims 8.
        let file = raw_file(&[(1, 24), (0, 32)], 4);
        let err = TableOfContents::read(&file, 0, 1).unwrap_err();
        assert!(matches!(err, ChunkError::ImproperOffsets { end: 32, .. }));
    }

    #[test]
    fn table_past_end_of_file() {
        let file = raw_file(&[(1, 24)], 0);
        let err = TableOfContents::read(&file, 0, 40).unwrap_err();
        assert!(matches!(err, ChunkError::TocOutOfBounds { entries: 40, .. }));
        let err = TableOfContents::read(&file, u64::MAX, 1).unwrap_err();
        assert!(matches!(err, ChunkError::TocOutOfBounds { .. }));
    }

    #[test]
    fn read_chunk_maps_errors() {
        let file = raw_file(&[(3, 24), (0, 27)], 3);
        let toc = TableOfContents::read(&file, 0, 1).unwrap();
        let err = toc
            .read_chunk(3, |bytes| {
                Err::<(), _>(ChunkError::Malformed {
                    id: 3,
                    reason: format!("{} bytes", bytes.len()),
                })
            })
            .unwrap_err();
        assert_eq!(
            err,
            ChunkError::Malformed {
                id: 3,
                reason: "3 bytes".into()
            }
        );
    }
}
