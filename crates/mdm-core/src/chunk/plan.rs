//! Chunk type and range planning.

/// One byte range `[start, end]` (inclusive) of a chunked transfer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Chunk {
    /// 0-based position; orders assembly and names the part file.
    pub index: usize,
    /// First byte (inclusive).
    pub start: u64,
    /// Last byte (inclusive).
    pub end: u64,
    /// Bytes of this chunk already in its part file.
    pub downloaded: u64,
    pub completed: bool,
}

impl Chunk {
    pub fn new(index: usize, start: u64, end: u64) -> Self {
        Self {
            index,
            start,
            end,
            downloaded: 0,
            completed: false,
        }
    }

    /// Number of bytes this chunk covers.
    pub fn len(&self) -> u64 {
        self.end - self.start + 1
    }

    /// Bytes still missing from the part file.
    pub fn remaining(&self) -> u64 {
        self.len().saturating_sub(self.downloaded)
    }
}

/// Splits `total_size` bytes into `connections` chunks.
///
/// Every chunk but the last spans `total_size / connections` bytes; the last
/// one ends at `total_size - 1` and absorbs the remainder. Returns an empty
/// plan when any chunk would be empty (`total_size < connections`, or either
/// argument is 0); callers route such transfers to a single stream.
pub fn plan_chunks(total_size: u64, connections: usize) -> Vec<Chunk> {
    if total_size == 0 || connections == 0 {
        return Vec::new();
    }
    let count = connections as u64;
    let chunk_size = total_size / count;
    if chunk_size == 0 {
        return Vec::new();
    }

    (0..count)
        .map(|i| {
            let start = i * chunk_size;
            let end = if i == count - 1 {
                total_size - 1
            } else {
                (i + 1) * chunk_size - 1
            };
            Chunk::new(i as usize, start, end)
        })
        .collect()
}
