/// How a job's bytes are transferred.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransferStrategy {
    /// One request for the whole body.
    SingleStream,
    /// `connections` parallel range requests.
    Chunked { connections: usize },
}

/// Picks a strategy once the size and range support are known.
///
/// Single stream when the size is unknown or zero, the server refuses
/// ranges, only one connection is requested, or each connection would get
/// less than `min_chunk_size` bytes. Chunked otherwise.
pub fn choose_strategy(
    size: Option<u64>,
    accept_ranges: bool,
    connections: usize,
    min_chunk_size: u64,
) -> TransferStrategy {
    let Some(size) = size.filter(|&s| s > 0) else {
        return TransferStrategy::SingleStream;
    };
    if !accept_ranges || connections <= 1 {
        return TransferStrategy::SingleStream;
    }
    if size / (connections as u64) < min_chunk_size.max(1) {
        return TransferStrategy::SingleStream;
    }
    TransferStrategy::Chunked { connections }
}
