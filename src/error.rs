use thiserror::Error;

// Unified error types for gtmat

/// Failures reported by an RMA transport binding.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum TransportError {
    #[error("rank {rank} out of range for a group of {size}")]
    RankOutOfRange { rank: usize, size: usize },
    #[error("no access epoch open on rank {0}")]
    NoEpoch(usize),
    #[error("an access epoch is already open on rank {0}")]
    AlreadyLocked(usize),
    #[error("unlock of rank {0} without a matching lock")]
    NotLocked(usize),
    #[error("invalid transfer descriptor: {0}")]
    InvalidDescriptor(String),
    #[error("source and target descriptors differ in shape: {src_rows}x{src_cols} vs {dst_rows}x{dst_cols}")]
    ShapeMismatch {
        src_rows: usize,
        src_cols: usize,
        dst_rows: usize,
        dst_cols: usize,
    },
    #[error("source view needs {needed} elements, buffer has {len}")]
    SourceOutOfBounds { needed: usize, len: usize },
    #[error("target view reaches element {end} of rank {rank}, window has {len}")]
    TargetOutOfBounds { rank: usize, end: usize, len: usize },
}

/// Errors surfaced by the distributed matrix.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum GtmError {
    #[error("invalid partition: {0}")]
    InvalidPartition(String),
    #[error("process group has {actual} ranks, partition needs {expected}")]
    GroupSizeMismatch { expected: usize, actual: usize },
    #[error("invalid options: {0}")]
    InvalidOptions(String),
    #[error("source buffer of {len} elements with leading dimension {ld} cannot hold a {rows}x{cols} block")]
    InvalidSource {
        rows: usize,
        cols: usize,
        ld: usize,
        len: usize,
    },
    #[error("no batch update epoch is open")]
    BatchNotOpen,
    #[error("transport error: {0}")]
    Transport(#[from] TransportError),
}
