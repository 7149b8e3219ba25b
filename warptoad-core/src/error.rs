//! Error types for the WarpToad core primitives.

use thiserror::Error;

use crate::types::ChainId;

/// Error type shared by commitments, accumulators, aggregation and fees.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum WarpToadError {
    /// The accumulator has no free leaf left.
    #[error("accumulator capacity exceeded: leaf index {index} does not fit a depth-{depth} tree")]
    CapacityExceeded { index: u64, depth: usize },

    /// The leaf exists but no checkpoint covers it yet.
    #[error("leaf {index} is not covered by a checkpoint (checkpointed leaves: {checkpointed})")]
    LeafNotCheckpointed { index: u64, checkpointed: u64 },

    /// No burn with this commitment was appended.
    #[error("leaf not found: {0}")]
    LeafNotFound(String),

    /// A checkpoint sequence number that was never issued.
    #[error("unknown checkpoint sequence {0}")]
    UnknownCheckpoint(u64),

    /// Tree depth outside the supported range.
    #[error("invalid tree depth {0}")]
    InvalidDepth(usize),

    /// Bytes that are not a canonical BN254 scalar encoding.
    #[error("invalid field element: {0}")]
    InvalidFieldElement(String),

    /// Price, gas or margin inputs that cannot produce a fee factor.
    #[error("invalid fee quote: {0}")]
    InvalidFeeQuote(String),

    /// Aggregation over zero chains.
    #[error("cannot aggregate an empty set of chains")]
    EmptyAggregation,

    /// More chains than the giga tree has leaves.
    #[error("too many chains for the giga tree: {count} > {capacity}")]
    TooManyChains { count: usize, capacity: usize },

    /// A participating chain never reported a local root.
    #[error("no local root known for chain {0}")]
    MissingLocalRoot(ChainId),

    /// The chain is not part of the aggregated snapshot.
    #[error("chain {0} is not part of the giga root snapshot")]
    ChainNotAggregated(ChainId),

    /// The private witness does not satisfy the mint relation.
    #[error("invalid witness: {0}")]
    InvalidWitness(String),
}

impl WarpToadError {
    /// Errors that may disappear once more blocks, checkpoints or relay rounds happen.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            WarpToadError::LeafNotCheckpointed { .. }
                | WarpToadError::LeafNotFound(_)
                | WarpToadError::MissingLocalRoot(_)
                | WarpToadError::ChainNotAggregated(_)
        )
    }

    /// Errors no amount of waiting can fix.
    pub fn is_fatal(&self) -> bool {
        !self.is_retryable()
    }
}

impl From<hex::FromHexError> for WarpToadError {
    fn from(err: hex::FromHexError) -> Self {
        WarpToadError::InvalidFieldElement(err.to_string())
    }
}

pub type Result<T> = std::result::Result<T, WarpToadError>;
