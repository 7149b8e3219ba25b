//! Shared protocol types and constants.

use serde::{Deserialize, Serialize};

use crate::field::FieldBytes;

/// Chain identifier (EVM chain id or equivalent).
pub type ChainId = u64;

/// Wrapped-asset amount in its smallest unit.
pub type Amount = u128;

/// Depth of every chain's local burn accumulator.
pub const LOCAL_TREE_DEPTH: usize = 32;

/// Depth of the giga tree folding per-chain roots.
pub const GIGA_TREE_DEPTH: usize = 5;

/// Maximum number of chains one giga root can cover.
pub const MAX_GIGA_CHAINS: usize = 1 << GIGA_TREE_DEPTH;

/// Execution domain of a chain relative to the giga-root hub.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ChainKind {
    /// Same domain as the hub; read and written directly.
    L1,
    /// Reached through a cross-domain messenger.
    L2,
}

impl ChainKind {
    pub fn is_cross_domain(&self) -> bool {
        matches!(self, ChainKind::L2)
    }
}

/// A chain's checkpointed local root as seen by the hub.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct LocalRootView {
    pub chain_id: ChainId,
    pub root: FieldBytes,
    /// Checkpoint sequence number on the source chain.
    pub sequence: u64,
    /// Leaves covered by the checkpoint.
    pub leaf_count: u64,
    /// Source-chain block at which the checkpoint was stored.
    pub block_number: u64,
}

impl LocalRootView {
    /// Whether this view supersedes `other` for the same chain.
    pub fn is_newer_than(&self, other: &LocalRootView) -> bool {
        self.sequence > other.sequence
    }
}
