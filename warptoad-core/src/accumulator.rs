//! Lazy append-only Merkle accumulator for burn commitments.
//!
//! Nodes live in one contiguous vector per level. A node is stored only once
//! its whole subtree is filled, so stored nodes never change and stay valid
//! for every later tree size. Appends only push leaves and move a dirty
//! marker; interior levels are filled in when a checkpoint is taken.
//!
//! ```text
//!   level 2   [ n0 ]                       complete subtrees only
//!   level 1   [ n0 ][ n1 ]
//!   level 0   [ l0 ][ l1 ][ l2 ][ l3 ][ l4 ]   <- dirty_from = 4
//! ```
//!
//! Roots and paths for any past checkpoint size are rebuilt from the stored
//! complete subtrees plus the zero ladder for the empty right-hand side.

use std::collections::HashMap;

use halo2curves_axiom::bn256::Fr;
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::{
    error::{Result, WarpToadError},
    field::FieldBytes,
    hash::{zero_ladder, FieldHasher, PoseidonHasher},
    merkle::MerklePath,
};

/// Deepest supported tree; keeps `2^depth` within `u64` arithmetic headroom.
pub const MAX_TREE_DEPTH: usize = 48;

/// A finalized root in the accumulator's history.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Checkpoint {
    pub root: FieldBytes,
    /// Position in the history; strictly increasing.
    pub sequence: u64,
    /// Number of leaves the root covers.
    pub leaf_count: u64,
    /// Block at which the checkpoint was taken.
    pub block_number: u64,
}

#[derive(Clone, Debug)]
pub struct LocalAccumulator<H: FieldHasher = PoseidonHasher> {
    hasher: H,
    depth: usize,
    zeros: Vec<Fr>,
    /// `levels[l][i]` is the root of the complete subtree covering leaves
    /// `[i << l, (i + 1) << l)`.
    levels: Vec<Vec<Fr>>,
    /// First leaf whose ancestors are not materialized yet.
    dirty_from: Option<u64>,
    leaf_index_by_commitment: HashMap<FieldBytes, u64>,
    history: Vec<Checkpoint>,
}

impl LocalAccumulator<PoseidonHasher> {
    pub fn new(depth: usize) -> Result<Self> {
        Self::with_hasher(depth, PoseidonHasher)
    }
}

impl<H: FieldHasher> LocalAccumulator<H> {
    pub fn with_hasher(depth: usize, hasher: H) -> Result<Self> {
        if depth == 0 || depth > MAX_TREE_DEPTH {
            return Err(WarpToadError::InvalidDepth(depth));
        }
        let zeros = zero_ladder(&hasher, depth);
        Ok(Self {
            hasher,
            depth,
            zeros,
            levels: vec![Vec::new(); depth + 1],
            dirty_from: None,
            leaf_index_by_commitment: HashMap::new(),
            history: Vec::new(),
        })
    }

    pub fn depth(&self) -> usize {
        self.depth
    }

    pub fn capacity(&self) -> u64 {
        1u64 << self.depth
    }

    /// Index the next appended leaf will receive.
    pub fn next_index(&self) -> u64 {
        self.levels[0].len() as u64
    }

    pub fn history(&self) -> &[Checkpoint] {
        &self.history
    }

    pub fn latest_checkpoint(&self) -> Option<&Checkpoint> {
        self.history.last()
    }

    pub fn checkpoint_at(&self, sequence: u64) -> Result<&Checkpoint> {
        self.history
            .get(sequence as usize)
            .ok_or(WarpToadError::UnknownCheckpoint(sequence))
    }

    /// Latest checkpoint taken at or before `block_number`.
    pub fn root_at_block(&self, block_number: u64) -> Option<&Checkpoint> {
        self.history
            .iter()
            .rev()
            .find(|checkpoint| checkpoint.block_number <= block_number)
    }

    pub fn is_known_root(&self, root: &FieldBytes) -> bool {
        self.history.iter().any(|checkpoint| &checkpoint.root == root)
    }

    pub fn leaf(&self, index: u64) -> Option<FieldBytes> {
        self.levels[0]
            .get(index as usize)
            .map(FieldBytes::from_fr)
    }

    /// Index of the first leaf holding `commitment`.
    pub fn find_leaf(&self, commitment: &FieldBytes) -> Option<u64> {
        self.leaf_index_by_commitment.get(commitment).copied()
    }

    /// Append a commitment.
    ///
    /// # Returns
    /// The leaf index assigned to the commitment.
    pub fn append(&mut self, commitment: FieldBytes) -> Result<u64> {
        let index = self.next_index();
        if index >= self.capacity() {
            return Err(WarpToadError::CapacityExceeded {
                index,
                depth: self.depth,
            });
        }
        self.levels[0].push(commitment.to_fr()?);
        self.leaf_index_by_commitment.entry(commitment).or_insert(index);
        self.dirty_from.get_or_insert(index);

        debug!("Appended commitment {} at leaf {}", commitment, index);
        Ok(index)
    }

    /// Materialize the root over every appended leaf and record it.
    ///
    /// Taking a checkpoint without new leaves returns the latest checkpoint
    /// unchanged.
    pub fn checkpoint(&mut self, block_number: u64) -> Checkpoint {
        let leaf_count = self.next_index();
        if let Some(latest) = self.history.last() {
            if latest.leaf_count == leaf_count {
                return *latest;
            }
        }

        self.materialize();
        let checkpoint = Checkpoint {
            root: FieldBytes::from_fr(&self.node_at(self.depth, 0, leaf_count)),
            sequence: self.history.len() as u64,
            leaf_count,
            block_number,
        };
        self.history.push(checkpoint);

        debug!(
            "Checkpoint {} at block {}: root {} over {} leaves",
            checkpoint.sequence, block_number, checkpoint.root, leaf_count
        );
        checkpoint
    }

    /// Path from `leaf_index` to the most recent checkpointed root.
    pub fn prove_inclusion(&self, leaf_index: u64) -> Result<MerklePath> {
        let checkpointed = self.history.last().map(|c| c.leaf_count).unwrap_or(0);
        self.ensure_covered(leaf_index, checkpointed)?;
        Ok(self.path_at_size(leaf_index, checkpointed))
    }

    /// Path from `leaf_index` to the root recorded by checkpoint `sequence`.
    pub fn prove_inclusion_at(&self, leaf_index: u64, sequence: u64) -> Result<MerklePath> {
        let checkpoint = self.checkpoint_at(sequence)?;
        self.ensure_covered(leaf_index, checkpoint.leaf_count)?;
        Ok(self.path_at_size(leaf_index, checkpoint.leaf_count))
    }

    fn ensure_covered(&self, leaf_index: u64, checkpointed: u64) -> Result<()> {
        if leaf_index >= self.next_index() {
            return Err(WarpToadError::LeafNotFound(format!(
                "leaf index {} (next free index {})",
                leaf_index,
                self.next_index()
            )));
        }
        if leaf_index >= checkpointed {
            return Err(WarpToadError::LeafNotCheckpointed {
                index: leaf_index,
                checkpointed,
            });
        }
        Ok(())
    }

    fn path_at_size(&self, leaf_index: u64, size: u64) -> MerklePath {
        let mut siblings = Vec::with_capacity(self.depth);
        let mut index = leaf_index;
        for level in 0..self.depth {
            siblings.push(FieldBytes::from_fr(&self.node_at(level, index ^ 1, size)));
            index >>= 1;
        }
        MerklePath {
            leaf_index,
            siblings,
        }
    }

    /// Fill every complete subtree above the dirty marker.
    fn materialize(&mut self) {
        let Some(from) = self.dirty_from.take() else {
            return;
        };
        let leaf_count = self.next_index();
        for level in 1..=self.depth {
            let target = (leaf_count >> level) as usize;
            let mut next = self.levels[level].len();
            while next < target {
                let left = self.levels[level - 1][2 * next];
                let right = self.levels[level - 1][2 * next + 1];
                let node = self.hasher.hash2(left, right);
                self.levels[level].push(node);
                next += 1;
            }
        }
        debug!("Materialized leaves {}..{}", from, leaf_count);
    }

    /// Node at (`level`, `index`) in the tree truncated to `size` leaves.
    ///
    /// Requires every complete subtree within `size` to be materialized.
    fn node_at(&self, level: usize, index: u64, size: u64) -> Fr {
        let start = index << level;
        if start >= size {
            return self.zeros[level];
        }
        let end = (index + 1) << level;
        if end <= size {
            return self.levels[level][index as usize];
        }
        let left = self.node_at(level - 1, 2 * index, size);
        let right = self.node_at(level - 1, 2 * index + 1, size);
        self.hasher.hash2(left, right)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn leaf(n: u64) -> FieldBytes {
        FieldBytes::from_u64(1000 + n)
    }

    /// Root recomputed from scratch over a fully padded leaf layer.
    fn naive_root(depth: usize, leaves: &[FieldBytes]) -> FieldBytes {
        let h = PoseidonHasher;
        let mut layer: Vec<Fr> = leaves.iter().map(|l| l.to_fr().unwrap()).collect();
        layer.resize(1 << depth, Fr::zero());
        for _ in 0..depth {
            layer = layer
                .chunks(2)
                .map(|pair| h.hash2(pair[0], pair[1]))
                .collect();
        }
        FieldBytes::from_fr(&layer[0])
    }

    #[test]
    fn empty_checkpoint_is_zero_ladder_top() {
        let mut acc = LocalAccumulator::new(4).unwrap();
        let checkpoint = acc.checkpoint(0);
        assert_eq!(checkpoint.root, naive_root(4, &[]));
        assert_eq!(checkpoint.sequence, 0);
        assert_eq!(checkpoint.leaf_count, 0);
    }

    #[test]
    fn lazy_root_matches_naive_root() {
        let mut acc = LocalAccumulator::new(4).unwrap();
        let mut leaves = Vec::new();
        for n in 0..11 {
            leaves.push(leaf(n));
            acc.append(leaf(n)).unwrap();
            if n % 3 == 0 {
                let checkpoint = acc.checkpoint(n);
                assert_eq!(checkpoint.root, naive_root(4, &leaves));
            }
        }
        let checkpoint = acc.checkpoint(99);
        assert_eq!(checkpoint.root, naive_root(4, &leaves));
    }

    #[test]
    fn checkpoint_is_idempotent_without_new_leaves() {
        let mut acc = LocalAccumulator::new(8).unwrap();
        acc.append(leaf(0)).unwrap();
        let first = acc.checkpoint(1);
        let second = acc.checkpoint(2);
        assert_eq!(first, second);
        assert_eq!(acc.history().len(), 1);
    }

    #[test]
    fn capacity_exceeded_at_two_pow_depth() {
        let mut acc = LocalAccumulator::new(2).unwrap();
        for n in 0..4 {
            assert_eq!(acc.append(leaf(n)).unwrap(), n);
        }
        assert_eq!(
            acc.append(leaf(4)),
            Err(WarpToadError::CapacityExceeded { index: 4, depth: 2 })
        );
    }

    #[test]
    fn proofs_verify_against_latest_root() {
        let mut acc = LocalAccumulator::new(5).unwrap();
        for n in 0..7 {
            acc.append(leaf(n)).unwrap();
        }
        let checkpoint = acc.checkpoint(3);
        let root = checkpoint.root.to_fr().unwrap();
        for n in 0..7 {
            let path = acc.prove_inclusion(n).unwrap();
            assert_eq!(path.depth(), 5);
            assert!(path.verify(&PoseidonHasher, leaf(n).to_fr().unwrap(), root));
        }
    }

    #[test]
    fn uncheckpointed_leaf_is_reported() {
        let mut acc = LocalAccumulator::new(5).unwrap();
        acc.append(leaf(0)).unwrap();
        acc.checkpoint(1);
        acc.append(leaf(1)).unwrap();

        assert!(matches!(
            acc.prove_inclusion(1),
            Err(WarpToadError::LeafNotCheckpointed { index: 1, checkpointed: 1 })
        ));
        assert!(matches!(acc.prove_inclusion(2), Err(WarpToadError::LeafNotFound(_))));
    }

    #[test]
    fn proofs_against_older_checkpoints() {
        let mut acc = LocalAccumulator::new(6).unwrap();
        for n in 0..3 {
            acc.append(leaf(n)).unwrap();
        }
        let old = acc.checkpoint(10);
        for n in 3..20 {
            acc.append(leaf(n)).unwrap();
        }
        let new = acc.checkpoint(20);
        assert_ne!(old.root, new.root);

        let old_path = acc.prove_inclusion_at(2, old.sequence).unwrap();
        assert!(old_path.verify(&PoseidonHasher, leaf(2).to_fr().unwrap(), old.root.to_fr().unwrap()));
        assert!(matches!(
            acc.prove_inclusion_at(5, old.sequence),
            Err(WarpToadError::LeafNotCheckpointed { .. })
        ));
        assert_eq!(
            acc.prove_inclusion_at(0, 9),
            Err(WarpToadError::UnknownCheckpoint(9))
        );
    }

    #[test]
    fn history_lookups() {
        let mut acc = LocalAccumulator::new(4).unwrap();
        acc.append(leaf(0)).unwrap();
        let first = acc.checkpoint(5);
        acc.append(leaf(1)).unwrap();
        let second = acc.checkpoint(9);

        assert_eq!(acc.find_leaf(&leaf(1)), Some(1));
        assert_eq!(acc.find_leaf(&leaf(7)), None);
        assert_eq!(acc.root_at_block(4), None);
        assert_eq!(acc.root_at_block(7), Some(&first));
        assert_eq!(acc.root_at_block(100), Some(&second));
        assert!(acc.is_known_root(&first.root));
    }

    #[test]
    fn rejects_bad_depth() {
        assert!(matches!(LocalAccumulator::new(0), Err(WarpToadError::InvalidDepth(0))));
        assert!(LocalAccumulator::new(MAX_TREE_DEPTH + 1).is_err());
    }
}
