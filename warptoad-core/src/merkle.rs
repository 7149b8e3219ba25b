//! Merkle inclusion paths.

use halo2curves_axiom::bn256::Fr;
use serde::{Deserialize, Serialize};

use crate::{error::Result, field::FieldBytes, hash::FieldHasher};

/// Sibling path from a leaf to a root.
///
/// Sibling order follows leaf-index parity: at level `i` the running node is
/// the left child when bit `i` of `leaf_index` is zero.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct MerklePath {
    pub leaf_index: u64,
    pub siblings: Vec<FieldBytes>,
}

impl MerklePath {
    pub fn depth(&self) -> usize {
        self.siblings.len()
    }

    /// Fold `leaf` up the path.
    pub fn compute_root<H: FieldHasher>(&self, hasher: &H, leaf: Fr) -> Result<Fr> {
        let mut node = leaf;
        let mut index = self.leaf_index;
        for sibling in &self.siblings {
            let sibling = sibling.to_fr()?;
            node = if index & 1 == 0 {
                hasher.hash2(node, sibling)
            } else {
                hasher.hash2(sibling, node)
            };
            index >>= 1;
        }
        Ok(node)
    }

    pub fn verify<H: FieldHasher>(&self, hasher: &H, leaf: Fr, root: Fr) -> bool {
        self.compute_root(hasher, leaf)
            .map(|computed| computed == root)
            .unwrap_or(false)
    }
}
