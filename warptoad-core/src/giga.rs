//! Giga-root aggregation over every chain's local root.
//!
//! ```text
//!                 giga root
//!                /         \
//!          ...                 ...          depth GIGA_TREE_DEPTH
//!        /     \             /     \
//!   H(c0, r0) H(c1, r1) ... H(cn, rn)  0 .. 0
//! ```
//!
//! Leaves are `H(chain_id, local_root)` ordered by ascending chain id, so the
//! giga root depends only on the set of `(chain, root)` pairs and never on
//! the order in which roots arrived. Unused leaves are zero.

use std::collections::BTreeMap;

use halo2curves_axiom::bn256::Fr;
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::{
    accumulator::LocalAccumulator,
    error::{Result, WarpToadError},
    field::FieldBytes,
    hash::{FieldHasher, PoseidonHasher},
    merkle::MerklePath,
    types::{ChainId, LocalRootView, GIGA_TREE_DEPTH, MAX_GIGA_CHAINS},
};

/// A giga root together with the per-chain roots it was built from.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct GigaRootSnapshot {
    pub giga_root: FieldBytes,
    /// Position in the hub's snapshot history.
    pub sequence: u64,
    pub entries: BTreeMap<ChainId, LocalRootView>,
}

impl GigaRootSnapshot {
    pub fn entry(&self, chain_id: ChainId) -> Option<&LocalRootView> {
        self.entries.get(&chain_id)
    }

    pub fn chain_ids(&self) -> impl Iterator<Item = ChainId> + '_ {
        self.entries.keys().copied()
    }

    /// Leaf position of `chain_id` in the giga tree.
    pub fn position(&self, chain_id: ChainId) -> Option<u64> {
        self.entries
            .keys()
            .position(|id| *id == chain_id)
            .map(|p| p as u64)
    }

    /// Same set of per-chain roots, ignoring sequence and block metadata.
    pub fn covers_same_roots(&self, other: &GigaRootSnapshot) -> bool {
        self.entries.len() == other.entries.len()
            && self
                .entries
                .iter()
                .zip(other.entries.iter())
                .all(|((a_id, a), (b_id, b))| a_id == b_id && a.root == b.root)
    }
}

#[derive(Clone, Debug, Default)]
pub struct GigaRootAggregator<H: FieldHasher = PoseidonHasher> {
    hasher: H,
}

impl<H: FieldHasher> GigaRootAggregator<H> {
    pub fn new(hasher: H) -> Self {
        Self { hasher }
    }

    /// Giga-tree leaf for one chain.
    pub fn leaf(&self, chain_id: ChainId, local_root: &FieldBytes) -> Result<Fr> {
        Ok(self.hasher.hash2(Fr::from(chain_id), local_root.to_fr()?))
    }

    /// Fold the latest root of every participating chain into a snapshot.
    ///
    /// Several views for the same chain collapse to the one with the highest
    /// checkpoint sequence.
    pub fn aggregate<I>(&self, views: I, sequence: u64) -> Result<GigaRootSnapshot>
    where
        I: IntoIterator<Item = LocalRootView>,
    {
        let mut entries: BTreeMap<ChainId, LocalRootView> = BTreeMap::new();
        for view in views {
            match entries.get(&view.chain_id) {
                Some(existing) if !view.is_newer_than(existing) => {}
                _ => {
                    entries.insert(view.chain_id, view);
                }
            }
        }
        if entries.is_empty() {
            return Err(WarpToadError::EmptyAggregation);
        }
        if entries.len() > MAX_GIGA_CHAINS {
            return Err(WarpToadError::TooManyChains {
                count: entries.len(),
                capacity: MAX_GIGA_CHAINS,
            });
        }

        let mut tree = self.build_tree(&entries)?;
        let giga_root = tree.checkpoint(sequence).root;

        debug!(
            "Aggregated {} chain roots into giga root {}",
            entries.len(),
            giga_root
        );
        Ok(GigaRootSnapshot {
            giga_root,
            sequence,
            entries,
        })
    }

    /// Path from `H(chain_id, local_root)` to the snapshot's giga root.
    pub fn prove_chain(&self, snapshot: &GigaRootSnapshot, chain_id: ChainId) -> Result<MerklePath> {
        let position = snapshot
            .position(chain_id)
            .ok_or(WarpToadError::ChainNotAggregated(chain_id))?;
        let mut tree = self.build_tree(&snapshot.entries)?;
        tree.checkpoint(snapshot.sequence);
        tree.prove_inclusion(position)
    }

    fn build_tree(
        &self,
        entries: &BTreeMap<ChainId, LocalRootView>,
    ) -> Result<LocalAccumulator<H>> {
        let mut tree = LocalAccumulator::with_hasher(GIGA_TREE_DEPTH, self.hasher.clone())?;
        for (chain_id, view) in entries {
            tree.append(FieldBytes::from_fr(&self.leaf(*chain_id, &view.root)?))?;
        }
        Ok(tree)
    }
}
