//! Giga-root hub living on the L1 chain.
//!
//! The hub keeps the newest local root it has seen from every chain and the
//! history of giga roots it built from them. L1 chains hand it their roots
//! directly; L2 roots arrive as cross-domain messages, possibly late,
//! duplicated or out of order.

use std::collections::BTreeMap;

use tracing::{debug, info};
use warptoad_core::{
    ChainId, FieldBytes, GigaRootAggregator, GigaRootSnapshot, LocalRootView, MerklePath,
    PoseidonHasher, WarpToadError,
};

use crate::error::Result;

#[derive(Debug)]
pub struct GigaBridge {
    chain_id: ChainId,
    aggregator: GigaRootAggregator<PoseidonHasher>,
    views: BTreeMap<ChainId, LocalRootView>,
    snapshots: Vec<GigaRootSnapshot>,
}

impl GigaBridge {
    pub fn new(chain_id: ChainId) -> Self {
        Self {
            chain_id,
            aggregator: GigaRootAggregator::new(PoseidonHasher),
            views: BTreeMap::new(),
            snapshots: Vec::new(),
        }
    }

    /// Chain the hub is deployed on.
    pub fn chain_id(&self) -> ChainId {
        self.chain_id
    }

    /// Record a chain's local root if it is newer than the one held.
    ///
    /// # Returns
    /// `true` when the view replaced the stored one.
    pub fn update_local_root(&mut self, view: LocalRootView) -> bool {
        match self.views.get(&view.chain_id) {
            Some(existing) if !view.is_newer_than(existing) => {
                debug!(
                    "Ignoring local root for chain {} at sequence {} (have {})",
                    view.chain_id, view.sequence, existing.sequence
                );
                false
            }
            _ => {
                info!(
                    "Hub stored local root {} for chain {} (sequence {})",
                    view.root, view.chain_id, view.sequence
                );
                self.views.insert(view.chain_id, view);
                true
            }
        }
    }

    pub fn local_root(&self, chain_id: ChainId) -> Option<&LocalRootView> {
        self.views.get(&chain_id)
    }

    /// Build a giga root over the newest roots of `participating` chains.
    ///
    /// Re-aggregating the same roots returns the existing snapshot.
    pub fn aggregate(&mut self, participating: &[ChainId]) -> Result<GigaRootSnapshot> {
        let mut views = Vec::with_capacity(participating.len());
        for chain_id in participating {
            let view = self
                .views
                .get(chain_id)
                .ok_or(WarpToadError::MissingLocalRoot(*chain_id))?;
            views.push(*view);
        }

        let snapshot = self
            .aggregator
            .aggregate(views, self.snapshots.len() as u64)?;
        if let Some(latest) = self.snapshots.last() {
            if latest.covers_same_roots(&snapshot) {
                debug!("Giga root {} unchanged", latest.giga_root);
                return Ok(latest.clone());
            }
        }

        info!(
            "Constructed giga root {} (snapshot {}) over chains {:?}",
            snapshot.giga_root,
            snapshot.sequence,
            snapshot.chain_ids().collect::<Vec<_>>()
        );
        self.snapshots.push(snapshot.clone());
        Ok(snapshot)
    }

    pub fn latest_snapshot(&self) -> Option<&GigaRootSnapshot> {
        self.snapshots.last()
    }

    pub fn snapshots(&self) -> &[GigaRootSnapshot] {
        &self.snapshots
    }

    /// Most recent snapshot that produced `giga_root`.
    pub fn snapshot_for_root(&self, giga_root: &FieldBytes) -> Option<&GigaRootSnapshot> {
        self.snapshots
            .iter()
            .rev()
            .find(|snapshot| &snapshot.giga_root == giga_root)
    }

    /// Level-2 path for `chain_id` inside `snapshot`.
    pub fn prove_chain(&self, snapshot: &GigaRootSnapshot, chain_id: ChainId) -> Result<MerklePath> {
        Ok(self.aggregator.prove_chain(snapshot, chain_id)?)
    }
}
