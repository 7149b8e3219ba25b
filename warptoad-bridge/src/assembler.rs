//! Proof input assembly for a mint.
//!
//! ```text
//!   burn chain            hub                     destination chain
//!   ──────────            ───                     ─────────────────
//!   find leaf        snapshot for the        accepted giga root,
//!   level-1 path ◄── destination's giga  ◄── latest local root
//!   at snapshot's    root, level-2 path
//!   checkpoint
//! ```
//!
//! Ledgers are locked one at a time so the burn and destination chain may be
//! the same.

use tracing::debug;
use warptoad_core::{
    Address, ChainId, CommitmentPreimage, PoseidonHasher, PrivateInputs, ProofInputs,
    PublicInputs, RelayerFeeQuote, WarpToadError,
};

use crate::{
    error::{BridgeError, Result},
    network::Network,
};

pub struct ProofInputAssembler<'a> {
    network: &'a Network,
    hasher: PoseidonHasher,
}

impl<'a> ProofInputAssembler<'a> {
    pub fn new(network: &'a Network) -> Self {
        Self {
            network,
            hasher: PoseidonHasher,
        }
    }

    /// Build public and private inputs for minting `preimage` on `destination_chain`.
    ///
    /// # Errors
    /// * `LeafNotFound` - no burn with this commitment on the burn chain
    /// * `LeafNotCheckpointed` - the burn is not in a stored local root yet
    /// * `StaleSnapshot` - the destination's giga root does not cover the burn
    pub async fn assemble(
        &self,
        burn_chain: ChainId,
        destination_chain: ChainId,
        preimage: &CommitmentPreimage,
        quote: &RelayerFeeQuote,
        relayer: Address,
        recipient: Address,
    ) -> Result<ProofInputs> {
        if preimage.destination_chain_id != destination_chain {
            return Err(BridgeError::WrongDestination {
                expected: preimage.destination_chain_id,
                actual: destination_chain,
            });
        }
        let nullifier = preimage.nullifier(&self.hasher)?;
        let commitment = preimage.commitment(&self.hasher)?;

        let burn_ledger = self.network.ledger(burn_chain)?;
        let leaf_index = {
            let ledger = burn_ledger.lock().await;
            let leaf_index = ledger
                .accumulator()
                .find_leaf(&commitment)
                .ok_or_else(|| {
                    WarpToadError::LeafNotFound(format!(
                        "commitment {} on chain {}",
                        commitment, burn_chain
                    ))
                })?;
            let checkpointed = ledger.latest_checkpoint().map(|c| c.leaf_count).unwrap_or(0);
            if leaf_index >= checkpointed {
                return Err(WarpToadError::LeafNotCheckpointed {
                    index: leaf_index,
                    checkpointed,
                }
                .into());
            }
            leaf_index
        };

        let (giga_root, destination_local_root) = {
            let ledger = self.network.ledger(destination_chain)?;
            let ledger = ledger.lock().await;
            let giga_root = ledger.current_giga_root().ok_or_else(|| {
                BridgeError::StaleSnapshot(format!(
                    "chain {} has not received a giga root",
                    destination_chain
                ))
            })?;
            let local_root = ledger
                .latest_checkpoint()
                .map(|c| c.root)
                .ok_or_else(|| {
                    BridgeError::StaleSnapshot(format!(
                        "chain {} has no local root",
                        destination_chain
                    ))
                })?;
            (giga_root, local_root)
        };

        let (entry, giga_path) = {
            let hub = self.network.hub();
            let hub = hub.lock().await;
            let snapshot = hub.snapshot_for_root(&giga_root).ok_or_else(|| {
                BridgeError::StaleSnapshot(format!("giga root {} unknown to the hub", giga_root))
            })?;
            let entry = *snapshot.entry(burn_chain).ok_or_else(|| {
                BridgeError::StaleSnapshot(format!(
                    "giga root {} does not cover chain {}",
                    giga_root, burn_chain
                ))
            })?;
            if entry.leaf_count <= leaf_index {
                return Err(BridgeError::StaleSnapshot(format!(
                    "giga root {} on chain {} predates burn leaf {} on chain {}",
                    giga_root, destination_chain, leaf_index, burn_chain
                )));
            }
            (entry, hub.prove_chain(snapshot, burn_chain)?)
        };

        let local_path = {
            let ledger = burn_ledger.lock().await;
            ledger
                .accumulator()
                .prove_inclusion_at(leaf_index, entry.sequence)?
        };

        debug!(
            "Assembled mint inputs: leaf {} on chain {} under giga root {}",
            leaf_index, burn_chain, giga_root
        );
        Ok(ProofInputs {
            public: PublicInputs {
                nullifier,
                chain_id: destination_chain,
                amount: preimage.amount,
                giga_root,
                destination_local_root,
                fee_factor: quote.fee_factor,
                priority_fee: quote.priority_fee,
                max_fee: quote.max_fee,
                relayer,
                recipient,
            },
            private: PrivateInputs {
                secret: preimage.secret,
                nullifier_preimage: preimage.nullifier_preimage,
                burn_chain_id: burn_chain,
                burn_local_root: entry.root,
                local_path,
                giga_path,
            },
        })
    }
}
