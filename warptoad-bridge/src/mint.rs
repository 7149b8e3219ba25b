//! Proof-gated minting on the destination chain.
//!
//! Settlement validates everything before touching state:
//!
//! 1. inputs target this chain and the bid matches the committed priority fee
//! 2. the nullifier is unspent
//! 3. the giga root and destination local root are known here
//! 4. the proof verifies
//!
//! Only then is the nullifier marked spent and the amount split between the
//! recipient and the relayer. A stale mint fails at step 3 and leaves the
//! nullifier untouched.

use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tracing::{info, warn};
use warptoad_core::PublicInputs;

use crate::{
    error::{BridgeError, Result},
    ledger::{ChainLedger, Payout},
    prover::{Proof, ProofSystem},
};

/// A mint transaction as submitted by a relayer.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct MintSubmission {
    pub public: PublicInputs,
    pub proof: Proof,
    /// Priority fee per gas the submitting transaction bids.
    pub priority_fee: u128,
}

pub struct ProofGatedMint<P: ProofSystem> {
    verifier: Arc<P>,
}

impl<P: ProofSystem> Clone for ProofGatedMint<P> {
    fn clone(&self) -> Self {
        Self {
            verifier: Arc::clone(&self.verifier),
        }
    }
}

impl<P: ProofSystem> ProofGatedMint<P> {
    pub fn new(verifier: Arc<P>) -> Self {
        Self { verifier }
    }

    /// Settle a mint against `ledger` in one transaction.
    pub fn settle(&self, ledger: &mut ChainLedger, submission: &MintSubmission) -> Result<Payout> {
        let public = &submission.public;

        if public.chain_id != ledger.chain_id() {
            return Err(BridgeError::WrongDestination {
                expected: public.chain_id,
                actual: ledger.chain_id(),
            });
        }
        if submission.priority_fee != public.priority_fee {
            return Err(BridgeError::PriorityFeeMismatch {
                committed: public.priority_fee,
                bid: submission.priority_fee,
            });
        }
        if ledger.is_nullifier_spent(&public.nullifier) {
            warn!(
                "Rejected mint on chain {}: nullifier {} already spent",
                ledger.chain_id(),
                public.nullifier
            );
            return Err(BridgeError::NullifierAlreadySpent(public.nullifier));
        }
        if !ledger.is_giga_root_accepted(&public.giga_root) {
            return Err(BridgeError::StaleSnapshot(format!(
                "chain {} has not accepted giga root {}",
                ledger.chain_id(),
                public.giga_root
            )));
        }
        if !ledger.accumulator().is_known_root(&public.destination_local_root) {
            return Err(BridgeError::StaleSnapshot(format!(
                "chain {} has no local root {}",
                ledger.chain_id(),
                public.destination_local_root
            )));
        }
        if !self.verifier.verify(&submission.proof, public) {
            warn!("Rejected mint on chain {}: invalid proof", ledger.chain_id());
            return Err(BridgeError::ProofInvalid);
        }

        let fee = public
            .fee_quote()
            .settlement_fee(ledger.mint_gas_used(), public.amount);
        let payout = ledger.apply_mint(public.nullifier, public.recipient, public.relayer, public.amount, fee);

        info!(
            "Minted {} on chain {}: {} to recipient {}, {} fee to relayer {}",
            public.amount,
            payout.chain_id,
            payout.recipient_amount,
            payout.recipient,
            payout.fee,
            payout.relayer
        );
        Ok(payout)
    }
}
