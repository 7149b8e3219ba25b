//! Mint proof inputs and the relation they must satisfy.
//!
//! ```text
//!   nullifier  == H(nullifier_preimage, secret, chain_id)
//!   commitment  = H(nullifier, amount)
//!   burn_local_root == fold(commitment, local_path)          level 1
//!   giga_root       == fold(H(burn_chain_id, burn_local_root),
//!                           giga_path)                         level 2
//! ```

use halo2curves_axiom::bn256::Fr;
use serde::{Deserialize, Serialize};

use crate::{
    commitment::commitment_from_nullifier,
    error::{Result, WarpToadError},
    fees::RelayerFeeQuote,
    field::{Address, FieldBytes},
    hash::FieldHasher,
    merkle::MerklePath,
    types::{Amount, ChainId},
};

/// Number of public inputs exposed to the verifier.
pub const PUBLIC_INPUT_COUNT: usize = 10;

/// Values the destination chain sees and checks.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct PublicInputs {
    pub nullifier: FieldBytes,
    /// Destination chain.
    pub chain_id: ChainId,
    pub amount: Amount,
    pub giga_root: FieldBytes,
    pub destination_local_root: FieldBytes,
    pub fee_factor: u128,
    pub priority_fee: u128,
    pub max_fee: Amount,
    pub relayer: Address,
    pub recipient: Address,
}

impl PublicInputs {
    pub fn fee_quote(&self) -> RelayerFeeQuote {
        RelayerFeeQuote::new(self.fee_factor, self.priority_fee, self.max_fee)
    }

    /// Canonical field encoding, in verifier order.
    pub fn to_field_elements(&self) -> [FieldBytes; PUBLIC_INPUT_COUNT] {
        [
            self.nullifier,
            FieldBytes::from_u64(self.chain_id),
            FieldBytes::from_u128(self.amount),
            self.giga_root,
            self.destination_local_root,
            FieldBytes::from_u128(self.fee_factor),
            FieldBytes::from_u128(self.priority_fee),
            FieldBytes::from_u128(self.max_fee),
            FieldBytes::from_fr(&self.relayer.to_fr()),
            FieldBytes::from_fr(&self.recipient.to_fr()),
        ]
    }

    /// Concatenated field encoding, used as the transcript for proofs.
    pub fn encode(&self) -> Vec<u8> {
        self.to_field_elements()
            .iter()
            .flat_map(|element| element.0)
            .collect()
    }
}

/// Witness values known only to the prover.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct PrivateInputs {
    pub secret: FieldBytes,
    pub nullifier_preimage: FieldBytes,
    pub burn_chain_id: ChainId,
    pub burn_local_root: FieldBytes,
    /// Commitment leaf to the burn chain's local root.
    pub local_path: MerklePath,
    /// `H(burn_chain_id, burn_local_root)` to the giga root.
    pub giga_path: MerklePath,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProofInputs {
    pub public: PublicInputs,
    pub private: PrivateInputs,
}

impl ProofInputs {
    /// Check the full mint relation natively.
    pub fn check_witness<H: FieldHasher>(&self, hasher: &H) -> Result<()> {
        let public = &self.public;
        let private = &self.private;

        let nullifier = hasher.hash3(
            private.nullifier_preimage.to_fr()?,
            private.secret.to_fr()?,
            Fr::from(public.chain_id),
        );
        if FieldBytes::from_fr(&nullifier) != public.nullifier {
            return Err(WarpToadError::InvalidWitness(
                "nullifier does not match secret, preimage and destination".into(),
            ));
        }

        let commitment = commitment_from_nullifier(hasher, nullifier, public.amount);
        let local_root = private.local_path.compute_root(hasher, commitment)?;
        if FieldBytes::from_fr(&local_root) != private.burn_local_root {
            return Err(WarpToadError::InvalidWitness(
                "commitment is not included in the burn chain's local root".into(),
            ));
        }

        let giga_leaf = hasher.hash2(Fr::from(private.burn_chain_id), local_root);
        let giga_root = private.giga_path.compute_root(hasher, giga_leaf)?;
        if FieldBytes::from_fr(&giga_root) != public.giga_root {
            return Err(WarpToadError::InvalidWitness(
                "burn chain's local root is not included in the giga root".into(),
            ));
        }

        Ok(())
    }
}
