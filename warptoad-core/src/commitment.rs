//! Burn commitments and nullifiers.
//!
//! ```text
//!   nullifier  = H(nullifier_preimage, secret, destination_chain_id)
//!   commitment = H(nullifier, amount)
//! ```
//!
//! The nullifier doubles as the pre-commitment handed to `burn`, so the
//! burning chain never learns the secret or the nullifier preimage.

use halo2curves_axiom::bn256::Fr;
use rand::RngCore;
use serde::{Deserialize, Serialize};

use crate::{
    error::Result,
    field::{fr_from_u128, FieldBytes},
    hash::FieldHasher,
    types::{Amount, ChainId},
};

/// Private data a holder keeps after burning.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct CommitmentPreimage {
    pub nullifier_preimage: FieldBytes,
    pub secret: FieldBytes,
    pub destination_chain_id: ChainId,
    pub amount: Amount,
}

impl CommitmentPreimage {
    pub fn new(
        nullifier_preimage: FieldBytes,
        secret: FieldBytes,
        destination_chain_id: ChainId,
        amount: Amount,
    ) -> Self {
        Self {
            nullifier_preimage,
            secret,
            destination_chain_id,
            amount,
        }
    }

    /// Preimage with small integer secrets, as used by sandboxes.
    pub fn from_integers(
        nullifier_preimage: u128,
        secret: u128,
        destination_chain_id: ChainId,
        amount: Amount,
    ) -> Self {
        Self::new(
            FieldBytes::from_u128(nullifier_preimage),
            FieldBytes::from_u128(secret),
            destination_chain_id,
            amount,
        )
    }

    /// Fresh random secret and nullifier preimage.
    pub fn random<R: RngCore>(rng: &mut R, destination_chain_id: ChainId, amount: Amount) -> Self {
        Self::new(
            random_field_bytes(rng),
            random_field_bytes(rng),
            destination_chain_id,
            amount,
        )
    }

    pub fn nullifier<H: FieldHasher>(&self, hasher: &H) -> Result<FieldBytes> {
        Ok(FieldBytes::from_fr(&self.nullifier_fr(hasher)?))
    }

    pub fn commitment<H: FieldHasher>(&self, hasher: &H) -> Result<FieldBytes> {
        let nullifier = self.nullifier_fr(hasher)?;
        Ok(FieldBytes::from_fr(&commitment_from_nullifier(
            hasher,
            nullifier,
            self.amount,
        )))
    }

    fn nullifier_fr<H: FieldHasher>(&self, hasher: &H) -> Result<Fr> {
        Ok(hasher.hash3(
            self.nullifier_preimage.to_fr()?,
            self.secret.to_fr()?,
            Fr::from(self.destination_chain_id),
        ))
    }
}

/// Commitment a burning chain appends for a submitted pre-commitment.
pub fn commitment_from_nullifier<H: FieldHasher>(hasher: &H, nullifier: Fr, amount: Amount) -> Fr {
    hasher.hash2(nullifier, fr_from_u128(amount))
}

fn random_field_bytes<R: RngCore>(rng: &mut R) -> FieldBytes {
    // 248 random bits always stay below the BN254 modulus.
    let mut bytes = [0u8; 32];
    rng.fill_bytes(&mut bytes[..31]);
    FieldBytes(bytes)
}
