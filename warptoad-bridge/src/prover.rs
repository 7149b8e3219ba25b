//! Proof system boundary.
//!
//! The mint circuit is consumed through [`ProofSystem`]. The bundled
//! [`NativeWitnessBackend`] checks the mint relation natively and refuses to
//! prove false statements; its proofs are keyed BLAKE3 MACs over the public
//! input encoding, so only holders of the backend key can produce them.

use serde::{Deserialize, Serialize};
use tracing::debug;
use warptoad_core::{PoseidonHasher, ProofInputs, PublicInputs};

use crate::error::{BridgeError, Result};

const BACKEND_KEY_CONTEXT: &str = "warptoad native witness backend v1";

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Proof {
    #[serde(with = "hex::serde")]
    pub bytes: Vec<u8>,
}

/// Prover and verifier for the mint relation.
pub trait ProofSystem: Send + Sync {
    fn prove(&self, inputs: &ProofInputs) -> Result<Proof>;

    fn verify(&self, proof: &Proof, public: &PublicInputs) -> bool;
}

#[derive(Clone)]
pub struct NativeWitnessBackend {
    key: [u8; 32],
}

impl std::fmt::Debug for NativeWitnessBackend {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("NativeWitnessBackend").finish_non_exhaustive()
    }
}

impl NativeWitnessBackend {
    /// Backend keyed from `seed`; provers and verifiers must share it.
    pub fn from_seed(seed: &[u8]) -> Self {
        Self {
            key: blake3::derive_key(BACKEND_KEY_CONTEXT, seed),
        }
    }

    fn mac(&self, public: &PublicInputs) -> blake3::Hash {
        blake3::keyed_hash(&self.key, &public.encode())
    }
}

impl Default for NativeWitnessBackend {
    fn default() -> Self {
        Self::from_seed(b"sandbox")
    }
}

impl ProofSystem for NativeWitnessBackend {
    fn prove(&self, inputs: &ProofInputs) -> Result<Proof> {
        inputs
            .check_witness(&PoseidonHasher)
            .map_err(|e| BridgeError::ProverRejected(e.to_string()))?;
        debug!("Proved mint for nullifier {}", inputs.public.nullifier);
        Ok(Proof {
            bytes: self.mac(&inputs.public).as_bytes().to_vec(),
        })
    }

    fn verify(&self, proof: &Proof, public: &PublicInputs) -> bool {
        let Ok(bytes) = <[u8; 32]>::try_from(proof.bytes.as_slice()) else {
            return false;
        };
        blake3::Hash::from(bytes) == self.mac(public)
    }
}
