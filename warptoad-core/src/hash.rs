//! Hash primitive used by commitments and both Merkle levels.
//!
//! The protocol hash is Poseidon over the BN254 scalar field with an x^5
//! S-box and eight full rounds. Two-input hashes run at width 3 and the
//! three-input pre-commitment at width 4.

use halo2curves_axiom::{bn256::Fr, ff::Field};
use poseidon_primitives::poseidon::primitives::{ConstantLength, Hash as PoseidonHash, Spec};

pub const POSEIDON_FULL_ROUNDS: usize = 8;
pub const POSEIDON_PARTIAL_ROUNDS_T3: usize = 57;
pub const POSEIDON_PARTIAL_ROUNDS_T4: usize = 56;

/// A collision-resistant hash over field elements.
pub trait FieldHasher: Clone + Send + Sync + 'static {
    fn hash2(&self, left: Fr, right: Fr) -> Fr;

    fn hash3(&self, a: Fr, b: Fr, c: Fr) -> Fr;
}

/// Poseidon instance shared by every WarpToad component.
#[derive(Clone, Copy, Debug, Default)]
pub struct PoseidonHasher;

impl FieldHasher for PoseidonHasher {
    fn hash2(&self, left: Fr, right: Fr) -> Fr {
        PoseidonHash::<Fr, WarpToadPoseidonSpec, ConstantLength<2>, 3, 2>::init().hash([left, right])
    }

    fn hash3(&self, a: Fr, b: Fr, c: Fr) -> Fr {
        PoseidonHash::<Fr, WarpToadPoseidonSpec, ConstantLength<3>, 4, 3>::init().hash([a, b, c])
    }
}

#[derive(Debug)]
struct WarpToadPoseidonSpec;

impl Spec<Fr, 3, 2> for WarpToadPoseidonSpec {
    fn full_rounds() -> usize {
        POSEIDON_FULL_ROUNDS
    }

    fn partial_rounds() -> usize {
        POSEIDON_PARTIAL_ROUNDS_T3
    }

    fn sbox(val: Fr) -> Fr {
        val.pow_vartime([5])
    }

    fn secure_mds() -> usize {
        0
    }
}

impl Spec<Fr, 4, 3> for WarpToadPoseidonSpec {
    fn full_rounds() -> usize {
        POSEIDON_FULL_ROUNDS
    }

    fn partial_rounds() -> usize {
        POSEIDON_PARTIAL_ROUNDS_T4
    }

    fn sbox(val: Fr) -> Fr {
        val.pow_vartime([5])
    }

    fn secure_mds() -> usize {
        0
    }
}

/// Empty-subtree values: `zeros[0] = 0`, `zeros[i + 1] = H(zeros[i], zeros[i])`.
pub fn zero_ladder<H: FieldHasher>(hasher: &H, depth: usize) -> Vec<Fr> {
    let mut zeros = Vec::with_capacity(depth + 1);
    zeros.push(Fr::zero());
    for level in 0..depth {
        let below = zeros[level];
        zeros.push(hasher.hash2(below, below));
    }
    zeros
}
