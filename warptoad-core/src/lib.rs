//! warptoad-core
//!
//! Protocol primitives for the WarpToad burn/mint bridge.
//!
//! # Architecture
//!
//! ```text
//! ┌──────────────────────────────────────────────────────────────────────┐
//! │                          warptoad-core                               │
//! ├──────────────────────────────────────────────────────────────────────┤
//! │                                                                      │
//! │  CommitmentPreimage ──► commitment ──► LocalAccumulator (per chain)  │
//! │        │                                      │ checkpoint           │
//! │        ▼                                      ▼                      │
//! │    nullifier                          LocalRootView (chain, root)    │
//! │                                               │                      │
//! │                                               ▼                      │
//! │                                   GigaRootAggregator ──► giga root   │
//! │                                                                      │
//! │  ProofInputs = public (nullifier, amounts, roots, fee terms)         │
//! │              + private (secrets, level-1 path, level-2 path)         │
//! │                                                                      │
//! └──────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! Ledgers, messaging and settlement live in `warptoad-bridge`.

pub mod accumulator;
pub mod commitment;
pub mod error;
pub mod fees;
pub mod field;
pub mod giga;
pub mod hash;
pub mod inputs;
pub mod merkle;
pub mod types;

pub use accumulator::{Checkpoint, LocalAccumulator};
pub use commitment::{commitment_from_nullifier, CommitmentPreimage};
pub use error::{Result, WarpToadError};
pub use fees::{compute_fee_factor, GasSchedule, RelayerFeeQuote};
pub use field::{Address, FieldBytes};
pub use giga::{GigaRootAggregator, GigaRootSnapshot};
pub use hash::{FieldHasher, PoseidonHasher};
pub use inputs::{PrivateInputs, ProofInputs, PublicInputs, PUBLIC_INPUT_COUNT};
pub use merkle::MerklePath;
pub use types::{
    Amount, ChainId, ChainKind, LocalRootView, GIGA_TREE_DEPTH, LOCAL_TREE_DEPTH, MAX_GIGA_CHAINS,
};
