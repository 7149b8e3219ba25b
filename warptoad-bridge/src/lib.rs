//! warptoad-bridge
//!
//! Runtime for moving value between chains with WarpToad: per-chain ledgers,
//! the giga-root hub, cross-domain messaging, the relayer state machine and
//! proof-gated minting.
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                               Network                                   │
//! ├─────────────────────────────────────────────────────────────────────────┤
//! │                                                                         │
//! │   L2 ChainLedger ──LocalRoot msg──►  GigaBridge (hub, on L1)            │
//! │        ▲                               │ aggregate                      │
//! │        │                               ▼                                │
//! │        └──────────GigaRoot msg──── giga root ───direct──► L1 ChainLedger │
//! │                                                                         │
//! │   Relayer: RelayRound state machine, ProofInputAssembler,               │
//! │            ProofSystem::prove, ProofGatedMint::settle                   │
//! │                                                                         │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```

pub mod assembler;
pub mod error;
pub mod hub;
pub mod ledger;
pub mod messenger;
pub mod mint;
pub mod network;
pub mod prover;
pub mod relay;

pub use assembler::ProofInputAssembler;
pub use error::{BridgeError, Result};
pub use hub::GigaBridge;
pub use ledger::{BurnReceipt, ChainLedger, JournalEntry, LedgerEvent, Payout};
pub use messenger::{
    CrossDomainMessenger, Envelope, MessageId, MessagePayload, MessengerSettings,
    SimulatedMessenger,
};
pub use mint::{MintSubmission, ProofGatedMint};
pub use network::{ChainConfig, Network, NetworkBuilder, SharedLedger};
pub use prover::{NativeWitnessBackend, Proof, ProofSystem};
pub use relay::{MintRequest, RelayRound, RelayState, Relayer, RelayerSettings};
