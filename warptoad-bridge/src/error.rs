//! Error types for the bridge runtime.

use std::time::Duration;

use thiserror::Error;
use warptoad_core::{Address, Amount, ChainId, FieldBytes, WarpToadError};

use crate::relay::RelayState;

/// Error type for ledgers, relaying and settlement.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum BridgeError {
    /// Failure inside a core primitive.
    #[error(transparent)]
    Core(#[from] WarpToadError),

    /// No ledger is registered for the chain id.
    #[error("unknown chain {0}")]
    UnknownChain(ChainId),

    /// Not enough wrapped or native balance for the transaction.
    #[error("insufficient balance for {account}: need {needed}, have {available}")]
    InsufficientBalance {
        account: Address,
        needed: Amount,
        available: Amount,
    },

    /// The nullifier was already consumed on this chain.
    #[error("nullifier already spent: {0}")]
    NullifierAlreadySpent(FieldBytes),

    /// The proof does not verify against the public inputs.
    #[error("proof invalid")]
    ProofInvalid,

    /// The prover refused to prove a false statement.
    #[error("prover rejected witness: {0}")]
    ProverRejected(String),

    /// The destination has not accepted the roots the mint relies on.
    #[error("stale snapshot: {0}")]
    StaleSnapshot(String),

    /// A cross-domain message did not arrive in time.
    #[error("message {message_id} to chain {destination} not delivered within {timeout:?}")]
    MessageDeliveryTimeout {
        message_id: u64,
        destination: ChainId,
        timeout: Duration,
    },

    /// Mint submitted to a chain other than the one the nullifier binds.
    #[error("wrong destination: inputs target chain {expected}, submitted to {actual}")]
    WrongDestination { expected: ChainId, actual: ChainId },

    /// The submitted transaction bids a different priority fee than committed.
    #[error("priority fee mismatch: committed {committed}, bid {bid}")]
    PriorityFeeMismatch { committed: u128, bid: u128 },

    /// A relay step was requested from a state that does not allow it.
    #[error("invalid relay transition from {from:?}: {action}")]
    InvalidTransition {
        from: RelayState,
        action: &'static str,
    },

    /// Delivered message that the addressed chain cannot process.
    #[error("unexpected message for chain {0}")]
    UnexpectedMessage(ChainId),

    /// Invalid network or relayer configuration.
    #[error("configuration error: {0}")]
    Config(String),
}

impl BridgeError {
    /// Errors a relayer may retry after waiting, re-checkpointing or re-relaying.
    pub fn is_retryable(&self) -> bool {
        match self {
            BridgeError::Core(inner) => inner.is_retryable(),
            BridgeError::StaleSnapshot(_) | BridgeError::MessageDeliveryTimeout { .. } => true,
            _ => false,
        }
    }

    pub fn is_fatal(&self) -> bool {
        !self.is_retryable()
    }
}

impl From<serde_json::Error> for BridgeError {
    fn from(err: serde_json::Error) -> Self {
        BridgeError::Config(err.to_string())
    }
}

pub type Result<T> = std::result::Result<T, BridgeError>;
