//! Per-chain ledger state.
//!
//! A [`ChainLedger`] is the state one WarpToad deployment owns on one chain:
//! wrapped balances, the burn accumulator, spent nullifiers and accepted giga
//! roots. Every public mutating method is one transaction; it bumps the block
//! number and appends to the event journal. Callers serialize transactions
//! by holding the ledger's mutex (see [`crate::network::Network`]).

use std::collections::{HashMap, HashSet};

use serde::{Deserialize, Serialize};
use tracing::{debug, info};
use warptoad_core::{
    commitment_from_nullifier, Address, Amount, ChainId, ChainKind, Checkpoint, FieldBytes,
    LocalAccumulator, LocalRootView, PoseidonHasher,
};

use crate::error::{BridgeError, Result};

/// Event emitted by a ledger transaction.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "event", rename_all = "camelCase")]
pub enum LedgerEvent {
    Wrapped {
        account: Address,
        amount: Amount,
    },
    Unwrapped {
        account: Address,
        amount: Amount,
    },
    Burned {
        sender: Address,
        commitment: FieldBytes,
        leaf_index: u64,
        amount: Amount,
    },
    LocalRootStored {
        checkpoint: Checkpoint,
    },
    ConstructedNewGigaRoot {
        giga_root: FieldBytes,
        snapshot_sequence: u64,
    },
    ReceivedGigaRoot {
        giga_root: FieldBytes,
        snapshot_sequence: u64,
    },
    Minted {
        nullifier: FieldBytes,
        recipient: Address,
        relayer: Address,
        amount: Amount,
        fee: Amount,
    },
}

/// Journal record: event plus the block and id it was emitted at.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct JournalEntry {
    pub id: u64,
    pub block_number: u64,
    pub event: LedgerEvent,
}

/// Outcome of a burn transaction.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct BurnReceipt {
    pub chain_id: ChainId,
    pub commitment: FieldBytes,
    pub leaf_index: u64,
    pub block_number: u64,
}

/// Balance movements of a settled mint.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Payout {
    pub chain_id: ChainId,
    pub nullifier: FieldBytes,
    pub recipient: Address,
    pub recipient_amount: Amount,
    pub relayer: Address,
    pub fee: Amount,
    pub block_number: u64,
}

#[derive(Debug)]
pub struct ChainLedger {
    chain_id: ChainId,
    kind: ChainKind,
    block_number: u64,
    accumulator: LocalAccumulator<PoseidonHasher>,
    native_balances: HashMap<Address, Amount>,
    balances: HashMap<Address, Amount>,
    total_supply: Amount,
    spent_nullifiers: HashSet<FieldBytes>,
    /// Accepted giga roots with the hub snapshot they came from.
    accepted_giga_roots: Vec<(FieldBytes, u64)>,
    mint_gas_used: u128,
    journal: Vec<JournalEntry>,
}

impl ChainLedger {
    /// Deploy a ledger with an empty accumulator of `depth`.
    ///
    /// The empty tree is checkpointed at genesis so the chain always has a
    /// local root to report.
    pub fn new(chain_id: ChainId, kind: ChainKind, depth: usize, mint_gas_used: u128) -> Result<Self> {
        let mut accumulator = LocalAccumulator::new(depth)?;
        accumulator.checkpoint(0);
        Ok(Self {
            chain_id,
            kind,
            block_number: 0,
            accumulator,
            native_balances: HashMap::new(),
            balances: HashMap::new(),
            total_supply: 0,
            spent_nullifiers: HashSet::new(),
            accepted_giga_roots: Vec::new(),
            mint_gas_used,
            journal: Vec::new(),
        })
    }

    pub fn chain_id(&self) -> ChainId {
        self.chain_id
    }

    pub fn kind(&self) -> ChainKind {
        self.kind
    }

    pub fn block_number(&self) -> u64 {
        self.block_number
    }

    pub fn accumulator(&self) -> &LocalAccumulator<PoseidonHasher> {
        &self.accumulator
    }

    pub fn mint_gas_used(&self) -> u128 {
        self.mint_gas_used
    }

    pub fn balance_of(&self, account: &Address) -> Amount {
        self.balances.get(account).copied().unwrap_or(0)
    }

    pub fn native_balance_of(&self, account: &Address) -> Amount {
        self.native_balances.get(account).copied().unwrap_or(0)
    }

    pub fn total_supply(&self) -> Amount {
        self.total_supply
    }

    pub fn is_nullifier_spent(&self, nullifier: &FieldBytes) -> bool {
        self.spent_nullifiers.contains(nullifier)
    }

    pub fn spent_nullifier_count(&self) -> usize {
        self.spent_nullifiers.len()
    }

    /// Most recently accepted giga root.
    pub fn current_giga_root(&self) -> Option<FieldBytes> {
        self.accepted_giga_roots.last().map(|(root, _)| *root)
    }

    /// Hub snapshot sequence of the most recently accepted giga root.
    pub fn current_giga_sequence(&self) -> Option<u64> {
        self.accepted_giga_roots.last().map(|(_, sequence)| *sequence)
    }

    pub fn is_giga_root_accepted(&self, root: &FieldBytes) -> bool {
        self.accepted_giga_roots.iter().any(|(accepted, _)| accepted == root)
    }

    pub fn latest_checkpoint(&self) -> Option<Checkpoint> {
        self.accumulator.latest_checkpoint().copied()
    }

    /// The chain's latest checkpoint in the form the hub stores it.
    pub fn local_root_view(&self) -> Option<LocalRootView> {
        self.latest_checkpoint().map(|checkpoint| LocalRootView {
            chain_id: self.chain_id,
            root: checkpoint.root,
            sequence: checkpoint.sequence,
            leaf_count: checkpoint.leaf_count,
            block_number: checkpoint.block_number,
        })
    }

    pub fn journal(&self) -> &[JournalEntry] {
        &self.journal
    }

    pub fn event(&self, id: u64) -> Option<&JournalEntry> {
        self.journal.get(id as usize)
    }

    /// Journal entries whose event satisfies `filter`, oldest first.
    pub fn events_for<F>(&self, filter: F) -> impl Iterator<Item = &JournalEntry>
    where
        F: Fn(&LedgerEvent) -> bool,
    {
        self.journal.iter().filter(move |entry| filter(&entry.event))
    }

    /// Latest journal entry whose event satisfies `filter`.
    pub fn latest_event<F>(&self, filter: F) -> Option<&JournalEntry>
    where
        F: Fn(&LedgerEvent) -> bool,
    {
        self.journal.iter().rev().find(|entry| filter(&entry.event))
    }

    pub fn journal_json(&self) -> Result<String> {
        Ok(serde_json::to_string_pretty(&self.journal)?)
    }

    /// Faucet for the native asset.
    pub fn fund_native(&mut self, account: Address, amount: Amount) {
        let balance = self.native_balances.entry(account).or_insert(0);
        *balance = balance.saturating_add(amount);
        self.begin_tx();
    }

    /// Lock native asset and mint the same amount of the wrapped asset.
    pub fn wrap(&mut self, account: Address, amount: Amount) -> Result<()> {
        let available = self.native_balance_of(&account);
        if available < amount {
            return Err(BridgeError::InsufficientBalance {
                account,
                needed: amount,
                available,
            });
        }
        self.begin_tx();
        self.native_balances.insert(account, available - amount);
        self.credit(account, amount);
        self.emit(LedgerEvent::Wrapped { account, amount });
        Ok(())
    }

    /// Burn wrapped asset and release the native asset.
    pub fn unwrap(&mut self, account: Address, amount: Amount) -> Result<()> {
        self.debit(account, amount)?;
        self.begin_tx();
        let native = self.native_balances.entry(account).or_insert(0);
        *native = native.saturating_add(amount);
        self.emit(LedgerEvent::Unwrapped { account, amount });
        Ok(())
    }

    /// Burn `amount` for a later mint elsewhere.
    ///
    /// # Arguments
    /// * `sender` - account whose wrapped balance is debited
    /// * `pre_commitment` - the nullifier `H(nullifier_preimage, secret, destination)`
    /// * `amount` - wrapped units to burn
    pub fn burn(&mut self, sender: Address, pre_commitment: FieldBytes, amount: Amount) -> Result<BurnReceipt> {
        let available = self.balance_of(&sender);
        if available < amount {
            return Err(BridgeError::InsufficientBalance {
                account: sender,
                needed: amount,
                available,
            });
        }
        let commitment = FieldBytes::from_fr(&commitment_from_nullifier(
            &PoseidonHasher,
            pre_commitment.to_fr()?,
            amount,
        ));
        let leaf_index = self.accumulator.append(commitment)?;

        self.begin_tx();
        self.debit(sender, amount)?;
        self.emit(LedgerEvent::Burned {
            sender,
            commitment,
            leaf_index,
            amount,
        });

        info!(
            "Burned {} on chain {} at leaf {} (block {})",
            amount, self.chain_id, leaf_index, self.block_number
        );
        Ok(BurnReceipt {
            chain_id: self.chain_id,
            commitment,
            leaf_index,
            block_number: self.block_number,
        })
    }

    /// Checkpoint the accumulator into the local root history.
    ///
    /// Calling it again without new burns returns the same checkpoint.
    pub fn store_local_root_in_history(&mut self) -> Checkpoint {
        let before = self.accumulator.latest_checkpoint().map(|c| c.sequence);
        let checkpoint = self.accumulator.checkpoint(self.block_number + 1);
        if before != Some(checkpoint.sequence) {
            self.begin_tx();
            self.emit(LedgerEvent::LocalRootStored { checkpoint });
            info!(
                "Chain {} stored local root {} (sequence {}, {} leaves)",
                self.chain_id, checkpoint.root, checkpoint.sequence, checkpoint.leaf_count
            );
        }
        checkpoint
    }

    /// Record a giga root built by the hub living on this chain.
    pub fn record_constructed_giga_root(&mut self, giga_root: FieldBytes, snapshot_sequence: u64) {
        let already = self.journal.iter().any(|entry| {
            matches!(
                entry.event,
                LedgerEvent::ConstructedNewGigaRoot { snapshot_sequence: s, .. } if s == snapshot_sequence
            )
        });
        if already {
            return;
        }
        self.begin_tx();
        self.emit(LedgerEvent::ConstructedNewGigaRoot {
            giga_root,
            snapshot_sequence,
        });
    }

    /// Accept a giga root delivered by the hub.
    ///
    /// Deliveries are unordered, so a root from an older hub snapshot than
    /// the current one is ignored.
    ///
    /// # Returns
    /// `false` when the root was already current or is older.
    pub fn accept_giga_root(&mut self, giga_root: FieldBytes, snapshot_sequence: u64) -> bool {
        if let Some((current, sequence)) = self.accepted_giga_roots.last() {
            if *sequence >= snapshot_sequence {
                debug!(
                    "Chain {} ignoring giga root {} from snapshot {} (on {} from snapshot {})",
                    self.chain_id, giga_root, snapshot_sequence, current, sequence
                );
                return false;
            }
        }
        self.begin_tx();
        self.accepted_giga_roots.push((giga_root, snapshot_sequence));
        self.emit(LedgerEvent::ReceivedGigaRoot {
            giga_root,
            snapshot_sequence,
        });
        info!(
            "Chain {} accepted giga root {} (snapshot {})",
            self.chain_id, giga_root, snapshot_sequence
        );
        true
    }

    /// Apply a verified mint. Callers must have checked every precondition.
    pub(crate) fn apply_mint(
        &mut self,
        nullifier: FieldBytes,
        recipient: Address,
        relayer: Address,
        amount: Amount,
        fee: Amount,
    ) -> Payout {
        self.begin_tx();
        self.spent_nullifiers.insert(nullifier);
        self.total_supply = self.total_supply.saturating_add(amount);
        let recipient_amount = amount - fee;
        *self.balances.entry(recipient).or_insert(0) += recipient_amount;
        *self.balances.entry(relayer).or_insert(0) += fee;
        self.emit(LedgerEvent::Minted {
            nullifier,
            recipient,
            relayer,
            amount,
            fee,
        });
        Payout {
            chain_id: self.chain_id,
            nullifier,
            recipient,
            recipient_amount,
            relayer,
            fee,
            block_number: self.block_number,
        }
    }

    fn begin_tx(&mut self) {
        self.block_number += 1;
    }

    fn emit(&mut self, event: LedgerEvent) {
        let id = self.journal.len() as u64;
        self.journal.push(JournalEntry {
            id,
            block_number: self.block_number,
            event,
        });
    }

    fn credit(&mut self, account: Address, amount: Amount) {
        *self.balances.entry(account).or_insert(0) += amount;
        self.total_supply = self.total_supply.saturating_add(amount);
    }

    fn debit(&mut self, account: Address, amount: Amount) -> Result<()> {
        let available = self.balance_of(&account);
        if available < amount {
            return Err(BridgeError::InsufficientBalance {
                account,
                needed: amount,
                available,
            });
        }
        self.balances.insert(account, available - amount);
        self.total_supply -= amount;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use warptoad_core::{CommitmentPreimage, WarpToadError};

    const AMOUNT: Amount = 5_000_000_000_000_000_000;

    fn funded_ledger(account: Address) -> ChainLedger {
        let mut ledger = ChainLedger::new(31337, ChainKind::L1, 8, 900_000).unwrap();
        ledger.fund_native(account, 2 * AMOUNT);
        ledger.wrap(account, 2 * AMOUNT).unwrap();
        ledger
    }

    #[test]
    fn genesis_has_an_empty_checkpoint() {
        let ledger = ChainLedger::new(1, ChainKind::L2, 4, 1).unwrap();
        let view = ledger.local_root_view().unwrap();
        assert_eq!(view.sequence, 0);
        assert_eq!(view.leaf_count, 0);
        assert!(ledger.current_giga_root().is_none());
    }

    #[test]
    fn burn_appends_commitment_and_debits_sender() {
        let sender = Address::derive("sender");
        let mut ledger = funded_ledger(sender);
        let preimage = CommitmentPreimage::from_integers(4321, 1234, 31337, AMOUNT);
        let nullifier = preimage.nullifier(&PoseidonHasher).unwrap();

        let receipt = ledger.burn(sender, nullifier, AMOUNT).unwrap();
        assert_eq!(receipt.leaf_index, 0);
        assert_eq!(receipt.commitment, preimage.commitment(&PoseidonHasher).unwrap());
        assert_eq!(ledger.balance_of(&sender), AMOUNT);
        assert_eq!(ledger.total_supply(), AMOUNT);
        assert!(matches!(
            ledger.latest_event(|e| matches!(e, LedgerEvent::Burned { .. })).map(|e| &e.event),
            Some(LedgerEvent::Burned { leaf_index: 0, .. })
        ));
    }

    #[test]
    fn burn_rejects_overdraft() {
        let sender = Address::derive("sender");
        let mut ledger = funded_ledger(sender);
        let err = ledger
            .burn(sender, FieldBytes::from_u64(1), 3 * AMOUNT)
            .unwrap_err();
        assert!(matches!(err, BridgeError::InsufficientBalance { .. }));
        assert_eq!(ledger.accumulator().next_index(), 0);
    }

    #[test]
    fn burn_on_full_accumulator_is_fatal() {
        let sender = Address::derive("sender");
        let mut ledger = ChainLedger::new(7, ChainKind::L2, 1, 1).unwrap();
        ledger.fund_native(sender, 10);
        ledger.wrap(sender, 10).unwrap();
        ledger.burn(sender, FieldBytes::from_u64(1), 1).unwrap();
        ledger.burn(sender, FieldBytes::from_u64(2), 1).unwrap();
        let err = ledger.burn(sender, FieldBytes::from_u64(3), 1).unwrap_err();
        assert!(matches!(
            err,
            BridgeError::Core(WarpToadError::CapacityExceeded { .. })
        ));
        assert!(err.is_fatal());
        assert_eq!(ledger.balance_of(&sender), 8);
    }

    #[test]
    fn storing_local_root_is_idempotent() {
        let sender = Address::derive("sender");
        let mut ledger = funded_ledger(sender);
        ledger.burn(sender, FieldBytes::from_u64(9), AMOUNT).unwrap();

        let first = ledger.store_local_root_in_history();
        let events = ledger.journal().len();
        let second = ledger.store_local_root_in_history();
        assert_eq!(first, second);
        assert_eq!(ledger.journal().len(), events);
        assert_eq!(first.leaf_count, 1);
    }

    #[test]
    fn giga_roots_only_move_forward() {
        let mut ledger = ChainLedger::new(1, ChainKind::L2, 4, 1).unwrap();
        let old = FieldBytes::from_u64(41);
        let new = FieldBytes::from_u64(42);
        assert!(ledger.accept_giga_root(old, 0));
        assert!(ledger.accept_giga_root(new, 1));
        assert!(!ledger.accept_giga_root(new, 1));
        assert!(!ledger.accept_giga_root(old, 0));
        assert_eq!(ledger.current_giga_root(), Some(new));
        assert_eq!(ledger.current_giga_sequence(), Some(1));
        assert!(ledger.is_giga_root_accepted(&old));
        assert_eq!(ledger.journal().len(), 2);
        assert_eq!(
            ledger
                .events_for(|e| matches!(e, LedgerEvent::ReceivedGigaRoot { .. }))
                .count(),
            2
        );
    }

    #[test]
    fn unwrap_returns_native_asset() {
        let account = Address::derive("holder");
        let mut ledger = funded_ledger(account);
        ledger.unwrap(account, AMOUNT).unwrap();
        assert_eq!(ledger.native_balance_of(&account), AMOUNT);
        assert_eq!(ledger.balance_of(&account), AMOUNT);
        assert!(ledger.journal_json().unwrap().contains("unwrapped"));
    }
}
