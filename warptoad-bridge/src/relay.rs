//! Relayer-driven bridge rounds.
//!
//! # State machine
//!
//! ```text
//!   Idle ──store──► LocalRootStored ──propagate──► MessagePropagated
//!                          │      (L2 sources only)        │
//!                          └──────────aggregate────────────┤
//!                                                          ▼
//!                GigaRootDistributed ◄──distribute── GigaRootAggregated
//! ```
//!
//! Every step is idempotent: re-running it after a timeout re-sends
//! messages and re-applies deliveries, which the hub and the ledgers
//! de-duplicate. A relayer may stop a round in any state; the round value
//! records how far it got and can be resumed with [`Relayer::run_round`].
//!
//! Relayers are permissionless and share the transport, so any relayer may
//! apply a message another one sent. A delivery is therefore confirmed by
//! its effect on the destination, not by message id.

use std::sync::Arc;
use std::time::Duration;

use futures::future::join_all;
use serde::{Deserialize, Serialize};
use tokio::time::{sleep, timeout};
use tracing::{debug, info, warn};
use warptoad_core::{
    Address, ChainId, CommitmentPreimage, GigaRootSnapshot, LocalRootView, RelayerFeeQuote,
};

use crate::{
    assembler::ProofInputAssembler,
    error::{BridgeError, Result},
    ledger::Payout,
    messenger::{Envelope, MessageId, MessagePayload},
    mint::{MintSubmission, ProofGatedMint},
    network::Network,
    prover::ProofSystem,
};

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum RelayState {
    Idle,
    LocalRootStored,
    MessagePropagated,
    GigaRootAggregated,
    GigaRootDistributed,
}

/// Progress of one root-propagation round.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct RelayRound {
    pub sources: Vec<ChainId>,
    pub recipients: Vec<ChainId>,
    /// Chains whose local roots the giga root covers; every chain when empty.
    pub participating: Vec<ChainId>,
    pub state: RelayState,
    /// Local roots stored by the round, one per source.
    pub stored: Vec<LocalRootView>,
    pub snapshot: Option<GigaRootSnapshot>,
    /// Recipients that already accepted the round's giga root.
    pub distributed_to: Vec<ChainId>,
}

impl RelayRound {
    pub fn new(sources: Vec<ChainId>, recipients: Vec<ChainId>) -> Self {
        Self {
            sources,
            recipients,
            participating: Vec::new(),
            state: RelayState::Idle,
            stored: Vec::new(),
            snapshot: None,
            distributed_to: Vec::new(),
        }
    }

    /// Restrict aggregation to `participating` chains.
    pub fn with_participating(mut self, participating: Vec<ChainId>) -> Self {
        self.participating = participating;
        self
    }

    pub fn is_complete(&self) -> bool {
        self.state == RelayState::GigaRootDistributed
    }

    fn require_state(&self, allowed: &[RelayState], action: &'static str) -> Result<()> {
        if allowed.contains(&self.state) {
            Ok(())
        } else {
            Err(BridgeError::InvalidTransition {
                from: self.state,
                action,
            })
        }
    }
}

/// Timing and retry policy of a relayer.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct RelayerSettings {
    pub poll_interval_ms: u64,
    pub delivery_timeout_ms: u64,
    pub max_retries: u32,
    /// Initial backoff; doubled after every failed attempt.
    pub retry_backoff_ms: u64,
}

impl Default for RelayerSettings {
    fn default() -> Self {
        Self {
            poll_interval_ms: 100,
            delivery_timeout_ms: 30_000,
            max_retries: 3,
            retry_backoff_ms: 500,
        }
    }
}

impl RelayerSettings {
    fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms)
    }

    fn delivery_timeout(&self) -> Duration {
        Duration::from_millis(self.delivery_timeout_ms)
    }

    fn backoff(&self, attempt: u32) -> Duration {
        Duration::from_millis(self.retry_backoff_ms.saturating_mul(1u64 << attempt.min(16)))
    }
}

/// A bridged transfer a relayer should complete.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct MintRequest {
    pub burn_chain: ChainId,
    pub preimage: CommitmentPreimage,
    pub recipient: Address,
    pub quote: RelayerFeeQuote,
}

pub struct Relayer<P: ProofSystem> {
    network: Arc<Network>,
    settings: RelayerSettings,
    address: Address,
    prover: Arc<P>,
    mint_gate: ProofGatedMint<P>,
}

impl<P: ProofSystem> Relayer<P> {
    pub fn new(network: Arc<Network>, settings: RelayerSettings, address: Address, prover: Arc<P>) -> Self {
        Self {
            network,
            settings,
            address,
            mint_gate: ProofGatedMint::new(Arc::clone(&prover)),
            prover,
        }
    }

    pub fn address(&self) -> Address {
        self.address
    }

    pub fn network(&self) -> &Arc<Network> {
        &self.network
    }

    /// Run a full round: store `sources`' roots, propagate, aggregate over
    /// every chain and distribute to `recipients`.
    pub async fn bridge_round(&self, sources: &[ChainId], recipients: &[ChainId]) -> Result<RelayRound> {
        self.bridge_round_over(sources, recipients, &[]).await
    }

    /// Like [`Relayer::bridge_round`], aggregating only `participating` chains.
    pub async fn bridge_round_over(
        &self,
        sources: &[ChainId],
        recipients: &[ChainId],
        participating: &[ChainId],
    ) -> Result<RelayRound> {
        let mut round = RelayRound::new(sources.to_vec(), recipients.to_vec())
            .with_participating(participating.to_vec());
        self.run_round(&mut round).await?;
        Ok(round)
    }

    /// Drive `round` to completion, retrying retryable failures with backoff.
    pub async fn run_round(&self, round: &mut RelayRound) -> Result<()> {
        let mut attempt = 0;
        while !round.is_complete() {
            match self.step(round).await {
                Ok(state) => debug!("Relay round advanced to {:?}", state),
                Err(err) if err.is_retryable() && attempt < self.settings.max_retries => {
                    let backoff = self.settings.backoff(attempt);
                    warn!(
                        "Relay step from {:?} failed ({}), retrying in {:?}",
                        round.state, err, backoff
                    );
                    attempt += 1;
                    sleep(backoff).await;
                }
                Err(err) => return Err(err),
            }
        }
        Ok(())
    }

    /// Perform the next transition of `round`.
    pub async fn step(&self, round: &mut RelayRound) -> Result<RelayState> {
        match round.state {
            RelayState::Idle => {
                self.store_local_roots(round).await?;
            }
            RelayState::LocalRootStored if self.needs_propagation(round)? => {
                self.propagate(round).await?;
            }
            RelayState::LocalRootStored | RelayState::MessagePropagated => {
                self.aggregate(round).await?;
            }
            RelayState::GigaRootAggregated => {
                self.distribute(round).await?;
            }
            RelayState::GigaRootDistributed => {}
        }
        Ok(round.state)
    }

    /// Checkpoint every source chain's accumulator.
    pub async fn store_local_roots(&self, round: &mut RelayRound) -> Result<()> {
        round.require_state(&[RelayState::Idle], "store local roots")?;
        let mut stored = Vec::with_capacity(round.sources.len());
        for chain_id in &round.sources {
            let ledger = self.network.ledger(*chain_id)?;
            let mut ledger = ledger.lock().await;
            ledger.store_local_root_in_history();
            if let Some(view) = ledger.local_root_view() {
                stored.push(view);
            }
        }
        round.stored = stored;
        round.state = RelayState::LocalRootStored;
        Ok(())
    }

    /// Deliver L2 sources' local roots to the hub.
    pub async fn propagate(&self, round: &mut RelayRound) -> Result<()> {
        round.require_state(&[RelayState::LocalRootStored], "propagate local roots")?;
        let hub_chain = self.network.hub_chain_id();
        let messenger = self.network.messenger();

        let mut pending = Vec::new();
        for view in &round.stored {
            if !self.network.kind(view.chain_id)?.is_cross_domain() {
                continue;
            }
            let payload = MessagePayload::LocalRoot(*view);
            let id = messenger
                .send_message(view.chain_id, hub_chain, payload.clone())
                .await?;
            info!(
                "Sent local root of chain {} to hub (message {})",
                view.chain_id, id
            );
            pending.push((id, payload));
        }
        for (id, payload) in &pending {
            self.await_delivery(hub_chain, *id, payload).await?;
        }
        round.state = RelayState::MessagePropagated;
        Ok(())
    }

    /// Refresh the hub's view of L1 chains and build a giga root over the
    /// round's participating chains.
    pub async fn aggregate(&self, round: &mut RelayRound) -> Result<GigaRootSnapshot> {
        round.require_state(
            &[RelayState::LocalRootStored, RelayState::MessagePropagated],
            "aggregate giga root",
        )?;
        let participating = if round.participating.is_empty() {
            self.network.chain_ids()
        } else {
            round.participating.clone()
        };

        let mut l1_views = Vec::new();
        for chain_id in &participating {
            if self.network.kind(*chain_id)?.is_cross_domain() {
                continue;
            }
            let ledger = self.network.ledger(*chain_id)?;
            let ledger = ledger.lock().await;
            l1_views.extend(ledger.local_root_view());
        }

        let snapshot = {
            let hub = self.network.hub();
            let mut hub = hub.lock().await;
            for view in l1_views {
                hub.update_local_root(view);
            }
            hub.aggregate(&participating)?
        };

        {
            let ledger = self.network.ledger(self.network.hub_chain_id())?;
            ledger
                .lock()
                .await
                .record_constructed_giga_root(snapshot.giga_root, snapshot.sequence);
        }

        round.snapshot = Some(snapshot.clone());
        round.state = RelayState::GigaRootAggregated;
        Ok(snapshot)
    }

    /// Hand the round's giga root to every recipient.
    ///
    /// Chains not listed as recipients keep their previous giga root.
    pub async fn distribute(&self, round: &mut RelayRound) -> Result<()> {
        round.require_state(&[RelayState::GigaRootAggregated], "distribute giga root")?;
        let snapshot = round.snapshot.clone().ok_or(BridgeError::InvalidTransition {
            from: round.state,
            action: "distribute without snapshot",
        })?;
        let hub_chain = self.network.hub_chain_id();
        let messenger = self.network.messenger();

        let mut pending = Vec::new();
        for recipient in round.recipients.clone() {
            if round.distributed_to.contains(&recipient) {
                continue;
            }
            if self.network.kind(recipient)?.is_cross_domain() {
                let payload = MessagePayload::GigaRoot {
                    giga_root: snapshot.giga_root,
                    snapshot_sequence: snapshot.sequence,
                };
                let id = messenger
                    .send_message(hub_chain, recipient, payload.clone())
                    .await?;
                info!("Sent giga root {} to chain {} (message {})", snapshot.giga_root, recipient, id);
                pending.push((recipient, id, payload));
            } else {
                let ledger = self.network.ledger(recipient)?;
                ledger
                    .lock()
                    .await
                    .accept_giga_root(snapshot.giga_root, snapshot.sequence);
                round.distributed_to.push(recipient);
            }
        }

        let results = join_all(
            pending
                .iter()
                .map(|(recipient, id, payload)| self.await_delivery(*recipient, *id, payload)),
        )
        .await;
        let mut first_error = None;
        for ((recipient, _, _), result) in pending.iter().zip(results) {
            match result {
                Ok(()) => round.distributed_to.push(*recipient),
                Err(err) => {
                    warn!("Giga root delivery to chain {} failed: {}", recipient, err);
                    first_error.get_or_insert(err);
                }
            }
        }
        if let Some(err) = first_error {
            return Err(err);
        }

        round.state = RelayState::GigaRootDistributed;
        Ok(())
    }

    /// Assemble, prove and settle a mint, retrying retryable failures.
    pub async fn mint(&self, request: &MintRequest) -> Result<Payout> {
        let mut attempt = 0;
        loop {
            match self.try_mint(request).await {
                Ok(payout) => return Ok(payout),
                Err(err) if err.is_retryable() && attempt < self.settings.max_retries => {
                    let backoff = self.settings.backoff(attempt);
                    warn!("Mint attempt failed ({}), retrying in {:?}", err, backoff);
                    attempt += 1;
                    sleep(backoff).await;
                }
                Err(err) => return Err(err),
            }
        }
    }

    async fn try_mint(&self, request: &MintRequest) -> Result<Payout> {
        let destination = request.preimage.destination_chain_id;
        let inputs = ProofInputAssembler::new(&self.network)
            .assemble(
                request.burn_chain,
                destination,
                &request.preimage,
                &request.quote,
                self.address,
                request.recipient,
            )
            .await?;
        let proof = self.prover.prove(&inputs)?;
        let submission = MintSubmission {
            public: inputs.public,
            proof,
            priority_fee: request.quote.priority_fee,
        };

        let ledger = self.network.ledger(destination)?;
        let mut ledger = ledger.lock().await;
        self.mint_gate.settle(&mut ledger, &submission)
    }

    fn needs_propagation(&self, round: &RelayRound) -> Result<bool> {
        for view in &round.stored {
            if self.network.kind(view.chain_id)?.is_cross_domain() {
                return Ok(true);
            }
        }
        Ok(false)
    }

    /// Poll deliveries to `to` until the effect of `payload` is visible there.
    ///
    /// Whichever relayer drains the message applies it, so the check reads
    /// the destination's state rather than tracking message `id`.
    async fn await_delivery(&self, to: ChainId, id: MessageId, payload: &MessagePayload) -> Result<()> {
        let wait = async {
            loop {
                self.drain_deliveries(to).await;
                if self.is_applied(to, payload).await? {
                    debug!("Message {} to chain {} is in effect", id, to);
                    return Ok::<(), BridgeError>(());
                }
                sleep(self.settings.poll_interval()).await;
            }
        };
        match timeout(self.settings.delivery_timeout(), wait).await {
            Ok(result) => result,
            Err(_) => Err(BridgeError::MessageDeliveryTimeout {
                message_id: id,
                destination: to,
                timeout: self.settings.delivery_timeout(),
            }),
        }
    }

    /// Whether `to` already reflects `payload` or something newer.
    async fn is_applied(&self, to: ChainId, payload: &MessagePayload) -> Result<bool> {
        match payload {
            MessagePayload::LocalRoot(view) => {
                let hub = self.network.hub();
                let hub = hub.lock().await;
                Ok(hub
                    .local_root(view.chain_id)
                    .map_or(false, |stored| stored.sequence >= view.sequence))
            }
            MessagePayload::GigaRoot {
                snapshot_sequence, ..
            } => {
                let ledger = self.network.ledger(to)?;
                let ledger = ledger.lock().await;
                Ok(ledger
                    .current_giga_sequence()
                    .map_or(false, |sequence| sequence >= *snapshot_sequence))
            }
        }
    }

    /// Apply every message currently deliverable to `to`.
    ///
    /// A message that cannot be applied is logged and dropped; the rest of
    /// the batch is still applied.
    async fn drain_deliveries(&self, to: ChainId) {
        let envelopes = self.network.messenger().take_delivered(to).await;
        for envelope in envelopes {
            if let Err(err) = self.apply(&envelope).await {
                warn!(
                    "Dropping message {} to chain {}: {}",
                    envelope.id, envelope.to, err
                );
            }
        }
    }

    async fn apply(&self, envelope: &Envelope) -> Result<()> {
        match &envelope.payload {
            MessagePayload::LocalRoot(view) => {
                if envelope.to != self.network.hub_chain_id() {
                    return Err(BridgeError::UnexpectedMessage(envelope.to));
                }
                self.network.hub().lock().await.update_local_root(*view);
            }
            MessagePayload::GigaRoot {
                giga_root,
                snapshot_sequence,
            } => {
                let ledger = self.network.ledger(envelope.to)?;
                ledger
                    .lock()
                    .await
                    .accept_giga_root(*giga_root, *snapshot_sequence);
            }
        }
        debug!("Applied message {} to chain {}", envelope.id, envelope.to);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        messenger::{CrossDomainMessenger, MessengerSettings, SimulatedMessenger},
        network::ChainConfig,
        prover::NativeWitnessBackend,
    };
    use warptoad_core::FieldBytes;

    #[test]
    fn transitions_are_guarded() {
        let round = RelayRound::new(vec![1], vec![1]);
        assert!(round.require_state(&[RelayState::Idle], "store").is_ok());
        assert_eq!(
            round.require_state(&[RelayState::GigaRootAggregated], "distribute"),
            Err(BridgeError::InvalidTransition {
                from: RelayState::Idle,
                action: "distribute"
            })
        );
    }

    #[test]
    fn backoff_doubles() {
        let settings = RelayerSettings {
            retry_backoff_ms: 100,
            ..RelayerSettings::default()
        };
        assert_eq!(settings.backoff(0), Duration::from_millis(100));
        assert_eq!(settings.backoff(3), Duration::from_millis(800));
    }

    #[tokio::test(start_paused = true)]
    async fn bad_envelope_does_not_drop_the_rest_of_the_batch() {
        let messenger = Arc::new(SimulatedMessenger::new(MessengerSettings::default()));
        let transport: Arc<dyn CrossDomainMessenger> = messenger.clone();
        let network = Arc::new(
            Network::builder(1, transport)
                .chain(ChainConfig::l1(1).with_depth(4))
                .chain(ChainConfig::l2(2).with_depth(4))
                .build()
                .unwrap(),
        );
        let relayer = Relayer::new(
            Arc::clone(&network),
            RelayerSettings::default(),
            Address::derive("relayer"),
            Arc::new(NativeWitnessBackend::default()),
        );

        // A local root addressed to an L2 cannot be applied.
        let stray = network.ledger(2).unwrap().lock().await.local_root_view().unwrap();
        messenger
            .send_message(1, 2, MessagePayload::LocalRoot(stray))
            .await
            .unwrap();
        let root = FieldBytes::from_u64(9);
        messenger
            .send_message(
                1,
                2,
                MessagePayload::GigaRoot {
                    giga_root: root,
                    snapshot_sequence: 0,
                },
            )
            .await
            .unwrap();

        sleep(MessengerSettings::default().latency()).await;
        relayer.drain_deliveries(2).await;

        assert_eq!(messenger.in_flight().await, 0);
        let ledger = network.ledger(2).unwrap();
        assert_eq!(ledger.lock().await.current_giga_root(), Some(root));
    }
}
