//! Cross-domain messaging between the hub and L2 chains.
//!
//! Delivery is asynchronous, at-least-once and unordered. Receivers must
//! treat every payload idempotently: local roots carry a checkpoint sequence
//! and giga roots are accepted at most once.

use std::collections::HashSet;
use std::time::Duration;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tokio::sync::Mutex;
use tokio::time::Instant;
use tracing::{debug, info};
use warptoad_core::{ChainId, FieldBytes, LocalRootView};

use crate::error::Result;

pub type MessageId = u64;

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "camelCase")]
pub enum MessagePayload {
    /// An L2 chain's checkpointed local root, addressed to the hub.
    LocalRoot(LocalRootView),
    /// A giga root, addressed to a recipient chain.
    GigaRoot {
        giga_root: FieldBytes,
        snapshot_sequence: u64,
    },
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Envelope {
    pub id: MessageId,
    pub from: ChainId,
    pub to: ChainId,
    pub payload: MessagePayload,
}

/// Transport for messages between execution domains.
#[async_trait]
pub trait CrossDomainMessenger: Send + Sync {
    /// Queue a message for delivery.
    async fn send_message(&self, from: ChainId, to: ChainId, payload: MessagePayload) -> Result<MessageId>;

    /// Messages to `to` that have become deliverable, removed from the transport.
    async fn take_delivered(&self, to: ChainId) -> Vec<Envelope>;
}

/// Behaviour knobs for [`SimulatedMessenger`].
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct MessengerSettings {
    /// Time between sending and the message becoming deliverable.
    pub latency_ms: u64,
    /// Deliver every message a second time, one latency later.
    pub duplicate_deliveries: bool,
}

impl Default for MessengerSettings {
    fn default() -> Self {
        Self {
            latency_ms: 50,
            duplicate_deliveries: false,
        }
    }
}

impl MessengerSettings {
    pub fn latency(&self) -> Duration {
        Duration::from_millis(self.latency_ms)
    }
}

#[derive(Debug)]
struct InFlight {
    deliver_at: Instant,
    envelope: Envelope,
    is_duplicate: bool,
}

#[derive(Debug, Default)]
struct MessengerState {
    next_id: MessageId,
    in_flight: Vec<InFlight>,
    partitioned: HashSet<ChainId>,
    sent: u64,
    delivered: u64,
}

/// In-process messenger with latency, duplication and partitions.
#[derive(Debug, Default)]
pub struct SimulatedMessenger {
    settings: MessengerSettings,
    state: Mutex<MessengerState>,
}

impl SimulatedMessenger {
    pub fn new(settings: MessengerSettings) -> Self {
        Self {
            settings,
            state: Mutex::new(MessengerState::default()),
        }
    }

    /// Hold every message to `chain_id` until [`heal`](Self::heal) is called.
    pub async fn partition(&self, chain_id: ChainId) {
        self.state.lock().await.partitioned.insert(chain_id);
        info!("Messenger partitioned chain {}", chain_id);
    }

    pub async fn heal(&self, chain_id: ChainId) {
        self.state.lock().await.partitioned.remove(&chain_id);
        info!("Messenger healed chain {}", chain_id);
    }

    pub async fn in_flight(&self) -> usize {
        self.state.lock().await.in_flight.len()
    }

    /// Total messages sent and deliveries handed out (duplicates included).
    pub async fn stats(&self) -> (u64, u64) {
        let state = self.state.lock().await;
        (state.sent, state.delivered)
    }
}

#[async_trait]
impl CrossDomainMessenger for SimulatedMessenger {
    async fn send_message(&self, from: ChainId, to: ChainId, payload: MessagePayload) -> Result<MessageId> {
        let mut state = self.state.lock().await;
        let id = state.next_id;
        state.next_id += 1;
        state.sent += 1;
        state.in_flight.push(InFlight {
            deliver_at: Instant::now() + self.settings.latency(),
            envelope: Envelope {
                id,
                from,
                to,
                payload,
            },
            is_duplicate: false,
        });
        debug!("Message {} queued from chain {} to chain {}", id, from, to);
        Ok(id)
    }

    async fn take_delivered(&self, to: ChainId) -> Vec<Envelope> {
        let mut state = self.state.lock().await;
        if state.partitioned.contains(&to) {
            return Vec::new();
        }

        let now = Instant::now();
        let (ready, pending): (Vec<InFlight>, Vec<InFlight>) = std::mem::take(&mut state.in_flight)
            .into_iter()
            .partition(|msg| msg.envelope.to == to && msg.deliver_at <= now);
        state.in_flight = pending;

        let mut delivered = Vec::with_capacity(ready.len());
        for msg in ready {
            if self.settings.duplicate_deliveries && !msg.is_duplicate {
                state.in_flight.push(InFlight {
                    deliver_at: now + self.settings.latency(),
                    envelope: msg.envelope.clone(),
                    is_duplicate: true,
                });
            }
            delivered.push(msg.envelope);
        }
        state.delivered += delivered.len() as u64;
        delivered
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn giga(n: u64) -> MessagePayload {
        MessagePayload::GigaRoot {
            giga_root: FieldBytes::from_u64(n),
            snapshot_sequence: n,
        }
    }

    #[tokio::test(start_paused = true)]
    async fn messages_arrive_after_latency() {
        let messenger = SimulatedMessenger::new(MessengerSettings::default());
        let id = messenger.send_message(1, 2, giga(1)).await.unwrap();

        assert!(messenger.take_delivered(2).await.is_empty());
        tokio::time::advance(Duration::from_millis(50)).await;
        let delivered = messenger.take_delivered(2).await;
        assert_eq!(delivered.len(), 1);
        assert_eq!(delivered[0].id, id);
        assert!(messenger.take_delivered(2).await.is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn delivery_is_per_destination() {
        let messenger = SimulatedMessenger::new(MessengerSettings::default());
        messenger.send_message(1, 2, giga(1)).await.unwrap();
        messenger.send_message(1, 3, giga(2)).await.unwrap();
        tokio::time::advance(Duration::from_millis(60)).await;

        let to_three = messenger.take_delivered(3).await;
        assert_eq!(to_three.len(), 1);
        assert_eq!(to_three[0].payload, giga(2));
        assert_eq!(messenger.in_flight().await, 1);
    }

    #[tokio::test(start_paused = true)]
    async fn duplicates_are_delivered_once_more() {
        let messenger = SimulatedMessenger::new(MessengerSettings {
            latency_ms: 10,
            duplicate_deliveries: true,
        });
        messenger.send_message(1, 2, giga(1)).await.unwrap();
        tokio::time::advance(Duration::from_millis(10)).await;
        assert_eq!(messenger.take_delivered(2).await.len(), 1);
        tokio::time::advance(Duration::from_millis(10)).await;
        assert_eq!(messenger.take_delivered(2).await.len(), 1);
        tokio::time::advance(Duration::from_millis(10)).await;
        assert!(messenger.take_delivered(2).await.is_empty());
        assert_eq!(messenger.stats().await, (1, 2));
    }

    #[tokio::test(start_paused = true)]
    async fn partitioned_chain_receives_nothing_until_healed() {
        let messenger = SimulatedMessenger::new(MessengerSettings::default());
        messenger.partition(2).await;
        messenger.send_message(1, 2, giga(1)).await.unwrap();
        tokio::time::advance(Duration::from_secs(5)).await;
        assert!(messenger.take_delivered(2).await.is_empty());

        messenger.heal(2).await;
        assert_eq!(messenger.take_delivered(2).await.len(), 1);
    }
}
