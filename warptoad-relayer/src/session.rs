//! Sandbox session: deploy a network and bridge funds along each route.

use std::sync::Arc;

use anyhow::{Context, Result};
use serde::Serialize;
use tracing::info;
use warptoad_bridge::{
    CrossDomainMessenger, MintRequest, NativeWitnessBackend, Network, Payout, Relayer,
    SimulatedMessenger,
};
use warptoad_core::{Address, ChainId, CommitmentPreimage, PoseidonHasher, RelayerFeeQuote};

use crate::config::{RelayerConfig, Route};

/// Result of one bridged transfer.
#[derive(Clone, Debug, Serialize)]
pub struct TransferOutcome {
    pub route: Route,
    pub leaf_index: u64,
    pub payout: Payout,
}

pub struct SandboxSession {
    config: RelayerConfig,
    network: Arc<Network>,
    messenger: Arc<SimulatedMessenger>,
    relayer: Relayer<NativeWitnessBackend>,
    quote: RelayerFeeQuote,
    sender: Address,
    recipient: Address,
}

impl SandboxSession {
    /// Deploy every configured chain behind a simulated messenger.
    pub fn new(config: RelayerConfig) -> Result<Self> {
        config.validate()?;
        let messenger = Arc::new(SimulatedMessenger::new(config.messenger_settings()));
        let transport: Arc<dyn CrossDomainMessenger> = messenger.clone();
        let network = Arc::new(
            Network::builder(config.hub_chain_id, transport)
                .chains(config.chains.iter().cloned())
                .build()
                .context("deploying sandbox network")?,
        );
        let relayer = Relayer::new(
            Arc::clone(&network),
            config.relayer_settings(),
            config.relayer_address,
            Arc::new(NativeWitnessBackend::default()),
        );
        let quote = config.fee_quote()?;

        info!(
            "Deployed sandbox with hub {} and chains {:?}",
            network.hub_chain_id(),
            network.chain_ids()
        );
        Ok(Self {
            config,
            network,
            messenger,
            relayer,
            quote,
            sender: Address::derive("sandbox-sender"),
            recipient: Address::derive("sandbox-recipient"),
        })
    }

    /// Run every configured route in order.
    pub async fn run(&self) -> Result<Vec<TransferOutcome>> {
        let mut outcomes = Vec::new();
        for route in self.config.routes() {
            let outcome = self
                .transfer(route)
                .await
                .with_context(|| format!("transfer {} -> {}", route.from, route.to))?;
            outcomes.push(outcome);
        }

        let (sent, delivered) = self.messenger.stats().await;
        info!(
            "Session complete: {} transfers, {} messages sent, {} delivered",
            outcomes.len(),
            sent,
            delivered
        );
        Ok(outcomes)
    }

    /// Burn on `route.from`, run a bridge round and mint on `route.to`.
    async fn transfer(&self, route: Route) -> Result<TransferOutcome> {
        let amount = self.config.burn_amount;
        let preimage = CommitmentPreimage::random(&mut rand::thread_rng(), route.to, amount);
        let leaf_index = self.burn(route.from, &preimage).await?;

        let round = self
            .relayer
            .bridge_round(&[route.from], &recipients(route))
            .await?;
        if let Some(snapshot) = &round.snapshot {
            info!(
                "Round for {} -> {} distributed giga root {}",
                route.from, route.to, snapshot.giga_root
            );
        }

        let payout = self
            .relayer
            .mint(&MintRequest {
                burn_chain: route.from,
                preimage,
                recipient: self.recipient,
                quote: self.quote,
            })
            .await?;
        info!(
            "Bridged {} from {} to {}: recipient got {}, relayer fee {}",
            amount, route.from, route.to, payout.recipient_amount, payout.fee
        );
        Ok(TransferOutcome {
            route,
            leaf_index,
            payout,
        })
    }

    async fn burn(&self, chain: ChainId, preimage: &CommitmentPreimage) -> Result<u64> {
        let ledger = self.network.ledger(chain)?;
        let mut ledger = ledger.lock().await;
        ledger.fund_native(self.sender, preimage.amount);
        ledger.wrap(self.sender, preimage.amount)?;
        let pre_commitment = preimage.nullifier(&PoseidonHasher)?;
        let receipt = ledger.burn(self.sender, pre_commitment, preimage.amount)?;
        Ok(receipt.leaf_index)
    }
}

fn recipients(route: Route) -> Vec<ChainId> {
    if route.from == route.to {
        vec![route.to]
    } else {
        vec![route.from, route.to]
    }
}
