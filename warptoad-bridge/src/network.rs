//! The set of chains a relayer operates on.

use std::collections::BTreeMap;
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tokio::sync::Mutex;
use tracing::info;
use warptoad_core::{ChainId, ChainKind, GasSchedule, LOCAL_TREE_DEPTH};

use crate::{
    error::{BridgeError, Result},
    hub::GigaBridge,
    ledger::ChainLedger,
    messenger::CrossDomainMessenger,
};

/// Deployment parameters of one chain.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChainConfig {
    pub chain_id: ChainId,
    pub kind: ChainKind,
    #[serde(default = "default_depth")]
    pub tree_depth: usize,
}

fn default_depth() -> usize {
    LOCAL_TREE_DEPTH
}

impl ChainConfig {
    pub fn l1(chain_id: ChainId) -> Self {
        Self {
            chain_id,
            kind: ChainKind::L1,
            tree_depth: LOCAL_TREE_DEPTH,
        }
    }

    pub fn l2(chain_id: ChainId) -> Self {
        Self {
            chain_id,
            kind: ChainKind::L2,
            tree_depth: LOCAL_TREE_DEPTH,
        }
    }

    pub fn with_depth(mut self, tree_depth: usize) -> Self {
        self.tree_depth = tree_depth;
        self
    }
}

pub type SharedLedger = Arc<Mutex<ChainLedger>>;

/// Ledgers, hub and messenger of one bridge deployment.
pub struct Network {
    hub_chain_id: ChainId,
    kinds: BTreeMap<ChainId, ChainKind>,
    ledgers: BTreeMap<ChainId, SharedLedger>,
    hub: Arc<Mutex<GigaBridge>>,
    messenger: Arc<dyn CrossDomainMessenger>,
    gas: GasSchedule,
}

impl std::fmt::Debug for Network {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Network")
            .field("hub_chain_id", &self.hub_chain_id)
            .field("chains", &self.kinds)
            .finish()
    }
}

impl Network {
    pub fn builder(hub_chain_id: ChainId, messenger: Arc<dyn CrossDomainMessenger>) -> NetworkBuilder {
        NetworkBuilder {
            hub_chain_id,
            chains: Vec::new(),
            messenger,
            gas: GasSchedule::default(),
        }
    }

    pub fn hub_chain_id(&self) -> ChainId {
        self.hub_chain_id
    }

    pub fn chain_ids(&self) -> Vec<ChainId> {
        self.kinds.keys().copied().collect()
    }

    pub fn kind(&self, chain_id: ChainId) -> Result<ChainKind> {
        self.kinds
            .get(&chain_id)
            .copied()
            .ok_or(BridgeError::UnknownChain(chain_id))
    }

    pub fn ledger(&self, chain_id: ChainId) -> Result<SharedLedger> {
        self.ledgers
            .get(&chain_id)
            .cloned()
            .ok_or(BridgeError::UnknownChain(chain_id))
    }

    pub fn hub(&self) -> Arc<Mutex<GigaBridge>> {
        Arc::clone(&self.hub)
    }

    pub fn messenger(&self) -> Arc<dyn CrossDomainMessenger> {
        Arc::clone(&self.messenger)
    }

    pub fn gas_schedule(&self) -> &GasSchedule {
        &self.gas
    }
}

pub struct NetworkBuilder {
    hub_chain_id: ChainId,
    chains: Vec<ChainConfig>,
    messenger: Arc<dyn CrossDomainMessenger>,
    gas: GasSchedule,
}

impl NetworkBuilder {
    pub fn chain(mut self, config: ChainConfig) -> Self {
        self.chains.push(config);
        self
    }

    pub fn chains(mut self, configs: impl IntoIterator<Item = ChainConfig>) -> Self {
        self.chains.extend(configs);
        self
    }

    pub fn gas_schedule(mut self, gas: GasSchedule) -> Self {
        self.gas = gas;
        self
    }

    /// Deploy every ledger and register its genesis root with the hub.
    pub fn build(self) -> Result<Network> {
        let mut kinds = BTreeMap::new();
        let mut ledgers = BTreeMap::new();
        let mut hub = GigaBridge::new(self.hub_chain_id);

        for config in &self.chains {
            if kinds.insert(config.chain_id, config.kind).is_some() {
                return Err(BridgeError::Config(format!(
                    "chain {} configured twice",
                    config.chain_id
                )));
            }
            let ledger = ChainLedger::new(
                config.chain_id,
                config.kind,
                config.tree_depth,
                self.gas.mint_gas_for(config.chain_id),
            )?;
            if let Some(view) = ledger.local_root_view() {
                hub.update_local_root(view);
            }
            ledgers.insert(config.chain_id, Arc::new(Mutex::new(ledger)));
        }

        match kinds.get(&self.hub_chain_id) {
            Some(ChainKind::L1) => {}
            Some(ChainKind::L2) => {
                return Err(BridgeError::Config(format!(
                    "hub chain {} must be an L1 chain",
                    self.hub_chain_id
                )))
            }
            None => return Err(BridgeError::UnknownChain(self.hub_chain_id)),
        }

        info!(
            "Deployed bridge on {} chains, hub on chain {}",
            ledgers.len(),
            self.hub_chain_id
        );
        Ok(Network {
            hub_chain_id: self.hub_chain_id,
            kinds,
            ledgers,
            hub: Arc::new(Mutex::new(hub)),
            messenger: self.messenger,
            gas: self.gas,
        })
    }
}
