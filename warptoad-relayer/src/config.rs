//! Relayer configuration.
//!
//! Values come from an optional TOML file (`WARPTOAD_CONFIG`, default
//! `warptoad.toml`) overlaid with `WARPTOAD_*` environment variables, e.g.
//! `WARPTOAD_MAX_RETRIES=5` or `WARPTOAD_JSON_LOGS=true`.
//!
//! Token amounts are `u128` and may be written as decimal strings, since
//! TOML integers stop at `i64::MAX`.

use std::collections::HashSet;
use std::env;

use anyhow::{bail, ensure, Context, Result};
use config::{builder::DefaultState, Config, ConfigBuilder, Environment, File};
use serde::{Deserialize, Serialize};
use warptoad_bridge::{ChainConfig, MessengerSettings, RelayerSettings};
use warptoad_core::{
    compute_fee_factor, Address, Amount, ChainId, ChainKind, RelayerFeeQuote, MAX_GIGA_CHAINS,
};

const DEFAULT_CONFIG_FILE: &str = "warptoad.toml";

/// One sandbox transfer: burn on `from`, mint on `to`.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Route {
    pub from: ChainId,
    pub to: ChainId,
}

/// Relayer configuration.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(default)]
pub struct RelayerConfig {
    /// L1 chain hosting the giga-root hub.
    pub hub_chain_id: ChainId,
    pub chains: Vec<ChainConfig>,
    /// Transfers to run; every ordered pair of chains when empty.
    pub routes: Vec<Route>,
    pub poll_interval_ms: u64,
    pub delivery_timeout_ms: u64,
    pub max_retries: u32,
    pub retry_backoff_ms: u64,
    /// Simulated cross-domain message latency.
    pub message_latency_ms: u64,
    pub duplicate_deliveries: bool,
    pub relayer_address: Address,
    /// Wrapped tokens needed to buy one native unit.
    pub asset_price_per_native_unit: f64,
    pub relayer_margin: f64,
    #[serde(with = "amount")]
    pub gas_price_wei: u128,
    #[serde(with = "amount")]
    pub priority_fee: u128,
    #[serde(with = "amount")]
    pub max_fee: Amount,
    /// Amount burned per transfer.
    #[serde(with = "amount")]
    pub burn_amount: Amount,
    pub json_logs: bool,
}

impl Default for RelayerConfig {
    fn default() -> Self {
        Self {
            hub_chain_id: 31337,
            chains: vec![ChainConfig::l1(31337), ChainConfig::l2(696969)],
            routes: Vec::new(),
            poll_interval_ms: 100,
            delivery_timeout_ms: 30_000,
            max_retries: 3,
            retry_backoff_ms: 500,
            message_latency_ms: 250,
            duplicate_deliveries: false,
            relayer_address: Address::derive("relayer"),
            asset_price_per_native_unit: 1700.34,
            relayer_margin: 1.1,
            gas_price_wei: 1_000_000_000,
            priority_fee: 100_000_000,
            max_fee: 5_000_000_000_000_000_000,
            burn_amount: 5_000_000_000_000_000_000,
            json_logs: false,
        }
    }
}

impl RelayerConfig {
    /// Load configuration from the config file and environment.
    pub fn load() -> Result<Self> {
        let path = env::var("WARPTOAD_CONFIG").unwrap_or_else(|_| DEFAULT_CONFIG_FILE.to_string());
        let builder = Config::builder()
            .add_source(File::with_name(&path).required(false))
            .add_source(
                Environment::with_prefix("WARPTOAD")
                    .prefix_separator("_")
                    .separator("__"),
            );
        Self::from_builder(builder).with_context(|| format!("loading relayer config ({})", path))
    }

    fn from_builder(builder: ConfigBuilder<DefaultState>) -> Result<Self> {
        let config: Self = builder
            .build()?
            .try_deserialize()
            .context("invalid relayer config")?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<()> {
        ensure!(!self.chains.is_empty(), "at least one chain must be configured");
        ensure!(
            self.chains.len() <= MAX_GIGA_CHAINS,
            "{} chains configured, the giga tree holds {}",
            self.chains.len(),
            MAX_GIGA_CHAINS
        );

        let mut seen = HashSet::new();
        for chain in &self.chains {
            ensure!(seen.insert(chain.chain_id), "chain {} configured twice", chain.chain_id);
        }
        match self.chains.iter().find(|c| c.chain_id == self.hub_chain_id) {
            Some(hub) if hub.kind == ChainKind::L1 => {}
            Some(_) => bail!("hub chain {} must be an L1 chain", self.hub_chain_id),
            None => bail!("hub chain {} is not configured", self.hub_chain_id),
        }
        for route in &self.routes {
            ensure!(
                seen.contains(&route.from) && seen.contains(&route.to),
                "route {} -> {} uses an unconfigured chain",
                route.from,
                route.to
            );
        }

        ensure!(self.burn_amount > 0, "burn amount must be positive");
        ensure!(self.delivery_timeout_ms > 0, "delivery timeout must be positive");
        self.fee_quote()?;
        Ok(())
    }

    pub fn fee_quote(&self) -> Result<RelayerFeeQuote> {
        let fee_factor = compute_fee_factor(
            self.asset_price_per_native_unit,
            self.gas_price_wei,
            self.relayer_margin,
        )?;
        Ok(RelayerFeeQuote::new(fee_factor, self.priority_fee, self.max_fee))
    }

    /// Configured routes, or every ordered pair of chains.
    pub fn routes(&self) -> Vec<Route> {
        if !self.routes.is_empty() {
            return self.routes.clone();
        }
        self.chains
            .iter()
            .flat_map(|from| {
                self.chains.iter().map(move |to| Route {
                    from: from.chain_id,
                    to: to.chain_id,
                })
            })
            .collect()
    }

    pub fn relayer_settings(&self) -> RelayerSettings {
        RelayerSettings {
            poll_interval_ms: self.poll_interval_ms,
            delivery_timeout_ms: self.delivery_timeout_ms,
            max_retries: self.max_retries,
            retry_backoff_ms: self.retry_backoff_ms,
        }
    }

    pub fn messenger_settings(&self) -> MessengerSettings {
        MessengerSettings {
            latency_ms: self.message_latency_ms,
            duplicate_deliveries: self.duplicate_deliveries,
        }
    }
}

/// `u128` amounts as integers or decimal strings; serialized as strings.
mod amount {
    use std::fmt;

    use serde::{de, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(value: &u128, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&value.to_string())
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<u128, D::Error> {
        deserializer.deserialize_any(AmountVisitor)
    }

    struct AmountVisitor;

    impl<'de> de::Visitor<'de> for AmountVisitor {
        type Value = u128;

        fn expecting(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
            f.write_str("a non-negative integer or decimal string")
        }

        fn visit_u64<E: de::Error>(self, v: u64) -> Result<u128, E> {
            Ok(v.into())
        }

        fn visit_u128<E: de::Error>(self, v: u128) -> Result<u128, E> {
            Ok(v)
        }

        fn visit_i64<E: de::Error>(self, v: i64) -> Result<u128, E> {
            u128::try_from(v).map_err(|_| E::custom(format!("amount {} is negative", v)))
        }

        fn visit_i128<E: de::Error>(self, v: i128) -> Result<u128, E> {
            u128::try_from(v).map_err(|_| E::custom(format!("amount {} is negative", v)))
        }

        fn visit_str<E: de::Error>(self, v: &str) -> Result<u128, E> {
            v.trim()
                .replace('_', "")
                .parse()
                .map_err(|_| E::custom(format!("invalid amount {:?}", v)))
        }
    }
}
