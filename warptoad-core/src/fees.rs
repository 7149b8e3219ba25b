//! Relayer fee economics.
//!
//! A relayer pays native gas on the destination chain and is reimbursed in
//! the wrapped asset. The fee factor converts one unit of gas into wrapped
//! asset units:
//!
//! ```text
//!   fee_factor = gas_price (native / gas)
//!              x asset_price (wrapped / native)
//!              x relayer_margin
//!   fee        = min(fee_factor x gas_used, max_fee, amount)
//! ```

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::{
    error::{Result, WarpToadError},
    types::{Amount, ChainId},
};

/// Mint gas used when a chain has no specific entry.
pub const DEFAULT_MINT_GAS: u128 = 1_000_000;

/// Fee terms a relayer commits to in the proof's public inputs.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct RelayerFeeQuote {
    /// Wrapped-asset units per unit of gas.
    pub fee_factor: u128,
    /// Native priority fee per gas the relayer will bid.
    pub priority_fee: u128,
    /// Recipient-supplied ceiling on the total fee.
    pub max_fee: Amount,
}

impl RelayerFeeQuote {
    pub fn new(fee_factor: u128, priority_fee: u128, max_fee: Amount) -> Self {
        Self {
            fee_factor,
            priority_fee,
            max_fee,
        }
    }

    /// Fee charged for a mint that used `gas_used` units of gas.
    pub fn settlement_fee(&self, gas_used: u128, amount: Amount) -> Amount {
        self.fee_factor
            .saturating_mul(gas_used)
            .min(self.max_fee)
            .min(amount)
    }
}

/// Compute the fee factor for a relayer quote.
///
/// # Arguments
/// * `asset_price_per_native_unit` - wrapped units needed to buy one native unit
/// * `estimated_gas_cost` - native units paid per unit of gas
/// * `relayer_margin_multiplier` - relayer premium, `1.1` for 10%
pub fn compute_fee_factor(
    asset_price_per_native_unit: f64,
    estimated_gas_cost: u128,
    relayer_margin_multiplier: f64,
) -> Result<u128> {
    for (name, value) in [
        ("asset price", asset_price_per_native_unit),
        ("relayer margin", relayer_margin_multiplier),
    ] {
        if !value.is_finite() || value < 0.0 {
            return Err(WarpToadError::InvalidFeeQuote(format!(
                "{} must be a finite non-negative number, got {}",
                name, value
            )));
        }
    }

    let factor =
        (estimated_gas_cost as f64 * asset_price_per_native_unit * relayer_margin_multiplier).round();
    if !factor.is_finite() || factor > u128::MAX as f64 {
        return Err(WarpToadError::InvalidFeeQuote(format!(
            "fee factor {} does not fit in u128",
            factor
        )));
    }
    Ok(factor as u128)
}

/// Mint gas usage per destination chain.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct GasSchedule {
    pub default_mint_gas: u128,
    pub mint_gas: BTreeMap<ChainId, u128>,
}

impl Default for GasSchedule {
    fn default() -> Self {
        let mut mint_gas = BTreeMap::new();
        // Local EVM devnet.
        mint_gas.insert(31337, 902_000);
        // Ethereum mainnet and Sepolia.
        mint_gas.insert(1, 902_000);
        mint_gas.insert(11155111, 902_000);
        Self {
            default_mint_gas: DEFAULT_MINT_GAS,
            mint_gas,
        }
    }
}

impl GasSchedule {
    pub fn mint_gas_for(&self, chain_id: ChainId) -> u128 {
        self.mint_gas
            .get(&chain_id)
            .copied()
            .unwrap_or(self.default_mint_gas)
    }

    /// Fee a relayer should expect before proving, for profitability checks.
    pub fn estimate_fee(&self, chain_id: ChainId, quote: &RelayerFeeQuote, amount: Amount) -> Amount {
        quote.settlement_fee(self.mint_gas_for(chain_id), amount)
    }
}
