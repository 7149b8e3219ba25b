//! Shared networks, burn preimages and fee quotes for WarpToad tests.

use std::sync::Arc;

use anyhow::{Context, Result};
use once_cell::sync::Lazy;
use rand::SeedableRng;
use rand_chacha::ChaCha20Rng;
use warptoad_bridge::{
    BurnReceipt, ChainConfig, CrossDomainMessenger, MessengerSettings, NativeWitnessBackend,
    Network, Relayer, RelayerSettings, SimulatedMessenger,
};
use warptoad_core::{
    compute_fee_factor, Address, Amount, ChainId, CommitmentPreimage, PoseidonHasher,
    RelayerFeeQuote,
};

pub const L1_CHAIN_ID: ChainId = 31337;
pub const L2_CHAIN_ID: ChainId = 696969;
pub const SECOND_L2_CHAIN_ID: ChainId = 424242;

/// Keeps zero ladders short; capacity is still far beyond any test.
pub const TEST_TREE_DEPTH: usize = 16;

pub const FIRST_BURN_AMOUNT: Amount = 5_000_000_000_000_000_000;
pub const SECOND_BURN_AMOUNT: Amount = 4_000_000_000_000_000_000;

/// 0.1 gwei.
pub const PRIORITY_FEE: u128 = 100_000_000;
pub const MAX_FEE: Amount = 5_000_000_000_000_000_000;
/// Wrapped tokens needed to buy one native unit.
pub const ASSET_PRICE_PER_NATIVE_UNIT: f64 = 1700.34;
pub const RELAYER_MARGIN: f64 = 1.1;
pub const GAS_PRICE_WEI: u128 = 1_000_000_000;

static CANONICAL_QUOTE: Lazy<RelayerFeeQuote> = Lazy::new(|| {
    let fee_factor = compute_fee_factor(ASSET_PRICE_PER_NATIVE_UNIT, GAS_PRICE_WEI, RELAYER_MARGIN)
        .expect("canonical fee inputs are valid");
    RelayerFeeQuote::new(fee_factor, PRIORITY_FEE, MAX_FEE)
});

/// A deployed network with a relayer sharing the sandbox proving key.
pub struct Sandbox {
    pub network: Arc<Network>,
    pub messenger: Arc<SimulatedMessenger>,
    pub backend: Arc<NativeWitnessBackend>,
    pub relayer: Arc<Relayer<NativeWitnessBackend>>,
}

impl Sandbox {
    pub fn new(chains: Vec<ChainConfig>, messenger_settings: MessengerSettings) -> Self {
        Self::with_settings(chains, messenger_settings, fast_relayer_settings())
    }

    pub fn with_settings(
        chains: Vec<ChainConfig>,
        messenger_settings: MessengerSettings,
        relayer_settings: RelayerSettings,
    ) -> Self {
        let messenger = Arc::new(SimulatedMessenger::new(messenger_settings));
        let transport: Arc<dyn CrossDomainMessenger> = messenger.clone();
        let network = Arc::new(
            Network::builder(L1_CHAIN_ID, transport)
                .chains(chains)
                .build()
                .expect("sandbox network configuration is valid"),
        );
        let backend = Arc::new(NativeWitnessBackend::default());
        let relayer = Arc::new(Relayer::new(
            Arc::clone(&network),
            relayer_settings,
            relayer_address(),
            Arc::clone(&backend),
        ));
        Self {
            network,
            messenger,
            backend,
            relayer,
        }
    }
}

/// Single L1 chain acting as its own hub.
pub fn l1_only() -> Sandbox {
    Sandbox::new(
        vec![ChainConfig::l1(L1_CHAIN_ID).with_depth(TEST_TREE_DEPTH)],
        MessengerSettings::default(),
    )
}

/// L1 hub plus two L2 chains behind the simulated messenger.
pub fn l1_and_l2() -> Sandbox {
    l1_and_l2_with(MessengerSettings::default())
}

pub fn l1_and_l2_with(messenger_settings: MessengerSettings) -> Sandbox {
    Sandbox::new(
        vec![
            ChainConfig::l1(L1_CHAIN_ID).with_depth(TEST_TREE_DEPTH),
            ChainConfig::l2(L2_CHAIN_ID).with_depth(TEST_TREE_DEPTH),
            ChainConfig::l2(SECOND_L2_CHAIN_ID).with_depth(TEST_TREE_DEPTH),
        ],
        messenger_settings,
    )
}

/// Short timeouts so paused-clock tests stay quick.
pub fn fast_relayer_settings() -> RelayerSettings {
    RelayerSettings {
        poll_interval_ms: 10,
        delivery_timeout_ms: 2_000,
        max_retries: 2,
        retry_backoff_ms: 50,
    }
}

pub fn canonical_quote() -> RelayerFeeQuote {
    *CANONICAL_QUOTE
}

pub fn sender() -> Address {
    Address::derive("sender")
}

pub fn recipient() -> Address {
    Address::derive("recipient")
}

pub fn relayer_address() -> Address {
    Address::derive("relayer")
}

/// secret 1234, nullifier preimage 4321, 5 tokens.
pub fn first_burn(destination: ChainId) -> CommitmentPreimage {
    CommitmentPreimage::from_integers(4321, 1234, destination, FIRST_BURN_AMOUNT)
}

/// secret 12341111111, nullifier preimage 432111111, 4 tokens.
pub fn second_burn(destination: ChainId) -> CommitmentPreimage {
    CommitmentPreimage::from_integers(432111111, 12341111111, destination, SECOND_BURN_AMOUNT)
}

pub fn random_burn(seed: u64, destination: ChainId, amount: Amount) -> CommitmentPreimage {
    let mut rng = ChaCha20Rng::seed_from_u64(seed);
    CommitmentPreimage::random(&mut rng, destination, amount)
}

/// Fund `sender` on `chain`, wrap, and burn `preimage`'s amount.
pub async fn fund_and_burn(
    network: &Network,
    chain: ChainId,
    sender: Address,
    preimage: &CommitmentPreimage,
) -> Result<BurnReceipt> {
    let ledger = network.ledger(chain)?;
    let mut ledger = ledger.lock().await;
    ledger.fund_native(sender, preimage.amount);
    ledger.wrap(sender, preimage.amount)?;
    let pre_commitment = preimage
        .nullifier(&PoseidonHasher)
        .context("burn preimage is not canonical")?;
    Ok(ledger.burn(sender, pre_commitment, preimage.amount)?)
}
