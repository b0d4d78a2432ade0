//! The mixer engine.
//!
//! Two long-running tasks share a table of outstanding mixes: the poller
//! watches the ledger for deposits to registered addresses, and the disburser
//! drains each deposit to its destinations as randomized payments on a
//! randomized cadence. Each source of entropy (which deposit is serviced,
//! which destination is paid, how much, how long between payments) compounds
//! to break the correlation between a deposit and its disbursements.

use std::sync::Arc;

use rand::rngs::SmallRng;
use rand::SeedableRng;
use tokio::sync::Mutex;
use tokio_util::sync::CancellationToken;
use tracing::info;
use uuid::Uuid;

use crate::ledger::JobcoinClient;
use crate::registry::Registry;
use crate::Amount;

pub mod config;

mod disburse;
mod error;
mod poll;
mod state;

pub use config::{MixConfig, PollConfig};
pub use error::RegisterError;

use state::MixTable;

/// The Jobcoin mixer.
///
/// Cheap to clone; clones share the registry, the mix table and the RNG.
#[derive(Clone)]
pub struct Mixer<C> {
    client: C,
    registry: Arc<Registry>,

    /// The mixer's own address, where collected fees accumulate.
    address: String,
    fee: Amount,

    poll_cfg: PollConfig,
    mix_cfg: MixConfig,

    table: Arc<Mutex<MixTable>>,
    rng: Arc<parking_lot::Mutex<SmallRng>>,
    seed: Option<u64>,
}

/// Configures and builds a [`Mixer`].
pub struct MixerBuilder<C> {
    client: C,
    address: Option<String>,
    fee: Amount,
    poll_cfg: PollConfig,
    mix_cfg: MixConfig,
    seed: Option<u64>,
}

impl<C: JobcoinClient> Mixer<C> {
    pub fn builder(client: C) -> MixerBuilder<C> {
        MixerBuilder {
            client,
            address: None,
            fee: Amount::ZERO,
            poll_cfg: PollConfig::default(),
            mix_cfg: MixConfig::default(),
            seed: None,
        }
    }

    /// Register user addresses and hand back a fresh deposit address.
    pub fn register(&self, addresses: Vec<String>) -> Result<String, RegisterError> {
        if addresses.is_empty() {
            return Err(RegisterError::NoAddresses);
        }

        let deposit_addr = Uuid::new_v4().to_string();
        info!(
            deposit = %deposit_addr,
            destinations = addresses.len(),
            "registered deposit address"
        );
        self.registry.register(deposit_addr.clone(), addresses);

        Ok(deposit_addr)
    }

    /// Run the poller and the disburser until `shutdown` is cancelled.
    pub async fn start(&self, shutdown: CancellationToken)
    where
        C: Clone + 'static,
    {
        let poller = {
            let mixer = self.clone();
            let shutdown = shutdown.clone();
            tokio::spawn(async move { mixer.run_poller(shutdown).await })
        };
        let disburser = {
            let mixer = self.clone();
            let shutdown = shutdown.clone();
            tokio::spawn(async move { mixer.run_disburser(shutdown).await })
        };

        let _ = tokio::join!(poller, disburser);
    }

    /// RNG for a loop's sleep jitter. Each loop gets its own stream so delay
    /// draws never shift the seeded payment draws in the disburse tick.
    fn jitter_rng(&self, stream: u64) -> SmallRng {
        match self.seed {
            Some(seed) => SmallRng::seed_from_u64(seed.wrapping_add(stream)),
            None => SmallRng::from_entropy(),
        }
    }
}

impl<C: JobcoinClient> MixerBuilder<C> {
    /// Address that collects fees. Defaults to a fresh UUID.
    pub fn with_address(mut self, address: impl Into<String>) -> Self {
        self.address = Some(address.into());
        self
    }

    /// Flat fee skimmed off each deposit before mixing.
    pub fn with_fee(mut self, fee: Amount) -> Self {
        self.fee = fee;
        self
    }

    /// Polling configuration. Out-of-range values are made valid silently.
    pub fn with_poll_config(mut self, poll_cfg: PollConfig) -> Self {
        self.poll_cfg = poll_cfg;
        self
    }

    /// Mixing configuration. Out-of-range values are made valid silently.
    pub fn with_mix_config(mut self, mix_cfg: MixConfig) -> Self {
        self.mix_cfg = mix_cfg;
        self
    }

    /// Seed the engine RNG, making destination, amount and delay draws
    /// reproducible.
    pub fn with_rng_seed(mut self, seed: u64) -> Self {
        self.seed = Some(seed);
        self
    }

    pub fn build(self) -> Mixer<C> {
        let mut poll_cfg = self.poll_cfg;
        poll_cfg.make_valid();
        let mut mix_cfg = self.mix_cfg;
        mix_cfg.make_valid();

        let rng = match self.seed {
            Some(seed) => SmallRng::seed_from_u64(seed),
            None => SmallRng::from_entropy(),
        };

        Mixer {
            client: self.client,
            registry: Arc::new(Registry::new()),
            address: self
                .address
                .unwrap_or_else(|| Uuid::new_v4().to_string()),
            fee: self.fee,
            poll_cfg,
            mix_cfg,
            table: Arc::default(),
            rng: Arc::new(parking_lot::Mutex::new(rng)),
            seed: self.seed,
        }
    }
}
