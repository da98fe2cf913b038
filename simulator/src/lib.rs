//! Local backend for encrypted wars: a single-instance ledger and its decryption oracle served over
//! HTTP.

use encwars_execution::Simulated;
use encwars_types::{ledger_address, Address};
use serde::Serialize;
use std::sync::Arc;

mod api;
pub use api::Api;

mod ledger;
pub use ledger::{Ledger, SubmitError};

mod oracle;
pub use oracle::{unix_now, Oracle, OracleError};

pub const DEFAULT_LEDGER_NAME: &str = "local";
pub const DEFAULT_MAX_CLOCK_SKEW_SECS: u64 = 300;

#[derive(Clone, Debug, Serialize)]
pub struct SimulatorConfig {
    /// Name the ledger address is derived from.
    pub ledger_name: String,
    /// Seed of the simulated coprocessor's randomness.
    pub seed: u64,
    /// How far in the future a grant's issue time may be.
    pub max_clock_skew_secs: u64,
}

impl Default for SimulatorConfig {
    fn default() -> Self {
        Self {
            ledger_name: DEFAULT_LEDGER_NAME.to_string(),
            seed: 0,
            max_clock_skew_secs: DEFAULT_MAX_CLOCK_SKEW_SECS,
        }
    }
}

pub struct Simulator {
    config: SimulatorConfig,
    ledger: Ledger,
    oracle: Oracle<Simulated>,
}

impl Simulator {
    pub fn new(config: SimulatorConfig) -> Self {
        let address = ledger_address(config.ledger_name.as_bytes());
        let backend = Arc::new(Simulated::new(config.seed));
        Self {
            ledger: Ledger::new(address, backend.clone()),
            oracle: Oracle::new(address, backend, config.max_clock_skew_secs),
            config,
        }
    }

    pub fn config(&self) -> &SimulatorConfig {
        &self.config
    }

    pub fn address(&self) -> Address {
        self.ledger.address()
    }

    pub fn ledger(&self) -> &Ledger {
        &self.ledger
    }

    pub fn oracle(&self) -> &Oracle<Simulated> {
        &self.oracle
    }
}

impl Default for Simulator {
    fn default() -> Self {
        Self::new(SimulatorConfig::default())
    }
}
