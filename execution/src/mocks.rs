use crate::fhe::{Backend, Decrypter, Simulated};
use anyhow::{anyhow, Result};
use commonware_math::algebra::Random;
use commonware_cryptography::{
    ed25519::{PrivateKey, PublicKey},
    Signer,
};
use encwars_types::{Address, Handle};
use rand::{rngs::StdRng, SeedableRng};
use std::collections::VecDeque;
use std::sync::Mutex;

/// Creates an account keypair for Ed25519 signatures used by users
pub fn create_account_keypair(seed: u64) -> (PrivateKey, PublicKey) {
    let mut rng = StdRng::seed_from_u64(seed);
    let private = PrivateKey::random(&mut rng);
    let public = private.public_key();
    (private, public)
}

/// Plaintext-equivalent backend whose uniform draws follow a fixed script.
///
/// Draws are served in order; once the script runs out every draw fails, which lets tests
/// exercise backend outages at a precise point.
pub struct Scripted {
    draws: Mutex<VecDeque<u8>>,
    inner: Simulated,
}

impl Scripted {
    pub fn new(draws: impl IntoIterator<Item = u8>) -> Self {
        Self {
            draws: Mutex::new(draws.into_iter().collect()),
            inner: Simulated::new(0),
        }
    }

    /// Number of ciphertexts created so far.
    pub fn len(&self) -> usize {
        self.inner.len()
    }

    pub fn is_empty(&self) -> bool {
        self.inner.is_empty()
    }
}

impl Backend for Scripted {
    fn draw_uniform(&self, low: u8, high: u8) -> Result<Handle> {
        let next = self
            .draws
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .pop_front()
            .ok_or_else(|| anyhow!("draw script exhausted"))?;
        if !(low..=high).contains(&next) {
            return Err(anyhow!("scripted draw {next} outside [{low}, {high}]"));
        }
        self.inner.constant(next)
    }

    fn constant(&self, value: u8) -> Result<Handle> {
        self.inner.constant(value)
    }

    fn gt(&self, lhs: &Handle, rhs: &Handle) -> Result<Handle> {
        self.inner.gt(lhs, rhs)
    }

    fn add(&self, lhs: &Handle, rhs: &Handle) -> Result<Handle> {
        self.inner.add(lhs, rhs)
    }

    fn allow(&self, handle: &Handle, owner: &PublicKey, contract: &Address) -> Result<()> {
        self.inner.allow(handle, owner, contract)
    }
}

impl Decrypter for Scripted {
    fn decrypt(&self, handle: &Handle) -> Option<u64> {
        self.inner.decrypt(handle)
    }

    fn is_allowed(&self, handle: &Handle, owner: &PublicKey, contract: &Address) -> bool {
        self.inner.is_allowed(handle, owner, contract)
    }
}
