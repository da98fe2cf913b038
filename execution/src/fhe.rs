//! Encrypted-compute capability.
//!
//! The engine only ever sees [Handle]s. Arithmetic on the values behind them happens inside a
//! [Backend]; revealing a value is a separate [Decrypter] capability that only the decryption
//! oracle holds.

use anyhow::{anyhow, Result};
use commonware_cryptography::{
    ed25519::PublicKey,
    sha256::{Digest, Sha256},
    Hasher,
};
use encwars_types::{Address, Handle};
use rand::{Rng, SeedableRng};
use rand_chacha::ChaCha20Rng;
use std::collections::{HashMap, HashSet};
use std::sync::Mutex;

/// Homomorphic operations available to the engine.
pub trait Backend {
    /// Draws a fresh ciphertext uniformly distributed over `[low, high]`.
    fn draw_uniform(&self, low: u8, high: u8) -> Result<Handle>;

    /// Trivially encrypts a constant.
    fn constant(&self, value: u8) -> Result<Handle>;

    /// Encrypted `lhs > rhs` as 0 or 1.
    fn gt(&self, lhs: &Handle, rhs: &Handle) -> Result<Handle>;

    fn add(&self, lhs: &Handle, rhs: &Handle) -> Result<Handle>;

    /// Grants `owner` the right to decrypt `handle` through `contract`.
    fn allow(&self, handle: &Handle, owner: &PublicKey, contract: &Address) -> Result<()>;
}

/// Reveals cleartext. Never handed to the engine.
pub trait Decrypter {
    fn decrypt(&self, handle: &Handle) -> Option<u64>;

    fn is_allowed(&self, handle: &Handle, owner: &PublicKey, contract: &Address) -> bool;
}

impl<B: Backend + ?Sized> Backend for &B {
    fn draw_uniform(&self, low: u8, high: u8) -> Result<Handle> {
        (**self).draw_uniform(low, high)
    }

    fn constant(&self, value: u8) -> Result<Handle> {
        (**self).constant(value)
    }

    fn gt(&self, lhs: &Handle, rhs: &Handle) -> Result<Handle> {
        (**self).gt(lhs, rhs)
    }

    fn add(&self, lhs: &Handle, rhs: &Handle) -> Result<Handle> {
        (**self).add(lhs, rhs)
    }

    fn allow(&self, handle: &Handle, owner: &PublicKey, contract: &Address) -> Result<()> {
        (**self).allow(handle, owner, contract)
    }
}

#[derive(Default)]
struct Table {
    counter: u64,
    values: HashMap<Handle, u64>,
    acl: HashMap<Handle, HashSet<(PublicKey, Address)>>,
}

/// In-process stand-in for an encrypted-compute coprocessor.
///
/// Values live in a private table keyed by pseudo-random handles; nothing outside this type can
/// read them except through [Decrypter].
pub struct Simulated {
    salt: Digest,
    rng: Mutex<ChaCha20Rng>,
    table: Mutex<Table>,
}

impl Simulated {
    pub fn new(seed: u64) -> Self {
        let mut rng = ChaCha20Rng::seed_from_u64(seed);
        let mut salt = [0u8; 32];
        rng.fill(&mut salt);
        Self {
            salt: Sha256::hash(&salt),
            rng: Mutex::new(rng),
            table: Mutex::new(Table::default()),
        }
    }

    fn store(&self, value: u64) -> Handle {
        let mut table = self.table.lock().unwrap_or_else(|poisoned| poisoned.into_inner());
        let mut hasher = Sha256::new();
        hasher.update(self.salt.as_ref());
        hasher.update(&table.counter.to_be_bytes());
        table.counter += 1;
        let mut raw = [0u8; 32];
        raw.copy_from_slice(hasher.finalize().as_ref());
        let handle = Handle::new(raw);
        table.values.insert(handle, value);
        handle
    }

    fn load(&self, handle: &Handle) -> Result<u64> {
        let table = self.table.lock().unwrap_or_else(|poisoned| poisoned.into_inner());
        table
            .values
            .get(handle)
            .copied()
            .ok_or_else(|| anyhow!("unknown ciphertext {handle}"))
    }

    /// Number of ciphertexts created so far.
    pub fn len(&self) -> usize {
        let table = self.table.lock().unwrap_or_else(|poisoned| poisoned.into_inner());
        table.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl Backend for Simulated {
    fn draw_uniform(&self, low: u8, high: u8) -> Result<Handle> {
        if low > high {
            return Err(anyhow!("empty range [{low}, {high}]"));
        }
        let value = {
            let mut rng = self.rng.lock().unwrap_or_else(|poisoned| poisoned.into_inner());
            rng.gen_range(low..=high)
        };
        Ok(self.store(value as u64))
    }

    fn constant(&self, value: u8) -> Result<Handle> {
        Ok(self.store(value as u64))
    }

    fn gt(&self, lhs: &Handle, rhs: &Handle) -> Result<Handle> {
        let result = self.load(lhs)? > self.load(rhs)?;
        Ok(self.store(result as u64))
    }

    fn add(&self, lhs: &Handle, rhs: &Handle) -> Result<Handle> {
        let sum = self.load(lhs)?.saturating_add(self.load(rhs)?);
        Ok(self.store(sum))
    }

    fn allow(&self, handle: &Handle, owner: &PublicKey, contract: &Address) -> Result<()> {
        let mut table = self.table.lock().unwrap_or_else(|poisoned| poisoned.into_inner());
        if !table.values.contains_key(handle) {
            return Err(anyhow!("unknown ciphertext {handle}"));
        }
        table
            .acl
            .entry(*handle)
            .or_default()
            .insert((owner.clone(), *contract));
        Ok(())
    }
}

impl Decrypter for Simulated {
    fn decrypt(&self, handle: &Handle) -> Option<u64> {
        self.load(handle).ok()
    }

    fn is_allowed(&self, handle: &Handle, owner: &PublicKey, contract: &Address) -> bool {
        let table = self.table.lock().unwrap_or_else(|poisoned| poisoned.into_inner());
        table
            .acl
            .get(handle)
            .is_some_and(|entries| entries.contains(&(owner.clone(), *contract)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mocks::create_account_keypair;
    use encwars_types::ledger_address;

    #[test]
    fn test_draw_stays_in_range() {
        let backend = Simulated::new(7);
        for _ in 0..200 {
            let handle = backend.draw_uniform(1, 10).unwrap();
            let value = backend.decrypt(&handle).unwrap();
            assert!((1..=10).contains(&value));
        }
    }

    #[test]
    fn test_operations_produce_fresh_handles() {
        let backend = Simulated::new(0);
        let a = backend.constant(7).unwrap();
        let b = backend.constant(4).unwrap();
        let win = backend.gt(&a, &b).unwrap();
        let lose = backend.gt(&b, &a).unwrap();
        assert_eq!(backend.decrypt(&win), Some(1));
        assert_eq!(backend.decrypt(&lose), Some(0));

        let sum = backend.add(&win, &win).unwrap();
        assert_eq!(backend.decrypt(&sum), Some(2));

        let handles: HashSet<_> = [a, b, win, lose, sum].into_iter().collect();
        assert_eq!(handles.len(), 5);
        assert!(handles.iter().all(|h| !h.is_empty()));
        assert_eq!(backend.len(), 5);
    }

    #[test]
    fn test_unknown_handle_is_rejected() {
        let backend = Simulated::new(0);
        let known = backend.constant(1).unwrap();
        let unknown = Handle::new([1u8; 32]);
        assert!(backend.gt(&known, &unknown).is_err());
        assert!(backend.decrypt(&unknown).is_none());
    }

    #[test]
    fn test_acl_is_per_owner_and_contract() {
        let backend = Simulated::new(0);
        let (_, alice) = create_account_keypair(1);
        let (_, bob) = create_account_keypair(2);
        let here = ledger_address(b"here");
        let there = ledger_address(b"there");

        let handle = backend.constant(3).unwrap();
        assert!(!backend.is_allowed(&handle, &alice, &here));

        backend.allow(&handle, &alice, &here).unwrap();
        assert!(backend.is_allowed(&handle, &alice, &here));
        assert!(!backend.is_allowed(&handle, &bob, &here));
        assert!(!backend.is_allowed(&handle, &alice, &there));

        assert!(backend
            .allow(&Handle::new([9u8; 32]), &alice, &here)
            .is_err());
    }

    #[test]
    fn test_seed_determines_draws() {
        let a = Simulated::new(11);
        let b = Simulated::new(11);
        for _ in 0..10 {
            let ha = a.draw_uniform(1, 10).unwrap();
            let hb = b.draw_uniform(1, 10).unwrap();
            assert_eq!(ha, hb);
            assert_eq!(a.decrypt(&ha), b.decrypt(&hb));
        }
    }
}
