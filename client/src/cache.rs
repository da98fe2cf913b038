use commonware_cryptography::ed25519::PublicKey;
use encwars_types::{Handle, Role};
use std::collections::HashMap;

/// Client-local cache of decrypted values, keyed by `(owner, role, index)`.
///
/// Entries remember the handle they were decrypted from, so a lookup with a newer handle
/// (after a restart) misses instead of returning a stale value.
#[derive(Debug, Default)]
pub struct ValueCache {
    entries: HashMap<(PublicKey, Role, u8), (Handle, u64)>,
}

impl ValueCache {
    pub fn get(&self, owner: &PublicKey, role: Role, index: u8, handle: &Handle) -> Option<u64> {
        self.entries
            .get(&(owner.clone(), role, index))
            .filter(|(cached, _)| cached == handle)
            .map(|(_, value)| *value)
    }

    pub fn insert(&mut self, owner: &PublicKey, role: Role, index: u8, handle: Handle, value: u64) {
        self.entries
            .insert((owner.clone(), role, index), (handle, value));
    }

    /// Drops every value cached for `owner`.
    pub fn clear_owner(&mut self, owner: &PublicKey) {
        self.entries.retain(|(cached, _, _), _| cached != owner);
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}
