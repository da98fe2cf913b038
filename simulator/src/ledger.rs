use commonware_cryptography::ed25519::PublicKey;
use encwars_execution::{load_session, nonce, Layer, Memory, Receipt, Simulated, State as _};
use encwars_types::{
    execution::{Event, Transaction},
    Address, GameError, GameMeta, PlayerSession,
};
use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use thiserror::Error;
use tokio::sync::{Mutex as AsyncMutex, RwLock};
use tracing::{debug, warn};

#[derive(Debug, Error)]
pub enum SubmitError {
    #[error("invalid transaction signature")]
    InvalidSignature,
    #[error("transaction dropped (stale or future nonce)")]
    Dropped,
    #[error(transparent)]
    Rejected(#[from] GameError),
    #[error("execution unavailable: {0}")]
    Unavailable(anyhow::Error),
}

/// Single-instance ledger: session repository, encrypted-compute backend and per-owner locks.
pub struct Ledger {
    address: Address,
    state: RwLock<Memory>,
    backend: Arc<Simulated>,
    owners: Mutex<HashMap<PublicKey, Arc<AsyncMutex<()>>>>,
}

impl Ledger {
    pub fn new(address: Address, backend: Arc<Simulated>) -> Self {
        Self {
            address,
            state: RwLock::new(Memory::default()),
            backend,
            owners: Mutex::new(HashMap::new()),
        }
    }

    pub fn address(&self) -> Address {
        self.address
    }

    fn owner_lock(&self, owner: &PublicKey) -> Arc<AsyncMutex<()>> {
        let mut owners = self
            .owners
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        owners.entry(owner.clone()).or_default().clone()
    }

    /// Forgets `owner`'s lock once no other submission holds or awaits it.
    fn release_owner_lock(&self, owner: &PublicKey, lock: Arc<AsyncMutex<()>>) {
        let mut owners = self
            .owners
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        // One reference in the map, one in `lock`.
        if Arc::strong_count(&lock) == 2 {
            owners.remove(owner);
        }
    }

    /// Executes one transaction. Transactions from the same owner are serialized; distinct owners
    /// only contend on the final commit.
    pub async fn submit(&self, transaction: Transaction) -> Result<Vec<Event>, SubmitError> {
        if !transaction.verify() {
            return Err(SubmitError::InvalidSignature);
        }
        let owner = transaction.public.clone();
        let lock = self.owner_lock(&owner);
        let result = {
            let _guard = lock.lock().await;
            self.execute(transaction).await
        };
        self.release_owner_lock(&owner, lock);
        result
    }

    async fn execute(&self, transaction: Transaction) -> Result<Vec<Event>, SubmitError> {
        let (receipts, changes) = {
            let state = self.state.read().await;
            let mut layer = Layer::new(&*state, self.backend.as_ref(), self.address);
            let receipts = layer
                .execute(vec![transaction])
                .await
                .map_err(SubmitError::Unavailable)?;
            (receipts, layer.commit())
        };
        self.state
            .write()
            .await
            .apply(changes)
            .await
            .map_err(SubmitError::Unavailable)?;

        let Some(Receipt {
            public,
            nonce: included,
            result,
        }) = receipts.into_iter().next() else {
            return Err(SubmitError::Dropped);
        };
        match result {
            Ok(events) => {
                debug!(public = ?public, nonce = included, events = events.len(), "transaction included");
                Ok(events)
            }
            Err(err) => {
                warn!(public = ?public, nonce = included, error = %err, "transaction reverted");
                Err(SubmitError::Rejected(err))
            }
        }
    }

    pub async fn nonce(&self, owner: &PublicKey) -> anyhow::Result<u64> {
        let state = self.state.read().await;
        nonce(&*state, owner).await
    }

    pub async fn session(&self, owner: &PublicKey) -> anyhow::Result<PlayerSession> {
        let state = self.state.read().await;
        load_session(&*state, owner).await
    }

    pub async fn meta(&self, owner: &PublicKey) -> anyhow::Result<GameMeta> {
        Ok(self.session(owner).await?.meta())
    }
}
