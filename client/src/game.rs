use crate::{
    cache::ValueCache,
    decryption::{Cleartext, Credential, Decryptor, Oracle},
    Client, Result,
};
use commonware_cryptography::ed25519::PublicKey;
use encwars_types::{
    Address, Event, GameMeta, Handle, Instruction, PlayerSession, Role, ROUND_COUNT,
};
use std::{
    collections::BTreeMap,
    sync::{Mutex, MutexGuard},
};
use tracing::{info, warn};

/// A revealed session value.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Reveal {
    /// The slot holds the sentinel handle (no game started, or round not played).
    Unset,
    Value { handle: Handle, cleartext: Cleartext },
}

impl Reveal {
    pub fn value(&self) -> Option<u64> {
        match self {
            Reveal::Unset => None,
            Reveal::Value { cleartext, .. } => cleartext.value(),
        }
    }
}

#[derive(Debug)]
pub struct RoundOutcome {
    pub events: Vec<Event>,
    /// Score after the round. The round is committed even when this reveal fails.
    pub score: Result<Reveal>,
}

/// One owner's view of the game: ledger transactions plus decrypted values.
pub struct Game<C: Credential, O: Oracle> {
    client: Client,
    decryptor: Decryptor<C, O>,
    cache: Mutex<ValueCache>,
}

impl<C: Credential, O: Oracle> Game<C, O> {
    pub fn new(client: Client, decryptor: Decryptor<C, O>) -> Self {
        Self {
            client,
            decryptor,
            cache: Mutex::new(ValueCache::default()),
        }
    }

    /// Builds a game against the ledger at `client`, scoping decryption to its address.
    pub async fn connect(client: Client, credential: C, oracle: O) -> Result<Self> {
        let contract = client.address().await?;
        Ok(Self::new(client, Decryptor::new(credential, oracle, contract)))
    }

    pub fn owner(&self) -> PublicKey {
        self.decryptor.credential().public_key()
    }

    pub fn contract(&self) -> Address {
        self.decryptor.contract()
    }

    pub fn client(&self) -> &Client {
        &self.client
    }

    pub fn decryptor(&self) -> &Decryptor<C, O> {
        &self.decryptor
    }

    fn cache(&self) -> MutexGuard<'_, ValueCache> {
        self.cache
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    async fn submit(&self, instruction: Instruction) -> Result<Vec<Event>> {
        let owner = self.owner();
        let nonce = self.client.nonce(&owner).await?;
        let transaction = self
            .decryptor
            .credential()
            .sign_transaction(nonce, instruction)
            .await?;
        self.client.submit(&transaction).await
    }

    /// Starts (or restarts) the owner's game and forgets every value revealed so far.
    pub async fn start(&self) -> Result<Vec<Event>> {
        let events = self.submit(Instruction::StartGame).await?;
        self.cache().clear_owner(&self.owner());
        info!(contract = ?self.contract(), "game started");
        Ok(events)
    }

    /// Plays the card at `index` and reveals the resulting score.
    ///
    /// Errors only if the round was not committed. A failed score reveal is reported in
    /// [RoundOutcome::score] and can be retried with [Game::score].
    pub async fn play(&self, index: u8) -> Result<RoundOutcome> {
        PlayerSession::round_index(index)?;
        let events = self.submit(Instruction::PlayRound { index }).await?;
        info!(index, "round played");
        let score = self.score().await;
        if let Err(err) = &score {
            warn!(index, error = %err, "score reveal failed after round");
        }
        Ok(RoundOutcome { events, score })
    }

    pub async fn session(&self) -> Result<PlayerSession> {
        self.client.session(&self.owner()).await
    }

    pub async fn meta(&self) -> Result<GameMeta> {
        self.client.meta(&self.owner()).await
    }

    /// Reveals the owner's three cards.
    pub async fn cards(&self) -> Result<Vec<Reveal>> {
        let session = self.session().await?;
        let slots = (0..ROUND_COUNT as u8)
            .map(|index| {
                session
                    .player_card(index)
                    .map(|handle| (Role::Card, index, handle))
            })
            .collect::<std::result::Result<Vec<_>, _>>()?;
        self.reveal(slots).await
    }

    /// Reveals the system card drawn for `round` ([Reveal::Unset] until that round is played).
    pub async fn system_card(&self, round: u8) -> Result<Reveal> {
        let session = self.session().await?;
        let handle = session.system_card(round)?;
        self.reveal_one(Role::SystemCard, round, handle).await
    }

    pub async fn score(&self) -> Result<Reveal> {
        let session = self.session().await?;
        self.reveal_one(Role::Score, 0, session.score).await
    }

    async fn reveal_one(&self, role: Role, index: u8, handle: Handle) -> Result<Reveal> {
        let mut reveals = self.reveal(vec![(role, index, handle)]).await?;
        Ok(reveals.pop().unwrap_or(Reveal::Unset))
    }

    /// Resolves each slot from the cache, decrypting the misses in one batch.
    async fn reveal(&self, slots: Vec<(Role, u8, Handle)>) -> Result<Vec<Reveal>> {
        let owner = self.owner();
        let mut reveals: Vec<Option<Reveal>> = Vec::with_capacity(slots.len());
        let mut missing = Vec::new();
        {
            let cache = self.cache();
            for (role, index, handle) in &slots {
                if handle.is_empty() {
                    reveals.push(Some(Reveal::Unset));
                } else if let Some(value) = cache.get(&owner, *role, *index, handle) {
                    reveals.push(Some(Reveal::Value {
                        handle: *handle,
                        cleartext: Cleartext::Decrypted(value),
                    }));
                } else {
                    reveals.push(None);
                    missing.push(*handle);
                }
            }
        }

        let decrypted = if missing.is_empty() {
            BTreeMap::new()
        } else {
            self.decryptor.request_decryption(&missing).await?
        };

        let mut cache = self.cache();
        Ok(slots
            .into_iter()
            .zip(reveals)
            .map(|((role, index, handle), reveal)| {
                reveal.unwrap_or_else(|| {
                    let cleartext = decrypted
                        .get(&handle)
                        .cloned()
                        .unwrap_or(Cleartext::Pending);
                    if let Cleartext::Decrypted(value) = cleartext {
                        cache.insert(&owner, role, index, handle, value);
                    }
                    Reveal::Value { handle, cleartext }
                })
            })
            .collect())
    }
}
