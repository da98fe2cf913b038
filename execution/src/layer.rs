use crate::engine::{self, ExecutionError};
use crate::fhe::Backend;
use crate::state::{load_account, load_session, validate_and_increment_nonce, PrepareError, State, Status};
use anyhow::{Context as _, Result};
use commonware_cryptography::ed25519::PublicKey;
use encwars_types::{
    execution::{Event, Instruction, Key, Transaction, Value},
    Address, GameError,
};
use std::collections::BTreeMap;
use tracing::{debug, info};

/// Result of one included transaction.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Receipt {
    pub public: PublicKey,
    pub nonce: u64,
    /// Events on success. A rejection consumes the nonce and leaves the session untouched.
    pub result: Result<Vec<Event>, GameError>,
}

/// Staged view over a repository. Writes land in `pending` and reach the repository only through
/// [Layer::commit].
pub struct Layer<'a, S: State, B: Backend> {
    state: &'a S,
    backend: &'a B,
    contract: Address,

    pending: BTreeMap<Key, Status>,
}

impl<'a, S: State, B: Backend> Layer<'a, S, B> {
    pub fn new(state: &'a S, backend: &'a B, contract: Address) -> Self {
        Self {
            state,
            backend,
            contract,
            pending: BTreeMap::new(),
        }
    }

    fn stage(&mut self, key: Key, value: Value) {
        self.pending.insert(key, Status::Update(value));
    }

    async fn prepare(&mut self, transaction: &Transaction) -> Result<(), PrepareError> {
        let mut account = load_account(self, &transaction.public)
            .await
            .map_err(PrepareError::State)?;
        validate_and_increment_nonce(&mut account, transaction.nonce)?;
        self.stage(
            Key::Account(transaction.public.clone()),
            Value::Account(account),
        );

        Ok(())
    }

    async fn apply(&mut self, transaction: &Transaction) -> Result<Vec<Event>, ExecutionError> {
        let owner = &transaction.public;
        let session = load_session(self, owner)
            .await
            .map_err(ExecutionError::State)?;

        let (next, event) = match transaction.instruction {
            Instruction::StartGame => (
                engine::start_game(self.backend, owner, &self.contract)?,
                Event::GameStarted {
                    owner: owner.clone(),
                },
            ),
            Instruction::PlayRound { index } => {
                let next =
                    engine::play_round(self.backend, owner, &self.contract, &session, index)?;
                let rounds_played = next.rounds_played;
                (
                    next,
                    Event::RoundPlayed {
                        owner: owner.clone(),
                        index,
                        rounds_played,
                    },
                )
            }
        };

        self.stage(Key::Session(owner.clone()), Value::Session(next));
        Ok(vec![event])
    }

    /// Executes `transactions` in order. Badly signed transactions and nonce mismatches are
    /// dropped; engine rejections are included with their error.
    pub async fn execute(&mut self, transactions: Vec<Transaction>) -> Result<Vec<Receipt>> {
        let mut receipts = Vec::new();

        for tx in transactions {
            if !tx.verify() {
                debug!(public = ?tx.public, "invalid signature; dropping transaction");
                continue;
            }
            match self.prepare(&tx).await {
                Ok(()) => {}
                Err(PrepareError::NonceMismatch { expected, got }) => {
                    debug!(
                        public = ?tx.public,
                        expected,
                        got,
                        "nonce mismatch; dropping transaction"
                    );
                    continue;
                }
                Err(PrepareError::State(err)) => {
                    return Err(err).context("state error during prepare");
                }
            }

            let result = match self.apply(&tx).await {
                Ok(events) => {
                    info!(public = ?tx.public, instruction = ?tx.instruction, "instruction applied");
                    Ok(events)
                }
                Err(ExecutionError::Game(err)) => {
                    debug!(
                        public = ?tx.public,
                        instruction = ?tx.instruction,
                        kind = %err.kind(),
                        error = %err,
                        "instruction rejected"
                    );
                    Err(err)
                }
                Err(err) => return Err(anyhow::Error::new(err)).context("execution failed"),
            };
            receipts.push(Receipt {
                public: tx.public.clone(),
                nonce: tx.nonce,
                result,
            });
        }

        Ok(receipts)
    }

    pub fn commit(self) -> Vec<(Key, Status)> {
        self.pending.into_iter().collect()
    }
}

impl<'a, S: State, B: Backend> State for Layer<'a, S, B> {
    async fn get(&self, key: &Key) -> Result<Option<Value>> {
        Ok(match self.pending.get(key) {
            Some(Status::Update(value)) => Some(value.clone()),
            Some(Status::Delete) => None,
            None => self.state.get(key).await?,
        })
    }

    async fn insert(&mut self, key: Key, value: Value) -> Result<()> {
        self.stage(key, value);
        Ok(())
    }

    async fn delete(&mut self, key: &Key) -> Result<()> {
        self.pending.insert(key.clone(), Status::Delete);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fhe::Decrypter;
    use crate::mocks::{create_account_keypair, Scripted};
    use crate::projection;
    use crate::state::{nonce, Memory};
    use encwars_types::{ledger_address, GameMeta};
    use futures::executor::block_on;

    async fn run(
        state: &mut Memory,
        backend: &Scripted,
        transactions: Vec<Transaction>,
    ) -> Result<Vec<Receipt>> {
        let contract = ledger_address(b"test");
        let (receipts, changes) = {
            let mut layer = Layer::new(&*state, backend, contract);
            let receipts = layer.execute(transactions).await?;
            (receipts, layer.commit())
        };
        state.apply(changes).await?;
        Ok(receipts)
    }

    #[test]
    fn test_nonce_validation() {
        block_on(async {
            let state = Memory::default();
            let backend = Scripted::new([1, 2, 3]);
            let mut layer = Layer::new(&state, &backend, ledger_address(b"test"));
            let (signer, _) = create_account_keypair(1);

            let tx = Transaction::sign(&signer, 1, Instruction::StartGame);
            assert!(layer.prepare(&tx).await.is_err());

            let tx = Transaction::sign(&signer, 0, Instruction::StartGame);
            assert!(layer.prepare(&tx).await.is_ok());
        });
    }

    #[test]
    fn test_full_game() {
        block_on(async {
            let mut state = Memory::default();
            let backend = Scripted::new([7, 3, 9, 4, 5, 2]);
            let (signer, owner) = create_account_keypair(1);

            let receipts = run(
                &mut state,
                &backend,
                vec![
                    Transaction::sign(&signer, 0, Instruction::StartGame),
                    Transaction::sign(&signer, 1, Instruction::PlayRound { index: 0 }),
                    Transaction::sign(&signer, 2, Instruction::PlayRound { index: 1 }),
                    Transaction::sign(&signer, 3, Instruction::PlayRound { index: 2 }),
                ],
            )
            .await
            .unwrap();

            assert_eq!(receipts.len(), 4);
            assert_eq!(
                receipts[0].result,
                Ok(vec![Event::GameStarted {
                    owner: owner.clone()
                }])
            );
            assert_eq!(
                receipts[3].result,
                Ok(vec![Event::RoundPlayed {
                    owner: owner.clone(),
                    index: 2,
                    rounds_played: 3,
                }])
            );

            let meta = projection::game_meta(&state, &owner).await.unwrap();
            assert_eq!(
                meta,
                GameMeta {
                    rounds_played: 3,
                    used_cards: [true; 3],
                    initialized: true,
                }
            );
            let score = projection::score(&state, &owner).await.unwrap();
            assert_eq!(backend.decrypt(&score), Some(2));
            assert_eq!(nonce(&state, &owner).await.unwrap(), 4);
        });
    }

    #[test]
    fn test_rejection_consumes_nonce_only() {
        block_on(async {
            let mut state = Memory::default();
            let backend = Scripted::new([7, 3, 9, 4]);
            let (signer, owner) = create_account_keypair(1);

            let receipts = run(
                &mut state,
                &backend,
                vec![Transaction::sign(&signer, 0, Instruction::PlayRound { index: 0 })],
            )
            .await
            .unwrap();
            assert_eq!(receipts[0].result, Err(GameError::SessionNotStarted));
            assert_eq!(nonce(&state, &owner).await.unwrap(), 1);
            assert_eq!(
                projection::game_meta(&state, &owner).await.unwrap(),
                GameMeta::default()
            );

            run(
                &mut state,
                &backend,
                vec![
                    Transaction::sign(&signer, 1, Instruction::StartGame),
                    Transaction::sign(&signer, 2, Instruction::PlayRound { index: 0 }),
                ],
            )
            .await
            .unwrap();
            let before = crate::state::load_session(&state, &owner).await.unwrap();

            let receipts = run(
                &mut state,
                &backend,
                vec![
                    Transaction::sign(&signer, 3, Instruction::PlayRound { index: 0 }),
                    Transaction::sign(&signer, 4, Instruction::PlayRound { index: 5 }),
                ],
            )
            .await
            .unwrap();
            assert_eq!(receipts[0].result, Err(GameError::RoundAlreadyPlayed(0)));
            assert_eq!(receipts[1].result, Err(GameError::InvalidRound(5)));
            assert_eq!(
                crate::state::load_session(&state, &owner).await.unwrap(),
                before
            );
            assert_eq!(nonce(&state, &owner).await.unwrap(), 5);
        });
    }

    #[test]
    fn test_dropped_transactions() {
        block_on(async {
            let mut state = Memory::default();
            let backend = Scripted::new([7, 3, 9]);
            let (signer, owner) = create_account_keypair(1);
            let (other, _) = create_account_keypair(2);

            let mut forged = Transaction::sign(&signer, 0, Instruction::StartGame);
            forged.signature = Transaction::sign(&other, 0, Instruction::StartGame).signature;

            let receipts = run(
                &mut state,
                &backend,
                vec![
                    forged,
                    Transaction::sign(&signer, 9, Instruction::StartGame),
                ],
            )
            .await
            .unwrap();
            assert!(receipts.is_empty());
            assert!(state.is_empty());
            assert_eq!(nonce(&state, &owner).await.unwrap(), 0);
        });
    }

    #[test]
    fn test_backend_failure_aborts_batch() {
        block_on(async {
            let state = Memory::default();
            // Enough for the hand, not for the first round.
            let backend = Scripted::new([7, 3, 9]);
            let (signer, _) = create_account_keypair(1);
            let mut layer = Layer::new(&state, &backend, ledger_address(b"test"));

            let result = layer
                .execute(vec![
                    Transaction::sign(&signer, 0, Instruction::StartGame),
                    Transaction::sign(&signer, 1, Instruction::PlayRound { index: 0 }),
                ])
                .await;
            assert!(result.is_err());
            // The caller discards the layer, so nothing reaches the repository.
            drop(layer);
            assert!(state.is_empty());
        });
    }

    #[test]
    fn test_owners_are_isolated() {
        block_on(async {
            let mut state = Memory::default();
            let backend = Scripted::new([7, 3, 9, 1, 1, 1, 4]);
            let (alice_key, alice) = create_account_keypair(1);
            let (bob_key, bob) = create_account_keypair(2);

            let receipts = run(
                &mut state,
                &backend,
                vec![
                    Transaction::sign(&alice_key, 0, Instruction::StartGame),
                    Transaction::sign(&bob_key, 0, Instruction::StartGame),
                    Transaction::sign(&bob_key, 1, Instruction::PlayRound { index: 2 }),
                ],
            )
            .await
            .unwrap();
            assert!(receipts.iter().all(|r| r.result.is_ok()));

            let alice_meta = projection::game_meta(&state, &alice).await.unwrap();
            let bob_meta = projection::game_meta(&state, &bob).await.unwrap();
            assert_eq!(alice_meta.rounds_played, 0);
            assert_eq!(bob_meta.used_cards, [false, false, true]);

            let bob_score = projection::score(&state, &bob).await.unwrap();
            assert_eq!(backend.decrypt(&bob_score), Some(0));
            let contract = ledger_address(b"test");
            assert!(backend.is_allowed(&bob_score, &bob, &contract));
            assert!(!backend.is_allowed(&bob_score, &alice, &contract));
        });
    }
}
