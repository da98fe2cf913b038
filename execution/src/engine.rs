//! Round engine: pure session transitions over encrypted values.
//!
//! Every function here takes the current session by reference and returns the next one; nothing
//! is written until the caller stages the result. Cards and scores stay behind [Handle]s and all
//! comparisons run inside the [Backend].

use crate::fhe::Backend;
use commonware_cryptography::ed25519::PublicKey;
use encwars_types::{
    Address, ErrorKind, GameError, Handle, PlayerSession, CARD_MAX, CARD_MIN, ROUND_COUNT,
};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ExecutionError {
    #[error(transparent)]
    Game(#[from] GameError),
    #[error("encrypted compute failed: {0}")]
    Backend(anyhow::Error),
    #[error("state failed: {0}")]
    State(anyhow::Error),
}

impl ExecutionError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            ExecutionError::Game(err) => err.kind(),
            ExecutionError::Backend(_) | ExecutionError::State(_) => ErrorKind::Availability,
        }
    }

    pub fn is_retryable(&self) -> bool {
        self.kind().is_retryable()
    }
}

fn allow_all<B: Backend>(
    backend: &B,
    handles: &[Handle],
    owner: &PublicKey,
    contract: &Address,
) -> Result<(), ExecutionError> {
    for handle in handles {
        backend
            .allow(handle, owner, contract)
            .map_err(ExecutionError::Backend)?;
    }
    Ok(())
}

/// Deals a fresh hand. Valid from any stage; the previous session is discarded entirely.
pub fn start_game<B: Backend>(
    backend: &B,
    owner: &PublicKey,
    contract: &Address,
) -> Result<PlayerSession, ExecutionError> {
    let mut player_cards = [Handle::EMPTY; ROUND_COUNT];
    for card in player_cards.iter_mut() {
        *card = backend
            .draw_uniform(CARD_MIN, CARD_MAX)
            .map_err(ExecutionError::Backend)?;
    }
    let score = backend.constant(0).map_err(ExecutionError::Backend)?;

    allow_all(backend, &player_cards, owner, contract)?;
    allow_all(backend, &[score], owner, contract)?;

    Ok(PlayerSession {
        initialized: true,
        rounds_played: 0,
        used_cards: [false; ROUND_COUNT],
        player_cards,
        system_cards: [Handle::EMPTY; ROUND_COUNT],
        score,
    })
}

/// Checks whether round `index` may be played, in precedence order.
pub fn check_play(session: &PlayerSession, index: u8) -> Result<usize, GameError> {
    if !session.initialized {
        return Err(GameError::SessionNotStarted);
    }
    let offset = PlayerSession::round_index(index)?;
    if session.used_cards[offset] {
        return Err(GameError::RoundAlreadyPlayed(index));
    }
    if session.rounds_played as usize >= ROUND_COUNT {
        return Err(GameError::GameCompleted);
    }
    Ok(offset)
}

/// Plays round `index`: draws the system card, compares it with the player's card and folds the
/// encrypted outcome into the score.
pub fn play_round<B: Backend>(
    backend: &B,
    owner: &PublicKey,
    contract: &Address,
    session: &PlayerSession,
    index: u8,
) -> Result<PlayerSession, ExecutionError> {
    let offset = check_play(session, index)?;

    let system = backend
        .draw_uniform(CARD_MIN, CARD_MAX)
        .map_err(ExecutionError::Backend)?;
    let win = backend
        .gt(&session.player_cards[offset], &system)
        .map_err(ExecutionError::Backend)?;
    let score = backend
        .add(&session.score, &win)
        .map_err(ExecutionError::Backend)?;
    allow_all(backend, &[system, score], owner, contract)?;

    let mut next = session.clone();
    next.system_cards[offset] = system;
    next.score = score;
    next.used_cards[offset] = true;
    next.rounds_played += 1;
    Ok(next)
}
