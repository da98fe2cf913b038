//! Read-only views over the session repository. Handles only, never cleartext.

use crate::engine::ExecutionError;
use crate::state::{load_session, State};
use commonware_cryptography::ed25519::PublicKey;
use encwars_types::{GameMeta, Handle, Role};

async fn handle<S: State>(
    state: &S,
    owner: &PublicKey,
    role: Role,
    index: u8,
) -> Result<Handle, ExecutionError> {
    let session = load_session(state, owner)
        .await
        .map_err(ExecutionError::State)?;
    Ok(session.handle(role, index)?)
}

pub async fn game_meta<S: State>(state: &S, owner: &PublicKey) -> Result<GameMeta, ExecutionError> {
    let session = load_session(state, owner)
        .await
        .map_err(ExecutionError::State)?;
    Ok(session.meta())
}

/// Player card at `index`, or the empty sentinel before the first game.
pub async fn player_card<S: State>(
    state: &S,
    owner: &PublicKey,
    index: u8,
) -> Result<Handle, ExecutionError> {
    handle(state, owner, Role::Card, index).await
}

/// System card at `index`, or the empty sentinel until that round is played.
pub async fn system_card<S: State>(
    state: &S,
    owner: &PublicKey,
    index: u8,
) -> Result<Handle, ExecutionError> {
    handle(state, owner, Role::SystemCard, index).await
}

pub async fn score<S: State>(state: &S, owner: &PublicKey) -> Result<Handle, ExecutionError> {
    handle(state, owner, Role::Score, 0).await
}
