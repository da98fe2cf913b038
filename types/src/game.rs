//! Encrypted game state.
//!
//! A [PlayerSession] never stores cleartext: cards and score are [Handle]s to ciphertexts held
//! by the encrypted-compute backend. The all-zero handle ([Handle::EMPTY]) is the "unset"
//! sentinel and must never be submitted for decryption.

use bytes::{Buf, BufMut};
use commonware_codec::{EncodeSize, Error, FixedSize, Read, ReadExt, Write};
use commonware_utils::{from_hex_formatted, hex};
use serde::{Deserialize, Serialize};
use std::fmt;
use thiserror::Error as ThisError;

/// Number of rounds (and player cards) in a session.
pub const ROUND_COUNT: usize = 3;

/// Smallest card value.
pub const CARD_MIN: u8 = 1;

/// Largest card value.
pub const CARD_MAX: u8 = 10;

/// Length of a ciphertext handle in bytes.
pub const HANDLE_LEN: usize = 32;

/// Failure category shared by every error surfaced to a caller.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    /// Malformed input (e.g. a round index outside `0..=2`).
    Validation,
    /// The request is well-formed but not allowed in the current session state.
    State,
    /// The decryption grant was rejected (bad signature, expired, scope mismatch).
    Authorization,
    /// A collaborator (signer, oracle, backend) is not ready or timed out.
    Availability,
}

impl ErrorKind {
    /// Returns true if retrying with a fresh grant (or later) can succeed.
    pub fn is_retryable(&self) -> bool {
        matches!(self, ErrorKind::Availability)
    }
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            ErrorKind::Validation => "validation",
            ErrorKind::State => "state",
            ErrorKind::Authorization => "authorization",
            ErrorKind::Availability => "availability",
        };
        f.write_str(label)
    }
}

/// Rejections produced by the round engine. None of them mutate the session.
#[derive(Clone, Copy, Debug, ThisError, PartialEq, Eq)]
pub enum GameError {
    #[error("game not started")]
    SessionNotStarted,
    #[error("invalid round index {0} (expected 0..=2)")]
    InvalidRound(u8),
    #[error("round {0} already played")]
    RoundAlreadyPlayed(u8),
    #[error("game completed")]
    GameCompleted,
}

impl GameError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            GameError::InvalidRound(_) => ErrorKind::Validation,
            GameError::SessionNotStarted
            | GameError::RoundAlreadyPlayed(_)
            | GameError::GameCompleted => ErrorKind::State,
        }
    }
}

impl Write for GameError {
    fn write(&self, writer: &mut impl BufMut) {
        match self {
            GameError::SessionNotStarted => 0u8.write(writer),
            GameError::InvalidRound(index) => {
                1u8.write(writer);
                index.write(writer);
            }
            GameError::RoundAlreadyPlayed(index) => {
                2u8.write(writer);
                index.write(writer);
            }
            GameError::GameCompleted => 3u8.write(writer),
        }
    }
}

impl Read for GameError {
    type Cfg = ();

    fn read_cfg(reader: &mut impl Buf, _: &Self::Cfg) -> Result<Self, Error> {
        let kind = u8::read(reader)?;
        match kind {
            0 => Ok(GameError::SessionNotStarted),
            1 => Ok(GameError::InvalidRound(u8::read(reader)?)),
            2 => Ok(GameError::RoundAlreadyPlayed(u8::read(reader)?)),
            3 => Ok(GameError::GameCompleted),
            i => Err(Error::InvalidEnum(i)),
        }
    }
}

impl EncodeSize for GameError {
    fn encode_size(&self) -> usize {
        1 + match self {
            GameError::InvalidRound(_) | GameError::RoundAlreadyPlayed(_) => 1,
            GameError::SessionNotStarted | GameError::GameCompleted => 0,
        }
    }
}

/// Opaque reference to a ciphertext.
#[derive(Clone, Copy, Default, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Handle([u8; HANDLE_LEN]);

impl Handle {
    /// The "not yet available" sentinel.
    pub const EMPTY: Self = Self([0u8; HANDLE_LEN]);

    pub const fn new(bytes: [u8; HANDLE_LEN]) -> Self {
        Self(bytes)
    }

    pub fn is_empty(&self) -> bool {
        self.0 == [0u8; HANDLE_LEN]
    }

    pub fn as_bytes(&self) -> &[u8; HANDLE_LEN] {
        &self.0
    }

    /// Parses a hex handle, with or without a `0x` prefix.
    pub fn from_hex(value: &str) -> Option<Self> {
        let bytes = from_hex_formatted(value)?;
        let bytes: [u8; HANDLE_LEN] = bytes.try_into().ok()?;
        Some(Self(bytes))
    }
}

impl AsRef<[u8]> for Handle {
    fn as_ref(&self) -> &[u8] {
        &self.0
    }
}

impl fmt::Display for Handle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "0x{}", hex(&self.0))
    }
}

impl fmt::Debug for Handle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Handle({self})")
    }
}

impl Write for Handle {
    fn write(&self, writer: &mut impl BufMut) {
        writer.put_slice(&self.0);
    }
}

impl Read for Handle {
    type Cfg = ();

    fn read_cfg(reader: &mut impl Buf, _: &Self::Cfg) -> Result<Self, Error> {
        Ok(Self(<[u8; HANDLE_LEN]>::read(reader)?))
    }
}

impl FixedSize for Handle {
    const SIZE: usize = HANDLE_LEN;
}

impl Serialize for Handle {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: serde::Serializer,
    {
        serializer.serialize_str(&self.to_string())
    }
}

impl<'de> Deserialize<'de> for Handle {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: serde::Deserializer<'de>,
    {
        let value = String::deserialize(deserializer)?;
        Self::from_hex(&value)
            .ok_or_else(|| serde::de::Error::custom("expected a 32-byte hex handle"))
    }
}

/// Which encrypted value of a session a handle refers to.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Role {
    Card,
    SystemCard,
    Score,
}

/// Lifecycle position of a session.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Stage {
    Uninitialized,
    /// Rounds played so far (0..=2).
    Active(u8),
    Completed,
}

/// Public projection of a session: everything except handles.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct GameMeta {
    pub rounds_played: u8,
    pub used_cards: [bool; ROUND_COUNT],
    pub initialized: bool,
}

impl Write for GameMeta {
    fn write(&self, writer: &mut impl BufMut) {
        self.rounds_played.write(writer);
        for used in self.used_cards {
            used.write(writer);
        }
        self.initialized.write(writer);
    }
}

impl Read for GameMeta {
    type Cfg = ();

    fn read_cfg(reader: &mut impl Buf, _: &Self::Cfg) -> Result<Self, Error> {
        let rounds_played = u8::read(reader)?;
        let mut used_cards = [false; ROUND_COUNT];
        for used in used_cards.iter_mut() {
            *used = bool::read(reader)?;
        }
        let initialized = bool::read(reader)?;
        Ok(Self {
            rounds_played,
            used_cards,
            initialized,
        })
    }
}

impl FixedSize for GameMeta {
    const SIZE: usize = 1 + ROUND_COUNT + 1;
}

#[derive(Debug, ThisError, PartialEq, Eq)]
pub enum SessionInvariantError {
    #[error("rounds_played out of range (got={0}, max=3)")]
    RoundsOutOfRange(u8),
    #[error("rounds_played ({rounds}) does not match used cards ({used})")]
    RoundsMismatch { rounds: u8, used: u8 },
    #[error("round {0} played without a system card")]
    MissingSystemCard(usize),
    #[error("system card {0} drawn before its round was played")]
    EarlySystemCard(usize),
    #[error("player card {0} missing")]
    MissingPlayerCard(usize),
    #[error("score missing")]
    MissingScore,
    #[error("uninitialized session carries state")]
    StaleUninitialized,
}

/// Encrypted state of one player's game.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct PlayerSession {
    pub initialized: bool,
    pub rounds_played: u8,
    pub used_cards: [bool; ROUND_COUNT],
    pub player_cards: [Handle; ROUND_COUNT],
    pub system_cards: [Handle; ROUND_COUNT],
    pub score: Handle,
}

impl PlayerSession {
    /// Validates a round index, returning it as an array offset.
    pub fn round_index(index: u8) -> Result<usize, GameError> {
        let offset = index as usize;
        if offset >= ROUND_COUNT {
            return Err(GameError::InvalidRound(index));
        }
        Ok(offset)
    }

    pub fn stage(&self) -> Stage {
        if !self.initialized {
            Stage::Uninitialized
        } else if self.rounds_played as usize >= ROUND_COUNT {
            Stage::Completed
        } else {
            Stage::Active(self.rounds_played)
        }
    }

    pub fn meta(&self) -> GameMeta {
        GameMeta {
            rounds_played: self.rounds_played,
            used_cards: self.used_cards,
            initialized: self.initialized,
        }
    }

    /// Player card handle at `index` ([Handle::EMPTY] before the first game).
    pub fn player_card(&self, index: u8) -> Result<Handle, GameError> {
        Ok(self.player_cards[Self::round_index(index)?])
    }

    /// System card handle at `index` ([Handle::EMPTY] until that round is played).
    pub fn system_card(&self, index: u8) -> Result<Handle, GameError> {
        Ok(self.system_cards[Self::round_index(index)?])
    }

    /// Handle for a given role and index. `index` is ignored for [Role::Score].
    pub fn handle(&self, role: Role, index: u8) -> Result<Handle, GameError> {
        match role {
            Role::Card => self.player_card(index),
            Role::SystemCard => self.system_card(index),
            Role::Score => Ok(self.score),
        }
    }

    pub fn validate_invariants(&self) -> Result<(), SessionInvariantError> {
        if !self.initialized {
            if *self != Self::default() {
                return Err(SessionInvariantError::StaleUninitialized);
            }
            return Ok(());
        }
        if self.rounds_played as usize > ROUND_COUNT {
            return Err(SessionInvariantError::RoundsOutOfRange(self.rounds_played));
        }
        let used = self.used_cards.iter().filter(|used| **used).count() as u8;
        if used != self.rounds_played {
            return Err(SessionInvariantError::RoundsMismatch {
                rounds: self.rounds_played,
                used,
            });
        }
        for i in 0..ROUND_COUNT {
            if self.player_cards[i].is_empty() {
                return Err(SessionInvariantError::MissingPlayerCard(i));
            }
            match (self.used_cards[i], self.system_cards[i].is_empty()) {
                (true, true) => return Err(SessionInvariantError::MissingSystemCard(i)),
                (false, false) => return Err(SessionInvariantError::EarlySystemCard(i)),
                _ => {}
            }
        }
        if self.score.is_empty() {
            return Err(SessionInvariantError::MissingScore);
        }
        Ok(())
    }
}

impl Write for PlayerSession {
    fn write(&self, writer: &mut impl BufMut) {
        self.initialized.write(writer);
        self.rounds_played.write(writer);
        for used in self.used_cards {
            used.write(writer);
        }
        for card in &self.player_cards {
            card.write(writer);
        }
        for card in &self.system_cards {
            card.write(writer);
        }
        self.score.write(writer);
    }
}

impl Read for PlayerSession {
    type Cfg = ();

    fn read_cfg(reader: &mut impl Buf, _: &Self::Cfg) -> Result<Self, Error> {
        let initialized = bool::read(reader)?;
        let rounds_played = u8::read(reader)?;
        let mut used_cards = [false; ROUND_COUNT];
        for used in used_cards.iter_mut() {
            *used = bool::read(reader)?;
        }
        let mut player_cards = [Handle::EMPTY; ROUND_COUNT];
        for card in player_cards.iter_mut() {
            *card = Handle::read(reader)?;
        }
        let mut system_cards = [Handle::EMPTY; ROUND_COUNT];
        for card in system_cards.iter_mut() {
            *card = Handle::read(reader)?;
        }
        let score = Handle::read(reader)?;

        let session = Self {
            initialized,
            rounds_played,
            used_cards,
            player_cards,
            system_cards,
            score,
        };
        session
            .validate_invariants()
            .map_err(|_| Error::Invalid("PlayerSession", "invariant violated"))?;
        Ok(session)
    }
}

impl FixedSize for PlayerSession {
    const SIZE: usize = 1 + 1 + ROUND_COUNT + (2 * ROUND_COUNT + 1) * HANDLE_LEN;
}
