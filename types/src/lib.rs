//! Common types used by the encrypted wars ledger, the decryption oracle and clients.
//!
//! Nothing in this crate ever carries a cleartext card or score: sessions only hold [Handle]s to
//! ciphertexts owned by the encrypted-compute backend.

pub mod api;
pub mod execution;
pub mod game;

pub use api::{
    decode_address, decode_public_key, encode_address, encode_public_key, DecodedRequest,
    DecryptionRequest, DecryptionResponse, ErrorResponse, GrantPayload, HandleScope,
    RequestError, CODE_GRANT_EXPIRED, GRANT_DURATION_DAYS, MAX_DECRYPTION_HANDLES, MAX_GRANT_CONTRACTS,
    SECONDS_PER_DAY,
};
pub use execution::{
    decryption_namespace, ledger_address, transaction_namespace, Account, Address, Event,
    Instruction, Key, Transaction, Value, NAMESPACE,
};
pub use game::{
    ErrorKind, GameError, GameMeta, Handle, PlayerSession, Role, SessionInvariantError, Stage,
    CARD_MAX, CARD_MIN, HANDLE_LEN, ROUND_COUNT,
};

#[cfg(test)]
mod compat;
