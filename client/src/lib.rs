//! SDK for playing encrypted wars.
//!
//! [Client] talks to the ledger, [decryption::Decryptor] runs the user decryption protocol against
//! the oracle and [game::Game] ties both together with a [cache::ValueCache] of revealed values.

mod backoff;
pub mod cache;
pub mod client;
pub mod config;
pub mod decryption;
pub mod game;

pub use cache::ValueCache;
pub use client::{Client, RetryPolicy};
pub use decryption::{
    Cleartext, Credential, Decryptor, EphemeralKeypair, HttpOracle, LocalCredential, Oracle,
};
pub use game::{Game, Reveal, RoundOutcome};

use encwars_types::{ErrorKind, GameError, Handle};
use thiserror::Error;

/// Error type for client operations.
#[derive(Error, Debug)]
pub enum Error {
    #[error("reqwest error: {0}")]
    Reqwest(#[from] reqwest::Error),
    #[error("failed: {0}")]
    Failed(reqwest::StatusCode),
    #[error("failed: {status}: {body}")]
    FailedWithBody {
        status: reqwest::StatusCode,
        body: String,
    },
    #[error("invalid data: {0}")]
    InvalidData(#[from] commonware_codec::Error),
    #[error("unexpected response")]
    UnexpectedResponse,
    #[error("URL parse error: {0}")]
    Url(#[from] url::ParseError),
    #[error("invalid URL scheme: {0} (expected http or https)")]
    InvalidScheme(String),
    #[error("{kind} error: {message}")]
    Rejected { kind: ErrorKind, message: String },
    #[error(transparent)]
    Game(#[from] GameError),
    #[error("signer unavailable: {0}")]
    SignerUnavailable(String),
    #[error("decryption service not ready")]
    ServiceNotReady,
    #[error("authorization rejected: {0}")]
    AuthorizationRejected(String),
    #[error("decryption grant expired")]
    GrantExpired,
    #[error("handle {0} is unset")]
    SentinelHandle(Handle),
}

impl Error {
    pub fn kind(&self) -> ErrorKind {
        match self {
            Error::Reqwest(_) | Error::SignerUnavailable(_) | Error::ServiceNotReady => {
                ErrorKind::Availability
            }
            Error::Failed(status) | Error::FailedWithBody { status, .. } => {
                if status.is_server_error() || *status == reqwest::StatusCode::TOO_MANY_REQUESTS {
                    ErrorKind::Availability
                } else {
                    ErrorKind::Validation
                }
            }
            Error::InvalidData(_)
            | Error::UnexpectedResponse
            | Error::Url(_)
            | Error::InvalidScheme(_) => ErrorKind::Validation,
            Error::Rejected { kind, .. } => *kind,
            Error::Game(err) => err.kind(),
            Error::AuthorizationRejected(_) | Error::GrantExpired => ErrorKind::Authorization,
            Error::SentinelHandle(_) => ErrorKind::State,
        }
    }

    /// Whether repeating the operation (with a fresh grant, for decryption) may succeed.
    pub fn is_retryable(&self) -> bool {
        matches!(self, Error::GrantExpired) || self.kind().is_retryable()
    }
}

/// Result type for client operations.
pub type Result<T> = std::result::Result<T, Error>;
