//! User decryption: short-lived grants signed by the owner, redeemed at the oracle.
//!
//! Every batch mints a fresh [EphemeralKeypair]. The owner's durable [Credential] signs the grant
//! before anything is sent, and the keypair is dropped when the attempt ends, so a retry always
//! carries a new grant.

use crate::{
    client::{error_from_response, parse_http_url},
    Error, Result, RetryPolicy,
};
use commonware_math::algebra::Random;
use commonware_cryptography::{
    ed25519::{PrivateKey, PublicKey, Signature},
    Signer,
};
use encwars_types::{
    Address, DecryptionRequest, DecryptionResponse, ErrorKind, ErrorResponse, GrantPayload, Handle,
    Instruction, Transaction, CODE_GRANT_EXPIRED, MAX_DECRYPTION_HANDLES,
};
use rand::rngs::OsRng;
use reqwest::StatusCode;
use std::{
    collections::{BTreeMap, BTreeSet},
    fmt,
    future::Future,
    time::{Duration, SystemTime, UNIX_EPOCH},
};
use tracing::{debug, warn};
use url::Url;

/// Default bound on one oracle round-trip.
pub const DEFAULT_ORACLE_TIMEOUT: Duration = Duration::from_secs(5);

/// Owner's durable signing credential.
///
/// Signing may suspend (e.g. a wallet prompt). Implementations return
/// [Error::SignerUnavailable] when no signature can be produced.
pub trait Credential: Send + Sync {
    fn public_key(&self) -> PublicKey;

    fn sign_transaction(
        &self,
        nonce: u64,
        instruction: Instruction,
    ) -> impl Future<Output = Result<Transaction>> + Send;

    fn sign_grant(&self, payload: &GrantPayload) -> impl Future<Output = Result<Signature>> + Send;
}

/// Credential backed by an in-process private key.
pub struct LocalCredential {
    private: PrivateKey,
    public: PublicKey,
}

impl LocalCredential {
    pub fn new(private: PrivateKey) -> Self {
        let public = private.public_key();
        Self { private, public }
    }
}

impl fmt::Debug for LocalCredential {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("LocalCredential")
            .field("public", &self.public)
            .finish_non_exhaustive()
    }
}

impl Credential for LocalCredential {
    fn public_key(&self) -> PublicKey {
        self.public.clone()
    }

    async fn sign_transaction(&self, nonce: u64, instruction: Instruction) -> Result<Transaction> {
        Ok(Transaction::sign(&self.private, nonce, instruction))
    }

    async fn sign_grant(&self, payload: &GrantPayload) -> Result<Signature> {
        Ok(payload.sign(&self.private))
    }
}

/// Key pair that exists for exactly one decryption attempt.
///
/// The public half only binds the signed grant to this attempt. The oracle answers in cleartext
/// over the transport, so nothing in the response is sealed to this key.
pub struct EphemeralKeypair {
    private: PrivateKey,
}

impl EphemeralKeypair {
    pub fn generate() -> Self {
        Self {
            private: PrivateKey::random(&mut OsRng),
        }
    }

    pub fn public_key(&self) -> PublicKey {
        self.private.public_key()
    }
}

/// Decryption oracle transport.
pub trait Oracle: Send + Sync {
    fn decrypt(
        &self,
        request: &DecryptionRequest,
    ) -> impl Future<Output = Result<DecryptionResponse>> + Send;
}

/// Oracle reached over HTTP (`POST /decrypt`).
#[derive(Clone)]
pub struct HttpOracle {
    url: Url,
    http_client: reqwest::Client,
}

impl HttpOracle {
    pub fn new(base_url: &str) -> Result<Self> {
        let url = parse_http_url(base_url)?.join("decrypt")?;
        Ok(Self {
            url,
            http_client: reqwest::Client::new(),
        })
    }
}

impl Oracle for HttpOracle {
    async fn decrypt(&self, request: &DecryptionRequest) -> Result<DecryptionResponse> {
        let response = self
            .http_client
            .post(self.url.clone())
            .json(request)
            .send()
            .await?;
        match response.status() {
            status if status.is_success() => Ok(response.json().await?),
            StatusCode::SERVICE_UNAVAILABLE => Err(Error::ServiceNotReady),
            StatusCode::FORBIDDEN => {
                let body = response.text().await?;
                match serde_json::from_str::<ErrorResponse>(&body) {
                    Ok(error) if error.code.as_deref() == Some(CODE_GRANT_EXPIRED) => {
                        Err(Error::GrantExpired)
                    }
                    Ok(error) => Err(Error::AuthorizationRejected(error.error)),
                    Err(_) => Err(Error::AuthorizationRejected(body)),
                }
            }
            _ => Err(error_from_response(response).await),
        }
    }
}

/// Outcome of decrypting one handle.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Cleartext {
    Decrypted(u64),
    /// The oracle did not answer for this handle (yet).
    Pending,
    /// The oracle answered with something that is not a cleartext integer.
    Failed(String),
}

impl Cleartext {
    pub fn value(&self) -> Option<u64> {
        match self {
            Cleartext::Decrypted(value) => Some(*value),
            _ => None,
        }
    }
}

impl fmt::Display for Cleartext {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Cleartext::Decrypted(value) => write!(f, "{value}"),
            Cleartext::Pending => write!(f, "pending"),
            Cleartext::Failed(reason) => write!(f, "failed ({reason})"),
        }
    }
}

fn unix_now() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|elapsed| elapsed.as_secs())
        .unwrap_or(0)
}

/// Runs the user decryption protocol for one owner against one ledger.
pub struct Decryptor<C: Credential, O: Oracle> {
    credential: C,
    oracle: O,
    contract: Address,
    timeout: Duration,
    retry_policy: RetryPolicy,
}

impl<C: Credential, O: Oracle> Decryptor<C, O> {
    pub fn new(credential: C, oracle: O, contract: Address) -> Self {
        Self {
            credential,
            oracle,
            contract,
            timeout: DEFAULT_ORACLE_TIMEOUT,
            retry_policy: RetryPolicy::default(),
        }
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn with_retry_policy(mut self, retry_policy: RetryPolicy) -> Self {
        self.retry_policy = retry_policy;
        self
    }

    pub fn credential(&self) -> &C {
        &self.credential
    }

    pub fn contract(&self) -> Address {
        self.contract
    }

    /// Decrypts `handles` with a fresh grant per attempt.
    ///
    /// Sentinel handles are refused before any grant is minted. Handles the oracle does not
    /// answer are reported as [Cleartext::Pending].
    pub async fn request_decryption(
        &self,
        handles: &[Handle],
    ) -> Result<BTreeMap<Handle, Cleartext>> {
        if let Some(handle) = handles.iter().find(|handle| handle.is_empty()) {
            return Err(Error::SentinelHandle(*handle));
        }
        let handles: BTreeSet<Handle> = handles.iter().copied().collect();
        if handles.is_empty() {
            return Ok(BTreeMap::new());
        }
        if handles.len() > MAX_DECRYPTION_HANDLES {
            return Err(Error::Rejected {
                kind: ErrorKind::Validation,
                message: format!(
                    "too many handles: {} (max {MAX_DECRYPTION_HANDLES})",
                    handles.len()
                ),
            });
        }
        let scoped: Vec<(Handle, Address)> = handles
            .iter()
            .map(|handle| (*handle, self.contract))
            .collect();

        let attempts = self.retry_policy.attempts();
        let mut attempt = 0;
        loop {
            attempt += 1;
            match self.attempt(&scoped).await {
                Ok(response) => return Ok(collect(&handles, response)),
                Err(err) if err.is_retryable() && attempt < attempts => {
                    warn!(error = %err, attempt, "decryption attempt failed; retrying");
                    tokio::time::sleep(self.retry_policy.delay(attempt - 1)).await;
                }
                Err(err) => return Err(err),
            }
        }
    }

    async fn attempt(&self, scoped: &[(Handle, Address)]) -> Result<DecryptionResponse> {
        let ephemeral = EphemeralKeypair::generate();
        let payload = GrantPayload::new(ephemeral.public_key(), vec![self.contract], unix_now());
        let signature = self.credential.sign_grant(&payload).await?;
        let request = DecryptionRequest::new(
            scoped,
            &payload,
            &signature,
            &self.credential.public_key(),
        );

        let response = tokio::time::timeout(self.timeout, self.oracle.decrypt(&request))
            .await
            .map_err(|_| Error::ServiceNotReady)?;
        drop(ephemeral);
        response
    }
}

fn collect(handles: &BTreeSet<Handle>, mut response: DecryptionResponse) -> BTreeMap<Handle, Cleartext> {
    let result: BTreeMap<Handle, Cleartext> = handles
        .iter()
        .map(|handle| {
            let cleartext = match response.values.remove(handle) {
                Some(value) => match value.parse::<u64>() {
                    Ok(value) => Cleartext::Decrypted(value),
                    Err(_) => Cleartext::Failed(format!("not an integer: {value}")),
                },
                None => Cleartext::Pending,
            };
            (*handle, cleartext)
        })
        .collect();
    if !response.values.is_empty() {
        debug!(
            extra = response.values.len(),
            "ignoring values for handles that were not requested"
        );
    }
    result
}
