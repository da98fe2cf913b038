use crate::{
    backoff::{exponential_backoff, jittered_backoff},
    Error, Result,
};
use bytes::Bytes;
use commonware_codec::{DecodeExt, Encode, ReadRangeExt};
use commonware_cryptography::ed25519::PublicKey;
use encwars_types::{
    decode_address, encode_public_key, Account, Address, ErrorResponse, Event, GameMeta,
    PlayerSession, Transaction,
};
use reqwest::{Method, StatusCode};
use std::time::Duration;
use tracing::{debug, warn};
use url::Url;

/// Timeout applied to every HTTP request.
const DEFAULT_TIMEOUT: Duration = Duration::from_secs(10);

/// Upper bound on events returned for one transaction.
const MAX_EVENTS: usize = 8;

/// Retry behavior for ledger requests.
#[derive(Clone, Debug)]
pub struct RetryPolicy {
    /// Total attempts (including the first). Zero is treated as one.
    pub max_attempts: usize,
    pub initial_backoff: Duration,
    pub max_backoff: Duration,
    /// Whether POST requests are retried as well.
    pub retry_non_idempotent: bool,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            initial_backoff: Duration::from_millis(100),
            max_backoff: Duration::from_secs(2),
            retry_non_idempotent: false,
        }
    }
}

impl RetryPolicy {
    pub(crate) fn attempts(&self) -> usize {
        self.max_attempts.max(1)
    }

    /// Delay before the given (zero-based) retry.
    pub(crate) fn delay(&self, retry: usize) -> Duration {
        let backoff = exponential_backoff(self.initial_backoff, self.max_backoff, retry);
        jittered_backoff(&mut rand::thread_rng(), backoff)
    }
}

fn is_retryable_status(status: StatusCode) -> bool {
    matches!(
        status,
        StatusCode::TOO_MANY_REQUESTS
            | StatusCode::BAD_GATEWAY
            | StatusCode::SERVICE_UNAVAILABLE
            | StatusCode::GATEWAY_TIMEOUT
    )
}

pub(crate) fn parse_http_url(value: &str) -> Result<Url> {
    let url = Url::parse(value)?;
    match url.scheme() {
        "http" | "https" => Ok(url),
        scheme => Err(Error::InvalidScheme(scheme.to_string())),
    }
}

/// Maps a non-success ledger response to an [Error], preferring the JSON error body.
pub(crate) async fn error_from_response(response: reqwest::Response) -> Error {
    let status = response.status();
    let body = match response.text().await {
        Ok(body) => body,
        Err(_) => return Error::Failed(status),
    };
    match serde_json::from_str::<ErrorResponse>(&body) {
        Ok(error) => Error::Rejected {
            kind: error.kind,
            message: error.error,
        },
        Err(_) => Error::FailedWithBody { status, body },
    }
}

/// HTTP client for the ledger.
#[derive(Clone)]
pub struct Client {
    pub base_url: Url,
    pub http_client: reqwest::Client,
    retry_policy: RetryPolicy,
}

impl Client {
    pub fn new(base_url: &str) -> Result<Self> {
        let base_url = parse_http_url(base_url)?;
        let http_client = reqwest::Client::builder()
            .timeout(DEFAULT_TIMEOUT)
            .build()?;
        Ok(Self {
            base_url,
            http_client,
            retry_policy: RetryPolicy::default(),
        })
    }

    pub fn with_retry_policy(mut self, retry_policy: RetryPolicy) -> Self {
        self.retry_policy = retry_policy;
        self
    }

    pub fn retry_policy(&self) -> &RetryPolicy {
        &self.retry_policy
    }

    async fn send_with_retry(
        &self,
        method: Method,
        url: Url,
        body: Option<Bytes>,
    ) -> Result<reqwest::Response> {
        let retry = method == Method::GET || self.retry_policy.retry_non_idempotent;
        let max_attempts = if retry {
            self.retry_policy.attempts()
        } else {
            1
        };

        let mut attempt = 0;
        loop {
            attempt += 1;
            let mut request = self.http_client.request(method.clone(), url.clone());
            if let Some(body) = &body {
                request = request.body(body.clone());
            }
            match request.send().await {
                Ok(response) => {
                    let status = response.status();
                    if !is_retryable_status(status) {
                        return Ok(response);
                    }
                    if attempt >= max_attempts {
                        let text = response.text().await.unwrap_or_default();
                        return Err(Error::FailedWithBody {
                            status,
                            body: format!("{method} {url}: {text}"),
                        });
                    }
                    warn!(%url, %status, attempt, "retryable status");
                }
                Err(err) => {
                    let transient = err.is_timeout() || err.is_connect();
                    if !transient || attempt >= max_attempts {
                        return Err(err.into());
                    }
                    warn!(%url, ?err, attempt, "request failed");
                }
            }
            tokio::time::sleep(self.retry_policy.delay(attempt - 1)).await;
        }
    }

    pub async fn get_with_retry(&self, url: Url) -> Result<reqwest::Response> {
        self.send_with_retry(Method::GET, url, None).await
    }

    pub async fn post_bytes_with_retry(&self, url: Url, body: Bytes) -> Result<reqwest::Response> {
        self.send_with_retry(Method::POST, url, Some(body)).await
    }

    async fn get_bytes(&self, path: &str) -> Result<Bytes> {
        let url = self.base_url.join(path)?;
        let response = self.get_with_retry(url).await?;
        if !response.status().is_success() {
            return Err(error_from_response(response).await);
        }
        Ok(response.bytes().await?)
    }

    /// Address of the ledger (the contract scope of every handle it stores).
    pub async fn address(&self) -> Result<Address> {
        let bytes = self.get_bytes("address").await?;
        let text = std::str::from_utf8(&bytes).map_err(|_| Error::UnexpectedResponse)?;
        decode_address(text.trim()).ok_or(Error::UnexpectedResponse)
    }

    pub async fn account(&self, owner: &PublicKey) -> Result<Account> {
        let bytes = self
            .get_bytes(&format!("account/{}", encode_public_key(owner)))
            .await?;
        Ok(Account::decode(bytes.as_ref())?)
    }

    /// Next nonce expected from `owner`.
    pub async fn nonce(&self, owner: &PublicKey) -> Result<u64> {
        Ok(self.account(owner).await?.nonce)
    }

    pub async fn session(&self, owner: &PublicKey) -> Result<PlayerSession> {
        let bytes = self
            .get_bytes(&format!("session/{}", encode_public_key(owner)))
            .await?;
        Ok(PlayerSession::decode(bytes.as_ref())?)
    }

    /// Public projection of `owner`'s session.
    pub async fn meta(&self, owner: &PublicKey) -> Result<GameMeta> {
        let bytes = self
            .get_bytes(&format!("meta/{}", encode_public_key(owner)))
            .await?;
        Ok(GameMeta::decode(bytes.as_ref())?)
    }

    /// Submits a signed transaction and waits for its inclusion.
    pub async fn submit(&self, transaction: &Transaction) -> Result<Vec<Event>> {
        let url = self.base_url.join("submit")?;
        let body = Bytes::from(transaction.encode().to_vec());
        let response = self.post_bytes_with_retry(url, body).await?;
        if !response.status().is_success() {
            return Err(error_from_response(response).await);
        }

        let bytes = response.bytes().await?;
        let mut reader = bytes.as_ref();
        let events = Vec::<Event>::read_range(&mut reader, 0..=MAX_EVENTS)?;
        if !reader.is_empty() {
            return Err(Error::UnexpectedResponse);
        }
        debug!(
            nonce = transaction.nonce,
            events = events.len(),
            "transaction included"
        );
        Ok(events)
    }
}
