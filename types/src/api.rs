//! Decryption grant and oracle wire types.
//!
//! The grant payload is signed over its canonical codec encoding; the oracle request/response
//! travel as JSON with hex-encoded keys, signatures and handles and decimal-string cleartext.

use crate::execution::{decryption_namespace, Address, NAMESPACE};
use crate::game::{ErrorKind, Handle};
use bytes::{Buf, BufMut};
use commonware_codec::{DecodeExt, Encode, EncodeSize, Error, Read, ReadExt, ReadRangeExt, Write};
use commonware_cryptography::{
    ed25519::{PrivateKey, PublicKey, Signature},
    Signer, Verifier,
};
use commonware_utils::{from_hex_formatted, hex};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use thiserror::Error as ThisError;

/// Validity window of every grant.
pub const GRANT_DURATION_DAYS: u64 = 7;

pub const SECONDS_PER_DAY: u64 = 24 * 60 * 60;

/// Maximum number of ledger addresses a single grant may cover.
pub const MAX_GRANT_CONTRACTS: usize = 10;

/// Maximum number of handles decrypted in one batch.
pub const MAX_DECRYPTION_HANDLES: usize = 64;

/// Canonical content of a decryption grant (everything the owner signs).
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct GrantPayload {
    pub ephemeral_public: PublicKey,
    pub contracts: Vec<Address>,
    /// Seconds since the unix epoch.
    pub issued_at: u64,
    pub duration_days: u64,
}

impl GrantPayload {
    pub fn new(ephemeral_public: PublicKey, contracts: Vec<Address>, issued_at: u64) -> Self {
        Self {
            ephemeral_public,
            contracts,
            issued_at,
            duration_days: GRANT_DURATION_DAYS,
        }
    }

    pub fn expires_at(&self) -> u64 {
        self.issued_at
            .saturating_add(self.duration_days.saturating_mul(SECONDS_PER_DAY))
    }

    pub fn is_expired_at(&self, now: u64) -> bool {
        now >= self.expires_at()
    }

    pub fn covers(&self, contract: &Address) -> bool {
        self.contracts.contains(contract)
    }

    pub fn sign(&self, private: &PrivateKey) -> Signature {
        private.sign(&decryption_namespace(NAMESPACE), &self.encode())
    }

    pub fn verify(&self, owner: &PublicKey, signature: &Signature) -> bool {
        owner.verify(
            &decryption_namespace(NAMESPACE),
            &self.encode(),
            signature,
        )
    }
}

impl Write for GrantPayload {
    fn write(&self, writer: &mut impl BufMut) {
        self.ephemeral_public.write(writer);
        self.contracts.write(writer);
        self.issued_at.write(writer);
        self.duration_days.write(writer);
    }
}

impl Read for GrantPayload {
    type Cfg = ();

    fn read_cfg(reader: &mut impl Buf, _: &Self::Cfg) -> Result<Self, Error> {
        Ok(Self {
            ephemeral_public: PublicKey::read(reader)?,
            contracts: Vec::<Address>::read_range(reader, 1..=MAX_GRANT_CONTRACTS)?,
            issued_at: u64::read(reader)?,
            duration_days: u64::read(reader)?,
        })
    }
}

impl EncodeSize for GrantPayload {
    fn encode_size(&self) -> usize {
        self.ephemeral_public.encode_size()
            + self.contracts.encode_size()
            + self.issued_at.encode_size()
            + self.duration_days.encode_size()
    }
}

/// A handle together with the ledger that owns it.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct HandleScope {
    pub handle: Handle,
    pub contract: String,
}

#[derive(Debug, ThisError, PartialEq, Eq)]
pub enum RequestError {
    #[error("invalid {0} encoding")]
    InvalidField(&'static str),
    #[error("too many handles: {got} (max {max})")]
    TooManyHandles { got: usize, max: usize },
    #[error("empty request")]
    Empty,
}

/// Body of a user decryption request sent to the oracle.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct DecryptionRequest {
    pub handles: Vec<HandleScope>,
    pub ephemeral_public: String,
    pub signature: String,
    pub contracts: Vec<String>,
    pub owner: String,
    pub issued_at: u64,
    pub duration_days: u64,
}

/// A request after decoding every hex field.
#[derive(Clone, Debug)]
pub struct DecodedRequest {
    pub handles: Vec<(Handle, Address)>,
    pub payload: GrantPayload,
    pub signature: Signature,
    pub owner: PublicKey,
}

pub fn encode_address(address: &Address) -> String {
    hex(address.as_ref())
}

pub fn decode_address(value: &str) -> Option<Address> {
    let raw = from_hex_formatted(value)?;
    Address::decode(raw.as_ref()).ok()
}

pub fn encode_public_key(public: &PublicKey) -> String {
    hex(&public.encode())
}

pub fn decode_public_key(value: &str) -> Option<PublicKey> {
    let raw = from_hex_formatted(value)?;
    PublicKey::decode(raw.as_ref()).ok()
}

impl DecryptionRequest {
    pub fn new(
        handles: &[(Handle, Address)],
        payload: &GrantPayload,
        signature: &Signature,
        owner: &PublicKey,
    ) -> Self {
        Self {
            handles: handles
                .iter()
                .map(|(handle, contract)| HandleScope {
                    handle: *handle,
                    contract: encode_address(contract),
                })
                .collect(),
            ephemeral_public: encode_public_key(&payload.ephemeral_public),
            signature: hex(&signature.encode()),
            contracts: payload.contracts.iter().map(encode_address).collect(),
            owner: encode_public_key(owner),
            issued_at: payload.issued_at,
            duration_days: payload.duration_days,
        }
    }

    pub fn decode(&self) -> Result<DecodedRequest, RequestError> {
        if self.handles.is_empty() {
            return Err(RequestError::Empty);
        }
        if self.handles.len() > MAX_DECRYPTION_HANDLES {
            return Err(RequestError::TooManyHandles {
                got: self.handles.len(),
                max: MAX_DECRYPTION_HANDLES,
            });
        }
        if self.contracts.is_empty() || self.contracts.len() > MAX_GRANT_CONTRACTS {
            return Err(RequestError::InvalidField("contracts"));
        }
        let handles = self
            .handles
            .iter()
            .map(|scope| {
                decode_address(&scope.contract)
                    .map(|contract| (scope.handle, contract))
                    .ok_or(RequestError::InvalidField("contract"))
            })
            .collect::<Result<Vec<_>, _>>()?;
        let contracts = self
            .contracts
            .iter()
            .map(|value| decode_address(value).ok_or(RequestError::InvalidField("contracts")))
            .collect::<Result<Vec<_>, _>>()?;
        let ephemeral_public = decode_public_key(&self.ephemeral_public)
            .ok_or(RequestError::InvalidField("ephemeral_public"))?;
        let owner =
            decode_public_key(&self.owner).ok_or(RequestError::InvalidField("owner"))?;
        let signature = from_hex_formatted(&self.signature)
            .and_then(|raw| Signature::decode(raw.as_ref()).ok())
            .ok_or(RequestError::InvalidField("signature"))?;

        Ok(DecodedRequest {
            handles,
            payload: GrantPayload {
                ephemeral_public,
                contracts,
                issued_at: self.issued_at,
                duration_days: self.duration_days,
            },
            signature,
            owner,
        })
    }
}

/// Oracle response: decimal-string cleartext keyed by handle. Handles the oracle could not
/// answer are absent (never defaulted).
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DecryptionResponse {
    pub values: BTreeMap<Handle, String>,
}

/// Machine-readable code for an expired or not-yet-valid grant.
pub const CODE_GRANT_EXPIRED: &str = "grant_expired";

/// JSON error body returned by the ledger and the oracle.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ErrorResponse {
    pub kind: ErrorKind,
    pub error: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub code: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::execution::ledger_address;
    use crate::game::HANDLE_LEN;

    fn keys() -> (PrivateKey, PrivateKey) {
        (PrivateKey::from_seed(1), PrivateKey::from_seed(2))
    }

    #[test]
    fn test_grant_signature_binds_payload() {
        let (owner, ephemeral) = keys();
        let payload = GrantPayload::new(
            ephemeral.public_key(),
            vec![ledger_address(b"test")],
            1_700_000_000,
        );
        let signature = payload.sign(&owner);
        assert!(payload.verify(&owner.public_key(), &signature));

        // Any change to the payload invalidates the signature.
        let mut tampered = payload.clone();
        tampered.issued_at += 1;
        assert!(!tampered.verify(&owner.public_key(), &signature));

        let mut widened = payload.clone();
        widened.contracts.push(ledger_address(b"other"));
        assert!(!widened.verify(&owner.public_key(), &signature));

        // Signature is bound to the owner.
        assert!(!payload.verify(&ephemeral.public_key(), &signature));
    }

    #[test]
    fn test_grant_expiry_window() {
        let (_, ephemeral) = keys();
        let payload = GrantPayload::new(ephemeral.public_key(), vec![ledger_address(b"x")], 100);
        assert_eq!(payload.duration_days, GRANT_DURATION_DAYS);
        assert_eq!(payload.expires_at(), 100 + 7 * SECONDS_PER_DAY);
        assert!(!payload.is_expired_at(100));
        assert!(!payload.is_expired_at(payload.expires_at() - 1));
        assert!(payload.is_expired_at(payload.expires_at()));
    }

    #[test]
    fn test_request_decodes_to_signed_payload() {
        let (owner, ephemeral) = keys();
        let contract = ledger_address(b"test");
        let payload = GrantPayload::new(ephemeral.public_key(), vec![contract], 42);
        let signature = payload.sign(&owner);
        let handle = Handle::new([3u8; HANDLE_LEN]);

        let request = DecryptionRequest::new(
            &[(handle, contract)],
            &payload,
            &signature,
            &owner.public_key(),
        );
        let json = serde_json::to_string(&request).unwrap();
        let request: DecryptionRequest = serde_json::from_str(&json).unwrap();

        let decoded = request.decode().unwrap();
        assert_eq!(decoded.handles, vec![(handle, contract)]);
        assert_eq!(decoded.payload, payload);
        assert_eq!(decoded.owner, owner.public_key());
        assert!(decoded.payload.verify(&decoded.owner, &decoded.signature));
    }

    #[test]
    fn test_request_rejects_bad_fields() {
        let (owner, ephemeral) = keys();
        let contract = ledger_address(b"test");
        let payload = GrantPayload::new(ephemeral.public_key(), vec![contract], 42);
        let signature = payload.sign(&owner);
        let handle = Handle::new([3u8; HANDLE_LEN]);
        let request = DecryptionRequest::new(
            &[(handle, contract)],
            &payload,
            &signature,
            &owner.public_key(),
        );

        let mut bad = request.clone();
        bad.owner = "zz".to_string();
        assert_eq!(bad.decode().unwrap_err(), RequestError::InvalidField("owner"));

        let mut bad = request.clone();
        bad.handles.clear();
        assert_eq!(bad.decode().unwrap_err(), RequestError::Empty);

        let mut bad = request;
        bad.handles = vec![
            HandleScope {
                handle,
                contract: encode_address(&contract),
            };
            MAX_DECRYPTION_HANDLES + 1
        ];
        assert!(matches!(
            bad.decode().unwrap_err(),
            RequestError::TooManyHandles { .. }
        ));
    }

    #[test]
    fn test_response_json_shape() {
        let handle = Handle::new([9u8; HANDLE_LEN]);
        let mut response = DecryptionResponse::default();
        response.values.insert(handle, "7".to_string());
        let json = serde_json::to_value(&response).unwrap();
        assert_eq!(json["values"][handle.to_string()], "7");
    }

    #[test]
    fn test_error_response_code_is_optional() {
        let parsed: ErrorResponse =
            serde_json::from_str(r#"{"kind":"state","error":"game not started"}"#).unwrap();
        assert_eq!(parsed.kind, ErrorKind::State);
        assert_eq!(parsed.code, None);

        let body = ErrorResponse {
            kind: ErrorKind::Authorization,
            error: "grant expired".to_string(),
            code: Some(CODE_GRANT_EXPIRED.to_string()),
        };
        let json = serde_json::to_value(&body).unwrap();
        assert_eq!(json["kind"], "authorization");
        assert_eq!(json["code"], CODE_GRANT_EXPIRED);
    }
}
