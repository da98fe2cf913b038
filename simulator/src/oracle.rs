//! Decryption oracle: validates user decryption grants and answers with cleartext.

use encwars_execution::Decrypter;
use encwars_types::{
    Address, DecodedRequest, DecryptionRequest, DecryptionResponse, ErrorKind, Handle,
    RequestError, CODE_GRANT_EXPIRED, GRANT_DURATION_DAYS,
};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{SystemTime, UNIX_EPOCH};
use thiserror::Error;
use tracing::{debug, info};

#[derive(Debug, Error)]
pub enum OracleError {
    #[error("malformed request: {0}")]
    Malformed(#[from] RequestError),
    #[error("grant signature rejected")]
    InvalidSignature,
    #[error("grant duration {0} days not accepted")]
    InvalidDuration(u64),
    #[error("grant expired at {expired_at} (now {now})")]
    Expired { expired_at: u64, now: u64 },
    #[error("grant issued in the future ({issued_at} > {now})")]
    NotYetValid { issued_at: u64, now: u64 },
    #[error("handle {0} is outside the grant scope")]
    ScopeMismatch(Handle),
    #[error("handle {0} is not allowed for this owner")]
    NotAllowed(Handle),
    #[error("oracle not ready")]
    NotReady,
}

impl OracleError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            OracleError::Malformed(_) => ErrorKind::Validation,
            OracleError::InvalidSignature
            | OracleError::InvalidDuration(_)
            | OracleError::Expired { .. }
            | OracleError::NotYetValid { .. }
            | OracleError::ScopeMismatch(_)
            | OracleError::NotAllowed(_) => ErrorKind::Authorization,
            OracleError::NotReady => ErrorKind::Availability,
        }
    }

    /// Machine-readable code attached to the error body, if any.
    pub fn code(&self) -> Option<&'static str> {
        match self {
            OracleError::Expired { .. } | OracleError::NotYetValid { .. } => {
                Some(CODE_GRANT_EXPIRED)
            }
            _ => None,
        }
    }
}

pub fn unix_now() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|elapsed| elapsed.as_secs())
        .unwrap_or(0)
}

pub struct Oracle<D: Decrypter> {
    address: Address,
    decrypter: Arc<D>,
    max_clock_skew_secs: u64,
    ready: AtomicBool,
}

impl<D: Decrypter> Oracle<D> {
    pub fn new(address: Address, decrypter: Arc<D>, max_clock_skew_secs: u64) -> Self {
        Self {
            address,
            decrypter,
            max_clock_skew_secs,
            ready: AtomicBool::new(true),
        }
    }

    pub fn set_ready(&self, ready: bool) {
        self.ready.store(ready, Ordering::Relaxed);
    }

    pub fn is_ready(&self) -> bool {
        self.ready.load(Ordering::Relaxed)
    }

    fn authorize(&self, request: &DecodedRequest, now: u64) -> Result<(), OracleError> {
        let payload = &request.payload;
        if !payload.verify(&request.owner, &request.signature) {
            return Err(OracleError::InvalidSignature);
        }
        if payload.duration_days == 0 || payload.duration_days > GRANT_DURATION_DAYS {
            return Err(OracleError::InvalidDuration(payload.duration_days));
        }
        if payload.issued_at > now.saturating_add(self.max_clock_skew_secs) {
            return Err(OracleError::NotYetValid {
                issued_at: payload.issued_at,
                now,
            });
        }
        if payload.is_expired_at(now) {
            return Err(OracleError::Expired {
                expired_at: payload.expires_at(),
                now,
            });
        }
        Ok(())
    }

    /// Validates `request` against the clock value `now` (seconds) and decrypts every handle.
    ///
    /// The whole batch is refused if any handle is not allowed for the owner, whether or not the
    /// oracle knows it.
    pub fn verify_at(
        &self,
        request: &DecryptionRequest,
        now: u64,
    ) -> Result<DecryptionResponse, OracleError> {
        if !self.is_ready() {
            return Err(OracleError::NotReady);
        }
        let decoded = request.decode()?;
        self.authorize(&decoded, now)?;

        let mut response = DecryptionResponse::default();
        for (handle, contract) in &decoded.handles {
            if *contract != self.address || !decoded.payload.covers(contract) {
                return Err(OracleError::ScopeMismatch(*handle));
            }
            // Unknown handles are never allowed, so they are refused like any other handle the
            // owner may not read.
            if !self.decrypter.is_allowed(handle, &decoded.owner, contract) {
                debug!(%handle, "handle not allowed for owner");
                return Err(OracleError::NotAllowed(*handle));
            }
            let Some(value) = self.decrypter.decrypt(handle) else {
                debug!(%handle, "allowed handle has no value; omitting");
                continue;
            };
            response.values.insert(*handle, value.to_string());
        }
        info!(
            owner = ?decoded.owner,
            requested = decoded.handles.len(),
            answered = response.values.len(),
            "decryption served"
        );
        Ok(response)
    }

    pub fn verify(&self, request: &DecryptionRequest) -> Result<DecryptionResponse, OracleError> {
        self.verify_at(request, unix_now())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use commonware_cryptography::{ed25519::PrivateKey, Signer};
    use encwars_execution::{mocks::create_account_keypair, Backend, Simulated};
    use encwars_types::{ledger_address, GrantPayload, SECONDS_PER_DAY};

    const NOW: u64 = 1_700_000_000;

    struct Fixture {
        oracle: Oracle<Simulated>,
        backend: Arc<Simulated>,
        owner: PrivateKey,
        contract: Address,
    }

    fn fixture() -> Fixture {
        let contract = ledger_address(b"test");
        let backend = Arc::new(Simulated::new(0));
        let (owner, _) = create_account_keypair(1);
        Fixture {
            oracle: Oracle::new(contract, backend.clone(), 60),
            backend,
            owner,
            contract,
        }
    }

    fn allowed(f: &Fixture, value: u8) -> Handle {
        let handle = f.backend.constant(value).unwrap();
        f.backend
            .allow(&handle, &f.owner.public_key(), &f.contract)
            .unwrap();
        handle
    }

    fn request(
        owner: &PrivateKey,
        handles: &[(Handle, Address)],
        contracts: Vec<Address>,
        issued_at: u64,
    ) -> DecryptionRequest {
        let (ephemeral, _) = create_account_keypair(issued_at);
        let payload = GrantPayload::new(ephemeral.public_key(), contracts, issued_at);
        let signature = payload.sign(owner);
        DecryptionRequest::new(handles, &payload, &signature, &owner.public_key())
    }

    #[test]
    fn test_decrypts_allowed_handles() {
        let f = fixture();
        let handle = allowed(&f, 7);
        let other = allowed(&f, 0);

        let req = request(
            &f.owner,
            &[(handle, f.contract), (other, f.contract)],
            vec![f.contract],
            NOW,
        );
        let response = f.oracle.verify_at(&req, NOW).unwrap();
        assert_eq!(response.values.get(&handle).map(String::as_str), Some("7"));
        assert_eq!(response.values.get(&other).map(String::as_str), Some("0"));
    }

    #[test]
    fn test_unknown_and_foreign_handles_are_indistinguishable() {
        let f = fixture();
        let (alice, _) = create_account_keypair(2);
        let foreign = f.backend.constant(4).unwrap();
        f.backend
            .allow(&foreign, &alice.public_key(), &f.contract)
            .unwrap();
        let unknown = Handle::new([5u8; 32]);

        let err = f
            .oracle
            .verify_at(
                &request(&f.owner, &[(foreign, f.contract)], vec![f.contract], NOW),
                NOW,
            )
            .unwrap_err();
        assert!(matches!(err, OracleError::NotAllowed(h) if h == foreign));

        let err = f
            .oracle
            .verify_at(
                &request(&f.owner, &[(unknown, f.contract)], vec![f.contract], NOW),
                NOW,
            )
            .unwrap_err();
        assert!(matches!(err, OracleError::NotAllowed(h) if h == unknown));
        assert_eq!(err.kind(), ErrorKind::Authorization);
        assert_eq!(err.code(), None);
    }

    #[test]
    fn test_same_handle_under_two_grants() {
        let f = fixture();
        let handle = allowed(&f, 4);

        let first = request(&f.owner, &[(handle, f.contract)], vec![f.contract], NOW);
        let second = request(&f.owner, &[(handle, f.contract)], vec![f.contract], NOW + 10);
        assert_eq!(
            f.oracle.verify_at(&first, NOW + 20).unwrap(),
            f.oracle.verify_at(&second, NOW + 20).unwrap()
        );
    }

    #[test]
    fn test_rejects_other_owner() {
        let f = fixture();
        let handle = allowed(&f, 4);

        let (mallory, _) = create_account_keypair(2);
        let req = request(&mallory, &[(handle, f.contract)], vec![f.contract], NOW);
        let err = f.oracle.verify_at(&req, NOW).unwrap_err();
        assert!(matches!(err, OracleError::NotAllowed(h) if h == handle));
        assert_eq!(err.kind(), ErrorKind::Authorization);
    }

    #[test]
    fn test_rejects_forged_signature() {
        let f = fixture();
        let handle = f.backend.constant(4).unwrap();
        let mut req = request(&f.owner, &[(handle, f.contract)], vec![f.contract], NOW);
        // Claim a later issue time than the one signed.
        req.issued_at += 1;
        let err = f.oracle.verify_at(&req, NOW).unwrap_err();
        assert!(matches!(err, OracleError::InvalidSignature));
    }

    #[test]
    fn test_rejects_expired_and_future_grants() {
        let f = fixture();
        let handle = allowed(&f, 4);
        let req = request(&f.owner, &[(handle, f.contract)], vec![f.contract], NOW);

        let later = NOW + GRANT_DURATION_DAYS * SECONDS_PER_DAY;
        assert!(matches!(
            f.oracle.verify_at(&req, later).unwrap_err(),
            OracleError::Expired { .. }
        ));
        assert!(f.oracle.verify_at(&req, later - 1).is_ok());

        // Within the skew allowance.
        assert!(f.oracle.verify_at(&req, NOW - 60).is_ok());
        assert!(matches!(
            f.oracle.verify_at(&req, NOW - 61).unwrap_err(),
            OracleError::NotYetValid { .. }
        ));
    }

    #[test]
    fn test_rejects_scope_mismatch() {
        let f = fixture();
        let handle = f.backend.constant(4).unwrap();
        let elsewhere = ledger_address(b"elsewhere");
        f.backend
            .allow(&handle, &f.owner.public_key(), &elsewhere)
            .unwrap();

        // Handle scoped to another ledger.
        let req = request(&f.owner, &[(handle, elsewhere)], vec![elsewhere], NOW);
        assert!(matches!(
            f.oracle.verify_at(&req, NOW).unwrap_err(),
            OracleError::ScopeMismatch(_)
        ));

        // Handle scope not covered by the signed contract list.
        let req = request(&f.owner, &[(handle, f.contract)], vec![elsewhere], NOW);
        assert!(matches!(
            f.oracle.verify_at(&req, NOW).unwrap_err(),
            OracleError::ScopeMismatch(_)
        ));
    }

    #[test]
    fn test_not_ready() {
        let f = fixture();
        let handle = allowed(&f, 4);
        let req = request(&f.owner, &[(handle, f.contract)], vec![f.contract], NOW);
        f.oracle.set_ready(false);
        let err = f.oracle.verify_at(&req, NOW).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Availability);
        f.oracle.set_ready(true);
        assert!(f.oracle.verify_at(&req, NOW).is_ok());
    }
}
