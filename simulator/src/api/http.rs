use axum::{
    body::Bytes,
    extract::{Path, State as AxumState},
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use commonware_codec::{DecodeExt, Encode};
use commonware_utils::hex;
use encwars_types::{
    decode_public_key, execution::Account, execution::Transaction, DecryptionRequest, ErrorKind,
    ErrorResponse,
};
use serde::Serialize;
use std::sync::Arc;

use crate::{OracleError, Simulator, SubmitError};

#[derive(Serialize)]
struct HealthzResponse {
    ok: bool,
}

fn error_response(status: StatusCode, kind: ErrorKind, error: impl ToString) -> Response {
    error_response_with_code(status, kind, error, None)
}

fn error_response_with_code(
    status: StatusCode,
    kind: ErrorKind,
    error: impl ToString,
    code: Option<&str>,
) -> Response {
    (
        status,
        Json(ErrorResponse {
            kind,
            error: error.to_string(),
            code: code.map(str::to_string),
        }),
    )
        .into_response()
}

pub(super) async fn healthz() -> Response {
    Json(HealthzResponse { ok: true }).into_response()
}

pub(super) async fn address(AxumState(simulator): AxumState<Arc<Simulator>>) -> Response {
    hex(simulator.address().as_ref()).into_response()
}

pub(super) async fn submit(
    AxumState(simulator): AxumState<Arc<Simulator>>,
    body: Bytes,
) -> Response {
    let transaction = match Transaction::decode(body.as_ref()) {
        Ok(transaction) => transaction,
        Err(err) => {
            tracing::warn!(?err, "failed to decode transaction");
            return error_response(StatusCode::BAD_REQUEST, ErrorKind::Validation, err);
        }
    };

    match simulator.ledger().submit(transaction).await {
        Ok(events) => (StatusCode::OK, events.encode().to_vec()).into_response(),
        Err(SubmitError::Rejected(err)) => {
            error_response(StatusCode::CONFLICT, err.kind(), err)
        }
        Err(err @ SubmitError::InvalidSignature) => {
            error_response(StatusCode::BAD_REQUEST, ErrorKind::Authorization, err)
        }
        Err(err @ SubmitError::Dropped) => {
            error_response(StatusCode::BAD_REQUEST, ErrorKind::State, err)
        }
        Err(err @ SubmitError::Unavailable(_)) => {
            tracing::error!(error = %err, "submission failed");
            error_response(StatusCode::SERVICE_UNAVAILABLE, ErrorKind::Availability, err)
        }
    }
}

pub(super) async fn get_account(
    AxumState(simulator): AxumState<Arc<Simulator>>,
    Path(owner): Path<String>,
) -> Response {
    let Some(owner) = decode_public_key(&owner) else {
        return StatusCode::BAD_REQUEST.into_response();
    };
    match simulator.ledger().nonce(&owner).await {
        Ok(nonce) => (StatusCode::OK, Account { nonce }.encode().to_vec()).into_response(),
        Err(err) => error_response(StatusCode::SERVICE_UNAVAILABLE, ErrorKind::Availability, err),
    }
}

pub(super) async fn get_session(
    AxumState(simulator): AxumState<Arc<Simulator>>,
    Path(owner): Path<String>,
) -> Response {
    let Some(owner) = decode_public_key(&owner) else {
        return StatusCode::BAD_REQUEST.into_response();
    };
    match simulator.ledger().session(&owner).await {
        Ok(session) => (StatusCode::OK, session.encode().to_vec()).into_response(),
        Err(err) => error_response(StatusCode::SERVICE_UNAVAILABLE, ErrorKind::Availability, err),
    }
}

pub(super) async fn get_meta(
    AxumState(simulator): AxumState<Arc<Simulator>>,
    Path(owner): Path<String>,
) -> Response {
    let Some(owner) = decode_public_key(&owner) else {
        return StatusCode::BAD_REQUEST.into_response();
    };
    match simulator.ledger().meta(&owner).await {
        Ok(meta) => (StatusCode::OK, meta.encode().to_vec()).into_response(),
        Err(err) => error_response(StatusCode::SERVICE_UNAVAILABLE, ErrorKind::Availability, err),
    }
}

pub(super) async fn decrypt(
    AxumState(simulator): AxumState<Arc<Simulator>>,
    Json(request): Json<DecryptionRequest>,
) -> Response {
    match simulator.oracle().verify(&request) {
        Ok(response) => Json(response).into_response(),
        Err(err) => {
            let status = match &err {
                OracleError::Malformed(_) => StatusCode::BAD_REQUEST,
                OracleError::NotReady => StatusCode::SERVICE_UNAVAILABLE,
                _ => StatusCode::FORBIDDEN,
            };
            tracing::warn!(error = %err, status = status.as_u16(), "decryption refused");
            error_response_with_code(status, err.kind(), &err, err.code())
        }
    }
}
