// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! Relay endpoints: proxy deployment, signed message relay, and the
//! read-through queries clients use to build their next signature.

use axum::{
    extract::{rejection::JsonRejection, Path, State},
    Json,
};
use tracing::info;

use crate::{
    error::ApiError,
    models::{
        parse_address, parse_tx_hash, wire_address, DeployRequest, DeployResponse, MessageRequest,
        MessageResponse, NonceResponse, RegistryResponse,
    },
    state::AppState,
    storage::RelayRecord,
};

/// Deploy a UserProxy for an owner, or return the existing one.
///
/// The relayer pays for the deployment. A second request for the same owner
/// never creates a second proxy.
#[utoipa::path(
    post,
    path = "/server/deploy",
    tag = "Relay",
    request_body = DeployRequest,
    responses(
        (status = 200, description = "Proxy deployed, present, or pending", body = DeployResponse),
        (status = 500, description = "Malformed request or deployment failed (see error_code)")
    )
)]
pub async fn deploy(
    State(state): State<AppState>,
    payload: Result<Json<DeployRequest>, JsonRejection>,
) -> Result<Json<DeployResponse>, ApiError> {
    submit_deploy(&state, payload)
        .await
        .map_err(ApiError::for_submission)
}

async fn submit_deploy(
    state: &AppState,
    payload: Result<Json<DeployRequest>, JsonRejection>,
) -> Result<Json<DeployResponse>, ApiError> {
    let Json(request) = payload?;
    let owner = parse_address("ownerAddress", &request.owner_address)?;
    info!(owner = %owner, "Deploy requested");

    let outcome = state.submitter.submit_deploy(owner).await?;
    Ok(Json(DeployResponse::from_outcome(&outcome)))
}

/// Relay a signed SignedAccess authorization to its proxy.
///
/// Rejected signatures and stale nonces are caught by a dry run before any
/// gas is spent. `status` is `pending` when finality was not observed within
/// the configured wait.
#[utoipa::path(
    post,
    path = "/server/message",
    tag = "Relay",
    request_body = MessageRequest,
    responses(
        (status = 200, description = "Relayed", body = MessageResponse),
        (status = 500, description = "Malformed request or relay failure (see error_code)")
    )
)]
pub async fn message(
    State(state): State<AppState>,
    payload: Result<Json<MessageRequest>, JsonRejection>,
) -> Result<Json<MessageResponse>, ApiError> {
    submit_message(&state, payload)
        .await
        .map_err(ApiError::for_submission)
}

async fn submit_message(
    state: &AppState,
    payload: Result<Json<MessageRequest>, JsonRejection>,
) -> Result<Json<MessageResponse>, ApiError> {
    let Json(request) = payload?;
    let request = request.into_relay_request()?;
    let outcome = state.submitter.submit_relay(request).await?;
    Ok(Json(outcome.into()))
}

/// Current nonce and owner of a proxy.
#[utoipa::path(
    get,
    path = "/server/proxy/{proxy}/nonce",
    tag = "Queries",
    params(
        ("proxy" = String, Path, description = "Proxy address")
    ),
    responses(
        (status = 200, description = "Proxy state", body = NonceResponse),
        (status = 400, description = "Malformed address"),
        (status = 404, description = "No proxy at this address"),
        (status = 503, description = "Ledger unavailable")
    )
)]
pub async fn proxy_nonce(
    State(state): State<AppState>,
    Path(proxy): Path<String>,
) -> Result<Json<NonceResponse>, ApiError> {
    let proxy = parse_address("proxy", &proxy)?;
    let proxy_state = state
        .submitter
        .proxy_state(proxy)
        .await
        .map_err(ApiError::from_query)?;

    Ok(Json(NonceResponse {
        proxy: wire_address(&proxy),
        nonce: proxy_state.nonce.to_string(),
        owner: wire_address(&proxy_state.owner),
    }))
}

/// The proxy bound to an owner.
#[utoipa::path(
    get,
    path = "/server/registry/{owner}",
    tag = "Queries",
    params(
        ("owner" = String, Path, description = "Owner address")
    ),
    responses(
        (status = 200, description = "Binding", body = RegistryResponse),
        (status = 400, description = "Malformed address"),
        (status = 404, description = "No proxy registered for this owner")
    )
)]
pub async fn registry(
    State(state): State<AppState>,
    Path(owner): Path<String>,
) -> Result<Json<RegistryResponse>, ApiError> {
    let owner = parse_address("owner", &owner)?;
    let binding = state.submitter.lookup(&owner).map_err(ApiError::from_query)?;
    Ok(Json(binding.into()))
}

/// Stored record of a relayed transaction, for status polling.
#[utoipa::path(
    get,
    path = "/server/relays/{tx_hash}",
    tag = "Queries",
    params(
        ("tx_hash" = String, Path, description = "Transaction hash")
    ),
    responses(
        (status = 200, description = "Relay record", body = RelayRecord),
        (status = 400, description = "Malformed transaction hash"),
        (status = 404, description = "Unknown transaction")
    )
)]
pub async fn relay_status(
    State(state): State<AppState>,
    Path(tx_hash): Path<String>,
) -> Result<Json<RelayRecord>, ApiError> {
    let tx_hash = parse_tx_hash(&tx_hash)?;
    let record = state
        .submitter
        .relay_record(&tx_hash)
        .map_err(ApiError::from_query)?;
    Ok(Json(record))
}
