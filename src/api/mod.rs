// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

use axum::{
    http::{HeaderName, HeaderValue, Request},
    routing::{get, post},
    Router,
};
use tower::ServiceBuilder;
use tower_http::{
    cors::CorsLayer,
    request_id::{MakeRequestId, PropagateRequestIdLayer, RequestId, SetRequestIdLayer},
    trace::TraceLayer,
};
use utoipa::OpenApi;
use utoipa_swagger_ui::SwaggerUi;

use crate::{
    models::{
        DeployRequest, DeployResponse, MessageRequest, MessageResponse, NonceResponse, NonceValue,
        RegistryResponse,
    },
    state::AppState,
    storage::{BindingStatus, RelayKind, RelayRecord, RelayStatus},
};

pub mod health;
pub mod relay;

const REQUEST_ID_HEADER: &str = "x-request-id";

/// Fresh UUIDv4 per request, unless the caller sent one.
#[derive(Clone, Copy, Default)]
struct MakeRequestUuid;

impl MakeRequestId for MakeRequestUuid {
    fn make_request_id<B>(&mut self, _request: &Request<B>) -> Option<RequestId> {
        HeaderValue::from_str(&uuid::Uuid::new_v4().to_string())
            .ok()
            .map(RequestId::new)
    }
}

pub fn router(state: AppState) -> Router {
    let relay_routes = Router::new()
        .route("/deploy", post(relay::deploy))
        .route("/message", post(relay::message))
        .route("/proxy/{proxy}/nonce", get(relay::proxy_nonce))
        .route("/registry/{owner}", get(relay::registry))
        .route("/relays/{tx_hash}", get(relay::relay_status))
        .with_state(state.clone());

    let health_routes = Router::new()
        .route("/health", get(health::health))
        .route("/health/live", get(health::liveness))
        .route("/health/ready", get(health::readiness))
        .with_state(state);

    let request_id = HeaderName::from_static(REQUEST_ID_HEADER);

    Router::new()
        .nest("/server", relay_routes)
        .merge(health_routes)
        .merge(SwaggerUi::new("/docs").url("/api-doc/openapi.json", ApiDoc::openapi()))
        .layer(
            ServiceBuilder::new()
                .layer(SetRequestIdLayer::new(request_id.clone(), MakeRequestUuid))
                .layer(TraceLayer::new_for_http())
                .layer(PropagateRequestIdLayer::new(request_id)),
        )
        .layer(CorsLayer::permissive())
}

#[derive(OpenApi)]
#[openapi(
    paths(
        relay::deploy,
        relay::message,
        relay::proxy_nonce,
        relay::registry,
        relay::relay_status,
        health::health,
        health::liveness,
        health::readiness
    ),
    components(
        schemas(
            DeployRequest,
            DeployResponse,
            MessageRequest,
            MessageResponse,
            NonceValue,
            NonceResponse,
            RegistryResponse,
            RelayRecord,
            RelayStatus,
            RelayKind,
            BindingStatus,
            health::ReadyResponse,
            health::HealthChecks,
            health::HealthResponse
        )
    ),
    tags(
        (name = "Relay", description = "Gasless proxy deployment and signed message relay"),
        (name = "Queries", description = "Proxy nonce, registry and relay status"),
        (name = "Health", description = "Liveness and readiness checks")
    )
)]
struct ApiDoc;
