// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

use axum::{
    extract::rejection::JsonRejection,
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde::Serialize;

use crate::relay::RelayError;

#[derive(Debug)]
pub struct ApiError {
    pub status: StatusCode,
    pub message: String,
    /// Machine-readable code, present for relay failures.
    pub code: Option<&'static str>,
}

#[derive(Serialize)]
struct ErrorBody {
    error: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    error_code: Option<&'static str>,
}

impl ApiError {
    pub fn new(status: StatusCode, message: impl Into<String>) -> Self {
        Self {
            status,
            message: message.into(),
            code: None,
        }
    }

    pub fn not_found(message: impl Into<String>) -> Self {
        Self::new(StatusCode::NOT_FOUND, message)
    }

    pub fn bad_request(message: impl Into<String>) -> Self {
        Self::new(StatusCode::BAD_REQUEST, message)
    }

    pub fn with_code(mut self, code: &'static str) -> Self {
        self.code = Some(code);
        self
    }

    /// Error of a read-only query: missing things are 404, an unreachable
    /// ledger is 503.
    pub fn from_query(err: RelayError) -> Self {
        let status = match err {
            RelayError::NotFound(_) => StatusCode::NOT_FOUND,
            RelayError::Unavailable(_) => StatusCode::SERVICE_UNAVAILABLE,
            _ => StatusCode::INTERNAL_SERVER_ERROR,
        };
        Self::new(status, err.to_string()).with_code(err.error_code())
    }

    /// Error of a relay submission route, where every failure is a 500.
    /// Malformed requests are tagged `invalid_request`.
    pub fn for_submission(mut self) -> Self {
        self.status = StatusCode::INTERNAL_SERVER_ERROR;
        self.code.get_or_insert(INVALID_REQUEST);
        self
    }
}

/// Code of a request body that did not parse.
pub const INVALID_REQUEST: &str = "invalid_request";

/// Relay submissions answer 500 with an `error_code`.
impl From<RelayError> for ApiError {
    fn from(err: RelayError) -> Self {
        Self::new(StatusCode::INTERNAL_SERVER_ERROR, err.to_string()).with_code(err.error_code())
    }
}

impl From<JsonRejection> for ApiError {
    fn from(rejection: JsonRejection) -> Self {
        Self::new(rejection.status(), rejection.body_text())
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let body = Json(ErrorBody {
            error: self.message,
            error_code: self.code,
        });
        (self.status, body).into_response()
    }
}
