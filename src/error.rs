// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! HTTP-facing error type.
//!
//! Every failure leaves the service as `{ "success": false, "message": ... }`.
//! Uniqueness violations and login failures use 400, not 409/401.

use axum::{
    extract::rejection::{JsonRejection, QueryRejection},
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};

use crate::{auth::AuthError, models::MessageResponse, storage::StoreError};

/// Message for every 500; details go to the log only.
const SERVER_ERROR_MESSAGE: &str = "Server Error";

/// Message for a store call that timed out or was abandoned.
pub const STORE_UNAVAILABLE_MESSAGE: &str = "Store unavailable";

#[derive(Debug)]
pub struct ApiError {
    pub status: StatusCode,
    pub message: String,
}

impl ApiError {
    pub fn new(status: StatusCode, message: impl Into<String>) -> Self {
        Self {
            status,
            message: message.into(),
        }
    }

    /// Missing or malformed input.
    pub fn validation(message: impl Into<String>) -> Self {
        Self::new(StatusCode::BAD_REQUEST, message)
    }

    pub fn not_found(message: impl Into<String>) -> Self {
        Self::new(StatusCode::NOT_FOUND, message)
    }

    /// Uniqueness violation.
    pub fn conflict(message: impl Into<String>) -> Self {
        Self::new(StatusCode::BAD_REQUEST, message)
    }

    /// Login failure. The message is identical for unknown email and wrong password.
    pub fn invalid_credentials() -> Self {
        Self::new(StatusCode::BAD_REQUEST, "Invalid credentials")
    }

    /// Unexpected failure. `detail` is logged, never returned.
    pub fn internal(detail: impl std::fmt::Display) -> Self {
        tracing::error!(error = %detail, "Internal server error");
        Self::new(StatusCode::INTERNAL_SERVER_ERROR, SERVER_ERROR_MESSAGE)
    }

    /// Store did not answer within the configured timeout.
    pub fn unavailable(message: impl Into<String>) -> Self {
        Self::new(StatusCode::SERVICE_UNAVAILABLE, message)
    }
}

impl From<StoreError> for ApiError {
    fn from(err: StoreError) -> Self {
        match err {
            StoreError::NotFound(message) => Self::not_found(message),
            StoreError::Conflict(message) => Self::conflict(message),
            StoreError::Invalid(message) => Self::validation(message),
            StoreError::Abandoned => Self::unavailable(STORE_UNAVAILABLE_MESSAGE),
            other => Self::internal(other),
        }
    }
}

impl From<AuthError> for ApiError {
    fn from(err: AuthError) -> Self {
        match err {
            AuthError::InternalError(detail) => Self::internal(detail),
            other => {
                tracing::debug!(code = other.error_code(), "Request rejected: {other}");
                Self::new(other.status_code(), other.message())
            }
        }
    }
}

impl From<JsonRejection> for ApiError {
    fn from(rejection: JsonRejection) -> Self {
        tracing::debug!(error = %rejection.body_text(), "Rejected JSON body");
        Self::validation(rejection.body_text())
    }
}

impl From<QueryRejection> for ApiError {
    fn from(rejection: QueryRejection) -> Self {
        tracing::debug!(error = %rejection.body_text(), "Rejected query string");
        Self::validation(rejection.body_text())
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        (self.status, Json(MessageResponse::failure(self.message))).into_response()
    }
}
