// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde::Serialize;

use crate::vault::{AuthError, VaultError};

#[derive(Debug)]
pub struct ApiError {
    pub status: StatusCode,
    pub message: String,
}

#[derive(Serialize)]
struct ErrorBody {
    error: String,
}

impl ApiError {
    pub fn new(status: StatusCode, message: impl Into<String>) -> Self {
        Self {
            status,
            message: message.into(),
        }
    }

    pub fn bad_request(message: impl Into<String>) -> Self {
        Self::new(StatusCode::BAD_REQUEST, message)
    }

    pub fn unauthorized(message: impl Into<String>) -> Self {
        Self::new(StatusCode::UNAUTHORIZED, message)
    }

    pub fn forbidden(message: impl Into<String>) -> Self {
        Self::new(StatusCode::FORBIDDEN, message)
    }

    pub fn service_unavailable(message: impl Into<String>) -> Self {
        Self::new(StatusCode::SERVICE_UNAVAILABLE, message)
    }

    pub fn internal(message: impl Into<String>) -> Self {
        Self::new(StatusCode::INTERNAL_SERVER_ERROR, message)
    }
}

impl From<VaultError> for ApiError {
    /// Auth failures keep their (deliberately terse) message; storage and
    /// crypto failures are logged server-side and surface as an opaque 500.
    fn from(err: VaultError) -> Self {
        match err {
            VaultError::Auth(auth) => match auth {
                AuthError::InvalidToken | AuthError::TokenRevoked => {
                    ApiError::unauthorized(auth.to_string())
                }
                AuthError::InvalidInvite | AuthError::InviteUsed | AuthError::InviteExpired => {
                    ApiError::forbidden(auth.to_string())
                }
            },
            other => {
                tracing::error!(error = %other, "vault backend failure");
                ApiError::internal("Internal server error")
            }
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let body = Json(ErrorBody {
            error: self.message,
        });
        (self.status, body).into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::body::to_bytes;

    #[test]
    fn constructors_set_status_and_message() {
        let unauthorized = ApiError::unauthorized("no token");
        assert_eq!(unauthorized.status, StatusCode::UNAUTHORIZED);
        assert_eq!(unauthorized.message, "no token");

        let forbidden = ApiError::forbidden("mismatch");
        assert_eq!(forbidden.status, StatusCode::FORBIDDEN);

        let unavailable = ApiError::service_unavailable("not configured");
        assert_eq!(unavailable.status, StatusCode::SERVICE_UNAVAILABLE);
    }

    #[test]
    fn invite_auth_errors_map_to_forbidden() {
        let err: ApiError = VaultError::Auth(AuthError::InviteUsed).into();
        assert_eq!(err.status, StatusCode::FORBIDDEN);
        assert_eq!(err.message, "Invite token already used");
    }

    #[test]
    fn token_auth_errors_map_to_unauthorized() {
        let err: ApiError = VaultError::Auth(AuthError::InvalidToken).into();
        assert_eq!(err.status, StatusCode::UNAUTHORIZED);
    }

    #[test]
    fn backend_failures_do_not_leak_details() {
        let err: ApiError = VaultError::Database("table entries is locked".to_string()).into();
        assert_eq!(err.status, StatusCode::INTERNAL_SERVER_ERROR);
        assert_eq!(err.message, "Internal server error");
    }

    #[tokio::test]
    async fn into_response_returns_json_body() {
        let response = ApiError::bad_request("bad data").into_response();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);

        let body_bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        let body = String::from_utf8(body_bytes.to_vec()).unwrap();
        assert_eq!(body, r#"{"error":"bad data"}"#);
    }
}
