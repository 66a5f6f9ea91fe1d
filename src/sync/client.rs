// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! HTTP transport to a vault.
//!
//! URL scheme decides the trust model: `https://` with default CA roots,
//! `https://` pinned to a supplied PEM certificate for self-signed vaults,
//! or `http://` only behind the explicit insecure override. Any TLS failure
//! surfaces as [`SyncError::TlsVerification`] with a remediation hint
//! instead of a generic transport error.

use std::path::PathBuf;
use std::time::Duration;

use reqwest::Certificate;
use serde::{de::DeserializeOwned, Serialize};

use crate::models::{
    AdminOverviewResponse, CreateInviteRequest, CreateInviteResponse, InviteRequest,
    InviteResponse, SyncPullRequest, SyncPullResponse, SyncPushRequest, SyncPushResponse,
};

use super::SyncError;

const USER_TOKEN_HEADER: &str = "X-User-Token";
const ADMIN_TOKEN_HEADER: &str = "X-Admin-Token";

/// Request timeout for push/pull/invite calls.
const REQUEST_TIMEOUT: Duration = Duration::from_secs(15);
/// Shorter timeout for the health probe.
const HEALTH_TIMEOUT: Duration = Duration::from_secs(10);

/// How to reach a vault, as persisted in the device's sync settings.
#[derive(Debug, Clone, Default)]
pub struct VaultConnection {
    pub vault_url: String,
    /// PEM certificate to pin for self-signed vaults.
    pub vault_cert_path: Option<PathBuf>,
    /// Explicit opt-in to plain HTTP (local testing only).
    pub allow_insecure_http: bool,
}

/// HTTP client for one vault.
pub struct VaultClient {
    client: reqwest::Client,
    base_url: String,
}

impl VaultClient {
    /// Build a client, validating the URL scheme and loading any pinned
    /// certificate up front so misconfiguration fails before the first
    /// request.
    pub fn new(connection: &VaultConnection) -> Result<Self, SyncError> {
        let base_url = connection.vault_url.trim_end_matches('/').to_string();

        let mut builder = reqwest::Client::builder().timeout(REQUEST_TIMEOUT);
        if base_url.starts_with("https://") {
            if let Some(cert_path) = &connection.vault_cert_path {
                let pem = std::fs::read(cert_path)
                    .map_err(|e| SyncError::Certificate(e.to_string()))?;
                let certificate = Certificate::from_pem(&pem)
                    .map_err(|e| SyncError::Certificate(e.to_string()))?;
                builder = builder.add_root_certificate(certificate);
            }
        } else if base_url.starts_with("http://") {
            if !connection.allow_insecure_http {
                return Err(SyncError::InsecureHttpDisabled);
            }
        } else {
            return Err(SyncError::InvalidUrl);
        }

        let client = builder
            .build()
            .map_err(|e| SyncError::Transport(e.to_string()))?;
        Ok(Self { client, base_url })
    }

    /// Redeem an invite token for a user token.
    pub async fn exchange_invite(
        &self,
        request: &InviteRequest,
    ) -> Result<InviteResponse, SyncError> {
        self.post_json("/auth/invite", request, None).await
    }

    /// Push changed entries.
    pub async fn push_changes(
        &self,
        user_token: &str,
        request: &SyncPushRequest,
    ) -> Result<SyncPushResponse, SyncError> {
        self.post_json("/sync/push", request, Some((USER_TOKEN_HEADER, user_token)))
            .await
    }

    /// Pull entries changed after the cursor.
    pub async fn pull_changes(
        &self,
        user_token: &str,
        request: &SyncPullRequest,
    ) -> Result<SyncPullResponse, SyncError> {
        self.post_json("/sync/pull", request, Some((USER_TOKEN_HEADER, user_token)))
            .await
    }

    /// Probe the vault's health endpoint.
    pub async fn check_health(&self) -> Result<serde_json::Value, SyncError> {
        let url = format!("{}/health", self.base_url);
        let response = self
            .client
            .get(&url)
            .timeout(HEALTH_TIMEOUT)
            .send()
            .await
            .map_err(map_transport_error)?;
        parse_response(response).await
    }

    /// Mint an invite token (admin).
    pub async fn create_invite(
        &self,
        admin_token: &str,
        expires_in_days: Option<i64>,
    ) -> Result<CreateInviteResponse, SyncError> {
        self.post_json(
            "/admin/invites",
            &CreateInviteRequest { expires_in_days },
            Some((ADMIN_TOKEN_HEADER, admin_token)),
        )
        .await
    }

    /// Fetch the admin overview.
    pub async fn admin_overview(
        &self,
        admin_token: &str,
    ) -> Result<AdminOverviewResponse, SyncError> {
        let url = format!("{}/admin/overview", self.base_url);
        let response = self
            .client
            .get(&url)
            .header(ADMIN_TOKEN_HEADER, admin_token)
            .send()
            .await
            .map_err(map_transport_error)?;
        parse_response(response).await
    }

    async fn post_json<T: Serialize, R: DeserializeOwned>(
        &self,
        path: &str,
        body: &T,
        header: Option<(&str, &str)>,
    ) -> Result<R, SyncError> {
        let url = format!("{}{}", self.base_url, path);
        let mut request = self.client.post(&url).json(body);
        if let Some((name, value)) = header {
            request = request.header(name, value);
        }
        let response = request.send().await.map_err(map_transport_error)?;
        parse_response(response).await
    }
}

/// Distinguish TLS failures (which carry a remediation hint) from ordinary
/// connectivity problems.
fn map_transport_error(err: reqwest::Error) -> SyncError {
    let mut chain = err.to_string();
    let mut source = std::error::Error::source(&err);
    while let Some(cause) = source {
        chain.push_str(": ");
        chain.push_str(&cause.to_string());
        source = cause.source();
    }

    let lowered = chain.to_lowercase();
    if lowered.contains("certificate") || lowered.contains("tls") || lowered.contains("handshake")
    {
        SyncError::TlsVerification
    } else {
        SyncError::Transport(chain)
    }
}

async fn parse_response<R: DeserializeOwned>(response: reqwest::Response) -> Result<R, SyncError> {
    let status = response.status();
    if !status.is_success() {
        let message = response
            .json::<serde_json::Value>()
            .await
            .ok()
            .and_then(|body| body.get("error").and_then(|v| v.as_str()).map(String::from))
            .unwrap_or_else(|| format!("HTTP error {}", status.as_u16()));
        return Err(SyncError::Http {
            status: status.as_u16(),
            message,
        });
    }
    response
        .json()
        .await
        .map_err(|e| SyncError::InvalidResponse(e.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn https_without_pinning_builds() {
        let connection = VaultConnection {
            vault_url: "https://vault.example.com/".to_string(),
            ..Default::default()
        };
        let client = VaultClient::new(&connection).unwrap();
        assert_eq!(client.base_url, "https://vault.example.com");
    }

    #[test]
    fn plain_http_requires_explicit_override() {
        let connection = VaultConnection {
            vault_url: "http://127.0.0.1:8000".to_string(),
            ..Default::default()
        };
        assert!(matches!(
            VaultClient::new(&connection),
            Err(SyncError::InsecureHttpDisabled)
        ));

        let allowed = VaultConnection {
            allow_insecure_http: true,
            ..connection
        };
        assert!(VaultClient::new(&allowed).is_ok());
    }

    #[test]
    fn unknown_scheme_is_rejected() {
        let connection = VaultConnection {
            vault_url: "ftp://vault.example.com".to_string(),
            ..Default::default()
        };
        assert!(matches!(
            VaultClient::new(&connection),
            Err(SyncError::InvalidUrl)
        ));
    }

    #[test]
    fn missing_pinned_certificate_fails_up_front() {
        let connection = VaultConnection {
            vault_url: "https://vault.example.com".to_string(),
            vault_cert_path: Some(PathBuf::from("/nonexistent/vault.pem")),
            allow_insecure_http: false,
        };
        assert!(matches!(
            VaultClient::new(&connection),
            Err(SyncError::Certificate(_))
        ));
    }

    #[test]
    fn garbage_pinned_certificate_fails_up_front() {
        let dir = tempfile::tempdir().unwrap();
        let cert_path = dir.path().join("vault.pem");
        std::fs::write(&cert_path, "not a certificate").unwrap();

        let connection = VaultConnection {
            vault_url: "https://vault.example.com".to_string(),
            vault_cert_path: Some(cert_path),
            allow_insecure_http: false,
        };
        assert!(matches!(
            VaultClient::new(&connection),
            Err(SyncError::Certificate(_))
        ));
    }
}
