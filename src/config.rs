// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! # Runtime Configuration
//!
//! Configuration is read from the environment exactly once, at startup, into
//! an explicit [`VaultConfig`] struct. Nothing else in the process reads
//! environment variables at request time; the chosen backend is threaded
//! through handlers via [`crate::state::AppState`].
//!
//! ## Environment Variables
//!
//! | Variable | Description | Default |
//! |----------|-------------|---------|
//! | `VAULT_STORAGE_PATH` | SQLite database file; absent ⇒ volatile in-memory backend | unset |
//! | `VAULT_MASTER_KEY` | 32-byte key (base64 or hex); required with `VAULT_STORAGE_PATH` | unset |
//! | `VAULT_ADMIN_TOKEN` | Shared secret for `/admin/*`; absent ⇒ admin endpoints return 503 | unset |
//! | `VAULT_TLS_CERT` / `VAULT_TLS_KEY` | PEM certificate/key; both set ⇒ serve HTTPS | unset |
//! | `VAULT_HOST` | Server bind address | `0.0.0.0` |
//! | `VAULT_PORT` | Server bind port | `8000` |
//! | `VAULT_INVITE_TOKENS` | Comma-separated bootstrap invite tokens loaded at startup | empty |

use std::path::PathBuf;
use std::sync::Arc;

use thiserror::Error;

use crate::crypto::{self, CryptoError};
use crate::vault::{InMemoryVaultStore, SqliteVaultStore, VaultBackend, VaultError};

/// Configuration errors detected at startup.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("VAULT_MASTER_KEY must be set when VAULT_STORAGE_PATH is used")]
    MissingMasterKey,

    #[error(transparent)]
    Crypto(#[from] CryptoError),

    #[error("Invalid VAULT_PORT: {0}")]
    InvalidPort(String),

    #[error(transparent)]
    Backend(#[from] VaultError),
}

/// Resolved process configuration.
#[derive(Debug, Clone)]
pub struct VaultConfig {
    /// SQLite file path; `None` selects the volatile in-memory backend.
    pub storage_path: Option<PathBuf>,
    /// Parsed 32-byte master key; present iff `storage_path` is.
    pub master_key: Option<[u8; 32]>,
    pub admin_token: Option<String>,
    pub tls_cert: Option<PathBuf>,
    pub tls_key: Option<PathBuf>,
    pub host: String,
    pub port: u16,
    /// Invite tokens seeded into the backend at startup.
    pub bootstrap_invites: Vec<String>,
}

impl VaultConfig {
    /// Read and validate the environment.
    pub fn from_env() -> Result<Self, ConfigError> {
        let storage_path = non_empty(std::env::var("VAULT_STORAGE_PATH").ok()).map(PathBuf::from);

        let master_key = match &storage_path {
            Some(_) => {
                let raw = non_empty(std::env::var("VAULT_MASTER_KEY").ok())
                    .ok_or(ConfigError::MissingMasterKey)?;
                Some(crypto::load_master_key(&raw)?)
            }
            None => None,
        };

        let port_raw = std::env::var("VAULT_PORT").unwrap_or_else(|_| "8000".to_string());
        let port = port_raw
            .parse()
            .map_err(|_| ConfigError::InvalidPort(port_raw))?;

        let bootstrap_invites = std::env::var("VAULT_INVITE_TOKENS")
            .unwrap_or_default()
            .split(',')
            .map(str::trim)
            .filter(|token| !token.is_empty())
            .map(str::to_string)
            .collect();

        Ok(Self {
            storage_path,
            master_key,
            admin_token: non_empty(std::env::var("VAULT_ADMIN_TOKEN").ok()),
            tls_cert: non_empty(std::env::var("VAULT_TLS_CERT").ok()).map(PathBuf::from),
            tls_key: non_empty(std::env::var("VAULT_TLS_KEY").ok()).map(PathBuf::from),
            host: std::env::var("VAULT_HOST").unwrap_or_else(|_| "0.0.0.0".to_string()),
            port,
            bootstrap_invites,
        })
    }

    /// Instantiate the backend this configuration selects and seed the
    /// bootstrap invites into it.
    pub fn build_backend(&self) -> Result<Arc<dyn VaultBackend>, ConfigError> {
        let backend: Arc<dyn VaultBackend> = match (&self.storage_path, &self.master_key) {
            (Some(path), Some(master_key)) => {
                Arc::new(SqliteVaultStore::open(path, *master_key)?)
            }
            _ => Arc::new(InMemoryVaultStore::new()),
        };
        backend.load_bootstrap_invites(&self.bootstrap_invites)?;
        Ok(backend)
    }

    /// Whether both TLS paths are configured.
    pub fn tls_enabled(&self) -> bool {
        self.tls_cert.is_some() && self.tls_key.is_some()
    }
}

fn non_empty(value: Option<String>) -> Option<String> {
    value.filter(|v| !v.trim().is_empty())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn base_config() -> VaultConfig {
        VaultConfig {
            storage_path: None,
            master_key: None,
            admin_token: None,
            tls_cert: None,
            tls_key: None,
            host: "127.0.0.1".to_string(),
            port: 8000,
            bootstrap_invites: vec![],
        }
    }

    #[test]
    fn memory_backend_without_storage_path() {
        let config = VaultConfig {
            bootstrap_invites: vec!["abc123".to_string()],
            ..base_config()
        };
        let backend = config.build_backend().unwrap();
        // The seeded invite is redeemable exactly once.
        backend.consume_invite("abc123").unwrap();
        assert!(backend.consume_invite("abc123").is_err());
    }

    #[test]
    fn sqlite_backend_with_storage_path() {
        let dir = tempfile::tempdir().unwrap();
        let config = VaultConfig {
            storage_path: Some(dir.path().join("vault.db")),
            master_key: Some([9; 32]),
            ..base_config()
        };
        let backend = config.build_backend().unwrap();
        assert_eq!(backend.count_entries().unwrap(), 0);
    }

    #[test]
    fn tls_requires_both_paths() {
        let mut config = base_config();
        assert!(!config.tls_enabled());
        config.tls_cert = Some(PathBuf::from("cert.pem"));
        assert!(!config.tls_enabled());
        config.tls_key = Some(PathBuf::from("key.pem"));
        assert!(config.tls_enabled());
    }
}
