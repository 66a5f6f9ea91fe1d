// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! # Vault Record Store
//!
//! Server-side persistence behind the sync protocol: users, devices,
//! single-use invite tokens, bearer user tokens, and one encrypted record
//! per `(user, entry)` pair.
//!
//! Two backends implement [`VaultBackend`]:
//!
//! - [`memory::InMemoryVaultStore`] — volatile, for development and tests
//! - [`sqlite::SqliteVaultStore`] — durable, every entry row sealed under an
//!   HKDF per-user key so the database file at rest never reveals content
//!
//! The backend is chosen once at startup from [`crate::config::VaultConfig`]
//! and threaded through handlers as `Arc<dyn VaultBackend>`; nothing reads
//! the environment at request time.

pub mod conflict;
pub mod memory;
pub mod sqlite;

pub use conflict::should_accept;
pub use memory::InMemoryVaultStore;
pub use sqlite::SqliteVaultStore;

use base64::{engine::general_purpose::URL_SAFE_NO_PAD, Engine};
use chrono::{DateTime, Utc};
use rand::RngCore;
use sha2::{Digest, Sha256};
use thiserror::Error;
use uuid::Uuid;

use crate::crypto::CryptoError;
use crate::models::{DeviceSummary, InviteSummary, MeasurementEntry, UserSummary};

/// Authentication failures. All of these map to 401/403 at the HTTP layer;
/// messages stay generic enough not to leak which check tripped beyond what
/// the client needs to act on.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum AuthError {
    #[error("Invalid invite token")]
    InvalidInvite,

    #[error("Invite token already used")]
    InviteUsed,

    #[error("Invite token expired")]
    InviteExpired,

    #[error("Invalid user token")]
    InvalidToken,

    #[error("User token revoked")]
    TokenRevoked,
}

/// Errors raised by vault backends.
#[derive(Debug, Error)]
pub enum VaultError {
    #[error(transparent)]
    Auth(#[from] AuthError),

    #[error(transparent)]
    Crypto(#[from] CryptoError),

    #[error("Database error: {0}")]
    Database(String),
}

/// Abstract vault persistence.
///
/// Registration operations are idempotent: re-registering a known device or
/// user updates `last_seen_at` and never errors on "already exists".
pub trait VaultBackend: Send + Sync {
    /// Seed invite tokens from configuration. Already-known hashes are
    /// left untouched, so restarts do not resurrect used invites.
    fn load_bootstrap_invites(&self, tokens: &[String]) -> Result<(), VaultError>;

    /// Create the user row if it does not exist yet.
    fn ensure_user(&self, user_id: Uuid) -> Result<(), VaultError>;

    /// Upsert a device registration. A `None` name keeps any stored name.
    fn record_device(
        &self,
        user_id: Uuid,
        device_id: &str,
        device_name: Option<&str>,
    ) -> Result<(), VaultError>;

    /// Refresh a device's `last_seen_at` without changing its name.
    fn touch_device(&self, user_id: Uuid, device_id: &str) -> Result<(), VaultError>;

    /// Redeem an invite exactly once. Expiry is checked before the token is
    /// marked used, so racing on an expired-but-unmarked token still fails.
    fn consume_invite(&self, invite_token: &str) -> Result<(), VaultError>;

    /// Mint a bearer token for `user_id`. Only the hash is stored; the raw
    /// value is returned exactly once and is never retrievable again.
    fn issue_user_token(&self, user_id: Uuid) -> Result<String, VaultError>;

    /// Resolve a raw bearer token to its user, rejecting revoked tokens.
    fn authenticate(&self, user_token: &str) -> Result<Uuid, VaultError>;

    /// Apply pushed entries through conflict resolution; returns how many
    /// were accepted. Losing entries are dropped silently. Touches the
    /// source device.
    fn apply_changes(
        &self,
        user_id: Uuid,
        changes: &[MeasurementEntry],
        source_device_id: &str,
    ) -> Result<usize, VaultError>;

    /// Entries with `updated_at > since` (all when `since` is `None`),
    /// decrypted, ascending by `updated_at` so an interrupted reader can
    /// resume from the last timestamp it applied.
    fn changes_since(
        &self,
        user_id: Uuid,
        since: Option<DateTime<Utc>>,
    ) -> Result<Vec<MeasurementEntry>, VaultError>;

    // ========== Admin introspection ==========

    fn list_users(&self) -> Result<Vec<UserSummary>, VaultError>;

    fn list_devices(&self) -> Result<Vec<DeviceSummary>, VaultError>;

    fn list_invites(&self) -> Result<Vec<InviteSummary>, VaultError>;

    fn count_entries(&self) -> Result<usize, VaultError>;

    /// Mint a new invite token; returns the raw value exactly once.
    fn create_invite_token(
        &self,
        expires_at: Option<DateTime<Utc>>,
    ) -> Result<String, VaultError>;
}

/// SHA-256 hex digest — the only form in which tokens are ever stored.
pub fn hash_token(token: &str) -> String {
    let digest = Sha256::digest(token.as_bytes());
    digest.iter().map(|b| format!("{b:02x}")).collect()
}

/// 32 random bytes, hex-encoded: the raw user bearer token.
pub(crate) fn generate_user_token() -> String {
    let mut bytes = [0u8; 32];
    rand::rngs::OsRng.fill_bytes(&mut bytes);
    bytes.iter().map(|b| format!("{b:02x}")).collect()
}

/// 16 random bytes, URL-safe base64: the raw invite token.
pub(crate) fn generate_invite_token() -> String {
    let mut bytes = [0u8; 16];
    rand::rngs::OsRng.fill_bytes(&mut bytes);
    URL_SAFE_NO_PAD.encode(bytes)
}
