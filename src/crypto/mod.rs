// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! # Envelope Crypto
//!
//! Two structurally identical authenticated-encryption schemes share this
//! module:
//!
//! - [`envelope`] — the client-side container: PBKDF2-SHA256 key derivation
//!   from a user passphrase, AES-256-GCM sealing, and a self-describing JSON
//!   envelope that records its own KDF and cipher parameters so the file is
//!   portable across machines.
//! - [`master`] — the server-side variant: one configured master key,
//!   HKDF-SHA256 per-user sub-keys, and compact base64 payload blobs stored
//!   one per `(user, entry)` row.
//!
//! Both fail closed: an unrecognized container version or algorithm name is
//! an error, never a downgrade.

pub mod envelope;
pub mod master;

pub use envelope::{decrypt_bytes, derive_key, encrypt_bytes, EncryptedContainer};
pub use master::{decrypt_payload, derive_user_key, encrypt_payload, load_master_key};

use thiserror::Error;

/// Errors raised by envelope encryption and key derivation.
#[derive(Debug, Error)]
pub enum CryptoError {
    /// Key derivation refused an empty passphrase.
    #[error("Passphrase must not be empty")]
    EmptyPassphrase,

    /// The container is structurally broken (missing fields, bad base64).
    #[error("Invalid encrypted container format")]
    InvalidContainer,

    /// The container claims a version this build does not understand.
    #[error("Unsupported container version: {0}")]
    UnsupportedVersion(i64),

    /// The container names a KDF or cipher this build does not implement.
    #[error("Unsupported encryption parameters")]
    UnsupportedAlgorithm,

    /// `VAULT_MASTER_KEY` is absent or not a 32-byte base64/hex value.
    #[error("{0}")]
    InvalidMasterKey(String),

    /// AEAD tag mismatch: wrong key or tampered ciphertext.
    #[error("Incorrect passphrase or corrupted data")]
    DecryptionFailed,

    /// AEAD encryption failed.
    #[error("Encryption failed: {0}")]
    EncryptionFailed(String),
}

/// Result alias for crypto operations.
pub type Result<T> = std::result::Result<T, CryptoError>;
