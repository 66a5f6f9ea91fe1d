// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! # Local Store
//!
//! Client-side persistence: one user's full dataset (profiles + entries) as
//! a single JSON document, sealed with the passphrase envelope from
//! [`crate::crypto::envelope`] and written atomically.
//!
//! ## Storage Layout
//!
//! The store is one file on disk containing the encrypted container
//! (`{version, kdf, cipher}`). The plaintext inside is the serialized
//! [`StoreData`] document. Schema version is checked on every load and a
//! mismatch is a hard failure — never an auto-migration.

pub mod local_store;
pub mod store_data;

pub use local_store::LocalStore;
pub use store_data::{
    LengthUnit, StoreData, SyncSettings, UserProfile, WeightUnit, SCHEMA_VERSION,
};

use thiserror::Error;

use crate::crypto::CryptoError;

/// Errors raised by the local store.
#[derive(Debug, Error)]
pub enum StorageError {
    /// The store file does not exist yet.
    #[error("Encrypted store not found")]
    NotFound,

    /// The file, container, or decrypted payload is not the expected JSON.
    #[error("Encrypted store is not valid JSON")]
    InvalidJson,

    /// The document declares a schema version this build does not support.
    #[error("Unsupported schema version: {0}")]
    SchemaMismatch(i64),

    /// Sealing or unsealing failed (wrong passphrase, tampering).
    #[error(transparent)]
    Crypto(#[from] CryptoError),

    /// Underlying filesystem failure.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}
