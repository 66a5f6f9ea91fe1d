// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! Sealed single-file persistence for the client dataset.
//!
//! The whole [`StoreData`] document is serialized to JSON, sealed with the
//! passphrase envelope, and written via temp-file → fsync → atomic rename,
//! so a crash mid-save can never leave a half-written store behind. Every
//! save generates a fresh salt and nonce.

use std::fs::{self, File};
use std::io::Write;
use std::path::{Path, PathBuf};

use crate::crypto::envelope::{self, EncryptedContainer, DEFAULT_KDF_ITERATIONS};

use super::store_data::{StoreData, UserProfile, SCHEMA_VERSION};
use super::StorageError;

/// Handle to the encrypted store file. Callers serialize access; two
/// threads must never save the same path concurrently.
#[derive(Debug, Clone)]
pub struct LocalStore {
    path: PathBuf,
}

impl LocalStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn exists(&self) -> bool {
        self.path.exists()
    }

    /// Create a fresh store sealed under `passphrase` and persist it.
    pub fn initialize(
        &self,
        passphrase: &str,
        profile: Option<UserProfile>,
    ) -> Result<StoreData, StorageError> {
        let data = StoreData::new(profile);
        self.save(&data, passphrase)?;
        Ok(data)
    }

    /// Load and unseal the store.
    ///
    /// Fails with a distinct error for each cause: missing file, invalid
    /// container JSON, wrong passphrase / tampering, non-JSON plaintext,
    /// and unsupported schema version. Callers must re-prompt for the
    /// passphrase on failure rather than proceeding with an empty dataset.
    pub fn load(&self, passphrase: &str) -> Result<StoreData, StorageError> {
        let raw = match fs::read_to_string(&self.path) {
            Ok(raw) => raw,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                return Err(StorageError::NotFound)
            }
            Err(e) => return Err(StorageError::Io(e)),
        };

        let container: EncryptedContainer =
            serde_json::from_str(&raw).map_err(|_| StorageError::InvalidJson)?;
        let plaintext = envelope::decrypt_bytes(&container, passphrase)?;

        let document: serde_json::Value =
            serde_json::from_slice(&plaintext).map_err(|_| StorageError::InvalidJson)?;
        let version = document
            .get("schema_version")
            .and_then(serde_json::Value::as_i64)
            .ok_or(StorageError::InvalidJson)?;
        if version != SCHEMA_VERSION {
            return Err(StorageError::SchemaMismatch(version));
        }

        serde_json::from_value(document).map_err(|_| StorageError::InvalidJson)
    }

    /// Re-serialize, re-seal with a fresh salt/nonce, and atomically replace
    /// the store file.
    pub fn save(&self, data: &StoreData, passphrase: &str) -> Result<(), StorageError> {
        let plaintext = serde_json::to_vec(data).map_err(|_| StorageError::InvalidJson)?;
        let container =
            envelope::encrypt_bytes(&plaintext, passphrase, DEFAULT_KDF_ITERATIONS)?;
        let serialized =
            serde_json::to_string_pretty(&container).map_err(|_| StorageError::InvalidJson)?;

        if let Some(parent) = self.path.parent() {
            fs::create_dir_all(parent)?;
        }

        // Write to temp file first, then rename for atomicity.
        let temp_path = self.path.with_extension("tmp");
        {
            let mut file = File::create(&temp_path)?;
            file.write_all(serialized.as_bytes())?;
            file.flush()?;
            file.sync_all()?;
        }
        fs::rename(&temp_path, &self.path)?;
        Ok(())
    }
}
