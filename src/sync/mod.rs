// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! # Sync Client
//!
//! Device-side half of the protocol: the [`client::VaultClient`] transport
//! (HTTPS with default roots, HTTPS pinned to a self-signed vault
//! certificate, or plain HTTP behind an explicit insecure override) and the
//! [`engine`] that runs a push→pull→merge round against the local store.

pub mod client;
pub mod engine;

pub use client::{VaultClient, VaultConnection};
pub use engine::{run_sync_round, SyncOutcome};

use thiserror::Error;

/// Client-side sync failures. TLS problems get their own variant so the UI
/// can tell the user exactly what to do about them.
#[derive(Debug, Error)]
pub enum SyncError {
    #[error("Vault URL must start with http:// or https://")]
    InvalidUrl,

    #[error("Insecure HTTP is disabled. Use HTTPS or allow insecure HTTP in settings.")]
    InsecureHttpDisabled,

    #[error("TLS verification failed. Import the vault certificate and try again.")]
    TlsVerification,

    #[error("Could not read the pinned vault certificate: {0}")]
    Certificate(String),

    #[error("Vault returned HTTP {status}: {message}")]
    Http { status: u16, message: String },

    #[error("Could not reach the vault: {0}")]
    Transport(String),

    #[error("Unexpected response from the vault: {0}")]
    InvalidResponse(String),

    #[error("Sync is not configured: {0}")]
    NotConfigured(String),
}
