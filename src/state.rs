// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

use std::sync::Arc;

use crate::vault::{InMemoryVaultStore, VaultBackend};

/// Shared application state handed to every handler.
///
/// The backend is selected once at startup ([`crate::config::VaultConfig`])
/// and never re-read from the environment; handlers are stateless over it.
#[derive(Clone)]
pub struct AppState {
    pub backend: Arc<dyn VaultBackend>,
    /// Shared secret for `/admin/*`; `None` degrades admin endpoints to 503.
    pub admin_token: Option<String>,
}

impl AppState {
    pub fn new(backend: Arc<dyn VaultBackend>, admin_token: Option<String>) -> Self {
        Self {
            backend,
            admin_token,
        }
    }
}

impl Default for AppState {
    /// Volatile backend, no admin token. Used by tests.
    fn default() -> Self {
        Self::new(Arc::new(InMemoryVaultStore::new()), None)
    }
}
