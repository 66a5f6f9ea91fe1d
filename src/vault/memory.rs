// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! Volatile in-memory vault backend.
//!
//! Holds everything in typed maps behind one lock; each trait call is a
//! single critical section, which gives `apply_changes` the
//! read-decide-write atomicity the protocol needs. Records live in process
//! memory only, so there is no at-rest encryption here — that is the SQLite
//! backend's job.

use std::collections::HashMap;
use std::sync::Mutex;

use chrono::{DateTime, Utc};
use uuid::Uuid;

use crate::models::{DeviceSummary, InviteSummary, MeasurementEntry, UserSummary};

use super::{
    generate_invite_token, generate_user_token, hash_token, should_accept, AuthError,
    VaultBackend, VaultError,
};

#[derive(Debug, Clone)]
struct InviteInfo {
    created_at: DateTime<Utc>,
    expires_at: Option<DateTime<Utc>>,
    used_at: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone)]
struct TokenInfo {
    user_id: Uuid,
    revoked_at: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone)]
struct UserInfo {
    created_at: DateTime<Utc>,
    last_seen_at: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone)]
struct DeviceInfo {
    user_id: Uuid,
    device_name: Option<String>,
    created_at: DateTime<Utc>,
    last_seen_at: Option<DateTime<Utc>>,
}

#[derive(Debug, Default)]
struct Inner {
    invites: HashMap<String, InviteInfo>,
    user_tokens: HashMap<String, TokenInfo>,
    users: HashMap<Uuid, UserInfo>,
    devices: HashMap<String, DeviceInfo>,
    entries: HashMap<Uuid, HashMap<Uuid, MeasurementEntry>>,
}

/// Volatile backend used when no `VAULT_STORAGE_PATH` is configured.
#[derive(Debug, Default)]
pub struct InMemoryVaultStore {
    inner: Mutex<Inner>,
}

impl InMemoryVaultStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> Result<std::sync::MutexGuard<'_, Inner>, VaultError> {
        self.inner
            .lock()
            .map_err(|_| VaultError::Database("store lock poisoned".to_string()))
    }
}

impl Inner {
    fn ensure_user(&mut self, user_id: Uuid) {
        self.users.entry(user_id).or_insert_with(|| UserInfo {
            created_at: Utc::now(),
            last_seen_at: None,
        });
    }

    fn record_device(&mut self, user_id: Uuid, device_id: &str, device_name: Option<&str>) {
        self.ensure_user(user_id);
        let now = Utc::now();
        match self.devices.get_mut(device_id) {
            Some(existing) => {
                if let Some(name) = device_name {
                    existing.device_name = Some(name.to_string());
                }
                existing.last_seen_at = Some(now);
            }
            None => {
                self.devices.insert(
                    device_id.to_string(),
                    DeviceInfo {
                        user_id,
                        device_name: device_name.map(str::to_string),
                        created_at: now,
                        last_seen_at: Some(now),
                    },
                );
            }
        }
        if let Some(user) = self.users.get_mut(&user_id) {
            user.last_seen_at = Some(now);
        }
    }
}

impl VaultBackend for InMemoryVaultStore {
    fn load_bootstrap_invites(&self, tokens: &[String]) -> Result<(), VaultError> {
        let mut inner = self.lock()?;
        for token in tokens {
            inner
                .invites
                .entry(hash_token(token))
                .or_insert_with(|| InviteInfo {
                    created_at: Utc::now(),
                    expires_at: None,
                    used_at: None,
                });
        }
        Ok(())
    }

    fn ensure_user(&self, user_id: Uuid) -> Result<(), VaultError> {
        self.lock()?.ensure_user(user_id);
        Ok(())
    }

    fn record_device(
        &self,
        user_id: Uuid,
        device_id: &str,
        device_name: Option<&str>,
    ) -> Result<(), VaultError> {
        self.lock()?.record_device(user_id, device_id, device_name);
        Ok(())
    }

    fn touch_device(&self, user_id: Uuid, device_id: &str) -> Result<(), VaultError> {
        self.record_device(user_id, device_id, None)
    }

    fn consume_invite(&self, invite_token: &str) -> Result<(), VaultError> {
        let mut inner = self.lock()?;
        let info = inner
            .invites
            .get_mut(&hash_token(invite_token))
            .ok_or(AuthError::InvalidInvite)?;
        if info.used_at.is_some() {
            return Err(AuthError::InviteUsed.into());
        }
        if info.expires_at.is_some_and(|expires| expires < Utc::now()) {
            return Err(AuthError::InviteExpired.into());
        }
        info.used_at = Some(Utc::now());
        Ok(())
    }

    fn issue_user_token(&self, user_id: Uuid) -> Result<String, VaultError> {
        let token = generate_user_token();
        self.lock()?.user_tokens.insert(
            hash_token(&token),
            TokenInfo {
                user_id,
                revoked_at: None,
            },
        );
        Ok(token)
    }

    fn authenticate(&self, user_token: &str) -> Result<Uuid, VaultError> {
        let inner = self.lock()?;
        let info = inner
            .user_tokens
            .get(&hash_token(user_token))
            .ok_or(AuthError::InvalidToken)?;
        if info.revoked_at.is_some() {
            return Err(AuthError::TokenRevoked.into());
        }
        Ok(info.user_id)
    }

    fn apply_changes(
        &self,
        user_id: Uuid,
        changes: &[MeasurementEntry],
        source_device_id: &str,
    ) -> Result<usize, VaultError> {
        let mut inner = self.lock()?;
        inner.ensure_user(user_id);
        if !source_device_id.is_empty() {
            inner.record_device(user_id, source_device_id, None);
        }

        let user_entries = inner.entries.entry(user_id).or_default();
        let mut accepted = 0;
        for change in changes {
            if let Some(existing) = user_entries.get(&change.entry_id) {
                if !should_accept(existing.version, existing.updated_at, change) {
                    continue;
                }
            }
            user_entries.insert(change.entry_id, change.clone());
            accepted += 1;
        }
        Ok(accepted)
    }

    fn changes_since(
        &self,
        user_id: Uuid,
        since: Option<DateTime<Utc>>,
    ) -> Result<Vec<MeasurementEntry>, VaultError> {
        let inner = self.lock()?;
        let mut changes: Vec<MeasurementEntry> = inner
            .entries
            .get(&user_id)
            .map(|user_entries| {
                user_entries
                    .values()
                    .filter(|entry| since.is_none_or(|s| entry.updated_at > s))
                    .cloned()
                    .collect()
            })
            .unwrap_or_default();
        changes.sort_by_key(|entry| entry.updated_at);
        Ok(changes)
    }

    fn list_users(&self) -> Result<Vec<UserSummary>, VaultError> {
        let inner = self.lock()?;
        let mut users: Vec<UserSummary> = inner
            .users
            .iter()
            .map(|(user_id, info)| UserSummary {
                user_id: *user_id,
                created_at: info.created_at,
                last_seen_at: info.last_seen_at,
                device_count: inner
                    .devices
                    .values()
                    .filter(|d| d.user_id == *user_id)
                    .count(),
                entry_count: inner.entries.get(user_id).map_or(0, HashMap::len),
            })
            .collect();
        users.sort_by_key(|u| u.created_at);
        Ok(users)
    }

    fn list_devices(&self) -> Result<Vec<DeviceSummary>, VaultError> {
        let inner = self.lock()?;
        let mut devices: Vec<DeviceSummary> = inner
            .devices
            .iter()
            .map(|(device_id, info)| DeviceSummary {
                device_id: device_id.clone(),
                user_id: info.user_id,
                device_name: info.device_name.clone(),
                created_at: info.created_at,
                last_seen_at: info.last_seen_at,
            })
            .collect();
        devices.sort_by_key(|d| d.created_at);
        Ok(devices)
    }

    fn list_invites(&self) -> Result<Vec<InviteSummary>, VaultError> {
        let inner = self.lock()?;
        let mut invites: Vec<InviteSummary> = inner
            .invites
            .iter()
            .map(|(token_hash, info)| InviteSummary {
                token_hash: token_hash.clone(),
                created_at: info.created_at,
                expires_at: info.expires_at,
                used_at: info.used_at,
            })
            .collect();
        invites.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        Ok(invites)
    }

    fn count_entries(&self) -> Result<usize, VaultError> {
        let inner = self.lock()?;
        Ok(inner.entries.values().map(HashMap::len).sum())
    }

    fn create_invite_token(
        &self,
        expires_at: Option<DateTime<Utc>>,
    ) -> Result<String, VaultError> {
        let token = generate_invite_token();
        self.lock()?.invites.insert(
            hash_token(&token),
            InviteInfo {
                created_at: Utc::now(),
                expires_at,
                used_at: None,
            },
        );
        Ok(token)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;

    fn entry_for(user_id: Uuid, version: i64) -> MeasurementEntry {
        let measured_at = DateTime::parse_from_rfc3339("2026-02-01T09:00:00+00:00").unwrap();
        let mut entry = MeasurementEntry::new(user_id, measured_at, 70.2, None);
        entry.version = version;
        entry
    }

    #[test]
    fn bootstrap_invites_are_idempotent_and_keep_used_state() {
        let store = InMemoryVaultStore::new();
        let tokens = vec!["abc123".to_string()];
        store.load_bootstrap_invites(&tokens).unwrap();
        store.consume_invite("abc123").unwrap();

        // Reloading (e.g. on restart) must not resurrect the used invite.
        store.load_bootstrap_invites(&tokens).unwrap();
        let err = store.consume_invite("abc123").unwrap_err();
        assert!(matches!(err, VaultError::Auth(AuthError::InviteUsed)));
    }

    #[test]
    fn unknown_invite_is_invalid() {
        let store = InMemoryVaultStore::new();
        let err = store.consume_invite("nope").unwrap_err();
        assert!(matches!(err, VaultError::Auth(AuthError::InvalidInvite)));
    }

    #[test]
    fn expired_invite_fails_before_being_marked_used() {
        let store = InMemoryVaultStore::new();
        let token = store
            .create_invite_token(Some(Utc::now() - Duration::hours(1)))
            .unwrap();
        let err = store.consume_invite(&token).unwrap_err();
        assert!(matches!(err, VaultError::Auth(AuthError::InviteExpired)));

        // Still expired, not "used": the failure is stable.
        let err = store.consume_invite(&token).unwrap_err();
        assert!(matches!(err, VaultError::Auth(AuthError::InviteExpired)));
    }

    #[test]
    fn issued_token_authenticates_to_its_user() {
        let store = InMemoryVaultStore::new();
        let user_id = Uuid::new_v4();
        let token = store.issue_user_token(user_id).unwrap();
        assert_eq!(store.authenticate(&token).unwrap(), user_id);

        let err = store.authenticate("bogus").unwrap_err();
        assert!(matches!(err, VaultError::Auth(AuthError::InvalidToken)));
    }

    #[test]
    fn multiple_live_tokens_per_user() {
        let store = InMemoryVaultStore::new();
        let user_id = Uuid::new_v4();
        let laptop = store.issue_user_token(user_id).unwrap();
        let phone = store.issue_user_token(user_id).unwrap();
        assert_ne!(laptop, phone);
        assert_eq!(store.authenticate(&laptop).unwrap(), user_id);
        assert_eq!(store.authenticate(&phone).unwrap(), user_id);
    }

    #[test]
    fn device_reregistration_updates_name_and_keeps_history() {
        let store = InMemoryVaultStore::new();
        let user_id = Uuid::new_v4();
        store
            .record_device(user_id, "laptop-1", Some("Alice's laptop"))
            .unwrap();
        let created_at = store.list_devices().unwrap()[0].created_at;

        store.record_device(user_id, "laptop-1", Some("Work laptop")).unwrap();
        store.touch_device(user_id, "laptop-1").unwrap();

        let devices = store.list_devices().unwrap();
        assert_eq!(devices.len(), 1);
        assert_eq!(devices[0].device_name.as_deref(), Some("Work laptop"));
        assert_eq!(devices[0].created_at, created_at);
    }

    #[test]
    fn apply_changes_respects_conflict_resolution() {
        let store = InMemoryVaultStore::new();
        let user_id = Uuid::new_v4();

        let v3 = entry_for(user_id, 3);
        assert_eq!(store.apply_changes(user_id, &[v3.clone()], "laptop-1").unwrap(), 1);

        // A stale copy of the same entry at version 2 loses silently.
        let mut v2 = v3.clone();
        v2.version = 2;
        v2.weight_kg = 99.9;
        assert_eq!(store.apply_changes(user_id, &[v2], "phone-1").unwrap(), 0);

        let stored = store.changes_since(user_id, None).unwrap();
        assert_eq!(stored.len(), 1);
        assert_eq!(stored[0].version, 3);
        assert_eq!(stored[0].weight_kg, v3.weight_kg);
    }

    #[test]
    fn changes_since_is_exclusive_and_ascending() {
        let store = InMemoryVaultStore::new();
        let user_id = Uuid::new_v4();

        let mut early = entry_for(user_id, 1);
        early.updated_at = Utc::now() - Duration::minutes(10);
        let mut late = entry_for(user_id, 1);
        late.updated_at = Utc::now();
        store
            .apply_changes(user_id, &[late.clone(), early.clone()], "laptop-1")
            .unwrap();

        let all = store.changes_since(user_id, None).unwrap();
        assert_eq!(all.len(), 2);
        assert!(all[0].updated_at <= all[1].updated_at);

        let after_early = store.changes_since(user_id, Some(early.updated_at)).unwrap();
        assert_eq!(after_early.len(), 1);
        assert_eq!(after_early[0].entry_id, late.entry_id);

        // Cursor equal to the newest record: nothing left.
        assert!(store.changes_since(user_id, Some(late.updated_at)).unwrap().is_empty());
    }

    #[test]
    fn tombstones_are_returned_not_dropped() {
        let store = InMemoryVaultStore::new();
        let user_id = Uuid::new_v4();
        let mut entry = entry_for(user_id, 1);
        store.apply_changes(user_id, &[entry.clone()], "laptop-1").unwrap();

        entry.soft_delete();
        store.apply_changes(user_id, &[entry.clone()], "laptop-1").unwrap();

        let pulled = store.changes_since(user_id, None).unwrap();
        assert_eq!(pulled.len(), 1);
        assert!(pulled[0].is_deleted);
        assert_eq!(pulled[0].version, 2);
    }

    #[test]
    fn overview_counts_line_up() {
        let store = InMemoryVaultStore::new();
        let user_id = Uuid::new_v4();
        store.record_device(user_id, "laptop-1", Some("laptop")).unwrap();
        store
            .apply_changes(user_id, &[entry_for(user_id, 1), entry_for(user_id, 1)], "laptop-1")
            .unwrap();

        let users = store.list_users().unwrap();
        assert_eq!(users.len(), 1);
        assert_eq!(users[0].device_count, 1);
        assert_eq!(users[0].entry_count, 2);
        assert_eq!(store.count_entries().unwrap(), 2);
    }
}
