// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! One client sync round: push → pull → merge → commit cursor.
//!
//! Nothing touches the local store until both the push and the pull have
//! been fully received and parsed; a transport failure anywhere in the
//! round leaves the store and the cursor exactly as they were. Pulled
//! changes merge through the same last-writer-wins predicate the server
//! uses, so replaying a round is a no-op.

use uuid::Uuid;

use crate::models::{MeasurementEntry, SyncPullRequest, SyncPushRequest};
use crate::storage::StoreData;
use crate::vault::should_accept;

use super::{SyncError, VaultClient};

/// What a completed round did.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SyncOutcome {
    /// Entries uploaded this round.
    pub pushed: usize,
    /// How many of them the vault accepted.
    pub accepted: usize,
    /// Entries the vault returned.
    pub pulled: usize,
    /// How many of those changed the local store.
    pub applied: usize,
}

/// Run one full round against the vault for the active profile.
///
/// Uses the cursor persisted from the previous round for both halves, and
/// advances it to the pull's `next_since` only on success.
pub async fn run_sync_round(
    client: &VaultClient,
    data: &mut StoreData,
) -> Result<SyncOutcome, SyncError> {
    let (user_id, user_token, device_id, since) = {
        let profile = data
            .active_profile()
            .ok_or_else(|| SyncError::NotConfigured("no active profile".to_string()))?;
        let settings = &profile.sync_settings;
        let user_token = settings
            .user_token
            .clone()
            .ok_or_else(|| SyncError::NotConfigured("user token missing".to_string()))?;
        let device_id = settings
            .device_id
            .clone()
            .ok_or_else(|| SyncError::NotConfigured("device id missing".to_string()))?;
        (
            profile.user_id,
            user_token,
            device_id,
            settings.last_sync_at,
        )
    };

    let changes = data.entries_changed_since(since);
    let pushed = changes.len();

    let push = client
        .push_changes(
            &user_token,
            &SyncPushRequest {
                user_id,
                device_id: device_id.clone(),
                since,
                changes,
            },
        )
        .await?;

    let pull = client
        .pull_changes(
            &user_token,
            &SyncPullRequest {
                user_id,
                device_id,
                since,
            },
        )
        .await?;

    // Both halves parsed; now it is safe to commit.
    let applied = merge_remote_changes(data, user_id, &pull.changes);
    if let Some(profile) = data.active_profile_mut() {
        profile.sync_settings.last_sync_at = Some(pull.next_since);
    }

    Ok(SyncOutcome {
        pushed,
        accepted: push.accepted_count,
        pulled: pull.changes.len(),
        applied,
    })
}

/// Merge pulled entries into the store through conflict resolution.
/// Entries for other users and exact replays are skipped.
fn merge_remote_changes(
    data: &mut StoreData,
    user_id: Uuid,
    changes: &[MeasurementEntry],
) -> usize {
    let mut applied = 0;
    for change in changes {
        if change.user_id != user_id {
            continue;
        }
        if let Some(existing) = data.entry(change.entry_id) {
            if !should_accept(existing.version, existing.updated_at, change) {
                continue;
            }
        }
        data.upsert_remote_entry(change.clone());
        applied += 1;
    }
    applied
}

/// Convenience for callers that only need the merge half (e.g. applying a
/// pull fetched elsewhere).
pub fn apply_remote_changes(
    data: &mut StoreData,
    user_id: Uuid,
    changes: &[MeasurementEntry],
) -> usize {
    merge_remote_changes(data, user_id, changes)
}
