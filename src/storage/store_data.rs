// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! The in-memory document held by the client: profiles plus the full entry
//! list. Mutation helpers bump `version`/`updated_at` so every local edit —
//! including soft-delete — is visible to conflict resolution.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::models::MeasurementEntry;

/// Local store document format version. Checked on every load; a mismatch
/// is a hard failure, never an auto-migration.
pub const SCHEMA_VERSION: i64 = 1;

/// Weight display unit preference.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq)]
pub enum WeightUnit {
    #[serde(rename = "kg")]
    Kg,
    #[default]
    #[serde(rename = "lb")]
    Lb,
}

/// Length display unit preference.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq)]
pub enum LengthUnit {
    #[serde(rename = "cm")]
    Cm,
    #[default]
    #[serde(rename = "in")]
    In,
}

/// Per-device vault connection settings, persisted inside the sealed store
/// so the pull cursor and bearer token survive restarts.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct SyncSettings {
    pub enabled: bool,
    pub vault_url: Option<String>,
    /// Long-lived bearer token issued at invite redemption.
    pub user_token: Option<String>,
    pub device_id: Option<String>,
    pub device_name: Option<String>,
    /// Path to a pinned vault certificate (self-signed deployments).
    pub vault_cert_path: Option<String>,
    pub allow_insecure_http: bool,
    pub auto_sync_enabled: bool,
    pub auto_sync_interval_minutes: Option<u32>,
    /// The `next_since` cursor from the last fully-committed sync round.
    pub last_sync_at: Option<DateTime<Utc>>,
}

/// One user's profile and preferences.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct UserProfile {
    pub user_id: Uuid,
    pub display_name: String,
    pub weight_unit: WeightUnit,
    pub waist_unit: LengthUnit,
    pub waist_convention_label: String,
    pub timezone: String,
    pub track_waist: bool,
    pub goal_weight_kg: Option<f64>,
    pub goal_weight_band_kg: Option<f64>,
    pub goal_waist_cm: Option<f64>,
    pub goal_waist_band_cm: Option<f64>,
    pub sync_settings: SyncSettings,
}

impl UserProfile {
    pub fn new(display_name: impl Into<String>) -> Self {
        Self {
            user_id: Uuid::new_v4(),
            display_name: display_name.into(),
            weight_unit: WeightUnit::default(),
            waist_unit: LengthUnit::default(),
            waist_convention_label: "smallest point".to_string(),
            timezone: "local".to_string(),
            track_waist: false,
            goal_weight_kg: None,
            goal_weight_band_kg: None,
            goal_waist_cm: None,
            goal_waist_band_cm: None,
            sync_settings: SyncSettings::default(),
        }
    }
}

/// The whole client dataset, serialized as one JSON document and sealed as
/// a unit.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct StoreData {
    pub schema_version: i64,
    pub last_modified: DateTime<Utc>,
    pub profiles: Vec<UserProfile>,
    pub entries: Vec<MeasurementEntry>,
    pub active_profile_id: Option<Uuid>,
}

impl StoreData {
    /// Fresh schema-version-1 document, optionally seeded with one profile.
    pub fn new(profile: Option<UserProfile>) -> Self {
        let active_profile_id = profile.as_ref().map(|p| p.user_id);
        Self {
            schema_version: SCHEMA_VERSION,
            last_modified: Utc::now(),
            profiles: profile.into_iter().collect(),
            entries: Vec::new(),
            active_profile_id,
        }
    }

    /// The currently selected profile, if any.
    pub fn active_profile(&self) -> Option<&UserProfile> {
        let id = self.active_profile_id?;
        self.profiles.iter().find(|p| p.user_id == id)
    }

    /// Mutable access to the currently selected profile.
    pub fn active_profile_mut(&mut self) -> Option<&mut UserProfile> {
        let id = self.active_profile_id?;
        self.profiles.iter_mut().find(|p| p.user_id == id)
    }

    /// Append a brand-new entry (already at version 1).
    pub fn add_entry(&mut self, entry: MeasurementEntry) {
        self.entries.push(entry);
        self.last_modified = Utc::now();
    }

    /// Apply a local edit: replaces the stored record and bumps its
    /// version/`updated_at`. Returns false if the entry is unknown.
    pub fn update_entry(&mut self, mut entry: MeasurementEntry) -> bool {
        match self.entries.iter_mut().find(|e| e.entry_id == entry.entry_id) {
            Some(existing) => {
                entry.touch();
                *existing = entry;
                self.last_modified = Utc::now();
                true
            }
            None => false,
        }
    }

    /// Soft-delete an entry in place: tombstone flag set, version bumped.
    /// The record is never physically removed, so the deletion syncs.
    pub fn soft_delete_entry(&mut self, entry_id: Uuid) -> bool {
        match self.entries.iter_mut().find(|e| e.entry_id == entry_id) {
            Some(entry) => {
                entry.soft_delete();
                self.last_modified = Utc::now();
                true
            }
            None => false,
        }
    }

    /// Replace or insert an entry exactly as received from the vault,
    /// without touching its version. Used by the sync merge only.
    pub fn upsert_remote_entry(&mut self, entry: MeasurementEntry) {
        match self.entries.iter_mut().find(|e| e.entry_id == entry.entry_id) {
            Some(existing) => *existing = entry,
            None => self.entries.push(entry),
        }
        self.last_modified = Utc::now();
    }

    /// Entries changed strictly after `since` (all of them when `since` is
    /// `None`) — the client's push set for a sync round.
    pub fn entries_changed_since(&self, since: Option<DateTime<Utc>>) -> Vec<MeasurementEntry> {
        self.entries
            .iter()
            .filter(|e| since.is_none_or(|s| e.updated_at > s))
            .cloned()
            .collect()
    }

    /// Look up an entry by id, tombstones included.
    pub fn entry(&self, entry_id: Uuid) -> Option<&MeasurementEntry> {
        self.entries.iter().find(|e| e.entry_id == entry_id)
    }
}
