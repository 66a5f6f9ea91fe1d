// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! # API Data Models
//!
//! This module defines the measurement record exchanged during sync and the
//! request and response data structures used by the REST API. All types
//! derive `Serialize`, `Deserialize`, and `ToSchema` for automatic JSON
//! handling and OpenAPI documentation.
//!
//! ## Timestamps
//!
//! Every instant on the wire is ISO-8601 **with a timezone offset**; chrono
//! refuses naive timestamps at deserialization time, which is the intended
//! hard validation error. `measured_at` keeps its original offset so the
//! local calendar date can be derived from it; bookkeeping timestamps are
//! UTC.
//!
//! ## Model Categories
//!
//! - **MeasurementEntry**: the atomic sync unit (one record per edit)
//! - **Invite exchange**: bootstrap of a device's long-lived user token
//! - **Push / Pull**: cursor-based incremental synchronization
//! - **Admin**: introspection summaries and invite issuance

use chrono::{DateTime, FixedOffset, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;
use uuid::Uuid;

// =============================================================================
// Measurement Entry
// =============================================================================

/// The atomic record exchanged between devices.
///
/// Identity is `entry_id`; `version` is the logical clock bumped on every
/// local mutation including soft-delete. A deletion is a normal record with
/// `is_deleted` set — tombstones are never physically removed, so deletions
/// propagate to every replica.
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema, PartialEq)]
pub struct MeasurementEntry {
    /// Stable identity of this record across all replicas.
    pub entry_id: Uuid,
    /// Owning user.
    pub user_id: Uuid,
    /// When the measurement was taken (keeps the device's local offset).
    pub measured_at: DateTime<FixedOffset>,
    /// Calendar date of the measurement in the device's timezone.
    pub date_local: Option<NaiveDate>,
    /// Weight in kilograms.
    pub weight_kg: f64,
    /// Waist circumference in centimeters, if tracked.
    pub waist_cm: Option<f64>,
    /// Free-form note.
    pub note: Option<String>,
    /// When the record was first created.
    pub created_at: DateTime<Utc>,
    /// When the record was last mutated; tie-break for conflict resolution.
    pub updated_at: DateTime<Utc>,
    /// Soft-delete tombstone flag.
    pub is_deleted: bool,
    /// When the record was soft-deleted, if it was.
    pub deleted_at: Option<DateTime<Utc>>,
    /// Monotonic logical clock, starting at 1.
    pub version: i64,
}

impl MeasurementEntry {
    /// Create a fresh entry at version 1, deriving `date_local` from the
    /// measurement instant's own offset.
    pub fn new(
        user_id: Uuid,
        measured_at: DateTime<FixedOffset>,
        weight_kg: f64,
        waist_cm: Option<f64>,
    ) -> Self {
        let now = Utc::now();
        Self {
            entry_id: Uuid::new_v4(),
            user_id,
            measured_at,
            date_local: Some(measured_at.date_naive()),
            weight_kg,
            waist_cm,
            note: None,
            created_at: now,
            updated_at: now,
            is_deleted: false,
            deleted_at: None,
            version: 1,
        }
    }

    /// Record a mutation: bump the version and refresh `updated_at`.
    pub fn touch(&mut self) {
        self.version += 1;
        self.updated_at = Utc::now();
    }

    /// Turn this record into a tombstone. The version bump makes the
    /// deletion win over any stale copy still carrying the old version.
    pub fn soft_delete(&mut self) {
        self.is_deleted = true;
        self.deleted_at = Some(Utc::now());
        self.touch();
    }
}

// =============================================================================
// Invite Exchange
// =============================================================================

/// Request to redeem a single-use invite token.
///
/// `user_id` is absent on first-device bootstrap (the vault generates one)
/// and present when an additional device joins an existing user.
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct InviteRequest {
    /// The raw invite token (never stored; only its hash is).
    pub invite_token: String,
    /// Human-readable name of the redeeming device.
    pub device_name: String,
    /// Existing user to attach this device to, if any.
    pub user_id: Option<Uuid>,
    /// Client-generated device identifier to register.
    pub device_id: Option<String>,
}

/// Result of a successful invite redemption.
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct InviteResponse {
    /// The user this device now belongs to.
    pub user_id: Uuid,
    /// Freshly issued bearer token; returned exactly once.
    pub user_token: String,
    /// Token expiry, if the vault enforces one.
    pub expires_at: Option<DateTime<Utc>>,
}

// =============================================================================
// Push / Pull
// =============================================================================

/// Upload of locally-changed entries.
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct SyncPushRequest {
    /// Must match the identity behind `X-User-Token`.
    pub user_id: Uuid,
    /// Device performing the push.
    pub device_id: String,
    /// The client's current cursor (informational on push).
    pub since: Option<DateTime<Utc>>,
    /// Entries changed since the last sync round.
    pub changes: Vec<MeasurementEntry>,
}

/// Outcome of a push.
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct SyncPushResponse {
    /// The vault's clock when the push was processed.
    pub server_time: DateTime<Utc>,
    /// How many entries won conflict resolution and were stored.
    /// Losing entries are dropped silently — a newer copy already exists.
    pub accepted_count: usize,
    /// Cursor the client should persist for its next pull.
    pub next_since: DateTime<Utc>,
}

/// Request for entries changed after a cursor.
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct SyncPullRequest {
    /// Must match the identity behind `X-User-Token`.
    pub user_id: Uuid,
    /// Device performing the pull.
    pub device_id: String,
    /// Return entries with `updated_at` strictly after this; absent = all.
    pub since: Option<DateTime<Utc>>,
}

/// Entries changed since the requested cursor.
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct SyncPullResponse {
    /// The vault's clock when the pull was processed.
    pub server_time: DateTime<Utc>,
    /// Matching entries, ascending by `updated_at`.
    pub changes: Vec<MeasurementEntry>,
    /// Cursor the client should persist and replay as `since`.
    pub next_since: DateTime<Utc>,
}

// =============================================================================
// Admin Models
// =============================================================================

/// Per-user roll-up for the admin overview.
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct UserSummary {
    pub user_id: Uuid,
    pub created_at: DateTime<Utc>,
    pub last_seen_at: Option<DateTime<Utc>>,
    /// Devices registered under this user.
    pub device_count: usize,
    /// Encrypted entry rows stored for this user.
    pub entry_count: usize,
}

/// Registered device as shown to admins.
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct DeviceSummary {
    pub device_id: String,
    pub user_id: Uuid,
    pub device_name: Option<String>,
    pub created_at: DateTime<Utc>,
    pub last_seen_at: Option<DateTime<Utc>>,
}

/// Invite token as shown to admins. Only the hash is ever listed; the raw
/// token is unrecoverable after issuance.
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct InviteSummary {
    pub token_hash: String,
    pub created_at: DateTime<Utc>,
    pub expires_at: Option<DateTime<Utc>>,
    pub used_at: Option<DateTime<Utc>>,
}

/// Full admin overview of the vault.
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct AdminOverviewResponse {
    pub users: Vec<UserSummary>,
    pub devices: Vec<DeviceSummary>,
    pub invites: Vec<InviteSummary>,
    pub total_entries: usize,
}

/// Request to mint a new invite token.
#[derive(Debug, Clone, Default, Serialize, Deserialize, ToSchema)]
pub struct CreateInviteRequest {
    /// Days until the invite expires; absent = never.
    pub expires_in_days: Option<i64>,
}

/// A freshly minted invite. The raw token appears here and nowhere else.
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct CreateInviteResponse {
    pub invite_token: String,
    pub expires_at: Option<DateTime<Utc>>,
}
