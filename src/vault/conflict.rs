// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! Last-writer-wins conflict resolution.
//!
//! Applied identically when the server accepts pushed changes and when the
//! client merges pulled ones. `version` is the authoritative logical clock
//! bumped by whichever device edits; raw wall-clock comparison alone is
//! unsafe under clock skew, so `updated_at` only breaks ties when two
//! devices independently reached the same version number.

use chrono::{DateTime, Utc};

use crate::models::MeasurementEntry;

/// Should `incoming` replace a stored record at
/// `(existing_version, existing_updated_at)`?
///
/// Pure and total:
/// 1. Higher version wins.
/// 2. Lower version loses.
/// 3. Equal versions: strictly newer `updated_at` wins.
///
/// An exact replay (same version, same timestamp) is rejected, which makes
/// re-applying an already-applied change a no-op.
pub fn should_accept(
    existing_version: i64,
    existing_updated_at: DateTime<Utc>,
    incoming: &MeasurementEntry,
) -> bool {
    if incoming.version > existing_version {
        return true;
    }
    if incoming.version < existing_version {
        return false;
    }
    incoming.updated_at > existing_updated_at
}
