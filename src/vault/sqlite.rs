// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! Durable SQLite vault backend.
//!
//! Entry content exists in the database only as an AES-GCM blob sealed
//! under the HKDF per-user key; the queryable columns are identity and
//! ordering fields (`user_id`, `entry_id`, `updated_at`, `version`) plus
//! receipt metadata. The file at rest never reveals weight, waist, or note
//! values.
//!
//! `apply_changes` runs its read-decide-write sequence inside one
//! transaction so two devices pushing conflicting versions of the same
//! entry concurrently cannot lose an update.

use std::path::Path;
use std::sync::{Arc, Mutex, MutexGuard};

use chrono::{DateTime, SecondsFormat, Utc};
use rusqlite::{Connection, OptionalExtension};
use uuid::Uuid;

use crate::crypto::master::{decrypt_payload, derive_user_key, encrypt_payload};
use crate::models::{DeviceSummary, InviteSummary, MeasurementEntry, UserSummary};

use super::{
    generate_invite_token, generate_user_token, hash_token, should_accept, AuthError,
    VaultBackend, VaultError,
};

/// Database schema version recorded in the `meta` table.
const SCHEMA_VERSION: i64 = 1;

/// Durable backend used when `VAULT_STORAGE_PATH` is configured.
pub struct SqliteVaultStore {
    conn: Arc<Mutex<Connection>>,
    master_key: [u8; 32],
}

impl From<rusqlite::Error> for VaultError {
    fn from(e: rusqlite::Error) -> Self {
        VaultError::Database(e.to_string())
    }
}

/// Timestamps are stored as fixed-width RFC 3339 (nanosecond precision) so
/// SQLite's lexicographic TEXT ordering matches chronological ordering and
/// a stored instant round-trips exactly.
fn fmt_ts(ts: DateTime<Utc>) -> String {
    ts.to_rfc3339_opts(SecondsFormat::Nanos, false)
}

fn parse_ts(raw: &str) -> Result<DateTime<Utc>, VaultError> {
    DateTime::parse_from_rfc3339(raw)
        .map(|dt| dt.with_timezone(&Utc))
        .map_err(|e| VaultError::Database(format!("Malformed timestamp in database: {e}")))
}

fn parse_uuid(raw: &str) -> Result<Uuid, VaultError> {
    Uuid::parse_str(raw).map_err(|e| VaultError::Database(format!("Malformed UUID in database: {e}")))
}

impl SqliteVaultStore {
    /// Open (or create) the vault database at `path`.
    pub fn open(path: &Path, master_key: [u8; 32]) -> Result<Self, VaultError> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)
                .map_err(|e| VaultError::Database(format!("Cannot create {parent:?}: {e}")))?;
        }
        let conn = Connection::open(path)?;
        conn.pragma_update(None, "journal_mode", "WAL")?;
        conn.pragma_update(None, "foreign_keys", "ON")?;

        let store = Self {
            conn: Arc::new(Mutex::new(conn)),
            master_key,
        };
        store.initialize_schema()?;
        Ok(store)
    }

    fn lock(&self) -> Result<MutexGuard<'_, Connection>, VaultError> {
        self.conn
            .lock()
            .map_err(|_| VaultError::Database("connection lock poisoned".to_string()))
    }

    fn initialize_schema(&self) -> Result<(), VaultError> {
        let conn = self.lock()?;
        conn.execute_batch(
            "CREATE TABLE IF NOT EXISTS meta (
                key TEXT PRIMARY KEY,
                value TEXT NOT NULL
            );

            CREATE TABLE IF NOT EXISTS invites (
                token_hash TEXT PRIMARY KEY,
                created_at TEXT NOT NULL,
                expires_at TEXT,
                used_at TEXT
            );

            CREATE TABLE IF NOT EXISTS user_tokens (
                token_hash TEXT PRIMARY KEY,
                user_id TEXT NOT NULL,
                created_at TEXT NOT NULL,
                revoked_at TEXT
            );

            CREATE TABLE IF NOT EXISTS users (
                user_id TEXT PRIMARY KEY,
                created_at TEXT NOT NULL,
                last_seen_at TEXT
            );

            CREATE TABLE IF NOT EXISTS devices (
                device_id TEXT PRIMARY KEY,
                user_id TEXT NOT NULL,
                device_name TEXT,
                created_at TEXT NOT NULL,
                last_seen_at TEXT
            );

            CREATE TABLE IF NOT EXISTS entries (
                user_id TEXT NOT NULL,
                entry_id TEXT NOT NULL,
                updated_at TEXT NOT NULL,
                version INTEGER NOT NULL,
                payload TEXT NOT NULL,
                received_at TEXT NOT NULL,
                source_device_id TEXT NOT NULL,
                PRIMARY KEY (user_id, entry_id)
            );

            CREATE INDEX IF NOT EXISTS idx_devices_user
                ON devices(user_id);
            CREATE INDEX IF NOT EXISTS idx_entries_user_updated
                ON entries(user_id, updated_at);",
        )?;
        conn.execute(
            "INSERT OR IGNORE INTO meta(key, value) VALUES(?1, ?2)",
            rusqlite::params!["schema_version", SCHEMA_VERSION.to_string()],
        )?;
        Ok(())
    }

    fn record_device_locked(
        conn: &Connection,
        user_id: Uuid,
        device_id: &str,
        device_name: Option<&str>,
    ) -> Result<(), VaultError> {
        let now = fmt_ts(Utc::now());
        conn.execute(
            "INSERT OR IGNORE INTO users(user_id, created_at) VALUES(?1, ?2)",
            rusqlite::params![user_id.to_string(), now],
        )?;
        conn.execute(
            "INSERT INTO devices(device_id, user_id, device_name, created_at, last_seen_at)
             VALUES(?1, ?2, ?3, ?4, ?5)
             ON CONFLICT(device_id) DO UPDATE SET
                user_id=excluded.user_id,
                device_name=COALESCE(excluded.device_name, devices.device_name),
                last_seen_at=excluded.last_seen_at",
            rusqlite::params![device_id, user_id.to_string(), device_name, now, now],
        )?;
        conn.execute(
            "UPDATE users SET last_seen_at = ?1 WHERE user_id = ?2",
            rusqlite::params![now, user_id.to_string()],
        )?;
        Ok(())
    }
}

impl VaultBackend for SqliteVaultStore {
    fn load_bootstrap_invites(&self, tokens: &[String]) -> Result<(), VaultError> {
        if tokens.is_empty() {
            return Ok(());
        }
        let conn = self.lock()?;
        let now = fmt_ts(Utc::now());
        for token in tokens {
            conn.execute(
                "INSERT OR IGNORE INTO invites(token_hash, created_at) VALUES(?1, ?2)",
                rusqlite::params![hash_token(token), now],
            )?;
        }
        Ok(())
    }

    fn ensure_user(&self, user_id: Uuid) -> Result<(), VaultError> {
        let conn = self.lock()?;
        conn.execute(
            "INSERT OR IGNORE INTO users(user_id, created_at) VALUES(?1, ?2)",
            rusqlite::params![user_id.to_string(), fmt_ts(Utc::now())],
        )?;
        Ok(())
    }

    fn record_device(
        &self,
        user_id: Uuid,
        device_id: &str,
        device_name: Option<&str>,
    ) -> Result<(), VaultError> {
        let conn = self.lock()?;
        Self::record_device_locked(&conn, user_id, device_id, device_name)
    }

    fn touch_device(&self, user_id: Uuid, device_id: &str) -> Result<(), VaultError> {
        self.record_device(user_id, device_id, None)
    }

    fn consume_invite(&self, invite_token: &str) -> Result<(), VaultError> {
        let token_hash = hash_token(invite_token);
        let conn = self.lock()?;
        let row: Option<(Option<String>, Option<String>)> = conn
            .query_row(
                "SELECT used_at, expires_at FROM invites WHERE token_hash = ?1",
                rusqlite::params![token_hash],
                |row| Ok((row.get(0)?, row.get(1)?)),
            )
            .optional()?;

        let (used_at, expires_at) = row.ok_or(AuthError::InvalidInvite)?;
        if used_at.is_some() {
            return Err(AuthError::InviteUsed.into());
        }
        if let Some(raw) = expires_at {
            if parse_ts(&raw)? < Utc::now() {
                return Err(AuthError::InviteExpired.into());
            }
        }
        conn.execute(
            "UPDATE invites SET used_at = ?1 WHERE token_hash = ?2",
            rusqlite::params![fmt_ts(Utc::now()), token_hash],
        )?;
        Ok(())
    }

    fn issue_user_token(&self, user_id: Uuid) -> Result<String, VaultError> {
        let token = generate_user_token();
        let conn = self.lock()?;
        conn.execute(
            "INSERT INTO user_tokens(token_hash, user_id, created_at) VALUES(?1, ?2, ?3)",
            rusqlite::params![hash_token(&token), user_id.to_string(), fmt_ts(Utc::now())],
        )?;
        Ok(token)
    }

    fn authenticate(&self, user_token: &str) -> Result<Uuid, VaultError> {
        let conn = self.lock()?;
        let row: Option<(String, Option<String>)> = conn
            .query_row(
                "SELECT user_id, revoked_at FROM user_tokens WHERE token_hash = ?1",
                rusqlite::params![hash_token(user_token)],
                |row| Ok((row.get(0)?, row.get(1)?)),
            )
            .optional()?;

        let (user_id, revoked_at) = row.ok_or(AuthError::InvalidToken)?;
        if revoked_at.is_some() {
            return Err(AuthError::TokenRevoked.into());
        }
        parse_uuid(&user_id)
    }

    fn apply_changes(
        &self,
        user_id: Uuid,
        changes: &[MeasurementEntry],
        source_device_id: &str,
    ) -> Result<usize, VaultError> {
        let user_key = derive_user_key(&self.master_key, user_id);
        let mut conn = self.lock()?;
        let tx = conn.transaction()?;

        if !source_device_id.is_empty() {
            Self::record_device_locked(&tx, user_id, source_device_id, None)?;
        } else {
            tx.execute(
                "INSERT OR IGNORE INTO users(user_id, created_at) VALUES(?1, ?2)",
                rusqlite::params![user_id.to_string(), fmt_ts(Utc::now())],
            )?;
        }

        let mut accepted = 0;
        for change in changes {
            let existing: Option<(i64, String)> = tx
                .query_row(
                    "SELECT version, updated_at FROM entries WHERE user_id = ?1 AND entry_id = ?2",
                    rusqlite::params![user_id.to_string(), change.entry_id.to_string()],
                    |row| Ok((row.get(0)?, row.get(1)?)),
                )
                .optional()?;

            if let Some((version, updated_at)) = existing {
                if !should_accept(version, parse_ts(&updated_at)?, change) {
                    continue;
                }
            }

            let payload = encrypt_payload(
                &serde_json::to_value(change)
                    .map_err(|e| VaultError::Database(format!("Entry serialization: {e}")))?,
                &user_key,
            )?;
            tx.execute(
                "INSERT INTO entries(
                    user_id, entry_id, updated_at, version, payload, received_at, source_device_id
                 ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)
                 ON CONFLICT(user_id, entry_id) DO UPDATE SET
                    updated_at=excluded.updated_at,
                    version=excluded.version,
                    payload=excluded.payload,
                    received_at=excluded.received_at,
                    source_device_id=excluded.source_device_id",
                rusqlite::params![
                    user_id.to_string(),
                    change.entry_id.to_string(),
                    fmt_ts(change.updated_at),
                    change.version,
                    payload,
                    fmt_ts(Utc::now()),
                    source_device_id,
                ],
            )?;
            accepted += 1;
        }

        tx.commit()?;
        Ok(accepted)
    }

    fn changes_since(
        &self,
        user_id: Uuid,
        since: Option<DateTime<Utc>>,
    ) -> Result<Vec<MeasurementEntry>, VaultError> {
        let user_key = derive_user_key(&self.master_key, user_id);
        let conn = self.lock()?;

        let mut query =
            "SELECT payload FROM entries WHERE user_id = ?1".to_string();
        if since.is_some() {
            query.push_str(" AND updated_at > ?2");
        }
        query.push_str(" ORDER BY updated_at ASC");

        let mut stmt = conn.prepare(&query)?;
        let payloads: Vec<String> = match since {
            Some(since) => stmt
                .query_map(
                    rusqlite::params![user_id.to_string(), fmt_ts(since)],
                    |row| row.get(0),
                )?
                .collect::<Result<_, _>>()?,
            None => stmt
                .query_map(rusqlite::params![user_id.to_string()], |row| row.get(0))?
                .collect::<Result<_, _>>()?,
        };

        payloads
            .iter()
            .map(|blob| {
                let value = decrypt_payload(blob, &user_key)?;
                serde_json::from_value(value)
                    .map_err(|e| VaultError::Database(format!("Malformed entry payload: {e}")))
            })
            .collect()
    }

    fn list_users(&self) -> Result<Vec<UserSummary>, VaultError> {
        let conn = self.lock()?;
        let mut stmt = conn.prepare(
            "SELECT
                u.user_id,
                u.created_at,
                u.last_seen_at,
                (SELECT COUNT(*) FROM devices d WHERE d.user_id = u.user_id) AS device_count,
                (SELECT COUNT(*) FROM entries e WHERE e.user_id = u.user_id) AS entry_count
             FROM users u
             ORDER BY u.created_at ASC",
        )?;
        let rows: Vec<(String, String, Option<String>, i64, i64)> = stmt
            .query_map([], |row| {
                Ok((row.get(0)?, row.get(1)?, row.get(2)?, row.get(3)?, row.get(4)?))
            })?
            .collect::<Result<_, _>>()?;

        rows.into_iter()
            .map(|(user_id, created_at, last_seen_at, device_count, entry_count)| {
                Ok(UserSummary {
                    user_id: parse_uuid(&user_id)?,
                    created_at: parse_ts(&created_at)?,
                    last_seen_at: last_seen_at.as_deref().map(parse_ts).transpose()?,
                    device_count: device_count as usize,
                    entry_count: entry_count as usize,
                })
            })
            .collect()
    }

    fn list_devices(&self) -> Result<Vec<DeviceSummary>, VaultError> {
        let conn = self.lock()?;
        let mut stmt = conn.prepare(
            "SELECT device_id, user_id, device_name, created_at, last_seen_at
             FROM devices ORDER BY created_at ASC",
        )?;
        let rows: Vec<(String, String, Option<String>, String, Option<String>)> = stmt
            .query_map([], |row| {
                Ok((row.get(0)?, row.get(1)?, row.get(2)?, row.get(3)?, row.get(4)?))
            })?
            .collect::<Result<_, _>>()?;

        rows.into_iter()
            .map(|(device_id, user_id, device_name, created_at, last_seen_at)| {
                Ok(DeviceSummary {
                    device_id,
                    user_id: parse_uuid(&user_id)?,
                    device_name,
                    created_at: parse_ts(&created_at)?,
                    last_seen_at: last_seen_at.as_deref().map(parse_ts).transpose()?,
                })
            })
            .collect()
    }

    fn list_invites(&self) -> Result<Vec<InviteSummary>, VaultError> {
        let conn = self.lock()?;
        let mut stmt = conn.prepare(
            "SELECT token_hash, created_at, expires_at, used_at
             FROM invites ORDER BY created_at DESC",
        )?;
        let rows: Vec<(String, String, Option<String>, Option<String>)> = stmt
            .query_map([], |row| {
                Ok((row.get(0)?, row.get(1)?, row.get(2)?, row.get(3)?))
            })?
            .collect::<Result<_, _>>()?;

        rows.into_iter()
            .map(|(token_hash, created_at, expires_at, used_at)| {
                Ok(InviteSummary {
                    token_hash,
                    created_at: parse_ts(&created_at)?,
                    expires_at: expires_at.as_deref().map(parse_ts).transpose()?,
                    used_at: used_at.as_deref().map(parse_ts).transpose()?,
                })
            })
            .collect()
    }

    fn count_entries(&self) -> Result<usize, VaultError> {
        let conn = self.lock()?;
        let total: i64 =
            conn.query_row("SELECT COUNT(*) FROM entries", [], |row| row.get(0))?;
        Ok(total as usize)
    }

    fn create_invite_token(
        &self,
        expires_at: Option<DateTime<Utc>>,
    ) -> Result<String, VaultError> {
        let token = generate_invite_token();
        let conn = self.lock()?;
        conn.execute(
            "INSERT INTO invites(token_hash, created_at, expires_at) VALUES(?1, ?2, ?3)",
            rusqlite::params![
                hash_token(&token),
                fmt_ts(Utc::now()),
                expires_at.map(fmt_ts),
            ],
        )?;
        Ok(token)
    }
}
