// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! Push/pull sync handlers.
//!
//! Both directions authenticate the `X-User-Token` bearer header and verify
//! that the request body's `user_id` matches the authenticated identity, so
//! a valid token for user A can never touch user B's namespace.
//!
//! `next_since` is the server's clock, not any entry's timestamp. Under
//! clock skew between rapid successive requests a record written in the
//! same instant as a prior `next_since` capture can be missed until a later
//! cursor covers it; entries merge idempotently, so delivery is
//! at-least-once over time rather than exactly-consistent per pull.

use axum::{
    extract::{Query, State},
    http::HeaderMap,
    Json,
};
use chrono::{DateTime, Utc};
use serde::Deserialize;
use utoipa::IntoParams;
use uuid::Uuid;

use crate::{
    error::ApiError,
    models::{SyncPullRequest, SyncPullResponse, SyncPushRequest, SyncPushResponse},
    state::AppState,
};

const USER_TOKEN_HEADER: &str = "x-user-token";

/// Extract and authenticate the bearer token, then enforce that the claimed
/// `user_id` matches the token's identity.
fn authenticate_user(
    state: &AppState,
    headers: &HeaderMap,
    claimed_user_id: Uuid,
) -> Result<Uuid, ApiError> {
    let token = headers
        .get(USER_TOKEN_HEADER)
        .and_then(|value| value.to_str().ok())
        .ok_or_else(|| ApiError::unauthorized("Missing X-User-Token header"))?;
    let user_id = state.backend.authenticate(token)?;
    if claimed_user_id != user_id {
        return Err(ApiError::forbidden("User mismatch"));
    }
    Ok(user_id)
}

/// Upload locally-changed entries.
///
/// Entries that lose conflict resolution are dropped silently; they only
/// show up as a lower `accepted_count`.
#[utoipa::path(
    post,
    path = "/sync/push",
    tag = "Sync",
    request_body = SyncPushRequest,
    responses(
        (status = 200, description = "Changes applied", body = SyncPushResponse),
        (status = 401, description = "Missing, invalid, or revoked user token"),
        (status = 403, description = "Token does not belong to the claimed user")
    )
)]
pub async fn sync_push(
    State(state): State<AppState>,
    headers: HeaderMap,
    Json(request): Json<SyncPushRequest>,
) -> Result<Json<SyncPushResponse>, ApiError> {
    let user_id = authenticate_user(&state, &headers, request.user_id)?;

    let accepted_count =
        state
            .backend
            .apply_changes(user_id, &request.changes, &request.device_id)?;

    tracing::debug!(
        %user_id,
        device = %request.device_id,
        pushed = request.changes.len(),
        accepted = accepted_count,
        "push applied"
    );

    let server_time = Utc::now();
    Ok(Json(SyncPushResponse {
        server_time,
        accepted_count,
        next_since: server_time,
    }))
}

/// Fetch entries changed after the client's cursor.
#[utoipa::path(
    post,
    path = "/sync/pull",
    tag = "Sync",
    request_body = SyncPullRequest,
    responses(
        (status = 200, description = "Changes since the cursor", body = SyncPullResponse),
        (status = 401, description = "Missing, invalid, or revoked user token"),
        (status = 403, description = "Token does not belong to the claimed user")
    )
)]
pub async fn sync_pull(
    State(state): State<AppState>,
    headers: HeaderMap,
    Json(request): Json<SyncPullRequest>,
) -> Result<Json<SyncPullResponse>, ApiError> {
    let user_id = authenticate_user(&state, &headers, request.user_id)?;

    state.backend.touch_device(user_id, &request.device_id)?;
    let changes = state.backend.changes_since(user_id, request.since)?;

    let server_time = Utc::now();
    Ok(Json(SyncPullResponse {
        server_time,
        changes,
        next_since: server_time,
    }))
}

/// Query-parameter variant of pull.
#[derive(Debug, Deserialize, IntoParams)]
pub struct PullQuery {
    pub user_id: Uuid,
    pub device_id: String,
    /// ISO-8601 with timezone offset; naive timestamps are rejected.
    pub since: Option<String>,
}

/// Fetch entries changed after the cursor (query-parameter variant).
#[utoipa::path(
    get,
    path = "/sync/pull",
    tag = "Sync",
    params(PullQuery),
    responses(
        (status = 200, description = "Changes since the cursor", body = SyncPullResponse),
        (status = 400, description = "Naive or malformed `since` timestamp"),
        (status = 401, description = "Missing, invalid, or revoked user token"),
        (status = 403, description = "Token does not belong to the claimed user")
    )
)]
pub async fn sync_pull_query(
    State(state): State<AppState>,
    headers: HeaderMap,
    Query(params): Query<PullQuery>,
) -> Result<Json<SyncPullResponse>, ApiError> {
    let since = params
        .since
        .as_deref()
        .map(|raw| {
            DateTime::parse_from_rfc3339(raw)
                .map(|dt| dt.with_timezone(&Utc))
                .map_err(|_| ApiError::bad_request("since must be timezone-aware"))
        })
        .transpose()?;

    sync_pull(
        State(state),
        headers,
        Json(SyncPullRequest {
            user_id: params.user_id,
            device_id: params.device_id,
            since,
        }),
    )
    .await
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::api::invite::auth_invite;
    use crate::models::{InviteRequest, MeasurementEntry};
    use axum::http::StatusCode;

    fn headers_with_token(token: &str) -> HeaderMap {
        let mut headers = HeaderMap::new();
        headers.insert(USER_TOKEN_HEADER, token.parse().unwrap());
        headers
    }

    /// Redeem an invite through the real handler, returning (user, token).
    async fn join_vault(state: &AppState, invite: &str, device: &str) -> (Uuid, String) {
        state
            .backend
            .load_bootstrap_invites(&[invite.to_string()])
            .unwrap();
        let Json(response) = auth_invite(
            State(state.clone()),
            Json(InviteRequest {
                invite_token: invite.to_string(),
                device_name: device.to_string(),
                user_id: None,
                device_id: Some(device.to_string()),
            }),
        )
        .await
        .unwrap();
        (response.user_id, response.user_token)
    }

    fn entry(user_id: Uuid, weight_kg: f64, version: i64) -> MeasurementEntry {
        let measured_at = DateTime::parse_from_rfc3339("2026-03-01T07:00:00+00:00").unwrap();
        let mut entry = MeasurementEntry::new(user_id, measured_at, weight_kg, None);
        entry.version = version;
        entry
    }

    fn push_request(user_id: Uuid, device_id: &str, changes: Vec<MeasurementEntry>) -> SyncPushRequest {
        SyncPushRequest {
            user_id,
            device_id: device_id.to_string(),
            since: None,
            changes,
        }
    }

    fn pull_request(user_id: Uuid, device_id: &str, since: Option<DateTime<Utc>>) -> SyncPullRequest {
        SyncPullRequest {
            user_id,
            device_id: device_id.to_string(),
            since,
        }
    }

    #[tokio::test]
    async fn invite_push_pull_scenario() {
        let state = AppState::default();

        // laptop-1 redeems "abc123" for a fresh user.
        let (user_id, token) = join_vault(&state, "abc123", "laptop-1").await;
        let headers = headers_with_token(&token);

        // laptop-1 pushes one entry at version 1.
        let pushed = entry(user_id, 70.2, 1);
        let before_push = Utc::now();
        let Json(push) = sync_push(
            State(state.clone()),
            headers.clone(),
            Json(push_request(user_id, "laptop-1", vec![pushed.clone()])),
        )
        .await
        .unwrap();
        assert_eq!(push.accepted_count, 1);
        assert_eq!(push.next_since, push.server_time);

        // phone-1 pulls with the same user token and sees exactly that entry.
        let Json(pull) = sync_pull(
            State(state.clone()),
            headers.clone(),
            Json(pull_request(user_id, "phone-1", None)),
        )
        .await
        .unwrap();
        assert_eq!(pull.changes.len(), 1);
        assert_eq!(pull.changes[0].entry_id, pushed.entry_id);
        assert_eq!(pull.changes[0].weight_kg, 70.2);

        // phone-1 pushes a modified copy at version 2.
        let mut modified = pushed.clone();
        modified.weight_kg = 70.5;
        modified.version = 2;
        modified.updated_at = Utc::now();
        let Json(push2) = sync_push(
            State(state.clone()),
            headers.clone(),
            Json(push_request(user_id, "phone-1", vec![modified])),
        )
        .await
        .unwrap();
        assert_eq!(push2.accepted_count, 1);

        // laptop-1 pulls with a cursor from before the second push and gets
        // the version-2 entry, not version 1.
        let Json(pull2) = sync_pull(
            State(state.clone()),
            headers,
            Json(pull_request(user_id, "laptop-1", Some(before_push))),
        )
        .await
        .unwrap();
        assert_eq!(pull2.changes.len(), 1);
        assert_eq!(pull2.changes[0].version, 2);
        assert_eq!(pull2.changes[0].weight_kg, 70.5);
    }

    #[tokio::test]
    async fn stale_push_converges_to_newest_version() {
        let state = AppState::default();
        let (user_id, token) = join_vault(&state, "abc123", "device-a").await;
        let headers = headers_with_token(&token);

        let v3 = entry(user_id, 71.0, 3);
        sync_push(
            State(state.clone()),
            headers.clone(),
            Json(push_request(user_id, "device-a", vec![v3.clone()])),
        )
        .await
        .unwrap();

        // device-b pushes an older version of the same entry.
        let mut v2 = v3.clone();
        v2.version = 2;
        v2.weight_kg = 60.0;
        let Json(push) = sync_push(
            State(state.clone()),
            headers.clone(),
            Json(push_request(user_id, "device-b", vec![v2])),
        )
        .await
        .unwrap();
        assert_eq!(push.accepted_count, 0, "stale version dropped silently");

        // device-b converges to version 3 on its next pull.
        let Json(pull) = sync_pull(
            State(state),
            headers,
            Json(pull_request(user_id, "device-b", None)),
        )
        .await
        .unwrap();
        assert_eq!(pull.changes[0].version, 3);
        assert_eq!(pull.changes[0].weight_kg, 71.0);
    }

    #[tokio::test]
    async fn pull_cursor_is_monotonic() {
        let state = AppState::default();
        let (user_id, token) = join_vault(&state, "abc123", "laptop-1").await;
        let headers = headers_with_token(&token);

        sync_push(
            State(state.clone()),
            headers.clone(),
            Json(push_request(user_id, "laptop-1", vec![entry(user_id, 70.2, 1)])),
        )
        .await
        .unwrap();

        let Json(first) = sync_pull(
            State(state.clone()),
            headers.clone(),
            Json(pull_request(user_id, "laptop-1", None)),
        )
        .await
        .unwrap();
        assert_eq!(first.changes.len(), 1);

        // Replaying next_since with no intervening pushes is empty, twice.
        for _ in 0..2 {
            let Json(again) = sync_pull(
                State(state.clone()),
                headers.clone(),
                Json(pull_request(user_id, "laptop-1", Some(first.next_since))),
            )
            .await
            .unwrap();
            assert!(again.changes.is_empty());
        }
    }

    #[tokio::test]
    async fn tombstones_propagate_to_other_devices() {
        let state = AppState::default();
        let (user_id, token) = join_vault(&state, "abc123", "laptop-1").await;
        let headers = headers_with_token(&token);

        let mut e = entry(user_id, 70.2, 1);
        sync_push(
            State(state.clone()),
            headers.clone(),
            Json(push_request(user_id, "laptop-1", vec![e.clone()])),
        )
        .await
        .unwrap();

        e.soft_delete();
        sync_push(
            State(state.clone()),
            headers.clone(),
            Json(push_request(user_id, "laptop-1", vec![e.clone()])),
        )
        .await
        .unwrap();

        let Json(pull) = sync_pull(
            State(state),
            headers,
            Json(pull_request(user_id, "phone-1", None)),
        )
        .await
        .unwrap();
        assert_eq!(pull.changes.len(), 1, "tombstone present, never missing");
        assert!(pull.changes[0].is_deleted);
        assert_eq!(pull.changes[0].version, 2);
    }

    #[tokio::test]
    async fn missing_token_is_unauthorized() {
        let state = AppState::default();
        let err = sync_push(
            State(state),
            HeaderMap::new(),
            Json(push_request(Uuid::new_v4(), "laptop-1", vec![])),
        )
        .await
        .unwrap_err();
        assert_eq!(err.status, StatusCode::UNAUTHORIZED);
    }

    #[tokio::test]
    async fn invalid_token_is_unauthorized() {
        let state = AppState::default();
        let err = sync_pull(
            State(state),
            headers_with_token("bogus"),
            Json(pull_request(Uuid::new_v4(), "laptop-1", None)),
        )
        .await
        .unwrap_err();
        assert_eq!(err.status, StatusCode::UNAUTHORIZED);
    }

    #[tokio::test]
    async fn token_cannot_cross_user_namespaces() {
        let state = AppState::default();
        let (_alice, token) = join_vault(&state, "abc123", "laptop-1").await;

        // Claiming a different user_id with Alice's token is forbidden.
        let err = sync_push(
            State(state),
            headers_with_token(&token),
            Json(push_request(Uuid::new_v4(), "laptop-1", vec![])),
        )
        .await
        .unwrap_err();
        assert_eq!(err.status, StatusCode::FORBIDDEN);
        assert_eq!(err.message, "User mismatch");
    }

    #[tokio::test]
    async fn query_variant_rejects_naive_since() {
        let state = AppState::default();
        let (user_id, token) = join_vault(&state, "abc123", "laptop-1").await;

        let err = sync_pull_query(
            State(state),
            headers_with_token(&token),
            Query(PullQuery {
                user_id,
                device_id: "laptop-1".to_string(),
                since: Some("2026-03-01T07:00:00".to_string()),
            }),
        )
        .await
        .unwrap_err();
        assert_eq!(err.status, StatusCode::BAD_REQUEST);
        assert_eq!(err.message, "since must be timezone-aware");
    }

    #[tokio::test]
    async fn query_variant_accepts_offset_since() {
        let state = AppState::default();
        let (user_id, token) = join_vault(&state, "abc123", "laptop-1").await;

        let Json(pull) = sync_pull_query(
            State(state),
            headers_with_token(&token),
            Query(PullQuery {
                user_id,
                device_id: "laptop-1".to_string(),
                since: Some("2026-03-01T07:00:00+00:00".to_string()),
            }),
        )
        .await
        .unwrap();
        assert!(pull.changes.is_empty());
    }
}
