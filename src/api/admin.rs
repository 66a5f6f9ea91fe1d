// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! Admin-only endpoints for vault management.
//!
//! Gated by the `X-Admin-Token` shared secret. When no admin token is
//! configured the endpoints degrade to 503 rather than taking the whole
//! server down; a configured-but-mismatched token is 401.

use axum::{extract::State, http::HeaderMap, Json};
use chrono::{Duration, Utc};

use crate::{
    error::ApiError,
    models::{AdminOverviewResponse, CreateInviteRequest, CreateInviteResponse},
    state::AppState,
};

const ADMIN_TOKEN_HEADER: &str = "x-admin-token";

fn require_admin(state: &AppState, headers: &HeaderMap) -> Result<(), ApiError> {
    let configured = state
        .admin_token
        .as_deref()
        .ok_or_else(|| ApiError::service_unavailable("Admin token not configured"))?;

    let presented = headers
        .get(ADMIN_TOKEN_HEADER)
        .and_then(|value| value.to_str().ok());
    if presented != Some(configured) {
        return Err(ApiError::unauthorized("Invalid admin token"));
    }
    Ok(())
}

/// Roll-up of users, devices, invites, and entry counts.
#[utoipa::path(
    get,
    path = "/admin/overview",
    tag = "Admin",
    responses(
        (status = 200, description = "Vault overview", body = AdminOverviewResponse),
        (status = 401, description = "Invalid admin token"),
        (status = 503, description = "Admin token not configured")
    )
)]
pub async fn admin_overview(
    State(state): State<AppState>,
    headers: HeaderMap,
) -> Result<Json<AdminOverviewResponse>, ApiError> {
    require_admin(&state, &headers)?;

    Ok(Json(AdminOverviewResponse {
        users: state.backend.list_users()?,
        devices: state.backend.list_devices()?,
        invites: state.backend.list_invites()?,
        total_entries: state.backend.count_entries()?,
    }))
}

/// Mint a new single-use invite token.
///
/// The raw token appears in this response and nowhere else — only its hash
/// is persisted.
#[utoipa::path(
    post,
    path = "/admin/invites",
    tag = "Admin",
    request_body = CreateInviteRequest,
    responses(
        (status = 200, description = "Invite minted", body = CreateInviteResponse),
        (status = 401, description = "Invalid admin token"),
        (status = 503, description = "Admin token not configured")
    )
)]
pub async fn create_invite(
    State(state): State<AppState>,
    headers: HeaderMap,
    body: Option<Json<CreateInviteRequest>>,
) -> Result<Json<CreateInviteResponse>, ApiError> {
    require_admin(&state, &headers)?;

    let request = body.map(|Json(request)| request).unwrap_or_default();
    let expires_at = request
        .expires_in_days
        .map(|days| Utc::now() + Duration::days(days));
    let invite_token = state.backend.create_invite_token(expires_at)?;

    tracing::info!(expires = ?expires_at, "invite minted");

    Ok(Json(CreateInviteResponse {
        invite_token,
        expires_at,
    }))
}
