// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

use axum::{extract::State, Json};
use uuid::Uuid;

use crate::{
    error::ApiError,
    models::{InviteRequest, InviteResponse},
    state::AppState,
};

/// Redeem a single-use invite token and issue a fresh user token.
///
/// When `user_id` is absent this is a first-device bootstrap and the vault
/// generates one. Every redemption issues a brand-new token — tokens are
/// never shared across devices.
#[utoipa::path(
    post,
    path = "/auth/invite",
    tag = "Auth",
    request_body = InviteRequest,
    responses(
        (status = 200, description = "Invite redeemed, token issued", body = InviteResponse),
        (status = 403, description = "Invite invalid, already used, or expired")
    )
)]
pub async fn auth_invite(
    State(state): State<AppState>,
    Json(request): Json<InviteRequest>,
) -> Result<Json<InviteResponse>, ApiError> {
    state.backend.consume_invite(&request.invite_token)?;

    let user_id = request.user_id.unwrap_or_else(Uuid::new_v4);
    state.backend.ensure_user(user_id)?;
    if let Some(device_id) = &request.device_id {
        state
            .backend
            .record_device(user_id, device_id, Some(&request.device_name))?;
    }
    let user_token = state.backend.issue_user_token(user_id)?;

    tracing::info!(%user_id, device = %request.device_name, "invite redeemed");

    Ok(Json(InviteResponse {
        user_id,
        user_token,
        expires_at: None,
    }))
}
