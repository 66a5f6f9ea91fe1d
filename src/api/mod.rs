// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! # HTTP API
//!
//! Stateless request handlers over the shared [`crate::vault::VaultBackend`];
//! all state lives in the backend. Endpoints:
//!
//! | Method & path | Auth | Purpose |
//! |---|---|---|
//! | `GET /health` | none | liveness probe |
//! | `POST /auth/invite` | none | redeem a single-use invite, issue a user token |
//! | `POST /sync/push` | `X-User-Token` | upload changed entries |
//! | `POST/GET /sync/pull` | `X-User-Token` | fetch entries after a cursor |
//! | `GET /admin/overview` | `X-Admin-Token` | users/devices/invites roll-up |
//! | `POST /admin/invites` | `X-Admin-Token` | mint an invite token |

use axum::{
    routing::{get, post},
    Router,
};
use tower_http::{cors::CorsLayer, trace::TraceLayer};
use utoipa::OpenApi;
use utoipa_swagger_ui::SwaggerUi;

use crate::{
    models::{
        AdminOverviewResponse, CreateInviteRequest, CreateInviteResponse, DeviceSummary,
        InviteRequest, InviteResponse, InviteSummary, MeasurementEntry, SyncPullRequest,
        SyncPullResponse, SyncPushRequest, SyncPushResponse, UserSummary,
    },
    state::AppState,
};

pub mod admin;
pub mod health;
pub mod invite;
pub mod sync;

pub fn router(state: AppState) -> Router {
    let routes = Router::new()
        .route("/health", get(health::health))
        .route("/auth/invite", post(invite::auth_invite))
        .route("/sync/push", post(sync::sync_push))
        .route("/sync/pull", post(sync::sync_pull).get(sync::sync_pull_query))
        .route("/admin/overview", get(admin::admin_overview))
        .route("/admin/invites", post(admin::create_invite))
        .with_state(state);

    Router::new()
        .merge(routes)
        .merge(SwaggerUi::new("/docs").url("/api-doc/openapi.json", ApiDoc::openapi()))
        .layer(CorsLayer::permissive())
        .layer(TraceLayer::new_for_http())
}

#[derive(OpenApi)]
#[openapi(
    paths(
        health::health,
        invite::auth_invite,
        sync::sync_push,
        sync::sync_pull,
        sync::sync_pull_query,
        admin::admin_overview,
        admin::create_invite
    ),
    components(
        schemas(
            MeasurementEntry,
            InviteRequest,
            InviteResponse,
            SyncPushRequest,
            SyncPushResponse,
            SyncPullRequest,
            SyncPullResponse,
            AdminOverviewResponse,
            UserSummary,
            DeviceSummary,
            InviteSummary,
            CreateInviteRequest,
            CreateInviteResponse
        )
    ),
    tags(
        (name = "Health", description = "Liveness probe"),
        (name = "Auth", description = "Invite redemption and token issuance"),
        (name = "Sync", description = "Cursor-based push/pull synchronization"),
        (name = "Admin", description = "Vault introspection and invite minting")
    )
)]
struct ApiDoc;
