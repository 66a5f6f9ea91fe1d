// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

use std::net::SocketAddr;

use axum_server::tls_rustls::RustlsConfig;
use tracing_subscriber::EnvFilter;

use body_metrics_vault::api::router;
use body_metrics_vault::config::VaultConfig;
use body_metrics_vault::state::AppState;

#[tokio::main]
async fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    // Install the ring crypto provider for rustls (must be done before any TLS operations)
    rustls::crypto::ring::default_provider()
        .install_default()
        .expect("Failed to install rustls crypto provider");

    let config = VaultConfig::from_env().expect("Invalid vault configuration");
    let backend = config.build_backend().expect("Failed to open vault backend");

    tracing::info!(
        backend = if config.storage_path.is_some() { "sqlite" } else { "memory" },
        storage = ?config.storage_path,
        admin = config.admin_token.is_some(),
        bootstrap_invites = config.bootstrap_invites.len(),
        "vault backend ready"
    );

    let state = AppState::new(backend, config.admin_token.clone());
    let app = router(state);

    let addr: SocketAddr = format!("{}:{}", config.host, config.port)
        .parse()
        .expect("Failed to parse bind address");

    if config.tls_enabled() {
        let (cert, key) = (
            config.tls_cert.as_ref().expect("checked by tls_enabled"),
            config.tls_key.as_ref().expect("checked by tls_enabled"),
        );
        let tls_config = RustlsConfig::from_pem_file(cert, key)
            .await
            .expect("Failed to load TLS certificate/key");

        tracing::info!("vault listening on https://{addr} (docs at /docs)");
        axum_server::bind_rustls(addr, tls_config)
            .serve(app.into_make_service())
            .await
            .expect("HTTPS server failed");
    } else {
        tracing::info!("vault listening on http://{addr} (docs at /docs)");
        let listener = tokio::net::TcpListener::bind(addr)
            .await
            .expect("Failed to bind");
        axum::serve(listener, app)
            .await
            .expect("HTTP server failed");
    }
}
