// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

use std::{net::SocketAddr, sync::Arc};

use anyhow::Context;
use tokio_util::sync::CancellationToken;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use user_role_server::{
    api::router,
    auth::{PasswordHasher, TokenIssuer},
    config::{Config, LogFormat, DEFAULT_LOG_FILTER},
    state::AppState,
    storage::CredentialStore,
};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // A missing .env file is not an error.
    let dotenv = dotenvy::dotenv();

    let config = Config::from_env().context("invalid configuration")?;
    init_tracing(config.log_format);
    if let Ok(path) = &dotenv {
        tracing::debug!(path = %path.display(), "Loaded .env file");
    }
    tracing::info!(?config, "Configuration loaded");

    let store_path = config.store_path();
    let store = Arc::new(
        CredentialStore::open(&store_path)
            .with_context(|| format!("failed to open credential store at {}", store_path.display()))?,
    );
    tracing::info!(path = %store_path.display(), "Credential store opened");

    let passwords = PasswordHasher::new(config.bcrypt_cost).context("invalid bcrypt cost")?;
    let tokens = TokenIssuer::new(&config.jwt_secret, config.jwt_expires_in);
    let state = AppState::new(store.clone(), tokens, passwords, config.store_timeout);
    let app = router(state);

    let addr = SocketAddr::new(config.host, config.port);
    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .with_context(|| format!("failed to bind {addr}"))?;
    tracing::info!(%addr, "User & Role server listening (docs at /docs)");

    let shutdown = CancellationToken::new();
    tokio::spawn(watch_signals(shutdown.clone()));

    axum::serve(listener, app)
        .with_graceful_shutdown(async move { shutdown.cancelled().await })
        .await
        .context("HTTP server failed")?;

    match Arc::try_unwrap(store) {
        Ok(store) => {
            drop(store);
            tracing::info!("Credential store closed");
        }
        Err(_) => tracing::warn!("Credential store still referenced at shutdown"),
    }
    Ok(())
}

fn init_tracing(format: LogFormat) {
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(DEFAULT_LOG_FILTER));
    let registry = tracing_subscriber::registry().with(filter);

    match format {
        LogFormat::Json => registry.with(tracing_subscriber::fmt::layer().json()).init(),
        LogFormat::Pretty => registry.with(tracing_subscriber::fmt::layer()).init(),
    }
}

/// Cancel `shutdown` on Ctrl+C or SIGTERM.
async fn watch_signals(shutdown: CancellationToken) {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            tracing::error!(error = %e, "Failed to listen for Ctrl+C");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        use tokio::signal::unix::{signal, SignalKind};
        match signal(SignalKind::terminate()) {
            Ok(mut sigterm) => {
                sigterm.recv().await;
            }
            Err(e) => {
                tracing::error!(error = %e, "Failed to listen for SIGTERM");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }

    tracing::info!("Shutdown signal received, draining connections");
    shutdown.cancel();
}
