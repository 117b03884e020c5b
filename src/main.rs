// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! WHOOP Sentinel server
//!
//! Runs the scheduled WHOOP jobs and serves the command API used by the
//! messaging front-end.

use std::sync::Arc;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};
use whoop_sentinel::{
    config::{Config, StorageBackend},
    db::{FirestoreDb, MemoryDb, Store},
    services::{KmsService, LogNotifier, Notifier, StaticAdvisor, TelegramNotifier},
    AppState,
};

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Initialize structured JSON logging for GCP
    init_logging();

    // Load configuration from environment
    let config = Config::from_env().expect("Failed to load configuration");
    tracing::info!(port = config.port, "Starting WHOOP Sentinel");

    let store: Arc<dyn Store> = match config.storage_backend {
        StorageBackend::Firestore => {
            let kms = KmsService::new(
                &config.gcp_project_id,
                &config.gcp_region,
                "token-encryption",
            )
            .await
            .expect("Failed to initialize KMS service");
            tracing::info!("KMS service initialized");

            Arc::new(
                FirestoreDb::new(&config.gcp_project_id, kms)
                    .await
                    .expect("Failed to connect to Firestore"),
            )
        }
        StorageBackend::Memory => {
            tracing::warn!("Using in-memory storage, state is lost on restart");
            Arc::new(MemoryDb::new())
        }
    };

    let notifier: Arc<dyn Notifier> = match &config.telegram_bot_token {
        Some(token) => Arc::new(TelegramNotifier::new(token.clone())),
        None => {
            tracing::warn!("TELEGRAM_BOT_TOKEN not set, alerts will only be logged");
            Arc::new(LogNotifier)
        }
    };

    let state = Arc::new(AppState::assemble(
        config.clone(),
        store,
        notifier,
        Arc::new(StaticAdvisor),
    ));

    state
        .commands
        .start(&config.monitoring_defaults)
        .await
        .expect("Failed to start scheduled jobs");

    // Build router
    let app = whoop_sentinel::routes::create_router(state.clone());

    // Start server
    let addr = format!("0.0.0.0:{}", config.port);
    let listener = tokio::net::TcpListener::bind(&addr).await?;
    tracing::info!(address = %addr, "Server listening");

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    state.commands.scheduler().shutdown();
    tracing::info!("Scheduler stopped");
    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!(error = %e, "Failed to listen for shutdown signal");
        std::future::pending::<()>().await;
    }
    tracing::info!("Shutdown signal received");
}

/// Initialize structured JSON logging (GCP-compliant).
fn init_logging() {
    let format = tracing_subscriber::fmt::layer()
        .json()
        .with_target(false)
        .with_current_span(true)
        .flatten_event(true);

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive("whoop_sentinel=debug".parse().unwrap())
                .add_directive("info".parse().unwrap()),
        )
        .with(format)
        .init();
}
