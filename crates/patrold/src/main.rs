//! patrold — Patrol dispatch and messaging daemon.

use std::sync::Arc;

use anyhow::{Context, Result};
use tokio::sync::broadcast;

use patrol_core::codec::{CodecSecret, IdCodec};
use patrol_core::config::{PatrolConfig, StorageBackend};
use patrol_services::{
    BroadcastNotifier, Directory, MemoryDirectory, MemoryMessageStore, MessageRepository,
    SqliteStore,
};

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .init();

    // Load config
    if let Err(e) = PatrolConfig::write_default_if_missing() {
        tracing::warn!(error = %e, "failed to write default config");
    }
    let config = PatrolConfig::load().unwrap_or_else(|e| {
        tracing::warn!(error = %e, "failed to load config, using defaults");
        PatrolConfig::default()
    });
    tracing::info!(
        config = %PatrolConfig::file_path().display(),
        backend = config.storage.backend.as_str(),
        "patrold starting"
    );

    // ── Codec ────────────────────────────────────────────────────────────────
    let secret = match config.codec_secret().context("invalid codec secret in config")? {
        Some(secret) => secret,
        None => {
            tracing::warn!("no codec secret configured; tokens will not survive a restart");
            CodecSecret::generate()
        }
    };
    let codec = Arc::new(IdCodec::new(&secret));
    drop(secret);

    // ── Storage ──────────────────────────────────────────────────────────────
    let (directory, messages): (Arc<dyn Directory>, Arc<dyn MessageRepository>) =
        match config.storage.backend {
            StorageBackend::Memory => (
                Arc::new(MemoryDirectory::new()),
                Arc::new(MemoryMessageStore::new()),
            ),
            StorageBackend::Sqlite => {
                let store = SqliteStore::open(&config.storage.path).with_context(|| {
                    format!("failed to open {}", config.storage.path.display())
                })?;
                tracing::info!(path = %config.storage.path.display(), "sqlite store opened");
                (Arc::new(store.clone()), Arc::new(store))
            }
        };

    // ── Notifications ────────────────────────────────────────────────────────
    let notifier = BroadcastNotifier::new(config.messaging.notification_buffer);
    let notification_task = {
        let mut rx = notifier.subscribe();
        tokio::spawn(async move {
            loop {
                match rx.recv().await {
                    Ok(message) => tracing::debug!(
                        message_id = message.id,
                        order_id = message.order_id,
                        receiver_id = message.receiver_id,
                        content_len = message.content.chars().count(),
                        "message notification"
                    ),
                    Err(broadcast::error::RecvError::Lagged(skipped)) => {
                        tracing::warn!(skipped, "notification log lagging")
                    }
                    Err(broadcast::error::RecvError::Closed) => break,
                }
            }
        })
    };

    // ── Shutdown channel ─────────────────────────────────────────────────────
    let (shutdown_tx, _) = broadcast::channel::<()>(1);

    {
        let shutdown = shutdown_tx.clone();
        tokio::spawn(async move {
            tokio::signal::ctrl_c().await.ok();
            tracing::info!("shutdown signal received");
            let _ = shutdown.send(());
        });
    }

    // ── API ──────────────────────────────────────────────────────────────────
    let state = patrol_api::ApiState::new(
        codec,
        directory,
        messages,
        Arc::new(notifier),
        config.messaging.clone(),
        config.storage.backend,
    );
    let api_task = {
        let mut shutdown_rx = shutdown_tx.subscribe();
        let bind = config.api.bind.clone();
        let port = config.api.port;
        tokio::spawn(async move {
            let signal = async move {
                shutdown_rx.recv().await.ok();
            };
            if let Err(e) = patrol_api::serve(state, &bind, port, signal).await {
                tracing::error!(error = %e, "API server failed");
            }
        })
    };

    // ── Wait for exit ────────────────────────────────────────────────────────

    let mut shutdown_rx = shutdown_tx.subscribe();

    tokio::select! {
        _ = shutdown_rx.recv()  => tracing::info!("shutting down"),
        r = api_task            => tracing::error!("API task exited: {:?}", r),
        r = notification_task   => tracing::error!("notification task exited: {:?}", r),
    }

    Ok(())
}
