//! Event loop: long-poll the Bot API, fan events out, sweep in the background.
//!
//! Each update is handled on its own task so a conversion in progress never
//! delays answers to other users. Per-user ordering comes from the session
//! store, not from the loop. On Ctrl+C (or SIGTERM) polling stops, the
//! janitor is stopped, and every in-flight handler is awaited before
//! [`run`] returns.

use crate::config::BotConfig;
use crate::dialogue::DialogueController;
use crate::error::BotError;
use crate::pdf::PdfEngine;
use crate::telegram::TelegramClient;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tokio::task::{JoinError, JoinSet};
use tracing::{error, info, warn};

/// Pause after a failed `getUpdates` before polling again.
const POLL_BACKOFF: Duration = Duration::from_secs(5);

/// Connect, then serve until a shutdown signal arrives.
pub async fn run<E: PdfEngine>(config: BotConfig, engine: Arc<E>) -> Result<(), BotError> {
    let client = Arc::new(TelegramClient::new(&config)?);
    let name = client.get_me().await?;
    info!("Connected as @{}", name);

    let janitor_interval = config.janitor_interval();
    let controller = Arc::new(DialogueController::new(config, client.clone(), engine)?);

    // Leftovers from a previous run are swept before the first update.
    controller.sweep().await;

    let (stop_tx, stop_rx) = watch::channel(false);
    let janitor = tokio::spawn(janitor(Arc::clone(&controller), janitor_interval, stop_rx));

    let mut handlers = JoinSet::new();
    let mut offset = 0i64;
    let shutdown = shutdown_signal();
    tokio::pin!(shutdown);

    loop {
        tokio::select! {
            _ = &mut shutdown => break,
            Some(finished) = handlers.join_next(), if !handlers.is_empty() => log_handler(finished),
            polled = client.get_updates(offset) => match polled {
                Ok(updates) => {
                    for update in updates {
                        offset = offset.max(update.update_id + 1);
                        let controller = Arc::clone(&controller);
                        handlers.spawn(async move { controller.handle(update.into_event()).await });
                    }
                }
                Err(e) => {
                    warn!("Polling failed: {}; retrying in {}s", e, POLL_BACKOFF.as_secs());
                    tokio::select! {
                        _ = &mut shutdown => break,
                        _ = tokio::time::sleep(POLL_BACKOFF) => {}
                    }
                }
            },
        }
    }

    let _ = stop_tx.send(true);
    if !handlers.is_empty() {
        info!("Waiting for {} in-flight handlers", handlers.len());
    }
    while let Some(finished) = handlers.join_next().await {
        log_handler(finished);
    }
    if let Err(e) = janitor.await {
        warn!("Janitor task ended abnormally: {}", e);
    }
    info!("Bot stopped");
    Ok(())
}

async fn janitor<E: PdfEngine>(
    controller: Arc<DialogueController<E>>,
    every: Duration,
    mut stop: watch::Receiver<bool>,
) {
    let mut interval = tokio::time::interval(every);
    interval.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);
    // The first tick fires immediately; startup already swept.
    interval.tick().await;
    loop {
        tokio::select! {
            _ = interval.tick() => {
                controller.sweep().await;
            }
            _ = stop.changed() => break,
        }
    }
}

fn log_handler(finished: Result<(), JoinError>) {
    // Handlers catch their own panics; this only sees runtime-level failures.
    if let Err(e) = finished {
        error!("Event handler task failed: {}", e);
    }
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            error!("Cannot listen for Ctrl+C: {}", e);
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(e) => {
                error!("Cannot listen for SIGTERM: {}", e);
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => info!("Received Ctrl+C"),
        _ = terminate => info!("Received terminate signal"),
    }
    info!("Shutting down gracefully...");
}
