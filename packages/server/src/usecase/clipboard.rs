//! UseCase: クリップボード監視
//!
//! Polls a `ClipboardSource` and broadcasts its content whenever it differs
//! from what was broadcast last. One monitor runs per server run and ends
//! with that run's shutdown signal.

use std::{future::Future, sync::Arc, time::Duration};

use clipcast_shared::protocol::BroadcastPayload;
use tokio::{sync::watch, time::MissedTickBehavior};

use crate::domain::{BroadcastError, BroadcastResult, ClipboardSource};

/// `tokio::time::interval` rejects a zero period.
const MIN_POLL_INTERVAL: Duration = Duration::from_millis(10);

/// クリップボード監視のユースケース
pub struct ClipboardMonitor {
    /// 監視対象のクリップボード
    source: Arc<dyn ClipboardSource>,
    /// ポーリング間隔
    interval: Duration,
}

impl ClipboardMonitor {
    pub fn new(source: Arc<dyn ClipboardSource>, interval: Duration) -> Self {
        Self {
            source,
            interval: interval.max(MIN_POLL_INTERVAL),
        }
    }

    /// Poll until `shutdown` fires or its sender is dropped, handing every
    /// change to `publish`.
    ///
    /// The first content seen counts as a change. Empty or unreadable polls
    /// keep the last content. Content that `publish` rejected is not retried
    /// until the clipboard changes again. `BroadcastError::NotRunning` means
    /// the run is over and ends the monitor.
    pub async fn run<F, Fut>(self, mut shutdown: watch::Receiver<bool>, mut publish: F)
    where
        F: FnMut(BroadcastPayload) -> Fut,
        Fut: Future<Output = Result<BroadcastResult, BroadcastError>>,
    {
        let mut ticker = tokio::time::interval(self.interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        let mut last: Option<BroadcastPayload> = None;
        tracing::info!("Clipboard monitor started (every {:?})", self.interval);

        loop {
            tokio::select! {
                _ = shutdown.changed() => break,
                _ = ticker.tick() => {}
            }

            let source = Arc::clone(&self.source);
            let content = match tokio::task::spawn_blocking(move || source.read()).await {
                Ok(Ok(Some(content))) => content,
                Ok(Ok(None)) => continue,
                Ok(Err(e)) => {
                    tracing::debug!("Failed to read clipboard: {}", e);
                    continue;
                }
                Err(e) => {
                    tracing::warn!("Clipboard read task failed: {}", e);
                    continue;
                }
            };
            if last.as_ref() == Some(&content) {
                continue;
            }

            tracing::debug!("Clipboard changed ({})", content.kind());
            match publish(content.clone()).await {
                Ok(result) => tracing::debug!(
                    "Clipboard broadcast: {} delivered, {} failed",
                    result.succeeded.len(),
                    result.failed.len()
                ),
                Err(BroadcastError::NotRunning) => break,
                Err(e) => tracing::warn!("Failed to broadcast clipboard: {}", e),
            }
            last = Some(content);
        }

        tracing::info!("Clipboard monitor stopped");
    }
}
