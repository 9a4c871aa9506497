//! Archive hand-off
//!
//! Terminal snapshots leave the hub through an unbounded channel and are
//! written by [`ArchiveWorker`] through an [`OrderArchive`] backend. The hub
//! never waits on this path and failures are never fed back into it.

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use shared::order::OrderSnapshot;
use tokio::io::AsyncWriteExt;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

use crate::utils::{AppError, AppResult};

const MAX_RETRY_COUNT: u32 = 3;
const RETRY_BASE_DELAY_MS: u64 = 500;

/// Persistence write path for finalized orders
#[async_trait]
pub trait OrderArchive: Send + Sync + std::fmt::Debug {
    async fn archive(&self, order: &OrderSnapshot) -> AppResult<()>;
}

/// Appends one JSON line per finalized order to
/// `{dir}/orders-YYYY-MM-DD.jsonl` (UTC date of the last update)
#[derive(Debug, Clone)]
pub struct JsonlArchive {
    dir: PathBuf,
}

impl JsonlArchive {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    pub fn file_for(&self, order: &OrderSnapshot) -> PathBuf {
        let date = chrono::DateTime::from_timestamp_millis(order.updated_at)
            .unwrap_or_else(chrono::Utc::now)
            .format("%Y-%m-%d");
        self.dir.join(format!("orders-{date}.jsonl"))
    }
}

#[async_trait]
impl OrderArchive for JsonlArchive {
    async fn archive(&self, order: &OrderSnapshot) -> AppResult<()> {
        tokio::fs::create_dir_all(&self.dir)
            .await
            .map_err(|e| AppError::internal(format!("Create archive dir failed: {e}")))?;

        let mut line = serde_json::to_vec(order)
            .map_err(|e| AppError::internal(format!("Serialize order failed: {e}")))?;
        line.push(b'\n');

        let mut file = tokio::fs::OpenOptions::new()
            .create(true)
            .append(true)
            .open(self.file_for(order))
            .await
            .map_err(|e| AppError::internal(format!("Open archive file failed: {e}")))?;
        file.write_all(&line)
            .await
            .map_err(|e| AppError::internal(format!("Write archive failed: {e}")))?;
        file.flush()
            .await
            .map_err(|e| AppError::internal(format!("Flush archive failed: {e}")))?;
        Ok(())
    }
}

/// Drains terminal snapshots into the archive backend
pub struct ArchiveWorker {
    archive: Arc<dyn OrderArchive>,
}

impl ArchiveWorker {
    pub fn new(archive: Arc<dyn OrderArchive>) -> Self {
        Self { archive }
    }

    /// Run until the channel closes or shutdown is requested.
    ///
    /// Snapshots already queued at shutdown are still written.
    pub async fn run(
        self,
        mut rx: mpsc::UnboundedReceiver<OrderSnapshot>,
        shutdown: CancellationToken,
    ) {
        tracing::info!("ArchiveWorker started");

        loop {
            tokio::select! {
                _ = shutdown.cancelled() => {
                    rx.close();
                    while let Some(order) = rx.recv().await {
                        self.process(&order).await;
                    }
                    break;
                }
                next = rx.recv() => match next {
                    Some(order) => self.process(&order).await,
                    None => {
                        tracing::info!("Archive channel closed, shutting down ArchiveWorker");
                        break;
                    }
                }
            }
        }
    }

    async fn process(&self, order: &OrderSnapshot) {
        for attempt in 1..=MAX_RETRY_COUNT {
            match self.archive.archive(order).await {
                Ok(()) => {
                    tracing::debug!(order_id = order.order_id, status = %order.status, "Order archived");
                    return;
                }
                Err(e) if attempt < MAX_RETRY_COUNT => {
                    tracing::warn!(order_id = order.order_id, attempt, error = %e, "Archive failed, retrying");
                    let delay = RETRY_BASE_DELAY_MS * 2u64.pow(attempt - 1);
                    tokio::time::sleep(Duration::from_millis(delay)).await;
                }
                Err(e) => {
                    tracing::error!(order_id = order.order_id, error = %e, "Archive failed, giving up");
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use shared::order::OrderStatus;
    use std::sync::atomic::{AtomicU32, Ordering};

    fn completed(id: i64) -> OrderSnapshot {
        OrderSnapshot {
            order_id: id,
            items: vec![],
            total: 12.5,
            payment_method: "card".into(),
            status: OrderStatus::Completed,
            note: None,
            customer_id: None,
            staff_id: None,
            // 2026-01-02T00:00:00Z
            created_at: 1_767_312_000_000,
            updated_at: 1_767_312_000_000,
        }
    }

    #[tokio::test]
    async fn test_jsonl_archive_appends_lines() {
        let dir = tempfile::tempdir().unwrap();
        let archive = JsonlArchive::new(dir.path());

        archive.archive(&completed(1)).await.unwrap();
        archive.archive(&completed(2)).await.unwrap();

        let path = dir.path().join("orders-2026-01-02.jsonl");
        let content = std::fs::read_to_string(path).unwrap();
        let lines: Vec<OrderSnapshot> = content
            .lines()
            .map(|l| serde_json::from_str(l).unwrap())
            .collect();
        assert_eq!(lines.len(), 2);
        assert_eq!(lines[1].order_id, 2);
    }

    #[derive(Debug, Default)]
    struct FlakyArchive {
        calls: AtomicU32,
    }

    #[async_trait]
    impl OrderArchive for FlakyArchive {
        async fn archive(&self, _order: &OrderSnapshot) -> AppResult<()> {
            if self.calls.fetch_add(1, Ordering::SeqCst) == 0 {
                Err(AppError::internal("disk busy"))
            } else {
                Ok(())
            }
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_worker_retries_then_drains_on_shutdown() {
        let archive = Arc::new(FlakyArchive::default());
        let (tx, rx) = mpsc::unbounded_channel();
        let shutdown = CancellationToken::new();
        let worker = tokio::spawn(ArchiveWorker::new(archive.clone()).run(rx, shutdown.clone()));

        tx.send(completed(1)).unwrap();
        tokio::time::sleep(Duration::from_secs(2)).await;
        assert_eq!(archive.calls.load(Ordering::SeqCst), 2);

        tx.send(completed(2)).unwrap();
        shutdown.cancel();
        worker.await.unwrap();
        assert_eq!(archive.calls.load(Ordering::SeqCst), 3);
    }
}
