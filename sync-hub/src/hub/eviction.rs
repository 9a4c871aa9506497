//! Eviction timer
//!
//! Arms a one-shot timer per terminal order. When it fires, an
//! [`HubCommand::Evict`] is queued to the hub, which removes the snapshot and
//! broadcasts `orderRemoved`.

use std::collections::HashSet;
use std::time::Duration;

use shared::order::OrderId;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

use super::HubCommand;

#[derive(Debug)]
pub struct EvictionTimer {
    grace: Duration,
    hub: mpsc::WeakSender<HubCommand>,
    scheduled: HashSet<OrderId>,
    shutdown: CancellationToken,
}

impl EvictionTimer {
    pub fn new(grace: Duration, hub: mpsc::WeakSender<HubCommand>) -> Self {
        Self {
            grace,
            hub,
            scheduled: HashSet::new(),
            shutdown: CancellationToken::new(),
        }
    }

    /// Arm the timer for `order_id`. Returns `false` if one is already armed.
    pub fn schedule(&mut self, order_id: OrderId) -> bool {
        if !self.scheduled.insert(order_id) {
            return false;
        }

        let hub = self.hub.clone();
        let grace = self.grace;
        let shutdown = self.shutdown.child_token();
        tokio::spawn(async move {
            tokio::select! {
                _ = shutdown.cancelled() => {}
                _ = tokio::time::sleep(grace) => {
                    if let Some(tx) = hub.upgrade()
                        && tx.send(HubCommand::Evict { order_id }).await.is_err()
                    {
                        tracing::debug!(order_id, "Hub stopped before eviction");
                    }
                }
            }
        });

        tracing::debug!(order_id, grace_ms = grace.as_millis() as u64, "Eviction scheduled");
        true
    }

    /// Timer fired; forget it so the id can be scheduled again
    pub fn fired(&mut self, order_id: OrderId) {
        self.scheduled.remove(&order_id);
    }

    pub fn is_scheduled(&self, order_id: OrderId) -> bool {
        self.scheduled.contains(&order_id)
    }

    pub fn pending(&self) -> usize {
        self.scheduled.len()
    }

    /// Stop every armed timer
    pub fn cancel_all(&mut self) {
        self.shutdown.cancel();
        self.scheduled.clear();
        self.shutdown = CancellationToken::new();
    }
}

impl Drop for EvictionTimer {
    fn drop(&mut self) {
        self.shutdown.cancel();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test(start_paused = true)]
    async fn test_fires_after_grace() {
        let (tx, mut rx) = mpsc::channel(8);
        let mut timer = EvictionTimer::new(Duration::from_secs(60), tx.downgrade());

        assert!(timer.schedule(101));
        assert!(!timer.schedule(101), "second schedule is a no-op");

        tokio::time::sleep(Duration::from_secs(59)).await;
        assert!(rx.try_recv().is_err());

        tokio::time::sleep(Duration::from_secs(2)).await;
        match rx.recv().await {
            Some(HubCommand::Evict { order_id }) => assert_eq!(order_id, 101),
            other => panic!("unexpected command: {other:?}"),
        }
        assert!(rx.try_recv().is_err(), "exactly one eviction");

        timer.fired(101);
        assert!(!timer.is_scheduled(101));
        drop(tx);
    }

    #[tokio::test(start_paused = true)]
    async fn test_cancel_all_stops_timers() {
        let (tx, mut rx) = mpsc::channel(8);
        let mut timer = EvictionTimer::new(Duration::from_millis(100), tx.downgrade());
        timer.schedule(1);
        timer.schedule(2);
        assert_eq!(timer.pending(), 2);

        timer.cancel_all();
        tokio::time::sleep(Duration::from_secs(1)).await;
        assert!(rx.try_recv().is_err());
        assert_eq!(timer.pending(), 0);
        drop(tx);
    }
}
