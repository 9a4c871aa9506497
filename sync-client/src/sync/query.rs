//! Subscribe-style query
//!
//! A [`Query`] becomes active with [`Query::start`]: a task runs the retry
//! loop, publishes [`QueryState`] on a `watch` channel and fires the
//! callbacks. With a refetch interval the whole query (including its retry
//! loop) runs again on that cadence. Dropping the [`QueryHandle`] or calling
//! [`QueryHandle::teardown`] cancels it: the pending timer stops, an
//! in-flight result is discarded and no callback fires afterwards.

use std::sync::Arc;
use std::time::Duration;

use serde::de::DeserializeOwned;
use tokio::sync::{Notify, watch};
use tokio::task::JoinHandle;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;

use super::{RequestKey, Requester, execute};
use crate::config::RetryPolicy;
use crate::error::SyncError;

type SuccessCallback<T> = Arc<dyn Fn(&T) + Send + Sync>;
type ErrorCallback = Arc<dyn Fn(&SyncError) + Send + Sync>;

pub struct QueryOptions<T> {
    /// Re-run the query on this cadence while active
    pub refetch_interval: Option<Duration>,
    /// Disabled queries never send anything
    pub enabled: bool,
    pub on_success: Option<SuccessCallback<T>>,
    /// Called once per failed cycle, after retries are exhausted
    pub on_error: Option<ErrorCallback>,
}

impl<T> Default for QueryOptions<T> {
    fn default() -> Self {
        Self {
            refetch_interval: None,
            enabled: true,
            on_success: None,
            on_error: None,
        }
    }
}

impl<T> Clone for QueryOptions<T> {
    fn clone(&self) -> Self {
        Self {
            refetch_interval: self.refetch_interval,
            enabled: self.enabled,
            on_success: self.on_success.clone(),
            on_error: self.on_error.clone(),
        }
    }
}

impl<T> std::fmt::Debug for QueryOptions<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("QueryOptions")
            .field("refetch_interval", &self.refetch_interval)
            .field("enabled", &self.enabled)
            .field("on_success", &self.on_success.is_some())
            .field("on_error", &self.on_error.is_some())
            .finish()
    }
}

impl<T> QueryOptions<T> {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn refetch_interval(mut self, interval: Duration) -> Self {
        self.refetch_interval = Some(interval);
        self
    }

    pub fn enabled(mut self, enabled: bool) -> Self {
        self.enabled = enabled;
        self
    }

    pub fn on_success(mut self, f: impl Fn(&T) + Send + Sync + 'static) -> Self {
        self.on_success = Some(Arc::new(f));
        self
    }

    pub fn on_error(mut self, f: impl Fn(&SyncError) + Send + Sync + 'static) -> Self {
        self.on_error = Some(Arc::new(f));
        self
    }
}

/// Latest result of a query
#[derive(Debug, Clone)]
pub struct QueryState<T> {
    /// Last successful value; kept when a later cycle fails
    pub data: Option<T>,
    /// Error of the last cycle, cleared on success
    pub error: Option<SyncError>,
    pub is_fetching: bool,
    pub updated_at: Option<Instant>,
    /// Completed cycles, successful or not
    pub cycles: u32,
}

impl<T> Default for QueryState<T> {
    fn default() -> Self {
        Self {
            data: None,
            error: None,
            is_fetching: false,
            updated_at: None,
            cycles: 0,
        }
    }
}

/// Query definition; inactive until [`start`](Self::start)
pub struct Query<T> {
    requester: Arc<dyn Requester>,
    key: RequestKey,
    retry: RetryPolicy,
    options: QueryOptions<T>,
}

impl<T> Query<T>
where
    T: DeserializeOwned + Clone + Send + Sync + 'static,
{
    pub fn new(requester: Arc<dyn Requester>, key: RequestKey) -> Self {
        Self {
            requester,
            key,
            retry: RetryPolicy::default(),
            options: QueryOptions::default(),
        }
    }

    pub fn with_retry(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }

    pub fn with_options(mut self, options: QueryOptions<T>) -> Self {
        self.options = options;
        self
    }

    /// Activate the query
    pub fn start(self) -> QueryHandle<T> {
        let (state_tx, state_rx) = watch::channel(QueryState::default());
        let refetch = Arc::new(Notify::new());
        let cancel = CancellationToken::new();

        let task = if self.options.enabled {
            let runner = Runner {
                requester: self.requester,
                key: self.key.clone(),
                retry: self.retry,
                options: self.options,
                state: state_tx,
                refetch: refetch.clone(),
                cancel: cancel.clone(),
            };
            Some(tokio::spawn(runner.run()))
        } else {
            tracing::debug!(key = %self.key, "Query disabled");
            None
        };

        QueryHandle {
            key: self.key,
            state: state_rx,
            refetch,
            cancel,
            task,
        }
    }
}

struct Runner<T> {
    requester: Arc<dyn Requester>,
    key: RequestKey,
    retry: RetryPolicy,
    options: QueryOptions<T>,
    state: watch::Sender<QueryState<T>>,
    refetch: Arc<Notify>,
    cancel: CancellationToken,
}

impl<T> Runner<T>
where
    T: DeserializeOwned + Clone + Send + Sync + 'static,
{
    async fn run(self) {
        loop {
            self.state.send_modify(|s| s.is_fetching = true);

            let result = execute(self.requester.as_ref(), &self.key, &self.retry, &self.cancel)
                .await
                .and_then(|response| Ok(response.parse_data::<T>()?));

            if self.cancel.is_cancelled() {
                break;
            }
            match result {
                Ok(data) => {
                    self.state.send_modify(|s| {
                        s.data = Some(data.clone());
                        s.error = None;
                        s.is_fetching = false;
                        s.updated_at = Some(Instant::now());
                        s.cycles += 1;
                    });
                    if let Some(on_success) = &self.options.on_success {
                        on_success(&data);
                    }
                }
                Err(SyncError::Cancelled) => break,
                Err(e) => {
                    self.state.send_modify(|s| {
                        s.error = Some(e.clone());
                        s.is_fetching = false;
                        s.cycles += 1;
                    });
                    if let Some(on_error) = &self.options.on_error {
                        on_error(&e);
                    }
                }
            }

            if !self.wait_next_cycle().await {
                break;
            }
        }
        tracing::trace!(key = %self.key, "Query stopped");
    }

    /// `false` when cancelled
    async fn wait_next_cycle(&self) -> bool {
        match self.options.refetch_interval {
            Some(interval) => tokio::select! {
                _ = self.cancel.cancelled() => false,
                _ = tokio::time::sleep(interval) => true,
                _ = self.refetch.notified() => true,
            },
            None => tokio::select! {
                _ = self.cancel.cancelled() => false,
                _ = self.refetch.notified() => true,
            },
        }
    }
}

/// Active query; cancels on drop
pub struct QueryHandle<T> {
    key: RequestKey,
    state: watch::Receiver<QueryState<T>>,
    refetch: Arc<Notify>,
    cancel: CancellationToken,
    task: Option<JoinHandle<()>>,
}

impl<T: Clone> QueryHandle<T> {
    pub fn key(&self) -> &RequestKey {
        &self.key
    }

    pub fn state(&self) -> QueryState<T> {
        self.state.borrow().clone()
    }

    pub fn data(&self) -> Option<T> {
        self.state.borrow().data.clone()
    }

    /// Receiver of every state change
    pub fn subscribe(&self) -> watch::Receiver<QueryState<T>> {
        self.state.clone()
    }

    /// Wait for the next completed cycle and return its state
    pub async fn next_cycle(&mut self) -> Result<QueryState<T>, SyncError> {
        let seen = self.state.borrow_and_update().cycles;
        let state = self
            .state
            .wait_for(|s| s.cycles > seen)
            .await
            .map_err(|_| SyncError::Cancelled)?;
        Ok(state.clone())
    }

    /// Run a cycle now instead of waiting for the interval
    pub fn refetch(&self) {
        if self.is_active() {
            self.refetch.notify_one();
        }
    }

    pub fn is_active(&self) -> bool {
        self.task.is_some() && !self.cancel.is_cancelled()
    }

    pub fn teardown(&mut self) {
        self.cancel.cancel();
        if let Some(task) = self.task.take() {
            task.abort();
        }
    }
}

impl<T> Drop for QueryHandle<T> {
    fn drop(&mut self) {
        self.cancel.cancel();
        if let Some(task) = self.task.take() {
            task.abort();
        }
    }
}
