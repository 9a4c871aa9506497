use std::sync::Arc;
use std::time::Instant;

use tokio::sync::mpsc;

use crate::core::tasks::{BackgroundTasks, TaskKind};
use crate::core::Config;
use crate::hub::{ArchiveWorker, Hub, HubHandle, JsonlArchive};
use crate::message::{MessageBus, TransportConfig};
use crate::services::{CatalogProvider, StaticCatalog};

/// Shared server state
///
/// Cheap to clone; handed to the HTTP router as axum state.
///
/// | Field | Meaning |
/// |-------|---------|
/// | config | immutable configuration |
/// | hub | command handle of the order hub actor |
/// | message_bus | TCP / in-memory transport front-end |
/// | catalog | `query` delegate |
/// | started_at | process start, for uptime |
#[derive(Clone, Debug)]
pub struct ServerState {
    pub config: Config,
    pub hub: HubHandle,
    pub message_bus: MessageBus,
    pub catalog: Arc<dyn CatalogProvider>,
    pub started_at: Instant,
}

impl ServerState {
    /// Build every service and register the hub and archive workers.
    ///
    /// Must be called inside a tokio runtime.
    pub async fn initialize(config: &Config, tasks: &mut BackgroundTasks) -> anyhow::Result<Self> {
        tokio::fs::create_dir_all(&config.work_dir).await?;
        tokio::fs::create_dir_all(config.archive_dir()).await?;

        let catalog: Arc<dyn CatalogProvider> =
            Arc::new(StaticCatalog::load(&config.catalog_path())?);

        let shutdown = tasks.shutdown_token();

        let (archive_tx, archive_rx) = mpsc::unbounded_channel();
        let archive = ArchiveWorker::new(Arc::new(JsonlArchive::new(config.archive_dir())));
        tasks.spawn(
            "archive_worker",
            TaskKind::Worker,
            archive.run(archive_rx, shutdown.clone()),
        );

        let (hub, hub_rx) = HubHandle::channel(config.channel_capacity);
        let actor = Hub::new(config.hub_config(), &hub, catalog.clone()).with_archive(archive_tx);
        tasks.spawn("order_hub", TaskKind::Worker, actor.run(hub_rx, shutdown.clone()));

        let message_bus = MessageBus::new(
            hub.clone(),
            TransportConfig {
                tcp_listen_addr: config.tcp_listen_addr(),
                outbound_capacity: config.outbound_capacity,
                ..Default::default()
            },
        )
        .with_shutdown(shutdown);

        Ok(Self {
            config: config.clone(),
            hub,
            message_bus,
            catalog,
            started_at: Instant::now(),
        })
    }

    pub fn uptime_seconds(&self) -> u64 {
        self.started_at.elapsed().as_secs()
    }
}
