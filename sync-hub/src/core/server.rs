//! Server lifecycle
//!
//! Starts background tasks, the message bus listener and the ops HTTP
//! service; stops everything on Ctrl-C.

use std::net::SocketAddr;

use crate::core::tasks::{BackgroundTasks, TaskKind};
use crate::core::{Config, ServerState};
use crate::utils::logger::periodic_cleanup;

pub struct Server {
    config: Config,
}

impl Server {
    pub fn new(config: Config) -> Self {
        Self { config }
    }

    pub async fn run(&self) -> anyhow::Result<()> {
        let mut tasks = BackgroundTasks::new();
        let state = ServerState::initialize(&self.config, &mut tasks).await?;
        let shutdown = tasks.shutdown_token();

        let bus = state.message_bus.clone();
        tasks.spawn("message_bus_tcp", TaskKind::Listener, async move {
            if let Err(e) = bus.start_tcp_server().await {
                tracing::error!("Message bus TCP server failed: {}", e);
            }
        });

        let log_dir = self.config.log_dir();
        let token = shutdown.clone();
        tasks.spawn("log_cleanup", TaskKind::Periodic, async move {
            tokio::select! {
                _ = token.cancelled() => {}
                _ = periodic_cleanup(log_dir) => {}
            }
        });
        tasks.log_summary();

        let app = crate::api::router(state);
        let addr = SocketAddr::from(([0, 0, 0, 0], self.config.http_port));
        let listener = tokio::net::TcpListener::bind(addr).await?;
        tracing::info!("Café sync hub HTTP listening on {}", addr);

        let token = shutdown.clone();
        axum::serve(listener, app)
            .with_graceful_shutdown(async move {
                tokio::select! {
                    _ = tokio::signal::ctrl_c() => tracing::info!("Shutting down..."),
                    _ = token.cancelled() => {}
                }
            })
            .await?;

        tasks.shutdown().await;
        Ok(())
    }
}
