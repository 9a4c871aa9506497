//! Café order sync hub
//!
//! Keeps the live order backlog of one store in memory and fans
//! order-lifecycle events out to connected customer, staff, kitchen and
//! admin clients.
//!
//! # Modules
//!
//! ```text
//! sync-hub/src/
//! ├── core/       # config, state, background tasks, server
//! ├── hub/        # order hub actor: registry, store, eviction, archive
//! ├── message/    # transports (TCP, memory) and connection handling
//! ├── services/   # catalog delegate for `query`
//! ├── api/        # ops HTTP routes
//! └── utils/      # logging, error re-exports
//! ```

pub mod api;
pub mod core;
pub mod hub;
pub mod message;
pub mod services;
pub mod utils;

pub use core::{Config, Server, ServerState};
pub use hub::{Hub, HubConfig, HubHandle};
pub use message::{BusMessage, EventType, MessageBus};
pub use utils::{ApiResponse, AppError, AppResult, ErrorCategory, ErrorCode};

pub use utils::logger::{cleanup_old_logs, init_logger, init_logger_with_file};

/// Create the work dir and start logging
pub fn setup_environment(config: &Config) -> anyhow::Result<()> {
    std::fs::create_dir_all(&config.work_dir)?;
    let log_dir = config.log_dir();
    init_logger_with_file(&config.log_level, config.is_production(), Some(&log_dir))?;
    Ok(())
}

pub fn print_banner() {
    println!(
        r#"
   ______      ____         _____
  / ____/___ _/ __/__      / ___/__  ______  _____
 / /   / __ `/ /_/ _ \     \__ \/ / / / __ \/ ___/
/ /___/ /_/ / __/  __/    ___/ / /_/ / / / / /__
\____/\__,_/_/  \___/    /____/\__, /_/ /_/\___/
                              /____/
    "#
    );
}
