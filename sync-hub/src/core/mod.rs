//! Core module - configuration, state, tasks and server lifecycle
//!
//! - [`Config`] - environment configuration
//! - [`ServerState`] - shared service handles
//! - [`BackgroundTasks`] - long-lived task registry
//! - [`Server`] - process entry point

pub mod config;
pub mod server;
pub mod state;
pub mod tasks;

pub use config::Config;
pub use server::Server;
pub use state::ServerState;
pub use tasks::{BackgroundTasks, TaskKind};
