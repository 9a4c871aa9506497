//! Logging Infrastructure
//!
//! Structured logging for development and production:
//! - Console output (pretty in development, JSON in production)
//! - Daily rotating application logs (deleted after 14 days)
//! - Permanent audit logs (target `audit`, never deleted)
//! - Permanent security logs (target `security`, never deleted)

use std::fs;
use std::path::{Path, PathBuf};

use tracing_appender::rolling::{RollingFileAppender, Rotation};
use tracing_subscriber::filter::filter_fn;
use tracing_subscriber::registry::Registry;
use tracing_subscriber::{EnvFilter, Layer, fmt, layer::SubscriberExt, util::SubscriberInitExt};

/// Days an application log file is kept
pub const APP_LOG_RETENTION_DAYS: i64 = 14;

type BoxedLayer = Box<dyn Layer<Registry> + Send + Sync + 'static>;

/// Delete application log files older than [`APP_LOG_RETENTION_DAYS`].
///
/// Only `app/app.YYYY-MM-DD` files are touched; audit and security logs are
/// permanent. Returns the number of deleted files.
pub fn cleanup_old_logs(log_dir: &Path) -> anyhow::Result<usize> {
    let cutoff = chrono::Local::now().date_naive() - chrono::Duration::days(APP_LOG_RETENTION_DAYS);

    let app_log_dir = log_dir.join("app");
    if !app_log_dir.exists() {
        return Ok(0);
    }

    let mut removed = 0;
    for entry in fs::read_dir(app_log_dir)? {
        let path = entry?.path();
        let Some(name) = path.file_name().and_then(|n| n.to_str()) else {
            continue;
        };
        // tracing-appender names daily files `<prefix>.<YYYY-MM-DD>`
        let Some(date_part) = name.strip_prefix("app.") else {
            continue;
        };
        if let Ok(date) = chrono::NaiveDate::parse_from_str(date_part, "%Y-%m-%d")
            && date < cutoff
        {
            fs::remove_file(&path)?;
            removed += 1;
            tracing::info!(file = %name, "Deleted old log file");
        }
    }

    Ok(removed)
}

/// Hourly log cleanup loop, registered as a periodic background task
pub async fn periodic_cleanup(log_dir: PathBuf) {
    let mut interval = tokio::time::interval(std::time::Duration::from_secs(3600));
    loop {
        interval.tick().await;
        if let Err(e) = cleanup_old_logs(&log_dir) {
            tracing::error!(error = %e, "Failed to cleanup old logs");
        }
    }
}

fn console_layer(json_format: bool) -> BoxedLayer {
    if json_format {
        fmt::layer()
            .json()
            .with_target(true)
            .with_current_span(true)
            .with_thread_ids(true)
            .boxed()
    } else {
        fmt::layer()
            .with_target(true)
            .with_file(true)
            .with_line_number(true)
            .boxed()
    }
}

fn file_layer(dir: PathBuf, prefix: &str, json_format: bool) -> BoxedLayer {
    let appender = RollingFileAppender::new(Rotation::DAILY, dir, prefix);
    let layer = fmt::layer()
        .with_target(true)
        .with_thread_ids(true)
        .with_file(true)
        .with_line_number(true)
        .with_ansi(false)
        .with_writer(std::sync::Mutex::new(appender));
    if json_format {
        layer.json().boxed()
    } else {
        layer.boxed()
    }
}

fn is_dedicated_target(target: &str) -> bool {
    target == "audit" || target == "security"
}

/// Initialize the logging system
///
/// # Arguments
/// * `level` - default filter (`RUST_LOG` wins when set)
/// * `json_format` - JSON output (production) instead of pretty output
/// * `log_dir` - optional directory for file logging
///
/// # Examples
/// ```no_run
/// // Development setup (console only)
/// sync_hub::init_logger_with_file("debug", false, None)?;
/// # Ok::<(), anyhow::Error>(())
/// ```
pub fn init_logger_with_file(
    level: &str,
    json_format: bool,
    log_dir: Option<&Path>,
) -> anyhow::Result<()> {
    let env_filter = || EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));

    let mut layers: Vec<BoxedLayer> = vec![console_layer(json_format).with_filter(env_filter()).boxed()];

    if let Some(dir) = log_dir {
        let app_dir = dir.join("app");
        let audit_dir = dir.join("audit");
        let security_dir = dir.join("security");
        fs::create_dir_all(&app_dir)?;
        fs::create_dir_all(&audit_dir)?;
        fs::create_dir_all(&security_dir)?;

        layers.push(
            file_layer(app_dir, "app", json_format)
                .with_filter(filter_fn(|meta| !is_dedicated_target(meta.target())))
                .with_filter(env_filter())
                .boxed(),
        );
        layers.push(
            file_layer(audit_dir, "audit", json_format)
                .with_filter(filter_fn(|meta| meta.target() == "audit"))
                .boxed(),
        );
        layers.push(
            file_layer(security_dir, "security", json_format)
                .with_filter(filter_fn(|meta| meta.target() == "security"))
                .boxed(),
        );
    }

    tracing_subscriber::registry().with(layers).try_init()?;
    Ok(())
}

/// Console-only logging
pub fn init_logger(level: &str, json_format: bool) -> anyhow::Result<()> {
    init_logger_with_file(level, json_format, None)
}

/// Audit log helper - records order lifecycle milestones
///
/// Written to the permanent `audit` log.
///
/// # Examples
/// ```ignore
/// audit_log!("conn-1", "complete", "order:101");
/// audit_log!("conn-1", "cancel", "order:102", "customer left");
/// ```
#[macro_export]
macro_rules! audit_log {
    ($actor:expr, $action:expr, $resource:expr) => {
        tracing::info!(
            target: "audit",
            actor = $actor,
            action = $action,
            resource = $resource,
            timestamp = chrono::Local::now().to_rfc3339(),
            "AUDIT"
        );
    };
    ($actor:expr, $action:expr, $resource:expr, $details:expr) => {
        tracing::info!(
            target: "audit",
            actor = $actor,
            action = $action,
            resource = $resource,
            details = $details,
            timestamp = chrono::Local::now().to_rfc3339(),
            "AUDIT"
        );
    };
}

/// Security log helper - records protocol violations
///
/// # Examples
/// ```ignore
/// security_log!(WARN, "server_event_from_client", conn_id = %id, event = %kind);
/// ```
#[macro_export]
macro_rules! security_log {
    (WARN, $event:expr, $($arg:tt)*) => {
        tracing::warn!(
            target: "security",
            security_event = $event,
            timestamp = chrono::Local::now().to_rfc3339(),
            $($arg)*
        );
    };
    (ERROR, $event:expr, $($arg:tt)*) => {
        tracing::error!(
            target: "security",
            security_event = $event,
            timestamp = chrono::Local::now().to_rfc3339(),
            $($arg)*
        );
    };
    (INFO, $event:expr, $($arg:tt)*) => {
        tracing::info!(
            target: "security",
            security_event = $event,
            timestamp = chrono::Local::now().to_rfc3339(),
            $($arg)*
        );
    };
}
