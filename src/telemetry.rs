//! Tracing setup and the spans session writes run under.

use std::any::type_name_of_val;
use std::sync::atomic::{AtomicBool, Ordering};

use log::LevelFilter;
use thiserror::Error;
use tracing::Span;
use tracing_log::LogTracer;
use tracing_subscriber::{
    EnvFilter, fmt,
    layer::Layer,
    layer::SubscriberExt,
    util::{SubscriberInitExt, TryInitError},
};

use crate::config::AppConfig;
use crate::models::tenant::TenantRef;

/// Errors that can occur while initializing global telemetry.
#[derive(Debug, Error)]
pub enum TelemetryInitError {
    #[error("failed to install log tracer bridge: {0}")]
    LogTracer(#[from] log::SetLoggerError),
    #[error("failed to install tracing subscriber: {0}")]
    Subscriber(#[from] TryInitError),
}

static TELEMETRY_INITIALIZED: AtomicBool = AtomicBool::new(false);

/// Directives appended to the configured level; sqlx statement logging is
/// only interesting when asked for explicitly through `RUST_LOG`.
const QUIET_DEPENDENCIES: &str = "sqlx=warn,sea_orm_migration=warn";

fn default_filter(config: &AppConfig) -> EnvFilter {
    EnvFilter::new(format!("{},{QUIET_DEPENDENCIES}", config.log_level))
}

/// Installs the global subscriber once. `log::` records emitted by SeaORM,
/// sqlx and [`crate::db`] are bridged into tracing.
pub fn init_tracing(config: &AppConfig) -> Result<(), TelemetryInitError> {
    if TELEMETRY_INITIALIZED
        .compare_exchange(false, true, Ordering::SeqCst, Ordering::SeqCst)
        .is_err()
    {
        return Ok(());
    }

    if let Err(err) = LogTracer::builder()
        .with_max_level(LevelFilter::Trace)
        .init()
    {
        // A host application may have installed its own bridge already.
        if !type_name_of_val(log::logger()).contains("LogTracer") {
            eprintln!("Warning: `log` records will not reach tracing: {err}");
        }
    }

    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| default_filter(config));
    let layer = if config.log_format == "pretty" {
        fmt::layer().pretty().with_target(true).boxed()
    } else {
        fmt::layer().json().with_current_span(true).boxed()
    };

    if let Err(err) = tracing_subscriber::registry()
        .with(filter)
        .with(layer)
        .try_init()
    {
        TELEMETRY_INITIALIZED.store(false, Ordering::SeqCst);
        eprintln!("Warning: keeping the existing tracing subscriber: {err}");
    }

    Ok(())
}

/// Span for one session write (`add`, `merge` or `delete`) on `table`.
/// `tenant_id` is empty in a tenantless session.
pub fn write_span(operation: &'static str, table: &str, tenant: Option<&TenantRef>) -> Span {
    tracing::debug_span!(
        "tenancy.write",
        operation,
        table,
        tenant_id = tenant.map(tracing::field::display)
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use uuid::Uuid;

    #[test]
    fn test_init_is_idempotent() {
        let config = AppConfig {
            log_level: "debug".to_string(),
            log_format: "pretty".to_string(),
            ..Default::default()
        };
        init_tracing(&config).unwrap();
        init_tracing(&config).unwrap();
    }

    #[test]
    fn test_default_filter_quiets_sqlx() {
        let config = AppConfig {
            log_level: "debug".to_string(),
            ..Default::default()
        };
        let filter = default_filter(&config).to_string();
        assert!(filter.contains("debug"));
        assert!(filter.contains("sqlx=warn"));
    }

    #[test]
    fn test_write_span_builds_without_tenant() {
        let tenant = TenantRef::new(Uuid::new_v4());
        let _bound = write_span("add", "posts", Some(&tenant));
        let _unbound = write_span("delete", "posts", None);
    }
}
