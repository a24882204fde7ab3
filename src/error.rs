//! # Error Handling
//!
//! A single error type covers the three tenancy failures (misdeclared
//! entities, work attempted without a bound tenant, and cross-tenant writes)
//! plus the storage and validation errors surfaced by sessions and
//! repositories.

use sea_orm::DbErr;
use thiserror::Error;

use crate::models::tenant::TenantRef;

/// Errors raised by the tenancy layer.
#[derive(Debug, Error)]
pub enum TenancyError {
    /// Declaration-time misuse of the entity model layer.
    #[error("configuration error: {0}")]
    Configuration(String),

    /// A tenant-scoped read or write was attempted in a tenantless session.
    #[error("tried to do a tenant-bound {operation} on {entity} in a tenantless session")]
    UnboundTenant {
        operation: &'static str,
        entity: String,
    },

    /// The instance is stamped for a tenant other than the session's.
    #[error("tried to use a {entity} with tenant_id {instance} in a session with tenant_id {session}")]
    TenantConflict {
        entity: String,
        instance: TenantRef,
        session: TenantRef,
    },

    #[error("validation failed: {0}")]
    Validation(String),

    #[error("not found: {0}")]
    NotFound(String),

    #[error(transparent)]
    Database(#[from] DbErr),
}

impl TenancyError {
    pub fn configuration<S: Into<String>>(message: S) -> Self {
        Self::Configuration(message.into())
    }

    pub fn unbound<S: Into<String>>(operation: &'static str, entity: S) -> Self {
        Self::UnboundTenant {
            operation,
            entity: entity.into(),
        }
    }

    /// A table the registry has no declaration for.
    pub fn undeclared(table: &str) -> Self {
        Self::Configuration(format!(
            "{table} is not declared in the model registry; its tenancy is unknown"
        ))
    }

    pub fn validation<S: Into<String>>(message: S) -> Self {
        Self::Validation(message.into())
    }

    /// True for [`TenancyError::UnboundTenant`]; callers recover by binding a tenant and retrying.
    pub fn is_unbound(&self) -> bool {
        matches!(self, Self::UnboundTenant { .. })
    }

    pub fn is_configuration(&self) -> bool {
        matches!(self, Self::Configuration(_))
    }

    pub fn is_conflict(&self) -> bool {
        matches!(self, Self::TenantConflict { .. })
    }
}
