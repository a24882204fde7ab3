//! Tenant lifecycle extension points.
//!
//! The session fires these as part of the tenant entity's own writes:
//! `on_tenant_created` right after a tenant row is inserted and
//! `on_tenant_deleted` right before an existing one is deleted, each inside
//! the transaction of that write; an error rolls the write back.
//! Provisioning work such as per-tenant views or credentials belongs in an
//! implementation of [`TenantLifecycle`]; the layer itself ships only the
//! no-op.

use async_trait::async_trait;

use crate::error::TenancyError;
use crate::models::tenant::TenantRef;

#[async_trait]
pub trait TenantLifecycle: Send + Sync {
    async fn on_tenant_created(&self, _tenant: &TenantRef) -> Result<(), TenancyError> {
        Ok(())
    }

    async fn on_tenant_deleted(&self, _tenant: &TenantRef) -> Result<(), TenancyError> {
        Ok(())
    }
}

/// Lifecycle that does nothing; installed until a tenant type is registered.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoopLifecycle;

impl TenantLifecycle for NoopLifecycle {}
