//! # Consistency Guard
//!
//! Checks run on every instance a session is asked to add, merge or delete.
//! Scoped instances need a bound tenant, and an instance already carrying a
//! tenant id must carry the session's. Unscoped and tenant instances pass
//! through untouched.

use metrics::counter;
use sea_orm::{ActiveModelTrait, ActiveValue};
use tracing::warn;

use crate::error::TenancyError;
use crate::models::tenant::TenantRef;
use crate::registry::{TenantScoped, table_name};

/// The tenant id currently set (or loaded) on `instance`, if it is scoped and has one.
pub fn instance_tenant<A>(instance: &A) -> Option<TenantRef>
where
    A: ActiveModelTrait,
    A::Entity: TenantScoped,
{
    let column = <A::Entity as TenantScoped>::tenancy().tenant_column()?;
    match instance.get(column) {
        ActiveValue::Set(value) | ActiveValue::Unchanged(value) => TenantRef::from_value(&value),
        ActiveValue::NotSet => None,
    }
}

/// Validates `instance` against the session's bound tenant.
///
/// Returns the tenant the write must be scoped to, or `None` when the entity
/// is not tenant-scoped.
pub fn check_instance<A>(
    instance: &A,
    bound: Option<&TenantRef>,
    operation: &'static str,
) -> Result<Option<TenantRef>, TenancyError>
where
    A: ActiveModelTrait,
    A::Entity: TenantScoped,
{
    if !<A::Entity as TenantScoped>::tenancy().is_scoped() {
        return Ok(None);
    }

    let entity = table_name::<A::Entity>();
    let Some(session) = bound else {
        record_unbound(&entity, operation);
        return Err(TenancyError::unbound(operation, entity));
    };

    if let Some(stamped) = instance_tenant(instance) {
        if stamped != *session {
            counter!("tenancy_conflicts_total", "entity" => entity.clone()).increment(1);
            warn!(
                entity = %entity,
                operation,
                instance_tenant = %stamped,
                session_tenant = %session,
                "Rejected cross-tenant write"
            );
            return Err(TenancyError::TenantConflict {
                entity,
                instance: stamped,
                session: *session,
            });
        }
    }

    Ok(Some(*session))
}

/// Writes `tenant` into the tenant column of a scoped instance.
pub fn stamp<A>(instance: &mut A, tenant: &TenantRef) -> Result<(), TenancyError>
where
    A: ActiveModelTrait,
    A::Entity: TenantScoped,
{
    if let Some(column) = <A::Entity as TenantScoped>::tenancy().tenant_column() {
        instance.try_set(column, (*tenant).into())?;
    }
    Ok(())
}

pub(crate) fn record_unbound(entity: &str, operation: &'static str) {
    let labels = vec![
        ("entity", entity.to_string()),
        ("operation", operation.to_string()),
    ];
    counter!("tenancy_unbound_rejections_total", &labels).increment(1);
    warn!(entity, operation, "Rejected tenant-scoped operation in a tenantless session");
}
