//! Tenant entity model
//!
//! This module contains the SeaORM entity model for the tenants table, the
//! owner of every tenant-scoped row, and [`TenantRef`], the identifier a
//! session binds to.

use std::fmt;

use sea_orm::ActiveModelBehavior;
use sea_orm::Value;
use sea_orm::entity::prelude::*;
use sea_orm::prelude::DateTimeWithTimeZone;
use serde::{Deserialize, Serialize};

use crate::registry::{Tenancy, TenantScoped};

/// Tenant entity representing multi-tenant isolation
#[derive(Clone, Debug, PartialEq, Eq, DeriveEntityModel)]
#[sea_orm(table_name = "tenants")]
pub struct Model {
    /// Unique identifier for the tenant (primary key)
    #[sea_orm(primary_key, auto_increment = false)]
    pub id: Uuid,

    /// Display name for the tenant (optional)
    pub name: Option<String>,

    /// Timestamp when the tenant was created
    pub created_at: DateTimeWithTimeZone,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {}

impl ActiveModelBehavior for ActiveModel {}

impl TenantScoped for Entity {
    fn tenancy() -> Tenancy<Column> {
        Tenancy::Tenant {
            id_column: Column::Id,
        }
    }
}

/// Identifier naming one tenant. Immutable once stamped onto a record.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct TenantRef(Uuid);

impl TenantRef {
    pub fn new(id: Uuid) -> Self {
        Self(id)
    }

    pub fn id(&self) -> Uuid {
        self.0
    }

    /// Reads a tenant identifier out of a column value; SQL `NULL` is `None`.
    pub fn from_value(value: &Value) -> Option<Self> {
        match value {
            Value::Uuid(Some(id)) => Some(Self(**id)),
            _ => None,
        }
    }
}

impl fmt::Display for TenantRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Display::fmt(&self.0, f)
    }
}

impl From<Uuid> for TenantRef {
    fn from(id: Uuid) -> Self {
        Self(id)
    }
}

impl From<&Model> for TenantRef {
    fn from(tenant: &Model) -> Self {
        Self(tenant.id)
    }
}

impl From<TenantRef> for Value {
    fn from(tenant: TenantRef) -> Self {
        tenant.0.into()
    }
}
