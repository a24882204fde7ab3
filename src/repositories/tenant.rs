//! # Tenant Repository
//!
//! This module contains the repository implementation for Tenant entities,
//! providing CRUD operations for tenant management. Every write goes through
//! a [`TenantSession`], so lifecycle hooks fire on creation and deletion.

use chrono::Utc;
use sea_orm::{ColumnTrait, ConnectionTrait, IntoActiveModel, Set, TransactionTrait};
use serde_json::Value;
use uuid::Uuid;

use crate::error::TenancyError;
use crate::models::tenant::{
    ActiveModel as TenantActiveModel, Column as TenantColumn, Entity as Tenant,
    Model as TenantModel,
};
use crate::session::TenantSession;

/// Request data for creating a new tenant
#[derive(Debug, Clone)]
pub struct CreateTenantRequest {
    /// Display name for the tenant
    pub name: String,
    /// Optional metadata for the tenant, recorded in the creation log
    pub metadata: Option<Value>,
}

/// Repository for Tenant database operations
pub struct TenantRepository<'s, 'c, C> {
    session: &'s TenantSession<'c, C>,
}

impl<'s, 'c, C> TenantRepository<'s, 'c, C>
where
    C: ConnectionTrait + TransactionTrait,
{
    /// Create a new TenantRepository over the given session
    pub fn new(session: &'s TenantSession<'c, C>) -> Self {
        Self { session }
    }

    /// Create a new tenant
    pub async fn create_tenant(
        &self,
        request: CreateTenantRequest,
    ) -> Result<TenantModel, TenancyError> {
        validate_tenant_name(&request.name)?;

        let mut tenant = TenantActiveModel {
            id: Set(Uuid::new_v4()),
            name: Set(Some(request.name)),
            created_at: Set(Utc::now().into()),
        };

        let created = self.session.add(&mut tenant).await?;
        tracing::info!(
            tenant_id = %created.id,
            metadata = ?request.metadata,
            "Tenant created"
        );
        Ok(created)
    }

    /// Get tenant by ID
    pub async fn get_tenant_by_id(
        &self,
        tenant_id: Uuid,
    ) -> Result<Option<TenantModel>, TenancyError> {
        self.session
            .query::<Tenant>()
            .filter(TenantColumn::Id.eq(tenant_id))
            .one()
            .await
    }

    /// List all tenants, oldest first
    pub async fn list_tenants(&self) -> Result<Vec<TenantModel>, TenancyError> {
        self.session
            .query::<Tenant>()
            .order_by_asc(TenantColumn::CreatedAt)
            .all()
            .await
    }

    /// Update tenant name
    pub async fn update_tenant_name(
        &self,
        tenant_id: Uuid,
        name: String,
    ) -> Result<TenantModel, TenancyError> {
        validate_tenant_name(&name)?;

        let tenant = self
            .get_tenant_by_id(tenant_id)
            .await?
            .ok_or_else(|| TenancyError::NotFound(format!("tenant {tenant_id}")))?;

        let mut active_tenant = tenant.into_active_model();
        active_tenant.name = Set(Some(name));

        self.session.merge(&mut active_tenant).await
    }

    /// Delete a tenant; scoped rows referencing it cascade
    pub async fn delete_tenant(&self, tenant_id: Uuid) -> Result<(), TenancyError> {
        let tenant = self
            .get_tenant_by_id(tenant_id)
            .await?
            .ok_or_else(|| TenancyError::NotFound(format!("tenant {tenant_id}")))?;

        self.session.delete(&tenant.into_active_model()).await?;
        Ok(())
    }

    /// Check if a tenant exists
    pub async fn tenant_exists(&self, tenant_id: Uuid) -> Result<bool, TenancyError> {
        Ok(self.get_tenant_by_id(tenant_id).await?.is_some())
    }

    /// Get tenant count
    pub async fn get_tenant_count(&self) -> Result<u64, TenancyError> {
        self.session.query::<Tenant>().count().await
    }
}

/// Validate tenant name according to business rules
fn validate_tenant_name(name: &str) -> Result<(), TenancyError> {
    if name.trim().is_empty() {
        return Err(TenancyError::validation("Tenant name cannot be empty"));
    }

    if name.chars().count() > 255 {
        return Err(TenancyError::validation(
            "Tenant name cannot exceed 255 characters",
        ));
    }

    // Letters, numbers, spaces, hyphens, underscores
    if !name
        .chars()
        .all(|c| c.is_alphanumeric() || c.is_whitespace() || c == '-' || c == '_')
    {
        return Err(TenancyError::validation(
            "Tenant name can only contain letters, numbers, spaces, hyphens, and underscores",
        ));
    }

    Ok(())
}
