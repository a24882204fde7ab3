//! # Tenant Session
//!
//! [`TenantSession`] is the unit of work through which tenant-scoped data is
//! read and written. It borrows a SeaORM connection (a pool or an open
//! transaction), shares the [`ModelRegistry`], and carries at most one bound
//! tenant.
//!
//! Writes run the consistency guard first: scoped instances are stamped with
//! the bound tenant, instances stamped for another tenant are rejected, and
//! updates and deletes of existing rows carry the tenant predicate so a row
//! owned by another tenant is never touched.

use std::fmt;
use std::sync::Arc;

use sea_orm::{
    ActiveModelBehavior, ActiveModelTrait, ActiveValue, ColumnTrait, ConnectionTrait,
    DatabaseTransaction, DbErr, DeleteResult, EntityTrait, IntoActiveModel, Iterable, ModelTrait,
    PrimaryKeyToColumn, QueryFilter, TransactionTrait,
};
use tracing::{Instrument, Span, debug, info, warn};

use crate::error::TenancyError;
use crate::guard;
use crate::models::tenant::TenantRef;
use crate::query::TenantQuery;
use crate::registry::{ModelRegistry, Tenancy, TenantScoped, table_name};
use crate::telemetry;

type ModelOf<A> = <<A as ActiveModelTrait>::Entity as EntityTrait>::Model;

pub struct TenantSession<'c, C> {
    conn: &'c C,
    registry: Arc<ModelRegistry>,
    tenant: Option<TenantRef>,
}

impl<'c, C> TenantSession<'c, C>
where
    C: ConnectionTrait,
{
    /// Opens a tenantless session; only unscoped entities and the tenant
    /// entity itself are reachable until [`TenantSession::bind`] is called.
    pub fn new(conn: &'c C, registry: Arc<ModelRegistry>) -> Self {
        Self {
            conn,
            registry,
            tenant: None,
        }
    }

    pub fn bound<T: Into<TenantRef>>(conn: &'c C, registry: Arc<ModelRegistry>, tenant: T) -> Self {
        Self {
            conn,
            registry,
            tenant: Some(tenant.into()),
        }
    }

    pub fn connection(&self) -> &'c C {
        self.conn
    }

    pub fn registry(&self) -> &ModelRegistry {
        &self.registry
    }

    pub fn tenant(&self) -> Option<&TenantRef> {
        self.tenant.as_ref()
    }

    pub fn is_bound(&self) -> bool {
        self.tenant.is_some()
    }

    /// Binds the session to `tenant`. Rebinding is allowed; queries built
    /// afterwards use the new tenant.
    pub fn bind<T: Into<TenantRef>>(&mut self, tenant: T) {
        let tenant = tenant.into();
        debug!(tenant_id = %tenant, "Bound session to tenant");
        self.tenant = Some(tenant);
    }

    pub fn set_tenant(&mut self, tenant: Option<TenantRef>) {
        match tenant {
            Some(tenant) => self.bind(tenant),
            None => {
                self.unbind();
            }
        }
    }

    /// Clears the bound tenant, returning it.
    pub fn unbind(&mut self) -> Option<TenantRef> {
        let previous = self.tenant.take();
        if let Some(tenant) = &previous {
            debug!(tenant_id = %tenant, "Unbound session from tenant");
        }
        previous
    }

    /// Starts a tenant-scoped read of `E`.
    pub fn query<E: TenantScoped>(&self) -> TenantQuery<'_, C, E> {
        self.query_with(true)
    }

    /// Starts a read of `E`, scoped only when `safe` is true.
    pub fn query_with<E: TenantScoped>(&self, safe: bool) -> TenantQuery<'_, C, E> {
        TenantQuery::new(self, safe)
    }

    /// Starts a read of `E` that bypasses tenant scoping entirely.
    pub fn unsafe_query<E: TenantScoped>(&self) -> TenantQuery<'_, C, E> {
        self.query_with(false)
    }
}

impl<'c, C> TenantSession<'c, C>
where
    C: ConnectionTrait + TransactionTrait,
{
    /// Registers a new instance with the session and persists it.
    ///
    /// Scoped instances are stamped with the bound tenant. An instance loaded
    /// from the database (unchanged primary key) is updated instead, under
    /// the tenant predicate.
    pub async fn add<A>(&self, instance: &mut A) -> Result<ModelOf<A>, TenancyError>
    where
        A: ActiveModelTrait + ActiveModelBehavior + Send,
        A::Entity: TenantScoped,
        ModelOf<A>: IntoActiveModel<A>,
    {
        let span = self.write_span::<A::Entity>("add");
        async {
            self.registry.ensure_declared::<A::Entity>()?;
            let scope = guard::check_instance(instance, self.tenant.as_ref(), "add")?;
            if let Some(tenant) = &scope {
                guard::stamp(instance, tenant)?;
                debug!(
                    table = %table_name::<A::Entity>(),
                    tenant_id = %tenant,
                    "Stamped tenant on instance"
                );
            }

            if is_persisted(instance) {
                self.update_scoped(instance.clone(), scope).await
            } else {
                self.insert(instance.clone()).await
            }
        }
        .instrument(span)
        .await
    }

    /// Reconciles an instance with the stored row of the same identity.
    ///
    /// Scoped instances are stamped only when they carry no tenant id yet. An
    /// instance without a primary key is inserted; one with a primary key is
    /// updated under the tenant predicate, falling back to an insert when no
    /// such row exists.
    pub async fn merge<A>(&self, instance: &mut A) -> Result<ModelOf<A>, TenancyError>
    where
        A: ActiveModelTrait + ActiveModelBehavior + Send,
        A::Entity: TenantScoped,
        ModelOf<A>: IntoActiveModel<A>,
    {
        let span = self.write_span::<A::Entity>("merge");
        async {
            self.registry.ensure_declared::<A::Entity>()?;
            let scope = guard::check_instance(instance, self.tenant.as_ref(), "merge")?;
            if let Some(tenant) = &scope {
                if guard::instance_tenant(instance).is_none() {
                    guard::stamp(instance, tenant)?;
                }
            }

            if is_persisted(instance) {
                return self.update_scoped(instance.clone(), scope).await;
            }
            if !has_primary_key(instance) {
                return self.insert(instance.clone()).await;
            }

            match self.update_scoped(instance.clone(), scope).await {
                Err(TenancyError::Database(DbErr::RecordNotUpdated)) => {
                    self.insert(instance.clone()).await
                }
                other => other,
            }
        }
        .instrument(span)
        .await
    }

    /// Deletes the stored row for `instance`, matched by primary key and, for
    /// scoped entities, by the bound tenant.
    ///
    /// Deleting a tenant runs `on_tenant_deleted` and the DELETE in one
    /// transaction; the hook only fires when the tenant row exists.
    pub async fn delete<A>(&self, instance: &A) -> Result<DeleteResult, TenancyError>
    where
        A: ActiveModelTrait + ActiveModelBehavior + Send,
        A::Entity: TenantScoped,
    {
        let span = self.write_span::<A::Entity>("delete");
        async {
            self.registry.ensure_declared::<A::Entity>()?;
            let scope = guard::check_instance(instance, self.tenant.as_ref(), "delete")?;
            let tenancy = <A::Entity as TenantScoped>::tenancy();

            if let Tenancy::Tenant { id_column } = tenancy {
                if let ActiveValue::Set(id) | ActiveValue::Unchanged(id) = instance.get(id_column) {
                    if let Some(tenant) = TenantRef::from_value(&id) {
                        let txn = self.conn.begin().await?;
                        let outcome = self.delete_tenant(instance, id_column, &tenant, &txn).await;
                        return settle(txn, outcome).await;
                    }
                }
            }

            let mut delete = <A::Entity as EntityTrait>::delete(instance.clone());
            if let (Some(column), Some(tenant)) = (tenancy.tenant_column(), scope) {
                delete = delete.filter(column.eq(tenant.id()));
            }
            let result = delete.exec(self.conn).await?;

            debug!(
                table = %table_name::<A::Entity>(),
                rows_affected = result.rows_affected,
                "Deleted row"
            );
            Ok(result)
        }
        .instrument(span)
        .await
    }

    fn write_span<E: EntityTrait>(&self, operation: &'static str) -> Span {
        telemetry::write_span(operation, &table_name::<E>(), self.tenant.as_ref())
    }

    /// Inserts `instance`. A new tenant row and its `on_tenant_created` hook
    /// commit together or not at all.
    async fn insert<A>(&self, instance: A) -> Result<ModelOf<A>, TenancyError>
    where
        A: ActiveModelTrait + ActiveModelBehavior + Send,
        A::Entity: TenantScoped,
        ModelOf<A>: IntoActiveModel<A>,
    {
        let Tenancy::Tenant { id_column } = <A::Entity as TenantScoped>::tenancy() else {
            return Ok(instance.insert(self.conn).await?);
        };

        let txn = self.conn.begin().await?;
        let outcome = self.insert_tenant(instance, id_column, &txn).await;
        settle(txn, outcome).await
    }

    async fn insert_tenant<A>(
        &self,
        instance: A,
        id_column: <A::Entity as EntityTrait>::Column,
        txn: &DatabaseTransaction,
    ) -> Result<ModelOf<A>, TenancyError>
    where
        A: ActiveModelTrait + ActiveModelBehavior + Send,
        ModelOf<A>: IntoActiveModel<A>,
    {
        let model = instance.insert(txn).await?;
        if let Some(tenant) = TenantRef::from_value(&model.get(id_column)) {
            self.registry.lifecycle().on_tenant_created(&tenant).await?;
            info!(tenant_id = %tenant, "Created tenant");
        }
        Ok(model)
    }

    async fn delete_tenant<A>(
        &self,
        instance: &A,
        id_column: <A::Entity as EntityTrait>::Column,
        tenant: &TenantRef,
        txn: &DatabaseTransaction,
    ) -> Result<DeleteResult, TenancyError>
    where
        A: ActiveModelTrait + ActiveModelBehavior + Send,
    {
        let stored = <A::Entity as EntityTrait>::find()
            .filter(id_column.eq(tenant.id()))
            .one(txn)
            .await?;
        if stored.is_some() {
            self.registry.lifecycle().on_tenant_deleted(tenant).await?;
        }

        let result = <A::Entity as EntityTrait>::delete(instance.clone())
            .exec(txn)
            .await?;
        if result.rows_affected > 0 {
            info!(tenant_id = %tenant, "Deleted tenant");
        }
        Ok(result)
    }

    async fn update_scoped<A>(
        &self,
        instance: A,
        scope: Option<TenantRef>,
    ) -> Result<ModelOf<A>, TenancyError>
    where
        A: ActiveModelTrait + ActiveModelBehavior + Send,
        A::Entity: TenantScoped,
        ModelOf<A>: IntoActiveModel<A>,
    {
        let mut update = <A::Entity as EntityTrait>::update(instance);
        if let (Some(column), Some(tenant)) =
            (<A::Entity as TenantScoped>::tenancy().tenant_column(), scope)
        {
            update = update.filter(column.eq(tenant.id()));
        }
        Ok(update.exec(self.conn).await?)
    }
}

impl<C> fmt::Debug for TenantSession<'_, C> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TenantSession")
            .field("tenant", &self.tenant)
            .field("registry", &self.registry)
            .finish_non_exhaustive()
    }
}

/// Commits `txn` when `outcome` succeeded and rolls it back otherwise.
async fn settle<T>(
    txn: DatabaseTransaction,
    outcome: Result<T, TenancyError>,
) -> Result<T, TenancyError> {
    match outcome {
        Ok(value) => {
            txn.commit().await?;
            Ok(value)
        }
        Err(err) => {
            if let Err(rollback) = txn.rollback().await {
                warn!(error = %rollback, "Failed to roll back tenant write");
            }
            Err(err)
        }
    }
}

/// An instance whose primary key was loaded from the database.
fn is_persisted<A: ActiveModelTrait>(instance: &A) -> bool {
    <A::Entity as EntityTrait>::PrimaryKey::iter()
        .all(|key| matches!(instance.get(key.into_column()), ActiveValue::Unchanged(_)))
}

fn has_primary_key<A: ActiveModelTrait>(instance: &A) -> bool {
    <A::Entity as EntityTrait>::PrimaryKey::iter().all(|key| !instance.is_not_set(key.into_column()))
}
