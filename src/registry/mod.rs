//! # Entity Model Layer
//!
//! Entities opt into tenancy by implementing [`TenantScoped`], which declares
//! one of three shapes:
//!
//! | Declaration | Meaning |
//! |-------------|---------|
//! | `Scoped { tenant_column }` | every row belongs to exactly one tenant |
//! | `Unscoped` | shared rows; the entity has no tenant column at all |
//! | `Tenant { id_column }` | the tenant entity itself, never scoped |
//!
//! [`ModelRegistry`] records those declarations by table name. It is the
//! metadata provider the query rewriter consults when a join pulls in a table
//! by name only, and it owns the tenant lifecycle hooks.

use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

use sea_orm::sea_query::{Alias, ColumnType, ForeignKey, ForeignKeyAction, Index};
use sea_orm::{ColumnTrait, ConnectionTrait, DbBackend, EntityTrait, IdenStatic, Schema, Statement};

use crate::config::AppConfig;
use crate::error::TenancyError;

pub mod hooks;

pub use hooks::{NoopLifecycle, TenantLifecycle};

/// Column name scoped entities must use unless configured otherwise.
pub const DEFAULT_TENANT_COLUMN: &str = "tenant_id";

/// How an entity participates in tenancy.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Tenancy<C> {
    Scoped { tenant_column: C },
    Unscoped,
    Tenant { id_column: C },
}

impl<C: Copy> Tenancy<C> {
    /// The tenant reference column, present only for scoped entities.
    pub fn tenant_column(&self) -> Option<C> {
        match self {
            Tenancy::Scoped { tenant_column } => Some(*tenant_column),
            _ => None,
        }
    }

    pub fn is_scoped(&self) -> bool {
        matches!(self, Tenancy::Scoped { .. })
    }
}

/// Declares the tenancy of a SeaORM entity.
///
/// ```rust,ignore
/// impl TenantScoped for post::Entity {
///     fn tenancy() -> Tenancy<post::Column> {
///         Tenancy::Scoped { tenant_column: post::Column::TenantId }
///     }
/// }
/// ```
pub trait TenantScoped: EntityTrait {
    fn tenancy() -> Tenancy<Self::Column>;
}

/// Structural lookup: does a table carry a tenant reference column?
pub trait TenantMetadata: Send + Sync {
    /// Whether `table` has a declaration at all. Safe queries refuse tables
    /// without one.
    fn is_declared(&self, table: &str) -> bool;

    fn tenant_column(&self, table: &str) -> Option<&str>;
}

/// Registered shape of a table, keyed by table name in the registry.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TableSchema {
    Scoped { tenant_column: String },
    Unscoped,
    Tenant { id_column: String },
}

#[derive(Debug, Clone)]
struct TenantTable {
    table: String,
    id_column: String,
}

pub struct ModelRegistry {
    tenant_column: String,
    tenant: Option<TenantTable>,
    tables: HashMap<String, TableSchema>,
    lifecycle: Arc<dyn TenantLifecycle>,
}

impl ModelRegistry {
    /// Creates an empty registry whose scoped entities must name their tenant column `tenant_column`.
    pub fn new<S: Into<String>>(tenant_column: S) -> Self {
        Self {
            tenant_column: tenant_column.into(),
            tenant: None,
            tables: HashMap::new(),
            lifecycle: Arc::new(NoopLifecycle),
        }
    }

    pub fn from_config(config: &AppConfig) -> Self {
        Self::new(config.tenant_column.clone())
    }

    /// Designates `T` as the tenant entity and installs its lifecycle hooks.
    ///
    /// Re-registering the same type replaces the hooks; registering a second,
    /// different tenant type is a configuration error.
    pub fn register_tenant_type<T: TenantScoped>(
        &mut self,
        lifecycle: Arc<dyn TenantLifecycle>,
    ) -> Result<&mut Self, TenancyError> {
        let table = table_name::<T>();
        let Tenancy::Tenant { id_column } = T::tenancy() else {
            return Err(TenancyError::configuration(format!(
                "{table} must declare Tenancy::Tenant to be registered as the tenant type"
            )));
        };

        require_uuid(&table, id_column)?;

        if let Some(existing) = &self.tenant {
            if existing.table != table {
                return Err(TenancyError::configuration(format!(
                    "tenant type already registered as {}; cannot register {table}",
                    existing.table
                )));
            }
        }

        let id_column = IdenStatic::as_str(&id_column).to_string();
        self.tables.insert(
            table.clone(),
            TableSchema::Tenant {
                id_column: id_column.clone(),
            },
        );
        self.tenant = Some(TenantTable {
            table: table.clone(),
            id_column,
        });
        self.lifecycle = lifecycle;

        tracing::debug!(table = %table, "Registered tenant entity");
        Ok(self)
    }

    /// Records the tenancy declaration of `E`.
    pub fn declare<E: TenantScoped>(&mut self) -> Result<&mut Self, TenancyError> {
        let table = table_name::<E>();
        let schema = match E::tenancy() {
            Tenancy::Scoped { tenant_column } => {
                if self.tenant.is_none() {
                    return Err(TenancyError::configuration(format!(
                        "{table} is tenant-scoped but no tenant type has been registered"
                    )));
                }
                let column = IdenStatic::as_str(&tenant_column);
                if column != self.tenant_column {
                    return Err(TenancyError::configuration(format!(
                        "{table}.{column} cannot be the tenant column; scoped entities use `{}`",
                        self.tenant_column
                    )));
                }
                require_uuid(&table, tenant_column)?;
                TableSchema::Scoped {
                    tenant_column: column.to_string(),
                }
            }
            Tenancy::Unscoped => TableSchema::Unscoped,
            Tenancy::Tenant { .. } => {
                return match &self.tenant {
                    Some(tenant) if tenant.table == table => Ok(self),
                    _ => Err(TenancyError::configuration(format!(
                        "{table} declares itself the tenant entity but is not the registered tenant type"
                    ))),
                };
            }
        };

        tracing::debug!(table = %table, scoped = schema != TableSchema::Unscoped, "Declared entity");
        self.tables.insert(table, schema);
        Ok(self)
    }

    pub fn schema(&self, table: &str) -> Option<&TableSchema> {
        self.tables.get(table)
    }

    /// Fails unless `E` can be written through a session: scoped entities
    /// must have been declared and the tenant entity registered.
    pub fn ensure_declared<E: TenantScoped>(&self) -> Result<(), TenancyError> {
        let table = table_name::<E>();
        match E::tenancy() {
            Tenancy::Unscoped => Ok(()),
            Tenancy::Scoped { .. } if self.tables.contains_key(&table) => Ok(()),
            Tenancy::Scoped { .. } => Err(TenancyError::undeclared(&table)),
            Tenancy::Tenant { .. } if self.tenant_table() == Some(table.as_str()) => Ok(()),
            Tenancy::Tenant { .. } => Err(TenancyError::configuration(format!(
                "{table} declares itself the tenant entity but is not the registered tenant type"
            ))),
        }
    }

    pub fn tenant_table(&self) -> Option<&str> {
        self.tenant.as_ref().map(|tenant| tenant.table.as_str())
    }

    pub fn tenant_column_name(&self) -> &str {
        &self.tenant_column
    }

    pub fn lifecycle(&self) -> &Arc<dyn TenantLifecycle> {
        &self.lifecycle
    }

    /// Builds the DDL for `E`: the table itself and, for scoped entities, an
    /// indexed foreign key from the tenant column to the tenant table.
    pub fn create_table_statements<E: TenantScoped>(
        &self,
        backend: DbBackend,
    ) -> Result<Vec<Statement>, TenancyError> {
        let entity = E::default();
        let table_name = entity.table_name();
        let mut table = Schema::new(backend).create_table_from_entity(entity);
        table.if_not_exists();

        let Tenancy::Scoped { tenant_column } = E::tenancy() else {
            return Ok(vec![backend.build(&table)]);
        };

        let tenant = self.tenant.as_ref().ok_or_else(|| {
            TenancyError::configuration(format!(
                "{table_name} is tenant-scoped but no tenant type has been registered"
            ))
        })?;
        require_uuid(table_name, tenant_column)?;
        let column = IdenStatic::as_str(&tenant_column);

        table.foreign_key(
            ForeignKey::create()
                .name(format!("fk_{table_name}_{column}"))
                .from(Alias::new(table_name), Alias::new(column))
                .to(Alias::new(&tenant.table), Alias::new(&tenant.id_column))
                .on_delete(ForeignKeyAction::Cascade),
        );

        let index = Index::create()
            .name(format!("idx_{table_name}_{column}"))
            .table(Alias::new(table_name))
            .col(Alias::new(column))
            .if_not_exists()
            .to_owned();

        Ok(vec![backend.build(&table), backend.build(&index)])
    }

    /// Executes [`ModelRegistry::create_table_statements`] on `conn`.
    pub async fn create_table<E, C>(&self, conn: &C) -> Result<(), TenancyError>
    where
        E: TenantScoped,
        C: ConnectionTrait,
    {
        for statement in self.create_table_statements::<E>(conn.get_database_backend())? {
            conn.execute(statement).await?;
        }
        Ok(())
    }
}

impl Default for ModelRegistry {
    fn default() -> Self {
        Self::new(DEFAULT_TENANT_COLUMN)
    }
}

impl fmt::Debug for ModelRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ModelRegistry")
            .field("tenant_column", &self.tenant_column)
            .field("tenant", &self.tenant)
            .field("tables", &self.tables)
            .finish_non_exhaustive()
    }
}

impl TenantMetadata for ModelRegistry {
    fn is_declared(&self, table: &str) -> bool {
        self.tables.contains_key(table)
    }

    fn tenant_column(&self, table: &str) -> Option<&str> {
        match self.tables.get(table)? {
            TableSchema::Scoped { tenant_column } => Some(tenant_column.as_str()),
            _ => None,
        }
    }
}

pub(crate) fn table_name<E: EntityTrait>() -> String {
    E::default().table_name().to_string()
}

/// Tenant ids are uuids; a tenant column of any other type could not hold one.
fn require_uuid<C: ColumnTrait>(table: &str, column: C) -> Result<(), TenancyError> {
    match column.def().get_column_type() {
        ColumnType::Uuid => Ok(()),
        other => Err(TenancyError::configuration(format!(
            "{table}.{} must be a uuid column to hold tenant ids, found {other:?}",
            IdenStatic::as_str(&column)
        ))),
    }
}
