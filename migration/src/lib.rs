//! Database migrations for the tenancy layer.
//!
//! Only the tenant table is owned here; tenant-scoped application tables are
//! created from their entities through `ModelRegistry::create_table`, which
//! attaches the tenant foreign key and index.

pub use sea_orm_migration::prelude::*;

mod m2024_01_01_000001_create_tenants;

pub struct Migrator;

#[async_trait::async_trait]
impl MigratorTrait for Migrator {
    fn migrations() -> Vec<Box<dyn MigrationTrait>> {
        vec![Box::new(m2024_01_01_000001_create_tenants::Migration)]
    }
}
