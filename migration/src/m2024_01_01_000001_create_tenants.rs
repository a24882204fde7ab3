//! Creates the `tenants` table, the partition owner every scoped row points at.
//!
//! Names are capped at 255 characters, the same limit the tenant repository
//! validates against, and indexed for lookups by name.

use sea_orm_migration::prelude::*;

const NAME_INDEX: &str = "idx_tenants_name";
const NAME_MAX_LEN: u32 = 255;

#[derive(DeriveMigrationName)]
pub struct Migration;

fn tenants_table() -> TableCreateStatement {
    Table::create()
        .table(Tenants::Table)
        .if_not_exists()
        .col(ColumnDef::new(Tenants::Id).uuid().not_null().primary_key())
        .col(ColumnDef::new(Tenants::Name).string_len(NAME_MAX_LEN).null())
        .col(
            ColumnDef::new(Tenants::CreatedAt)
                .timestamp_with_time_zone()
                .not_null()
                .default(Expr::current_timestamp()),
        )
        .to_owned()
}

fn name_index() -> IndexCreateStatement {
    Index::create()
        .if_not_exists()
        .name(NAME_INDEX)
        .table(Tenants::Table)
        .col(Tenants::Name)
        .to_owned()
}

#[async_trait::async_trait]
impl MigrationTrait for Migration {
    async fn up(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager.create_table(tenants_table()).await?;
        manager.create_index(name_index()).await
    }

    async fn down(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .drop_index(Index::drop().name(NAME_INDEX).table(Tenants::Table).to_owned())
            .await?;
        manager
            .drop_table(Table::drop().table(Tenants::Table).if_exists().to_owned())
            .await
    }
}

#[derive(DeriveIden)]
enum Tenants {
    Table,
    Id,
    Name,
    CreatedAt,
}
