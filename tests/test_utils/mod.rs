//! Test utilities for database testing.
//!
//! This module provides an in-memory SQLite database with the tenant table
//! migrated, a small blog schema (shared `users`, tenant-scoped `posts` and
//! `comments`) declared in a registry, and fixture helpers.

#![allow(dead_code)]

use std::sync::Arc;

use anyhow::Result;
use sea_orm::{ActiveValue::Set, DatabaseConnection};
use tenancy::config::AppConfig;
use tenancy::db::{init_pool, migrate};
use tenancy::models::tenant;
use tenancy::registry::{ModelRegistry, NoopLifecycle, TenantLifecycle};
use tenancy::{TenantRef, TenantSession};
use uuid::Uuid;

pub mod user {
    use sea_orm::entity::prelude::*;
    use tenancy::registry::{Tenancy, TenantScoped};

    /// Shared across tenants.
    #[derive(Clone, Debug, PartialEq, Eq, DeriveEntityModel)]
    #[sea_orm(table_name = "users")]
    pub struct Model {
        #[sea_orm(primary_key)]
        pub id: i32,
        pub name: String,
    }

    #[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
    pub enum Relation {
        #[sea_orm(has_many = "super::post::Entity")]
        Posts,
    }

    impl Related<super::post::Entity> for Entity {
        fn to() -> RelationDef {
            Relation::Posts.def()
        }
    }

    impl ActiveModelBehavior for ActiveModel {}

    impl TenantScoped for Entity {
        fn tenancy() -> Tenancy<Column> {
            Tenancy::Unscoped
        }
    }
}

pub mod post {
    use sea_orm::entity::prelude::*;
    use tenancy::registry::{Tenancy, TenantScoped};

    #[derive(Clone, Debug, PartialEq, Eq, DeriveEntityModel)]
    #[sea_orm(table_name = "posts")]
    pub struct Model {
        #[sea_orm(primary_key)]
        pub id: i32,
        pub title: String,
        pub author_id: i32,
        pub tenant_id: Uuid,
    }

    #[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
    pub enum Relation {
        #[sea_orm(
            belongs_to = "super::user::Entity",
            from = "Column::AuthorId",
            to = "super::user::Column::Id"
        )]
        Author,
        #[sea_orm(has_many = "super::comment::Entity")]
        Comments,
    }

    impl Related<super::user::Entity> for Entity {
        fn to() -> RelationDef {
            Relation::Author.def()
        }
    }

    impl Related<super::comment::Entity> for Entity {
        fn to() -> RelationDef {
            Relation::Comments.def()
        }
    }

    impl ActiveModelBehavior for ActiveModel {}

    impl TenantScoped for Entity {
        fn tenancy() -> Tenancy<Column> {
            Tenancy::Scoped {
                tenant_column: Column::TenantId,
            }
        }
    }
}

pub mod comment {
    use sea_orm::entity::prelude::*;
    use tenancy::registry::{Tenancy, TenantScoped};

    #[derive(Clone, Debug, PartialEq, Eq, DeriveEntityModel)]
    #[sea_orm(table_name = "comments")]
    pub struct Model {
        #[sea_orm(primary_key)]
        pub id: i32,
        pub body: String,
        pub post_id: i32,
        pub tenant_id: Uuid,
    }

    #[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
    pub enum Relation {
        #[sea_orm(
            belongs_to = "super::post::Entity",
            from = "Column::PostId",
            to = "super::post::Column::Id"
        )]
        Post,
    }

    impl Related<super::post::Entity> for Entity {
        fn to() -> RelationDef {
            Relation::Post.def()
        }
    }

    impl ActiveModelBehavior for ActiveModel {}

    impl TenantScoped for Entity {
        fn tenancy() -> Tenancy<Column> {
            Tenancy::Scoped {
                tenant_column: Column::TenantId,
            }
        }
    }
}

/// Sets up an in-memory SQLite database with the tenant migration applied.
pub async fn setup_test_db() -> Result<DatabaseConnection> {
    let db = init_pool(&AppConfig::default()).await?;
    migrate(&db).await?;
    Ok(db)
}

/// A registry with the tenant type and the blog schema declared.
pub fn test_registry(lifecycle: Arc<dyn TenantLifecycle>) -> Result<ModelRegistry> {
    let mut registry = ModelRegistry::default();
    registry
        .register_tenant_type::<tenant::Entity>(lifecycle)?
        .declare::<user::Entity>()?
        .declare::<post::Entity>()?
        .declare::<comment::Entity>()?;
    Ok(registry)
}

/// Database plus registry, with the blog tables created.
pub async fn setup_tenancy() -> Result<(DatabaseConnection, Arc<ModelRegistry>)> {
    setup_tenancy_with(Arc::new(NoopLifecycle)).await
}

pub async fn setup_tenancy_with(
    lifecycle: Arc<dyn TenantLifecycle>,
) -> Result<(DatabaseConnection, Arc<ModelRegistry>)> {
    let db = setup_test_db().await?;
    let registry = test_registry(lifecycle)?;

    registry.create_table::<user::Entity, _>(&db).await?;
    registry.create_table::<post::Entity, _>(&db).await?;
    registry.create_table::<comment::Entity, _>(&db).await?;

    Ok((db, Arc::new(registry)))
}

/// Creates a tenant through a tenantless session.
pub async fn create_test_tenant(
    db: &DatabaseConnection,
    registry: &Arc<ModelRegistry>,
    name: &str,
) -> Result<TenantRef> {
    let session = TenantSession::new(db, registry.clone());
    let mut tenant = tenant::ActiveModel {
        id: Set(Uuid::new_v4()),
        name: Set(Some(name.to_string())),
        created_at: Set(chrono::Utc::now().into()),
    };
    let model = session.add(&mut tenant).await?;
    Ok(TenantRef::from(&model))
}

pub async fn create_test_user(
    session: &TenantSession<'_, DatabaseConnection>,
    name: &str,
) -> Result<user::Model> {
    let mut user = user::ActiveModel {
        name: Set(name.to_string()),
        ..Default::default()
    };
    Ok(session.add(&mut user).await?)
}

/// Adds a post through `session`, which stamps the bound tenant.
pub async fn create_test_post(
    session: &TenantSession<'_, DatabaseConnection>,
    author_id: i32,
    title: &str,
) -> Result<post::Model> {
    let mut post = post::ActiveModel {
        title: Set(title.to_string()),
        author_id: Set(author_id),
        ..Default::default()
    };
    Ok(session.add(&mut post).await?)
}

pub async fn create_test_comment(
    session: &TenantSession<'_, DatabaseConnection>,
    post_id: i32,
    body: &str,
) -> Result<comment::Model> {
    let mut comment = comment::ActiveModel {
        body: Set(body.to_string()),
        post_id: Set(post_id),
        ..Default::default()
    };
    Ok(session.add(&mut comment).await?)
}
