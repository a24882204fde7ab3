//! # Tenancy
//!
//! Row-level multi-tenancy for SeaORM. Entities declare whether their rows
//! belong to a tenant ([`registry`]), a [`session::TenantSession`] binds one
//! tenant and stamps it onto every scoped write ([`guard`]), and every read
//! built through the session is rewritten so each scoped table it touches is
//! filtered to that tenant ([`query`]).

pub mod config;
pub mod db;
pub mod error;
pub mod guard;
pub mod models;
pub mod query;
pub mod registry;
pub mod repositories;
pub mod session;
pub mod telemetry;
pub use migration;

pub use error::TenancyError;
pub use models::TenantRef;
pub use query::TenantQuery;
pub use registry::{ModelRegistry, Tenancy, TenantLifecycle, TenantScoped};
pub use session::TenantSession;
