//! # Repository Layer
//!
//! Repositories encapsulate SeaORM operations behind a [`crate::session::TenantSession`],
//! so every read and write they perform is subject to tenant scoping.

pub mod tenant;

pub use tenant::{CreateTenantRequest, TenantRepository};
