//! # Data Models
//!
//! Entities owned by the tenancy layer itself. Application entities live with
//! the application and opt into scoping through [`crate::registry::TenantScoped`].

pub mod tenant;

pub use tenant::Entity as Tenant;
pub use tenant::TenantRef;
