//! Tenant predicate injection.
//!
//! [`TenantScoper`] is the [`FromObserver`] installed on every safe query.
//! For each from-reference whose table carries a tenant column it ANDs
//! `<qualifier>.<tenant column> = <bound tenant>` onto the context's
//! predicate, or refuses the statement when no tenant is bound. A table the
//! registry has no declaration for is refused as well: its tenancy cannot be
//! known, so it is never read unfiltered.

use sea_orm::sea_query::{Alias, Expr, SimpleExpr};
use tracing::trace;

use super::context::{ExecutionContext, FromObserver, FromRef};
use crate::error::TenancyError;
use crate::guard::record_unbound;
use crate::models::tenant::TenantRef;
use crate::registry::TenantMetadata;

pub struct TenantScoper<'a> {
    safe: bool,
    tenant: Option<&'a TenantRef>,
    metadata: &'a dyn TenantMetadata,
}

impl<'a> TenantScoper<'a> {
    pub fn new(safe: bool, tenant: Option<&'a TenantRef>, metadata: &'a dyn TenantMetadata) -> Self {
        Self {
            safe,
            tenant,
            metadata,
        }
    }

    /// The predicate restricting `from` to the bound tenant, `None` when no
    /// restriction applies.
    pub fn tenant_predicate(&self, from: &FromRef) -> Result<Option<SimpleExpr>, TenancyError> {
        if !self.safe {
            return Ok(None);
        }

        if !self.metadata.is_declared(from.table_name()) {
            return Err(TenancyError::undeclared(from.table_name()));
        }

        let Some(column) = from
            .declared_tenant_column()
            .or_else(|| self.metadata.tenant_column(from.table_name()))
        else {
            return Ok(None);
        };

        let Some(tenant) = self.tenant else {
            record_unbound(from.table_name(), "query");
            return Err(TenancyError::unbound("query", from.table_name()));
        };

        Ok(Some(
            Expr::col((Alias::new(from.qualifier()), Alias::new(column))).eq(tenant.id()),
        ))
    }
}

impl FromObserver for TenantScoper<'_> {
    fn observe(
        &self,
        from: &FromRef,
        context: &mut ExecutionContext<'_>,
    ) -> Result<(), TenancyError> {
        if let Some(predicate) = self.tenant_predicate(from)? {
            trace!(
                table = from.table_name(),
                qualifier = from.qualifier(),
                "Injected tenant predicate"
            );
            context.conjoin(predicate);
        }
        Ok(())
    }
}
