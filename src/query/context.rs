//! Execution context of a single statement: the from-set it reads and the
//! predicate tree that filters it.
//!
//! Every from-reference enters through [`ExecutionContext::add_from`], which
//! hands it to the installed [`FromObserver`] before recording it. A reference
//! whose identity (alias, or table name when unaliased) is already present is
//! skipped, so observing the same table twice never stacks predicates.

use std::collections::HashSet;

use sea_orm::{Iden, IdenStatic};
use sea_orm::sea_query::{Condition, DynIden, IntoCondition, TableRef};

use crate::error::TenancyError;
use crate::registry::{TenantScoped, table_name};

/// A table, aliased table or join target contributing rows to a statement.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct FromRef {
    table: String,
    alias: Option<String>,
    tenant_column: Option<String>,
}

impl FromRef {
    /// A reference known only by table name; its tenancy is looked up in the registry.
    pub fn table<S: Into<String>>(table: S) -> Self {
        Self {
            table: table.into(),
            alias: None,
            tenant_column: None,
        }
    }

    /// A reference to `E`, carrying the tenant column `E` declares.
    pub fn entity<E: TenantScoped>() -> Self {
        Self {
            table: table_name::<E>(),
            alias: None,
            tenant_column: E::tenancy()
                .tenant_column()
                .map(|column| IdenStatic::as_str(&column).to_string()),
        }
    }

    pub fn with_alias<S: Into<String>>(mut self, alias: S) -> Self {
        self.alias = Some(alias.into());
        self
    }

    /// Extracts the table (and alias) a SeaQuery table reference points at.
    /// Subqueries, value lists and function calls yield `None`: they own
    /// their own context.
    pub fn from_table_ref(table_ref: &TableRef) -> Option<Self> {
        match table_ref {
            TableRef::Table(table)
            | TableRef::SchemaTable(_, table)
            | TableRef::DatabaseSchemaTable(_, _, table) => Some(Self::table(iden(table))),
            TableRef::TableAlias(table, alias)
            | TableRef::SchemaTableAlias(_, table, alias)
            | TableRef::DatabaseSchemaTableAlias(_, _, table, alias) => {
                Some(Self::table(iden(table)).with_alias(iden(alias)))
            }
            _ => None,
        }
    }

    pub fn table_name(&self) -> &str {
        &self.table
    }

    pub fn alias(&self) -> Option<&str> {
        self.alias.as_deref()
    }

    pub fn declared_tenant_column(&self) -> Option<&str> {
        self.tenant_column.as_deref()
    }

    /// Name that qualifies this reference's columns in the statement.
    pub fn qualifier(&self) -> &str {
        self.alias.as_deref().unwrap_or(&self.table)
    }
}

pub(crate) fn iden(iden: &DynIden) -> String {
    Iden::to_string(&**iden)
}

/// Callback invoked whenever a from-reference is added to a context.
pub trait FromObserver {
    fn observe(
        &self,
        from: &FromRef,
        context: &mut ExecutionContext<'_>,
    ) -> Result<(), TenancyError>;
}

pub struct ExecutionContext<'o> {
    froms: Vec<FromRef>,
    processed: HashSet<String>,
    whereclause: Option<Condition>,
    observer: Option<&'o dyn FromObserver>,
}

impl<'o> ExecutionContext<'o> {
    /// Starts a context from the caller's predicate, which is kept intact and
    /// only ever conjoined with.
    pub fn new(criterion: Option<Condition>) -> Self {
        Self {
            froms: Vec::new(),
            processed: HashSet::new(),
            whereclause: criterion.map(|criterion| Condition::all().add(criterion)),
            observer: None,
        }
    }

    pub fn with_observer(mut self, observer: &'o dyn FromObserver) -> Self {
        self.observer = Some(observer);
        self
    }

    pub fn add_from(&mut self, from: FromRef) -> Result<(), TenancyError> {
        if self.processed.contains(from.qualifier()) {
            return Ok(());
        }

        if let Some(observer) = self.observer {
            observer.observe(&from, self)?;
        }

        self.processed.insert(from.qualifier().to_string());
        self.froms.push(from);
        Ok(())
    }

    pub fn extend<I>(&mut self, froms: I) -> Result<(), TenancyError>
    where
        I: IntoIterator<Item = FromRef>,
    {
        for from in froms {
            self.add_from(from)?;
        }
        Ok(())
    }

    /// ANDs `criterion` onto the predicate, or makes it the sole predicate.
    pub fn conjoin<F: IntoCondition>(&mut self, criterion: F) {
        let criterion = criterion.into_condition();
        self.whereclause = Some(match self.whereclause.take() {
            Some(existing) => existing.add(criterion),
            None => Condition::all().add(criterion),
        });
    }

    pub fn froms(&self) -> &[FromRef] {
        &self.froms
    }

    pub fn whereclause(&self) -> Option<&Condition> {
        self.whereclause.as_ref()
    }

    pub fn into_whereclause(self) -> Option<Condition> {
        self.whereclause
    }
}
