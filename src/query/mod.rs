//! # Query Rewriter
//!
//! [`TenantQuery`] wraps a SeaORM [`Select`] built through a
//! [`TenantSession`]. It records every table the statement reads (the root
//! entity, join targets, extra `FROM` entries) and, at execution time, runs
//! them through a fresh [`ExecutionContext`] observed by a [`TenantScoper`].
//! The scoped statement is rebuilt from the caller's criteria on every read,
//! so executing or rendering the same query twice never stacks predicates.
//!
//! ```rust,ignore
//! let session = TenantSession::bound(&db, registry, tenant);
//! let titles = session
//!     .query::<post::Entity>()
//!     .join(JoinType::InnerJoin, post::Relation::Author.def())
//!     .filter(user::Column::Name.eq("ada"))
//!     .all()
//!     .await?;
//! ```

use sea_orm::sea_query::{Condition, Expr, IntoCondition, IntoIden, SelectStatement};
use sea_orm::{
    ColumnTrait, ConnectionTrait, DbBackend, EntityTrait, IdenStatic, JoinType,
    PaginatorTrait, QueryFilter, QueryOrder, QuerySelect, QueryTrait, Related, RelationDef,
    Select, Statement,
};

use crate::error::TenancyError;
use crate::registry::TenantScoped;
use crate::session::TenantSession;

pub mod context;
pub mod rewriter;

pub use context::{ExecutionContext, FromObserver, FromRef};
pub use rewriter::TenantScoper;

/// A statement that can be embedded as a tenant-scoped subquery.
pub trait ScopedStatement {
    fn scoped_statement(&self) -> Result<SelectStatement, TenancyError>;
}

pub struct TenantQuery<'s, C, E>
where
    E: EntityTrait,
{
    session: &'s TenantSession<'s, C>,
    select: Select<E>,
    froms: Vec<FromRef>,
    criterion: Option<Condition>,
    subqueries: Vec<(Expr, Box<dyn ScopedStatement + 's>)>,
    safe: bool,
}

impl<'s, C, E> TenantQuery<'s, C, E>
where
    C: ConnectionTrait + 's,
    E: TenantScoped,
{
    pub(crate) fn new(session: &'s TenantSession<'s, C>, safe: bool) -> Self {
        Self {
            session,
            select: E::find(),
            froms: vec![FromRef::entity::<E>()],
            criterion: None,
            subqueries: Vec::new(),
            safe,
        }
    }

    pub fn is_safe(&self) -> bool {
        self.safe
    }

    /// Tables recorded so far, in the order they entered the statement.
    pub fn from_set(&self) -> &[FromRef] {
        &self.froms
    }

    /// ANDs a caller predicate onto the query.
    pub fn filter<F: IntoCondition>(mut self, filter: F) -> Self {
        let criterion = self.criterion.take().unwrap_or_else(Condition::all);
        self.criterion = Some(criterion.add(filter.into_condition()));
        self
    }

    /// Joins the target of `rel`.
    pub fn join(mut self, join_type: JoinType, rel: RelationDef) -> Self {
        if let Some(from) = FromRef::from_table_ref(&rel.to_tbl) {
            self.froms.push(from);
        }
        self.select = QuerySelect::join(self.select, join_type, rel);
        self
    }

    /// Joins the target of `rel` under `alias`; the tenant predicate is
    /// qualified by the alias.
    pub fn join_as<A: IntoIden>(mut self, join_type: JoinType, rel: RelationDef, alias: A) -> Self {
        let alias = alias.into_iden();
        if let Some(from) = FromRef::from_table_ref(&rel.to_tbl) {
            self.froms.push(from.with_alias(context::iden(&alias)));
        }
        self.select = QuerySelect::join_as(self.select, join_type, rel, alias);
        self
    }

    /// Joins the source of `rel`, for relations declared on the other entity.
    pub fn join_rev(mut self, join_type: JoinType, rel: RelationDef) -> Self {
        if let Some(from) = FromRef::from_table_ref(&rel.from_tbl) {
            self.froms.push(from);
        }
        self.select = QuerySelect::join_rev(self.select, join_type, rel);
        self
    }

    /// Joins `R` through its [`Related`] definition, including any junction table.
    pub fn join_related<R>(mut self, join_type: JoinType) -> Self
    where
        R: TenantScoped,
        E: Related<R>,
    {
        if let Some(via) = <E as Related<R>>::via() {
            self = self.join(join_type, via);
        }
        self.froms.push(FromRef::entity::<R>());
        self.select = QuerySelect::join(self.select, join_type, <E as Related<R>>::to());
        self
    }

    /// Adds `F` as an additional `FROM` entry (an implicit cross join).
    pub fn also_from<F: TenantScoped>(mut self) -> Self {
        QueryTrait::query(&mut self.select).from(F::default().table_ref());
        self.froms.push(FromRef::entity::<F>());
        self
    }

    /// Restricts `column` to the rows of `subquery`, which is scoped on its own.
    pub fn filter_in<Col, S>(mut self, column: Col, subquery: S) -> Self
    where
        Col: ColumnTrait,
        S: ScopedStatement + 's,
    {
        let column = Expr::col((column.entity_name(), column));
        self.subqueries.push((column, Box::new(subquery)));
        self
    }

    /// Narrows the projection to `column`, for use as a subquery.
    pub fn select_column<Col: ColumnTrait>(mut self, column: Col) -> Self {
        self.select = QuerySelect::column(QuerySelect::select_only(self.select), column);
        self
    }

    pub fn order_by_asc<Col: ColumnTrait>(mut self, column: Col) -> Self {
        self.select = QueryOrder::order_by_asc(self.select, column);
        self
    }

    pub fn order_by_desc<Col: ColumnTrait>(mut self, column: Col) -> Self {
        self.select = QueryOrder::order_by_desc(self.select, column);
        self
    }

    pub fn limit(mut self, limit: u64) -> Self {
        self.select = QuerySelect::limit(self.select, limit);
        self
    }

    pub fn offset(mut self, offset: u64) -> Self {
        self.select = QuerySelect::offset(self.select, offset);
        self
    }

    /// Builds the statement that will actually run: the caller's predicate
    /// conjoined with one tenant predicate per scoped table.
    pub fn scoped_select(&self) -> Result<Select<E>, TenancyError> {
        let mut criterion = self.criterion.clone();
        for (column, subquery) in &self.subqueries {
            let predicate = column.clone().in_subquery(subquery.scoped_statement()?);
            criterion = Some(criterion.unwrap_or_else(Condition::all).add(predicate));
        }

        let scoper = TenantScoper::new(self.safe, self.session.tenant(), self.session.registry());
        let mut context = ExecutionContext::new(criterion).with_observer(&scoper);
        context.extend(self.froms.iter().cloned())?;

        let mut select = self.select.clone();
        if let Some(whereclause) = context.into_whereclause() {
            select = QueryFilter::filter(select, whereclause);
        }

        tracing::debug!(
            table = IdenStatic::as_str(&E::default()),
            safe = self.safe,
            tenant_id = ?self.session.tenant(),
            "Scoped select"
        );
        Ok(select)
    }

    pub fn statement(&self, backend: DbBackend) -> Result<Statement, TenancyError> {
        Ok(self.scoped_select()?.build(backend))
    }

    /// Renders the scoped statement for the session's backend, values inlined.
    pub fn to_sql(&self) -> Result<String, TenancyError> {
        let backend = self.session.connection().get_database_backend();
        Ok(self.statement(backend)?.to_string())
    }

    pub async fn all(self) -> Result<Vec<E::Model>, TenancyError> {
        let select = self.scoped_select()?;
        Ok(select.all(self.session.connection()).await?)
    }

    pub async fn one(self) -> Result<Option<E::Model>, TenancyError> {
        let select = self.scoped_select()?;
        Ok(select.one(self.session.connection()).await?)
    }

    /// The first row in statement order.
    pub async fn first(self) -> Result<Option<E::Model>, TenancyError> {
        self.limit(1).one().await
    }

    pub async fn count(self) -> Result<u64, TenancyError>
    where
        E::Model: Sync,
    {
        let select = self.scoped_select()?;
        Ok(PaginatorTrait::count(select, self.session.connection()).await?)
    }
}

impl<'s, C, E> ScopedStatement for TenantQuery<'s, C, E>
where
    C: ConnectionTrait + 's,
    E: TenantScoped,
{
    fn scoped_statement(&self) -> Result<SelectStatement, TenancyError> {
        Ok(self.scoped_select()?.into_query())
    }
}
