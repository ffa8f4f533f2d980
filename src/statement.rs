//! Traced wrappers around driver statements and result sets.

use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use crate::driver::{self, CallableStatement, PreparedStatement, Reader, ResultSet};
use crate::identity::DbIdentity;
use crate::instrumenter::CallInstrumenter;
use crate::params::{ParameterSnapshot, ParameterStore};
use crate::request::RequestDescriptor;
use crate::value::{BoundValue, LobKind, StreamKind};

static NEXT_STATEMENT_ID: AtomicU64 = AtomicU64::new(1);

/// Process-unique identity of a traced statement.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct StatementId(u64);

impl StatementId {
    fn next() -> Self {
        StatementId(NEXT_STATEMENT_ID.fetch_add(1, Ordering::Relaxed))
    }

    pub fn get(&self) -> u64 {
        self.0
    }
}

impl fmt::Display for StatementId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// How a traced statement describes its calls.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StatementKind {
    /// SQL text arrives with each call; no parameters.
    Plain,
    /// SQL fixed at preparation; parameters come from the bound values.
    Prepared,
    /// Like `Prepared`, for stored procedure calls.
    Callable,
}

/// State shared by every statement wrapper.
#[derive(Debug, Clone)]
struct Tracing {
    id: StatementId,
    kind: StatementKind,
    identity: Arc<DbIdentity>,
    instrumenter: CallInstrumenter,
}

impl Tracing {
    fn new(kind: StatementKind, identity: Arc<DbIdentity>, instrumenter: CallInstrumenter) -> Self {
        let id = StatementId::next();
        tracing::debug!(statement_id = id.get(), kind = ?kind, "wrapping statement");
        Self {
            id,
            kind,
            identity,
            instrumenter,
        }
    }

    /// Plain statements carry their values inline, so nothing is captured.
    fn execution(&self, sql: &str) -> RequestDescriptor {
        RequestDescriptor::statement(Arc::clone(&self.identity), sql)
    }

    fn prepared_execution(&self, sql: &str, parameters: &ParameterStore) -> RequestDescriptor {
        self.execution(sql).with_parameters(parameters.snapshot())
    }

    fn batch(&self, statements: &[String], batch_size: usize) -> RequestDescriptor {
        RequestDescriptor::batch(
            Arc::clone(&self.identity),
            statements.iter().cloned(),
            batch_size as u64,
        )
    }

    fn result_set<R>(&self, inner: R) -> TracedResultSet<R> {
        TracedResultSet {
            inner,
            statement: self.id,
        }
    }
}

/// A traced driver statement executing SQL passed to each call.
#[derive(Debug)]
pub struct TracedStatement<S> {
    inner: S,
    tracing: Tracing,
    batch: Vec<String>,
}

impl<S: driver::Statement> TracedStatement<S> {
    pub fn new(inner: S, identity: Arc<DbIdentity>, instrumenter: CallInstrumenter) -> Self {
        Self {
            inner,
            tracing: Tracing::new(StatementKind::Plain, identity, instrumenter),
            batch: Vec::new(),
        }
    }

    pub fn execute(&mut self, sql: &str) -> Result<bool, S::Error> {
        let request = self.tracing.execution(sql);
        self.tracing
            .instrumenter
            .wrap(&request, || self.inner.execute(sql))
    }

    pub fn execute_query(&mut self, sql: &str) -> Result<TracedResultSet<S::ResultSet>, S::Error> {
        let request = self.tracing.execution(sql);
        let rs = self
            .tracing
            .instrumenter
            .wrap(&request, || self.inner.execute_query(sql))?;
        Ok(self.tracing.result_set(rs))
    }

    pub fn execute_update(&mut self, sql: &str) -> Result<u64, S::Error> {
        let request = self.tracing.execution(sql);
        self.tracing
            .instrumenter
            .wrap(&request, || self.inner.execute_update(sql))
    }

    pub fn add_batch(&mut self, sql: &str) -> Result<(), S::Error> {
        self.inner.add_batch(sql)?;
        self.batch.push(sql.to_owned());
        Ok(())
    }

    pub fn clear_batch(&mut self) -> Result<(), S::Error> {
        self.inner.clear_batch()?;
        self.batch.clear();
        Ok(())
    }

    /// Execute the queued statements. The queue is emptied whether or not
    /// the driver succeeds.
    pub fn execute_batch(&mut self) -> Result<Vec<u64>, S::Error> {
        let queued = std::mem::take(&mut self.batch);
        let request = self.tracing.batch(&queued, queued.len());
        self.tracing
            .instrumenter
            .wrap(&request, || self.inner.execute_batch())
    }

    /// Number of statements queued for the next batch.
    pub fn batch_len(&self) -> usize {
        self.batch.len()
    }

    pub fn result_set(&mut self) -> Result<Option<TracedResultSet<S::ResultSet>>, S::Error> {
        Ok(self
            .inner
            .result_set()?
            .map(|rs| self.tracing.result_set(rs)))
    }

    pub fn update_count(&self) -> Result<Option<u64>, S::Error> {
        self.inner.update_count()
    }

    pub fn close(&mut self) -> Result<(), S::Error> {
        self.inner.close()
    }

    pub fn is_closed(&self) -> bool {
        self.inner.is_closed()
    }

    pub fn id(&self) -> StatementId {
        self.tracing.id
    }

    pub fn kind(&self) -> StatementKind {
        self.tracing.kind
    }

    pub fn inner(&self) -> &S {
        &self.inner
    }

    pub fn inner_mut(&mut self) -> &mut S {
        &mut self.inner
    }

    pub fn into_inner(self) -> S {
        self.inner
    }
}

/// A traced prepared statement. Bound values are remembered so they can be
/// reported with each execution.
#[derive(Debug)]
pub struct TracedPreparedStatement<S> {
    inner: S,
    tracing: Tracing,
    sql: String,
    parameters: ParameterStore,
    batch_size: usize,
}

/// A traced stored procedure call.
pub type TracedCallableStatement<S> = TracedPreparedStatement<S>;

impl<S: PreparedStatement> TracedPreparedStatement<S> {
    pub fn new(
        inner: S,
        sql: impl Into<String>,
        identity: Arc<DbIdentity>,
        instrumenter: CallInstrumenter,
    ) -> Self {
        Self::with_kind(inner, sql, StatementKind::Prepared, identity, instrumenter)
    }

    fn with_kind(
        inner: S,
        sql: impl Into<String>,
        kind: StatementKind,
        identity: Arc<DbIdentity>,
        instrumenter: CallInstrumenter,
    ) -> Self {
        Self {
            inner,
            tracing: Tracing::new(kind, identity, instrumenter),
            sql: sql.into(),
            parameters: ParameterStore::new(),
            batch_size: 0,
        }
    }

    /// Bind `value` to the 1-based `index`. The value is only remembered
    /// once the driver has accepted it.
    pub fn bind(&mut self, index: u32, value: impl Into<BoundValue>) -> Result<(), S::Error> {
        let value = value.into();
        self.inner.bind(index, &value)?;
        self.parameters.set(index, value);
        Ok(())
    }

    /// Bind streamed content. Only the stream kind is remembered.
    pub fn bind_stream(
        &mut self,
        index: u32,
        kind: StreamKind,
        reader: Reader,
        length: Option<u64>,
    ) -> Result<(), S::Error> {
        self.inner.bind_stream(index, kind, reader, length)?;
        self.parameters.set(index, BoundValue::Stream(kind));
        Ok(())
    }

    pub fn bind_lob(&mut self, index: u32, kind: LobKind, reader: Reader) -> Result<(), S::Error> {
        self.inner.bind_lob(index, kind, reader)?;
        self.parameters.set(index, BoundValue::Lob(kind));
        Ok(())
    }

    pub fn clear_parameters(&mut self) -> Result<(), S::Error> {
        self.inner.clear_parameters()?;
        self.parameters.clear();
        Ok(())
    }

    pub fn execute(&mut self) -> Result<bool, S::Error> {
        let request = self.tracing.prepared_execution(&self.sql, &self.parameters);
        self.tracing
            .instrumenter
            .wrap(&request, || self.inner.execute())
    }

    pub fn execute_query(&mut self) -> Result<TracedResultSet<S::ResultSet>, S::Error> {
        let request = self.tracing.prepared_execution(&self.sql, &self.parameters);
        let rs = self
            .tracing
            .instrumenter
            .wrap(&request, || self.inner.execute_query())?;
        Ok(self.tracing.result_set(rs))
    }

    pub fn execute_update(&mut self) -> Result<u64, S::Error> {
        let request = self.tracing.prepared_execution(&self.sql, &self.parameters);
        self.tracing
            .instrumenter
            .wrap(&request, || self.inner.execute_update())
    }

    pub fn add_batch(&mut self) -> Result<(), S::Error> {
        self.inner.add_batch()?;
        self.batch_size += 1;
        Ok(())
    }

    pub fn clear_batch(&mut self) -> Result<(), S::Error> {
        self.inner.clear_batch()?;
        self.batch_size = 0;
        Ok(())
    }

    /// Execute the queued parameter sets. The count is reset whether or not
    /// the driver succeeds.
    pub fn execute_batch(&mut self) -> Result<Vec<u64>, S::Error> {
        let batch_size = std::mem::take(&mut self.batch_size);
        let request = self
            .tracing
            .batch(std::slice::from_ref(&self.sql), batch_size);
        self.tracing
            .instrumenter
            .wrap(&request, || self.inner.execute_batch())
    }

    /// Number of parameter sets queued for the next batch.
    pub fn batch_len(&self) -> usize {
        self.batch_size
    }

    pub fn result_set(&mut self) -> Result<Option<TracedResultSet<S::ResultSet>>, S::Error> {
        Ok(self
            .inner
            .result_set()?
            .map(|rs| self.tracing.result_set(rs)))
    }

    /// A copy of the values bound so far.
    pub fn parameters(&self) -> ParameterSnapshot {
        self.parameters.snapshot()
    }

    pub fn sql(&self) -> &str {
        &self.sql
    }

    pub fn close(&mut self) -> Result<(), S::Error> {
        self.inner.close()
    }

    pub fn is_closed(&self) -> bool {
        self.inner.is_closed()
    }

    pub fn id(&self) -> StatementId {
        self.tracing.id
    }

    pub fn kind(&self) -> StatementKind {
        self.tracing.kind
    }

    pub fn inner(&self) -> &S {
        &self.inner
    }

    pub fn inner_mut(&mut self) -> &mut S {
        &mut self.inner
    }

    pub fn into_inner(self) -> S {
        self.inner
    }
}

impl<S: CallableStatement> TracedPreparedStatement<S> {
    /// Wrap a prepared procedure call.
    pub fn callable(
        inner: S,
        sql: impl Into<String>,
        identity: Arc<DbIdentity>,
        instrumenter: CallInstrumenter,
    ) -> Self {
        Self::with_kind(inner, sql, StatementKind::Callable, identity, instrumenter)
    }

    pub fn bind_named(&mut self, name: &str, value: impl Into<BoundValue>) -> Result<(), S::Error> {
        let value = value.into();
        self.inner.bind_named(name, &value)?;
        self.parameters.set(name, value);
        Ok(())
    }

    pub fn register_out_parameter(&mut self, index: u32, sql_type: &str) -> Result<(), S::Error> {
        self.inner.register_out_parameter(index, sql_type)
    }

    pub fn out_value(&mut self, index: u32) -> Result<BoundValue, S::Error> {
        self.inner.out_value(index)
    }
}

/// A driver result set that remembers which traced statement produced it.
#[derive(Debug)]
pub struct TracedResultSet<R> {
    inner: R,
    statement: StatementId,
}

impl<R: ResultSet> TracedResultSet<R> {
    /// Id of the traced statement this result set came from.
    pub fn statement(&self) -> StatementId {
        self.statement
    }

    pub fn next(&mut self) -> Result<bool, R::Error> {
        self.inner.next()
    }

    pub fn value(&self, column: usize) -> Result<BoundValue, R::Error> {
        self.inner.value(column)
    }

    pub fn close(&mut self) -> Result<(), R::Error> {
        self.inner.close()
    }

    pub fn inner(&self) -> &R {
        &self.inner
    }

    pub fn into_inner(self) -> R {
        self.inner
    }
}
