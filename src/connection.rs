//! Traced database connection wrapper.

use std::sync::Arc;

use crate::config::TracingConfig;
use crate::driver::Connection;
use crate::error::Result;
use crate::identity::DbIdentity;
use crate::instrumenter::CallInstrumenter;
use crate::parser::SqlOperation;
use crate::request::RequestDescriptor;
use crate::statement::{TracedCallableStatement, TracedPreparedStatement, TracedStatement};

/// A traced wrapper around a blocking driver connection.
///
/// Statements created through the wrapper are traced; every one of them
/// shares this connection's [`DbIdentity`] and configuration. Commit and
/// rollback are traced as well.
///
/// # Example
///
/// ```rust,ignore
/// use db_driver_tracing::{TracedConnection, TracingConfig};
///
/// let mut conn = TracedConnection::from_url(driver_conn, "postgres://app@db:5432/shop", TracingConfig::default())?;
/// let mut stmt = conn.prepare_statement("SELECT * FROM orders WHERE id = ?")?;
/// stmt.bind(1, 42)?;
/// let rows = stmt.execute_query()?;
/// ```
#[derive(Debug)]
pub struct TracedConnection<C> {
    inner: C,
    identity: Arc<DbIdentity>,
    instrumenter: CallInstrumenter,
}

impl<C: Connection> TracedConnection<C> {
    /// Create a new traced connection for a database described by `identity`.
    pub fn new(connection: C, identity: DbIdentity, config: TracingConfig) -> Self {
        Self {
            inner: connection,
            identity: Arc::new(identity),
            instrumenter: CallInstrumenter::new(config),
        }
    }

    /// Create a new traced connection, reading the identity from the URL the
    /// connection was opened with.
    pub fn from_url(connection: C, url: &str, config: TracingConfig) -> Result<Self> {
        let identity = DbIdentity::from_url(url)?;
        Ok(Self::new(connection, identity, config))
    }

    pub fn create_statement(&mut self) -> std::result::Result<TracedStatement<C::Statement>, C::Error> {
        let statement = self.inner.create_statement()?;
        Ok(TracedStatement::new(
            statement,
            Arc::clone(&self.identity),
            self.instrumenter.clone(),
        ))
    }

    pub fn prepare_statement(
        &mut self,
        sql: &str,
    ) -> std::result::Result<TracedPreparedStatement<C::PreparedStatement>, C::Error> {
        let statement = self.inner.prepare_statement(sql)?;
        Ok(TracedPreparedStatement::new(
            statement,
            sql,
            Arc::clone(&self.identity),
            self.instrumenter.clone(),
        ))
    }

    pub fn prepare_call(
        &mut self,
        sql: &str,
    ) -> std::result::Result<TracedCallableStatement<C::CallableStatement>, C::Error> {
        let statement = self.inner.prepare_call(sql)?;
        Ok(TracedPreparedStatement::callable(
            statement,
            sql,
            Arc::clone(&self.identity),
            self.instrumenter.clone(),
        ))
    }

    pub fn commit(&mut self) -> std::result::Result<(), C::Error> {
        let request = RequestDescriptor::operation(Arc::clone(&self.identity), SqlOperation::Commit);
        self.instrumenter.wrap(&request, || self.inner.commit())
    }

    pub fn rollback(&mut self) -> std::result::Result<(), C::Error> {
        let request =
            RequestDescriptor::operation(Arc::clone(&self.identity), SqlOperation::Rollback);
        self.instrumenter.wrap(&request, || self.inner.rollback())
    }

    pub fn set_auto_commit(&mut self, enabled: bool) -> std::result::Result<(), C::Error> {
        self.inner.set_auto_commit(enabled)
    }

    pub fn auto_commit(&self) -> std::result::Result<bool, C::Error> {
        self.inner.auto_commit()
    }

    pub fn close(&mut self) -> std::result::Result<(), C::Error> {
        self.inner.close()
    }

    pub fn is_closed(&self) -> bool {
        self.inner.is_closed()
    }

    pub fn identity(&self) -> &DbIdentity {
        &self.identity
    }

    pub fn instrumenter(&self) -> &CallInstrumenter {
        &self.instrumenter
    }

    /// Get a reference to the underlying driver connection.
    pub fn inner(&self) -> &C {
        &self.inner
    }

    /// Consume the wrapper and return the driver connection.
    pub fn into_inner(self) -> C {
        self.inner
    }
}
