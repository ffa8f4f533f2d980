//! SeaORM integration: a traced drop-in for `DatabaseConnection`.

use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;

use async_trait::async_trait;
use sea_orm::{
    AccessMode, ConnectionTrait, DatabaseConnection, DatabaseTransaction, DbBackend, DbErr,
    ExecResult, IsolationLevel, QueryResult, Statement, StreamTrait, TransactionError,
    TransactionTrait, Value,
};

use crate::config::TracingConfig;
use crate::identity::DbIdentity;
use crate::instrumenter::CallInstrumenter;
use crate::params::{ParameterKey, ParameterSnapshot};
use crate::parser::SqlOperation;
use crate::request::RequestDescriptor;
use crate::value::BoundValue;

/// A traced wrapper around SeaORM's `DatabaseConnection`.
///
/// This wrapper implements `ConnectionTrait`, `StreamTrait`, and `TransactionTrait`,
/// making it a drop-in replacement for `DatabaseConnection`. Every query goes
/// through the same instrumentation as the driver wrappers, with the
/// statement's bound values captured as 1-based parameters.
///
/// # Example
///
/// ```rust,ignore
/// use sea_orm::Database;
/// use db_driver_tracing::TracedDatabase;
///
/// let db = Database::connect("postgres://localhost/mydb").await?;
/// let traced = TracedDatabase::from(db);
///
/// // All queries are now traced
/// let users = Users::find().all(&traced).await?;
/// ```
///
/// Not `Clone`: `DatabaseConnection` itself is only cloneable when sea-orm's
/// `mock` feature is off.
#[derive(Debug)]
pub struct TracedDatabase {
    inner: DatabaseConnection,
    identity: Arc<DbIdentity>,
    instrumenter: CallInstrumenter,
}

impl TracedDatabase {
    /// Create a new traced connection with the given configuration.
    ///
    /// The identity only names the backend; use
    /// [`with_identity`](Self::with_identity) to report the database name,
    /// host and port.
    pub fn new(connection: DatabaseConnection, config: TracingConfig) -> Self {
        let identity = backend_identity(connection.get_database_backend());
        Self {
            inner: connection,
            identity: Arc::new(identity),
            instrumenter: CallInstrumenter::new(config),
        }
    }

    /// Create a new traced connection with default configuration.
    pub fn wrap(connection: DatabaseConnection) -> Self {
        Self::new(connection, TracingConfig::default())
    }

    pub fn with_identity(mut self, identity: DbIdentity) -> Self {
        self.identity = Arc::new(identity);
        self
    }

    /// Get a reference to the underlying `DatabaseConnection`.
    pub fn inner(&self) -> &DatabaseConnection {
        &self.inner
    }

    /// Get the tracing configuration.
    pub fn config(&self) -> &TracingConfig {
        self.instrumenter.config()
    }

    pub fn identity(&self) -> &DbIdentity {
        &self.identity
    }

    /// Consume the wrapper and return the inner `DatabaseConnection`.
    pub fn into_inner(self) -> DatabaseConnection {
        self.inner
    }

    fn statement_request(&self, stmt: &Statement) -> RequestDescriptor {
        RequestDescriptor::statement(Arc::clone(&self.identity), stmt.sql.as_str())
            .with_parameters(statement_parameters(stmt))
    }

    fn operation_request(&self, operation: SqlOperation) -> RequestDescriptor {
        RequestDescriptor::operation(Arc::clone(&self.identity), operation)
    }
}

fn backend_identity(backend: DbBackend) -> DbIdentity {
    DbIdentity::new(match backend {
        DbBackend::Postgres => "postgresql",
        DbBackend::MySql => "mysql",
        DbBackend::Sqlite => "sqlite",
    })
}

/// The statement's bound values keyed by 1-based position.
fn statement_parameters(stmt: &Statement) -> ParameterSnapshot {
    let Some(values) = &stmt.values else {
        return ParameterSnapshot::default();
    };
    values
        .0
        .iter()
        .zip(1u32..)
        .map(|(value, index)| (ParameterKey::Index(index), bound_value(value)))
        .collect()
}

fn bound_value(value: &Value) -> BoundValue {
    fn or_null<T>(value: &Option<T>, f: impl FnOnce(&T) -> BoundValue) -> BoundValue {
        value.as_ref().map_or(BoundValue::Null, f)
    }

    match value {
        Value::Bool(v) => or_null(v, |b| BoundValue::Bool(*b)),
        Value::TinyInt(v) => or_null(v, |i| BoundValue::from(*i)),
        Value::SmallInt(v) => or_null(v, |i| BoundValue::from(*i)),
        Value::Int(v) => or_null(v, |i| BoundValue::from(*i)),
        Value::BigInt(v) => or_null(v, |i| BoundValue::from(*i)),
        Value::TinyUnsigned(v) => or_null(v, |u| BoundValue::from(*u)),
        Value::SmallUnsigned(v) => or_null(v, |u| BoundValue::from(*u)),
        Value::Unsigned(v) => or_null(v, |u| BoundValue::from(*u)),
        Value::BigUnsigned(v) => or_null(v, |u| BoundValue::UInt(*u)),
        Value::Float(v) => or_null(v, |x| BoundValue::from(*x)),
        Value::Double(v) => or_null(v, |x| BoundValue::Float(*x)),
        Value::String(v) => or_null(v, |s| BoundValue::Text(s.to_string())),
        Value::Char(v) => or_null(v, |c| BoundValue::Text(c.to_string())),
        Value::Bytes(v) => or_null(v, |b| BoundValue::Bytes(b.to_vec())),
        Value::ChronoDate(v) => or_null(v, |d| BoundValue::Date(**d)),
        Value::ChronoTime(v) => or_null(v, |t| BoundValue::Time(**t)),
        Value::ChronoDateTime(v) => or_null(v, |ts| BoundValue::Timestamp(**ts)),
        Value::ChronoDateTimeUtc(v) => or_null(v, |ts| BoundValue::TimestampTz(ts.fixed_offset())),
        Value::ChronoDateTimeLocal(v) => {
            or_null(v, |ts| BoundValue::TimestampTz(ts.fixed_offset()))
        }
        Value::ChronoDateTimeWithTimeZone(v) => or_null(v, |ts| BoundValue::TimestampTz(**ts)),
        Value::Decimal(v) => or_null(v, |d| BoundValue::Decimal(**d)),
        // json, uuid and array values depend on which SeaORM features are on
        #[allow(unreachable_patterns)]
        other => BoundValue::Text(format!("{other:?}")),
    }
}

impl From<DatabaseConnection> for TracedDatabase {
    fn from(connection: DatabaseConnection) -> Self {
        Self::wrap(connection)
    }
}

impl AsRef<DatabaseConnection> for TracedDatabase {
    fn as_ref(&self) -> &DatabaseConnection {
        &self.inner
    }
}

#[async_trait]
impl ConnectionTrait for TracedDatabase {
    fn get_database_backend(&self) -> DbBackend {
        self.inner.get_database_backend()
    }

    async fn execute(&self, stmt: Statement) -> Result<ExecResult, DbErr> {
        let request = self.statement_request(&stmt);
        self.instrumenter
            .wrap_async(&request, self.inner.execute(stmt))
            .await
    }

    async fn execute_unprepared(&self, sql: &str) -> Result<ExecResult, DbErr> {
        let request = RequestDescriptor::statement(Arc::clone(&self.identity), sql);
        self.instrumenter
            .wrap_async(&request, self.inner.execute_unprepared(sql))
            .await
    }

    async fn query_one(&self, stmt: Statement) -> Result<Option<QueryResult>, DbErr> {
        let request = self.statement_request(&stmt);
        self.instrumenter
            .wrap_async(&request, self.inner.query_one(stmt))
            .await
    }

    async fn query_all(&self, stmt: Statement) -> Result<Vec<QueryResult>, DbErr> {
        let request = self.statement_request(&stmt);
        self.instrumenter
            .wrap_async(&request, self.inner.query_all(stmt))
            .await
    }

    fn support_returning(&self) -> bool {
        self.inner.support_returning()
    }

    fn is_mock_connection(&self) -> bool {
        self.inner.is_mock_connection()
    }
}

#[async_trait]
impl StreamTrait for TracedDatabase {
    type Stream<'a> = <DatabaseConnection as StreamTrait>::Stream<'a>;

    /// Only opening the stream is traced; rows are pulled outside the span.
    fn stream<'a>(
        &'a self,
        stmt: Statement,
    ) -> Pin<Box<dyn Future<Output = Result<Self::Stream<'a>, DbErr>> + 'a + Send>> {
        let request = self.statement_request(&stmt);

        Box::pin(async move {
            self.instrumenter
                .wrap_async(&request, self.inner.stream(stmt))
                .await
        })
    }
}

#[async_trait]
impl TransactionTrait for TracedDatabase {
    async fn begin(&self) -> Result<DatabaseTransaction, DbErr> {
        let request = self.operation_request(SqlOperation::Begin);
        self.instrumenter
            .wrap_async(&request, self.inner.begin())
            .await
    }

    async fn begin_with_config(
        &self,
        isolation_level: Option<IsolationLevel>,
        access_mode: Option<AccessMode>,
    ) -> Result<DatabaseTransaction, DbErr> {
        let request = self.operation_request(SqlOperation::Begin);
        self.instrumenter
            .wrap_async(
                &request,
                self.inner.begin_with_config(isolation_level, access_mode),
            )
            .await
    }

    async fn transaction<F, T, E>(&self, callback: F) -> Result<T, TransactionError<E>>
    where
        F: for<'c> FnOnce(
                &'c DatabaseTransaction,
            ) -> Pin<Box<dyn Future<Output = Result<T, E>> + Send + 'c>>
            + Send,
        T: Send,
        E: std::fmt::Display + std::fmt::Debug + Send,
    {
        let request = self.operation_request(SqlOperation::Transaction);
        self.instrumenter
            .wrap_async_with(&request, self.inner.transaction(callback), |e| {
                format!("{:?}", e)
            })
            .await
    }

    async fn transaction_with_config<F, T, E>(
        &self,
        callback: F,
        isolation_level: Option<IsolationLevel>,
        access_mode: Option<AccessMode>,
    ) -> Result<T, TransactionError<E>>
    where
        F: for<'c> FnOnce(
                &'c DatabaseTransaction,
            ) -> Pin<Box<dyn Future<Output = Result<T, E>> + Send + 'c>>
            + Send,
        T: Send,
        E: std::fmt::Display + std::fmt::Debug + Send,
    {
        let request = self.operation_request(SqlOperation::Transaction);
        self.instrumenter
            .wrap_async_with(
                &request,
                self.inner
                    .transaction_with_config(callback, isolation_level, access_mode),
                |e| format!("{:?}", e),
            )
            .await
    }
}

/// Extension trait for easy wrapping of database connections.
pub trait TracingExt {
    /// Wrap this connection with tracing instrumentation.
    fn with_tracing(self) -> TracedDatabase;

    /// Wrap this connection with custom tracing configuration.
    fn with_tracing_config(self, config: TracingConfig) -> TracedDatabase;
}

impl TracingExt for DatabaseConnection {
    fn with_tracing(self) -> TracedDatabase {
        TracedDatabase::wrap(self)
    }

    fn with_tracing_config(self, config: TracingConfig) -> TracedDatabase {
        TracedDatabase::new(self, config)
    }
}
