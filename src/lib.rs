//! # db-driver-tracing
//!
//! OpenTelemetry-compatible tracing instrumentation for database driver calls.
//!
//! This crate wraps a driver's connections, statements and result sets so that
//! every execution produces one client span, with proper parent-child
//! relationships to your existing tracing infrastructure (like HTTP request
//! spans from axum or actix-web). SeaORM connections get the same treatment
//! through [`TracedDatabase`].
//!
//! ## Features
//!
//! - **Transparent Wrappers**: Traced statements expose the driver's own API and return its own errors
//! - **OpenTelemetry Compatible**: Legacy and stable database semantic conventions, or both
//! - **Safe Statements**: Literals are replaced by `?` before a statement is recorded
//! - **Parameter Capture**: Optionally record bound values, keyed by placeholder
//! - **Performance Metrics**: Query duration, slow query warnings and error tracking
//!
//! ## Quick Start
//!
//! ```rust,ignore
//! use db_driver_tracing::{TracedConnection, TracingConfig};
//!
//! // Wrap the driver connection once
//! let mut conn = TracedConnection::from_url(driver_conn, url, TracingConfig::default())?;
//!
//! // Use it exactly like the driver connection
//! let mut stmt = conn.prepare_statement("SELECT * FROM users WHERE id = ?")?;
//! stmt.bind(1, 42)?;
//! let rows = stmt.execute_query()?;
//! ```
//!
//! With SeaORM:
//!
//! ```rust,ignore
//! use sea_orm::Database;
//! use db_driver_tracing::TracingExt;
//!
//! let db = Database::connect("postgres://localhost/mydb").await?.with_tracing();
//! let users = Users::find().all(&db).await?;
//! ```
//!
//! ## Configuration
//!
//! ```rust,ignore
//! use db_driver_tracing::{AttributeScheme, TracingConfig};
//!
//! let config = TracingConfig::default()
//!     .with_statement_sanitization(true) // Replace literals with ? (default: true)
//!     .with_parameter_logging(false)     // Include bound values (default: false)
//!     .with_attribute_scheme(AttributeScheme::Both)
//!     .with_slow_query_threshold(Duration::from_millis(100));
//!
//! // Or from OTEL_* environment variables
//! let config = TracingConfig::from_env()?;
//! ```
//!
//! ## Span Attributes
//!
//! Spans are named `db.query` with the display name in `otel.name`, such as
//! `SELECT shop.users`. Attribute keys depend on the [`AttributeScheme`]:
//!
//! | Legacy | Stable | Description |
//! |--------|--------|-------------|
//! | `db.system` | `db.system.name` | Database system, e.g. "postgresql" |
//! | `db.name` | `db.namespace` | Database name |
//! | `db.statement` | `db.query.text` | Sanitized SQL (when enabled) |
//! | `db.operation` | `db.operation.name` | SQL operation (SELECT, INSERT, ...) |
//! | `db.sql.table` | `db.collection.name` | Target table name (when detectable) |
//! | `db.user`, `db.connection_string` | | Legacy only |
//! | | `db.operation.batch.size` | Batches of two or more |
//! | `server.address`, `server.port` | same | Database host |
//! | `db.query.parameters` | same | Bound values (when enabled) |
//! | `otel.status_code` | same | "OK" or "ERROR" |
//! | `error.type`, `error.message` | same | Error details (on failure) |

mod config;
mod connection;
pub mod driver;
mod error;
mod identity;
mod instrumenter;
mod orm;
mod params;
mod parser;
pub mod request;
mod sanitizer;
mod statement;
mod value;

pub use config::{
    AttributeScheme, TracingConfig, CAPTURE_PARAMETERS_ENV, SANITIZER_ENABLED_ENV,
    SEMCONV_OPT_IN_ENV, SLOW_QUERY_THRESHOLD_ENV,
};
pub use connection::TracedConnection;
pub use error::{Error, Result};
pub use identity::DbIdentity;
pub use instrumenter::CallInstrumenter;
pub use orm::{TracedDatabase, TracingExt};
pub use params::{ParameterKey, ParameterSnapshot, ParameterStore};
pub use parser::{extract_table, parse_operation, SqlOperation};
pub use request::{AttributeValue, RequestDescriptor, SpanAttributes};
pub use sanitizer::{sanitize, Placeholder, SanitizedStatement};
pub use statement::{
    StatementId, StatementKind, TracedCallableStatement, TracedPreparedStatement,
    TracedResultSet, TracedStatement,
};
pub use value::{BoundValue, LobKind, StreamKind};

/// Prelude module for convenient imports
pub mod prelude {
    pub use crate::{
        BoundValue, DbIdentity, TracedConnection, TracedDatabase, TracingConfig, TracingExt,
    };
}
