//! The blocking driver interface the traced wrappers sit on top of.
//!
//! A driver implements these traits for its own connection, statement and
//! result set types. Every operation returns the driver's own error type,
//! which the wrappers propagate unchanged.

use std::fmt::Display;
use std::io::Read;

use crate::value::{BoundValue, LobKind, StreamKind};

/// Streamed parameter content.
pub type Reader = Box<dyn Read + Send>;

pub trait Connection {
    type Error: Display;
    type Statement: Statement<Error = Self::Error>;
    type PreparedStatement: PreparedStatement<Error = Self::Error>;
    type CallableStatement: CallableStatement<Error = Self::Error>;

    fn create_statement(&mut self) -> Result<Self::Statement, Self::Error>;

    fn prepare_statement(&mut self, sql: &str) -> Result<Self::PreparedStatement, Self::Error>;

    /// Prepare a stored procedure call, e.g. `{call refresh(?)}`.
    fn prepare_call(&mut self, sql: &str) -> Result<Self::CallableStatement, Self::Error>;

    fn commit(&mut self) -> Result<(), Self::Error>;

    fn rollback(&mut self) -> Result<(), Self::Error>;

    fn set_auto_commit(&mut self, enabled: bool) -> Result<(), Self::Error>;

    fn auto_commit(&self) -> Result<bool, Self::Error>;

    fn close(&mut self) -> Result<(), Self::Error>;

    fn is_closed(&self) -> bool;
}

/// A statement executing SQL text passed to each call.
pub trait Statement {
    type Error: Display;
    type ResultSet: ResultSet<Error = Self::Error>;

    /// Returns `true` when the first result is a result set.
    fn execute(&mut self, sql: &str) -> Result<bool, Self::Error>;

    fn execute_query(&mut self, sql: &str) -> Result<Self::ResultSet, Self::Error>;

    fn execute_update(&mut self, sql: &str) -> Result<u64, Self::Error>;

    fn add_batch(&mut self, sql: &str) -> Result<(), Self::Error>;

    fn clear_batch(&mut self) -> Result<(), Self::Error>;

    /// Returns one update count per queued statement.
    fn execute_batch(&mut self) -> Result<Vec<u64>, Self::Error>;

    /// The result set produced by the last `execute`, if any.
    fn result_set(&mut self) -> Result<Option<Self::ResultSet>, Self::Error>;

    fn update_count(&self) -> Result<Option<u64>, Self::Error>;

    fn close(&mut self) -> Result<(), Self::Error>;

    fn is_closed(&self) -> bool;
}

/// A statement whose SQL is fixed at preparation, with 1-based parameters.
pub trait PreparedStatement {
    type Error: Display;
    type ResultSet: ResultSet<Error = Self::Error>;

    fn bind(&mut self, index: u32, value: &BoundValue) -> Result<(), Self::Error>;

    fn bind_stream(
        &mut self,
        index: u32,
        kind: StreamKind,
        reader: Reader,
        length: Option<u64>,
    ) -> Result<(), Self::Error>;

    fn bind_lob(&mut self, index: u32, kind: LobKind, reader: Reader) -> Result<(), Self::Error>;

    fn clear_parameters(&mut self) -> Result<(), Self::Error>;

    fn execute(&mut self) -> Result<bool, Self::Error>;

    fn execute_query(&mut self) -> Result<Self::ResultSet, Self::Error>;

    fn execute_update(&mut self) -> Result<u64, Self::Error>;

    /// Queue the current parameter set.
    fn add_batch(&mut self) -> Result<(), Self::Error>;

    fn clear_batch(&mut self) -> Result<(), Self::Error>;

    fn execute_batch(&mut self) -> Result<Vec<u64>, Self::Error>;

    fn result_set(&mut self) -> Result<Option<Self::ResultSet>, Self::Error>;

    fn close(&mut self) -> Result<(), Self::Error>;

    fn is_closed(&self) -> bool;
}

/// A prepared stored procedure call.
pub trait CallableStatement: PreparedStatement {
    fn bind_named(&mut self, name: &str, value: &BoundValue) -> Result<(), Self::Error>;

    fn register_out_parameter(&mut self, index: u32, sql_type: &str) -> Result<(), Self::Error>;

    fn out_value(&mut self, index: u32) -> Result<BoundValue, Self::Error>;
}

pub trait ResultSet {
    type Error: Display;

    /// Advance to the next row, returning `false` past the last one.
    fn next(&mut self) -> Result<bool, Self::Error>;

    /// Value of the 1-based `column` in the current row.
    fn value(&self, column: usize) -> Result<BoundValue, Self::Error>;

    fn close(&mut self) -> Result<(), Self::Error>;
}
