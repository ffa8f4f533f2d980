//! Shared test fixtures: an in-memory driver and a layer that captures spans.

#![allow(dead_code)]

use std::collections::{BTreeMap, HashMap};
use std::fmt;
use std::sync::{Arc, Mutex};

use db_driver_tracing::driver::{
    CallableStatement, Connection, PreparedStatement, Reader, ResultSet, Statement,
};
use db_driver_tracing::{BoundValue, DbIdentity, LobKind, StreamKind};
use tracing::field::{Field, Visit};
use tracing::span::{Attributes, Record};
use tracing::{Event, Id, Level, Subscriber};
use tracing_subscriber::layer::{Context, SubscriberExt};
use tracing_subscriber::registry::{LookupSpan, SpanRef};
use tracing_subscriber::Layer;

// ---------------------------------------------------------------------------
// span capture
// ---------------------------------------------------------------------------

#[derive(Debug, Clone)]
pub struct CapturedEvent {
    pub level: Level,
    pub fields: BTreeMap<String, String>,
}

impl CapturedEvent {
    pub fn message(&self) -> Option<&str> {
        self.fields.get("message").map(String::as_str)
    }
}

#[derive(Debug, Clone)]
pub struct CapturedSpan {
    pub name: &'static str,
    pub parent: Option<usize>,
    pub fields: BTreeMap<String, String>,
    pub events: Vec<CapturedEvent>,
    pub closed: bool,
}

impl CapturedSpan {
    pub fn field(&self, name: &str) -> Option<&str> {
        self.fields.get(name).map(String::as_str)
    }
}

/// Index of a span in the capture log, stored in the span's extensions.
struct SpanIndex(usize);

struct FieldVisitor<'a>(&'a mut BTreeMap<String, String>);

impl Visit for FieldVisitor<'_> {
    fn record_str(&mut self, field: &Field, value: &str) {
        self.0.insert(field.name().to_string(), value.to_string());
    }

    fn record_i64(&mut self, field: &Field, value: i64) {
        self.0.insert(field.name().to_string(), value.to_string());
    }

    fn record_u64(&mut self, field: &Field, value: u64) {
        self.0.insert(field.name().to_string(), value.to_string());
    }

    fn record_bool(&mut self, field: &Field, value: bool) {
        self.0.insert(field.name().to_string(), value.to_string());
    }

    fn record_debug(&mut self, field: &Field, value: &dyn fmt::Debug) {
        self.0.insert(field.name().to_string(), format!("{value:?}"));
    }
}

/// Records every span and event for the thread it is installed on.
#[derive(Debug, Clone, Default)]
pub struct SpanCapture {
    spans: Arc<Mutex<Vec<CapturedSpan>>>,
}

impl SpanCapture {
    /// Install a fresh capture as the thread's default subscriber.
    pub fn install() -> (Self, tracing::subscriber::DefaultGuard) {
        let capture = SpanCapture::default();
        let subscriber = tracing_subscriber::registry().with(capture.clone());
        let guard = tracing::subscriber::set_default(subscriber);
        (capture, guard)
    }

    pub fn spans(&self) -> Vec<CapturedSpan> {
        self.spans.lock().unwrap().clone()
    }

    pub fn query_spans(&self) -> Vec<CapturedSpan> {
        self.spans()
            .into_iter()
            .filter(|s| s.name == "db.query")
            .collect()
    }

    /// The only `db.query` span, panicking unless there is exactly one.
    pub fn single_query_span(&self) -> CapturedSpan {
        let mut spans = self.query_spans();
        assert_eq!(spans.len(), 1, "expected one query span, got {spans:#?}");
        spans.remove(0)
    }

    fn index_of<S>(ctx: &Context<'_, S>, id: &Id) -> Option<usize>
    where
        S: Subscriber + for<'a> LookupSpan<'a>,
    {
        span_index(&ctx.span(id)?)
    }
}

fn span_index<S>(span: &SpanRef<'_, S>) -> Option<usize>
where
    S: for<'a> LookupSpan<'a>,
{
    span.extensions().get::<SpanIndex>().map(|i| i.0)
}

impl<S> Layer<S> for SpanCapture
where
    S: Subscriber + for<'a> LookupSpan<'a>,
{
    fn on_new_span(&self, attrs: &Attributes<'_>, id: &Id, ctx: Context<'_, S>) {
        let Some(span) = ctx.span(id) else {
            return;
        };

        let mut fields = BTreeMap::new();
        attrs.record(&mut FieldVisitor(&mut fields));
        let parent = span.parent().and_then(|p| span_index(&p));

        let mut spans = self.spans.lock().unwrap();
        spans.push(CapturedSpan {
            name: attrs.metadata().name(),
            parent,
            fields,
            events: Vec::new(),
            closed: false,
        });
        span.extensions_mut().insert(SpanIndex(spans.len() - 1));
    }

    fn on_record(&self, id: &Id, values: &Record<'_>, ctx: Context<'_, S>) {
        if let Some(index) = Self::index_of(&ctx, id) {
            let mut spans = self.spans.lock().unwrap();
            values.record(&mut FieldVisitor(&mut spans[index].fields));
        }
    }

    fn on_event(&self, event: &Event<'_>, ctx: Context<'_, S>) {
        let Some(index) = ctx.event_span(event).and_then(|s| span_index(&s)) else {
            return;
        };

        let mut fields = BTreeMap::new();
        event.record(&mut FieldVisitor(&mut fields));
        self.spans.lock().unwrap()[index].events.push(CapturedEvent {
            level: *event.metadata().level(),
            fields,
        });
    }

    fn on_close(&self, id: Id, ctx: Context<'_, S>) {
        if let Some(index) = Self::index_of(&ctx, &id) {
            self.spans.lock().unwrap()[index].closed = true;
        }
    }
}

// ---------------------------------------------------------------------------
// in-memory driver
// ---------------------------------------------------------------------------

/// Any statement mentioning this table fails.
pub const MISSING_TABLE: &str = "bogus";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FakeError(pub String);

impl fmt::Display for FakeError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl std::error::Error for FakeError {}

fn missing_table() -> FakeError {
    FakeError(format!("relation \"{MISSING_TABLE}\" does not exist"))
}

fn closed() -> FakeError {
    FakeError("statement is closed".to_string())
}

fn returns_rows(sql: &str) -> bool {
    sql.trim_start().to_ascii_uppercase().starts_with("SELECT")
}

/// Identity used by most tests.
pub fn identity() -> DbIdentity {
    DbIdentity::new("my_system")
        .with_subtype("my_sub_type")
        .with_short_url("my_connection_string")
        .with_user("my_user")
        .with_name("my_name")
        .with_host("my_host")
        .with_port(1234)
}

#[derive(Debug, Default)]
pub struct FakeConnection {
    pub closed: bool,
    pub auto_commit: bool,
    pub fail_commit: bool,
    pub fail_rollback: bool,
    pub commits: u32,
    pub rollbacks: u32,
}

impl FakeConnection {
    pub fn new() -> Self {
        Self {
            auto_commit: true,
            ..Self::default()
        }
    }
}

impl Connection for FakeConnection {
    type Error = FakeError;
    type Statement = FakeStatement;
    type PreparedStatement = FakePreparedStatement;
    type CallableStatement = FakePreparedStatement;

    fn create_statement(&mut self) -> Result<FakeStatement, FakeError> {
        Ok(FakeStatement::default())
    }

    fn prepare_statement(&mut self, sql: &str) -> Result<FakePreparedStatement, FakeError> {
        Ok(FakePreparedStatement::new(sql))
    }

    fn prepare_call(&mut self, sql: &str) -> Result<FakePreparedStatement, FakeError> {
        Ok(FakePreparedStatement::new(sql))
    }

    fn commit(&mut self) -> Result<(), FakeError> {
        if self.fail_commit {
            return Err(FakeError("could not serialize access".to_string()));
        }
        self.commits += 1;
        Ok(())
    }

    fn rollback(&mut self) -> Result<(), FakeError> {
        if self.fail_rollback {
            return Err(FakeError("connection reset".to_string()));
        }
        self.rollbacks += 1;
        Ok(())
    }

    fn set_auto_commit(&mut self, enabled: bool) -> Result<(), FakeError> {
        self.auto_commit = enabled;
        Ok(())
    }

    fn auto_commit(&self) -> Result<bool, FakeError> {
        Ok(self.auto_commit)
    }

    fn close(&mut self) -> Result<(), FakeError> {
        self.closed = true;
        Ok(())
    }

    fn is_closed(&self) -> bool {
        self.closed
    }
}

/// Two rows of one integer column.
#[derive(Debug)]
pub struct FakeResultSet {
    rows: Vec<i64>,
    cursor: Option<usize>,
}

impl FakeResultSet {
    fn new() -> Self {
        Self {
            rows: vec![1, 2],
            cursor: None,
        }
    }
}

impl ResultSet for FakeResultSet {
    type Error = FakeError;

    fn next(&mut self) -> Result<bool, FakeError> {
        let next = self.cursor.map_or(0, |c| c + 1);
        self.cursor = Some(next);
        Ok(next < self.rows.len())
    }

    fn value(&self, column: usize) -> Result<BoundValue, FakeError> {
        match (column, self.cursor) {
            (1, Some(row)) if row < self.rows.len() => Ok(BoundValue::Int(self.rows[row])),
            _ => Err(FakeError(format!("no value at column {column}"))),
        }
    }

    fn close(&mut self) -> Result<(), FakeError> {
        Ok(())
    }
}

#[derive(Debug, Default)]
pub struct FakeStatement {
    pub closed: bool,
    pub batch: Vec<String>,
    pub executed: Vec<String>,
    last_returned_rows: bool,
}

impl FakeStatement {
    fn run(&mut self, sql: &str) -> Result<(), FakeError> {
        if self.closed {
            return Err(closed());
        }
        if sql.contains(MISSING_TABLE) {
            return Err(missing_table());
        }
        self.executed.push(sql.to_string());
        self.last_returned_rows = returns_rows(sql);
        Ok(())
    }
}

impl Statement for FakeStatement {
    type Error = FakeError;
    type ResultSet = FakeResultSet;

    fn execute(&mut self, sql: &str) -> Result<bool, FakeError> {
        self.run(sql)?;
        Ok(self.last_returned_rows)
    }

    fn execute_query(&mut self, sql: &str) -> Result<FakeResultSet, FakeError> {
        self.run(sql)?;
        Ok(FakeResultSet::new())
    }

    fn execute_update(&mut self, sql: &str) -> Result<u64, FakeError> {
        self.run(sql)?;
        Ok(1)
    }

    fn add_batch(&mut self, sql: &str) -> Result<(), FakeError> {
        if self.closed {
            return Err(closed());
        }
        self.batch.push(sql.to_string());
        Ok(())
    }

    fn clear_batch(&mut self) -> Result<(), FakeError> {
        self.batch.clear();
        Ok(())
    }

    fn execute_batch(&mut self) -> Result<Vec<u64>, FakeError> {
        let batch = std::mem::take(&mut self.batch);
        let mut counts = Vec::with_capacity(batch.len());
        for sql in &batch {
            self.run(sql)?;
            counts.push(1);
        }
        Ok(counts)
    }

    fn result_set(&mut self) -> Result<Option<FakeResultSet>, FakeError> {
        if self.closed {
            return Err(closed());
        }
        Ok(self.last_returned_rows.then(FakeResultSet::new))
    }

    fn update_count(&self) -> Result<Option<u64>, FakeError> {
        Ok((!self.last_returned_rows).then_some(1))
    }

    fn close(&mut self) -> Result<(), FakeError> {
        self.closed = true;
        Ok(())
    }

    fn is_closed(&self) -> bool {
        self.closed
    }
}

/// Accepts bind indices from 1 up to the number of `?`, `$N` and `:name`
/// markers in its SQL.
#[derive(Debug)]
pub struct FakePreparedStatement {
    pub sql: String,
    pub closed: bool,
    pub bound: BTreeMap<u32, BoundValue>,
    pub named: HashMap<String, BoundValue>,
    pub out_parameters: BTreeMap<u32, String>,
    pub batch: usize,
    slots: u32,
}

impl FakePreparedStatement {
    fn new(sql: &str) -> Self {
        let slots = sql.matches(|c: char| matches!(c, '?' | '$' | ':')).count() as u32;
        Self {
            sql: sql.to_string(),
            closed: false,
            bound: BTreeMap::new(),
            named: HashMap::new(),
            out_parameters: BTreeMap::new(),
            batch: 0,
            slots,
        }
    }

    fn check(&self, index: u32) -> Result<(), FakeError> {
        if self.closed {
            return Err(closed());
        }
        if index == 0 || index > self.slots {
            return Err(FakeError(format!("parameter index {index} out of range")));
        }
        Ok(())
    }

    fn run(&self) -> Result<(), FakeError> {
        if self.closed {
            return Err(closed());
        }
        if self.sql.contains(MISSING_TABLE) {
            return Err(missing_table());
        }
        Ok(())
    }
}

impl PreparedStatement for FakePreparedStatement {
    type Error = FakeError;
    type ResultSet = FakeResultSet;

    fn bind(&mut self, index: u32, value: &BoundValue) -> Result<(), FakeError> {
        self.check(index)?;
        self.bound.insert(index, value.clone());
        Ok(())
    }

    fn bind_stream(
        &mut self,
        index: u32,
        kind: StreamKind,
        _reader: Reader,
        _length: Option<u64>,
    ) -> Result<(), FakeError> {
        self.check(index)?;
        self.bound.insert(index, BoundValue::Stream(kind));
        Ok(())
    }

    fn bind_lob(&mut self, index: u32, kind: LobKind, _reader: Reader) -> Result<(), FakeError> {
        self.check(index)?;
        self.bound.insert(index, BoundValue::Lob(kind));
        Ok(())
    }

    fn clear_parameters(&mut self) -> Result<(), FakeError> {
        if self.closed {
            return Err(closed());
        }
        self.bound.clear();
        self.named.clear();
        Ok(())
    }

    fn execute(&mut self) -> Result<bool, FakeError> {
        self.run()?;
        Ok(returns_rows(&self.sql))
    }

    fn execute_query(&mut self) -> Result<FakeResultSet, FakeError> {
        self.run()?;
        Ok(FakeResultSet::new())
    }

    fn execute_update(&mut self) -> Result<u64, FakeError> {
        self.run()?;
        Ok(1)
    }

    fn add_batch(&mut self) -> Result<(), FakeError> {
        if self.closed {
            return Err(closed());
        }
        self.batch += 1;
        Ok(())
    }

    fn clear_batch(&mut self) -> Result<(), FakeError> {
        self.batch = 0;
        Ok(())
    }

    fn execute_batch(&mut self) -> Result<Vec<u64>, FakeError> {
        let batch = std::mem::take(&mut self.batch);
        self.run()?;
        Ok(vec![1; batch])
    }

    fn result_set(&mut self) -> Result<Option<FakeResultSet>, FakeError> {
        if self.closed {
            return Err(closed());
        }
        Ok(returns_rows(&self.sql).then(FakeResultSet::new))
    }

    fn close(&mut self) -> Result<(), FakeError> {
        self.closed = true;
        Ok(())
    }

    fn is_closed(&self) -> bool {
        self.closed
    }
}

impl CallableStatement for FakePreparedStatement {
    fn bind_named(&mut self, name: &str, value: &BoundValue) -> Result<(), FakeError> {
        if self.closed {
            return Err(closed());
        }
        if !self.sql.contains(&format!(":{name}")) {
            return Err(FakeError(format!("unknown parameter {name}")));
        }
        self.named.insert(name.to_string(), value.clone());
        Ok(())
    }

    fn register_out_parameter(&mut self, index: u32, sql_type: &str) -> Result<(), FakeError> {
        self.check(index)?;
        self.out_parameters.insert(index, sql_type.to_string());
        Ok(())
    }

    fn out_value(&mut self, index: u32) -> Result<BoundValue, FakeError> {
        match self.out_parameters.get(&index) {
            Some(_) => Ok(BoundValue::Int(i64::from(index) * 10)),
            None => Err(FakeError(format!("parameter {index} is not an out parameter"))),
        }
    }
}
