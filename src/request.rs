//! Immutable description of one traced database call.

use std::sync::Arc;

use crate::config::TracingConfig;
use crate::identity::DbIdentity;
use crate::params::{ParameterKey, ParameterSnapshot};
use crate::parser::SqlOperation;
use crate::sanitizer::{sanitize, Placeholder, SanitizedStatement};

/// Attribute keys recorded on query spans.
pub mod keys {
    pub const DB_SYSTEM: &str = "db.system";
    pub const DB_NAME: &str = "db.name";
    pub const DB_USER: &str = "db.user";
    pub const DB_CONNECTION_STRING: &str = "db.connection_string";
    pub const DB_STATEMENT: &str = "db.statement";
    pub const DB_OPERATION: &str = "db.operation";
    pub const DB_SQL_TABLE: &str = "db.sql.table";

    pub const DB_SYSTEM_NAME: &str = "db.system.name";
    pub const DB_NAMESPACE: &str = "db.namespace";
    pub const DB_QUERY_TEXT: &str = "db.query.text";
    pub const DB_OPERATION_NAME: &str = "db.operation.name";
    pub const DB_COLLECTION_NAME: &str = "db.collection.name";
    pub const DB_OPERATION_BATCH_SIZE: &str = "db.operation.batch.size";

    pub const SERVER_ADDRESS: &str = "server.address";
    pub const SERVER_PORT: &str = "server.port";

    /// All bound parameters, rendered as `key=value` pairs.
    pub const DB_QUERY_PARAMETERS: &str = "db.query.parameters";
}

/// A span attribute value.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AttributeValue {
    Str(String),
    Int(i64),
}

impl AttributeValue {
    pub fn as_str(&self) -> Option<&str> {
        match self {
            AttributeValue::Str(s) => Some(s),
            AttributeValue::Int(_) => None,
        }
    }

    pub fn as_int(&self) -> Option<i64> {
        match self {
            AttributeValue::Int(i) => Some(*i),
            AttributeValue::Str(_) => None,
        }
    }
}

/// Attributes derived from a [`RequestDescriptor`] under one configuration.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SpanAttributes {
    pub fields: Vec<(&'static str, AttributeValue)>,
    /// Per-parameter `(key, rendered value)` pairs in statement order.
    pub parameters: Vec<(String, String)>,
}

impl SpanAttributes {
    pub fn get(&self, key: &str) -> Option<&AttributeValue> {
        self.fields.iter().find(|(k, _)| *k == key).map(|(_, v)| v)
    }

    pub fn parameter(&self, key: &str) -> Option<&str> {
        self.parameters
            .iter()
            .find(|(k, _)| k == key)
            .map(|(_, v)| v.as_str())
    }

    /// The parameters joined into one field value, if any were captured.
    pub fn parameters_field(&self) -> Option<String> {
        if self.parameters.is_empty() {
            return None;
        }
        Some(
            self.parameters
                .iter()
                .map(|(k, v)| format!("{k}={v}"))
                .collect::<Vec<_>>()
                .join(", "),
        )
    }

    fn push(&mut self, key: &'static str, value: AttributeValue) {
        self.fields.push((key, value));
    }
}

#[derive(Debug, Clone)]
struct ReportedStatement {
    raw: String,
    sanitized: SanitizedStatement,
}

impl ReportedStatement {
    fn new(raw: String) -> Self {
        let sanitized = sanitize(&raw);
        Self { raw, sanitized }
    }

    fn text(&self, sanitize: bool) -> &str {
        if sanitize {
            &self.sanitized.text
        } else {
            &self.raw
        }
    }
}

/// Everything reported about one delegated call, captured just before it runs.
///
/// Built fresh for every execution. The builder methods consume the value, so
/// a descriptor cannot change once it has been handed to the instrumenter.
#[derive(Debug, Clone)]
pub struct RequestDescriptor {
    identity: Arc<DbIdentity>,
    statements: Vec<ReportedStatement>,
    operation: Option<SqlOperation>,
    batch_size: Option<u64>,
    parameters: ParameterSnapshot,
}

impl RequestDescriptor {
    /// A call executing a single statement.
    pub fn statement(identity: Arc<DbIdentity>, sql: impl Into<String>) -> Self {
        Self {
            identity,
            statements: vec![ReportedStatement::new(sql.into())],
            operation: None,
            batch_size: None,
            parameters: ParameterSnapshot::default(),
        }
    }

    /// A batch call. `statements` holds the distinct statement texts queued
    /// (one for a prepared statement), `batch_size` the number of entries.
    pub fn batch<I, S>(identity: Arc<DbIdentity>, statements: I, batch_size: u64) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            identity,
            statements: statements
                .into_iter()
                .map(|s| ReportedStatement::new(s.into()))
                .collect(),
            operation: None,
            batch_size: Some(batch_size),
            parameters: ParameterSnapshot::default(),
        }
    }

    /// A lifecycle call with no statement text, such as a commit.
    pub fn operation(identity: Arc<DbIdentity>, operation: SqlOperation) -> Self {
        Self {
            identity,
            statements: Vec::new(),
            operation: Some(operation),
            batch_size: None,
            parameters: ParameterSnapshot::default(),
        }
    }

    pub fn with_parameters(mut self, parameters: ParameterSnapshot) -> Self {
        self.parameters = parameters;
        self
    }

    pub fn identity(&self) -> &DbIdentity {
        &self.identity
    }

    pub fn batch_size(&self) -> Option<u64> {
        self.batch_size
    }

    pub fn parameters(&self) -> &ParameterSnapshot {
        &self.parameters
    }

    fn is_uniform(&self) -> bool {
        self.statements
            .windows(2)
            .all(|w| w[0].sanitized.text == w[1].sanitized.text)
    }

    /// The reported operation: an explicit lifecycle operation, the parsed
    /// verb, or `BATCH` for a batch mixing different statements.
    pub fn operation_name(&self) -> Option<&'static str> {
        if let Some(operation) = self.operation {
            return Some(operation.as_str());
        }
        if !self.is_uniform() {
            return Some("BATCH");
        }
        self.statements
            .first()?
            .sanitized
            .operation
            .map(|op| op.as_str())
    }

    pub fn table(&self) -> Option<&str> {
        if !self.is_uniform() {
            return None;
        }
        self.statements.first()?.sanitized.table.as_deref()
    }

    /// The reported statement text; distinct texts of a batch are joined
    /// with `"; "`.
    pub fn statement_text(&self, sanitize: bool) -> Option<String> {
        let mut texts: Vec<&str> = Vec::new();
        for statement in &self.statements {
            let text = statement.text(sanitize);
            if !texts.contains(&text) {
                texts.push(text);
            }
        }
        if texts.is_empty() {
            None
        } else {
            Some(texts.join("; "))
        }
    }

    /// Span name: `{operation} {database}.{table}`, degrading to whatever
    /// parts are known.
    pub fn span_name(&self) -> String {
        let operation = self.operation_name();
        let database = self.identity.name();
        match (operation, database, self.table()) {
            (Some(op), Some(db), Some(table)) => format!("{op} {db}.{table}"),
            (Some(op), None, Some(table)) => format!("{op} {table}"),
            (Some(op), Some(db), None) => format!("{op} {db}"),
            (Some(op), None, None) => op.to_string(),
            (None, Some(db), _) => db.to_string(),
            (None, None, _) => "DB Query".to_string(),
        }
    }

    /// Derive span attributes under `config`'s scheme and reporting policy.
    pub fn attributes(&self, config: &TracingConfig) -> SpanAttributes {
        let scheme = config.attribute_scheme;
        let identity = &*self.identity;
        let mut attrs = SpanAttributes::default();
        let str_value = |s: &str| AttributeValue::Str(s.to_owned());

        let statement = if config.log_statements {
            self.statement_text(config.sanitize_statements)
        } else {
            None
        };
        let operation = self.operation_name();
        let table = self.table();

        if scheme.emits_legacy() {
            attrs.push(keys::DB_SYSTEM, str_value(identity.system()));
            if let Some(name) = identity.name() {
                attrs.push(keys::DB_NAME, str_value(name));
            }
            if let Some(user) = identity.user() {
                attrs.push(keys::DB_USER, str_value(user));
            }
            if let Some(url) = identity.short_url() {
                attrs.push(keys::DB_CONNECTION_STRING, str_value(url));
            }
            if let Some(text) = &statement {
                attrs.push(keys::DB_STATEMENT, str_value(text));
            }
            if let Some(op) = operation {
                attrs.push(keys::DB_OPERATION, str_value(op));
            }
            if let Some(table) = table {
                attrs.push(keys::DB_SQL_TABLE, str_value(table));
            }
        }

        if scheme.emits_stable() {
            attrs.push(keys::DB_SYSTEM_NAME, str_value(identity.stable_system_name()));
            if let Some(name) = identity.name() {
                attrs.push(keys::DB_NAMESPACE, str_value(name));
            }
            if let Some(text) = &statement {
                attrs.push(keys::DB_QUERY_TEXT, str_value(text));
            }
            if let Some(op) = operation {
                attrs.push(keys::DB_OPERATION_NAME, str_value(op));
            }
            if let Some(table) = table {
                attrs.push(keys::DB_COLLECTION_NAME, str_value(table));
            }
            if let Some(size) = self.batch_size.filter(|&size| size >= 2) {
                attrs.push(
                    keys::DB_OPERATION_BATCH_SIZE,
                    AttributeValue::Int(i64::try_from(size).unwrap_or(i64::MAX)),
                );
            }
        }

        if let Some(host) = identity.host() {
            attrs.push(keys::SERVER_ADDRESS, str_value(host));
        }
        if let Some(port) = identity.port() {
            attrs.push(keys::SERVER_PORT, AttributeValue::Int(i64::from(port)));
        }

        if config.log_parameters && self.batch_size.is_none() {
            if let [statement] = self.statements.as_slice() {
                attrs.parameters = self.rendered_parameters(statement, config.sanitize_statements);
            }
        }

        attrs
    }

    /// Pair each placeholder slot of `statement` with its bound value.
    ///
    /// `?` slots are keyed by their 0-based position among the `?` marks of
    /// the reported text and take the next sequential bind index. `$N`, `?N`
    /// and `:N` take index N and are keyed by their own text. `:name` and `@name` take the value bound under that name, or
    /// the next sequential index. Literals replaced by the sanitizer are
    /// keyed like `?` slots and valued by their own source text. Slots that
    /// were never bound are skipped.
    fn rendered_parameters(
        &self,
        statement: &ReportedStatement,
        sanitized: bool,
    ) -> Vec<(String, String)> {
        let mut rendered = Vec::new();
        let mut question_marks = 0usize;
        let mut next_index = 1u32;

        for placeholder in &statement.sanitized.placeholders {
            let (key, value) = match placeholder {
                Placeholder::Positional => {
                    let key = question_marks.to_string();
                    question_marks += 1;
                    let value = self.parameters.index(next_index);
                    next_index += 1;
                    (key, value.map(|v| v.render()))
                }
                Placeholder::Numbered { sigil, index } => (
                    format!("{sigil}{index}"),
                    self.parameters.index(*index).map(|v| v.render()),
                ),
                Placeholder::Named(name) => {
                    let bare = &name[1..];
                    let value = self
                        .parameters
                        .get(&ParameterKey::Name(bare.to_owned()))
                        .or_else(|| self.parameters.index(next_index));
                    next_index += 1;
                    (name.clone(), value.map(|v| v.render()))
                }
                Placeholder::Literal(text) => {
                    if !sanitized {
                        continue;
                    }
                    let key = question_marks.to_string();
                    question_marks += 1;
                    (key, Some(text.clone()))
                }
            };
            if let Some(value) = value {
                rendered.push((key, value));
            }
        }
        rendered
    }
}
