//! SQL parsing utilities for extracting operation type and table names.

use once_cell::sync::Lazy;
use regex::Regex;

/// SQL operation types
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SqlOperation {
    Select,
    Insert,
    Update,
    Delete,
    Merge,
    Call,
    Create,
    Drop,
    Alter,
    Truncate,
    Begin,
    Commit,
    Rollback,
    Set,
    /// A transaction scope opened and closed by the wrapper, not a statement.
    Transaction,
}

impl SqlOperation {
    /// Returns the operation as a string suitable for span names.
    pub fn as_str(&self) -> &'static str {
        match self {
            SqlOperation::Select => "SELECT",
            SqlOperation::Insert => "INSERT",
            SqlOperation::Update => "UPDATE",
            SqlOperation::Delete => "DELETE",
            SqlOperation::Merge => "MERGE",
            SqlOperation::Call => "CALL",
            SqlOperation::Create => "CREATE",
            SqlOperation::Drop => "DROP",
            SqlOperation::Alter => "ALTER",
            SqlOperation::Truncate => "TRUNCATE",
            SqlOperation::Begin => "BEGIN",
            SqlOperation::Commit => "COMMIT",
            SqlOperation::Rollback => "ROLLBACK",
            SqlOperation::Set => "SET",
            SqlOperation::Transaction => "TRANSACTION",
        }
    }
}

impl std::fmt::Display for SqlOperation {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

// A possibly schema-qualified, possibly quoted identifier: users, public.users, "Users", [dbo].[t]
const TABLE_NAME: &str = r#"(?:[`"\[]?[\w$]+[`"\]]?\.)*[`"\[]?[\w$]+[`"\]]?"#;

/// Compiles `prefix` followed by either an opening parenthesis (a subquery,
/// reported as no table) or a table name, captured as `table`.
fn table_regex(prefix: &str) -> Regex {
    Regex::new(&format!(r"(?i){prefix}(?P<table>\(|{TABLE_NAME})")).unwrap()
}

// Regex patterns for table extraction (compiled once)
static SELECT_TABLE_REGEX: Lazy<Regex> = Lazy::new(|| table_regex(r"\bFROM\b\s*"));

static INSERT_TABLE_REGEX: Lazy<Regex> = Lazy::new(|| table_regex(r"\bINSERT\s+(?:IGNORE\s+)?INTO\s+"));

static UPDATE_TABLE_REGEX: Lazy<Regex> = Lazy::new(|| table_regex(r"\bUPDATE\s+(?:ONLY\s+)?"));

static DELETE_TABLE_REGEX: Lazy<Regex> = Lazy::new(|| table_regex(r"\bDELETE\s+FROM\s+(?:ONLY\s+)?"));

static MERGE_TABLE_REGEX: Lazy<Regex> = Lazy::new(|| table_regex(r"\bMERGE\s+INTO\s+"));

static CREATE_TABLE_REGEX: Lazy<Regex> = Lazy::new(|| {
    table_regex(r"\bCREATE\s+(?:TEMP(?:ORARY)?\s+)?TABLE\s+(?:IF\s+NOT\s+EXISTS\s+)?")
});

static DROP_TABLE_REGEX: Lazy<Regex> =
    Lazy::new(|| table_regex(r"\bDROP\s+TABLE\s+(?:IF\s+EXISTS\s+)?"));

static ALTER_TABLE_REGEX: Lazy<Regex> = Lazy::new(|| table_regex(r"\bALTER\s+TABLE\s+"));

static TRUNCATE_TABLE_REGEX: Lazy<Regex> = Lazy::new(|| table_regex(r"\bTRUNCATE\s+(?:TABLE\s+)?"));

/// Byte offset of the first keyword of the statement, skipping opening
/// parentheses, JDBC escape braces and a `? =` return-value prefix.
fn verb_start(sql: &str) -> usize {
    let mut rest = sql.trim_start_matches(|c: char| c.is_whitespace() || c == '(' || c == '{');
    if let Some(after) = rest.strip_prefix('?') {
        let after = after.trim_start();
        rest = after.strip_prefix('=').unwrap_or(after).trim_start();
    }
    sql.len() - rest.len()
}

fn leading_verb(sql: &str) -> &str {
    let rest = &sql[verb_start(sql)..];
    let end = rest
        .find(|c: char| !(c.is_alphanumeric() || c == '_'))
        .unwrap_or(rest.len());
    &rest[..end]
}

/// Parse the SQL operation type from a query string.
///
/// Returns `None` when the leading keyword is not a recognized verb.
pub fn parse_operation(sql: &str) -> Option<SqlOperation> {
    let verb = leading_verb(sql);
    let is = |keyword: &str| verb.eq_ignore_ascii_case(keyword);

    let operation = if is("SELECT") || is("WITH") {
        SqlOperation::Select
    } else if is("INSERT") {
        SqlOperation::Insert
    } else if is("UPDATE") {
        SqlOperation::Update
    } else if is("DELETE") {
        SqlOperation::Delete
    } else if is("MERGE") {
        SqlOperation::Merge
    } else if is("CALL") || is("EXEC") || is("EXECUTE") {
        SqlOperation::Call
    } else if is("CREATE") {
        SqlOperation::Create
    } else if is("DROP") {
        SqlOperation::Drop
    } else if is("ALTER") {
        SqlOperation::Alter
    } else if is("TRUNCATE") {
        SqlOperation::Truncate
    } else if is("BEGIN") || is("START") {
        SqlOperation::Begin
    } else if is("COMMIT") {
        SqlOperation::Commit
    } else if is("ROLLBACK") {
        SqlOperation::Rollback
    } else if is("SET") {
        SqlOperation::Set
    } else {
        return None;
    };
    Some(operation)
}

/// Parenthesis nesting at byte offset `at`. Literals are already replaced
/// by `?` in sanitized text, so only quoted identifiers can hide parentheses.
fn depth_at(sql: &str, at: usize) -> i32 {
    let mut depth = 0;
    let mut quote = None;
    for c in sql[..at].chars() {
        match (quote, c) {
            (Some(q), c) if c == q => quote = None,
            (Some(_), _) => {}
            (None, '"' | '`') => quote = Some(c),
            (None, '(') => depth += 1,
            (None, ')') => depth -= 1,
            _ => {}
        }
    }
    depth
}

/// Extract the primary table name for an already parsed operation.
///
/// The first table after the operation's keyword wins, so joins and comma
/// lists report their first table. Keywords nested in parentheses deeper
/// than the statement's verb (`EXTRACT(YEAR FROM ts)`, scalar subqueries)
/// are skipped. A subquery in the table position reports `None`. Quoting
/// characters are stripped and case is preserved.
pub(crate) fn table_for(operation: SqlOperation, sql: &str) -> Option<String> {
    let regex = match operation {
        SqlOperation::Select => &*SELECT_TABLE_REGEX,
        SqlOperation::Insert => &*INSERT_TABLE_REGEX,
        SqlOperation::Update => &*UPDATE_TABLE_REGEX,
        SqlOperation::Delete => &*DELETE_TABLE_REGEX,
        SqlOperation::Merge => &*MERGE_TABLE_REGEX,
        SqlOperation::Create => &*CREATE_TABLE_REGEX,
        SqlOperation::Drop => &*DROP_TABLE_REGEX,
        SqlOperation::Alter => &*ALTER_TABLE_REGEX,
        SqlOperation::Truncate => &*TRUNCATE_TABLE_REGEX,
        _ => return None,
    };

    let verb_depth = depth_at(sql, verb_start(sql));
    let table = regex
        .captures_iter(sql)
        .find(|caps| caps.get(0).is_some_and(|m| depth_at(sql, m.start()) <= verb_depth))?
        .name("table")?
        .as_str();
    if table == "(" {
        return None;
    }
    Some(
        table
            .chars()
            .filter(|c| !matches!(c, '`' | '"' | '[' | ']'))
            .collect(),
    )
}

/// Extract the primary table name from a SQL query.
///
/// Returns `None` if the table cannot be determined.
pub fn extract_table(sql: &str) -> Option<String> {
    table_for(parse_operation(sql)?, sql)
}
