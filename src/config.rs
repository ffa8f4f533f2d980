//! Configuration for tracing behavior.

use std::time::Duration;

use crate::error::{Error, Result};

/// Which naming convention span attribute keys follow.
///
/// Values are the same under every scheme; only the keys differ.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum AttributeScheme {
    /// `db.system`, `db.name`, `db.statement`, `db.operation`, `db.sql.table`,
    /// plus `db.user` and `db.connection_string`.
    #[default]
    Legacy,
    /// `db.system.name`, `db.namespace`, `db.query.text`, `db.operation.name`,
    /// `db.collection.name`, `db.operation.batch.size`.
    Stable,
    /// Both key sets, for migrating dashboards.
    Both,
}

impl AttributeScheme {
    pub fn emits_legacy(&self) -> bool {
        matches!(self, AttributeScheme::Legacy | AttributeScheme::Both)
    }

    pub fn emits_stable(&self) -> bool {
        matches!(self, AttributeScheme::Stable | AttributeScheme::Both)
    }

    /// Read an `OTEL_SEMCONV_STABILITY_OPT_IN` style list. `database/dup`
    /// wins over `database`; unrelated tokens are ignored.
    pub fn from_opt_in(value: &str) -> Self {
        let tokens: Vec<&str> = value.split(',').map(str::trim).collect();
        if tokens.contains(&"database/dup") {
            AttributeScheme::Both
        } else if tokens.contains(&"database") {
            AttributeScheme::Stable
        } else {
            AttributeScheme::Legacy
        }
    }
}

pub const SEMCONV_OPT_IN_ENV: &str = "OTEL_SEMCONV_STABILITY_OPT_IN";
pub const SANITIZER_ENABLED_ENV: &str = "OTEL_INSTRUMENTATION_COMMON_DB_STATEMENT_SANITIZER_ENABLED";
pub const CAPTURE_PARAMETERS_ENV: &str = "OTEL_INSTRUMENTATION_DB_CAPTURE_QUERY_PARAMETERS";
pub const SLOW_QUERY_THRESHOLD_ENV: &str = "OTEL_INSTRUMENTATION_DB_SLOW_QUERY_THRESHOLD_MS";

/// Configuration options for database tracing.
///
/// # Example
///
/// ```rust
/// use db_driver_tracing::{AttributeScheme, TracingConfig};
/// use std::time::Duration;
///
/// let config = TracingConfig::default()
///     .with_parameter_logging(true)
///     .with_attribute_scheme(AttributeScheme::Stable)
///     .with_slow_query_threshold(Duration::from_millis(100));
/// ```
#[derive(Debug, Clone)]
pub struct TracingConfig {
    /// Whether to include the SQL statement in spans.
    /// Default: `true` (statements are sanitized before they are recorded)
    pub log_statements: bool,

    /// Whether recorded statements have their literals replaced by `?`.
    /// Default: `true`
    pub sanitize_statements: bool,

    /// Whether to include query parameters in spans.
    /// Default: `false` (parameters may contain sensitive data)
    pub log_parameters: bool,

    /// Which attribute keys are populated.
    /// Default: [`AttributeScheme::Legacy`]
    pub attribute_scheme: AttributeScheme,

    /// Threshold for logging slow queries at WARN level.
    /// Queries exceeding this duration will be logged with additional context.
    /// Default: 500ms
    pub slow_query_threshold: Duration,
}

impl Default for TracingConfig {
    fn default() -> Self {
        Self {
            log_statements: true,
            sanitize_statements: true,
            log_parameters: false,
            attribute_scheme: AttributeScheme::Legacy,
            slow_query_threshold: Duration::from_millis(500),
        }
    }
}

impl TracingConfig {
    /// Create a new configuration with default values.
    pub fn new() -> Self {
        Self::default()
    }

    /// Enable or disable SQL statement logging in spans.
    pub fn with_statement_logging(mut self, enabled: bool) -> Self {
        self.log_statements = enabled;
        self
    }

    /// Enable or disable literal sanitization of logged statements.
    ///
    /// **Security Warning**: Disabling this records statements exactly as
    /// written, including any literal values embedded in them.
    pub fn with_statement_sanitization(mut self, enabled: bool) -> Self {
        self.sanitize_statements = enabled;
        self
    }

    /// Enable or disable parameter logging in spans.
    ///
    /// **Security Warning**: Query parameters often contain user input and
    /// potentially sensitive data. Only enable in development or controlled environments.
    pub fn with_parameter_logging(mut self, enabled: bool) -> Self {
        self.log_parameters = enabled;
        self
    }

    pub fn with_attribute_scheme(mut self, scheme: AttributeScheme) -> Self {
        self.attribute_scheme = scheme;
        self
    }

    /// Set the threshold for slow query warnings.
    ///
    /// Queries taking longer than this duration will be logged at WARN level
    /// with the `slow_query` field set to `true`.
    pub fn with_slow_query_threshold(mut self, threshold: Duration) -> Self {
        self.slow_query_threshold = threshold;
        self
    }

    /// Create a development-friendly configuration with full logging enabled.
    ///
    /// **Warning**: Do not use in production as it logs all parameters.
    pub fn development() -> Self {
        Self {
            log_statements: true,
            sanitize_statements: true,
            log_parameters: true,
            attribute_scheme: AttributeScheme::Legacy,
            slow_query_threshold: Duration::from_millis(100),
        }
    }

    /// Create a production-safe configuration with minimal overhead.
    pub fn production() -> Self {
        Self {
            log_statements: true,
            sanitize_statements: true,
            log_parameters: false,
            attribute_scheme: AttributeScheme::Legacy,
            slow_query_threshold: Duration::from_secs(1),
        }
    }

    /// Build a configuration from the process environment, starting from the
    /// defaults. See [`TracingConfig::from_lookup`].
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Build a configuration from `lookup`, which maps a variable name to its
    /// value:
    ///
    /// | variable | effect |
    /// |----------|--------|
    /// | `OTEL_SEMCONV_STABILITY_OPT_IN` | `database` or `database/dup` selects the scheme |
    /// | `OTEL_INSTRUMENTATION_COMMON_DB_STATEMENT_SANITIZER_ENABLED` | `true` / `false` |
    /// | `OTEL_INSTRUMENTATION_DB_CAPTURE_QUERY_PARAMETERS` | `true` / `false` |
    /// | `OTEL_INSTRUMENTATION_DB_SLOW_QUERY_THRESHOLD_MS` | milliseconds |
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self> {
        let mut config = Self::default();

        if let Some(value) = lookup(SEMCONV_OPT_IN_ENV) {
            config.attribute_scheme = AttributeScheme::from_opt_in(&value);
        }
        if let Some(value) = lookup(SANITIZER_ENABLED_ENV) {
            config.sanitize_statements = parse_bool(SANITIZER_ENABLED_ENV, &value)?;
        }
        if let Some(value) = lookup(CAPTURE_PARAMETERS_ENV) {
            config.log_parameters = parse_bool(CAPTURE_PARAMETERS_ENV, &value)?;
        }
        if let Some(value) = lookup(SLOW_QUERY_THRESHOLD_ENV) {
            let millis = value
                .trim()
                .parse::<u64>()
                .map_err(|_| Error::InvalidDuration {
                    key: SLOW_QUERY_THRESHOLD_ENV,
                    value: value.clone(),
                })?;
            config.slow_query_threshold = Duration::from_millis(millis);
        }

        if config.log_parameters && !config.sanitize_statements {
            tracing::warn!("query parameters and unsanitized statements are both recorded");
        }
        Ok(config)
    }
}

fn parse_bool(key: &'static str, value: &str) -> Result<bool> {
    match value.trim().to_ascii_lowercase().as_str() {
        "true" | "1" | "yes" | "on" => Ok(true),
        "false" | "0" | "no" | "off" => Ok(false),
        _ => Err(Error::InvalidBool {
            key,
            value: value.to_owned(),
        }),
    }
}
