//! Span lifecycle around a single delegated call.

use std::fmt::Display;
use std::future::Future;
use std::sync::Arc;
use std::time::{Duration, Instant};

use tracing::{field, Instrument, Span};

use crate::config::TracingConfig;
use crate::request::{AttributeValue, RequestDescriptor};

const INCOMPLETE_CALL: &str = "call did not complete";

/// Opens one client span per call, runs the call inside it and records the
/// outcome. Results and errors pass through untouched.
///
/// Spans become children of whatever span is current when the call starts,
/// so database spans nest under request spans from web middleware.
#[derive(Debug, Clone, Default)]
pub struct CallInstrumenter {
    config: Arc<TracingConfig>,
}

impl CallInstrumenter {
    pub fn new(config: TracingConfig) -> Self {
        Self::from_shared(Arc::new(config))
    }

    pub fn from_shared(config: Arc<TracingConfig>) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &TracingConfig {
        &self.config
    }

    /// Create the span for `request` with every attribute the configuration
    /// allows already recorded.
    pub fn create_span(&self, request: &RequestDescriptor) -> Span {
        let span_name = request.span_name();

        let span = tracing::info_span!(
            "db.query",
            otel.name = %span_name,
            otel.kind = "client",
            db.system = field::Empty,
            db.name = field::Empty,
            db.user = field::Empty,
            db.connection_string = field::Empty,
            db.statement = field::Empty,
            db.operation = field::Empty,
            db.sql.table = field::Empty,
            db.system.name = field::Empty,
            db.namespace = field::Empty,
            db.query.text = field::Empty,
            db.operation.name = field::Empty,
            db.collection.name = field::Empty,
            db.operation.batch.size = field::Empty,
            db.query.parameters = field::Empty,
            server.address = field::Empty,
            server.port = field::Empty,
            db.duration_ms = field::Empty,
            otel.status_code = field::Empty,
            "error.type" = field::Empty,
            error.message = field::Empty,
            slow_query = field::Empty,
        );

        if span.is_disabled() {
            return span;
        }

        let attributes = request.attributes(&self.config);
        for (key, value) in &attributes.fields {
            match value {
                AttributeValue::Str(s) => span.record(*key, s.as_str()),
                AttributeValue::Int(i) => span.record(*key, *i),
            };
        }
        if let Some(parameters) = attributes.parameters_field() {
            span.record("db.query.parameters", parameters.as_str());
        }

        span
    }

    /// Run a blocking call inside a span built from `request`.
    pub fn wrap<T, E, F>(&self, request: &RequestDescriptor, call: F) -> Result<T, E>
    where
        E: Display,
        F: FnOnce() -> Result<T, E>,
    {
        self.wrap_with(request, call, |e| e.to_string())
    }

    pub(crate) fn wrap_with<T, E, F, D>(
        &self,
        request: &RequestDescriptor,
        call: F,
        describe: D,
    ) -> Result<T, E>
    where
        F: FnOnce() -> Result<T, E>,
        D: FnOnce(&E) -> String,
    {
        let span = self.create_span(request);
        let guard = SpanGuard::new(span.clone(), self.config.slow_query_threshold);

        let result = span.in_scope(call);

        guard.finish(&result, describe);
        result
    }

    /// Await `future` inside a span built from `request`.
    pub async fn wrap_async<T, E, F>(&self, request: &RequestDescriptor, future: F) -> Result<T, E>
    where
        E: Display,
        F: Future<Output = Result<T, E>>,
    {
        self.wrap_async_with(request, future, |e| e.to_string()).await
    }

    pub(crate) async fn wrap_async_with<T, E, F, D>(
        &self,
        request: &RequestDescriptor,
        future: F,
        describe: D,
    ) -> Result<T, E>
    where
        F: Future<Output = Result<T, E>>,
        D: FnOnce(&E) -> String,
    {
        let span = self.create_span(request);
        let guard = SpanGuard::new(span.clone(), self.config.slow_query_threshold);

        let result = future.instrument(span).await;

        guard.finish(&result, describe);
        result
    }
}

/// Finalizes a span exactly once. Dropping an unfinished guard, on unwind or
/// when a future is cancelled, marks the span as failed.
struct SpanGuard {
    span: Span,
    start: Instant,
    slow_query_threshold: Duration,
    finished: bool,
}

impl SpanGuard {
    fn new(span: Span, slow_query_threshold: Duration) -> Self {
        Self {
            span,
            start: Instant::now(),
            slow_query_threshold,
            finished: false,
        }
    }

    fn record_timing(&self) {
        let elapsed = self.start.elapsed();
        let duration_ms = elapsed.as_millis() as i64;
        self.span.record("db.duration_ms", duration_ms);

        if elapsed > self.slow_query_threshold {
            self.span.record("slow_query", true);
            let threshold_ms = self.slow_query_threshold.as_millis() as i64;
            tracing::warn!(
                parent: &self.span,
                duration_ms = duration_ms,
                threshold_ms = threshold_ms,
                "Slow query detected"
            );
        }
    }

    fn finish<T, E, D>(mut self, result: &Result<T, E>, describe: D)
    where
        D: FnOnce(&E) -> String,
    {
        self.finished = true;
        self.record_timing();

        match result {
            Ok(_) => {
                self.span.record("otel.status_code", "OK");
            }
            Err(e) => {
                let message = describe(e);
                self.span.record("otel.status_code", "ERROR");
                self.span.record("error.type", std::any::type_name::<E>());
                self.span.record("error.message", message.as_str());
                tracing::error!(
                    parent: &self.span,
                    error = %message,
                    "Database call failed"
                );
            }
        }
    }
}

impl Drop for SpanGuard {
    fn drop(&mut self) {
        if self.finished {
            return;
        }
        self.record_timing();
        self.span.record("otel.status_code", "ERROR");
        self.span.record("error.message", INCOMPLETE_CALL);
    }
}
