mod common;

use std::collections::BTreeMap;

use common::SpanCapture;
use db_driver_tracing::{AttributeScheme, DbIdentity, TracingConfig, TracingExt};
use sea_orm::{
    ConnectionTrait, DbBackend, DbErr, MockDatabase, MockExecResult, Statement, TransactionTrait,
    Value,
};

fn exec_result() -> MockExecResult {
    MockExecResult {
        last_insert_id: 0,
        rows_affected: 1,
    }
}

#[tokio::test]
async fn test_execute_records_values_as_parameters() {
    let (capture, _guard) = SpanCapture::install();
    let db = MockDatabase::new(DbBackend::Postgres)
        .append_exec_results([exec_result()])
        .into_connection()
        .with_tracing_config(TracingConfig::development());

    let result = db
        .execute(Statement::from_sql_and_values(
            DbBackend::Postgres,
            "UPDATE users SET name = $1 WHERE id = $2",
            [Value::from("bob"), Value::from(5i32)],
        ))
        .await
        .unwrap();
    assert_eq!(result.rows_affected(), 1);

    let span = capture.single_query_span();
    assert_eq!(span.field("otel.name"), Some("UPDATE users"));
    assert_eq!(span.field("db.system"), Some("postgresql"));
    assert_eq!(
        span.field("db.statement"),
        Some("UPDATE users SET name = $1 WHERE id = $2")
    );
    assert_eq!(span.field("db.query.parameters"), Some("$1='bob', $2=5"));
    assert_eq!(span.field("otel.status_code"), Some("OK"));
}

#[tokio::test]
async fn test_query_error_propagates() {
    let (capture, _guard) = SpanCapture::install();
    let db = MockDatabase::new(DbBackend::Postgres)
        .append_exec_errors([DbErr::Custom("deadlock detected".to_string())])
        .into_connection()
        .with_tracing();

    let err = db
        .execute(Statement::from_string(
            DbBackend::Postgres,
            "DELETE FROM sessions",
        ))
        .await
        .unwrap_err();
    assert!(matches!(&err, DbErr::Custom(msg) if msg == "deadlock detected"));

    let span = capture.single_query_span();
    assert_eq!(span.field("otel.status_code"), Some("ERROR"));
    assert!(span.field("error.message").unwrap().contains("deadlock detected"));
    assert!(span.field("error.type").unwrap().ends_with("DbErr"));
}

#[tokio::test]
async fn test_query_all_with_identity() {
    let (capture, _guard) = SpanCapture::install();
    let row = BTreeMap::from([("id", Value::from(1i32))]);
    let db = MockDatabase::new(DbBackend::MySql)
        .append_query_results([[row]])
        .into_connection()
        .with_tracing_config(
            TracingConfig::default().with_attribute_scheme(AttributeScheme::Both),
        )
        .with_identity(
            DbIdentity::new("mysql")
                .with_name("shop")
                .with_host("db.internal")
                .with_port(3306),
        );

    let rows = db
        .query_all(Statement::from_string(
            DbBackend::MySql,
            "SELECT id FROM users WHERE status = 'active'",
        ))
        .await
        .unwrap();
    assert_eq!(rows.len(), 1);

    let span = capture.single_query_span();
    assert_eq!(span.field("otel.name"), Some("SELECT shop.users"));
    assert_eq!(
        span.field("db.query.text"),
        Some("SELECT id FROM users WHERE status = ?")
    );
    assert_eq!(span.field("db.statement"), span.field("db.query.text"));
    assert_eq!(span.field("db.namespace"), Some("shop"));
    assert_eq!(span.field("server.port"), Some("3306"));
}

#[tokio::test]
async fn test_execute_unprepared() {
    let (capture, _guard) = SpanCapture::install();
    let db = MockDatabase::new(DbBackend::Sqlite)
        .append_exec_results([exec_result()])
        .into_connection()
        .with_tracing();

    db.execute_unprepared("CREATE TABLE notes (id INTEGER PRIMARY KEY)")
        .await
        .unwrap();

    let span = capture.single_query_span();
    assert_eq!(span.field("otel.name"), Some("CREATE notes"));
    assert_eq!(span.field("db.system"), Some("sqlite"));
}

#[tokio::test]
async fn test_failed_transaction_is_traced() {
    let (capture, _guard) = SpanCapture::install();
    let db = MockDatabase::new(DbBackend::Postgres)
        .into_connection()
        .with_tracing();

    let result = db
        .transaction::<_, (), DbErr>(|_txn| {
            Box::pin(async move { Err(DbErr::Custom("insufficient funds".to_string())) })
        })
        .await;
    assert!(result.is_err());

    let span = capture.single_query_span();
    assert_eq!(span.field("otel.name"), Some("TRANSACTION"));
    assert_eq!(span.field("db.operation"), Some("TRANSACTION"));
    assert_eq!(span.field("otel.status_code"), Some("ERROR"));
    assert!(span
        .field("error.message")
        .unwrap()
        .contains("insufficient funds"));
}

#[tokio::test]
async fn test_wrapper_is_transparent() {
    let db = MockDatabase::new(DbBackend::Postgres)
        .into_connection()
        .with_tracing();

    assert_eq!(db.get_database_backend(), DbBackend::Postgres);
    assert!(db.is_mock_connection());
    assert!(db.support_returning());
    assert_eq!(db.identity().system(), "postgresql");
    assert!(!db.config().log_parameters);
}
