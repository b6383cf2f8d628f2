use dataflow_core::*;
use pretty_assertions::assert_eq;
use rstest::rstest;
use serde_json::{json, Map, Value};

fn record(value: Value) -> Map<String, Value> {
    value.as_object().cloned().unwrap()
}

fn query_service_row() -> TaskRow {
    TaskRow::from_record(record(json!({
        "task_name": "daily_orders",
        "source_type": "redash",
        "dataset": "sales",
        "table_name": "orders",
        "write_mode": "replace",
        "schema": r#"[{"name": "order_id", "type": "INTEGER"}, {"name": "note", "type": "STRING"}]"#,
        "active_flag": "Y",
        "query_id": 42,
        "api_key": "secret",
        "params": "{'region': 'eu'}"
    })))
    .unwrap()
}

// ===== TabularResult Tests =====

#[test]
fn test_empty_result_is_single_placeholder_row() {
    let columns = vec!["id".to_string(), "name".to_string(), "created_at".to_string()];
    let result = TabularResult::empty_with_columns(columns.clone());

    assert_eq!(result.columns(), columns.as_slice());
    assert_eq!(result.row_count(), 1);
    assert!(result.rows()[0].iter().all(|v| v == &json!("")));
    assert!(result.is_placeholder());
}

#[test]
fn test_from_records_or_empty_uses_placeholder() {
    let result = TabularResult::from_records_or_empty(vec!["a".into(), "b".into()], vec![]);

    assert_eq!(result.row_count(), 1);
    assert_eq!(result.columns(), ["a", "b"]);
}

#[test]
fn test_from_records_preserves_first_appearance_order() {
    let result = TabularResult::from_records(vec![
        record(json!({"zeta": 1, "alpha": 2})),
        record(json!({"alpha": 3, "mid": 4})),
    ]);

    assert_eq!(result.columns(), ["zeta", "alpha", "mid"]);
    assert_eq!(result.rows()[1], vec![Value::Null, json!(3), json!(4)]);
}

#[test]
fn test_into_records_round_trips_columns() {
    let result = TabularResult::new(
        vec!["a".into(), "b".into()],
        vec![vec![json!(1), json!("x")]],
    )
    .unwrap();

    let records = result.into_records();
    assert_eq!(records.len(), 1);
    assert_eq!(records[0]["a"], json!(1));
    assert_eq!(records[0]["b"], json!("x"));
}

// ===== TaskRow Tests =====

#[test]
fn test_query_service_row_to_descriptor() {
    let descriptor = query_service_row().to_descriptor().unwrap();

    assert_eq!(descriptor.task_name, "daily_orders");
    assert_eq!(descriptor.dataset_id, "sales");
    assert_eq!(descriptor.table_id, "orders");
    assert_eq!(descriptor.write_mode, WriteMode::Replace);
    assert_eq!(descriptor.schema.len(), 2);
    assert!(descriptor.active);

    match descriptor.source {
        SourceSpec::QueryService { query_id, api_key, parameters } => {
            assert_eq!(query_id, "42");
            assert_eq!(api_key, "secret");
            assert_eq!(parameters["region"], json!("eu"));
        }
        other => panic!("unexpected source: {:?}", other),
    }
}

#[test]
fn test_unknown_source_type_is_configuration_error() {
    let mut row = query_service_row();
    row.source_type = "ftp".to_string();

    let err = row.to_descriptor().unwrap_err();
    assert!(matches!(err, EtlError::Configuration(ref msg) if msg.contains("ftp")));
}

#[test]
fn test_malformed_schema_is_configuration_error() {
    let mut row = query_service_row();
    row.schema = "[{not json".to_string();

    assert!(matches!(row.to_descriptor(), Err(EtlError::Configuration(_))));
}

#[test]
fn test_api_row_parses_headers_and_params() {
    let row = TaskRow::from_record(record(json!({
        "task_name": "rates",
        "source_type": "api",
        "dataset": "fx",
        "table_name": "rates",
        "write_mode": "append",
        "active_flag": "y",
        "api_url": "https://example.com/rates",
        "headers": r#"{"X-Token": "t", "X-Version": 2}"#,
        "params": r#"{"base": "EUR"}"#
    })))
    .unwrap();

    let descriptor = row.to_descriptor().unwrap();
    match descriptor.source {
        SourceSpec::Api { url, headers, query_params } => {
            assert_eq!(url, "https://example.com/rates");
            assert_eq!(headers["X-Token"], "t");
            assert_eq!(headers["X-Version"], "2");
            assert_eq!(query_params["base"], "EUR");
        }
        other => panic!("unexpected source: {:?}", other),
    }
}

#[test]
fn test_missing_file_path_is_configuration_error() {
    let row = TaskRow {
        task_name: "local".into(),
        source_type: "csv".into(),
        dataset: "d".into(),
        table_name: "t".into(),
        active_flag: "y".into(),
        ..Default::default()
    };

    assert!(matches!(row.to_descriptor(), Err(EtlError::Configuration(_))));
}

#[rstest]
#[case("redash", SourceKind::QueryService)]
#[case("Query-Service", SourceKind::QueryService)]
#[case("gsheet", SourceKind::Spreadsheet)]
#[case("csv", SourceKind::File)]
#[case("file", SourceKind::File)]
#[case("API", SourceKind::Api)]
fn test_source_kind_tags(#[case] tag: &str, #[case] expected: SourceKind) {
    assert_eq!(tag.parse::<SourceKind>().unwrap(), expected);
}

#[rstest]
#[case("", WriteMode::Append)]
#[case("append", WriteMode::Append)]
#[case("REPLACE", WriteMode::Replace)]
#[case("upsert", WriteMode::Upsert)]
fn test_write_mode_tags(#[case] tag: &str, #[case] expected: WriteMode) {
    assert_eq!(tag.parse::<WriteMode>().unwrap(), expected);
}

#[test]
fn test_upsert_does_not_truncate() {
    assert!(!WriteMode::Upsert.truncates());
    assert!(!WriteMode::Append.truncates());
    assert!(WriteMode::Replace.truncates());
}

#[rstest]
#[case("y", true)]
#[case("Y", true)]
#[case(" yes ", true)]
#[case("TRUE", true)]
#[case("n", false)]
#[case("", false)]
fn test_active_flag(#[case] flag: &str, #[case] expected: bool) {
    assert_eq!(is_affirmative(flag), expected);
}

// ===== QueryRow Tests =====

#[test]
fn test_query_row_name_falls_back_to_query_name() {
    let row = QueryRow::from_record(record(json!({
        "query_name": "refresh_mv",
        "query_text": "SELECT 1",
        "active_flag": "y"
    })))
    .unwrap();

    let descriptor = row.to_descriptor().unwrap();
    assert_eq!(descriptor.query_name, "refresh_mv");
    assert!(descriptor.active);
}

#[test]
fn test_query_row_without_text_is_rejected() {
    let row = QueryRow {
        task_name: "empty".into(),
        active_flag: "y".into(),
        ..Default::default()
    };

    assert!(matches!(row.to_descriptor(), Err(EtlError::Configuration(_))));
}

// ===== NotificationEvent Tests =====

#[test]
fn test_notification_payload() {
    let event = NotificationEvent::new("Pushed 3 rows");
    assert_eq!(event.webhook_payload(), json!({"text": "Pushed 3 rows"}));
}
