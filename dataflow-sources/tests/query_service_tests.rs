use dataflow_core::{EtlError, SourceAdapter, SourceSpec};
use dataflow_sources::{ClientConfig, HttpClient, QueryServiceAdapter, QueryServiceConfig, ResultFetcher};
use pretty_assertions::assert_eq;
use serde_json::{json, Map, Value};
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use wiremock::matchers::{body_json, header, method, path, path_regex};
use wiremock::{Mock, MockServer, ResponseTemplate};

// ===== Setup Helpers =====

fn fetcher(server: &MockServer) -> ResultFetcher {
    fetcher_with(server, |config| config)
}

fn fetcher_with(
    server: &MockServer,
    tweak: impl FnOnce(QueryServiceConfig) -> QueryServiceConfig,
) -> ResultFetcher {
    let config = QueryServiceConfig::new(server.uri())
        .with_poll_interval(Duration::from_millis(10))
        .with_submit_retry(5, Duration::from_millis(10));

    let http = HttpClient::new(ClientConfig::default()).unwrap();
    ResultFetcher::new(http, tweak(config)).unwrap()
}

fn job(body: Value) -> ResponseTemplate {
    ResponseTemplate::new(200).set_body_json(json!({ "job": body }))
}

async fn mount_submit(server: &MockServer, query_id: u64, response: ResponseTemplate) {
    Mock::given(method("POST"))
        .and(path(format!("/api/queries/{}/results", query_id)))
        .respond_with(response)
        .mount(server)
        .await;
}

fn params() -> Map<String, Value> {
    let mut params = Map::new();
    params.insert("region".to_string(), json!("eu"));
    params
}

// ===== Protocol =====

#[tokio::test]
async fn test_pending_then_running_then_success_returns_rows() {
    let server = MockServer::start().await;

    Mock::given(method("POST"))
        .and(path("/api/queries/42/results"))
        .and(header("Authorization", "Key secret"))
        .and(body_json(json!({
            "apply_auto_limit": false,
            "id": 42,
            "max_age": 0,
            "parameters": {"region": "eu"}
        })))
        .respond_with(job(json!({"id": "job-1", "status": 1})))
        .expect(1)
        .mount(&server)
        .await;

    Mock::given(method("GET"))
        .and(path("/api/jobs/job-1"))
        .respond_with(job(json!({"id": "job-1", "status": 1})))
        .up_to_n_times(1)
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/api/jobs/job-1"))
        .respond_with(job(json!({"id": "job-1", "status": 2})))
        .up_to_n_times(1)
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/api/jobs/job-1"))
        .respond_with(job(json!({"id": "job-1", "status": 3, "query_result_id": 7})))
        .expect(1)
        .mount(&server)
        .await;

    Mock::given(method("GET"))
        .and(path("/api/query_results/7"))
        .and(header("Authorization", "Key secret"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "query_result": {
                "data": {
                    "columns": [{"name": "day"}, {"name": "orders"}],
                    "rows": [
                        {"day": "2025-01-01", "orders": 10},
                        {"day": "2025-01-02", "orders": 12}
                    ]
                }
            }
        })))
        .expect(1)
        .mount(&server)
        .await;

    let result = fetcher(&server)
        .execute("42", "secret", &params())
        .await
        .unwrap();

    assert_eq!(result.columns(), ["day", "orders"]);
    assert_eq!(
        result.rows(),
        [
            vec![json!("2025-01-01"), json!(10)],
            vec![json!("2025-01-02"), json!(12)]
        ]
    );
}

#[tokio::test]
async fn test_empty_result_yields_placeholder_row() {
    let server = MockServer::start().await;
    mount_submit(&server, 5, job(json!({"id": "j"}))).await;

    Mock::given(method("GET"))
        .and(path("/api/jobs/j"))
        .respond_with(job(json!({"id": "j", "status": 3, "query_result_id": 1})))
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/api/query_results/1"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "query_result": {"data": {"columns": [{"name": "a"}, {"name": "b"}], "rows": []}}
        })))
        .mount(&server)
        .await;

    let result = fetcher(&server).execute("5", "k", &Map::new()).await.unwrap();

    assert_eq!(result.columns(), ["a", "b"]);
    assert_eq!(result.rows(), [vec![json!(""), json!("")]]);
}

#[tokio::test]
async fn test_submission_error_is_not_polled() {
    let server = MockServer::start().await;
    mount_submit(&server, 9, job(json!({"error": "Query 9 has no data source"}))).await;

    Mock::given(method("GET"))
        .and(path_regex(r"^/api/jobs/"))
        .respond_with(job(json!({"status": 3})))
        .expect(0)
        .mount(&server)
        .await;

    let err = fetcher(&server).execute("9", "k", &Map::new()).await.unwrap_err();

    match err {
        EtlError::QuerySubmission(message) => assert_eq!(message, "Query 9 has no data source"),
        other => panic!("unexpected error: {other:?}"),
    }
    assert_eq!(server.received_requests().await.unwrap().len(), 1);
}

#[tokio::test]
async fn test_job_without_id_or_error_is_a_submission_error() {
    let server = MockServer::start().await;
    mount_submit(&server, 3, job(json!({"status": 1}))).await;

    let err = fetcher(&server).execute("3", "k", &Map::new()).await.unwrap_err();
    assert!(matches!(err, EtlError::QuerySubmission(_)));
}

#[tokio::test]
async fn test_failed_job_stops_polling() {
    for (code, text) in [(4, "syntax error at line 1"), (5, "Query cancelled by user")] {
        let server = MockServer::start().await;
        mount_submit(&server, 1, job(json!({"id": "j"}))).await;

        Mock::given(method("GET"))
            .and(path("/api/jobs/j"))
            .respond_with(job(json!({"id": "j", "status": code, "error": text})))
            .expect(1)
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path("/api/query_results/1"))
            .respond_with(ResponseTemplate::new(200))
            .expect(0)
            .mount(&server)
            .await;

        let err = fetcher(&server).execute("1", "k", &Map::new()).await.unwrap_err();

        match err {
            EtlError::QueryExecution(message) => assert_eq!(message, text),
            other => panic!("unexpected error for status {code}: {other:?}"),
        }
    }
}

// ===== Submission Retry =====

#[tokio::test]
async fn test_five_failed_submissions_are_source_unavailable() {
    let server = MockServer::start().await;

    Mock::given(method("POST"))
        .and(path("/api/queries/42/results"))
        .respond_with(ResponseTemplate::new(503).set_body_string("maintenance"))
        .expect(5)
        .mount(&server)
        .await;

    let err = fetcher(&server).execute("42", "k", &Map::new()).await.unwrap_err();

    assert!(matches!(err, EtlError::SourceUnavailable(_)));
    assert!(err.to_string().contains("maintenance"));
}

#[tokio::test]
async fn test_success_after_one_transient_failure() {
    let server = MockServer::start().await;

    Mock::given(method("POST"))
        .and(path("/api/queries/42/results"))
        .respond_with(ResponseTemplate::new(502))
        .up_to_n_times(1)
        .expect(1)
        .mount(&server)
        .await;
    Mock::given(method("POST"))
        .and(path("/api/queries/42/results"))
        .respond_with(job(json!({"id": "j"})))
        .expect(1)
        .mount(&server)
        .await;

    Mock::given(method("GET"))
        .and(path("/api/jobs/j"))
        .respond_with(job(json!({"id": "j", "status": 3, "query_result_id": 2})))
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/api/query_results/2"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "query_result": {"data": {"columns": [{"name": "n"}], "rows": [{"n": 1}]}}
        })))
        .mount(&server)
        .await;

    let result = fetcher(&server).execute("42", "k", &Map::new()).await.unwrap();
    assert_eq!(result.rows(), [vec![json!(1)]]);
}

// ===== Polling Bounds =====

#[tokio::test]
async fn test_poll_timeout() {
    let server = MockServer::start().await;
    mount_submit(&server, 1, job(json!({"id": "j"}))).await;

    Mock::given(method("GET"))
        .and(path("/api/jobs/j"))
        .respond_with(job(json!({"id": "j", "status": 2})))
        .mount(&server)
        .await;

    let err = fetcher_with(&server, |c| c.with_max_wait(Duration::from_millis(50)))
        .execute("1", "k", &Map::new())
        .await
        .unwrap_err();

    assert!(matches!(err, EtlError::PollTimeout(bound) if bound == Duration::from_millis(50)));
    assert_eq!(err.to_string(), "Polling timed out after 50ms");
}

#[tokio::test]
async fn test_cancellation_stops_polling() {
    let server = MockServer::start().await;
    mount_submit(&server, 1, job(json!({"id": "j"}))).await;

    Mock::given(method("GET"))
        .and(path("/api/jobs/j"))
        .respond_with(job(json!({"id": "j", "status": 2})))
        .mount(&server)
        .await;

    let cancel = CancellationToken::new();
    let trigger = cancel.clone();
    tokio::spawn(async move {
        tokio::time::sleep(Duration::from_millis(50)).await;
        trigger.cancel();
    });

    let err = fetcher(&server)
        .execute_with_cancel("1", "k", &Map::new(), &cancel)
        .await
        .unwrap_err();

    assert!(matches!(err, EtlError::Cancelled(_)));
}

// ===== Adapter =====

#[tokio::test]
async fn test_adapter_fetches_query_service_spec() {
    let server = MockServer::start().await;
    mount_submit(&server, 11, job(json!({"id": 99}))).await;

    Mock::given(method("GET"))
        .and(path("/api/jobs/99"))
        .respond_with(job(json!({"id": 99, "status": 3, "query_result_id": 4})))
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/api/query_results/4"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "query_result": {"data": {"columns": [{"name": "x"}], "rows": [{"x": "a"}, {"x": "b"}]}}
        })))
        .mount(&server)
        .await;

    let adapter = QueryServiceAdapter::new(fetcher(&server));
    let result = adapter
        .fetch(&SourceSpec::QueryService {
            query_id: "11".to_string(),
            api_key: "k".to_string(),
            parameters: Map::new(),
        })
        .await
        .unwrap();

    assert_eq!(result.row_count(), 2);

    let err = adapter
        .fetch(&SourceSpec::File {
            file_path: "x.csv".to_string(),
        })
        .await
        .unwrap_err();
    assert!(matches!(err, EtlError::Configuration(_)));
}
