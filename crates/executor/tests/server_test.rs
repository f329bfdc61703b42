use am_executor::{
    auth,
    config::{BasicAuthConfig, BearerAuthConfig, Config, ConfigHolder},
    metrics::{Metrics, Stage},
    runner::ProcessRunner,
    server::Server,
};
use axum::http::{header, HeaderValue, StatusCode};
use axum_test::TestServer;
use base64::{engine::general_purpose::STANDARD, Engine};
use serde_json::json;
use std::sync::Arc;

struct Harness {
    client: TestServer,
    metrics: Metrics,
    config: Arc<ConfigHolder>,
}

fn harness(script: &str, config: Config) -> Harness {
    let metrics = Metrics::new().expect("Failed to create metrics");
    let runner = Arc::new(ProcessRunner::new(
        "sh",
        vec!["-c".to_string(), script.to_string()],
        metrics.clone(),
    ));
    let config = Arc::new(ConfigHolder::new("config.yaml", config));
    let server = Server::new(config.clone(), runner, metrics.clone());
    let client = TestServer::new(server.build_router()).unwrap();
    Harness {
        client,
        metrics,
        config,
    }
}

fn notification() -> serde_json::Value {
    json!({
        "version": "4",
        "groupKey": "{}:{alertname=\"HighLatency\"}",
        "status": "firing",
        "receiver": "team-x",
        "groupLabels": {"alertname": "HighLatency"},
        "commonLabels": {"alertname": "HighLatency", "severity": "critical"},
        "commonAnnotations": {"summary": "latency above 1s"},
        "externalURL": "http://am",
        "alerts": [{
            "status": "firing",
            "labels": {"alertname": "HighLatency", "job": "web"},
            "annotations": {"summary": "latency above 1s"},
            "startsAt": "2024-03-01T12:00:00Z",
            "endsAt": "0001-01-01T00:00:00Z",
            "generatorURL": "http://prometheus/graph",
            "fingerprint": "c6d6f3a1f0e2b1a4"
        }]
    })
}

fn basic_auth_config() -> Config {
    Config {
        basic_auth: BasicAuthConfig {
            enabled: true,
            username: "admin".to_string(),
            password: "s3cret".to_string(),
        },
        ..Default::default()
    }
}

fn basic_credentials(user: &str, password: &str) -> HeaderValue {
    HeaderValue::from_str(&format!("Basic {}", STANDARD.encode(format!("{user}:{password}")))).unwrap()
}

#[tokio::test]
async fn test_webhook_runs_command_with_alert_environment() {
    let h = harness(
        r#"test "$AMX_RECEIVER" = team-x \
            && test "$AMX_STATUS" = firing \
            && test "$AMX_EXTERNAL_URL" = http://am \
            && test "$AMX_ALERT_LEN" = 1 \
            && test "$AMX_LABEL_severity" = critical \
            && test "$AMX_GLABEL_alertname" = HighLatency \
            && test "$AMX_ANNOTATION_summary" = "latency above 1s" \
            && test "$AMX_ALERT_1_STATUS" = firing \
            && test "$AMX_ALERT_1_START" = 1709294400 \
            && test "$AMX_ALERT_1_END" = 0 \
            && test "$AMX_ALERT_1_URL" = http://prometheus/graph \
            && test "$AMX_ALERT_1_LABEL_job" = web \
            && test "$AMX_ALERT_1_ANNOTATION_summary" = "latency above 1s""#,
        Config::default(),
    );

    let response = h.client.post("/").json(&notification()).await;
    if response.status_code() != StatusCode::OK {
        eprintln!("Response body: {}", response.text());
    }
    assert_eq!(response.status_code(), StatusCode::OK);
    assert!(response.text().is_empty());
    assert_eq!(h.metrics.process_runs_observed(), 1);
    assert_eq!(h.metrics.processes_current(), 0);
    assert_eq!(h.metrics.errors(Stage::Start), 0);
}

#[tokio::test]
async fn test_failing_command_returns_500_and_counts_start_error() {
    let h = harness("exit 1", Config::default());

    let response = h.client.post("/").json(&notification()).await;
    assert_eq!(response.status_code(), StatusCode::INTERNAL_SERVER_ERROR);
    assert!(response.text().contains("sh exited with"));
    assert_eq!(h.metrics.errors(Stage::Start), 1);
    assert_eq!(h.metrics.processes_current(), 0);
}

#[tokio::test]
async fn test_undecodable_body_is_not_executed() {
    let h = harness("exit 0", Config::default());

    let response = h.client.post("/").text("{\"alerts\": [").await;
    assert_eq!(response.status_code(), StatusCode::INTERNAL_SERVER_ERROR);
    assert!(!response.text().is_empty());
    assert_eq!(h.metrics.errors(Stage::Unmarshal), 1);
    assert_eq!(h.metrics.process_runs_observed(), 0);
}

#[tokio::test]
async fn test_sparse_payload_runs_with_defaults() {
    let h = harness(
        r#"test "$AMX_ALERT_LEN" = 0 && test -z "$AMX_RECEIVER" && test "$AMX_STATUS" = resolved"#,
        Config::default(),
    );

    let response = h.client.post("/").json(&json!({"status": "resolved"})).await;
    assert_eq!(response.status_code(), StatusCode::OK);
}

#[tokio::test]
async fn test_metrics_and_health_endpoints() {
    let h = harness("exit 1", Config::default());
    h.client.post("/").json(&notification()).await;

    let response = h.client.get("/metrics").await;
    assert_eq!(response.status_code(), StatusCode::OK);
    let content_type = response.header(header::CONTENT_TYPE);
    assert!(content_type.to_str().unwrap().starts_with("text/plain"));
    let body = response.text();
    assert!(body.contains("am_executor_process_duration_seconds_count 1"));
    assert!(body.contains("am_executor_processes_current 0"));
    assert!(body.contains("am_executor_errors_total{stage=\"start\"} 1"));

    let response = h.client.get("/_health").await;
    assert_eq!(response.status_code(), StatusCode::OK);
    assert!(response.text().contains("normal specifications"));

    let response = h.client.get("/").await;
    assert_eq!(response.status_code(), StatusCode::METHOD_NOT_ALLOWED);
}

#[tokio::test]
async fn test_basic_auth_gates_every_route() {
    let h = harness("exit 0", basic_auth_config());

    let response = h.client.get("/metrics").await;
    assert_eq!(response.status_code(), StatusCode::UNAUTHORIZED);
    assert!(response
        .header(header::WWW_AUTHENTICATE)
        .to_str()
        .unwrap()
        .starts_with("Basic"));

    let response = h.client.post("/").json(&notification()).await;
    assert_eq!(response.status_code(), StatusCode::UNAUTHORIZED);
    assert_eq!(h.metrics.process_runs_observed(), 0);

    let response = h
        .client
        .post("/")
        .add_header(header::AUTHORIZATION, basic_credentials("admin", "wrong"))
        .json(&notification())
        .await;
    assert_eq!(response.status_code(), StatusCode::UNAUTHORIZED);

    let response = h
        .client
        .post("/")
        .add_header(header::AUTHORIZATION, basic_credentials("admin", "s3cret"))
        .json(&notification())
        .await;
    assert_eq!(response.status_code(), StatusCode::OK);
    assert_eq!(h.metrics.process_runs_observed(), 1);
}

#[tokio::test]
async fn test_bearer_auth_accepts_created_token() {
    let config = Config {
        bearer_auth: BearerAuthConfig {
            enabled: true,
            signing_key: "my_secret_key".to_string(),
        },
        ..Default::default()
    };
    let token = auth::create_token(&config).unwrap();
    let h = harness("exit 0", config);

    let response = h
        .client
        .get("/_health")
        .add_header(header::AUTHORIZATION, HeaderValue::from_static("Bearer not-a-jwt"))
        .await;
    assert_eq!(response.status_code(), StatusCode::UNAUTHORIZED);

    let response = h
        .client
        .get("/_health")
        .add_header(
            header::AUTHORIZATION,
            HeaderValue::from_str(&format!("Bearer {token}")).unwrap(),
        )
        .await;
    assert_eq!(response.status_code(), StatusCode::OK);
}

#[tokio::test]
async fn test_replaced_configuration_applies_to_next_request() {
    let h = harness("exit 0", Config::default());
    assert_eq!(h.client.get("/_health").await.status_code(), StatusCode::OK);

    h.config.replace(basic_auth_config()).await;
    assert_eq!(
        h.client.get("/_health").await.status_code(),
        StatusCode::UNAUTHORIZED
    );

    h.config.replace(Config::default()).await;
    assert_eq!(h.client.get("/_health").await.status_code(), StatusCode::OK);
}
