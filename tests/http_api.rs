use argo_insight::clock::FixedClock;
use argo_insight::config::AppConfig;
use argo_insight::db::SqliteProfileRepository;
use argo_insight::llm::ScriptedGenerator;
use argo_insight::server::{handle_request, serve, HttpRequest, HttpResponse};
use argo_insight::App;
use serde_json::{json, Value};
use std::sync::Arc;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::{TcpListener, TcpStream};

fn app(generator: ScriptedGenerator, config: AppConfig) -> App {
    let clock = Arc::new(FixedClock::from_millis(1_700_000_000_000));
    let store = SqliteProfileRepository::in_memory(clock.clone()).unwrap();
    App::new(config, Arc::new(store), Arc::new(generator), clock)
}

fn request(method: &str, path: &str, body: Option<&Value>) -> HttpRequest {
    let body = body.map(Value::to_string).unwrap_or_default();
    let raw = format!(
        "{} {} HTTP/1.1\r\nHost: localhost\r\nContent-Type: application/json\r\nContent-Length: {}\r\n\r\n{}",
        method,
        path,
        body.len(),
        body
    );
    HttpRequest::parse(raw.as_bytes()).unwrap()
}

async fn call(app: &App, method: &str, path: &str, body: Option<Value>) -> HttpResponse {
    handle_request(app, &request(method, path, body.as_ref())).await
}

fn sample_batch() -> Value {
    json!([
        {
            "lat": 12.5,
            "lon": 80.25,
            "time": 1_609_459_200_000_000_000u64,
            "temperature": [29.1, 24.0, 12.3],
            "pressure": [5.0, 100.0, 1000.0],
            "salinity": [34.2, 34.9, 35.0]
        },
        {
            "lat": -8.0,
            "lon": 60.0,
            "temperature": [27.0],
            "pressure": [10.0]
        }
    ])
}

#[tokio::test]
async fn test_ingest_then_list_under_both_prefixes() {
    let app = app(ScriptedGenerator::new(), AppConfig::default());

    let ingest = call(&app, "POST", "/api/data/profiles", Some(sample_batch())).await;
    assert_eq!(ingest.status, 200);
    let report = ingest.json_value();
    assert_eq!(report["insertedCount"], 2);
    assert_eq!(report["inserted"][0]["time"], 1_609_459_200_000i64);
    assert_eq!(report["inserted"][1]["time"], 1_700_000_000_000i64);
    assert!(report.get("failures").is_none());

    for path in ["/api/data/profiles", "/data/profiles", "/data/profiles/"] {
        let list = call(&app, "GET", path, None).await;
        assert_eq!(list.status, 200, "{}", path);
        let profiles = list.json_value();
        assert_eq!(profiles.as_array().map(Vec::len), Some(2));
        assert!(profiles[0]["_id"].is_string());
        assert_eq!(profiles[0]["salinity"], json!([34.2, 34.9, 35.0]));
    }
}

#[tokio::test]
async fn test_ingest_rejects_non_array() {
    let app = app(ScriptedGenerator::new(), AppConfig::default());
    let response = call(&app, "POST", "/api/data/profiles", Some(json!({"lat": 1}))).await;
    assert_eq!(response.status, 400);
    assert_eq!(response.json_value()["error"], "Expected an array of profiles");
}

#[tokio::test]
async fn test_ingest_rejects_malformed_body() {
    let app = app(ScriptedGenerator::new(), AppConfig::default());
    let raw = b"POST /api/data/profiles HTTP/1.1\r\nContent-Length: 5\r\n\r\n[{,}]";
    let response = handle_request(&app, &HttpRequest::parse(raw).unwrap()).await;
    assert_eq!(response.status, 400);
    assert!(response.json_value()["error"]
        .as_str()
        .unwrap()
        .starts_with("Invalid JSON body"));
}

#[tokio::test]
async fn test_chat_query_round_trip() {
    let app = app(
        ScriptedGenerator::new()
            .reply_text("{\"LATITUDE\": {\"$gt\": 0}}")
            .reply_text("```json\n{\"summary\": \"A single northern profile.\"}\n```"),
        AppConfig::default(),
    );
    call(&app, "POST", "/data/profiles", Some(sample_batch())).await;

    let response = call(&app, "POST", "/api/chat/query", Some(json!({"query": "northern profiles"}))).await;
    assert_eq!(response.status, 200);
    let body = response.json_value();
    assert_eq!(body["query"], "northern profiles");
    assert_eq!(body["appliedFilter"], json!({"lat": {"$gt": 0.0}}));
    assert_eq!(body["count"], 1);
    assert_eq!(body["results"][0]["lat"], 12.5);
    assert_eq!(body["summary"], "A single northern profile.");

    let history = call(&app, "GET", "/api/chat/history", None).await.json_value();
    assert_eq!(history[0]["query"], "northern profiles");
    assert_eq!(history[0]["outcome"], "completed");
}

#[tokio::test]
async fn test_chat_query_invalid_filter_returns_raw() {
    let app = app(ScriptedGenerator::new().reply_text("lat > 10"), AppConfig::default());
    let response = call(&app, "POST", "/api/chat/query", Some(json!({"query": "north of 10"}))).await;

    assert_eq!(response.status, 400);
    let body = response.json_value();
    assert_eq!(body["raw"], "lat > 10");
    assert!(body["error"]
        .as_str()
        .unwrap()
        .starts_with("Invalid JSON returned by LLM"));
}

#[tokio::test]
async fn test_chat_query_service_down_is_server_error() {
    let app = app(ScriptedGenerator::new().reply_failure("dns failure"), AppConfig::default());
    let response = call(&app, "POST", "/chat/query", Some(json!({"query": "anything"}))).await;
    assert_eq!(response.status, 500);
    let body = response.json_value();
    assert_eq!(body["error"], "Failed to process chat query");
    assert!(body["details"].as_str().unwrap().contains("dns failure"));
}

#[tokio::test]
async fn test_chat_query_requires_query_string() {
    let app = app(ScriptedGenerator::new(), AppConfig::default());
    let response = call(&app, "POST", "/chat/query", Some(json!({"question": "x"}))).await;
    assert_eq!(response.status, 400);
}

#[tokio::test]
async fn test_health_options_and_unknown_routes() {
    let app = app(ScriptedGenerator::new(), AppConfig::default());
    assert_eq!(call(&app, "GET", "/api/health", None).await.json_value()["status"], "ok");
    assert_eq!(call(&app, "OPTIONS", "/api/chat/query", None).await.status, 204);
    assert_eq!(call(&app, "GET", "/api/nowhere", None).await.status, 404);
    assert_eq!(call(&app, "DELETE", "/api/data/profiles", None).await.status, 404);
}

async fn roundtrip(addr: std::net::SocketAddr, raw: &[u8]) -> String {
    let mut stream = TcpStream::connect(addr).await.unwrap();
    stream.write_all(raw).await.unwrap();
    let mut response = String::new();
    stream.read_to_string(&mut response).await.unwrap();
    response
}

#[tokio::test]
async fn test_served_over_tcp() {
    let config = AppConfig {
        max_body_bytes: 64,
        ..AppConfig::default()
    };
    let app = Arc::new(app(ScriptedGenerator::new(), config));
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(serve(listener, app));

    let health = roundtrip(addr, b"GET /api/health HTTP/1.1\r\nHost: localhost\r\n\r\n").await;
    assert!(health.starts_with("HTTP/1.1 200 OK\r\n"));
    assert!(health.contains("Access-Control-Allow-Origin: *"));
    assert!(health.ends_with("{\"service\":\"argo-insight\",\"status\":\"ok\"}"));

    let body = "x".repeat(100);
    let oversized = format!(
        "POST /api/data/profiles HTTP/1.1\r\nContent-Length: {}\r\n\r\n{}",
        body.len(),
        body
    );
    let rejected = roundtrip(addr, oversized.as_bytes()).await;
    assert!(rejected.starts_with("HTTP/1.1 413 Payload Too Large\r\n"));
}
