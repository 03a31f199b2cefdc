//! End-to-end tests for the leadrelay proxy router.
//!
//! The gateway is replaced by an `httpmock` server; requests go through the
//! full axum router with `tower::ServiceExt::oneshot`.

use std::sync::Arc;
use std::time::{Duration, Instant};

use axum::{
    body::Body,
    http::{Request, StatusCode},
    Router,
};
use http_body_util::BodyExt;
use httpmock::prelude::*;
use leadrelay_proxy::persistence::{MemorySink, PersistenceSink};
use leadrelay_proxy::rate_limit::RateLimiterConfig;
use leadrelay_proxy::{build_router, AppState, ProxyConfig, UpstreamEndpoints, UpstreamMode};
use serde_json::{json, Value};
use tower::ServiceExt;

const LEAD_PATH: &str = "/users/motor_lead";
const QUOTE_PATH: &str = "/api/v1/quote/quick-quote";

fn lead_body() -> Value {
    json!({
        "source": "comparison-site",
        "first_name": "Thandi",
        "last_name": "Mokoena",
        "email": "thandi@example.co.za",
        "contact_number": "0821234567"
    })
}

fn quote_body() -> Value {
    json!({
        "source": "comparison-site",
        "externalReferenceId": "ext-001",
        "vehicles": [{
            "year": 2019,
            "make": "Volkswagen",
            "model": "Polo 1.0 TSI",
            "mmCode": "60054300",
            "modified": "N",
            "category": "HB",
            "colour": "White",
            "engineSize": 1.0,
            "financed": "Y",
            "owner": "Y",
            "status": "SecondHand",
            "partyIsRegularDriver": "Y",
            "accessories": "N",
            "accessoriesAmount": 0,
            "retailValue": 210000,
            "marketValue": 195000,
            "insuredValueType": "Retail",
            "useType": "Private",
            "overnightParkingSituation": "Garage",
            "coverCode": "Comprehensive",
            "address": {
                "addressLine": "12 Main Road",
                "postalCode": 2196,
                "suburb": "Sandton",
                "latitude": -26.1076,
                "longitude": 28.0567
            },
            "regularDriver": {
                "maritalStatus": "Single",
                "currentlyInsured": true,
                "yearsWithoutClaims": 3,
                "relationToPolicyHolder": "Self",
                "emailAddress": "driver@example.co.za",
                "mobileNumber": "0821234567",
                "idNumber": "9001015009087",
                "prvInsLosses": 0,
                "licenseIssueDate": "2010-06-15",
                "dateOfBirth": "1990-01-01"
            }
        }]
    })
}

fn config_for(server: &MockServer) -> ProxyConfig {
    ProxyConfig {
        api_token: Some("test-token".to_string()),
        endpoints: UpstreamEndpoints {
            lead_transfer: server.url(LEAD_PATH),
            quick_quote: server.url(QUOTE_PATH),
        },
        request_timeout: Duration::from_secs(2),
        persist_timeout: Duration::from_secs(2),
        rate_limit: RateLimiterConfig {
            rps: 1000,
            burst: 1000,
            ..Default::default()
        },
        ..Default::default()
    }
}

fn state_with(config: ProxyConfig, sink: Arc<MemorySink>) -> Arc<AppState> {
    Arc::new(AppState::with_sink(config, sink).unwrap())
}

async fn send(app: Router, request: Request<Body>) -> (StatusCode, Value) {
    let response = app.oneshot(request).await.unwrap();
    let status = response.status();
    let bytes = response.into_body().collect().await.unwrap().to_bytes();
    let body = serde_json::from_slice(&bytes).unwrap_or(Value::Null);
    (status, body)
}

fn post_json(path: &str, body: &Value) -> Request<Body> {
    Request::builder()
        .method("POST")
        .uri(path)
        .header("content-type", "application/json")
        .body(Body::from(body.to_string()))
        .unwrap()
}

fn get(path: &str) -> Request<Body> {
    Request::builder().uri(path).body(Body::empty()).unwrap()
}

async fn mock_lead_success<'a>(
    server: &'a MockServer,
    uuid: &str,
    delay: Duration,
) -> httpmock::Mock<'a> {
    let uuid = uuid.to_string();
    server
        .mock_async(move |when, then| {
            when.method(POST)
                .path(LEAD_PATH)
                .header("Authorization", "Bearer test-token");
            then.status(200).delay(delay).json_body(json!({
                "success": true,
                "data": {"uuid": uuid, "redirect_url": "https://gw.example/redirect"}
            }));
        })
        .await
}

#[tokio::test]
async fn test_lead_transfer_round_trip() {
    let server = MockServer::start_async().await;
    let mock = mock_lead_success(&server, "lead-123", Duration::ZERO).await;
    let sink = Arc::new(MemorySink::new());
    let state = state_with(config_for(&server), sink.clone());
    let app = build_router(state.clone());

    let (status, body) = send(app.clone(), post_json(LEAD_PATH, &lead_body())).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["success"], true);
    assert_eq!(body["data"]["uuid"], "lead-123");
    mock.assert_async().await;

    state.dispatcher.worker().flush().await;
    let (status, stored) = send(app, get("/api/v1/leads/lead-123")).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(stored["first_name"], "Thandi");
    assert_eq!(stored["response_uuid"], "lead-123");
}

#[tokio::test]
async fn test_quick_quote_round_trip() {
    let server = MockServer::start_async().await;
    server
        .mock_async(|when, then| {
            when.method(POST)
                .path(QUOTE_PATH)
                .json_body_partial(r#"{"externalReferenceId": "ext-001"}"#);
            then.status(200).json_body(json!({
                "success": true,
                "id": "quote-9",
                "data": [{"premium": 812.5, "excess": 5000.0}]
            }));
        })
        .await;
    let state = state_with(config_for(&server), Arc::new(MemorySink::new()));
    let app = build_router(state.clone());

    let (status, body) = send(app.clone(), post_json(QUOTE_PATH, &quote_body())).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["id"], "quote-9");

    state.dispatcher.worker().flush().await;
    let (status, stored) = send(app, get("/api/v1/quotes/quote-9")).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(stored["vehicle_count"], 1);
    assert_eq!(stored["premium"], 812.5);
}

#[tokio::test]
async fn test_unknown_record_is_404() {
    let server = MockServer::start_async().await;
    let app = build_router(state_with(config_for(&server), Arc::new(MemorySink::new())));

    let (status, body) = send(app.clone(), get("/api/v1/leads/nope")).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(body["success"], false);

    let (status, _) = send(app, get("/api/v1/quotes/nope")).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_capacity_two_serialises_third_call() {
    let server = MockServer::start_async().await;
    let mock = mock_lead_success(&server, "lead-slow", Duration::from_millis(200)).await;
    let config = ProxyConfig {
        max_concurrent_calls: 2,
        request_timeout: Duration::from_secs(1),
        ..config_for(&server)
    };
    let state = state_with(config, Arc::new(MemorySink::new()));
    let app = build_router(state.clone());

    let started = Instant::now();
    let calls: Vec<_> = (0..3)
        .map(|_| {
            let app = app.clone();
            tokio::spawn(async move { send(app, post_json(LEAD_PATH, &lead_body())).await })
        })
        .collect();

    for call in calls {
        let (status, _) = call.await.unwrap();
        assert_eq!(status, StatusCode::OK);
    }
    let elapsed = started.elapsed();

    // Third call could only start after one of the first two returned
    assert!(elapsed >= Duration::from_millis(390), "finished in {:?}", elapsed);
    assert_eq!(mock.hits_async().await, 3);

    let gate = state.dispatcher.gate().metrics().snapshot();
    assert_eq!(gate.max_in_flight, 2);
    assert_eq!(gate.acquired, 3);
    assert_eq!(gate.released, 3);
    assert_eq!(gate.in_flight, 0);
}

#[tokio::test]
async fn test_invalid_field_never_calls_upstream() {
    let server = MockServer::start_async().await;
    let mock = mock_lead_success(&server, "unused", Duration::ZERO).await;
    let app = build_router(state_with(config_for(&server), Arc::new(MemorySink::new())));

    let mut body = lead_body();
    body["email"] = json!("not-an-email");
    let (status, response) = send(app, post_json(LEAD_PATH, &body)).await;

    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(response["success"], false);
    assert_eq!(response["kind"], "validation");
    assert!(response["error"].as_str().unwrap().contains("email"));
    assert_eq!(mock.hits_async().await, 0);
}

#[tokio::test]
async fn test_invalid_quote_field_never_calls_upstream() {
    let server = MockServer::start_async().await;
    let mock = server
        .mock_async(|when, then| {
            when.method(POST);
            then.status(200);
        })
        .await;
    let app = build_router(state_with(config_for(&server), Arc::new(MemorySink::new())));

    let mut body = quote_body();
    body["vehicles"][0]["regularDriver"]["dateOfBirth"] = json!("01/01/1990");
    let (status, response) = send(app, post_json(QUOTE_PATH, &body)).await;

    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(response["kind"], "validation");
    assert_eq!(mock.hits_async().await, 0);
}

#[tokio::test]
async fn test_wrong_content_type_is_415() {
    let server = MockServer::start_async().await;
    let app = build_router(state_with(config_for(&server), Arc::new(MemorySink::new())));

    let request = Request::builder()
        .method("POST")
        .uri(LEAD_PATH)
        .header("content-type", "text/plain")
        .body(Body::from(lead_body().to_string()))
        .unwrap();
    let (status, body) = send(app, request).await;

    assert_eq!(status, StatusCode::UNSUPPORTED_MEDIA_TYPE);
    assert_eq!(body["kind"], "unsupported_media_type");
}

#[tokio::test]
async fn test_malformed_json_is_400() {
    let server = MockServer::start_async().await;
    let app = build_router(state_with(config_for(&server), Arc::new(MemorySink::new())));

    let request = Request::builder()
        .method("POST")
        .uri(LEAD_PATH)
        .header("content-type", "application/json")
        .body(Body::from("{\"first_name\": "))
        .unwrap();
    let (status, body) = send(app, request).await;

    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["kind"], "validation");
}

#[tokio::test]
async fn test_upstream_503_is_502_and_not_persisted() {
    let server = MockServer::start_async().await;
    server
        .mock_async(|when, then| {
            when.method(POST).path(LEAD_PATH);
            then.status(503).body("gateway down");
        })
        .await;
    let sink = Arc::new(MemorySink::new());
    let state = state_with(config_for(&server), sink.clone());
    let app = build_router(state.clone());

    let (status, body) = send(app, post_json(LEAD_PATH, &lead_body())).await;

    assert_eq!(status, StatusCode::BAD_GATEWAY);
    assert_eq!(body["kind"], "upstream_status");
    assert!(body["error"].as_str().unwrap().contains("503"));

    state.dispatcher.worker().flush().await;
    assert!(sink.is_empty());
    assert_eq!(state.dispatcher.worker().stats().submitted, 0);
    assert_eq!(state.dispatcher.gate().available(), state.dispatcher.gate().capacity());
}

#[tokio::test]
async fn test_upstream_timeout_is_504() {
    let server = MockServer::start_async().await;
    mock_lead_success(&server, "too-late", Duration::from_millis(800)).await;
    let config = ProxyConfig {
        request_timeout: Duration::from_millis(200),
        ..config_for(&server)
    };
    let sink = Arc::new(MemorySink::new());
    let state = state_with(config, sink.clone());
    let app = build_router(state.clone());

    let (status, body) = send(app, post_json(LEAD_PATH, &lead_body())).await;

    assert_eq!(status, StatusCode::GATEWAY_TIMEOUT);
    assert_eq!(body["success"], false);
    assert_eq!(body["kind"], "upstream_timeout");
    assert!(body.get("data").is_none());

    state.dispatcher.worker().flush().await;
    assert!(sink.is_empty());
}

#[tokio::test]
async fn test_saturated_gate_is_503() {
    let server = MockServer::start_async().await;
    mock_lead_success(&server, "unused", Duration::ZERO).await;
    let config = ProxyConfig {
        max_concurrent_calls: 1,
        request_timeout: Duration::from_millis(100),
        ..config_for(&server)
    };
    let state = state_with(config, Arc::new(MemorySink::new()));
    let _held = state.dispatcher.gate().try_acquire().unwrap();
    let app = build_router(state.clone());

    let (status, body) = send(app, post_json(LEAD_PATH, &lead_body())).await;

    assert_eq!(status, StatusCode::SERVICE_UNAVAILABLE);
    assert_eq!(body["kind"], "gate_timeout");
}

#[tokio::test]
async fn test_failing_sink_does_not_change_response() {
    let server = MockServer::start_async().await;
    mock_lead_success(&server, "lead-unsaved", Duration::ZERO).await;
    let sink = Arc::new(MemorySink::new());
    sink.set_failing(true);
    let state = state_with(config_for(&server), sink.clone());
    let app = build_router(state.clone());

    let (status, body) = send(app.clone(), post_json(LEAD_PATH, &lead_body())).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["data"]["uuid"], "lead-unsaved");

    state.dispatcher.worker().flush().await;
    assert_eq!(state.dispatcher.worker().stats().failed, 1);

    let (status, health) = send(app, get("/health")).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(health["database"]["status"], "disconnected");
}

#[tokio::test]
async fn test_rate_limit_returns_429() {
    let server = MockServer::start_async().await;
    mock_lead_success(&server, "lead-rl", Duration::ZERO).await;
    let config = ProxyConfig {
        rate_limit: RateLimiterConfig {
            rps: 1,
            burst: 2,
            ..Default::default()
        },
        ..config_for(&server)
    };
    let app = build_router(state_with(config, Arc::new(MemorySink::new())));

    let from = |ip: &'static str| {
        Request::builder()
            .method("POST")
            .uri(LEAD_PATH)
            .header("content-type", "application/json")
            .header("x-forwarded-for", ip)
            .body(Body::from(lead_body().to_string()))
            .unwrap()
    };

    assert_eq!(send(app.clone(), from("203.0.113.1")).await.0, StatusCode::OK);
    assert_eq!(send(app.clone(), from("203.0.113.1")).await.0, StatusCode::OK);

    let (status, body) = send(app.clone(), from("203.0.113.1")).await;
    assert_eq!(status, StatusCode::TOO_MANY_REQUESTS);
    assert_eq!(
        body,
        json!({"success": false, "error": "Too many requests. Please try again later."})
    );

    // Another client is unaffected, and health checks are never limited
    assert_eq!(send(app.clone(), from("203.0.113.2")).await.0, StatusCode::OK);
    assert_eq!(send(app, get("/ping")).await.0, StatusCode::OK);
}

#[tokio::test]
async fn test_synthetic_mode_serves_without_gateway() {
    let server = MockServer::start_async().await;
    let mock = server
        .mock_async(|when, then| {
            when.method(POST);
            then.status(500);
        })
        .await;
    let config = ProxyConfig {
        api_token: None,
        mode: UpstreamMode::Synthetic,
        ..config_for(&server)
    };
    let sink = Arc::new(MemorySink::new());
    let state = state_with(config, sink.clone());
    let app = build_router(state.clone());

    let (status, lead) = send(app.clone(), post_json(LEAD_PATH, &lead_body())).await;
    assert_eq!(status, StatusCode::OK);
    let uuid = lead["data"]["uuid"].as_str().unwrap().to_string();
    assert!(uuid.starts_with("synthetic-lead-"));
    assert!(lead["data"]["redirect_url"].as_str().unwrap().contains("name=Thandi"));

    let (status, quote) = send(app.clone(), post_json(QUOTE_PATH, &quote_body())).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(quote["data"][0]["premium"], 1240.46);

    state.dispatcher.worker().flush().await;
    assert!(sink.find_lead(&uuid).await.unwrap().is_some());
    assert_eq!(mock.hits_async().await, 0);

    let (_, health) = send(app, get("/health")).await;
    assert_eq!(health["upstream_mode"], "synthetic");
}

#[tokio::test]
async fn test_health_and_metrics() {
    let server = MockServer::start_async().await;
    let config = ProxyConfig {
        max_concurrent_calls: 4,
        ..config_for(&server)
    };
    let app = build_router(state_with(config, Arc::new(MemorySink::new())));

    let (status, health) = send(app.clone(), get("/health")).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(health["status"], "healthy");
    assert_eq!(health["max_concurrent_calls"], 4);
    assert_eq!(health["upstream_mode"], "live");
    assert_eq!(health["database"]["status"], "connected");
    assert!(health["cpus"].as_u64().unwrap() >= 1);

    let (status, metrics) = send(app.clone(), get("/metrics")).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(metrics["gate"]["capacity"], 4);
    assert_eq!(metrics["gate"]["available"], 4);
    assert_eq!(metrics["persistence"]["pending"], 0);

    let (status, _) = send(app.clone(), get("/ready")).await;
    assert_eq!(status, StatusCode::OK);
    let response = app.oneshot(get("/metrics/prometheus")).await.unwrap();
    assert_eq!(response.status(), StatusCode::OK);
}
