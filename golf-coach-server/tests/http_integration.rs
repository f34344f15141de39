//! HTTP integration tests for the Golf Coach REST API.
//!
//! Every test builds the full router over an in-memory SQLite database and
//! dispatches requests with `oneshot`. The vision model is either a local
//! stub or a `ClaudeVisionClient` pointed at a wiremock server.

use std::io::Cursor;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use axum::body::Body;
use axum::http::{header, Request, StatusCode};
use axum::Router;
use golf_coach_core::config::{DatabaseConfig, VisionConfig};
use golf_coach_core::vision::{
    ClaudeVisionClient, VisionBackend, VisionError, VisionPing, VisionRequest,
};
use golf_coach_core::GolfCoachConfig;
use golf_coach_server::http::{build_router, HttpState};
use golf_coach_server::subsystems::trace::TraceLog;
use image::{DynamicImage, ImageOutputFormat, Rgb, RgbImage};
use serde_json::Value;
use tower::ServiceExt;
use wiremock::matchers::{header as header_matcher, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

const BOUNDARY: &str = "golf-coach-test-boundary";

struct StubVision {
    reply: String,
    calls: AtomicUsize,
}

#[async_trait]
impl VisionBackend for StubVision {
    async fn analyze(&self, _request: &VisionRequest) -> Result<String, VisionError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        Ok(self.reply.clone())
    }

    async fn ping(&self) -> Result<VisionPing, VisionError> {
        Ok(VisionPing {
            model: "stub-model".to_string(),
            latency_ms: 1,
            reply: "hi".to_string(),
        })
    }

    fn name(&self) -> &str {
        "stub"
    }
}

fn stub(reply: &str) -> Arc<StubVision> {
    Arc::new(StubVision {
        reply: reply.to_string(),
        calls: AtomicUsize::new(0),
    })
}

fn memory_config() -> GolfCoachConfig {
    GolfCoachConfig {
        database: DatabaseConfig {
            url: "sqlite::memory:".to_string(),
            max_connections: 1,
        },
        ..Default::default()
    }
}

async fn make_state(
    config: GolfCoachConfig,
    vision: Option<Arc<dyn VisionBackend>>,
) -> Arc<HttpState> {
    let pool = golf_coach_core::db::init_database(&config.database)
        .await
        .expect("in-memory database");
    Arc::new(HttpState {
        pool,
        config,
        vision,
        traces: TraceLog::default(),
    })
}

fn png_bytes() -> Vec<u8> {
    let img = DynamicImage::ImageRgb8(RgbImage::from_fn(16, 12, |x, y| {
        Rgb([(x * 10) as u8, (y * 20) as u8, 90])
    }));
    let mut buf = Cursor::new(Vec::new());
    img.write_to(&mut buf, ImageOutputFormat::Png).unwrap();
    buf.into_inner()
}

enum Part<'a> {
    File {
        name: &'a str,
        content_type: &'a str,
        data: Vec<u8>,
    },
    Text {
        name: &'a str,
        value: &'a str,
    },
}

fn multipart_body(parts: Vec<Part<'_>>) -> Vec<u8> {
    let mut body = Vec::new();
    for part in parts {
        body.extend_from_slice(format!("--{}\r\n", BOUNDARY).as_bytes());
        match part {
            Part::File {
                name,
                content_type,
                data,
            } => {
                body.extend_from_slice(
                    format!(
                        "Content-Disposition: form-data; name=\"{}\"; filename=\"{}.png\"\r\nContent-Type: {}\r\n\r\n",
                        name, name, content_type
                    )
                    .as_bytes(),
                );
                body.extend_from_slice(&data);
            }
            Part::Text { name, value } => {
                body.extend_from_slice(
                    format!("Content-Disposition: form-data; name=\"{}\"\r\n\r\n", name).as_bytes(),
                );
                body.extend_from_slice(value.as_bytes());
            }
        }
        body.extend_from_slice(b"\r\n");
    }
    body.extend_from_slice(format!("--{}--\r\n", BOUNDARY).as_bytes());
    body
}

fn analyze_request(parts: Vec<Part<'_>>) -> Request<Body> {
    Request::builder()
        .method("POST")
        .uri("/api/swings/analyze")
        .header(
            header::CONTENT_TYPE,
            format!("multipart/form-data; boundary={}", BOUNDARY),
        )
        .body(Body::from(multipart_body(parts)))
        .unwrap()
}

fn png_part(name: &str) -> Part<'_> {
    Part::File {
        name,
        content_type: "image/png",
        data: png_bytes(),
    }
}

async fn send(app: &Router, req: Request<Body>) -> (StatusCode, Value) {
    let response = app.clone().oneshot(req).await.unwrap();
    let status = response.status();
    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    let body = serde_json::from_slice(&bytes).unwrap_or(Value::Null);
    (status, body)
}

fn get(uri: &str) -> Request<Body> {
    Request::builder().uri(uri).body(Body::empty()).unwrap()
}

fn delete(uri: &str) -> Request<Body> {
    Request::builder()
        .method("DELETE")
        .uri(uri)
        .body(Body::empty())
        .unwrap()
}

// ===========================================================================
// Swing lifecycle
// ===========================================================================

#[tokio::test]
async fn test_analyze_get_delete_lifecycle() {
    let vision = stub("1. OVERALL ASSESSMENT\n- Rating: 7/10\n- Good tempo, early extension.\n\n2. POSITIONS");
    let state = make_state(memory_config(), Some(vision.clone())).await;
    let app = build_router(state);

    let (status, body) = send(
        &app,
        analyze_request(vec![
            png_part("impact"),
            png_part("address"),
            Part::Text {
                name: "club",
                value: "7-iron",
            },
            Part::Text {
                name: "notes",
                value: "   ",
            },
        ]),
    )
    .await;
    assert_eq!(status, StatusCode::OK, "analyze failed: {}", body);
    assert_eq!(body["rating"], 7);
    assert_eq!(body["message"], "Swing analyzed successfully");
    assert!(body["summary"].as_str().unwrap().contains("Good tempo"));
    let id = body["swing_id"].as_i64().unwrap();
    assert_eq!(vision.calls.load(Ordering::SeqCst), 1);

    let (status, body) = send(&app, get(&format!("/api/swings/{}", id))).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["positions_analyzed"], "address,impact");
    assert_eq!(body["club"], "7-iron");
    assert!(body["notes"].is_null());
    assert!(body["images"]["address"].is_string());
    assert!(body["images"]["top"].is_null());

    let (status, body) = send(&app, delete(&format!("/api/swings/{}", id))).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["id"], id);

    let (status, body) = send(&app, get(&format!("/api/swings/{}", id))).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(body["status"], "error");
    assert!(body["detail"].as_str().unwrap().contains("not found"));

    let (status, _) = send(&app, delete(&format!("/api/swings/{}", id))).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn test_history_is_newest_first_with_total() {
    let state = make_state(memory_config(), Some(stub("Score: 5 out of 10"))).await;
    let app = build_router(state);

    let mut ids = Vec::new();
    for club in ["Driver", "Wedge", "Putter"] {
        let (status, body) = send(
            &app,
            analyze_request(vec![
                png_part("top"),
                Part::Text {
                    name: "club",
                    value: club,
                },
            ]),
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        ids.push(body["swing_id"].as_i64().unwrap());
    }

    let (status, body) = send(&app, get("/api/swings/history?limit=2")).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["total"], 3);
    let swings = body["swings"].as_array().unwrap();
    assert_eq!(swings.len(), 2);
    assert_eq!(swings[0]["id"], ids[2]);
    assert_eq!(swings[0]["club"], "Putter");
    assert_eq!(swings[0]["rating"], 5);
    assert!(swings[0]["thumbnail"].is_string());
    assert!(swings[0].get("analysis").is_none());

    let (_, body) = send(&app, get("/api/swings/history?limit=2&offset=2")).await;
    assert_eq!(body["swings"][0]["id"], ids[0]);
}

#[tokio::test]
async fn test_malformed_path_and_query_return_json_errors() {
    let state = make_state(memory_config(), Some(stub("Rating: 6/10"))).await;
    let app = build_router(state);

    for req in [
        get("/api/swings/abc"),
        delete("/api/swings/abc"),
        get("/api/swings/history?limit=abc"),
        get("/api/debug/sessions?limit=-1"),
    ] {
        let uri = req.uri().to_string();
        let response = app.clone().oneshot(req).await.unwrap();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST, "{}", uri);
        let content_type = response.headers()[header::CONTENT_TYPE].clone();
        assert_eq!(content_type, "application/json", "{}", uri);

        let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap();
        let body: Value = serde_json::from_slice(&bytes).unwrap();
        assert_eq!(body["status"], "error", "{}", uri);
        assert!(!body["detail"].as_str().unwrap().is_empty(), "{}", uri);
        assert_eq!(body["error"], body["detail"]);
    }
}

// ===========================================================================
// Validation
// ===========================================================================

#[tokio::test]
async fn test_analyze_without_images_is_400() {
    let vision = stub("Rating: 9/10");
    let state = make_state(memory_config(), Some(vision.clone())).await;
    let app = build_router(state);

    let (status, body) = send(
        &app,
        analyze_request(vec![Part::Text {
            name: "club",
            value: "Driver",
        }]),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["error"], "At least one image is required for analysis");
    assert_eq!(vision.calls.load(Ordering::SeqCst), 0);
}

#[tokio::test]
async fn test_analyze_rejects_wrong_mime() {
    let state = make_state(memory_config(), Some(stub("Rating: 9/10"))).await;
    let app = build_router(state);

    let (status, body) = send(
        &app,
        analyze_request(vec![Part::File {
            name: "address",
            content_type: "image/gif",
            data: png_bytes(),
        }]),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert!(body["detail"]
        .as_str()
        .unwrap()
        .starts_with("Invalid image format. Allowed formats:"));
}

#[tokio::test]
async fn test_analyze_rejects_corrupt_image() {
    let state = make_state(memory_config(), Some(stub("Rating: 9/10"))).await;
    let app = build_router(state);

    let (status, body) = send(
        &app,
        analyze_request(vec![Part::File {
            name: "top",
            content_type: "image/png",
            data: b"definitely not a png".to_vec(),
        }]),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert!(body["error"].as_str().unwrap().contains("Invalid image file"));
}

#[tokio::test]
async fn test_analyze_rejects_oversize_image() {
    let mut config = memory_config();
    config.images.max_size_mb = 1;
    let state = make_state(config, Some(stub("Rating: 9/10"))).await;
    let app = build_router(state);

    let (status, body) = send(
        &app,
        analyze_request(vec![Part::File {
            name: "impact",
            content_type: "image/jpeg",
            data: vec![0u8; 1024 * 1024 + 512 * 1024],
        }]),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert!(body["error"]
        .as_str()
        .unwrap()
        .contains("Image size (1.50MB) exceeds maximum allowed size (1MB)"));
}

#[tokio::test]
async fn test_analyze_rejects_duplicate_position() {
    let state = make_state(memory_config(), Some(stub("Rating: 9/10"))).await;
    let app = build_router(state);

    let (status, body) = send(
        &app,
        analyze_request(vec![png_part("address"), png_part("address")]),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert!(body["error"].as_str().unwrap().contains("Duplicate image"));
}

#[tokio::test]
async fn test_analyze_without_vision_backend_is_500() {
    let state = make_state(memory_config(), None).await;
    let app = build_router(state);

    let (status, body) = send(&app, analyze_request(vec![png_part("address")])).await;
    assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
    assert_eq!(body["status"], "error");
}

// ===========================================================================
// Debug trace log
// ===========================================================================

#[tokio::test]
async fn test_debug_sessions_record_analyze_requests() {
    let state = make_state(memory_config(), Some(stub("Rating: 4/10"))).await;
    let app = build_router(state);

    send(&app, analyze_request(vec![png_part("address")])).await;
    send(
        &app,
        analyze_request(vec![Part::Text {
            name: "club",
            value: "Driver",
        }]),
    )
    .await;

    let (status, body) = send(&app, get("/api/debug/sessions")).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["count"], 2);
    let newest = &body["sessions"][0];
    let oldest = &body["sessions"][1];
    assert_eq!(newest["metadata"]["status"], "failed");
    assert_eq!(newest["metadata"]["error_count"], 1);
    assert_eq!(oldest["metadata"]["status"], "success");
    assert_eq!(oldest["metadata"]["steps_completed"], 7);

    let request_id = oldest["metadata"]["request_id"].as_str().unwrap();
    let (status, body) = send(&app, get(&format!("/api/debug/sessions/{}", request_id))).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["steps"].as_array().unwrap().len(), 14);

    let (status, body) = send(&app, get("/api/debug/health")).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["sessions_recorded"], 2);

    let (status, _) = send(&app, get("/api/debug/sessions/unknown")).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}

// ===========================================================================
// Service endpoints
// ===========================================================================

#[tokio::test]
async fn test_root_and_health() {
    let state = make_state(memory_config(), None).await;
    let app = build_router(state);

    let (status, body) = send(&app, get("/")).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["message"], "Golf Coach API");

    let (status, body) = send(&app, get("/health")).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["status"], "healthy");
    assert_eq!(body["database"], "sqlite");
}

#[tokio::test]
async fn test_cors_allows_configured_origin() {
    let state = make_state(memory_config(), None).await;
    let app = build_router(state);

    let req = Request::builder()
        .method("OPTIONS")
        .uri("/api/swings/history")
        .header(header::ORIGIN, "http://localhost:5173")
        .header(header::ACCESS_CONTROL_REQUEST_METHOD, "GET")
        .body(Body::empty())
        .unwrap();
    let response = app.clone().oneshot(req).await.unwrap();
    assert_eq!(
        response
            .headers()
            .get(header::ACCESS_CONTROL_ALLOW_ORIGIN)
            .unwrap(),
        "http://localhost:5173"
    );
    assert_eq!(
        response
            .headers()
            .get(header::ACCESS_CONTROL_ALLOW_CREDENTIALS)
            .unwrap(),
        "true"
    );

    let req = Request::builder()
        .uri("/health")
        .header(header::ORIGIN, "http://evil.example")
        .body(Body::empty())
        .unwrap();
    let response = app.oneshot(req).await.unwrap();
    assert!(response
        .headers()
        .get(header::ACCESS_CONTROL_ALLOW_ORIGIN)
        .is_none());
}

// ===========================================================================
// End to end against a mocked Anthropic API
// ===========================================================================

fn claude_client(server: &MockServer) -> Arc<dyn VisionBackend> {
    let config = VisionConfig {
        base_url: server.uri(),
        model: "claude-test-model".to_string(),
        max_tokens: 512,
        timeout_seconds: 5,
        max_retries: 1,
        retry_delay_ms: 10,
    };
    Arc::new(ClaudeVisionClient::new("test-key", config).unwrap())
}

fn message_body(text: &str) -> Value {
    serde_json::json!({
        "id": "msg_test",
        "type": "message",
        "role": "assistant",
        "content": [{ "type": "text", "text": text }],
        "stop_reason": "end_turn"
    })
}

#[tokio::test]
async fn test_analyze_through_claude_client() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/v1/messages"))
        .and(header_matcher("x-api-key", "test-key"))
        .respond_with(
            ResponseTemplate::new(200)
                .set_body_json(message_body("Overall summary: Nice swing.\nI rate it 8/10.")),
        )
        .expect(1)
        .mount(&server)
        .await;

    let state = make_state(memory_config(), Some(claude_client(&server))).await;
    let app = build_router(state);

    let (status, body) = send(&app, analyze_request(vec![png_part("follow_through")])).await;
    assert_eq!(status, StatusCode::OK, "analyze failed: {}", body);
    assert_eq!(body["rating"], 8);
    assert_eq!(body["summary"], "Nice swing.");
}

#[tokio::test]
async fn test_claude_failure_surfaces_as_500() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/v1/messages"))
        .respond_with(ResponseTemplate::new(400).set_body_json(serde_json::json!({
            "type": "error",
            "error": { "type": "invalid_request_error", "message": "bad image" }
        })))
        .expect(1)
        .mount(&server)
        .await;

    let state = make_state(memory_config(), Some(claude_client(&server))).await;
    let app = build_router(state);

    let (status, body) = send(&app, analyze_request(vec![png_part("address")])).await;
    assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
    assert!(body["error"]
        .as_str()
        .unwrap()
        .starts_with("Failed to analyze swing"));

    let (_, history) = send(&app, get("/api/swings/history")).await;
    assert_eq!(history["total"], 0);
}

#[tokio::test]
async fn test_claude_connectivity_endpoint() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/v1/messages"))
        .respond_with(ResponseTemplate::new(200).set_body_json(message_body("Hello!")))
        .mount(&server)
        .await;

    let state = make_state(memory_config(), Some(claude_client(&server))).await;
    let app = build_router(state);

    let (status, body) = send(&app, get("/api/health/claude-test")).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["status"], "success");
    assert_eq!(body["model"], "claude-test-model");
    assert_eq!(body["reply"], "Hello!");
}
