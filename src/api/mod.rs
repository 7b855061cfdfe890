//! HTTP Layer
//!
//! Router, CORS and request tracing around the OCR service.

pub mod ocr;

use axum::extract::{DefaultBodyLimit, State};
use axum::http::{header, HeaderValue, Method};
use axum::routing::{get, post};
use axum::{Json, Router};
use serde_json::{json, Value};
use std::sync::Arc;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;
use tracing::warn;

use crate::config::ServerConfig;
use crate::service::OcrService;

/// State shared by all handlers
pub struct AppState {
    pub service: OcrService,
    pub app_name: String,
}

/// Build the router with all routes and layers
pub fn build_router(state: Arc<AppState>, server: &ServerConfig) -> Router {
    let ocr_routes = Router::new()
        .route("/extract-text/", post(ocr::extract_text))
        .route("/extract-text", post(ocr::extract_text))
        .route("/extract-receipt/", post(ocr::extract_receipt))
        .route("/extract-receipt", post(ocr::extract_receipt))
        .route("/extract-words/", post(ocr::extract_words))
        .route("/extract-words", post(ocr::extract_words));

    Router::new()
        .route("/", get(root))
        .route("/health", get(health_check))
        .nest("/api/v1/ocr", ocr_routes)
        .layer(DefaultBodyLimit::max(server.max_upload_bytes))
        .layer(cors_layer(&server.allowed_origins))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

fn cors_layer(allowed_origins: &[String]) -> CorsLayer {
    if allowed_origins.iter().any(|o| o.trim() == "*") {
        return CorsLayer::new()
            .allow_origin(Any)
            .allow_methods(Any)
            .allow_headers(Any);
    }

    let origins = allowed_origins
        .iter()
        .filter_map(|origin| {
            let trimmed = origin.trim();
            match trimmed.parse::<HeaderValue>() {
                Ok(value) => Some(value),
                Err(_) => {
                    warn!("Ignoring invalid allowed origin: {}", trimmed);
                    None
                }
            }
        })
        .collect::<Vec<_>>();

    CorsLayer::new()
        .allow_origin(origins)
        .allow_methods([Method::GET, Method::POST, Method::OPTIONS])
        .allow_headers([header::CONTENT_TYPE, header::AUTHORIZATION, header::ACCEPT])
        .allow_credentials(true)
}

async fn root(State(state): State<Arc<AppState>>) -> Json<Value> {
    Json(json!({ "message": format!("Welcome to the {}", state.app_name) }))
}

async fn health_check() -> &'static str {
    "OK"
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::AppConfig;
    use crate::vision::testing::{solid_png, tsv_output, ScriptedEngine};
    use crate::vision::OcrError;
    use axum::body::Body;
    use axum::http::{Request, StatusCode};
    use http_body_util::BodyExt;
    use tower::ServiceExt;

    const BOUNDARY: &str = "receipt-ocr-test-boundary";

    fn app_with(engine: ScriptedEngine, config: AppConfig) -> Router {
        let service = OcrService::new(Arc::new(engine), &config).unwrap();
        let state = Arc::new(AppState {
            service,
            app_name: config.general.app_name.clone(),
        });
        build_router(state, &config.server)
    }

    fn app(engine: ScriptedEngine) -> Router {
        app_with(engine, AppConfig::default())
    }

    fn upload(uri: &str, field: &str, filename: &str, content_type: &str, data: &[u8]) -> Request<Body> {
        let mut body = Vec::new();
        body.extend_from_slice(
            format!(
                "--{BOUNDARY}\r\nContent-Disposition: form-data; name=\"{field}\"; filename=\"{filename}\"\r\nContent-Type: {content_type}\r\n\r\n"
            )
            .as_bytes(),
        );
        body.extend_from_slice(data);
        body.extend_from_slice(format!("\r\n--{BOUNDARY}--\r\n").as_bytes());

        Request::builder()
            .method("POST")
            .uri(uri)
            .header(
                header::CONTENT_TYPE,
                format!("multipart/form-data; boundary={BOUNDARY}"),
            )
            .body(Body::from(body))
            .unwrap()
    }

    fn png_upload(uri: &str) -> Request<Body> {
        upload(uri, "file", "receipt.png", "image/png", &solid_png(120, 60, [255, 255, 255]))
    }

    async fn json_body(response: axum::response::Response) -> Value {
        let bytes = response.into_body().collect().await.unwrap().to_bytes();
        serde_json::from_slice(&bytes).unwrap()
    }

    #[tokio::test]
    async fn test_root() {
        let response = app(ScriptedEngine::new())
            .oneshot(Request::get("/").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        let body = json_body(response).await;
        assert_eq!(body["message"], "Welcome to the Receipt OCR API");
    }

    #[tokio::test]
    async fn test_health() {
        let response = app(ScriptedEngine::new())
            .oneshot(Request::get("/health").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        let bytes = response.into_body().collect().await.unwrap().to_bytes();
        assert_eq!(&bytes[..], b"OK");
    }

    #[tokio::test]
    async fn test_extract_text() {
        let response = app(ScriptedEngine::new().with_text("Hotel Alpina\nTotal 12.50\n"))
            .oneshot(png_upload("/api/v1/ocr/extract-text/"))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        let body = json_body(response).await;
        assert_eq!(body["filename"], "receipt.png");
        assert_eq!(body["text"], "Hotel Alpina\nTotal 12.50\n");
    }

    #[tokio::test]
    async fn test_non_image_content_type_rejected() {
        let response = app(ScriptedEngine::new())
            .oneshot(upload(
                "/api/v1/ocr/extract-text/",
                "file",
                "notes.txt",
                "text/plain",
                b"hello",
            ))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
        let body = json_body(response).await;
        assert_eq!(body["filename"], "notes.txt");
        assert_eq!(body["error"], "Invalid file type. Please upload an image.");
    }

    #[tokio::test]
    async fn test_corrupt_image_is_bad_request() {
        let response = app(ScriptedEngine::new())
            .oneshot(upload(
                "/api/v1/ocr/extract-receipt/",
                "file",
                "broken.jpg",
                "image/jpeg",
                b"\xff\xd8 not really a jpeg",
            ))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
        let body = json_body(response).await;
        assert!(body["error"].as_str().unwrap().starts_with("Invalid image"));
    }

    #[tokio::test]
    async fn test_missing_file_field() {
        let response = app(ScriptedEngine::new())
            .oneshot(upload(
                "/api/v1/ocr/extract-text/",
                "attachment",
                "receipt.png",
                "image/png",
                &solid_png(4, 4, [0, 0, 0]),
            ))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn test_engine_failure_is_bad_request_on_both_endpoints() {
        for uri in ["/api/v1/ocr/extract-text/", "/api/v1/ocr/extract-receipt/"] {
            let engine = ScriptedEngine::failing(OcrError::OcrEngine(String::new()));
            let response = app(engine).oneshot(png_upload(uri)).await.unwrap();
            assert_eq!(response.status(), StatusCode::BAD_REQUEST, "{}", uri);
            let body = json_body(response).await;
            assert_eq!(body["error"], "Tesseract OCR failed: scripted");
        }
    }

    #[tokio::test]
    async fn test_unexpected_failure_is_server_error() {
        let engine = ScriptedEngine::failing(OcrError::Unexpected(String::new()));
        let response = app(engine)
            .oneshot(png_upload("/api/v1/ocr/extract-receipt/"))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
        let body = json_body(response).await;
        assert_eq!(body["error"], "An unexpected error occurred: scripted");
    }

    #[tokio::test]
    async fn test_extract_receipt_with_and_without_slash() {
        let tsv = tsv_output(&[
            (1, 1, 1, 1, "Total", 95.0, (5, 5, 40, 14)),
            (1, 1, 1, 2, "12.50", 90.0, (60, 5, 40, 14)),
            (1, 1, 2, 1, "Datum:", 93.0, (5, 30, 40, 14)),
            (1, 1, 2, 2, "24.12.2023", 92.0, (50, 30, 60, 14)),
        ]);

        for uri in ["/api/v1/ocr/extract-receipt/", "/api/v1/ocr/extract-receipt"] {
            let engine = ScriptedEngine::new().with_tsv(&tsv).with_roi("12.50");
            let response = app(engine).oneshot(png_upload(uri)).await.unwrap();
            assert_eq!(response.status(), StatusCode::OK, "{}", uri);

            let body = json_body(response).await;
            assert_eq!(
                body,
                json!({
                    "filename": "receipt.png",
                    "total_amount": "12.50",
                    "date": "24.12.2023",
                    "items": [],
                    "raw_text": "Total 12.50 Datum: 24.12.2023",
                })
            );
        }
    }

    #[tokio::test]
    async fn test_blank_receipt_has_null_fields() {
        let engine = ScriptedEngine::new().with_tsv(&tsv_output(&[]));
        let response = app(engine)
            .oneshot(png_upload("/api/v1/ocr/extract-receipt/"))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        let body = json_body(response).await;
        assert!(body["total_amount"].is_null());
        assert!(body["date"].is_null());
        assert_eq!(body["items"], json!([]));
    }

    #[tokio::test]
    async fn test_extract_words() {
        let tsv = tsv_output(&[
            (1, 1, 1, 1, "Hotel", 95.4, (5, 5, 40, 14)),
            (1, 1, 1, 2, "Alpina", 90.0, (50, 5, 50, 14)),
            (1, 1, 2, 1, "Danke", 88.0, (5, 30, 40, 14)),
        ]);
        let engine = ScriptedEngine::new().with_tsv(&tsv);
        let response = app(engine)
            .oneshot(png_upload("/api/v1/ocr/extract-words/"))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);

        let body = json_body(response).await;
        assert_eq!(body["lines"], json!(["Hotel Alpina", "Danke"]));
        assert_eq!(body["words"][0]["conf"], 95);
        assert_eq!(body["words"][1]["left"], 50);
        assert_eq!(body["words"][2]["line_num"], 2);
    }

    #[tokio::test]
    async fn test_upload_over_limit_rejected() {
        let mut config = AppConfig::default();
        config.server.max_upload_bytes = 64;
        let response = app_with(ScriptedEngine::new(), config)
            .oneshot(png_upload("/api/v1/ocr/extract-text/"))
            .await
            .unwrap();
        assert!(response.status().is_client_error());
    }

    #[tokio::test]
    async fn test_cors_preflight_wildcard() {
        let request = Request::builder()
            .method("OPTIONS")
            .uri("/api/v1/ocr/extract-text/")
            .header(header::ORIGIN, "http://example.com")
            .header(header::ACCESS_CONTROL_REQUEST_METHOD, "POST")
            .body(Body::empty())
            .unwrap();
        let response = app(ScriptedEngine::new()).oneshot(request).await.unwrap();
        assert_eq!(
            response.headers().get(header::ACCESS_CONTROL_ALLOW_ORIGIN).unwrap(),
            "*"
        );
    }

    #[tokio::test]
    async fn test_cors_explicit_origins() {
        let mut config = AppConfig::default();
        config.server.allowed_origins = vec!["http://localhost:3000".to_string()];

        let request = Request::builder()
            .method("OPTIONS")
            .uri("/api/v1/ocr/extract-text/")
            .header(header::ORIGIN, "http://localhost:3000")
            .header(header::ACCESS_CONTROL_REQUEST_METHOD, "POST")
            .body(Body::empty())
            .unwrap();
        let response = app_with(ScriptedEngine::new(), config).oneshot(request).await.unwrap();
        assert_eq!(
            response.headers().get(header::ACCESS_CONTROL_ALLOW_ORIGIN).unwrap(),
            "http://localhost:3000"
        );
    }
}
