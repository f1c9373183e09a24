//! REST API endpoints.

use std::sync::Arc;

use axum::{
    body::Bytes,
    extract::{Multipart, Query, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use chrono::{DateTime, Utc};
use prometheus::{Encoder, TextEncoder};
use serde::{Deserialize, Serialize};

use super::metrics::EMBEDDING_QUEUE_DEPTH;
use crate::embeddings::EmbeddingService;
use crate::error::{EmbeddingError, ServerError};
use crate::Error;

/// Multipart field carrying the image.
pub const IMAGE_FIELD: &str = "file";

const MISSING_TEXT: &str = "Text parameter is missing.";

/// Shared state for request handlers.
#[derive(Debug)]
pub struct AppState {
    pub service: EmbeddingService,
    pub started_at: DateTime<Utc>,
}

impl AppState {
    /// Create state around a running embedding service.
    #[must_use]
    pub fn new(service: EmbeddingService) -> Self {
        Self {
            service,
            started_at: Utc::now(),
        }
    }
}

/// Embedding response body.
#[derive(Debug, Serialize, Deserialize)]
pub struct EmbeddingResponse {
    pub embedding: Vec<f32>,
}

/// Health check response.
#[derive(Debug, Serialize, Deserialize)]
pub struct HealthResponse {
    pub status: String,
    pub version: String,
    pub model: String,
    pub image_dim: usize,
    pub text_dim: usize,
}

/// Text input, accepted from the query string or a JSON body.
#[derive(Debug, Default, Deserialize)]
struct TextParams {
    text: Option<String>,
}

/// Error response carrying an HTTP status.
#[derive(Debug)]
pub struct ApiError {
    status: StatusCode,
    message: String,
}

impl ApiError {
    fn new(status: StatusCode, message: impl Into<String>) -> Self {
        Self {
            status,
            message: message.into(),
        }
    }
}

impl<E> From<E> for ApiError
where
    E: Into<Error>,
{
    fn from(err: E) -> Self {
        let err = err.into();
        let status = match &err {
            Error::Embedding(EmbeddingError::Decode(_)) | Error::Server(ServerError::Request(_)) => {
                StatusCode::BAD_REQUEST
            }
            Error::Server(ServerError::MissingField(_)) => StatusCode::UNPROCESSABLE_ENTITY,
            Error::Embedding(EmbeddingError::Busy { .. }) => StatusCode::SERVICE_UNAVAILABLE,
            _ => StatusCode::INTERNAL_SERVER_ERROR,
        };
        let message = match err {
            Error::Server(ServerError::Request(msg)) => msg,
            other => other.to_string(),
        };
        Self::new(status, message)
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        if self.status.is_server_error() {
            tracing::error!(status = %self.status, error = %self.message, "Request failed");
        } else {
            tracing::warn!(status = %self.status, error = %self.message, "Request rejected");
        }

        (
            self.status,
            Json(serde_json::json!({ "error": self.message })),
        )
            .into_response()
    }
}

/// Create REST API router.
pub fn create_rest_router(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/health", get(health_check))
        .route("/metrics", get(metrics))
        .route("/api/v1/status", get(status))
        .route("/embed_image/", post(embed_image))
        .route("/embed_image", post(embed_image))
        .route("/embed_text/", post(embed_text))
        .route("/embed_text", post(embed_text))
        .with_state(state)
}

/// Embed an uploaded image.
async fn embed_image(
    State(state): State<Arc<AppState>>,
    mut multipart: Multipart,
) -> Result<Json<EmbeddingResponse>, ApiError> {
    let mut payload = None;

    while let Some(field) = multipart
        .next_field()
        .await
        .map_err(|e| ApiError::new(e.status(), e.body_text()))?
    {
        if field.name() == Some(IMAGE_FIELD) {
            let bytes = field
                .bytes()
                .await
                .map_err(|e| ApiError::new(e.status(), e.body_text()))?;
            payload = Some(bytes.to_vec());
            break;
        }
    }

    let payload = payload.ok_or(ServerError::MissingField(IMAGE_FIELD))?;
    let embedding = state.service.embed_image(payload).await?;

    Ok(Json(EmbeddingResponse { embedding }))
}

/// Embed a text given as `{"text": ...}` or `?text=...`.
async fn embed_text(
    State(state): State<Arc<AppState>>,
    Query(query): Query<TextParams>,
    body: Bytes,
) -> Result<Json<EmbeddingResponse>, ApiError> {
    let from_body = if body.is_empty() {
        TextParams::default()
    } else {
        serde_json::from_slice::<TextParams>(&body)
            .map_err(|e| ServerError::Request(format!("invalid JSON body: {e}")))?
    };

    let non_empty = |t: &String| !t.is_empty();
    let text = from_body
        .text
        .filter(non_empty)
        .or_else(|| query.text.filter(non_empty))
        .ok_or_else(|| ServerError::Request(MISSING_TEXT.to_string()))?;

    tracing::debug!(chars = text.chars().count(), "Received text");
    let embedding = state.service.embed_text(text).await?;

    Ok(Json(EmbeddingResponse { embedding }))
}

/// Health check endpoint.
async fn health_check(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    let response = HealthResponse {
        status: "healthy".to_string(),
        version: env!("CARGO_PKG_VERSION").to_string(),
        model: state.service.model_name().to_string(),
        image_dim: state.service.image_dim(),
        text_dim: state.service.text_dim(),
    };

    tracing::debug!("Health check");

    (StatusCode::OK, Json(response))
}

/// Prometheus metrics endpoint.
async fn metrics(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    EMBEDDING_QUEUE_DEPTH.set(i64::try_from(state.service.queue_depth()).unwrap_or(i64::MAX));

    let encoder = TextEncoder::new();
    let metric_families = prometheus::gather();

    let mut buffer = Vec::new();
    match encoder.encode(&metric_families, &mut buffer) {
        Ok(()) => {
            tracing::trace!("Metrics encoded successfully");
            (
                StatusCode::OK,
                [(
                    axum::http::header::CONTENT_TYPE,
                    "text/plain; charset=utf-8",
                )],
                buffer,
            )
        }
        Err(e) => {
            tracing::error!(error = %e, "Failed to encode metrics");
            (
                StatusCode::INTERNAL_SERVER_ERROR,
                [(
                    axum::http::header::CONTENT_TYPE,
                    "text/plain; charset=utf-8",
                )],
                b"Failed to encode metrics".to_vec(),
            )
        }
    }
}

/// Status endpoint with runtime details.
async fn status(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    let uptime = Utc::now().signed_duration_since(state.started_at);

    Json(serde_json::json!({
        "version": env!("CARGO_PKG_VERSION"),
        "started_at": state.started_at.to_rfc3339(),
        "uptime_seconds": uptime.num_seconds(),
        "model": {
            "name": state.service.model_name(),
            "image_dim": state.service.image_dim(),
            "text_dim": state.service.text_dim(),
        },
        "workers": state.service.num_workers(),
        "queue_depth": state.service.queue_depth(),
    }))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::embeddings::{EmbeddingConfig, PlaceholderEmbedder};
    use axum::body::{to_bytes, Body};
    use axum::http::{header, Request};
    use tower::ServiceExt;

    const BOUNDARY: &str = "clip-embed-test-boundary";

    fn create_test_state() -> Arc<AppState> {
        let service = EmbeddingService::start(
            Arc::new(PlaceholderEmbedder::with_dims(16, 8)),
            EmbeddingConfig::default(),
        )
        .unwrap();
        Arc::new(AppState::new(service))
    }

    fn png_bytes() -> Vec<u8> {
        let img = image::DynamicImage::ImageRgb8(image::RgbImage::from_pixel(
            4,
            4,
            image::Rgb([10, 200, 30]),
        ));
        let mut buf = std::io::Cursor::new(Vec::new());
        img.write_to(&mut buf, image::ImageFormat::Png).unwrap();
        buf.into_inner()
    }

    fn multipart_body(field: &str, content: &[u8]) -> Vec<u8> {
        let mut body = Vec::new();
        body.extend_from_slice(format!("--{BOUNDARY}\r\n").as_bytes());
        body.extend_from_slice(
            format!(
                "Content-Disposition: form-data; name=\"{field}\"; filename=\"upload.png\"\r\n"
            )
            .as_bytes(),
        );
        body.extend_from_slice(b"Content-Type: application/octet-stream\r\n\r\n");
        body.extend_from_slice(content);
        body.extend_from_slice(format!("\r\n--{BOUNDARY}--\r\n").as_bytes());
        body
    }

    fn image_request(field: &str, content: &[u8]) -> Request<Body> {
        Request::builder()
            .method("POST")
            .uri("/embed_image/")
            .header(
                header::CONTENT_TYPE,
                format!("multipart/form-data; boundary={BOUNDARY}"),
            )
            .body(Body::from(multipart_body(field, content)))
            .unwrap()
    }

    fn text_request(uri: &str, body: &'static str) -> Request<Body> {
        Request::builder()
            .method("POST")
            .uri(uri)
            .header(header::CONTENT_TYPE, "application/json")
            .body(Body::from(body))
            .unwrap()
    }

    async fn json_body(response: Response) -> serde_json::Value {
        let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        serde_json::from_slice(&bytes).unwrap()
    }

    #[tokio::test]
    async fn test_health_check() {
        let app = create_rest_router(create_test_state());

        let response = app
            .oneshot(
                Request::builder()
                    .uri("/health")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::OK);
        let body = json_body(response).await;
        assert_eq!(body["model"], "placeholder");
        assert_eq!(body["image_dim"], 16);
        assert_eq!(body["text_dim"], 8);
    }

    #[tokio::test]
    async fn test_metrics() {
        let app = create_rest_router(create_test_state());

        let response = app
            .oneshot(
                Request::builder()
                    .uri("/metrics")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::OK);
    }

    #[tokio::test]
    async fn test_status() {
        let app = create_rest_router(create_test_state());

        let response = app
            .oneshot(
                Request::builder()
                    .uri("/api/v1/status")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::OK);
        let body = json_body(response).await;
        assert_eq!(body["workers"], 1);
        assert_eq!(body["queue_depth"], 0);
        assert!(body["started_at"].is_string());
    }

    #[tokio::test]
    async fn test_embed_text_json_body() {
        let app = create_rest_router(create_test_state());

        let response = app
            .oneshot(text_request("/embed_text/", r#"{"text": "a photo of a cat"}"#))
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::OK);
        let body = json_body(response).await;
        assert_eq!(body["embedding"].as_array().unwrap().len(), 8);
    }

    #[tokio::test]
    async fn test_embed_text_query_param() {
        let app = create_rest_router(create_test_state());

        let response = app
            .oneshot(
                Request::builder()
                    .method("POST")
                    .uri("/embed_text?text=a%20photo%20of%20a%20cat")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::OK);
        let body = json_body(response).await;
        assert_eq!(body["embedding"].as_array().unwrap().len(), 8);
    }

    #[tokio::test]
    async fn test_embed_text_query_and_body_agree() {
        let state = create_test_state();

        let from_body = create_rest_router(Arc::clone(&state))
            .oneshot(text_request("/embed_text/", r#"{"text": "same"}"#))
            .await
            .unwrap();
        let from_query = create_rest_router(state)
            .oneshot(text_request("/embed_text/?text=same", ""))
            .await
            .unwrap();

        assert_eq!(json_body(from_body).await, json_body(from_query).await);
    }

    #[tokio::test]
    async fn test_embed_text_empty_body_falls_back_to_query() {
        let state = create_test_state();

        let combined = create_rest_router(Arc::clone(&state))
            .oneshot(text_request("/embed_text/?text=cat", r#"{"text": ""}"#))
            .await
            .unwrap();
        assert_eq!(combined.status(), StatusCode::OK);

        let from_query = create_rest_router(state)
            .oneshot(text_request("/embed_text/?text=cat", ""))
            .await
            .unwrap();

        assert_eq!(json_body(combined).await, json_body(from_query).await);
    }

    #[tokio::test]
    async fn test_embed_text_empty_string() {
        let app = create_rest_router(create_test_state());

        let response = app
            .oneshot(text_request("/embed_text/", r#"{"text": ""}"#))
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
        let body = json_body(response).await;
        assert_eq!(body["error"], MISSING_TEXT);
    }

    #[tokio::test]
    async fn test_embed_text_missing() {
        let app = create_rest_router(create_test_state());

        let response = app
            .oneshot(text_request("/embed_text/", r#"{"prompt": "wrong key"}"#))
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn test_embed_text_invalid_json() {
        let app = create_rest_router(create_test_state());

        let response = app
            .oneshot(text_request("/embed_text/", "{not json"))
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
        let body = json_body(response).await;
        assert!(body["error"].as_str().unwrap().contains("invalid JSON"));
    }

    #[tokio::test]
    async fn test_embed_image() {
        let app = create_rest_router(create_test_state());

        let response = app
            .oneshot(image_request(IMAGE_FIELD, &png_bytes()))
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::OK);
        let body = json_body(response).await;
        assert_eq!(body["embedding"].as_array().unwrap().len(), 16);
    }

    #[tokio::test]
    async fn test_embed_image_not_an_image() {
        let app = create_rest_router(create_test_state());

        let response = app
            .oneshot(image_request(IMAGE_FIELD, b"this is text"))
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
        let body = json_body(response).await;
        assert!(body["error"].as_str().unwrap().contains("invalid image"));
    }

    #[tokio::test]
    async fn test_embed_image_missing_field() {
        let app = create_rest_router(create_test_state());

        let response = app
            .oneshot(image_request("picture", &png_bytes()))
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::UNPROCESSABLE_ENTITY);
    }

    #[tokio::test]
    async fn test_embed_image_not_multipart() {
        let app = create_rest_router(create_test_state());

        let response = app
            .oneshot(text_request("/embed_image/", r#"{"text": "x"}"#))
            .await
            .unwrap();

        assert!(response.status().is_client_error());
    }

    #[test]
    fn test_api_error_status_mapping() {
        let cases = [
            (
                ApiError::from(EmbeddingError::Decode("x".into())),
                StatusCode::BAD_REQUEST,
            ),
            (
                ApiError::from(EmbeddingError::Runtime("x".into())),
                StatusCode::INTERNAL_SERVER_ERROR,
            ),
            (
                ApiError::from(EmbeddingError::Tokenization("x".into())),
                StatusCode::INTERNAL_SERVER_ERROR,
            ),
            (
                ApiError::from(EmbeddingError::Busy { capacity: 1 }),
                StatusCode::SERVICE_UNAVAILABLE,
            ),
            (
                ApiError::from(ServerError::MissingField(IMAGE_FIELD)),
                StatusCode::UNPROCESSABLE_ENTITY,
            ),
        ];

        for (err, expected) in cases {
            assert_eq!(err.status, expected, "{}", err.message);
        }
    }
}
