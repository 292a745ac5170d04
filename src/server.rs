//! HTTP surface: `POST /scrape` runs one extraction, `GET /_health` reports
//! liveness plus a browser check.

use std::sync::Arc;

use axum::{
    Json, Router,
    body::Bytes,
    extract::State,
    http::{HeaderMap, StatusCode},
    response::{IntoResponse, Response},
    routing::{get, post},
};
use chrono::Utc;
use serde::Deserialize;
use serde_json::{Value, json};
use tower_http::{cors::CorsLayer, trace::TraceLayer};
use tracing::{error, info, warn};

use crate::browser::SessionProvider;
use crate::config::ExtractionSettings;
use crate::error::ExtractionError;
use crate::extract::scripts;
use crate::models::ExtractionReport;
use crate::orchestrator::{self, DEFAULT_MAX_VIDEOS, ExtractionRequest, normalize_handle};
use crate::security::{API_KEY_HEADER, verify_api_key};

#[derive(Clone)]
pub struct AppState {
    pub provider: Arc<dyn SessionProvider>,
    pub settings: Arc<ExtractionSettings>,
    pub api_key: Option<Arc<str>>,
}

#[derive(Debug)]
pub struct ApiError {
    pub status: StatusCode,
    pub message: String,
    pub details: Option<Value>,
}

impl ApiError {
    fn new(status: StatusCode, message: impl Into<String>) -> Self {
        Self {
            status,
            message: message.into(),
            details: None,
        }
    }

    fn with_details(mut self, details: Value) -> Self {
        self.details = Some(details);
        self
    }

    fn bad_request(message: impl Into<String>) -> Self {
        Self::new(StatusCode::BAD_REQUEST, message)
    }

    fn internal(message: impl Into<String>) -> Self {
        Self::new(StatusCode::INTERNAL_SERVER_ERROR, message)
    }
}

impl From<ExtractionError> for ApiError {
    fn from(err: ExtractionError) -> Self {
        match err {
            ExtractionError::UpstreamLoadTimeout { url, timeout } => {
                Self::new(StatusCode::BAD_GATEWAY, "Failed to load YouTube page").with_details(
                    json!({"url": url, "timeout": format!("{}s", timeout.as_secs())}),
                )
            }
            ExtractionError::ChannelNotFound { channel_handle } => {
                Self::new(StatusCode::NOT_FOUND, "Channel not found or is unavailable")
                    .with_details(json!({"channel_handle": channel_handle}))
            }
            ExtractionError::NoVideosFound {
                channel_handle,
                channel_id,
            } => Self::new(StatusCode::NOT_FOUND, "No videos found for channel").with_details(
                json!({
                    "channel_handle": channel_handle,
                    "channel_id": channel_id,
                    "possible_reasons": [
                        "Channel has no public videos",
                        "Channel's videos tab is unavailable",
                        "YouTube layout changed",
                    ],
                }),
            ),
            ExtractionError::SessionUnavailable(err) => {
                Self::new(StatusCode::SERVICE_UNAVAILABLE, "Browser session unavailable")
                    .with_details(json!({"error": err.to_string()}))
            }
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        if self.status.is_server_error() {
            error!(status = self.status.as_u16(), message = %self.message, details = ?self.details, "request failed");
        } else {
            warn!(status = self.status.as_u16(), message = %self.message, details = ?self.details, "request rejected");
        }
        let mut error = json!({
            "message": self.message,
            "status_code": self.status.as_u16(),
            "type": self.status.canonical_reason().unwrap_or("Error"),
        });
        if let Some(details) = self.details {
            error["details"] = details;
        }
        (self.status, Json(json!({ "error": error }))).into_response()
    }
}

type ApiResult<T> = Result<T, ApiError>;

pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/scrape", post(scrape))
        .route("/_health", get(health))
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive())
        .with_state(state)
}

#[derive(Debug, Deserialize)]
struct ScrapeBody {
    channel_handle: Option<String>,
    max_videos: Option<usize>,
    #[serde(default)]
    include_about: bool,
}

/// Validates the body by hand so every rejection uses the error envelope.
fn parse_scrape_body(body: &[u8]) -> ApiResult<ExtractionRequest> {
    if body.iter().all(u8::is_ascii_whitespace) {
        return Err(ApiError::bad_request("Missing JSON payload"));
    }
    let payload: Value = serde_json::from_slice(body)
        .map_err(|_| ApiError::bad_request("Invalid JSON in request body"))?;
    let is_empty = match &payload {
        Value::Null => true,
        Value::Object(map) => map.is_empty(),
        _ => false,
    };
    if is_empty {
        return Err(ApiError::bad_request("Missing JSON payload"));
    }

    let body: ScrapeBody = serde_json::from_value(payload)
        .map_err(|err| ApiError::bad_request(format!("Invalid request body: {err}")))?;
    let Some(raw_handle) = body.channel_handle else {
        return Err(
            ApiError::bad_request("channel_handle is required in request body")
                .with_details(json!({"required_fields": ["channel_handle"]})),
        );
    };
    let channel_handle = normalize_handle(&raw_handle)
        .ok_or_else(|| ApiError::bad_request("channel_handle must not be empty"))?;

    Ok(ExtractionRequest {
        channel_handle,
        max_videos: body.max_videos.unwrap_or(DEFAULT_MAX_VIDEOS),
        include_about: body.include_about,
    })
}

pub async fn scrape(
    State(state): State<AppState>,
    headers: HeaderMap,
    body: Bytes,
) -> ApiResult<Json<ExtractionReport>> {
    let provided = headers
        .get(API_KEY_HEADER)
        .and_then(|value| value.to_str().ok());
    if !verify_api_key(provided, state.api_key.as_deref()) {
        return Err(ApiError::new(StatusCode::UNAUTHORIZED, "Invalid API key"));
    }

    let request = parse_scrape_body(&body)?;

    // The session is released even if this handler future is dropped.
    let provider = Arc::clone(&state.provider);
    let settings = Arc::clone(&state.settings);
    let channel_handle = request.channel_handle.clone();
    let job = tokio::spawn(async move {
        let mut session = provider.acquire().await.map_err(|err| {
            error!(error = %err, "could not acquire browser session");
            ExtractionError::SessionUnavailable(err)
        })?;
        let outcome = orchestrator::extract(session.as_mut(), &request, &settings).await;
        provider.release(session).await;
        outcome
    });
    let outcome = job.await.map_err(|err| {
        error!(error = %err, "extraction task failed");
        ApiError::internal("Extraction task failed")
    })?;

    let report = outcome?;
    info!(
        channel = %channel_handle,
        videos = report.videos.len(),
        "scrape finished"
    );
    Ok(Json(report))
}

pub async fn health(State(state): State<AppState>) -> Json<Value> {
    let browser = match check_browser(state.provider.as_ref()).await {
        Ok(()) => "operational".to_string(),
        Err(err) => format!("error: {err}"),
    };
    Json(json!({
        "status": "pass",
        "version": env!("CARGO_PKG_VERSION"),
        "timestamp": Utc::now().to_rfc3339(),
        "system": {
            "os": std::env::consts::OS,
            "arch": std::env::consts::ARCH,
        },
        "browser": browser,
    }))
}

async fn check_browser(provider: &dyn SessionProvider) -> Result<(), crate::browser::BrowserError> {
    let mut session = provider.acquire().await?;
    let result = session.run_script(scripts::USER_AGENT).await;
    provider.release(session).await;
    result.map(|_| ())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::browser::fake::{FakePage, FakeProvider};
    use crate::browser::{BrowserError, PageSession};
    use async_trait::async_trait;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;

    /// Hands out fixture pages and counts every acquire and release.
    #[derive(Default)]
    struct CountingProvider {
        page: FakePage,
        acquired: AtomicUsize,
        released: AtomicUsize,
    }

    #[async_trait]
    impl SessionProvider for CountingProvider {
        async fn acquire(&self) -> Result<Box<dyn PageSession>, BrowserError> {
            self.acquired.fetch_add(1, Ordering::SeqCst);
            Ok(Box::new(self.page.clone()))
        }

        async fn release(&self, mut session: Box<dyn PageSession>) {
            let _ = session.close().await;
            self.released.fetch_add(1, Ordering::SeqCst);
        }
    }

    fn state_with(page: FakePage, unavailable: bool) -> AppState {
        AppState {
            provider: Arc::new(FakeProvider { page, unavailable }),
            settings: Arc::new(ExtractionSettings::immediate()),
            api_key: Some(Arc::from("test-key")),
        }
    }

    fn keyed_headers() -> HeaderMap {
        let mut headers = HeaderMap::new();
        headers.insert(API_KEY_HEADER, "test-key".parse().unwrap());
        headers
    }

    async fn call(state: AppState, headers: HeaderMap, body: &str) -> ApiResult<ExtractionReport> {
        scrape(State(state), headers, Bytes::from(body.to_string()))
            .await
            .map(|Json(report)| report)
    }

    #[tokio::test]
    async fn scrape_returns_report() {
        let state = state_with(FakePage::channel_with_entries(3), false);
        let report = call(
            state,
            keyed_headers(),
            r#"{"channel_handle": "FixtureChannel", "max_videos": 2}"#,
        )
        .await
        .unwrap();
        assert_eq!(report.videos.len(), 2);
        assert_eq!(
            report.channel.channel_id.as_deref(),
            Some("UCfixture0000000000000001")
        );
        let json = serde_json::to_value(&report).unwrap();
        assert!(json["metadata"]["failed_videos_details"].is_null());
    }

    #[tokio::test]
    async fn scrape_rejects_bad_key() {
        let state = state_with(FakePage::channel_with_entries(1), false);
        let mut headers = HeaderMap::new();
        headers.insert(API_KEY_HEADER, "wrong".parse().unwrap());
        let err = call(state.clone(), headers, r#"{"channel_handle": "@x"}"#)
            .await
            .unwrap_err();
        assert_eq!(err.status, StatusCode::UNAUTHORIZED);

        let err = call(state, HeaderMap::new(), r#"{"channel_handle": "@x"}"#)
            .await
            .unwrap_err();
        assert_eq!(err.status, StatusCode::UNAUTHORIZED);
    }

    #[tokio::test]
    async fn scrape_rejects_everything_without_configured_key() {
        let mut state = state_with(FakePage::channel_with_entries(1), false);
        state.api_key = None;
        let err = call(state, keyed_headers(), r#"{"channel_handle": "@x"}"#)
            .await
            .unwrap_err();
        assert_eq!(err.status, StatusCode::UNAUTHORIZED);
    }

    #[tokio::test]
    async fn scrape_validates_body() {
        let state = state_with(FakePage::channel_with_entries(1), false);

        let err = call(state.clone(), keyed_headers(), "").await.unwrap_err();
        assert_eq!(err.status, StatusCode::BAD_REQUEST);
        assert_eq!(err.message, "Missing JSON payload");

        let err = call(state.clone(), keyed_headers(), "{not json").await.unwrap_err();
        assert_eq!(err.message, "Invalid JSON in request body");

        let err = call(state.clone(), keyed_headers(), r#"{"max_videos": 3}"#)
            .await
            .unwrap_err();
        assert_eq!(err.status, StatusCode::BAD_REQUEST);
        assert_eq!(
            err.details,
            Some(json!({"required_fields": ["channel_handle"]}))
        );

        let err = call(state, keyed_headers(), r#"{"channel_handle": "  "}"#)
            .await
            .unwrap_err();
        assert_eq!(err.status, StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn scrape_maps_outcomes_to_statuses() {
        let mut page = FakePage::channel_with_entries(1);
        page.ready = false;
        let err = call(state_with(page, false), keyed_headers(), r#"{"channel_handle": "@x"}"#)
            .await
            .unwrap_err();
        assert_eq!(err.status, StatusCode::BAD_GATEWAY);
        assert_eq!(err.details.unwrap()["url"], "https://youtube.com/@x/videos");

        let mut page = FakePage::channel_with_entries(1);
        page.initial_data = Some(json!({"metadata": {}}));
        let err = call(state_with(page, false), keyed_headers(), r#"{"channel_handle": "@x"}"#)
            .await
            .unwrap_err();
        assert_eq!(err.status, StatusCode::NOT_FOUND);
        assert_eq!(err.details, Some(json!({"channel_handle": "@x"})));

        let page = FakePage::channel_with_entries(0);
        let err = call(state_with(page, false), keyed_headers(), r#"{"channel_handle": "@x"}"#)
            .await
            .unwrap_err();
        assert_eq!(err.status, StatusCode::NOT_FOUND);
        let details = err.details.unwrap();
        assert_eq!(details["channel_id"], "UCfixture0000000000000001");
        assert_eq!(details["possible_reasons"].as_array().unwrap().len(), 3);

        let err = call(
            state_with(FakePage::channel_with_entries(1), true),
            keyed_headers(),
            r#"{"channel_handle": "@x"}"#,
        )
        .await
        .unwrap_err();
        assert_eq!(err.status, StatusCode::SERVICE_UNAVAILABLE);
    }

    #[tokio::test]
    async fn session_is_released_when_the_client_goes_away() {
        let mut page = FakePage::channel_with_entries(50);
        page.visible_initially = 0;
        page.per_scroll = 1;
        let provider = Arc::new(CountingProvider {
            page,
            ..CountingProvider::default()
        });
        let state = AppState {
            provider: provider.clone(),
            settings: Arc::new(ExtractionSettings {
                scroll_pause: Duration::from_millis(20),
                ..ExtractionSettings::immediate()
            }),
            api_key: Some(Arc::from("test-key")),
        };

        let abandoned = tokio::time::timeout(
            Duration::from_millis(50),
            call(state, keyed_headers(), r#"{"channel_handle": "@x", "max_videos": 10}"#),
        )
        .await;
        assert!(abandoned.is_err());
        assert_eq!(provider.acquired.load(Ordering::SeqCst), 1);

        let deadline = tokio::time::Instant::now() + Duration::from_secs(5);
        while provider.released.load(Ordering::SeqCst) == 0 {
            assert!(tokio::time::Instant::now() < deadline, "session never released");
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        assert_eq!(
            provider.acquired.load(Ordering::SeqCst),
            provider.released.load(Ordering::SeqCst)
        );
    }

    #[tokio::test]
    async fn error_envelope_shape() {
        let response = ApiError::bad_request("nope")
            .with_details(json!({"k": 1}))
            .into_response();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
        let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap();
        let body: Value = serde_json::from_slice(&bytes).unwrap();
        assert_eq!(
            body,
            json!({"error": {
                "message": "nope",
                "status_code": 400,
                "type": "Bad Request",
                "details": {"k": 1}
            }})
        );
    }

    #[tokio::test]
    async fn health_reports_browser_state() {
        let Json(body) = health(State(state_with(FakePage::default(), false))).await;
        assert_eq!(body["status"], "pass");
        assert_eq!(body["browser"], "operational");
        assert_eq!(body["system"]["os"], std::env::consts::OS);

        let Json(body) = health(State(state_with(FakePage::default(), true))).await;
        assert_eq!(body["status"], "pass");
        assert!(body["browser"].as_str().unwrap().starts_with("error: "));
    }
}
