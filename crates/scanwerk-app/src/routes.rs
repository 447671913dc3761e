// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// HTTP routes.
//
// Handlers never touch hardware: scans go through the job queue and the
// client polls `/is_busy/{device}` for the partial to show next. Device ids
// may contain `/`, so device routes capture the rest of the path.

use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Json, Router};
use scanwerk_core::error::ScanwerkError;
use scanwerk_core::human_errors::{HumanError, humanize_error};
use scanwerk_core::types::ScanRequest;
use scanwerk_scan::{ScanService, Submission};
use serde_json::json;
use tower_http::trace::TraceLayer;
use tracing::{info, warn};

use crate::views::{self, View};

pub fn create_app(service: ScanService) -> Router {
    Router::new()
        .route("/", get(index))
        .route("/scanners/refresh", post(refresh_scanners))
        .route("/scanners/status", get(scanners_status))
        .route("/scanner/{*device}", get(scanner_page))
        .route("/is_busy/{*device}", get(is_busy))
        .route("/scan", post(scan))
        .route("/scan_backside/{*device}", post(scan_backside))
        .route("/done/{*device}", post(done))
        .layer(TraceLayer::new_for_http())
        .with_state(service)
}

// -- Errors ------------------------------------------------------------------

/// Error response carrying the humanized message.
#[derive(Debug)]
pub struct ApiError {
    status: StatusCode,
    error: HumanError,
}

impl ApiError {
    fn status_for(err: &ScanwerkError) -> StatusCode {
        match err {
            ScanwerkError::UnknownDevice(_) => StatusCode::NOT_FOUND,
            ScanwerkError::InvalidRequest(_) | ScanwerkError::InvalidOption(_) => {
                StatusCode::BAD_REQUEST
            }
            ScanwerkError::NoPendingFrontside(_) | ScanwerkError::DeviceBusy(_) => {
                StatusCode::CONFLICT
            }
            ScanwerkError::DeviceUnavailable(_)
            | ScanwerkError::BackendUnavailable
            | ScanwerkError::QueueClosed => StatusCode::SERVICE_UNAVAILABLE,
            _ => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl From<ScanwerkError> for ApiError {
    fn from(err: ScanwerkError) -> Self {
        Self {
            status: Self::status_for(&err),
            error: humanize_error(&err),
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let body = Json(json!({
            "error": self.error,
            "status": self.status.as_u16(),
        }));
        (self.status, body).into_response()
    }
}

type ApiResult = Result<Response, ApiError>;

fn respond(status: StatusCode, view: View) -> ApiResult {
    Ok((status, Json(view)).into_response())
}

/// A rejected request re-renders the device's current partial with the
/// humanized message attached. Only when that view is unavailable too does
/// the client get a bare error.
fn fall_back(service: &ScanService, device: &str, err: ScanwerkError) -> ApiResult {
    warn!(device, %err, "request rejected");
    let status = ApiError::status_for(&err);
    match views::device_view(service, device, Some(humanize_error(&err))) {
        Ok(view) => respond(status, view),
        Err(_) => Err(err.into()),
    }
}

fn submitted(device: &str, submission: Submission) -> ApiResult {
    match submission {
        Submission::Accepted { job, state } => {
            info!(device, %job, "scan accepted");
            respond(StatusCode::ACCEPTED, View::scanning(device, state))
        }
        Submission::Busy { state } => respond(StatusCode::CONFLICT, View::scanning(device, state)),
    }
}

// -- Handlers ----------------------------------------------------------------

async fn index(State(service): State<ScanService>) -> Json<View> {
    Json(views::index_view(&service))
}

async fn refresh_scanners(State(service): State<ScanService>) -> ApiResult {
    if service.refresh_registry() {
        info!("scanner refresh started");
    }
    respond(StatusCode::ACCEPTED, View::Updating)
}

async fn scanners_status(State(service): State<ScanService>) -> Json<View> {
    if service.is_refreshing() {
        Json(View::Updating)
    } else {
        Json(views::index_view(&service))
    }
}

async fn scanner_page(State(service): State<ScanService>, Path(device): Path<String>) -> ApiResult {
    let view = views::device_page(&service, &device)?;
    respond(StatusCode::OK, view)
}

async fn is_busy(State(service): State<ScanService>, Path(device): Path<String>) -> ApiResult {
    let view = views::device_view(&service, &device, None)?;
    respond(StatusCode::OK, view)
}

async fn scan(State(service): State<ScanService>, Json(request): Json<ScanRequest>) -> ApiResult {
    let device = request.device.clone();
    match service.submit_scan(request) {
        Ok(submission) => submitted(&device, submission),
        Err(err) => fall_back(&service, &device, err),
    }
}

async fn scan_backside(State(service): State<ScanService>, Path(device): Path<String>) -> ApiResult {
    match service.submit_backside_scan(&device) {
        Ok(submission) => submitted(&device, submission),
        Err(err) => fall_back(&service, &device, err),
    }
}

async fn done(State(service): State<ScanService>, Path(device): Path<String>) -> ApiResult {
    if let Err(err) = service.mark_done(&device) {
        return fall_back(&service, &device, err);
    }
    let view = views::device_view(&service, &device, None)?;
    respond(StatusCode::OK, view)
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;
    use std::time::Duration;

    use axum::body::Body;
    use axum::http::Request;
    use scanwerk_core::ScanConfig;
    use scanwerk_driver::{Feed, SimulatedBackend, SimulatedDevice};
    use serde_json::Value;
    use tower::ServiceExt;

    use super::*;

    const DEVICE: &str = "net:lab/duplex-1";

    async fn service(scan_dir: &std::path::Path) -> ScanService {
        service_with_page_delay(scan_dir, Duration::ZERO).await
    }

    async fn service_with_page_delay(scan_dir: &std::path::Path, delay: Duration) -> ScanService {
        let device = SimulatedDevice::new(DEVICE)
            .with_model("Acme", "Duplex One")
            .with_default_feed(Feed::pages(&[(40, 50), (40, 50)]));
        let config = ScanConfig {
            scan_dir: scan_dir.to_path_buf(),
            preferred_resolution: 75,
            ..ScanConfig::default()
        };
        let backend = SimulatedBackend::new(vec![device]).with_page_delay(delay);
        let service = ScanService::start(config, Arc::new(backend));
        service.refresh_registry_now().await.expect("initial refresh");
        service
    }

    async fn call(app: &Router, method: &str, uri: &str, body: Option<Value>) -> (StatusCode, Value) {
        let request = Request::builder().method(method).uri(uri);
        let request = match body {
            Some(body) => request
                .header("content-type", "application/json")
                .body(Body::from(body.to_string())),
            None => request.body(Body::empty()),
        }
        .expect("request");

        let response = app.clone().oneshot(request).await.expect("response");
        let status = response.status();
        let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .expect("body");
        let json = serde_json::from_slice(&bytes).expect("json body");
        (status, json)
    }

    async fn wait_for_view(app: &Router, view: &str) -> Value {
        for _ in 0..1000 {
            let (_, body) = call(app, "GET", &format!("/is_busy/{DEVICE}"), None).await;
            if body["view"] == view {
                return body;
            }
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
        panic!("device never reached {view}");
    }

    fn scan_body(filename: &str) -> Value {
        json!({
            "scanner": DEVICE,
            "resolution": 75,
            "source": "ADF",
            "mode": "Gray",
            "filename": filename,
        })
    }

    #[tokio::test]
    async fn index_lists_registered_scanners() {
        let dir = tempfile::tempdir().expect("tempdir");
        let app = create_app(service(dir.path()).await);

        let (status, body) = call(&app, "GET", "/", None).await;

        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["view"], "index");
        assert_eq!(body["devices"][0]["id"], DEVICE);
        assert_eq!(body["devices"][0]["label"], "Acme Duplex One");
    }

    #[tokio::test]
    async fn device_page_preselects_offered_preferences() {
        let dir = tempfile::tempdir().expect("tempdir");
        let app = create_app(service(dir.path()).await);

        let (status, body) = call(&app, "GET", &format!("/scanner/{DEVICE}"), None).await;

        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["view"], "device");
        assert_eq!(body["form"]["source"], "ADF");
        assert_eq!(body["form"]["mode"], "Gray");
        assert_eq!(body["form"]["resolution"], 75);
        assert_eq!(body["state"]["busy"], false);
    }

    #[tokio::test]
    async fn unknown_device_is_not_found() {
        let dir = tempfile::tempdir().expect("tempdir");
        let app = create_app(service(dir.path()).await);

        let (status, body) = call(&app, "GET", "/scanner/nope:0", None).await;

        assert_eq!(status, StatusCode::NOT_FOUND);
        assert_eq!(body["status"], 404);
        assert!(body["error"]["message"].is_string());
    }

    #[tokio::test]
    async fn duplex_flow_over_http() {
        let dir = tempfile::tempdir().expect("tempdir");
        let app = create_app(service(dir.path()).await);

        let (status, body) = call(&app, "POST", "/scan", Some(scan_body("letter"))).await;
        assert_eq!(status, StatusCode::ACCEPTED);
        assert_eq!(body["view"], "scanning");

        let pending = wait_for_view(&app, "scan_backside").await;
        assert_eq!(pending["pending_frontside"], "letter.pdf");

        let (status, _) = call(&app, "POST", &format!("/scan_backside/{DEVICE}"), None).await;
        assert_eq!(status, StatusCode::ACCEPTED);

        let options = wait_for_view(&app, "scan_options").await;
        assert!(options["notice"].is_null());
        assert_eq!(options["state"]["has_pending_frontside"], false);

        let merged = scanwerk_document::PdfReader::open(dir.path().join("letter.pdf"))
            .expect("merged document");
        assert_eq!(merged.page_count(), 4);
    }

    #[tokio::test]
    async fn invalid_scan_falls_back_to_the_form_with_a_notice() {
        let dir = tempfile::tempdir().expect("tempdir");
        let app = create_app(service(dir.path()).await);

        let mut body = scan_body("bad");
        body["resolution"] = json!(0);
        let (status, body) = call(&app, "POST", "/scan", Some(body)).await;

        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body["view"], "scan_options");
        assert!(body["notice"]["message"].is_string());
    }

    #[tokio::test]
    async fn backside_without_frontside_is_refused() {
        let dir = tempfile::tempdir().expect("tempdir");
        let app = create_app(service(dir.path()).await);

        let (status, body) = call(&app, "POST", &format!("/scan_backside/{DEVICE}"), None).await;

        assert_eq!(status, StatusCode::CONFLICT);
        assert_eq!(body["view"], "scan_options");
        assert!(body["notice"].is_object());
    }

    #[tokio::test]
    async fn done_returns_to_the_scan_form() {
        let dir = tempfile::tempdir().expect("tempdir");
        let app = create_app(service(dir.path()).await);

        call(&app, "POST", "/scan", Some(scan_body("single"))).await;
        wait_for_view(&app, "scan_backside").await;

        let (status, body) = call(&app, "POST", &format!("/done/{DEVICE}"), None).await;

        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["view"], "scan_options");
        assert!(dir.path().join("single.pdf").exists());
    }

    #[tokio::test]
    async fn done_during_backside_scan_shows_the_scanning_view() {
        let dir = tempfile::tempdir().expect("tempdir");
        let app = create_app(service_with_page_delay(dir.path(), Duration::from_millis(50)).await);

        call(&app, "POST", "/scan", Some(scan_body("pair"))).await;
        wait_for_view(&app, "scan_backside").await;
        let (status, _) = call(&app, "POST", &format!("/scan_backside/{DEVICE}"), None).await;
        assert_eq!(status, StatusCode::ACCEPTED);

        let (status, body) = call(&app, "POST", &format!("/done/{DEVICE}"), None).await;

        assert_eq!(status, StatusCode::CONFLICT);
        assert_eq!(body["view"], "scanning");

        let options = wait_for_view(&app, "scan_options").await;
        assert_eq!(options["state"]["has_pending_frontside"], false);
        let merged = scanwerk_document::PdfReader::open(dir.path().join("pair.pdf"))
            .expect("merged document");
        assert_eq!(merged.page_count(), 4);
    }

    #[tokio::test]
    async fn refresh_reports_updating_then_the_list() {
        let dir = tempfile::tempdir().expect("tempdir");
        let app = create_app(service(dir.path()).await);

        let (status, body) = call(&app, "POST", "/scanners/refresh", None).await;
        assert_eq!(status, StatusCode::ACCEPTED);
        assert_eq!(body["view"], "updating");

        for _ in 0..1000 {
            let (_, body) = call(&app, "GET", "/scanners/status", None).await;
            if body["view"] == "index" {
                assert_eq!(body["devices"][0]["id"], DEVICE);
                return;
            }
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
        panic!("refresh never finished");
    }
}
