//! HTTP surface: the report form, live field validation, stored report previews and PDFs.

mod pages;

use std::net::SocketAddr;
use std::sync::{Arc, Mutex, PoisonError};

use anyhow::Context as _;
use axum::body::Bytes;
use axum::extract::{ConnectInfo, DefaultBodyLimit, Multipart, Path, State};
use axum::http::{header, HeaderMap, StatusCode};
use axum::response::{Html, IntoResponse, Redirect, Response};
use axum::routing::{get, post};
use axum::{Json, Router};
use serde::{Deserialize, Serialize};
use tokio::net::TcpListener;
use tower_http::trace::TraceLayer;

use consultation_report::report::resolve_client_address;
use consultation_report::{
    Config, ConsultationForm, Error as ReportError, Field, LogoUpload, RenderContext,
    RenderedReport, ReportService,
};

/// Shared handler state.
#[derive(Clone)]
pub struct AppState {
    service: Arc<Mutex<ReportService>>,
}

impl AppState {
    pub fn new(service: ReportService) -> Self {
        Self {
            service: Arc::new(Mutex::new(service)),
        }
    }

    /// Runs `f` against the service on the blocking pool.
    ///
    /// Storage and rendering are synchronous; the lock serialises access to the connection.
    async fn with_service<T, F>(&self, f: F) -> Result<T, tokio::task::JoinError>
    where
        F: FnOnce(&ReportService) -> T + Send + 'static,
        T: Send + 'static,
    {
        let service = Arc::clone(&self.service);
        tokio::task::spawn_blocking(move || {
            let guard = service.lock().unwrap_or_else(PoisonError::into_inner);
            f(&guard)
        })
        .await
    }
}

/// Builds the router with all routes and layers.
pub fn router(state: AppState, max_body_bytes: usize) -> Router {
    Router::new()
        .route("/", get(form_page).post(submit_form))
        .route("/validate/", post(validate_field))
        .route("/reports", get(list_reports))
        .route("/reports/:id", get(preview_report))
        .route("/reports/:id/pdf", get(download_report))
        .route("/health", get(|| async { "ok" }))
        .layer(DefaultBodyLimit::max(max_body_bytes))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

/// Serves until Ctrl-C.
pub async fn serve(config: &Config, service: ReportService) -> anyhow::Result<()> {
    let addr = config.server.bind_addr;
    let app = router(AppState::new(service), config.max_body_bytes());

    let listener = TcpListener::bind(addr)
        .await
        .with_context(|| format!("binding {addr}"))?;
    tracing::info!(addr = %addr, "Consultation report server listening");

    axum::serve(
        listener,
        app.into_make_service_with_connect_info::<SocketAddr>(),
    )
    .with_graceful_shutdown(shutdown_signal())
    .await
    .context("running HTTP server")?;

    tracing::info!("Server stopped");
    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!("Failed to listen for shutdown signal: {e}");
        std::future::pending::<()>().await;
    }
    tracing::info!("Shutdown requested");
}

fn client_address(headers: &HeaderMap, peer: Option<ConnectInfo<SocketAddr>>) -> String {
    let forwarded = headers
        .get("x-forwarded-for")
        .and_then(|value| value.to_str().ok());
    resolve_client_address(forwarded, peer.map(|ConnectInfo(addr)| addr.ip()))
}

fn internal_error(message: impl std::fmt::Display) -> Response {
    tracing::error!("{message}");
    (StatusCode::INTERNAL_SERVER_ERROR, "Internal server error").into_response()
}

fn pdf_response(rendered: RenderedReport) -> Response {
    (
        [
            (header::CONTENT_TYPE, "application/pdf".to_string()),
            (
                header::CONTENT_DISPOSITION,
                format!("attachment; filename=\"{}\"", rendered.filename),
            ),
        ],
        rendered.bytes,
    )
        .into_response()
}

// ---------------------------------------------------------------------------
// Handlers
// ---------------------------------------------------------------------------

async fn form_page() -> Html<String> {
    Html(pages::form_page(&ConsultationForm::default(), None, None))
}

async fn submit_form(
    peer: Option<ConnectInfo<SocketAddr>>,
    headers: HeaderMap,
    State(state): State<AppState>,
    multipart: Multipart,
) -> Response {
    let form = match read_form(multipart).await {
        Ok(form) => form,
        Err(e) => {
            tracing::warn!("Rejected malformed form upload: {e}");
            let page = pages::form_page(
                &ConsultationForm::default(),
                None,
                Some("The form could not be read. Please try again."),
            );
            return (StatusCode::BAD_REQUEST, Html(page)).into_response();
        }
    };

    let context = RenderContext::now(client_address(&headers, peer));
    let submitted = form.clone();
    let outcome = state
        .with_service(move |service| service.submit(&form, &context))
        .await;

    match outcome {
        Ok(Ok((report, rendered))) => {
            tracing::info!(id = report.id, file = %rendered.filename, "Report generated");
            pdf_response(rendered)
        }
        Ok(Err(ReportError::Validation(errors))) => {
            Html(pages::form_page(&submitted, Some(&errors), None)).into_response()
        }
        Ok(Err(err)) => {
            tracing::error!("Report generation failed: {err}");
            let banner = format!("Error generating PDF: {err}");
            let page = pages::form_page(&submitted, None, Some(&banner));
            (StatusCode::INTERNAL_SERVER_ERROR, Html(page)).into_response()
        }
        Err(join) => internal_error(format!("report task failed: {join}")),
    }
}

async fn read_form(
    mut multipart: Multipart,
) -> Result<ConsultationForm, axum::extract::multipart::MultipartError> {
    let mut form = ConsultationForm::default();

    while let Some(field) = multipart.next_field().await? {
        let name = field.name().unwrap_or("").to_string();
        if name == Field::ClinicLogo.name() {
            let filename = field.file_name().unwrap_or("").to_string();
            let content_type = field.content_type().map(str::to_string);
            let bytes = field.bytes().await?;
            // Browsers send an empty part when no file was chosen.
            if !filename.is_empty() || !bytes.is_empty() {
                form.clinic_logo = Some(LogoUpload::new(filename, content_type, bytes.to_vec()));
            }
        } else {
            let value = field.text().await?;
            if !form.set_value(&name, value) {
                tracing::debug!("Ignoring unknown form field {name:?}");
            }
        }
    }

    Ok(form)
}

#[derive(Debug, Deserialize)]
struct ValidateRequest {
    field: String,
    #[serde(default)]
    value: String,
}

#[derive(Debug, Serialize)]
struct ValidateResponse {
    valid: bool,
    errors: Vec<String>,
}

impl ValidateResponse {
    fn failed() -> Self {
        Self {
            valid: false,
            errors: vec!["Validation error occurred".to_string()],
        }
    }
}

async fn validate_field(State(state): State<AppState>, body: Bytes) -> Json<ValidateResponse> {
    let Ok(request) = serde_json::from_slice::<ValidateRequest>(&body) else {
        return Json(ValidateResponse::failed());
    };

    let outcome = state
        .with_service(move |service| service.validate_field(&request.field, &request.value))
        .await;

    match outcome {
        Ok(Some(errors)) => Json(ValidateResponse {
            valid: errors.is_empty(),
            errors,
        }),
        Ok(None) => Json(ValidateResponse {
            valid: true,
            errors: Vec::new(),
        }),
        Err(join) => {
            tracing::error!("validation task failed: {join}");
            Json(ValidateResponse::failed())
        }
    }
}

const LIST_LIMIT: usize = 50;

async fn list_reports(State(state): State<AppState>) -> Response {
    match state.with_service(|service| service.list(LIST_LIMIT)).await {
        Ok(Ok(reports)) => Html(pages::list_page(&reports)).into_response(),
        Ok(Err(err)) => internal_error(format!("listing reports failed: {err}")),
        Err(join) => internal_error(format!("list task failed: {join}")),
    }
}

async fn preview_report(State(state): State<AppState>, Path(id): Path<i64>) -> Response {
    match state.with_service(move |service| service.get(id)).await {
        Ok(Ok(report)) => Html(pages::preview_page(&report)).into_response(),
        Ok(Err(err)) if err.is_not_found() => Redirect::to("/").into_response(),
        Ok(Err(err)) => internal_error(format!("loading report {id} failed: {err}")),
        Err(join) => internal_error(format!("preview task failed: {join}")),
    }
}

async fn download_report(
    peer: Option<ConnectInfo<SocketAddr>>,
    headers: HeaderMap,
    State(state): State<AppState>,
    Path(id): Path<i64>,
) -> Response {
    let context = RenderContext::now(client_address(&headers, peer));
    let outcome = state
        .with_service(move |service| {
            let report = service.get(id)?;
            service.render(&report, &context)
        })
        .await;

    match outcome {
        Ok(Ok(rendered)) => pdf_response(rendered),
        Ok(Err(err)) if err.is_not_found() => {
            (StatusCode::NOT_FOUND, format!("Report {id} not found")).into_response()
        }
        Ok(Err(err)) => internal_error(format!("rendering report {id} failed: {err}")),
        Err(join) => internal_error(format!("render task failed: {join}")),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::body::{to_bytes, Body};
    use axum::http::Request;
    use consultation_report::media::MediaStore;
    use consultation_report::storage::Storage;
    use consultation_report::{FormLimits, ReportDetails, ReportRenderer};
    use tower::ServiceExt;

    const BODY_LIMIT: usize = 1024 * 1024;

    fn details() -> ReportDetails {
        ReportDetails {
            clinic_name: "Harbour View Clinic".to_string(),
            physician_name: "Dr. Amara Okafor".to_string(),
            physician_contact: "a.okafor@harbourview.example".to_string(),
            patient_first_name: "Jonas".to_string(),
            patient_last_name: "Lindqvist".to_string(),
            patient_dob: chrono::NaiveDate::from_ymd_opt(1984, 3, 9).unwrap(),
            patient_contact: "+46701234567".to_string(),
            chief_complaint: "Dry cough.".to_string(),
            consultation_note: "Chest clear.".to_string(),
        }
    }

    /// Router over an in-memory database holding one report; returns its id.
    fn app(media_root: &std::path::Path) -> (Router, i64) {
        let storage = Storage::open_in_memory().unwrap();
        let id = storage.insert(&details(), None).unwrap().id;
        let media = MediaStore::new(media_root);
        let service = ReportService::new(
            storage,
            media.clone(),
            ReportRenderer::new(media),
            FormLimits::default(),
        );
        (router(AppState::new(service), BODY_LIMIT), id)
    }

    async fn body_text(response: Response) -> String {
        let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        String::from_utf8(bytes.to_vec()).unwrap()
    }

    fn validate_request(body: &str) -> Request<Body> {
        Request::post("/validate/")
            .header(header::CONTENT_TYPE, "application/json")
            .body(Body::from(body.to_string()))
            .unwrap()
    }

    #[tokio::test]
    async fn health_answers_ok() {
        let dir = tempfile::tempdir().unwrap();
        let (app, _) = app(dir.path());
        let response = app
            .oneshot(Request::get("/health").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(body_text(response).await, "ok");
    }

    #[tokio::test]
    async fn form_page_lists_every_field() {
        let dir = tempfile::tempdir().unwrap();
        let (app, _) = app(dir.path());
        let response = app
            .oneshot(Request::get("/").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        let html = body_text(response).await;
        assert!(html.contains("Consultation Report Generator"));
        for field in Field::ALL {
            assert!(html.contains(&format!("name=\"{}\"", field.name())), "{field}");
        }
    }

    #[tokio::test]
    async fn validate_reports_field_errors() {
        let dir = tempfile::tempdir().unwrap();
        let (app, _) = app(dir.path());

        let response = app
            .clone()
            .oneshot(validate_request(r#"{"field":"patient_contact","value":"555-1234567"}"#))
            .await
            .unwrap();
        assert_eq!(body_text(response).await, r#"{"valid":true,"errors":[]}"#);

        let response = app
            .oneshot(validate_request(r#"{"field":"clinic_name","value":"   "}"#))
            .await
            .unwrap();
        assert_eq!(
            body_text(response).await,
            r#"{"valid":false,"errors":["This field is required."]}"#
        );
    }

    #[tokio::test]
    async fn validate_rejects_malformed_requests() {
        let dir = tempfile::tempdir().unwrap();
        let (app, _) = app(dir.path());

        for body in ["not json", r#"{"value":"42"}"#] {
            let response = app.clone().oneshot(validate_request(body)).await.unwrap();
            assert_eq!(
                body_text(response).await,
                r#"{"valid":false,"errors":["Validation error occurred"]}"#
            );
        }
    }

    #[tokio::test]
    async fn validate_accepts_unknown_fields() {
        let dir = tempfile::tempdir().unwrap();
        let (app, _) = app(dir.path());
        let response = app
            .oneshot(validate_request(r#"{"field":"shoe_size","value":"42"}"#))
            .await
            .unwrap();
        assert_eq!(body_text(response).await, r#"{"valid":true,"errors":[]}"#);
    }

    const BOUNDARY: &str = "XBOUNDARYX";

    fn multipart_post(fields: &[(&str, &str)]) -> Request<Body> {
        let mut body = String::new();
        for (name, value) in fields {
            body.push_str(&format!(
                "--{BOUNDARY}\r\nContent-Disposition: form-data; name=\"{name}\"\r\n\r\n{value}\r\n"
            ));
        }
        body.push_str(&format!("--{BOUNDARY}--\r\n"));
        Request::post("/")
            .header(
                header::CONTENT_TYPE,
                format!("multipart/form-data; boundary={BOUNDARY}"),
            )
            .body(Body::from(body))
            .unwrap()
    }

    fn complete_form() -> Vec<(&'static str, &'static str)> {
        vec![
            ("clinic_name", "Harbour View Clinic"),
            ("physician_name", "Dr. Amara Okafor"),
            ("physician_contact", "a.okafor@harbourview.example"),
            ("patient_first_name", "Jonas"),
            ("patient_last_name", "Lindqvist"),
            ("patient_dob", "1984-03-09"),
            ("patient_contact", "+46701234567"),
            ("chief_complaint", "Dry cough."),
            ("consultation_note", "Chest clear."),
        ]
    }

    #[tokio::test]
    async fn valid_submission_downloads_pdf() {
        if !consultation_report::fonts::default_fonts_available() {
            eprintln!("Skipping valid_submission_downloads_pdf: no usable font family.");
            return;
        }
        let dir = tempfile::tempdir().unwrap();
        let (app, _) = app(dir.path());

        let response = app.oneshot(multipart_post(&complete_form())).await.unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(response.headers()[header::CONTENT_TYPE], "application/pdf");
        assert_eq!(
            response.headers()[header::CONTENT_DISPOSITION],
            "attachment; filename=\"CR_Lindqvist_Jonas_19840309.pdf\""
        );
        let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        assert!(bytes.starts_with(b"%PDF"));
    }

    #[tokio::test]
    async fn render_failure_returns_form_with_banner() {
        let dir = tempfile::tempdir().unwrap();
        let fonts_dir = dir.path().join("fonts");
        std::fs::create_dir_all(&fonts_dir).unwrap();
        for file in [
            "Roboto-Regular.ttf",
            "Roboto-Bold.ttf",
            "Roboto-Italic.ttf",
            "Roboto-BoldItalic.ttf",
        ] {
            std::fs::write(fonts_dir.join(file), b"not a font").unwrap();
        }
        let media = MediaStore::new(dir.path().join("media"));
        let service = ReportService::new(
            Storage::open_in_memory().unwrap(),
            media.clone(),
            ReportRenderer::new(media).with_fonts_dir(Some(fonts_dir)),
            FormLimits::default(),
        );
        let app = router(AppState::new(service), BODY_LIMIT);

        let response = app
            .clone()
            .oneshot(multipart_post(&complete_form()))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
        let html = body_text(response).await;
        assert!(html.contains("Error generating PDF: "));
        assert!(html.contains("value=\"Harbour View Clinic\""));

        let response = app
            .oneshot(Request::get("/reports").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert!(body_text(response).await.contains("Jonas Lindqvist"));
    }

    #[tokio::test]
    async fn invalid_submission_rerenders_form_with_errors() {
        let dir = tempfile::tempdir().unwrap();
        let (app, _) = app(dir.path());

        let boundary = "XBOUNDARYX";
        let body = format!(
            "--{b}\r\nContent-Disposition: form-data; name=\"clinic_name\"\r\n\r\nNorth <Clinic>\r\n\
             --{b}\r\nContent-Disposition: form-data; name=\"patient_dob\"\r\n\r\nyesterday\r\n\
             --{b}\r\nContent-Disposition: form-data; name=\"clinic_logo\"; filename=\"\"\r\n\
             Content-Type: application/octet-stream\r\n\r\n\r\n--{b}--\r\n",
            b = boundary
        );
        let request = Request::post("/")
            .header(
                header::CONTENT_TYPE,
                format!("multipart/form-data; boundary={boundary}"),
            )
            .body(Body::from(body))
            .unwrap();

        let response = app.oneshot(request).await.unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        let html = body_text(response).await;
        assert!(html.contains("This field is required."));
        assert!(html.contains("Enter a valid date."));
        assert!(html.contains("North &lt;Clinic&gt;"));
    }

    #[tokio::test]
    async fn preview_shows_stored_report() {
        let dir = tempfile::tempdir().unwrap();
        let (app, id) = app(dir.path());
        let response = app
            .oneshot(
                Request::get(format!("/reports/{id}"))
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        let html = body_text(response).await;
        assert!(html.contains("Jonas Lindqvist"));
        assert!(html.contains("March 09, 1984"));
    }

    #[tokio::test]
    async fn preview_of_unknown_report_redirects_home() {
        let dir = tempfile::tempdir().unwrap();
        let (app, _) = app(dir.path());
        let response = app
            .oneshot(Request::get("/reports/999").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::SEE_OTHER);
        assert_eq!(response.headers()[header::LOCATION], "/");
    }

    #[tokio::test]
    async fn pdf_of_unknown_report_is_not_found() {
        let dir = tempfile::tempdir().unwrap();
        let (app, _) = app(dir.path());
        let response = app
            .oneshot(Request::get("/reports/999/pdf").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn list_links_stored_reports() {
        let dir = tempfile::tempdir().unwrap();
        let (app, id) = app(dir.path());
        let response = app
            .oneshot(Request::get("/reports").body(Body::empty()).unwrap())
            .await
            .unwrap();
        let html = body_text(response).await;
        assert!(html.contains(&format!("href=\"/reports/{id}\"")));
    }

    #[test]
    fn client_address_prefers_forwarded_header() {
        let mut headers = HeaderMap::new();
        let peer = Some(ConnectInfo(SocketAddr::from(([10, 0, 0, 1], 5000))));
        assert_eq!(client_address(&headers, peer), "10.0.0.1");

        headers.insert("x-forwarded-for", "198.51.100.7, 10.0.0.1".parse().unwrap());
        assert_eq!(client_address(&headers, peer), "198.51.100.7");
        assert_eq!(client_address(&HeaderMap::new(), None), "Unknown");
    }
}
