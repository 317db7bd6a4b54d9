use axum::{
    extract::{Path, State},
    http::{header, HeaderMap, HeaderValue, StatusCode},
    response::{Html, IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use bytes::Bytes;
use include_dir::{include_dir, Dir};
use serde_json::{json, Value};
use std::sync::Arc;

use crate::{
    backend::BuilderClient,
    models::{GenerateRequest, GenerationOutcome, PreviewInfo, ProgressSnapshot},
    orchestrator::GenerationError,
    pdf::generate_source_pdf,
    preview::{build_preview_document, sandbox_csp, SANDBOX_TOKENS},
    session::{PublishedPreview, Session, SubmitError},
};

static STATIC_DIR: Dir<'_> = include_dir!("$CARGO_MANIFEST_DIR/static");

#[derive(Clone)]
pub struct AppState {
    pub session: Arc<Session<BuilderClient>>,
    pub asset_base: Arc<str>,
}

pub struct ApiError(StatusCode, String);

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        (self.0, Json(json!({ "error": self.1 }))).into_response()
    }
}

impl From<SubmitError> for ApiError {
    fn from(err: SubmitError) -> Self {
        let status = match &err {
            SubmitError::Superseded { .. } => StatusCode::CONFLICT,
            SubmitError::Generation(GenerationError::Validation { .. }) => StatusCode::UNPROCESSABLE_ENTITY,
            SubmitError::Generation(_) => StatusCode::BAD_GATEWAY,
        };
        ApiError(status, err.to_string())
    }
}

fn no_preview() -> ApiError {
    ApiError(StatusCode::NOT_FOUND, "No preview available yet".into())
}

pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/", get(index))
        .route("/api/generate", post(generate))
        .route("/api/progress", get(progress))
        .route("/api/preview", get(preview_info))
        .route("/api/preview/source", get(preview_source))
        .route("/api/preview/download", get(preview_download))
        .route("/api/preview/pdf", get(preview_pdf))
        .route("/api/backend/state", get(backend_state))
        .route("/preview/:token", get(preview_document))
        .with_state(state)
}

pub async fn index(State(state): State<AppState>) -> Response {
    let Some(page) = STATIC_DIR.get_file("index.html").and_then(|f| f.contents_utf8()) else {
        return StatusCode::NOT_FOUND.into_response();
    };
    let limits = state.session.orchestrator().limits();
    Html(
        page.replace("{{MIN_CHARS}}", &limits.min_chars.to_string())
            .replace("{{MAX_CHARS}}", &limits.max_chars.to_string())
            .replace("{{SANDBOX}}", SANDBOX_TOKENS),
    )
    .into_response()
}

pub async fn generate(
    State(state): State<AppState>,
    Json(body): Json<GenerateRequest>,
) -> Result<Json<GenerationOutcome>, ApiError> {
    tracing::info!("🚀 Generation requested: {}", truncate(&body.prompt, 80));
    let outcome = state.session.submit(&body.prompt).await.map_err(|e| {
        tracing::warn!("❌ Generation did not complete: {}", e);
        ApiError::from(e)
    })?;
    Ok(Json(outcome))
}

pub async fn progress(State(state): State<AppState>) -> Json<ProgressSnapshot> {
    Json(state.session.progress())
}

pub async fn preview_info(State(state): State<AppState>) -> Json<PreviewInfo> {
    let current = state.session.preview();
    Json(PreviewInfo {
        available: current.is_some(),
        render_token: state.session.render_token(),
        generation_id: current.map(|p| p.generation_id),
    })
}

fn render(state: &AppState) -> Result<(PublishedPreview, String), ApiError> {
    let preview = state.session.preview().ok_or_else(no_preview)?;
    let document = build_preview_document(Some(&preview.bundle), &state.asset_base).ok_or_else(no_preview)?;
    Ok((preview, document))
}

pub async fn preview_document(Path(token): Path<u64>, State(state): State<AppState>) -> Result<Response, ApiError> {
    let (preview, document) = render(&state)?;
    if preview.render_token != token {
        return Err(ApiError(StatusCode::GONE, "Preview has been replaced".into()));
    }

    let mut headers = HeaderMap::new();
    headers.insert(header::CONTENT_TYPE, HeaderValue::from_static("text/html; charset=utf-8"));
    headers.insert(header::CACHE_CONTROL, HeaderValue::from_static("no-store"));
    headers.insert(header::X_CONTENT_TYPE_OPTIONS, HeaderValue::from_static("nosniff"));
    if let Ok(csp) = HeaderValue::from_str(&sandbox_csp()) {
        headers.insert(header::CONTENT_SECURITY_POLICY, csp);
    }
    Ok((StatusCode::OK, headers, document).into_response())
}

pub async fn preview_source(State(state): State<AppState>) -> Result<Response, ApiError> {
    let (_, document) = render(&state)?;
    Ok(([(header::CONTENT_TYPE, "text/plain; charset=utf-8")], document).into_response())
}

pub async fn preview_download(State(state): State<AppState>) -> Result<Response, ApiError> {
    let (preview, document) = render(&state)?;
    let disposition = format!("attachment; filename=\"website_{}.html\"", preview.id);
    Ok((
        [
            (header::CONTENT_TYPE, "text/html; charset=utf-8".to_string()),
            (header::CONTENT_DISPOSITION, disposition),
        ],
        document,
    )
        .into_response())
}

pub async fn preview_pdf(State(state): State<AppState>) -> Result<Response, ApiError> {
    let preview = state.session.preview().ok_or_else(no_preview)?;
    let pdf_bytes = generate_source_pdf(&preview.prompt, &preview.bundle).map_err(|e| {
        tracing::error!("❌ {}", e);
        ApiError(StatusCode::INTERNAL_SERVER_ERROR, e.to_string())
    })?;
    let disposition = format!("attachment; filename=\"website_{}.pdf\"", preview.id);
    Ok((
        [
            (header::CONTENT_TYPE, "application/pdf".to_string()),
            (header::CONTENT_DISPOSITION, disposition),
        ],
        Bytes::from(pdf_bytes),
    )
        .into_response())
}

pub async fn backend_state(State(state): State<AppState>) -> Result<Json<Value>, ApiError> {
    state
        .session
        .orchestrator()
        .backend()
        .generation_state()
        .await
        .map(Json)
        .map_err(|e| ApiError(StatusCode::BAD_GATEWAY, e.to_string()))
}

fn truncate(s: &str, max: usize) -> String {
    match s.char_indices().nth(max) {
        Some((idx, _)) => format!("{}…", &s[..idx]),
        None => s.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::orchestrator::{Orchestrator, PromptLimits};
    use axum::body::{to_bytes, Body};
    use axum::http::Request;
    use pretty_assertions::assert_eq;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use tower::ServiceExt;

    /// Fake generation backend: the fourth call of each run returns the site.
    async fn spawn_backend() -> String {
        let calls = Arc::new(AtomicUsize::new(0));
        let app = Router::new()
            .route("/api/reset-generation/", post(|| async { StatusCode::OK }))
            .route(
                "/api/process-prompt/",
                post(move |Json(body): Json<Value>| {
                    let n = calls.fetch_add(1, Ordering::SeqCst) % 4;
                    async move {
                        let prompt = body["prompt"].as_str().unwrap_or_default().to_string();
                        if prompt.contains("forbidden") {
                            return Json(json!({"errors": ["Content not allowed"]}));
                        }
                        if n < 3 {
                            return Json(json!({"warnings": [format!("step {n}")]}));
                        }
                        Json(json!({
                            "html": r#"<h1>Hi</h1><img src="/images/logo.png">"#,
                            "css": "h1{color:red}",
                            "js": "console.log('hi')",
                        }))
                    }
                }),
            );
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move { axum::serve(listener, app).await.unwrap() });
        format!("http://{addr}/api/")
    }

    async fn app() -> Router {
        let client = BuilderClient::new(spawn_backend().await, None).unwrap();
        router(AppState {
            session: Arc::new(Session::new(Orchestrator::new(client, PromptLimits::default()))),
            asset_base: Arc::from("http://assets.test/"),
        })
    }

    async fn call(app: &Router, method: &str, uri: &str, body: Option<Value>) -> (StatusCode, HeaderMap, Bytes) {
        let request = Request::builder().method(method).uri(uri);
        let request = match body {
            Some(body) => request
                .header(header::CONTENT_TYPE, "application/json")
                .body(Body::from(body.to_string())),
            None => request.body(Body::empty()),
        }
        .unwrap();
        let response = app.clone().oneshot(request).await.unwrap();
        let status = response.status();
        let headers = response.headers().clone();
        let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        (status, headers, bytes)
    }

    #[tokio::test]
    async fn generate_then_serve_sandboxed_preview() {
        let app = app().await;

        let (status, _, body) =
            call(&app, "POST", "/api/generate", Some(json!({"prompt": "A homepage for a cat cafe"}))).await;
        assert_eq!(status, StatusCode::OK);
        let outcome: Value = serde_json::from_slice(&body).unwrap();
        assert_eq!(outcome["warnings"], json!(["step 0", "step 1", "step 2"]));

        let (_, _, body) = call(&app, "GET", "/api/preview", None).await;
        let info: Value = serde_json::from_slice(&body).unwrap();
        assert_eq!(info["available"], json!(true));
        assert_eq!(info["render_token"], json!(1));

        let (status, headers, body) = call(&app, "GET", "/preview/1", None).await;
        assert_eq!(status, StatusCode::OK);
        let csp = headers[header::CONTENT_SECURITY_POLICY].to_str().unwrap();
        assert!(csp.starts_with("sandbox") && !csp.contains("allow-same-origin"));
        let doc = String::from_utf8(body.to_vec()).unwrap();
        assert!(doc.contains(r#"src="http://assets.test/images/logo.png""#));
        assert!(doc.contains("<style>h1{color:red}</style>"));

        let (status, _, _) = call(&app, "GET", "/preview/7", None).await;
        assert_eq!(status, StatusCode::GONE);

        let (_, _, body) = call(&app, "GET", "/api/progress", None).await;
        let progress: Value = serde_json::from_slice(&body).unwrap();
        assert_eq!(progress["state"], json!("succeeded"));
        assert_eq!(progress["percent"], json!(100));
    }

    #[tokio::test]
    async fn exports_are_available_after_generation() {
        let app = app().await;
        let (status, _, _) = call(&app, "GET", "/api/preview/source", None).await;
        assert_eq!(status, StatusCode::NOT_FOUND);

        call(&app, "POST", "/api/generate", Some(json!({"prompt": "A portfolio for a painter"}))).await;

        let (status, headers, body) = call(&app, "GET", "/api/preview/source", None).await;
        assert_eq!(status, StatusCode::OK);
        assert!(headers[header::CONTENT_TYPE].to_str().unwrap().starts_with("text/plain"));
        assert!(String::from_utf8_lossy(&body).starts_with("<!DOCTYPE html>"));

        let (status, headers, _) = call(&app, "GET", "/api/preview/download", None).await;
        assert_eq!(status, StatusCode::OK);
        assert!(headers[header::CONTENT_DISPOSITION].to_str().unwrap().contains(".html"));

        let (status, _, body) = call(&app, "GET", "/api/preview/pdf", None).await;
        assert_eq!(status, StatusCode::OK);
        assert!(body.starts_with(b"%PDF"));
    }

    #[tokio::test]
    async fn errors_map_to_status_codes() {
        let app = app().await;

        let (status, _, body) = call(&app, "POST", "/api/generate", Some(json!({"prompt": "short"}))).await;
        assert_eq!(status, StatusCode::UNPROCESSABLE_ENTITY);
        assert!(serde_json::from_slice::<Value>(&body).unwrap()["error"].is_string());

        let (status, _, body) =
            call(&app, "POST", "/api/generate", Some(json!({"prompt": "something forbidden please"}))).await;
        assert_eq!(status, StatusCode::BAD_GATEWAY);
        assert_eq!(serde_json::from_slice::<Value>(&body).unwrap()["error"], json!("Content not allowed"));
    }

    #[tokio::test]
    async fn index_embeds_limits_and_sandbox() {
        let app = app().await;
        let (status, _, body) = call(&app, "GET", "/", None).await;
        assert_eq!(status, StatusCode::OK);
        let page = String::from_utf8(body.to_vec()).unwrap();
        assert!(page.contains("const MIN = 10, MAX = 1000"));
        assert!(page.contains("[...text].length"));
        assert!(page.contains(SANDBOX_TOKENS));
        assert!(!page.contains("{{"));
    }

    #[tokio::test]
    async fn new_tab_opens_the_sandboxed_preview_route() {
        let app = app().await;
        let (_, _, body) = call(&app, "GET", "/", None).await;
        let page = String::from_utf8(body.to_vec()).unwrap();
        assert!(page.contains(r#"window.open("/preview/" + info.render_token"#));
        assert!(!page.contains("data:"));

        call(&app, "POST", "/api/generate", Some(json!({"prompt": "A landing page for a gym"}))).await;
        let (status, headers, _) = call(&app, "GET", "/preview/1", None).await;
        assert_eq!(status, StatusCode::OK);
        assert!(headers.contains_key(header::CONTENT_SECURITY_POLICY));

        let (status, _, _) = call(&app, "GET", "/api/preview/data-url", None).await;
        assert_eq!(status, StatusCode::NOT_FOUND);
    }
}
