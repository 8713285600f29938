use std::sync::Arc;

use axum::{
    Router,
    body::Bytes,
    extract::{DefaultBodyLimit, Query, State},
    http::header,
    response::{IntoResponse, Response},
    routing::get,
};

use crate::{
    error::HttpError,
    gateway::Gateway,
    options::{Disposition, RenderQuery, RenderRequest},
};

#[derive(Clone)]
pub struct AppState {
    pub gateway: Arc<Gateway>,
}

pub fn router(state: AppState, max_body_bytes: usize) -> Router {
    Router::new()
        .route("/healthz", get(healthz))
        .route("/pdf", get(pdf_from_query).post(pdf_from_json))
        .layer(DefaultBodyLimit::max(max_body_bytes))
        .with_state(state)
}

async fn healthz() -> &'static str {
    "Pong"
}

pub async fn pdf_from_query(
    State(state): State<AppState>,
    Query(query): Query<RenderQuery>,
) -> Result<Response, HttpError> {
    render(state, query.into()).await
}

/// Parses the body as JSON whatever its content type; a body that does not
/// decode into a request is a 400 like any other invalid parameter.
pub async fn pdf_from_json(
    State(state): State<AppState>,
    body: Bytes,
) -> Result<Response, HttpError> {
    let payload: RenderRequest = serde_json::from_slice(&body)
        .map_err(|e| HttpError::BadRequest(anyhow::anyhow!("Invalid JSON body: {}", e)))?;

    render(state, payload).await
}

async fn render(state: AppState, request: RenderRequest) -> Result<Response, HttpError> {
    let job = request
        .normalize(state.gateway.defaults())
        .map_err(HttpError::bad_request)?;

    tracing::info!(
        filename = %job.filename,
        landscape = job.print.landscape,
        layout = ?job.print.layout,
        "Rendering PDF"
    );

    let html = job.html;
    let print = job.print;
    let gateway = Arc::clone(&state.gateway);

    // A detached task keeps rendering (and cleaning up) if the client hangs up.
    let pdf = tokio::spawn(async move { gateway.render(&html, &print).await }).await??;

    Ok(pdf_response(pdf, &job.filename, job.disposition))
}

fn pdf_response(pdf: Vec<u8>, filename: &str, disposition: Disposition) -> Response {
    let content_disposition = format!(
        "{}; filename=\"{}\"",
        disposition.as_str(),
        header_safe_filename(filename)
    );

    (
        [
            (header::CONTENT_TYPE, "application/pdf".to_string()),
            (header::CONTENT_DISPOSITION, content_disposition),
        ],
        pdf,
    )
        .into_response()
}

/// Keeps the filename inside a quoted header parameter.
fn header_safe_filename(filename: &str) -> String {
    filename
        .chars()
        .map(|c| match c {
            '"' | '\\' => '_',
            c if c.is_ascii_graphic() || c == ' ' => c,
            _ => '_',
        })
        .collect()
}
