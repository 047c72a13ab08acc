// HTTP REST API Server Implementation
// JSON API for questions, forms and responses, mounted under a configurable prefix

use anyhow::{Context, Result};
use axum::{
    extract::{rejection::JsonRejection, Path, Query, State},
    http::StatusCode,
    response::Json,
    routing::{get, post},
    Router,
};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Instant;
use tokio::net::TcpListener;
use tower::ServiceBuilder;
use tower_http::{cors::CorsLayer, trace::TraceLayer};
use tracing::{error, info, warn};
use url::Url;

use crate::{
    contracts::FormStore,
    error::FormsError,
    http_types::MessageResponse,
    models::{
        CreateFormRequest, Form, FormResponse, NewQuestion, Question, ShareableLink,
        SubmitResponseRequest,
    },
    observability::get_metrics,
    services::FormsServices,
};

// Global server start time for uptime tracking
static SERVER_START_TIME: once_cell::sync::Lazy<Instant> = once_cell::sync::Lazy::new(Instant::now);

/// Application state shared across handlers
#[derive(Clone)]
pub struct AppState {
    services: FormsServices,
}

/// Health check response
#[derive(Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct HealthResponse {
    pub status: String,
    pub version: String,
    pub uptime_seconds: u64,
}

/// Query string of `GET /forms/search`
#[derive(Debug, Deserialize)]
pub struct SearchParams {
    pub query: Option<String>,
}

type ApiResult<T> = std::result::Result<T, FormsError>;

/// Unwrap a JSON body, turning unparseable input into a 400
fn json_body<T>(payload: std::result::Result<Json<T>, JsonRejection>) -> ApiResult<T> {
    match payload {
        Ok(Json(body)) => Ok(body),
        Err(rejection) => {
            warn!("Rejected request body: {}", rejection.body_text());
            Err(FormsError::invalid(rejection.body_text()))
        }
    }
}

/// Create the HTTP server with all routes
///
/// API routes live under `api_prefix` (pass `""` to mount them at the root).
/// `/health` and `/stats` are always served at the root.
pub fn create_server(store: Arc<dyn FormStore>, base_url: Url, api_prefix: &str) -> Router {
    let state = AppState {
        services: FormsServices::new(store, base_url),
    };

    let api = Router::new()
        .route("/questions", get(list_questions))
        .route("/questions/create", post(create_question))
        .route("/forms", get(list_forms))
        .route("/forms/create", post(create_form))
        .route("/forms/search", get(search_forms))
        .route("/forms/submit-response", post(submit_response))
        .route("/forms/shared/:token", get(get_form_by_share_token))
        .route("/forms/:id", get(get_form).delete(delete_form))
        .route("/forms/:id/duplicate", post(duplicate_form))
        .route("/forms/:id/shareable-url", get(get_form_shareable_url))
        .route("/forms/:id/responses", get(list_responses))
        .route("/responses/submit-response", post(submit_response))
        .route("/responses/:form_id/responses", get(list_responses))
        .route(
            "/responses/:form_id/response/:token/shareable-url",
            get(rotate_response_token).post(rotate_response_token),
        )
        .route(
            "/responses/:form_id/response/:token",
            get(get_response_by_token),
        )
        .with_state(state);

    let root = Router::new()
        .route("/health", get(health_check))
        .route("/stats", get(get_stats));

    let app = if api_prefix.is_empty() {
        root.merge(api)
    } else {
        root.nest(api_prefix, api)
    };

    app.layer(
        ServiceBuilder::new()
            .layer(TraceLayer::new_for_http())
            .layer(CorsLayer::permissive()),
    )
}

/// Port suggested when `port` is taken
fn alternative_port(port: u16) -> u16 {
    port.checked_add(1).unwrap_or(port - 1)
}

/// Start the HTTP server on the specified port and serve until a shutdown signal.
/// The store is closed once in-flight requests have drained.
pub async fn start_server(
    store: Arc<dyn FormStore>,
    base_url: Url,
    api_prefix: &str,
    port: u16,
) -> Result<()> {
    let app = create_server(store.clone(), base_url, api_prefix);

    let listener = match TcpListener::bind(&format!("0.0.0.0:{port}")).await {
        Ok(listener) => listener,
        Err(e) => {
            error!("Failed to start server on port {}: {}", port, e);
            if e.kind() == std::io::ErrorKind::AddrInUse {
                error!(
                    "Port {} is already in use. Try --port {}",
                    port,
                    alternative_port(port)
                );
            }
            return Err(e).context(format!(
                "Failed to bind to port {}. Port may be in use or insufficient permissions",
                port
            ));
        }
    };

    info!("Formbase HTTP server listening on port {}", port);
    info!("API routes mounted at '{}'", if api_prefix.is_empty() { "/" } else { api_prefix });

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("HTTP server terminated unexpectedly")?;

    info!("HTTP server stopped, closing store");
    store.close().await
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            error!("Failed to install Ctrl+C handler: {}", e);
            std::future::pending::<()>().await;
        }
        info!("Received Ctrl+C, shutting down");
    };

    #[cfg(unix)]
    let terminate = async {
        use tokio::signal::unix::{signal, SignalKind};
        match signal(SignalKind::terminate()) {
            Ok(mut stream) => {
                stream.recv().await;
                info!("Received terminate signal, shutting down");
            }
            Err(e) => {
                error!("Failed to install SIGTERM handler: {}", e);
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }
}

/// Health check endpoint
async fn health_check() -> Json<HealthResponse> {
    let uptime_seconds = SERVER_START_TIME.elapsed().as_secs();

    Json(HealthResponse {
        status: "healthy".to_string(),
        version: env!("CARGO_PKG_VERSION").to_string(),
        uptime_seconds,
    })
}

/// Operation counters collected by the store tracing layer
async fn get_stats() -> Json<serde_json::Value> {
    Json(get_metrics())
}

async fn create_question(
    State(state): State<AppState>,
    payload: std::result::Result<Json<NewQuestion>, JsonRejection>,
) -> ApiResult<(StatusCode, Json<Question>)> {
    let request = json_body(payload)?;
    let question = state.services.questions.create_question(request).await?;
    Ok((StatusCode::CREATED, Json(question)))
}

async fn list_questions(State(state): State<AppState>) -> ApiResult<Json<Vec<Question>>> {
    Ok(Json(state.services.questions.list_questions().await?))
}

async fn create_form(
    State(state): State<AppState>,
    payload: std::result::Result<Json<CreateFormRequest>, JsonRejection>,
) -> ApiResult<(StatusCode, Json<Form>)> {
    let request = json_body(payload)?;
    let form = state.services.forms.create_form(request).await?;
    Ok((StatusCode::CREATED, Json(form)))
}

async fn list_forms(State(state): State<AppState>) -> ApiResult<Json<Vec<Form>>> {
    Ok(Json(state.services.forms.list_forms().await?))
}

async fn search_forms(
    State(state): State<AppState>,
    Query(params): Query<SearchParams>,
) -> ApiResult<Json<Vec<Form>>> {
    let forms = state
        .services
        .forms
        .search_forms(params.query.as_deref())
        .await?;
    Ok(Json(forms))
}

async fn get_form(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> ApiResult<Json<Form>> {
    Ok(Json(state.services.forms.get_form_by_id(&id).await?))
}

async fn delete_form(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> ApiResult<Json<MessageResponse>> {
    let deletion = state.services.forms.delete_form(&id).await?;
    Ok(Json(MessageResponse {
        message: "Form deleted successfully".to_string(),
        deleted_responses: Some(deletion.deleted_responses),
    }))
}

async fn duplicate_form(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> ApiResult<(StatusCode, Json<Form>)> {
    let copy = state.services.forms.duplicate_form(&id).await?;
    Ok((StatusCode::CREATED, Json(copy)))
}

async fn get_form_shareable_url(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> ApiResult<Json<ShareableLink>> {
    Ok(Json(state.services.forms.get_shareable_url(&id).await?))
}

async fn get_form_by_share_token(
    State(state): State<AppState>,
    Path(token): Path<String>,
) -> ApiResult<Json<Form>> {
    Ok(Json(state.services.forms.get_form_by_share_token(&token).await?))
}

async fn submit_response(
    State(state): State<AppState>,
    payload: std::result::Result<Json<SubmitResponseRequest>, JsonRejection>,
) -> ApiResult<(StatusCode, Json<FormResponse>)> {
    let request = json_body(payload)?;
    let response = state.services.responses.submit_response(request).await?;
    Ok((StatusCode::CREATED, Json(response)))
}

async fn list_responses(
    State(state): State<AppState>,
    Path(form_id): Path<String>,
) -> ApiResult<Json<Vec<FormResponse>>> {
    Ok(Json(
        state
            .services
            .responses
            .get_responses_by_form_id(&form_id)
            .await?,
    ))
}

async fn rotate_response_token(
    State(state): State<AppState>,
    Path((form_id, token)): Path<(String, String)>,
) -> ApiResult<Json<ShareableLink>> {
    Ok(Json(
        state
            .services
            .responses
            .rotate_share_token(&form_id, &token)
            .await?,
    ))
}

async fn get_response_by_token(
    State(state): State<AppState>,
    Path((form_id, token)): Path<(String, String)>,
) -> ApiResult<Json<FormResponse>> {
    Ok(Json(
        state
            .services
            .responses
            .get_response_by_token(&form_id, &token)
            .await?,
    ))
}
