// Triage Queue - Web Server
// REST API with Axum over the shared Reconciler

use axum::{
    extract::{rejection::JsonRejection, Path, State},
    http::StatusCode,
    response::{IntoResponse, Json, Response},
    routing::{delete, get, post},
    Router,
};
use serde::Serialize;
use std::sync::Arc;
use tower::ServiceBuilder;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;
use tracing::{error, info};
use tracing_subscriber::EnvFilter;
use triage_queue::{
    IntakeForm, QueueEntry, Reconciler, RefreshScheduler, TriageConfig, TriageError, VERSION,
};

/// Shared application state
#[derive(Clone)]
struct AppState {
    reconciler: Arc<Reconciler>,
}

/// API Response wrapper
#[derive(Serialize)]
struct ApiResponse<T> {
    success: bool,
    data: T,
    #[serde(skip_serializing_if = "Option::is_none")]
    error: Option<String>,
}

impl<T> ApiResponse<T> {
    fn ok(data: T) -> Self {
        Self {
            success: true,
            data,
            error: None,
        }
    }
}

/// Error → status code + envelope with `data: null`
struct ApiError {
    status: StatusCode,
    message: String,
}

impl From<TriageError> for ApiError {
    fn from(e: TriageError) -> Self {
        let status = match &e {
            TriageError::Validation(_) => StatusCode::BAD_REQUEST,
            TriageError::EmptyQueue => StatusCode::NOT_FOUND,
            TriageError::ExternalService(_) | TriageError::Http(_) => StatusCode::BAD_GATEWAY,
            TriageError::Config(_) => StatusCode::INTERNAL_SERVER_ERROR,
        };
        ApiError {
            status,
            message: e.to_string(),
        }
    }
}

impl From<JsonRejection> for ApiError {
    fn from(rejection: JsonRejection) -> Self {
        ApiError {
            status: StatusCode::BAD_REQUEST,
            message: rejection.body_text(),
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let body = ApiResponse {
            success: false,
            data: (),
            error: Some(self.message),
        };
        (self.status, Json(body)).into_response()
    }
}

/// Removal responses carry the queue that remains
#[derive(Serialize)]
struct RemovalResponse {
    removed: Option<QueueEntry>,
    queue: Vec<QueueEntry>,
}

#[derive(Serialize)]
struct ClearResponse {
    cleared: usize,
}

// ============================================================================
// API Handlers
// ============================================================================

/// POST /api/patients/vitals - Validate, score and enqueue a patient
async fn submit_vitals(
    State(state): State<AppState>,
    payload: Result<Json<IntakeForm>, JsonRejection>,
) -> Result<impl IntoResponse, ApiError> {
    let Json(form) = payload?;
    let outcome = state.reconciler.submit_vitals(&form).await?;
    Ok((StatusCode::CREATED, Json(ApiResponse::ok(outcome))))
}

/// GET /api/queue - Ordered queue
async fn get_queue(State(state): State<AppState>) -> impl IntoResponse {
    Json(ApiResponse::ok(state.reconciler.list_queue().await))
}

/// GET /api/queue/stats - Counts and wait summary
async fn get_stats(State(state): State<AppState>) -> impl IntoResponse {
    Json(ApiResponse::ok(state.reconciler.stats().await))
}

/// GET /api/queue/next - Who is next, without removing them
async fn peek_next(State(state): State<AppState>) -> Result<impl IntoResponse, ApiError> {
    let next = state.reconciler.peek_next().await.ok_or(TriageError::EmptyQueue)?;
    Ok(Json(ApiResponse::ok(next)))
}

/// DELETE /api/queue/next - Call the next patient
async fn call_next(State(state): State<AppState>) -> impl IntoResponse {
    let outcome = state.reconciler.call_next().await;
    Json(ApiResponse::ok(RemovalResponse {
        removed: outcome.patient,
        queue: outcome.remaining,
    }))
}

/// DELETE /api/queue/:id - Remove one patient (unknown ids are not an error)
async fn remove_patient(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> impl IntoResponse {
    let queue = state.reconciler.remove_entry(&id).await;
    Json(ApiResponse::ok(queue))
}

/// DELETE /api/queue - Clear everything
async fn clear_queue(State(state): State<AppState>) -> impl IntoResponse {
    let cleared = state.reconciler.clear_queue().await;
    Json(ApiResponse::ok(ClearResponse { cleared }))
}

/// GET /api/health - Liveness + authority reachability
async fn health_check(State(state): State<AppState>) -> impl IntoResponse {
    Json(ApiResponse::ok(state.reconciler.health().await))
}

fn build_router(state: AppState) -> Router {
    let api_routes = Router::new()
        .route("/health", get(health_check))
        .route("/patients/vitals", post(submit_vitals))
        .route("/queue", get(get_queue).delete(clear_queue))
        .route("/queue/stats", get(get_stats))
        .route("/queue/next", get(peek_next).delete(call_next))
        .route("/queue/:id", delete(remove_patient))
        .with_state(state);

    Router::new().nest("/api", api_routes).layer(
        ServiceBuilder::new()
            .layer(TraceLayer::new_for_http())
            .layer(CorsLayer::permissive()),
    )
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        error!(error = %e, "Failed to listen for Ctrl+C");
    }
    info!("Shutdown signal received");
}

// ============================================================================
// Main Server
// ============================================================================

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new("triage_queue=info,tower_http=info")),
        )
        .init();

    info!(version = VERSION, "🏥 Triage Queue - Web Server");

    let config = TriageConfig::from_env()?;
    let reconciler = Arc::new(Reconciler::from_config(&config)?);

    let scheduler = if reconciler.has_authority() {
        Some(RefreshScheduler::new(reconciler.clone(), config.refresh_interval).start())
    } else {
        None
    };

    let app = build_router(AppState {
        reconciler: reconciler.clone(),
    });

    let addr = config.bind_addr();
    let listener = tokio::net::TcpListener::bind(&addr).await?;
    info!(address = %addr, "🚀 Server running");

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    if let Some(handle) = scheduler {
        handle.stop().await;
    }
    info!("Server stopped");
    Ok(())
}

// ============================================================================
// Tests
// ============================================================================
