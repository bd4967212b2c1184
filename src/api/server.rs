//! HTTP server implementation for the API

use anyhow::Result;
use axum::{
    extract::{
        ws::{Message, WebSocket},
        Path, Query, State, WebSocketUpgrade,
    },
    http::{header, Method, StatusCode},
    response::{IntoResponse, Json},
    routing::{get, post},
    Router,
};
use std::sync::Arc;
use tower::ServiceBuilder;
use tower_http::{
    cors::{Any, CorsLayer},
    trace::TraceLayer,
};
use tracing::{info, warn};

use super::models::{
    ApiResponse, CancelJobRequest, ContentListQuery, CreateJobRequest, DeleteQuery, JobListQuery,
    ReprocessRequest,
};
use crate::content::{ContentManager, ContentUpdate};
use crate::error::IngestError;
use crate::job::{JobFilter, JobManager};

/// Shared application state
#[derive(Clone)]
pub struct AppState {
    pub jobs: Arc<JobManager>,
    pub content: Arc<ContentManager>,
}

/// Configure and start the HTTP server
pub async fn start_http_server(
    jobs: Arc<JobManager>,
    content: Arc<ContentManager>,
    port: u16,
) -> Result<()> {
    let app_state = AppState { jobs, content };

    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods([Method::GET, Method::POST, Method::PATCH, Method::DELETE])
        .allow_headers([header::CONTENT_TYPE, header::AUTHORIZATION]);

    let app = Router::new()
        .route("/health", get(health_handler))
        .route("/api/jobs", post(create_job_handler).get(list_jobs_handler))
        .route("/api/jobs/stats", get(job_stats_handler))
        .route("/api/jobs/:id", get(get_job_handler))
        .route("/api/jobs/:id/retry", post(retry_job_handler))
        .route("/api/jobs/:id/cancel", post(cancel_job_handler))
        .route("/api/jobs/:id/ws", get(job_ws_handler))
        .route("/api/content", get(list_content_handler))
        .route(
            "/api/content/:id",
            get(get_content_handler)
                .patch(update_content_handler)
                .delete(delete_content_handler),
        )
        .route("/api/content/:id/reprocess", post(reprocess_handler))
        .with_state(app_state)
        .layer(
            ServiceBuilder::new()
                .layer(TraceLayer::new_for_http())
                .layer(cors),
        );

    let listener = tokio::net::TcpListener::bind(format!("0.0.0.0:{}", port)).await?;
    info!("🌐 API server listening on http://0.0.0.0:{}", port);

    axum::serve(listener, app).await?;
    Ok(())
}

fn error_status(e: &IngestError) -> StatusCode {
    match e {
        IngestError::JobNotFound(_) | IngestError::ContentNotFound(_) => StatusCode::NOT_FOUND,
        IngestError::Validation(_) | IngestError::RetryRejected { .. } => StatusCode::BAD_REQUEST,
        IngestError::JobTerminal(_) => StatusCode::CONFLICT,
        IngestError::SourceUnavailable(_) => StatusCode::GONE,
        _ => StatusCode::INTERNAL_SERVER_ERROR,
    }
}

fn respond<T: serde::Serialize>(result: Result<T, IngestError>) -> axum::response::Response {
    match result {
        Ok(data) => (StatusCode::OK, Json(ApiResponse::success(data))).into_response(),
        Err(e) => (
            error_status(&e),
            Json(ApiResponse::<T>::error(e.to_string())),
        )
            .into_response(),
    }
}

async fn health_handler() -> impl IntoResponse {
    Json(serde_json::json!({
        "status": "healthy",
        "service": "vidscribe",
        "version": env!("CARGO_PKG_VERSION"),
    }))
}

async fn create_job_handler(
    State(state): State<AppState>,
    Json(request): Json<CreateJobRequest>,
) -> impl IntoResponse {
    respond(
        state
            .jobs
            .create(&request.source, request.kind, request.priority, request.high_value)
            .await,
    )
}

async fn get_job_handler(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> impl IntoResponse {
    respond(
        state
            .jobs
            .get(&id)
            .await
            .ok_or(IngestError::JobNotFound(id)),
    )
}

async fn list_jobs_handler(
    State(state): State<AppState>,
    Query(query): Query<JobListQuery>,
) -> impl IntoResponse {
    let filter = JobFilter {
        status: query.status,
        source_contains: query.source,
    };
    let jobs = state
        .jobs
        .list(&filter, query.limit.unwrap_or(50), query.offset.unwrap_or(0))
        .await;
    (StatusCode::OK, Json(ApiResponse::success(jobs)))
}

async fn job_stats_handler(State(state): State<AppState>) -> impl IntoResponse {
    (StatusCode::OK, Json(ApiResponse::success(state.jobs.stats().await)))
}

async fn retry_job_handler(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> impl IntoResponse {
    // Operator-initiated, so the manual ceiling applies
    respond(state.jobs.retry(&id, true).await)
}

async fn cancel_job_handler(
    State(state): State<AppState>,
    Path(id): Path<String>,
    request: Option<Json<CancelJobRequest>>,
) -> impl IntoResponse {
    let reason = request.and_then(|Json(r)| r.reason);
    respond(state.jobs.cancel(&id, reason).await)
}

async fn get_content_handler(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> impl IntoResponse {
    respond(state.content.get(&id).await)
}

async fn list_content_handler(
    State(state): State<AppState>,
    Query(query): Query<ContentListQuery>,
) -> impl IntoResponse {
    respond(state.content.list(query.include_deleted).await)
}

async fn update_content_handler(
    State(state): State<AppState>,
    Path(id): Path<String>,
    Json(update): Json<ContentUpdate>,
) -> impl IntoResponse {
    respond(state.content.update(&id, update).await)
}

async fn delete_content_handler(
    State(state): State<AppState>,
    Path(id): Path<String>,
    Query(query): Query<DeleteQuery>,
) -> axum::response::Response {
    if query.hard {
        respond(state.content.hard_delete(&id).await)
    } else {
        respond(state.content.soft_delete(&id).await)
    }
}

async fn reprocess_handler(
    State(state): State<AppState>,
    Path(id): Path<String>,
    request: Option<Json<ReprocessRequest>>,
) -> impl IntoResponse {
    let priority = request.map(|Json(r)| r.priority).unwrap_or(5);
    respond(state.content.reprocess(&id, &state.jobs, priority).await)
}

/// Per-job status stream: forwards every transition as JSON and closes the
/// socket once a terminal status has been sent.
async fn job_ws_handler(
    ws: WebSocketUpgrade,
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> impl IntoResponse {
    ws.on_upgrade(move |socket| job_status_stream(socket, state, id))
}

async fn job_status_stream(mut socket: WebSocket, state: AppState, job_id: String) {
    info!("🔌 WebSocket attached to job {}", job_id);

    // Current snapshot first so late subscribers see where the job stands
    match state.jobs.get(&job_id).await {
        Some(job) => {
            if send_json(&mut socket, &job).await.is_err() {
                return;
            }
            if job.status.is_terminal() {
                let _ = socket.send(Message::Close(None)).await;
                return;
            }
        }
        None => {
            let _ = send_json(
                &mut socket,
                &serde_json::json!({"error": format!("job {} not found", job_id)}),
            )
            .await;
            let _ = socket.send(Message::Close(None)).await;
            return;
        }
    }

    let mut subscription = state.jobs.subscribe(&job_id).await;
    loop {
        tokio::select! {
            event = subscription.recv() => {
                match event {
                    Some(event) => {
                        let terminal = event.status.is_terminal();
                        if send_json(&mut socket, &event).await.is_err() {
                            break;
                        }
                        if terminal {
                            let _ = socket.send(Message::Close(None)).await;
                            break;
                        }
                    }
                    None => {
                        let _ = socket.send(Message::Close(None)).await;
                        break;
                    }
                }
            }
            msg = socket.recv() => {
                match msg {
                    Some(Ok(Message::Text(text))) if text == "ping" => {
                        if socket.send(Message::Text("pong".to_string())).await.is_err() {
                            break;
                        }
                    }
                    Some(Ok(Message::Close(_))) | None => {
                        info!("🔌 WebSocket for job {} closed by client", job_id);
                        break;
                    }
                    Some(Err(e)) => {
                        warn!("WebSocket error on job {}: {}", job_id, e);
                        break;
                    }
                    _ => {}
                }
            }
        }
    }
}

async fn send_json<T: serde::Serialize>(socket: &mut WebSocket, value: &T) -> Result<()> {
    let text = serde_json::to_string(value)?;
    socket.send(Message::Text(text)).await?;
    Ok(())
}
