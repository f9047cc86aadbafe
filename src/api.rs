//! REST surface over the [`Dispatcher`].

use std::sync::Arc;

use axum::extract::{Path, Query, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post, put};
use axum::{Json, Router};
use serde::Deserialize;
use tower_http::cors::{Any, CorsLayer};
use tracing::error;

use crate::classify::model::{Classification, RawClassification};
use crate::dispatch::job::{CustomerInfo, JobId, JobStatus, PriorityTier};
use crate::dispatch::technician::TechnicianId;
use crate::dispatch::Dispatcher;
use crate::error::{DispatchError, Error};

/// Default number of jobs returned by `GET /api/queue`.
const DEFAULT_QUEUE_PEEK: usize = 10;

type AppState = Arc<Dispatcher>;

/// Build the dispatch router.
pub fn dispatch_routes(dispatcher: Arc<Dispatcher>) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    Router::new()
        .route("/health", get(health))
        .route("/api/jobs", post(submit_job).get(list_jobs))
        .route("/api/jobs/{id}", get(get_job))
        .route("/api/jobs/{id}/start", post(start_job))
        .route("/api/jobs/{id}/cancel", post(cancel_job))
        .route("/api/technicians", get(list_technicians))
        .route("/api/technicians/{id}/complete", post(complete_job))
        .route("/api/technicians/{id}/location", put(update_location))
        .route("/api/dispatch", post(run_dispatch))
        .route("/api/queue", get(peek_queue))
        .route("/api/summary", get(summary))
        .route("/api/report", get(report))
        .layer(cors)
        .with_state(dispatcher)
}

// ── Errors ──────────────────────────────────────────────────────────────

struct ApiError {
    status: StatusCode,
    message: String,
}

impl ApiError {
    fn bad_request(message: impl Into<String>) -> Self {
        Self {
            status: StatusCode::BAD_REQUEST,
            message: message.into(),
        }
    }
}

impl From<Error> for ApiError {
    fn from(e: Error) -> Self {
        let status = match &e {
            Error::Dispatch(d) => match d {
                DispatchError::JobNotFound { .. } | DispatchError::TechnicianNotFound { .. } => {
                    StatusCode::NOT_FOUND
                }
                DispatchError::IllegalTransition { .. }
                | DispatchError::TechnicianUnavailable { .. }
                | DispatchError::NoActiveJob { .. } => StatusCode::CONFLICT,
                DispatchError::InvalidClassification { .. } => StatusCode::UNPROCESSABLE_ENTITY,
                DispatchError::Empty | DispatchError::InvariantViolation(_) => {
                    StatusCode::INTERNAL_SERVER_ERROR
                }
            },
            _ => StatusCode::INTERNAL_SERVER_ERROR,
        };
        if status == StatusCode::INTERNAL_SERVER_ERROR {
            error!(error = %e, "Request failed");
        }
        Self {
            status,
            message: e.to_string(),
        }
    }
}

impl From<DispatchError> for ApiError {
    fn from(e: DispatchError) -> Self {
        Error::from(e).into()
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        (
            self.status,
            Json(serde_json::json!({ "error": self.message })),
        )
            .into_response()
    }
}

type ApiResult<T> = Result<T, ApiError>;

// ── Health ──────────────────────────────────────────────────────────────

async fn health() -> impl IntoResponse {
    Json(serde_json::json!({
        "status": "ok",
        "service": "plumb-dispatch"
    }))
}

// ── Jobs ────────────────────────────────────────────────────────────────

#[derive(Debug, Deserialize)]
struct SubmitJobRequest {
    description: String,
    #[serde(default)]
    customer_name: Option<String>,
    #[serde(default)]
    phone_number: Option<String>,
    #[serde(default)]
    address: Option<String>,
    /// Pre-classified issue; the oracle is skipped when present.
    #[serde(default)]
    classification: Option<RawClassification>,
}

async fn submit_job(
    State(dispatcher): State<AppState>,
    Json(req): Json<SubmitJobRequest>,
) -> ApiResult<impl IntoResponse> {
    if req.description.trim().is_empty() {
        return Err(ApiError::bad_request("description must not be empty"));
    }

    let customer = CustomerInfo {
        name: req.customer_name,
        phone: req.phone_number,
        address: req.address,
    };

    let job = match req.classification {
        Some(raw) => {
            let classification = Classification::try_from(raw)?;
            dispatcher
                .submit_classified(customer, &req.description, classification)
                .await?
        }
        None => dispatcher.submit(customer, &req.description).await?,
    };

    Ok((StatusCode::CREATED, Json(job)))
}

#[derive(Debug, Default, Deserialize)]
struct JobFilter {
    status: Option<String>,
    priority: Option<String>,
}

async fn list_jobs(
    State(dispatcher): State<AppState>,
    Query(filter): Query<JobFilter>,
) -> ApiResult<impl IntoResponse> {
    let status = filter
        .status
        .as_deref()
        .map(|s| JobStatus::parse(s).ok_or_else(|| ApiError::bad_request(format!("unknown status '{s}'"))))
        .transpose()?;
    let priority = filter
        .priority
        .as_deref()
        .map(|p| {
            PriorityTier::parse(p).ok_or_else(|| ApiError::bad_request(format!("unknown priority '{p}'")))
        })
        .transpose()?;

    let jobs = match (status, priority) {
        (Some(status), _) => dispatcher.list_jobs_by_status(status).await,
        (None, Some(tier)) => dispatcher.list_jobs_by_priority(tier).await,
        (None, None) => dispatcher.list_jobs().await,
    };
    let jobs: Vec<_> = jobs
        .into_iter()
        .filter(|j| priority.is_none_or(|p| j.priority == p))
        .collect();

    Ok(Json(jobs))
}

async fn get_job(
    State(dispatcher): State<AppState>,
    Path(id): Path<String>,
) -> ApiResult<impl IntoResponse> {
    Ok(Json(dispatcher.find_job(&JobId::from(id)).await?))
}

async fn start_job(
    State(dispatcher): State<AppState>,
    Path(id): Path<String>,
) -> ApiResult<impl IntoResponse> {
    Ok(Json(dispatcher.start_job(&JobId::from(id)).await?))
}

async fn cancel_job(
    State(dispatcher): State<AppState>,
    Path(id): Path<String>,
) -> ApiResult<impl IntoResponse> {
    Ok(Json(dispatcher.cancel_job(&JobId::from(id)).await?))
}

// ── Technicians ─────────────────────────────────────────────────────────

async fn list_technicians(State(dispatcher): State<AppState>) -> impl IntoResponse {
    Json(dispatcher.list_technicians().await)
}

async fn complete_job(
    State(dispatcher): State<AppState>,
    Path(id): Path<String>,
) -> ApiResult<impl IntoResponse> {
    Ok(Json(dispatcher.complete_job(&TechnicianId::from(id)).await?))
}

#[derive(Debug, Deserialize)]
struct LocationUpdate {
    location: String,
}

async fn update_location(
    State(dispatcher): State<AppState>,
    Path(id): Path<String>,
    Json(body): Json<LocationUpdate>,
) -> ApiResult<impl IntoResponse> {
    let tech = dispatcher
        .update_location(&TechnicianId::from(id), &body.location)
        .await?;
    Ok(Json(tech))
}

// ── Dispatch ────────────────────────────────────────────────────────────

async fn run_dispatch(State(dispatcher): State<AppState>) -> ApiResult<impl IntoResponse> {
    Ok(Json(dispatcher.dispatch_pass().await?))
}

#[derive(Debug, Deserialize)]
struct QueuePeek {
    n: Option<usize>,
}

async fn peek_queue(
    State(dispatcher): State<AppState>,
    Query(q): Query<QueuePeek>,
) -> impl IntoResponse {
    Json(dispatcher.next_jobs(q.n.unwrap_or(DEFAULT_QUEUE_PEEK)).await)
}

async fn summary(State(dispatcher): State<AppState>) -> impl IntoResponse {
    Json(dispatcher.summary().await)
}

async fn report(State(dispatcher): State<AppState>) -> impl IntoResponse {
    Json(dispatcher.report().await)
}
