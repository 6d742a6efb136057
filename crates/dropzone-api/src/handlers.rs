//! REST API handlers.
//!
//! Plain reads and writes go straight to the `StateStore`; anything that
//! assigns or reverts goes through the engine so it shares the commit path.

use axum::Json;
use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use tracing::{info, warn};

use dropzone_rotation::occupancy;
use dropzone_scheduler::{AssignError, ManualAssignment};
use dropzone_state::*;

use crate::ApiState;

/// Response wrapper for consistent API format.
#[derive(serde::Serialize)]
struct ApiResponse<T: serde::Serialize> {
    success: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    data: Option<T>,
    #[serde(skip_serializing_if = "Option::is_none")]
    error: Option<String>,
}

impl<T: serde::Serialize> ApiResponse<T> {
    fn ok(data: T) -> Json<Self> {
        Json(Self {
            success: true,
            data: Some(data),
            error: None,
        })
    }
}

fn error_response(msg: &str, status: StatusCode) -> Response {
    (
        status,
        Json(ApiResponse::<()> {
            success: false,
            data: None,
            error: Some(msg.to_string()),
        }),
    )
        .into_response()
}

fn store_error(e: &StateError) -> Response {
    let status = match e {
        StateError::NotFound { .. } => StatusCode::NOT_FOUND,
        StateError::Conflict { .. } => StatusCode::CONFLICT,
        _ => StatusCode::INTERNAL_SERVER_ERROR,
    };
    error_response(&e.to_string(), status)
}

fn assign_error(e: &AssignError) -> Response {
    let status = match e {
        AssignError::InvalidRequest(_) => StatusCode::BAD_REQUEST,
        AssignError::InstructorNotFound(_)
        | AssignError::LoadNotFound(_)
        | AssignError::AssignmentNotFound(_) => StatusCode::NOT_FOUND,
        AssignError::NoQualifiedInstructor(_)
        | AssignError::NoAvailableLoad(_)
        | AssignError::StudentNotQueued(_)
        | AssignError::NoActivePeriod
        | AssignError::Cancelled => StatusCode::CONFLICT,
        AssignError::WriteFailure { .. } | AssignError::Repository(_) => {
            StatusCode::INTERNAL_SERVER_ERROR
        }
    };
    error_response(&e.to_string(), status)
}

// ── Queue ──────────────────────────────────────────────────────

/// GET /api/v1/queue
pub async fn list_queue(State(state): State<ApiState>) -> impl IntoResponse {
    match state.store.list_queue() {
        Ok(queue) => ApiResponse::ok(queue).into_response(),
        Err(e) => store_error(&e),
    }
}

/// Enqueue request body. The id and timestamp are assigned when omitted.
#[derive(Debug, serde::Deserialize)]
pub struct EnqueueRequest {
    #[serde(default)]
    pub id: Option<String>,
    pub name: String,
    pub weight: u32,
    #[serde(default)]
    pub is_request: bool,
    #[serde(default)]
    pub group_id: Option<String>,
    pub jump: Jump,
}

/// POST /api/v1/queue
///
/// An id that is already waiting is rejected with 409.
pub async fn enqueue_student(
    State(state): State<ApiState>,
    Json(req): Json<EnqueueRequest>,
) -> impl IntoResponse {
    if req.name.trim().is_empty() {
        return error_response("name is required", StatusCode::BAD_REQUEST);
    }
    if req.weight == 0 {
        return error_response("weight must be positive", StatusCode::BAD_REQUEST);
    }

    let student = QueueStudent {
        id: req
            .id
            .unwrap_or_else(|| format!("stu-{}", uuid::Uuid::new_v4())),
        name: req.name,
        weight: req.weight,
        is_request: req.is_request,
        group_id: req.group_id,
        jump: req.jump,
        queued_at: epoch_secs(),
    };
    match state.store.enqueue_student(&student) {
        Ok(()) => (StatusCode::CREATED, ApiResponse::ok(student)).into_response(),
        Err(e) => store_error(&e),
    }
}

/// DELETE /api/v1/queue/:id
pub async fn remove_student(
    State(state): State<ApiState>,
    Path(id): Path<String>,
) -> impl IntoResponse {
    match state.store.remove_student(&id) {
        Ok(true) => ApiResponse::ok("removed").into_response(),
        Ok(false) => error_response("student not found", StatusCode::NOT_FOUND),
        Err(e) => store_error(&e),
    }
}

// ── Instructors ────────────────────────────────────────────────

/// GET /api/v1/instructors
pub async fn list_instructors(State(state): State<ApiState>) -> impl IntoResponse {
    match state.store.list_instructors() {
        Ok(instructors) => ApiResponse::ok(instructors).into_response(),
        Err(e) => store_error(&e),
    }
}

/// POST /api/v1/instructors
pub async fn upsert_instructor(
    State(state): State<ApiState>,
    Json(instructor): Json<Instructor>,
) -> impl IntoResponse {
    if instructor.id.trim().is_empty() {
        return error_response("id is required", StatusCode::BAD_REQUEST);
    }
    match state.store.put_instructor(&instructor) {
        Ok(()) => ApiResponse::ok(instructor).into_response(),
        Err(e) => store_error(&e),
    }
}

#[derive(Debug, serde::Deserialize)]
pub struct ClockRequest {
    pub clocked_in: bool,
}

/// POST /api/v1/instructors/:id/clock
pub async fn clock_instructor(
    State(state): State<ApiState>,
    Path(id): Path<String>,
    Json(req): Json<ClockRequest>,
) -> impl IntoResponse {
    match state.store.set_clocked_in(&id, req.clocked_in) {
        Ok(instructor) => {
            info!(instructor_id = %id, clocked_in = req.clocked_in, "instructor clock changed");
            ApiResponse::ok(instructor).into_response()
        }
        Err(e) => store_error(&e),
    }
}

// ── Loads ──────────────────────────────────────────────────────

/// GET /api/v1/loads
pub async fn list_loads(State(state): State<ApiState>) -> impl IntoResponse {
    match state.store.list_loads() {
        Ok(loads) => ApiResponse::ok(loads).into_response(),
        Err(e) => store_error(&e),
    }
}

/// Create-load request body. Position defaults to the end of the line.
#[derive(Debug, serde::Deserialize)]
pub struct CreateLoadRequest {
    #[serde(default)]
    pub id: Option<String>,
    #[serde(default)]
    pub position: Option<u32>,
    pub aircraft: String,
    #[serde(default)]
    pub capacity: Option<u32>,
}

/// POST /api/v1/loads
pub async fn create_load(
    State(state): State<ApiState>,
    Json(req): Json<CreateLoadRequest>,
) -> impl IntoResponse {
    if req.aircraft.trim().is_empty() {
        return error_response("aircraft is required", StatusCode::BAD_REQUEST);
    }
    if req.capacity == Some(0) {
        return error_response("capacity must be positive", StatusCode::BAD_REQUEST);
    }

    let position = match req.position {
        Some(p) => p,
        None => match state.store.list_loads() {
            Ok(loads) => loads.iter().map(|l| l.position).max().map_or(1, |p| p + 1),
            Err(e) => return store_error(&e),
        },
    };
    let id = req
        .id
        .unwrap_or_else(|| format!("load-{}", uuid::Uuid::new_v4()));
    let mut load = Load::new(&id, position, &req.aircraft);
    load.capacity = req.capacity;

    match state.store.put_load(&load) {
        Ok(()) => (StatusCode::CREATED, ApiResponse::ok(load)).into_response(),
        Err(e) => store_error(&e),
    }
}

/// GET /api/v1/loads/:id/capacity
pub async fn load_capacity(
    State(state): State<ApiState>,
    Path(id): Path<String>,
) -> impl IntoResponse {
    match state.store.get_load(&id) {
        Ok(Some(load)) => {
            ApiResponse::ok(occupancy(&load, &state.engine.config().loads)).into_response()
        }
        Ok(None) => error_response("load not found", StatusCode::NOT_FOUND),
        Err(e) => store_error(&e),
    }
}

#[derive(Debug, serde::Deserialize)]
pub struct FunJumperRequest {
    #[serde(default)]
    pub id: Option<String>,
    pub name: String,
}

/// POST /api/v1/loads/:id/fun-jumpers
pub async fn add_fun_jumper(
    State(state): State<ApiState>,
    Path(id): Path<String>,
    Json(req): Json<FunJumperRequest>,
) -> impl IntoResponse {
    if req.name.trim().is_empty() {
        return error_response("name is required", StatusCode::BAD_REQUEST);
    }
    let jumper = FunJumper {
        id: req
            .id
            .unwrap_or_else(|| format!("fun-{}", uuid::Uuid::new_v4())),
        name: req.name,
    };
    match state
        .store
        .update_load(&id, LoadUpdate::AddFunJumper { jumper })
    {
        Ok(load) => {
            let summary = occupancy(&load, &state.engine.config().loads);
            info!(load_id = %id, available = summary.available, "fun jumper added");
            (StatusCode::CREATED, ApiResponse::ok(summary)).into_response()
        }
        Err(e) => store_error(&e),
    }
}

#[derive(Debug, serde::Deserialize)]
pub struct LoadStatusRequest {
    pub status: LoadStatus,
}

/// POST /api/v1/loads/:id/status
pub async fn set_load_status(
    State(state): State<ApiState>,
    Path(id): Path<String>,
    Json(req): Json<LoadStatusRequest>,
) -> impl IntoResponse {
    match state
        .store
        .update_load(&id, LoadUpdate::SetStatus { status: req.status })
    {
        Ok(load) => ApiResponse::ok(load).into_response(),
        Err(e) => store_error(&e),
    }
}

// ── Periods & balances ─────────────────────────────────────────

/// GET /api/v1/periods
pub async fn list_periods(State(state): State<ApiState>) -> impl IntoResponse {
    match state.store.list_periods() {
        Ok(periods) => ApiResponse::ok(periods).into_response(),
        Err(e) => store_error(&e),
    }
}

#[derive(Debug, serde::Deserialize)]
pub struct StartPeriodRequest {
    pub name: String,
    #[serde(default)]
    pub id: Option<String>,
}

/// POST /api/v1/periods
///
/// The previous period closes at the new start.
pub async fn start_period(
    State(state): State<ApiState>,
    Json(req): Json<StartPeriodRequest>,
) -> impl IntoResponse {
    if req.name.trim().is_empty() {
        return error_response("name is required", StatusCode::BAD_REQUEST);
    }
    let id = req
        .id
        .unwrap_or_else(|| format!("period-{}", uuid::Uuid::new_v4()));
    let period = Period::open(&id, &req.name, epoch_secs());
    match state.store.put_period(&period) {
        Ok(()) => {
            info!(period_id = %period.id, name = %period.name, "rotation period started");
            (StatusCode::CREATED, ApiResponse::ok(period)).into_response()
        }
        Err(e) => store_error(&e),
    }
}

/// GET /api/v1/balances
pub async fn get_balances(State(state): State<ApiState>) -> impl IntoResponse {
    match state.engine.balance_sheet().await {
        Ok(sheet) => ApiResponse::ok(sheet).into_response(),
        Err(e) => assign_error(&e),
    }
}

// ── Settings ───────────────────────────────────────────────────

/// GET /api/v1/settings
pub async fn get_settings(State(state): State<ApiState>) -> impl IntoResponse {
    match state.store.settings() {
        Ok(settings) => ApiResponse::ok(settings.unwrap_or_default()).into_response(),
        Err(e) => store_error(&e),
    }
}

/// PUT /api/v1/settings
pub async fn put_settings(
    State(state): State<ApiState>,
    Json(settings): Json<Settings>,
) -> impl IntoResponse {
    if settings.batch_size == 0 {
        return error_response("batch_size must be positive", StatusCode::BAD_REQUEST);
    }
    match state.store.put_settings(&settings) {
        Ok(()) => ApiResponse::ok(settings).into_response(),
        Err(e) => store_error(&e),
    }
}

// ── Scheduler & assignments ────────────────────────────────────

/// GET /api/v1/scheduler
pub async fn scheduler_status(State(state): State<ApiState>) -> impl IntoResponse {
    ApiResponse::ok(state.engine.status())
}

/// POST /api/v1/scheduler/cancel
pub async fn cancel_countdown(State(state): State<ApiState>) -> impl IntoResponse {
    let cancelled = state.engine.cancel_pending_assignment();
    ApiResponse::ok(serde_json::json!({ "cancelled": cancelled }))
}

/// POST /api/v1/assignments
pub async fn create_assignment(
    State(state): State<ApiState>,
    Json(req): Json<ManualAssignment>,
) -> impl IntoResponse {
    match state.engine.commit_manual_assignment(req).await {
        Ok(assignment) => (StatusCode::CREATED, ApiResponse::ok(assignment)).into_response(),
        Err(e) => {
            warn!(error = %e, "manual assignment rejected");
            assign_error(&e)
        }
    }
}

/// POST /api/v1/assignments/:id/revert
pub async fn revert_assignment(
    State(state): State<ApiState>,
    Path(id): Path<String>,
) -> impl IntoResponse {
    match state.engine.revert_assignment(&id).await {
        Ok(assignment) => ApiResponse::ok(assignment).into_response(),
        Err(e) => assign_error(&e),
    }
}
