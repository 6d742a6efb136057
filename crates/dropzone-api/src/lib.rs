//! dropzone-api — REST API for the dropzone assignment engine.
//!
//! Provides axum route handlers for the student queue, the instructor
//! roster, loads, balances, settings and the auto-assign scheduler.
//!
//! # API Routes
//!
//! | Method | Path | Description |
//! |---|---|---|
//! | GET | `/api/v1/queue` | List waiting students |
//! | POST | `/api/v1/queue` | Enqueue a student |
//! | DELETE | `/api/v1/queue/{id}` | Remove a student |
//! | GET | `/api/v1/instructors` | List instructors |
//! | POST | `/api/v1/instructors` | Create or replace an instructor |
//! | POST | `/api/v1/instructors/{id}/clock` | Clock an instructor in or out |
//! | GET | `/api/v1/loads` | List loads |
//! | POST | `/api/v1/loads` | Create a load |
//! | GET | `/api/v1/loads/{id}/capacity` | Occupied and available seats |
//! | POST | `/api/v1/loads/{id}/status` | Change a load's status |
//! | POST | `/api/v1/loads/{id}/fun-jumpers` | Add a fun jumper to a load |
//! | GET | `/api/v1/periods` | List rotation periods |
//! | POST | `/api/v1/periods` | Start a new rotation period |
//! | GET | `/api/v1/balances` | Balance sheet for the active period |
//! | GET | `/api/v1/settings` | Read settings |
//! | PUT | `/api/v1/settings` | Replace settings |
//! | GET | `/api/v1/scheduler` | Scheduler status |
//! | POST | `/api/v1/scheduler/cancel` | Cancel the pending countdown |
//! | POST | `/api/v1/assignments` | Manual assignment |
//! | POST | `/api/v1/assignments/{id}/revert` | Soft-delete an assignment |

pub mod handlers;

use axum::Router;
use axum::routing::{delete, get, post};
use dropzone_scheduler::AutoAssigner;
use dropzone_state::StateStore;

/// Shared state for API handlers.
#[derive(Clone)]
pub struct ApiState {
    pub store: StateStore,
    pub engine: AutoAssigner,
}

/// Build the complete API router.
pub fn build_router(store: StateStore, engine: AutoAssigner) -> Router {
    let api_state = ApiState { store, engine };

    let api_routes = Router::new()
        .route("/queue", get(handlers::list_queue).post(handlers::enqueue_student))
        .route("/queue/{id}", delete(handlers::remove_student))
        .route(
            "/instructors",
            get(handlers::list_instructors).post(handlers::upsert_instructor),
        )
        .route("/instructors/{id}/clock", post(handlers::clock_instructor))
        .route("/loads", get(handlers::list_loads).post(handlers::create_load))
        .route("/loads/{id}/capacity", get(handlers::load_capacity))
        .route("/loads/{id}/status", post(handlers::set_load_status))
        .route("/loads/{id}/fun-jumpers", post(handlers::add_fun_jumper))
        .route("/periods", get(handlers::list_periods).post(handlers::start_period))
        .route("/balances", get(handlers::get_balances))
        .route("/settings", get(handlers::get_settings).put(handlers::put_settings))
        .route("/scheduler", get(handlers::scheduler_status))
        .route("/scheduler/cancel", post(handlers::cancel_countdown))
        .route("/assignments", post(handlers::create_assignment))
        .route("/assignments/{id}/revert", post(handlers::revert_assignment))
        .with_state(api_state);

    Router::new().nest("/api/v1", api_routes)
}
