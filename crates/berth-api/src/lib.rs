//! berth-api — REST surface for the berth control plane.
//!
//! Thin layer over `DatabaseService` and `Reaper`; all orchestration
//! lives behind those. Synchronous failures map to structured error
//! payloads; asynchronous failures are visible only through the status
//! route.
//!
//! # API Routes
//!
//! | Method | Path | Description |
//! |---|---|---|
//! | POST | `/api/v1/databases` | Request database creation |
//! | GET | `/api/v1/databases/{id}` | Connection info (READY only) |
//! | GET | `/api/v1/databases/{id}/status` | Lifecycle status |
//! | DELETE | `/api/v1/databases/{id}` | Soft delete |
//! | POST | `/api/v1/databases/{id}/users` | Create a temp user |
//! | POST | `/api/v1/reap` | Hard-delete sweep (operator token) |
//! | GET | `/api/v1/hosts/{instance_id}` | Host inspection |
//! | GET | `/api/v1/instance-classes` | Allowed class catalog |
//! | GET | `/metrics` | Prometheus exposition |

pub mod handlers;

use std::sync::Arc;

use axum::Router;
use axum::routing::{get, post};

use berth_metrics::Metrics;
use berth_reaper::Reaper;
use berth_workflow::DatabaseService;

/// Shared state for API handlers.
#[derive(Clone)]
pub struct ApiState {
    pub service: Arc<DatabaseService>,
    pub reaper: Arc<Reaper>,
    pub metrics: Metrics,
}

/// Build the complete API router.
pub fn build_router(service: Arc<DatabaseService>, reaper: Arc<Reaper>, metrics: Metrics) -> Router {
    let state = ApiState {
        service,
        reaper,
        metrics,
    };

    let api_routes = Router::new()
        .route("/databases", post(handlers::create_database))
        .route(
            "/databases/{id}",
            get(handlers::connection_info).delete(handlers::delete_database),
        )
        .route("/databases/{id}/status", get(handlers::database_status))
        .route("/databases/{id}/users", post(handlers::create_temp_user))
        .route("/reap", post(handlers::reap))
        .route("/hosts/{instance_id}", get(handlers::host_details))
        .route("/instance-classes", get(handlers::instance_classes))
        .with_state(state.clone());

    Router::new()
        .nest("/api/v1", api_routes)
        .route("/metrics", get(handlers::prometheus_metrics).with_state(state))
}
