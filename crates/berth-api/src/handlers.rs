//! REST API handlers.
//!
//! Each handler delegates to `DatabaseService`/`Reaper` and returns a
//! JSON `ApiResponse`. The error mapping realizes the taxonomy:
//! not-found → 404, forbidden → 403, no-capacity → 503, invalid
//! state/arguments → 422, everything else → 500.

use axum::Json;
use axum::extract::{Path, State};
use axum::http::{HeaderMap, StatusCode};
use axum::response::IntoResponse;
use tracing::warn;

use berth_state::CreationRequest;
use berth_workflow::WorkflowError;

use crate::ApiState;

/// Header carrying the operator token for the reap endpoint.
pub const OPERATOR_TOKEN_HEADER: &str = "x-operator-token";

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

fn error_response(error: &WorkflowError) -> axum::response::Response {
    let status = match error {
        WorkflowError::NotFound(_) | WorkflowError::HostNotFound(_) => StatusCode::NOT_FOUND,
        WorkflowError::Forbidden => StatusCode::FORBIDDEN,
        WorkflowError::Capacity(_) => StatusCode::SERVICE_UNAVAILABLE,
        WorkflowError::InvalidState { .. }
        | WorkflowError::UnknownInstanceClass(_)
        | WorkflowError::MissingCloneSource(_) => StatusCode::UNPROCESSABLE_ENTITY,
        _ => StatusCode::INTERNAL_SERVER_ERROR,
    };
    (
        status,
        Json(ApiResponse::<()> {
            success: false,
            data: None,
            error: Some(error.to_string()),
        }),
    )
        .into_response()
}

// ── Databases ──────────────────────────────────────────────────

/// POST /api/v1/databases
pub async fn create_database(
    State(state): State<ApiState>,
    Json(request): Json<CreationRequest>,
) -> impl IntoResponse {
    match state.service.create_database(request).await {
        Ok(response) => (StatusCode::CREATED, ApiResponse::ok(response)).into_response(),
        Err(e) => error_response(&e),
    }
}

/// GET /api/v1/databases/:id
pub async fn connection_info(
    State(state): State<ApiState>,
    Path(id): Path<String>,
) -> impl IntoResponse {
    match state.service.connection_info(&id) {
        Ok(facts) => ApiResponse::ok(facts).into_response(),
        Err(e) => error_response(&e),
    }
}

/// GET /api/v1/databases/:id/status
pub async fn database_status(
    State(state): State<ApiState>,
    Path(id): Path<String>,
) -> impl IntoResponse {
    match state.service.database_status(&id) {
        Ok(status) => ApiResponse::ok(status).into_response(),
        Err(e) => error_response(&e),
    }
}

/// DELETE /api/v1/databases/:id
pub async fn delete_database(
    State(state): State<ApiState>,
    Path(id): Path<String>,
) -> impl IntoResponse {
    match state.service.delete_database(&id).await {
        Ok(()) => ApiResponse::ok("deleting").into_response(),
        Err(e) => error_response(&e),
    }
}

/// POST /api/v1/databases/:id/users
pub async fn create_temp_user(
    State(state): State<ApiState>,
    Path(id): Path<String>,
) -> impl IntoResponse {
    match state.service.create_temp_user(&id).await {
        Ok(user) => (StatusCode::CREATED, ApiResponse::ok(user)).into_response(),
        Err(e) => error_response(&e),
    }
}

// ── Reaper ─────────────────────────────────────────────────────

/// POST /api/v1/reap
pub async fn reap(State(state): State<ApiState>, headers: HeaderMap) -> impl IntoResponse {
    let token = headers
        .get(OPERATOR_TOKEN_HEADER)
        .and_then(|v| v.to_str().ok())
        .unwrap_or_default();

    match state.reaper.reap(token).await {
        Ok(summary) => ApiResponse::ok(summary).into_response(),
        Err(e) => {
            if matches!(e, WorkflowError::Forbidden) {
                warn!("reap called with an unauthorized token");
            }
            error_response(&e)
        }
    }
}

// ── Fleet inspection ───────────────────────────────────────────

/// GET /api/v1/hosts/:instance_id
pub async fn host_details(
    State(state): State<ApiState>,
    Path(instance_id): Path<String>,
) -> impl IntoResponse {
    match state.service.host_details(&instance_id).await {
        Ok(details) => ApiResponse::ok(details).into_response(),
        Err(e) => error_response(&e),
    }
}

/// GET /api/v1/instance-classes
pub async fn instance_classes(State(state): State<ApiState>) -> impl IntoResponse {
    ApiResponse::ok(state.service.instance_classes()).into_response()
}

// ── Metrics ────────────────────────────────────────────────────

/// GET /metrics
pub async fn prometheus_metrics(State(state): State<ApiState>) -> impl IntoResponse {
    berth_metrics::render_prometheus(&state.metrics)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::time::Duration;

    use axum::body::Body;
    use axum::http::Request;
    use tower::util::ServiceExt;

    use berth_config::{BerthConfig, MasterCredentials, OperatorToken, PasswordVault};
    use berth_envelope::Envelope;
    use berth_fleet::{FleetManager, tag_keys};
    use berth_ids::IdAllocator;
    use berth_metrics::Metrics;
    use berth_placement::PlacementSelector;
    use berth_provider::{HostProvider, HostSpec, MemoryClone, MemoryFleet, MemorySql, Tag};
    use berth_queue::MemoryQueue;
    use berth_reaper::Reaper;
    use berth_schema::{CloneRunner, SchemaManager};
    use berth_state::RecordStore;
    use berth_workflow::{CreationEngine, DatabaseService, DeletionEngine, WorkflowContext};

    async fn router_with_pool_host() -> axum::Router {
        let config = Arc::new(BerthConfig::sample());
        let fleet = Arc::new(MemoryFleet::new());
        let metrics = Metrics::new();
        let manager = Arc::new(FleetManager::new(fleet.clone(), config.clone()));
        let vault = PasswordVault::from_entries([(
            "blue_pool_1".to_string(),
            MasterCredentials {
                username: "postgres".to_string(),
                password: "hunter2".to_string(),
            },
        )]);

        let spec = HostSpec {
            id: "berth-stage-blue-pool-1".to_string(),
            master_user: "postgres".to_string(),
            master_password: "hunter2".to_string(),
            instance_class: "db.m4.large".to_string(),
            storage_gb: 100,
            engine: "postgres".to_string(),
            engine_version: "15.4".to_string(),
            db_name: "postgres".to_string(),
            port: 5432,
            multi_az: false,
            publicly_accessible: false,
            subnet_group: String::new(),
            security_group: String::new(),
            tags: vec![Tag::new(tag_keys::FLEET_DEFAULT, "berth-managed")],
        };
        fleet.create_host(&spec).await.unwrap();
        fleet.set_status("berth-stage-blue-pool-1", "available").await;

        let ctx = Arc::new(WorkflowContext {
            config: config.clone(),
            store: RecordStore::open_in_memory().unwrap(),
            fleet: manager.clone(),
            allocator: IdAllocator::new(&config.identifier_prefix),
            placement: PlacementSelector::new(manager, config.clone(), metrics.clone()),
            schema: SchemaManager::new(Arc::new(MemorySql::new())),
            cloner: CloneRunner::new(
                Arc::new(MemoryClone::new()),
                config.clone_config.clone(),
                metrics.clone(),
            ),
            vault,
            metrics: metrics.clone(),
        });
        let envelope = Envelope::derive("open sesame", "sel gris");
        let creation = Arc::new(CreationEngine::new(
            ctx.clone(),
            Arc::new(MemoryQueue::new("berth-create", Duration::from_secs(30))),
            envelope.clone(),
        ));
        let deletion = Arc::new(DeletionEngine::new(
            ctx.clone(),
            Arc::new(MemoryQueue::new("berth-delete", Duration::from_secs(30))),
            envelope,
        ));
        let service = Arc::new(DatabaseService::new(ctx.clone(), creation, deletion));
        let reaper = Arc::new(Reaper::new(ctx, OperatorToken::from_value("sekrit")));

        crate::build_router(service, reaper, metrics)
    }

    async fn body_json(response: axum::response::Response) -> serde_json::Value {
        let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap();
        serde_json::from_slice(&bytes).unwrap()
    }

    #[tokio::test]
    async fn create_returns_id_and_password() {
        let router = router_with_pool_host().await;
        let request = Request::builder()
            .method("POST")
            .uri("/api/v1/databases")
            .header("content-type", "application/json")
            .body(Body::from(
                serde_json::json!({
                    "category": "acme",
                    "tenancy": "SHARED",
                    "locality": "US",
                    "instance_class": null,
                    "instance_storage_gb": null,
                    "source_database_id": null,
                    "service_tag": "acme",
                    "service_component_tag": "acme-api",
                    "highly_available": false
                })
                .to_string(),
            ))
            .unwrap();

        let response = router.oneshot(request).await.unwrap();
        assert_eq!(response.status(), StatusCode::CREATED);
        let body = body_json(response).await;
        assert!(body["success"].as_bool().unwrap());
        assert!(body["data"]["database_id"].as_str().unwrap().starts_with("acme_"));
        assert!(!body["data"]["password"].as_str().unwrap().is_empty());
    }

    #[tokio::test]
    async fn unknown_database_maps_to_404() {
        let router = router_with_pool_host().await;
        let response = router
            .oneshot(
                Request::builder()
                    .uri("/api/v1/databases/ghost_1/status")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::NOT_FOUND);
        let body = body_json(response).await;
        assert!(!body["success"].as_bool().unwrap());
    }

    #[tokio::test]
    async fn reap_without_token_is_forbidden() {
        let router = router_with_pool_host().await;
        let response = router
            .oneshot(
                Request::builder()
                    .method("POST")
                    .uri("/api/v1/reap")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::FORBIDDEN);
    }

    #[tokio::test]
    async fn reap_with_token_returns_summary() {
        let router = router_with_pool_host().await;
        let response = router
            .oneshot(
                Request::builder()
                    .method("POST")
                    .uri("/api/v1/reap")
                    .header(OPERATOR_TOKEN_HEADER, "sekrit")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        let body = body_json(response).await;
        assert_eq!(body["data"]["examined"], 0);
    }

    #[tokio::test]
    async fn instance_classes_lists_catalog() {
        let router = router_with_pool_host().await;
        let response = router
            .oneshot(
                Request::builder()
                    .uri("/api/v1/instance-classes")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        let body = body_json(response).await;
        assert_eq!(body["data"][0]["class"], "m4.large");
    }

    #[tokio::test]
    async fn metrics_route_serves_text() {
        let router = router_with_pool_host().await;
        let response = router
            .oneshot(Request::builder().uri("/metrics").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
    }
}
