//! HTTP API: optimize endpoints plus health checks and Prometheus metrics

use axum::{
    extract::State,
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use prometheus::{Encoder, TextEncoder};
use rightsizing_engine::{
    health::{ComponentStatus, HealthRegistry},
    EbsVolumeRecommendation, EbsVolumeRequest, Ec2InstanceRecommendation, Ec2InstanceRequest,
    Ec2WithVolumesRecommendation, Ec2WithVolumesRequest, EngineError, GcpDiskRecommendation,
    GcpDiskRequest, GcpInstanceRecommendation, GcpInstanceRequest,
    GcpInstanceWithDisksRecommendation, GcpInstanceWithDisksRequest, KubernetesPodRequest,
    KubernetesWorkloadRequest, PodRecommendation, RdsInstanceRecommendation, RdsInstanceRequest,
    RightsizingEngine, WorkloadRecommendation,
};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::{info, warn};

/// Shared application state
#[derive(Clone)]
pub struct AppState {
    pub engine: RightsizingEngine,
    pub health_registry: HealthRegistry,
}

impl AppState {
    /// Health is read from the registry the engine reports into
    pub fn new(engine: RightsizingEngine) -> Self {
        let health_registry = engine.health().clone();
        Self {
            engine,
            health_registry,
        }
    }
}

/// Request envelope: a client-chosen identifier plus the resource request
#[derive(Debug, Deserialize)]
pub struct OptimizeRequest<T> {
    pub request_id: String,
    #[serde(flatten)]
    pub resource: T,
}

/// Response envelope echoing the request identifier
#[derive(Debug, Serialize)]
pub struct OptimizeResponse<T> {
    pub request_id: String,
    #[serde(flatten)]
    pub result: T,
}

/// An engine error mapped to a status code
#[derive(Debug)]
pub struct ApiError {
    request_id: String,
    error: EngineError,
}

impl ApiError {
    pub fn status(&self) -> StatusCode {
        match &self.error {
            EngineError::NoFeasibleDiskType { .. } => StatusCode::UNPROCESSABLE_ENTITY,
            e if e.is_input() => StatusCode::BAD_REQUEST,
            e if e.is_dependency() => StatusCode::BAD_GATEWAY,
            _ => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

#[derive(Serialize)]
struct ErrorBody {
    request_id: String,
    error: String,
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status();
        if status.is_server_error() {
            warn!(request_id = %self.request_id, error = %self.error, "Optimize request failed");
        }
        let body = ErrorBody {
            request_id: self.request_id,
            error: self.error.to_string(),
        };
        (status, Json(body)).into_response()
    }
}

type ApiResult<T> = Result<Json<OptimizeResponse<T>>, ApiError>;

fn respond<T>(request_id: String, result: rightsizing_engine::Result<T>) -> ApiResult<T> {
    match result {
        Ok(result) => Ok(Json(OptimizeResponse { request_id, result })),
        Err(error) => Err(ApiError { request_id, error }),
    }
}

/// Health check response - returns 200 if healthy, 503 if unhealthy
async fn healthz(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    let health = state.health_registry.health().await;

    let status_code = match health.status {
        ComponentStatus::Healthy => StatusCode::OK,
        ComponentStatus::Degraded => StatusCode::OK, // Still serving
        ComponentStatus::Unhealthy => StatusCode::SERVICE_UNAVAILABLE,
    };

    (status_code, Json(health))
}

/// Readiness check response - returns 200 if ready, 503 if not ready
async fn readyz(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    let readiness = state.health_registry.readiness().await;

    let status_code = if readiness.ready {
        StatusCode::OK
    } else {
        StatusCode::SERVICE_UNAVAILABLE
    };

    (status_code, Json(readiness))
}

/// Prometheus metrics endpoint
async fn metrics() -> Response {
    let encoder = TextEncoder::new();
    let metric_families = prometheus::gather();
    let mut buffer = Vec::new();

    if let Err(e) = encoder.encode(&metric_families, &mut buffer) {
        warn!(error = %e, "Failed to encode metrics");
        return StatusCode::INTERNAL_SERVER_ERROR.into_response();
    }

    (
        StatusCode::OK,
        [("content-type", "text/plain; charset=utf-8")],
        buffer,
    )
        .into_response()
}

async fn optimize_ec2_instance(
    State(state): State<Arc<AppState>>,
    Json(request): Json<OptimizeRequest<Ec2InstanceRequest>>,
) -> ApiResult<Ec2InstanceRecommendation> {
    let result = state.engine.optimize_ec2_instance(&request.resource).await;
    respond(request.request_id, result)
}

async fn optimize_ec2_with_volumes(
    State(state): State<Arc<AppState>>,
    Json(request): Json<OptimizeRequest<Ec2WithVolumesRequest>>,
) -> ApiResult<Ec2WithVolumesRecommendation> {
    let result = state.engine.optimize_ec2_with_volumes(request.resource).await;
    respond(request.request_id, result)
}

async fn optimize_ebs_volume(
    State(state): State<Arc<AppState>>,
    Json(request): Json<OptimizeRequest<EbsVolumeRequest>>,
) -> ApiResult<EbsVolumeRecommendation> {
    let result = state.engine.optimize_ebs_volume(&request.resource).await;
    respond(request.request_id, result)
}

async fn optimize_rds_instance(
    State(state): State<Arc<AppState>>,
    Json(request): Json<OptimizeRequest<RdsInstanceRequest>>,
) -> ApiResult<RdsInstanceRecommendation> {
    let result = state.engine.optimize_rds_instance(&request.resource).await;
    respond(request.request_id, result)
}

async fn optimize_gcp_instance(
    State(state): State<Arc<AppState>>,
    Json(request): Json<OptimizeRequest<GcpInstanceRequest>>,
) -> ApiResult<GcpInstanceRecommendation> {
    let result = state.engine.optimize_gcp_instance(&request.resource).await;
    respond(request.request_id, result)
}

async fn optimize_gcp_instance_with_disks(
    State(state): State<Arc<AppState>>,
    Json(request): Json<OptimizeRequest<GcpInstanceWithDisksRequest>>,
) -> ApiResult<GcpInstanceWithDisksRecommendation> {
    let result = state
        .engine
        .optimize_gcp_instance_with_disks(request.resource)
        .await;
    respond(request.request_id, result)
}

async fn optimize_gcp_disk(
    State(state): State<Arc<AppState>>,
    Json(request): Json<OptimizeRequest<GcpDiskRequest>>,
) -> ApiResult<GcpDiskRecommendation> {
    let result = state.engine.optimize_gcp_disk(&request.resource).await;
    respond(request.request_id, result)
}

async fn optimize_kubernetes_pod(
    State(state): State<Arc<AppState>>,
    Json(request): Json<OptimizeRequest<KubernetesPodRequest>>,
) -> ApiResult<PodRecommendation> {
    let result = state.engine.optimize_kubernetes_pod(&request.resource).await;
    respond(request.request_id, result)
}

async fn optimize_kubernetes_workload(
    State(state): State<Arc<AppState>>,
    Json(request): Json<OptimizeRequest<KubernetesWorkloadRequest>>,
) -> ApiResult<WorkloadRecommendation> {
    let result = state
        .engine
        .optimize_kubernetes_workload(&request.resource)
        .await;
    respond(request.request_id, result)
}

/// Create the API router
pub fn create_router(state: Arc<AppState>) -> Router {
    let optimize = Router::new()
        .route("/ec2-instance", post(optimize_ec2_instance))
        .route("/ec2-instance-with-volumes", post(optimize_ec2_with_volumes))
        .route("/ebs-volume", post(optimize_ebs_volume))
        .route("/rds-instance", post(optimize_rds_instance))
        .route("/gcp-instance", post(optimize_gcp_instance))
        .route("/gcp-instance-with-disks", post(optimize_gcp_instance_with_disks))
        .route("/gcp-disk", post(optimize_gcp_disk))
        .route("/kubernetes-pod", post(optimize_kubernetes_pod))
        .route("/kubernetes-workload", post(optimize_kubernetes_workload));

    Router::new()
        .route("/healthz", get(healthz))
        .route("/readyz", get(readyz))
        .route("/metrics", get(metrics))
        .nest("/api/v1/optimize", optimize)
        .with_state(state)
}

/// Start the API server
pub async fn serve(port: u16, state: Arc<AppState>) -> anyhow::Result<()> {
    let app = create_router(state);

    let addr = format!("0.0.0.0:{}", port);
    info!(addr = %addr, "Starting API server");

    let listener = tokio::net::TcpListener::bind(&addr).await?;
    axum::serve(listener, app).await?;

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn status_of(error: EngineError) -> StatusCode {
        ApiError {
            request_id: "r-1".to_string(),
            error,
        }
        .status()
    }

    #[test]
    fn test_error_status_mapping() {
        assert_eq!(
            status_of(EngineError::invalid_preference("CPUBreathingRoom", "not a number")),
            StatusCode::BAD_REQUEST
        );
        assert_eq!(
            status_of(EngineError::CostQuote("503".to_string())),
            StatusCode::BAD_GATEWAY
        );
        assert_eq!(
            status_of(EngineError::NoFeasibleDiskType {
                machine_type: "e2-small".to_string(),
                size_gb: 10.0
            }),
            StatusCode::UNPROCESSABLE_ENTITY
        );
    }

    #[test]
    fn test_envelope_flattens_resource() {
        let json = r#"{"request_id":"r-7","volume_id":"vol-1","volume_type":"gp2","size_gb":100,"region":"us-east-1"}"#;
        let request: OptimizeRequest<EbsVolumeRequest> = serde_json::from_str(json).unwrap();
        assert_eq!(request.request_id, "r-7");
        assert_eq!(request.resource.volume_id, "vol-1");
        assert_eq!(request.resource.size_gb, 100.0);
        assert!(request.resource.preferences.is_empty());
    }
}
