//! Integration tests for the rightsizer API endpoints

use async_trait::async_trait;
use axum::{
    body::Body,
    http::{Request, StatusCode},
    Router,
};
use rightsizer::api::{create_router, AppState};
use rightsizing_engine::{
    catalog::columns,
    health::{components, HealthRegistry},
    CatalogEntry, CatalogKind, CostQuery, CostQuoter, EngineError, InMemoryCatalog,
    RightsizingEngine,
};
use serde_json::{json, Value};
use std::sync::Arc;
use tower::ServiceExt;

/// Flat hourly and per-GB prices, enough to order the test catalog
struct FlatQuoter;

#[async_trait]
impl CostQuoter for FlatQuoter {
    async fn quote(&self, query: &CostQuery) -> rightsizing_engine::Result<f64> {
        let cost = match query {
            CostQuery::Ec2Instance(p) => match p.instance_type.as_str() {
                "m5.large" => 70.08,
                "c6g.medium" => 24.82,
                other => return Err(EngineError::CostQuote(format!("no price for {}", other))),
            },
            CostQuery::EbsVolume(p) => p.size_gb * 0.08,
            CostQuery::RdsInstance(_) => 50.0,
            CostQuery::GcpInstance(_) => 30.0,
            CostQuery::GcpDisk(p) => p.size_gb * 0.04,
        };
        Ok(cost)
    }
}

struct DownQuoter;

#[async_trait]
impl CostQuoter for DownQuoter {
    async fn quote(&self, _query: &CostQuery) -> rightsizing_engine::Result<f64> {
        Err(EngineError::CostQuote("connection refused".to_string()))
    }
}

fn ec2(instance_type: &str, vcpu: f64, memory_gb: f64, price: f64) -> CatalogEntry {
    CatalogEntry::new(instance_type, price)
        .with(columns::INSTANCE_TYPE, instance_type)
        .with(columns::REGION, "us-east-1")
        .with(columns::VCPU, vcpu)
        .with(columns::MEMORY_GB, memory_gb)
        .with(columns::TENANCY, "Shared")
        .with(columns::OPERATION, "RunInstances")
        .with(columns::PRE_INSTALLED_SW, "NA")
}

fn test_catalog() -> InMemoryCatalog {
    InMemoryCatalog::new()
        .with_table(
            CatalogKind::Ec2InstanceTypes,
            vec![
                ec2("m5.large", 2.0, 8.0, 0.096),
                ec2("c6g.medium", 1.0, 2.0, 0.034),
            ],
        )
        .with_table(
            CatalogKind::EbsVolumeTypes,
            vec![CatalogEntry::new("us-east-1:gp3", 0.08)
                .with(columns::VOLUME_TYPE, "gp3")
                .with(columns::REGION, "us-east-1")
                .with(columns::MIN_SIZE_GB, 1.0)
                .with(columns::MAX_SIZE_GB, 16_384.0)
                .with(columns::MAX_IOPS, 16_000.0)
                .with(columns::MAX_THROUGHPUT_MBPS, 1_000.0)],
        )
        .with_table(
            CatalogKind::GcpMachineTypes,
            vec![CatalogEntry::new("e2-small", 0.0168)
                .with(columns::MACHINE_TYPE, "e2-small")
                .with(columns::REGION, "us-central1")
                .with(columns::VCPU, 2.0)
                .with(columns::MEMORY_GB, 2.0)],
        )
}

async fn setup_app(cost: Arc<dyn CostQuoter>) -> (Router, HealthRegistry) {
    let health_registry = HealthRegistry::new();
    health_registry.register(components::CATALOG).await;
    health_registry.register(components::COST_SERVICE).await;

    let engine = RightsizingEngine::builder()
        .catalog(Arc::new(test_catalog()))
        .cost_quoter(cost)
        .health_registry(health_registry.clone())
        .build()
        .unwrap();
    let router = create_router(Arc::new(AppState::new(engine)));

    (router, health_registry)
}

async fn setup_test_app() -> (Router, HealthRegistry) {
    setup_app(Arc::new(FlatQuoter)).await
}

async fn get(app: Router, uri: &str) -> (StatusCode, Vec<u8>) {
    let response = app
        .oneshot(Request::builder().uri(uri).body(Body::empty()).unwrap())
        .await
        .unwrap();
    let status = response.status();
    let body = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    (status, body.to_vec())
}

async fn post(app: Router, uri: &str, body: Value) -> (StatusCode, Value) {
    let response = app
        .oneshot(
            Request::builder()
                .method("POST")
                .uri(uri)
                .header("content-type", "application/json")
                .body(Body::from(body.to_string()))
                .unwrap(),
        )
        .await
        .unwrap();
    let status = response.status();
    let body = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    let value = serde_json::from_slice(&body).unwrap_or(Value::Null);
    (status, value)
}

fn ec2_body(preferences: Value) -> Value {
    json!({
        "request_id": "req-42",
        "instance_id": "i-0abc",
        "instance_type": "m5.large",
        "region": "us-east-1",
        "metrics": {
            "CPUUtilization": [
                {"timestamp": "2024-01-01T00:00:00Z", "average": 10.0},
                {"timestamp": "2024-01-01T00:05:00Z", "average": 8.0}
            ],
            "mem_used_percent": [
                {"timestamp": "2024-01-01T00:00:00Z", "average": 20.0, "minimum": 10.0, "maximum": 25.0}
            ]
        },
        "preferences": preferences
    })
}

fn ebs_body(volume_id: &str, preferences: Value) -> Value {
    json!({
        "volume_id": volume_id,
        "volume_type": "gp2",
        "size_gb": 100,
        "region": "us-east-1",
        "metrics": {
            "VolumeReadOps": [{"timestamp": "2024-01-01T00:00:00Z", "average": 100.0}],
            "VolumeWriteOps": [{"timestamp": "2024-01-01T00:00:00Z", "average": 50.0}]
        },
        "preferences": preferences
    })
}

// ---------------------------------------------------------------------------
// Health and metrics
// ---------------------------------------------------------------------------

#[tokio::test]
async fn test_healthz_returns_ok_when_healthy() {
    let (app, _health) = setup_test_app().await;

    let (status, body) = get(app, "/healthz").await;
    assert_eq!(status, StatusCode::OK);

    let health: Value = serde_json::from_slice(&body).unwrap();
    assert_eq!(health["status"], "healthy");
    assert!(health["components"]["catalog"].is_object());
    assert!(health["components"]["cost_service"].is_object());
}

#[tokio::test]
async fn test_healthz_returns_ok_when_degraded() {
    let (app, health) = setup_test_app().await;
    health
        .set_degraded(components::COST_SERVICE, "High latency")
        .await;

    let (status, body) = get(app, "/healthz").await;

    // Degraded still returns 200 (serving)
    assert_eq!(status, StatusCode::OK);
    let health: Value = serde_json::from_slice(&body).unwrap();
    assert_eq!(health["status"], "degraded");
}

#[tokio::test]
async fn test_healthz_returns_503_when_unhealthy() {
    let (app, health) = setup_test_app().await;
    health
        .set_unhealthy(components::CATALOG, "Snapshot unreadable")
        .await;

    let (status, _) = get(app, "/healthz").await;
    assert_eq!(status, StatusCode::SERVICE_UNAVAILABLE);
}

#[tokio::test]
async fn test_readyz_follows_ready_flag() {
    let (app, health) = setup_test_app().await;

    let (status, body) = get(app.clone(), "/readyz").await;
    assert_eq!(status, StatusCode::SERVICE_UNAVAILABLE);
    let readiness: Value = serde_json::from_slice(&body).unwrap();
    assert_eq!(readiness["ready"], false);

    health.set_ready(true).await;
    let (status, _) = get(app, "/readyz").await;
    assert_eq!(status, StatusCode::OK);
}

#[tokio::test]
async fn test_metrics_endpoint_reports_recommendations() {
    let (app, _health) = setup_test_app().await;

    let (status, _) = post(app.clone(), "/api/v1/optimize/ec2-instance", ec2_body(json!({}))).await;
    assert_eq!(status, StatusCode::OK);

    let (status, body) = get(app, "/metrics").await;
    assert_eq!(status, StatusCode::OK);
    let text = String::from_utf8(body).unwrap();
    assert!(text.contains("rightsizing_recommendations_total"));
    assert!(text.contains("rightsizing_recommendation_latency_seconds_bucket"));
}

// ---------------------------------------------------------------------------
// Optimize endpoints
// ---------------------------------------------------------------------------

#[tokio::test]
async fn test_optimize_ec2_echoes_request_id() {
    let (app, _health) = setup_test_app().await;

    let (status, body) = post(app, "/api/v1/optimize/ec2-instance", ec2_body(json!({}))).await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["request_id"], "req-42");
    assert_eq!(body["current"]["instance_type"], "m5.large");
    assert_eq!(body["recommended"]["instance_type"], "c6g.medium");
    assert_eq!(body["recommended"]["cost"], 24.82);
    assert_eq!(body["description"], "");
}

#[tokio::test]
async fn test_optimize_invalid_preference_is_bad_request() {
    let (app, _health) = setup_test_app().await;

    let (status, body) = post(
        app,
        "/api/v1/optimize/ec2-instance",
        ec2_body(json!({"CPUBreathingRoom": "abc"})),
    )
    .await;

    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["request_id"], "req-42");
    assert!(body["error"].as_str().unwrap().contains("CPUBreathingRoom"));
}

#[tokio::test]
async fn test_optimize_cost_outage_is_bad_gateway() {
    let (app, health) = setup_app(Arc::new(DownQuoter)).await;

    let (status, _) = post(app, "/api/v1/optimize/ec2-instance", ec2_body(json!({}))).await;

    assert_eq!(status, StatusCode::BAD_GATEWAY);
    let health = health.health().await;
    assert_eq!(
        health.components[components::COST_SERVICE].status,
        rightsizing_engine::ComponentStatus::Degraded
    );
}

#[tokio::test]
async fn test_optimize_ebs_pinned_type_has_no_fit() {
    let (app, _health) = setup_test_app().await;
    let mut body = ebs_body("vol-1", json!({"VolumeType": null}));
    body["request_id"] = json!("req-ebs");

    let (status, body) = post(app, "/api/v1/optimize/ebs-volume", body).await;

    // Only gp3 is in the catalog and the volume is pinned to gp2
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["request_id"], "req-ebs");
    assert!(body["recommended"].is_null());
    assert_eq!(body["current"]["volume_type"], "gp2");
}

#[tokio::test]
async fn test_optimize_ec2_with_volumes_reports_item_failures() {
    let (app, _health) = setup_test_app().await;
    let body = json!({
        "request_id": "req-batch",
        "instance": ec2_body(json!({})),
        "volumes": [
            ebs_body("vol-ok", json!({})),
            ebs_body("vol-bad", json!({"IOPSBreathingRoom": "-10"}))
        ]
    });

    let (status, body) = post(app, "/api/v1/optimize/ec2-instance-with-volumes", body).await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["instance"]["recommended"]["instance_type"], "c6g.medium");
    assert_eq!(body["volumes"].as_array().unwrap().len(), 1);
    assert_eq!(body["failures"][0]["id"], "vol-bad");
    assert_eq!(body["failures"][0]["input_error"], true);
}

#[tokio::test]
async fn test_optimize_gcp_disk_without_feasible_tier_is_unprocessable() {
    let (app, _health) = setup_test_app().await;
    let body = json!({
        "request_id": "req-disk",
        "disk_id": "data-1",
        "disk_type": "pd-balanced",
        "size_gb": 100,
        "machine_type": "e2-small",
        "region": "us-central1",
        "metrics": {
            "disk_read_ops_count": [{"timestamp": "2024-01-01T00:00:00Z", "average": 1000000.0}]
        }
    });

    let (status, body) = post(app, "/api/v1/optimize/gcp-disk", body).await;

    assert_eq!(status, StatusCode::UNPROCESSABLE_ENTITY);
    assert_eq!(body["request_id"], "req-disk");
}

#[tokio::test]
async fn test_optimize_kubernetes_workload() {
    let (app, _health) = setup_test_app().await;
    let replica = |name: &str, cpu: f64| {
        json!({
            "namespace": "shop",
            "name": name,
            "containers": [{
                "name": "app",
                "cpu_request": "1",
                "memory_request": "512Mi",
                "metrics": {
                    "cpu": [{"timestamp": "2024-01-01T00:00:00Z", "average": cpu}],
                    "memory": [{"timestamp": "2024-01-01T00:00:00Z", "average": 209715200.0}]
                }
            }]
        })
    };
    let body = json!({
        "request_id": "req-k8s",
        "kind": "Deployment",
        "namespace": "shop",
        "name": "web",
        "replicas": [replica("web-a", 0.2), replica("web-b", 0.4)]
    });

    let (status, body) = post(app, "/api/v1/optimize/kubernetes-workload", body).await;

    assert_eq!(status, StatusCode::OK);
    let shared = &body["containers"][0]["recommended"];
    assert_eq!(shared["cpu_request"], 0.4);
    for replica in body["replicas"].as_array().unwrap() {
        assert_eq!(&replica["containers"][0]["recommended"], shared);
    }
}

#[tokio::test]
async fn test_optimize_rejects_malformed_body() {
    let (app, _health) = setup_test_app().await;

    let (status, _) = post(
        app,
        "/api/v1/optimize/ec2-instance",
        json!({"request_id": "req-1", "instance_id": "i-1"}),
    )
    .await;

    assert!(status.is_client_error());
}
