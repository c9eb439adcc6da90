//! External collaborators: cost quoting and explanation
//!
//! Both are traits so the engine can be driven by in-process fakes in tests
//! and by the HTTP clients below in production.

use crate::error::{EngineError, Result};
use crate::models::ResourceKind;
use crate::recommender::{
    EbsVolumeProfile, Ec2InstanceProfile, GcpDiskProfile, GcpInstanceProfile, RdsInstanceProfile,
};
use async_trait::async_trait;
use reqwest::Client;
use serde::{de::DeserializeOwned, Deserialize, Serialize};
use std::time::Duration;
use tracing::debug;
use url::Url;

/// Configuration to be priced
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "resource_kind", content = "configuration", rename_all = "snake_case")]
pub enum CostQuery {
    Ec2Instance(Ec2InstanceProfile),
    EbsVolume(EbsVolumeProfile),
    RdsInstance(RdsInstanceProfile),
    GcpInstance(GcpInstanceProfile),
    GcpDisk(GcpDiskProfile),
}

impl CostQuery {
    pub fn kind(&self) -> ResourceKind {
        match self {
            CostQuery::Ec2Instance(_) => ResourceKind::Ec2Instance,
            CostQuery::EbsVolume(_) => ResourceKind::EbsVolume,
            CostQuery::RdsInstance(_) => ResourceKind::RdsInstance,
            CostQuery::GcpInstance(_) => ResourceKind::GcpInstance,
            CostQuery::GcpDisk(_) => ResourceKind::GcpDisk,
        }
    }
}

/// Prices a configuration. Failures are hard failures of the recommendation.
#[async_trait]
pub trait CostQuoter: Send + Sync {
    async fn quote(&self, query: &CostQuery) -> Result<f64>;
}

/// Everything the explanation service needs to narrate a recommendation
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ExplainRequest {
    pub resource_kind: ResourceKind,
    pub resource_id: String,
    pub current: serde_json::Value,
    pub recommended: Option<serde_json::Value>,
    pub usage_narrative: String,
    pub honored_preferences: Vec<String>,
}

/// Produces a natural-language description. Best-effort.
#[async_trait]
pub trait Explainer: Send + Sync {
    async fn explain(&self, request: &ExplainRequest) -> Result<String>;
}

/// Explainer used when no explanation service is configured
#[derive(Debug, Clone, Copy, Default)]
pub struct DisabledExplainer;

#[async_trait]
impl Explainer for DisabledExplainer {
    async fn explain(&self, _request: &ExplainRequest) -> Result<String> {
        Ok(String::new())
    }
}

#[derive(Debug, Deserialize)]
struct CostResponse {
    cost: f64,
}

#[derive(Debug, Deserialize)]
struct ExplainResponse {
    text: String,
}

/// JSON-over-HTTP POST shared by both clients
#[derive(Debug, Clone)]
struct JsonEndpoint {
    client: Client,
    url: Url,
}

impl JsonEndpoint {
    fn new(base_url: &str, path: &str, timeout: Duration) -> Result<Self> {
        let mut base = Url::parse(base_url)
            .map_err(|e| EngineError::InvalidInput(format!("invalid service URL {}: {}", base_url, e)))?;
        // A base path is a directory, otherwise join() replaces its last segment
        if !base.path().ends_with('/') {
            let dir = format!("{}/", base.path());
            base.set_path(&dir);
        }
        let url = base
            .join(path)
            .map_err(|e| EngineError::InvalidInput(format!("invalid service path {}: {}", path, e)))?;
        let client = Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| EngineError::InvalidInput(format!("failed to create HTTP client: {}", e)))?;
        Ok(Self { client, url })
    }

    async fn post<B: Serialize, T: DeserializeOwned>(
        &self,
        body: &B,
    ) -> std::result::Result<T, String> {
        let response = self
            .client
            .post(self.url.clone())
            .json(body)
            .send()
            .await
            .map_err(|e| format!("request to {} failed: {}", self.url, e))?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            return Err(format!("{} returned {}: {}", self.url, status, body));
        }

        response
            .json()
            .await
            .map_err(|e| format!("invalid response from {}: {}", self.url, e))
    }
}

/// Cost quoting over HTTP: `POST {base}/api/v1/cost`
#[derive(Debug, Clone)]
pub struct HttpCostQuoter {
    endpoint: JsonEndpoint,
}

impl HttpCostQuoter {
    pub fn new(base_url: &str, timeout: Duration) -> Result<Self> {
        Ok(Self {
            endpoint: JsonEndpoint::new(base_url, "api/v1/cost", timeout)?,
        })
    }
}

#[async_trait]
impl CostQuoter for HttpCostQuoter {
    async fn quote(&self, query: &CostQuery) -> Result<f64> {
        let response: CostResponse = self
            .endpoint
            .post(query)
            .await
            .map_err(EngineError::CostQuote)?;

        if !response.cost.is_finite() || response.cost < 0.0 {
            return Err(EngineError::CostQuote(format!(
                "invalid cost {} for {}",
                response.cost,
                query.kind()
            )));
        }
        debug!(kind = %query.kind(), cost = response.cost, "Quoted configuration");
        Ok(response.cost)
    }
}

/// Explanation over HTTP: `POST {base}/api/v1/explain`
#[derive(Debug, Clone)]
pub struct HttpExplainer {
    endpoint: JsonEndpoint,
}

impl HttpExplainer {
    pub fn new(base_url: &str, timeout: Duration) -> Result<Self> {
        Ok(Self {
            endpoint: JsonEndpoint::new(base_url, "api/v1/explain", timeout)?,
        })
    }
}

#[async_trait]
impl Explainer for HttpExplainer {
    async fn explain(&self, request: &ExplainRequest) -> Result<String> {
        let response: ExplainResponse = self
            .endpoint
            .post(request)
            .await
            .map_err(EngineError::Explanation)?;
        Ok(response.text)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::recommender::EbsVolumeProfile;

    fn gp3() -> CostQuery {
        CostQuery::EbsVolume(EbsVolumeProfile {
            volume_type: "gp3".to_string(),
            size_gb: 100.0,
            provisioned_iops: Some(0.0),
            provisioned_throughput_mbps: Some(0.0),
            region: "us-east-1".to_string(),
        })
    }

    fn explain_request() -> ExplainRequest {
        ExplainRequest {
            resource_kind: ResourceKind::EbsVolume,
            resource_id: "vol-1".to_string(),
            current: serde_json::json!({"volume_type": "gp2"}),
            recommended: None,
            usage_narrative: String::new(),
            honored_preferences: vec![],
        }
    }

    #[test]
    fn test_cost_query_is_tagged_by_kind() {
        let json = serde_json::to_value(gp3()).unwrap();
        assert_eq!(json["resource_kind"], "ebs_volume");
        assert_eq!(json["configuration"]["volume_type"], "gp3");
    }

    #[tokio::test]
    async fn test_http_cost_quoter_parses_cost() {
        let mut server = mockito::Server::new_async().await;
        let mock = server
            .mock("POST", "/api/v1/cost")
            .match_body(mockito::Matcher::PartialJson(
                serde_json::json!({"resource_kind": "ebs_volume"}),
            ))
            .with_status(200)
            .with_header("content-type", "application/json")
            .with_body(r#"{"cost": 8.0}"#)
            .create_async()
            .await;

        let quoter = HttpCostQuoter::new(&server.url(), Duration::from_secs(5)).unwrap();
        let cost = quoter.quote(&gp3()).await.unwrap();

        assert_eq!(cost, 8.0);
        mock.assert_async().await;
    }

    #[test]
    fn test_endpoint_keeps_base_path() {
        let quoter = HttpCostQuoter::new("http://pricing.internal/pricing", Duration::from_secs(1)).unwrap();
        assert_eq!(
            quoter.endpoint.url.as_str(),
            "http://pricing.internal/pricing/api/v1/cost"
        );

        let explainer = HttpExplainer::new("http://llm.internal/v2/", Duration::from_secs(1)).unwrap();
        assert_eq!(explainer.endpoint.url.as_str(), "http://llm.internal/v2/api/v1/explain");
    }

    #[tokio::test]
    async fn test_http_cost_quoter_behind_path_prefix() {
        let mut server = mockito::Server::new_async().await;
        let mock = server
            .mock("POST", "/pricing/api/v1/cost")
            .with_status(200)
            .with_body(r#"{"cost": 12.5}"#)
            .create_async()
            .await;

        let base = format!("{}/pricing", server.url());
        let quoter = HttpCostQuoter::new(&base, Duration::from_secs(5)).unwrap();
        assert_eq!(quoter.quote(&gp3()).await.unwrap(), 12.5);
        mock.assert_async().await;
    }

    #[tokio::test]
    async fn test_http_cost_quoter_server_error_is_dependency_error() {
        let mut server = mockito::Server::new_async().await;
        server
            .mock("POST", "/api/v1/cost")
            .with_status(503)
            .with_body("unavailable")
            .create_async()
            .await;

        let quoter = HttpCostQuoter::new(&server.url(), Duration::from_secs(5)).unwrap();
        let err = quoter.quote(&gp3()).await.unwrap_err();
        assert!(matches!(err, EngineError::CostQuote(_)));
        assert!(err.is_dependency());
    }

    #[tokio::test]
    async fn test_http_cost_quoter_rejects_negative_cost() {
        let mut server = mockito::Server::new_async().await;
        server
            .mock("POST", "/api/v1/cost")
            .with_status(200)
            .with_body(r#"{"cost": -1.0}"#)
            .create_async()
            .await;

        let quoter = HttpCostQuoter::new(&server.url(), Duration::from_secs(5)).unwrap();
        assert!(quoter.quote(&gp3()).await.is_err());
    }

    #[tokio::test]
    async fn test_http_explainer_returns_text() {
        let mut server = mockito::Server::new_async().await;
        server
            .mock("POST", "/api/v1/explain")
            .with_status(200)
            .with_body(r#"{"text": "Volume is over-provisioned."}"#)
            .create_async()
            .await;

        let explainer = HttpExplainer::new(&server.url(), Duration::from_secs(5)).unwrap();
        let text = explainer.explain(&explain_request()).await.unwrap();
        assert_eq!(text, "Volume is over-provisioned.");
    }

    #[tokio::test]
    async fn test_disabled_explainer_is_empty() {
        let text = DisabledExplainer.explain(&explain_request()).await.unwrap();
        assert!(text.is_empty());
    }

    #[test]
    fn test_invalid_base_url() {
        let err = HttpCostQuoter::new("not a url", Duration::from_secs(1)).unwrap_err();
        assert!(err.is_input());
    }
}
