//! API client for the rightsizer service

use anyhow::{Context, Result};
use reqwest::Client;
use serde::{de::DeserializeOwned, Deserialize, Serialize};
use std::collections::BTreeMap;
use thiserror::Error;
use url::Url;

/// A non-success answer from the service
#[derive(Debug, Error)]
pub enum ClientError {
    #[error("API error ({status}): {message}")]
    Api { status: u16, message: String },
}

/// API client for the rightsizer service
pub struct ApiClient {
    client: Client,
    base_url: Url,
}

impl ApiClient {
    /// Create a new API client
    pub fn new(base_url: &str) -> Result<Self> {
        let client = Client::builder()
            .timeout(std::time::Duration::from_secs(60))
            .build()
            .context("Failed to create HTTP client")?;

        let base_url = Url::parse(base_url).context("Invalid API URL")?;

        Ok(Self { client, base_url })
    }

    /// Make a POST request with JSON body
    pub async fn post<T: DeserializeOwned, B: Serialize>(&self, path: &str, body: &B) -> Result<T> {
        let url = self.base_url.join(path).context("Invalid path")?;

        let response = self
            .client
            .post(url)
            .json(body)
            .send()
            .await
            .context("Failed to send request")?;

        Self::decode(response).await
    }

    /// Error bodies carry `{ "error": ... }`; anything else is reported verbatim
    async fn decode<T: DeserializeOwned>(response: reqwest::Response) -> Result<T> {
        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            let message = serde_json::from_str::<ErrorResponse>(&body)
                .map(|e| e.error)
                .unwrap_or(body);
            return Err(ClientError::Api {
                status: status.as_u16(),
                message,
            }
            .into());
        }

        response.json().await.context("Failed to parse response")
    }

    /// Submit one optimize request; the body already carries `request_id`
    pub async fn optimize(&self, route: &str, body: &serde_json::Value) -> Result<serde_json::Value> {
        self.post(&format!("api/v1/optimize/{}", route), body).await
    }

    pub async fn health(&self) -> Result<HealthSummary> {
        // 503 still carries the component breakdown
        let url = self.base_url.join("healthz").context("Invalid path")?;
        let response = self
            .client
            .get(url)
            .send()
            .await
            .context("Failed to send request")?;
        response.json().await.context("Failed to parse health response")
    }
}

// API response types

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ErrorResponse {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub request_id: Option<String>,
    pub error: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ComponentSummary {
    pub status: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HealthSummary {
    pub status: String,
    #[serde(default)]
    pub components: BTreeMap<String, ComponentSummary>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use mockito::Matcher;
    use serde_json::json;

    #[tokio::test]
    async fn test_optimize_posts_to_kind_route() {
        let mut server = mockito::Server::new_async().await;
        let mock = server
            .mock("POST", "/api/v1/optimize/ebs-volume")
            .match_body(Matcher::PartialJson(json!({"request_id": "r-1", "volume_id": "vol-1"})))
            .with_status(200)
            .with_header("content-type", "application/json")
            .with_body(r#"{"request_id":"r-1","current":{"volume_type":"gp2","cost":10.0},"recommended":null,"description":""}"#)
            .create_async()
            .await;

        let client = ApiClient::new(&server.url()).unwrap();
        let response = client
            .optimize("ebs-volume", &json!({"request_id": "r-1", "volume_id": "vol-1"}))
            .await
            .unwrap();

        mock.assert_async().await;
        assert_eq!(response["request_id"], "r-1");
        assert!(response["recommended"].is_null());
    }

    #[tokio::test]
    async fn test_error_body_message_is_surfaced() {
        let mut server = mockito::Server::new_async().await;
        server
            .mock("POST", "/api/v1/optimize/ec2-instance")
            .with_status(400)
            .with_header("content-type", "application/json")
            .with_body(r#"{"request_id":"r-2","error":"invalid preference CPUBreathingRoom: not a number: \"abc\""}"#)
            .create_async()
            .await;

        let client = ApiClient::new(&server.url()).unwrap();
        let err = client
            .optimize("ec2-instance", &json!({"request_id": "r-2"}))
            .await
            .unwrap_err();

        match err.downcast_ref::<ClientError>() {
            Some(ClientError::Api { status, message }) => {
                assert_eq!(*status, 400);
                assert!(message.contains("CPUBreathingRoom"));
            }
            None => panic!("unexpected error: {err}"),
        }
    }

    #[tokio::test]
    async fn test_health_reads_unavailable_body() {
        let mut server = mockito::Server::new_async().await;
        server
            .mock("GET", "/healthz")
            .with_status(503)
            .with_header("content-type", "application/json")
            .with_body(r#"{"status":"unhealthy","components":{"catalog":{"status":"unhealthy","message":"unreadable","last_check_timestamp":0}}}"#)
            .create_async()
            .await;

        let client = ApiClient::new(&server.url()).unwrap();
        let health = client.health().await.unwrap();

        assert_eq!(health.status, "unhealthy");
        assert_eq!(health.components["catalog"].message.as_deref(), Some("unreadable"));
    }

    #[test]
    fn test_invalid_base_url_is_rejected() {
        assert!(ApiClient::new("not a url").is_err());
    }
}
