//! Roboflow inference client
//!
//! HTTP client for serverless workflows and hosted detection models.

use std::path::Path;
use std::time::Duration;

use async_trait::async_trait;
use base64::{engine::general_purpose::STANDARD, Engine as _};
use reqwest::Client;
use serde::Serialize;
use serde_json::Value;
use thiserror::Error;
use tracing::debug;

use crate::config::RoboflowConfig;
use crate::pool::{PoolConfig, UpstreamTarget};

#[derive(Debug, Error)]
pub enum InferenceError {
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("API error ({status}): {body}")]
    Api { status: u16, body: String },

    #[error("Image read error: {0}")]
    Io(#[from] std::io::Error),
}

/// Object-detection backend
#[async_trait]
pub trait InferenceBackend: Send + Sync {
    /// Run detection for `pool` on the image stored at `image`, returning the
    /// raw result document.
    async fn infer(&self, pool: &PoolConfig, image: &Path) -> Result<Value, InferenceError>;
}

/// Roboflow API client
pub struct RoboflowClient {
    client: Client,
    api_url: String,
    model_api_url: String,
}

#[derive(Serialize)]
struct WorkflowRequest<'a> {
    api_key: &'a str,
    inputs: WorkflowInputs,
    use_cache: bool,
}

#[derive(Serialize)]
struct WorkflowInputs {
    image: WorkflowImage,
}

#[derive(Serialize)]
struct WorkflowImage {
    #[serde(rename = "type")]
    kind: &'static str,
    value: String,
}

impl RoboflowClient {
    pub fn new(config: &RoboflowConfig) -> Result<Self, InferenceError> {
        let client = Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()?;

        Ok(Self {
            client,
            api_url: config.api_url.trim_end_matches('/').to_string(),
            model_api_url: config.model_api_url.trim_end_matches('/').to_string(),
        })
    }

    async fn run_workflow(
        &self,
        api_key: &str,
        workspace: &str,
        workflow_id: &str,
        image_b64: String,
    ) -> Result<Value, InferenceError> {
        let url = format!("{}/{}/workflows/{}", self.api_url, workspace, workflow_id);

        let request = WorkflowRequest {
            api_key,
            inputs: WorkflowInputs {
                image: WorkflowImage {
                    kind: "base64",
                    value: image_b64,
                },
            },
            use_cache: false,
        };

        debug!(workspace = %workspace, workflow_id = %workflow_id, "Running Roboflow workflow");

        let response = self.client.post(&url).json(&request).send().await?;
        let mut body = Self::json_body(response).await?;

        // Workflows wrap their results in an `outputs` list
        if let Some(outputs) = body.get_mut("outputs") {
            return Ok(outputs.take());
        }
        Ok(body)
    }

    async fn run_model(
        &self,
        api_key: &str,
        model_id: &str,
        image_b64: String,
    ) -> Result<Value, InferenceError> {
        let url = format!("{}/{}", self.model_api_url, model_id);

        debug!(model_id = %model_id, "Running Roboflow hosted model");

        let response = self
            .client
            .post(&url)
            .query(&[("api_key", api_key)])
            .header("Content-Type", "application/x-www-form-urlencoded")
            .body(image_b64)
            .send()
            .await?;

        Self::json_body(response).await
    }

    async fn json_body(response: reqwest::Response) -> Result<Value, InferenceError> {
        let status = response.status();
        if status.is_success() {
            Ok(response.json().await?)
        } else {
            let body = response.text().await.unwrap_or_default();
            Err(InferenceError::Api {
                status: status.as_u16(),
                body,
            })
        }
    }
}

#[async_trait]
impl InferenceBackend for RoboflowClient {
    async fn infer(&self, pool: &PoolConfig, image: &Path) -> Result<Value, InferenceError> {
        let bytes = tokio::fs::read(image).await?;
        let image_b64 = STANDARD.encode(bytes);

        match &pool.upstream {
            UpstreamTarget::Workflow { workspace, workflow_id } => {
                self.run_workflow(&pool.api_key, workspace, workflow_id, image_b64).await
            }
            UpstreamTarget::Model { model_id } => {
                self.run_model(&pool.api_key, model_id, image_b64).await
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_workflow_request_shape() {
        let request = WorkflowRequest {
            api_key: "k",
            inputs: WorkflowInputs {
                image: WorkflowImage {
                    kind: "base64",
                    value: "aGk=".to_string(),
                },
            },
            use_cache: false,
        };
        let json = serde_json::to_value(&request).unwrap();
        assert_eq!(json["inputs"]["image"]["type"], "base64");
        assert_eq!(json["use_cache"], false);
    }

    #[test]
    fn test_client_trims_trailing_slash() {
        let client = RoboflowClient::new(&RoboflowConfig {
            api_key: None,
            api_url: "https://serverless.roboflow.com/".to_string(),
            model_api_url: "https://detect.roboflow.com".to_string(),
            timeout_secs: 15,
        })
        .unwrap();
        assert_eq!(client.api_url, "https://serverless.roboflow.com");
    }
}
