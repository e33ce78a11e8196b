//! Read-mostly cluster endpoints that sit beside the entity collections.

use reqwest::{Method, Response};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use tracing::debug;
use url::Url;

use super::client::parse_base_url;
use crate::error::{Result, StoreError};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct KubernetesHealth {
  pub kubernetes_connected: bool,
  pub timestamp: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct JobLogs {
  pub job_name: String,
  #[serde(default)]
  pub pod_name: String,
  #[serde(default)]
  pub logs: String,
  pub timestamp: String,
  #[serde(default)]
  pub status: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct JobStatus {
  pub job_name: String,
  pub status: String,
  pub timestamp: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct JobDeleteResponse {
  pub message: String,
  pub timestamp: String,
}

/// Client for the job backend's cluster endpoints.
///
/// These are not entity collections, so they skip the store machinery and
/// have no local fallback.
#[derive(Clone)]
pub struct ClusterClient {
  http: reqwest::Client,
  base: Url,
}

impl ClusterClient {
  pub fn new(http: reqwest::Client, base_url: &str) -> Result<Self> {
    Ok(Self {
      http,
      base: parse_base_url(base_url)?,
    })
  }

  /// Whether the backend can reach its cluster.
  pub async fn health(&self) -> Result<KubernetesHealth> {
    self.get_json("k8s/health", &["k8s", "health"]).await
  }

  /// Logs of the job behind a run.
  pub async fn run_logs(&self, run_id: &str) -> Result<JobLogs> {
    self
      .get_json("test-runs", &["test-runs", run_id, "logs"])
      .await
  }

  pub async fn job_logs(&self, job_name: &str) -> Result<JobLogs> {
    self
      .get_json("k8s/jobs", &["k8s", "jobs", job_name, "logs"])
      .await
  }

  pub async fn job_status(&self, job_name: &str) -> Result<JobStatus> {
    self
      .get_json("k8s/jobs", &["k8s", "jobs", job_name, "status"])
      .await
  }

  /// Remove a job from the cluster.
  pub async fn delete_job(&self, job_name: &str) -> Result<JobDeleteResponse> {
    let url = self.url("k8s/jobs", &["k8s", "jobs", job_name])?;
    let response = self.send(Method::DELETE, url, "k8s/jobs").await?;
    Self::decode("k8s/jobs", response).await
  }

  fn url(&self, endpoint: &str, segments: &[&str]) -> Result<Url> {
    let mut url = self.base.clone();
    url
      .path_segments_mut()
      .map_err(|_| StoreError::Configuration(format!("bad API base URL {}", self.base)))?
      .pop_if_empty()
      .extend(segments);
    debug!(endpoint, %url, "Cluster request");
    Ok(url)
  }

  async fn get_json<R: DeserializeOwned>(&self, endpoint: &str, segments: &[&str]) -> Result<R> {
    let url = self.url(endpoint, segments)?;
    let response = self.send(Method::GET, url, endpoint).await?;
    Self::decode(endpoint, response).await
  }

  async fn send(&self, method: Method, url: Url, endpoint: &str) -> Result<Response> {
    let response = self
      .http
      .request(method, url)
      .send()
      .await
      .map_err(|e| StoreError::remote(endpoint, e.to_string()))?;

    let status = response.status();
    if !status.is_success() {
      return Err(StoreError::Remote {
        endpoint: endpoint.to_string(),
        status: Some(status.as_u16()),
        message: format!("Failed to call {}: HTTP {}", endpoint, status),
      });
    }
    Ok(response)
  }

  async fn decode<R: DeserializeOwned>(endpoint: &str, response: Response) -> Result<R> {
    response.json::<R>().await.map_err(|e| StoreError::Decode {
      entity: "cluster response",
      message: format!("{}: {}", endpoint, e),
    })
  }
}
