//! REST-backed store for one record type.

use async_trait::async_trait;
use reqwest::{Method, Response};
use serde_json::Value;
use std::sync::Arc;
use std::time::Duration;
use tracing::debug;
use url::Url;

use super::transform::Transforms;
use crate::cache::Record;
use crate::clock::{Scheduler, TokioScheduler};
use crate::error::{Result, StoreError};
use crate::feed::{start_feed, ChangeCallback, Subscription};
use crate::store::{EntityStore, StoreConfig};

/// Default polling interval of the remote change feed.
pub const REMOTE_POLL_INTERVAL: Duration = Duration::from_secs(5);

/// Parse an API base URL so relative endpoints join under it.
pub fn parse_base_url(base_url: &str) -> Result<Url> {
  let mut url = Url::parse(base_url)
    .map_err(|e| StoreError::Configuration(format!("invalid API base URL {}: {}", base_url, e)))?;
  if url.cannot_be_a_base() {
    return Err(StoreError::Configuration(format!(
      "API base URL {} cannot carry a path",
      base_url
    )));
  }
  if !url.path().ends_with('/') {
    let path = format!("{}/", url.path());
    url.set_path(&path);
  }
  Ok(url)
}

/// Remote store that talks to `{base}/{endpoint}`.
pub struct RemoteStore<T: Record> {
  inner: Arc<RemoteInner<T>>,
}

struct RemoteInner<T: Record> {
  http: reqwest::Client,
  endpoint: String,
  collection: Url,
  transforms: Transforms<T>,
  scheduler: Arc<dyn Scheduler>,
  poll_interval: Duration,
}

impl<T: Record> RemoteStore<T> {
  pub fn new(http: reqwest::Client, base_url: &str, config: &StoreConfig<T>) -> Result<Self> {
    Self::with_feed(
      http,
      base_url,
      config,
      Arc::new(TokioScheduler),
      REMOTE_POLL_INTERVAL,
    )
  }

  pub fn with_feed(
    http: reqwest::Client,
    base_url: &str,
    config: &StoreConfig<T>,
    scheduler: Arc<dyn Scheduler>,
    poll_interval: Duration,
  ) -> Result<Self> {
    config.validate()?;
    if poll_interval.is_zero() {
      return Err(StoreError::Configuration(
        "polling interval must be greater than zero".to_string(),
      ));
    }

    let collection = parse_base_url(base_url)?.join(&config.endpoint).map_err(|e| {
      StoreError::Configuration(format!("invalid endpoint {}: {}", config.endpoint, e))
    })?;

    Ok(Self {
      inner: Arc::new(RemoteInner {
        http,
        endpoint: config.endpoint.clone(),
        collection,
        transforms: config.transforms.clone(),
        scheduler,
        poll_interval,
      }),
    })
  }

  pub fn collection_url(&self) -> &Url {
    &self.inner.collection
  }

  /// URL of one record; the id is percent-encoded as a single path segment.
  fn item_url(&self, id: &str) -> Result<Url> {
    let mut url = self.inner.collection.clone();
    url
      .path_segments_mut()
      .map_err(|_| {
        StoreError::Configuration(format!("bad collection URL {}", self.inner.collection))
      })?
      .push(id);
    Ok(url)
  }

  async fn send(&self, method: Method, url: Url, body: Option<&Value>) -> Result<Response> {
    debug!(entity = T::entity_type(), %method, %url, "Remote request");
    let mut request = self.inner.http.request(method, url);
    if let Some(body) = body {
      request = request.json(body);
    }
    request
      .send()
      .await
      .map_err(|e| StoreError::remote(&self.inner.endpoint, e.to_string()))
  }

  fn failure(&self, action: &str, response: &Response) -> StoreError {
    let status = response.status();
    StoreError::Remote {
      endpoint: self.inner.endpoint.clone(),
      status: Some(status.as_u16()),
      message: format!("Failed to {} {}: HTTP {}", action, self.inner.endpoint, status),
    }
  }

  async fn read_body(&self, response: Response) -> Result<Option<Value>> {
    let text = response
      .text()
      .await
      .map_err(|e| StoreError::remote(&self.inner.endpoint, e.to_string()))?;
    if text.trim().is_empty() {
      return Ok(None);
    }
    serde_json::from_str(&text)
      .map(Some)
      .map_err(|e| StoreError::Decode {
        entity: T::entity_type(),
        message: e.to_string(),
      })
  }
}

impl<T: Record> Clone for RemoteStore<T> {
  fn clone(&self) -> Self {
    Self {
      inner: Arc::clone(&self.inner),
    }
  }
}

#[async_trait]
impl<T: Record> EntityStore<T> for RemoteStore<T> {
  async fn get_items(&self) -> Result<Vec<T>> {
    let response = self
      .send(Method::GET, self.inner.collection.clone(), None)
      .await?;
    if !response.status().is_success() {
      return Err(self.failure("fetch", &response));
    }

    match self.read_body(response).await? {
      Some(body) => self.inner.transforms.decode(body),
      None => Ok(Vec::new()),
    }
  }

  async fn save_item(&self, item: T) -> Result<T> {
    let id = item.record_id();
    let (method, url) = if id.is_empty() {
      (Method::POST, self.inner.collection.clone())
    } else {
      (Method::PUT, self.item_url(&id)?)
    };

    let payload = self.inner.transforms.encode(&item)?;
    let response = self.send(method, url, Some(&payload)).await?;
    if !response.status().is_success() {
      return Err(self.failure("save", &response));
    }

    // The API echoes the stored record; an empty body means it kept ours as-is
    let saved = match self.read_body(response).await? {
      Some(body) => self.inner.transforms.decode(body)?.into_iter().next(),
      None => None,
    };
    Ok(saved.unwrap_or(item))
  }

  async fn delete_item(&self, id: &str) -> Result<bool> {
    let response = self.send(Method::DELETE, self.item_url(id)?, None).await?;
    // Non-success is reported as `false` rather than an error
    Ok(response.status().is_success())
  }

  async fn get_item_by_id(&self, id: &str) -> Result<Option<T>> {
    Ok(
      self
        .get_items()
        .await?
        .into_iter()
        .find(|item| item.record_id() == id),
    )
  }

  fn subscribe(&self, callback: ChangeCallback<T>) -> Result<Subscription> {
    start_feed(
      Arc::new(self.clone()),
      self.inner.scheduler.as_ref(),
      self.inner.poll_interval,
      callback,
    )
  }

  async fn initialize(&self) -> Result<()> {
    Ok(())
  }
}
