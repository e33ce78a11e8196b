//! Request/response hooks between records and their wire representation.

use serde_json::Value;
use std::sync::Arc;

use crate::cache::Record;
use crate::error::{Result, StoreError};

/// Turns a record into the request body sent to the API.
pub type RequestHook<T> = Arc<dyn Fn(&T) -> Result<Value> + Send + Sync>;

/// Turns a response array into records. May drop or reorder entries.
pub type ResponseHook<T> = Arc<dyn Fn(Value) -> Result<Vec<T>> + Send + Sync>;

/// Optional wire transforms of a remote store.
///
/// Without hooks records go over the wire exactly as they serialize locally.
pub struct Transforms<T> {
  request: Option<RequestHook<T>>,
  response: Option<ResponseHook<T>>,
}

impl<T: Record> Transforms<T> {
  pub fn none() -> Self {
    Self {
      request: None,
      response: None,
    }
  }

  pub fn with_request<F>(mut self, hook: F) -> Self
  where
    F: Fn(&T) -> Result<Value> + Send + Sync + 'static,
  {
    self.request = Some(Arc::new(hook));
    self
  }

  pub fn with_response<F>(mut self, hook: F) -> Self
  where
    F: Fn(Value) -> Result<Vec<T>> + Send + Sync + 'static,
  {
    self.response = Some(Arc::new(hook));
    self
  }

  /// Build the request body for `item`.
  pub fn encode(&self, item: &T) -> Result<Value> {
    match &self.request {
      Some(hook) => hook(item),
      None => serde_json::to_value(item).map_err(json_error::<T>),
    }
  }

  /// Decode a response body. A single object is treated as a one-element list.
  pub fn decode(&self, body: Value) -> Result<Vec<T>> {
    let list = match body {
      Value::Array(_) => body,
      Value::Object(_) => Value::Array(vec![body]),
      other => {
        return Err(StoreError::Decode {
          entity: T::entity_type(),
          message: format!("expected an object or array, got {}", other),
        })
      }
    };

    match &self.response {
      Some(hook) => hook(list),
      None => serde_json::from_value(list).map_err(json_error::<T>),
    }
  }
}

impl<T> Clone for Transforms<T> {
  fn clone(&self) -> Self {
    Self {
      request: self.request.clone(),
      response: self.response.clone(),
    }
  }
}

pub(crate) fn json_error<T: Record>(e: serde_json::Error) -> StoreError {
  StoreError::Decode {
    entity: T::entity_type(),
    message: e.to_string(),
  }
}

// ============================================================================
// Identifier shim
// ============================================================================

/// All-zero UUID used when a record has no id yet.
pub const NIL_UUID: &str = "00000000-0000-0000-0000-000000000000";

const UUID_PREFIX: &str = "00000000-0000-0000-0000-";

/// Check for the 8-4-4-4-12 hex layout, case-insensitive.
pub fn is_uuid(id: &str) -> bool {
  let bytes = id.as_bytes();
  bytes.len() == 36
    && bytes.iter().enumerate().all(|(i, b)| match i {
      8 | 13 | 18 | 23 => *b == b'-',
      _ => b.is_ascii_hexdigit(),
    })
}

/// Map a legacy short id into the fixed-prefix UUID template.
///
/// UUID-shaped ids pass through. Anything else is left-padded with `0` to 12
/// characters and its first 12 characters fill the last group. Not a
/// bijection: ids longer than 12 characters that share a prefix collide, and
/// non-hex characters survive into the result.
pub fn legacy_id_to_uuid(id: &str) -> String {
  if is_uuid(id) {
    return id.to_string();
  }
  let len = id.chars().count();
  let padded: String = std::iter::repeat('0')
    .take(12usize.saturating_sub(len))
    .chain(id.chars())
    .take(12)
    .collect();
  format!("{}{}", UUID_PREFIX, padded)
}
