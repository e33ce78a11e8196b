//! HTTP tier: generic REST store, wire transforms and cluster endpoints.

mod client;
mod cluster;
mod transform;

pub use client::{parse_base_url, RemoteStore, REMOTE_POLL_INTERVAL};
pub use cluster::{ClusterClient, JobDeleteResponse, JobLogs, JobStatus, KubernetesHealth};
pub use transform::{
  is_uuid, legacy_id_to_uuid, RequestHook, ResponseHook, Transforms, NIL_UUID,
};
