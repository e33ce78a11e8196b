//! Resilient entity storage for a containerized test-job dashboard.
//!
//! Every entity type gets one store with a uniform CRUD plus change-feed
//! contract. In hybrid mode the store talks to the job backend's REST API
//! and falls back to a persistent local cache whenever the API fails.

pub mod cache;
pub mod clock;
pub mod commands;
pub mod config;
pub mod entities;
pub mod error;
pub mod feed;
pub mod logging;
pub mod remote;
pub mod store;

pub use error::{Result, StoreError};
