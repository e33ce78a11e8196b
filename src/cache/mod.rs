//! Local cache tier: persistent key-value storage and the typed store built on it.
//!
//! This module provides the offline half of the storage layer:
//! - One storage key per entity type holding a JSON array
//! - Seeding from default items when a key has never been written
//! - Upsert by identity with an insert-order policy and capacity eviction

mod local;
mod storage;
mod traits;

pub use local::LocalStore;
pub use storage::{KeyValueStore, MemoryStorage, SqliteStorage};
pub use traits::{InsertMode, Record, Served, Source};
