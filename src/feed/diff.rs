//! Snapshot diffing for the polling change feed.

use serde::Serialize;
use std::collections::{HashMap, HashSet};

use crate::cache::Record;

/// What happened to a record between two snapshots.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum ChangeKind {
  Insert,
  Update,
  Delete,
}

/// One change detected by a poll.
///
/// For inserts and updates `item` is the new value; for deletes it is the last
/// value seen before the record disappeared.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ChangeEvent<T> {
  pub kind: ChangeKind,
  pub item: T,
}

impl<T> ChangeEvent<T> {
  pub fn insert(item: T) -> Self {
    Self {
      kind: ChangeKind::Insert,
      item,
    }
  }

  pub fn update(item: T) -> Self {
    Self {
      kind: ChangeKind::Update,
      item,
    }
  }

  pub fn delete(item: T) -> Self {
    Self {
      kind: ChangeKind::Delete,
      item,
    }
  }
}

/// Classify every identity in `previous ∪ current`.
///
/// Inserts come first, then updates, then deletes; within each group the order
/// of the snapshot is kept. An identity produces at most one event, so a
/// snapshot that repeats an id only reports its first occurrence.
pub fn diff_snapshots<T: Record>(previous: &[T], current: &[T]) -> Vec<ChangeEvent<T>> {
  let mut before: HashMap<String, &T> = HashMap::with_capacity(previous.len());
  for item in previous {
    before.entry(item.record_id()).or_insert(item);
  }

  let mut after: HashSet<String> = HashSet::with_capacity(current.len());
  let mut inserts = Vec::new();
  let mut updates = Vec::new();

  for item in current {
    let id = item.record_id();
    if !after.insert(id.clone()) {
      continue;
    }
    match before.get(&id) {
      None => inserts.push(ChangeEvent::insert(item.clone())),
      Some(prev) if !same_content(*prev, item) => updates.push(ChangeEvent::update(item.clone())),
      Some(_) => {}
    }
  }

  let mut deleted: HashSet<String> = HashSet::new();
  let mut deletes = Vec::new();
  for item in previous {
    let id = item.record_id();
    if after.contains(&id) || !deleted.insert(id) {
      continue;
    }
    deletes.push(ChangeEvent::delete(item.clone()));
  }

  inserts.into_iter().chain(updates).chain(deletes).collect()
}

/// Deep equality on the serialized form.
fn same_content<T: Record>(a: &T, b: &T) -> bool {
  match (serde_json::to_value(a), serde_json::to_value(b)) {
    (Ok(a), Ok(b)) => a == b,
    _ => false,
  }
}

/// Snapshot memory of one subscription.
#[derive(Debug)]
pub struct PollState<T> {
  previous: Vec<T>,
}

impl<T: Record> PollState<T> {
  /// Start from an empty snapshot, so the first poll reports every record as inserted.
  pub fn new() -> Self {
    Self {
      previous: Vec::new(),
    }
  }

  /// Diff `current` against the remembered snapshot and remember `current`.
  pub fn advance(&mut self, current: Vec<T>) -> Vec<ChangeEvent<T>> {
    let events = diff_snapshots(&self.previous, &current);
    self.previous = current;
    events
  }

  pub fn snapshot(&self) -> &[T] {
    &self.previous
  }
}

impl<T: Record> Default for PollState<T> {
  fn default() -> Self {
    Self::new()
  }
}
