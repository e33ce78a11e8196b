//! Seed data written to an empty local cache.

use chrono::{DateTime, TimeZone, Utc};
use std::collections::BTreeMap;

use super::types::{Definition, ExecutionMode, Executor, Run, RunStatus, Suite};

fn at(day: u32, hour: u32, minute: u32) -> DateTime<Utc> {
  Utc
    .with_ymd_and_hms(2024, 5, day, hour, minute, 0)
    .single()
    .unwrap_or_default()
}

fn strings(items: &[&str]) -> Vec<String> {
  items.iter().map(|s| s.to_string()).collect()
}

pub fn executors() -> Vec<Executor> {
  vec![
    Executor {
      id: "node-executor".into(),
      name: "Node.js".into(),
      image: "node:20-alpine".into(),
      description: Some("Runs JavaScript test suites with npm".into()),
      command: Some(strings(&["npm", "test"])),
      supported_file_types: Some(strings(&["js", "ts"])),
      env: None,
      created_at: at(1, 9, 0),
    },
    Executor {
      id: "python-executor".into(),
      name: "Python".into(),
      image: "python:3.12-slim".into(),
      description: Some("Runs pytest".into()),
      command: Some(strings(&["pytest", "-q"])),
      supported_file_types: Some(strings(&["py"])),
      env: Some(BTreeMap::from([(
        "PYTHONUNBUFFERED".to_string(),
        "1".to_string(),
      )])),
      created_at: at(1, 9, 5),
    },
  ]
}

pub fn definitions() -> Vec<Definition> {
  vec![
    Definition {
      id: "api-tests".into(),
      name: "API Tests".into(),
      description: "HTTP contract tests against the staging API".into(),
      image: "node:20-alpine".into(),
      commands: strings(&["npm", "run", "test:api"]),
      created_at: at(2, 10, 0),
      executor_id: Some("node-executor".into()),
      variables: Some(BTreeMap::from([(
        "BASE_URL".to_string(),
        "https://staging.example.com".to_string(),
      )])),
      labels: Some(strings(&["api", "smoke"])),
      source: None,
    },
    Definition {
      id: "unit-tests".into(),
      name: "Unit Tests".into(),
      description: "Fast unit test pass".into(),
      image: "python:3.12-slim".into(),
      commands: strings(&["pytest", "tests/unit"]),
      created_at: at(2, 10, 30),
      executor_id: Some("python-executor".into()),
      variables: None,
      labels: Some(strings(&["unit"])),
      source: None,
    },
  ]
}

pub fn runs() -> Vec<Run> {
  vec![
    Run {
      id: "test-1714644000000".into(),
      name: "Unit Tests Run".into(),
      image: "python:3.12-slim".into(),
      command: strings(&["pytest", "tests/unit"]),
      status: RunStatus::Failed,
      created_at: at(2, 10, 0),
      definition_id: Some("unit-tests".into()),
      executor_id: Some("python-executor".into()),
      suite_id: None,
      variables: BTreeMap::new(),
      artifacts: Vec::new(),
      duration: Some(12),
      retries: None,
      logs: strings(&["> Starting test...", "1 failed, 41 passed"]),
      k8s_job_name: None,
      completed: None,
      failed: Some(at(2, 10, 0) + chrono::Duration::seconds(12)),
    },
    Run {
      id: "test-1714640400000".into(),
      name: "API Tests Run".into(),
      image: "node:20-alpine".into(),
      command: strings(&["npm", "run", "test:api"]),
      status: RunStatus::Completed,
      created_at: at(2, 9, 0),
      definition_id: Some("api-tests".into()),
      executor_id: Some("node-executor".into()),
      suite_id: Some("smoke-suite".into()),
      variables: BTreeMap::new(),
      artifacts: strings(&["report.xml"]),
      duration: Some(34),
      retries: None,
      logs: strings(&["> Starting test...", "All tests passed"]),
      k8s_job_name: None,
      completed: Some(at(2, 9, 0) + chrono::Duration::seconds(34)),
      failed: None,
    },
  ]
}

pub fn suites() -> Vec<Suite> {
  vec![Suite {
    id: "smoke-suite".into(),
    name: "Smoke Suite".into(),
    description: "Quick checks before a deploy".into(),
    test_definition_ids: strings(&["api-tests", "unit-tests"]),
    created_at: at(3, 8, 0),
    execution_mode: ExecutionMode::Sequential,
    labels: strings(&["smoke"]),
  }]
}
