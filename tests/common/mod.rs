//! Shared test infrastructure for normcache integration tests.
//!
//! Provides TestEnv plus canned operations and response bodies matching a
//! small task-list schema.

#![allow(dead_code)]

use async_trait::async_trait;
use normcache::{
    Client, DetectionMode, FetchPolicy, Field, Operation, RawResponse, Selection, StaticTransport,
    Transport, TransportError,
};
use serde_json::{Value, json};
use std::sync::Arc;
use std::time::Duration;

/// Test environment: an in-memory client over a canned transport.
pub struct TestEnv {
    pub transport: Arc<StaticTransport>,
    pub client: Client,
}

impl TestEnv {
    /// Client with default settings (cache-first, structured detection).
    pub fn new() -> Self {
        Self::build(|b| b)
    }

    /// Client with a custom builder tweak applied.
    pub fn build(
        tweak: impl FnOnce(normcache::ClientBuilder) -> normcache::ClientBuilder,
    ) -> Self {
        init_logging();
        let transport = Arc::new(StaticTransport::new());
        let builder = Client::builder().transport(Arc::clone(&transport) as Arc<dyn Transport>);
        let client = tweak(builder).build().expect("Failed to build client");
        Self { transport, client }
    }

    pub fn with_fetch_policy(policy: FetchPolicy) -> Self {
        Self::build(|b| b.fetch_policy(policy))
    }

    pub fn with_detection(mode: DetectionMode) -> Self {
        Self::build(|b| b.detection_mode(mode))
    }

    /// Queue a 200 response.
    pub fn respond(&self, body: &str) {
        self.transport.push_body(body);
    }

    /// Queue a 200 response from a JSON value.
    pub fn respond_json(&self, body: &Value) {
        self.transport.push_body(&body.to_string());
    }

    /// Queue a non-2xx response.
    pub fn respond_status(&self, status: u16) {
        self.transport.push(RawResponse::status(status));
    }
}

impl Default for TestEnv {
    fn default() -> Self {
        Self::new()
    }
}

/// Route `log` output to the test harness; `RUST_LOG=debug` shows the
/// cache-miss traces when a test fails.
pub fn init_logging() {
    let _ = env_logger::builder().is_test(true).try_init();
}

/// Selection for a task entity: `{ __typename id title status }`.
pub fn task_fields() -> Selection {
    Selection::of([
        Field::new("__typename"),
        Field::new("id"),
        Field::new("title"),
        Field::new("status"),
    ])
}

/// `query AllTasks { allTasks { __typename id title status } }`
pub fn all_tasks() -> Operation {
    Operation::query(
        "AllTasks",
        "query AllTasks { allTasks { __typename id title status } }",
        Selection::of([Field::new("allTasks").select(task_fields())]),
    )
}

/// `query GetTask($id: ID!) { task(id: $id) { ... } }`
pub fn get_task(id: &str) -> Operation {
    Operation::query(
        "GetTask",
        "query GetTask($id: ID!) { task(id: $id) { __typename id title status } }",
        Selection::of([Field::new("task").argument_var("id", "id").select(task_fields())]),
    )
    .variable("id", json!(id))
}

/// A mutation whose response selects only the given fields of one task.
pub fn update_task(name: &str, selected: &[&str]) -> Operation {
    let fields = selected.iter().map(|f| Field::new(f.to_string()));
    Operation::mutation(
        name,
        format!("mutation {} {{ updateTask {{ {} }} }}", name, selected.join(" ")),
        Selection::of([Field::new("updateTask").select(Selection::of(fields))]),
    )
}

/// Body for an allTasks response.
pub fn all_tasks_body(tasks: &[(&str, &str, &str)]) -> Value {
    let tasks: Vec<Value> = tasks
        .iter()
        .map(|(id, title, status)| {
            json!({"__typename": "Task", "id": id, "title": title, "status": status})
        })
        .collect();
    json!({"data": {"allTasks": tasks}})
}

/// Body for a single-task response under the given root field.
pub fn task_body(root_field: &str, task: Value) -> Value {
    json!({"data": {root_field: task}})
}

/// Transport that never completes; used to exercise cancellation.
pub struct StallTransport;

#[async_trait]
impl Transport for StallTransport {
    async fn send(&self, _operation: &Operation) -> Result<RawResponse, TransportError> {
        tokio::time::sleep(Duration::from_secs(3600)).await;
        Err(TransportError("stalled".to_string()))
    }
}
