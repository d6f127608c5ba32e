//! Test harness for isolated sync service execution.

#![allow(dead_code)]

use std::time::Duration;

use serde::Deserialize;
use serde_json::json;
use tokio::runtime::Runtime;
use tokio::sync::broadcast;

use confsync::source::{ChangeSender, ChannelSourceDriver};
use confsync::validation::JsonSchemaValidator;
use confsync::{Action, ConfigFileChange, ConfigSync, Notice, SourceDriver, ValidationPipeline};

/// How long to wait for an expected message before failing.
pub const RECV_TIMEOUT: Duration = Duration::from_secs(5);

/// How long to wait before concluding that nothing else is coming.
pub const QUIET_PERIOD: Duration = Duration::from_millis(300);

#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct Item {
    pub id: String,
    pub val: i64,
}

impl Item {
    pub fn new(id: &str, val: i64) -> Self {
        Self {
            id: id.to_string(),
            val,
        }
    }
}

/// Pipeline for `Item`s: YAML documents with a required string `id` and integer `val`.
pub fn item_pipeline() -> ValidationPipeline<Item> {
    let schema = JsonSchemaValidator::new(&json!({
        "type": "object",
        "required": ["id", "val"],
        "properties": {
            "id": { "type": "string", "minLength": 1 },
            "val": { "type": "integer" }
        }
    }))
    .expect("schema compiles");
    ValidationPipeline::yaml(schema, |item: &Item| Some(item.id.clone()))
}

/// YAML content for a list of `(id, val)` pairs, one document each.
pub fn yaml(items: &[(&str, i64)]) -> String {
    items
        .iter()
        .map(|(id, val)| format!("id: {}\nval: {}\n", id, val))
        .collect::<Vec<_>>()
        .join("---\n")
}

/// Receives one message or panics after `RECV_TIMEOUT`.
pub fn recv<T: Clone>(rt: &Runtime, rx: &mut broadcast::Receiver<T>) -> T {
    rt.block_on(async {
        tokio::time::timeout(RECV_TIMEOUT, rx.recv())
            .await
            .expect("timed out waiting for message")
            .expect("channel closed")
    })
}

/// Receives `n` messages in order.
pub fn recv_n<T: Clone>(rt: &Runtime, rx: &mut broadcast::Receiver<T>, n: usize) -> Vec<T> {
    (0..n).map(|_| recv(rt, rx)).collect()
}

/// Asserts that nothing arrives within `QUIET_PERIOD`.
pub fn assert_quiet<T: Clone + std::fmt::Debug>(rt: &Runtime, rx: &mut broadcast::Receiver<T>) {
    let result = rt.block_on(async { tokio::time::timeout(QUIET_PERIOD, rx.recv()).await });
    if let Ok(message) = result {
        panic!("expected no message, got {:?}", message);
    }
}

/// A running `ConfigSync<Item>` fed by one or more channel sources.
pub struct TestHarness {
    pub rt: Runtime,
    pub sync: ConfigSync<Item>,
    pub senders: Vec<ChangeSender>,
    pub actions: broadcast::Receiver<Action<Item>>,
    pub notices: broadcast::Receiver<Notice>,
}

impl TestHarness {
    /// Single channel source named `push`.
    pub fn new() -> Self {
        Self::with_sources(&["push"])
    }

    pub fn with_sources(names: &[&str]) -> Self {
        let mut drivers: Vec<Box<dyn SourceDriver>> = Vec::new();
        let mut senders = Vec::new();
        for name in names {
            let (driver, sender) = ChannelSourceDriver::new(*name);
            drivers.push(Box::new(driver));
            senders.push(sender);
        }

        let sync = ConfigSync::new(item_pipeline(), drivers);
        let actions = sync.subscribe();
        let notices = sync.subscribe_notices();
        sync.start().expect("sync starts");

        Self {
            rt: Runtime::new().expect("test runtime"),
            sync,
            senders,
            actions,
            notices,
        }
    }

    /// Pushes a change through the first source.
    pub fn push(&self, change: ConfigFileChange) {
        self.push_to(0, change);
    }

    pub fn push_to(&self, source: usize, change: ConfigFileChange) {
        self.senders[source].send(change).expect("source is running");
    }

    pub fn next_action(&mut self) -> Action<Item> {
        recv(&self.rt, &mut self.actions)
    }

    pub fn next_actions(&mut self, n: usize) -> Vec<Action<Item>> {
        recv_n(&self.rt, &mut self.actions, n)
    }

    pub fn next_notice(&mut self) -> Notice {
        recv(&self.rt, &mut self.notices)
    }

    pub fn assert_no_actions(&mut self) {
        assert_quiet(&self.rt, &mut self.actions);
    }
}

impl Drop for TestHarness {
    fn drop(&mut self) {
        self.sync.stop();
        let _ = self.sync.wait();
    }
}
