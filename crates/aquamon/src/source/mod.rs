//! Remote record access.
//!
//! The dashboard never talks to a concrete database client. It holds an
//! `Arc<dyn DataSource>` which can subscribe to a record, read it once, and
//! apply partial-field patches to it. Backends register a factory in
//! [`REGISTRY`] and are picked from the configuration at startup.

#[cfg(feature = "source_firebase")]
mod firebase;
mod memory;
pub mod tree;

use std::collections::BTreeMap;
use std::sync::Arc;

use async_trait::async_trait;
use linkme::distributed_slice;
use serde::Serialize;
use serde_json::Value;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::error;
use tracing::info;

use crate::config::Config;
#[cfg(feature = "source_firebase")]
pub use firebase::FirebaseSource;
pub use memory::MemorySource;

/// Capacity of the channel between a backend's stream task and the subscriber.
pub const SUBSCRIPTION_CHANNEL_SIZE: usize = 256;

/// A change notification for a subscribed record.
#[derive(Debug, Clone, PartialEq)]
pub enum RecordEvent {
    /// The full current value of the record.
    Value(Value),

    /// The record does not exist.
    Absent,
}

impl RecordEvent {
    /// Wrap a raw database value; `null` means the record is absent.
    pub fn from_value(value: Option<Value>) -> Self {
        match value {
            None | Some(Value::Null) => RecordEvent::Absent,
            Some(v) => RecordEvent::Value(v),
        }
    }
}

/// A partial-field write: only the named children of the record change.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
#[serde(transparent)]
pub struct Patch(BTreeMap<String, Value>);

impl Patch {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add or replace a field in the patch.
    pub fn set(mut self, field: impl Into<String>, value: impl Into<Value>) -> Self {
        self.0.insert(field.into(), value.into());
        self
    }

    pub fn get(&self, field: &str) -> Option<&Value> {
        self.0.get(field)
    }

    pub fn contains(&self, field: &str) -> bool {
        self.0.contains_key(field)
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn fields(&self) -> impl Iterator<Item = (&str, &Value)> {
        self.0.iter().map(|(k, v)| (k.as_str(), v))
    }

    /// The patch as a JSON object, the shape the database expects.
    pub fn to_object(&self) -> serde_json::Map<String, Value> {
        self.0.clone().into_iter().collect()
    }
}

impl<K: Into<String>, V: Into<Value>> FromIterator<(K, V)> for Patch {
    fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
        Self(
            iter.into_iter()
                .map(|(k, v)| (k.into(), v.into()))
                .collect(),
        )
    }
}

/// Errors raised by data source backends.
#[derive(Debug, thiserror::Error)]
pub enum SourceError {
    #[cfg(feature = "source_firebase")]
    #[error("HTTP request failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error("server returned {status}: {body}")]
    Status { status: u16, body: String },

    #[error("invalid record data: {0}")]
    Decode(#[from] serde_json::Error),

    #[error("subscription stream error: {0}")]
    Stream(String),

    #[error("failed to read seed data {0}: {1}")]
    Seed(std::path::PathBuf, #[source] std::io::Error),
}

/// A live subscription to one record.
///
/// Dropping the subscription releases it: the backend task feeding it is
/// aborted.
pub struct Subscription {
    rx: mpsc::Receiver<RecordEvent>,
    task: Option<JoinHandle<()>>,
}

impl Subscription {
    pub fn new(rx: mpsc::Receiver<RecordEvent>, task: Option<JoinHandle<()>>) -> Self {
        Self { rx, task }
    }

    /// Wait for the next notification. Returns None once the backend has
    /// stopped delivering.
    pub async fn next(&mut self) -> Option<RecordEvent> {
        self.rx.recv().await
    }
}

impl Drop for Subscription {
    fn drop(&mut self) {
        if let Some(task) = self.task.take() {
            task.abort();
        }
    }
}

impl std::fmt::Debug for Subscription {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Subscription")
            .field("has_task", &self.task.is_some())
            .finish()
    }
}

/// Trait implemented by every backend.
///
/// This allows substituting the in-memory source for the hosted database in
/// tests and offline runs.
#[async_trait]
pub trait DataSource: Send + Sync {
    /// Short backend identifier for logs ("firebase", "memory")
    fn name(&self) -> &str;

    /// Open a persistent subscription to the record at `path`.
    ///
    /// The first notification carries the current value (or absence); every
    /// later change delivers the full record again.
    async fn subscribe(&self, path: &str) -> Result<Subscription, SourceError>;

    /// One-shot read of the record at `path`. `Ok(None)` means absent.
    async fn get(&self, path: &str) -> Result<Option<Value>, SourceError>;

    /// Update only the fields named in `patch`, leaving the others untouched.
    async fn patch(&self, path: &str, patch: &Patch) -> Result<(), SourceError>;
}

pub struct SourceContext<'a> {
    pub config: &'a Config,
}

/// Result type for backend factory functions
pub type SourceFactoryResult = anyhow::Result<Option<Arc<dyn DataSource>>>;

#[distributed_slice]
pub static REGISTRY: [fn(&SourceContext) -> SourceFactoryResult];

/// Build the data source selected by the configuration.
///
/// Factories return `Ok(None)` when their section is not configured; the
/// first backend that comes up wins. If none comes up, the first setup
/// failure is returned.
pub fn from_config(config: &Config) -> anyhow::Result<Arc<dyn DataSource>> {
    let ctx = SourceContext { config };
    let mut failure: Option<anyhow::Error> = None;
    for constr in REGISTRY {
        match constr(&ctx) {
            Ok(Some(source)) => {
                info!("Using {} data source", source.name());
                return Ok(source);
            }
            Ok(None) => continue,
            Err(e) => {
                error!("failed to set up data source: {:#}", e);
                failure.get_or_insert(e);
            }
        }
    }

    match failure {
        Some(e) => Err(e.context("failed to set up the configured data source")),
        None => anyhow::bail!(
            "no data source configured; add a [source.firebase] or [source.memory] section"
        ),
    }
}
