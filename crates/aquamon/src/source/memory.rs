use std::path::Path;
use std::sync::Arc;
use std::sync::Mutex;
use std::sync::MutexGuard;
use std::sync::PoisonError;

use anyhow::Context;
use async_trait::async_trait;
use linkme::distributed_slice;
use serde_json::Value;
use tokio::sync::mpsc;
use tracing::debug;
use tracing::info;

use super::DataSource;
use super::Patch;
use super::REGISTRY;
use super::RecordEvent;
use super::SUBSCRIPTION_CHANNEL_SIZE;
use super::SourceContext;
use super::SourceError;
use super::SourceFactoryResult;
use super::Subscription;
use super::tree;

struct Subscriber {
    path: String,
    tx: mpsc::Sender<RecordEvent>,
}

#[derive(Default)]
struct Inner {
    root: Value,
    subscribers: Vec<Subscriber>,
    patches: Vec<(String, Patch)>,
    unavailable: bool,
}

/// In-process data source holding the whole database as one JSON tree.
///
/// Used for offline runs (optionally seeded from a JSON file) and as the
/// fake backend in tests: every `patch` is recorded so tests can assert on
/// exactly what was written.
#[derive(Default)]
pub struct MemorySource {
    inner: Mutex<Inner>,

    /// Held from applying a write until its notifications are queued, so
    /// subscribers see changes in the order they were applied.
    write_order: tokio::sync::Mutex<()>,
}

impl MemorySource {
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a source whose database contains `value` at `path`.
    pub fn with_record(path: &str, value: Value) -> Self {
        let source = Self::new();
        tree::set(&mut source.lock().root, &tree::segments(path), value);
        source
    }

    /// Create a source seeded from a JSON file holding the record at `path`.
    pub fn load_seed(path: &str, seed: &Path) -> Result<Self, SourceError> {
        let contents = std::fs::read_to_string(seed)
            .map_err(|e| SourceError::Seed(seed.to_path_buf(), e))?;
        let value: Value = serde_json::from_str(&contents)?;
        Ok(Self::with_record(path, value))
    }

    /// Replace (or with `None`, delete) the record at `path`, as another
    /// client of the database would.
    pub async fn set(&self, path: &str, value: Option<Value>) {
        let segments = tree::segments(path);
        self.write(path, |inner| {
            tree::set(&mut inner.root, &segments, value.unwrap_or(Value::Null))
        })
        .await;
    }

    /// Current value stored at `path`.
    pub fn record(&self, path: &str) -> Option<Value> {
        tree::get(&self.lock().root, &tree::segments(path)).cloned()
    }

    /// Every patch applied so far, in order, with the path it targeted.
    pub fn patches(&self) -> Vec<(String, Patch)> {
        self.lock().patches.clone()
    }

    /// Number of subscriptions that are still open.
    pub fn subscriber_count(&self) -> usize {
        self.lock()
            .subscribers
            .iter()
            .filter(|s| !s.tx.is_closed())
            .count()
    }

    /// Make every operation fail, simulating a backend outage.
    pub fn set_unavailable(&self, unavailable: bool) {
        self.lock().unavailable = unavailable;
    }

    fn lock(&self) -> MutexGuard<'_, Inner> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn check_available(&self) -> Result<(), SourceError> {
        if self.lock().unavailable {
            return Err(SourceError::Status {
                status: 503,
                body: "memory source unavailable".to_string(),
            });
        }
        Ok(())
    }

    /// Apply a write and notify subscribers whose record changed.
    async fn write(&self, path: &str, apply: impl FnOnce(&mut Inner)) {
        let _order = self.write_order.lock().await;
        let pending = {
            let mut inner = self.lock();
            inner.subscribers.retain(|s| !s.tx.is_closed());

            let affected: Vec<(mpsc::Sender<RecordEvent>, String, Option<Value>)> = inner
                .subscribers
                .iter()
                .filter(|s| overlaps(&s.path, path))
                .map(|s| {
                    let before = tree::get(&inner.root, &tree::segments(&s.path)).cloned();
                    (s.tx.clone(), s.path.clone(), before)
                })
                .collect();

            apply(&mut *inner);

            affected
                .into_iter()
                .filter_map(|(tx, sub_path, before)| {
                    let after = tree::get(&inner.root, &tree::segments(&sub_path)).cloned();
                    (after != before).then(|| (tx, RecordEvent::from_value(after)))
                })
                .collect::<Vec<_>>()
        };

        for (tx, event) in pending {
            if tx.send(event).await.is_err() {
                debug!("memory subscriber went away during notify");
            }
        }
    }
}

/// Whether a write at `b` can change the record at `a` (one is a prefix of
/// the other).
fn overlaps(a: &str, b: &str) -> bool {
    let a = tree::segments(a);
    let b = tree::segments(b);
    a.iter().zip(b.iter()).all(|(x, y)| x == y)
}

#[async_trait]
impl DataSource for MemorySource {
    fn name(&self) -> &str {
        "memory"
    }

    async fn subscribe(&self, path: &str) -> Result<Subscription, SourceError> {
        self.check_available()?;
        let (tx, rx) = mpsc::channel(SUBSCRIPTION_CHANNEL_SIZE);

        let initial = {
            let mut inner = self.lock();
            let current = tree::get(&inner.root, &tree::segments(path)).cloned();
            inner.subscribers.push(Subscriber {
                path: tree::normalize(path),
                tx: tx.clone(),
            });
            RecordEvent::from_value(current)
        };

        // Fresh channel with spare capacity, the initial value always fits.
        let _ = tx.try_send(initial);
        debug!("memory subscription opened on {}", path);

        Ok(Subscription::new(rx, None))
    }

    async fn get(&self, path: &str) -> Result<Option<Value>, SourceError> {
        self.check_available()?;
        Ok(self.record(path))
    }

    async fn patch(&self, path: &str, patch: &Patch) -> Result<(), SourceError> {
        self.check_available()?;
        let segments = tree::segments(path);
        let children = patch.to_object();
        let record = (tree::normalize(path), patch.clone());
        self.write(path, |inner| {
            tree::merge(&mut inner.root, &segments, children);
            inner.patches.push(record);
        })
        .await;
        Ok(())
    }
}

#[distributed_slice(REGISTRY)]
fn init_memory(ctx: &SourceContext) -> SourceFactoryResult {
    let memory = if let Some(m) = &ctx.config.source.memory {
        m
    } else {
        return Ok(None);
    };

    let record_path = &ctx.config.source.record_path;
    let source = match &memory.seed {
        Some(seed) => {
            info!("Seeding memory source from {}", seed.display());
            MemorySource::load_seed(record_path, seed)
                .with_context(|| format!("failed to seed memory source from {}", seed.display()))?
        }
        None => MemorySource::new(),
    };

    Ok(Some(Arc::new(source)))
}
