use std::sync::Arc;
use std::sync::PoisonError;
use std::sync::atomic::AtomicU64;
use std::sync::atomic::Ordering;

use arc_swap::ArcSwapOption;
use tokio::sync::Mutex;
use tokio::sync::broadcast;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::debug;
use tracing::error;
use tracing::info;
use tracing::warn;

use super::command;
use super::command::Command;
use super::command::Pump;
use super::event::Event;
use super::message::FromSourceMessage;
use super::state::SensorSnapshot;
use crate::source::DataSource;
use crate::source::Patch;
use crate::source::RecordEvent;
use crate::source::SourceError;

/// Capacity for the subscriber→dashboard message channel
const FROM_SOURCE_CHANNEL_SIZE: usize = 256;

/// Capacity of the event broadcast; slow listeners see `Lagged` and re-read
/// the snapshot.
const EVENT_CHANNEL_SIZE: usize = 64;

/// The dashboard screen's state and behavior.
///
/// Mirrors one remote record into a local [`SensorSnapshot`], announces every
/// replacement as an [`Event`], and turns user commands into patches of the
/// same record.
pub struct Dashboard {
    source: Arc<dyn DataSource>,
    record_path: String,

    /// Last known snapshot; `None` while absent or not loaded yet
    state: ArcSwapOption<SensorSnapshot>,

    events: broadcast::Sender<Event>,
    message_rx: Mutex<mpsc::Receiver<FromSourceMessage>>,
    message_tx: mpsc::Sender<FromSourceMessage>,

    /// Bumped on every mount and unmount
    generation: AtomicU64,
    subscriber: std::sync::Mutex<Option<JoinHandle<()>>>,
}

impl Dashboard {
    pub fn new(source: Arc<dyn DataSource>, record_path: impl Into<String>) -> Self {
        let (message_tx, message_rx) = mpsc::channel(FROM_SOURCE_CHANNEL_SIZE);
        let (events, _) = broadcast::channel(EVENT_CHANNEL_SIZE);
        Self {
            source,
            record_path: record_path.into(),
            state: ArcSwapOption::empty(),
            events,
            message_rx: Mutex::new(message_rx),
            message_tx,
            generation: AtomicU64::new(0),
            subscriber: std::sync::Mutex::new(None),
        }
    }

    pub fn record_path(&self) -> &str {
        &self.record_path
    }

    pub fn source(&self) -> &Arc<dyn DataSource> {
        &self.source
    }

    /// Current snapshot, or `None` when the record is absent.
    ///
    /// Clones the `Arc` (atomic refcount bump), essentially free.
    pub fn snapshot(&self) -> Option<Arc<SensorSnapshot>> {
        self.state.load_full()
    }

    /// Listen for snapshot replacements.
    pub fn events(&self) -> broadcast::Receiver<Event> {
        self.events.subscribe()
    }

    /// Activate the subscription to the record.
    ///
    /// Spawns the subscriber task. Setup failures are logged and not retried;
    /// the display then simply never updates.
    pub fn mount(&self) {
        let mut subscriber = self
            .subscriber
            .lock()
            .unwrap_or_else(PoisonError::into_inner);
        if subscriber.is_some() {
            warn!("Dashboard already mounted on {}", self.record_path);
            return;
        }

        let generation = self.generation.fetch_add(1, Ordering::SeqCst) + 1;
        let source = self.source.clone();
        let path = self.record_path.clone();
        let tx = self.message_tx.clone();

        info!("Mounting dashboard on {} via {}", path, source.name());
        *subscriber = Some(tokio::spawn(async move {
            Self::subscribe_task(source, path, generation, tx).await;
        }));
    }

    /// Release the subscription and drop the local snapshot.
    pub fn unmount(&self) {
        let mut subscriber = self
            .subscriber
            .lock()
            .unwrap_or_else(PoisonError::into_inner);
        let Some(handle) = subscriber.take() else {
            return;
        };

        // Under the subscriber lock, so no in-flight message can store a
        // snapshot after this clears it.
        self.generation.fetch_add(1, Ordering::SeqCst);
        handle.abort();
        self.state.store(None);
        drop(subscriber);

        info!("Dashboard unmounted from {}", self.record_path);
    }

    pub fn is_mounted(&self) -> bool {
        self.subscriber
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .is_some()
    }

    async fn subscribe_task(
        source: Arc<dyn DataSource>,
        path: String,
        generation: u64,
        tx: mpsc::Sender<FromSourceMessage>,
    ) {
        let mut subscription = match source.subscribe(&path).await {
            Ok(s) => s,
            Err(e) => {
                error!("Failed to subscribe to {}: {}", path, e);
                return;
            }
        };
        debug!("Subscribed to {}", path);

        while let Some(event) = subscription.next().await {
            let msg = FromSourceMessage::RecordChanged { generation, event };
            if tx.send(msg).await.is_err() {
                return;
            }
        }

        let _ = tx
            .send(FromSourceMessage::SubscriptionEnded { generation })
            .await;
    }

    /// Run the dashboard's event loop
    ///
    /// Applies notifications in delivery order.
    pub async fn run(&self) {
        info!("Dashboard event loop starting");

        let mut rx = self.message_rx.lock().await;
        while let Some(msg) = rx.recv().await {
            self.handle_message(msg);
        }

        info!("Dashboard event loop shutting down");
    }

    fn handle_message(&self, msg: FromSourceMessage) {
        // Check and store under the subscriber lock so `unmount` cannot slip
        // in between and have its cleared state overwritten.
        let subscriber = self
            .subscriber
            .lock()
            .unwrap_or_else(PoisonError::into_inner);
        if msg.generation() != self.generation.load(Ordering::SeqCst) {
            debug!("Dropping message from a released subscription: {:?}", msg);
            return;
        }

        match msg {
            FromSourceMessage::RecordChanged {
                event: RecordEvent::Value(record),
                ..
            } => {
                let snapshot = Arc::new(SensorSnapshot::from_record(&record));
                debug!("Snapshot replaced: {:?}", snapshot);
                self.state.store(Some(snapshot.clone()));
                drop(subscriber);
                let _ = self.events.send(Event::SnapshotReplaced(snapshot));
            }
            FromSourceMessage::RecordChanged {
                event: RecordEvent::Absent,
                ..
            } => {
                info!("Record {} is absent, clearing snapshot", self.record_path);
                self.state.store(None);
                drop(subscriber);
                let _ = self.events.send(Event::SnapshotCleared);
            }
            FromSourceMessage::SubscriptionEnded { .. } => {
                warn!(
                    "Subscription to {} ended; the display will no longer update",
                    self.record_path
                );
            }
        }
    }

    /// Execute a command and wait for the write to settle.
    pub async fn execute(&self, command: Command) -> Result<Patch, SourceError> {
        command::execute(self.source.as_ref(), &self.record_path, command).await
    }

    pub async fn set_automatic(&self) -> Result<Patch, SourceError> {
        self.execute(Command::SetAutomatic).await
    }

    pub async fn toggle_pump(&self, pump: Pump) -> Result<Patch, SourceError> {
        self.execute(Command::TogglePump(pump)).await
    }

    /// Fire-and-forget a command: failures are logged, never surfaced.
    ///
    /// The returned handle lets callers (and tests) wait for settlement.
    pub fn dispatch(self: &Arc<Self>, command: Command) -> JoinHandle<()> {
        let dashboard = Arc::clone(self);
        tokio::spawn(async move {
            if let Err(e) = dashboard.execute(command).await {
                error!("Command {:?} failed: {}", command, e);
            }
        })
    }
}

impl Drop for Dashboard {
    fn drop(&mut self) {
        self.unmount();
    }
}
