use std::sync::Arc;

use super::state::SensorSnapshot;

/// View-level events.
///
/// Distinct from `FromSourceMessage` (transport-level). The dashboard converts
/// messages into events after updating its state, so a listener that
/// receives an event always finds the matching snapshot in place.
#[derive(Debug, Clone, PartialEq)]
pub enum Event {
    SnapshotReplaced(Arc<SensorSnapshot>),
    SnapshotCleared,
}
