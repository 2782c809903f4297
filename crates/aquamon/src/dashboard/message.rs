//! Messages from the subscriber task to the dashboard event loop.

use crate::source::RecordEvent;

/// Messages FROM the subscriber TO the dashboard.
///
/// Each carries the mount generation it was produced under so that
/// notifications still queued from a released subscription are dropped.
#[derive(Debug, Clone, PartialEq)]
pub enum FromSourceMessage {
    /// The record changed (or was first read)
    RecordChanged { generation: u64, event: RecordEvent },

    /// The backend stopped delivering notifications
    SubscriptionEnded { generation: u64 },
}

impl FromSourceMessage {
    pub fn generation(&self) -> u64 {
        match self {
            FromSourceMessage::RecordChanged { generation, .. } => *generation,
            FromSourceMessage::SubscriptionEnded { generation } => *generation,
        }
    }
}
