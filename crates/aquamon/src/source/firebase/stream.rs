//! Decoding of the Realtime Database streaming protocol.
//!
//! A streaming `GET` answers with server-sent events. `put` and `patch`
//! events carry `{"path": ..., "data": ...}` relative to the subscribed
//! location; the client keeps its own copy of the record and applies them,
//! so each change can be reported as the full current value.

use serde::Deserialize;
use serde_json::Value;
use tracing::debug;

use crate::source::RecordEvent;
use crate::source::SourceError;
use crate::source::tree;

/// One dispatched server-sent event.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SseFrame {
    pub event: String,
    pub data: String,
}

/// Incremental server-sent event parser.
///
/// Bytes are buffered until a full line is available, so frames and UTF-8
/// sequences split across network chunks decode correctly.
#[derive(Debug, Default)]
pub struct SseDecoder {
    buf: Vec<u8>,
    event: Option<String>,
    data: Vec<String>,
}

impl SseDecoder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Feed a chunk of the response body, returning every frame it completes.
    pub fn feed(&mut self, chunk: &[u8]) -> Vec<SseFrame> {
        self.buf.extend_from_slice(chunk);
        let mut frames = Vec::new();

        while let Some(pos) = self.buf.iter().position(|b| *b == b'\n') {
            let mut line: Vec<u8> = self.buf.drain(..=pos).collect();
            line.pop();
            if line.last() == Some(&b'\r') {
                line.pop();
            }
            let line = String::from_utf8_lossy(&line);

            if line.is_empty() {
                if let Some(frame) = self.dispatch() {
                    frames.push(frame);
                }
                continue;
            }
            if line.starts_with(':') {
                continue;
            }

            let (field, value) = match line.split_once(':') {
                Some((field, value)) => (field, value.strip_prefix(' ').unwrap_or(value)),
                None => (&*line, ""),
            };
            match field {
                "event" => self.event = Some(value.to_string()),
                "data" => self.data.push(value.to_string()),
                _ => {}
            }
        }

        frames
    }

    fn dispatch(&mut self) -> Option<SseFrame> {
        let event = self.event.take();
        if self.data.is_empty() && event.is_none() {
            return None;
        }
        let data = std::mem::take(&mut self.data).join("\n");
        Some(SseFrame {
            event: event.unwrap_or_else(|| "message".to_string()),
            data,
        })
    }
}

#[derive(Debug, Deserialize)]
struct PathData {
    path: String,
    data: Value,
}

/// Local copy of a subscribed record, advanced by stream frames.
#[derive(Debug, Default)]
pub struct RecordStream {
    value: Value,
}

impl RecordStream {
    pub fn new() -> Self {
        Self::default()
    }

    /// Apply one frame.
    ///
    /// Returns the new full record after `put`/`patch`, `None` for frames
    /// that do not change it, and an error when the server ends the stream.
    pub fn apply(&mut self, frame: &SseFrame) -> Result<Option<RecordEvent>, SourceError> {
        match frame.event.as_str() {
            "put" => {
                let update: PathData = serde_json::from_str(&frame.data)?;
                tree::set(&mut self.value, &tree::segments(&update.path), update.data);
                Ok(Some(self.current()))
            }
            "patch" => {
                let update: PathData = serde_json::from_str(&frame.data)?;
                let Value::Object(children) = update.data else {
                    return Err(SourceError::Stream(format!(
                        "patch at {} is not an object",
                        update.path
                    )));
                };
                tree::merge(&mut self.value, &tree::segments(&update.path), children);
                Ok(Some(self.current()))
            }
            "keep-alive" => Ok(None),
            "cancel" => Err(SourceError::Stream(format!(
                "subscription cancelled by server: {}",
                frame.data
            ))),
            "auth_revoked" => Err(SourceError::Stream(
                "credential expired or revoked".to_string(),
            )),
            other => {
                debug!("Ignoring unknown stream event '{}'", other);
                Ok(None)
            }
        }
    }

    fn current(&self) -> RecordEvent {
        RecordEvent::from_value(Some(self.value.clone()))
    }
}
