//! Node update events for external observers.
//!
//! The driver reports one [`NodeEvent`] per node it updates to the
//! [`EventSink`] configured in [`DriverOptions`](crate::DriverOptions). Events
//! describe what happened; nothing in a run depends on them.

use crate::ids::NodeId;
use crate::node::NodeKind;
use serde::{Deserialize, Serialize};
use std::fs::{File, OpenOptions};
use std::io::{self, BufWriter, Write};
use std::path::Path;
use std::sync::{Mutex, PoisonError};
use tracing::warn;

/// One node update within a run.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct NodeEvent {
    /// Generation of the run that updated the node.
    pub generation: u64,
    /// The updated node.
    pub node: NodeId,
    /// The node's kind.
    pub kind: NodeKind,
    /// The node's tracking name, if any.
    pub name: Option<String>,
    /// Fingerprint of the table the node started from, if it had one.
    pub previous_fingerprint: Option<u64>,
    /// Fingerprint of the table the node produced.
    pub fingerprint: u64,
    /// Packed per-item states of the new table, such as `"CCMA"`.
    pub states: String,
    /// Whether the new table is faulted.
    pub faulted: bool,
    /// Time spent updating the node, including upstream nodes it pulled
    /// for the first time in this run.
    pub elapsed_us: u64,
}

/// Receives node events. Implementations must tolerate concurrent runs.
pub trait EventSink: Send + Sync {
    /// Called once per node update.
    fn node_updated(&self, event: &NodeEvent);
}

/// Writes events as JSON lines.
pub struct JsonLinesSink<W: Write + Send> {
    writer: Mutex<W>,
}

impl JsonLinesSink<BufWriter<File>> {
    /// Opens `path` for appending, creating it if needed.
    pub fn create(path: &Path) -> io::Result<Self> {
        let file = OpenOptions::new().create(true).append(true).open(path)?;
        Ok(Self::new(BufWriter::new(file)))
    }
}

impl<W: Write + Send> JsonLinesSink<W> {
    /// Wraps a writer.
    pub fn new(writer: W) -> Self {
        Self {
            writer: Mutex::new(writer),
        }
    }

    /// Returns the writer.
    pub fn into_inner(self) -> W {
        self.writer
            .into_inner()
            .unwrap_or_else(PoisonError::into_inner)
    }

    fn write_event(&self, event: &NodeEvent) -> io::Result<()> {
        let mut writer = self.writer.lock().unwrap_or_else(PoisonError::into_inner);
        serde_json::to_writer(&mut *writer, event)?;
        writer.write_all(b"\n")?;
        writer.flush()
    }
}

impl<W: Write + Send> EventSink for JsonLinesSink<W> {
    fn node_updated(&self, event: &NodeEvent) {
        if let Err(err) = self.write_event(event) {
            warn!(node = %event.node, error = %err, "failed to write node event");
        }
    }
}

/// Keeps events in memory.
#[derive(Debug, Default)]
pub struct MemorySink {
    events: Mutex<Vec<NodeEvent>>,
}

impl MemorySink {
    /// Creates an empty sink.
    pub fn new() -> Self {
        Self::default()
    }

    /// Removes and returns all events received so far.
    pub fn take(&self) -> Vec<NodeEvent> {
        std::mem::take(&mut *self.events.lock().unwrap_or_else(PoisonError::into_inner))
    }
}

impl EventSink for MemorySink {
    fn node_updated(&self, event: &NodeEvent) {
        self.events.lock().unwrap_or_else(PoisonError::into_inner).push(event.clone());
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn event(node: u32, states: &str) -> NodeEvent {
        NodeEvent {
            generation: 1,
            node: NodeId::from_raw(node),
            kind: NodeKind::Transform,
            name: Some("Names".to_string()),
            previous_fingerprint: None,
            fingerprint: 99,
            states: states.to_string(),
            faulted: false,
            elapsed_us: 12,
        }
    }

    #[test]
    fn json_lines_one_event_per_line() {
        let sink = JsonLinesSink::new(Vec::new());
        sink.node_updated(&event(0, "AA"));
        sink.node_updated(&event(1, "C"));
        let text = String::from_utf8(sink.into_inner()).unwrap();
        let lines: Vec<&str> = text.lines().collect();
        assert_eq!(lines.len(), 2);
        let first: NodeEvent = serde_json::from_str(lines[0]).unwrap();
        assert_eq!(first, event(0, "AA"));
        assert!(lines[1].contains("\"kind\":\"Transform\""));
    }

    #[test]
    fn file_sink_appends() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("events.jsonl");
        for states in ["A", "C"] {
            let sink = JsonLinesSink::create(&path).unwrap();
            sink.node_updated(&event(0, states));
        }
        let text = std::fs::read_to_string(&path).unwrap();
        assert_eq!(text.lines().count(), 2);
    }

    fn poison<T: Send>(mutex: &Mutex<T>) {
        std::thread::scope(|scope| {
            let holder = scope.spawn(|| {
                let _guard = mutex.lock().unwrap();
                panic!("sink holder panicked");
            });
            assert!(holder.join().is_err());
        });
        assert!(mutex.is_poisoned());
    }

    #[test]
    fn sinks_keep_working_after_a_panic() {
        let sink = JsonLinesSink::new(Vec::new());
        poison(&sink.writer);
        sink.node_updated(&event(0, "A"));
        let text = String::from_utf8(sink.into_inner()).unwrap();
        assert_eq!(text.lines().count(), 1);

        let sink = MemorySink::new();
        poison(&sink.events);
        sink.node_updated(&event(1, "C"));
        assert_eq!(sink.take(), vec![event(1, "C")]);
    }

    #[test]
    fn memory_sink_take_drains() {
        let sink = MemorySink::new();
        sink.node_updated(&event(3, "M"));
        assert_eq!(sink.take().len(), 1);
        assert!(sink.take().is_empty());
    }
}
