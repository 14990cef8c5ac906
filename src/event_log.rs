use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};

use serde::Serialize;
use tokio::io::AsyncWriteExt;
use tokio::sync::mpsc;
use uuid::Uuid;

use crate::model::Timestamp;

/// Event categories (§4.10). Each gets its own per-run, per-category
/// JSON-lines file — "within a run, per component category files may
/// coexist".
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum EventCategory {
    StateUpdate,
    Order,
    OperationExecution,
    Reconciliation,
    Error,
    SystemFailure,
    Timestep,
    Health,
}

impl EventCategory {
    fn file_stem(self) -> &'static str {
        match self {
            EventCategory::StateUpdate => "state_update",
            EventCategory::Order => "order",
            EventCategory::OperationExecution => "operation_execution",
            EventCategory::Reconciliation => "reconciliation",
            EventCategory::Error => "error",
            EventCategory::SystemFailure => "system_failure",
            EventCategory::Timestep => "timestep",
            EventCategory::Health => "health",
        }
    }
}

/// One self-contained append-only log line (§6 "Persisted state layout").
#[derive(Debug, Clone, Serialize)]
pub struct EventEnvelope {
    pub correlation_id: Uuid,
    pub run_pid: u32,
    pub timestamp: Timestamp,
    pub real_time: u64,
    pub event_type: EventCategory,
    pub component: String,
    pub sequence: u64,
    pub payload: serde_json::Value,
}

enum Command {
    Write(EventEnvelope),
    Shutdown,
}

/// Append-only sink, bounded-queue backed so writers never block the
/// critical path beyond the enqueue itself (§4.10, §5 "the event log sink
/// may run on a background task with a bounded queue and at-least-once
/// semantics"). A background task owns the actual file handles and fans
/// each envelope out to its category file under
/// `<run_dir>/<correlation_id>/`.
pub struct EventLog {
    correlation_id: Uuid,
    run_pid: u32,
    tx: mpsc::Sender<Command>,
    sequence: AtomicU64,
    worker: Option<tokio::task::JoinHandle<()>>,
}

impl EventLog {
    pub fn new(run_dir: impl Into<PathBuf>, correlation_id: Uuid, queue_depth: usize) -> Self {
        let run_dir = run_dir.into();
        let (tx, rx) = mpsc::channel(queue_depth);
        let worker = tokio::spawn(Self::drain(run_dir, correlation_id, rx));

        Self {
            correlation_id,
            run_pid: std::process::id(),
            tx,
            sequence: AtomicU64::new(0),
            worker: Some(worker),
        }
    }

    /// Reset the per-tick sequence counter (§5: "events emitted within a
    /// tick carry a monotonically increasing per-tick sequence number").
    pub fn begin_tick(&self) {
        self.sequence.store(0, Ordering::SeqCst);
    }

    pub fn emit(
        &self,
        component: impl Into<String>,
        category: EventCategory,
        timestamp: Timestamp,
        real_time: u64,
        payload: impl Serialize,
    ) {
        let sequence = self.sequence.fetch_add(1, Ordering::SeqCst);
        let envelope = EventEnvelope {
            correlation_id: self.correlation_id,
            run_pid: self.run_pid,
            timestamp,
            real_time,
            event_type: category,
            component: component.into(),
            sequence,
            payload: serde_json::to_value(payload).unwrap_or(serde_json::Value::Null),
        };
        // Bounded send dropped if the queue is full: at-least-once is a
        // best effort, not a hard guarantee, and a full queue must never
        // block the tight loop.
        let _ = self.tx.try_send(Command::Write(envelope));
    }

    /// Flush and write the terminal marker (§6: "A terminal marker written
    /// at clean shutdown").
    pub async fn shutdown(mut self) {
        let _ = self.tx.send(Command::Shutdown).await;
        if let Some(worker) = self.worker.take() {
            let _ = worker.await;
        }
    }

    async fn drain(run_dir: PathBuf, correlation_id: Uuid, mut rx: mpsc::Receiver<Command>) {
        let run_path = run_dir.join(correlation_id.to_string());
        if tokio::fs::create_dir_all(&run_path).await.is_err() {
            return;
        }

        let mut files: HashMap<&'static str, tokio::fs::File> = HashMap::new();

        while let Some(command) = rx.recv().await {
            match command {
                Command::Write(envelope) => {
                    let stem = envelope.event_type.file_stem();
                    let file = match files.get_mut(stem) {
                        Some(f) => f,
                        None => {
                            let path = run_path.join(format!("{stem}.jsonl"));
                            match open_append(&path).await {
                                Ok(f) => files.entry(stem).or_insert(f),
                                Err(_) => continue,
                            }
                        }
                    };
                    if let Ok(mut line) = serde_json::to_vec(&envelope) {
                        line.push(b'\n');
                        let _ = file.write_all(&line).await;
                    }
                }
                Command::Shutdown => {
                    for file in files.values_mut() {
                        let _ = file.flush().await;
                    }
                    let marker_path = run_path.join("_terminal");
                    let _ = tokio::fs::write(&marker_path, b"ok\n").await;
                    break;
                }
            }
        }
    }
}

async fn open_append(path: &Path) -> std::io::Result<tokio::fs::File> {
    tokio::fs::OpenOptions::new()
        .create(true)
        .append(true)
        .open(path)
        .await
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[tokio::test]
    async fn emits_and_flushes_terminal_marker() {
        let dir = std::env::temp_dir().join(format!("basis-engine-test-{}", Uuid::new_v4()));
        let correlation_id = Uuid::new_v4();
        let log = EventLog::new(&dir, correlation_id, 16);
        log.emit("engine", EventCategory::Timestep, 100, 100, json!({"tick": 1}));
        log.shutdown().await;

        let run_path = dir.join(correlation_id.to_string());
        assert!(run_path.join("timestep.jsonl").exists());
        assert!(run_path.join("_terminal").exists());

        let _ = std::fs::remove_dir_all(&dir);
    }
}
