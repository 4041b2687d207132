//! C12: the persisted-event queue and its sinks (§4.11, §6.4). The queue
//! itself never talks to storage; an [`EventSink`] does, and a periodic
//! flush task is the only thing that drains the queue into one.

pub mod event_queue;

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use parking_lot::Mutex;
use tokio::io::AsyncWriteExt;
use tokio::sync::watch;
use tracing::warn;

pub use event_queue::{EventQueue, PersistedEventRecord};

/// Where flushed batches of [`PersistedEventRecord`]s end up. Exists so
/// the flush task is agnostic to the backing store — swap in a different
/// sink without touching the tick loop or the queue itself.
#[async_trait]
pub trait EventSink: Send + Sync {
    async fn write_batch(&self, records: &[PersistedEventRecord]) -> Result<(), String>;
}

/// Reference sink for tests and local runs: keeps every flushed record in
/// memory. Never evicts, so it's unsuitable for anything long-running.
#[derive(Default)]
pub struct InMemoryEventSink {
    written: Mutex<Vec<PersistedEventRecord>>,
}

impl InMemoryEventSink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn written(&self) -> Vec<PersistedEventRecord> {
        self.written.lock().clone()
    }
}

#[async_trait]
impl EventSink for InMemoryEventSink {
    async fn write_batch(&self, records: &[PersistedEventRecord]) -> Result<(), String> {
        self.written.lock().extend_from_slice(records);
        Ok(())
    }
}

/// Reference sink for a real deployment: appends one JSON line per record
/// to a file, opening it fresh on each flush so an external log rotator
/// can safely move the file between flushes.
pub struct FileEventSink {
    path: PathBuf,
}

impl FileEventSink {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }
}

#[async_trait]
impl EventSink for FileEventSink {
    async fn write_batch(&self, records: &[PersistedEventRecord]) -> Result<(), String> {
        let mut file = tokio::fs::OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.path)
            .await
            .map_err(|e| format!("opening {}: {e}", self.path.display()))?;

        for record in records {
            let mut line = serde_json::to_string(record).map_err(|e| format!("serializing event record: {e}"))?;
            line.push('\n');
            file.write_all(line.as_bytes()).await.map_err(|e| format!("writing {}: {e}", self.path.display()))?;
        }
        file.flush().await.map_err(|e| format!("flushing {}: {e}", self.path.display()))
    }
}

/// Drains up to 256 records at a time into `sink` on every `interval`
/// tick, requeueing the batch at the front on a failed write so nothing
/// is lost to a transient sink outage (§4.11, §6.4). Runs until
/// `shutdown` reports `true`, flushing one final time before returning.
pub async fn run_flush_loop(
    queue: Arc<EventQueue>,
    sink: Arc<dyn EventSink>,
    interval: Duration,
    mut shutdown: watch::Receiver<bool>,
) {
    let mut ticker = tokio::time::interval(interval);
    loop {
        tokio::select! {
            _ = ticker.tick() => {
                flush_once(&queue, sink.as_ref()).await;
            }
            changed = shutdown.changed() => {
                if changed.is_err() || *shutdown.borrow() {
                    flush_once(&queue, sink.as_ref()).await;
                    break;
                }
            }
        }
    }
}

async fn flush_once(queue: &EventQueue, sink: &dyn EventSink) {
    const BATCH_SIZE: usize = 256;
    let batch = queue.drain_batch(BATCH_SIZE);
    if batch.is_empty() {
        return;
    }
    if let Err(err) = sink.write_batch(&batch).await {
        warn!(error = %err, count = batch.len(), "event sink flush failed, requeueing batch");
        queue.requeue_front(batch);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use quant_strategy::{Side, StrategyMode};

    fn sample(id: &str) -> PersistedEventRecord {
        PersistedEventRecord::OrderEvent {
            ts_ms: 0,
            symbol: "BTC-PERP".to_string(),
            client_order_id: id.to_string(),
            exchange_order_id: None,
            side: Some(Side::Buy),
            status: "open".to_string(),
            mode: StrategyMode::Normal,
            params_signature: "sig".to_string(),
        }
    }

    #[tokio::test]
    async fn in_memory_sink_retains_every_flushed_batch() {
        let sink = InMemoryEventSink::new();
        sink.write_batch(&[sample("c1"), sample("c2")]).await.unwrap();
        assert_eq!(sink.written().len(), 2);
    }

    #[tokio::test]
    async fn file_sink_appends_one_json_line_per_record() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("events.jsonl");
        let sink = FileEventSink::new(&path);
        sink.write_batch(&[sample("c1"), sample("c2")]).await.unwrap();
        sink.write_batch(&[sample("c3")]).await.unwrap();

        let contents = tokio::fs::read_to_string(&path).await.unwrap();
        assert_eq!(contents.lines().count(), 3);
    }

    #[tokio::test]
    async fn flush_once_requeues_on_sink_failure() {
        struct FailingSink;
        #[async_trait]
        impl EventSink for FailingSink {
            async fn write_batch(&self, _records: &[PersistedEventRecord]) -> Result<(), String> {
                Err("sink unavailable".to_string())
            }
        }

        let queue = EventQueue::new(10);
        queue.enqueue(sample("c1"));
        flush_once(&queue, &FailingSink).await;
        assert_eq!(queue.len(), 1);
    }
}
