//! C12: a bounded, non-blocking producer/consumer queue of
//! [`PersistedEventRecord`]s. The tick loop and the private-stream handler
//! are producers; a periodic flush task is the sole consumer. Enqueue
//! never blocks: once full, the oldest record is dropped and counted
//! (§8 ambient testable property) rather than stalling a hot path.

use std::collections::VecDeque;
use std::sync::atomic::{AtomicU64, Ordering};

use parking_lot::Mutex;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use tracing::warn;

use quant_strategy::{Side, StrategyMode};

use crate::venue::types::Liquidity;

/// One order or fill event worth persisting externally (§3, §6.4). Always
/// carries the strategy mode and params-set signature in effect when the
/// event occurred, so a downstream consumer can correlate behavior
/// changes with decisions.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum PersistedEventRecord {
    OrderEvent {
        ts_ms: i64,
        symbol: String,
        client_order_id: String,
        exchange_order_id: Option<String>,
        /// `None` when the update arrived for an order the tracker no
        /// longer has a live entry for (e.g. a duplicate terminal status).
        side: Option<Side>,
        status: String,
        mode: StrategyMode,
        params_signature: String,
    },
    FillEvent {
        ts_ms: i64,
        symbol: String,
        client_order_id: String,
        exchange_order_id: Option<String>,
        side: Side,
        price: Decimal,
        size: Decimal,
        fee: Decimal,
        liquidity: Liquidity,
        mode: StrategyMode,
        params_signature: String,
    },
}

/// Bounded record queue with drop-oldest-on-full semantics. Not a channel:
/// a channel's receiver can't give a record back on a failed flush without
/// either blocking the sender or losing ordering, so this is a
/// `Mutex<VecDeque<_>>` instead, matching §5's "SPSC or lock-guarded MPSC"
/// allowance.
pub struct EventQueue {
    inner: Mutex<VecDeque<PersistedEventRecord>>,
    capacity: usize,
    dropped_count: AtomicU64,
}

impl EventQueue {
    pub fn new(capacity: usize) -> Self {
        Self {
            inner: Mutex::new(VecDeque::with_capacity(capacity)),
            capacity,
            dropped_count: AtomicU64::new(0),
        }
    }

    pub fn enqueue(&self, record: PersistedEventRecord) {
        let mut queue = self.inner.lock();
        if queue.len() >= self.capacity {
            queue.pop_front();
            self.dropped_count.fetch_add(1, Ordering::Relaxed);
            warn!("persisted-event queue full, dropping oldest record");
        }
        queue.push_back(record);
    }

    /// Removes up to `max` records from the front for the flush task to
    /// attempt writing.
    pub fn drain_batch(&self, max: usize) -> Vec<PersistedEventRecord> {
        let mut queue = self.inner.lock();
        let n = max.min(queue.len());
        queue.drain(..n).collect()
    }

    /// Puts a failed batch back at the front, preserving order, rather
    /// than dropping it (§4.11, §6.4) — bounded by one process lifetime,
    /// so a batch can still be evicted later by further drop-oldest
    /// pressure if the sink stays down.
    pub fn requeue_front(&self, records: Vec<PersistedEventRecord>) {
        let mut queue = self.inner.lock();
        for record in records.into_iter().rev() {
            queue.push_front(record);
        }
    }

    pub fn len(&self) -> usize {
        self.inner.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn dropped_count(&self) -> u64 {
        self.dropped_count.load(Ordering::Relaxed)
    }
}
