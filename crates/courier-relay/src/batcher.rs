//! Batched delivery-record persistence.
//!
//! Producers append to an in-memory buffer and never block on I/O. A
//! single background task flushes the buffer to the store whenever it
//! reaches the size threshold or the time threshold elapses since the
//! last flush, whichever comes first. Flush swaps the buffer out under
//! the lock and writes outside it; a failed batch is returned to the
//! front of the buffer for the next attempt (at-least-once, duplicates
//! possible and acceptable).

use std::sync::Arc;
use std::time::Duration;

use courier_core::webhook::DeliveryRecord;
use courier_store::Store;
use metrics::counter;
use parking_lot::Mutex;
use tokio::sync::Notify;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

/// Default size threshold.
pub const DEFAULT_BATCH_SIZE: usize = 10;
/// Default time threshold.
pub const DEFAULT_FLUSH_INTERVAL: Duration = Duration::from_secs(5);

/// Buffered writer for the append-only delivery log.
pub struct LogBatcher {
    store: Arc<Store>,
    buffer: Mutex<Vec<DeliveryRecord>>,
    notify: Notify,
    batch_size: usize,
    flush_interval: Duration,
}

impl LogBatcher {
    /// Batcher with the default thresholds (10 records / 5 seconds).
    pub fn new(store: Arc<Store>) -> Self {
        Self::with_thresholds(store, DEFAULT_BATCH_SIZE, DEFAULT_FLUSH_INTERVAL)
    }

    /// Batcher with explicit thresholds.
    pub fn with_thresholds(
        store: Arc<Store>,
        batch_size: usize,
        flush_interval: Duration,
    ) -> Self {
        Self {
            store,
            buffer: Mutex::new(Vec::new()),
            notify: Notify::new(),
            batch_size: batch_size.max(1),
            flush_interval,
        }
    }

    /// Append one record. Never blocks on I/O; wakes the flush task when
    /// the size threshold is reached.
    pub fn record(&self, record: DeliveryRecord) {
        let should_flush = {
            let mut buffer = self.buffer.lock();
            buffer.push(record);
            buffer.len() >= self.batch_size
        };
        if should_flush {
            self.notify.notify_one();
        }
    }

    /// Records currently buffered.
    pub fn buffered(&self) -> usize {
        self.buffer.lock().len()
    }

    /// Spawn the background flush loop.
    pub fn spawn(self: &Arc<Self>, shutdown: CancellationToken) -> JoinHandle<()> {
        let batcher = Arc::clone(self);
        tokio::spawn(async move { batcher.run(shutdown).await })
    }

    /// The flush loop. Exits after a final flush once `shutdown` fires.
    pub async fn run(&self, shutdown: CancellationToken) {
        let mut interval = tokio::time::interval(self.flush_interval);
        interval.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
        // The first tick of a tokio interval completes immediately.
        let _ = interval.tick().await;

        loop {
            tokio::select! {
                _ = interval.tick() => {
                    self.flush();
                }
                () = self.notify.notified() => {
                    self.flush();
                    // Size-triggered flush restarts the time threshold.
                    interval.reset();
                }
                () = shutdown.cancelled() => {
                    self.flush();
                    debug!("log batcher stopped");
                    break;
                }
            }
        }
    }

    /// Flush whatever is buffered. Public so shutdown paths and tests can
    /// force a write.
    pub fn flush(&self) {
        let batch = {
            let mut buffer = self.buffer.lock();
            if buffer.is_empty() {
                return;
            }
            std::mem::take(&mut *buffer)
        };
        let len = batch.len();

        match self.store.insert_delivery_logs(&batch) {
            Ok(()) => {
                counter!("delivery_log_flushes_total", "result" => "ok").increment(1);
                debug!(records = len, "delivery log batch flushed");
            }
            Err(err) => {
                counter!("delivery_log_flushes_total", "result" => "error").increment(1);
                warn!(error = %err, records = len, "delivery log flush failed, re-queueing batch");
                let mut buffer = self.buffer.lock();
                // Failed batch goes back to the FRONT so the next flush
                // preserves append order.
                let newer = std::mem::replace(&mut *buffer, batch);
                buffer.extend(newer);
            }
        }
    }
}
