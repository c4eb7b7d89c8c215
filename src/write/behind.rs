//! Write-behind: cache first, origin later
//!
//! Origin writes are queued and flushed in batches by a background task.
//! Writes of different keys run in parallel and fail independently; writes of
//! the same key run in enqueue order, and a failing write holds back the later
//! writes of its key until it commits or is dropped, so the origin ends up with
//! the latest value.
//!
//! Retries back off exponentially (`retry_backoff * 2^(retries - 1)`, capped at
//! `max_backoff`). A write failing `max_retries` times is dropped with an
//! error-level log record and a metrics error; the caller has long returned.

use crate::adapter::CacheAdapter;
use crate::codec;
use crate::config::WriteBehindConfig;
use crate::error::{CacheError, Result};
use crate::key::CacheKey;
use crate::metrics::CacheMetrics;
use crate::write::queue::{PendingWrite, PendingWriteState, WriteQueue};
use crate::write::WriteFn;
use futures::future::join_all;
use serde::Serialize;
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::{Instant, MissedTickBehavior};
use tracing::{debug, error, info, warn};

/// Outcome of one or more flush passes
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FlushReport {
    pub committed: usize,
    pub requeued: usize,
    pub dropped: usize,
    /// Keys whose writes were dropped after exhausting retries
    pub dropped_keys: Vec<String>,
    /// The pass was a no-op because another flush was in progress
    pub skipped: bool,
}

impl FlushReport {
    fn merge(&mut self, other: FlushReport) {
        self.committed += other.committed;
        self.requeued += other.requeued;
        self.dropped += other.dropped;
        self.dropped_keys.extend(other.dropped_keys);
        self.skipped |= other.skipped;
    }

    fn has_activity(&self) -> bool {
        self.committed + self.requeued + self.dropped > 0
    }
}

/// Lifetime counters of a write-behind strategy
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct WriteBehindStats {
    pub enqueued: u64,
    pub committed: u64,
    pub requeued: u64,
    pub dropped: u64,
}

#[derive(Default)]
struct Counters {
    enqueued: AtomicU64,
    committed: AtomicU64,
    requeued: AtomicU64,
    dropped: AtomicU64,
}

/// Resets the in-flight flag however the flush ends
struct FlushGuard<'a>(&'a AtomicBool);

impl Drop for FlushGuard<'_> {
    fn drop(&mut self) {
        self.0.store(false, Ordering::Release);
    }
}

/// Deferred, batched, retrying origin writes
pub struct WriteBehind {
    adapter: Arc<dyn CacheAdapter>,
    queue: Arc<WriteQueue>,
    config: WriteBehindConfig,
    metrics: Option<Arc<CacheMetrics>>,
    flushing: AtomicBool,
    counters: Counters,
}

impl WriteBehind {
    pub fn new(adapter: Arc<dyn CacheAdapter>, queue: Arc<WriteQueue>, config: WriteBehindConfig) -> Self {
        Self {
            adapter,
            queue,
            config,
            metrics: None,
            flushing: AtomicBool::new(false),
            counters: Counters::default(),
        }
    }

    /// Record dropped writes as errors of their key
    pub fn with_metrics(mut self, metrics: Arc<CacheMetrics>) -> Self {
        self.metrics = Some(metrics);
        self
    }

    pub fn queue(&self) -> &Arc<WriteQueue> {
        &self.queue
    }

    pub fn config(&self) -> &WriteBehindConfig {
        &self.config
    }

    /// Cache `value` now and queue `write_fn` for the origin
    ///
    /// A full queue triggers one synchronous flush; if the queue is still full
    /// the write fails with [`CacheError::QueueFull`] and the cache is left as
    /// it was.
    pub async fn write<T: Serialize>(
        &self,
        key: &CacheKey,
        value: &T,
        write_fn: WriteFn,
        ttl: Option<Duration>,
    ) -> Result<()> {
        let bytes = codec::encode(value, None)?;
        self.write_encoded(key, bytes, write_fn, ttl).await
    }

    pub(crate) async fn write_encoded(
        &self,
        key: &CacheKey,
        bytes: Vec<u8>,
        write_fn: WriteFn,
        ttl: Option<Duration>,
    ) -> Result<()> {
        if self.queue.is_full().await {
            debug!("Write-behind queue full, flushing before accepting {}", key);
            self.flush_once().await;
            if self.queue.is_full().await {
                warn!("Write-behind queue still full, rejecting write for {}", key);
                return Err(CacheError::QueueFull {
                    capacity: self.queue.capacity(),
                });
            }
        }

        if let Err(e) = self.adapter.set(key.as_str(), bytes.clone(), ttl).await {
            warn!("Write-behind cache update failed for {}: {}", key, e);
        }

        if let Err(e) = self.queue.push(key.as_str(), bytes, write_fn).await {
            // Lost a race for the last slot: the origin will never see this
            // value, so the cache must not serve it either.
            if let Err(delete_err) = self.adapter.delete(key.as_str()).await {
                warn!(
                    "Could not retract rejected write-behind value for {}, cache is ahead of origin: {}",
                    key, delete_err
                );
            }
            return Err(e);
        }

        self.counters.enqueued.fetch_add(1, Ordering::Relaxed);
        debug!("Write-behind queued: {}", key);
        Ok(())
    }

    /// Run one batch over every due write
    ///
    /// A no-op (with `skipped` set) while another flush is in progress.
    pub async fn flush_once(&self) -> FlushReport {
        if self.flushing.swap(true, Ordering::AcqRel) {
            debug!("Write-behind flush already in progress, skipping");
            return FlushReport {
                skipped: true,
                ..Default::default()
            };
        }
        let _guard = FlushGuard(&self.flushing);

        let batch = self.queue.take_all().await;
        let taken = batch.len();
        if taken == 0 {
            return FlushReport::default();
        }

        let mut chains: HashMap<String, Vec<PendingWrite>> = HashMap::new();
        for write in batch {
            chains.entry(write.key.clone()).or_default().push(write);
        }

        let now = Instant::now();
        let outcomes = join_all(chains.into_values().map(|chain| self.run_chain(chain, now))).await;

        let mut report = FlushReport::default();
        let mut returned = Vec::new();
        for (chain_report, leftover) in outcomes {
            report.merge(chain_report);
            returned.extend(leftover);
        }
        self.queue.settle(taken, returned).await;

        self.counters
            .committed
            .fetch_add(report.committed as u64, Ordering::Relaxed);
        self.counters
            .requeued
            .fetch_add(report.requeued as u64, Ordering::Relaxed);
        self.counters
            .dropped
            .fetch_add(report.dropped as u64, Ordering::Relaxed);

        debug!(
            "Write-behind flush: {} committed, {} requeued, {} dropped",
            report.committed, report.requeued, report.dropped
        );
        report
    }

    /// Flush until the queue is empty, waiting out retry backoffs
    pub async fn flush_all(&self) -> FlushReport {
        let mut total = FlushReport::default();

        loop {
            let report = self.flush_once().await;
            let skipped = report.skipped;
            total.merge(report);
            if skipped {
                break;
            }

            match self.queue.next_due().await {
                None => break,
                Some(deadline) => tokio::time::sleep_until(deadline).await,
            }
        }

        total
    }

    /// Apply the writes of one key in order, returning what must stay queued
    async fn run_chain(
        &self,
        chain: Vec<PendingWrite>,
        now: Instant,
    ) -> (FlushReport, Vec<PendingWrite>) {
        let mut report = FlushReport::default();
        let mut leftover = Vec::new();
        let mut pending = chain.into_iter();

        while let Some(mut write) = pending.next() {
            if !write.is_due(now) {
                leftover.push(write);
                break;
            }

            write.state = PendingWriteState::Flushing;
            match (write.write_fn)().await {
                Ok(()) => {
                    write.state = PendingWriteState::Committed;
                    report.committed += 1;
                    debug!("Write-behind committed: {} (attempt {})", write.key, write.retries + 1);
                }
                Err(e) => {
                    write.retries += 1;
                    if write.retries < self.config.max_retries {
                        let backoff = self.config.backoff_for(write.retries);
                        warn!(
                            "Write-behind origin write failed for {} (attempt {}/{}), retrying in {:?}: {:#}",
                            write.key, write.retries, self.config.max_retries, backoff, e
                        );
                        write.state = PendingWriteState::RequeuedWithBackoff;
                        write.not_before = Some(Instant::now() + backoff);
                        report.requeued += 1;
                        leftover.push(write);
                        break;
                    }

                    write.state = PendingWriteState::DroppedFailed;
                    error!(
                        key = %write.key,
                        retries = write.retries,
                        "Dropping write-behind entry, cache and origin have diverged: {:#}",
                        e
                    );
                    if let Some(metrics) = &self.metrics {
                        metrics.record_error(&write.key);
                    }
                    report.dropped += 1;
                    report.dropped_keys.push(write.key.clone());
                }
            }
        }

        leftover.extend(pending);
        (report, leftover)
    }

    pub fn stats(&self) -> WriteBehindStats {
        WriteBehindStats {
            enqueued: self.counters.enqueued.load(Ordering::Relaxed),
            committed: self.counters.committed.load(Ordering::Relaxed),
            requeued: self.counters.requeued.load(Ordering::Relaxed),
            dropped: self.counters.dropped.load(Ordering::Relaxed),
        }
    }

    /// Start the background flusher
    ///
    /// The task flushes every `flush_interval` until [`FlusherHandle::shutdown`]
    /// is called (or the handle is dropped), then runs a final `flush_all`.
    pub fn spawn_flusher(self: &Arc<Self>) -> FlusherHandle {
        let (shutdown_tx, mut shutdown_rx) = watch::channel(false);
        let this = Arc::clone(self);
        let interval = self.config.flush_interval;

        let task = tokio::spawn(async move {
            info!("Starting write-behind flusher (interval: {:?})", interval);

            let mut ticker = tokio::time::interval_at(Instant::now() + interval, interval);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

            loop {
                tokio::select! {
                    _ = ticker.tick() => {
                        let report = this.flush_once().await;
                        if report.has_activity() {
                            info!(
                                committed = report.committed,
                                requeued = report.requeued,
                                dropped = report.dropped,
                                "Write-behind flush completed"
                            );
                        }
                    }
                    changed = shutdown_rx.changed() => {
                        if changed.is_err() || *shutdown_rx.borrow() {
                            break;
                        }
                    }
                }
            }

            info!("Write-behind flusher stopping, running final flush");
            let report = this.flush_all().await;
            if report.skipped {
                warn!("Final write-behind flush skipped, another flush was in progress");
            }
            if report.dropped > 0 {
                warn!(
                    "Final write-behind flush dropped {} writes: {:?}",
                    report.dropped, report.dropped_keys
                );
            }
        });

        FlusherHandle { shutdown_tx, task }
    }
}

/// Handle of the background flusher task
pub struct FlusherHandle {
    shutdown_tx: watch::Sender<bool>,
    task: JoinHandle<()>,
}

impl FlusherHandle {
    /// Stop the flusher and wait for its final flush
    pub async fn shutdown(self) {
        let _ = self.shutdown_tx.send(true);
        if let Err(e) = self.task.await {
            error!("Write-behind flusher task failed: {}", e);
        }
    }

    /// Wait for SIGINT/SIGTERM, then shut down
    ///
    /// Best effort: writes still queued after the final flush are lost.
    pub async fn shutdown_on_signal(self) {
        wait_for_shutdown_signal().await;
        info!("Shutdown signal received, flushing write-behind queue");
        self.shutdown().await;
    }

    pub fn is_finished(&self) -> bool {
        self.task.is_finished()
    }
}

async fn wait_for_shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            error!("Failed to listen for ctrl-c: {}", e);
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        use tokio::signal::unix::{signal, SignalKind};
        match signal(SignalKind::terminate()) {
            Ok(mut sigterm) => {
                sigterm.recv().await;
            }
            Err(e) => {
                error!("Failed to listen for SIGTERM: {}", e);
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {}
        _ = terminate => {}
    }
}
