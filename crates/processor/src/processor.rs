use chrono::Utc;
use futures_util::future::join_all;
use parking_lot::Mutex;
use pitwall_core::{BridgeStatus, DomainEvent, ListenerLimitExceeded, ListenerSet};
use pitwall_ports::{EventSink, EventSource};
use serde::Serialize;
use std::collections::VecDeque;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;
use tokio::sync::{Notify, mpsc};
use tokio::task::JoinHandle;
use tokio::time::Instant;
use tracing::{debug, info, warn};

use crate::config::ProcessorConfig;
use crate::error::{ProcessorError, ProcessorResult};

/// Outcome of one flushed batch
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BatchReport {
    pub size: usize,
    pub published: usize,
    pub failed: usize,
    pub elapsed: Duration,
}

impl BatchReport {
    pub fn is_success(&self) -> bool {
        self.failed == 0
    }
}

/// Lifetime counters
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct ProcessorStats {
    pub received: u64,
    pub batches: u64,
    pub published: u64,
    pub failed: u64,
}

#[derive(Default)]
struct QueueState {
    events: VecDeque<DomainEvent>,
    /// A flush is in flight
    processing: bool,
    /// Run another flush as soon as the current one settles
    flush_requested: bool,
    timer: Option<JoinHandle<()>>,
    timer_generation: u64,
    running: bool,
    intake: Option<JoinHandle<()>>,
}

impl QueueState {
    fn take_batch(&mut self, max: usize) -> Vec<DomainEvent> {
        let n = max.min(self.events.len());
        self.events.drain(..n).collect()
    }

    fn cancel_timer(&mut self) {
        self.timer_generation += 1;
        if let Some(timer) = self.timer.take() {
            timer.abort();
        }
    }
}

#[derive(Default)]
struct Counters {
    received: AtomicU64,
    batches: AtomicU64,
    published: AtomicU64,
    failed: AtomicU64,
}

struct Inner {
    config: ProcessorConfig,
    source: Arc<dyn EventSource>,
    sink: Arc<dyn EventSink>,
    queue: Mutex<QueueState>,
    /// Signalled whenever a flush settles
    idle: Notify,
    reports: ListenerSet<BatchReport>,
    counters: Counters,
}

/// Batching pipeline from an event source to an event sink
#[derive(Clone)]
pub struct EventProcessor {
    inner: Arc<Inner>,
}

impl EventProcessor {
    pub fn new(
        config: ProcessorConfig,
        source: Arc<dyn EventSource>,
        sink: Arc<dyn EventSink>,
    ) -> Self {
        let reports = ListenerSet::new(config.max_listeners);
        Self {
            inner: Arc::new(Inner {
                config,
                source,
                sink,
                queue: Mutex::new(QueueState::default()),
                idle: Notify::new(),
                reports,
                counters: Counters::default(),
            }),
        }
    }

    pub fn config(&self) -> &ProcessorConfig {
        &self.inner.config
    }

    /// Connect the sink, start intake, then connect the source.
    ///
    /// A sink failure leaves the processor stopped. A source failure is
    /// returned as [`ProcessorError::Source`] but the processor keeps
    /// running; the source owns its retry schedule.
    pub async fn start(&self) -> ProcessorResult<()> {
        {
            let mut queue = self.inner.queue.lock();
            if queue.running {
                return Err(ProcessorError::AlreadyRunning);
            }
            queue.running = true;
        }

        if let Err(e) = self.inner.sink.connect().await {
            warn!(error = %e, "Sink connection failed");
            self.inner.queue.lock().running = false;
            return Err(ProcessorError::Sink(e));
        }

        let rx = match self.inner.source.subscribe() {
            Ok(rx) => rx,
            Err(e) => {
                self.inner.queue.lock().running = false;
                return Err(ProcessorError::Listener(e));
            }
        };
        let intake = tokio::spawn(run_intake(Arc::clone(&self.inner), rx));
        self.inner.queue.lock().intake = Some(intake);

        info!(
            batch_size = self.inner.config.batch_size,
            batch_timeout = ?self.inner.config.batch_timeout,
            "Processor started"
        );

        if let Err(e) = self.inner.source.connect().await {
            warn!(error = %e, "Source connection failed, processor stays up");
            return Err(ProcessorError::Source(e));
        }
        Ok(())
    }

    /// Drain the queue, then disconnect the source and the sink.
    ///
    /// The final flush is best effort: events the sink rejects are dropped.
    pub async fn stop(&self) {
        let intake = {
            let mut queue = self.inner.queue.lock();
            if !queue.running {
                return;
            }
            queue.running = false;
            queue.cancel_timer();
            queue.intake.take()
        };
        if let Some(intake) = intake {
            intake.abort();
        }

        self.inner.wait_idle().await;
        let drained = self.inner.drain().await;
        if drained > 0 {
            info!(events = drained, "Drained queue on stop");
        }

        self.inner.source.disconnect().await;
        self.inner.sink.disconnect().await;
        info!("Processor stopped");
    }

    pub fn is_running(&self) -> bool {
        self.inner.queue.lock().running
    }

    pub fn status(&self) -> BridgeStatus {
        let (queue_size, processing) = {
            let queue = self.inner.queue.lock();
            (queue.events.len(), queue.processing)
        };
        BridgeStatus {
            queue_size,
            processing,
            upstream_connected: self.inner.source.is_connected(),
            downstream_connected: self.inner.sink.is_connected(),
        }
    }

    pub fn stats(&self) -> ProcessorStats {
        let c = &self.inner.counters;
        ProcessorStats {
            received: c.received.load(Ordering::Relaxed),
            batches: c.batches.load(Ordering::Relaxed),
            published: c.published.load(Ordering::Relaxed),
            failed: c.failed.load(Ordering::Relaxed),
        }
    }

    /// Register for one report per flushed batch
    pub fn subscribe_reports(
        &self,
    ) -> Result<mpsc::UnboundedReceiver<BatchReport>, ListenerLimitExceeded> {
        self.inner.reports.subscribe()
    }
}

async fn run_intake(inner: Arc<Inner>, mut rx: mpsc::UnboundedReceiver<DomainEvent>) {
    while let Some(event) = rx.recv().await {
        inner.enqueue(event);
    }
    debug!("Source event stream closed");
}

impl Inner {
    fn enqueue(self: &Arc<Self>, mut event: DomainEvent) {
        let mut queue = self.queue.lock();
        if !queue.running {
            return;
        }
        event.enrich(Utc::now());
        self.counters.received.fetch_add(1, Ordering::Relaxed);
        queue.events.push_back(event);

        if queue.events.len() >= self.config.batch_size {
            self.trigger_flush(&mut queue);
        } else if queue.timer.is_none() {
            self.arm_timer(&mut queue);
        }
    }

    /// Start a flush now, or mark one pending if a flush is in flight.
    ///
    /// The batch is spliced out here, under the lock, so events arriving
    /// after the trigger belong to the next batch.
    fn trigger_flush(self: &Arc<Self>, queue: &mut QueueState) {
        queue.cancel_timer();
        if queue.processing {
            queue.flush_requested = true;
            return;
        }

        let batch = queue.take_batch(self.config.batch_size);
        if batch.is_empty() {
            return;
        }
        queue.processing = true;
        queue.flush_requested = !queue.events.is_empty();

        tokio::spawn(Arc::clone(self).run_flushes(batch));
    }

    fn arm_timer(self: &Arc<Self>, queue: &mut QueueState) {
        queue.cancel_timer();
        let generation = queue.timer_generation;
        let delay = self.config.batch_timeout;
        let inner = Arc::clone(self);

        queue.timer = Some(tokio::spawn(async move {
            tokio::time::sleep(delay).await;
            inner.on_timer(generation);
        }));
    }

    fn on_timer(self: &Arc<Self>, generation: u64) {
        let mut queue = self.queue.lock();
        if queue.timer_generation != generation || !queue.running {
            return;
        }
        // Our own handle; dropping it detaches
        queue.timer = None;
        self.trigger_flush(&mut queue);
    }

    async fn run_flushes(self: Arc<Self>, first: Vec<DomainEvent>) {
        let mut batch = first;
        loop {
            self.publish_batch(batch).await;

            let mut queue = self.queue.lock();
            if queue.flush_requested {
                queue.flush_requested = false;
                let next = queue.take_batch(self.config.batch_size);
                if !next.is_empty() {
                    queue.flush_requested = !queue.events.is_empty();
                    batch = next;
                    continue;
                }
            }

            queue.processing = false;
            if queue.running && !queue.events.is_empty() && queue.timer.is_none() {
                self.arm_timer(&mut queue);
            }
            drop(queue);
            self.idle.notify_waiters();
            return;
        }
    }

    /// Publish every event concurrently and wait for all of them to settle
    async fn publish_batch(&self, batch: Vec<DomainEvent>) -> BatchReport {
        let started = Instant::now();
        let size = batch.len();

        let results = join_all(batch.iter().map(|event| self.sink.publish_event(event))).await;

        let mut failed = 0;
        for (event, result) in batch.iter().zip(&results) {
            if let Err(e) = result {
                failed += 1;
                debug!(event_type = %event.event_type, error = %e, "Event dropped");
            }
        }

        let report = BatchReport {
            size,
            published: size - failed,
            failed,
            elapsed: started.elapsed(),
        };

        let c = &self.counters;
        c.batches.fetch_add(1, Ordering::Relaxed);
        c.published.fetch_add(report.published as u64, Ordering::Relaxed);
        c.failed.fetch_add(report.failed as u64, Ordering::Relaxed);

        if report.is_success() {
            debug!(size, elapsed = ?report.elapsed, "Batch published");
        } else {
            warn!(
                size,
                failed = report.failed,
                elapsed = ?report.elapsed,
                "Batch partially failed, failed events dropped"
            );
        }

        self.reports.emit(report.clone());
        report
    }

    async fn wait_idle(&self) {
        loop {
            let notified = self.idle.notified();
            let mut notified = std::pin::pin!(notified);
            notified.as_mut().enable();

            let processing = self.queue.lock().processing;
            if !processing {
                return;
            }
            notified.await;
        }
    }

    /// Flush whatever is left, batch by batch. Returns the number of events
    async fn drain(&self) -> usize {
        let mut total = 0;
        loop {
            let batch = {
                let mut queue = self.queue.lock();
                let batch = queue.take_batch(self.config.batch_size);
                queue.processing = !batch.is_empty();
                batch
            };
            if batch.is_empty() {
                return total;
            }
            total += batch.len();
            self.publish_batch(batch).await;
        }
    }
}
