//! Buffer between loggers and the backend, drained by one background task

use std::collections::VecDeque;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use parking_lot::Mutex;
use tokio::sync::{Notify, mpsc, oneshot};
use tokio::task::JoinHandle;
use tracing::{debug, error, warn};

use crate::{
    Backend, BackendError, Error, LogLevel, LogRecord, RotationController, RotationState,
    StdoutMirror,
};

/// Tuning for a [`Dispatcher`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DispatcherConfig {
    /// Records held before the oldest is displaced
    pub capacity: usize,
    /// Records handed to the backend per write
    pub batch_size: usize,
    /// How long shutdown waits for the buffer to drain
    pub shutdown_grace: Duration,
}

impl Default for DispatcherConfig {
    fn default() -> Self {
        Self {
            capacity: 10_000,
            batch_size: 256,
            shutdown_grace: Duration::from_secs(5),
        }
    }
}

/// Counters describing what happened to enqueued records.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DispatcherStats {
    /// Records accepted into the buffer
    pub enqueued: u64,
    /// Records the backend persisted
    pub written: u64,
    /// Records lost to backend failures or abandoned at shutdown
    pub failed: u64,
    /// Records pushed out of a full buffer
    pub displaced: u64,
    /// Successful rotations
    pub rotations: u64,
    /// Failed rotations
    pub rotation_failures: u64,
}

/// Outcome of [`Dispatcher::enqueue`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Enqueued {
    /// The record was buffered.
    Accepted,
    /// The buffer was full; the oldest record was dropped to make room.
    DisplacedOldest,
    /// The dispatcher is shut down; the record was dropped.
    Closed,
}

enum Control {
    Flush(oneshot::Sender<Result<(), BackendError>>),
    Rotate(oneshot::Sender<Result<(), BackendError>>),
    Shutdown(oneshot::Sender<()>),
}

#[derive(Default)]
struct Queue {
    records: VecDeque<LogRecord>,
    closed: bool,
}

#[derive(Default)]
struct Counters {
    enqueued: AtomicU64,
    written: AtomicU64,
    failed: AtomicU64,
    displaced: AtomicU64,
}

struct Shared {
    queue: Mutex<Queue>,
    notify: Notify,
    config: DispatcherConfig,
    counters: Counters,
    rotation: RotationController,
}

impl Shared {
    fn close(&self) {
        self.queue.lock().closed = true;
        self.notify.notify_one();
    }

    fn take_batch(&self, limit: usize) -> Vec<LogRecord> {
        let mut queue = self.queue.lock();
        let count = queue.records.len().min(self.config.batch_size).min(limit);
        queue.records.drain(..count).collect()
    }

    fn pending(&self) -> usize {
        self.queue.lock().records.len()
    }
}

/// Single entry point from a logger tree into its backend.
///
/// Records are buffered in FIFO order and written by a background task that
/// exclusively owns the backend and the optional stdout mirror. Callers never
/// wait on backend I/O: [`enqueue`](Self::enqueue) only touches the buffer.
/// Flush, rotation and shutdown requests travel over a control channel and
/// are served between batches.
pub struct Dispatcher {
    shared: Arc<Shared>,
    control: mpsc::UnboundedSender<Control>,
    task: Mutex<Option<JoinHandle<()>>>,
}

impl std::fmt::Debug for Dispatcher {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Dispatcher")
            .field("config", &self.shared.config)
            .field("rotation", &self.rotation_state())
            .field("stats", &self.stats())
            .finish_non_exhaustive()
    }
}

impl Dispatcher {
    /// Starts the flush task for `backend`.
    ///
    /// # Panics
    ///
    /// Panics when called outside a Tokio runtime.
    #[must_use]
    pub fn spawn(
        backend: Box<dyn Backend>,
        mirror: Option<StdoutMirror>,
        config: DispatcherConfig,
    ) -> Arc<Self> {
        let config = DispatcherConfig {
            capacity: config.capacity.max(1),
            batch_size: config.batch_size.max(1),
            ..config
        };
        let shared = Arc::new(Shared {
            queue: Mutex::new(Queue::default()),
            notify: Notify::new(),
            config,
            counters: Counters::default(),
            rotation: RotationController::new(),
        });
        let (control, receiver) = mpsc::unbounded_channel();

        let flusher = FlushTask {
            shared: shared.clone(),
            backend,
            mirror,
            failing: false,
            lost: 0,
            in_flight: 0,
            reported_displaced: 0,
        };
        let task = tokio::spawn(flusher.run(receiver));

        Arc::new(Self {
            shared,
            control,
            task: Mutex::new(Some(task)),
        })
    }

    /// Buffers `record` for the flush task. Never blocks: a full buffer drops
    /// its oldest record.
    pub fn enqueue(&self, record: LogRecord) -> Enqueued {
        let displaced = {
            let mut queue = self.shared.queue.lock();
            if queue.closed {
                return Enqueued::Closed;
            }
            let displaced = queue.records.len() >= self.shared.config.capacity
                && queue.records.pop_front().is_some();
            queue.records.push_back(record);
            displaced
        };

        let counters = &self.shared.counters;
        counters.enqueued.fetch_add(1, Ordering::Relaxed);
        self.shared.notify.notify_one();

        if displaced {
            counters.displaced.fetch_add(1, Ordering::Relaxed);
            Enqueued::DisplacedOldest
        } else {
            Enqueued::Accepted
        }
    }

    /// Waits until every record enqueued before the call has been handed to
    /// the backend and the backend has flushed.
    ///
    /// # Errors
    ///
    /// [`Error::Backend`] if the backend flush fails, [`Error::Closed`] after
    /// shutdown.
    pub async fn flush(&self) -> Result<(), Error> {
        let (done, result) = oneshot::channel();
        self.send(Control::Flush(done))?;
        result.await.map_err(|_| Error::Closed)?.map_err(Error::Backend)
    }

    /// Swaps the backend's sink. Returns once the backend accepts writes again.
    ///
    /// # Errors
    ///
    /// [`Error::Rotation`] if the swap failed (the previous sink stays
    /// active), [`Error::Closed`] after shutdown.
    pub async fn rotate(&self) -> Result<(), Error> {
        let (done, result) = oneshot::channel();
        self.send(Control::Rotate(done))?;
        result.await.map_err(|_| Error::Closed)?.map_err(Error::Rotation)
    }

    /// Stops accepting records, drains the buffer within the configured grace
    /// period and closes the backend. Safe to call more than once.
    pub async fn shutdown(&self) {
        self.shared.close();

        let (done, finished) = oneshot::channel();
        if self.control.send(Control::Shutdown(done)).is_ok() {
            let _ = finished.await;
        }

        let task = self.task.lock().take();
        if let Some(task) = task {
            if let Err(e) = task.await {
                error!(target: "dblogger", "flush task ended abnormally: {e}");
            }
        }
    }

    /// True once shutdown has started.
    pub fn is_closed(&self) -> bool {
        self.shared.queue.lock().closed
    }

    /// Records currently buffered.
    pub fn pending(&self) -> usize {
        self.shared.queue.lock().records.len()
    }

    /// Phase of the rotation cycle.
    pub fn rotation_state(&self) -> RotationState {
        self.shared.rotation.state()
    }

    /// Effective configuration.
    pub fn config(&self) -> DispatcherConfig {
        self.shared.config
    }

    /// Snapshot of the record counters.
    pub fn stats(&self) -> DispatcherStats {
        let counters = &self.shared.counters;
        DispatcherStats {
            enqueued: counters.enqueued.load(Ordering::Relaxed),
            written: counters.written.load(Ordering::Relaxed),
            failed: counters.failed.load(Ordering::Relaxed),
            displaced: counters.displaced.load(Ordering::Relaxed),
            rotations: self.shared.rotation.completed(),
            rotation_failures: self.shared.rotation.failed(),
        }
    }

    fn send(&self, message: Control) -> Result<(), Error> {
        self.control.send(message).map_err(|_| Error::Closed)
    }
}

impl Drop for Dispatcher {
    fn drop(&mut self) {
        // The flush task sees the control channel close and drains on its own.
        self.shared.close();
    }
}

struct FlushTask {
    shared: Arc<Shared>,
    backend: Box<dyn Backend>,
    mirror: Option<StdoutMirror>,
    /// Set while the backend keeps failing, so a streak is reported once.
    failing: bool,
    lost: u64,
    in_flight: usize,
    reported_displaced: u64,
}

impl FlushTask {
    async fn run(mut self, mut control: mpsc::UnboundedReceiver<Control>) {
        debug!(target: "dblogger", backend = self.backend.name(), "flush task started");

        loop {
            while let Ok(message) = control.try_recv() {
                if self.handle(Some(message)).await {
                    return;
                }
            }

            if self.write_batch(usize::MAX).await > 0 {
                continue;
            }

            let message = tokio::select! {
                biased;
                message = control.recv() => message,
                () = self.shared.notify.notified() => continue,
            };
            if self.handle(message).await {
                return;
            }
        }
    }

    /// Serves one control message. Returns true once the task should stop.
    async fn handle(&mut self, message: Option<Control>) -> bool {
        match message {
            Some(Control::Flush(done)) => {
                self.drain_pending().await;
                let _ = done.send(self.backend.flush().await);
                false
            }
            Some(Control::Rotate(done)) => {
                // Records logged before the request belong to the old sink.
                self.drain_pending().await;
                let result = self
                    .shared
                    .rotation
                    .rotate(self.backend.as_mut(), self.mirror.as_mut())
                    .await;
                let _ = done.send(result);
                false
            }
            Some(Control::Shutdown(done)) => {
                self.finish().await;
                let _ = done.send(());
                true
            }
            None => {
                self.finish().await;
                true
            }
        }
    }

    /// Writes up to `limit` records. Returns how many were taken.
    async fn write_batch(&mut self, limit: usize) -> usize {
        debug_assert!(self.shared.rotation.is_active());

        let batch = self.shared.take_batch(limit);
        if batch.is_empty() {
            return 0;
        }
        self.report_displaced();

        self.in_flight = batch.len();
        let outcomes = self.backend.write_batch(&batch).await;
        self.in_flight = 0;

        for (index, record) in batch.iter().enumerate() {
            match outcomes.get(index) {
                Some(Ok(())) => self.record_written(),
                Some(Err(e)) => self.record_failed(e),
                None => self.record_failed(&BackendError::write(
                    "write batch",
                    "backend reported no outcome for record",
                )),
            }
            if let Some(mirror) = &mut self.mirror {
                mirror.write(record);
            }
        }
        batch.len()
    }

    /// Writes the records queued right now, not those arriving meanwhile.
    async fn drain_pending(&mut self) {
        let mut remaining = self.shared.pending();
        while remaining > 0 {
            match self.write_batch(remaining).await {
                0 => break,
                written => remaining = remaining.saturating_sub(written),
            }
        }
    }

    async fn drain(&mut self) {
        while self.write_batch(usize::MAX).await > 0 {}
    }

    async fn finish(&mut self) {
        self.shared.close();

        let grace = self.shared.config.shutdown_grace;
        if tokio::time::timeout(grace, self.drain()).await.is_err() {
            let queued = self.shared.queue.lock().records.drain(..).count();
            let abandoned = (queued + self.in_flight) as u64;
            self.shared
                .counters
                .failed
                .fetch_add(abandoned, Ordering::Relaxed);
            self.report(
                LogLevel::Error,
                &format!("shutdown grace period elapsed, abandoned {abandoned} record(s)"),
            );
        }

        if let Err(e) = self.backend.flush().await {
            self.report(LogLevel::Error, &format!("final flush failed: {e}"));
        }
        if let Err(e) = self.backend.close().await {
            self.report(LogLevel::Error, &format!("closing backend failed: {e}"));
        }
        debug!(target: "dblogger", backend = self.backend.name(), "flush task stopped");
    }

    fn record_written(&mut self) {
        self.shared.counters.written.fetch_add(1, Ordering::Relaxed);
        if self.failing {
            self.failing = false;
            let lost = std::mem::take(&mut self.lost);
            self.report(
                LogLevel::Warn,
                &format!("backend recovered, {lost} record(s) were lost"),
            );
        }
    }

    fn record_failed(&mut self, e: &BackendError) {
        self.shared.counters.failed.fetch_add(1, Ordering::Relaxed);
        self.lost += 1;
        if !self.failing {
            self.failing = true;
            self.report(
                LogLevel::Error,
                &format!(
                    "{} write failed, dropping records until it recovers: {e}",
                    self.backend.name()
                ),
            );
        }
    }

    fn report_displaced(&mut self) {
        let displaced = self.shared.counters.displaced.load(Ordering::Relaxed);
        if displaced > self.reported_displaced {
            let dropped = displaced - self.reported_displaced;
            self.reported_displaced = displaced;
            self.report(
                LogLevel::Warn,
                &format!("buffer full, dropped {dropped} oldest record(s)"),
            );
        }
    }

    fn report(&mut self, level: LogLevel, message: &str) {
        if level >= LogLevel::Error {
            error!(target: "dblogger", "{message}");
        } else {
            warn!(target: "dblogger", "{message}");
        }
        if let Some(mirror) = &mut self.mirror {
            mirror.diagnostic(level, message);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{MemoryBackend, MemoryHandle, TagContext};

    fn record(message: &str) -> LogRecord {
        LogRecord::new(
            LogLevel::Info,
            "test".into(),
            TagContext::new(),
            vec![message.into()],
            None,
        )
    }

    fn memory_dispatcher(config: DispatcherConfig) -> (Arc<Dispatcher>, MemoryHandle) {
        let (backend, handle) = MemoryBackend::new();
        (Dispatcher::spawn(Box::new(backend), None, config), handle)
    }

    #[tokio::test]
    async fn writes_in_enqueue_order() {
        let (dispatcher, handle) = memory_dispatcher(DispatcherConfig {
            batch_size: 7,
            ..DispatcherConfig::default()
        });

        let expected: Vec<String> = (0..100).map(|i| format!("m{i}")).collect();
        for message in &expected {
            assert_eq!(dispatcher.enqueue(record(message)), Enqueued::Accepted);
        }
        dispatcher.flush().await.unwrap();

        assert_eq!(handle.messages(), expected);
        assert_eq!(handle.flushes(), 1);
        assert_eq!(dispatcher.stats().written, 100);
    }

    #[tokio::test]
    async fn full_buffer_displaces_oldest() {
        let (dispatcher, handle) = memory_dispatcher(DispatcherConfig {
            capacity: 3,
            ..DispatcherConfig::default()
        });

        // The current-thread runtime does not run the flush task until we await.
        let outcomes: Vec<_> = ["a", "b", "c", "d", "e"]
            .into_iter()
            .map(|m| dispatcher.enqueue(record(m)))
            .collect();
        dispatcher.flush().await.unwrap();

        assert_eq!(
            outcomes,
            [
                Enqueued::Accepted,
                Enqueued::Accepted,
                Enqueued::Accepted,
                Enqueued::DisplacedOldest,
                Enqueued::DisplacedOldest,
            ]
        );
        assert_eq!(handle.messages(), ["c", "d", "e"]);
        assert_eq!(dispatcher.stats().displaced, 2);
    }

    #[tokio::test]
    async fn failing_writes_are_reported_once_and_dropped() {
        let (backend, handle) = MemoryBackend::new();
        let (mirror, capture) = StdoutMirror::capture();
        let dispatcher =
            Dispatcher::spawn(Box::new(backend), Some(mirror), DispatcherConfig::default());
        handle.fail_next_writes(3);

        for message in ["a", "b", "c", "d"] {
            dispatcher.enqueue(record(message));
        }
        dispatcher.flush().await.unwrap();

        assert_eq!(handle.messages(), ["d"]);
        let stats = dispatcher.stats();
        assert_eq!((stats.written, stats.failed), (1, 3));

        let diagnostics = capture.contents();
        assert_eq!(diagnostics.matches("write failed").count(), 1);
        assert!(diagnostics.contains("3 record(s) were lost"));
        // Failed records are still mirrored.
        assert_eq!(diagnostics.matches(": a").count(), 1);
    }

    #[tokio::test]
    async fn rotate_without_writes_is_ready_immediately() {
        let (dispatcher, handle) = memory_dispatcher(DispatcherConfig::default());

        dispatcher.rotate().await.unwrap();
        assert_eq!(dispatcher.rotation_state(), RotationState::Active);

        dispatcher.enqueue(record("after"));
        dispatcher.flush().await.unwrap();

        let sinks = handle.sinks();
        assert_eq!(sinks.len(), 2);
        assert!(sinks[0].is_empty());
        assert_eq!(sinks[1].len(), 1);
        assert_eq!(dispatcher.stats().rotations, 1);
    }

    #[tokio::test]
    async fn failed_rotation_keeps_previous_sink() {
        let (dispatcher, handle) = memory_dispatcher(DispatcherConfig::default());
        handle.fail_next_rotations(1);

        let result = dispatcher.rotate().await;
        assert!(matches!(result, Err(Error::Rotation(_))));

        dispatcher.enqueue(record("still here"));
        dispatcher.flush().await.unwrap();

        assert_eq!(handle.sinks().len(), 1);
        assert_eq!(handle.messages(), ["still here"]);
        assert_eq!(dispatcher.stats().rotation_failures, 1);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn concurrent_writes_survive_rotation() {
        let (dispatcher, handle) = memory_dispatcher(DispatcherConfig {
            batch_size: 16,
            ..DispatcherConfig::default()
        });

        let writers: Vec<_> = (0..4)
            .map(|w| {
                let dispatcher = dispatcher.clone();
                tokio::spawn(async move {
                    for i in 0..250 {
                        dispatcher.enqueue(record(&format!("{w}:{i}")));
                        if i % 50 == 0 {
                            tokio::task::yield_now().await;
                        }
                    }
                })
            })
            .collect();
        for _ in 0..3 {
            dispatcher.rotate().await.unwrap();
        }
        for writer in writers {
            writer.await.unwrap();
        }
        dispatcher.flush().await.unwrap();

        let sinks = handle.sinks();
        assert_eq!(sinks.len(), 4);
        let messages = handle.messages();
        assert_eq!(messages.len(), 1000);

        for w in 0..4 {
            let prefix = format!("{w}:");
            let order: Vec<u32> = messages
                .iter()
                .filter_map(|m| m.strip_prefix(&prefix))
                .map(|i| i.parse().unwrap())
                .collect();
            assert_eq!(order, (0..250).collect::<Vec<_>>());
        }
    }

    #[tokio::test]
    async fn shutdown_drains_and_is_idempotent() {
        let (dispatcher, handle) = memory_dispatcher(DispatcherConfig::default());
        for i in 0..10 {
            dispatcher.enqueue(record(&i.to_string()));
        }

        dispatcher.shutdown().await;
        dispatcher.shutdown().await;

        assert_eq!(handle.records().len(), 10);
        assert!(handle.is_closed());
        assert!(dispatcher.is_closed());
        assert_eq!(dispatcher.enqueue(record("late")), Enqueued::Closed);
        assert!(matches!(dispatcher.rotate().await, Err(Error::Closed)));
        assert!(matches!(dispatcher.flush().await, Err(Error::Closed)));
    }

    #[tokio::test(start_paused = true)]
    async fn shutdown_abandons_records_after_grace_period() {
        let (dispatcher, handle) = memory_dispatcher(DispatcherConfig {
            batch_size: 1,
            shutdown_grace: Duration::from_millis(250),
            ..DispatcherConfig::default()
        });
        handle.set_write_delay(Duration::from_millis(100));
        for i in 0..5 {
            dispatcher.enqueue(record(&i.to_string()));
        }

        dispatcher.shutdown().await;

        let stats = dispatcher.stats();
        assert_eq!(stats.written, 2);
        assert_eq!(stats.failed, 3);
        assert!(handle.is_closed());
    }

    #[tokio::test]
    async fn dropping_last_handle_drains_backend() {
        let (dispatcher, handle) = memory_dispatcher(DispatcherConfig::default());
        dispatcher.enqueue(record("last words"));
        drop(dispatcher);

        tokio::time::timeout(Duration::from_secs(5), async {
            while !handle.is_closed() {
                tokio::task::yield_now().await;
            }
        })
        .await
        .unwrap();
        assert_eq!(handle.messages(), ["last words"]);
    }
}
