//! In-memory backend for tests, with failure injection.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use parking_lot::Mutex;

use super::{Backend, BackendError};
use crate::LogRecord;

#[derive(Debug, Default)]
struct State {
    /// One sink per rotation generation; the last one is active.
    sinks: Vec<Vec<LogRecord>>,
    failing_writes: u32,
    failing_rotations: u32,
    write_delay: Option<Duration>,
    flushes: u32,
    closed: bool,
}

/// Backend that keeps records in memory. Each rotation starts a new sink.
#[derive(Debug)]
pub struct MemoryBackend {
    state: Arc<Mutex<State>>,
}

/// Inspection and fault-injection handle for a [`MemoryBackend`].
#[derive(Debug, Clone)]
pub struct MemoryHandle {
    state: Arc<Mutex<State>>,
}

impl MemoryBackend {
    /// Creates a backend and a handle observing it.
    #[must_use]
    pub fn new() -> (Self, MemoryHandle) {
        let state = Arc::new(Mutex::new(State {
            sinks: vec![Vec::new()],
            ..State::default()
        }));
        (
            Self {
                state: state.clone(),
            },
            MemoryHandle { state },
        )
    }
}

impl MemoryHandle {
    /// Every persisted record across all sinks, in write order.
    #[must_use]
    pub fn records(&self) -> Vec<LogRecord> {
        self.state.lock().sinks.iter().flatten().cloned().collect()
    }

    /// Records per sink, oldest sink first.
    #[must_use]
    pub fn sinks(&self) -> Vec<Vec<LogRecord>> {
        self.state.lock().sinks.clone()
    }

    /// Messages of every persisted record, in write order.
    #[must_use]
    pub fn messages(&self) -> Vec<String> {
        self.records().into_iter().map(|r| r.message).collect()
    }

    /// Makes the next `count` writes fail.
    pub fn fail_next_writes(&self, count: u32) {
        self.state.lock().failing_writes = count;
    }

    /// Makes the next `count` rotations fail.
    pub fn fail_next_rotations(&self, count: u32) {
        self.state.lock().failing_rotations = count;
    }

    /// Delays every write, simulating a slow store.
    pub fn set_write_delay(&self, delay: Duration) {
        self.state.lock().write_delay = Some(delay);
    }

    /// Number of completed flushes.
    #[must_use]
    pub fn flushes(&self) -> u32 {
        self.state.lock().flushes
    }

    /// True once the backend has been closed.
    #[must_use]
    pub fn is_closed(&self) -> bool {
        self.state.lock().closed
    }
}

#[async_trait]
impl Backend for MemoryBackend {
    fn name(&self) -> &'static str {
        "memory"
    }

    async fn write(&mut self, record: &LogRecord) -> Result<(), BackendError> {
        let delay = self.state.lock().write_delay;
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }

        let mut state = self.state.lock();
        if state.closed {
            return Err(BackendError::Closed);
        }
        if state.failing_writes > 0 {
            state.failing_writes -= 1;
            return Err(BackendError::write("memory write", "injected failure"));
        }
        if let Some(sink) = state.sinks.last_mut() {
            sink.push(record.clone());
        }
        Ok(())
    }

    async fn flush(&mut self) -> Result<(), BackendError> {
        self.state.lock().flushes += 1;
        Ok(())
    }

    async fn rotate(&mut self) -> Result<(), BackendError> {
        let mut state = self.state.lock();
        if state.failing_rotations > 0 {
            state.failing_rotations -= 1;
            return Err(BackendError::rotation("memory rotate", "injected failure"));
        }
        state.sinks.push(Vec::new());
        Ok(())
    }

    async fn close(&mut self) -> Result<(), BackendError> {
        self.state.lock().closed = true;
        Ok(())
    }
}
