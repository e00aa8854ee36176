//! Quiesce, swap, resume cycle for rotating a backend's sink

use std::sync::atomic::{AtomicU8, AtomicU64, Ordering};

use tracing::{error, info};

use crate::{Backend, BackendError, LogLevel, StdoutMirror};

/// Phase of the rotation cycle.
#[repr(u8)]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RotationState {
    /// Records flow to the backend.
    Active = 0,
    /// Dequeuing is paused; the last in-flight write has completed.
    Quiescing = 1,
    /// The backend is replacing its sink.
    Swapping = 2,
}

impl RotationState {
    const fn from_u8(value: u8) -> Self {
        match value {
            1 => Self::Quiescing,
            2 => Self::Swapping,
            _ => Self::Active,
        }
    }
}

/// Drives `Active -> Quiescing -> Swapping -> Active`.
///
/// The controller runs inside the dispatcher's flush task, which owns the
/// backend. Writes and swaps therefore never overlap; the shared state only
/// lets other handles observe the cycle.
#[derive(Debug)]
pub struct RotationController {
    state: AtomicU8,
    completed: AtomicU64,
    failed: AtomicU64,
}

impl Default for RotationController {
    fn default() -> Self {
        Self::new()
    }
}

impl RotationController {
    /// Controller in the `Active` state.
    #[must_use]
    pub const fn new() -> Self {
        Self {
            state: AtomicU8::new(RotationState::Active as u8),
            completed: AtomicU64::new(0),
            failed: AtomicU64::new(0),
        }
    }

    /// Current phase.
    pub fn state(&self) -> RotationState {
        RotationState::from_u8(self.state.load(Ordering::Acquire))
    }

    /// True while records may be handed to the backend.
    pub fn is_active(&self) -> bool {
        self.state() == RotationState::Active
    }

    /// Successful rotations so far.
    pub fn completed(&self) -> u64 {
        self.completed.load(Ordering::Relaxed)
    }

    /// Failed rotations so far.
    pub fn failed(&self) -> u64 {
        self.failed.load(Ordering::Relaxed)
    }

    fn enter(&self, state: RotationState) {
        self.state.store(state as u8, Ordering::Release);
    }

    /// Rotates `backend`. The caller must not be in the middle of a write.
    /// A failure is reported and leaves the backend on its previous sink; the
    /// controller always ends up `Active` again.
    ///
    /// # Errors
    ///
    /// The backend's rotation error.
    pub async fn rotate(
        &self,
        backend: &mut dyn Backend,
        mirror: Option<&mut StdoutMirror>,
    ) -> Result<(), BackendError> {
        self.enter(RotationState::Quiescing);
        self.enter(RotationState::Swapping);
        let result = backend.rotate().await;
        self.enter(RotationState::Active);

        match &result {
            Ok(()) => {
                self.completed.fetch_add(1, Ordering::Relaxed);
                info!(target: "dblogger", backend = backend.name(), "log sink rotated");
            }
            Err(e) => {
                self.failed.fetch_add(1, Ordering::Relaxed);
                error!(target: "dblogger", backend = backend.name(), "rotation failed, keeping previous sink: {e}");
                if let Some(mirror) = mirror {
                    mirror.diagnostic(
                        LogLevel::Error,
                        &format!("rotation failed, keeping previous sink: {e}"),
                    );
                }
            }
        }

        result
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{LogRecord, MemoryBackend};
    use async_trait::async_trait;
    use std::sync::Arc;
    use tracing_test::traced_test;

    struct ObservingBackend {
        controller: Arc<RotationController>,
        seen: Option<RotationState>,
    }

    #[async_trait]
    impl Backend for ObservingBackend {
        fn name(&self) -> &'static str {
            "observing"
        }

        async fn write(&mut self, _record: &LogRecord) -> Result<(), BackendError> {
            Ok(())
        }

        async fn rotate(&mut self) -> Result<(), BackendError> {
            self.seen = Some(self.controller.state());
            Ok(())
        }

        async fn close(&mut self) -> Result<(), BackendError> {
            Ok(())
        }
    }

    #[tokio::test]
    async fn backend_rotates_while_swapping() {
        let controller = Arc::new(RotationController::new());
        let mut backend = ObservingBackend {
            controller: controller.clone(),
            seen: None,
        };

        controller.rotate(&mut backend, None).await.unwrap();

        assert_eq!(backend.seen, Some(RotationState::Swapping));
        assert_eq!(controller.state(), RotationState::Active);
        assert_eq!(controller.completed(), 1);
    }

    #[tokio::test]
    #[traced_test]
    async fn failure_returns_to_active_and_keeps_sink() {
        let controller = RotationController::new();
        let (mut backend, handle) = MemoryBackend::new();
        let (mut mirror, capture) = StdoutMirror::capture();
        handle.fail_next_rotations(1);

        let result = controller.rotate(&mut backend, Some(&mut mirror)).await;

        assert!(result.is_err());
        assert!(controller.is_active());
        assert_eq!(controller.failed(), 1);
        assert_eq!(handle.sinks().len(), 1);
        assert!(capture.contents().contains("rotation failed"));
        assert!(logs_contain("keeping previous sink"));
    }
}
