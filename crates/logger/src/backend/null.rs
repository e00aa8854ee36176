use async_trait::async_trait;

use super::{Backend, BackendError};
use crate::LogRecord;

/// Backend used when persistence is disabled. Accepts everything, stores
/// nothing.
#[derive(Debug, Clone, Copy, Default)]
pub struct NullBackend;

#[async_trait]
impl Backend for NullBackend {
    fn name(&self) -> &'static str {
        "none"
    }

    async fn write(&mut self, _record: &LogRecord) -> Result<(), BackendError> {
        Ok(())
    }

    async fn write_batch(&mut self, records: &[LogRecord]) -> Vec<Result<(), BackendError>> {
        records.iter().map(|_| Ok(())).collect()
    }

    async fn rotate(&mut self) -> Result<(), BackendError> {
        Ok(())
    }

    async fn close(&mut self) -> Result<(), BackendError> {
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{LogLevel, TagContext};

    #[tokio::test]
    async fn accepts_everything() {
        let mut backend = NullBackend;
        let record = LogRecord::new(
            LogLevel::Info,
            "null".into(),
            TagContext::new(),
            vec!["x".into()],
            None,
        );

        for _ in 0..10_000 {
            backend.write(&record).await.unwrap();
        }
        let batch = vec![record; 64];
        assert!(backend.write_batch(&batch).await.iter().all(Result::is_ok));
        backend.rotate().await.unwrap();
        backend.close().await.unwrap();
    }
}
