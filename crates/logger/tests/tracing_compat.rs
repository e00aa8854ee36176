//! Global `tracing` bridge installation

#![cfg(all(feature = "test-support", feature = "tracing-compat"))]

use dblogger_core::*;

#[tokio::test]
async fn tracing_macros_reach_the_backend() {
    let (backend, handle) = MemoryBackend::new();
    let dispatcher = Dispatcher::spawn(Box::new(backend), None, DispatcherConfig::default());
    let logger = Logger::new(dispatcher, "compat", LogLevel::Debug);
    compat::init_tracing_bridge(logger.clone()).unwrap();

    tracing::warn!(count = 42, "Message with field");
    tracing::trace!("Trace is filtered");
    logger.flush().await.unwrap();

    assert_eq!(handle.messages(), [r#"Message with field {"count":42}"#]);
}
