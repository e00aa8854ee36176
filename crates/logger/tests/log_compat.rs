//! Global `log` bridge installation

#![cfg(all(feature = "test-support", feature = "log-compat"))]

use dblogger_core::*;

#[tokio::test]
async fn log_macros_reach_the_backend() {
    let (backend, handle) = MemoryBackend::new();
    let dispatcher = Dispatcher::spawn(Box::new(backend), None, DispatcherConfig::default());
    let logger = Logger::new(dispatcher, "compat", LogLevel::Debug);
    compat::init_log_bridge(logger.clone()).unwrap();

    log::error!(target: "legacy", "Error from log crate");
    log::info!("Info from log crate");
    log::trace!("Trace is filtered");
    logger.flush().await.unwrap();

    let messages = handle.messages();
    assert!(messages.contains(&"Error from log crate".to_string()));
    assert!(messages.contains(&"Info from log crate".to_string()));
    assert!(!messages.iter().any(|m| m.contains("Trace")));
    assert!(
        handle
            .records()
            .iter()
            .any(|r| r.tags.as_slice() == ["legacy"])
    );
}
