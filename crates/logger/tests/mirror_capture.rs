//! Records mirrored next to an in-memory backend

#![cfg(feature = "test-support")]

use dblogger_core::*;

#[tokio::test]
async fn mirror_sees_exactly_what_is_persisted() {
    let (backend, handle) = MemoryBackend::new();
    let (mirror, capture) = StdoutMirror::capture();
    let dispatcher = Dispatcher::spawn(Box::new(backend), Some(mirror), DispatcherConfig::default());
    let logger = Logger::new(dispatcher, "app", LogLevel::Info);

    logger.info("a");
    logger.debug("b");
    logger.tag(["x"]).warn("c");
    logger.flush().await.unwrap();

    let records = handle.records();
    assert_eq!(records.len(), 2);
    assert!(records[0].tags.is_empty());
    assert_eq!(records[1].tags.as_slice(), ["x"]);

    let lines = capture.lines();
    assert_eq!(lines.len(), 2);
    assert!(lines[0].ends_with(": a"), "{}", lines[0]);
    assert!(lines[1].contains("WARN"));
    assert!(lines[1].ends_with("[x]: c"), "{}", lines[1]);
}

#[tokio::test]
async fn failing_backend_keeps_the_process_alive() {
    let (backend, handle) = MemoryBackend::new();
    let (mirror, capture) = StdoutMirror::capture();
    let dispatcher = Dispatcher::spawn(Box::new(backend), Some(mirror), DispatcherConfig::default());
    let logger = Logger::new(dispatcher, "app", LogLevel::Trace);
    handle.fail_next_writes(2);

    for i in 0..5 {
        logger.info(("attempt", i));
    }
    logger.flush().await.unwrap();

    assert_eq!(handle.records().len(), 3);
    assert_eq!(logger.stats().failed, 2);
    assert_eq!(capture.contents().matches("write failed").count(), 1);
}
