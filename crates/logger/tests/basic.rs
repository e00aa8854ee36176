//! Logger trees over the null backend

use dblogger_core::*;

fn null_logger(level: LogLevel) -> Logger {
    let dispatcher = Dispatcher::spawn(Box::new(NullBackend), None, DispatcherConfig::default());
    Logger::new(dispatcher, DEFAULT_LOGGER_NAME, level)
}

#[tokio::test]
async fn null_backend_accepts_everything() {
    let logger = null_logger(LogLevel::Debug);

    logger.error("This is an error");
    logger.warn("This is a warning");
    logger.info(("The answer is", 42));
    logger.debug("This is debug");
    logger.trace("This is trace (suppressed at Debug)");
    logger.flush().await.unwrap();

    let stats = logger.stats();
    assert_eq!(stats.enqueued, 4);
    assert_eq!(stats.written, 4);
    assert_eq!(stats.failed, 0);
}

#[tokio::test]
async fn level_checks() {
    let logger = null_logger(LogLevel::Info);

    assert!(!logger.is_enabled(LogLevel::Debug));
    assert!(logger.is_enabled(LogLevel::LOG));
    assert!(logger.is_enabled(LogLevel::Fatal));
    assert_eq!(logger.with_level(LogLevel::Fatal).level(), LogLevel::Fatal);
}

#[tokio::test]
async fn rotate_and_shutdown_on_null_backend() {
    let logger = null_logger(LogLevel::Trace).tag(["engine"]);

    logger.rotate().await.unwrap();
    logger.info("after rotation");
    logger.shutdown().await;
    logger.shutdown().await;

    assert_eq!(logger.stats().rotations, 1);
    assert_eq!(logger.stats().written, 1);
    assert!(matches!(logger.flush().await, Err(Error::Closed)));
}

#[test]
fn bare_level_builds_none_options() {
    let options = LoggerSpec::from(LogLevel::Warn).into_options();

    assert_eq!(options.kind(), "none");
    assert_eq!(options.common().level, LogLevel::Warn);
    assert!(!options.common().stdout);
    assert_eq!(options.common().logger, DEFAULT_LOGGER_NAME);
}

#[test]
fn crate_tests_build_with_bridges_and_helpers() {
    assert!(cfg!(feature = "test-support"));
    assert!(cfg!(feature = "log-compat"));
    assert!(cfg!(feature = "tracing-compat"));
}
