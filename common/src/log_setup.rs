use std::sync::OnceLock;

use flexi_logger::{Logger, LoggerHandle};

static LOGGER: OnceLock<LoggerHandle> = OnceLock::new();

/// Stderr-only logger for tests. Safe to call from every test.
pub fn setup_test_logging() {
    LOGGER.get_or_init(|| {
        Logger::try_with_env_or_str("debug")
            .unwrap_or_else(|e| panic!("Invalid log filter: {}", e))
            .log_to_stderr()
            .start()
            .unwrap_or_else(|e| panic!("Logger initialization failed with {}", e))
    });
}
