use std::path::PathBuf;
use std::sync::OnceLock;

use trawl_common::observability::{init_logging, LogConfig};

static LOG_FILE: OnceLock<PathBuf> = OnceLock::new();

/// Route fetch and raw-exchange events of the HTTP suite to one log file.
pub fn init_test_tracing() -> &'static PathBuf {
    LOG_FILE.get_or_init(|| {
        let config = LogConfig {
            log_dir: Some(std::env::temp_dir().join("trawl-http-tests")),
            ..LogConfig::for_tests("trawl-http")
        };
        init_logging(config).unwrap_or_default()
    })
}
