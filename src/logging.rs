// 📜 Logging - tracing + tracing-subscriber
//
// RUST_LOG controls the filter (default: info), e.g.
//   RUST_LOG=disposition_core=debug

use tracing_subscriber::{fmt, EnvFilter};

/// Initialise the global subscriber for the CLI.
///
/// Safe to call more than once; later calls are ignored.
pub fn init() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));

    let _ = fmt()
        .with_env_filter(filter)
        .with_target(true)
        .with_thread_ids(false)
        .with_line_number(true)
        .try_init();
}

/// Verbose subscriber routed through the test writer.
pub fn init_test() {
    let _ = fmt()
        .with_env_filter(EnvFilter::new("debug"))
        .with_test_writer()
        .try_init();
}
