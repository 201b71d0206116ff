//! Logging initialization.
//!
//! Logs go to stderr so stdout only ever carries backend responses.

use tandem_util::log::{self, LogConfig, LogLevel};

/// Initialize logging. `--verbose` raises the level to debug; `RUST_LOG`
/// overrides both.
pub fn init_logging(verbose: bool) {
    log::init(LogConfig {
        print: true,
        level: if verbose {
            LogLevel::Debug
        } else {
            LogLevel::Warn
        },
        include_location: verbose,
    });
}
