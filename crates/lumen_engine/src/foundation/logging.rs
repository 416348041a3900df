//! Logging utilities and structured logging support

pub use log::{debug, error, info, trace, warn};

/// Initialize the logging system
pub fn init() {
    env_logger::init();
}

/// Initialize the logging system, ignoring a second initialization
///
/// Useful in tests where multiple harnesses may race to initialize.
pub fn try_init() {
    let _ = env_logger::try_init();
}
