//! Process-wide diagnostics: the rotating debug log and the crash hook.

mod logging;

#[cfg(test)]
#[allow(unused_imports)]
pub(crate) use logging::set_logging_for_tests;
pub use logging::{
    crash_log_path, init_logging, install_panic_hook, log_debug, log_debug_content, log_file_path,
    log_panic,
};
