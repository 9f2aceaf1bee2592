//! Long-lived sessions with interactive command-line tools.
//!
//! A tool (a Python REPL, a shell, a debugger) runs under a pseudo-terminal;
//! callers submit commands or whole scripts and get back the output produced
//! up to the tool's next prompt. The `ipc` module exposes the same operations
//! as a JSON-lines protocol over stdin/stdout.

pub mod app;
pub mod config;
pub mod error;
pub mod ipc;
mod lock;
pub mod pty_session;
pub mod session;
pub mod telemetry;

pub use app::{init_logging, install_panic_hook, log_debug, log_debug_content, log_file_path};
pub use config::{AppConfig, LifecyclePolicy, ToolConfig, ToolTable};
pub use error::{Result, SessionError};
pub use session::{
    CommandOutcome, HistorySnapshot, OutputSnapshot, Session, SessionRegistry, SessionState,
    SessionStatus, StartReport,
};
