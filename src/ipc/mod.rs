//! JSON IPC mode for driving tool sessions from another process.
//!
//! Architecture:
//! - Stdin reader thread: parses JSON commands, sends them to the dispatcher
//! - Dispatcher: answers each request on a worker thread so `stop_session`
//!   can interrupt a submission that is still waiting on its prompt
//! - Output: one lock serializes reply lines on stdout
//!
//! Protocol:
//! - Each line is a JSON object
//! - Events (server → client): {"event": "...", "id": ..., ...}
//! - Commands (client → server): {"cmd": "...", "id": ..., ...}

mod protocol;
mod router;
mod session;


pub use protocol::{IpcCommand, IpcEvent, IpcRequest, OPERATIONS};
pub use session::run_ipc_mode;
