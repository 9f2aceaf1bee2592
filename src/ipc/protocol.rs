//! JSON-lines protocol spoken over stdin/stdout.
//!
//! Requests are objects tagged by `cmd` with an optional caller `id`;
//! replies are objects tagged by `event` that echo the `id`.

use serde::{Deserialize, Serialize};
use serde_json::Value;

// ============================================================================
// IPC Events (server → client)
// ============================================================================

/// Events emitted by the server.
///
/// Serialized as JSON with an `"event"` tag field for type discrimination.
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "event")]
pub enum IpcEvent {
    /// Sent once on startup and whenever a client asks
    #[serde(rename = "capabilities")]
    Capabilities {
        #[serde(skip_serializing_if = "Option::is_none")]
        id: Option<Value>,
        version: String,
        tools: Vec<String>,
        default_tool: Option<String>,
        lifecycle: String,
        operations: Vec<String>,
    },

    /// Successful operation
    #[serde(rename = "result")]
    Result {
        #[serde(skip_serializing_if = "Option::is_none")]
        id: Option<Value>,
        op: String,
        data: Value,
    },

    /// Failed operation or malformed request
    #[serde(rename = "error")]
    Error {
        #[serde(skip_serializing_if = "Option::is_none")]
        id: Option<Value>,
        kind: String,
        message: String,
        recoverable: bool,
    },
}

// ============================================================================
// IPC Commands (client → server)
// ============================================================================

/// One request line: the command plus the caller's correlation id.
#[derive(Debug, Clone, Deserialize)]
pub struct IpcRequest {
    #[serde(default)]
    pub id: Option<Value>,
    #[serde(flatten)]
    pub command: IpcCommand,
}

/// Commands received from an IPC client. `tool` falls back to the default
/// tool when omitted; `timeout` is in seconds.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(tag = "cmd")]
pub enum IpcCommand {
    #[serde(rename = "start_session")]
    StartSession {
        #[serde(default)]
        tool: Option<String>,
    },

    #[serde(rename = "submit_command")]
    SubmitCommand {
        #[serde(default)]
        tool: Option<String>,
        command: String,
        #[serde(default)]
        timeout: Option<u64>,
    },

    /// `command` is the wrapper template containing `{script}`
    #[serde(rename = "submit_script")]
    SubmitScript {
        #[serde(default)]
        tool: Option<String>,
        text: String,
        command: String,
        #[serde(default)]
        timeout: Option<u64>,
    },

    #[serde(rename = "get_output")]
    GetOutput {
        #[serde(default)]
        tool: Option<String>,
        #[serde(default)]
        lines: Option<usize>,
    },

    #[serde(rename = "get_status")]
    GetStatus {
        #[serde(default)]
        tool: Option<String>,
    },

    /// Recent inputs, outputs, scripts and errors; `limit` per queue
    #[serde(rename = "get_history")]
    GetHistory {
        #[serde(default)]
        tool: Option<String>,
        #[serde(default)]
        limit: Option<usize>,
    },

    #[serde(rename = "stop_session")]
    StopSession {
        #[serde(default)]
        tool: Option<String>,
    },

    #[serde(rename = "restart_session")]
    RestartSession {
        #[serde(default)]
        tool: Option<String>,
    },

    #[serde(rename = "list_sessions")]
    ListSessions,

    #[serde(rename = "clear_output")]
    ClearOutput {
        #[serde(default)]
        tool: Option<String>,
    },

    /// Request capabilities (re-emit capabilities event)
    #[serde(rename = "get_capabilities")]
    GetCapabilities,
}

impl IpcCommand {
    /// Wire name of the operation, echoed as `op` in results.
    pub fn op(&self) -> &'static str {
        match self {
            IpcCommand::StartSession { .. } => "start_session",
            IpcCommand::SubmitCommand { .. } => "submit_command",
            IpcCommand::SubmitScript { .. } => "submit_script",
            IpcCommand::GetOutput { .. } => "get_output",
            IpcCommand::GetStatus { .. } => "get_status",
            IpcCommand::GetHistory { .. } => "get_history",
            IpcCommand::StopSession { .. } => "stop_session",
            IpcCommand::RestartSession { .. } => "restart_session",
            IpcCommand::ListSessions => "list_sessions",
            IpcCommand::ClearOutput { .. } => "clear_output",
            IpcCommand::GetCapabilities => "get_capabilities",
        }
    }
}

/// Every operation the server accepts, advertised in `capabilities`.
pub const OPERATIONS: &[&str] = &[
    "start_session",
    "submit_command",
    "submit_script",
    "get_output",
    "get_status",
    "get_history",
    "stop_session",
    "restart_session",
    "list_sessions",
    "clear_output",
    "get_capabilities",
];
