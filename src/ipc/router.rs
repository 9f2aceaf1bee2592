use crate::config::{MAX_TIMEOUT_SECS, MIN_TIMEOUT_SECS};
use crate::error::SessionError;
use crate::session::{SessionRegistry, DEFAULT_RECENT_OUTPUTS};
use serde::Serialize;
use serde_json::{json, Value};
use std::time::Duration;

use super::protocol::{IpcCommand, IpcEvent, IpcRequest, OPERATIONS};

// ============================================================================
// Request Handling
// ============================================================================

pub(super) fn capabilities_event(registry: &SessionRegistry, id: Option<Value>) -> IpcEvent {
    IpcEvent::Capabilities {
        id,
        version: env!("CARGO_PKG_VERSION").to_string(),
        tools: registry.tool_names(),
        default_tool: registry.default_tool().map(str::to_string),
        lifecycle: registry.lifecycle().label().to_string(),
        operations: OPERATIONS.iter().map(|op| op.to_string()).collect(),
    }
}

pub(super) fn error_event(id: Option<Value>, err: &SessionError) -> IpcEvent {
    IpcEvent::Error {
        id,
        kind: err.kind().to_string(),
        message: err.to_string(),
        recoverable: err.is_recoverable(),
    }
}

/// Serve one request and build the reply event.
pub(super) fn handle_request(registry: &SessionRegistry, request: IpcRequest) -> IpcEvent {
    let IpcRequest { id, command } = request;
    if command == IpcCommand::GetCapabilities {
        return capabilities_event(registry, id);
    }
    let op = command.op();
    match dispatch(registry, command) {
        Ok(data) => IpcEvent::Result {
            id,
            op: op.to_string(),
            data,
        },
        Err(err) => error_event(id, &err),
    }
}

fn to_value<T: Serialize>(value: &T) -> Result<Value, SessionError> {
    serde_json::to_value(value)
        .map_err(|err| SessionError::InvalidRequest(format!("cannot encode reply: {err}")))
}

fn timeout_from_secs(timeout: Option<u64>) -> Result<Option<Duration>, SessionError> {
    match timeout {
        Some(secs) if !(MIN_TIMEOUT_SECS..=MAX_TIMEOUT_SECS).contains(&secs) => {
            Err(SessionError::InvalidRequest(format!(
                "timeout must be between {MIN_TIMEOUT_SECS} and {MAX_TIMEOUT_SECS} seconds, got {secs}"
            )))
        }
        Some(secs) => Ok(Some(Duration::from_secs(secs))),
        None => Ok(None),
    }
}

fn dispatch(registry: &SessionRegistry, command: IpcCommand) -> Result<Value, SessionError> {
    match command {
        IpcCommand::StartSession { tool } => to_value(&registry.start_session(tool.as_deref())?),
        IpcCommand::SubmitCommand {
            tool,
            command,
            timeout,
        } => {
            let timeout = timeout_from_secs(timeout)?;
            to_value(&registry.submit_command(tool.as_deref(), &command, timeout)?)
        }
        IpcCommand::SubmitScript {
            tool,
            text,
            command,
            timeout,
        } => {
            let timeout = timeout_from_secs(timeout)?;
            to_value(&registry.submit_script(tool.as_deref(), &text, &command, timeout)?)
        }
        IpcCommand::GetOutput { tool, lines } => {
            to_value(&registry.get_output(tool.as_deref(), lines)?)
        }
        IpcCommand::GetStatus { tool } => to_value(&registry.get_status(tool.as_deref())?),
        IpcCommand::GetHistory { tool, limit } => to_value(
            &registry.get_history(tool.as_deref(), limit.unwrap_or(DEFAULT_RECENT_OUTPUTS))?,
        ),
        IpcCommand::StopSession { tool } => {
            let exit_code = registry.stop_session(tool.as_deref())?;
            Ok(json!({ "exit_code": exit_code }))
        }
        IpcCommand::RestartSession { tool } => {
            to_value(&registry.restart_session(tool.as_deref())?)
        }
        IpcCommand::ListSessions => Ok(json!({ "sessions": to_value(&registry.list_sessions())? })),
        IpcCommand::ClearOutput { tool } => {
            registry.clear_output(tool.as_deref())?;
            Ok(json!({ "cleared": true }))
        }
        IpcCommand::GetCapabilities => Ok(json!({ "operations": OPERATIONS })),
    }
}
