//! Error taxonomy surfaced to callers of the session core.
//!
//! Every failure a caller can observe maps onto one of these kinds. The
//! underlying OS or parser message is kept as the variant's detail string so
//! nothing is lost, but callers never have to interpret raw `io::Error`s.

use std::time::Duration;
use thiserror::Error;

#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum SessionError {
    #[error("failed to launch tool: {0}")]
    Launch(String),

    #[error("unknown tool: {0}")]
    UnknownTool(String),

    #[error("process input closed: {0}")]
    PipeClosed(String),

    #[error("session crashed: {0}")]
    Crashed(String),

    #[error("no prompt within {}s; the process may still be busy", .0.as_secs_f32())]
    PromptTimeout(Duration),

    #[error("a command is already in flight")]
    SessionBusy,

    #[error("session is not ready (state: {0})")]
    SessionNotReady(String),

    #[error("failed to stage script: {0}")]
    TempFile(String),

    #[error("session was stopped")]
    SessionStopped,

    #[error("invalid request: {0}")]
    InvalidRequest(String),
}

impl SessionError {
    /// Stable snake_case code used on the wire and in telemetry.
    pub fn kind(&self) -> &'static str {
        match self {
            SessionError::Launch(_) => "launch_error",
            SessionError::UnknownTool(_) => "unknown_tool",
            SessionError::PipeClosed(_) => "pipe_closed",
            SessionError::Crashed(_) => "crashed",
            SessionError::PromptTimeout(_) => "prompt_timeout",
            SessionError::SessionBusy => "session_busy",
            SessionError::SessionNotReady(_) => "session_not_ready",
            SessionError::TempFile(_) => "temp_file_error",
            SessionError::SessionStopped => "session_stopped",
            SessionError::InvalidRequest(_) => "invalid_request",
        }
    }

    /// Whether the session is still usable after this error.
    pub fn is_recoverable(&self) -> bool {
        !matches!(
            self,
            SessionError::Launch(_)
                | SessionError::PipeClosed(_)
                | SessionError::Crashed(_)
                | SessionError::SessionStopped
        )
    }
}

pub type Result<T> = std::result::Result<T, SessionError>;
