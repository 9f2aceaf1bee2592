//! Per-submission telemetry records.
//!
//! The session core reports one record per command or script submission
//! through an [`EventSink`]. Delivery is fire-and-forget: a sink never
//! returns anything to the caller and must not block for long.

use crate::config::AppConfig;
use serde::Serialize;
use std::env;
use std::fs::OpenOptions;
use std::path::PathBuf;
use std::sync::OnceLock;
use std::time::Duration;
use tracing_subscriber::fmt::time::UtcTime;

static TRACING_INIT: OnceLock<()> = OnceLock::new();

/// What kind of submission produced a record.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum SubmissionKind {
    Command,
    Script,
}

impl SubmissionKind {
    pub fn as_str(self) -> &'static str {
        match self {
            SubmissionKind::Command => "command",
            SubmissionKind::Script => "script",
        }
    }
}

/// One telemetry record.
#[derive(Debug, Clone)]
pub struct CommandEvent {
    pub tool: String,
    pub kind: SubmissionKind,
    pub duration: Duration,
    /// `None` on success, otherwise the error kind code.
    pub failure: Option<&'static str>,
}

impl CommandEvent {
    pub fn outcome(&self) -> &'static str {
        self.failure.unwrap_or("ok")
    }
}

pub trait EventSink: Send + Sync {
    fn record(&self, event: &CommandEvent);
}

/// Emits records through `tracing`; lands in the JSON trace log once
/// [`init_tracing`] has run.
#[derive(Debug, Default, Clone, Copy)]
pub struct TracingSink;

impl EventSink for TracingSink {
    fn record(&self, event: &CommandEvent) {
        tracing::info!(
            target: "toolsession::submission",
            tool = %event.tool,
            kind = event.kind.as_str(),
            duration_ms = event.duration.as_millis() as u64,
            outcome = event.outcome(),
            "submission finished"
        );
    }
}

#[derive(Debug, Default, Clone, Copy)]
pub struct NullSink;

impl EventSink for NullSink {
    fn record(&self, _event: &CommandEvent) {}
}

pub(crate) fn tracing_log_path() -> PathBuf {
    env::var("TOOLSESSION_TRACE_LOG")
        .map(PathBuf::from)
        .unwrap_or_else(|_| env::temp_dir().join("toolsession_trace.jsonl"))
}

/// Install the global JSON subscriber once. Disabled together with `--no-logs`.
pub fn init_tracing(config: &AppConfig) {
    if config.no_logs {
        return;
    }

    let _ = TRACING_INIT.get_or_init(|| {
        let path = tracing_log_path();
        let file = match OpenOptions::new().create(true).append(true).open(&path) {
            Ok(file) => file,
            Err(_) => return,
        };
        let subscriber = tracing_subscriber::fmt()
            .json()
            .with_timer(UtcTime::rfc_3339())
            .with_writer(file)
            .with_current_span(false)
            .with_span_list(false)
            .finish();
        let _ = tracing::subscriber::set_global_default(subscriber);
    });
}
