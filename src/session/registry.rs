use crate::config::{AppConfig, LifecyclePolicy, ToolConfig, ToolTable};
use crate::error::{Result, SessionError};
use crate::lock::{read_or_recover, write_or_recover};
use crate::log_debug;
use crate::telemetry::{EventSink, TracingSink};
use serde::Serialize;
use std::collections::HashMap;
use std::sync::{Arc, RwLock};
use std::time::Duration;

use super::{
    CommandOutcome, HistorySnapshot, OutputSnapshot, Session, SessionState, SessionStatus,
};

/// Reply to `start_session`.
#[derive(Debug, Clone, Serialize)]
pub struct StartReport {
    pub status: SessionStatus,
    /// Startup banner; empty when an existing session was reused.
    pub initial_output: String,
}

/// Sessions keyed by tool name, created on demand from the tool table.
pub struct SessionRegistry {
    tools: ToolTable,
    default_tool: Option<String>,
    lifecycle: LifecyclePolicy,
    sessions: RwLock<HashMap<String, Arc<Session>>>,
    sink: Arc<dyn EventSink>,
}

impl SessionRegistry {
    pub fn new(
        tools: ToolTable,
        default_tool: Option<String>,
        lifecycle: LifecyclePolicy,
        sink: Arc<dyn EventSink>,
    ) -> Self {
        Self {
            tools,
            default_tool,
            lifecycle,
            sessions: RwLock::new(HashMap::new()),
            sink,
        }
    }

    /// Registry for the server binary: tool table from the CLI/config file,
    /// submissions reported through tracing.
    pub fn from_config(config: &AppConfig) -> anyhow::Result<Self> {
        let tools = config.load_tools()?;
        Ok(Self::new(
            tools,
            Some(config.tool_name.clone()),
            config.lifecycle,
            Arc::new(TracingSink),
        ))
    }

    pub fn lifecycle(&self) -> LifecyclePolicy {
        self.lifecycle
    }

    pub fn default_tool(&self) -> Option<&str> {
        self.default_tool.as_deref()
    }

    pub fn tool_names(&self) -> Vec<String> {
        self.tools.names()
    }

    /// Resolve an optional tool key to a configured tool.
    pub fn resolve(&self, tool: Option<&str>) -> Result<&ToolConfig> {
        let key = match tool.map(str::trim).filter(|key| !key.is_empty()) {
            Some(key) => key,
            None => self.default_tool.as_deref().ok_or_else(|| {
                SessionError::InvalidRequest("no tool given and no default tool".to_string())
            })?,
        };
        self.tools
            .get(key)
            .ok_or_else(|| SessionError::UnknownTool(key.to_string()))
    }

    fn existing(&self, key: &str) -> Option<Arc<Session>> {
        read_or_recover(&self.sessions, "session registry")
            .get(key)
            .cloned()
    }

    fn session(&self, tool: Option<&str>) -> Result<Arc<Session>> {
        let key = self.resolve(tool)?.name.clone();
        self.existing(&key)
            .ok_or_else(|| SessionError::SessionNotReady(SessionState::NotStarted.to_string()))
    }

    /// Start the tool's session, or report the live one already running.
    pub fn start_session(&self, tool: Option<&str>) -> Result<StartReport> {
        let config = self.resolve(tool)?.clone();
        let session = {
            let mut sessions = write_or_recover(&self.sessions, "session registry");
            if let Some(existing) = sessions.get(&config.name) {
                if existing.state().is_live() {
                    return Ok(StartReport {
                        status: existing.get_status(),
                        initial_output: String::new(),
                    });
                }
            }
            let session = Arc::new(Session::new(config.clone(), Arc::clone(&self.sink))?);
            sessions.insert(config.name.clone(), Arc::clone(&session));
            session
        };
        log_debug(&format!("starting session for tool '{}'", config.name));
        let initial_output = session.start()?;
        Ok(StartReport {
            status: session.get_status(),
            initial_output,
        })
    }

    /// Stop any existing session for the tool and start a fresh one.
    pub fn restart_session(&self, tool: Option<&str>) -> Result<StartReport> {
        let key = self.resolve(tool)?.name.clone();
        let previous = write_or_recover(&self.sessions, "session registry").remove(&key);
        if let Some(previous) = previous {
            previous.stop();
        }
        self.start_session(Some(&key))
    }

    pub fn submit_command(
        &self,
        tool: Option<&str>,
        text: &str,
        timeout: Option<Duration>,
    ) -> Result<CommandOutcome> {
        self.with_submission_session(tool, |session| session.submit_command(text, timeout))
    }

    pub fn submit_script(
        &self,
        tool: Option<&str>,
        body: &str,
        template: &str,
        timeout: Option<Duration>,
    ) -> Result<CommandOutcome> {
        self.with_submission_session(tool, |session| {
            session.submit_script(body, template, timeout)
        })
    }

    /// Run a submission according to the lifecycle policy: persistent
    /// sessions must already be running; per-call sessions are started for
    /// the call and stopped afterwards.
    fn with_submission_session<F>(&self, tool: Option<&str>, submit: F) -> Result<CommandOutcome>
    where
        F: FnOnce(&Session) -> Result<CommandOutcome>,
    {
        match self.lifecycle {
            LifecyclePolicy::Persistent => {
                let session = self.session(tool)?;
                submit(&session)
            }
            LifecyclePolicy::PerCall => {
                let config = self.resolve(tool)?.clone();
                let session = {
                    let mut sessions = write_or_recover(&self.sessions, "session registry");
                    if let Some(existing) = sessions.get(&config.name) {
                        if existing.state().is_live() {
                            return Err(SessionError::SessionBusy);
                        }
                    }
                    let session = Arc::new(Session::new(config.clone(), Arc::clone(&self.sink))?);
                    sessions.insert(config.name.clone(), Arc::clone(&session));
                    session
                };
                let result = session.start().and_then(|_| submit(&session));
                session.stop();
                result
            }
        }
    }

    pub fn get_output(&self, tool: Option<&str>, max_lines: Option<usize>) -> Result<OutputSnapshot> {
        let key = self.resolve(tool)?.name.clone();
        Ok(match self.existing(&key) {
            Some(session) => session.get_output(max_lines),
            None => OutputSnapshot {
                output: String::new(),
                state: SessionState::NotStarted,
            },
        })
    }

    pub fn get_status(&self, tool: Option<&str>) -> Result<SessionStatus> {
        let key = self.resolve(tool)?.name.clone();
        Ok(match self.existing(&key) {
            Some(session) => session.get_status(),
            None => SessionStatus::not_started(&key),
        })
    }

    /// Recent history of the tool's session; empty when none was created.
    pub fn get_history(&self, tool: Option<&str>, limit: usize) -> Result<HistorySnapshot> {
        let key = self.resolve(tool)?.name.clone();
        Ok(self
            .existing(&key)
            .map(|session| session.get_history(limit))
            .unwrap_or_default())
    }

    /// Stop the tool's session. Returns the exit code when there is one.
    pub fn stop_session(&self, tool: Option<&str>) -> Result<Option<i32>> {
        let key = self.resolve(tool)?.name.clone();
        Ok(self.existing(&key).and_then(|session| session.stop()))
    }

    pub fn clear_output(&self, tool: Option<&str>) -> Result<()> {
        if let Some(session) = self.existing(&self.resolve(tool)?.name) {
            session.clear_output();
        }
        Ok(())
    }

    /// Status of every configured tool, started or not.
    pub fn list_sessions(&self) -> Vec<SessionStatus> {
        self.tools
            .names()
            .into_iter()
            .map(|name| match self.existing(&name) {
                Some(session) => session.get_status(),
                None => SessionStatus::not_started(&name),
            })
            .collect()
    }

    /// Stop every session.
    pub fn shutdown(&self) {
        let sessions: Vec<Arc<Session>> = write_or_recover(&self.sessions, "session registry")
            .drain()
            .map(|(_, session)| session)
            .collect();
        for session in sessions {
            log_debug(&format!("shutting down session '{}'", session.tool_name()));
            session.stop();
        }
    }
}
