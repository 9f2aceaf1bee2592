//! Interactive tool sessions.
//!
//! A [`Session`] owns one tool process (through a [`ProcessDriver`]), a
//! background output monitor that drains the PTY into a capped
//! [`OutputBuffer`], and the prompt detection that decides when a command
//! has finished. The [`SessionRegistry`] keys sessions by tool name and
//! applies the lifecycle policy.
//!
//! Locking: the buffer, state and bookkeeping share one mutex paired with a
//! condvar the monitor signals on every chunk. The driver has its own mutex
//! and is always taken before the state mutex, never while holding it. The
//! submission mutex is separate and only ever taken with `try_lock`.

mod buffer;
mod detector;
mod history;
mod monitor;
mod registry;
mod script;
mod state;

#[cfg(test)]
mod tests;

pub use buffer::OutputBuffer;
pub use detector::{
    clean_output, extract_response, last_lines, strip_ansi_preserve_controls, strip_echo,
    PromptMatcher,
};
pub use history::{
    ErrorRecord, HistorySnapshot, InputRecord, OutputRecord, ScriptRecord, SessionHistory,
    DEFAULT_RECENT_ERRORS, DEFAULT_RECENT_OUTPUTS, HISTORY_CAPACITY,
};
pub use registry::{SessionRegistry, StartReport};
pub use script::{check_template, StagedScript, SCRIPT_PLACEHOLDER};
pub use state::SessionState;

use crate::config::{ToolConfig, MAX_TIMEOUT_SECS, MIN_TIMEOUT_SECS};
use crate::error::{Result, SessionError};
use crate::lock::lock_or_recover;
use crate::pty_session::{describe_exit, LaunchSpec, ProcessDriver, ProcessExit};
use crate::telemetry::{CommandEvent, EventSink, SubmissionKind};
use crate::{log_debug, log_debug_content};
use serde::Serialize;
use std::fs::{File, OpenOptions};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Condvar, Mutex, MutexGuard, TryLockError};
use std::thread::JoinHandle;
use std::time::{Duration, Instant, SystemTime, UNIX_EPOCH};

use monitor::OutputMonitor;

/// Fallback wake-up while waiting for a prompt, in case a notification is missed.
const WAIT_POLL_INTERVAL: Duration = Duration::from_millis(100);
const DROP_GRACE: Duration = Duration::from_millis(500);

fn unix_millis(time: SystemTime) -> u64 {
    time.duration_since(UNIX_EPOCH)
        .map(|elapsed| elapsed.as_millis() as u64)
        .unwrap_or(0)
}

/// History counters kept per session.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SessionStats {
    pub total_commands: u64,
    pub total_scripts: u64,
    pub total_errors: u64,
    pub last_error: Option<String>,
    pub created_at_ms: u64,
    pub updated_at_ms: u64,
}

impl SessionStats {
    fn new() -> Self {
        let now = unix_millis(SystemTime::now());
        Self {
            total_commands: 0,
            total_scripts: 0,
            total_errors: 0,
            last_error: None,
            created_at_ms: now,
            updated_at_ms: now,
        }
    }

    /// One-line human summary.
    pub fn summary(&self) -> String {
        format!(
            "{} commands, {} scripts, {} errors",
            self.total_commands, self.total_scripts, self.total_errors
        )
    }
}

/// Point-in-time view of a session.
#[derive(Debug, Clone, Serialize)]
pub struct SessionStatus {
    pub tool: String,
    pub state: SessionState,
    pub pid: Option<i32>,
    /// Unix milliseconds of the last output chunk.
    pub last_activity_ms: Option<u64>,
    pub exit_code: Option<i32>,
    pub exit_signal: Option<i32>,
    pub stats: SessionStats,
    pub summary: String,
    pub recent_errors: Vec<ErrorRecord>,
}

impl SessionStatus {
    /// Status of a configured tool that has no session yet.
    pub fn not_started(tool: &str) -> Self {
        let stats = SessionStats::new();
        Self {
            tool: tool.to_string(),
            state: SessionState::NotStarted,
            pid: None,
            last_activity_ms: None,
            exit_code: None,
            exit_signal: None,
            summary: stats.summary(),
            stats,
            recent_errors: Vec::new(),
        }
    }
}

/// Result of a command or script that reached the prompt.
#[derive(Debug, Clone, Serialize)]
pub struct CommandOutcome {
    /// Output with styling, echo and the trailing prompt removed.
    pub output: String,
    /// Logical buffer range the output was taken from.
    pub start_offset: u64,
    pub end_offset: u64,
    pub elapsed_ms: u64,
}

/// Undelivered output handed to a `get_output` caller.
#[derive(Debug, Clone, Serialize)]
pub struct OutputSnapshot {
    pub output: String,
    pub state: SessionState,
}

struct Inner {
    buffer: OutputBuffer,
    state: SessionState,
    /// Offset recorded before the in-flight (or timed out) command was written.
    pending: Option<u64>,
    last_activity: Option<SystemTime>,
    pid: Option<i32>,
    exit: Option<ProcessExit>,
    stats: SessionStats,
    history: SessionHistory,
}

impl Inner {
    fn crash_detail(&self) -> String {
        match self.exit {
            Some(exit) => format!("process ended ({})", describe_exit(exit)),
            None => "process output closed".to_string(),
        }
    }

    fn mark_crashed(&mut self, tool: &str, reason: &str) {
        if !self.state.is_live() {
            return;
        }
        log_debug(&format!(
            "[{tool}] session crashed in state {}: {reason}",
            self.state
        ));
        self.state = SessionState::Crashed;
        self.pending = None;
    }

    /// Heal a timed out session once the late prompt shows up.
    fn heal_if_prompted(&mut self, tool: &str, matcher: &PromptMatcher) -> bool {
        if self.state != SessionState::TimedOut {
            return false;
        }
        let Some(offset) = self.pending else {
            return false;
        };
        if !matcher.prompt_at_tail(&self.buffer, offset) {
            return false;
        }
        self.state = SessionState::Ready;
        self.pending = None;
        log_debug(&format!("[{tool}] late prompt observed; session ready again"));
        true
    }
}

/// State shared with the output monitor thread.
struct Shared {
    tool: String,
    matcher: PromptMatcher,
    inner: Mutex<Inner>,
    changed: Condvar,
    stop: AtomicBool,
}

impl Shared {
    fn lock(&self) -> MutexGuard<'_, Inner> {
        lock_or_recover(&self.inner, "session state")
    }

    fn wait_changed<'a>(
        &self,
        guard: MutexGuard<'a, Inner>,
        timeout: Duration,
    ) -> MutexGuard<'a, Inner> {
        match self.changed.wait_timeout(guard, timeout) {
            Ok((guard, _)) => guard,
            Err(poisoned) => {
                log_debug("session state poisoned while waiting; recovering");
                poisoned.into_inner().0
            }
        }
    }
}

type DriverSlot = Arc<Mutex<Option<ProcessDriver>>>;

/// What a caller asked the tool to run.
#[derive(Clone, Copy)]
enum Submission<'a> {
    Command(&'a str),
    Script { body: &'a str, template: &'a str },
}

impl Submission<'_> {
    fn kind(&self) -> SubmissionKind {
        match self {
            Submission::Command(_) => SubmissionKind::Command,
            Submission::Script { .. } => SubmissionKind::Script,
        }
    }
}

/// A submission that was written to the tool and now awaits its prompt.
struct Dispatched<'a> {
    _exclusive: MutexGuard<'a, ()>,
    // Held until the prompt returns so the staged file outlives the command.
    _staged: Option<StagedScript>,
    command: String,
    offset: u64,
    input_id: u64,
}

/// One interactive tool process and everything needed to drive it.
pub struct Session {
    tool: ToolConfig,
    shared: Arc<Shared>,
    driver: DriverSlot,
    submission: Mutex<()>,
    monitor: Mutex<Option<JoinHandle<()>>>,
    sink: Arc<dyn EventSink>,
}

impl Session {
    pub fn new(tool: ToolConfig, sink: Arc<dyn EventSink>) -> Result<Self> {
        let matcher = PromptMatcher::from_tool(&tool)?;
        let inner = Inner {
            buffer: OutputBuffer::new(tool.output_cap_bytes),
            state: SessionState::NotStarted,
            pending: None,
            last_activity: None,
            pid: None,
            exit: None,
            stats: SessionStats::new(),
            history: SessionHistory::new(HISTORY_CAPACITY),
        };
        Ok(Self {
            shared: Arc::new(Shared {
                tool: tool.name.clone(),
                matcher,
                inner: Mutex::new(inner),
                changed: Condvar::new(),
                stop: AtomicBool::new(false),
            }),
            tool,
            driver: Arc::new(Mutex::new(None)),
            submission: Mutex::new(()),
            monitor: Mutex::new(None),
            sink,
        })
    }

    pub fn tool_name(&self) -> &str {
        &self.tool.name
    }

    pub fn state(&self) -> SessionState {
        self.shared.lock().state
    }

    /// Launch the tool and wait for its first prompt.
    ///
    /// Returns the startup output (banner) without the prompt. On failure the
    /// process is terminated and the session is left `Crashed`.
    pub fn start(&self) -> Result<String> {
        {
            let mut inner = self.shared.lock();
            if inner.state != SessionState::NotStarted {
                return Err(SessionError::SessionNotReady(format!(
                    "session already {}",
                    inner.state
                )));
            }
            inner.state = SessionState::Starting;
        }

        let spec = LaunchSpec::from_tool(&self.tool);
        let driver = match ProcessDriver::spawn(&spec) {
            Ok(driver) => driver,
            Err(err) => {
                let detail = format!("{err:#}");
                self.abort_startup(&detail);
                return Err(SessionError::Launch(detail));
            }
        };
        let reader = match driver.reader() {
            Ok(reader) => reader,
            Err(err) => {
                let detail = format!("{err:#}");
                *lock_or_recover(&self.driver, "session driver") = Some(driver);
                self.abort_startup(&detail);
                return Err(SessionError::Launch(detail));
            }
        };
        let pid = driver.pid();
        self.shared.lock().pid = Some(pid);
        *lock_or_recover(&self.driver, "session driver") = Some(driver);

        let monitor = OutputMonitor::new(
            Arc::clone(&self.shared),
            Arc::clone(&self.driver),
            reader,
            self.open_transcript(),
        );
        match monitor.spawn() {
            Ok(handle) => *lock_or_recover(&self.monitor, "session monitor") = Some(handle),
            Err(err) => {
                let detail = format!("failed to spawn output monitor: {err}");
                self.abort_startup(&detail);
                return Err(SessionError::Launch(detail));
            }
        }
        log_debug(&format!(
            "[{}] started pid {pid}; waiting for prompt",
            self.tool.name
        ));

        let startup_timeout = self.tool.startup_timeout();
        match self.wait_for_prompt(0, startup_timeout, None) {
            Ok(outcome) => {
                log_debug(&format!("[{}] ready", self.tool.name));
                Ok(outcome.output)
            }
            Err(SessionError::SessionStopped) => Err(SessionError::SessionStopped),
            Err(err) => {
                let detail = match err {
                    SessionError::PromptTimeout(_) => format!(
                        "no prompt within {}s of launch",
                        startup_timeout.as_secs()
                    ),
                    SessionError::Crashed(detail) => {
                        format!("process exited during startup: {detail}")
                    }
                    other => other.to_string(),
                };
                self.abort_startup(&detail);
                Err(SessionError::Launch(detail))
            }
        }
    }

    fn open_transcript(&self) -> Option<File> {
        let path = self.tool.transcript_path.as_ref()?;
        match OpenOptions::new().create(true).append(true).open(path) {
            Ok(file) => Some(file),
            Err(err) => {
                log_debug(&format!(
                    "[{}] transcript '{}' unavailable: {err}",
                    self.tool.name,
                    path.display()
                ));
                None
            }
        }
    }

    fn abort_startup(&self, detail: &str) {
        log_debug(&format!("[{}] startup failed: {detail}", self.tool.name));
        {
            let mut inner = self.shared.lock();
            inner.history.add_error("launch_error", detail, None);
            inner.mark_crashed(&self.tool.name, detail);
        }
        self.shared.changed.notify_all();
        self.shutdown_process(self.tool.terminate_grace());
    }

    /// Send one command line and wait for the prompt to come back.
    pub fn submit_command(&self, text: &str, timeout: Option<Duration>) -> Result<CommandOutcome> {
        self.run_submission(Submission::Command(text), timeout)
    }

    /// Stage `body` in a temp file and submit `template` with `{script}`
    /// replaced by the file's path. The file is removed on every exit path.
    pub fn submit_script(
        &self,
        body: &str,
        template: &str,
        timeout: Option<Duration>,
    ) -> Result<CommandOutcome> {
        self.run_submission(Submission::Script { body, template }, timeout)
    }

    fn run_submission(
        &self,
        submission: Submission<'_>,
        timeout: Option<Duration>,
    ) -> Result<CommandOutcome> {
        let kind = submission.kind();
        let started = Instant::now();
        let (input_id, result) = match self
            .command_timeout(timeout)
            .and_then(|timeout| Ok((timeout, self.dispatch(submission)?)))
        {
            Ok((timeout, dispatched)) => {
                let input_id = dispatched.input_id;
                (Some(input_id), self.await_response(dispatched, timeout))
            }
            Err(err) => (None, Err(err)),
        };
        self.record_submission(kind, started.elapsed(), input_id, &result);
        result
    }

    /// Per-call override bounded like the configured timeouts.
    fn command_timeout(&self, timeout: Option<Duration>) -> Result<Duration> {
        let Some(timeout) = timeout else {
            return Ok(self.tool.command_timeout());
        };
        let bounds = Duration::from_secs(MIN_TIMEOUT_SECS)..=Duration::from_secs(MAX_TIMEOUT_SECS);
        if bounds.contains(&timeout) {
            Ok(timeout)
        } else {
            Err(SessionError::InvalidRequest(format!(
                "timeout must be between {MIN_TIMEOUT_SECS} and {MAX_TIMEOUT_SECS} seconds"
            )))
        }
    }

    /// Take the submission slot, write the command and record the input.
    /// Nothing reaches the tool unless this returns `Ok`.
    fn dispatch(&self, submission: Submission<'_>) -> Result<Dispatched<'_>> {
        let exclusive = match self.submission.try_lock() {
            Ok(guard) => guard,
            Err(TryLockError::WouldBlock) => return Err(SessionError::SessionBusy),
            Err(TryLockError::Poisoned(poisoned)) => {
                log_debug("submission lock poisoned; recovering");
                poisoned.into_inner()
            }
        };

        self.refresh();
        self.ensure_ready()?;
        let (command, staged) = match submission {
            Submission::Command(text) => (text.to_string(), None),
            Submission::Script { template, body } => {
                check_template(template)?;
                let staged = StagedScript::stage(&self.tool.working_directory, body)?;
                (staged.render(template), Some(staged))
            }
        };

        let offset = {
            let mut inner = self.shared.lock();
            if inner.state != SessionState::Ready {
                return Err(not_ready_error(&inner));
            }
            let offset = inner.buffer.end();
            inner.pending = Some(offset);
            inner.state = SessionState::Busy;
            offset
        };

        let written = match lock_or_recover(&self.driver, "session driver").as_mut() {
            Some(driver) => driver
                .write_line(&command)
                .map_err(|err| SessionError::PipeClosed(format!("{err:#}"))),
            None => Err(SessionError::SessionStopped),
        };
        if let Err(err) = written {
            self.refresh();
            let mut inner = self.shared.lock();
            if inner.state == SessionState::Busy {
                inner.state = SessionState::Ready;
                inner.pending = None;
            }
            return Err(err);
        }
        log_debug_content(&format!("[{}] sent: {command}", self.tool.name));

        let input_id = {
            let mut inner = self.shared.lock();
            let script_file = staged
                .as_ref()
                .map(|staged| staged.path().to_string_lossy().into_owned());
            let kind = submission.kind();
            let input_id = inner
                .history
                .add_input(kind, &command, script_file.as_deref());
            if let (Submission::Script { body, template }, Some(file)) =
                (submission, script_file.as_deref())
            {
                inner
                    .history
                    .add_script(input_id, body, template, file, &command);
            }
            input_id
        };

        Ok(Dispatched {
            _exclusive: exclusive,
            _staged: staged,
            command,
            offset,
            input_id,
        })
    }

    fn await_response(
        &self,
        dispatched: Dispatched<'_>,
        timeout: Duration,
    ) -> Result<CommandOutcome> {
        let echo = self.tool.strip_echo.then_some(dispatched.command.as_str());
        let outcome = self.wait_for_prompt(dispatched.offset, timeout, echo)?;
        log_debug_content(&format!(
            "[{}] output ({} bytes): {}",
            self.tool.name,
            outcome.output.len(),
            outcome.output.chars().take(200).collect::<String>()
        ));
        Ok(outcome)
    }

    fn ensure_ready(&self) -> Result<()> {
        let inner = self.shared.lock();
        if inner.state == SessionState::Ready {
            Ok(())
        } else {
            Err(not_ready_error(&inner))
        }
    }

    /// Counters and history only track submissions that reached the tool;
    /// the sink hears about every attempt.
    fn record_submission(
        &self,
        kind: SubmissionKind,
        elapsed: Duration,
        input_id: Option<u64>,
        result: &Result<CommandOutcome>,
    ) {
        if input_id.is_some() {
            let mut inner = self.shared.lock();
            match kind {
                SubmissionKind::Command => inner.stats.total_commands += 1,
                SubmissionKind::Script => inner.stats.total_scripts += 1,
            }
            match result {
                Ok(outcome) => inner.history.add_output(&outcome.output, input_id),
                Err(err) => {
                    inner.stats.total_errors += 1;
                    inner.stats.last_error = Some(format!("{}: {err}", err.kind()));
                    inner
                        .history
                        .add_error(err.kind(), &err.to_string(), input_id);
                }
            }
            inner.stats.updated_at_ms = unix_millis(SystemTime::now());
        }
        self.sink.record(&CommandEvent {
            tool: self.tool.name.clone(),
            kind,
            duration: elapsed,
            failure: result.as_ref().err().map(SessionError::kind),
        });
    }

    /// Wait until output after `offset` ends with the prompt and stays quiet
    /// for the settle window, or `timeout` passes.
    fn wait_for_prompt(
        &self,
        offset: u64,
        timeout: Duration,
        echo: Option<&str>,
    ) -> Result<CommandOutcome> {
        let started = Instant::now();
        let deadline = started
            .checked_add(timeout)
            .unwrap_or_else(|| started + Duration::from_secs(MAX_TIMEOUT_SECS));
        let settle = self.tool.settle_window();
        let matcher = &self.shared.matcher;
        // (buffer end when the prompt was seen, when it was seen)
        let mut candidate: Option<(u64, Instant)> = None;
        let mut last_reap = started;
        let mut inner = self.shared.lock();
        loop {
            // An exit is not always followed by EOF: a surviving grandchild
            // can keep the PTY open.
            if last_reap.elapsed() >= WAIT_POLL_INTERVAL {
                drop(inner);
                self.refresh();
                last_reap = Instant::now();
                inner = self.shared.lock();
            }
            match inner.state {
                SessionState::Stopped => return Err(SessionError::SessionStopped),
                SessionState::Crashed => return Err(SessionError::Crashed(inner.crash_detail())),
                _ => {}
            }

            let end = inner.buffer.end();
            if candidate.map(|(seen_end, _)| seen_end) != Some(end) {
                candidate = matcher
                    .prompt_at_tail(&inner.buffer, offset)
                    .then(|| (end, Instant::now()));
            }

            let now = Instant::now();
            if let Some((_, seen_at)) = candidate {
                if now.duration_since(seen_at) >= settle || now >= deadline {
                    let raw = inner.buffer.range(offset, end).to_vec();
                    inner.buffer.mark_delivered(offset, end);
                    inner.state = SessionState::Ready;
                    inner.pending = None;
                    drop(inner);
                    self.shared.changed.notify_all();
                    return Ok(CommandOutcome {
                        output: extract_response(&raw, matcher, echo),
                        start_offset: offset,
                        end_offset: end,
                        elapsed_ms: started.elapsed().as_millis() as u64,
                    });
                }
            }

            if now >= deadline {
                if inner.state == SessionState::Busy {
                    inner.state = SessionState::TimedOut;
                }
                log_debug(&format!(
                    "[{}] no prompt within {}ms",
                    self.tool.name,
                    timeout.as_millis()
                ));
                return Err(SessionError::PromptTimeout(timeout));
            }

            let mut wait = (deadline - now).min(WAIT_POLL_INTERVAL);
            if let Some((_, seen_at)) = candidate {
                wait = wait.min(settle.saturating_sub(now.duration_since(seen_at)));
            }
            inner = self
                .shared
                .wait_changed(inner, wait.max(Duration::from_millis(1)));
        }
    }

    /// Reconcile state with the process: notice exits the monitor has not
    /// reported yet and heal a timed out session whose prompt came back.
    fn refresh(&self) {
        let exit = lock_or_recover(&self.driver, "session driver")
            .as_mut()
            .and_then(ProcessDriver::try_wait);
        let mut inner = self.shared.lock();
        let mut changed = false;
        if let Some(exit) = exit {
            if inner.exit.is_none() {
                inner.exit = Some(exit);
            }
            if inner.state.is_live() {
                inner.mark_crashed(&self.tool.name, &describe_exit(exit));
                changed = true;
            }
        }
        changed |= inner.heal_if_prompted(&self.tool.name, &self.shared.matcher);
        drop(inner);
        if changed {
            self.shared.changed.notify_all();
        }
    }

    /// Output not yet delivered to any caller, optionally limited to the
    /// newest `max_lines` lines.
    pub fn get_output(&self, max_lines: Option<usize>) -> OutputSnapshot {
        self.refresh();
        let (raw, state) = {
            let mut inner = self.shared.lock();
            (inner.buffer.take_undelivered(), inner.state)
        };
        let text = clean_output(&raw);
        let output = match max_lines {
            Some(max) => last_lines(&text, max).to_string(),
            None => text,
        };
        OutputSnapshot { output, state }
    }

    pub fn get_status(&self) -> SessionStatus {
        self.refresh();
        let inner = self.shared.lock();
        SessionStatus {
            tool: self.tool.name.clone(),
            state: inner.state,
            pid: inner.pid,
            last_activity_ms: inner.last_activity.map(unix_millis),
            exit_code: inner.exit.and_then(|exit| exit.code),
            exit_signal: inner.exit.and_then(|exit| exit.signal),
            summary: inner.stats.summary(),
            stats: inner.stats.clone(),
            recent_errors: inner.history.recent_errors(DEFAULT_RECENT_ERRORS),
        }
    }

    /// The newest `limit` records of each history queue.
    pub fn get_history(&self, limit: usize) -> HistorySnapshot {
        self.shared.lock().history.snapshot(limit)
    }

    /// Drop all buffered output. Offsets keep counting, so an in-flight
    /// command still sees only what arrives afterwards.
    pub fn clear_output(&self) {
        self.shared.lock().buffer.clear();
    }

    /// Terminate the process and move to `Stopped`. An in-flight submission
    /// returns `SessionStopped`. Returns the exit code if the process exited
    /// normally.
    pub fn stop(&self) -> Option<i32> {
        {
            let mut inner = self.shared.lock();
            if inner.state == SessionState::Stopped {
                return inner.exit.and_then(|exit| exit.code);
            }
            inner.state = SessionState::Stopped;
            inner.pending = None;
        }
        self.shared.changed.notify_all();
        log_debug(&format!("[{}] stopping", self.tool.name));

        let exit = self.shutdown_process(self.tool.terminate_grace());
        let mut inner = self.shared.lock();
        if inner.exit.is_none() {
            inner.exit = exit;
        }
        inner.exit.and_then(|exit| exit.code)
    }

    /// Stop the monitor, terminate the process and reap it.
    fn shutdown_process(&self, grace: Duration) -> Option<ProcessExit> {
        self.shared.stop.store(true, Ordering::SeqCst);
        let driver = lock_or_recover(&self.driver, "session driver").take();
        let exit = driver.map(|mut driver| driver.terminate(grace));
        let handle = lock_or_recover(&self.monitor, "session monitor").take();
        if let Some(handle) = handle {
            if handle.join().is_err() {
                log_debug(&format!("[{}] output monitor panicked", self.tool.name));
            }
        }
        exit
    }
}

impl Drop for Session {
    fn drop(&mut self) {
        {
            let mut inner = self.shared.lock();
            if inner.state.is_live() {
                inner.state = SessionState::Stopped;
            }
        }
        self.shared.changed.notify_all();
        self.shutdown_process(DROP_GRACE);
    }
}

fn not_ready_error(inner: &Inner) -> SessionError {
    match inner.state {
        SessionState::Busy => SessionError::SessionBusy,
        SessionState::Crashed => SessionError::Crashed(inner.crash_detail()),
        state => SessionError::SessionNotReady(state.to_string()),
    }
}
