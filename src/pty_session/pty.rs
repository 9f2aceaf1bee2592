//! Pseudo-terminal (PTY) process driver.
//!
//! Spawns an interactive tool under a PTY so it prompts and flushes as if a
//! person were typing into it. The slave side becomes the child's stdin,
//! stdout and stderr; the driver keeps the master for writing commands, and a
//! [`PtyReader`] holds a duplicate of it for the output monitor.

use crate::config::{split_command, ToolConfig};
use crate::lock::lock_or_recover;
use crate::log_debug;
use anyhow::{anyhow, bail, Context, Result};
use std::ffi::CString;
use std::io;
use std::mem;
use std::os::unix::io::RawFd;
use std::path::PathBuf;
use std::ptr;
use std::sync::Mutex;
use std::thread;
use std::time::{Duration, Instant};

use super::io::{write_all, PtyReader};

/// Serializes openpty..fork so no child inherits another session's PTY
/// before its descriptors are marked close-on-exec.
static SPAWN_LOCK: Mutex<()> = Mutex::new(());

const WAIT_POLL_INTERVAL: Duration = Duration::from_millis(20);
const DROP_GRACE: Duration = Duration::from_millis(500);

/// Everything needed to launch one tool process.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LaunchSpec {
    pub launch_command: String,
    pub environment_command: Option<String>,
    pub working_dir: PathBuf,
    pub term: String,
}

impl LaunchSpec {
    pub fn from_tool(tool: &ToolConfig) -> Self {
        Self {
            launch_command: tool.launch_command.clone(),
            environment_command: tool.environment_command.clone(),
            working_dir: tool.working_directory.clone(),
            term: tool
                .term
                .clone()
                .unwrap_or_else(crate::config::default_term),
        }
    }

    /// Argument vector for `execvp`.
    ///
    /// With an environment setup command the tool runs through
    /// `/bin/sh -c "<setup> && exec <launch>"` so the setup can modify the
    /// environment the tool inherits; otherwise the launch command is split
    /// with shell-word rules and executed directly.
    pub fn argv(&self) -> Result<Vec<String>> {
        let launch = self.launch_command.trim();
        if launch.is_empty() {
            bail!("launch command is empty");
        }
        match self
            .environment_command
            .as_deref()
            .map(str::trim)
            .filter(|setup| !setup.is_empty())
        {
            Some(setup) => Ok(vec![
                "/bin/sh".to_string(),
                "-c".to_string(),
                format!("{setup} && exec {launch}"),
            ]),
            None => {
                let words = split_command(launch)?;
                if words.is_empty() {
                    bail!("launch command is empty");
                }
                Ok(words)
            }
        }
    }
}

/// How a child process ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ProcessExit {
    /// Exit code for a normal exit.
    pub code: Option<i32>,
    /// Terminating signal, if any.
    pub signal: Option<i32>,
}

impl ProcessExit {
    fn from_wait_status(status: libc::c_int) -> Self {
        if libc::WIFEXITED(status) {
            Self {
                code: Some(libc::WEXITSTATUS(status)),
                signal: None,
            }
        } else if libc::WIFSIGNALED(status) {
            Self {
                code: None,
                signal: Some(libc::WTERMSIG(status)),
            }
        } else {
            Self::unknown()
        }
    }

    /// The child was reaped elsewhere; no status is available.
    fn unknown() -> Self {
        Self {
            code: None,
            signal: None,
        }
    }
}

/// Owns one child process running under a PTY.
pub struct ProcessDriver {
    master_fd: RawFd,
    pid: i32,
    exit: Option<ProcessExit>,
}

impl ProcessDriver {
    /// Launch the process described by `spec`.
    ///
    /// Fails when the working directory is missing, the command line cannot
    /// be parsed, or the child cannot set up its terminal or exec the tool.
    pub fn spawn(spec: &LaunchSpec) -> Result<Self> {
        if !spec.working_dir.is_dir() {
            bail!(
                "working directory '{}' does not exist",
                spec.working_dir.display()
            );
        }
        let argv = spec
            .argv()?
            .into_iter()
            .map(|arg| {
                CString::new(arg.as_str())
                    .with_context(|| format!("command argument contains NUL byte: {arg}"))
            })
            .collect::<Result<Vec<_>>>()?;
        let cwd_text = spec.working_dir.to_string_lossy().to_string();
        let cwd = CString::new(cwd_text.as_str())
            .with_context(|| format!("working directory contains NUL byte: {cwd_text}"))?;
        let term = CString::new(spec.term.as_str())
            .with_context(|| format!("TERM value contains NUL byte: {}", spec.term))?;

        let (master_fd, pid) = {
            let _spawning = lock_or_recover(&SPAWN_LOCK, "pty spawn");
            // SAFETY: argv/cwd/TERM are valid CStrings; spawn_pty_child returns a valid master fd.
            unsafe { spawn_pty_child(&argv, &cwd, &term)? }
        };
        // SAFETY: master_fd was just returned by openpty and is owned here.
        if let Err(err) = unsafe { set_nonblocking(master_fd) } {
            let mut driver = Self {
                master_fd,
                pid,
                exit: None,
            };
            driver.terminate(Duration::ZERO);
            return Err(err);
        }
        log_debug(&format!("spawned pid {pid} under PTY"));
        Ok(Self {
            master_fd,
            pid,
            exit: None,
        })
    }

    pub fn pid(&self) -> i32 {
        self.pid
    }

    #[cfg(test)]
    pub(super) fn master_fd(&self) -> RawFd {
        self.master_fd
    }

    /// Independent read handle for the output monitor.
    pub fn reader(&self) -> Result<PtyReader> {
        // SAFETY: master_fd is open for the driver's lifetime; the duplicate is
        // owned by the returned reader.
        let fd = unsafe { libc::fcntl(self.master_fd, libc::F_DUPFD_CLOEXEC, 0) };
        if fd < 0 {
            return Err(errno_error("fcntl(F_DUPFD_CLOEXEC) failed"));
        }
        Ok(PtyReader::new(fd))
    }

    /// Write `text` to the tool, terminated by a newline.
    pub fn write_line(&mut self, text: &str) -> Result<()> {
        if let Some(exit) = self.try_wait() {
            bail!("process exited ({})", describe_exit(exit));
        }
        write_all(self.master_fd, text.as_bytes())?;
        if !text.ends_with('\n') {
            write_all(self.master_fd, b"\n")?;
        }
        Ok(())
    }

    /// Non-blocking check for child exit; reaps the child on completion.
    pub fn try_wait(&mut self) -> Option<ProcessExit> {
        if self.exit.is_none() {
            self.exit = reap(self.pid, false);
        }
        self.exit
    }

    pub fn is_alive(&mut self) -> bool {
        self.try_wait().is_none()
    }

    /// SIGTERM the child's process group, wait up to `grace`, then SIGKILL
    /// and reap. Returns how the process ended.
    pub fn terminate(&mut self, grace: Duration) -> ProcessExit {
        if let Some(exit) = self.try_wait() {
            // Background jobs the tool left behind may still hold the PTY.
            // SAFETY: kill has no memory-safety requirements; ESRCH is expected.
            let _ = unsafe { libc::kill(-self.pid, libc::SIGKILL) };
            return exit;
        }
        signal_group(self.pid, libc::SIGTERM);
        if let Some(exit) = wait_for_exit(self.pid, grace) {
            self.exit = Some(exit);
            return exit;
        }
        log_debug(&format!(
            "pid {} ignored SIGTERM for {}ms; sending SIGKILL",
            self.pid,
            grace.as_millis()
        ));
        signal_group(self.pid, libc::SIGKILL);
        let exit = reap(self.pid, true).unwrap_or_else(ProcessExit::unknown);
        self.exit = Some(exit);
        exit
    }
}

impl Drop for ProcessDriver {
    fn drop(&mut self) {
        if self.try_wait().is_none() {
            self.terminate(DROP_GRACE);
        }
        // SAFETY: master_fd is owned by the driver and closed exactly once.
        unsafe { close_fd(self.master_fd) };
    }
}

pub fn describe_exit(exit: ProcessExit) -> String {
    match (exit.code, exit.signal) {
        (Some(code), _) => format!("exit code {code}"),
        (None, Some(signal)) => format!("killed by signal {signal}"),
        (None, None) => "status unavailable".to_string(),
    }
}

fn signal_group(pid: i32, signal: libc::c_int) {
    // SAFETY: the child called setsid, so -pid addresses its own process group.
    if unsafe { libc::kill(-pid, signal) } == 0 {
        return;
    }
    // SAFETY: fall back to the child itself (group may already be gone).
    if unsafe { libc::kill(pid, signal) } != 0 {
        log_debug(&format!(
            "signal {signal} to pid {pid} failed: {}",
            io::Error::last_os_error()
        ));
    }
}

fn reap(pid: i32, block: bool) -> Option<ProcessExit> {
    let flags = if block { 0 } else { libc::WNOHANG };
    let mut status = 0;
    loop {
        // SAFETY: pid is a child owned by the driver; status is a valid out pointer.
        let ret = unsafe { libc::waitpid(pid, &mut status, flags) };
        if ret > 0 {
            return Some(ProcessExit::from_wait_status(status));
        }
        if ret == 0 {
            return None;
        }
        let err = io::Error::last_os_error();
        if err.kind() == io::ErrorKind::Interrupted {
            continue;
        }
        log_debug(&format!("waitpid({pid}) failed: {err}"));
        return Some(ProcessExit::unknown());
    }
}

/// Wait for the child process to terminate, but bail out after `timeout`.
pub(super) fn wait_for_exit(pid: i32, timeout: Duration) -> Option<ProcessExit> {
    let start = Instant::now();
    loop {
        if let Some(exit) = reap(pid, false) {
            return Some(exit);
        }
        if start.elapsed() >= timeout {
            return None;
        }
        thread::sleep(WAIT_POLL_INTERVAL);
    }
}

/// Stage codes the child reports through the status pipe.
const STAGE_SETSID: u8 = 1;
const STAGE_CTTY: u8 = 2;
const STAGE_DUP2: u8 = 3;
const STAGE_CHDIR: u8 = 4;
const STAGE_SETENV: u8 = 5;
const STAGE_EXEC: u8 = 6;

fn stage_name(stage: u8) -> &'static str {
    match stage {
        STAGE_SETSID => "setsid",
        STAGE_CTTY => "ioctl(TIOCSCTTY)",
        STAGE_DUP2 => "dup2",
        STAGE_CHDIR => "chdir",
        STAGE_SETENV => "setenv(TERM)",
        STAGE_EXEC => "exec",
        _ => "child setup",
    }
}

/// Forks and execs a child process under a new PTY.
///
/// # Safety
///
/// The caller must ensure `argv` is non-empty and the returned master fd is
/// eventually closed. The child only performs async-signal-safe work between
/// `fork()` and `execvp()`, apart from `setenv`.
///
/// A close-on-exec pipe carries setup failures back to the parent: EOF means
/// the exec succeeded, a 5-byte record (stage, errno) means it did not.
pub(super) unsafe fn spawn_pty_child(
    argv: &[CString],
    working_dir: &CString,
    term_value: &CString,
) -> Result<(RawFd, i32)> {
    let mut master_fd: RawFd = -1;
    let mut slave_fd: RawFd = -1;

    // SAFETY: libc::winsize is a plain C struct; zeroed is a valid baseline.
    let mut winsize: libc::winsize = mem::zeroed();
    winsize.ws_row = 24;
    winsize.ws_col = 80;

    #[allow(clippy::unnecessary_mut_passed)]
    if libc::openpty(
        &mut master_fd,
        &mut slave_fd,
        ptr::null_mut(),
        ptr::null_mut(),
        &mut winsize,
    ) != 0
    {
        return Err(errno_error("openpty failed"));
    }
    // dup2 onto the child's stdio clears the flag for the copies it keeps.
    set_cloexec(master_fd);
    set_cloexec(slave_fd);

    let mut status_pipe = [-1; 2];
    if libc::pipe2(status_pipe.as_mut_ptr(), libc::O_CLOEXEC) != 0 {
        let err = errno_error("pipe2 failed");
        close_fd(master_fd);
        close_fd(slave_fd);
        return Err(err);
    }
    let [status_read, status_write] = status_pipe;

    // Built before fork so the child does not allocate.
    let term_key = CString::new("TERM").map_err(|err| anyhow!("TERM key: {err}"))?;
    let mut argv_ptrs: Vec<*const libc::c_char> = argv.iter().map(|s| s.as_ptr()).collect();
    argv_ptrs.push(ptr::null());

    let pid = libc::fork();
    if pid < 0 {
        let err = errno_error("fork failed");
        close_fd(master_fd);
        close_fd(slave_fd);
        close_fd(status_read);
        close_fd(status_write);
        return Err(err);
    }

    if pid == 0 {
        close_fd(master_fd);
        close_fd(status_read);
        child_exec(
            slave_fd,
            &argv_ptrs,
            working_dir,
            &term_key,
            term_value,
            status_write,
        );
    }

    close_fd(slave_fd);
    close_fd(status_write);
    let report = read_status_report(status_read);
    close_fd(status_read);

    if let Some((stage, errno)) = report {
        let mut status = 0;
        let _ = libc::waitpid(pid, &mut status, 0);
        close_fd(master_fd);
        let program = argv
            .first()
            .map(|arg| arg.to_string_lossy().to_string())
            .unwrap_or_default();
        return Err(anyhow!(
            "{} failed for '{}': {}",
            stage_name(stage),
            program,
            io::Error::from_raw_os_error(errno)
        ));
    }

    Ok((master_fd, pid))
}

unsafe fn read_status_report(fd: RawFd) -> Option<(u8, i32)> {
    let mut record = [0u8; 5];
    let mut filled = 0usize;
    while filled < record.len() {
        let n = libc::read(
            fd,
            record.as_mut_ptr().add(filled) as *mut libc::c_void,
            record.len() - filled,
        );
        if n > 0 {
            filled += n as usize;
            continue;
        }
        if n < 0 && io::Error::last_os_error().kind() == io::ErrorKind::Interrupted {
            continue;
        }
        break;
    }
    if filled < record.len() {
        return None;
    }
    let errno = i32::from_ne_bytes([record[1], record[2], record[3], record[4]]);
    Some((record[0], errno))
}

/// Child process setup after fork: attaches the PTY and execs the tool.
///
/// # Safety
///
/// Must only be called in the child process after `fork()`. Never returns:
/// either `execvp()` replaces the process image or `_exit(127)` runs.
unsafe fn child_exec(
    slave_fd: RawFd,
    argv_ptrs: &[*const libc::c_char],
    working_dir: &CString,
    term_key: &CString,
    term_value: &CString,
    status_fd: RawFd,
) -> ! {
    if libc::setsid() == -1 {
        child_fail(status_fd, STAGE_SETSID);
    }
    if libc::ioctl(slave_fd, libc::TIOCSCTTY as libc::c_ulong, 0) == -1 {
        child_fail(status_fd, STAGE_CTTY);
    }
    if libc::dup2(slave_fd, libc::STDIN_FILENO) < 0
        || libc::dup2(slave_fd, libc::STDOUT_FILENO) < 0
        || libc::dup2(slave_fd, libc::STDERR_FILENO) < 0
    {
        child_fail(status_fd, STAGE_DUP2);
    }
    if slave_fd > libc::STDERR_FILENO {
        close_fd(slave_fd);
    }

    if libc::chdir(working_dir.as_ptr()) != 0 {
        child_fail(status_fd, STAGE_CHDIR);
    }
    if libc::setenv(term_key.as_ptr(), term_value.as_ptr(), 1) != 0 {
        child_fail(status_fd, STAGE_SETENV);
    }
    // The Rust runtime ignores SIGPIPE; tools expect the default.
    libc::signal(libc::SIGPIPE, libc::SIG_DFL);

    libc::execvp(argv_ptrs[0], argv_ptrs.as_ptr());
    child_fail(status_fd, STAGE_EXEC);
}

/// Report a failed setup stage to the parent and exit the child.
///
/// # Safety
///
/// Must only be called in the child process after `fork()`.
unsafe fn child_fail(status_fd: RawFd, stage: u8) -> ! {
    let errno = io::Error::last_os_error().raw_os_error().unwrap_or(0);
    let errno_bytes = errno.to_ne_bytes();
    let record = [
        stage,
        errno_bytes[0],
        errno_bytes[1],
        errno_bytes[2],
        errno_bytes[3],
    ];
    // write and _exit are async-signal-safe.
    let _ = libc::write(
        status_fd,
        record.as_ptr() as *const libc::c_void,
        record.len(),
    );
    libc::_exit(127);
}

/// Configure the PTY master for non-blocking reads.
///
/// # Safety
///
/// `fd` must be a valid, open file descriptor.
pub(super) unsafe fn set_nonblocking(fd: RawFd) -> Result<()> {
    let flags = libc::fcntl(fd, libc::F_GETFL, 0);
    if flags < 0 {
        return Err(errno_error("fcntl(F_GETFL) failed"));
    }
    if libc::fcntl(fd, libc::F_SETFL, flags | libc::O_NONBLOCK) < 0 {
        return Err(errno_error("fcntl(F_SETFL) failed"));
    }
    Ok(())
}

/// Keep PTY descriptors out of tools spawned later by other sessions.
unsafe fn set_cloexec(fd: RawFd) {
    let flags = libc::fcntl(fd, libc::F_GETFD, 0);
    if flags >= 0 {
        let _ = libc::fcntl(fd, libc::F_SETFD, flags | libc::FD_CLOEXEC);
    }
}

/// Helper that formats OS errors with additional context.
pub(super) fn errno_error(context: &str) -> anyhow::Error {
    anyhow!("{context}: {}", io::Error::last_os_error())
}

/// Close a file descriptor while ignoring errors.
///
/// # Safety
///
/// `fd` must be a valid, open file descriptor (or negative to ignore).
pub(super) unsafe fn close_fd(fd: RawFd) {
    if fd >= 0 {
        let _ = libc::close(fd);
    }
}
