use crate::log_debug;
use anyhow::{anyhow, Result};
use std::io::{self, ErrorKind};
use std::os::unix::io::RawFd;
use std::thread;
use std::time::Duration;

use super::osc::respond_to_terminal_queries;
use super::pty::close_fd;

pub(crate) const READ_CHUNK_BYTES: usize = 4096;

pub(super) fn should_retry_read_error(err: &io::Error) -> bool {
    err.kind() == ErrorKind::Interrupted || err.kind() == ErrorKind::WouldBlock
}

/// Result of one bounded read attempt on the PTY master.
#[derive(Debug)]
pub enum ReadEvent {
    /// Output bytes, with terminal queries already answered and removed.
    Data(Vec<u8>),
    /// Nothing arrived within the poll window.
    Idle,
    /// The slave side is gone: the child and everything holding the terminal exited.
    Closed,
    /// Unrecoverable read error.
    Failed(io::Error),
}

/// Read half of a PTY, backed by its own duplicate of the master fd so it can
/// live on a monitor thread while the driver keeps writing.
pub struct PtyReader {
    fd: RawFd,
    buffer: Box<[u8; READ_CHUNK_BYTES]>,
}

impl PtyReader {
    pub(super) fn new(fd: RawFd) -> Self {
        Self {
            fd,
            buffer: Box::new([0u8; READ_CHUNK_BYTES]),
        }
    }

    /// Wait up to `poll_timeout` for output and read at most one chunk.
    pub fn read_chunk(&mut self, poll_timeout: Duration) -> ReadEvent {
        let mut pfd = libc::pollfd {
            fd: self.fd,
            events: libc::POLLIN,
            revents: 0,
        };
        let timeout_ms = poll_timeout.as_millis().min(i32::MAX as u128) as libc::c_int;
        // SAFETY: pfd is a valid pollfd for the duration of the call.
        let ready = unsafe { libc::poll(&mut pfd, 1, timeout_ms) };
        if ready < 0 {
            let err = io::Error::last_os_error();
            if err.kind() == ErrorKind::Interrupted {
                return ReadEvent::Idle;
            }
            return ReadEvent::Failed(err);
        }
        if ready == 0 {
            return ReadEvent::Idle;
        }
        if pfd.revents & libc::POLLNVAL != 0 {
            return ReadEvent::Failed(io::Error::from_raw_os_error(libc::EBADF));
        }

        // SAFETY: buffer is owned and sized; read writes at most its length.
        let n = unsafe {
            libc::read(
                self.fd,
                self.buffer.as_mut_ptr() as *mut libc::c_void,
                self.buffer.len(),
            )
        };
        if n > 0 {
            let mut data = self.buffer.get(..n as usize).unwrap_or(&[]).to_vec();
            respond_to_terminal_queries(&mut data, self.fd);
            if data.is_empty() {
                return ReadEvent::Idle;
            }
            return ReadEvent::Data(data);
        }
        if n == 0 {
            return ReadEvent::Closed;
        }
        let err = io::Error::last_os_error();
        if should_retry_read_error(&err) {
            return ReadEvent::Idle;
        }
        // Linux reports a hung-up PTY master as EIO.
        if err.raw_os_error() == Some(libc::EIO) {
            return ReadEvent::Closed;
        }
        log_debug(&format!("PTY read error: {err}"));
        ReadEvent::Failed(err)
    }
}

impl Drop for PtyReader {
    fn drop(&mut self) {
        // SAFETY: fd was duplicated for this reader and is closed exactly once.
        unsafe { close_fd(self.fd) };
    }
}

/// Write the entire buffer to the PTY master, retrying short writes.
pub(super) fn write_all(fd: RawFd, mut data: &[u8]) -> Result<()> {
    let mut stalled = 0u32;
    while !data.is_empty() {
        // SAFETY: data points to initialized bytes of the given length.
        let written = unsafe { libc::write(fd, data.as_ptr() as *const libc::c_void, data.len()) };
        if written < 0 {
            let err = io::Error::last_os_error();
            if err.kind() == ErrorKind::Interrupted {
                continue;
            }
            if err.kind() == ErrorKind::WouldBlock {
                // The child is not draining its input; give up after ~5s.
                stalled += 1;
                if stalled > 5_000 {
                    return Err(anyhow!("write to PTY stalled: child is not reading input"));
                }
                thread::sleep(Duration::from_millis(1));
                continue;
            }
            return Err(anyhow!("write to PTY failed: {err}"));
        }
        if written == 0 {
            return Err(anyhow!("write to PTY returned 0"));
        }
        stalled = 0;
        let written = written as usize;
        data = data.get(written..).unwrap_or(&[]);
    }
    Ok(())
}
