use crate::lock::lock_or_recover;
use crate::log_debug;
use crate::pty_session::{describe_exit, ProcessDriver, ProcessExit, PtyReader, ReadEvent};
use std::fs::File;
use std::io::{self, Write};
use std::sync::atomic::Ordering;
use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant, SystemTime};

use super::{DriverSlot, Shared};

/// Upper bound on one blocking read, so the stop flag is seen promptly.
const READ_POLL: Duration = Duration::from_millis(100);
/// How long to wait for the child to become reapable after the PTY closes.
const EXIT_REAP_WINDOW: Duration = Duration::from_millis(250);

/// Background reader that drains the PTY into the session buffer whether
/// or not anyone is waiting for output.
pub(super) struct OutputMonitor {
    shared: Arc<Shared>,
    driver: DriverSlot,
    reader: PtyReader,
    transcript: Option<File>,
}

impl OutputMonitor {
    pub(super) fn new(
        shared: Arc<Shared>,
        driver: DriverSlot,
        reader: PtyReader,
        transcript: Option<File>,
    ) -> Self {
        Self {
            shared,
            driver,
            reader,
            transcript,
        }
    }

    pub(super) fn spawn(self) -> io::Result<thread::JoinHandle<()>> {
        thread::Builder::new()
            .name(format!("toolsession-monitor-{}", self.shared.tool))
            .spawn(move || self.run())
    }

    fn run(mut self) {
        loop {
            if self.shared.stop.load(Ordering::SeqCst) {
                break;
            }
            match self.reader.read_chunk(READ_POLL) {
                ReadEvent::Data(chunk) => self.on_chunk(&chunk),
                ReadEvent::Idle => {}
                ReadEvent::Closed => {
                    self.on_closed("output stream closed");
                    break;
                }
                ReadEvent::Failed(err) => {
                    self.on_closed(&format!("read error: {err}"));
                    break;
                }
            }
        }
        log_debug(&format!("[{}] output monitor exiting", self.shared.tool));
    }

    fn on_chunk(&mut self, chunk: &[u8]) {
        if let Some(file) = self.transcript.as_mut() {
            if let Err(err) = file.write_all(chunk) {
                log_debug(&format!(
                    "[{}] transcript write failed, disabling: {err}",
                    self.shared.tool
                ));
                self.transcript = None;
            }
        }

        {
            let mut inner = self.shared.lock();
            inner.buffer.append(chunk);
            inner.last_activity = Some(SystemTime::now());
            inner.heal_if_prompted(&self.shared.tool, &self.shared.matcher);
        }
        self.shared.changed.notify_all();
    }

    fn on_closed(&mut self, reason: &str) {
        let exit = lock_or_recover(&self.driver, "session driver")
            .as_mut()
            .and_then(reap_briefly);
        {
            let mut inner = self.shared.lock();
            if inner.exit.is_none() {
                inner.exit = exit;
            }
            let detail = match exit {
                Some(exit) => format!("{reason}; {}", describe_exit(exit)),
                None => reason.to_string(),
            };
            inner.mark_crashed(&self.shared.tool, &detail);
        }
        self.shared.changed.notify_all();
    }
}

fn reap_briefly(driver: &mut ProcessDriver) -> Option<ProcessExit> {
    let start = Instant::now();
    loop {
        if let Some(exit) = driver.try_wait() {
            return Some(exit);
        }
        if start.elapsed() >= EXIT_REAP_WINDOW {
            return None;
        }
        thread::sleep(Duration::from_millis(10));
    }
}
