use crate::error::SessionError;
use crate::lock::lock_or_recover;
use crate::session::SessionRegistry;
use crate::{log_debug, log_debug_content};
use anyhow::Result;
use crossbeam_channel::{unbounded, Receiver, Sender};
use std::io::{self, BufRead, BufReader, Write};
use std::sync::{Arc, Mutex};
use std::thread;

use super::protocol::{IpcCommand, IpcEvent, IpcRequest};
use super::router::{capabilities_event, error_event, handle_request};

/// Shared, line-serialized sink for reply events.
pub(super) type EventOut = Arc<Mutex<Box<dyn Write + Send>>>;

// ============================================================================
// Event Sending
// ============================================================================

pub(super) fn send_event(out: &EventOut, event: &IpcEvent) {
    match serde_json::to_string(event) {
        Ok(json) => {
            let mut writer = lock_or_recover(out, "ipc output");
            if writeln!(writer, "{json}").and_then(|()| writer.flush()).is_err() {
                log_debug("IPC output closed; dropping event");
            }
        }
        Err(err) => log_debug(&format!("failed to encode IPC event: {err}")),
    }
}

// ============================================================================
// Input Reader Thread
// ============================================================================

/// A parsed request, or the reply for a line that could not be parsed.
pub(super) enum Incoming {
    Request(IpcRequest),
    Malformed(IpcEvent),
}

pub(super) fn parse_line(line: &str) -> Option<Incoming> {
    let trimmed = line.trim();
    if trimmed.is_empty() {
        return None;
    }
    Some(match serde_json::from_str::<IpcRequest>(trimmed) {
        Ok(request) => Incoming::Request(request),
        Err(err) => {
            // Echo the id back when the line is valid JSON with a bad command.
            let id = serde_json::from_str::<serde_json::Value>(trimmed)
                .ok()
                .and_then(|value| value.get("id").cloned());
            Incoming::Malformed(error_event(
                id,
                &SessionError::InvalidRequest(format!("Invalid command: {err}")),
            ))
        }
    })
}

fn spawn_input_reader(
    input: Box<dyn BufRead + Send>,
    tx: Sender<Incoming>,
) -> thread::JoinHandle<()> {
    thread::spawn(move || {
        for line in input.lines() {
            let line = match line {
                Ok(l) => l,
                Err(_) => break,
            };
            if let Some(incoming) = parse_line(&line) {
                if tx.send(incoming).is_err() {
                    break; // Dispatcher has exited
                }
            }
        }
        log_debug("IPC input reader exiting");
    })
}

// ============================================================================
// Dispatch Loop
// ============================================================================

/// Serve JSON-lines requests from stdin until it closes.
pub fn run_ipc_mode(registry: Arc<SessionRegistry>) -> Result<()> {
    log_debug("Starting JSON IPC mode");
    let out: EventOut = Arc::new(Mutex::new(Box::new(io::stdout())));
    run_ipc_loop(registry, Box::new(BufReader::new(io::stdin())), out);
    Ok(())
}

/// Read requests from `input` and answer each on its own worker thread so a
/// `stop_session` can interrupt a long-running submission. Returns after the
/// input closes and every in-flight request has replied.
pub(super) fn run_ipc_loop(
    registry: Arc<SessionRegistry>,
    input: Box<dyn BufRead + Send>,
    out: EventOut,
) {
    send_event(&out, &capabilities_event(&registry, None));

    let (tx, rx): (Sender<Incoming>, Receiver<Incoming>) = unbounded();
    let reader = spawn_input_reader(input, tx);
    let mut workers: Vec<thread::JoinHandle<()>> = Vec::new();

    for incoming in rx.iter() {
        workers.retain(|worker| !worker.is_finished());
        match incoming {
            Incoming::Malformed(event) => send_event(&out, &event),
            Incoming::Request(IpcRequest {
                id,
                command: IpcCommand::GetCapabilities,
            }) => send_event(&out, &capabilities_event(&registry, id)),
            Incoming::Request(request) => {
                log_debug_content(&format!("IPC request: {request:?}"));
                let registry = Arc::clone(&registry);
                let out = Arc::clone(&out);
                workers.push(thread::spawn(move || {
                    let event = handle_request(&registry, request);
                    send_event(&out, &event);
                }));
            }
        }
    }

    log_debug("IPC input closed; waiting for in-flight requests");
    for worker in workers {
        if worker.join().is_err() {
            log_debug("IPC worker panicked");
        }
    }
    let _ = reader.join();
}
