use super::*;
use crate::telemetry::NullSink;
use std::fs;
use std::os::unix::fs::PermissionsExt;
use std::path::Path;
use std::thread;
use tempfile::TempDir;

const STUB_INTERPRETER: &str = r#"#!/bin/sh
printf '>>> '
while IFS= read -r line; do
  case "$line" in
    'print(2+2)') echo 4 ;;
    hang) sleep 30 ;;
    slow) sleep 2; echo done ;;
    crash) exit 3 ;;
    orphan) ( trap '' HUP; sleep 3 ) & exit 4 ;;
    source\ *)
      path=${line#source }
      while IFS= read -r stmt; do
        case "$stmt" in
          'x = 1') x=1 ;;
          'print(x+1)') echo $((x+1)) ;;
          hang) sleep 30 ;;
          crash) exit 3 ;;
          *) echo "$stmt" ;;
        esac
      done < "$path"
      ;;
    *) echo "$line" ;;
  esac
  printf '>>> '
done
"#;

struct Stub {
    dir: TempDir,
    tool: ToolConfig,
}

fn write_stub_script(dir: &Path, contents: &str) -> std::path::PathBuf {
    let path = dir.join("stub_interpreter.sh");
    fs::write(&path, contents).expect("write stub");
    let mut perms = fs::metadata(&path).expect("stat stub").permissions();
    perms.set_mode(0o755);
    fs::set_permissions(&path, perms).expect("chmod stub");
    path
}

fn stub_tool() -> Stub {
    let dir = tempfile::tempdir().expect("tempdir");
    let script = write_stub_script(dir.path(), STUB_INTERPRETER);
    let mut tool = ToolConfig::new("stub", format!("/bin/sh {}", script.display()), ">>> ");
    tool.working_directory = dir.path().to_path_buf();
    tool.timeout = 5;
    tool.startup_timeout = 5;
    tool.terminate_grace_ms = 1_000;
    Stub { dir, tool }
}

fn started(stub: &Stub) -> Session {
    let session = Session::new(stub.tool.clone(), Arc::new(NullSink)).expect("session");
    session.start().expect("start");
    session
}

fn wait_for_state(session: &Session, wanted: SessionState, timeout: Duration) -> bool {
    let start = Instant::now();
    while start.elapsed() < timeout {
        if session.get_status().state == wanted {
            return true;
        }
        thread::sleep(Duration::from_millis(20));
    }
    false
}

fn staged_scripts(dir: &Path) -> Vec<String> {
    fs::read_dir(dir)
        .expect("read dir")
        .filter_map(|entry| entry.ok())
        .map(|entry| entry.file_name().to_string_lossy().to_string())
        .filter(|name| name.starts_with("toolsession_script_"))
        .collect()
}

#[derive(Default)]
struct RecordingSink {
    events: Mutex<Vec<CommandEvent>>,
}

impl EventSink for RecordingSink {
    fn record(&self, event: &CommandEvent) {
        self.events.lock().unwrap().push(event.clone());
    }
}

#[test]
fn command_returns_output_and_session_stays_ready() {
    let stub = stub_tool();
    let session = started(&stub);
    assert_eq!(session.state(), SessionState::Ready);

    let outcome = session.submit_command("print(2+2)", None).unwrap();
    assert!(outcome.output.contains('4'), "{outcome:?}");
    assert!(!outcome.output.contains("print(2+2)"));
    assert!(!outcome.output.contains(">>>"));
    assert_eq!(session.state(), SessionState::Ready);
    assert!(session.get_status().pid.is_some());
}

#[test]
fn output_only_contains_bytes_after_submission() {
    let stub = stub_tool();
    let session = started(&stub);
    let first = session.submit_command("first", None).unwrap();
    let second = session.submit_command("second", None).unwrap();
    assert_eq!(first.output, "first\n");
    assert_eq!(second.output, "second\n");
    assert!(second.start_offset >= first.end_offset);
}

#[test]
fn marker_inside_output_is_not_a_prompt() {
    let stub = stub_tool();
    let session = started(&stub);
    let outcome = session.submit_command("say >>> inline", None).unwrap();
    assert_eq!(outcome.output, "say >>> inline\n");
}

#[test]
fn echo_is_kept_when_stripping_is_disabled() {
    let mut stub = stub_tool();
    stub.tool.strip_echo = false;
    let session = started(&stub);
    let outcome = session.submit_command("print(2+2)", None).unwrap();
    assert_eq!(outcome.output, "print(2+2)\n4\n");
}

#[test]
fn silent_command_times_out() {
    let stub = stub_tool();
    let session = started(&stub);
    let start = Instant::now();
    let err = session
        .submit_command("hang", Some(Duration::from_secs(1)))
        .unwrap_err();
    assert_eq!(err, SessionError::PromptTimeout(Duration::from_secs(1)));
    assert!(start.elapsed() < Duration::from_secs(3));
    assert_eq!(session.state(), SessionState::TimedOut);

    let err = session.submit_command("print(2+2)", None).unwrap_err();
    assert_eq!(err.kind(), "session_not_ready");
}

#[test]
fn late_prompt_heals_timed_out_session() {
    let stub = stub_tool();
    let session = started(&stub);
    let err = session
        .submit_command("slow", Some(Duration::from_secs(1)))
        .unwrap_err();
    assert_eq!(err.kind(), "prompt_timeout");

    let start = Instant::now();
    let mut collected = String::new();
    let mut healed = false;
    while start.elapsed() < Duration::from_secs(5) {
        let snapshot = session.get_output(None);
        collected.push_str(&snapshot.output);
        if snapshot.state == SessionState::Ready {
            healed = true;
            break;
        }
        thread::sleep(Duration::from_millis(50));
    }
    assert!(healed, "session never healed; output: {collected}");
    collected.push_str(&session.get_output(None).output);
    assert!(collected.contains("done"), "{collected}");

    let outcome = session.submit_command("print(2+2)", None).unwrap();
    assert_eq!(outcome.output, "4\n");
}

#[test]
fn second_submission_while_busy_is_rejected() {
    let stub = stub_tool();
    let session = Arc::new(started(&stub));
    let worker = {
        let session = Arc::clone(&session);
        thread::spawn(move || session.submit_command("slow", None))
    };
    assert!(wait_for_state(&session, SessionState::Busy, Duration::from_secs(2)));

    let err = session.submit_command("print(2+2)", None).unwrap_err();
    assert_eq!(err, SessionError::SessionBusy);

    let outcome = worker.join().unwrap().unwrap();
    assert_eq!(outcome.output, "done\n");
    assert_eq!(session.state(), SessionState::Ready);

    let status = session.get_status();
    assert_eq!(status.stats.total_commands, 1);
    assert_eq!(status.stats.total_errors, 0);
    assert_eq!(session.get_history(10).inputs.len(), 1);
}

#[test]
fn stop_interrupts_in_flight_submission() {
    let stub = stub_tool();
    let session = Arc::new(started(&stub));
    let worker = {
        let session = Arc::clone(&session);
        thread::spawn(move || session.submit_command("hang", Some(Duration::from_secs(20))))
    };
    assert!(wait_for_state(&session, SessionState::Busy, Duration::from_secs(2)));

    let start = Instant::now();
    let exit_code = session.stop();
    assert_eq!(exit_code, None);
    let err = worker.join().unwrap().unwrap_err();
    assert_eq!(err, SessionError::SessionStopped);
    assert!(start.elapsed() < Duration::from_secs(5));

    let status = session.get_status();
    assert_eq!(status.state, SessionState::Stopped);
    assert_eq!(status.exit_signal, Some(libc::SIGTERM));
    assert_eq!(session.stop(), None);
}

#[test]
fn process_exit_during_command_crashes_session() {
    let stub = stub_tool();
    let session = started(&stub);
    let err = session.submit_command("crash", None).unwrap_err();
    assert_eq!(err.kind(), "crashed");
    assert!(!err.is_recoverable());

    let status = session.get_status();
    assert_eq!(status.state, SessionState::Crashed);
    assert_eq!(status.exit_code, Some(3));

    let err = session.submit_command("print(2+2)", None).unwrap_err();
    assert_eq!(err.kind(), "crashed");
}

#[test]
fn exit_is_noticed_while_a_survivor_holds_the_terminal() {
    let stub = stub_tool();
    let session = started(&stub);
    let start = Instant::now();
    let err = session
        .submit_command("orphan", Some(Duration::from_secs(2)))
        .unwrap_err();
    assert_eq!(err.kind(), "crashed", "{err}");
    assert!(start.elapsed() < Duration::from_secs(2));
    assert_eq!(session.get_status().exit_code, Some(4));
}

#[test]
fn external_kill_is_reported_as_crash() {
    let stub = stub_tool();
    let session = started(&stub);
    let pid = session.get_status().pid.expect("pid");
    unsafe {
        libc::kill(-pid, libc::SIGKILL);
    }
    thread::sleep(Duration::from_millis(300));
    let status = session.get_status();
    assert_eq!(status.state, SessionState::Crashed);
    assert_eq!(status.exit_signal, Some(libc::SIGKILL));
}

#[test]
fn script_runs_and_staged_file_is_removed() {
    let stub = stub_tool();
    let session = started(&stub);
    let outcome = session
        .submit_script("x = 1\nprint(x+1)", "source {script}", None)
        .unwrap();
    assert!(outcome.output.contains('2'), "{outcome:?}");
    assert!(staged_scripts(stub.dir.path()).is_empty());
    assert_eq!(session.get_status().stats.total_scripts, 1);
}

#[test]
fn staged_file_is_removed_after_timeout() {
    let stub = stub_tool();
    let session = started(&stub);
    let err = session
        .submit_script("hang", "source {script}", Some(Duration::from_secs(1)))
        .unwrap_err();
    assert_eq!(err.kind(), "prompt_timeout");
    assert!(staged_scripts(stub.dir.path()).is_empty());
}

#[test]
fn staged_file_is_removed_after_crash() {
    let stub = stub_tool();
    let session = started(&stub);
    let err = session
        .submit_script("crash", "source {script}", None)
        .unwrap_err();
    assert_eq!(err.kind(), "crashed");
    assert!(staged_scripts(stub.dir.path()).is_empty());
}

#[test]
fn script_template_must_reference_script() {
    let stub = stub_tool();
    let session = started(&stub);
    let err = session
        .submit_script("x = 1", "source script.tcl", None)
        .unwrap_err();
    assert_eq!(err.kind(), "invalid_request");
    assert_eq!(session.state(), SessionState::Ready);
}

#[test]
fn startup_fails_when_no_prompt_appears() {
    let mut stub = stub_tool();
    stub.tool.launch_command = "/bin/sh -c 'sleep 30'".to_string();
    stub.tool.startup_timeout = 1;
    let session = Session::new(stub.tool.clone(), Arc::new(NullSink)).unwrap();
    let err = session.start().unwrap_err();
    assert_eq!(err.kind(), "launch_error");
    assert!(err.to_string().contains("no prompt"), "{err}");
    assert_eq!(session.state(), SessionState::Crashed);
}

#[test]
fn startup_fails_when_process_exits() {
    let mut stub = stub_tool();
    stub.tool.launch_command = "/bin/sh -c 'echo bye; exit 1'".to_string();
    let session = Session::new(stub.tool.clone(), Arc::new(NullSink)).unwrap();
    let err = session.start().unwrap_err();
    assert_eq!(err.kind(), "launch_error");
    assert_eq!(session.get_status().state, SessionState::Crashed);
    let errors = session.get_history(5).errors;
    assert_eq!(errors.len(), 1);
    assert_eq!(errors[0].kind, "launch_error");
}

#[test]
fn startup_fails_for_missing_working_directory() {
    let mut stub = stub_tool();
    stub.tool.working_directory = stub.dir.path().join("missing");
    let session = Session::new(stub.tool.clone(), Arc::new(NullSink)).unwrap();
    let err = session.start().unwrap_err();
    assert_eq!(err.kind(), "launch_error");
    assert!(session.start().is_err());
}

#[test]
fn environment_command_runs_before_tool() {
    let mut stub = stub_tool();
    stub.tool.environment_command = Some("GREETING=hello; export GREETING".to_string());
    stub.tool.launch_command = "/bin/sh -c 'echo $GREETING; printf \">>> \"; read -r line'"
        .to_string();
    let session = Session::new(stub.tool.clone(), Arc::new(NullSink)).unwrap();
    let banner = session.start().unwrap();
    assert!(banner.contains("hello"), "{banner}");
}

#[test]
fn get_output_returns_only_undelivered_text() {
    let stub = stub_tool();
    let session = started(&stub);
    session.submit_command("print(2+2)", None).unwrap();
    assert_eq!(session.get_output(None).output, "");

    let _ = session.submit_command("hang", Some(Duration::from_secs(1)));
    let snapshot = session.get_output(Some(1));
    assert_eq!(snapshot.state, SessionState::TimedOut);
    assert_eq!(snapshot.output, "hang\n");
    assert_eq!(session.get_output(None).output, "");
}

#[test]
fn late_output_is_kept_for_get_output_after_next_command() {
    let stub = stub_tool();
    let session = started(&stub);
    let err = session
        .submit_command("slow", Some(Duration::from_secs(1)))
        .unwrap_err();
    assert_eq!(err.kind(), "prompt_timeout");
    assert!(wait_for_state(&session, SessionState::Ready, Duration::from_secs(5)));

    let outcome = session.submit_command("next", None).unwrap();
    assert_eq!(outcome.output, "next\n");

    let pending = session.get_output(None).output;
    assert!(pending.contains("done"), "{pending}");
    assert!(!pending.contains("next"), "{pending}");
    assert_eq!(session.get_output(None).output, "");
}

#[test]
fn out_of_range_timeout_is_rejected_before_sending() {
    let stub = stub_tool();
    let session = started(&stub);
    let err = session
        .submit_command("print(2+2)", Some(Duration::from_secs(u64::MAX)))
        .unwrap_err();
    assert_eq!(err.kind(), "invalid_request");
    assert_eq!(session.state(), SessionState::Ready);

    let err = session
        .submit_script("x = 1", "source {script}", Some(Duration::ZERO))
        .unwrap_err();
    assert_eq!(err.kind(), "invalid_request");
    assert!(staged_scripts(stub.dir.path()).is_empty());

    let outcome = session.submit_command("print(2+2)", None).unwrap();
    assert_eq!(outcome.output, "4\n");
    let stats = session.get_status().stats;
    assert_eq!((stats.total_commands, stats.total_scripts), (1, 0));
}

#[test]
fn history_records_inputs_outputs_scripts_and_errors() {
    let stub = stub_tool();
    let session = started(&stub);
    session.submit_command("print(2+2)", None).unwrap();
    session
        .submit_script("x = 1\nprint(x+1)", "source {script}", None)
        .unwrap();
    let _ = session.submit_command("hang", Some(Duration::from_secs(1)));

    let history = session.get_history(10);
    assert_eq!(history.inputs.len(), 3);
    assert_eq!(history.inputs[0].command, "print(2+2)");
    assert_eq!(history.inputs[1].kind, SubmissionKind::Script);

    let script_file = history.inputs[1].script_file.clone().expect("script file");
    let script = &history.scripts[0];
    assert_eq!(script.input_id, history.inputs[1].id);
    assert_eq!(script.script_file, script_file);
    assert_eq!(script.script_content, "x = 1\nprint(x+1)");
    assert_eq!(script.command_template, "source {script}");
    assert_eq!(script.execution_command, format!("source {script_file}"));

    assert_eq!(history.outputs.len(), 2);
    assert_eq!(history.outputs[0].text, "4\n");
    assert_eq!(history.outputs[0].lines_count, 1);
    assert_eq!(history.outputs[0].input_id, Some(history.inputs[0].id));

    assert_eq!(history.errors.len(), 1);
    assert_eq!(history.errors[0].kind, "prompt_timeout");
    assert_eq!(history.errors[0].input_id, Some(history.inputs[2].id));
    assert_eq!(session.get_status().recent_errors, history.errors);
    assert_eq!(session.get_history(1).inputs[0].command, "hang");
}

#[test]
fn clear_output_drops_buffered_bytes() {
    let stub = stub_tool();
    let session = started(&stub);
    let _ = session.submit_command("hang", Some(Duration::from_secs(1)));
    session.clear_output();
    assert_eq!(session.get_output(None).output, "");
}

#[test]
fn submissions_are_reported_to_the_sink() {
    let stub = stub_tool();
    let sink = Arc::new(RecordingSink::default());
    let session = Session::new(stub.tool.clone(), sink.clone()).unwrap();
    session.start().unwrap();
    session.submit_command("print(2+2)", None).unwrap();
    let _ = session.submit_command("hang", Some(Duration::from_secs(1)));

    let events = sink.events.lock().unwrap();
    assert_eq!(events.len(), 2);
    assert_eq!(events[0].tool, "stub");
    assert_eq!(events[0].outcome(), "ok");
    assert_eq!(events[1].failure, Some("prompt_timeout"));

    let stats = session.get_status().stats;
    assert_eq!(stats.total_commands, 2);
    assert_eq!(stats.total_errors, 1);
    assert!(stats.last_error.unwrap().starts_with("prompt_timeout"));
}

#[test]
fn transcript_receives_raw_output() {
    let mut stub = stub_tool();
    let transcript = stub.dir.path().join("stub_output.log");
    stub.tool.transcript_path = Some(transcript.clone());
    let session = started(&stub);
    session.submit_command("print(2+2)", None).unwrap();
    session.stop();
    let text = fs::read_to_string(&transcript).unwrap();
    assert!(text.contains(">>> "));
    assert!(text.contains('4'));
}

#[test]
fn regex_prompt_detects_numbered_prompts() {
    let dir = tempfile::tempdir().unwrap();
    let script = write_stub_script(
        dir.path(),
        "#!/bin/sh\nn=1\nprintf 'In [%d]: ' $n\nwhile IFS= read -r line; do\n  echo \"Out[$n]: $line\"\n  n=$((n+1))\n  printf 'In [%d]: ' $n\ndone\n",
    );
    let mut tool = ToolConfig::new("ipy", format!("/bin/sh {}", script.display()), "In");
    tool.prompt_regex = Some(r"In \[\d+\]: ".to_string());
    tool.working_directory = dir.path().to_path_buf();
    tool.timeout = 5;
    tool.startup_timeout = 5;
    let session = Session::new(tool, Arc::new(NullSink)).unwrap();
    session.start().unwrap();
    let outcome = session.submit_command("1+1", None).unwrap();
    assert_eq!(outcome.output, "Out[1]: 1+1\n");
}
