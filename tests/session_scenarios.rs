use std::fs;
use std::path::Path;
use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};
use tempfile::TempDir;
use toolsession::telemetry::NullSink;
use toolsession::{
    LifecyclePolicy, SessionError, SessionRegistry, SessionState, ToolConfig, ToolTable,
};

const STUB_REPL: &str = r#"printf '>>> '
while IFS= read -r line; do
  case "$line" in
    'print(2+2)') echo 4 ;;
    hang) sleep 30 ;;
    source\ *)
      path=${line#source }
      while IFS= read -r stmt; do
        case "$stmt" in
          'x = 1') x=1 ;;
          'print(x+1)') echo $((x+1)) ;;
          *) echo "$stmt" ;;
        esac
      done < "$path"
      ;;
    *) echo "$line" ;;
  esac
  printf '>>> '
done
"#;

fn registry(lifecycle: LifecyclePolicy) -> (TempDir, SessionRegistry) {
    let dir = tempfile::tempdir().expect("tempdir");
    let script = dir.path().join("repl.sh");
    fs::write(&script, STUB_REPL).expect("write stub");
    let mut tool = ToolConfig::new("python", format!("/bin/sh {}", script.display()), ">>> ");
    tool.working_directory = dir.path().to_path_buf();
    tool.timeout = 5;
    tool.startup_timeout = 5;
    tool.terminate_grace_ms = 500;
    let mut tools = ToolTable::new();
    tools.insert("python", tool).expect("insert tool");
    let registry = SessionRegistry::new(
        tools,
        Some("python".to_string()),
        lifecycle,
        Arc::new(NullSink),
    );
    (dir, registry)
}

fn staged_scripts(dir: &Path) -> usize {
    fs::read_dir(dir)
        .expect("read dir")
        .filter_map(|entry| entry.ok())
        .filter(|entry| {
            entry
                .file_name()
                .to_string_lossy()
                .starts_with("toolsession_script_")
        })
        .count()
}

#[test]
fn command_returns_output_and_session_is_ready() {
    let (_dir, registry) = registry(LifecyclePolicy::Persistent);
    registry.start_session(None).expect("start");

    let outcome = registry
        .submit_command(None, "print(2+2)", None)
        .expect("submit");
    assert!(outcome.output.contains('4'));
    assert_eq!(
        registry.get_status(None).expect("status").state,
        SessionState::Ready
    );
    registry.shutdown();
}

#[test]
fn silent_command_times_out_promptly() {
    let (_dir, registry) = registry(LifecyclePolicy::Persistent);
    registry.start_session(Some("python")).expect("start");

    let started = Instant::now();
    let err = registry
        .submit_command(None, "hang", Some(Duration::from_secs(1)))
        .expect_err("should time out");
    assert!(matches!(err, SessionError::PromptTimeout(_)));
    assert!(started.elapsed() < Duration::from_secs(3));
    assert_eq!(
        registry.get_status(None).expect("status").state,
        SessionState::TimedOut
    );
    registry.shutdown();
}

#[test]
fn script_output_is_returned_and_staged_file_removed() {
    let (dir, registry) = registry(LifecyclePolicy::Persistent);
    registry.start_session(None).expect("start");

    let outcome = registry
        .submit_script(None, "x = 1\nprint(x+1)", "source {script}", None)
        .expect("script");
    assert!(outcome.output.contains('2'));
    assert_eq!(staged_scripts(dir.path()), 0);
    registry.shutdown();
}

#[test]
fn externally_killed_process_reports_crashed() {
    let (_dir, registry) = registry(LifecyclePolicy::Persistent);
    let report = registry.start_session(None).expect("start");
    let pid = report.status.pid.expect("pid");

    unsafe {
        libc::kill(pid as libc::pid_t, libc::SIGKILL);
    }

    let deadline = Instant::now() + Duration::from_secs(3);
    let mut state = SessionState::Ready;
    while Instant::now() < deadline {
        state = registry.get_status(None).expect("status").state;
        if state == SessionState::Crashed {
            break;
        }
        thread::sleep(Duration::from_millis(20));
    }
    assert_eq!(state, SessionState::Crashed);

    let err = registry
        .submit_command(None, "print(2+2)", None)
        .expect_err("crashed session");
    assert!(matches!(err, SessionError::Crashed(_)));
}

#[test]
fn restart_recovers_a_crashed_session() {
    let (_dir, registry) = registry(LifecyclePolicy::Persistent);
    let first = registry.start_session(None).expect("start");
    unsafe {
        libc::kill(first.status.pid.expect("pid") as libc::pid_t, libc::SIGKILL);
    }
    let report = registry.restart_session(None).expect("restart");
    assert_eq!(report.status.state, SessionState::Ready);
    assert_ne!(report.status.pid, first.status.pid);
    assert!(registry
        .submit_command(None, "print(2+2)", None)
        .expect("submit")
        .output
        .contains('4'));
    registry.shutdown();
}

#[test]
fn second_start_reuses_live_session() {
    let (_dir, registry) = registry(LifecyclePolicy::Persistent);
    let first = registry.start_session(None).expect("start");
    let second = registry.start_session(None).expect("start again");
    assert_eq!(first.status.pid, second.status.pid);
    assert!(second.initial_output.is_empty());
    registry.shutdown();
}

#[test]
fn unknown_tool_is_rejected() {
    let (_dir, registry) = registry(LifecyclePolicy::Persistent);
    let err = registry.start_session(Some("ruby")).expect_err("unknown");
    assert_eq!(err, SessionError::UnknownTool("ruby".to_string()));
}

#[test]
fn per_call_sessions_are_stopped_after_each_submission() {
    let (_dir, registry) = registry(LifecyclePolicy::PerCall);
    let first = registry
        .submit_command(None, "print(2+2)", None)
        .expect("first");
    assert!(first.output.contains('4'));
    let status = registry.get_status(None).expect("status");
    assert_eq!(status.state, SessionState::Stopped);

    let second = registry
        .submit_command(None, "print(2+2)", None)
        .expect("second");
    assert!(second.output.contains('4'));
}

#[test]
fn list_sessions_covers_every_configured_tool() {
    let (_dir, registry) = registry(LifecyclePolicy::Persistent);
    let listed = registry.list_sessions();
    assert_eq!(listed.len(), 1);
    assert_eq!(listed[0].tool, "python");
    assert_eq!(listed[0].state, SessionState::NotStarted);
}

#[test]
fn history_survives_in_registry_and_restart_starts_fresh() {
    let (_dir, registry) = registry(LifecyclePolicy::Persistent);
    assert!(registry.get_history(None, 10).expect("history").inputs.is_empty());

    registry.start_session(None).expect("start");
    registry
        .submit_script(None, "x = 1\nprint(x+1)", "source {script}", None)
        .expect("script");
    let history = registry.get_history(None, 10).expect("history");
    assert_eq!(history.inputs.len(), 1);
    assert_eq!(history.scripts.len(), 1);
    assert_eq!(history.outputs[0].input_id, Some(history.inputs[0].id));

    registry.restart_session(None).expect("restart");
    assert!(registry.get_history(None, 10).expect("history").inputs.is_empty());
    assert!(matches!(
        registry.get_history(Some("ruby"), 10),
        Err(SessionError::UnknownTool(_))
    ));
    registry.shutdown();
}
