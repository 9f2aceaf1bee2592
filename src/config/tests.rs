use super::{AppConfig, LifecyclePolicy, ToolConfig, ToolTable, DEFAULT_TOOL_NAME};
use clap::{CommandFactory, Parser};
use std::fs;
use std::time::Duration;

fn base_config() -> AppConfig {
    AppConfig::parse_from(["toolsession"])
}

#[test]
fn defaults_describe_python_inline_tool() {
    let mut cfg = base_config();
    assert!(cfg.validate().is_ok());
    assert_eq!(cfg.tool_name, DEFAULT_TOOL_NAME);
    assert_eq!(cfg.lifecycle, LifecyclePolicy::Persistent);

    let tool = cfg.inline_tool();
    assert_eq!(tool.name, DEFAULT_TOOL_NAME);
    assert_eq!(tool.prompt_string, ">>> ");
    assert_eq!(tool.command_timeout(), Duration::from_secs(30));
    assert!(tool.strip_echo);
}

#[test]
fn rejects_timeout_out_of_bounds() {
    let mut cfg = AppConfig::parse_from(["toolsession", "--timeout", "0"]);
    assert!(cfg.validate().is_err());

    let mut cfg = AppConfig::parse_from(["toolsession", "--timeout", "3601"]);
    assert!(cfg.validate().is_err());
}

#[test]
fn accepts_timeout_bounds() {
    let mut cfg = AppConfig::parse_from(["toolsession", "--timeout", "1"]);
    assert!(cfg.validate().is_ok());

    let mut cfg = AppConfig::parse_from(["toolsession", "--timeout", "3600"]);
    assert!(cfg.validate().is_ok());
}

#[test]
fn rejects_empty_command_and_prompt() {
    let mut cfg = AppConfig::parse_from(["toolsession", "--command", "   "]);
    assert!(cfg.validate().is_err());

    let mut cfg = AppConfig::parse_from(["toolsession", "--prompt", ""]);
    assert!(cfg.validate().is_err());
}

#[test]
fn rejects_unbalanced_quotes_in_command() {
    let mut cfg = AppConfig::parse_from(["toolsession", "--command", "python3 -c 'print("]);
    assert!(cfg.validate().is_err());
}

#[test]
fn rejects_invalid_prompt_regex() {
    let mut cfg = AppConfig::parse_from(["toolsession", "--prompt-regex", "(unclosed"]);
    assert!(cfg.validate().is_err());

    let mut cfg = AppConfig::parse_from(["toolsession", "--prompt-regex", r"\(Pdb\) $"]);
    assert!(cfg.validate().is_ok());
}

#[test]
fn rejects_output_cap_out_of_bounds() {
    let mut cfg = AppConfig::parse_from(["toolsession", "--output-cap-bytes", "16"]);
    assert!(cfg.validate().is_err());
}

#[test]
fn trims_tool_name_and_rejects_blank() {
    let mut cfg = AppConfig::parse_from(["toolsession", "--tool-name", "  tcl  "]);
    assert!(cfg.validate().is_ok());
    assert_eq!(cfg.tool_name, "tcl");

    let mut cfg = AppConfig::parse_from(["toolsession", "--tool-name", " "]);
    assert!(cfg.validate().is_err());
}

#[test]
fn parses_per_call_lifecycle() {
    let cfg = AppConfig::parse_from(["toolsession", "--lifecycle", "per-call"]);
    assert_eq!(cfg.lifecycle, LifecyclePolicy::PerCall);
    assert_eq!(cfg.lifecycle.label(), "per-call");
}

#[test]
fn json_table_applies_defaults() {
    let raw = r#"{
        "tools": {
            "tcl": {
                "launch_command": "tclsh {script}",
                "environment_command": "source /opt/tools/setup.sh",
                "prompt_string": "% ",
                "timeout": 120
            }
        }
    }"#;
    let table = ToolTable::from_json_str(raw).expect("table");
    let tool = table.get("tcl").expect("tcl tool");
    assert_eq!(tool.name, "tcl");
    assert_eq!(tool.prompt_string, "% ");
    assert_eq!(tool.timeout, 120);
    assert_eq!(tool.working_directory, std::path::PathBuf::from("/tmp"));
    assert_eq!(tool.settle_ms, 50);
    assert_eq!(tool.terminate_grace(), Duration::from_secs(5));
    assert_eq!(table.names(), vec!["tcl".to_string()]);
}

#[test]
fn yaml_table_accepts_prompt_marker_alias() {
    let raw = "tools:\n  shell:\n    launch_command: sh -i\n    prompt_marker: \"$ \"\n    strip_echo: false\n";
    let table = ToolTable::from_yaml_str(raw).expect("table");
    let tool = table.get("shell").expect("shell tool");
    assert_eq!(tool.prompt_string, "$ ");
    assert!(!tool.strip_echo);
}

#[test]
fn table_rejects_unknown_fields() {
    let raw = r#"{"tools": {"py": {"launch_command": "python3", "bogus": 1}}}"#;
    assert!(ToolTable::from_json_str(raw).is_err());
}

#[test]
fn table_rejects_invalid_tool() {
    let raw = r#"{"tools": {"py": {"launch_command": "python3", "timeout": 0}}}"#;
    let err = ToolTable::from_json_str(raw).unwrap_err();
    assert!(format!("{err:#}").contains("py"));
}

#[test]
fn tool_validate_checks_settle_and_cap() {
    let mut tool = ToolConfig::new("py", "python3 -i", ">>> ");
    assert!(tool.validate().is_ok());
    tool.settle_ms = 60_000;
    assert!(tool.validate().is_err());
    tool.settle_ms = 50;
    tool.output_cap_bytes = 1;
    assert!(tool.validate().is_err());
}

#[test]
fn load_tools_merges_file_and_inline_tool() {
    let dir = tempfile::tempdir().expect("tempdir");
    let path = dir.path().join("tools.yaml");
    fs::write(
        &path,
        "tools:\n  tcl:\n    launch_command: tclsh\n    prompt_string: \"% \"\n",
    )
    .expect("write config");
    let config_arg = path.to_string_lossy().to_string();
    let transcript_arg = dir.path().to_string_lossy().to_string();

    let mut cfg = AppConfig::parse_from([
        "toolsession",
        "--config",
        config_arg.as_str(),
        "--transcript-dir",
        transcript_arg.as_str(),
    ]);
    assert!(cfg.validate().is_ok());
    let table = cfg.load_tools().expect("tools");
    assert_eq!(table.len(), 2);
    assert!(table.contains("tcl"));
    assert!(table.contains(DEFAULT_TOOL_NAME));
    assert_eq!(
        table.get("tcl").and_then(|tool| tool.transcript_path.clone()),
        Some(dir.path().join("tcl_output.log"))
    );
}

#[test]
fn load_tools_keeps_file_definition_of_default_key() {
    let dir = tempfile::tempdir().expect("tempdir");
    let path = dir.path().join("tools.json");
    fs::write(
        &path,
        r##"{"tools": {"default": {"launch_command": "sh -i", "prompt_string": "# "}}}"##,
    )
    .expect("write config");
    let config_arg = path.to_string_lossy().to_string();

    let cfg = AppConfig::parse_from(["toolsession", "--config", config_arg.as_str()]);
    let table = cfg.load_tools().expect("tools");
    assert_eq!(table.len(), 1);
    assert_eq!(
        table.get(DEFAULT_TOOL_NAME).map(|tool| tool.prompt_string.as_str()),
        Some("# ")
    );
}

#[test]
fn help_text_names_the_server() {
    let long_help = AppConfig::command().render_long_help().to_string();
    assert!(long_help.contains("ToolSession"), "{long_help}");
    let short_help = AppConfig::command().render_help().to_string();
    assert!(short_help.contains("ToolSession"));
}
