//! Command-line parsing, the tool table, and validation helpers.

#[cfg(test)]
mod tests;
mod tools;
mod validation;

use clap::{Parser, ValueEnum};
use std::env;
use std::path::PathBuf;

pub use tools::{ToolConfig, ToolTable};
pub use validation::split_command;

pub const DEFAULT_TOOL_NAME: &str = "default";
pub const DEFAULT_INLINE_COMMAND: &str = "python3 -i -u";
pub const DEFAULT_INLINE_PROMPT: &str = ">>> ";
pub const DEFAULT_INLINE_TIMEOUT_SECS: u64 = 30;
pub const DEFAULT_STARTUP_TIMEOUT_SECS: u64 = 30;
pub const DEFAULT_OUTPUT_CAP_BYTES: usize = 1024 * 1024;
pub const MIN_TIMEOUT_SECS: u64 = 1;
pub const MAX_TIMEOUT_SECS: u64 = 3600;
pub const MIN_OUTPUT_CAP_BYTES: usize = 4 * 1024;
pub const MAX_OUTPUT_CAP_BYTES: usize = 64 * 1024 * 1024;

pub fn default_term() -> String {
    env::var("TERM")
        .ok()
        .filter(|value| !value.trim().is_empty() && value != "dumb")
        .unwrap_or_else(|| "xterm-256color".to_string())
}

/// Whether sessions outlive a single call.
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum LifecyclePolicy {
    /// Sessions are started once and kept until stopped.
    Persistent,
    /// Every submission runs in a fresh session that is stopped afterwards.
    PerCall,
}

impl LifecyclePolicy {
    pub fn label(self) -> &'static str {
        match self {
            LifecyclePolicy::Persistent => "persistent",
            LifecyclePolicy::PerCall => "per-call",
        }
    }
}

/// CLI options for the tool session server.
///
/// The `--command`/`--prompt`/... flags describe one inline tool registered
/// under `--tool-name`; a `--config` file can add more.
#[derive(Debug, Parser, Clone)]
#[command(
    name = "toolsession",
    about = "ToolSession interactive tool server",
    long_about = None,
    author,
    version
)]
pub struct AppConfig {
    /// JSON or YAML file with a `tools` table
    #[arg(long, env = "TOOLSESSION_CONFIG")]
    pub config: Option<PathBuf>,

    /// Tool key used when a request omits one
    #[arg(long = "tool-name", env = "TOOLSESSION_TOOL", default_value = DEFAULT_TOOL_NAME)]
    pub tool_name: String,

    /// Launch command of the inline tool
    #[arg(long, env = "TOOLSESSION_COMMAND", default_value = DEFAULT_INLINE_COMMAND)]
    pub command: String,

    /// Environment setup command run before the inline tool
    #[arg(long = "environment-command", env = "TOOLSESSION_ENV_COMMAND")]
    pub environment_command: Option<String>,

    /// Working directory of the inline tool
    #[arg(long = "working-dir", env = "TOOLSESSION_WORKING_DIR", default_value = "/tmp")]
    pub working_dir: PathBuf,

    /// Prompt marker of the inline tool
    #[arg(long, env = "TOOLSESSION_PROMPT", default_value = DEFAULT_INLINE_PROMPT)]
    pub prompt: String,

    /// Prompt regex override for the inline tool (matched at the end of output)
    #[arg(long = "prompt-regex", env = "TOOLSESSION_PROMPT_REGEX")]
    pub prompt_regex: Option<String>,

    /// Command timeout in seconds
    #[arg(long, env = "TOOLSESSION_TIMEOUT", default_value_t = DEFAULT_INLINE_TIMEOUT_SECS)]
    pub timeout: u64,

    /// Seconds to wait for the first prompt after launch
    #[arg(long = "startup-timeout", default_value_t = DEFAULT_STARTUP_TIMEOUT_SECS)]
    pub startup_timeout: u64,

    /// Session lifecycle policy
    #[arg(
        long,
        value_enum,
        env = "TOOLSESSION_LIFECYCLE",
        default_value_t = LifecyclePolicy::Persistent
    )]
    pub lifecycle: LifecyclePolicy,

    /// Do not start the default tool at boot (persistent lifecycle only)
    #[arg(long = "no-autostart", default_value_t = false)]
    pub no_autostart: bool,

    /// Maximum buffered output per session (bytes)
    #[arg(long = "output-cap-bytes", default_value_t = DEFAULT_OUTPUT_CAP_BYTES)]
    pub output_cap_bytes: usize,

    /// TERM value exported to tools
    #[arg(long = "term", default_value_t = default_term())]
    pub term_value: String,

    /// Directory for `<tool>_output.log` transcripts
    #[arg(long = "transcript-dir")]
    pub transcript_dir: Option<PathBuf>,

    /// Enable file logging (debug)
    #[arg(long = "logs", env = "TOOLSESSION_LOGS", default_value_t = false)]
    pub logs: bool,

    /// Disable all file logging (overrides --logs and log env vars)
    #[arg(long = "no-logs", env = "TOOLSESSION_NO_LOGS", default_value_t = false)]
    pub no_logs: bool,

    /// Allow logging command text and output snippets (debug log only)
    #[arg(
        long = "log-content",
        env = "TOOLSESSION_LOG_CONTENT",
        default_value_t = false
    )]
    pub log_content: bool,
}
