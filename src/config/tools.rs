use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use super::{DEFAULT_OUTPUT_CAP_BYTES, DEFAULT_STARTUP_TIMEOUT_SECS};

fn default_prompt() -> String {
    "$ ".to_string()
}

fn default_working_directory() -> PathBuf {
    PathBuf::from("/tmp")
}

fn default_timeout() -> u64 {
    300
}

fn default_startup_timeout() -> u64 {
    DEFAULT_STARTUP_TIMEOUT_SECS
}

fn default_settle_ms() -> u64 {
    50
}

fn default_terminate_grace_ms() -> u64 {
    5_000
}

fn default_output_cap() -> usize {
    DEFAULT_OUTPUT_CAP_BYTES
}

fn default_true() -> bool {
    true
}

/// Launch and detection settings for one interactive tool.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ToolConfig {
    /// Table key; filled in when the table is loaded.
    #[serde(skip)]
    pub name: String,
    pub launch_command: String,
    #[serde(default)]
    pub environment_command: Option<String>,
    #[serde(default = "default_prompt", alias = "prompt_marker")]
    pub prompt_string: String,
    #[serde(default)]
    pub prompt_regex: Option<String>,
    #[serde(default = "default_working_directory")]
    pub working_directory: PathBuf,
    /// Command timeout in seconds.
    #[serde(default = "default_timeout")]
    pub timeout: u64,
    #[serde(default = "default_startup_timeout")]
    pub startup_timeout: u64,
    #[serde(default = "default_true")]
    pub strip_echo: bool,
    #[serde(default = "default_settle_ms")]
    pub settle_ms: u64,
    #[serde(default = "default_terminate_grace_ms")]
    pub terminate_grace_ms: u64,
    #[serde(default = "default_output_cap")]
    pub output_cap_bytes: usize,
    #[serde(default)]
    pub term: Option<String>,
    #[serde(default)]
    pub transcript_path: Option<PathBuf>,
}

impl ToolConfig {
    /// Tool with the given launch command and prompt; everything else defaulted.
    pub fn new(
        name: impl Into<String>,
        launch_command: impl Into<String>,
        prompt_string: impl Into<String>,
    ) -> Self {
        Self {
            name: name.into(),
            launch_command: launch_command.into(),
            environment_command: None,
            prompt_string: prompt_string.into(),
            prompt_regex: None,
            working_directory: default_working_directory(),
            timeout: default_timeout(),
            startup_timeout: default_startup_timeout(),
            strip_echo: true,
            settle_ms: default_settle_ms(),
            terminate_grace_ms: default_terminate_grace_ms(),
            output_cap_bytes: default_output_cap(),
            term: None,
            transcript_path: None,
        }
    }

    pub fn command_timeout(&self) -> Duration {
        Duration::from_secs(self.timeout)
    }

    pub fn startup_timeout(&self) -> Duration {
        Duration::from_secs(self.startup_timeout)
    }

    pub fn settle_window(&self) -> Duration {
        Duration::from_millis(self.settle_ms)
    }

    pub fn terminate_grace(&self) -> Duration {
        Duration::from_millis(self.terminate_grace_ms)
    }
}

#[derive(Debug, Default, Deserialize)]
struct ToolTableFile {
    #[serde(default)]
    tools: BTreeMap<String, ToolConfig>,
}

/// Tool key → configuration.
#[derive(Debug, Clone, Default)]
pub struct ToolTable {
    tools: BTreeMap<String, ToolConfig>,
}

impl ToolTable {
    pub fn new() -> Self {
        Self::default()
    }

    /// Load a JSON or YAML tool table (chosen by file extension).
    pub fn load(path: &Path) -> Result<Self> {
        let raw = fs::read_to_string(path)
            .with_context(|| format!("failed to read tool config '{}'", path.display()))?;
        let is_yaml = matches!(
            path.extension().and_then(|ext| ext.to_str()),
            Some("yaml") | Some("yml")
        );
        let table = if is_yaml {
            Self::from_yaml_str(&raw)
        } else {
            Self::from_json_str(&raw)
        };
        table.with_context(|| format!("invalid tool config '{}'", path.display()))
    }

    pub fn from_json_str(raw: &str) -> Result<Self> {
        let file: ToolTableFile = serde_json::from_str(raw).context("failed to parse JSON")?;
        Self::from_file(file)
    }

    pub fn from_yaml_str(raw: &str) -> Result<Self> {
        let file: ToolTableFile = serde_yaml::from_str(raw).context("failed to parse YAML")?;
        Self::from_file(file)
    }

    fn from_file(file: ToolTableFile) -> Result<Self> {
        let mut table = Self::new();
        for (name, tool) in file.tools {
            table.insert(name, tool)?;
        }
        Ok(table)
    }

    /// Validate and register a tool under `name`, replacing any previous entry.
    pub fn insert(&mut self, name: impl Into<String>, mut tool: ToolConfig) -> Result<()> {
        let name = name.into();
        tool.name = name.clone();
        tool.validate()
            .with_context(|| format!("tool '{name}' is misconfigured"))?;
        self.tools.insert(name, tool);
        Ok(())
    }

    pub fn get(&self, name: &str) -> Option<&ToolConfig> {
        self.tools.get(name)
    }

    pub fn contains(&self, name: &str) -> bool {
        self.tools.contains_key(name)
    }

    pub(super) fn tools_mut(&mut self) -> impl Iterator<Item = (&String, &mut ToolConfig)> {
        self.tools.iter_mut()
    }

    pub fn names(&self) -> Vec<String> {
        self.tools.keys().cloned().collect()
    }

    pub fn len(&self) -> usize {
        self.tools.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tools.is_empty()
    }
}
