use super::{
    AppConfig, ToolConfig, ToolTable, MAX_OUTPUT_CAP_BYTES, MAX_TIMEOUT_SECS,
    MIN_OUTPUT_CAP_BYTES, MIN_TIMEOUT_SECS,
};
use anyhow::{bail, Context, Result};
use clap::Parser;
use regex::Regex;

const MAX_PROMPT_BYTES: usize = 256;
const MAX_SETTLE_MS: u64 = 5_000;
const MAX_TERMINATE_GRACE_MS: u64 = 60_000;

impl AppConfig {
    /// Parse CLI arguments and validate them right away.
    pub fn parse_args() -> Result<Self> {
        let mut config = Self::parse();
        config.validate()?;
        Ok(config)
    }

    /// Check CLI values and normalize them.
    pub fn validate(&mut self) -> Result<()> {
        self.tool_name = self.tool_name.trim().to_string();
        if self.tool_name.is_empty() {
            bail!("--tool-name cannot be empty");
        }
        if !(MIN_TIMEOUT_SECS..=MAX_TIMEOUT_SECS).contains(&self.timeout) {
            bail!(
                "--timeout must be between {MIN_TIMEOUT_SECS} and {MAX_TIMEOUT_SECS} seconds, got {}",
                self.timeout
            );
        }
        if !(MIN_TIMEOUT_SECS..=MAX_TIMEOUT_SECS).contains(&self.startup_timeout) {
            bail!(
                "--startup-timeout must be between {MIN_TIMEOUT_SECS} and {MAX_TIMEOUT_SECS} seconds, got {}",
                self.startup_timeout
            );
        }
        if !(MIN_OUTPUT_CAP_BYTES..=MAX_OUTPUT_CAP_BYTES).contains(&self.output_cap_bytes) {
            bail!(
                "--output-cap-bytes must be between {MIN_OUTPUT_CAP_BYTES} and {MAX_OUTPUT_CAP_BYTES}, got {}",
                self.output_cap_bytes
            );
        }
        if self.term_value.trim().is_empty() || self.term_value.contains('\0') {
            bail!("--term must be a non-empty value without NUL bytes");
        }
        if let Some(dir) = &self.transcript_dir {
            if !dir.is_dir() {
                bail!("--transcript-dir '{}' is not a directory", dir.display());
            }
        }
        self.inline_tool()
            .validate()
            .context("inline tool flags are invalid")?;
        Ok(())
    }

    /// Tool described by the `--command`/`--prompt`/... flags.
    pub fn inline_tool(&self) -> ToolConfig {
        let mut tool = ToolConfig::new(&self.tool_name, &self.command, &self.prompt);
        tool.environment_command = self.environment_command.clone();
        tool.working_directory = self.working_dir.clone();
        tool.prompt_regex = self.prompt_regex.clone();
        tool.timeout = self.timeout;
        tool.startup_timeout = self.startup_timeout;
        tool.output_cap_bytes = self.output_cap_bytes;
        tool.term = Some(self.term_value.clone());
        tool
    }

    /// Build the tool table: the config file (if any) plus the inline tool,
    /// unless the file already defines the inline tool's key.
    pub fn load_tools(&self) -> Result<ToolTable> {
        let mut table = match &self.config {
            Some(path) => ToolTable::load(path)?,
            None => ToolTable::new(),
        };
        if !table.contains(&self.tool_name) {
            table.insert(self.tool_name.clone(), self.inline_tool())?;
        }
        if let Some(dir) = &self.transcript_dir {
            table.set_transcript_dir(dir);
        }
        Ok(table)
    }
}

impl ToolTable {
    /// Point every tool without an explicit transcript at `<dir>/<tool>_output.log`.
    pub(super) fn set_transcript_dir(&mut self, dir: &std::path::Path) {
        for (name, tool) in self.tools_mut() {
            if tool.transcript_path.is_none() {
                tool.transcript_path = Some(dir.join(format!("{name}_output.log")));
            }
        }
    }
}

impl ToolConfig {
    pub fn validate(&self) -> Result<()> {
        let words = split_command(&self.launch_command)?;
        if words.is_empty() {
            bail!("launch_command cannot be empty");
        }
        if let Some(setup) = &self.environment_command {
            if setup.trim().is_empty() {
                bail!("environment_command cannot be blank when set");
            }
        }
        if self.prompt_string.trim().is_empty() && self.prompt_regex.is_none() {
            bail!("prompt_string cannot be empty");
        }
        if self.prompt_string.len() > MAX_PROMPT_BYTES {
            bail!("prompt_string must be at most {MAX_PROMPT_BYTES} bytes");
        }
        if let Some(pattern) = &self.prompt_regex {
            Regex::new(pattern).with_context(|| format!("invalid prompt_regex '{pattern}'"))?;
        }
        if !(MIN_TIMEOUT_SECS..=MAX_TIMEOUT_SECS).contains(&self.timeout) {
            bail!(
                "timeout must be between {MIN_TIMEOUT_SECS} and {MAX_TIMEOUT_SECS} seconds, got {}",
                self.timeout
            );
        }
        if !(MIN_TIMEOUT_SECS..=MAX_TIMEOUT_SECS).contains(&self.startup_timeout) {
            bail!(
                "startup_timeout must be between {MIN_TIMEOUT_SECS} and {MAX_TIMEOUT_SECS} seconds, got {}",
                self.startup_timeout
            );
        }
        if self.settle_ms > MAX_SETTLE_MS {
            bail!("settle_ms must be at most {MAX_SETTLE_MS}");
        }
        if self.terminate_grace_ms > MAX_TERMINATE_GRACE_MS {
            bail!("terminate_grace_ms must be at most {MAX_TERMINATE_GRACE_MS}");
        }
        if !(MIN_OUTPUT_CAP_BYTES..=MAX_OUTPUT_CAP_BYTES).contains(&self.output_cap_bytes) {
            bail!(
                "output_cap_bytes must be between {MIN_OUTPUT_CAP_BYTES} and {MAX_OUTPUT_CAP_BYTES}"
            );
        }
        if let Some(term) = &self.term {
            if term.trim().is_empty() || term.contains('\0') {
                bail!("term must be a non-empty value without NUL bytes");
            }
        }
        // The working directory is checked at launch time so a missing
        // directory surfaces as a launch failure, not a config failure.
        Ok(())
    }
}

/// Split a launch command with shell-word rules.
pub fn split_command(command: &str) -> Result<Vec<String>> {
    shell_words::split(command).with_context(|| format!("cannot parse command '{command}'"))
}
