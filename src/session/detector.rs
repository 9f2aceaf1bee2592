//! Prompt detection over raw PTY output.
//!
//! The detector never tracks lines; it looks at the newest bytes after a
//! given offset, strips terminal styling, and asks whether the text ends with
//! the prompt (plus optional trailing whitespace).

use crate::config::ToolConfig;
use crate::error::{Result, SessionError};
use regex::Regex;
use vte::{Parser as VteParser, Perform};

use super::buffer::OutputBuffer;

/// Raw bytes examined beyond the prompt itself. Covers escape sequences and
/// trailing whitespace that tools print around their prompt.
const TAIL_SLACK_BYTES: usize = 256;
const REGEX_WINDOW_BYTES: usize = 1024;

fn is_trailing_space(c: char) -> bool {
    matches!(c, ' ' | '\t' | '\r' | '\n')
}

/// How a tool's idle prompt is recognized.
#[derive(Debug, Clone)]
pub enum PromptMatcher {
    /// Literal marker; surrounding whitespace is not significant.
    Literal(String),
    /// Pattern that must match at the end of the output.
    Pattern(Regex),
}

impl PromptMatcher {
    pub fn literal(marker: &str) -> Self {
        PromptMatcher::Literal(marker.trim().to_string())
    }

    pub fn from_tool(tool: &ToolConfig) -> Result<Self> {
        match tool.prompt_regex.as_deref() {
            Some(raw) => Regex::new(raw).map(PromptMatcher::Pattern).map_err(|err| {
                SessionError::InvalidRequest(format!("invalid prompt regex '{raw}': {err}"))
            }),
            None => Ok(Self::literal(&tool.prompt_string)),
        }
    }

    /// Raw bytes worth scanning at the tail of the output.
    pub fn window_len(&self) -> usize {
        match self {
            PromptMatcher::Literal(marker) => marker.len() + TAIL_SLACK_BYTES,
            PromptMatcher::Pattern(_) => REGEX_WINDOW_BYTES,
        }
    }

    /// Byte index in `text` where a prompt ending the text starts, if any.
    pub fn find_at_end(&self, text: &str) -> Option<usize> {
        let trimmed = text.trim_end_matches(is_trailing_space);
        match self {
            PromptMatcher::Literal(marker) => {
                if marker.is_empty() || !trimmed.ends_with(marker.as_str()) {
                    return None;
                }
                Some(trimmed.len() - marker.len())
            }
            PromptMatcher::Pattern(regex) => regex
                .find_iter(text)
                .filter(|m| m.end() > m.start() && m.end() >= trimmed.len())
                .map(|m| m.start())
                .last(),
        }
    }

    /// Whether the output after `offset` currently ends with the prompt.
    pub fn prompt_at_tail(&self, buffer: &OutputBuffer, offset: u64) -> bool {
        let tail = buffer.tail_since(offset, self.window_len());
        if tail.is_empty() {
            return false;
        }
        self.find_at_end(&clean_output(tail)).is_some()
    }
}

/// Remove terminal escape sequences while keeping newlines, carriage
/// returns and tabs.
pub fn strip_ansi_preserve_controls(bytes: &[u8]) -> Vec<u8> {
    struct ControlStripper {
        output: Vec<u8>,
    }

    impl Perform for ControlStripper {
        fn print(&mut self, c: char) {
            let mut buf = [0u8; 4];
            let encoded = c.encode_utf8(&mut buf);
            self.output.extend_from_slice(encoded.as_bytes());
        }

        fn execute(&mut self, byte: u8) {
            match byte {
                b'\n' | b'\r' | b'\t' => self.output.push(byte),
                _ => {}
            }
        }
    }

    let mut parser = VteParser::new();
    let mut stripper = ControlStripper {
        output: Vec::with_capacity(bytes.len()),
    };
    parser.advance(&mut stripper, bytes);
    stripper.output
}

/// Styling-free text with terminal line endings folded to `\n`.
pub fn clean_output(bytes: &[u8]) -> String {
    let stripped = strip_ansi_preserve_controls(bytes);
    let text = String::from_utf8_lossy(&stripped);
    let mut out = String::with_capacity(text.len());
    let mut chars = text.chars().peekable();
    while let Some(c) = chars.next() {
        if c == '\r' {
            if chars.peek() == Some(&'\n') {
                continue;
            }
            // Bare CR: the tool redraws the line; keep only what follows.
            let line_start = out.rfind('\n').map(|idx| idx + 1).unwrap_or(0);
            out.truncate(line_start);
            continue;
        }
        out.push(c);
    }
    out
}

/// Text a command produced: echo and trailing prompt removed.
pub fn extract_response(
    raw: &[u8],
    matcher: &PromptMatcher,
    echoed_command: Option<&str>,
) -> String {
    let mut text = clean_output(raw);
    if let Some(start) = matcher.find_at_end(&text) {
        text.truncate(start);
    }
    match echoed_command {
        Some(command) => strip_echo(&text, command).to_string(),
        None => text,
    }
}

/// Drop the leading lines that are the terminal echo of `command`.
///
/// Continuation prompts in front of an echoed line (`... `) are tolerated
/// because only the end of each line is compared.
pub fn strip_echo<'a>(text: &'a str, command: &str) -> &'a str {
    let mut rest = text;
    for command_line in command.lines() {
        let expected = command_line.trim_end();
        let (line, remainder) = match rest.find('\n') {
            Some(idx) => (&rest[..idx], &rest[idx + 1..]),
            None => (rest, ""),
        };
        if !line.trim_end().ends_with(expected) {
            break;
        }
        rest = remainder;
    }
    rest
}

/// Keep only the last `max_lines` lines of `text`.
pub fn last_lines(text: &str, max_lines: usize) -> &str {
    if max_lines == 0 {
        return "";
    }
    let body = text.strip_suffix('\n').unwrap_or(text);
    let mut cut = 0;
    for (seen, (idx, _)) in body.rmatch_indices('\n').enumerate() {
        if seen + 1 == max_lines {
            cut = idx + 1;
            break;
        }
    }
    &text[cut..]
}
