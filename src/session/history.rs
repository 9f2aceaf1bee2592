//! Recent inputs, outputs, staged scripts and errors of one session.
//!
//! Every queue is capped; the oldest record falls off when a new one would
//! exceed the capacity. Input ids keep counting across evictions.

use crate::telemetry::SubmissionKind;
use serde::Serialize;
use std::collections::VecDeque;
use std::time::SystemTime;

use super::unix_millis;

pub const HISTORY_CAPACITY: usize = 200;
pub const DEFAULT_RECENT_OUTPUTS: usize = 10;
pub const DEFAULT_RECENT_ERRORS: usize = 5;

/// A command line or script wrapper that was written to the tool.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct InputRecord {
    pub id: u64,
    pub timestamp_ms: u64,
    pub kind: SubmissionKind,
    pub command: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub script_file: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct OutputRecord {
    pub timestamp_ms: u64,
    pub text: String,
    pub lines_count: usize,
    pub input_id: Option<u64>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ScriptRecord {
    pub timestamp_ms: u64,
    pub input_id: u64,
    pub script_content: String,
    pub command_template: String,
    pub script_file: String,
    pub execution_command: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ErrorRecord {
    pub timestamp_ms: u64,
    /// Error kind code, e.g. `prompt_timeout`.
    pub kind: String,
    pub message: String,
    pub input_id: Option<u64>,
}

/// Newest records of each queue, oldest first.
#[derive(Debug, Clone, Default, Serialize)]
pub struct HistorySnapshot {
    pub inputs: Vec<InputRecord>,
    pub outputs: Vec<OutputRecord>,
    pub scripts: Vec<ScriptRecord>,
    pub errors: Vec<ErrorRecord>,
}

#[derive(Debug)]
pub struct SessionHistory {
    capacity: usize,
    next_input_id: u64,
    inputs: VecDeque<InputRecord>,
    outputs: VecDeque<OutputRecord>,
    scripts: VecDeque<ScriptRecord>,
    errors: VecDeque<ErrorRecord>,
}

fn now_ms() -> u64 {
    unix_millis(SystemTime::now())
}

fn push_capped<T>(queue: &mut VecDeque<T>, record: T, capacity: usize) {
    while queue.len() >= capacity.max(1) {
        queue.pop_front();
    }
    queue.push_back(record);
}

fn newest<T: Clone>(queue: &VecDeque<T>, count: usize) -> Vec<T> {
    let skip = queue.len().saturating_sub(count);
    queue.iter().skip(skip).cloned().collect()
}

impl SessionHistory {
    pub fn new(capacity: usize) -> Self {
        Self {
            capacity,
            next_input_id: 1,
            inputs: VecDeque::new(),
            outputs: VecDeque::new(),
            scripts: VecDeque::new(),
            errors: VecDeque::new(),
        }
    }

    /// Record a dispatched input and return its id.
    pub fn add_input(
        &mut self,
        kind: SubmissionKind,
        command: &str,
        script_file: Option<&str>,
    ) -> u64 {
        let id = self.next_input_id;
        self.next_input_id += 1;
        let record = InputRecord {
            id,
            timestamp_ms: now_ms(),
            kind,
            command: command.to_string(),
            script_file: script_file.map(str::to_string),
        };
        push_capped(&mut self.inputs, record, self.capacity);
        id
    }

    pub fn add_output(&mut self, text: &str, input_id: Option<u64>) {
        let record = OutputRecord {
            timestamp_ms: now_ms(),
            text: text.to_string(),
            lines_count: text.lines().count(),
            input_id,
        };
        push_capped(&mut self.outputs, record, self.capacity);
    }

    pub fn add_script(
        &mut self,
        input_id: u64,
        script_content: &str,
        command_template: &str,
        script_file: &str,
        execution_command: &str,
    ) {
        let record = ScriptRecord {
            timestamp_ms: now_ms(),
            input_id,
            script_content: script_content.to_string(),
            command_template: command_template.to_string(),
            script_file: script_file.to_string(),
            execution_command: execution_command.to_string(),
        };
        push_capped(&mut self.scripts, record, self.capacity);
    }

    pub fn add_error(&mut self, kind: &str, message: &str, input_id: Option<u64>) {
        let record = ErrorRecord {
            timestamp_ms: now_ms(),
            kind: kind.to_string(),
            message: message.to_string(),
            input_id,
        };
        push_capped(&mut self.errors, record, self.capacity);
    }

    pub fn recent_outputs(&self, count: usize) -> Vec<OutputRecord> {
        newest(&self.outputs, count)
    }

    pub fn recent_errors(&self, count: usize) -> Vec<ErrorRecord> {
        newest(&self.errors, count)
    }

    pub fn snapshot(&self, limit: usize) -> HistorySnapshot {
        HistorySnapshot {
            inputs: newest(&self.inputs, limit),
            outputs: newest(&self.outputs, limit),
            scripts: newest(&self.scripts, limit),
            errors: newest(&self.errors, limit),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn inputs_get_increasing_ids_and_outputs_link_back() {
        let mut history = SessionHistory::new(HISTORY_CAPACITY);
        let first = history.add_input(SubmissionKind::Command, "print('hi')", None);
        let second = history.add_input(SubmissionKind::Command, "import math", None);
        assert_eq!((first, second), (1, 2));

        history.add_output("hi\nthere\n", Some(first));
        let outputs = history.recent_outputs(DEFAULT_RECENT_OUTPUTS);
        assert_eq!(outputs.len(), 1);
        assert_eq!(outputs[0].lines_count, 2);
        assert_eq!(outputs[0].input_id, Some(1));
    }

    #[test]
    fn queues_drop_oldest_records_past_capacity() {
        let mut history = SessionHistory::new(3);
        for n in 0..5 {
            history.add_error("prompt_timeout", &format!("miss {n}"), None);
        }
        let errors = history.recent_errors(10);
        let messages: Vec<&str> = errors.iter().map(|e| e.message.as_str()).collect();
        assert_eq!(messages, ["miss 2", "miss 3", "miss 4"]);
        assert_eq!(history.recent_errors(1)[0].message, "miss 4");
    }

    #[test]
    fn snapshot_limits_each_queue() {
        let mut history = SessionHistory::new(HISTORY_CAPACITY);
        let id = history.add_input(SubmissionKind::Script, "source /tmp/a.tcl", Some("/tmp/a.tcl"));
        history.add_script(id, "puts 1", "source {script}", "/tmp/a.tcl", "source /tmp/a.tcl");
        history.add_input(SubmissionKind::Command, "x", None);

        let snapshot = history.snapshot(1);
        assert_eq!(snapshot.inputs.len(), 1);
        assert_eq!(snapshot.inputs[0].command, "x");
        assert_eq!(snapshot.scripts[0].command_template, "source {script}");
        assert!(snapshot.outputs.is_empty());

        let value = serde_json::to_value(history.snapshot(5)).unwrap();
        assert_eq!(value["inputs"][0]["kind"], "script");
        assert!(value["inputs"][1].get("script_file").is_none());
    }
}
