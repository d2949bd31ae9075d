//! Format Compatibility Layer for `SUGGESTED_TASKS`.
//!
//! Two wire encodings coexist:
//!
//! ```text
//! inline:  [JAT:SUGGESTED_TASKS {"tasks":[...]}]
//! block:   [JAT:SUGGESTED_TASKS]
//!          {"tasks":[...]}
//!          [/JAT:SUGGESTED_TASKS]
//! ```
//!
//! The block body is often mangled by interactive line-wrapping and colour
//! codes, so it is normalized before decoding. Formats are tried in the order
//! of [`TASK_LIST_FORMATS`]; the first one that decodes wins.

use regex::Regex;
use serde_json::{Map, Value};
use std::sync::OnceLock;
use tracing::debug;

use crate::error::{MarkerError, Result};
use crate::payload::extract_balanced_json;
use crate::scanner::{inline_payload, opens_inline_body};
use crate::types::{
    DEFAULT_TASK_PRIORITY, DEFAULT_TASK_TYPE, MAX_TASK_PRIORITY, Marker, MarkerType, SuggestedTask,
};

pub const SUGGESTED_TASKS_OPEN: &str = "[JAT:SUGGESTED_TASKS]";
pub const SUGGESTED_TASKS_CLOSE: &str = "[/JAT:SUGGESTED_TASKS]";
pub const SUGGESTED_TASKS_INLINE: &str = "[JAT:SUGGESTED_TASKS";

static ANSI_PATTERN: OnceLock<Regex> = OnceLock::new();

/// CSI sequences, OSC sequences (BEL or ST terminated), then any other
/// two-byte escape. CSI final bytes are limited to letters and `~` so a
/// stray `ESC[` never swallows a JSON quote or brace.
fn ansi_pattern() -> &'static Regex {
    ANSI_PATTERN.get_or_init(|| {
        Regex::new(r"\x1B\[[0-?]*[ !#-/]*[A-Za-z~]|\x1B\][^\x07\x1B]*(?:\x07|\x1B\\)|\x1B[@-_]")
            .expect("ANSI pattern is valid")
    })
}

/// One wire encoding of a suggested-task list.
pub trait TaskListFormat {
    fn name(&self) -> &'static str;

    /// `None` when this encoding is not present in the buffer at all,
    /// `Some(Err)` when it is present but undecodable.
    fn decode(&self, buffer: &str) -> Option<Result<Marker>>;
}

/// `[JAT:SUGGESTED_TASKS]` ... `[/JAT:SUGGESTED_TASKS]`
pub struct BlockFormat;

/// `[JAT:SUGGESTED_TASKS {json}]`
pub struct InlineFormat;

/// Decoding order. Block form takes precedence when both are present.
pub const TASK_LIST_FORMATS: &[&dyn TaskListFormat] = &[&BlockFormat, &InlineFormat];

impl TaskListFormat for BlockFormat {
    fn name(&self) -> &'static str {
        "block"
    }

    fn decode(&self, buffer: &str) -> Option<Result<Marker>> {
        let close = buffer.rfind(SUGGESTED_TASKS_CLOSE)?;
        let position = buffer[..close].rfind(SUGGESTED_TASKS_OPEN)?;
        let body = &buffer[position + SUGGESTED_TASKS_OPEN.len()..close];
        let raw = &buffer[position..close + SUGGESTED_TASKS_CLOSE.len()];

        Some(decode_block_body(body, position).map(|tasks| Marker::SuggestedTasks {
            position,
            raw: raw.to_string(),
            tasks,
        }))
    }
}

impl TaskListFormat for InlineFormat {
    fn name(&self) -> &'static str {
        "inline"
    }

    fn decode(&self, buffer: &str) -> Option<Result<Marker>> {
        let position = buffer
            .rmatch_indices(SUGGESTED_TASKS_INLINE)
            .map(|(position, _)| position)
            .find(|&position| opens_inline_body(buffer, position + SUGGESTED_TASKS_INLINE.len()))?;
        Some(
            inline_payload(buffer, position, SUGGESTED_TASKS_INLINE).and_then(|payload| {
                Ok(Marker::SuggestedTasks {
                    position,
                    raw: payload.raw.to_string(),
                    tasks: decode_task_list(payload.json)?,
                })
            }),
        )
    }
}

/// Most recent suggested-task list, trying each format in priority order.
pub fn scan_suggested_tasks(buffer: &str) -> Option<Marker> {
    TASK_LIST_FORMATS.iter().find_map(|format| match format.decode(buffer)? {
        Ok(marker) => {
            debug!(
                format = format.name(),
                position = marker.position(),
                "decoded suggested tasks"
            );
            Some(marker)
        }
        Err(e) => {
            debug!(
                marker = %MarkerType::SuggestedTasks,
                format = format.name(),
                error = %e,
                "dropping malformed marker"
            );
            None
        }
    })
}

/// Strips ANSI escapes and collapses every whitespace run, including the
/// CR/LF pairs a wrapping terminal injects, into a single space.
pub fn normalize_block_body(body: &str) -> String {
    let stripped = ansi_pattern().replace_all(body, "");
    stripped.split_whitespace().collect::<Vec<_>>().join(" ")
}

fn decode_block_body(body: &str, position: usize) -> Result<Vec<SuggestedTask>> {
    let normalized = normalize_block_body(body);
    let brace = normalized
        .find('{')
        .ok_or(MarkerError::MissingPayload { position })?;
    let json =
        extract_balanced_json(&normalized, brace).ok_or(MarkerError::Unbalanced { position })?;
    decode_task_list(json)
}

/// Decodes `{"tasks":[...]}`.
///
/// `tasks` must be an array. Individual entries that cannot be normalized are
/// skipped; the rest of the list survives.
pub fn decode_task_list(json: &str) -> Result<Vec<SuggestedTask>> {
    let value: Value = serde_json::from_str(json)?;
    let tasks = value
        .get("tasks")
        .ok_or(MarkerError::MissingField { field: "tasks" })?
        .as_array()
        .ok_or(MarkerError::InvalidShape {
            expected: "array of tasks",
        })?;

    Ok(tasks
        .iter()
        .enumerate()
        .filter_map(|(index, task)| match normalize_task(task) {
            Ok(task) => Some(task),
            Err(e) => {
                debug!(index, error = %e, "skipping suggested task");
                None
            }
        })
        .collect())
}

/// Fills defaults for one task object. `title` is the only required field.
pub fn normalize_task(value: &Value) -> Result<SuggestedTask> {
    let obj = value.as_object().ok_or(MarkerError::InvalidShape {
        expected: "task object",
    })?;

    let title = string_field(obj, "title").ok_or(MarkerError::MissingField { field: "title" })?;

    Ok(SuggestedTask {
        id: string_field(obj, "id"),
        task_type: string_field(obj, "type").unwrap_or_else(|| DEFAULT_TASK_TYPE.to_string()),
        title,
        description: string_field(obj, "description").unwrap_or_default(),
        priority: priority_field(obj.get("priority")),
        reason: string_field(obj, "reason"),
        project: string_field(obj, "project"),
        labels: labels_field(obj.get("labels")),
        depends_on: depends_on_field(obj.get("depends_on")),
    })
}

fn string_field(obj: &Map<String, Value>, key: &str) -> Option<String> {
    obj.get(key)
        .and_then(Value::as_str)
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(str::to_string)
}

fn priority_field(value: Option<&Value>) -> u8 {
    match value.and_then(Value::as_f64) {
        Some(p) if p.is_finite() => p.round().clamp(0.0, f64::from(MAX_TASK_PRIORITY)) as u8,
        _ => DEFAULT_TASK_PRIORITY,
    }
}

/// Either `["a","b"]` or `"a, b"`.
fn labels_field(value: Option<&Value>) -> Option<Vec<String>> {
    let labels: Vec<String> = match value? {
        Value::Array(items) => items
            .iter()
            .filter_map(Value::as_str)
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .map(str::to_string)
            .collect(),
        Value::String(s) => s
            .split(',')
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .map(str::to_string)
            .collect(),
        _ => return None,
    };
    (!labels.is_empty()).then_some(labels)
}

/// Kept only when the source value is list-shaped.
fn depends_on_field(value: Option<&Value>) -> Option<Vec<String>> {
    let Value::Array(items) = value? else {
        return None;
    };
    Some(
        items
            .iter()
            .filter_map(|item| match item {
                Value::String(s) => Some(s.trim().to_string()),
                Value::Number(n) => Some(n.to_string()),
                _ => None,
            })
            .filter(|s| !s.is_empty())
            .collect(),
    )
}
