//! # JAT Markers
//!
//! Recognizes the activity markers coding agents embed in their terminal
//! output and derives a session state from them.
//!
//! ## Wire format
//!
//! ```text
//! [JAT:NEEDS_INPUT]  [JAT:NEEDS_REVIEW]  [JAT:COMPLETED]  [JAT:AUTO_PROCEED]  [JAT:COMPACTING]
//! [JAT:WORKING task=<id>]
//! [JAT:READY actions=<text>]
//! [JAT:IDLE]  or  [JAT:IDLE actions=<text>]
//! [JAT:HUMAN_ACTION {"title":"...","description":"..."}]
//! [JAT:SUGGESTED_TASKS {"tasks":[...]}]
//! [JAT:SUGGESTED_TASKS]
//! {"tasks":[...]}
//! [/JAT:SUGGESTED_TASKS]
//! ```
//!
//! ## Pipeline
//!
//! raw buffer → [`parse_all_markers`] → [`MarkerParseResult`] →
//! [`determine_session_state`] → [`SessionState`]
//!
//! The pipeline is pure. It always runs over the whole cumulative buffer
//! because a marker is only ever superseded by a later one. Malformed or
//! truncated markers degrade to "not present" and never abort
//! the parse.
//!
//! ## Quick Start
//!
//! ```rust
//! use jat_markers::{SessionState, determine_session_state, parse_all_markers};
//!
//! let buffer = "[JAT:WORKING task=jat-12]\n...compiling...\n[JAT:NEEDS_INPUT]";
//! let result = parse_all_markers(buffer);
//!
//! assert_eq!(result.working_task_id(), Some("jat-12"));
//! assert_eq!(determine_session_state(&result, true), SessionState::NeedsInput);
//! ```

pub mod compat;
pub mod error;
pub mod payload;
pub mod scanner;
pub mod state;
pub mod types;

pub use compat::{BlockFormat, InlineFormat, TaskListFormat, normalize_block_body};
pub use error::{MarkerError, Result};
pub use payload::extract_balanced_json;
pub use scanner::{MARKER_TAGS, parse_all_markers};
pub use state::{SessionState, determine_session_state, state_candidates};
pub use types::{HumanAction, Marker, MarkerParseResult, MarkerType, SuggestedTask};

/// Returns true if the buffer contains any known marker tag.
///
/// Purely lexical: a tag whose payload would fail to decode still counts.
pub fn has_any_marker(buffer: &str) -> bool {
    buffer.contains("[JAT:") && MARKER_TAGS.iter().any(|tag| buffer.contains(tag))
}

/// Byte offset of the most recent marker tag of any kind.
pub fn last_marker_position(buffer: &str) -> Option<usize> {
    MARKER_TAGS.iter().filter_map(|tag| buffer.rfind(tag)).max()
}

/// The last `max_bytes` of `buffer`, moved forward to a char boundary.
///
/// `max_bytes == 0` disables windowing. Callers use this to bound parse cost
/// on very large buffers; the pipeline itself never truncates.
pub fn tail_window(buffer: &str, max_bytes: usize) -> &str {
    if max_bytes == 0 || buffer.len() <= max_bytes {
        return buffer;
    }
    let mut start = buffer.len() - max_bytes;
    while !buffer.is_char_boundary(start) {
        start += 1;
    }
    &buffer[start..]
}
