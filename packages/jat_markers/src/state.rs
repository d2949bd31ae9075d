//! Session State Resolver
//!
//! Markers are append-only annotations on a growing stream, so the marker with
//! the highest position is the current truth. Each present marker contributes
//! one `(state, position)` candidate and the highest position wins.

use serde::{Deserialize, Serialize};
use std::fmt;
use tracing::trace;

use crate::types::{Marker, MarkerParseResult};

/// The logical status of one agent session.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum SessionState {
    /// A task is assigned but the agent has not emitted any marker yet
    Starting,
    Working,
    NeedsInput,
    ReadyForReview,
    /// Context compaction is in progress
    Completing,
    Completed,
    Idle,
}

impl SessionState {
    pub const ALL: [SessionState; 7] = [
        SessionState::Starting,
        SessionState::Working,
        SessionState::NeedsInput,
        SessionState::ReadyForReview,
        SessionState::Completing,
        SessionState::Completed,
        SessionState::Idle,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            SessionState::Starting => "starting",
            SessionState::Working => "working",
            SessionState::NeedsInput => "needs-input",
            SessionState::ReadyForReview => "ready-for-review",
            SessionState::Completing => "completing",
            SessionState::Completed => "completed",
            SessionState::Idle => "idle",
        }
    }

    /// Returns true if the agent is expected to be producing output
    pub fn is_active(self) -> bool {
        matches!(
            self,
            SessionState::Starting | SessionState::Working | SessionState::Completing
        )
    }

    /// Returns true if the agent is blocked on a human
    pub fn needs_attention(self) -> bool {
        matches!(self, SessionState::NeedsInput | SessionState::ReadyForReview)
    }
}

impl fmt::Display for SessionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for SessionState {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let normalized = s.trim().to_lowercase().replace('_', "-");
        SessionState::ALL
            .into_iter()
            .find(|state| state.as_str() == normalized)
            .ok_or_else(|| format!("Invalid session state: {}", s))
    }
}

/// Candidate states with their marker positions, highest position first.
pub fn state_candidates(result: &MarkerParseResult) -> Vec<(SessionState, usize)> {
    let position = |marker: &Option<Marker>| marker.as_ref().map(Marker::position);

    let mut candidates = Vec::new();
    let mut push = |state: SessionState, at: Option<usize>| {
        if let Some(at) = at {
            candidates.push((state, at));
        }
    };

    push(SessionState::Completed, position(&result.completed));
    push(SessionState::Completed, position(&result.auto_proceed));
    push(SessionState::Idle, position(&result.idle));
    push(SessionState::NeedsInput, position(&result.needs_input));
    push(
        SessionState::ReadyForReview,
        position(&result.needs_review).max(position(&result.ready)),
    );
    push(SessionState::Completing, position(&result.compacting));
    push(SessionState::Working, position(&result.working));

    candidates.sort_by(|a, b| b.1.cmp(&a.1));
    candidates
}

/// Resolves the current session state from every discovered marker.
///
/// With no lifecycle markers at all the session is `starting` when a task is
/// assigned to it and `idle` otherwise.
pub fn determine_session_state(result: &MarkerParseResult, has_assigned_task: bool) -> SessionState {
    match state_candidates(result).first() {
        Some(&(state, position)) => {
            trace!(%state, position, "resolved session state from marker");
            state
        }
        None if has_assigned_task => SessionState::Starting,
        None => SessionState::Idle,
    }
}
