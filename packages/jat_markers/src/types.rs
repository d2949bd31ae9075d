use serde::{Deserialize, Serialize};
use std::fmt;

/// The closed set of activity markers an agent can emit.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum MarkerType {
    Working,
    Ready,
    Idle,
    NeedsInput,
    NeedsReview,
    Completed,
    AutoProceed,
    Compacting,
    HumanAction,
    SuggestedTasks,
}

impl MarkerType {
    pub const ALL: [MarkerType; 10] = [
        MarkerType::Working,
        MarkerType::Ready,
        MarkerType::Idle,
        MarkerType::NeedsInput,
        MarkerType::NeedsReview,
        MarkerType::Completed,
        MarkerType::AutoProceed,
        MarkerType::Compacting,
        MarkerType::HumanAction,
        MarkerType::SuggestedTasks,
    ];

    /// Wire name used inside `[JAT:<TAG>...]`.
    pub fn tag(self) -> &'static str {
        match self {
            MarkerType::Working => "WORKING",
            MarkerType::Ready => "READY",
            MarkerType::Idle => "IDLE",
            MarkerType::NeedsInput => "NEEDS_INPUT",
            MarkerType::NeedsReview => "NEEDS_REVIEW",
            MarkerType::Completed => "COMPLETED",
            MarkerType::AutoProceed => "AUTO_PROCEED",
            MarkerType::Compacting => "COMPACTING",
            MarkerType::HumanAction => "HUMAN_ACTION",
            MarkerType::SuggestedTasks => "SUGGESTED_TASKS",
        }
    }

    /// Markers of the form `[JAT:<TAG>]` with no payload.
    pub fn is_simple(self) -> bool {
        matches!(
            self,
            MarkerType::NeedsInput
                | MarkerType::NeedsReview
                | MarkerType::Completed
                | MarkerType::AutoProceed
                | MarkerType::Compacting
        )
    }
}

impl fmt::Display for MarkerType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.tag())
    }
}

impl std::str::FromStr for MarkerType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let normalized = s.trim().to_uppercase().replace('-', "_");
        MarkerType::ALL
            .into_iter()
            .find(|kind| kind.tag() == normalized)
            .ok_or_else(|| format!("Invalid marker type: {}", s))
    }
}

/// A request for a human decision attached to a `HUMAN_ACTION` marker.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct HumanAction {
    pub title: String,
    #[serde(default)]
    pub description: String,
}

/// A follow-up task proposed by an agent in a `SUGGESTED_TASKS` marker.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct SuggestedTask {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,

    #[serde(rename = "type")]
    pub task_type: String,

    pub title: String,

    #[serde(default)]
    pub description: String,

    /// 0 (critical) through 4 (backlog).
    pub priority: u8,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub project: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub labels: Option<Vec<String>>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub depends_on: Option<Vec<String>>,
}

pub const DEFAULT_TASK_TYPE: &str = "task";
pub const DEFAULT_TASK_PRIORITY: u8 = 2;
pub const MAX_TASK_PRIORITY: u8 = 4;

/// One recognized marker occurrence.
///
/// `position` is the byte offset of the opening `[` in the buffer the marker
/// was scanned from. It is only meaningful relative to other markers from the
/// same buffer.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
#[serde(tag = "type", rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Marker {
    Working {
        position: usize,
        raw: String,
        task_id: String,
    },
    Ready {
        position: usize,
        raw: String,
        actions: String,
    },
    Idle {
        position: usize,
        raw: String,
        #[serde(skip_serializing_if = "Option::is_none")]
        actions: Option<String>,
    },
    NeedsInput {
        position: usize,
        raw: String,
    },
    NeedsReview {
        position: usize,
        raw: String,
    },
    Completed {
        position: usize,
        raw: String,
    },
    AutoProceed {
        position: usize,
        raw: String,
    },
    Compacting {
        position: usize,
        raw: String,
    },
    HumanAction {
        position: usize,
        raw: String,
        action: HumanAction,
    },
    SuggestedTasks {
        position: usize,
        raw: String,
        tasks: Vec<SuggestedTask>,
    },
}

impl Marker {
    /// Builds a payload-less marker. Returns `None` for types that carry a payload.
    pub fn simple(kind: MarkerType, position: usize, raw: impl Into<String>) -> Option<Self> {
        let raw = raw.into();
        let marker = match kind {
            MarkerType::NeedsInput => Marker::NeedsInput { position, raw },
            MarkerType::NeedsReview => Marker::NeedsReview { position, raw },
            MarkerType::Completed => Marker::Completed { position, raw },
            MarkerType::AutoProceed => Marker::AutoProceed { position, raw },
            MarkerType::Compacting => Marker::Compacting { position, raw },
            _ => return None,
        };
        Some(marker)
    }

    pub fn marker_type(&self) -> MarkerType {
        match self {
            Marker::Working { .. } => MarkerType::Working,
            Marker::Ready { .. } => MarkerType::Ready,
            Marker::Idle { .. } => MarkerType::Idle,
            Marker::NeedsInput { .. } => MarkerType::NeedsInput,
            Marker::NeedsReview { .. } => MarkerType::NeedsReview,
            Marker::Completed { .. } => MarkerType::Completed,
            Marker::AutoProceed { .. } => MarkerType::AutoProceed,
            Marker::Compacting { .. } => MarkerType::Compacting,
            Marker::HumanAction { .. } => MarkerType::HumanAction,
            Marker::SuggestedTasks { .. } => MarkerType::SuggestedTasks,
        }
    }

    pub fn position(&self) -> usize {
        match self {
            Marker::Working { position, .. }
            | Marker::Ready { position, .. }
            | Marker::Idle { position, .. }
            | Marker::NeedsInput { position, .. }
            | Marker::NeedsReview { position, .. }
            | Marker::Completed { position, .. }
            | Marker::AutoProceed { position, .. }
            | Marker::Compacting { position, .. }
            | Marker::HumanAction { position, .. }
            | Marker::SuggestedTasks { position, .. } => *position,
        }
    }

    /// The exact text matched in the buffer.
    pub fn raw(&self) -> &str {
        match self {
            Marker::Working { raw, .. }
            | Marker::Ready { raw, .. }
            | Marker::Idle { raw, .. }
            | Marker::NeedsInput { raw, .. }
            | Marker::NeedsReview { raw, .. }
            | Marker::Completed { raw, .. }
            | Marker::AutoProceed { raw, .. }
            | Marker::Compacting { raw, .. }
            | Marker::HumanAction { raw, .. }
            | Marker::SuggestedTasks { raw, .. } => raw,
        }
    }
}

/// Everything recognized in one buffer.
///
/// Single-valued types hold the most recent occurrence. Human actions keep
/// every occurrence in document order since several can be pending at once.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize)]
pub struct MarkerParseResult {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub working: Option<Marker>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub ready: Option<Marker>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub idle: Option<Marker>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub needs_input: Option<Marker>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub needs_review: Option<Marker>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub completed: Option<Marker>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub auto_proceed: Option<Marker>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub compacting: Option<Marker>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub human_actions: Vec<Marker>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub suggested_tasks: Option<Marker>,
}

impl MarkerParseResult {
    pub fn is_empty(&self) -> bool {
        self.single_valued().all(|m| m.is_none())
            && self.human_actions.is_empty()
            && self.suggested_tasks.is_none()
    }

    /// The most recent marker of the given type, if any.
    pub fn get(&self, kind: MarkerType) -> Option<&Marker> {
        match kind {
            MarkerType::Working => self.working.as_ref(),
            MarkerType::Ready => self.ready.as_ref(),
            MarkerType::Idle => self.idle.as_ref(),
            MarkerType::NeedsInput => self.needs_input.as_ref(),
            MarkerType::NeedsReview => self.needs_review.as_ref(),
            MarkerType::Completed => self.completed.as_ref(),
            MarkerType::AutoProceed => self.auto_proceed.as_ref(),
            MarkerType::Compacting => self.compacting.as_ref(),
            MarkerType::HumanAction => self.human_actions.last(),
            MarkerType::SuggestedTasks => self.suggested_tasks.as_ref(),
        }
    }

    /// Every recognized marker, ordered by position.
    pub fn markers(&self) -> Vec<&Marker> {
        let mut all: Vec<&Marker> = self
            .single_valued()
            .flatten()
            .chain(self.human_actions.iter())
            .chain(self.suggested_tasks.iter())
            .collect();
        all.sort_by_key(|m| m.position());
        all
    }

    /// The marker with the highest position, regardless of type.
    pub fn latest(&self) -> Option<&Marker> {
        self.markers().into_iter().last()
    }

    pub fn working_task_id(&self) -> Option<&str> {
        match &self.working {
            Some(Marker::Working { task_id, .. }) => Some(task_id),
            _ => None,
        }
    }

    pub fn ready_actions(&self) -> Option<&str> {
        match &self.ready {
            Some(Marker::Ready { actions, .. }) => Some(actions),
            _ => None,
        }
    }

    /// Actions of the latest idle marker; `None` for the bare `[JAT:IDLE]` form.
    pub fn idle_actions(&self) -> Option<&str> {
        match &self.idle {
            Some(Marker::Idle { actions, .. }) => actions.as_deref(),
            _ => None,
        }
    }

    pub fn tasks(&self) -> &[SuggestedTask] {
        match &self.suggested_tasks {
            Some(Marker::SuggestedTasks { tasks, .. }) => tasks,
            _ => &[],
        }
    }

    pub fn human_action_payloads(&self) -> Vec<&HumanAction> {
        self.human_actions
            .iter()
            .filter_map(|m| match m {
                Marker::HumanAction { action, .. } => Some(action),
                _ => None,
            })
            .collect()
    }

    fn single_valued(&self) -> impl Iterator<Item = &Option<Marker>> {
        [
            &self.working,
            &self.ready,
            &self.idle,
            &self.needs_input,
            &self.needs_review,
            &self.completed,
            &self.auto_proceed,
            &self.compacting,
        ]
        .into_iter()
    }
}
