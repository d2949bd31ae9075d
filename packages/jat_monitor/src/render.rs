use anyhow::Result;
use jat_markers::{Marker, MarkerParseResult, SessionState};
use serde::Serialize;

use crate::config::OutputFormat;
use crate::watch::Transition;

/// Resolved state plus the context a dashboard row needs.
#[derive(Debug, Serialize)]
pub struct StateReport<'a> {
    pub state: SessionState,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub task: Option<&'a str>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub position: Option<usize>,
    pub pending_human_actions: usize,
    pub suggested_tasks: usize,
}

impl<'a> StateReport<'a> {
    pub fn new(state: SessionState, result: &'a MarkerParseResult) -> Self {
        Self {
            state,
            task: result.working_task_id(),
            position: result.latest().map(Marker::position),
            pending_human_actions: result.human_actions.len(),
            suggested_tasks: result.tasks().len(),
        }
    }
}

/// One line per marker in text mode, the full result in JSON mode.
pub fn render_markers(result: &MarkerParseResult, format: OutputFormat) -> Result<String> {
    if format == OutputFormat::Json {
        return Ok(serde_json::to_string_pretty(result)?);
    }

    let lines: Vec<String> = result
        .markers()
        .into_iter()
        .map(|m| {
            let detail = marker_detail(m);
            if detail.is_empty() {
                format!("{:>8}  {}", m.position(), m.marker_type())
            } else {
                format!("{:>8}  {:<16} {}", m.position(), m.marker_type(), detail)
            }
        })
        .collect();

    if lines.is_empty() {
        Ok("No markers found".to_string())
    } else {
        Ok(lines.join("\n"))
    }
}

pub fn render_state(report: &StateReport<'_>, format: OutputFormat) -> Result<String> {
    match format {
        OutputFormat::Json => Ok(serde_json::to_string(report)?),
        OutputFormat::Text => {
            let mut out = report.state.to_string();
            if let Some(task) = report.task {
                out.push_str(&format!(" (task {})", task));
            }
            if report.pending_human_actions > 0 {
                out.push_str(&format!(
                    ", {} pending human action(s)",
                    report.pending_human_actions
                ));
            }
            if report.suggested_tasks > 0 {
                out.push_str(&format!(", {} suggested task(s)", report.suggested_tasks));
            }
            Ok(out)
        }
    }
}

/// One watch event. JSON lines also carry the offset of the marker that
/// produced the new state.
pub fn render_transition(transition: &Transition, format: OutputFormat) -> Result<String> {
    let Transition {
        path,
        from,
        to,
        position,
    } = transition;
    match format {
        OutputFormat::Json => Ok(serde_json::to_string(&serde_json::json!({
            "path": path.display().to_string(),
            "from": from,
            "to": to,
            "position": position,
        }))?),
        OutputFormat::Text => {
            let from = from.map_or_else(|| "-".to_string(), |s| s.to_string());
            Ok(format!("{}: {} -> {}", path.display(), from, to))
        }
    }
}

fn marker_detail(marker: &Marker) -> String {
    match marker {
        Marker::Working { task_id, .. } => format!("task={}", task_id),
        Marker::Ready { actions, .. } => format!("actions={}", actions),
        Marker::Idle {
            actions: Some(actions),
            ..
        } => format!("actions={}", actions),
        Marker::HumanAction { action, .. } if action.description.is_empty() => {
            action.title.clone()
        }
        Marker::HumanAction { action, .. } => format!("{}: {}", action.title, action.description),
        Marker::SuggestedTasks { tasks, .. } => tasks
            .iter()
            .map(|t| format!("[P{}] {}", t.priority, t.title))
            .collect::<Vec<_>>()
            .join("; "),
        _ => String::new(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use jat_markers::{determine_session_state, parse_all_markers};
    use std::path::PathBuf;

    const BUFFER: &str = concat!(
        "[JAT:WORKING task=jat-7]\n",
        r#"[JAT:HUMAN_ACTION {"title":"Approve","description":"deploy"}]"#,
        "\n",
        r#"[JAT:SUGGESTED_TASKS {"tasks":[{"title":"Write docs","priority":3}]}]"#,
        "\n[JAT:NEEDS_INPUT]",
    );

    // ── render_markers ─────────────────────────────────────────────

    #[test]
    fn test_markers_text() {
        let result = parse_all_markers(BUFFER);
        let text = render_markers(&result, OutputFormat::Text).unwrap();
        let lines: Vec<&str> = text.lines().collect();
        assert_eq!(lines.len(), 4);
        assert!(lines[0].contains("WORKING") && lines[0].ends_with("task=jat-7"));
        assert!(lines[1].ends_with("Approve: deploy"));
        assert!(lines[2].ends_with("[P3] Write docs"));
        assert!(lines[3].ends_with("NEEDS_INPUT"));
    }

    #[test]
    fn test_markers_text_empty() {
        let result = parse_all_markers("no markers");
        assert_eq!(
            render_markers(&result, OutputFormat::Text).unwrap(),
            "No markers found"
        );
    }

    #[test]
    fn test_markers_json() {
        let result = parse_all_markers(BUFFER);
        let json = render_markers(&result, OutputFormat::Json).unwrap();
        let value: serde_json::Value = serde_json::from_str(&json).unwrap();
        assert_eq!(value["working"]["task_id"], "jat-7");
        assert_eq!(value["human_actions"][0]["action"]["title"], "Approve");
        assert_eq!(value["suggested_tasks"]["tasks"][0]["priority"], 3);
    }

    // ── render_state ───────────────────────────────────────────────

    #[test]
    fn test_state_text() {
        let result = parse_all_markers(BUFFER);
        let report = StateReport::new(determine_session_state(&result, true), &result);
        assert_eq!(
            render_state(&report, OutputFormat::Text).unwrap(),
            "needs-input (task jat-7), 1 pending human action(s), 1 suggested task(s)"
        );
    }

    #[test]
    fn test_state_json() {
        let result = parse_all_markers("");
        let report = StateReport::new(determine_session_state(&result, true), &result);
        let value: serde_json::Value =
            serde_json::from_str(&render_state(&report, OutputFormat::Json).unwrap()).unwrap();
        assert_eq!(value["state"], "starting");
        assert!(value.get("task").is_none());
        assert_eq!(value["pending_human_actions"], 0);
    }

    // ── render_transition ──────────────────────────────────────────

    #[test]
    fn test_transition_text() {
        let transition = Transition {
            path: PathBuf::from("agents/a.log"),
            from: None,
            to: SessionState::Working,
            position: Some(0),
        };
        let line = render_transition(&transition, OutputFormat::Text).unwrap();
        assert_eq!(line, "agents/a.log: - -> working");
    }

    #[test]
    fn test_transition_json() {
        let transition = Transition {
            path: PathBuf::from("a.log"),
            from: Some(SessionState::Working),
            to: SessionState::ReadyForReview,
            position: Some(412),
        };
        let line = render_transition(&transition, OutputFormat::Json).unwrap();
        let value: serde_json::Value = serde_json::from_str(&line).unwrap();
        assert_eq!(value["path"], "a.log");
        assert_eq!(value["from"], "working");
        assert_eq!(value["to"], "ready-for-review");
        assert_eq!(value["position"], 412);
    }

    #[test]
    fn test_transition_json_without_marker() {
        let transition = Transition {
            path: PathBuf::from("a.log"),
            from: None,
            to: SessionState::Idle,
            position: None,
        };
        let line = render_transition(&transition, OutputFormat::Json).unwrap();
        let value: serde_json::Value = serde_json::from_str(&line).unwrap();
        assert!(value["from"].is_null());
        assert!(value["position"].is_null());
    }
}
