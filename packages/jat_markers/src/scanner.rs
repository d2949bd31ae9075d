//! Marker Scanner
//!
//! Locates the fixed textual tags in a buffer and decodes whatever follows
//! them. Only the tag is searched for literally; payload bodies are delimited
//! by the balanced scans in [`crate::payload`].
//!
//! Every rejected occurrence is logged at debug level and dropped. Nothing in
//! here fails the whole parse.

use serde_json::Value;
use tracing::{debug, trace};

use crate::compat;
use crate::error::{MarkerError, Result};
use crate::payload::{extract_balanced_json, find_closing_bracket, skip_whitespace};
use crate::types::{HumanAction, Marker, MarkerParseResult, MarkerType};

pub const WORKING_PREFIX: &str = "[JAT:WORKING task=";
pub const READY_PREFIX: &str = "[JAT:READY actions=";
pub const IDLE_ACTIONS_PREFIX: &str = "[JAT:IDLE actions=";
pub const IDLE_TAG: &str = "[JAT:IDLE]";
pub const HUMAN_ACTION_TAG: &str = "[JAT:HUMAN_ACTION";

/// Every literal tag that opens a marker, in no particular order.
pub const MARKER_TAGS: &[&str] = &[
    WORKING_PREFIX,
    READY_PREFIX,
    IDLE_ACTIONS_PREFIX,
    IDLE_TAG,
    "[JAT:NEEDS_INPUT]",
    "[JAT:NEEDS_REVIEW]",
    "[JAT:COMPLETED]",
    "[JAT:AUTO_PROCEED]",
    "[JAT:COMPACTING]",
    HUMAN_ACTION_TAG,
    compat::SUGGESTED_TASKS_OPEN,
    compat::SUGGESTED_TASKS_INLINE,
];

/// Scans the entire buffer for every marker type.
pub fn parse_all_markers(buffer: &str) -> MarkerParseResult {
    let result = MarkerParseResult {
        working: scan_working(buffer),
        ready: scan_ready(buffer),
        idle: scan_idle(buffer),
        needs_input: scan_simple(buffer, MarkerType::NeedsInput),
        needs_review: scan_simple(buffer, MarkerType::NeedsReview),
        completed: scan_simple(buffer, MarkerType::Completed),
        auto_proceed: scan_simple(buffer, MarkerType::AutoProceed),
        compacting: scan_simple(buffer, MarkerType::Compacting),
        human_actions: scan_human_actions(buffer),
        suggested_tasks: compat::scan_suggested_tasks(buffer),
    };
    trace!(
        buffer_len = buffer.len(),
        markers = result.markers().len(),
        "parsed markers"
    );
    result
}

/// The literal `[JAT:<TAG>]` form of a payload-less marker.
pub fn simple_tag(kind: MarkerType) -> Option<&'static str> {
    match kind {
        MarkerType::NeedsInput => Some("[JAT:NEEDS_INPUT]"),
        MarkerType::NeedsReview => Some("[JAT:NEEDS_REVIEW]"),
        MarkerType::Completed => Some("[JAT:COMPLETED]"),
        MarkerType::AutoProceed => Some("[JAT:AUTO_PROCEED]"),
        MarkerType::Compacting => Some("[JAT:COMPACTING]"),
        _ => None,
    }
}

/// Last occurrence of a payload-less marker.
pub fn scan_simple(buffer: &str, kind: MarkerType) -> Option<Marker> {
    let tag = simple_tag(kind)?;
    let position = buffer.rfind(tag)?;
    Marker::simple(kind, position, tag)
}

pub fn scan_working(buffer: &str) -> Option<Marker> {
    let outcome = scan_key_value(buffer, WORKING_PREFIX).map(|kv| -> Result<Marker> {
        let kv = kv?;
        if kv.value.is_empty() {
            return Err(MarkerError::MissingField { field: "task" });
        }
        Ok(Marker::Working {
            position: kv.position,
            raw: kv.raw.to_string(),
            task_id: kv.value.to_string(),
        })
    });
    accept(MarkerType::Working, outcome)
}

pub fn scan_ready(buffer: &str) -> Option<Marker> {
    let outcome = scan_key_value(buffer, READY_PREFIX).map(|kv| {
        kv.map(|kv| Marker::Ready {
            position: kv.position,
            raw: kv.raw.to_string(),
            actions: kv.value.to_string(),
        })
    });
    accept(MarkerType::Ready, outcome)
}

/// Agents toggle between `[JAT:IDLE]` and `[JAT:IDLE actions=...]`, so both
/// forms are searched and the later one wins.
pub fn scan_idle(buffer: &str) -> Option<Marker> {
    let outcome = scan_key_value(buffer, IDLE_ACTIONS_PREFIX).map(|kv| {
        kv.map(|kv| Marker::Idle {
            position: kv.position,
            raw: kv.raw.to_string(),
            actions: Some(kv.value.to_string()),
        })
    });
    let with_actions = accept(MarkerType::Idle, outcome);
    let bare = buffer.rfind(IDLE_TAG).map(|position| Marker::Idle {
        position,
        raw: IDLE_TAG.to_string(),
        actions: None,
    });

    match (with_actions, bare) {
        (Some(a), Some(b)) => Some(if a.position() > b.position() { a } else { b }),
        (a, b) => a.or(b),
    }
}

/// Every human action in document order, repeats included.
pub fn scan_human_actions(buffer: &str) -> Vec<Marker> {
    buffer
        .match_indices(HUMAN_ACTION_TAG)
        .map(|(position, _)| position)
        .filter(|&position| opens_inline_body(buffer, position + HUMAN_ACTION_TAG.len()))
        .filter_map(|position| {
            let decoded = inline_payload(buffer, position, HUMAN_ACTION_TAG).and_then(|payload| {
                Ok(Marker::HumanAction {
                    position,
                    raw: payload.raw.to_string(),
                    action: decode_human_action(payload.json)?,
                })
            });
            match decoded {
                Ok(marker) => Some(marker),
                Err(e) => {
                    debug!(
                        marker = %MarkerType::HumanAction,
                        position,
                        error = %e,
                        "dropping malformed marker"
                    );
                    None
                }
            }
        })
        .collect()
}

/// Decodes a `HUMAN_ACTION` body. `title` is required.
pub fn decode_human_action(json: &str) -> Result<HumanAction> {
    let value: Value = serde_json::from_str(json)?;
    let obj = value
        .as_object()
        .ok_or(MarkerError::InvalidShape { expected: "object" })?;

    let title = obj
        .get("title")
        .and_then(Value::as_str)
        .map(str::trim)
        .filter(|t| !t.is_empty())
        .ok_or(MarkerError::MissingField { field: "title" })?;
    let description = obj
        .get("description")
        .and_then(Value::as_str)
        .unwrap_or_default();

    Ok(HumanAction {
        title: title.to_string(),
        description: description.to_string(),
    })
}

struct KeyValue<'a> {
    position: usize,
    value: &'a str,
    raw: &'a str,
}

/// Last occurrence of a `prefix<value>]` marker.
///
/// `None` means the prefix is absent; `Some(Err)` means the last occurrence
/// never closes and is rejected.
fn scan_key_value<'a>(buffer: &'a str, prefix: &str) -> Option<Result<KeyValue<'a>>> {
    let position = buffer.rfind(prefix)?;
    let value_start = position + prefix.len();

    Some(match find_closing_bracket(buffer, value_start) {
        Some(close) => Ok(KeyValue {
            position,
            value: buffer[value_start..close].trim(),
            raw: &buffer[position..=close],
        }),
        None => Err(MarkerError::UnclosedTag { position }),
    })
}

/// Whether the byte at `tag_end` can start an inline body: ASCII whitespace
/// (a wrapping terminal may break the line here) or `{`. Rejects longer tags
/// sharing the prefix, such as `[JAT:SUGGESTED_TASKS]`.
pub(crate) fn opens_inline_body(buffer: &str, tag_end: usize) -> bool {
    buffer
        .as_bytes()
        .get(tag_end)
        .is_some_and(|b| b.is_ascii_whitespace() || *b == b'{')
}

pub(crate) struct InlinePayload<'a> {
    pub json: &'a str,
    pub raw: &'a str,
}

/// Balanced JSON body following `tag` at `position`.
///
/// Whitespace between the tag and `{` is tolerated. When the body is followed
/// by the marker's closing `]`, `raw` includes it.
pub(crate) fn inline_payload<'a>(
    buffer: &'a str,
    position: usize,
    tag: &str,
) -> Result<InlinePayload<'a>> {
    let brace = skip_whitespace(buffer, position + tag.len());
    if buffer.as_bytes().get(brace) != Some(&b'{') {
        return Err(MarkerError::MissingPayload { position });
    }

    let json =
        extract_balanced_json(buffer, brace).ok_or(MarkerError::Unbalanced { position })?;
    let json_end = brace + json.len();
    let after = skip_whitespace(buffer, json_end);
    let raw_end = if buffer.as_bytes().get(after) == Some(&b']') {
        after + 1
    } else {
        json_end
    };

    Ok(InlinePayload {
        json,
        raw: &buffer[position..raw_end],
    })
}

pub(crate) fn accept(kind: MarkerType, outcome: Option<Result<Marker>>) -> Option<Marker> {
    match outcome? {
        Ok(marker) => Some(marker),
        Err(e) => {
            debug!(marker = %kind, error = %e, "dropping malformed marker");
            None
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    // ── Simple markers ─────────────────────────────────────────────

    #[test]
    fn test_simple_marker_last_occurrence() {
        let buf = "[JAT:NEEDS_INPUT] text [JAT:NEEDS_INPUT] more";
        let m = scan_simple(buf, MarkerType::NeedsInput).unwrap();
        assert_eq!(m.position(), 23);
        assert_eq!(m.raw(), "[JAT:NEEDS_INPUT]");
    }

    #[test]
    fn test_simple_marker_absent() {
        assert!(scan_simple("nothing here", MarkerType::Completed).is_none());
        assert!(scan_simple("[JAT:COMPLETED", MarkerType::Completed).is_none());
    }

    #[test]
    fn test_simple_tag_only_for_simple_types() {
        for kind in MarkerType::ALL {
            assert_eq!(simple_tag(kind).is_some(), kind.is_simple());
        }
        assert!(scan_simple("[JAT:WORKING task=x]", MarkerType::Working).is_none());
    }

    // ── Key-value markers ──────────────────────────────────────────

    #[test]
    fn test_working_recency_wins() {
        let buf = "[JAT:WORKING task=a]\nlots of output\n[JAT:WORKING task=b]";
        let m = scan_working(buf).unwrap();
        assert!(matches!(&m, Marker::Working { task_id, .. } if task_id == "b"));
        assert_eq!(m.position(), buf.rfind("[JAT:WORKING").unwrap());
    }

    #[test]
    fn test_working_value_is_trimmed() {
        let m = scan_working("[JAT:WORKING task= jat-42 ]").unwrap();
        assert!(matches!(&m, Marker::Working { task_id, .. } if task_id == "jat-42"));
        assert_eq!(m.raw(), "[JAT:WORKING task= jat-42 ]");
    }

    #[test]
    fn test_working_empty_task_dropped() {
        assert!(scan_working("[JAT:WORKING task=]").is_none());
        assert!(scan_working("[JAT:WORKING task=   ]").is_none());
    }

    #[test]
    fn test_working_unclosed_dropped() {
        assert!(scan_working("[JAT:WORKING task=abc").is_none());
    }

    #[test]
    fn test_last_unclosed_working_is_not_replaced_by_earlier() {
        let buf = "[JAT:WORKING task=a] ... [JAT:WORKING task=b";
        assert!(scan_working(buf).is_none());
    }

    #[test]
    fn test_ready_value_with_brackets() {
        let buf = "[JAT:READY actions=review [diff] then merge]";
        let m = scan_ready(buf).unwrap();
        assert!(
            matches!(&m, Marker::Ready { actions, .. } if actions == "review [diff] then merge")
        );
        assert_eq!(m.raw(), buf);
    }

    #[test]
    fn test_ready_empty_actions_allowed() {
        let m = scan_ready("[JAT:READY actions=]").unwrap();
        assert!(matches!(&m, Marker::Ready { actions, .. } if actions.is_empty()));
    }

    // ── Idle ───────────────────────────────────────────────────────

    #[test]
    fn test_idle_bare_form() {
        let m = scan_idle("[JAT:IDLE]").unwrap();
        assert!(matches!(&m, Marker::Idle { actions: None, .. }));
    }

    #[test]
    fn test_idle_later_actions_form_wins() {
        let buf = "[JAT:IDLE] ... [JAT:IDLE actions=pick next]";
        let m = scan_idle(buf).unwrap();
        assert!(matches!(&m, Marker::Idle { actions: Some(a), .. } if a == "pick next"));
        assert_eq!(m.position(), 15);
    }

    #[test]
    fn test_idle_later_bare_form_wins() {
        let buf = "[JAT:IDLE actions=pick next] ... [JAT:IDLE]";
        let m = scan_idle(buf).unwrap();
        assert!(matches!(&m, Marker::Idle { actions: None, .. }));
        assert_eq!(m.position(), buf.rfind("[JAT:IDLE]").unwrap());
    }

    #[test]
    fn test_idle_unclosed_actions_falls_back_to_bare() {
        let buf = "[JAT:IDLE] ... [JAT:IDLE actions=pick";
        let m = scan_idle(buf).unwrap();
        assert!(matches!(&m, Marker::Idle { actions: None, position: 0, .. }));
    }

    // ── Human actions ──────────────────────────────────────────────

    #[test]
    fn test_human_actions_all_in_document_order() {
        let buf = concat!(
            r#"[JAT:HUMAN_ACTION {"title":"Rotate key","description":"prod"}]"#,
            "\nworking...\n",
            r#"[JAT:HUMAN_ACTION {"title":"Approve migration"}]"#,
        );
        let actions = scan_human_actions(buf);
        assert_eq!(actions.len(), 2);
        assert!(actions[0].position() < actions[1].position());
        match (&actions[0], &actions[1]) {
            (Marker::HumanAction { action: a, .. }, Marker::HumanAction { action: b, .. }) => {
                assert_eq!(a.title, "Rotate key");
                assert_eq!(a.description, "prod");
                assert_eq!(b.title, "Approve migration");
                assert_eq!(b.description, "");
            }
            _ => panic!("expected human actions"),
        }
    }

    #[test]
    fn test_human_action_raw_includes_closing_bracket() {
        let buf = r#"x [JAT:HUMAN_ACTION {"title":"t"}] y"#;
        let actions = scan_human_actions(buf);
        assert_eq!(actions[0].raw(), r#"[JAT:HUMAN_ACTION {"title":"t"}]"#);
        assert_eq!(actions[0].position(), 2);
    }

    #[test]
    fn test_human_action_repeats_all_kept() {
        let a = r#"[JAT:HUMAN_ACTION {"title":"A"}]"#;
        let b = r#"[JAT:HUMAN_ACTION {"title":"B"}]"#;
        let buf = format!("{a}\n{b}\n{a}\n");
        let markers = scan_human_actions(&buf);
        let titles: Vec<&str> = markers
            .iter()
            .map(|m| match m {
                Marker::HumanAction { action, .. } => action.title.as_str(),
                _ => unreachable!(),
            })
            .collect();
        assert_eq!(titles, ["A", "B", "A"]);
    }

    #[test]
    fn test_human_actions_many_distinct() {
        let buf: String = (0..20_000)
            .map(|i| format!("[JAT:HUMAN_ACTION {{\"title\":\"a{i}\"}}]\n"))
            .collect();
        let actions = scan_human_actions(&buf);
        assert_eq!(actions.len(), 20_000);
        assert!(actions.windows(2).all(|w| w[0].position() < w[1].position()));
    }

    #[test]
    fn test_human_action_wrapped_after_tag() {
        for sep in ["\n", "\r\n", "\n  "] {
            let buf = format!("[JAT:HUMAN_ACTION{sep}{{\"title\":\"wrapped\"}}]");
            let actions = scan_human_actions(&buf);
            assert_eq!(actions.len(), 1, "separator {sep:?}");
            assert_eq!(actions[0].raw(), buf);
        }
    }

    #[test]
    fn test_human_action_tag_without_boundary_ignored() {
        assert!(scan_human_actions(r#"[JAT:HUMAN_ACTIONS {"title":"t"}]"#).is_empty());
        assert_eq!(scan_human_actions(r#"[JAT:HUMAN_ACTION{"title":"t"}]"#).len(), 1);
        assert!(scan_human_actions("[JAT:HUMAN_ACTION").is_empty());
    }

    #[test]
    fn test_human_action_missing_title_dropped() {
        let buf = r#"[JAT:HUMAN_ACTION {"description":"no title"}] [JAT:HUMAN_ACTION {"title":"ok"}]"#;
        let actions = scan_human_actions(buf);
        assert_eq!(actions.len(), 1);
    }

    #[test]
    fn test_human_action_truncated_dropped() {
        assert!(scan_human_actions(r#"[JAT:HUMAN_ACTION {"title":"x""#).is_empty());
        assert!(scan_human_actions("[JAT:HUMAN_ACTION no json]").is_empty());
    }

    #[test]
    fn test_decode_human_action_errors() {
        assert!(matches!(
            decode_human_action("[1,2]"),
            Err(MarkerError::InvalidShape { .. })
        ));
        assert!(matches!(
            decode_human_action(r#"{"title":"  "}"#),
            Err(MarkerError::MissingField { field: "title" })
        ));
        assert!(matches!(
            decode_human_action(r#"{"title":5}"#),
            Err(MarkerError::MissingField { field: "title" })
        ));
        assert!(matches!(
            decode_human_action("{nope}"),
            Err(MarkerError::InvalidJson(_))
        ));
    }

    // ── inline_payload ─────────────────────────────────────────────

    #[test]
    fn test_inline_payload_tolerates_whitespace() {
        let buf = "[JAT:HUMAN_ACTION \n  {\"title\":\"t\"} ]";
        let payload = inline_payload(buf, 0, HUMAN_ACTION_TAG).unwrap();
        assert_eq!(payload.json, "{\"title\":\"t\"}");
        assert_eq!(payload.raw, buf);
    }

    #[test]
    fn test_inline_payload_without_closing_bracket() {
        let buf = "[JAT:HUMAN_ACTION {\"title\":\"t\"} trailing";
        let payload = inline_payload(buf, 0, HUMAN_ACTION_TAG).unwrap();
        assert_eq!(payload.raw, "[JAT:HUMAN_ACTION {\"title\":\"t\"}");
    }

    // ── parse_all_markers ──────────────────────────────────────────

    #[test]
    fn test_parse_all_collects_every_type() {
        let buf = concat!(
            "[JAT:WORKING task=jat-1]\n",
            "[JAT:NEEDS_INPUT]\n",
            "[JAT:NEEDS_REVIEW]\n",
            "[JAT:READY actions=merge]\n",
            "[JAT:COMPACTING]\n",
            "[JAT:AUTO_PROCEED]\n",
            "[JAT:COMPLETED]\n",
            "[JAT:IDLE]\n",
            r#"[JAT:HUMAN_ACTION {"title":"t"}]"#,
            "\n",
            r#"[JAT:SUGGESTED_TASKS {"tasks":[{"title":"next"}]}]"#,
        );
        let result = parse_all_markers(buf);
        for kind in MarkerType::ALL {
            assert!(result.get(kind).is_some(), "missing {kind}");
        }
        assert_eq!(result.markers().len(), 10);
    }

    #[test]
    fn test_malformed_marker_isolated() {
        let buf = r#"[JAT:COMPLETED] then [JAT:HUMAN_ACTION {"title":"x""#;
        let result = parse_all_markers(buf);
        assert_eq!(result.completed.as_ref().unwrap().position(), 0);
        assert!(result.human_actions.is_empty());
    }

    #[test]
    fn test_parse_empty_buffer() {
        assert!(parse_all_markers("").is_empty());
    }

    #[test]
    fn test_marker_tags_cover_every_type() {
        for kind in MarkerType::ALL {
            let needle = format!("[JAT:{}", kind.tag());
            assert!(
                MARKER_TAGS.iter().any(|t| t.starts_with(&needle)),
                "no tag for {kind}"
            );
        }
    }
}
