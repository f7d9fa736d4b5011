//! Assistant event → client update translation.
//!
//! Stateless per event; the tool-call ledger is threaded through so tool
//! lifecycle transitions are recorded as the stream is walked. Updates come
//! out in source-event order, with no batching or reordering.

use serde_json::Value;
use tracing::debug;

use tether_core::events::AgentEvent;
use tether_core::updates::{SessionUpdate, ToolCallStatus, ToolKind};

use crate::ledger::ToolCallLedger;

/// Ordered keyword groups for tool-kind classification. First match wins;
/// order matters because a name can contain keywords from several groups.
const KIND_GROUPS: &[(&[&str], ToolKind)] = &[
    (&["read", "view", "get"], ToolKind::Read),
    (&["write", "create", "update", "edit"], ToolKind::Edit),
    (&["delete", "remove"], ToolKind::Delete),
    (&["move", "rename"], ToolKind::Move),
    (&["search", "find", "grep"], ToolKind::Search),
    (&["run", "execute", "bash"], ToolKind::Execute),
    (&["think", "plan"], ToolKind::Think),
    (&["fetch", "download"], ToolKind::Fetch),
];

/// Classify a tool by case-insensitive substring matching of its name.
pub fn classify_tool_kind(name: &str) -> ToolKind {
    let lower = name.to_lowercase();
    for (keywords, kind) in KIND_GROUPS {
        if keywords.iter().any(|k| lower.contains(k)) {
            return *kind;
        }
    }
    ToolKind::Other
}

/// Translate one assistant event into zero or more client updates.
pub fn translate(event: &AgentEvent, ledger: &mut ToolCallLedger) -> Vec<SessionUpdate> {
    match event {
        // verbatim: the assistant already produces well-formed increments
        AgentEvent::TextDelta { text } | AgentEvent::BlockDelta { text } => {
            vec![SessionUpdate::chunk(text.clone())]
        }

        AgentEvent::ToolCallStart { id, name, input } => {
            ledger.begin(id.clone(), name.clone(), input.clone());
            let mut updates = vec![SessionUpdate::ToolCallCreated {
                id: id.clone(),
                title: name.clone(),
                kind: classify_tool_kind(name),
                status: ToolCallStatus::Pending,
                raw_input: input.clone(),
            }];
            if let Some(rendered) = render_todo_list(name, input) {
                updates.push(SessionUpdate::chunk(rendered));
            }
            updates
        }

        AgentEvent::ToolCallOutput { id, output } => {
            ledger.complete(id);
            vec![SessionUpdate::ToolCallUpdated {
                id: id.clone(),
                status: ToolCallStatus::Completed,
                content: output.clone(),
                raw_output: Some(output.clone()),
            }]
        }

        AgentEvent::ToolCallError { id, error } => {
            ledger.fail(id);
            vec![SessionUpdate::ToolCallUpdated {
                id: id.clone(),
                status: ToolCallStatus::Failed,
                content: error.clone(),
                raw_output: None,
            }]
        }

        // block boundaries are internal markers only
        AgentEvent::BlockStart { .. } | AgentEvent::BlockStop => Vec::new(),

        // consumed by the engine, nothing for the client
        AgentEvent::Envelope { .. } | AgentEvent::Completed | AgentEvent::Error { .. } => {
            Vec::new()
        }

        AgentEvent::Unknown { raw } => {
            debug!(raw = %raw, "unrecognized assistant event skipped");
            Vec::new()
        }
    }
}

/// Render a todo/plan tool input as a glyph-per-item list, when the tool
/// follows the structured list convention.
fn render_todo_list(name: &str, input: &Value) -> Option<String> {
    let lower = name.to_lowercase();
    if !lower.contains("todo") && !lower.contains("plan") {
        return None;
    }
    let items = input
        .get("todos")
        .or_else(|| input.get("items"))?
        .as_array()?;
    if items.is_empty() {
        return None;
    }

    let mut out = String::from("Plan:\n");
    for item in items {
        let label = item
            .get("content")
            .or_else(|| item.get("title"))
            .and_then(Value::as_str)
            .unwrap_or("(unnamed)");
        let glyph = match item.get("status").and_then(Value::as_str) {
            Some("completed") => "[x]",
            Some("in_progress") => "[~]",
            _ => "[ ]",
        };
        out.push_str(&format!("{glyph} {label}\n"));
    }
    Some(out)
}
