//! JSON-lines wire format of the assistant service's event stream.
//!
//! Each stdout line is one JSON object tagged by `type`. Malformed lines and
//! unrecognized types never abort a turn: the former are dropped with a log,
//! the latter surface as `AgentEvent::Unknown` so the engine can log them.

use serde::Deserialize;
use serde_json::Value;
use tracing::debug;

use tether_core::events::{AgentEvent, BlockKind};
use tether_core::ids::ToolCallId;

#[derive(Deserialize)]
struct EnvelopeLine {
    #[serde(default)]
    session_id: Option<String>,
}

#[derive(Deserialize)]
struct TextLine {
    text: String,
}

#[derive(Deserialize)]
struct ToolUseLine {
    id: String,
    name: String,
    #[serde(default)]
    input: Value,
}

#[derive(Deserialize)]
struct ToolResultLine {
    id: String,
    #[serde(default)]
    output: String,
}

#[derive(Deserialize)]
struct ToolErrorLine {
    id: String,
    #[serde(default)]
    error: String,
}

#[derive(Deserialize)]
struct BlockStartLine {
    #[serde(default)]
    block_type: Option<String>,
}

/// Parse one wire line. Returns None for blank or malformed input.
pub fn parse_line(line: &str) -> Option<AgentEvent> {
    let line = line.trim();
    if line.is_empty() {
        return None;
    }

    let value: Value = match serde_json::from_str(line) {
        Ok(v) => v,
        Err(e) => {
            debug!(error = %e, "dropping malformed wire line");
            return None;
        }
    };

    let event_type = value.get("type").and_then(Value::as_str).unwrap_or("");
    let event = match event_type {
        "system" | "message_start" => {
            let env: EnvelopeLine = from_value_or_log(&value)?;
            AgentEvent::Envelope {
                continuation: env.session_id,
            }
        }
        "text" => {
            let t: TextLine = from_value_or_log(&value)?;
            AgentEvent::TextDelta { text: t.text }
        }
        "tool_use" => {
            let t: ToolUseLine = from_value_or_log(&value)?;
            AgentEvent::ToolCallStart {
                id: ToolCallId::from_raw(t.id),
                name: t.name,
                input: t.input,
            }
        }
        "tool_result" => {
            let t: ToolResultLine = from_value_or_log(&value)?;
            AgentEvent::ToolCallOutput {
                id: ToolCallId::from_raw(t.id),
                output: t.output,
            }
        }
        "tool_error" => {
            let t: ToolErrorLine = from_value_or_log(&value)?;
            AgentEvent::ToolCallError {
                id: ToolCallId::from_raw(t.id),
                error: t.error,
            }
        }
        "content_block_start" => {
            let b: BlockStartLine = from_value_or_log(&value)?;
            let kind = match b.block_type.as_deref() {
                Some("thinking") => BlockKind::Thinking,
                _ => BlockKind::Text,
            };
            AgentEvent::BlockStart { kind }
        }
        "content_block_delta" => {
            let t: TextLine = from_value_or_log(&value)?;
            AgentEvent::BlockDelta { text: t.text }
        }
        "content_block_stop" => AgentEvent::BlockStop,
        "result" => AgentEvent::Completed,
        "error" => AgentEvent::Error {
            message: value
                .get("message")
                .and_then(Value::as_str)
                .unwrap_or("assistant reported an error")
                .to_string(),
        },
        other => {
            debug!(event_type = other, "unrecognized wire event");
            AgentEvent::Unknown { raw: value }
        }
    };

    Some(event)
}

fn from_value_or_log<T: serde::de::DeserializeOwned>(value: &Value) -> Option<T> {
    match serde_json::from_value(value.clone()) {
        Ok(t) => Some(t),
        Err(e) => {
            debug!(error = %e, "dropping wire line with unexpected payload shape");
            None
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_envelope_with_continuation() {
        let evt = parse_line(r#"{"type":"system","session_id":"cont_1"}"#).unwrap();
        match evt {
            AgentEvent::Envelope { continuation } => {
                assert_eq!(continuation.as_deref(), Some("cont_1"));
            }
            other => panic!("expected envelope, got {other:?}"),
        }
    }

    #[test]
    fn parses_envelope_without_continuation() {
        let evt = parse_line(r#"{"type":"message_start"}"#).unwrap();
        assert!(matches!(evt, AgentEvent::Envelope { continuation: None }));
    }

    #[test]
    fn parses_text_delta() {
        let evt = parse_line(r#"{"type":"text","text":"hi"}"#).unwrap();
        match evt {
            AgentEvent::TextDelta { text } => assert_eq!(text, "hi"),
            other => panic!("expected text delta, got {other:?}"),
        }
    }

    #[test]
    fn parses_tool_triad() {
        let start =
            parse_line(r#"{"type":"tool_use","id":"t1","name":"Bash","input":{"command":"ls"}}"#)
                .unwrap();
        match start {
            AgentEvent::ToolCallStart { id, name, input } => {
                assert_eq!(id.as_str(), "t1");
                assert_eq!(name, "Bash");
                assert_eq!(input["command"], "ls");
            }
            other => panic!("expected tool start, got {other:?}"),
        }

        let output = parse_line(r#"{"type":"tool_result","id":"t1","output":"done"}"#).unwrap();
        assert!(matches!(output, AgentEvent::ToolCallOutput { .. }));

        let error = parse_line(r#"{"type":"tool_error","id":"t1","error":"boom"}"#).unwrap();
        assert!(matches!(error, AgentEvent::ToolCallError { .. }));
    }

    #[test]
    fn parses_block_triad() {
        let start = parse_line(r#"{"type":"content_block_start","block_type":"text"}"#).unwrap();
        assert!(matches!(
            start,
            AgentEvent::BlockStart { kind: BlockKind::Text }
        ));

        let thinking =
            parse_line(r#"{"type":"content_block_start","block_type":"thinking"}"#).unwrap();
        assert!(matches!(
            thinking,
            AgentEvent::BlockStart { kind: BlockKind::Thinking }
        ));

        let delta = parse_line(r#"{"type":"content_block_delta","text":"frag"}"#).unwrap();
        assert!(matches!(delta, AgentEvent::BlockDelta { .. }));

        let stop = parse_line(r#"{"type":"content_block_stop"}"#).unwrap();
        assert!(matches!(stop, AgentEvent::BlockStop));
    }

    #[test]
    fn parses_result_marker() {
        let evt = parse_line(r#"{"type":"result","subtype":"success"}"#).unwrap();
        assert!(matches!(evt, AgentEvent::Completed));
    }

    #[test]
    fn parses_error_event() {
        let evt = parse_line(r#"{"type":"error","message":"overloaded"}"#).unwrap();
        match evt {
            AgentEvent::Error { message } => assert_eq!(message, "overloaded"),
            other => panic!("expected error, got {other:?}"),
        }
    }

    #[test]
    fn unknown_type_surfaces_raw() {
        let evt = parse_line(r#"{"type":"telemetry","n":1}"#).unwrap();
        match evt {
            AgentEvent::Unknown { raw } => assert_eq!(raw["n"], 1),
            other => panic!("expected unknown, got {other:?}"),
        }
    }

    #[test]
    fn malformed_line_dropped() {
        assert!(parse_line("not json at all").is_none());
        assert!(parse_line("").is_none());
        assert!(parse_line("   ").is_none());
    }

    #[test]
    fn wrong_payload_shape_dropped() {
        // tool_use without an id does not parse into a tool event
        assert!(parse_line(r#"{"type":"tool_use","name":"Bash"}"#).is_none());
    }
}
