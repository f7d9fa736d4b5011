use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::ids::ToolCallId;

/// Events yielded by one assistant turn. Ordering contract per turn:
///
/// Envelope → (TextDelta | BlockStart → BlockDelta* → BlockStop |
///             ToolCallStart → (ToolCallOutput | ToolCallError))* → Completed
///
/// A turn may carry several Envelope events (one per assistant message in an
/// agentic loop); each may update the continuation token. Unknown events can
/// appear anywhere and are skipped by consumers.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum AgentEvent {
    /// Message envelope. Carries the service's continuation token when the
    /// service has one to report.
    Envelope { continuation: Option<String> },

    TextDelta { text: String },

    ToolCallStart {
        id: ToolCallId,
        name: String,
        input: Value,
    },
    ToolCallOutput { id: ToolCallId, output: String },
    ToolCallError { id: ToolCallId, error: String },

    BlockStart { kind: BlockKind },
    BlockDelta { text: String },
    BlockStop,

    /// Terminal result marker for the turn.
    Completed,

    /// Stream-level failure reported by the service or the transport.
    Error { message: String },

    /// Anything the wire parser did not recognize. Logged, never surfaced.
    Unknown { raw: Value },
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BlockKind {
    Text,
    Thinking,
}

impl AgentEvent {
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Completed | Self::Error { .. })
    }

    pub fn event_type(&self) -> &'static str {
        match self {
            Self::Envelope { .. } => "envelope",
            Self::TextDelta { .. } => "text_delta",
            Self::ToolCallStart { .. } => "tool_call_start",
            Self::ToolCallOutput { .. } => "tool_call_output",
            Self::ToolCallError { .. } => "tool_call_error",
            Self::BlockStart { .. } => "block_start",
            Self::BlockDelta { .. } => "block_delta",
            Self::BlockStop => "block_stop",
            Self::Completed => "completed",
            Self::Error { .. } => "error",
            Self::Unknown { .. } => "unknown",
        }
    }
}

/// Why a prompt call resolved. Every prompt resolves with one of these; there
/// is no unresolved failure mode visible to the client.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StopReason {
    EndTurn,
    Cancelled,
}
