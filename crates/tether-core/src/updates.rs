use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::ids::{SessionId, ToolCallId};

/// Coarse classification of a tool call, for client-side iconography.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ToolKind {
    Read,
    Edit,
    Delete,
    Move,
    Search,
    Execute,
    Think,
    Fetch,
    Other,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ToolCallStatus {
    Pending,
    Completed,
    Failed,
}

/// Updates emitted to the control-plane client. Within one session these are
/// delivered in the exact order their source events arrived from the
/// assistant service.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum SessionUpdate {
    MessageChunk {
        text: String,
    },
    ToolCallCreated {
        id: ToolCallId,
        title: String,
        kind: ToolKind,
        status: ToolCallStatus,
        raw_input: Value,
    },
    ToolCallUpdated {
        id: ToolCallId,
        status: ToolCallStatus,
        content: String,
        raw_output: Option<String>,
    },
}

impl SessionUpdate {
    pub fn chunk(text: impl Into<String>) -> Self {
        Self::MessageChunk { text: text.into() }
    }

    pub fn update_type(&self) -> &'static str {
        match self {
            Self::MessageChunk { .. } => "message_chunk",
            Self::ToolCallCreated { .. } => "tool_call_created",
            Self::ToolCallUpdated { .. } => "tool_call_updated",
        }
    }
}

/// A session-addressed update on the outbound channel.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct Outbound {
    pub session_id: SessionId,
    pub update: SessionUpdate,
}
