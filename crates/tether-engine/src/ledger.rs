use std::collections::HashMap;

use chrono::{DateTime, Utc};
use serde_json::Value;
use tracing::warn;

use tether_core::ids::ToolCallId;
use tether_core::updates::ToolCallStatus;

/// Lifecycle record of one tool invocation inside a prompt turn.
#[derive(Clone, Debug)]
pub struct ToolCallRecord {
    pub id: ToolCallId,
    pub title: String,
    pub input: Value,
    pub status: ToolCallStatus,
    pub started_at: DateTime<Utc>,
    pub completed_at: Option<DateTime<Utc>>,
}

impl ToolCallRecord {
    pub fn duration_ms(&self) -> Option<i64> {
        self.completed_at
            .map(|done| (done - self.started_at).num_milliseconds())
    }
}

/// Tracks in-flight tool invocations for one prompt turn, keyed by the
/// service-assigned id. A record transitions to a terminal state exactly
/// once and is never recreated afterwards.
#[derive(Debug, Default)]
pub struct ToolCallLedger {
    records: HashMap<ToolCallId, ToolCallRecord>,
}

impl ToolCallLedger {
    pub fn new() -> Self {
        Self::default()
    }

    /// Open a record in `pending` state. A duplicate start for an existing id
    /// is ignored.
    pub fn begin(&mut self, id: ToolCallId, title: impl Into<String>, input: Value) {
        if self.records.contains_key(&id) {
            warn!(tool_call_id = %id, "duplicate tool call start ignored");
            return;
        }
        self.records.insert(
            id.clone(),
            ToolCallRecord {
                id,
                title: title.into(),
                input,
                status: ToolCallStatus::Pending,
                started_at: Utc::now(),
                completed_at: None,
            },
        );
    }

    pub fn complete(&mut self, id: &ToolCallId) -> bool {
        self.finish(id, ToolCallStatus::Completed)
    }

    pub fn fail(&mut self, id: &ToolCallId) -> bool {
        self.finish(id, ToolCallStatus::Failed)
    }

    fn finish(&mut self, id: &ToolCallId, status: ToolCallStatus) -> bool {
        match self.records.get_mut(id) {
            Some(record) if record.status == ToolCallStatus::Pending => {
                record.status = status;
                record.completed_at = Some(Utc::now());
                true
            }
            Some(record) => {
                warn!(tool_call_id = %id, status = ?record.status, "tool call already terminal");
                false
            }
            None => {
                warn!(tool_call_id = %id, "result for unknown tool call");
                false
            }
        }
    }

    pub fn get(&self, id: &ToolCallId) -> Option<&ToolCallRecord> {
        self.records.get(id)
    }

    pub fn pending_count(&self) -> usize {
        self.records
            .values()
            .filter(|r| r.status == ToolCallStatus::Pending)
            .count()
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }
}
