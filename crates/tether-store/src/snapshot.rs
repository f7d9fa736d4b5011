use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use tether_core::ids::SessionId;
use tether_core::permission::PermissionMode;

/// Durable projection of a session. Written as a unit; a reader never sees a
/// partially written record (see `SnapshotStore::save`).
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct SessionSnapshot {
    pub id: SessionId,
    pub continuation: Option<String>,
    pub permission_mode: PermissionMode,
    pub created_at: DateTime<Utc>,
    pub last_accessed_at: DateTime<Utc>,
    /// Opaque metadata bag (flag markers and the like).
    #[serde(default)]
    pub metadata: Value,
}

impl SessionSnapshot {
    pub fn new(id: SessionId, permission_mode: PermissionMode) -> Self {
        let now = Utc::now();
        Self {
            id,
            continuation: None,
            permission_mode,
            created_at: now,
            last_accessed_at: now,
            metadata: Value::Null,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn new_snapshot_has_no_continuation() {
        let snap = SessionSnapshot::new(SessionId::new(), PermissionMode::Plan);
        assert!(snap.continuation.is_none());
        assert_eq!(snap.permission_mode, PermissionMode::Plan);
        assert_eq!(snap.created_at, snap.last_accessed_at);
    }

    #[test]
    fn serde_roundtrip_preserves_all_fields() {
        let mut snap = SessionSnapshot::new(SessionId::from_raw("sess_x"), PermissionMode::AcceptEdits);
        snap.continuation = Some("cont_42".into());
        snap.metadata = serde_json::json!({"turn_notice_sent": true});

        let json = serde_json::to_string(&snap).unwrap();
        let parsed: SessionSnapshot = serde_json::from_str(&json).unwrap();
        assert_eq!(parsed.id, snap.id);
        assert_eq!(parsed.continuation, snap.continuation);
        assert_eq!(parsed.permission_mode, snap.permission_mode);
        assert_eq!(parsed.created_at, snap.created_at);
        assert_eq!(parsed.last_accessed_at, snap.last_accessed_at);
        assert_eq!(parsed.metadata, snap.metadata);
    }

    #[test]
    fn missing_metadata_defaults_to_null() {
        let json = r#"{
            "id": "sess_y",
            "continuation": null,
            "permission_mode": "default",
            "created_at": "2026-08-01T00:00:00Z",
            "last_accessed_at": "2026-08-01T00:00:00Z"
        }"#;
        let parsed: SessionSnapshot = serde_json::from_str(json).unwrap();
        assert!(parsed.metadata.is_null());
    }
}
