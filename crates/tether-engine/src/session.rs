use std::path::PathBuf;

use chrono::{DateTime, Utc};

use tether_core::ids::SessionId;
use tether_core::permission::PermissionMode;
use tether_store::SessionSnapshot;

/// Named once-per-conversation markers. Kept as explicit booleans so the
/// extra states of the prompt machine stay enumerable.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct SessionFlags {
    /// The one-time "turn usage" notice has been emitted.
    pub turn_notice_sent: bool,
}

/// One live conversation between a client and the assistant service.
#[derive(Clone, Debug)]
pub struct Session {
    pub id: SessionId,
    /// Assistant-service resume token. Set the first time a turn reports one,
    /// overwritten whenever a newer one arrives.
    pub continuation: Option<String>,
    pub permission_mode: PermissionMode,
    pub working_dir: PathBuf,
    pub created_at: DateTime<Utc>,
    pub last_accessed_at: DateTime<Utc>,
    pub flags: SessionFlags,
}

impl Session {
    pub fn new(id: SessionId, permission_mode: PermissionMode, working_dir: PathBuf) -> Self {
        let now = Utc::now();
        Self {
            id,
            continuation: None,
            permission_mode,
            working_dir,
            created_at: now,
            last_accessed_at: now,
            flags: SessionFlags::default(),
        }
    }

    /// Reconstruct a session from its durable projection.
    pub fn from_snapshot(snapshot: SessionSnapshot, working_dir: PathBuf) -> Self {
        let turn_notice_sent = snapshot
            .metadata
            .get("turn_notice_sent")
            .and_then(serde_json::Value::as_bool)
            .unwrap_or(false);
        Self {
            id: snapshot.id,
            continuation: snapshot.continuation,
            permission_mode: snapshot.permission_mode,
            working_dir,
            created_at: snapshot.created_at,
            last_accessed_at: snapshot.last_accessed_at,
            flags: SessionFlags { turn_notice_sent },
        }
    }

    pub fn to_snapshot(&self) -> SessionSnapshot {
        SessionSnapshot {
            id: self.id.clone(),
            continuation: self.continuation.clone(),
            permission_mode: self.permission_mode,
            created_at: self.created_at,
            last_accessed_at: self.last_accessed_at,
            metadata: serde_json::json!({
                "turn_notice_sent": self.flags.turn_notice_sent,
            }),
        }
    }

    pub fn touch(&mut self) {
        self.last_accessed_at = Utc::now();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn new_session_is_clean() {
        let session = Session::new(
            SessionId::from_raw("sess_1"),
            PermissionMode::Plan,
            PathBuf::from("/work"),
        );
        assert!(session.continuation.is_none());
        assert_eq!(session.permission_mode, PermissionMode::Plan);
        assert!(!session.flags.turn_notice_sent);
    }

    #[test]
    fn snapshot_roundtrip_preserves_state() {
        let mut session = Session::new(
            SessionId::from_raw("sess_rt"),
            PermissionMode::AcceptEdits,
            PathBuf::from("/work"),
        );
        session.continuation = Some("cont_5".into());
        session.flags.turn_notice_sent = true;

        let restored = Session::from_snapshot(session.to_snapshot(), PathBuf::from("/work"));
        assert_eq!(restored.id, session.id);
        assert_eq!(restored.continuation, session.continuation);
        assert_eq!(restored.permission_mode, session.permission_mode);
        assert_eq!(restored.created_at, session.created_at);
        assert!(restored.flags.turn_notice_sent);
    }

    #[test]
    fn snapshot_without_flag_metadata_defaults_false() {
        let snapshot = SessionSnapshot::new(SessionId::from_raw("sess_m"), PermissionMode::Default);
        let session = Session::from_snapshot(snapshot, PathBuf::from("/work"));
        assert!(!session.flags.turn_notice_sent);
    }

    #[test]
    fn touch_advances_last_access() {
        let mut session = Session::new(
            SessionId::from_raw("sess_t"),
            PermissionMode::Default,
            PathBuf::from("/work"),
        );
        let before = session.last_accessed_at;
        session.touch();
        assert!(session.last_accessed_at >= before);
    }
}
