use std::path::PathBuf;

use serde::{Deserialize, Serialize};

use crate::permission::PermissionMode;

/// Engine configuration, validated by the process bootstrap before the engine
/// runs. The engine consumes it; it never produces or re-validates it.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct EngineConfig {
    /// Maximum assistant turns per prompt. 0 means unlimited.
    pub max_turns: u32,
    /// Permission mode assigned to newly created sessions.
    pub default_permission_mode: PermissionMode,
    /// Override path to the assistant executable. None uses the launcher's
    /// default lookup.
    pub agent_executable: Option<PathBuf>,
    /// Base directory for persisted session snapshots.
    pub store_dir: PathBuf,
}

impl EngineConfig {
    /// The turn cap as an option: None when configured as unlimited, so the
    /// cap is omitted entirely from outbound turn requests.
    pub fn turn_cap(&self) -> Option<u32> {
        (self.max_turns > 0).then_some(self.max_turns)
    }
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            max_turns: 0,
            default_permission_mode: PermissionMode::Default,
            agent_executable: None,
            store_dir: PathBuf::from(".tether/sessions"),
        }
    }
}
