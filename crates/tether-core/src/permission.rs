use serde::{Deserialize, Serialize};

/// Permission mode governing what the assistant may do without asking.
/// Wire names follow the control protocol: `default`, `acceptEdits`,
/// `bypassPermissions`, `plan`.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum PermissionMode {
    #[default]
    Default,
    AcceptEdits,
    BypassPermissions,
    Plan,
}

impl PermissionMode {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Default => "default",
            Self::AcceptEdits => "acceptEdits",
            Self::BypassPermissions => "bypassPermissions",
            Self::Plan => "plan",
        }
    }

    /// In-prompt directive marker for this mode. Embedding one of these exact
    /// substrings in a prompt switches the session's mode mid-conversation
    /// without a separate protocol message.
    pub fn marker(&self) -> &'static str {
        match self {
            Self::Default => "[[permission:default]]",
            Self::AcceptEdits => "[[permission:acceptEdits]]",
            Self::BypassPermissions => "[[permission:bypassPermissions]]",
            Self::Plan => "[[permission:plan]]",
        }
    }

    /// Scan a prompt for directive markers. The last marker present wins.
    pub fn scan(prompt: &str) -> Option<Self> {
        const ALL: [PermissionMode; 4] = [
            PermissionMode::Default,
            PermissionMode::AcceptEdits,
            PermissionMode::BypassPermissions,
            PermissionMode::Plan,
        ];
        ALL.iter()
            .filter_map(|mode| prompt.rfind(mode.marker()).map(|pos| (pos, *mode)))
            .max_by_key(|(pos, _)| *pos)
            .map(|(_, mode)| mode)
    }
}

impl std::fmt::Display for PermissionMode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for PermissionMode {
    type Err = String;
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "default" => Ok(Self::Default),
            "acceptEdits" => Ok(Self::AcceptEdits),
            "bypassPermissions" => Ok(Self::BypassPermissions),
            "plan" => Ok(Self::Plan),
            other => Err(format!("unknown permission mode: {other}")),
        }
    }
}
