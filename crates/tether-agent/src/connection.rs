use async_trait::async_trait;

use tether_core::errors::AgentError;
use tether_core::events::AgentEvent;
use tether_core::permission::PermissionMode;

/// One outbound turn to the assistant service.
#[derive(Clone, Debug)]
pub struct TurnRequest {
    pub prompt: String,
    /// Continuation token from a prior turn. None on the first turn of a
    /// conversation.
    pub continuation: Option<String>,
    pub permission_mode: PermissionMode,
    /// Turn cap. None when the cap is configured as unlimited; in that case
    /// no cap is sent to the service at all.
    pub max_turns: Option<u32>,
}

impl TurnRequest {
    pub fn new(prompt: impl Into<String>) -> Self {
        Self {
            prompt: prompt.into(),
            continuation: None,
            permission_mode: PermissionMode::Default,
            max_turns: None,
        }
    }
}

/// A live, cancellable event sequence for one turn.
///
/// The consumer may stop reading at any point; `close` must then be called so
/// the service side learns the turn was abandoned and can free resources.
/// Dropping without `close` is a leak on the service side, not just ours.
#[async_trait]
pub trait TurnStream: Send {
    /// Next event, or None once the sequence is exhausted.
    async fn next_event(&mut self) -> Option<AgentEvent>;

    /// Explicit early termination. Idempotent.
    async fn close(&mut self);
}

/// The assistant-service boundary.
#[async_trait]
pub trait AgentConnection: Send + Sync {
    fn name(&self) -> &str;

    async fn start_turn(&self, request: &TurnRequest) -> Result<Box<dyn TurnStream>, AgentError>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn turn_request_defaults() {
        let req = TurnRequest::new("hello");
        assert_eq!(req.prompt, "hello");
        assert!(req.continuation.is_none());
        assert_eq!(req.permission_mode, PermissionMode::Default);
        assert!(req.max_turns.is_none());
    }
}
