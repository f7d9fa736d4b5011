use tether_core::ids::SessionId;

#[derive(Debug, thiserror::Error)]
pub enum EngineError {
    /// Hard precondition failure: the id is not registered. The only failure
    /// a Prompt call reports to its caller; everything else is absorbed into
    /// the session's own update stream.
    #[error("session not found: {0}")]
    SessionNotFound(SessionId),
}
