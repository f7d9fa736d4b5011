use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use dashmap::DashMap;
use futures::FutureExt;
use tokio::sync::{mpsc, Mutex};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, instrument, warn};

use tether_agent::{AgentConnection, TurnRequest, TurnStream};
use tether_core::config::EngineConfig;
use tether_core::content::{prompt_text, ContentBlock};
use tether_core::events::{AgentEvent, StopReason};
use tether_core::ids::SessionId;
use tether_core::permission::PermissionMode;
use tether_core::updates::{Outbound, SessionUpdate};
use tether_store::{SessionSnapshot, SnapshotStore};

use crate::budget::{ContextBudget, Role, WarningLevel};
use crate::error::EngineError;
use crate::ledger::ToolCallLedger;
use crate::session::Session;
use crate::translate;

/// Result of a prompt call. Every call resolves with a stop reason; failures
/// inside the turn surface as text updates, not errors.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct PromptOutcome {
    pub stop_reason: StopReason,
}

/// The session orchestrator: owns the registry, drives the per-session
/// prompt state machine, and fans assistant events out through the
/// translator, budget monitor, and persistence store.
pub struct SessionEngine {
    agent: Arc<dyn AgentConnection>,
    store: Arc<SnapshotStore>,
    budget: Arc<ContextBudget>,
    updates: mpsc::Sender<Outbound>,
    config: EngineConfig,
    sessions: DashMap<SessionId, Arc<Mutex<Session>>>,
    /// Cancellation handles for in-flight prompts, one per session at most.
    active: DashMap<SessionId, CancellationToken>,
}

impl SessionEngine {
    pub fn new(
        agent: Arc<dyn AgentConnection>,
        store: Arc<SnapshotStore>,
        budget: Arc<ContextBudget>,
        updates: mpsc::Sender<Outbound>,
        config: EngineConfig,
    ) -> Self {
        Self {
            agent,
            store,
            budget,
            updates,
            config,
            sessions: DashMap::new(),
            active: DashMap::new(),
        }
    }

    /// Register a fresh session and persist its initial snapshot. Persistence
    /// is best-effort: an I/O failure is logged and the in-memory session
    /// stays usable.
    #[instrument(skip(self, working_dir))]
    pub fn create_session(&self, working_dir: PathBuf) -> SessionId {
        let session = Session::new(
            SessionId::new(),
            self.config.default_permission_mode,
            working_dir,
        );
        let id = session.id.clone();
        self.persist(&session);
        self.sessions
            .insert(id.clone(), Arc::new(Mutex::new(session)));
        info!(session_id = %id, "session created");
        id
    }

    /// Make an externally remembered id usable. Already registered: no-op,
    /// the live continuation token is preserved. Otherwise restore from
    /// snapshot, or start fresh when none exists, so a restarted process
    /// still accepts traffic for ids the client remembers.
    #[instrument(skip(self, working_dir), fields(session_id = %session_id))]
    pub fn load_session(&self, session_id: &SessionId, working_dir: PathBuf) {
        if self.sessions.contains_key(session_id) {
            debug!("session already registered");
            return;
        }
        let session = match self.store.load(session_id) {
            Some(snapshot) => {
                debug!("session restored from snapshot");
                Session::from_snapshot(snapshot, working_dir)
            }
            None => {
                debug!("no snapshot on disk, starting fresh");
                Session::new(
                    session_id.clone(),
                    self.config.default_permission_mode,
                    working_dir,
                )
            }
        };
        self.sessions
            .entry(session_id.clone())
            .or_insert_with(|| Arc::new(Mutex::new(session)));
    }

    /// Signal cancellation of the session's active prompt, if any. Idempotent.
    pub fn cancel(&self, session_id: &SessionId) {
        if let Some((_, token)) = self.active.remove(session_id) {
            info!(session_id = %session_id, "cancelling active prompt");
            token.cancel();
        }
    }

    /// Run one prompt through the session. See the module-level state
    /// machine: any still-active prompt on this session is displaced first,
    /// and every exit path clears the active handle and persists a snapshot.
    #[instrument(skip(self, blocks), fields(session_id = %session_id))]
    pub async fn prompt(
        &self,
        session_id: &SessionId,
        blocks: &[ContentBlock],
    ) -> Result<PromptOutcome, EngineError> {
        let session_arc = self
            .sessions
            .get(session_id)
            .map(|entry| Arc::clone(entry.value()))
            .ok_or_else(|| EngineError::SessionNotFound(session_id.clone()))?;

        // At-most-one-in-flight: displace the previous prompt before taking
        // the session lock; it observes the cancellation at its next yield
        // and releases the lock to us.
        if let Some((_, previous)) = self.active.remove(session_id) {
            debug!("displacing active prompt");
            previous.cancel();
        }

        let mut session = session_arc.lock().await;

        let cancel = CancellationToken::new();
        self.active.insert(session_id.clone(), cancel.clone());

        // Catch-all: a panicking turn must not leave the session wedged as
        // busy or skip the snapshot write.
        let outcome = std::panic::AssertUnwindSafe(self.run_prompt(&mut session, blocks, &cancel))
            .catch_unwind()
            .await;
        let stop_reason = match outcome {
            Ok(stop) => stop,
            Err(panic) => {
                error!(panic = %panic_message(&panic), "prompt execution panicked");
                self.emit(
                    session_id,
                    SessionUpdate::chunk("Internal error while processing this turn"),
                )
                .await;
                StopReason::EndTurn
            }
        };

        self.active.remove(session_id);
        session.touch();
        self.persist(&session);

        Ok(PromptOutcome { stop_reason })
    }

    /// The prompt body. Infallible by design: everything that can go wrong
    /// mid-turn is absorbed into the session's update stream.
    async fn run_prompt(
        &self,
        session: &mut Session,
        blocks: &[ContentBlock],
        cancel: &CancellationToken,
    ) -> StopReason {
        let prompt = prompt_text(blocks);

        if let Some(warning) = self.budget.track_message(&session.id, &prompt, Role::User) {
            debug!(level = ?warning.level, usage = warning.usage, "context budget threshold");
            if warning.level == WarningLevel::Critical {
                let text = match &warning.suggestion {
                    Some(s) => format!("{}. {}", warning.message, s),
                    None => warning.message.clone(),
                };
                self.emit(&session.id, SessionUpdate::chunk(text)).await;
            }
        }

        if let Some(mode) = PermissionMode::scan(&prompt) {
            if mode != session.permission_mode {
                info!(mode = %mode, "permission mode switched by prompt directive");
                session.permission_mode = mode;
            }
        }

        let request = TurnRequest {
            prompt,
            continuation: session.continuation.clone(),
            permission_mode: session.permission_mode,
            max_turns: self.config.turn_cap(),
        };
        let mut stream = match self.agent.start_turn(&request).await {
            Ok(stream) => stream,
            Err(e) => {
                warn!(kind = e.error_kind(), error = %e, "assistant turn failed to start");
                self.emit(
                    &session.id,
                    SessionUpdate::chunk(format!("The assistant is unavailable: {e}")),
                )
                .await;
                return StopReason::EndTurn;
            }
        };

        let mut ledger = ToolCallLedger::new();
        let mut turns = 0u32;
        let mut assistant_text = String::new();

        let stop = loop {
            let event = tokio::select! {
                _ = cancel.cancelled() => {
                    // notify the service the turn was abandoned, not merely
                    // stop reading it
                    stream.close().await;
                    break StopReason::Cancelled;
                }
                event = stream.next_event() => match event {
                    Some(event) => event,
                    None => break StopReason::EndTurn,
                },
            };

            match &event {
                AgentEvent::Envelope { continuation } => {
                    turns += 1;
                    if let Some(token) = continuation {
                        if session.continuation.as_deref() != Some(token.as_str()) {
                            session.continuation = Some(token.clone());
                            // persist immediately: a crash mid-turn must still
                            // be resumable from the last known point
                            self.persist(session);
                        }
                    }
                    if let Some(cap) = self.config.turn_cap() {
                        if !session.flags.turn_notice_sent
                            && f64::from(turns) >= f64::from(cap) * 0.8
                        {
                            session.flags.turn_notice_sent = true;
                            self.emit(
                                &session.id,
                                SessionUpdate::chunk(format!(
                                    "Note: {turns} of {cap} allowed assistant turns used in this conversation."
                                )),
                            )
                            .await;
                        }
                    }
                }
                AgentEvent::TextDelta { text } | AgentEvent::BlockDelta { text } => {
                    assistant_text.push_str(text);
                }
                AgentEvent::Error { message } => {
                    stream.close().await;
                    if cancel.is_cancelled() {
                        break StopReason::Cancelled;
                    }
                    warn!(error = %message, "assistant stream error absorbed");
                    self.emit(
                        &session.id,
                        SessionUpdate::chunk(format!("The assistant reported an error: {message}")),
                    )
                    .await;
                    break StopReason::EndTurn;
                }
                _ => {}
            }

            for update in translate::translate(&event, &mut ledger) {
                self.emit(&session.id, update).await;
            }
        };

        if stop == StopReason::EndTurn && !assistant_text.is_empty() {
            let _ = self
                .budget
                .track_message(&session.id, &assistant_text, Role::Assistant);
        }
        if ledger.pending_count() > 0 {
            debug!(pending = ledger.pending_count(), "turn ended with unresolved tool calls");
        }
        stop
    }

    /// Retention pass: snapshot store sweep, stale budget stats, and idle
    /// in-memory sessions. Sessions with an active prompt are never evicted.
    pub fn housekeeping(&self, max_age: Duration, max_count: usize) -> usize {
        let report = self.store.cleanup(max_age, max_count);
        if report.failed > 0 {
            warn!(failed = report.failed, "retention sweep had failures");
        }
        let stats = self.budget.cleanup_old(max_age);
        let evicted = self.evict_idle(max_age);
        debug!(
            snapshots = report.evicted,
            stats, sessions = evicted, "housekeeping pass complete"
        );
        report.evicted + stats + evicted
    }

    fn evict_idle(&self, max_age: Duration) -> usize {
        let cutoff = chrono::Utc::now()
            - chrono::Duration::from_std(max_age).unwrap_or_else(|_| chrono::Duration::days(365));
        let before = self.sessions.len();
        self.sessions.retain(|id, session| {
            if self.active.contains_key(id) {
                return true;
            }
            match session.try_lock() {
                // locked means a prompt is running right now
                Err(_) => true,
                Ok(guard) => guard.last_accessed_at >= cutoff,
            }
        });
        before - self.sessions.len()
    }

    pub fn is_prompting(&self, session_id: &SessionId) -> bool {
        self.active.contains_key(session_id)
    }

    pub fn session_count(&self) -> usize {
        self.sessions.len()
    }

    /// Current durable projection of a registered session.
    pub async fn snapshot_of(&self, session_id: &SessionId) -> Option<SessionSnapshot> {
        let session_arc = self
            .sessions
            .get(session_id)
            .map(|entry| Arc::clone(entry.value()))?;
        let session = session_arc.lock().await;
        Some(session.to_snapshot())
    }

    fn persist(&self, session: &Session) {
        if let Err(e) = self.store.save(&session.to_snapshot()) {
            error!(session_id = %session.id, error = %e, "snapshot write failed — continuing in memory");
        }
    }

    async fn emit(&self, session_id: &SessionId, update: SessionUpdate) {
        let outbound = Outbound {
            session_id: session_id.clone(),
            update,
        };
        if self.updates.send(outbound).await.is_err() {
            warn!("client update channel closed — update dropped");
        }
    }
}

fn panic_message(panic: &Box<dyn std::any::Any + Send>) -> String {
    panic
        .downcast_ref::<String>()
        .map(|s| s.as_str())
        .or_else(|| panic.downcast_ref::<&str>().copied())
        .unwrap_or("unknown panic")
        .to_string()
}
