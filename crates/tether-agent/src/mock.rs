use std::collections::VecDeque;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use parking_lot::Mutex;

use tether_core::errors::AgentError;
use tether_core::events::AgentEvent;

use crate::connection::{AgentConnection, TurnRequest, TurnStream};

/// Pre-programmed turns for deterministic testing without a subprocess.
pub enum MockTurn {
    /// Yield a sequence of events.
    Events(Vec<AgentEvent>),
    /// Yield events, sleeping before each one (lets tests cancel mid-stream).
    Paced(Duration, Vec<AgentEvent>),
    /// Fail the start_turn call itself.
    StartError(AgentError),
}

impl MockTurn {
    /// A turn that streams one text fragment and completes, reporting no
    /// continuation token.
    pub fn text(text: &str) -> Self {
        Self::Events(vec![
            AgentEvent::TextDelta { text: text.into() },
            AgentEvent::Completed,
        ])
    }

    /// Like `text`, but the turn's envelope reports a continuation token.
    pub fn text_with_continuation(text: &str, token: &str) -> Self {
        Self::Events(vec![
            AgentEvent::Envelope {
                continuation: Some(token.into()),
            },
            AgentEvent::TextDelta { text: text.into() },
            AgentEvent::Completed,
        ])
    }

    /// A turn that fails mid-stream after yielding nothing useful.
    pub fn stream_error(message: &str) -> Self {
        Self::Events(vec![AgentEvent::Error {
            message: message.into(),
        }])
    }
}

/// Mock connection that hands out scripted turns in sequence and records
/// every request and close for assertions.
pub struct MockAgent {
    turns: Mutex<VecDeque<MockTurn>>,
    requests: Mutex<Vec<TurnRequest>>,
    started: AtomicUsize,
    closed: Arc<AtomicUsize>,
}

impl MockAgent {
    pub fn new(turns: Vec<MockTurn>) -> Self {
        Self {
            turns: Mutex::new(turns.into()),
            requests: Mutex::new(Vec::new()),
            started: AtomicUsize::new(0),
            closed: Arc::new(AtomicUsize::new(0)),
        }
    }

    pub fn started_count(&self) -> usize {
        self.started.load(Ordering::Relaxed)
    }

    /// How many turn streams were explicitly closed before exhaustion.
    pub fn closed_count(&self) -> usize {
        self.closed.load(Ordering::Relaxed)
    }

    /// Requests observed so far, in order.
    pub fn requests(&self) -> Vec<TurnRequest> {
        self.requests.lock().clone()
    }
}

#[async_trait]
impl AgentConnection for MockAgent {
    fn name(&self) -> &str {
        "mock"
    }

    async fn start_turn(&self, request: &TurnRequest) -> Result<Box<dyn TurnStream>, AgentError> {
        self.requests.lock().push(request.clone());
        self.started.fetch_add(1, Ordering::Relaxed);

        let turn = self.turns.lock().pop_front().ok_or_else(|| {
            AgentError::InvalidRequest(format!(
                "MockAgent: no turn scripted for call {}",
                self.started_count()
            ))
        })?;

        let (pace, events) = match turn {
            MockTurn::Events(events) => (None, events),
            MockTurn::Paced(pace, events) => (Some(pace), events),
            MockTurn::StartError(e) => return Err(e),
        };

        Ok(Box::new(MockStream {
            events: events.into(),
            pace,
            closed: Arc::clone(&self.closed),
            was_closed: false,
        }))
    }
}

struct MockStream {
    events: VecDeque<AgentEvent>,
    pace: Option<Duration>,
    closed: Arc<AtomicUsize>,
    was_closed: bool,
}

#[async_trait]
impl TurnStream for MockStream {
    async fn next_event(&mut self) -> Option<AgentEvent> {
        if self.was_closed {
            return None;
        }
        if let Some(pace) = self.pace {
            tokio::time::sleep(pace).await;
        }
        self.events.pop_front()
    }

    async fn close(&mut self) {
        if !self.was_closed {
            self.was_closed = true;
            self.closed.fetch_add(1, Ordering::Relaxed);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    async fn drain(stream: &mut Box<dyn TurnStream>) -> Vec<AgentEvent> {
        let mut events = Vec::new();
        while let Some(evt) = stream.next_event().await {
            events.push(evt);
        }
        events
    }

    #[tokio::test]
    async fn text_turn_yields_delta_then_completed() {
        let agent = MockAgent::new(vec![MockTurn::text("hi")]);
        let mut stream = agent.start_turn(&TurnRequest::new("hello")).await.unwrap();
        let events = drain(&mut stream).await;
        assert_eq!(events.len(), 2);
        assert!(matches!(events[0], AgentEvent::TextDelta { .. }));
        assert!(matches!(events[1], AgentEvent::Completed));
    }

    #[tokio::test]
    async fn turns_are_consumed_in_sequence() {
        let agent = MockAgent::new(vec![MockTurn::text("first"), MockTurn::text("second")]);
        let _ = agent.start_turn(&TurnRequest::new("a")).await.unwrap();
        let _ = agent.start_turn(&TurnRequest::new("b")).await.unwrap();
        assert_eq!(agent.started_count(), 2);

        let exhausted = agent.start_turn(&TurnRequest::new("c")).await;
        assert!(exhausted.is_err());
    }

    #[tokio::test]
    async fn start_error_propagates() {
        let agent = MockAgent::new(vec![MockTurn::StartError(AgentError::LaunchFailed(
            "scripted".into(),
        ))]);
        let result = agent.start_turn(&TurnRequest::new("x")).await;
        assert!(matches!(result, Err(AgentError::LaunchFailed(_))));
    }

    #[tokio::test]
    async fn close_is_recorded_and_stops_stream() {
        let agent = MockAgent::new(vec![MockTurn::text("hi")]);
        let mut stream = agent.start_turn(&TurnRequest::new("x")).await.unwrap();
        stream.close().await;
        stream.close().await;
        assert!(stream.next_event().await.is_none());
        assert_eq!(agent.closed_count(), 1);
    }

    #[tokio::test]
    async fn requests_are_recorded() {
        let agent = MockAgent::new(vec![MockTurn::text("ok")]);
        let mut req = TurnRequest::new("prompt text");
        req.continuation = Some("cont_9".into());
        let _ = agent.start_turn(&req).await.unwrap();

        let seen = agent.requests();
        assert_eq!(seen.len(), 1);
        assert_eq!(seen[0].prompt, "prompt text");
        assert_eq!(seen[0].continuation.as_deref(), Some("cont_9"));
    }

    #[tokio::test]
    async fn paced_turn_sleeps_between_events() {
        tokio::time::pause();
        let agent = MockAgent::new(vec![MockTurn::Paced(
            Duration::from_millis(100),
            vec![AgentEvent::TextDelta { text: "slow".into() }, AgentEvent::Completed],
        )]);
        let mut stream = agent.start_turn(&TurnRequest::new("x")).await.unwrap();

        let first = tokio::spawn(async move {
            let evt = stream.next_event().await;
            (evt, stream)
        });
        tokio::time::advance(Duration::from_millis(100)).await;
        let (evt, _stream) = first.await.unwrap();
        assert!(matches!(evt, Some(AgentEvent::TextDelta { .. })));
    }
}
