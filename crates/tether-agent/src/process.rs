//! Subprocess-backed assistant connection.
//!
//! Each turn spawns the assistant executable in streaming mode, writes the
//! prompt to its stdin, and maps stdout JSON lines into `AgentEvent`s.
//! Closing a turn kills the child, which is how the service side learns the
//! turn was abandoned.

use std::path::PathBuf;
use std::process::Stdio;

use async_trait::async_trait;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader, Lines};
use tokio::process::{Child, ChildStdout, Command};
use tracing::{debug, warn};

use tether_core::errors::AgentError;
use tether_core::events::AgentEvent;

use crate::connection::{AgentConnection, TurnRequest, TurnStream};
use crate::wire;

const DEFAULT_EXECUTABLE: &str = "assistant";

/// Production connection: one assistant subprocess per turn.
pub struct CliAgent {
    executable: PathBuf,
}

impl CliAgent {
    pub fn new(executable: Option<PathBuf>) -> Self {
        Self {
            executable: executable.unwrap_or_else(|| PathBuf::from(DEFAULT_EXECUTABLE)),
        }
    }

    fn build_command(&self, request: &TurnRequest) -> Command {
        let mut cmd = Command::new(&self.executable);
        cmd.arg("--print")
            .arg("--output-format")
            .arg("stream-json")
            .arg("--permission-mode")
            .arg(request.permission_mode.as_str());
        if let Some(token) = &request.continuation {
            cmd.arg("--resume").arg(token);
        }
        if let Some(cap) = request.max_turns {
            cmd.arg("--max-turns").arg(cap.to_string());
        }
        cmd.stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);
        cmd
    }
}

#[async_trait]
impl AgentConnection for CliAgent {
    fn name(&self) -> &str {
        "cli"
    }

    async fn start_turn(&self, request: &TurnRequest) -> Result<Box<dyn TurnStream>, AgentError> {
        let mut child = self
            .build_command(request)
            .spawn()
            .map_err(|e| AgentError::LaunchFailed(format!("{}: {e}", self.executable.display())))?;

        let mut stdin = child
            .stdin
            .take()
            .ok_or_else(|| AgentError::LaunchFailed("child stdin unavailable".into()))?;
        let stdout = child
            .stdout
            .take()
            .ok_or_else(|| AgentError::LaunchFailed("child stdout unavailable".into()))?;

        if let Some(stderr) = child.stderr.take() {
            tokio::spawn(async move {
                let mut lines = BufReader::new(stderr).lines();
                while let Ok(Some(line)) = lines.next_line().await {
                    debug!(line = %line, "assistant stderr");
                }
            });
        }

        stdin.write_all(request.prompt.as_bytes()).await?;
        stdin.shutdown().await?;
        drop(stdin);

        Ok(Box::new(ProcessTurn {
            child,
            lines: BufReader::new(stdout).lines(),
            closed: false,
            eof: false,
        }))
    }
}

struct ProcessTurn {
    child: Child,
    lines: Lines<BufReader<ChildStdout>>,
    closed: bool,
    eof: bool,
}

#[async_trait]
impl TurnStream for ProcessTurn {
    async fn next_event(&mut self) -> Option<AgentEvent> {
        if self.closed || self.eof {
            return None;
        }
        loop {
            match self.lines.next_line().await {
                Ok(Some(line)) => {
                    if let Some(event) = wire::parse_line(&line) {
                        return Some(event);
                    }
                    // malformed or blank line, keep reading
                }
                Ok(None) => {
                    self.eof = true;
                    return None;
                }
                Err(e) => {
                    warn!(error = %e, "assistant stdout read failed");
                    self.eof = true;
                    return Some(AgentEvent::Error {
                        message: format!("assistant stream read failed: {e}"),
                    });
                }
            }
        }
    }

    async fn close(&mut self) {
        if self.closed {
            return;
        }
        self.closed = true;
        if let Err(e) = self.child.start_kill() {
            debug!(error = %e, "assistant child already gone");
        }
        let _ = self.child.wait().await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[cfg(unix)]
    fn fake_assistant(script_body: &str) -> PathBuf {
        use std::os::unix::fs::PermissionsExt;

        let dir = std::env::temp_dir().join(format!("tether-agent-{}", unique_suffix()));
        std::fs::create_dir_all(&dir).unwrap();
        let path = dir.join("assistant.sh");
        std::fs::write(&path, format!("#!/bin/sh\n{script_body}\n")).unwrap();
        std::fs::set_permissions(&path, std::fs::Permissions::from_mode(0o755)).unwrap();
        path
    }

    fn unique_suffix() -> String {
        use std::sync::atomic::{AtomicU64, Ordering};
        static N: AtomicU64 = AtomicU64::new(0);
        format!(
            "{}-{}",
            std::process::id(),
            N.fetch_add(1, Ordering::Relaxed)
        )
    }

    #[tokio::test]
    async fn launch_failure_is_typed() {
        let agent = CliAgent::new(Some(PathBuf::from("/nonexistent/assistant-bin")));
        let result = agent.start_turn(&TurnRequest::new("hello")).await;
        match result {
            Err(AgentError::LaunchFailed(msg)) => assert!(msg.contains("assistant-bin")),
            other => panic!("expected LaunchFailed, got {:?}", other.map(|_| ())),
        }
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn streams_events_from_subprocess() {
        let script = fake_assistant(
            r#"cat > /dev/null
printf '%s\n' '{"type":"system","session_id":"cont_7"}'
printf '%s\n' '{"type":"text","text":"hi"}'
printf '%s\n' 'garbage line'
printf '%s\n' '{"type":"result","subtype":"success"}'"#,
        );
        let agent = CliAgent::new(Some(script));
        let mut stream = agent.start_turn(&TurnRequest::new("hello")).await.unwrap();

        let mut events = Vec::new();
        while let Some(evt) = stream.next_event().await {
            events.push(evt);
        }
        stream.close().await;

        // garbage line is skipped, three real events survive
        assert_eq!(events.len(), 3);
        assert!(matches!(events[0], AgentEvent::Envelope { .. }));
        assert!(matches!(events[1], AgentEvent::TextDelta { .. }));
        assert!(matches!(events[2], AgentEvent::Completed));
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn close_terminates_subprocess_early() {
        // sleeps forever after the first event; close must not hang
        let script = fake_assistant(
            r#"cat > /dev/null
printf '%s\n' '{"type":"text","text":"first"}'
sleep 600"#,
        );
        let agent = CliAgent::new(Some(script));
        let mut stream = agent.start_turn(&TurnRequest::new("hello")).await.unwrap();

        let first = stream.next_event().await;
        assert!(matches!(first, Some(AgentEvent::TextDelta { .. })));

        tokio::time::timeout(std::time::Duration::from_secs(5), stream.close())
            .await
            .expect("close must terminate the child promptly");

        assert!(stream.next_event().await.is_none());
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn close_is_idempotent() {
        let script = fake_assistant("cat > /dev/null");
        let agent = CliAgent::new(Some(script));
        let mut stream = agent.start_turn(&TurnRequest::new("x")).await.unwrap();
        stream.close().await;
        stream.close().await;
    }
}
