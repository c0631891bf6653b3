use std::collections::HashMap;
use std::process::Stdio;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use tokio::io::{AsyncBufReadExt, AsyncRead, BufReader};
use tokio::process::Command;
use tokio::sync::broadcast;
use tracing::{info, warn};

use crate::error::{Error, Result};
use crate::outbound::OutboundMessage;

pub const DEFAULT_GRACE: Duration = Duration::from_secs(5);

/// Whether a child is a one-shot pipeline or the long-lived dev server;
/// decides which message family its lifecycle emits
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProcessKind {
    Pipeline,
    DevServer,
}

/// Owns long-running external processes. Their stdout/stderr stream
/// line-framed onto the outbound channel, their exit is a terminal
/// message, and shutdown escalates SIGTERM to SIGKILL after a bounded
/// grace so nothing outlives the core.
pub struct ProcessSupervisor {
    outbound: broadcast::Sender<OutboundMessage>,
    /// pipeline id -> pid of the still-running child
    running: Arc<Mutex<HashMap<String, u32>>>,
    grace: Duration,
}

impl ProcessSupervisor {
    pub fn new(outbound: broadcast::Sender<OutboundMessage>) -> Self {
        Self {
            outbound,
            running: Arc::new(Mutex::new(HashMap::new())),
            grace: DEFAULT_GRACE,
        }
    }

    pub fn with_grace(mut self, grace: Duration) -> Self {
        self.grace = grace;
        self
    }

    pub fn running_count(&self) -> usize {
        self.running.lock().unwrap().len()
    }

    /// Spawn a child and stream its output until exit. Returns once the
    /// child is running; the streaming continues in background tasks.
    pub fn start(
        &self,
        pipeline_id: &str,
        kind: ProcessKind,
        program: &str,
        args: &[String],
    ) -> Result<u32> {
        let mut child = Command::new(program)
            .args(args)
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .stdin(Stdio::null())
            .kill_on_drop(true)
            .spawn()
            .map_err(Error::Io)?;

        let pid = child
            .id()
            .ok_or_else(|| Error::Plugin(format!("spawned child {} has no pid", pipeline_id)))?;
        self.running
            .lock()
            .unwrap()
            .insert(pipeline_id.to_string(), pid);

        match kind {
            ProcessKind::Pipeline => {
                let _ = self.outbound.send(OutboundMessage::PipelineStart {
                    pipeline_id: pipeline_id.to_string(),
                    command: format!("{} {}", program, args.join(" ")),
                });
            }
            ProcessKind::DevServer => {
                let _ = self.outbound.send(OutboundMessage::DevServerStarted { pid });
            }
        }
        info!(pipeline_id, pid, "child process started");

        if let Some(stdout) = child.stdout.take() {
            self.stream_lines(pipeline_id, "stdout", stdout);
        }
        if let Some(stderr) = child.stderr.take() {
            self.stream_lines(pipeline_id, "stderr", stderr);
        }

        let outbound = self.outbound.clone();
        let running = Arc::clone(&self.running);
        let id = pipeline_id.to_string();
        tokio::spawn(async move {
            let message = match child.wait().await {
                Ok(status) => {
                    info!(pipeline_id = %id, code = ?status.code(), "child exited");
                    match kind {
                        ProcessKind::Pipeline => OutboundMessage::PipelineComplete {
                            pipeline_id: id.clone(),
                            exit_code: status.code(),
                        },
                        ProcessKind::DevServer => OutboundMessage::DevServerStopped {
                            exit_code: status.code(),
                        },
                    }
                }
                Err(err) => {
                    warn!(pipeline_id = %id, error = %err, "child wait failed");
                    match kind {
                        ProcessKind::Pipeline => OutboundMessage::PipelineError {
                            pipeline_id: id.clone(),
                            message: err.to_string(),
                        },
                        ProcessKind::DevServer => OutboundMessage::DevServerError {
                            message: err.to_string(),
                        },
                    }
                }
            };
            running.lock().unwrap().remove(&id);
            let _ = outbound.send(message);
        });

        Ok(pid)
    }

    /// Line-framed streaming; a line is the unit, nothing is buffered
    /// beyond the current one
    fn stream_lines<R>(&self, pipeline_id: &str, stream: &'static str, reader: R)
    where
        R: AsyncRead + Unpin + Send + 'static,
    {
        let outbound = self.outbound.clone();
        let id = pipeline_id.to_string();
        tokio::spawn(async move {
            let mut lines = BufReader::new(reader).lines();
            while let Ok(Some(line)) = lines.next_line().await {
                let _ = outbound.send(OutboundMessage::PipelineOutput {
                    pipeline_id: id.clone(),
                    stream: stream.to_string(),
                    line,
                });
            }
        });
    }

    /// Grace-to-force shutdown of every running child
    pub async fn shutdown(&self) {
        let pids: Vec<(String, u32)> = self
            .running
            .lock()
            .unwrap()
            .iter()
            .map(|(id, pid)| (id.clone(), *pid))
            .collect();
        if pids.is_empty() {
            return;
        }

        for (id, pid) in &pids {
            info!(pipeline_id = %id, pid, "sending SIGTERM");
            terminate(*pid);
        }

        tokio::time::sleep(self.grace).await;

        let stragglers: Vec<(String, u32)> = self
            .running
            .lock()
            .unwrap()
            .iter()
            .map(|(id, pid)| (id.clone(), *pid))
            .collect();
        for (id, pid) in stragglers {
            warn!(pipeline_id = %id, pid, "grace expired; sending SIGKILL");
            force_kill(pid);
        }
    }
}

#[cfg(unix)]
fn terminate(pid: u32) {
    unsafe {
        libc::kill(pid as libc::pid_t, libc::SIGTERM);
    }
}

#[cfg(unix)]
fn force_kill(pid: u32) {
    unsafe {
        libc::kill(pid as libc::pid_t, libc::SIGKILL);
    }
}

#[cfg(not(unix))]
fn terminate(_pid: u32) {}

#[cfg(not(unix))]
fn force_kill(_pid: u32) {}

#[cfg(test)]
mod tests {
    use super::*;

    fn drain(
        rx: &mut broadcast::Receiver<OutboundMessage>,
        mut collected: Vec<OutboundMessage>,
    ) -> Vec<OutboundMessage> {
        while let Ok(message) = rx.try_recv() {
            collected.push(message);
        }
        collected
    }

    #[tokio::test]
    async fn test_pipeline_streams_lines_and_completes() {
        let (tx, mut rx) = broadcast::channel(64);
        let supervisor = ProcessSupervisor::new(tx);

        supervisor
            .start(
                "echo-1",
                ProcessKind::Pipeline,
                "sh",
                &["-c".to_string(), "echo one; echo two".to_string()],
            )
            .unwrap();

        // Wait until the exit message lands
        let mut messages = Vec::new();
        for _ in 0..200 {
            messages = drain(&mut rx, messages);
            if messages
                .iter()
                .any(|m| matches!(m, OutboundMessage::PipelineComplete { .. }))
            {
                break;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }

        assert!(matches!(
            messages.first(),
            Some(OutboundMessage::PipelineStart { .. })
        ));
        let lines: Vec<&str> = messages
            .iter()
            .filter_map(|m| match m {
                OutboundMessage::PipelineOutput { line, .. } => Some(line.as_str()),
                _ => None,
            })
            .collect();
        assert_eq!(lines, vec!["one", "two"]);
        match messages.last().unwrap() {
            OutboundMessage::PipelineComplete { exit_code, .. } => {
                assert_eq!(*exit_code, Some(0))
            }
            other => panic!("unexpected terminal message: {:?}", other),
        }
        assert_eq!(supervisor.running_count(), 0);
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_shutdown_terminates_long_running_child() {
        let (tx, _rx) = broadcast::channel(64);
        let supervisor =
            ProcessSupervisor::new(tx).with_grace(Duration::from_millis(200));

        supervisor
            .start(
                "sleeper",
                ProcessKind::DevServer,
                "sleep",
                &["30".to_string()],
            )
            .unwrap();
        assert_eq!(supervisor.running_count(), 1);

        supervisor.shutdown().await;
        for _ in 0..100 {
            if supervisor.running_count() == 0 {
                break;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        assert_eq!(supervisor.running_count(), 0);
    }
}
