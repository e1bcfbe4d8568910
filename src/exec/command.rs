// src/exec/command.rs

//! Real process backend on `tokio::process`.

use std::future::Future;
use std::pin::Pin;
use std::process::Stdio;
use std::time::Duration;

use anyhow::Context;
use tokio::io::{AsyncBufReadExt, AsyncRead, BufReader};
use tokio::process::Command;
use tokio::sync::{mpsc, oneshot};
use tracing::{debug, info, warn};

use super::backend::{OutputStream, ProcessBackend, ProcessEvent, ProcessHandle, SpawnRequest, Terminator};
use crate::errors::Result;

const EVENT_BUFFER: usize = 256;
const DRAIN_TIMEOUT: Duration = Duration::from_secs(2);

#[derive(Debug, Clone, Default)]
pub struct RealProcessBackend;

impl RealProcessBackend {
    pub fn new() -> Self {
        Self
    }
}

impl ProcessBackend for RealProcessBackend {
    fn spawn(
        &self,
        request: SpawnRequest,
    ) -> Pin<Box<dyn Future<Output = Result<ProcessHandle>> + Send + '_>> {
        Box::pin(async move { spawn_process(request) })
    }
}

fn build_command(request: &SpawnRequest) -> Command {
    let mut cmd = if request.shell {
        let line = request.command_line();
        if cfg!(windows) {
            let mut c = Command::new("cmd");
            c.arg("/C").arg(line);
            c
        } else {
            let mut c = Command::new("sh");
            c.arg("-c").arg(line);
            c
        }
    } else {
        let mut c = Command::new(&request.command);
        c.args(&request.args);
        c
    };

    if let Some(cwd) = &request.cwd {
        cmd.current_dir(cwd);
    }
    cmd.envs(&request.env)
        .stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .kill_on_drop(true);
    cmd
}

fn spawn_process(request: SpawnRequest) -> Result<ProcessHandle> {
    let command_line = request.command_line();
    let mut child = build_command(&request)
        .spawn()
        .with_context(|| format!("spawning process '{command_line}'"))?;

    let pid = child.id();
    info!(cmd = %command_line, ?pid, "process started");

    let (tx, rx) = mpsc::channel(EVENT_BUFFER);
    let (cancel_tx, mut cancel_rx) = oneshot::channel::<()>();

    let stdout = child
        .stdout
        .take()
        .map(|out| tokio::spawn(forward_lines(out, OutputStream::Stdout, tx.clone())));
    let stderr = child
        .stderr
        .take()
        .map(|err| tokio::spawn(forward_lines(err, OutputStream::Stderr, tx.clone())));

    tokio::spawn(async move {
        // Either the process exits on its own, or termination is requested.
        let code = tokio::select! {
            status = child.wait() => match status {
                Ok(status) => status.code(),
                Err(e) => {
                    warn!(cmd = %command_line, error = %e, "failed waiting for process");
                    None
                }
            },
            cancel = &mut cancel_rx => match cancel {
                Ok(()) => {
                    info!(cmd = %command_line, "termination requested; killing process");
                    if let Err(e) = child.kill().await {
                        warn!(cmd = %command_line, error = %e, "failed to kill process");
                    }
                    None
                }
                Err(_) => {
                    debug!(cmd = %command_line, "terminator dropped; waiting for process");
                    child.wait().await.ok().and_then(|s| s.code())
                }
            }
        };

        // Drain both pipes so `Exited` really is the last event. Grandchildren
        // may keep a pipe open after a kill, hence the bound.
        for reader in [stdout, stderr].into_iter().flatten() {
            if tokio::time::timeout(DRAIN_TIMEOUT, reader).await.is_err() {
                debug!(cmd = %command_line, "output pipe still open after exit; not waiting");
            }
        }

        debug!(cmd = %command_line, ?code, "process exited");
        let _ = tx.send(ProcessEvent::Exited { code }).await;
    });

    Ok(ProcessHandle {
        events: rx,
        terminator: Terminator::new(cancel_tx),
    })
}

async fn forward_lines<R>(reader: R, stream: OutputStream, tx: mpsc::Sender<ProcessEvent>)
where
    R: AsyncRead + Unpin,
{
    let mut lines = BufReader::new(reader).lines();
    while let Ok(Some(text)) = lines.next_line().await {
        if tx.send(ProcessEvent::Line { stream, text }).await.is_err() {
            break;
        }
    }
}
