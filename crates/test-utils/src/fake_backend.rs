use std::collections::HashMap;
use std::future::Future;
use std::pin::Pin;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use tokio::sync::{mpsc, oneshot};
use taskdeck::errors::{Result, TaskdeckError};
use taskdeck::exec::{OutputStream, ProcessBackend, ProcessEvent, ProcessHandle, SpawnRequest, Terminator};

/// How a fake process behaves, keyed by `SpawnRequest::command`.
#[derive(Debug, Clone)]
pub enum Script {
    /// Print lines to stdout, then exit with `code`.
    Exit { lines: Vec<String>, code: i32 },
    /// Print lines, then keep running until terminated.
    Hang { lines: Vec<String> },
    /// Emit nothing until the test drives it through a [`ProcessControl`].
    Manual,
    /// Fail to start.
    FailSpawn,
}

impl Script {
    pub fn ok() -> Self {
        Script::Exit { lines: Vec::new(), code: 0 }
    }

    pub fn exit(code: i32) -> Self {
        Script::Exit { lines: Vec::new(), code }
    }

    pub fn lines(lines: &[&str], code: i32) -> Self {
        Script::Exit {
            lines: lines.iter().map(|l| l.to_string()).collect(),
            code,
        }
    }
}

/// Test-side end of a `Script::Manual` process.
#[derive(Debug, Clone)]
pub struct ProcessControl {
    tx: mpsc::Sender<ProcessEvent>,
}

impl ProcessControl {
    pub async fn line(&self, text: &str) {
        let _ = self
            .tx
            .send(ProcessEvent::Line {
                stream: OutputStream::Stdout,
                text: text.to_string(),
            })
            .await;
    }

    pub async fn exit(&self, code: Option<i32>) {
        let _ = self.tx.send(ProcessEvent::Exited { code }).await;
    }
}

/// A fake backend that:
/// - records every spawn request, in order
/// - plays back a [`Script`] per command (default: exit 0 immediately)
/// - records which commands were terminated.
#[derive(Debug, Default)]
pub struct FakeBackend {
    scripts: Mutex<HashMap<String, Script>>,
    spawned: Arc<Mutex<Vec<SpawnRequest>>>,
    terminated: Arc<Mutex<Vec<String>>>,
    controls: Mutex<HashMap<String, ProcessControl>>,
    spawn_delays: Mutex<HashMap<String, Duration>>,
}

impl FakeBackend {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn script(&self, command: &str, script: Script) {
        self.scripts
            .lock()
            .unwrap()
            .insert(command.to_string(), script);
    }

    /// Make `spawn` of `command` take `delay` before the process exists.
    /// The request is recorded as soon as `spawn` is called.
    pub fn delay_spawn(&self, command: &str, delay: Duration) {
        self.spawn_delays
            .lock()
            .unwrap()
            .insert(command.to_string(), delay);
    }

    /// Commands spawned so far, in spawn order.
    pub fn spawned(&self) -> Vec<String> {
        self.spawned
            .lock()
            .unwrap()
            .iter()
            .map(|r| r.command.clone())
            .collect()
    }

    pub fn requests(&self) -> Vec<SpawnRequest> {
        self.spawned.lock().unwrap().clone()
    }

    pub fn terminated(&self) -> Vec<String> {
        self.terminated.lock().unwrap().clone()
    }

    /// Wait until `command` has been spawned with `Script::Manual` and
    /// return its control.
    pub async fn control(&self, command: &str) -> ProcessControl {
        loop {
            if let Some(control) = self.controls.lock().unwrap().get(command) {
                return control.clone();
            }
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
    }

    /// Wait until `command` has been terminated.
    pub async fn wait_terminated(&self, command: &str) {
        while !self.terminated().iter().any(|c| c == command) {
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
    }

    fn watch_termination(
        &self,
        command: String,
        cancel_rx: oneshot::Receiver<()>,
        tx: mpsc::Sender<ProcessEvent>,
    ) {
        let terminated = Arc::clone(&self.terminated);
        tokio::spawn(async move {
            if cancel_rx.await.is_ok() {
                terminated.lock().unwrap().push(command);
                let _ = tx.send(ProcessEvent::Exited { code: None }).await;
            }
        });
    }
}

impl ProcessBackend for FakeBackend {
    fn spawn(
        &self,
        request: SpawnRequest,
    ) -> Pin<Box<dyn Future<Output = Result<ProcessHandle>> + Send + '_>> {
        Box::pin(async move {
            let command = request.command.clone();
            let script = self
                .scripts
                .lock()
                .unwrap()
                .get(&command)
                .cloned()
                .unwrap_or_else(Script::ok);
            self.spawned.lock().unwrap().push(request);

            let delay = self.spawn_delays.lock().unwrap().get(&command).copied();
            if let Some(delay) = delay {
                tokio::time::sleep(delay).await;
            }

            let (tx, rx) = mpsc::channel(64);
            let (cancel_tx, cancel_rx) = oneshot::channel();

            match script {
                Script::FailSpawn => {
                    return Err(TaskdeckError::Other(anyhow::anyhow!(
                        "no such program: {command}"
                    )));
                }
                Script::Exit { lines, code } => {
                    tokio::spawn(async move {
                        for text in lines {
                            let _ = tx
                                .send(ProcessEvent::Line {
                                    stream: OutputStream::Stdout,
                                    text,
                                })
                                .await;
                        }
                        let _ = tx.send(ProcessEvent::Exited { code: Some(code) }).await;
                    });
                }
                Script::Hang { lines } => {
                    for text in lines {
                        let _ = tx
                            .send(ProcessEvent::Line {
                                stream: OutputStream::Stdout,
                                text,
                            })
                            .await;
                    }
                    self.watch_termination(command, cancel_rx, tx);
                }
                Script::Manual => {
                    self.controls
                        .lock()
                        .unwrap()
                        .insert(command.clone(), ProcessControl { tx: tx.clone() });
                    self.watch_termination(command, cancel_rx, tx);
                }
            }

            Ok(ProcessHandle {
                events: rx,
                terminator: Terminator::new(cancel_tx),
            })
        })
    }
}
