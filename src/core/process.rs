//! Subprocess supervision for butterfly-scenario
//!
//! Every external OSRM binary, whether a short-lived build stage or a
//! long-running query server, is launched through this module. Launched
//! processes are tracked in a process-wide registry so that no subprocess
//! survives the host program, whatever path it exits through.

use std::collections::HashMap;
use std::process::{ExitStatus, Stdio};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};

use once_cell::sync::Lazy;
use tokio::io::{AsyncBufReadExt, AsyncRead, BufReader};
use tokio::process::Command;
use tokio::sync::{mpsc, watch};

use crate::core::error::{Error, Result};

/// Callback invoked once per line of combined stdout/stderr output, in the
/// order lines are produced on each stream
pub type LineCallback = Arc<dyn Fn(&str) + Send + Sync>;

/// Last observed state of a supervised process
#[derive(Debug, Clone, Copy)]
enum ExitState {
    Running,
    Exited(ExitStatus),
    /// The supervisor could not reap the process (wait failed)
    Lost,
}

static NEXT_ID: AtomicU64 = AtomicU64::new(0);

/// Process-wide registry of live handles. Launch registers, the supervisor
/// task deregisters on confirmed exit, and `terminate_all` drains whatever is
/// still running on shutdown.
static REGISTRY: Lazy<Mutex<HashMap<u64, ProcessHandle>>> =
    Lazy::new(|| Mutex::new(HashMap::new()));

fn register(handle: &ProcessHandle) {
    REGISTRY.lock().unwrap().insert(handle.id, handle.clone());
}

fn deregister(id: u64) {
    REGISTRY.lock().unwrap().remove(&id);
}

/// Number of launched processes not yet observed to exit
pub fn registered_count() -> usize {
    REGISTRY.lock().unwrap().len()
}

/// Whether a handle id is still tracked in the registry
#[cfg(test)]
pub fn registered(id: u64) -> bool {
    REGISTRY.lock().unwrap().contains_key(&id)
}

/// Terminate every still-running registered process. Safe to call at any
/// time; handles that already exited are a no-op.
pub async fn terminate_all() {
    let handles: Vec<ProcessHandle> = REGISTRY.lock().unwrap().values().cloned().collect();
    for handle in handles {
        handle.terminate().await;
    }
}

/// Handle to a supervised subprocess
///
/// Cheap to clone; all clones refer to the same underlying process. The
/// process itself is owned by a supervisor task that reaps it on exit and
/// kills it on request, so `terminate` never races `wait`.
#[derive(Clone)]
pub struct ProcessHandle {
    id: u64,
    program: String,
    kill_tx: mpsc::Sender<()>,
    exit_rx: watch::Receiver<ExitState>,
}

impl ProcessHandle {
    pub fn id(&self) -> u64 {
        self.id
    }

    pub fn program(&self) -> &str {
        &self.program
    }

    /// Whether the process has not yet been observed to exit
    pub fn is_running(&self) -> bool {
        matches!(*self.exit_rx.borrow(), ExitState::Running)
    }

    /// Request termination and wait until the process has been reaped.
    /// Idempotent and a no-op on an already-exited process.
    pub async fn terminate(&self) {
        // A full or closed channel means a kill is already pending or the
        // supervisor is gone; either way the exit watch settles it.
        let _ = self.kill_tx.try_send(());
        self.wait_exited().await;
    }

    /// Wait for the process to exit and return its status
    pub async fn wait(&self) -> Result<ExitStatus> {
        match self.wait_exited().await {
            ExitState::Exited(status) => Ok(status),
            ExitState::Lost => Err(Error::Process(format!(
                "lost track of process '{}'",
                self.program
            ))),
            ExitState::Running => unreachable!("wait_exited returned while running"),
        }
    }

    async fn wait_exited(&self) -> ExitState {
        let mut rx = self.exit_rx.clone();
        loop {
            let state = *rx.borrow();
            match state {
                ExitState::Running => {
                    if rx.changed().await.is_err() {
                        return ExitState::Lost;
                    }
                }
                settled => return settled,
            }
        }
    }
}

/// Launch an external executable under supervision
///
/// `on_line` is invoked once per line of stdout and stderr, from dedicated
/// drain tasks, in the order lines appear on each stream. With `echo` the
/// output is additionally mirrored to stderr.
pub fn launch(
    program: &str,
    args: &[String],
    echo: bool,
    on_line: Option<LineCallback>,
) -> Result<ProcessHandle> {
    let mut child = Command::new(program)
        .args(args)
        .stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .kill_on_drop(true)
        .spawn()
        .map_err(|e| Error::Process(format!("failed to launch '{}': {}", program, e)))?;

    log::debug!("Executing: {} {}", program, args.join(" "));

    if let Some(stdout) = child.stdout.take() {
        drain_lines(stdout, echo, on_line.clone());
    }
    if let Some(stderr) = child.stderr.take() {
        drain_lines(stderr, echo, on_line);
    }

    let id = NEXT_ID.fetch_add(1, Ordering::SeqCst);
    let (kill_tx, mut kill_rx) = mpsc::channel::<()>(1);
    let (exit_tx, exit_rx) = watch::channel(ExitState::Running);

    let handle = ProcessHandle {
        id,
        program: program.to_string(),
        kill_tx,
        exit_rx,
    };
    register(&handle);

    // Supervisor task: sole owner of the child. Reaps on natural exit and
    // honors kill requests from any handle clone.
    tokio::spawn(async move {
        let state = loop {
            tokio::select! {
                status = child.wait() => {
                    break match status {
                        Ok(status) => ExitState::Exited(status),
                        Err(_) => ExitState::Lost,
                    };
                }
                msg = kill_rx.recv() => {
                    if msg.is_some() {
                        let _ = child.start_kill();
                    } else {
                        // All senders gone; just reap.
                        break match child.wait().await {
                            Ok(status) => ExitState::Exited(status),
                            Err(_) => ExitState::Lost,
                        };
                    }
                }
            }
        };
        // Deregister before publishing the exit state so anyone who observed
        // the exit is guaranteed to find the registry entry gone.
        deregister(id);
        let _ = exit_tx.send(state);
    });

    Ok(handle)
}

/// Launch an executable and block until it exits
///
/// Used for build stages, which must fully complete before the next stage
/// starts.
pub async fn run_to_completion(program: &str, args: &[String], echo: bool) -> Result<ExitStatus> {
    let handle = launch(program, args, echo, None)?;
    handle.wait().await
}

fn drain_lines<R>(reader: R, echo: bool, on_line: Option<LineCallback>)
where
    R: AsyncRead + Unpin + Send + 'static,
{
    tokio::spawn(async move {
        let mut lines = BufReader::new(reader).lines();
        while let Ok(Some(line)) = lines.next_line().await {
            if let Some(ref callback) = on_line {
                callback(&line);
            }
            if echo {
                eprintln!("{line}");
            }
        }
    });
}
