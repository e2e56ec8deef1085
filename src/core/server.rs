//! Long-running query server supervision
//!
//! Wraps a single `osrm-routed` invocation: allocates a free local port,
//! launches the server bound to it, and waits until the server reports on its
//! output stream that it is accepting connections.

use std::net::TcpListener;
use std::path::PathBuf;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use tokio::sync::oneshot;

use crate::core::error::{Error, Result};
use crate::core::process::{self, LineCallback, ProcessHandle};

/// Substring `osrm-routed` prints once it is accepting connections
pub const READY_MARKER: &str = "running and waiting for requests";

/// Server lifecycle states
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ServerState {
    Created,
    Starting,
    Ready,
    Stopped,
    /// The process exited or timed out before reporting readiness
    Failed,
}

/// Per-server configuration
#[derive(Debug, Clone)]
pub struct ServeOptions {
    /// Largest duration matrix (|origins| * |dests|) the server will accept;
    /// the cap is fixed at startup, so it must cover every table query the
    /// scenario will ever issue
    pub max_table_size: usize,
    /// Mirror server output to stderr (osrm-routed is chatty, default off)
    pub verbose: bool,
    /// Bound on the readiness wait; expiry tears the server down
    pub startup_timeout: Duration,
    /// Additional flags forwarded verbatim to osrm-routed
    pub extra_args: Vec<String>,
}

impl Default for ServeOptions {
    fn default() -> Self {
        Self {
            max_table_size: 100,
            verbose: false,
            startup_timeout: Duration::from_secs(60),
            extra_args: Vec::new(),
        }
    }
}

/// Allocate an unused local port by binding an ephemeral socket and releasing
/// it. Racy against other processes on the host, but allocation and server
/// bind happen back to back.
pub fn allocate_port() -> Result<u16> {
    let listener = TcpListener::bind(("127.0.0.1", 0))?;
    let port = listener.local_addr()?.port();
    Ok(port)
}

/// One supervised query server process
pub struct ServerProcess {
    routed: String,
    dataset_path: PathBuf,
    opts: ServeOptions,
    state: ServerState,
    port: Option<u16>,
    handle: Option<ProcessHandle>,
}

impl ServerProcess {
    /// Configure a server for a compiled dataset; no I/O happens until `start`
    pub fn new(routed: impl Into<String>, dataset_path: impl Into<PathBuf>, opts: ServeOptions) -> Self {
        Self {
            routed: routed.into(),
            dataset_path: dataset_path.into(),
            opts,
            state: ServerState::Created,
            port: None,
            handle: None,
        }
    }

    pub fn state(&self) -> ServerState {
        self.state
    }

    pub fn is_ready(&self) -> bool {
        self.state == ServerState::Ready
    }

    /// Port the server is bound to, once started
    pub fn port(&self) -> Option<u16> {
        self.port
    }

    /// Base URL of the query endpoint, once ready
    pub fn url(&self) -> Option<String> {
        self.port.map(|port| format!("http://127.0.0.1:{port}"))
    }

    /// Launch the server and wait until it reports readiness
    ///
    /// Returns once the server accepts connections. If the process exits
    /// first, or the startup bound expires, the child is terminated and the
    /// server moves to `Failed`.
    pub async fn start(&mut self) -> Result<()> {
        match self.state {
            ServerState::Created => {}
            ServerState::Ready => return Ok(()),
            other => {
                return Err(Error::Process(format!(
                    "cannot start server from state {:?}",
                    other
                )))
            }
        }

        self.state = ServerState::Starting;
        let port = allocate_port()?;

        // Single-assignment readiness signal: the first matching line wins,
        // later output is drained for logging only.
        let (ready_tx, mut ready_rx) = oneshot::channel::<()>();
        let ready_tx = Mutex::new(Some(ready_tx));
        let callback: LineCallback = Arc::new(move |line: &str| {
            if line.contains(READY_MARKER) {
                if let Some(tx) = ready_tx.lock().unwrap().take() {
                    let _ = tx.send(());
                }
            }
        });

        let mut args = vec![
            self.dataset_path.display().to_string(),
            "--ip".to_string(),
            "127.0.0.1".to_string(),
            "--port".to_string(),
            port.to_string(),
            "--max-table-size".to_string(),
            self.opts.max_table_size.to_string(),
        ];
        args.extend(self.opts.extra_args.iter().cloned());

        let handle = match process::launch(&self.routed, &args, self.opts.verbose, Some(callback)) {
            Ok(handle) => handle,
            Err(err) => {
                self.state = ServerState::Failed;
                return Err(err);
            }
        };

        // Biased: a fired readiness signal must win over a simultaneous exit
        // observation, since the first marker line is what makes the server
        // ready regardless of what the process does afterwards.
        let startup = tokio::select! {
            biased;
            received = &mut ready_rx => {
                if received.is_ok() {
                    Ok(())
                } else {
                    // Sender dropped without firing: output closed pre-readiness.
                    Err(Error::Process(
                        "server output closed before readiness".to_string(),
                    ))
                }
            }
            status = handle.wait() => {
                // Output can trail the observed exit. The drain tasks hold the
                // only senders, so the oneshot settles once they finish: Ok if
                // the marker was in the output, closed if it never appeared.
                let late = tokio::time::timeout(Duration::from_secs(1), &mut ready_rx).await;
                if matches!(late, Ok(Ok(()))) {
                    Ok(())
                } else {
                    let detail = match status {
                        Ok(status) => format!("status {:?}", status.code()),
                        Err(err) => err.to_string(),
                    };
                    Err(Error::Process(format!(
                        "server exited before readiness ({detail})"
                    )))
                }
            }
            _ = tokio::time::sleep(self.opts.startup_timeout) => {
                Err(Error::Timeout(format!(
                    "server not ready within {:?}",
                    self.opts.startup_timeout
                )))
            }
        };

        match startup {
            Ok(()) => {
                log::info!("Server ready on port {} ({})", port, self.dataset_path.display());
                self.state = ServerState::Ready;
                self.port = Some(port);
                self.handle = Some(handle);
                Ok(())
            }
            Err(err) => {
                handle.terminate().await;
                self.state = ServerState::Failed;
                Err(err)
            }
        }
    }

    /// Terminate the server process and release the port
    ///
    /// Idempotent; safe to call from any state, including a failed start.
    pub async fn stop(&mut self) {
        if let Some(handle) = self.handle.take() {
            handle.terminate().await;
        }
        self.port = None;
        if self.state != ServerState::Failed {
            self.state = ServerState::Stopped;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use std::path::Path;

    #[cfg(unix)]
    fn stub_routed(dir: &Path, name: &str, body: &str) -> String {
        use std::os::unix::fs::PermissionsExt;
        let path = dir.join(name);
        fs::write(&path, format!("#!/bin/sh\n{body}\n")).unwrap();
        fs::set_permissions(&path, fs::Permissions::from_mode(0o755)).unwrap();
        path.display().to_string()
    }

    fn quick_opts() -> ServeOptions {
        ServeOptions {
            startup_timeout: Duration::from_secs(5),
            ..Default::default()
        }
    }

    #[test]
    fn test_allocate_port_is_bindable() {
        let port = allocate_port().unwrap();
        assert_ne!(port, 0);
        // Released by the probe, so it can be bound again immediately.
        TcpListener::bind(("127.0.0.1", port)).unwrap();
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_start_waits_for_readiness_marker() {
        let dir = tempfile::tempdir().unwrap();
        let routed = stub_routed(
            dir.path(),
            "routed",
            "echo '[info] starting up'\necho '[info] running and waiting for requests'\nexec sleep 30",
        );

        let mut server = ServerProcess::new(&routed, dir.path().join("x.osrm"), quick_opts());
        assert_eq!(server.state(), ServerState::Created);

        server.start().await.unwrap();
        assert_eq!(server.state(), ServerState::Ready);
        let port = server.port().unwrap();
        assert_eq!(server.url().unwrap(), format!("http://127.0.0.1:{port}"));

        server.stop().await;
        assert_eq!(server.state(), ServerState::Stopped);
        assert_eq!(server.port(), None);

        // stop is idempotent
        server.stop().await;
        assert_eq!(server.state(), ServerState::Stopped);
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_marker_followed_by_immediate_exit_is_still_ready() {
        let dir = tempfile::tempdir().unwrap();
        let routed = stub_routed(
            dir.path(),
            "routed",
            "echo 'running and waiting for requests'\nexit 0",
        );

        // The exit lands in the same instant as the marker; repeat to cover
        // every interleaving of readiness signal and exit observation.
        for attempt in 0..20 {
            let mut server = ServerProcess::new(&routed, dir.path().join("x.osrm"), quick_opts());
            server
                .start()
                .await
                .unwrap_or_else(|e| panic!("attempt {attempt}: ready server classified failed: {e}"));
            assert_eq!(server.state(), ServerState::Ready);
            server.stop().await;
            assert_eq!(server.state(), ServerState::Stopped);
        }
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_exit_before_readiness_is_process_error() {
        let dir = tempfile::tempdir().unwrap();
        let routed = stub_routed(dir.path(), "routed", "echo 'loading'\nexit 1");

        let mut server = ServerProcess::new(&routed, dir.path().join("x.osrm"), quick_opts());
        let result = server.start().await;

        assert!(matches!(result, Err(Error::Process(_))));
        assert_eq!(server.state(), ServerState::Failed);

        // stop from FAILED never raises
        server.stop().await;
        assert_eq!(server.state(), ServerState::Failed);
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_readiness_timeout_tears_down() {
        let dir = tempfile::tempdir().unwrap();
        let routed = stub_routed(dir.path(), "routed", "exec sleep 30");

        let opts = ServeOptions {
            startup_timeout: Duration::from_millis(300),
            ..Default::default()
        };
        let mut server = ServerProcess::new(&routed, dir.path().join("x.osrm"), opts);
        let result = server.start().await;

        assert!(matches!(result, Err(Error::Timeout(_))));
        assert_eq!(server.state(), ServerState::Failed);
    }
}
