//! Per-profile session state machine. Owns the transport handle and the
//! streaming task, and serializes every state mutation behind one lock.

use std::sync::{Arc, Mutex};

use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use super::stream::{self, InboundSink, Outbound, StreamError};
use super::transport::{self, Credential, TransportError, TransportHandle};
use super::SessionState;

const DEFAULT_COLUMNS: u16 = 80;
const DEFAULT_ROWS: u16 = 24;

/// One remote shell session, reusable across connect/disconnect cycles.
///
/// Control-plane calls (`send`, `resize`, `disconnect`) return
/// immediately; only `connect` and `exec_command` await I/O. State is
/// the single channel through which callers learn of failures.
pub struct Session {
    profile_id: String,
    inner: Arc<Mutex<SessionInner>>,
    sink: Arc<Mutex<InboundSink>>,
}

struct SessionInner {
    state: SessionState,
    columns: u16,
    rows: u16,
    /// Bumped on every connect/disconnect; a streaming task may only
    /// touch state while its captured generation is still current.
    generation: u64,
    transport: Option<Arc<TransportHandle>>,
    outbound: Option<mpsc::UnboundedSender<Outbound>>,
    cancel: Option<CancellationToken>,
    task: Option<JoinHandle<()>>,
}

impl SessionInner {
    /// Tears down any live streaming machinery and returns the transport
    /// handle for the caller to close. Leaves `state` untouched.
    fn teardown(&mut self) -> Option<Arc<TransportHandle>> {
        self.generation += 1;
        if let Some(cancel) = self.cancel.take() {
            cancel.cancel();
        }
        if let Some(task) = self.task.take() {
            task.abort();
        }
        self.outbound = None;
        self.transport.take()
    }
}

/// State the session should land in when the streaming task terminates.
/// `None` when the termination was caller-initiated: `disconnect` has
/// already put the session where it belongs.
fn termination_state(result: &Result<(), StreamError>, cancelled: bool) -> Option<SessionState> {
    if cancelled {
        return None;
    }
    Some(match result {
        Ok(()) => SessionState::Disconnected,
        Err(err) => SessionState::Error(err.to_string()),
    })
}

impl Session {
    pub fn new(profile_id: impl Into<String>) -> Self {
        Self {
            profile_id: profile_id.into(),
            inner: Arc::new(Mutex::new(SessionInner {
                state: SessionState::Disconnected,
                columns: DEFAULT_COLUMNS,
                rows: DEFAULT_ROWS,
                generation: 0,
                transport: None,
                outbound: None,
                cancel: None,
                task: None,
            })),
            sink: Arc::new(Mutex::new(InboundSink::default())),
        }
    }

    pub fn profile_id(&self) -> &str {
        &self.profile_id
    }

    pub fn state(&self) -> SessionState {
        self.inner.lock().unwrap().state.clone()
    }

    /// Stored terminal geometry `(columns, rows)`.
    pub fn geometry(&self) -> (u16, u16) {
        let inner = self.inner.lock().unwrap();
        (inner.columns, inner.rows)
    }

    /// Connects and, on success, starts the streaming task with the
    /// stored geometry. The state moves to `Connecting` before any I/O,
    /// so a concurrent observer never misses the attempt. Failures
    /// surface as `Error`; no retry is attempted here.
    pub async fn connect(
        &self,
        hostname: &str,
        port: u16,
        username: &str,
        credential: Credential,
    ) {
        let (generation, superseded) = {
            let mut inner = self.inner.lock().unwrap();
            let superseded = inner.teardown();
            inner.state = SessionState::Connecting;
            (inner.generation, superseded)
        };
        if let Some(old) = superseded {
            tokio::spawn(async move { old.close().await });
        }
        debug!(profile = %self.profile_id, %hostname, port, "connecting");

        let handle = match transport::open(hostname, port, username, &credential).await {
            Ok(handle) => Arc::new(handle),
            Err(err) => {
                warn!(profile = %self.profile_id, %err, "connect failed");
                self.fail_if_current(generation, err);
                return;
            }
        };

        let (columns, rows) = self.geometry();
        let (read, write) = match handle.open_interactive(columns, rows).await {
            Ok(halves) => halves,
            Err(err) => {
                warn!(profile = %self.profile_id, %err, "interactive channel failed");
                let orphan = Arc::clone(&handle);
                tokio::spawn(async move { orphan.close().await });
                self.fail_if_current(generation, err);
                return;
            }
        };

        let mut inner = self.inner.lock().unwrap();
        if inner.generation != generation {
            // A disconnect (or a newer connect) won the race.
            drop(inner);
            tokio::spawn(async move { handle.close().await });
            return;
        }

        let (tx, rx) = mpsc::unbounded_channel();
        let cancel = CancellationToken::new();
        inner.transport = Some(Arc::clone(&handle));
        inner.outbound = Some(tx);
        inner.cancel = Some(cancel.clone());
        inner.state = SessionState::Connected;
        inner.task = Some(self.spawn_stream(generation, read, write, rx, cancel));
        info!(profile = %self.profile_id, "connected");
    }

    fn spawn_stream(
        &self,
        generation: u64,
        read: transport::InteractiveRead,
        write: transport::InteractiveWrite,
        outbound: mpsc::UnboundedReceiver<Outbound>,
        cancel: CancellationToken,
    ) -> JoinHandle<()> {
        let inner = Arc::clone(&self.inner);
        let sink = Arc::clone(&self.sink);
        let profile_id = self.profile_id.clone();
        tokio::spawn(async move {
            let result = stream::relay(read, write, outbound, sink, cancel.clone()).await;

            let transport = {
                let mut inner = inner.lock().unwrap();
                if inner.generation != generation {
                    return;
                }
                match termination_state(&result, cancel.is_cancelled()) {
                    Some(state) => {
                        match &state {
                            SessionState::Error(message) => {
                                warn!(profile = %profile_id, %message, "stream failed")
                            }
                            _ => debug!(profile = %profile_id, "stream ended"),
                        }
                        inner.state = state;
                        inner.outbound = None;
                        inner.cancel = None;
                        inner.task = None;
                        inner.transport.take()
                    }
                    None => None,
                }
            };
            if let Some(handle) = transport {
                handle.close().await;
            }
        })
    }

    fn fail_if_current(&self, generation: u64, err: TransportError) {
        let mut inner = self.inner.lock().unwrap();
        if inner.generation == generation {
            inner.state = SessionState::Error(err.to_string());
        }
    }

    /// Tears the session down and returns it to `Disconnected`. Closing
    /// the transport is fire-and-forget. Idempotent, callable from any
    /// task.
    pub fn disconnect(&self) {
        let superseded = {
            let mut inner = self.inner.lock().unwrap();
            let superseded = inner.teardown();
            inner.state = SessionState::Disconnected;
            superseded
        };
        self.sink.lock().unwrap().clear_buffered();
        if let Some(handle) = superseded {
            debug!(profile = %self.profile_id, "disconnecting");
            tokio::spawn(async move { handle.close().await });
        }
    }

    /// Enqueues bytes for the remote side. Silently a no-op when no
    /// streaming task is active: callers racing a teardown must not
    /// fail hard on a stray send.
    pub fn send(&self, bytes: impl Into<Vec<u8>>) {
        let inner = self.inner.lock().unwrap();
        if let Some(outbound) = &inner.outbound {
            let _ = outbound.send(Outbound::Data(bytes.into()));
        }
    }

    pub fn send_text(&self, text: &str) {
        self.send(text.as_bytes().to_vec());
    }

    /// Stores the new geometry immediately; with a live channel a
    /// window-change request is enqueued best-effort, otherwise the
    /// geometry applies at the next channel open.
    pub fn resize(&self, columns: u16, rows: u16) {
        let mut inner = self.inner.lock().unwrap();
        inner.columns = columns.max(1);
        inner.rows = rows.max(1);
        if let Some(outbound) = &inner.outbound {
            let _ = outbound.send(Outbound::Resize(inner.columns, inner.rows));
        }
    }

    /// Registers (or replaces) the inbound consumer. Bytes buffered
    /// while no consumer was attached are flushed to the new callback
    /// before anything that arrives later.
    pub fn set_on_data<F>(&self, callback: F)
    where
        F: FnMut(&[u8]) + Send + 'static,
    {
        self.sink.lock().unwrap().register(Box::new(callback));
    }

    /// Removes the consumer; subsequent inbound bytes buffer again.
    pub fn clear_on_data(&self) {
        self.sink.lock().unwrap().clear_callback();
    }

    /// Runs a one-shot command over the live connection and returns its
    /// stdout. The interactive stream is untouched.
    pub async fn exec_command(&self, command: &str) -> Result<Vec<u8>, TransportError> {
        let handle = {
            let inner = self.inner.lock().unwrap();
            match (&inner.state, &inner.transport) {
                (SessionState::Connected, Some(handle)) => Arc::clone(handle),
                _ => return Err(TransportError::NotConnected),
            }
        };
        handle.exec(command).await
    }
}

impl Drop for Session {
    fn drop(&mut self) {
        let mut inner = self.inner.lock().unwrap();
        if let Some(cancel) = inner.cancel.take() {
            cancel.cancel();
        }
        if let Some(task) = inner.task.take() {
            task.abort();
        }
    }
}
