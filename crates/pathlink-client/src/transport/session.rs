//! Connection session: socket ownership, registration handshake, state machine.
//!
//! States: `Disconnected -> Connecting -> Connected -> Registering ->
//! Streaming -> Closed`, with `Failed` reachable from any non-terminal state.
//! Terminal states are sticky; a session is never reconnected.
//!
//! The socket is split by direction. The write half sits behind a
//! [`SessionWriter`] (one frame per lock hold, so writers never interleave);
//! the read half moves into the receive task, which owns loop termination on
//! stream end. The session owns explicit close.

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use tokio::io::{AsyncWrite, AsyncWriteExt};
use tokio::net::tcp::OwnedReadHalf;
use tokio::net::TcpStream;
use tokio::sync::{mpsc, watch, Mutex};
use tokio::task::JoinHandle;

use pathlink_core::error::{PathlinkError, Result};
use pathlink_core::protocol::{build_registration, Envelope, FrameBuffer, RequestId, RequestIdGen};

use crate::config::ClientConfig;
use crate::obs::ClientMetrics;
use crate::transport::receive::{receive_loop, Inbound};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    Disconnected,
    Connecting,
    Connected,
    Registering,
    Streaming,
    Closed,
    Failed,
}

impl SessionState {
    pub fn is_terminal(self) -> bool {
        matches!(self, SessionState::Closed | SessionState::Failed)
    }
}

/// Move to `next` unless the session already ended.
fn transition(state: &watch::Sender<SessionState>, next: SessionState) {
    state.send_if_modified(|cur| {
        if cur.is_terminal() || *cur == next {
            return false;
        }
        tracing::debug!(from = ?*cur, to = ?next, "session state");
        *cur = next;
        true
    });
}

#[derive(Debug, Clone)]
pub struct SessionOptions {
    pub connect_timeout: Duration,
    pub max_frame_bytes: usize,
    pub inbound_queue: usize,
}

impl Default for SessionOptions {
    fn default() -> Self {
        Self {
            connect_timeout: Duration::from_secs(5),
            max_frame_bytes: pathlink_core::protocol::frame::DEFAULT_MAX_FRAME_BYTES,
            inbound_queue: 1024,
        }
    }
}

impl From<&ClientConfig> for SessionOptions {
    fn from(cfg: &ClientConfig) -> Self {
        Self {
            connect_timeout: cfg.coordinator.connect_timeout(),
            max_frame_bytes: cfg.session.max_frame_bytes,
            inbound_queue: cfg.session.inbound_queue,
        }
    }
}

type BoxWriter = Box<dyn AsyncWrite + Send + Unpin>;

/// Shared write path. Cloning is cheap; every clone writes to the same socket.
///
/// A send that fails or is cut short by `cancel` drops the socket half, since
/// the peer may hold a torn frame. Later sends fail with `WriteError`.
#[derive(Clone)]
pub struct SessionWriter {
    inner: Arc<Mutex<Option<BoxWriter>>>,
    metrics: Arc<ClientMetrics>,
    cancel: watch::Receiver<bool>,
}

impl SessionWriter {
    pub fn new<W>(writer: W, metrics: Arc<ClientMetrics>, cancel: watch::Receiver<bool>) -> Self
    where
        W: AsyncWrite + Send + Unpin + 'static,
    {
        Self {
            inner: Arc::new(Mutex::new(Some(Box::new(writer)))),
            metrics,
            cancel,
        }
    }

    /// Serialize, frame and write one envelope as a single unit.
    pub async fn send(&self, env: &Envelope) -> Result<()> {
        let frame = env.to_frame()?;

        let mut guard = tokio::select! {
            biased;
            _ = cancelled(self.cancel.clone()) => {
                return Err(PathlinkError::Write("connection closed".into()));
            }
            guard = self.inner.lock() => guard,
        };
        let Some(w) = guard.as_mut() else {
            return Err(PathlinkError::Write("connection closed".into()));
        };

        let written = tokio::select! {
            biased;
            _ = cancelled(self.cancel.clone()) => {
                Err(PathlinkError::Write(format!("send {} cancelled by close", env.sub)))
            }
            res = write_frame(w, &frame) => {
                res.map_err(|e| PathlinkError::Write(format!("send {} failed: {e}", env.sub)))
            }
        };
        if let Err(e) = written {
            *guard = None;
            return Err(e);
        }

        self.metrics.frames.inc(&[("dir", "out")]);
        self.metrics.bytes.add(&[("dir", "out")], frame.len() as u64);
        tracing::debug!(sub = %env.sub, request = env.request, len = frame.len(), "envelope sent");
        Ok(())
    }

    /// Shut down the write direction. Later sends fail with `WriteError`.
    ///
    /// Flip the cancel switch first so an in-flight send releases the lock.
    pub async fn shutdown(&self) {
        let taken = self.inner.lock().await.take();
        if let Some(mut w) = taken {
            if let Err(e) = w.shutdown().await {
                tracing::debug!(error = %e, "write half shutdown failed");
            }
        }
    }
}

async fn write_frame(w: &mut BoxWriter, frame: &[u8]) -> std::io::Result<()> {
    w.write_all(frame).await?;
    w.flush().await
}

/// Resolves once the switch reads `true`. A dropped sender never cancels.
async fn cancelled(mut cancel: watch::Receiver<bool>) {
    if cancel.wait_for(|c| *c).await.is_err() {
        std::future::pending::<()>().await;
    }
}

pub struct Session {
    opts: SessionOptions,
    state: Arc<watch::Sender<SessionState>>,
    ids: RequestIdGen,
    metrics: Arc<ClientMetrics>,
    peer: Option<SocketAddr>,
    paths: Vec<String>,
    writer: Option<SessionWriter>,
    reader: Option<OwnedReadHalf>,
    cancel: watch::Sender<bool>,
    receiver: Option<JoinHandle<Result<()>>>,
}

impl Session {
    pub fn new(opts: SessionOptions, metrics: Arc<ClientMetrics>) -> Self {
        let (state, _) = watch::channel(SessionState::Disconnected);
        let (cancel, _) = watch::channel(false);
        Self {
            opts,
            state: Arc::new(state),
            ids: RequestIdGen::new(),
            metrics,
            peer: None,
            paths: Vec::new(),
            writer: None,
            reader: None,
            cancel,
            receiver: None,
        }
    }

    pub fn state(&self) -> SessionState {
        *self.state.borrow()
    }

    /// Observe state changes (e.g. wait for `Closed`).
    pub fn subscribe_state(&self) -> watch::Receiver<SessionState> {
        self.state.subscribe()
    }

    pub fn peer(&self) -> Option<SocketAddr> {
        self.peer
    }

    /// Paths announced at registration; empty before `register`.
    pub fn paths(&self) -> &[String] {
        &self.paths
    }

    pub fn next_request_id(&self) -> RequestId {
        self.ids.next_id()
    }

    /// Handle for additional writers (e.g. replies from the dispatcher).
    pub fn writer(&self) -> Option<SessionWriter> {
        self.writer.clone()
    }

    /// Open the stream socket. Resolution, refusal and timeout all fail the
    /// session with `ConnectionError`.
    pub async fn connect(&mut self, host: &str, port: u16) -> Result<()> {
        let cur = self.state();
        if cur != SessionState::Disconnected {
            return Err(PathlinkError::Connection(format!(
                "connect called in state {cur:?}"
            )));
        }
        transition(&self.state, SessionState::Connecting);

        let stream = match tokio::time::timeout(
            self.opts.connect_timeout,
            TcpStream::connect((host, port)),
        )
        .await
        {
            Ok(Ok(s)) => s,
            Ok(Err(e)) => {
                transition(&self.state, SessionState::Failed);
                return Err(PathlinkError::Connection(format!(
                    "connect {host}:{port} failed: {e}"
                )));
            }
            Err(_) => {
                transition(&self.state, SessionState::Failed);
                return Err(PathlinkError::Connection(format!(
                    "connect {host}:{port} timed out after {:?}",
                    self.opts.connect_timeout
                )));
            }
        };

        if let Err(e) = stream.set_nodelay(true) {
            tracing::debug!(error = %e, "set_nodelay failed");
        }
        self.peer = stream.peer_addr().ok();

        let (r, w) = stream.into_split();
        self.reader = Some(r);
        self.writer = Some(SessionWriter::new(
            w,
            Arc::clone(&self.metrics),
            self.cancel.subscribe(),
        ));

        tracing::info!(host, port, "connected to coordinator");
        transition(&self.state, SessionState::Connected);
        Ok(())
    }

    /// Send the `REG` envelope announcing `paths`. Returns its request id.
    pub async fn register(&mut self, client_id: &str, paths: &[String]) -> Result<RequestId> {
        let cur = self.state();
        if cur != SessionState::Connected {
            return Err(PathlinkError::Write(format!(
                "register called in state {cur:?}"
            )));
        }
        let writer = self
            .writer
            .clone()
            .ok_or_else(|| PathlinkError::Write("no connection".into()))?;

        transition(&self.state, SessionState::Registering);

        let request_id = self.ids.next_id();
        let env = build_registration(client_id, paths, request_id)?;

        if let Err(e) = writer.send(&env).await {
            transition(&self.state, SessionState::Failed);
            return Err(e);
        }

        self.paths = paths.to_vec();
        tracing::info!(client_id, request_id, paths = ?self.paths, "registration sent");
        transition(&self.state, SessionState::Streaming);
        Ok(request_id)
    }

    /// Spawn the receive task. Envelopes arrive on the returned channel in
    /// receipt order; the channel closes when the loop ends.
    pub fn start_receiving(&mut self) -> Result<mpsc::Receiver<Inbound>> {
        let cur = self.state();
        if cur != SessionState::Streaming {
            return Err(PathlinkError::Internal(format!(
                "start_receiving called in state {cur:?}"
            )));
        }
        let reader = self
            .reader
            .take()
            .ok_or_else(|| PathlinkError::Internal("receive loop already started".into()))?;

        let (tx, rx) = mpsc::channel(self.opts.inbound_queue);
        let frames = FrameBuffer::new(self.opts.max_frame_bytes);
        let cancel = self.cancel.subscribe();
        let metrics = Arc::clone(&self.metrics);
        let state = Arc::clone(&self.state);

        self.receiver = Some(tokio::spawn(async move {
            let res = receive_loop(reader, frames, tx, cancel, metrics).await;
            match &res {
                Ok(()) => transition(&state, SessionState::Closed),
                Err(e) => {
                    tracing::error!(kind = e.kind().as_str(), error = %e, "receive loop failed");
                    transition(&state, SessionState::Failed);
                }
            }
            res
        }));
        Ok(rx)
    }

    /// Wait for the receive task to end and return its outcome.
    ///
    /// Cancel-safe. Returns `Ok(())` immediately if no task is running.
    pub async fn wait_receiver(&mut self) -> Result<()> {
        let Some(handle) = self.receiver.as_mut() else {
            return Ok(());
        };
        let joined = handle.await;
        self.receiver = None;
        joined.map_err(|e| PathlinkError::Internal(format!("receive task panicked: {e}")))?
    }

    /// Close the socket and release both halves.
    pub async fn close(&mut self) {
        self.cancel.send_replace(true);

        if let Some(w) = self.writer.take() {
            w.shutdown().await;
        }
        self.reader = None;

        if self.receiver.is_some() {
            if let Err(e) = self.wait_receiver().await {
                tracing::debug!(error = %e, "receive loop ended with error during close");
            }
        }

        transition(&self.state, SessionState::Closed);
        tracing::info!(state = ?self.state(), "session closed");
    }
}
