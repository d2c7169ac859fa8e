//! Shared Sessions
//!
//! One process output stream (a PTY master in production) fanned out to any
//! number of attached viewers. Output is cut at character boundaries with
//! the same reassembly the network client uses, so a viewer never receives
//! half a character. Viewers joining late get a bounded replay of recent
//! output before live events.
//!
//! [`SessionRegistry`] owns every session and its optional password. A
//! session starts on its first attach and stops when its last viewer
//! detaches. Each [`Viewer`] holds its own attachment, so a viewer dropped
//! without detaching still releases its place; the registry reaps such
//! sessions on its next attach, join or detach.

use std::collections::HashMap;
use std::io;
use std::sync::{Arc, Mutex, PoisonError};

use log::{debug, error, info};
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};
use tokio::sync::broadcast::error::RecvError;
use tokio::sync::{broadcast, mpsc, RwLock};
use tokio::task::JoinHandle;

use crate::error::SessionError;
use crate::protocol::{ViewerCommand, ViewerEvent};
use crate::stream::{decode_text, Utf8Reassembler};

/// Replay kept for late viewers, in bytes
pub const DEFAULT_HISTORY_LIMIT: usize = 64 * 1024;
/// Events buffered per viewer before it is reported as lagging
pub const DEFAULT_EVENT_CAPACITY: usize = 1024;

const READ_BUFFER_SIZE: usize = 4096;
const INPUT_CAPACITY: usize = 100;

/// Recent output plus the end-of-stream reason, guarded together so that a
/// new subscriber sees each event exactly once: in the replay or live.
#[derive(Debug, Default)]
struct Screen {
    history: String,
    closed: Option<String>,
}

impl Screen {
    fn append(&mut self, text: &str, limit: usize) {
        self.history.push_str(text);
        if self.history.len() > limit {
            let mut cut = self.history.len() - limit;
            while !self.history.is_char_boundary(cut) {
                cut += 1;
            }
            self.history.drain(..cut);
        }
    }
}

struct SessionShared {
    screen: Mutex<Screen>,
    events_tx: broadcast::Sender<ViewerEvent>,
    history_limit: usize,
}

impl SessionShared {
    fn publish(&self, text: String) {
        let mut screen = self.screen.lock().unwrap_or_else(PoisonError::into_inner);
        screen.append(&text, self.history_limit);
        // No viewers is not an error
        let _ = self.events_tx.send(ViewerEvent::Output { data: text });
    }

    fn finish(&self, reason: String) {
        let mut screen = self.screen.lock().unwrap_or_else(PoisonError::into_inner);
        screen.closed = Some(reason.clone());
        let _ = self.events_tx.send(ViewerEvent::Closed { reason });
    }

    fn snapshot(&self) -> (String, Option<String>, broadcast::Receiver<ViewerEvent>) {
        let screen = self.screen.lock().unwrap_or_else(PoisonError::into_inner);
        (screen.history.clone(), screen.closed.clone(), self.events_tx.subscribe())
    }
}

/// One process output stream and the tasks that serve it.
pub struct BroadcastSession {
    id: String,
    shared: Arc<SessionShared>,
    input_tx: mpsc::Sender<Vec<u8>>,
    /// One clone per live viewer
    attachments: Arc<()>,
    pump: JoinHandle<()>,
    writer: JoinHandle<()>,
}

impl BroadcastSession {
    /// Start serving `source` to viewers and forwarding viewer input to `sink`.
    pub fn spawn<R, W>(id: impl Into<String>, source: R, sink: W, history_limit: usize, event_capacity: usize) -> Self
    where
        R: AsyncRead + Unpin + Send + 'static,
        W: AsyncWrite + Unpin + Send + 'static,
    {
        let id = id.into();
        let (events_tx, _) = broadcast::channel(event_capacity.max(1));
        let (input_tx, input_rx) = mpsc::channel(INPUT_CAPACITY);

        let shared = Arc::new(SessionShared {
            screen: Mutex::new(Screen::default()),
            events_tx,
            history_limit,
        });

        let pump = tokio::spawn(pump_output(id.clone(), source, shared.clone()));
        let writer = tokio::spawn(forward_input(id.clone(), sink, input_rx));

        Self {
            id,
            shared,
            input_tx,
            attachments: Arc::new(()),
            pump,
            writer,
        }
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    /// New viewer, primed with the current replay.
    pub fn subscribe(&self) -> Viewer {
        let (replay, closed, events) = self.shared.snapshot();
        Viewer {
            session_id: self.id.clone(),
            replay,
            pending_close: closed,
            finished: false,
            events,
            input_tx: self.input_tx.clone(),
            attachment: self.attachments.clone(),
        }
    }

    /// Viewers currently holding an attachment.
    pub fn viewer_count(&self) -> usize {
        Arc::strong_count(&self.attachments) - 1
    }

    fn owns(&self, viewer: &Viewer) -> bool {
        Arc::ptr_eq(&self.attachments, &viewer.attachment)
    }

    /// Stop both tasks. Attached viewers see the event stream end.
    pub fn shutdown(self) {
        self.pump.abort();
        self.writer.abort();
    }
}

async fn pump_output<R: AsyncRead + Unpin>(id: String, mut source: R, shared: Arc<SessionShared>) {
    let mut utf8 = Utf8Reassembler::new();
    let mut buf = vec![0u8; READ_BUFFER_SIZE];

    let reason = loop {
        match source.read(&mut buf).await {
            Ok(0) => break "process exited".to_string(),
            Ok(n) => {
                let complete = utf8.consume(&buf[..n]);
                if !complete.is_empty() {
                    shared.publish(decode_text(complete.to_vec()));
                }
            }
            Err(e) => {
                error!("Session {} read error: {}", id, e);
                break format!("read error: {}", e);
            }
        }
    };

    info!("Session {} output ended: {}", id, reason);
    shared.finish(reason);
}

async fn forward_input<W: AsyncWrite + Unpin>(id: String, mut sink: W, mut input_rx: mpsc::Receiver<Vec<u8>>) {
    while let Some(data) = input_rx.recv().await {
        if let Err(e) = sink.write_all(&data).await {
            error!("Session {} write error: {}", id, e);
            break;
        }
        if let Err(e) = sink.flush().await {
            error!("Session {} flush error: {}", id, e);
            break;
        }
    }
}

/// A viewer attached to a shared session.
pub struct Viewer {
    session_id: String,
    replay: String,
    pending_close: Option<String>,
    finished: bool,
    events: broadcast::Receiver<ViewerEvent>,
    input_tx: mpsc::Sender<Vec<u8>>,
    attachment: Arc<()>,
}

impl Viewer {
    pub fn session_id(&self) -> &str {
        &self.session_id
    }

    /// Recent output captured at attach time. Empty after the first call.
    pub fn take_replay(&mut self) -> String {
        std::mem::take(&mut self.replay)
    }

    /// Next live event, or `None` once the session has ended.
    pub async fn next_event(&mut self) -> Option<ViewerEvent> {
        if let Some(reason) = self.pending_close.take() {
            self.finished = true;
            return Some(ViewerEvent::Closed { reason });
        }
        if self.finished {
            return None;
        }

        match self.events.recv().await {
            Ok(event) => {
                if matches!(event, ViewerEvent::Closed { .. }) {
                    self.finished = true;
                }
                Some(event)
            }
            Err(RecvError::Lagged(dropped)) => {
                debug!("Viewer of {} lagged by {} events", self.session_id, dropped);
                Some(ViewerEvent::Lagged { dropped })
            }
            Err(RecvError::Closed) => {
                self.finished = true;
                None
            }
        }
    }

    /// Forward keystrokes to the session's process.
    pub async fn send_input(&self, data: impl Into<Vec<u8>>) -> bool {
        self.input_tx.send(data.into()).await.is_ok()
    }

    /// Apply a viewer command. Returns false when the viewer asked to detach.
    pub async fn handle_command(&self, command: ViewerCommand) -> bool {
        match command {
            ViewerCommand::Input { data } => {
                if !self.send_input(data).await {
                    debug!("Input for {} dropped, session stopped", self.session_id);
                }
                true
            }
            ViewerCommand::Detach => false,
        }
    }
}

#[derive(Default)]
struct RegistryState {
    sessions: HashMap<String, BroadcastSession>,
    passwords: HashMap<String, String>,
}

impl RegistryState {
    fn remove(&mut self, id: &str) {
        if let Some(session) = self.sessions.remove(id) {
            session.shutdown();
        }
        self.passwords.remove(id);
    }

    /// Drop sessions whose viewers all went away without detaching.
    fn reap(&mut self) {
        let abandoned: Vec<String> = self
            .sessions
            .iter()
            .filter(|(_, session)| session.viewer_count() == 0)
            .map(|(id, _)| id.clone())
            .collect();
        for id in abandoned {
            self.remove(&id);
            info!("Session {} stopped, all viewers dropped", id);
        }
    }

    fn check_password(&self, id: &str, given: Option<&str>) -> Result<(), SessionError> {
        match self.passwords.get(id) {
            Some(expected) if Some(expected.as_str()) != given => Err(SessionError::BadPassword(id.to_string())),
            _ => Ok(()),
        }
    }
}

/// Every live shared session, keyed by id.
pub struct SessionRegistry {
    state: RwLock<RegistryState>,
    history_limit: usize,
    event_capacity: usize,
}

impl Default for SessionRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl SessionRegistry {
    pub fn new() -> Self {
        Self::with_limits(DEFAULT_HISTORY_LIMIT, DEFAULT_EVENT_CAPACITY)
    }

    pub fn with_limits(history_limit: usize, event_capacity: usize) -> Self {
        Self {
            state: RwLock::new(RegistryState::default()),
            history_limit,
            event_capacity,
        }
    }

    /// Attach to `id`, starting it with `spawn` if it is not running.
    ///
    /// The password given by the first viewer protects the session for
    /// everyone after it.
    pub async fn attach<F, R, W>(&self, id: &str, password: Option<&str>, spawn: F) -> Result<Viewer, SessionError>
    where
        F: FnOnce() -> io::Result<(R, W)>,
        R: AsyncRead + Unpin + Send + 'static,
        W: AsyncWrite + Unpin + Send + 'static,
    {
        let mut state = self.state.write().await;
        state.reap();
        state.check_password(id, password)?;

        if let Some(session) = state.sessions.get(id) {
            let viewer = session.subscribe();
            debug!("Viewer attached to {} ({} viewers)", id, session.viewer_count());
            return Ok(viewer);
        }

        let (source, sink) = spawn().map_err(|source| SessionError::SpawnFailed {
            id: id.to_string(),
            source,
        })?;
        let session = BroadcastSession::spawn(id, source, sink, self.history_limit, self.event_capacity);
        let viewer = session.subscribe();

        state.sessions.insert(id.to_string(), session);
        if let Some(password) = password {
            state.passwords.insert(id.to_string(), password.to_string());
        }
        info!("Session {} started", id);
        Ok(viewer)
    }

    /// Attach to a session that is already running.
    pub async fn join(&self, id: &str, password: Option<&str>) -> Result<Viewer, SessionError> {
        let mut state = self.state.write().await;
        state.reap();
        state.check_password(id, password)?;

        let session = state
            .sessions
            .get(id)
            .ok_or_else(|| SessionError::NotFound(id.to_string()))?;
        let viewer = session.subscribe();
        debug!("Viewer joined {} ({} viewers)", id, session.viewer_count());
        Ok(viewer)
    }

    /// Detach a viewer. Returns true if it was the last one and the session
    /// was stopped and removed. A viewer of a session that has since been
    /// replaced under the same id changes nothing.
    pub async fn detach(&self, viewer: Viewer) -> bool {
        let mut state = self.state.write().await;
        let id = viewer.session_id.clone();

        let owned = state.sessions.get(&id).is_some_and(|session| session.owns(&viewer));
        drop(viewer);
        if !owned {
            debug!("Stale viewer of {} detached", id);
            state.reap();
            return false;
        }

        let remaining = state.sessions.get(&id).map_or(0, BroadcastSession::viewer_count);

        debug!("Viewer detached from {} ({} viewers)", id, remaining);
        let last = remaining == 0;
        if last {
            state.remove(&id);
            info!("Session {} stopped, no viewers left", id);
        }
        state.reap();
        last
    }

    /// Live viewers of `id`, or `None` if no viewer holds it open.
    pub async fn viewer_count(&self, id: &str) -> Option<usize> {
        let state = self.state.read().await;
        state
            .sessions
            .get(id)
            .map(BroadcastSession::viewer_count)
            .filter(|&count| count > 0)
    }

    pub async fn contains(&self, id: &str) -> bool {
        self.viewer_count(id).await.is_some()
    }

    pub async fn len(&self) -> usize {
        let state = self.state.read().await;
        state.sessions.values().filter(|session| session.viewer_count() > 0).count()
    }

    pub async fn is_empty(&self) -> bool {
        self.len().await == 0
    }
}
