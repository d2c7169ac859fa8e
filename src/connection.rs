//! MUD Connection
//!
//! Owns one transport and runs two tasks over it:
//! - the read loop reads with a short timeout, feeds the stream pipeline and
//!   publishes text, echo-state changes and errors
//! - the write loop drains outbound commands, terminates and flushes each one
//!
//! Either loop failing closes the whole connection. The public surface is
//! channel based: [`Connection`] is a cloneable handle for sending and
//! closing, [`ConnectionEvents`] holds the receiving ends.

use std::sync::{Arc, PoisonError, RwLock};
use std::time::Duration;

use log::{debug, error, info};
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};
use tokio::net::TcpStream;
use tokio::sync::{mpsc, watch};

use crate::config::ClientConfig;
use crate::error::{ConnectError, ConnectionError};
use crate::stream::{Flushed, StreamPipeline};

/// Lifecycle of a connection. Transitions only move forward.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionState {
    Connecting,
    Open,
    Closing,
    Closed,
}

/// State shared between the handle and both loops.
#[derive(Debug)]
struct Lifecycle {
    state: ConnectionState,
    server_echo: bool,
    live_loops: usize,
}

struct Inner {
    peer: String,
    lifecycle: RwLock<Lifecycle>,
    input_tx: mpsc::Sender<String>,
    shutdown_tx: watch::Sender<bool>,
}

impl Inner {
    fn read_lifecycle<T>(&self, f: impl FnOnce(&Lifecycle) -> T) -> T {
        let lifecycle = self.lifecycle.read().unwrap_or_else(PoisonError::into_inner);
        f(&lifecycle)
    }

    fn write_lifecycle<T>(&self, f: impl FnOnce(&mut Lifecycle) -> T) -> T {
        let mut lifecycle = self.lifecycle.write().unwrap_or_else(PoisonError::into_inner);
        f(&mut lifecycle)
    }

    /// Begin closing. Returns false if another caller got there first.
    fn close(&self) -> bool {
        let first = self.write_lifecycle(|lc| match lc.state {
            ConnectionState::Closing | ConnectionState::Closed => false,
            _ => {
                lc.state = ConnectionState::Closing;
                true
            }
        });

        if first {
            info!("Connection to {} closing", self.peer);
            self.shutdown_tx.send_replace(true);
        }
        first
    }

    fn loop_finished(&self, name: &str) {
        let closed = self.write_lifecycle(|lc| {
            lc.live_loops = lc.live_loops.saturating_sub(1);
            if lc.live_loops == 0 {
                lc.state = ConnectionState::Closed;
                true
            } else {
                false
            }
        });

        debug!("Connection to {}: {} loop finished", self.peer, name);
        if closed {
            info!("Connection to {} closed", self.peer);
        }
    }

    fn set_server_echo(&self, suppressed: bool) {
        self.write_lifecycle(|lc| lc.server_echo = suppressed);
    }
}

/// Receiving side of a connection.
///
/// `output` carries game text in arrival order. `echo_state` and `errors`
/// are advisory: when full, new notifications are dropped rather than
/// stalling the read loop. Channel closure is not a prompt shutdown signal,
/// use [`Connection::is_closed`].
pub struct ConnectionEvents {
    pub output: mpsc::Receiver<String>,
    pub errors: mpsc::Receiver<ConnectionError>,
    pub echo_state: mpsc::Receiver<bool>,
}

/// Handle to an open connection. Cheap to clone.
#[derive(Clone)]
pub struct Connection {
    inner: Arc<Inner>,
}

impl Connection {
    /// Dial the configured server and start both loops.
    pub async fn connect(config: &ClientConfig) -> Result<(Self, ConnectionEvents), ConnectError> {
        let addr = config.address();
        info!("Connecting to {}", addr);

        let stream = match tokio::time::timeout(config.connect_timeout(), TcpStream::connect(addr.as_str())).await {
            Ok(Ok(stream)) => stream,
            Ok(Err(source)) => {
                error!("Connection to {} failed: {}", addr, source);
                return Err(ConnectError::Io { addr, source });
            }
            Err(_) => {
                error!("Connection to {} timed out", addr);
                return Err(ConnectError::Timeout { addr });
            }
        };

        if let Err(e) = stream.set_nodelay(true) {
            debug!("Could not set TCP_NODELAY on {}: {}", addr, e);
        }

        Ok(Self::from_stream(stream, addr, config))
    }

    /// Wrap an already established transport. Must be called inside a
    /// Tokio runtime.
    pub fn from_stream<S>(stream: S, peer: impl Into<String>, config: &ClientConfig) -> (Self, ConnectionEvents)
    where
        S: AsyncRead + AsyncWrite + Send + 'static,
    {
        let peer = peer.into();
        let (reader, writer) = tokio::io::split(stream);

        let capacity = config.channel_capacity.max(1);
        let notify_capacity = config.notify_capacity.max(1);
        let (output_tx, output_rx) = mpsc::channel::<String>(capacity);
        let (input_tx, input_rx) = mpsc::channel::<String>(capacity);
        let (error_tx, error_rx) = mpsc::channel::<ConnectionError>(notify_capacity);
        let (echo_tx, echo_rx) = mpsc::channel::<bool>(notify_capacity);
        let (shutdown_tx, shutdown_rx) = watch::channel(false);

        let inner = Arc::new(Inner {
            peer,
            lifecycle: RwLock::new(Lifecycle {
                state: ConnectionState::Connecting,
                server_echo: false,
                live_loops: 2,
            }),
            input_tx,
            shutdown_tx,
        });

        let reader_loop = ReadLoop {
            inner: inner.clone(),
            read_timeout: config.read_timeout(),
            buffer_size: config.read_buffer_size.max(1),
            output_tx,
            error_tx: error_tx.clone(),
            echo_tx,
            shutdown: shutdown_rx.clone(),
        };
        tokio::spawn(reader_loop.run(reader));

        let writer_loop = WriteLoop {
            inner: inner.clone(),
            line_ending: config.line_ending.as_bytes(),
            input_rx,
            error_tx,
            shutdown: shutdown_rx,
        };
        tokio::spawn(writer_loop.run(writer));

        inner.write_lifecycle(|lc| {
            if lc.state == ConnectionState::Connecting {
                lc.state = ConnectionState::Open;
            }
        });
        info!("Connected to {}", inner.peer);

        let events = ConnectionEvents {
            output: output_rx,
            errors: error_rx,
            echo_state: echo_rx,
        };
        (Self { inner }, events)
    }

    /// Queue a command for the server. Silently dropped once the connection
    /// is closed. Waits if the input channel is full.
    pub async fn send(&self, command: impl Into<String>) {
        if self.is_closed() {
            return;
        }
        if self.inner.input_tx.send(command.into()).await.is_err() {
            debug!("Connection to {}: send after write loop exit", self.inner.peer);
        }
    }

    /// Idempotent. Signals both loops to stop; the transport is released
    /// once they have both exited.
    pub fn close(&self) {
        self.inner.close();
    }

    /// True from the moment closing begins.
    pub fn is_closed(&self) -> bool {
        self.inner.read_lifecycle(|lc| {
            matches!(lc.state, ConnectionState::Closing | ConnectionState::Closed)
        })
    }

    pub fn state(&self) -> ConnectionState {
        self.inner.read_lifecycle(|lc| lc.state)
    }

    /// True while the server has asked for local echo to be suppressed.
    pub fn server_echo(&self) -> bool {
        self.inner.read_lifecycle(|lc| lc.server_echo)
    }

    pub fn peer(&self) -> &str {
        &self.inner.peer
    }
}

struct ReadLoop {
    inner: Arc<Inner>,
    read_timeout: Duration,
    buffer_size: usize,
    output_tx: mpsc::Sender<String>,
    error_tx: mpsc::Sender<ConnectionError>,
    echo_tx: mpsc::Sender<bool>,
    shutdown: watch::Receiver<bool>,
}

impl ReadLoop {
    async fn run<R: AsyncRead + Unpin>(mut self, mut reader: R) {
        let mut pipeline = StreamPipeline::new();
        let mut buf = vec![0u8; self.buffer_size];

        loop {
            let read = tokio::select! {
                biased;
                _ = self.shutdown.changed() => break,
                read = tokio::time::timeout(self.read_timeout, reader.read(&mut buf)) => read,
            };

            let flushed = match read {
                // Timed out: surface any unterminated prompt
                Err(_) => pipeline.flush(),
                Ok(Ok(0)) => {
                    info!("Connection to {} closed by server", self.inner.peer);
                    if let Some(flushed) = pipeline.flush() {
                        self.deliver(flushed).await;
                    }
                    break;
                }
                Ok(Ok(n)) => pipeline.push(&buf[..n]),
                Ok(Err(e)) => {
                    error!("Connection to {} read error: {}", self.inner.peer, e);
                    notify(&self.error_tx, ConnectionError::Read(e));
                    break;
                }
            };

            if let Some(flushed) = flushed {
                if !self.deliver(flushed).await {
                    break;
                }
            }
        }

        drop(reader);
        self.inner.close();
        self.inner.loop_finished("read");
    }

    /// Publish one flush. Returns false when the loop should stop.
    async fn deliver(&mut self, flushed: Flushed) -> bool {
        for suppressed in flushed.echo_changes {
            debug!("Connection to {}: server echo {}", self.inner.peer, if suppressed { "on" } else { "off" });
            self.inner.set_server_echo(suppressed);
            notify(&self.echo_tx, suppressed);
        }

        let Some(text) = flushed.text else {
            return true;
        };

        tokio::select! {
            biased;
            _ = self.shutdown.changed() => false,
            sent = self.output_tx.send(text) => sent.is_ok(),
        }
    }
}

struct WriteLoop {
    inner: Arc<Inner>,
    line_ending: &'static [u8],
    input_rx: mpsc::Receiver<String>,
    error_tx: mpsc::Sender<ConnectionError>,
    shutdown: watch::Receiver<bool>,
}

impl WriteLoop {
    async fn run<W: AsyncWrite + Unpin>(mut self, mut writer: W) {
        // Set when close interrupts a write the peer was not draining
        let mut interrupted = false;

        loop {
            let command = tokio::select! {
                biased;
                _ = self.shutdown.changed() => break,
                command = self.input_rx.recv() => match command {
                    Some(command) => command,
                    None => break,
                },
            };

            let mut line = command.into_bytes();
            line.extend_from_slice(self.line_ending);

            let written = tokio::select! {
                biased;
                _ = self.shutdown.changed() => {
                    interrupted = true;
                    break;
                }
                written = writer.write_all(&line) => written,
            };
            if let Err(e) = written {
                error!("Connection to {} write error: {}", self.inner.peer, e);
                notify(&self.error_tx, ConnectionError::Write(e));
                break;
            }

            let flushed = tokio::select! {
                biased;
                _ = self.shutdown.changed() => {
                    interrupted = true;
                    break;
                }
                flushed = writer.flush() => flushed,
            };
            if let Err(e) = flushed {
                error!("Connection to {} flush error: {}", self.inner.peer, e);
                notify(&self.error_tx, ConnectionError::Write(e));
                break;
            }
        }

        if interrupted {
            debug!("Connection to {}: pending write abandoned on close", self.inner.peer);
        } else if let Err(e) = writer.shutdown().await {
            debug!("Connection to {}: write shutdown failed: {}", self.inner.peer, e);
        }
        drop(writer);

        self.inner.close();
        self.inner.loop_finished("write");
    }
}

/// Best-effort send on an advisory channel. Drops when full or closed.
fn notify<T>(tx: &mpsc::Sender<T>, value: T) {
    if let Err(e) = tx.try_send(value) {
        debug!("Dropped notification: {}", e);
    }
}
