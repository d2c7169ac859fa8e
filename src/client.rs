//! Console Client
//!
//! Line-oriented front end over a [`Connection`]: commands come from an
//! input reader (stdin), game text goes to a transcript writer (stdout).
//! While the server has echo suppressed, submitted commands are never
//! written to the transcript; a one-line notice marks the start of each
//! masked stretch instead.

use log::{error, info};
use tokio::io::{AsyncBufRead, AsyncBufReadExt, AsyncWrite, AsyncWriteExt};

use crate::connection::{Connection, ConnectionEvents};

/// Typed by the user to end the session without sending anything.
pub const QUIT_COMMAND: &str = "/quit";

/// Written once each time the server starts masking input.
pub const MASKED_NOTICE: &str = "[input hidden]\n";

/// Why a console session ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionEnd {
    /// The server closed the connection or it failed
    ServerClosed,
    /// Input reached end of file
    InputClosed,
    /// The user typed the quit command
    Quit,
}

pub struct ConsoleClient<W> {
    connection: Connection,
    transcript: W,
    local_echo: bool,
    masked: bool,
}

impl<W: AsyncWrite + Unpin> ConsoleClient<W> {
    pub fn new(connection: Connection, transcript: W, local_echo: bool) -> Self {
        Self {
            connection,
            transcript,
            local_echo,
            masked: false,
        }
    }

    /// True while the server is masking input.
    pub fn is_masked(&self) -> bool {
        self.masked
    }

    /// Drive the session until the server, the input or the user ends it.
    /// Closes the connection exactly once on the way out.
    pub async fn run<R>(&mut self, mut events: ConnectionEvents, input: R) -> std::io::Result<SessionEnd>
    where
        R: AsyncBufRead + Unpin,
    {
        let mut lines = input.lines();

        let end = loop {
            tokio::select! {
                // Echo state first so masking applies before any text or input that follows it
                biased;

                Some(masked) = events.echo_state.recv() => self.set_masked(masked).await?,
                Some(err) = events.errors.recv() => {
                    error!("{}: {}", self.connection.peer(), err);
                }
                text = events.output.recv() => match text {
                    Some(text) => {
                        self.transcript.write_all(text.as_bytes()).await?;
                        self.transcript.flush().await?;
                    }
                    None => break SessionEnd::ServerClosed,
                },
                line = lines.next_line() => match line? {
                    Some(line) if line.trim() == QUIT_COMMAND => break SessionEnd::Quit,
                    Some(line) => self.submit(line).await?,
                    None => break SessionEnd::InputClosed,
                },
            }
        };

        self.connection.close();
        self.transcript.flush().await?;
        info!("Session with {} ended: {:?}", self.connection.peer(), end);
        Ok(end)
    }

    async fn set_masked(&mut self, masked: bool) -> std::io::Result<()> {
        let was_masked = std::mem::replace(&mut self.masked, masked);
        if masked && !was_masked {
            info!("Server is masking input");
            self.transcript.write_all(MASKED_NOTICE.as_bytes()).await?;
            self.transcript.flush().await?;
        } else if !masked && was_masked {
            info!("Server stopped masking input");
        }
        Ok(())
    }

    async fn submit(&mut self, line: String) -> std::io::Result<()> {
        if self.local_echo && !self.masked {
            self.transcript.write_all(line.as_bytes()).await?;
            self.transcript.write_all(b"\n").await?;
            self.transcript.flush().await?;
        }
        self.connection.send(line).await;
        Ok(())
    }
}
