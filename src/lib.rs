//! mudlink - MUD Client Connection Engine
//!
//! A terminal client for MUD-style text game servers.
//!
//! # Overview
//!
//! mudlink provides:
//! - A telnet stream processor that strips control sequences from arbitrary,
//!   non-aligned reads and reassembles split UTF-8 characters
//! - Echo-state tracking so password prompts can be masked
//! - A connection with separate read and write loops and a channel API
//! - A console front end for interactive play
//! - Shared sessions that fan one process output stream out to many viewers
//!
//! # Example
//!
//! ```no_run
//! use mudlink::{ClientConfig, Connection};
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let config = ClientConfig { host: "mud.example.org".into(), port: 4000, ..Default::default() };
//! let (conn, mut events) = Connection::connect(&config).await?;
//!
//! conn.send("look").await;
//! while let Some(text) = events.output.recv().await {
//!     print!("{}", text);
//! }
//! conn.close();
//! # Ok(())
//! # }
//! ```

pub mod client;
pub mod config;
pub mod connection;
pub mod error;
pub mod protocol;
pub mod session;
pub mod stream;

// Re-export commonly used types
pub use client::{ConsoleClient, SessionEnd};
pub use config::{ClientConfig, LineEnding};
pub use connection::{Connection, ConnectionEvents, ConnectionState};
pub use error::{ConfigError, ConnectError, ConnectionError, SessionError};
pub use protocol::{ViewerCommand, ViewerEvent};
pub use session::{BroadcastSession, SessionRegistry, Viewer};
pub use stream::{EchoStateTracker, StreamDemux, StreamPipeline, Utf8Reassembler};
