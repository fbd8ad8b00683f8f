//! Live recent-change listeners.
//!
//! Each listener owns one upstream connection and pushes the source events it
//! admits into a channel. A listener returns `Ok(())` once the receiving side
//! hangs up, `MonitorError::Connect` when the upstream cannot be reached, and
//! `MonitorError::Connection` when an established connection fails or
//! closes. There is no reconnect.

pub mod irc;
pub mod sse;

use async_trait::async_trait;
use tokio::sync::mpsc;

use crate::error::Result;
use crate::recentchanges::{ListenOptions, Source, SourceEvent};

pub use irc::{IrcListener, IrcOptions};
pub use sse::{SseConnection, SseDecoder, SseFrame, SseListener};

/// Core trait implemented by every wire source
#[async_trait]
pub trait ChangeListener: Send + Sync {
    /// Which source tag events from this listener carry
    fn source(&self) -> Source;

    /// Connect and forward admitted events until the connection ends.
    async fn listen(&self, options: &ListenOptions, events: mpsc::Sender<SourceEvent>)
        -> Result<()>;
}
