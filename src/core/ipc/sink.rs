use std::io::Write;

use tokio::sync::mpsc;
use tracing::debug;

use super::message::Message;
use crate::core::error::{ClientError, ClientResult};

/// Where child → parent lines go. Injected into every component that talks
/// to the parent.
pub trait MessageSink: Send + Sync {
    fn send(&self, message: Message) -> ClientResult<()>;
}

/// Production sink: one line per message on stdout, flushed immediately.
#[derive(Debug, Default)]
pub struct StdoutSink;

impl MessageSink for StdoutSink {
    fn send(&self, message: Message) -> ClientResult<()> {
        let line = message.to_string();
        debug!("-> parent: {}", line);

        let mut stdout = std::io::stdout().lock();
        writeln!(stdout, "{line}")
            .and_then(|_| stdout.flush())
            .map_err(|_| ClientError::ParentChannelClosed)
    }
}

/// Sink backed by an in-process channel.
#[derive(Debug, Clone)]
pub struct ChannelSink {
    tx: mpsc::UnboundedSender<Message>,
}

impl ChannelSink {
    pub fn new() -> (Self, mpsc::UnboundedReceiver<Message>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (Self { tx }, rx)
    }
}

impl MessageSink for ChannelSink {
    fn send(&self, message: Message) -> ClientResult<()> {
        self.tx
            .send(message)
            .map_err(|_| ClientError::ParentChannelClosed)
    }
}
