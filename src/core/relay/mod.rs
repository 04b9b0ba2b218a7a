pub mod server;
pub mod session;

use std::sync::Arc;

use crate::core::error::ClientResult;
use crate::core::ipc::{MessageSink, ParentChannel};
use crate::core::settings::RelaySettings;

pub use server::{resolve_remote, SocketRelay};
pub use session::{RelaySession, TcpClient};

/// Bind the relay sockets and serve until `exit` or the first socket error.
pub async fn run_relay(
    settings: &RelaySettings,
    sink: Arc<dyn MessageSink>,
    parent: ParentChannel,
) -> ClientResult<()> {
    let relay = SocketRelay::bind(settings, sink).await?;
    relay.run(parent).await
}
