use tokio::io::{AsyncBufRead, AsyncBufReadExt};
use tokio::sync::{mpsc, oneshot};
use tracing::{debug, info, warn};

use super::message::ParentCommand;

/// Parent → child lines, split into ordinary lines and the exit signal.
pub struct ParentChannel {
    pub lines: mpsc::UnboundedReceiver<String>,
    pub exit: oneshot::Receiver<()>,
}

/// Read lines from the parent until `exit` or end of input.
///
/// Only an explicit `exit` resolves `ParentChannel::exit` with `Ok`. At end
/// of input the sender is dropped instead: the child keeps running, like it
/// does when the parent goes away without saying anything.
pub fn spawn_parent_reader<R>(input: R) -> ParentChannel
where
    R: AsyncBufRead + Unpin + Send + 'static,
{
    let (line_tx, line_rx) = mpsc::unbounded_channel();
    let (exit_tx, exit_rx) = oneshot::channel();

    tokio::spawn(async move {
        let mut lines = input.lines();
        loop {
            match lines.next_line().await {
                Ok(Some(raw)) => match ParentCommand::parse(&raw) {
                    ParentCommand::Exit => {
                        info!("Parent requested exit");
                        let _ = exit_tx.send(());
                        return;
                    }
                    ParentCommand::Line(line) => {
                        debug!("<- parent: {}", line);
                        if line_tx.send(line).is_err() {
                            break;
                        }
                    }
                },
                Ok(None) => {
                    info!("Parent input closed");
                    break;
                }
                Err(e) => {
                    warn!("Failed to read from the parent: {}", e);
                    break;
                }
            }
        }
    });

    ParentChannel {
        lines: line_rx,
        exit: exit_rx,
    }
}
