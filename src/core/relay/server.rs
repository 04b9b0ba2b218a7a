use std::io::ErrorKind;
use std::net::SocketAddr;
use std::sync::Arc;

use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::net::tcp::{OwnedReadHalf, OwnedWriteHalf};
use tokio::net::{lookup_host, TcpListener, TcpStream, UdpSocket};
use tokio::sync::mpsc;
use tracing::{debug, info, trace, warn};
use uuid::Uuid;

use super::session::{RelaySession, TcpClient};
use crate::core::error::{ClientError, ClientResult};
use crate::core::ipc::{Message, MessageSink, ParentChannel, ParentEvent};
use crate::core::settings::RelaySettings;

const DATAGRAM_BUFFER: usize = 65_536;

/// What a connection task reports back to the relay loop.
#[derive(Debug)]
enum ConnectionEvent {
    Received { id: Uuid, line: String },
    Closed { id: Uuid },
    Failed { id: Uuid, source: std::io::Error },
}

/// TCP fan-out and UDP proxy between the game and the parent.
///
/// One loop owns the [`RelaySession`]; reader and writer tasks for each TCP
/// client only talk to it through channels.
pub struct SocketRelay {
    listener: TcpListener,
    local_udp: UdpSocket,
    upstream_udp: UdpSocket,
    remote: SocketAddr,
    keepalive_token: String,
    session: RelaySession,
    sink: Arc<dyn MessageSink>,
    events_tx: mpsc::UnboundedSender<ConnectionEvent>,
    events_rx: mpsc::UnboundedReceiver<ConnectionEvent>,
}

impl SocketRelay {
    /// Resolve the remote once and bind every socket from `settings`.
    pub async fn bind(settings: &RelaySettings, sink: Arc<dyn MessageSink>) -> ClientResult<Self> {
        let remote = resolve_remote(&settings.remote_host, settings.remote_udp_port).await?;
        info!("Remote UDP endpoint resolved to {}", remote);

        Self::bind_to(
            (settings.local_host.as_str(), settings.tcp_port),
            (settings.local_host.as_str(), settings.udp_port),
            remote,
            settings.keepalive_token.clone(),
            sink,
        )
        .await
    }

    pub async fn bind_to(
        tcp_addr: (&str, u16),
        udp_addr: (&str, u16),
        remote: SocketAddr,
        keepalive_token: String,
        sink: Arc<dyn MessageSink>,
    ) -> ClientResult<Self> {
        let listener = TcpListener::bind(tcp_addr)
            .await
            .map_err(|e| ClientError::socket("TCP listen", e))?;
        let tcp_port = local_port(listener.local_addr(), "TCP listen")?;
        sink.send(Message::info(format!(
            "TCP socket server started on port {tcp_port}."
        )))?;

        let local_udp = UdpSocket::bind(udp_addr)
            .await
            .map_err(|e| ClientError::socket("UDP bind", e))?;
        let udp_port = local_port(local_udp.local_addr(), "UDP bind")?;
        sink.send(Message::info(format!(
            "UDP socket server started on port {udp_port}."
        )))?;

        let upstream_bind: SocketAddr = if remote.is_ipv4() {
            ([0, 0, 0, 0], 0).into()
        } else {
            (std::net::Ipv6Addr::UNSPECIFIED, 0).into()
        };
        let upstream_udp = UdpSocket::bind(upstream_bind)
            .await
            .map_err(|e| ClientError::socket("UDP upstream bind", e))?;

        let (events_tx, events_rx) = mpsc::unbounded_channel();
        Ok(Self {
            listener,
            local_udp,
            upstream_udp,
            remote,
            keepalive_token,
            session: RelaySession::default(),
            sink,
            events_tx,
            events_rx,
        })
    }

    pub fn tcp_addr(&self) -> ClientResult<SocketAddr> {
        self.listener
            .local_addr()
            .map_err(|e| ClientError::socket("TCP listen", e))
    }

    pub fn udp_addr(&self) -> ClientResult<SocketAddr> {
        self.local_udp
            .local_addr()
            .map_err(|e| ClientError::socket("UDP bind", e))
    }

    pub fn upstream_addr(&self) -> ClientResult<SocketAddr> {
        self.upstream_udp
            .local_addr()
            .map_err(|e| ClientError::socket("UDP upstream bind", e))
    }

    /// Relay until the parent sends `exit` or a socket fails.
    pub async fn run(mut self, parent: ParentChannel) -> ClientResult<()> {
        let ParentChannel { mut lines, exit } = parent;
        // A closed parent without `exit` keeps the relay up.
        let exit = async move {
            if exit.await.is_err() {
                std::future::pending::<()>().await;
            }
        };
        tokio::pin!(exit);
        let mut local_buf = vec![0u8; DATAGRAM_BUFFER];
        let mut upstream_buf = vec![0u8; DATAGRAM_BUFFER];

        loop {
            tokio::select! {
                accepted = self.listener.accept() => {
                    let (stream, addr) =
                        accepted.map_err(|e| ClientError::socket("TCP accept", e))?;
                    self.on_connect(stream, addr)?;
                }
                Some(event) = self.events_rx.recv() => {
                    self.on_connection_event(event)?;
                }
                Some(line) = lines.recv() => {
                    let delivered = self.session.broadcast(&format!("{line}\n"));
                    trace!("Broadcast to {} client(s): {}", delivered, line);
                }
                received = self.local_udp.recv_from(&mut local_buf) => {
                    if let Some((len, from)) = udp_received(received, "UDP receive")? {
                        self.on_local_datagram(&local_buf[..len], from).await?;
                    }
                }
                received = self.upstream_udp.recv_from(&mut upstream_buf) => {
                    if let Some((len, from)) = udp_received(received, "UDP upstream receive")? {
                        self.on_upstream_datagram(&upstream_buf[..len], from).await?;
                    }
                }
                _ = &mut exit => {
                    info!("Stopping the socket relay at the parent's request");
                    return Ok(());
                }
            }
        }
    }

    fn on_connect(&mut self, stream: TcpStream, addr: SocketAddr) -> ClientResult<()> {
        let id = Uuid::new_v4();
        let (reader, writer) = stream.into_split();
        let (outbound_tx, outbound_rx) = mpsc::unbounded_channel();

        tokio::spawn(read_client(id, reader, self.events_tx.clone()));
        tokio::spawn(write_client(id, writer, outbound_rx, self.events_tx.clone()));

        let first = self.session.add_client(TcpClient::new(id, addr, outbound_tx));
        debug!("Client {} ({}) connected", addr, id);
        self.sink.send(Message::info(format!(
            "Client \"{addr}\" has connected to the socket server. ({} total clients)",
            self.session.client_count()
        )))?;
        if first {
            self.sink.send(ParentEvent::Connected.into())?;
        }
        Ok(())
    }

    fn on_connection_event(&mut self, event: ConnectionEvent) -> ClientResult<()> {
        match event {
            ConnectionEvent::Received { id, line } => self.on_client_line(id, &line),
            ConnectionEvent::Closed { id } => self.on_disconnect(id),
            ConnectionEvent::Failed { id, source } => {
                let addr = self
                    .session
                    .client(id)
                    .map(|c| c.addr.to_string())
                    .unwrap_or_else(|| id.to_string());
                Err(ClientError::socket(format!("TCP client {addr}"), source))
            }
        }
    }

    fn on_client_line(&mut self, id: Uuid, raw: &str) -> ClientResult<()> {
        let line = raw.trim();
        if line.is_empty() {
            return Ok(());
        }
        let command = line.split_whitespace().next().unwrap_or_default();
        if command == self.keepalive_token {
            trace!("Keepalive from {}", id);
            return Ok(());
        }
        self.sink.send(Message::Forward(line.to_string()))
    }

    fn on_disconnect(&mut self, id: Uuid) -> ClientResult<()> {
        let Some(client) = self.session.remove_client(id) else {
            return Ok(());
        };
        debug!("Client {} ({}) disconnected", client.addr, id);
        self.sink.send(Message::info(format!(
            "Client \"{}\" has disconnected from the socket server. ({} total clients)",
            client.addr,
            self.session.client_count()
        )))?;
        if self.session.is_empty() {
            self.sink.send(ParentEvent::Disconnected.into())?;
        }
        Ok(())
    }

    async fn on_local_datagram(&mut self, payload: &[u8], from: SocketAddr) -> ClientResult<()> {
        self.session.record_udp_sender(from);
        if payload.is_empty() {
            return Ok(());
        }
        self.upstream_udp
            .send_to(payload, self.remote)
            .await
            .map_err(|e| ClientError::socket("UDP upstream send", e))?;
        Ok(())
    }

    async fn on_upstream_datagram(&mut self, payload: &[u8], from: SocketAddr) -> ClientResult<()> {
        let Some(destination) = self.session.udp_destination() else {
            trace!("Dropping {} byte(s) from {}: no local sender yet", payload.len(), from);
            return Ok(());
        };
        if payload.is_empty() {
            return Ok(());
        }
        self.local_udp
            .send_to(payload, destination)
            .await
            .map_err(|e| ClientError::socket("UDP send", e))?;
        Ok(())
    }
}

async fn read_client(
    id: Uuid,
    reader: OwnedReadHalf,
    events: mpsc::UnboundedSender<ConnectionEvent>,
) {
    let mut reader = BufReader::new(reader);
    let mut buf = Vec::new();
    let event = loop {
        buf.clear();
        match reader.read_until(b'\n', &mut buf).await {
            Ok(0) => break ConnectionEvent::Closed { id },
            Ok(_) => {
                // Mods may send any bytes; bad UTF-8 is replaced, not fatal.
                let line = String::from_utf8_lossy(&buf).into_owned();
                if events.send(ConnectionEvent::Received { id, line }).is_err() {
                    return;
                }
            }
            Err(e) if is_peer_reset(&e) => {
                debug!("Client {} reset the connection: {}", id, e);
                break ConnectionEvent::Closed { id };
            }
            Err(source) => break ConnectionEvent::Failed { id, source },
        }
    };
    let _ = events.send(event);
}

async fn write_client(
    id: Uuid,
    mut writer: OwnedWriteHalf,
    mut outbound: mpsc::UnboundedReceiver<String>,
    events: mpsc::UnboundedSender<ConnectionEvent>,
) {
    while let Some(text) = outbound.recv().await {
        if let Err(e) = writer.write_all(text.as_bytes()).await {
            if is_peer_reset(&e) {
                // The reader sees the same hang-up and reports the disconnect.
                warn!("Dropping writes to client {}: {}", id, e);
                return;
            }
            let _ = events.send(ConnectionEvent::Failed { id, source: e });
            return;
        }
    }
}

/// Windows reports an ICMP port-unreachable from an earlier `send_to` as a
/// `ConnectionReset` on the next receive. The socket itself is still fine.
fn udp_received(
    received: std::io::Result<(usize, SocketAddr)>,
    context: &str,
) -> ClientResult<Option<(usize, SocketAddr)>> {
    match received {
        Ok(datagram) => Ok(Some(datagram)),
        Err(e) if e.kind() == ErrorKind::ConnectionReset => {
            warn!("{}: ignoring an unreachable peer: {}", context, e);
            Ok(None)
        }
        Err(e) => Err(ClientError::socket(context, e)),
    }
}

fn is_peer_reset(e: &std::io::Error) -> bool {
    matches!(
        e.kind(),
        ErrorKind::ConnectionReset | ErrorKind::ConnectionAborted | ErrorKind::BrokenPipe
    )
}

fn local_port(addr: std::io::Result<SocketAddr>, context: &str) -> ClientResult<u16> {
    addr.map(|a| a.port())
        .map_err(|e| ClientError::socket(context, e))
}

/// Resolve `host:port` once, preferring IPv4.
pub async fn resolve_remote(host: &str, port: u16) -> ClientResult<SocketAddr> {
    let unresolved = || ClientError::UnresolvedHost {
        host: host.to_string(),
        port,
    };
    let addrs: Vec<SocketAddr> = lookup_host((host, port))
        .await
        .map_err(|_| unresolved())?
        .collect();

    addrs
        .iter()
        .find(|a| a.is_ipv4())
        .or_else(|| addrs.first())
        .copied()
        .ok_or_else(unresolved)
}
