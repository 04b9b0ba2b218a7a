use std::net::SocketAddr;

use tokio::sync::mpsc;
use uuid::Uuid;

/// A connected mod client and the queue feeding its socket writer.
#[derive(Debug)]
pub struct TcpClient {
    pub id: Uuid,
    pub addr: SocketAddr,
    outbound: mpsc::UnboundedSender<String>,
}

impl TcpClient {
    pub fn new(id: Uuid, addr: SocketAddr, outbound: mpsc::UnboundedSender<String>) -> Self {
        Self { id, addr, outbound }
    }
}

/// Live relay state. Only the relay loop touches it.
///
/// UDP keeps a single session: one game client per machine, the most recent
/// local sender wins.
#[derive(Debug, Default)]
pub struct RelaySession {
    clients: Vec<TcpClient>,
    last_udp_sender: Option<SocketAddr>,
}

impl RelaySession {
    /// Returns `true` when this is the first client (0 → 1).
    pub fn add_client(&mut self, client: TcpClient) -> bool {
        if self.clients.iter().any(|c| c.id == client.id) {
            return false;
        }
        self.clients.push(client);
        self.clients.len() == 1
    }

    /// Returns the removed client, or `None` if it was already gone.
    pub fn remove_client(&mut self, id: Uuid) -> Option<TcpClient> {
        let index = self.clients.iter().position(|c| c.id == id)?;
        Some(self.clients.remove(index))
    }

    pub fn client(&self, id: Uuid) -> Option<&TcpClient> {
        self.clients.iter().find(|c| c.id == id)
    }

    pub fn client_count(&self) -> usize {
        self.clients.len()
    }

    pub fn is_empty(&self) -> bool {
        self.clients.is_empty()
    }

    /// Queue `message` for every connected client. Returns how many queues
    /// accepted it.
    pub fn broadcast(&self, message: &str) -> usize {
        self.clients
            .iter()
            .filter(|c| c.outbound.send(message.to_string()).is_ok())
            .count()
    }

    pub fn record_udp_sender(&mut self, addr: SocketAddr) {
        self.last_udp_sender = Some(addr);
    }

    pub fn udp_destination(&self) -> Option<SocketAddr> {
        self.last_udp_sender
    }
}
