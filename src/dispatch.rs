//! Packet dispatch module
//!
//! Maps inbound datagrams onto peer records: looks the sender up (or adds
//! it), then updates its timestamps, active address and bandwidth estimate.
//! Only the leading role tag of a datagram is interpreted.

use std::net::SocketAddr;
use std::sync::Arc;
use tokio::net::UdpSocket;
use tracing::{debug, trace, warn};

use crate::error::{PeerError, Result};
use crate::peer::{PeerData, PeerTable, PeerType};

/// Receive buffer size. Longer datagrams are truncated by the socket and
/// counted at this size.
pub const MAX_DATAGRAM_SIZE: usize = 1500;

/// Builds the payload attached to a peer the first time it is seen
pub type PayloadFactory = Box<dyn Fn(PeerType) -> Option<Box<dyn PeerData>> + Send + Sync>;

/// Routes datagrams to records in a [`PeerTable`]
pub struct PacketDispatcher {
    table: Arc<PeerTable>,
    payload_factory: Option<PayloadFactory>,
}

impl PacketDispatcher {
    pub fn new(table: Arc<PeerTable>) -> Self {
        Self {
            table,
            payload_factory: None,
        }
    }

    /// Attach role-specific payloads to peers as they appear
    pub fn with_payload_factory(mut self, factory: PayloadFactory) -> Self {
        self.payload_factory = Some(factory);
        self
    }

    pub fn table(&self) -> &Arc<PeerTable> {
        &self.table
    }

    /// Process one datagram from `sender`, returning the peer id it belongs to
    pub fn handle_datagram(&self, sender: SocketAddr, data: &[u8]) -> Result<u16> {
        let Some(&tag) = data.first() else {
            return Err(PeerError::packet_error_with_sender("Empty datagram", sender.to_string()));
        };
        let peer_type = PeerType::from_byte(tag);

        let id = self.table.add_or_update_peer(Some(sender), None, peer_type)?;
        let factory = self.payload_factory.as_ref();

        self.table
            .with_peer_mut(id, |record| {
                record.touch();
                if record.active_socket().is_none() {
                    record.activate_public_socket();
                }
                record.record_bytes_received(data.len());

                if record.linked_data().is_none() {
                    if let Some(payload) = factory.and_then(|make| make(peer_type)) {
                        record.set_linked_data(Some(payload));
                    }
                }
            })
            .ok_or_else(|| {
                PeerError::table_error_with_peer("Peer removed while dispatching", id.to_string())
            })?;

        trace!("{} byte datagram from {} -> peer {}", data.len(), sender, id);
        Ok(id)
    }

    /// Receive datagrams from `socket` until it errors
    pub async fn serve(&self, socket: &UdpSocket) -> Result<()> {
        let local = socket.local_addr()?;
        debug!("Dispatching datagrams received on {}", local);

        let mut buf = vec![0u8; MAX_DATAGRAM_SIZE];
        loop {
            let (len, sender) = socket.recv_from(&mut buf).await.map_err(|e| {
                PeerError::network_error_full("Receive failed", local.to_string(), e.to_string())
            })?;

            if len == MAX_DATAGRAM_SIZE {
                trace!("Datagram from {} filled the receive buffer, may be truncated", sender);
            }

            if let Err(e) = self.handle_datagram(sender, &buf[..len]) {
                warn!("Dropped datagram from {}: {}", sender, e);
            }
        }
    }
}
