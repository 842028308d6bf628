//! Gateway side of the bridge: the Semtech UDP packet-forwarder protocol.

pub mod handlers;
pub mod packet;
pub mod server;

use std::net::SocketAddr;
use std::sync::Arc;

use tracing::{debug, trace};

use crate::context::BridgeContext;
use handlers::handler_for;
use packet::PacketEnvelope;

pub use packet::{PacketError, PacketType};
pub use server::UdpServer;

/// Decodes datagrams, dispatches them to their handler and says where the
/// reply goes.
pub struct ProtocolEngine {
    ctx: Arc<BridgeContext>,
    last_sender: Option<SocketAddr>,
}

impl ProtocolEngine {
    pub fn new(ctx: Arc<BridgeContext>) -> Self {
        Self {
            ctx,
            last_sender: None,
        }
    }

    pub fn context(&self) -> &BridgeContext {
        &self.ctx
    }

    /// Address that most recently sent a datagram.
    pub fn last_sender(&self) -> Option<SocketAddr> {
        self.last_sender
    }

    /// Handle one datagram. Returns the reply and its destination, if any.
    /// Datagrams with a wrong version or an unknown type are dropped.
    pub fn process(&mut self, datagram: &[u8], sender: SocketAddr) -> Option<(Vec<u8>, SocketAddr)> {
        self.last_sender = Some(sender);

        let packet = match PacketEnvelope::parse(datagram, sender) {
            Ok(packet) => packet,
            Err(e) => {
                debug!("Ignoring datagram from {}: {}", sender, e);
                return None;
            }
        };
        trace!(
            "{:?} token {:04x} from {} ({} byte body)",
            packet.packet_type,
            packet.token_u16(),
            sender,
            packet.payload.len()
        );

        let Some(handler) = handler_for(packet.packet_type) else {
            debug!("No handler for {:?} from {}", packet.packet_type, sender);
            return None;
        };
        let reply = handler.handle(&packet, &self.ctx)?;
        Some((reply, self.last_sender.unwrap_or(sender)))
    }
}
