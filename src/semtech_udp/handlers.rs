//! One handler per inbound packet type.
//!
//! A handler returns the reply to send back to the packet's sender, if the
//! protocol defines one. Publishing happens inline through the context.

use serde_json::Value;
use tracing::{debug, warn};

use super::packet::{PacketEnvelope, PacketType};
use crate::context::BridgeContext;

pub trait PacketHandler: Send + Sync {
    fn handle(&self, packet: &PacketEnvelope<'_>, ctx: &BridgeContext) -> Option<Vec<u8>>;
}

/// Handler for a packet type, `None` for types the gateway never sends.
pub fn handler_for(packet_type: PacketType) -> Option<&'static dyn PacketHandler> {
    match packet_type {
        PacketType::PushData => Some(&PushDataHandler),
        PacketType::PullData => Some(&PullDataHandler),
        PacketType::TxAck => Some(&TxAckHandler),
        PacketType::PushAck | PacketType::PullResp | PacketType::PullAck => None,
    }
}

fn parse_body(packet: &PacketEnvelope<'_>) -> Option<Value> {
    match serde_json::from_slice::<Value>(packet.payload) {
        Ok(body) => Some(body),
        Err(e) => {
            warn!(
                "Invalid JSON in {:?} from {} (token {:04x}): {}",
                packet.packet_type,
                packet.sender,
                packet.token_u16(),
                e
            );
            None
        }
    }
}

pub struct PushDataHandler;

impl PacketHandler for PushDataHandler {
    fn handle(&self, packet: &PacketEnvelope<'_>, ctx: &BridgeContext) -> Option<Vec<u8>> {
        // The ack is owed whatever the body contains.
        let ack = packet.ack(PacketType::PushAck);

        let Some(body) = parse_body(packet) else {
            return Some(ack);
        };

        if let Some(stat) = body.get("stat") {
            match ctx.translator.gateway_stats(stat) {
                Ok(payload) => ctx.publish(&ctx.topics.gateway_stat, payload),
                Err(e) => warn!("Dropping stat from {}: {}", packet.sender, e),
            }
        }
        if let Some(rxpk) = body.get("rxpk") {
            for payload in ctx.translator.uplinks(rxpk) {
                ctx.publish(&ctx.topics.uplink, payload);
            }
        }

        Some(ack)
    }
}

pub struct PullDataHandler;

impl PacketHandler for PullDataHandler {
    fn handle(&self, packet: &PacketEnvelope<'_>, ctx: &BridgeContext) -> Option<Vec<u8>> {
        let Some(entry) = ctx.queue.pop_if_any() else {
            return Some(packet.ack(PacketType::PullAck));
        };

        let reply = packet.pull_resp(entry.as_bytes());
        debug!("PULL_RESP of {} bytes to {}", entry.len(), packet.sender);

        match serde_json::from_str::<Value>(&entry) {
            Ok(body) => match body.get("txpk") {
                Some(txpk) => match ctx.translator.downlink(txpk) {
                    Ok(payload) => ctx.publish(&ctx.topics.downlink, payload),
                    Err(e) => warn!("Downlink sent but not reported: {}", e),
                },
                None => warn!("Queued downlink has no txpk object"),
            },
            Err(e) => warn!("Queued downlink is not valid JSON: {}", e),
        }

        Some(reply)
    }
}

pub struct TxAckHandler;

impl PacketHandler for TxAckHandler {
    fn handle(&self, packet: &PacketEnvelope<'_>, ctx: &BridgeContext) -> Option<Vec<u8>> {
        if !packet.has_payload() {
            debug!("TX_ACK without body from {}", packet.sender);
            return None;
        }
        let body = parse_body(packet)?;

        if let Some(txpk_ack) = body.get("txpk_ack") {
            match ctx.translator.downlink_ack(txpk_ack) {
                Ok(payload) => ctx.publish(&ctx.topics.downlink_ack, payload),
                Err(e) => warn!("Dropping txpk_ack from {}: {}", packet.sender, e),
            }
        }
        None
    }
}
