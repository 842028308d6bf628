//! GWMP datagram framing.
//!
//! ```text
//! PUSH_DATA  [ver][token:2][0x00][eui:8][json]
//! PULL_DATA  [ver][token:2][0x02][eui:8]
//! TX_ACK     [ver][token:2][0x05][eui:8][json?]
//! ```

use std::net::SocketAddr;

use thiserror::Error;

use crate::constants::{
    ACK_LEN, DATA_OFFSET, HEADER_LEN, PKT_PULL_ACK, PKT_PULL_DATA, PKT_PULL_RESP, PKT_PUSH_ACK,
    PKT_PUSH_DATA, PKT_TX_ACK, PROTOCOL_VERSION,
};

#[derive(Debug, Error, PartialEq, Eq)]
pub enum PacketError {
    #[error("datagram of {0} bytes is shorter than the header")]
    TooShort(usize),

    #[error("protocol version {0} is not supported")]
    UnsupportedVersion(u8),

    #[error("unknown packet type 0x{0:02x}")]
    UnknownType(u8),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum PacketType {
    PushData = PKT_PUSH_DATA,
    PushAck = PKT_PUSH_ACK,
    PullData = PKT_PULL_DATA,
    PullResp = PKT_PULL_RESP,
    PullAck = PKT_PULL_ACK,
    TxAck = PKT_TX_ACK,
}

impl TryFrom<u8> for PacketType {
    type Error = PacketError;

    fn try_from(value: u8) -> Result<Self, Self::Error> {
        match value {
            PKT_PUSH_DATA => Ok(PacketType::PushData),
            PKT_PUSH_ACK => Ok(PacketType::PushAck),
            PKT_PULL_DATA => Ok(PacketType::PullData),
            PKT_PULL_RESP => Ok(PacketType::PullResp),
            PKT_PULL_ACK => Ok(PacketType::PullAck),
            PKT_TX_ACK => Ok(PacketType::TxAck),
            other => Err(PacketError::UnknownType(other)),
        }
    }
}

/// A decoded inbound datagram, borrowing its body from the receive buffer.
#[derive(Debug, Clone, Copy)]
pub struct PacketEnvelope<'a> {
    pub version: u8,
    pub token: [u8; 2],
    pub packet_type: PacketType,
    pub gateway_eui: Option<[u8; 8]>,
    /// JSON body after the EUI, trailing NULs and whitespace trimmed.
    pub payload: &'a [u8],
    pub sender: SocketAddr,
}

impl<'a> PacketEnvelope<'a> {
    pub fn parse(datagram: &'a [u8], sender: SocketAddr) -> Result<Self, PacketError> {
        if datagram.len() < HEADER_LEN {
            return Err(PacketError::TooShort(datagram.len()));
        }
        if datagram[0] != PROTOCOL_VERSION {
            return Err(PacketError::UnsupportedVersion(datagram[0]));
        }
        let packet_type = PacketType::try_from(datagram[3])?;

        let gateway_eui = datagram
            .get(HEADER_LEN..DATA_OFFSET)
            .and_then(|eui| <[u8; 8]>::try_from(eui).ok());
        let payload = datagram.get(DATA_OFFSET..).unwrap_or_default();
        let end = payload
            .iter()
            .rposition(|b| *b != 0 && !b.is_ascii_whitespace())
            .map_or(0, |i| i + 1);

        Ok(Self {
            version: datagram[0],
            token: [datagram[1], datagram[2]],
            packet_type,
            gateway_eui,
            payload: &payload[..end],
            sender,
        })
    }

    pub fn token_u16(&self) -> u16 {
        u16::from_be_bytes(self.token)
    }

    pub fn has_payload(&self) -> bool {
        !self.payload.is_empty()
    }

    /// 32-byte zero-padded acknowledgment echoing this packet's version and token.
    pub fn ack(&self, reply: PacketType) -> Vec<u8> {
        let mut out = vec![0u8; ACK_LEN];
        out[..HEADER_LEN].copy_from_slice(&self.header(reply));
        out
    }

    /// PULL_RESP carrying `json` right after the header.
    pub fn pull_resp(&self, json: &[u8]) -> Vec<u8> {
        let mut out = Vec::with_capacity(HEADER_LEN + json.len());
        out.extend_from_slice(&self.header(PacketType::PullResp));
        out.extend_from_slice(json);
        out
    }

    fn header(&self, reply: PacketType) -> [u8; HEADER_LEN] {
        [self.version, self.token[0], self.token[1], reply as u8]
    }
}
