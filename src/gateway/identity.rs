use std::fmt;
use std::path::Path;

use base64::Engine;
use thiserror::Error;
use tracing::info;

use crate::constants::SYSFS_NET_ROOT;

#[derive(Debug, Error)]
pub enum IdentityError {
    #[error("cannot read hardware address of {iface}: {source}")]
    Unreadable {
        iface: String,
        #[source]
        source: std::io::Error,
    },

    #[error("malformed hardware address `{address}` on {iface}")]
    Malformed { iface: String, address: String },
}

/// EUI-64 of the gateway: the interface MAC with `fffe` inserted after the
/// third byte. Canonical text is 16 lowercase hex characters.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct GatewayIdentity(String);

impl GatewayIdentity {
    pub fn from_mac(mac: [u8; 6]) -> Self {
        GatewayIdentity(format!(
            "{:02x}{:02x}{:02x}fffe{:02x}{:02x}{:02x}",
            mac[0], mac[1], mac[2], mac[3], mac[4], mac[5]
        ))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// The form carried in enriched events: base64 of the hex text.
    pub fn to_base64(&self) -> String {
        base64::engine::general_purpose::STANDARD.encode(self.0.as_bytes())
    }
}

impl fmt::Display for GatewayIdentity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Read the identity from the hardware address of `iface`.
pub fn resolve_identity(iface: &str) -> Result<GatewayIdentity, IdentityError> {
    resolve_identity_in(Path::new(SYSFS_NET_ROOT), iface)
}

/// Same as [`resolve_identity`] against an arbitrary sysfs-style root.
pub fn resolve_identity_in(net_root: &Path, iface: &str) -> Result<GatewayIdentity, IdentityError> {
    let path = net_root.join(iface).join("address");
    let contents = std::fs::read_to_string(&path).map_err(|source| IdentityError::Unreadable {
        iface: iface.to_string(),
        source,
    })?;
    let mac = parse_mac(contents.trim()).ok_or_else(|| IdentityError::Malformed {
        iface: iface.to_string(),
        address: contents.trim().to_string(),
    })?;

    let identity = GatewayIdentity::from_mac(mac);
    info!("Gateway EUI {} derived from {}", identity, iface);
    Ok(identity)
}

fn parse_mac(text: &str) -> Option<[u8; 6]> {
    let parts: Vec<u8> = text
        .split(':')
        .map(|h| u8::from_str_radix(h, 16))
        .collect::<Result<_, _>>()
        .ok()?;
    parts.try_into().ok()
}
