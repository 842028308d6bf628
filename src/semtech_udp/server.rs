use std::net::SocketAddr;

use tokio::net::UdpSocket;
use tokio::sync::watch;
use tracing::{error, info, warn};

use super::ProtocolEngine;
use crate::constants::UDP_BUFFER_SIZE;

/// UDP endpoint the packet forwarder talks to.
pub struct UdpServer {
    socket: UdpSocket,
    engine: ProtocolEngine,
}

impl UdpServer {
    pub async fn bind(addr: SocketAddr, engine: ProtocolEngine) -> std::io::Result<Self> {
        let socket = UdpSocket::bind(addr).await?;
        info!("Listening for packet forwarder on udp://{}", socket.local_addr()?);
        Ok(Self { socket, engine })
    }

    pub fn local_addr(&self) -> std::io::Result<SocketAddr> {
        self.socket.local_addr()
    }

    /// Serve datagrams until `shutdown` flips to `true`.
    pub async fn run(mut self, mut shutdown: watch::Receiver<bool>) {
        let mut buffer = vec![0u8; UDP_BUFFER_SIZE];

        loop {
            if *shutdown.borrow() {
                break;
            }
            tokio::select! {
                received = self.socket.recv_from(&mut buffer) => {
                    let (size, sender) = match received {
                        Ok(received) => received,
                        Err(e) => {
                            warn!("UDP receive failed: {}", e);
                            continue;
                        }
                    };
                    let Some((reply, to)) = self.engine.process(&buffer[..size], sender) else {
                        continue;
                    };
                    if let Err(e) = self.socket.send_to(&reply, to).await {
                        error!("Cannot reply to {}: {}", to, e);
                    }
                }
                changed = shutdown.changed() => {
                    if changed.is_err() {
                        break;
                    }
                }
            }
        }
        info!("UDP server stopped");
    }
}
