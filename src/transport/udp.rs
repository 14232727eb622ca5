//! UDP transport mapping (RFC 3417 §2)

use std::net::SocketAddr;
use std::sync::Arc;

use tokio::net::UdpSocket;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{error, trace};

use super::InboundDatagram;
use crate::proto::Oid;
use crate::{Error, Result};

/// Largest datagram the receiver will accept.
const RECV_BUF_SIZE: usize = 65535;

pub struct UdpTransport {
    domain: Oid,
    socket: Arc<UdpSocket>,
}

impl UdpTransport {
    pub async fn bind(domain: Oid, addr: SocketAddr) -> Result<Self> {
        let socket = UdpSocket::bind(addr)
            .await
            .map_err(|e| Error::transport(format!("failed to bind {}: {}", addr, e)))?;
        Ok(Self {
            domain,
            socket: Arc::new(socket),
        })
    }

    pub fn local_addr(&self) -> Result<SocketAddr> {
        self.socket
            .local_addr()
            .map_err(|e| Error::transport(format!("local_addr: {}", e)))
    }

    pub async fn send_to(&self, octets: &[u8], addr: SocketAddr) -> Result<()> {
        self.socket
            .send_to(octets, addr)
            .await
            .map_err(|e| Error::transport(format!("send to {}: {}", addr, e)))?;
        trace!(%addr, len = octets.len(), "datagram sent");
        Ok(())
    }

    /// Pump received datagrams into the engine loop, in arrival order.
    pub fn spawn_receiver(
        self: Arc<Self>,
        tx: mpsc::UnboundedSender<InboundDatagram>,
    ) -> JoinHandle<()> {
        tokio::spawn(async move {
            let mut buf = vec![0u8; RECV_BUF_SIZE];
            loop {
                match self.socket.recv_from(&mut buf).await {
                    Ok((len, source)) => {
                        trace!(%source, len, "datagram received");
                        let dgram = InboundDatagram {
                            domain: self.domain.clone(),
                            source,
                            octets: buf[..len].to_vec(),
                        };
                        if tx.send(dgram).is_err() {
                            // engine loop is gone; stop receiving
                            break;
                        }
                    }
                    Err(e) => {
                        error!(error = %e, "UDP receive failed");
                    }
                }
            }
        })
    }
}
