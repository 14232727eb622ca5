//! Transport dispatcher: owns sockets and fans inbound datagrams into
//! the engine loop (RFC 3411 transport mappings)

pub mod udp;

pub use udp::UdpTransport;

use std::net::SocketAddr;
use std::sync::atomic::{AtomicI32, Ordering};

use dashmap::DashMap;
use tokio::sync::{mpsc, Notify};
use tokio::task::JoinHandle;
use tracing::info;

use crate::proto::Oid;
use crate::{Error, Result};

/// One datagram as received from a transport.
#[derive(Debug, Clone)]
pub struct InboundDatagram {
    pub domain: Oid,
    pub source: SocketAddr,
    pub octets: Vec<u8>,
}

/// Registry of transports keyed by domain OID plus the inbound fan-in
/// channel. Datagrams from one socket arrive in order; sockets have no
/// cross-ordering guarantee.
pub struct TransportDispatcher {
    transports: DashMap<Oid, std::sync::Arc<UdpTransport>>,
    inbound_tx: mpsc::UnboundedSender<InboundDatagram>,
    inbound_rx: Option<mpsc::UnboundedReceiver<InboundDatagram>>,
    jobs: AtomicI32,
    jobs_done: Notify,
    tasks: std::sync::Mutex<Vec<JoinHandle<()>>>,
}

impl Default for TransportDispatcher {
    fn default() -> Self {
        Self::new()
    }
}

impl TransportDispatcher {
    pub fn new() -> Self {
        let (inbound_tx, inbound_rx) = mpsc::unbounded_channel();
        Self {
            transports: DashMap::new(),
            inbound_tx,
            inbound_rx: Some(inbound_rx),
            jobs: AtomicI32::new(0),
            jobs_done: Notify::new(),
            tasks: std::sync::Mutex::new(Vec::new()),
        }
    }

    /// The engine loop takes the single inbound receiver once at
    /// startup.
    pub fn take_receiver(&mut self) -> Option<mpsc::UnboundedReceiver<InboundDatagram>> {
        self.inbound_rx.take()
    }

    /// Bind a UDP socket and start pumping its datagrams inbound.
    /// Returns the bound local address (useful with port 0 in tests).
    pub async fn register_udp(&self, domain: Oid, bind: SocketAddr) -> Result<SocketAddr> {
        let transport = UdpTransport::bind(domain.clone(), bind).await?;
        let local = transport.local_addr()?;
        let transport = std::sync::Arc::new(transport);
        let task = transport.clone().spawn_receiver(self.inbound_tx.clone());
        if let Ok(mut tasks) = self.tasks.lock() {
            tasks.push(task);
        }
        self.transports.insert(domain.clone(), transport);
        info!(%domain, %local, "transport registered");
        Ok(local)
    }

    /// Local address of the transport bound for `domain`.
    pub fn local_addr(&self, domain: &Oid) -> Result<SocketAddr> {
        self.transports
            .get(domain)
            .ok_or_else(|| Error::transport(format!("no transport for domain {}", domain)))?
            .local_addr()
    }

    /// Hand octets to the transport serving `domain`. UDP send failures
    /// surface synchronously; the engine treats them as transport
    /// errors, never as fatal.
    pub async fn send_message(&self, domain: &Oid, address: SocketAddr, octets: &[u8]) -> Result<()> {
        let transport = self
            .transports
            .get(domain)
            .ok_or_else(|| Error::transport(format!("no transport for domain {}", domain)))?
            .clone();
        transport.send_to(octets, address).await
    }

    /// Applications register long-running work so the dispatcher keeps
    /// serving while it is outstanding.
    pub fn job_started(&self) {
        self.jobs.fetch_add(1, Ordering::SeqCst);
    }

    pub fn job_finished(&self) {
        if self.jobs.fetch_sub(1, Ordering::SeqCst) == 1 {
            self.jobs_done.notify_waiters();
        }
    }

    pub fn pending_jobs(&self) -> i32 {
        self.jobs.load(Ordering::SeqCst)
    }

    /// Wait until every registered job has finished.
    pub async fn wait_jobs_done(&self) {
        while self.jobs.load(Ordering::SeqCst) > 0 {
            let notified = self.jobs_done.notified();
            if self.jobs.load(Ordering::SeqCst) == 0 {
                break;
            }
            notified.await;
        }
    }

    /// Stop all receive tasks and drop the sockets.
    pub fn close(&self) {
        if let Ok(mut tasks) = self.tasks.lock() {
            for task in tasks.drain(..) {
                task.abort();
            }
        }
        self.transports.clear();
        info!("transport dispatcher closed");
    }
}

impl Drop for TransportDispatcher {
    fn drop(&mut self) {
        self.close();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::proto::oids;

    #[tokio::test]
    async fn test_udp_roundtrip_between_two_dispatchers() {
        let mut a = TransportDispatcher::new();
        let mut rx_a = a.take_receiver().unwrap();
        let addr_a = a
            .register_udp(oids::TRANSPORT_UDP_IPV4.clone(), "127.0.0.1:0".parse().unwrap())
            .await
            .unwrap();

        let mut b = TransportDispatcher::new();
        let _rx_b = b.take_receiver().unwrap();
        let _addr_b = b
            .register_udp(oids::TRANSPORT_UDP_IPV4.clone(), "127.0.0.1:0".parse().unwrap())
            .await
            .unwrap();

        b.send_message(&oids::TRANSPORT_UDP_IPV4, addr_a, b"hello snmp")
            .await
            .unwrap();

        let dgram = rx_a.recv().await.unwrap();
        assert_eq!(dgram.octets, b"hello snmp");
        assert_eq!(dgram.domain, *oids::TRANSPORT_UDP_IPV4);
    }

    #[tokio::test]
    async fn test_send_without_transport_fails() {
        let dispatcher = TransportDispatcher::new();
        let err = dispatcher
            .send_message(
                &oids::TRANSPORT_UDP_IPV6,
                "127.0.0.1:1161".parse().unwrap(),
                b"x",
            )
            .await
            .unwrap_err();
        assert!(matches!(err, Error::Transport(_)));
    }

    #[tokio::test]
    async fn test_job_accounting() {
        let dispatcher = TransportDispatcher::new();
        assert_eq!(dispatcher.pending_jobs(), 0);
        dispatcher.job_started();
        dispatcher.job_started();
        assert_eq!(dispatcher.pending_jobs(), 2);
        dispatcher.job_finished();
        dispatcher.job_finished();
        dispatcher.wait_jobs_done().await;
        assert_eq!(dispatcher.pending_jobs(), 0);
    }
}
