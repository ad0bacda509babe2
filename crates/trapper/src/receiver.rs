//! Trap ingress
//!
//! Traps arrive already decoded as JSON: one per UDP datagram, or one per
//! line on a TCP connection. The sender is always the peer address.

use consolidation::{Classification, EventClassifier};
use serde::Deserialize;
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::net::{TcpListener, TcpStream, UdpSocket};
use tokio::sync::Semaphore;
use trap_model::{TrapEvent, VarBinding};
use tracing::{debug, error, info, warn};

/// Largest datagram accepted
const MAX_DATAGRAM: usize = 65_535;

/// Wire shape of one trap
#[derive(Debug, Deserialize)]
struct TrapMessage {
    #[serde(default)]
    sender_name: Option<String>,
    #[serde(default)]
    bindings: Vec<VarBinding>,
}

/// Decodes inbound traps and hands them to the classifier
#[derive(Clone)]
pub struct Receiver {
    classifier: Arc<dyn EventClassifier>,
    slots: Arc<Semaphore>,
}

impl Receiver {
    /// `threads` bounds how many traps are classified at once
    pub fn new(classifier: Arc<dyn EventClassifier>, threads: usize) -> Self {
        Self {
            classifier,
            slots: Arc::new(Semaphore::new(threads.max(1))),
        }
    }

    /// Decode and classify one trap once a slot is free
    pub async fn handle(&self, payload: &[u8], peer: SocketAddr) -> Option<Classification> {
        let _slot = self.slots.acquire().await.ok()?;
        self.process(payload, peer).await
    }

    /// Decode and classify; the caller holds a slot
    async fn process(&self, payload: &[u8], peer: SocketAddr) -> Option<Classification> {
        let event = match decode(payload, peer) {
            Ok(event) => event,
            Err(e) => {
                warn!("dropping malformed trap from {}: {}", peer, e);
                metrics::counter!("trapper_malformed_total").increment(1);
                return None;
            }
        };

        debug!("trap from {}: {}", event.sender_display(), event.body().trim_end());

        let classification = self.classifier.classify(&event).await;
        if !event.is_handled() {
            debug!("trap from {} left unhandled", peer);
        }
        Some(classification)
    }

    /// Receive datagrams until the socket fails.
    ///
    /// A slot is taken before each read, so with every slot busy further
    /// datagrams wait in the socket buffer instead of in spawned tasks.
    pub async fn serve_udp(self, socket: UdpSocket) -> std::io::Result<()> {
        info!("Listening on udp://{}", socket.local_addr()?);
        let mut buf = vec![0u8; MAX_DATAGRAM];

        loop {
            let Ok(slot) = self.slots.clone().acquire_owned().await else {
                return Ok(());
            };
            let (len, peer) = socket.recv_from(&mut buf).await?;
            let payload = buf[..len].to_vec();
            let receiver = self.clone();
            tokio::spawn(async move {
                receiver.process(&payload, peer).await;
                drop(slot);
            });
        }
    }

    /// Accept connections until the listener fails
    pub async fn serve_tcp(self, listener: TcpListener) -> std::io::Result<()> {
        info!("Listening on tcp://{}", listener.local_addr()?);

        loop {
            let (stream, peer) = listener.accept().await?;
            debug!("connection from {}", peer);
            let receiver = self.clone();
            tokio::spawn(async move {
                if let Err(e) = receiver.read_stream(stream, peer).await {
                    error!("error reading traps from {}: {}", peer, e);
                }
            });
        }
    }

    async fn read_stream(&self, stream: TcpStream, peer: SocketAddr) -> std::io::Result<()> {
        let mut lines = BufReader::new(stream).lines();
        while let Some(line) = lines.next_line().await? {
            if line.trim().is_empty() {
                continue;
            }
            self.handle(line.as_bytes(), peer).await;
        }
        debug!("connection from {} closed", peer);
        Ok(())
    }
}

fn decode(payload: &[u8], peer: SocketAddr) -> Result<TrapEvent, serde_json::Error> {
    let message: TrapMessage = serde_json::from_slice(payload)?;
    // dual-stack sockets report IPv4 senders as ::ffff:a.b.c.d
    let event = TrapEvent::new(peer.ip().to_canonical(), message.bindings);
    Ok(match message.sender_name {
        Some(name) => event.with_sender_name(name),
        None => event,
    })
}
