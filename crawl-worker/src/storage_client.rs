//! Multiplexed connections to every known Storage peer.
//!
//! Requests may land on any connected Storage; replies come back on a
//! single aggregated channel and are routed by the `(client_id, url)` key
//! carried in the payload, not by which connection they arrived on —
//! replies may arrive out of order across different peer Storages.

use std::collections::HashMap;

use crawl_core::wire::{self, StorageReply, StorageRequest};
use crawl_core::PeerId;
use tokio::net::TcpStream;
use tokio::sync::mpsc;
use tracing::{info, warn};

/// Owned by the worker's main actor: one outbound channel per connected
/// Storage, picked round-robin for outgoing fetches/updates.
#[derive(Default)]
pub struct StorageFanout {
    conns: HashMap<PeerId, mpsc::Sender<StorageRequest>>,
    order: Vec<PeerId>,
    next: usize,
}

impl StorageFanout {
    pub fn is_empty(&self) -> bool {
        self.conns.is_empty()
    }

    pub fn len(&self) -> usize {
        self.conns.len()
    }

    /// Open a connection to a newly discovered Storage, spawning its
    /// read/write pump. Replies are forwarded on `replies`. If `id` is
    /// already connected (an address `PeerEvent::Update`), the old route
    /// is dropped first — its pump task exits on its own once the stale
    /// sender is gone.
    pub fn connect(&mut self, id: PeerId, addr: std::net::SocketAddr, replies: mpsc::Sender<StorageReply>) {
        self.disconnect(&id);
        let (tx, rx) = mpsc::channel(crawl_core::settings::CHANNEL_CAPACITY);
        self.conns.insert(id, tx);
        self.order.push(id);
        tokio::spawn(pump(id, addr, rx, replies));
    }

    pub fn disconnect(&mut self, id: &PeerId) {
        self.conns.remove(id);
        self.order.retain(|existing| existing != id);
        self.next = 0;
    }

    /// Send a request to the next Storage in round-robin order. `None` if
    /// no Storage is currently connected.
    pub async fn send(&mut self, request: StorageRequest) -> Option<()> {
        if self.order.is_empty() {
            return None;
        }
        for _ in 0..self.order.len() {
            let id = self.order[self.next % self.order.len()];
            self.next = self.next.wrapping_add(1);
            if let Some(tx) = self.conns.get(&id) {
                if tx.send(request.clone()).await.is_ok() {
                    return Some(());
                }
            }
        }
        None
    }

}

async fn pump(
    id: PeerId,
    addr: std::net::SocketAddr,
    mut outgoing: mpsc::Receiver<StorageRequest>,
    replies: mpsc::Sender<StorageReply>,
) {
    let stream = match TcpStream::connect(addr).await {
        Ok(stream) => stream,
        Err(err) => {
            warn!(%id, %addr, %err, "failed to connect to storage");
            return;
        },
    };
    info!(%id, %addr, "connected to storage");
    let (mut reader, mut writer) = stream.into_split();

    loop {
        tokio::select! {
            outgoing = outgoing.recv() => {
                match outgoing {
                    Some(request) => {
                        if let Err(err) = wire::write_frame(&mut writer, &request).await {
                            warn!(%id, %err, "storage write failed, dropping connection");
                            return;
                        }
                        if let StorageRequest::Update { .. } = request {
                            continue;
                        }
                    }
                    None => return,
                }
            }
            reply = wire::read_frame::<StorageReply, _>(&mut reader) => {
                match reply {
                    Ok(reply) => {
                        if replies.send(reply).await.is_err() {
                            return;
                        }
                    }
                    Err(err) => {
                        warn!(%id, %err, "storage read failed, dropping connection");
                        return;
                    }
                }
            }
        }
    }
}
