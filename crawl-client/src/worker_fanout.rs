//! Connections to every known Worker, round-robin balanced.

use std::collections::HashMap;

use crawl_core::wire::{self, ClientReply, ClientRequest};
use crawl_core::PeerId;
use tokio::net::TcpStream;
use tokio::sync::mpsc;
use tracing::{info, warn};

#[derive(Default)]
pub struct WorkerFanout {
    conns: HashMap<PeerId, mpsc::Sender<ClientRequest>>,
    order: Vec<PeerId>,
    next: usize,
}

impl WorkerFanout {
    pub fn is_empty(&self) -> bool {
        self.conns.is_empty()
    }

    /// Connect to `id` at `addr`. If `id` is already connected (an address
    /// `PeerEvent::Update`), the old route is dropped first so the new one
    /// replaces it cleanly instead of leaving a duplicate entry behind.
    pub fn connect(&mut self, id: PeerId, addr: std::net::SocketAddr, replies: mpsc::Sender<ClientReply>) {
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

    pub async fn send(&mut self, request: ClientRequest) -> bool {
        if self.order.is_empty() {
            return false;
        }
        for _ in 0..self.order.len() {
            let id = self.order[self.next % self.order.len()];
            self.next = self.next.wrapping_add(1);
            if let Some(tx) = self.conns.get(&id) {
                if tx.send(request.clone()).await.is_ok() {
                    return true;
                }
            }
        }
        false
    }
}

async fn pump(
    id: PeerId,
    addr: std::net::SocketAddr,
    mut outgoing: mpsc::Receiver<ClientRequest>,
    replies: mpsc::Sender<ClientReply>,
) {
    let stream = match TcpStream::connect(addr).await {
        Ok(stream) => stream,
        Err(err) => {
            warn!(%id, %addr, %err, "failed to connect to worker");
            return;
        },
    };
    info!(%id, %addr, "connected to worker");
    let (mut reader, mut writer) = stream.into_split();

    loop {
        tokio::select! {
            outgoing = outgoing.recv() => {
                match outgoing {
                    Some(request) => {
                        if let Err(err) = wire::write_frame(&mut writer, &request).await {
                            warn!(%id, %err, "worker write failed, dropping connection");
                            return;
                        }
                    }
                    None => return,
                }
            }
            reply = wire::read_frame::<ClientReply, _>(&mut reader) => {
                match reply {
                    Ok(reply) => {
                        if replies.send(reply).await.is_err() {
                            return;
                        }
                    }
                    Err(err) => {
                        warn!(%id, %err, "worker read failed, dropping connection");
                        return;
                    }
                }
            }
        }
    }
}
