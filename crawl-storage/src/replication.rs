//! Storage-to-Storage replication.
//!
//! The accepting side (this node's replication out-socket) owns the
//! registered-peer map as a single actor task: no shared map behind a
//! lock, just one task with exclusive ownership and a message inbox.

use std::collections::HashMap;
use std::net::SocketAddr;
use std::sync::Arc;

use crawl_core::cache::FsCache;
use crawl_core::wire::{self, ReplicationMessage};
use crawl_core::PeerId;
use tokio::io::AsyncWrite;
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::mpsc;
use tracing::{info, instrument, warn};

pub enum HubMsg {
    /// A peer Storage finished its hello handshake on an accepted
    /// connection; register it for future update pushes.
    Registered {
        id: PeerId,
        updateme: bool,
        writer: mpsc::Sender<ReplicationMessage>,
    },
    Unregistered(PeerId),
    /// A Worker update with `spread: true` landed on the router socket.
    LocalUpdate { url: String, content: String },
}

/// Owns `storage_conns` and the catch-up/pump logic. Spawn as its own
/// task; everything else talks to it through `HubMsg`.
pub async fn run(mut inbox: mpsc::Receiver<HubMsg>, cache: Arc<FsCache>) {
    let mut conns: HashMap<PeerId, mpsc::Sender<ReplicationMessage>> = HashMap::new();

    while let Some(msg) = inbox.recv().await {
        match msg {
            HubMsg::Registered { id, updateme, writer } => {
                info!(%id, updateme, "replication peer registered");
                if updateme {
                    stream_catch_up(cache.clone(), writer.clone()).await;
                }
                conns.insert(id, writer);
            },
            HubMsg::Unregistered(id) => {
                info!(%id, "replication peer gone");
                conns.remove(&id);
            },
            HubMsg::LocalUpdate { url, content } => {
                let message = ReplicationMessage::Update {
                    url: Some(url),
                    content: Some(content),
                    spread: false,
                };
                for writer in conns.values() {
                    let _ = writer.send(message.clone()).await;
                }
            },
        }
    }
}

async fn stream_catch_up(cache: Arc<FsCache>, writer: mpsc::Sender<ReplicationMessage>) {
    match cache.iter().await {
        Ok(entries) => {
            for (url, content) in entries {
                let message = ReplicationMessage::Update {
                    url: Some(url),
                    content: Some(content),
                    spread: false,
                };
                if writer.send(message).await.is_err() {
                    return;
                }
            }
            let _ = writer.send(ReplicationMessage::end_of_stream()).await;
        },
        Err(err) => warn!(%err, "failed to read cache for catch-up stream"),
    }
}

/// Writer pump for one accepted connection: drains `rx` and writes
/// frames, deregistering with the hub on any error.
#[instrument(skip(writer, rx, hub), fields(%id))]
async fn writer_pump<W: AsyncWrite + Unpin>(
    mut writer: W,
    mut rx: mpsc::Receiver<ReplicationMessage>,
    id: PeerId,
    hub: mpsc::Sender<HubMsg>,
) {
    while let Some(message) = rx.recv().await {
        if let Err(err) = wire::write_frame(&mut writer, &message).await {
            warn!(%id, %err, "replication write failed");
            break;
        }
    }
    let _ = hub.send(HubMsg::Unregistered(id)).await;
}

/// Accept loop for the replication out-socket (`port + 1`).
pub async fn serve(listener: TcpListener, hub: mpsc::Sender<HubMsg>) -> std::io::Result<()> {
    loop {
        let (stream, peer_addr) = listener.accept().await?;
        let hub = hub.clone();
        tokio::spawn(async move {
            if let Err(err) = accept_one(stream, hub).await {
                warn!(%peer_addr, %err, "replication accept failed");
            }
        });
    }
}

async fn accept_one(stream: TcpStream, hub: mpsc::Sender<HubMsg>) -> anyhow::Result<()> {
    let (mut reader, writer) = stream.into_split();
    let hello: ReplicationMessage = wire::read_frame(&mut reader).await?;
    let ReplicationMessage::Hello { id, updateme, .. } = hello else {
        anyhow::bail!("expected hello frame, got an update frame");
    };
    let id: PeerId = id.parse().map_err(|err: crawl_core::beacon::ParseIdError| anyhow::anyhow!(err))?;

    let (writer_tx, writer_rx) = mpsc::channel(crawl_core::settings::CHANNEL_CAPACITY);
    tokio::spawn(writer_pump(writer, writer_rx, id, hub.clone()));

    hub.send(HubMsg::Registered { id, updateme, writer: writer_tx }).await?;

    // Dialers never send anything after the hello; drain the reader so we
    // notice disconnects and deregister promptly.
    loop {
        match wire::read_frame::<ReplicationMessage, _>(&mut reader).await {
            Ok(_) => continue,
            Err(_) => {
                let _ = hub.send(HubMsg::Unregistered(id)).await;
                return Ok(());
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn catch_up_streams_every_entry_then_sentinel() {
        let dir = tempfile::tempdir().unwrap();
        let cache = Arc::new(FsCache::open(dir.path()).await.unwrap());
        cache.set("https://a.example", "a body").await.unwrap();
        cache.set("https://b.example", "b body").await.unwrap();

        let (tx, mut rx) = mpsc::channel(8);
        stream_catch_up(cache, tx).await;

        let mut seen = Vec::new();
        while let Some(message) = rx.recv().await {
            let is_end = message.is_end_of_stream();
            seen.push(message);
            if is_end {
                break;
            }
        }

        assert_eq!(seen.len(), 3);
        assert!(seen[2].is_end_of_stream());
    }

    #[tokio::test]
    async fn hub_broadcasts_local_updates_to_every_registered_conn() {
        let dir = tempfile::tempdir().unwrap();
        let cache = Arc::new(FsCache::open(dir.path()).await.unwrap());
        let (hub_tx, hub_rx) = mpsc::channel(8);
        tokio::spawn(run(hub_rx, cache));

        let (writer_tx, mut writer_rx) = mpsc::channel(8);
        let id: PeerId = "abcd".parse().unwrap();
        hub_tx
            .send(HubMsg::Registered { id, updateme: false, writer: writer_tx })
            .await
            .unwrap();
        hub_tx
            .send(HubMsg::LocalUpdate { url: "https://a.example".to_string(), content: "body".to_string() })
            .await
            .unwrap();

        let message = writer_rx.recv().await.unwrap();
        match message {
            ReplicationMessage::Update { url: Some(url), spread, .. } => {
                assert_eq!(url, "https://a.example");
                assert!(!spread);
            },
            _ => panic!("expected an update frame"),
        }
    }
}

/// Dial a newly discovered peer Storage's replication out-socket and
/// apply every update it streams, forever, until the connection drops.
#[instrument(skip(cache), fields(%id, %addr))]
pub async fn dial(id: PeerId, addr: SocketAddr, my_id: PeerId, updateme: bool, cache: Arc<FsCache>) {
    let stream = match TcpStream::connect(addr).await {
        Ok(stream) => stream,
        Err(err) => {
            warn!(%id, %addr, %err, "failed to dial peer storage");
            return;
        },
    };
    let (mut reader, mut writer) = stream.into_split();

    let hello = ReplicationMessage::Hello {
        id: my_id.to_string(),
        new: true,
        updateme,
    };
    if let Err(err) = wire::write_frame(&mut writer, &hello).await {
        warn!(%id, %err, "failed to send replication hello");
        return;
    }

    loop {
        match wire::read_frame::<ReplicationMessage, _>(&mut reader).await {
            Ok(message) if message.is_end_of_stream() => continue,
            Ok(ReplicationMessage::Update { url: Some(url), content: Some(content), .. }) => {
                if let Err(err) = cache.set(&url, &content).await {
                    warn!(%err, "failed to apply replicated update");
                }
            },
            Ok(_) => continue,
            Err(err) => {
                warn!(%id, %err, "replication connection to peer storage closed");
                return;
            },
        }
    }
}
