//! Worker-facing router socket: serves `Fetch` and `Update` requests
//! from any connected Worker.

use std::sync::Arc;

use crawl_core::cache::FsCache;
use crawl_core::wire::{self, StorageReply, StorageRequest};
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::mpsc;
use tracing::warn;

use crate::replication::HubMsg;

pub async fn serve(listener: TcpListener, cache: Arc<FsCache>, hub: mpsc::Sender<HubMsg>) -> std::io::Result<()> {
    loop {
        let (stream, peer_addr) = listener.accept().await?;
        let cache = cache.clone();
        let hub = hub.clone();
        tokio::spawn(async move {
            if let Err(err) = handle(stream, cache, hub).await {
                warn!(%peer_addr, %err, "worker connection ended with error");
            }
        });
    }
}

async fn handle(stream: TcpStream, cache: Arc<FsCache>, hub: mpsc::Sender<HubMsg>) -> anyhow::Result<()> {
    let (mut reader, mut writer) = stream.into_split();
    loop {
        let request: StorageRequest = match wire::read_frame(&mut reader).await {
            Ok(request) => request,
            Err(wire::FramingError::Eof) => return Ok(()),
            Err(err) => {
                warn!(%err, "malformed worker request, dropping connection");
                return Ok(());
            },
        };

        match request {
            StorageRequest::Fetch { id, url } => {
                let content = cache.get(&url).await?;
                let hit = content.is_some();
                let reply = StorageReply { id, url, hit, content };
                wire::write_frame(&mut writer, &reply).await?;
            },
            StorageRequest::Update { url, content, spread } => {
                cache.set(&url, &content).await?;
                if spread {
                    let _ = hub.send(HubMsg::LocalUpdate { url, content }).await;
                }
            },
        }
    }
}
