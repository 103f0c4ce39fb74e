mod args;
mod cfg;
mod replication;
mod router;

use std::net::SocketAddr;
use std::sync::Arc;

use crawl_core::beacon::{Role, Sender as BeaconSender};
use crawl_core::cache::FsCache;
use crawl_core::discovery::{self, PeerEvent};
use crawl_core::settings;
use structopt::StructOpt as _;
use tokio::sync::mpsc;
use tracing::{info, warn};

use cfg::Cfg;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    crawl_core::logging::init();

    let args = args::Args::from_args();
    let cfg = Cfg::from_args(&args).await?;
    let Cfg { id, ip, port, replication_port, cache_dir, update, router_listener, replication_listener } = cfg;

    info!(%id, %ip, port, replication_port, update, "starting storage");

    let cache = Arc::new(FsCache::open(&cache_dir).await?);

    let (hub_tx, hub_rx) = mpsc::channel(settings::CHANNEL_CAPACITY);
    let hub_task = tokio::spawn(replication::run(hub_rx, cache.clone()));

    let router_task = tokio::spawn(router::serve(router_listener, cache.clone(), hub_tx.clone()));

    let replication_task = tokio::spawn(replication::serve(replication_listener, hub_tx.clone()));

    let (peer_tx, mut peer_rx) = mpsc::channel(settings::CHANNEL_CAPACITY);
    let discovery_task = tokio::spawn(discovery::run(Role::Storage, ip, peer_tx));

    let dial_cache = cache.clone();
    let dial_task = tokio::spawn(async move {
        while let Some(event) = peer_rx.recv().await {
            match event {
                PeerEvent::Add(peer) | PeerEvent::Update(peer) => {
                    if peer.id == id {
                        continue;
                    }
                    info!(peer = %peer.id, addr = %peer.addr, "dialing peer storage");
                    let dial_addr = SocketAddr::new(peer.addr.ip(), peer.addr.port() + 1);
                    tokio::spawn(replication::dial(peer.id, dial_addr, id, update, dial_cache.clone()));
                },
                PeerEvent::Delete(deleted) => {
                    if deleted != id {
                        warn!(peer = %deleted, "peer storage expired");
                    }
                },
            }
        }
    });

    let beacon = BeaconSender::bind(Role::Storage, id, port).await?;
    let beacon_task = tokio::spawn(beacon.run());

    tokio::signal::ctrl_c().await?;
    info!("received interrupt, shutting down");

    router_task.abort();
    replication_task.abort();
    discovery_task.abort();
    dial_task.abort();
    beacon_task.abort();
    hub_task.abort();

    Ok(())
}
