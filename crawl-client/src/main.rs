mod args;
mod cfg;
mod feeder;
mod worker_fanout;

use crawl_core::beacon::Role;
use crawl_core::cache::FsCache;
use crawl_core::discovery::{self, PeerEvent};
use crawl_core::html;
use crawl_core::settings;
use crawl_core::wire::{ClientReply, ClientRequest};
use structopt::StructOpt as _;
use tokio::sync::mpsc;
use tracing::{info, warn};

use cfg::Cfg;
use feeder::UrlFeeder;
use worker_fanout::WorkerFanout;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    crawl_core::logging::init();

    let args = args::Args::from_args();
    let cfg = Cfg::from_args(&args).await?;
    let Cfg { id, ip, n, depth: max_depth, seed_urls } = cfg;

    info!(%id, %ip, file = ?args.file, n, max_depth, "starting client");

    let mut feeder = UrlFeeder::from_lines(seed_urls.into_iter(), n);
    let cache = FsCache::open("result").await?;

    let (peer_tx, mut peer_rx) = mpsc::channel(settings::CHANNEL_CAPACITY);
    let discovery_task = tokio::spawn(discovery::run(Role::Worker, ip, peer_tx));

    let (reply_tx, mut reply_rx) = mpsc::channel::<ClientReply>(settings::CHANNEL_CAPACITY);
    let mut fanout = WorkerFanout::default();

    let mut dispatch = tokio::time::interval(std::time::Duration::from_millis(200));
    let mut shutdown = Box::pin(tokio::signal::ctrl_c());

    loop {
        if feeder.is_empty() {
            info!("crawl complete");
            break;
        }

        tokio::select! {
            Some(event) = peer_rx.recv() => {
                match event {
                    PeerEvent::Add(peer) | PeerEvent::Update(peer) => {
                        info!(id = %peer.id, addr = %peer.addr, "worker available");
                        fanout.connect(peer.id, peer.addr, reply_tx.clone());
                    }
                    PeerEvent::Delete(peer_id) => {
                        info!(%peer_id, "worker gone");
                        fanout.disconnect(&peer_id);
                    }
                }
            }
            Some(reply) = reply_rx.recv() => {
                match reply {
                    ClientReply::Ok { url, hit: _, content } => {
                        let depth = feeder.done(&url).unwrap_or(0);
                        info!(%url, depth, "received page");

                        if depth + 1 < max_depth {
                            for link in html::links(&content) {
                                let same_host = html::same_domain(&url, &link);
                                let already_cached = cache.get(&link).await?.is_some();
                                if same_host && !already_cached {
                                    feeder.append(link, depth + 1);
                                }
                            }
                        }

                        cache.set(&url, &content).await?;
                    }
                    ClientReply::Err { error } => warn!(%error, "worker reported an error"),
                }
            }
            _ = dispatch.tick() => {
                if !fanout.is_empty() {
                    if let Some((url, _depth)) = feeder.feed() {
                        fanout.send(ClientRequest { id: id.to_string(), url }).await;
                    }
                }
            }
            _ = &mut shutdown => {
                info!("received interrupt, shutting down");
                break;
            }
        }
    }

    discovery_task.abort();
    Ok(())
}
