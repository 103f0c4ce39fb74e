mod args;
mod cfg;
mod request;
mod scraper;
mod storage_client;

use crawl_core::beacon::{Role, Sender as BeaconSender};
use crawl_core::discovery;
use crawl_core::settings;
use crawl_core::wire::{self, ClientReply, ClientRequest};
use structopt::StructOpt as _;
use tokio::net::TcpStream;
use tokio::sync::mpsc;
use tracing::{error, info, warn};

use cfg::Cfg;
use request::ActorMsg;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    crawl_core::logging::init();

    let args = args::Args::from_args();
    let cfg = Cfg::from_args(&args).await?;
    let Cfg { id, ip, port, listener } = cfg;

    info!(%id, %ip, port, "starting worker");

    let (actor_tx, actor_rx) = mpsc::channel(settings::CHANNEL_CAPACITY);

    // Scrape completions are folded back into the actor's own inbox.
    let actor_task = tokio::spawn(request::run(actor_rx, actor_tx.clone()));

    let (peer_tx, mut peer_rx) = mpsc::channel(settings::CHANNEL_CAPACITY);
    let discovery_actor_tx = actor_tx.clone();
    tokio::spawn(async move {
        while let Some(event) = peer_rx.recv().await {
            if discovery_actor_tx.send(ActorMsg::StoragePeer(event)).await.is_err() {
                return;
            }
        }
    });
    let discovery_task = tokio::spawn(discovery::run(Role::Storage, ip, peer_tx));

    let beacon = BeaconSender::bind(Role::Worker, id, port).await?;
    let beacon_task = tokio::spawn(beacon.run());

    info!(%id, port, "listening for client connections");

    let mut shutdown = Box::pin(tokio::signal::ctrl_c());

    loop {
        tokio::select! {
            accepted = listener.accept() => {
                let (stream, peer_addr) = accepted?;
                let conn_tx = actor_tx.clone();
                tokio::spawn(async move {
                    if let Err(err) = handle_client(stream, conn_tx).await {
                        warn!(%peer_addr, %err, "client connection ended with error");
                    }
                });
            }
            _ = &mut shutdown => {
                info!("received interrupt, shutting down");
                break;
            }
        }
    }

    actor_task.abort();
    discovery_task.abort();
    beacon_task.abort();

    Ok(())
}

async fn handle_client(stream: TcpStream, actor: mpsc::Sender<ActorMsg>) -> anyhow::Result<()> {
    let (mut reader, mut writer) = stream.into_split();
    loop {
        let request: ClientRequest = match wire::read_frame(&mut reader).await {
            Ok(request) => request,
            Err(wire::FramingError::Eof) => return Ok(()),
            Err(err) => {
                error!(%err, "malformed client request, dropping connection");
                return Ok(());
            },
        };

        let (reply_tx, mut reply_rx) = mpsc::channel::<ClientReply>(1);
        actor
            .send(ActorMsg::ClientRequest {
                client_id: request.id,
                url: request.url,
                reply_to: reply_tx,
            })
            .await?;

        if let Some(reply) = reply_rx.recv().await {
            wire::write_frame(&mut writer, &reply).await?;
        }
    }
}
