//! The Worker's request state machine.
//!
//! A single task owns one `BTreeMap<RequestKey, Request>` outright and
//! moves records between states in place; nothing outside this task ever
//! sees the map, so there is nothing to lock.

use std::collections::BTreeMap;
use std::time::Instant;

use crawl_core::discovery::PeerEvent;
use crawl_core::settings;
use crawl_core::wire::{ClientReply, StorageReply, StorageRequest};
use tokio::sync::mpsc;
use tracing::{debug, info, warn};

use crate::scraper::{self, FetchError};
use crate::storage_client::StorageFanout;

pub type RequestKey = (String, String);

#[derive(Debug, PartialEq, Eq)]
enum RequestState {
    Caching { expiry: Instant },
    Scraping,
}

struct Request {
    state: RequestState,
    reply_to: mpsc::Sender<ClientReply>,
}

type RequestTable = BTreeMap<RequestKey, Request>;

/// Insert a freshly arrived `(client_id, url)` as a new request. Per
/// §4.3's diagram, `New` is never a stored state — a request resolves
/// instantly to `Caching` (a Storage is known, so a fetch can be sent) or
/// straight to `Scraping` (no Storage known, the direct path). Returns
/// `true` when the caller must spawn a scrape for the direct path.
fn insert_new(
    requests: &mut RequestTable,
    key: RequestKey,
    reply_to: mpsc::Sender<ClientReply>,
    has_storages: bool,
) -> bool {
    if has_storages {
        let expiry = Instant::now() + settings::WORKER_REQ_EXPIRY;
        requests.insert(key, Request { state: RequestState::Caching { expiry }, reply_to });
        false
    } else {
        requests.insert(key, Request { state: RequestState::Scraping, reply_to });
        true
    }
}

/// Apply a Storage reply to `key`. Returns `false` if `key` names no
/// request or one that isn't currently `Caching` (a late or duplicate
/// reply). On a miss, moves the request to `Scraping` in place; on a hit,
/// leaves the state untouched for the caller to `finish` immediately.
fn apply_storage_reply(requests: &mut RequestTable, key: &RequestKey, hit: bool) -> bool {
    match requests.get_mut(key) {
        Some(req) if matches!(req.state, RequestState::Caching { .. }) => {
            if !hit {
                req.state = RequestState::Scraping;
            }
            true
        },
        _ => false,
    }
}

/// Move every `Caching` request whose `expiry` has passed to `Scraping`,
/// returning the keys that were moved so the caller can spawn scrapes for
/// them (`hit = false` once they eventually finish).
fn prune_expired(requests: &mut RequestTable, now: Instant) -> Vec<RequestKey> {
    let expired: Vec<RequestKey> = requests
        .iter()
        .filter(|(_, req)| matches!(req.state, RequestState::Caching { expiry } if expiry < now))
        .map(|(key, _)| key.clone())
        .collect();
    for key in &expired {
        if let Some(req) = requests.get_mut(key) {
            req.state = RequestState::Scraping;
        }
    }
    expired
}

/// Everything the main actor needs to hear about.
pub enum ActorMsg {
    ClientRequest {
        client_id: String,
        url: String,
        reply_to: mpsc::Sender<ClientReply>,
    },
    ScrapeDone {
        key: RequestKey,
        result: Result<String, FetchError>,
    },
    StoragePeer(PeerEvent),
}

/// Runs forever, owning the request table, the Storage fanout, and the
/// scraper job queue. Intended to be the Worker's single central task.
pub async fn run(mut inbox: mpsc::Receiver<ActorMsg>, scrape_done: mpsc::Sender<ActorMsg>) {
    let mut requests: RequestTable = BTreeMap::new();
    let mut fanout = StorageFanout::default();
    let (storage_reply_tx, mut storage_reply_rx) = mpsc::channel(settings::CHANNEL_CAPACITY);
    let mut pruner = tokio::time::interval(settings::PRUNE_INTERVAL);
    let http = scraper::client();

    loop {
        tokio::select! {
            msg = inbox.recv() => {
                let Some(msg) = msg else { return };
                match msg {
                    ActorMsg::ClientRequest { client_id, url, reply_to } => {
                        let key = (client_id.clone(), url.clone());
                        if insert_new(&mut requests, key.clone(), reply_to, !fanout.is_empty()) {
                            spawn_scrape(key, url, http.clone(), scrape_done.clone());
                        } else {
                            fanout.send(StorageRequest::Fetch { id: client_id, url }).await;
                        }
                    }
                    ActorMsg::ScrapeDone { key, result } => {
                        match result {
                            Ok(content) => finish(&mut requests, &mut fanout, key, content, false).await,
                            Err(err) => {
                                warn!(?key, %err, "scrape failed");
                                if let Some(req) = requests.remove(&key) {
                                    let _ = req.reply_to.send(ClientReply::Err { error: err.to_string() }).await;
                                }
                            }
                        }
                    }
                    ActorMsg::StoragePeer(event) => handle_peer_event(&mut fanout, event, storage_reply_tx.clone()),
                }
            }
            Some(reply) = storage_reply_rx.recv() => {
                let key = (reply.id.clone(), reply.url.clone());
                if apply_storage_reply(&mut requests, &key, reply.hit) {
                    if reply.hit {
                        let content = reply.content.unwrap_or_default();
                        finish(&mut requests, &mut fanout, key, content, true).await;
                    } else {
                        spawn_scrape(key, reply.url, http.clone(), scrape_done.clone());
                    }
                } else {
                    debug!(?key, "storage reply for unknown or non-caching request, dropped");
                }
            }
            _ = pruner.tick() => {
                for key in prune_expired(&mut requests, Instant::now()) {
                    spawn_scrape(key.clone(), key.1.clone(), http.clone(), scrape_done.clone());
                }
            }
        }
    }
}

async fn finish(
    requests: &mut BTreeMap<RequestKey, Request>,
    fanout: &mut StorageFanout,
    key: RequestKey,
    content: String,
    hit: bool,
) {
    if let Some(req) = requests.remove(&key) {
        let (_, url) = key;
        let _ = req
            .reply_to
            .send(ClientReply::Ok { url: url.clone(), hit, content: content.clone() })
            .await;
        // One peer, round-robin, same as the Fetch path: the receiving
        // Storage's own replication hub (§4.2) fans this out to the rest
        // of the cluster. Broadcasting from here would have every peer
        // independently re-replicate the same update to every other peer.
        fanout
            .send(StorageRequest::Update { url, content, spread: true })
            .await;
    }
}

fn spawn_scrape(
    key: RequestKey,
    url: String,
    http: hyper_util::client::legacy::Client<hyper_util::client::legacy::connect::HttpConnector, http_body_util::Empty<hyper::body::Bytes>>,
    done: mpsc::Sender<ActorMsg>,
) {
    tokio::spawn(async move {
        let result = scraper::fetch(&http, &url).await;
        let _ = done.send(ActorMsg::ScrapeDone { key, result }).await;
    });
}

fn handle_peer_event(fanout: &mut StorageFanout, event: PeerEvent, replies: mpsc::Sender<StorageReply>) {
    match event {
        PeerEvent::Add(peer) | PeerEvent::Update(peer) => {
            info!(id = %peer.id, addr = %peer.addr, "storage peer available");
            fanout.connect(peer.id, peer.addr, replies);
        },
        PeerEvent::Delete(id) => {
            info!(%id, "storage peer gone");
            fanout.disconnect(&id);
        },
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    fn key(client_id: &str, url: &str) -> RequestKey {
        (client_id.to_string(), url.to_string())
    }

    fn unwatched_reply_to() -> mpsc::Sender<ClientReply> {
        mpsc::channel(1).0
    }

    #[test]
    fn fresh_request_resolves_to_scraping_with_no_storages_known() {
        let mut requests = RequestTable::new();
        let k = key("c1", "https://example.com");
        let should_scrape = insert_new(&mut requests, k.clone(), unwatched_reply_to(), false);

        assert!(should_scrape, "direct path must ask the caller to spawn a scrape");
        assert_eq!(requests[&k].state, RequestState::Scraping);
    }

    #[test]
    fn fresh_request_resolves_to_caching_when_storages_known() {
        let mut requests = RequestTable::new();
        let k = key("c1", "https://example.com");
        let should_scrape = insert_new(&mut requests, k.clone(), unwatched_reply_to(), true);

        assert!(!should_scrape, "a known Storage means a fetch is sent, not a scrape");
        assert!(matches!(requests[&k].state, RequestState::Caching { .. }));
    }

    #[test]
    fn caching_past_expiry_is_pruned_to_scraping() {
        let mut requests = RequestTable::new();
        let k = key("c1", "https://example.com");
        requests.insert(
            k.clone(),
            Request {
                state: RequestState::Caching { expiry: Instant::now() - Duration::from_millis(1) },
                reply_to: unwatched_reply_to(),
            },
        );

        let expired = prune_expired(&mut requests, Instant::now());

        assert_eq!(expired, vec![k.clone()]);
        assert_eq!(requests[&k].state, RequestState::Scraping);
    }

    #[test]
    fn caching_not_yet_expired_is_left_alone() {
        let mut requests = RequestTable::new();
        let k = key("c1", "https://example.com");
        requests.insert(
            k.clone(),
            Request {
                state: RequestState::Caching { expiry: Instant::now() + Duration::from_secs(60) },
                reply_to: unwatched_reply_to(),
            },
        );

        assert!(prune_expired(&mut requests, Instant::now()).is_empty());
        assert!(matches!(requests[&k].state, RequestState::Caching { .. }));
    }

    #[test]
    fn same_url_different_client_id_are_independent() {
        let mut requests = RequestTable::new();
        let k1 = key("c1", "https://example.com");
        let k2 = key("c2", "https://example.com");
        insert_new(&mut requests, k1.clone(), unwatched_reply_to(), true);
        insert_new(&mut requests, k2.clone(), unwatched_reply_to(), true);
        assert_eq!(requests.len(), 2);

        assert!(apply_storage_reply(&mut requests, &k1, false));

        assert_eq!(requests[&k1].state, RequestState::Scraping);
        assert!(matches!(requests[&k2].state, RequestState::Caching { .. }), "the other client's request must be untouched");
    }

    #[test]
    fn storage_reply_for_unknown_key_is_a_no_op() {
        let mut requests = RequestTable::new();
        assert!(!apply_storage_reply(&mut requests, &key("ghost", "https://example.com"), true));
    }

    #[test]
    fn storage_reply_for_non_caching_request_is_a_no_op() {
        let mut requests = RequestTable::new();
        let k = key("c1", "https://example.com");
        requests.insert(k.clone(), Request { state: RequestState::Scraping, reply_to: unwatched_reply_to() });

        assert!(!apply_storage_reply(&mut requests, &k, true));
        assert_eq!(requests[&k].state, RequestState::Scraping);
    }
}
