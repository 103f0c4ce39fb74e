//! Peer discovery: join a role's multicast group, track liveness by TTL,
//! and publish `PeerEvent`s to the node's main loop.
//!
//! The peer table is owned exclusively by this module's task — never
//! shared via a mutex — and the only thing handed to callers is an event
//! stream.

pub use crate::beacon::{DecodeError as BeaconDecodeError, PeerId, Role};

use std::collections::HashMap;
use std::net::{Ipv4Addr, SocketAddr};
use std::time::Instant;

use socket2::{Domain, Protocol, Socket, Type};
use tokio::net::UdpSocket;
use tokio::sync::mpsc;
use tracing::{debug, instrument, trace, warn};

use crate::beacon::Beacon;
use crate::settings::{self, BEACON_SIZE, PEER_EXPIRY};

#[derive(Clone, Debug, Eq, PartialEq)]
pub struct Peer {
    pub id: PeerId,
    pub addr: SocketAddr,
}

/// An event about the discovered-peer population, the only thing this
/// module exposes outside its own task.
#[derive(Clone, Debug, Eq, PartialEq)]
pub enum PeerEvent {
    Add(Peer),
    Update(Peer),
    Delete(PeerId),
}

/// Owned exclusively by the discovery task; never shared.
#[derive(Default)]
struct PeerTable {
    peers: HashMap<PeerId, (SocketAddr, Instant)>,
}

impl PeerTable {
    fn observe(&mut self, id: PeerId, addr: SocketAddr) -> Option<PeerEvent> {
        let expires_at = Instant::now() + PEER_EXPIRY;
        match self.peers.get_mut(&id) {
            Some((known_addr, seen_at)) => {
                *seen_at = expires_at;
                if *known_addr != addr {
                    *known_addr = addr;
                    Some(PeerEvent::Update(Peer { id, addr }))
                } else {
                    None
                }
            },
            None => {
                self.peers.insert(id, (addr, expires_at));
                Some(PeerEvent::Add(Peer { id, addr }))
            },
        }
    }

    fn reap(&mut self, now: Instant) -> Vec<PeerEvent> {
        let expired: Vec<PeerId> = self
            .peers
            .iter()
            .filter(|(_, (_, expires_at))| *expires_at < now)
            .map(|(id, _)| *id)
            .collect();
        for id in &expired {
            self.peers.remove(id);
        }
        expired.into_iter().map(PeerEvent::Delete).collect()
    }
}

/// Bind a UDP socket joined to `role`'s multicast group on the given
/// interface, with `SO_REUSEADDR` set before bind and membership joined
/// via `IP_ADD_MEMBERSHIP(group, interface)`.
fn bind_multicast(role: Role, interface: Ipv4Addr) -> std::io::Result<UdpSocket> {
    let socket = Socket::new(Domain::IPV4, Type::DGRAM, Some(Protocol::UDP))?;
    socket.set_reuse_address(true)?;
    let bind_addr: SocketAddr = role.multicast_addr();
    socket.bind(&bind_addr.into())?;
    socket.set_nonblocking(true)?;
    socket.join_multicast_v4(&role.multicast_group(), &interface)?;
    UdpSocket::from_std(socket.into())
}

/// Runs discovery for one role on one interface, forever. Spawn this as its
/// own task; it forwards `PeerEvent`s on `events` and never blocks anything
/// else in the process.
#[instrument(name = "discovery", skip(events), fields(?role))]
pub async fn run(
    role: Role,
    interface: Ipv4Addr,
    events: mpsc::Sender<PeerEvent>,
) -> std::io::Result<()> {
    let socket = bind_multicast(role, interface)?;
    let mut table = PeerTable::default();
    let mut reaper = tokio::time::interval(settings::BEACON_INTERVAL);
    let mut buf = [0u8; BEACON_SIZE];

    loop {
        tokio::select! {
            recv = socket.recv_from(&mut buf) => {
                let (n, addr) = recv?;
                if n != BEACON_SIZE {
                    trace!(len = n, "dropping malformed beacon (wrong size)");
                    continue;
                }
                match Beacon::decode(&buf) {
                    Ok(beacon) if beacon.role == role => {
                        let peer_addr = SocketAddr::new(addr.ip(), beacon.port);
                        if let Some(event) = table.observe(beacon.id, peer_addr) {
                            debug!(?event, "peer event");
                            if events.send(event).await.is_err() {
                                return Ok(());
                            }
                        }
                    },
                    Ok(_) => trace!("dropping beacon for other role"),
                    Err(err) => warn!(%err, "dropping malformed beacon"),
                }
            }
            _ = reaper.tick() => {
                for event in table.reap(Instant::now()) {
                    debug!(?event, "peer expired");
                    if events.send(event).await.is_err() {
                        return Ok(());
                    }
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn add_then_refresh_is_silent() {
        let mut table = PeerTable::default();
        let id: PeerId = "abcd".parse().unwrap();
        let addr: SocketAddr = "127.0.0.1:9000".parse().unwrap();

        assert_eq!(table.observe(id, addr), Some(PeerEvent::Add(Peer { id, addr })));
        assert_eq!(table.observe(id, addr), None, "unchanged address is not an event");
    }

    #[test]
    fn address_change_emits_update() {
        let mut table = PeerTable::default();
        let id: PeerId = "abcd".parse().unwrap();
        let addr1: SocketAddr = "127.0.0.1:9000".parse().unwrap();
        let addr2: SocketAddr = "127.0.0.1:9001".parse().unwrap();

        table.observe(id, addr1);
        assert_eq!(
            table.observe(id, addr2),
            Some(PeerEvent::Update(Peer { id, addr: addr2 }))
        );
    }

    #[test]
    fn reap_removes_only_expired() {
        let mut table = PeerTable::default();
        let id: PeerId = "abcd".parse().unwrap();
        let addr: SocketAddr = "127.0.0.1:9000".parse().unwrap();
        table.observe(id, addr);

        assert!(table.reap(Instant::now()).is_empty());
        let future = Instant::now() + PEER_EXPIRY + std::time::Duration::from_secs(1);
        assert_eq!(table.reap(future), vec![PeerEvent::Delete(id)]);
    }
}
