//! System-wide constants: a flat module of tuning knobs rather than a
//! config object, since none of these values are meant to be
//! runtime-configurable.

use std::net::Ipv4Addr;
use std::time::Duration;

/// How long a peer is considered alive after its last beacon.
pub const PEER_EXPIRY: Duration = Duration::from_secs(5);

/// Beacon emission interval. `PEER_EXPIRY` is 5x this, so a single dropped
/// datagram never expires a live peer.
pub const BEACON_INTERVAL: Duration = Duration::from_secs(1);

/// Multicast TTL set on beacon sender sockets.
pub const BEACON_TTL: u32 = 2;

/// Exact wire size of a beacon datagram: `"<flag> <4-char id> <port>"`.
pub const BEACON_SIZE: usize = 12;

pub const WORKER_MCAST_GROUP: Ipv4Addr = Ipv4Addr::new(224, 1, 1, 1);
pub const WORKER_MCAST_PORT: u16 = 4040;

pub const STORAGE_MCAST_GROUP: Ipv4Addr = Ipv4Addr::new(225, 1, 1, 1);
pub const STORAGE_MCAST_PORT: u16 = 4041;

/// How long a Worker waits for a Storage fetch reply before falling through
/// to scraping.
pub const WORKER_REQ_EXPIRY: Duration = Duration::from_secs(2);

/// Cadence of the Worker's caching-queue pruner.
pub const PRUNE_INTERVAL: Duration = Duration::from_millis(250);

/// How long a Client lets a dispatched URL go unanswered before requeuing it.
pub const CLIENT_PENDANT_TIMEOUT: Duration = Duration::from_secs(30);

/// Capacity for the bounded channels on the Worker's reply path and the
/// Client's dispatch path, so a burst of replies applies backpressure
/// instead of queueing without bound.
pub const CHANNEL_CAPACITY: usize = 64;
