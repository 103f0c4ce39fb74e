//! Shared discovery, wire-framing, cache and HTML helpers for the crawl
//! fabric's three node roles (client, worker, storage).

pub mod beacon;
pub mod cache;
pub mod discovery;
pub mod html;
pub mod logging;
pub mod settings;
pub mod wire;

pub use beacon::{Beacon, Role};
pub use discovery::{Peer, PeerEvent, PeerId};
