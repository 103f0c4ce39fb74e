//! The 12-byte UDP multicast beacon: `"<flag> <id> <port>"`.
//!
//! Parsed straight into a sum type so an unknown role flag is rejected at
//! decode time rather than carried around as a loose `(flag, id, port)`
//! triple.

use std::fmt;
use std::net::{Ipv4Addr, SocketAddr};
use std::str::FromStr;

use tokio::net::UdpSocket;

use crate::settings::{self, BEACON_SIZE};

/// A 4-character, case-sensitive alphanumeric peer identifier.
///
/// Generated once per node at startup and carried in every beacon it sends.
#[derive(Clone, Copy, Debug, Eq, PartialEq, Ord, PartialOrd, Hash)]
pub struct PeerId([u8; 4]);

impl PeerId {
    const SYMBOLS: &'static [u8] =
        b"ABCDEFGHIJKLMNOPQRSTUVWXYZabcdefghijklmnopqrstuvwxyz0123456789";

    /// Generate a random 4-character alphanumeric id.
    pub fn random() -> Self {
        let mut bytes = [0u8; 4];
        for b in &mut bytes {
            *b = Self::SYMBOLS[fastrand::usize(..Self::SYMBOLS.len())];
        }
        Self(bytes)
    }

    pub fn as_str(&self) -> &str {
        // SAFETY: `SYMBOLS` is pure ASCII, so any combination is valid UTF-8.
        std::str::from_utf8(&self.0).expect("PeerId is always ASCII")
    }
}

impl fmt::Display for PeerId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, thiserror::Error)]
pub enum ParseIdError {
    #[error("peer id must be exactly 4 alphanumeric characters, got {0:?}")]
    WrongShape(String),
}

impl FromStr for PeerId {
    type Err = ParseIdError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let bytes = s.as_bytes();
        if bytes.len() != 4 || !bytes.iter().all(|b| b.is_ascii_alphanumeric()) {
            return Err(ParseIdError::WrongShape(s.to_string()));
        }
        let mut id = [0u8; 4];
        id.copy_from_slice(bytes);
        Ok(Self(id))
    }
}

/// Which role's beacon this is. `Worker`s beacon on 224.1.1.1:4040 for
/// Clients to discover; `Storage`s beacon on 225.1.1.1:4041 for Workers
/// (and other Storages) to discover.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum Role {
    Worker,
    Storage,
}

impl Role {
    fn flag(self) -> u8 {
        match self {
            Role::Worker => b'w',
            Role::Storage => b's',
        }
    }

    fn from_flag(flag: u8) -> Option<Self> {
        match flag {
            b'w' => Some(Role::Worker),
            b's' => Some(Role::Storage),
            _ => None,
        }
    }

    pub fn multicast_addr(self) -> SocketAddr {
        match self {
            Role::Worker => SocketAddr::from((settings::WORKER_MCAST_GROUP, settings::WORKER_MCAST_PORT)),
            Role::Storage => SocketAddr::from((settings::STORAGE_MCAST_GROUP, settings::STORAGE_MCAST_PORT)),
        }
    }

    pub fn multicast_group(self) -> Ipv4Addr {
        match self {
            Role::Worker => settings::WORKER_MCAST_GROUP,
            Role::Storage => settings::STORAGE_MCAST_GROUP,
        }
    }
}

#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub struct Beacon {
    pub role: Role,
    pub id: PeerId,
    pub port: u16,
}

#[derive(Debug, thiserror::Error)]
pub enum DecodeError {
    #[error("beacon must be exactly {BEACON_SIZE} bytes, got {0}")]
    WrongSize(usize),
    #[error("beacon is not valid utf8")]
    NotUtf8,
    #[error("beacon has wrong shape (expected \"<flag> <id> <port>\")")]
    WrongShape,
    #[error("unknown role flag {0:?}")]
    UnknownFlag(char),
    #[error(transparent)]
    Id(#[from] ParseIdError),
    #[error("invalid port")]
    Port,
}

impl Beacon {
    /// Encode to the exact 12-byte wire form `"<f> <id> <p>"`. The port is
    /// space-padded on the left so the total width is always fixed.
    pub fn encode(&self) -> [u8; BEACON_SIZE] {
        let mut buf = [b' '; BEACON_SIZE];
        buf[0] = self.role.flag();
        buf[1] = b' ';
        buf[2..6].copy_from_slice(self.id.as_str().as_bytes());
        buf[6] = b' ';
        let port = format!("{:>5}", self.port);
        buf[7..12].copy_from_slice(port.as_bytes());
        buf
    }

    pub fn decode(bytes: &[u8]) -> Result<Self, DecodeError> {
        if bytes.len() != BEACON_SIZE {
            return Err(DecodeError::WrongSize(bytes.len()));
        }
        let text = std::str::from_utf8(bytes).map_err(|_| DecodeError::NotUtf8)?;
        let mut parts = text.split_whitespace();
        let flag = parts.next().ok_or(DecodeError::WrongShape)?;
        let id = parts.next().ok_or(DecodeError::WrongShape)?;
        let port = parts.next().ok_or(DecodeError::WrongShape)?;
        if parts.next().is_some() {
            return Err(DecodeError::WrongShape);
        }

        let flag_char = flag.chars().next().ok_or(DecodeError::WrongShape)?;
        let role = Role::from_flag(flag_char as u8).ok_or(DecodeError::UnknownFlag(flag_char))?;
        let id = id.parse::<PeerId>()?;
        let port: u16 = port.parse().map_err(|_| DecodeError::Port)?;

        Ok(Self { role, id, port })
    }
}

/// Periodically emits this node's beacon to its role's multicast group.
pub struct Sender {
    socket: UdpSocket,
    addr: SocketAddr,
    beacon: Beacon,
}

impl Sender {
    pub async fn bind(role: Role, id: PeerId, service_port: u16) -> std::io::Result<Self> {
        let socket = UdpSocket::bind((Ipv4Addr::UNSPECIFIED, 0)).await?;
        socket.set_multicast_ttl_v4(settings::BEACON_TTL)?;
        Ok(Self {
            socket,
            addr: role.multicast_addr(),
            beacon: Beacon {
                role,
                id,
                port: service_port,
            },
        })
    }

    /// Run forever, emitting a beacon every [`settings::BEACON_INTERVAL`].
    /// Intended to be spawned as its own task.
    pub async fn run(self) -> std::io::Result<()> {
        let mut tick = tokio::time::interval(settings::BEACON_INTERVAL);
        let payload = self.beacon.encode();
        loop {
            tick.tick().await;
            self.socket.send_to(&payload, self.addr).await?;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn round_trip() {
        let beacon = Beacon {
            role: Role::Worker,
            id: "abcd".parse().unwrap(),
            port: 5555,
        };
        let encoded = beacon.encode();
        assert_eq!(encoded.len(), BEACON_SIZE);
        let decoded = Beacon::decode(&encoded).unwrap();
        assert_eq!(decoded, beacon);
    }

    #[test]
    fn decodes_literal_example() {
        // Two spaces before the port: the encoder right-aligns it in a
        // fixed 5-wide field, so "5555" is padded out to " 5555" to keep
        // the datagram exactly BEACON_SIZE bytes.
        let decoded = Beacon::decode(b"w abcd  5555").unwrap();
        assert_eq!(decoded.role, Role::Worker);
        assert_eq!(decoded.id.as_str(), "abcd");
        assert_eq!(decoded.port, 5555);
    }

    #[test]
    fn rejects_wrong_size() {
        assert!(matches!(
            Beacon::decode(b"w abcd 55"),
            Err(DecodeError::WrongSize(_))
        ));
    }

    #[test]
    fn rejects_unknown_flag() {
        assert!(matches!(
            Beacon::decode(b"x abcd 5555"),
            Err(DecodeError::UnknownFlag('x'))
        ));
    }

    #[quickcheck_macros::quickcheck]
    fn encoded_size_is_always_fixed(id_seed: u8, port: u16, worker: bool) -> bool {
        let role = if worker { Role::Worker } else { Role::Storage };
        let mut raw = [0u8; 4];
        for (i, b) in raw.iter_mut().enumerate() {
            *b = PeerId::SYMBOLS[(id_seed as usize + i) % PeerId::SYMBOLS.len()];
        }
        let id = PeerId(raw);
        let beacon = Beacon { role, id, port };
        beacon.encode().len() == BEACON_SIZE
    }
}
