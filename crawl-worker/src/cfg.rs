//! Validated startup configuration for the Worker, built from [`Args`] by
//! a fallible constructor so that `main` only ever sees a socket that is
//! already known to be bindable.

use std::net::SocketAddr;

use crawl_core::beacon::PeerId;
use tokio::net::TcpListener;

use crate::args::Args;

#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("client-facing port {0} is already in use")]
    PortInUse(SocketAddr, #[source] std::io::Error),
}

/// Everything the Worker needs to run, already validated: the listener for
/// client connections is pre-bound so a busy port fails fast, before any
/// discovery or beacon task is spawned.
pub struct Cfg {
    pub id: PeerId,
    pub ip: std::net::Ipv4Addr,
    pub port: u16,
    pub listener: TcpListener,
}

impl Cfg {
    pub async fn from_args(args: &Args) -> Result<Self, Error> {
        let id = PeerId::random();
        let listen_addr = SocketAddr::from((args.ip, args.port));
        let listener = TcpListener::bind(listen_addr)
            .await
            .map_err(|err| Error::PortInUse(listen_addr, err))?;

        Ok(Self {
            id,
            ip: args.ip,
            port: args.port,
            listener,
        })
    }
}
