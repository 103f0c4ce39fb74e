//! Validated startup configuration for the Storage node, built from
//! [`Args`] by a fallible constructor so both sockets are known bindable
//! before any other task is spawned.

use std::net::SocketAddr;
use std::path::PathBuf;

use crawl_core::beacon::PeerId;
use tokio::net::TcpListener;

use crate::args::Args;

#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("router port {0} is already in use")]
    RouterPortInUse(SocketAddr, #[source] std::io::Error),
    #[error("replication port {0} is already in use")]
    ReplicationPortInUse(SocketAddr, #[source] std::io::Error),
}

pub struct Cfg {
    pub id: PeerId,
    pub ip: std::net::Ipv4Addr,
    pub port: u16,
    pub replication_port: u16,
    pub cache_dir: PathBuf,
    pub update: bool,
    pub router_listener: TcpListener,
    pub replication_listener: TcpListener,
}

impl Cfg {
    pub async fn from_args(args: &Args) -> Result<Self, Error> {
        let id = PeerId::random();
        let replication_port = args.port + 1;

        let router_addr = SocketAddr::from((args.ip, args.port));
        let router_listener = TcpListener::bind(router_addr)
            .await
            .map_err(|err| Error::RouterPortInUse(router_addr, err))?;

        let replication_addr = SocketAddr::from((args.ip, replication_port));
        let replication_listener = TcpListener::bind(replication_addr)
            .await
            .map_err(|err| Error::ReplicationPortInUse(replication_addr, err))?;

        Ok(Self {
            id,
            ip: args.ip,
            port: args.port,
            replication_port,
            cache_dir: args.cache.clone(),
            update: args.update,
            router_listener,
            replication_listener,
        })
    }
}
