//! Command-line arguments for the Storage node.

use std::net::Ipv4Addr;
use std::path::PathBuf;

use structopt::StructOpt;

#[derive(Debug, StructOpt)]
#[structopt(name = "crawl-storage")]
pub struct Args {
    /// Interface address to bind both sockets and the discovery multicast
    /// join on.
    #[structopt(long, default_value = "0.0.0.0")]
    pub ip: Ipv4Addr,

    /// Worker-facing router socket port. The replication out-socket binds
    /// `port + 1`.
    #[structopt(long)]
    pub port: u16,

    /// Directory holding the page cache.
    #[structopt(long, default_value = "cache")]
    pub cache: PathBuf,

    /// Request a full-cache catch-up from each peer Storage on first
    /// contact, for a node joining an existing cluster.
    #[structopt(long)]
    pub update: bool,
}
