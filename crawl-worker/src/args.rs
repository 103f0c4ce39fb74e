//! Command-line arguments for the Worker node.

use std::net::Ipv4Addr;

use structopt::StructOpt;

#[derive(Debug, StructOpt)]
#[structopt(name = "crawl-worker")]
pub struct Args {
    /// Interface address to bind the client-facing socket and discovery
    /// multicast join on.
    #[structopt(long, default_value = "0.0.0.0")]
    pub ip: Ipv4Addr,

    /// TCP port the client-facing router socket listens on.
    #[structopt(long)]
    pub port: u16,
}
