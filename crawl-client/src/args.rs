//! Command-line arguments for the Client node.

use std::net::Ipv4Addr;
use std::path::PathBuf;

use structopt::StructOpt;

#[derive(Debug, StructOpt)]
#[structopt(name = "crawl-client")]
pub struct Args {
    /// Interface address for the discovery multicast join.
    #[structopt(long, default_value = "0.0.0.0")]
    pub ip: Ipv4Addr,

    /// File of seed URLs, one per line; lines starting with `#` are
    /// comments.
    #[structopt(long)]
    pub file: PathBuf,

    /// Max number of seed URLs to load. Use -1 for all.
    #[structopt(long, default_value = "-1")]
    pub n: i64,

    /// Maximum recursion depth to follow same-host links to.
    #[structopt(long, default_value = "1")]
    pub depth: u32,
}
