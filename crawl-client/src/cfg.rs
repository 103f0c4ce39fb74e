//! Validated startup configuration for the Client, built from [`Args`] by
//! a fallible constructor so the seed file is read once, up front, rather
//! than deep inside `main`.

use std::path::PathBuf;

use crawl_core::beacon::PeerId;

use crate::args::Args;

#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("failed to read seed file {0:?}")]
    SeedFile(PathBuf, #[source] std::io::Error),
}

pub struct Cfg {
    pub id: PeerId,
    pub ip: std::net::Ipv4Addr,
    pub n: i64,
    pub depth: u32,
    pub seed_urls: Vec<String>,
}

impl Cfg {
    pub async fn from_args(args: &Args) -> Result<Self, Error> {
        let id = PeerId::random();
        let contents = tokio::fs::read_to_string(&args.file)
            .await
            .map_err(|err| Error::SeedFile(args.file.clone(), err))?;

        Ok(Self {
            id,
            ip: args.ip,
            n: args.n,
            depth: args.depth,
            seed_urls: contents.lines().map(str::to_string).collect(),
        })
    }
}
