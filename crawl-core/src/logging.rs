//! Per-process logger init, shared by all three node binaries.
//!
//! Called once from each binary's `main`, never at module load time, so
//! verbosity stays configurable per run via `RUST_LOG` (defaulting to
//! `info`).
pub fn init() {
    use tracing_subscriber::EnvFilter;

    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt().with_env_filter(filter).init();
}
