use tracing::info;

use crate::config::Config;
use crate::server::{Server, ServerState};

/// Binds the configured address and serves until shutdown.
pub fn run(cfg: &Config, state: ServerState) -> anyhow::Result<()> {
    let server = Server::bind(cfg, state)?;
    info!(
        workers = cfg.pool.workers,
        doc_root = %cfg.site.doc_root.display(),
        "Serving"
    );
    server.run()?;
    info!("Server stopped");
    Ok(())
}
