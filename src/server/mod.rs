//! Network side of the server: the readiness loop, its worker pool and the
//! idle-connection timers.

pub mod listener;
pub mod pool;
pub mod reactor;
pub mod timer;

use std::io;
use std::net::SocketAddr;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;

use anyhow::Context;
use mio::net::TcpListener;
use mio::Waker;
use tracing::info;

use crate::config::Config;
use crate::store::{BackendPool, Credentials};
use reactor::Reactor;

/// State shared between the reactor, the workers and whoever embeds the
/// server.
#[derive(Clone)]
pub struct ServerState {
    pub credentials: Arc<Credentials>,
    pub backends: Arc<BackendPool>,
    /// Connections currently open.
    pub active: Arc<AtomicUsize>,
}

impl ServerState {
    pub fn new(credentials: Credentials, backends: BackendPool) -> Self {
        Self {
            credentials: Arc::new(credentials),
            backends: Arc::new(backends),
            active: Arc::new(AtomicUsize::new(0)),
        }
    }
}

/// A bound, not yet running server.
pub struct Server {
    reactor: Reactor,
    handle: ServerHandle,
}

impl Server {
    /// Validates `config`, binds the listening socket and starts the worker
    /// pool. Port 0 picks an ephemeral port; see [`Server::local_addr`].
    pub fn bind(config: &Config, state: ServerState) -> anyhow::Result<Self> {
        config.validate()?;
        anyhow::ensure!(state.backends.size() > 0, "credential backend pool is empty");

        let addr: SocketAddr = config
            .listen_addr()
            .parse()
            .with_context(|| format!("invalid listen address {}", config.listen_addr()))?;
        let listener = TcpListener::bind(addr).with_context(|| format!("binding {addr}"))?;

        let active = Arc::clone(&state.active);
        let reactor = Reactor::new(listener, config, state)?;
        let handle = ServerHandle {
            stop: reactor.stop_flag(),
            waker: reactor.waker(),
            active,
        };
        info!(addr = %reactor.local_addr()?, "Listening");
        Ok(Self { reactor, handle })
    }

    pub fn local_addr(&self) -> io::Result<SocketAddr> {
        self.reactor.local_addr()
    }

    pub fn handle(&self) -> ServerHandle {
        self.handle.clone()
    }

    /// Serves until a shutdown signal or [`ServerHandle::stop`]. Every open
    /// connection is closed and the worker pool joined before this returns.
    pub fn run(mut self) -> anyhow::Result<()> {
        self.reactor.run()
    }
}

/// Controls a running server from another thread.
#[derive(Clone)]
pub struct ServerHandle {
    stop: Arc<AtomicBool>,
    waker: Arc<Waker>,
    active: Arc<AtomicUsize>,
}

impl ServerHandle {
    pub fn stop(&self) {
        self.stop.store(true, Ordering::Release);
        if let Err(e) = self.waker.wake() {
            tracing::error!(error = %e, "Failed to wake reactor for shutdown");
        }
    }

    pub fn active_connections(&self) -> usize {
        self.active.load(Ordering::Acquire)
    }
}
