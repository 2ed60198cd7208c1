use anyhow::Context;
use tracing_subscriber::EnvFilter;

use webserv::config::Config;
use webserv::server::{listener, ServerState};
use webserv::store::{self, Credentials};

fn main() -> anyhow::Result<()> {
    let args: Vec<String> = std::env::args().collect();
    if args.len() != 2 {
        let program = args.first().map(String::as_str).unwrap_or("webserv");
        eprintln!("usage: {program} <port>");
        std::process::exit(1);
    }

    let mut cfg = Config::load()?;
    cfg.server.port = args[1]
        .parse()
        .with_context(|| format!("invalid port {:?}", args[1]))?;
    cfg.validate()?;

    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&cfg.log.level));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_level(true)
        .init();

    let backends = store::open_file_pool(&cfg.store)
        .with_context(|| format!("opening credential store {}", cfg.store.path.display()))?;
    let credentials = {
        let mut backend = backends.acquire();
        Credentials::load(&mut **backend)?
    };

    listener::run(&cfg, ServerState::new(credentials, backends))
}
