#![allow(dead_code)]

use std::fs;
use std::io::{self, Read, Write};
use std::net::{SocketAddr, TcpStream};
use std::os::unix::fs::PermissionsExt;
use std::path::Path;
use std::sync::mpsc;
use std::thread::{self, JoinHandle};
use std::sync::Arc;
use std::time::{Duration, Instant};

use tempfile::TempDir;

use webserv::config::Config;
use webserv::server::{Server, ServerHandle, ServerState};
use webserv::store::{Backend, BackendPool, Credentials, MemoryBackend, ResourcePool};

pub const JUDGE: &str = "<html>judge</html>";
pub const LOG_ERROR: &str = "<html>login failed</html>";
pub const WELCOME: &str = "<html>welcome</html>";

pub struct TestServer {
    pub addr: SocketAddr,
    pub handle: ServerHandle,
    /// The server's credential backends; holding a handle stalls workers.
    pub backends: Arc<BackendPool>,
    pub thread: Option<JoinHandle<anyhow::Result<()>>>,
    _root: TempDir,
}

fn page(root: &Path, name: &str, contents: &str) {
    let path = root.join(name);
    fs::write(&path, contents).unwrap();
    fs::set_permissions(&path, fs::Permissions::from_mode(0o644)).unwrap();
}

/// Starts a server on an ephemeral loopback port with a one-second idle
/// unit and a single user `alice` / `pw`.
pub fn start() -> TestServer {
    start_with(|_| {})
}

/// Like [`start`], with `configure` applied to the config before binding.
pub fn start_with(configure: impl FnOnce(&mut Config)) -> TestServer {
    let root = tempfile::tempdir().unwrap();
    page(root.path(), "judge.html", JUDGE);
    page(root.path(), "logError.html", LOG_ERROR);
    page(root.path(), "welcome.html", WELCOME);

    let mut cfg = Config::default();
    cfg.server.address = "127.0.0.1".to_string();
    cfg.server.port = 0;
    cfg.pool.workers = 2;
    cfg.timer.idle_unit_secs = 1;
    cfg.site.doc_root = root.path().to_path_buf();
    configure(&mut cfg);

    let mut backend = MemoryBackend::with_users([("alice", "pw")]);
    let credentials = Credentials::load(&mut backend).unwrap();
    let handles: Vec<Box<dyn Backend>> = vec![Box::new(backend)];
    let backends: BackendPool = ResourcePool::new(handles);
    let state = ServerState::new(credentials, backends);
    let backends = Arc::clone(&state.backends);

    let (tx, rx) = mpsc::channel();
    let thread = thread::spawn(move || {
        let server = Server::bind(&cfg, state)?;
        tx.send((server.local_addr()?, server.handle()))
            .map_err(|_| anyhow::anyhow!("test harness went away"))?;
        server.run()
    });
    let (addr, handle) = rx.recv_timeout(Duration::from_secs(5)).unwrap();

    TestServer {
        addr,
        handle,
        backends,
        thread: Some(thread),
        _root: root,
    }
}

pub fn connect(addr: SocketAddr) -> TcpStream {
    let stream = TcpStream::connect(addr).unwrap();
    stream
        .set_read_timeout(Some(Duration::from_secs(10)))
        .unwrap();
    stream
}

/// A response read off the wire.
#[derive(Debug)]
pub struct Reply {
    pub head: String,
    pub body: Vec<u8>,
}

impl Reply {
    pub fn status(&self) -> u16 {
        self.head
            .split(' ')
            .nth(1)
            .and_then(|code| code.parse().ok())
            .unwrap_or(0)
    }

    pub fn header(&self, name: &str) -> Option<&str> {
        self.head.lines().skip(1).find_map(|line| {
            let (key, value) = line.split_once(':')?;
            key.eq_ignore_ascii_case(name).then(|| value.trim())
        })
    }

    pub fn body_text(&self) -> &str {
        std::str::from_utf8(&self.body).unwrap()
    }
}

/// Reads one `Content-Length` framed response.
pub fn read_reply(stream: &mut TcpStream) -> io::Result<Reply> {
    let mut data = Vec::new();
    let mut chunk = [0u8; 4096];
    let head_end = loop {
        if let Some(pos) = data.windows(4).position(|w| w == b"\r\n\r\n") {
            break pos;
        }
        let n = stream.read(&mut chunk)?;
        if n == 0 {
            return Err(io::ErrorKind::UnexpectedEof.into());
        }
        data.extend_from_slice(&chunk[..n]);
    };

    let head = String::from_utf8_lossy(&data[..head_end]).into_owned();
    let mut reply = Reply {
        head,
        body: Vec::new(),
    };
    let length: usize = reply
        .header("Content-Length")
        .and_then(|v| v.parse().ok())
        .unwrap_or(0);

    let mut body = data.split_off(head_end + 4);
    while body.len() < length {
        let n = stream.read(&mut chunk)?;
        if n == 0 {
            return Err(io::ErrorKind::UnexpectedEof.into());
        }
        body.extend_from_slice(&chunk[..n]);
    }
    body.truncate(length);
    reply.body = body;
    Ok(reply)
}

pub fn request(stream: &mut TcpStream, raw: &[u8]) -> Reply {
    stream.write_all(raw).unwrap();
    read_reply(stream).unwrap()
}

/// True once the server has closed its side of `stream`.
pub fn is_closed(stream: &mut TcpStream) -> bool {
    let mut byte = [0u8; 1];
    match stream.read(&mut byte) {
        Ok(0) => true,
        Ok(_) => false,
        Err(e) => matches!(
            e.kind(),
            io::ErrorKind::ConnectionReset | io::ErrorKind::ConnectionAborted
        ),
    }
}

/// Polls `cond` every 20 ms until it holds or `timeout` passes.
pub fn wait_until(timeout: Duration, mut cond: impl FnMut() -> bool) -> bool {
    let deadline = Instant::now() + timeout;
    while Instant::now() < deadline {
        if cond() {
            return true;
        }
        thread::sleep(Duration::from_millis(20));
    }
    cond()
}
