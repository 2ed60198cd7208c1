//! The readiness loop.
//!
//! One thread owns the `mio::Poll`, the listener, every client socket and
//! the timer list. It reads and writes sockets itself and hands parsing and
//! response building to the worker pool.
//!
//! mio notifications are edge-triggered and always armed, so one-shot
//! delivery is enforced here: each slot records the interest it is armed
//! for and events that do not match are dropped. While a worker holds a
//! connection the slot is disarmed. Re-arming goes through
//! `Registry::reregister`, which makes the OS re-evaluate readiness, so
//! bytes that arrived while disarmed are still reported.

use std::collections::VecDeque;
use std::io::{self, Write};
use std::net::{Shutdown, SocketAddr};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, mpsc};
use std::time::{Duration, Instant};

use mio::event::Event;
use mio::net::{TcpListener, TcpStream};
use mio::{Events, Interest, Poll, Token, Waker};
use signal_hook::consts::{SIGALRM, SIGINT, SIGTERM};
use signal_hook_mio::v1_0::Signals;
use slab::Slab;
use tracing::{debug, error, info, trace, warn};

use crate::config::Config;
use crate::http::connection::{Connection, Next, ReadOutcome};
use crate::http::router::Site;
use crate::http::writer::Flush;
use crate::server::pool::{Handler, QueueFull, WorkerPool};
use crate::server::timer::{TimerId, TimerList};
use crate::server::ServerState;
use crate::store::{BackendPool, Credentials, Session};
use crate::sync::Mutex;

const LISTENER: Token = Token(0);
const SIGNALS: Token = Token(1);
const WAKER: Token = Token(2);
const FIRST_CONN: usize = 3;

/// Poll timeout used while jobs wait for room in the worker queue.
const BACKLOG_RETRY: Duration = Duration::from_millis(10);

/// Idle window, in idle units.
const IDLE_UNITS: u32 = 3;

const BUSY_MESSAGE: &[u8] = b"Internal server busy";

type SharedConn = Arc<Mutex<Connection<TcpStream>>>;

/// A readable connection handed to a worker.
pub struct Job {
    token: Token,
    id: u64,
    conn: SharedConn,
}

/// A worker reporting back what the connection needs next.
#[derive(Debug)]
struct Completion {
    token: Token,
    id: u64,
    next: Next,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Arm {
    Read,
    Write,
}

impl Arm {
    fn interest(self) -> Interest {
        match self {
            Arm::Read => Interest::READABLE,
            Arm::Write => Interest::WRITABLE,
        }
    }
}

/// Why a connection was closed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Eviction {
    /// Response sent and the client did not ask for keep-alive.
    Completed,
    PeerClosed,
    Hangup,
    ReadFailed,
    /// Request outgrew the read buffer.
    BufferFull,
    WriteFailed,
    /// No response could be composed.
    Rejected,
    RearmFailed,
    IdleTimeout,
    Shutdown,
}

#[derive(Debug, Clone, Copy)]
enum TimerAction {
    Evict { token: Token, id: u64 },
}

struct Slot {
    id: u64,
    conn: SharedConn,
    timer: Option<TimerId>,
    armed: Option<Arm>,
    in_flight: bool,
    /// Set when the slot expired or hung up while a worker held it. The
    /// slot is closed with this reason once the worker reports back.
    doomed: Option<Eviction>,
}

impl Slot {
    /// Marks the slot for eviction. The first reason given wins.
    fn doom(&mut self, reason: Eviction) {
        if self.doomed.is_none() {
            self.doomed = Some(reason);
        }
    }
}

/// Runs the parse → respond pipeline on worker threads.
struct Pipeline {
    site: Site,
    credentials: Arc<Credentials>,
    backends: Arc<BackendPool>,
    completions: mpsc::Sender<Completion>,
    waker: Arc<Waker>,
}

impl Handler<Job> for Pipeline {
    fn handle(&self, job: Job) {
        let Job { token, id, conn } = job;
        let next = {
            let mut backend = self.backends.acquire();
            let mut store = Session::new(&self.credentials, &mut **backend);
            conn.lock().process(&self.site, &mut store)
        };
        drop(conn);

        if self.completions.send(Completion { token, id, next }).is_ok() {
            if let Err(e) = self.waker.wake() {
                error!(error = %e, "Failed to wake reactor");
            }
        }
    }
}

pub struct Reactor {
    poll: Poll,
    listener: TcpListener,
    signals: Signals,
    waker: Arc<Waker>,
    completions: mpsc::Receiver<Completion>,
    pool: WorkerPool<Job>,
    slots: Slab<Slot>,
    timers: TimerList<TimerAction>,
    backlog: VecDeque<Job>,
    active: Arc<AtomicUsize>,
    stop: Arc<AtomicBool>,
    next_id: u64,
    idle_unit: Duration,
    max_connections: usize,
    events_capacity: usize,
    read_capacity: usize,
    write_capacity: usize,
}

impl Reactor {
    pub fn new(mut listener: TcpListener, config: &Config, state: ServerState) -> anyhow::Result<Self> {
        let poll = Poll::new()?;
        poll.registry()
            .register(&mut listener, LISTENER, Interest::READABLE)?;

        let mut signals = Signals::new([SIGALRM, SIGTERM, SIGINT])?;
        poll.registry()
            .register(&mut signals, SIGNALS, Interest::READABLE)?;

        let waker = Arc::new(Waker::new(poll.registry(), WAKER)?);
        let (tx, completions) = mpsc::channel();

        let pipeline = Pipeline {
            site: Site {
                doc_root: config.site.doc_root.clone(),
                landing: config.site.default_page.clone(),
            },
            credentials: state.credentials,
            backends: state.backends,
            completions: tx,
            waker: Arc::clone(&waker),
        };
        let pool = WorkerPool::new(config.pool.workers, config.pool.max_requests, pipeline)?;

        Ok(Self {
            poll,
            listener,
            signals,
            waker,
            completions,
            pool,
            slots: Slab::new(),
            timers: TimerList::new(),
            backlog: VecDeque::new(),
            active: state.active,
            stop: Arc::new(AtomicBool::new(false)),
            next_id: 1,
            idle_unit: config.idle_unit(),
            max_connections: config.server.max_connections,
            events_capacity: config.server.events_capacity,
            read_capacity: config.buffers.read_capacity,
            write_capacity: config.buffers.write_capacity,
        })
    }

    pub fn local_addr(&self) -> io::Result<SocketAddr> {
        self.listener.local_addr()
    }

    pub(crate) fn waker(&self) -> Arc<Waker> {
        Arc::clone(&self.waker)
    }

    pub(crate) fn stop_flag(&self) -> Arc<AtomicBool> {
        Arc::clone(&self.stop)
    }

    /// Runs until SIGTERM/SIGINT or a stop request, then closes every
    /// connection.
    pub fn run(&mut self) -> anyhow::Result<()> {
        let mut events = Events::with_capacity(self.events_capacity);
        arm_alarm(self.idle_unit);

        loop {
            let timeout = (!self.backlog.is_empty()).then_some(BACKLOG_RETRY);
            if let Err(e) = self.poll.poll(&mut events, timeout) {
                if e.kind() == io::ErrorKind::Interrupted {
                    continue;
                }
                error!(error = %e, "Poll failure");
                self.shutdown();
                return Err(e.into());
            }

            let mut tick_due = false;
            let mut stop_requested = false;
            for event in events.iter() {
                match event.token() {
                    LISTENER => self.accept_all(),
                    SIGNALS => self.drain_signals(&mut tick_due, &mut stop_requested),
                    WAKER => self.drain_completions(),
                    token => self.connection_event(token, event),
                }
            }

            self.retry_backlog();
            if tick_due {
                self.tick(Instant::now());
                arm_alarm(self.idle_unit);
            }
            if stop_requested || self.stop.load(Ordering::Acquire) {
                break;
            }
        }

        self.shutdown();
        Ok(())
    }

    fn accept_all(&mut self) {
        loop {
            match self.listener.accept() {
                Ok((mut stream, peer)) => {
                    if self.active.load(Ordering::Acquire) >= self.max_connections {
                        warn!(peer = %peer, "Connection limit reached, rejecting");
                        let _ = stream.write_all(BUSY_MESSAGE);
                        continue;
                    }

                    let entry = self.slots.vacant_entry();
                    let token = Token(entry.key() + FIRST_CONN);
                    if let Err(e) = self
                        .poll
                        .registry()
                        .register(&mut stream, token, Interest::READABLE)
                    {
                        error!(peer = %peer, error = %e, "Failed to register connection");
                        continue;
                    }

                    let id = self.next_id;
                    self.next_id += 1;
                    let expire = Instant::now() + self.idle_unit * IDLE_UNITS;
                    let timer = self.timers.insert(expire, TimerAction::Evict { token, id });
                    let conn = Connection::new(id, stream, peer, self.read_capacity, self.write_capacity);
                    entry.insert(Slot {
                        id,
                        conn: Arc::new(Mutex::new(conn)),
                        timer: Some(timer),
                        armed: Some(Arm::Read),
                        in_flight: false,
                        doomed: None,
                    });
                    self.active.fetch_add(1, Ordering::AcqRel);
                    info!(peer = %peer, token = token.0, "Accepted connection");
                }
                Err(e) if e.kind() == io::ErrorKind::WouldBlock => break,
                Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
                Err(e) => {
                    error!(error = %e, "Accept failed");
                    break;
                }
            }
        }
    }

    fn drain_signals(&mut self, tick_due: &mut bool, stop_requested: &mut bool) {
        for signal in self.signals.pending() {
            match signal {
                SIGALRM => *tick_due = true,
                SIGTERM | SIGINT => {
                    info!(signal, "Shutdown signal received");
                    *stop_requested = true;
                }
                _ => {}
            }
        }
    }

    fn connection_event(&mut self, token: Token, event: &Event) {
        let Some(slot) = self.slot_mut(token) else {
            return;
        };

        if event.is_error() || event.is_write_closed() {
            if slot.in_flight {
                slot.doom(Eviction::Hangup);
            } else {
                self.evict(token, Eviction::Hangup);
            }
            return;
        }

        let armed = slot.armed;
        match armed {
            Some(Arm::Read) if event.is_readable() || event.is_read_closed() => self.on_readable(token),
            Some(Arm::Write) if event.is_writable() => self.on_writable(token),
            _ => trace!(token = token.0, "Dropping event for disarmed connection"),
        }
    }

    fn on_readable(&mut self, token: Token) {
        let Some(conn) = self.slot_mut(token).map(|s| Arc::clone(&s.conn)) else {
            return;
        };
        let outcome = conn.lock().read();
        match outcome {
            Ok(ReadOutcome::Data(0)) => {}
            Ok(ReadOutcome::Data(n)) => {
                trace!(token = token.0, bytes = n, "Read");
                self.refresh(token);
                self.submit(token);
            }
            Ok(ReadOutcome::Closed) => self.evict(token, Eviction::PeerClosed),
            Ok(ReadOutcome::Full) => self.evict(token, Eviction::BufferFull),
            Err(e) => {
                debug!(token = token.0, error = %e, "Read failed");
                self.evict(token, Eviction::ReadFailed);
            }
        }
    }

    fn on_writable(&mut self, token: Token) {
        let Some(conn) = self.slot_mut(token).map(|s| Arc::clone(&s.conn)) else {
            return;
        };
        let mut guard = conn.lock();
        let flushed = guard.write();
        match flushed {
            Ok(Flush::Done { .. }) if guard.keep_alive() => {
                guard.reset();
                drop(guard);
                self.refresh(token);
                self.arm(token, Arm::Read);
            }
            Ok(Flush::Done { .. }) => {
                drop(guard);
                self.evict(token, Eviction::Completed);
            }
            Ok(Flush::Blocked { written }) => {
                drop(guard);
                if written > 0 {
                    self.refresh(token);
                }
            }
            Err(e) => {
                drop(guard);
                warn!(token = token.0, error = %e, "Write failed");
                self.evict(token, Eviction::WriteFailed);
            }
        }
    }

    fn submit(&mut self, token: Token) {
        let Some(slot) = self.slot_mut(token) else {
            return;
        };
        slot.armed = None;
        slot.in_flight = true;
        let job = Job {
            token,
            id: slot.id,
            conn: Arc::clone(&slot.conn),
        };
        if let Err(QueueFull(job)) = self.pool.append(job) {
            warn!(token = token.0, "Worker queue full, deferring request");
            self.backlog.push_back(job);
        }
    }

    fn retry_backlog(&mut self) {
        while let Some(job) = self.backlog.pop_front() {
            let Some(slot) = self.slot_mut(job.token).filter(|s| s.id == job.id) else {
                continue;
            };
            if let Some(reason) = slot.doomed {
                let token = job.token;
                drop(job);
                self.evict(token, reason);
                continue;
            }
            if let Err(QueueFull(job)) = self.pool.append(job) {
                self.backlog.push_front(job);
                break;
            }
        }
    }

    fn drain_completions(&mut self) {
        while let Ok(done) = self.completions.try_recv() {
            let Some(slot) = self.slot_mut(done.token).filter(|s| s.id == done.id) else {
                continue;
            };
            slot.in_flight = false;
            if let Some(reason) = slot.doomed {
                self.evict(done.token, reason);
                continue;
            }
            match done.next {
                Next::Read => self.arm(done.token, Arm::Read),
                Next::Write => self.arm(done.token, Arm::Write),
                Next::Close => self.evict(done.token, Eviction::Rejected),
            }
        }
    }

    /// Re-arms a connection for exactly one kind of readiness.
    fn arm(&mut self, token: Token, arm: Arm) {
        let Some(slot) = self.slot_mut(token) else {
            return;
        };
        slot.armed = Some(arm);
        let conn = Arc::clone(&slot.conn);
        let result = self
            .poll
            .registry()
            .reregister(conn.lock().stream_mut(), token, arm.interest());
        if let Err(e) = result {
            warn!(token = token.0, error = %e, "Failed to re-arm connection");
            self.evict(token, Eviction::RearmFailed);
        }
    }

    /// Pushes the connection's idle deadline out after I/O activity.
    fn refresh(&mut self, token: Token) {
        let expire = Instant::now() + self.idle_unit * IDLE_UNITS;
        if let Some(timer) = self.slot_mut(token).and_then(|s| s.timer) {
            self.timers.adjust(timer, expire);
        }
    }

    /// Evicts every connection whose deadline has passed.
    fn tick(&mut self, now: Instant) {
        trace!(timers = self.timers.len(), "Timer tick");
        let mut expired = Vec::new();
        self.timers.tick(now, |action| expired.push(action));

        for TimerAction::Evict { token, id } in expired {
            let Some(slot) = self.slot_mut(token).filter(|s| s.id == id) else {
                continue;
            };
            slot.timer = None;
            if slot.in_flight {
                slot.doom(Eviction::IdleTimeout);
            } else {
                self.evict(token, Eviction::IdleTimeout);
            }
        }
    }

    /// The single close path: drops the timer, deregisters, closes the
    /// socket and decrements the active count.
    fn evict(&mut self, token: Token, reason: Eviction) {
        let Some(index) = token.0.checked_sub(FIRST_CONN) else {
            return;
        };
        if !self.slots.contains(index) {
            return;
        }
        let slot = self.slots.remove(index);
        if let Some(timer) = slot.timer {
            self.timers.remove(timer);
        }

        let mut conn = slot.conn.lock();
        let peer = conn.peer();
        if let Err(e) = self.poll.registry().deregister(conn.stream_mut()) {
            trace!(token = token.0, error = %e, "Deregister failed");
        }
        let _ = conn.stream().shutdown(Shutdown::Both);
        drop(conn);
        self.active.fetch_sub(1, Ordering::AcqRel);

        match reason {
            Eviction::WriteFailed | Eviction::ReadFailed | Eviction::RearmFailed => {
                warn!(peer = %peer, ?reason, "Connection closed");
            }
            _ => debug!(peer = %peer, ?reason, "Connection closed"),
        }
    }

    fn shutdown(&mut self) {
        cancel_alarm();
        let tokens: Vec<Token> = self
            .slots
            .iter()
            .map(|(index, _)| Token(index + FIRST_CONN))
            .collect();
        for token in tokens {
            self.evict(token, Eviction::Shutdown);
        }
        self.backlog.clear();
        info!("Reactor stopped");
    }

    fn slot_mut(&mut self, token: Token) -> Option<&mut Slot> {
        let index = token.0.checked_sub(FIRST_CONN)?;
        self.slots.get_mut(index)
    }
}

/// Schedules the next SIGALRM one idle unit from now.
fn arm_alarm(unit: Duration) {
    let secs = unit.as_secs().clamp(1, u64::from(u32::MAX)) as u32;
    unsafe {
        libc::alarm(secs);
    }
}

fn cancel_alarm() {
    unsafe {
        libc::alarm(0);
    }
}
