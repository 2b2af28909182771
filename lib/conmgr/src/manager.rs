//! `Conmgr`: a single-poll-thread reactive I/O manager backed by a
//! [`WorkQueue`] worker pool.
//!
//! Grounded on `neutronium::net::endpoint::Endpoint`, generalized from its
//! three separate `mio::Poll` instances (one each for the listen socket,
//! handshakes, and live sessions) down to the single poll loop this design
//! calls for: at most one thread may be inside `poll()` at a time, and
//! every other thread reaches the manager only through `Registry`
//! (`Clone`-able, safe to use concurrently with an in-progress `poll()`)
//! or the shared `Mutex<Inner>`.

use crate::buffer::Buffer;
use crate::callbacks::ConnectionHandler;
use crate::connection::{ConnState, Connection, ConnectionId, PeerCred, Stream};
use indexmap::IndexMap;
use mio::event::Source;
use mio::net::{TcpListener, UnixListener, UnixStream as MioUnixStream};
use mio::{Events, Interest, Poll, Registry, Token};
use signal_hook::iterator::Signals;
use slog::{debug, info, o, warn, Logger};
use slurm_common::error::{Error, Result};
use slurm_workq::{WorkQueue, WorkUnit};
use std::io::{self, Read, Write};
use std::net::SocketAddr;
use std::os::unix::io::AsRawFd;
use std::os::unix::net::UnixStream as StdUnixStream;
use std::path::Path;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::thread;
use std::time::Duration;

/// Either transport a listening socket accepts on. The Unix variant keeps
/// its bind path so shutdown can unlink the socket file (§8 testable
/// property 9: after close the path either doesn't exist or belongs to a
/// different process).
enum Listener {
    Tcp(TcpListener),
    Unix(UnixListener, std::path::PathBuf),
}

impl Listener {
    fn accept(&mut self) -> io::Result<(Stream, Option<SocketAddr>, Option<PeerCred>)> {
        match self {
            Listener::Tcp(l) => {
                let (stream, peer) = l.accept()?;
                Ok((Stream::Tcp(stream), Some(peer), None))
            }
            Listener::Unix(l, _) => {
                let (stream, _peer) = l.accept()?;
                let cred = peer_cred_of(stream.as_raw_fd()).ok();
                Ok((Stream::Unix(stream), None, cred))
            }
        }
    }

    fn register(&mut self, registry: &Registry, token: Token, interests: Interest) -> io::Result<()> {
        match self {
            Listener::Tcp(l) => l.register(registry, token, interests),
            Listener::Unix(l, _) => l.register(registry, token, interests),
        }
    }

    fn deregister(&mut self, registry: &Registry) -> io::Result<()> {
        match self {
            Listener::Tcp(l) => registry.deregister(l),
            Listener::Unix(l, _) => registry.deregister(l),
        }
    }

    /// Bind path, for Unix listeners only. Used to unlink the socket file
    /// once the poll loop shuts down.
    fn unix_path(&self) -> Option<&Path> {
        match self {
            Listener::Unix(_, path) => Some(path),
            Listener::Tcp(_) => None,
        }
    }
}

/// Socket-level read/write deadline applied to every accepted connection
/// (§5): `SO_RCVTIMEO`/`SO_SNDTIMEO` at open time, so a stalled peer fails
/// the in-flight unit with an OS-reported timeout rather than hanging the
/// connection forever.
const RPC_SOCKET_TIMEOUT: Duration = Duration::from_secs(10);

fn set_socket_timeouts(fd: std::os::unix::io::RawFd, timeout: Duration) {
    let tv = libc::timeval {
        tv_sec: timeout.as_secs() as libc::time_t,
        tv_usec: timeout.subsec_micros() as libc::suseconds_t,
    };
    let len = std::mem::size_of::<libc::timeval>() as libc::socklen_t;
    unsafe {
        libc::setsockopt(
            fd,
            libc::SOL_SOCKET,
            libc::SO_RCVTIMEO,
            &tv as *const _ as *const libc::c_void,
            len,
        );
        libc::setsockopt(
            fd,
            libc::SOL_SOCKET,
            libc::SO_SNDTIMEO,
            &tv as *const _ as *const libc::c_void,
            len,
        );
    }
}

fn peer_cred_of(fd: std::os::unix::io::RawFd) -> io::Result<PeerCred> {
    let mut ucred: libc::ucred = unsafe { std::mem::zeroed() };
    let mut len = std::mem::size_of::<libc::ucred>() as libc::socklen_t;
    let rc = unsafe {
        libc::getsockopt(
            fd,
            libc::SOL_SOCKET,
            libc::SO_PEERCRED,
            &mut ucred as *mut _ as *mut libc::c_void,
            &mut len,
        )
    };
    if rc < 0 {
        return Err(io::Error::last_os_error());
    }
    Ok(PeerCred { uid: ucred.uid, gid: ucred.gid, pid: ucred.pid })
}

const WAKE_TOKEN: Token = Token(0);
const LISTENER_TOKEN_BASE: usize = 2;
const CONNECTION_TOKEN_BASE: usize = 1 << 20;
const POLL_TIMEOUT: Duration = Duration::from_millis(500);

/// Soft cap on simultaneously open connections (§4.2/§5). Once hit, every
/// listener is deregistered until a connection is reaped; existing
/// connections keep draining in the meantime.
const MAX_OPEN_CONNECTIONS: usize = 124;

fn connection_token(id: ConnectionId) -> Token {
    Token(CONNECTION_TOKEN_BASE + id.0)
}

fn connection_id_of(token: Token) -> Option<ConnectionId> {
    token.0.checked_sub(CONNECTION_TOKEN_BASE).map(ConnectionId)
}

struct Inner {
    connections: IndexMap<ConnectionId, Connection>,
    listeners: IndexMap<Token, Listener>,
    paused_listeners: std::collections::HashSet<Token>,
    next_id: usize,
    next_listener_token: usize,
}

/// Single-poll-loop reactive connection manager. Construct with
/// [`Conmgr::new`], add listeners with [`Conmgr::add_listener`], then hand
/// ownership to one thread via [`Conmgr::run`]. Every other method is safe
/// to call concurrently from worker threads or signal handlers.
pub struct Conmgr {
    poll: Mutex<Poll>,
    registry: Registry,
    inner: Arc<Mutex<Inner>>,
    workq: Arc<WorkQueue>,
    handler: Arc<dyn ConnectionHandler>,
    wake_writer: Mutex<StdUnixStream>,
    wake_reader: Mutex<Option<MioUnixStream>>,
    shutdown: AtomicBool,
    logger: Logger,
}

impl Conmgr {
    /// `workers` is the size of the backing `WorkQueue`; callback
    /// invocations run there, never on the poll thread.
    pub fn new(workers: usize, handler: Arc<dyn ConnectionHandler>, logger: Logger) -> Result<Conmgr> {
        let poll = Poll::new()?;
        let registry = poll.registry().try_clone()?;

        let (wake_writer, mut wake_reader_std) = StdUnixStream::pair()?;
        wake_reader_std.set_nonblocking(true)?;
        let mut wake_reader = MioUnixStream::from_std(wake_reader_std);
        registry.register(&mut wake_reader, WAKE_TOKEN, Interest::READABLE)?;

        Ok(Conmgr {
            poll: Mutex::new(poll),
            registry,
            inner: Arc::new(Mutex::new(Inner {
                connections: IndexMap::new(),
                listeners: IndexMap::new(),
                paused_listeners: std::collections::HashSet::new(),
                next_id: 0,
                next_listener_token: LISTENER_TOKEN_BASE,
            })),
            workq: Arc::new(WorkQueue::new(workers)),
            handler,
            wake_writer: Mutex::new(wake_writer),
            wake_reader: Mutex::new(Some(wake_reader)),
            shutdown: AtomicBool::new(false),
            logger,
        })
    }

    fn wake(&self) {
        let mut w = self.wake_writer.lock().unwrap();
        let _ = w.write_all(&[0u8]);
    }

    /// Spawns a dedicated thread that blocks on `SIGINT`/`SIGTERM` and
    /// calls [`Conmgr::request_shutdown`] on delivery. Grounded on the
    /// pack's `signal_hook::iterator::Signals` usage rather than a
    /// poll-integrated self-pipe: simpler, and the poll loop's own
    /// `POLL_TIMEOUT` keeps shutdown latency bounded regardless.
    pub fn spawn_signal_handler(self: &Arc<Self>) -> thread::JoinHandle<()> {
        let conmgr = Arc::clone(self);
        thread::spawn(move || {
            let mut signals =
                Signals::new([signal_hook::consts::SIGINT, signal_hook::consts::SIGTERM])
                    .expect("failed to install signal handler");
            for sig in signals.forever() {
                info!(conmgr.logger, "received signal"; "signal" => sig);
                conmgr.request_shutdown();
                break;
            }
        })
    }

    /// Binds and registers a new listening socket, returning the address
    /// actually bound (useful when `addr`'s port is `0`). Safe to call
    /// before or after `run()` starts (the registry is shared).
    pub fn add_listener(&self, addr: SocketAddr) -> Result<SocketAddr> {
        let std_listener = std::net::TcpListener::bind(addr)?;
        std_listener.set_nonblocking(true)?;
        let bound = std_listener.local_addr()?;
        let mut listener = Listener::Tcp(TcpListener::from_std(std_listener));

        let mut inner = self.inner.lock().unwrap();
        let token = Token(inner.next_listener_token);
        inner.next_listener_token += 1;
        listener.register(&self.registry, token, Interest::READABLE)?;
        inner.listeners.insert(token, listener);
        info!(self.logger, "listening"; "addr" => %bound);
        Ok(bound)
    }

    /// Binds a Unix domain socket listener, e.g. sackd's credential
    /// socket. The caller is responsible for removing a stale socket file
    /// left behind by a prior crashed process before calling this.
    pub fn add_unix_listener(&self, path: &Path) -> Result<()> {
        let std_listener = std::os::unix::net::UnixListener::bind(path)?;
        std_listener.set_nonblocking(true)?;
        let mut listener = Listener::Unix(UnixListener::from_std(std_listener), path.to_path_buf());

        let mut inner = self.inner.lock().unwrap();
        let token = Token(inner.next_listener_token);
        inner.next_listener_token += 1;
        listener.register(&self.registry, token, Interest::READABLE)?;
        inner.listeners.insert(token, listener);
        info!(self.logger, "listening on unix socket"; "path" => %path.display());
        Ok(())
    }

    /// Requests graceful shutdown: the poll loop finishes draining any
    /// connections already marked `Draining`, refuses new work, and
    /// returns from `run()` once the arena is empty.
    pub fn request_shutdown(&self) {
        self.shutdown.store(true, Ordering::SeqCst);
        self.wake();
    }

    pub fn is_shutting_down(&self) -> bool {
        self.shutdown.load(Ordering::SeqCst)
    }

    /// Queues `data` for a connection and wakes the poll thread so it
    /// picks up the new `WRITABLE` interest. Returns `Error::InvalidObjectId`
    /// if `id` is no longer live.
    pub fn write_to(&self, id: ConnectionId, data: &[u8]) -> Result<()> {
        let mut inner = self.inner.lock().unwrap();
        let conn = inner
            .connections
            .get_mut(&id)
            .ok_or_else(|| Error::InvalidObjectId(id.to_string()))?;
        conn.out_buf.push(data).map_err(Error::from)?;
        self.registry.reregister(
            &mut conn.stream,
            connection_token(id),
            Interest::READABLE | Interest::WRITABLE,
        )?;
        drop(inner);
        self.wake();
        Ok(())
    }

    /// Marks a connection to close once its outbound buffer drains.
    pub fn close(&self, id: ConnectionId) {
        let mut inner = self.inner.lock().unwrap();
        if let Some(conn) = inner.connections.get_mut(&id) {
            if conn.state == ConnState::Active {
                conn.state = ConnState::Draining;
            }
        }
    }

    /// Runs the poll loop until [`Conmgr::request_shutdown`] is called and
    /// every connection has drained. Must be called from exactly one
    /// thread at a time (the lock is held for the duration).
    pub fn run(&self) -> Result<()> {
        let mut poll = self.poll.lock().unwrap();
        let mut events = Events::with_capacity(256);

        loop {
            match poll.poll(&mut events, Some(POLL_TIMEOUT)) {
                Ok(()) => {}
                Err(err) if err.kind() == io::ErrorKind::Interrupted => continue,
                Err(err) => return Err(err.into()),
            }

            for event in events.iter() {
                match event.token() {
                    WAKE_TOKEN => self.drain_wake(),
                    token if token.0 >= CONNECTION_TOKEN_BASE => {
                        if let Some(id) = connection_id_of(token) {
                            self.handle_connection_event(id, event.is_readable(), event.is_writable());
                        }
                    }
                    token => self.handle_listener_readable(token),
                }
            }

            self.reap_finished();
            self.resume_paused_listeners();

            if self.shutdown.load(Ordering::SeqCst) {
                self.begin_draining_all();
                self.drain_all_outbound();
                self.reap_finished();

                let empty = self.inner.lock().unwrap().connections.is_empty();
                if empty {
                    self.workq.quiesce();
                    self.unlink_unix_listeners();
                    return Ok(());
                }
            }
        }
    }

    fn drain_wake(&self) {
        if let Some(reader) = self.wake_reader.lock().unwrap().as_mut() {
            let mut buf = [0u8; 64];
            while matches!(reader.read(&mut buf), Ok(n) if n > 0) {}
        }
    }

    fn handle_listener_readable(&self, token: Token) {
        loop {
            if self.inner.lock().unwrap().connections.len() >= MAX_OPEN_CONNECTIONS {
                self.pause_listener(token);
                return;
            }

            let accepted = {
                let mut inner = self.inner.lock().unwrap();
                match inner.listeners.get_mut(&token) {
                    Some(listener) => listener.accept(),
                    None => return,
                }
            };

            let (stream, peer, peer_cred) = match accepted {
                Ok(triple) => triple,
                Err(err) if err.kind() == io::ErrorKind::WouldBlock => return,
                Err(err) if is_soft_accept_error(&err) => {
                    warn!(self.logger, "accept retry"; "error" => %err);
                    return;
                }
                Err(err) => {
                    warn!(self.logger, "accept failed"; "error" => %err);
                    return;
                }
            };

            self.register_connection(stream, peer, peer_cred);
        }
    }

    /// Deregisters `token`'s listener so accepted-but-unhandled backlog
    /// stops growing while the connection cap is held. A no-op if it's
    /// already paused.
    fn pause_listener(&self, token: Token) {
        let mut inner = self.inner.lock().unwrap();
        if inner.paused_listeners.contains(&token) {
            return;
        }
        if let Some(listener) = inner.listeners.get_mut(&token) {
            if listener.deregister(&self.registry).is_ok() {
                inner.paused_listeners.insert(token);
                warn!(self.logger, "pausing listener at connection cap"; "cap" => MAX_OPEN_CONNECTIONS);
            }
        }
    }

    /// Re-registers any listeners paused by [`Conmgr::pause_listener`] once
    /// the open-connection count has dropped back under the cap.
    fn resume_paused_listeners(&self) {
        let mut inner = self.inner.lock().unwrap();
        if inner.paused_listeners.is_empty() || inner.connections.len() >= MAX_OPEN_CONNECTIONS {
            return;
        }
        let tokens: Vec<Token> = inner.paused_listeners.iter().copied().collect();
        for token in tokens {
            if let Some(listener) = inner.listeners.get_mut(&token) {
                if listener.register(&self.registry, token, Interest::READABLE).is_ok() {
                    inner.paused_listeners.remove(&token);
                }
            }
        }
    }

    fn register_connection(&self, mut stream: Stream, peer: Option<SocketAddr>, peer_cred: Option<PeerCred>) {
        let mut inner = self.inner.lock().unwrap();
        let id = ConnectionId(inner.next_id);
        inner.next_id += 1;

        let label = peer.map(|p| p.to_string()).unwrap_or_else(|| id.to_string());
        set_socket_timeouts(stream.as_raw_fd(), RPC_SOCKET_TIMEOUT);
        if let Err(err) = self.registry.register(&mut stream, connection_token(id), Interest::READABLE) {
            warn!(self.logger, "failed to register connection"; "error" => %err);
            return;
        }

        let mut conn = Connection::new(id, stream, label.clone());
        conn.peer_cred = peer_cred;
        // Occupies the same exclusivity slot `dispatch_data` uses, so a
        // readable event racing the accept can't also queue an `on_data`
        // WorkUnit before `on_connection` has run.
        conn.has_pending_work = true;
        inner.connections.insert(id, conn);
        drop(inner);

        debug!(self.logger, "accepted connection"; "id" => %id, "peer" => label);

        let handler = Arc::clone(&self.handler);
        let inner_mutex = Arc::clone(&self.inner);
        let _ = self.workq.submit(WorkUnit::new("conmgr-on-connection", Some(id.0), move || {
            handler.on_connection(id, peer);
            let mut inner = inner_mutex.lock().unwrap();
            if let Some(conn) = inner.connections.get_mut(&id) {
                conn.has_pending_work = false;
            }
        }));
    }

    /// `SO_PEERCRED` captured when `id` was accepted on a Unix listener.
    /// `None` for TCP connections or if the connection has already been
    /// reaped.
    pub fn peer_cred(&self, id: ConnectionId) -> Option<PeerCred> {
        self.inner.lock().unwrap().connections.get(&id).and_then(|c| c.peer_cred)
    }

    fn handle_connection_event(&self, id: ConnectionId, readable: bool, writable: bool) {
        if writable {
            self.write_connection(id);
        }
        if readable {
            self.read_connection(id);
        }
    }

    fn read_connection(&self, id: ConnectionId) {
        let mut inner = self.inner.lock().unwrap();
        let conn = match inner.connections.get_mut(&id) {
            Some(conn) => conn,
            None => return,
        };
        if conn.state != ConnState::Active {
            return;
        }

        let was_pending = conn.has_pending_work;

        let want = available_bytes(&conn.stream).unwrap_or(16 * 1024).max(1);
        match conn.in_buf.ingress(&mut conn.stream, want) {
            Ok(0) => {
                conn.state = ConnState::Finished;
            }
            Ok(_) => {
                conn.has_pending_work = true;
            }
            Err(err) if err.kind() == io::ErrorKind::WouldBlock => {}
            Err(err) => {
                warn!(self.logger, "read failed"; "id" => %id, "error" => %err);
                conn.state = ConnState::Finished;
            }
        }

        // Only the false->true transition needs a new WorkUnit: if a unit
        // was already in flight (or queued) for this connection, it will
        // pick up the newly buffered bytes itself. Dispatching again here
        // would let two WorkUnits run `on_data` for the same connection
        // concurrently.
        let needs_dispatch = !was_pending && conn.has_pending_work && conn.state == ConnState::Active;
        drop(inner);
        if needs_dispatch {
            self.dispatch_data(id);
        }
    }

    fn write_connection(&self, id: ConnectionId) {
        let mut inner = self.inner.lock().unwrap();
        let conn = match inner.connections.get_mut(&id) {
            Some(conn) => conn,
            None => return,
        };

        match write_with_no_sigpipe(&conn.stream, &mut conn.out_buf) {
            Ok(_) => {}
            Err(err) if err.kind() == io::ErrorKind::WouldBlock => {}
            Err(err) => {
                warn!(self.logger, "write failed"; "id" => %id, "error" => %err);
                conn.state = ConnState::Finished;
                return;
            }
        }

        if conn.out_buf.is_empty() {
            let interest = if conn.state == ConnState::Active {
                Interest::READABLE
            } else {
                conn.state = ConnState::Finished;
                return;
            };
            let _ = self.registry.reregister(&mut conn.stream, connection_token(id), interest);
        }
    }

    /// Offloads the connection's buffered bytes to the worker pool. Only
    /// one such unit may be in flight per connection at a time
    /// (`has_pending_work` acts as the gate); the inspector does not read
    /// further from this connection until the unit clears it.
    fn dispatch_data(&self, id: ConnectionId) {
        let handler = Arc::clone(&self.handler);
        let inner_mutex = Arc::clone(&self.inner);
        let logger = self.logger.new(o!("id" => id.to_string()));

        let _ = self.workq.submit(WorkUnit::new("conmgr-on-data", Some(id.0), move || {
            loop {
                let snapshot = {
                    let inner = inner_mutex.lock().unwrap();
                    inner.connections.get(&id).map(|c| c.in_buf.read_slice().to_vec())
                };
                let Some(data) = snapshot else { break };
                if data.is_empty() {
                    break;
                }

                let result = handler.on_data(id, &data);
                let mut inner = inner_mutex.lock().unwrap();
                let Some(conn) = inner.connections.get_mut(&id) else { break };

                match result {
                    Ok(consumed) => {
                        conn.in_buf.move_head(consumed);
                        if consumed == 0 {
                            break;
                        }
                    }
                    Err(err) => {
                        warn!(logger, "on_data failed"; "error" => %err);
                        if err.is_terminating() {
                            conn.state = ConnState::Finished;
                        }
                        break;
                    }
                }
            }

            let mut inner = inner_mutex.lock().unwrap();
            if let Some(conn) = inner.connections.get_mut(&id) {
                conn.has_pending_work = false;
            }
        }));
    }

    fn reap_finished(&self) {
        let finished: Vec<ConnectionId> = {
            let inner = self.inner.lock().unwrap();
            inner
                .connections
                .iter()
                .filter(|(_, c)| c.ready_to_reap() && !c.has_pending_work)
                .map(|(id, _)| *id)
                .collect()
        };

        for id in finished {
            let mut inner = self.inner.lock().unwrap();
            let removed = inner.connections.swap_remove(&id);
            drop(inner);
            let Some(mut conn) = removed else { continue };
            let _ = self.registry.deregister(&mut conn.stream);

            // `conn` is already out of the arena, so nothing else can
            // race `on_finish` over it; no `has_pending_work` gating
            // needed here the way `dispatch_data` and `on_connection` do.
            let handler = Arc::clone(&self.handler);
            let _ = self.workq.submit(WorkUnit::new("conmgr-on-finish", Some(id.0), move || {
                handler.on_finish(id);
            }));
        }
    }

    /// Called once shutdown is requested: connections with no callback
    /// still in flight move straight to draining so idle sockets (nothing
    /// left to read or write) don't block the loop from ever exiting.
    fn begin_draining_all(&self) {
        let mut inner = self.inner.lock().unwrap();
        for conn in inner.connections.values_mut() {
            if conn.state == ConnState::Active && !conn.has_pending_work {
                conn.state = ConnState::Draining;
            }
        }
    }

    fn drain_all_outbound(&self) {
        let ids: Vec<ConnectionId> = self.inner.lock().unwrap().connections.keys().copied().collect();
        for id in ids {
            self.write_connection(id);
        }
    }

    /// Unlinks every Unix listener's bind path once the poll loop is about
    /// to return. A missing file (already removed, or never created) is
    /// not an error.
    fn unlink_unix_listeners(&self) {
        let inner = self.inner.lock().unwrap();
        for listener in inner.listeners.values() {
            if let Some(path) = listener.unix_path() {
                if let Err(err) = std::fs::remove_file(path) {
                    if err.kind() != io::ErrorKind::NotFound {
                        warn!(self.logger, "failed to unlink unix socket"; "path" => %path.display(), "error" => %err);
                    }
                }
            }
        }
    }
}

fn is_soft_accept_error(err: &io::Error) -> bool {
    matches!(
        err.raw_os_error(),
        Some(libc::EMFILE) | Some(libc::ENFILE) | Some(libc::ENOBUFS) | Some(libc::ENOMEM)
    )
}

fn available_bytes(stream: &Stream) -> io::Result<usize> {
    let mut n: libc::c_int = 0;
    let rc = unsafe { libc::ioctl(stream.as_raw_fd(), libc::FIONREAD, &mut n) };
    if rc < 0 {
        return Err(io::Error::last_os_error());
    }
    Ok(n.max(0) as usize)
}

fn write_with_no_sigpipe(stream: &Stream, out: &mut Buffer) -> io::Result<usize> {
    let mut total = 0;
    while !out.is_empty() {
        let slice = out.read_slice();
        let rc = unsafe {
            libc::send(
                stream.as_raw_fd(),
                slice.as_ptr() as *const libc::c_void,
                slice.len(),
                libc::MSG_NOSIGNAL,
            )
        };
        if rc < 0 {
            let err = io::Error::last_os_error();
            if err.kind() == io::ErrorKind::WouldBlock && total > 0 {
                break;
            }
            return Err(err);
        }
        let n = rc as usize;
        out.move_head(n);
        total += n;
    }
    Ok(total)
}
