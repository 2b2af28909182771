//! Connection state, held in the manager's arena.
//!
//! §9 redesign: the source represents connections as a doubly-linked list
//! threaded through the connection struct itself (`conmgr_fd_t` with
//! `list_t *con_mgr_fds`). Here a `ConnectionId` is an opaque arena key and
//! the arena owns the actual `Connection` values, so nothing needs a back
//! pointer to the manager.

use crate::buffer::Buffer;
use mio::event::Source;
use mio::net::{TcpStream, UnixStream};
use mio::{Interest, Registry, Token};
use std::io::{self, Read, Write};
use std::os::unix::io::{AsRawFd, RawFd};
use std::{fmt, io as std_io};

/// Either side of a listening socket a connection was accepted from.
/// sackd's local credential socket needs `SO_PEERCRED`, which only a Unix
/// socket carries, so the manager speaks both transports through one type
/// rather than duplicating the whole poll loop per transport.
pub enum Stream {
    Tcp(TcpStream),
    Unix(UnixStream),
}

impl Stream {
    pub fn as_raw_fd(&self) -> RawFd {
        match self {
            Stream::Tcp(s) => s.as_raw_fd(),
            Stream::Unix(s) => s.as_raw_fd(),
        }
    }
}

impl Read for Stream {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        match self {
            Stream::Tcp(s) => s.read(buf),
            Stream::Unix(s) => s.read(buf),
        }
    }
}

impl Write for Stream {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        match self {
            Stream::Tcp(s) => s.write(buf),
            Stream::Unix(s) => s.write(buf),
        }
    }

    fn flush(&mut self) -> io::Result<()> {
        match self {
            Stream::Tcp(s) => s.flush(),
            Stream::Unix(s) => s.flush(),
        }
    }
}

impl Source for Stream {
    fn register(&mut self, registry: &Registry, token: Token, interests: Interest) -> std_io::Result<()> {
        match self {
            Stream::Tcp(s) => s.register(registry, token, interests),
            Stream::Unix(s) => s.register(registry, token, interests),
        }
    }

    fn reregister(&mut self, registry: &Registry, token: Token, interests: Interest) -> std_io::Result<()> {
        match self {
            Stream::Tcp(s) => s.reregister(registry, token, interests),
            Stream::Unix(s) => s.reregister(registry, token, interests),
        }
    }

    fn deregister(&mut self, registry: &Registry) -> std_io::Result<()> {
        match self {
            Stream::Tcp(s) => s.deregister(registry),
            Stream::Unix(s) => s.deregister(registry),
        }
    }
}

/// Opaque handle into the manager's connection arena. Stable for the
/// lifetime of the connection; never reused while a live connection still
/// holds it (the arena bumps `next_id` rather than recycling slot indices).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ConnectionId(pub(crate) usize);

impl fmt::Display for ConnectionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "conn#{}", self.0)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnState {
    /// Open, readable and writable.
    Active,
    /// Local side asked to close once `out_buf` drains.
    Draining,
    /// Closed; kept in the arena only until the manager's next sweep
    /// removes it and runs `on_finish`.
    Finished,
}

pub(crate) const READ_CHUNK: usize = 16 * 1024;
pub(crate) const MAX_CONNECTION_BUFFER: usize = 16 * 1024 * 1024;

pub struct Connection {
    pub id: ConnectionId,
    pub stream: Stream,
    pub state: ConnState,
    pub in_buf: Buffer,
    pub out_buf: Buffer,
    /// Set while a `WorkUnit` executing this connection's callback is
    /// queued or running, so the inspector never hands the same
    /// connection's data to two callbacks concurrently (mirrors the
    /// source's per-fd `work_active` flag).
    pub has_pending_work: bool,
    /// Label used only in log lines, e.g. `"127.0.0.1:5000"`.
    pub label: String,
    /// `SO_PEERCRED` captured at accept time, for Unix connections only.
    pub peer_cred: Option<PeerCred>,
}

/// Credentials of the process on the other end of a Unix domain socket,
/// read via `SO_PEERCRED` right after `accept()`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PeerCred {
    pub uid: u32,
    pub gid: u32,
    pub pid: i32,
}

impl Connection {
    pub fn new(id: ConnectionId, stream: Stream, label: String) -> Connection {
        Connection {
            id,
            stream,
            state: ConnState::Active,
            in_buf: Buffer::new(READ_CHUNK, MAX_CONNECTION_BUFFER),
            out_buf: Buffer::new(READ_CHUNK, MAX_CONNECTION_BUFFER),
            has_pending_work: false,
            label,
            peer_cred: None,
        }
    }

    pub fn is_finished(&self) -> bool {
        self.state == ConnState::Finished
    }

    /// True once the connection has nothing left for the poll loop to do
    /// on its own: draining with an empty outbound buffer, or finished.
    pub fn ready_to_reap(&self) -> bool {
        matches!(self.state, ConnState::Finished)
            || (self.state == ConnState::Draining && self.out_buf.is_empty())
    }
}
