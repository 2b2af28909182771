//! The callback surface a caller implements to react to connection
//! lifecycle and data events, mirroring the source's
//! `conmgr_events_t` (`on_connection`, `on_data`, `on_finish`) triplet.

use crate::connection::ConnectionId;
use slurm_common::error::Result;
use std::net::SocketAddr;

/// Invoked from a worker thread, never from the poll thread itself, so
/// implementations may block or do blocking I/O of their own.
pub trait ConnectionHandler: Send + Sync {
    /// A new connection was accepted. `peer` is `None` for connections
    /// that never had a resolvable peer address (rare, but `accept4` can
    /// race a since-reset peer).
    fn on_connection(&self, id: ConnectionId, peer: Option<SocketAddr>) {
        let _ = (id, peer);
    }

    /// New bytes are available in the connection's inbound buffer.
    /// Implementations parse as many whole messages as `data` contains
    /// and return how many bytes they consumed; leftover bytes stay
    /// buffered until more data arrives. Returning `Err` closes the
    /// connection (see `Error::is_terminating`).
    fn on_data(&self, id: ConnectionId, data: &[u8]) -> Result<usize>;

    /// The connection has been torn down (EOF, error, or a requested
    /// close that finished draining). No further callbacks fire for
    /// `id` after this one.
    fn on_finish(&self, id: ConnectionId) {
        let _ = id;
    }
}
