//! Reactive connection manager: one poll thread multiplexing many sockets,
//! handing parsed-out work to a [`slurm_workq::WorkQueue`] so callback code
//! never runs on the poll thread.
//!
//! Grounded on `neutronium::net` (`endpoint.rs`, `channel.rs`,
//! `buffer.rs`), generalized to a single `mio::Poll` and an arena of
//! `Connection`s keyed by an opaque `ConnectionId` rather than the
//! source's pointer-linked `conmgr_fd_t` list.

mod buffer;
mod callbacks;
mod connection;
mod manager;

pub use buffer::Buffer;
pub use callbacks::ConnectionHandler;
pub use connection::{ConnState, Connection, ConnectionId, PeerCred, Stream};
pub use manager::Conmgr;

#[cfg(test)]
mod tests;
