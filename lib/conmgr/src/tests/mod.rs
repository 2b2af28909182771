//! Integration-style coverage for the poll loop: loopback echo traffic,
//! concurrent per-connection callback serialization, and shutdown on a
//! delivered signal.

use crate::{Conmgr, ConnectionHandler, ConnectionId};
use slurm_common::error::Result;
use slurm_common::logging;
use std::io::{Read, Write};
use std::net::{SocketAddr, TcpStream};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, OnceLock};
use std::thread;
use std::time::Duration;

fn start_server(handler: Arc<dyn ConnectionHandler>) -> (Arc<Conmgr>, SocketAddr, thread::JoinHandle<()>) {
    let conmgr = Arc::new(Conmgr::new(2, handler, logging::discard()).unwrap());
    let addr = conmgr
        .add_listener("127.0.0.1:0".parse().unwrap())
        .unwrap();

    let run_handle = {
        let conmgr = Arc::clone(&conmgr);
        thread::spawn(move || {
            conmgr.run().unwrap();
        })
    };

    (conmgr, addr, run_handle)
}

struct EchoHandler {
    conmgr: OnceLock<Arc<Conmgr>>,
}

impl ConnectionHandler for EchoHandler {
    fn on_data(&self, id: ConnectionId, data: &[u8]) -> Result<usize> {
        if let Some(conmgr) = self.conmgr.get() {
            conmgr.write_to(id, data)?;
        }
        Ok(data.len())
    }
}

#[test]
fn s1_loopback_echo() {
    let handler = Arc::new(EchoHandler { conmgr: OnceLock::new() });
    let (conmgr, addr, run_handle) = start_server(handler.clone());
    handler.conmgr.set(Arc::clone(&conmgr)).ok();

    let mut client = TcpStream::connect(addr).unwrap();
    client.write_all(b"hello conmgr").unwrap();

    let mut buf = [0u8; 64];
    let n = client.read(&mut buf).unwrap();
    assert_eq!(&buf[..n], b"hello conmgr");

    conmgr.request_shutdown();
    drop(client);
    run_handle.join().unwrap();
}

struct CountingHandler {
    conmgr: OnceLock<Arc<Conmgr>>,
    concurrent: AtomicUsize,
    max_concurrent: AtomicUsize,
    seen: Mutex<Vec<u8>>,
    /// First call blocks here until the test releases it, holding its
    /// WorkUnit in flight while a second read event is forced in.
    hold_first: Mutex<Option<std::sync::mpsc::Receiver<()>>>,
    release_sent: std::sync::mpsc::Sender<()>,
}

impl ConnectionHandler for CountingHandler {
    fn on_data(&self, id: ConnectionId, data: &[u8]) -> Result<usize> {
        let now = self.concurrent.fetch_add(1, Ordering::SeqCst) + 1;
        self.max_concurrent.fetch_max(now, Ordering::SeqCst);

        if let Some(rx) = self.hold_first.lock().unwrap().take() {
            rx.recv().unwrap();
        }

        self.seen.lock().unwrap().extend_from_slice(data);
        self.concurrent.fetch_sub(1, Ordering::SeqCst);

        if let Some(conmgr) = self.conmgr.get() {
            let _ = conmgr.write_to(id, b"ack");
        }
        Ok(data.len())
    }
}

/// Proves serialization structurally rather than by timing: the first
/// `on_data` call blocks on a channel until released, so a second readable
/// event on the same connection is guaranteed to land while the first
/// WorkUnit is still in flight. If the manager ever double-dispatches,
/// `max_concurrent` observes 2 regardless of scheduling luck.
#[test]
fn s2_serializes_callbacks_per_connection() {
    let (release_tx, release_rx) = std::sync::mpsc::channel();
    let handler = Arc::new(CountingHandler {
        conmgr: OnceLock::new(),
        concurrent: AtomicUsize::new(0),
        max_concurrent: AtomicUsize::new(0),
        seen: Mutex::new(Vec::new()),
        hold_first: Mutex::new(Some(release_rx)),
        release_sent: release_tx,
    });
    let (conmgr, addr, run_handle) = start_server(handler.clone());
    handler.conmgr.set(Arc::clone(&conmgr)).ok();

    let mut client = TcpStream::connect(addr).unwrap();
    client.write_all(b"a").unwrap();

    // Give the poll thread time to read "a" and dispatch the first
    // WorkUnit, which is now parked on `hold_first`.
    thread::sleep(Duration::from_millis(50));
    assert_eq!(handler.concurrent.load(Ordering::SeqCst), 1);

    // A second readable event on the same connection while the first unit
    // is still in flight: this is exactly the window the fix must not
    // double-dispatch in.
    client.write_all(b"b").unwrap();
    thread::sleep(Duration::from_millis(50));

    handler.release_sent.send(()).unwrap();

    let mut buf = [0u8; 3];
    for _ in 0..2 {
        client.read_exact(&mut buf).unwrap();
        assert_eq!(&buf, b"ack");
    }

    assert_eq!(handler.max_concurrent.load(Ordering::SeqCst), 1);
    assert_eq!(&*handler.seen.lock().unwrap(), b"ab");

    conmgr.request_shutdown();
    drop(client);
    run_handle.join().unwrap();
}

struct NoopHandler;
impl ConnectionHandler for NoopHandler {
    fn on_data(&self, _id: ConnectionId, data: &[u8]) -> Result<usize> {
        Ok(data.len())
    }
}

#[test]
fn s3_shutdown_drains_and_returns() {
    let (conmgr, addr, run_handle) = start_server(Arc::new(NoopHandler));
    let client = TcpStream::connect(addr).unwrap();

    conmgr.request_shutdown();
    run_handle.join().unwrap();
    drop(client);
    assert!(conmgr.is_shutting_down());
}

struct PeerCredHandler {
    conmgr: OnceLock<Arc<Conmgr>>,
    seen_uid: Mutex<Option<u32>>,
}

impl ConnectionHandler for PeerCredHandler {
    fn on_connection(&self, id: ConnectionId, _peer: Option<SocketAddr>) {
        if let Some(conmgr) = self.conmgr.get() {
            *self.seen_uid.lock().unwrap() = conmgr.peer_cred(id).map(|c| c.uid);
        }
    }

    fn on_data(&self, _id: ConnectionId, data: &[u8]) -> Result<usize> {
        Ok(data.len())
    }
}

#[test]
fn s4_unix_listener_captures_peer_cred() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("sack.socket");

    let handler = Arc::new(PeerCredHandler { conmgr: OnceLock::new(), seen_uid: Mutex::new(None) });
    let conmgr = Arc::new(Conmgr::new(1, handler.clone(), logging::discard()).unwrap());
    conmgr.add_unix_listener(&path).unwrap();
    handler.conmgr.set(Arc::clone(&conmgr)).ok();

    let run_handle = {
        let conmgr = Arc::clone(&conmgr);
        thread::spawn(move || conmgr.run().unwrap())
    };

    let client = std::os::unix::net::UnixStream::connect(&path).unwrap();
    thread::sleep(Duration::from_millis(50));

    let expected_uid = unsafe { libc::getuid() };
    assert_eq!(*handler.seen_uid.lock().unwrap(), Some(expected_uid));

    conmgr.request_shutdown();
    drop(client);
    run_handle.join().unwrap();
}

struct CountingConnectionsHandler {
    accepted: AtomicUsize,
}

impl ConnectionHandler for CountingConnectionsHandler {
    fn on_connection(&self, _id: ConnectionId, _peer: Option<SocketAddr>) {
        self.accepted.fetch_add(1, Ordering::SeqCst);
    }

    fn on_data(&self, _id: ConnectionId, data: &[u8]) -> Result<usize> {
        Ok(data.len())
    }
}

const TEST_CONNECTION_CAP: usize = 124;

#[test]
fn s5_listener_pauses_at_connection_cap() {
    let handler = Arc::new(CountingConnectionsHandler { accepted: AtomicUsize::new(0) });
    let (conmgr, addr, run_handle) = start_server(handler.clone());

    let mut clients = Vec::new();
    for _ in 0..TEST_CONNECTION_CAP {
        clients.push(TcpStream::connect(addr).unwrap());
    }
    thread::sleep(Duration::from_millis(200));
    assert_eq!(handler.accepted.load(Ordering::SeqCst), TEST_CONNECTION_CAP);

    // This handshake completes at the kernel's accept backlog, but the
    // listener is deregistered while at the cap, so conmgr never calls
    // accept() on it.
    let extra = TcpStream::connect(addr).unwrap();
    thread::sleep(Duration::from_millis(200));
    assert_eq!(handler.accepted.load(Ordering::SeqCst), TEST_CONNECTION_CAP);

    // Freeing a slot lets the paused listener resume and pick it up.
    clients.pop();
    thread::sleep(Duration::from_millis(300));
    assert_eq!(handler.accepted.load(Ordering::SeqCst), TEST_CONNECTION_CAP + 1);

    conmgr.request_shutdown();
    drop(clients);
    drop(extra);
    run_handle.join().unwrap();
}
