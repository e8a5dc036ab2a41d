//! The dispatcher: owns the listening socket, the readiness selector and the
//! parked-task table, and runs the event loop that binds them together.
//!
//! Everything happens on one thread. "Concurrency" is the interleaving of
//! suspended tasks: the loop blocks in [`Selector::wait`], and for every
//! descriptor the selector reports it removes that descriptor's parked task
//! and resumes it synchronously. A resumed task either parks again (accept
//! and read loops) or completes (a connection whose peer closed).

use std::cell::{Cell, RefCell};
use std::collections::HashMap;
use std::convert::Infallible;
use std::future::Future;
use std::io;
use std::net::SocketAddr;
use std::os::fd::{AsRawFd, RawFd};
use std::rc::Rc;
use std::task::{Context, Poll};

use nix::sys::socket::recvfrom;
use socket2::Socket;

use crate::error::ServerError;
use crate::io::{Selector, SysSelector};
use crate::net;
use crate::sink::Sink;
use crate::task::{noop_waker, Readiness, Task};

/// One bounded read per readiness signal.
const RECV_BUF_LEN: usize = 4096;

/// Shared dispatcher state, reachable both from the event loop and from the
/// tasks it resumes. All access is from the single dispatch thread, so plain
/// interior mutability is enough.
pub(crate) struct Core {
    selector: RefCell<SysSelector>,
    /// Descriptor -> the task parked on it. At most one entry per key: a
    /// task only re-parks after the loop has removed its previous entry.
    parked: RefCell<HashMap<RawFd, Task>>,
    /// Set by [`Readiness`] while a task is being polled; consumed by
    /// [`Core::resume`] right after that poll returns `Pending`.
    suspended_on: Cell<Option<RawFd>>,
    sink: RefCell<Box<dyn Sink>>,
}

impl Core {
    /// Records which descriptor the currently-running task is parking on.
    pub(crate) fn note_suspension(&self, fd: RawFd) {
        self.suspended_on.set(Some(fd));
    }

    /// Starts a task: polls it immediately until it first parks or completes,
    /// then returns to the caller. Never blocks.
    fn spawn(&self, future: impl Future<Output = ()> + 'static) {
        self.resume(Box::pin(future));
    }

    /// Runs `task` until it parks on a descriptor or completes. A completed
    /// task is dropped silently; a parked task moves into the table under
    /// the descriptor it suspended on.
    fn resume(&self, mut task: Task) {
        let waker = noop_waker();
        let mut cx = Context::from_waker(&waker);

        match task.as_mut().poll(&mut cx) {
            Poll::Ready(()) => {}
            Poll::Pending => {
                let fd = self
                    .suspended_on
                    .take()
                    .expect("task suspended outside of a readiness await");
                let prev = self.parked.borrow_mut().insert(fd, task);
                debug_assert!(prev.is_none(), "two tasks parked on descriptor {fd}");
            }
        }
    }
}

/// A single-threaded TCP server delivering each connection's accumulated
/// bytes to a [`Sink`] on peer close.
pub struct Server {
    listener: Socket,
    core: Rc<Core>,
}

impl Server {
    /// Opens the listening socket on `port` and creates the readiness
    /// selector. Any failure here is fatal to startup.
    pub fn bind(port: u16, sink: Box<dyn Sink>) -> Result<Self, ServerError> {
        let listener =
            net::open_listener(port).map_err(|source| ServerError::Listen { port, source })?;
        let selector =
            SysSelector::new(net::BACKLOG as usize).map_err(ServerError::PollerCreate)?;

        Ok(Server {
            listener,
            core: Rc::new(Core {
                selector: RefCell::new(selector),
                parked: RefCell::new(HashMap::new()),
                suspended_on: Cell::new(None),
                sink: RefCell::new(sink),
            }),
        })
    }

    /// The address the listener is bound to. Mostly useful when binding
    /// port 0 and letting the OS pick.
    pub fn local_addr(&self) -> io::Result<SocketAddr> {
        self.listener.local_addr()?.as_socket().ok_or_else(|| {
            io::Error::new(io::ErrorKind::Other, "listener has no inet address")
        })
    }

    /// Serves forever: spawns the accept task and runs the event loop with an
    /// indefinite wait. Returns only on a fatal dispatch error.
    pub fn serve(mut self) -> Result<Infallible, ServerError> {
        match self.local_addr() {
            Ok(addr) => tracing::info!(%addr, "serving"),
            Err(_) => tracing::info!("serving"),
        }

        self.start();
        loop {
            self.turn(-1).map_err(ServerError::Wait)?;
        }
    }

    /// Spawns the accept task. It runs until its first suspension before this
    /// returns, so the listener is registered with the selector from here on.
    fn start(&mut self) {
        let listener = self.listener.as_raw_fd();
        self.core.spawn(accept_connections(self.core.clone(), listener));
    }

    /// One event-loop iteration: wait once, then resume the parked task of
    /// every descriptor the selector reported, in the order reported.
    /// Returns the number of readiness events handled.
    fn turn(&mut self, timeout_ms: i32) -> io::Result<usize> {
        let ready = self.core.selector.borrow_mut().wait(timeout_ms)?;

        for index in 0..ready {
            let fd = self.core.selector.borrow().ready_at(index);
            // Removing the entry before resuming keeps at most one parked
            // task per descriptor even though the resumed task may
            // immediately re-park on the same key.
            let woken = self.core.parked.borrow_mut().remove(&fd);
            match woken {
                Some(task) => self.core.resume(task),
                None => tracing::warn!(fd, "readiness for a descriptor with no parked task"),
            }
        }

        Ok(ready)
    }
}

/// Accepts clients forever. One accept per readiness signal; a failed accept
/// is logged and the task simply waits for the next signal.
async fn accept_connections(core: Rc<Core>, listener: RawFd) {
    core.selector
        .borrow_mut()
        .register(listener)
        .expect("failed to register listener for readiness");

    loop {
        Readiness::new(core.clone(), listener).await;

        match net::accept_connection(listener) {
            Ok(client) => {
                tracing::debug!(client, "accepted connection");
                core.spawn(collect_from(core.clone(), client));
            }
            Err(errno) => tracing::warn!(%errno, "failed to accept client"),
        }
    }
}

/// Reads from one connection until its peer closes, accumulating everything
/// received, then closes the descriptor and delivers the bytes to the sink.
/// A failed read is logged and the same descriptor is awaited again.
async fn collect_from(core: Rc<Core>, client: RawFd) {
    core.selector
        .borrow_mut()
        .register(client)
        .expect("failed to register client for readiness");

    let mut gathered: Vec<u8> = Vec::new();
    let mut chunk = [0u8; RECV_BUF_LEN];

    loop {
        Readiness::new(core.clone(), client).await;

        match recvfrom::<()>(client, &mut chunk) {
            Ok((0, _)) => break,
            Ok((received, _)) => gathered.extend_from_slice(&chunk[..received]),
            Err(errno) => tracing::warn!(client, %errno, "failed to read from client"),
        }
    }

    // Drop selector interest before the close so a new socket reusing this
    // descriptor value cannot inherit it.
    if let Err(err) = core.selector.borrow_mut().deregister(client) {
        tracing::debug!(client, %err, "failed to deregister closed client");
    }
    net::close_connection(client);

    tracing::debug!(client, bytes = gathered.len(), "peer closed");
    core.sink.borrow_mut().deliver(client, &gathered);
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use std::net::{Ipv4Addr, TcpStream};
    use std::os::unix::net::UnixStream;
    use std::thread;
    use std::time::Duration;

    type Deliveries = Rc<RefCell<Vec<(RawFd, Vec<u8>)>>>;

    struct RecordingSink(Deliveries);

    impl Sink for RecordingSink {
        fn deliver(&mut self, fd: RawFd, payload: &[u8]) {
            self.0.borrow_mut().push((fd, payload.to_vec()));
        }
    }

    fn test_server() -> (Server, Deliveries) {
        let log: Deliveries = Rc::new(RefCell::new(Vec::new()));
        let server = Server::bind(0, Box::new(RecordingSink(log.clone()))).expect("bind");
        (server, log)
    }

    /// The listener binds 0.0.0.0; clients dial loopback on the same port.
    fn loopback_addr(server: &Server) -> SocketAddr {
        let port = server.local_addr().unwrap().port();
        SocketAddr::from((Ipv4Addr::LOCALHOST, port))
    }

    fn drive_until(server: &mut Server, log: &Deliveries, deliveries: usize) {
        for _ in 0..500 {
            server.turn(10).expect("turn");
            if log.borrow().len() >= deliveries {
                return;
            }
        }
        panic!("sink never saw {deliveries} deliveries");
    }

    #[test]
    fn delivers_accumulated_bytes_once_on_peer_close() {
        let (mut server, log) = test_server();
        server.start();
        let addr = loopback_addr(&server);

        let client = thread::spawn(move || {
            let mut stream = TcpStream::connect(addr).unwrap();
            stream.write_all(b"hello").unwrap();
            thread::sleep(Duration::from_millis(30));
            stream.write_all(b" world").unwrap();
        });

        drive_until(&mut server, &log, 1);
        client.join().unwrap();

        // No further events for the closed connection.
        for _ in 0..5 {
            server.turn(10).unwrap();
        }

        let log = log.borrow();
        assert_eq!(log.len(), 1);
        assert_eq!(log[0].1, b"hello world");
    }

    #[test]
    fn chunk_boundaries_do_not_change_the_payload() {
        let (mut server, log) = test_server();
        server.start();
        let addr = loopback_addr(&server);

        let client = thread::spawn(move || {
            let mut stream = TcpStream::connect(addr).unwrap();
            for piece in [&b"ab"[..], b"cd", b"ef"] {
                stream.write_all(piece).unwrap();
                thread::sleep(Duration::from_millis(20));
            }
        });

        drive_until(&mut server, &log, 1);
        client.join().unwrap();

        assert_eq!(log.borrow()[0].1, b"abcdef");
    }

    #[test]
    fn connections_accumulate_independently() {
        let (mut server, log) = test_server();
        server.start();
        let addr = loopback_addr(&server);

        let client = thread::spawn(move || {
            let mut first = TcpStream::connect(addr).unwrap();
            let mut second = TcpStream::connect(addr).unwrap();
            first.write_all(b"first").unwrap();
            second.write_all(b"second").unwrap();
            thread::sleep(Duration::from_millis(30));
            // Closing one connection must not disturb the other.
            drop(first);
            thread::sleep(Duration::from_millis(30));
            second.write_all(b" again").unwrap();
        });

        drive_until(&mut server, &log, 2);
        client.join().unwrap();

        let log = log.borrow();
        let mut payloads: Vec<&[u8]> = log.iter().map(|(_, p)| p.as_slice()).collect();
        payloads.sort();
        assert_eq!(payloads, [&b"first"[..], b"second again"]);
    }

    #[test]
    fn at_most_one_parked_task_per_descriptor() {
        let (mut server, log) = test_server();
        server.start();
        let listener = server.listener.as_raw_fd();

        // The accept task is parked on the listener and nothing else.
        assert_eq!(server.core.parked.borrow().len(), 1);
        assert!(server.core.parked.borrow().contains_key(&listener));

        let addr = loopback_addr(&server);
        let mut stream = TcpStream::connect(addr).unwrap();
        for _ in 0..50 {
            server.turn(10).unwrap();
            if server.core.parked.borrow().len() == 2 {
                break;
            }
        }

        // Accept task re-parked on the listener, receive task parked on the
        // client; one entry per descriptor.
        assert_eq!(server.core.parked.borrow().len(), 2);

        stream.write_all(b"bye").unwrap();
        drop(stream);
        drive_until(&mut server, &log, 1);

        // The finished connection left no entry behind.
        assert_eq!(server.core.parked.borrow().len(), 1);
        assert!(server.core.parked.borrow().contains_key(&listener));
    }

    #[test]
    fn accept_failure_leaves_the_accept_task_running() {
        let (mut server, log) = test_server();
        server.start();
        let listener = server.listener.as_raw_fd();

        // Resume the accept task with no pending connection: the accept
        // fails with EAGAIN, is logged, and the task parks again.
        let task = server.core.parked.borrow_mut().remove(&listener).unwrap();
        server.core.resume(task);
        assert!(server.core.parked.borrow().contains_key(&listener));

        // A later client is still accepted and served.
        let addr = loopback_addr(&server);
        let mut stream = TcpStream::connect(addr).unwrap();
        stream.write_all(b"ok").unwrap();
        drop(stream);

        drive_until(&mut server, &log, 1);
        assert_eq!(log.borrow()[0].1, b"ok");
    }

    #[test]
    fn readiness_without_a_parked_task_is_skipped() {
        let (mut server, _log) = test_server();
        let (mut left, right) = UnixStream::pair().unwrap();

        // Registered with the selector but owned by no task.
        server
            .core
            .selector
            .borrow_mut()
            .register(right.as_raw_fd())
            .unwrap();
        left.write_all(b"x").unwrap();

        let handled = server.turn(100).unwrap();
        assert!(handled >= 1);
        assert!(server.core.parked.borrow().is_empty());
    }
}
