//! End-to-end: a real client over TCP, with deliveries observed through an
//! injected channel-backed sink.

use std::io::Write;
use std::net::{Ipv4Addr, SocketAddr, TcpStream};
use std::os::fd::RawFd;
use std::sync::mpsc;
use std::thread;
use std::time::Duration;

use collector::{Server, Sink};

struct ChannelSink(mpsc::Sender<(RawFd, Vec<u8>)>);

impl Sink for ChannelSink {
    fn deliver(&mut self, fd: RawFd, payload: &[u8]) {
        let _ = self.0.send((fd, payload.to_vec()));
    }
}

#[test]
fn collects_stream_contents_over_tcp() {
    let (addr_tx, addr_rx) = mpsc::channel();
    let (sink_tx, sink_rx) = mpsc::channel();

    thread::spawn(move || {
        let server = Server::bind(0, Box::new(ChannelSink(sink_tx))).expect("bind");
        addr_tx.send(server.local_addr().expect("local addr")).unwrap();
        let _ = server.serve();
    });

    let port = addr_rx.recv().expect("server address").port();
    let addr = SocketAddr::from((Ipv4Addr::LOCALHOST, port));
    let mut client = TcpStream::connect(addr).expect("connect");
    client.write_all(b"hello").unwrap();
    client.write_all(b" world").unwrap();
    drop(client);

    let (_fd, payload) = sink_rx
        .recv_timeout(Duration::from_secs(5))
        .expect("delivery on peer close");
    assert_eq!(payload, b"hello world");
}

#[test]
fn serves_a_second_client_after_the_first_closes() {
    let (addr_tx, addr_rx) = mpsc::channel();
    let (sink_tx, sink_rx) = mpsc::channel();

    thread::spawn(move || {
        let server = Server::bind(0, Box::new(ChannelSink(sink_tx))).expect("bind");
        addr_tx.send(server.local_addr().expect("local addr")).unwrap();
        let _ = server.serve();
    });

    let port = addr_rx.recv().expect("server address").port();
    let addr = SocketAddr::from((Ipv4Addr::LOCALHOST, port));
    for expected in [&b"first"[..], b"second"] {
        let mut client = TcpStream::connect(addr).expect("connect");
        client.write_all(expected).unwrap();
        drop(client);

        let (_fd, payload) = sink_rx
            .recv_timeout(Duration::from_secs(5))
            .expect("delivery on peer close");
        assert_eq!(payload, expected);
    }
}
