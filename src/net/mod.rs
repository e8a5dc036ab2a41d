//! This module contains functions for working with the listening socket and
//! accepted connections.

use std::io;
use std::net::{Ipv4Addr, SocketAddr};
use std::os::fd::RawFd;

use nix::sys::socket::{accept4, SockFlag};
use socket2::{Domain, Protocol, Socket, Type};

/// OS queue depth for fully-established connections awaiting accept.
pub(crate) const BACKLOG: i32 = 2048;

/// Creates a stream socket bound to `port` on all local addresses and puts it
/// into listen mode. The socket is non-blocking so the event loop can accept
/// purely in response to readiness signals.
pub(crate) fn open_listener(port: u16) -> io::Result<Socket> {
    let socket = Socket::new(Domain::IPV4, Type::STREAM, Some(Protocol::TCP))?;
    socket.set_reuse_address(true)?;

    let addr = SocketAddr::from((Ipv4Addr::UNSPECIFIED, port));
    socket.bind(&addr.into())?;
    socket.listen(BACKLOG)?;
    socket.set_nonblocking(true)?;

    Ok(socket)
}

/// Accepts one pending connection. The accepted descriptor is non-blocking,
/// so a read on it can never stall the loop even on a spurious wakeup.
pub(crate) fn accept_connection(listener: RawFd) -> nix::Result<RawFd> {
    accept4(listener, SockFlag::SOCK_NONBLOCK | SockFlag::SOCK_CLOEXEC)
}

/// Closes an accepted connection, logging instead of failing: by the time a
/// connection is closed its task has already finished with it.
pub(crate) fn close_connection(fd: RawFd) {
    if let Err(errno) = nix::unistd::close(fd) {
        tracing::warn!(fd, %errno, "failed to close connection");
    }
}
