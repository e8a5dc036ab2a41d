//! Where accumulated connection bytes end up.

use std::os::fd::RawFd;

/// Receives everything a connection's peer sent, exactly once, when the peer
/// closes. Injectable so the server can be exercised without capturing
/// process output.
pub trait Sink {
    fn deliver(&mut self, fd: RawFd, payload: &[u8]);
}

/// Prints each payload tagged with the originating descriptor, e.g.
/// `[7]: hello world`. Non-UTF-8 bytes are rendered lossily.
pub struct StdoutSink;

impl Sink for StdoutSink {
    fn deliver(&mut self, fd: RawFd, payload: &[u8]) {
        println!("[{}]: {}", fd, String::from_utf8_lossy(payload));
    }
}
