//! This module contains a description of [`Selector`].
//!
//! A selector wraps a system readiness facility like epoll or kqueue behind
//! one interface: register a descriptor for read-readiness, block until at
//! least one registered descriptor is ready, and enumerate the descriptors
//! that the last wait reported.

use std::io;
use std::os::fd::RawFd;

/// A level-triggered readiness poller over raw descriptors.
///
/// Interest is read-only: a registered descriptor is reported by every
/// [`wait`](Selector::wait) call while unread data (or a pending connection,
/// for a listener) remains.
pub trait Selector {
    /// Adds `fd` to the monitored set with read interest.
    fn register(&mut self, fd: RawFd) -> io::Result<()>;

    /// Removes `fd` from the monitored set. Must be called before the
    /// descriptor is closed, so a later socket reusing the same value cannot
    /// inherit stale interest.
    fn deregister(&mut self, fd: RawFd) -> io::Result<()>;

    /// Blocks until at least one registered descriptor is read-ready or
    /// `timeout_ms` elapses; a negative timeout blocks indefinitely. Returns
    /// the number of ready descriptors for this call. An interrupted wait
    /// reports zero ready descriptors.
    fn wait(&mut self, timeout_ms: i32) -> io::Result<usize>;

    /// Returns the descriptor behind event `index` of the last
    /// [`wait`](Selector::wait). The order is whatever the facility reported;
    /// positions carry no priority meaning.
    fn ready_at(&self, index: usize) -> RawFd;
}
