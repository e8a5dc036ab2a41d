//! Linux readiness backend built on epoll.

use std::io;
use std::os::fd::{BorrowedFd, RawFd};

use nix::errno::Errno;
use nix::sys::epoll::{Epoll, EpollCreateFlags, EpollEvent, EpollFlags, EpollTimeout};

use crate::io::selector::Selector;

pub(crate) struct EpolledSelector {
    epoll: Epoll,
    events: Vec<EpollEvent>,
    ready: usize,
}

impl EpolledSelector {
    /// Creates an epoll context able to report up to `capacity` events per
    /// wait call.
    pub(crate) fn new(capacity: usize) -> io::Result<Self> {
        let epoll = Epoll::new(EpollCreateFlags::empty())?;

        Ok(EpolledSelector {
            epoll,
            events: vec![EpollEvent::empty(); capacity],
            ready: 0,
        })
    }
}

impl Selector for EpolledSelector {
    fn register(&mut self, fd: RawFd) -> io::Result<()> {
        let event = EpollEvent::new(EpollFlags::EPOLLIN, fd as u64);
        self.epoll
            .add(unsafe { BorrowedFd::borrow_raw(fd) }, event)?;
        Ok(())
    }

    fn deregister(&mut self, fd: RawFd) -> io::Result<()> {
        self.epoll.delete(unsafe { BorrowedFd::borrow_raw(fd) })?;
        Ok(())
    }

    fn wait(&mut self, timeout_ms: i32) -> io::Result<usize> {
        let timeout = if timeout_ms < 0 {
            EpollTimeout::NONE
        } else {
            EpollTimeout::try_from(timeout_ms).expect("poll timeout out of range")
        };

        self.ready = 0;
        match self.epoll.wait(&mut self.events, timeout) {
            Ok(ready) => {
                self.ready = ready;
                Ok(ready)
            }
            // Level-triggered interest loses nothing across an interrupted
            // wait; the next call reports the same descriptors again.
            Err(Errno::EINTR) => Ok(0),
            Err(errno) => Err(io::Error::from(errno)),
        }
    }

    fn ready_at(&self, index: usize) -> RawFd {
        debug_assert!(index < self.ready);
        self.events[index].data() as RawFd
    }
}
