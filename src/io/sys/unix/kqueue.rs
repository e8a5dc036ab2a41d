//! BSD/macOS readiness backend built on kqueue.

use std::io;
use std::os::fd::{AsRawFd, FromRawFd, OwnedFd, RawFd};
use std::ptr;

use libc::{EV_ADD, EV_DELETE, EV_ENABLE, EVFILT_READ};

use crate::io::selector::Selector;

fn empty_event() -> libc::kevent {
    libc::kevent {
        ident: 0,
        filter: 0,
        flags: 0,
        fflags: 0,
        data: 0,
        udata: ptr::null_mut(),
    }
}

pub(crate) struct KqueuedSelector {
    kq: OwnedFd,
    events: Vec<libc::kevent>,
    ready: usize,
}

impl KqueuedSelector {
    /// Creates a kqueue able to report up to `capacity` events per wait call.
    pub(crate) fn new(capacity: usize) -> io::Result<Self> {
        let kq = unsafe { libc::kqueue() };
        if kq < 0 {
            return Err(io::Error::last_os_error());
        }

        Ok(KqueuedSelector {
            kq: unsafe { OwnedFd::from_raw_fd(kq) },
            events: vec![empty_event(); capacity],
            ready: 0,
        })
    }

    fn change(&self, fd: RawFd, flags: u16) -> io::Result<()> {
        let mut change = empty_event();
        change.ident = fd as _;
        change.filter = EVFILT_READ;
        change.flags = flags;

        let res = unsafe {
            libc::kevent(
                self.kq.as_raw_fd(),
                &change,
                1,
                ptr::null_mut(),
                0,
                ptr::null(),
            )
        };
        if res < 0 {
            return Err(io::Error::last_os_error());
        }
        Ok(())
    }
}

impl Selector for KqueuedSelector {
    fn register(&mut self, fd: RawFd) -> io::Result<()> {
        self.change(fd, EV_ADD | EV_ENABLE)
    }

    fn deregister(&mut self, fd: RawFd) -> io::Result<()> {
        self.change(fd, EV_DELETE)
    }

    fn wait(&mut self, timeout_ms: i32) -> io::Result<usize> {
        let timeout = libc::timespec {
            tv_sec: (timeout_ms / 1000) as _,
            tv_nsec: ((timeout_ms % 1000) * 1_000_000) as _,
        };
        let timeout_ptr = if timeout_ms < 0 {
            ptr::null()
        } else {
            &timeout as *const libc::timespec
        };

        self.ready = 0;
        let res = unsafe {
            libc::kevent(
                self.kq.as_raw_fd(),
                ptr::null(),
                0,
                self.events.as_mut_ptr(),
                self.events.len() as i32,
                timeout_ptr,
            )
        };
        if res < 0 {
            let err = io::Error::last_os_error();
            // Level-triggered interest loses nothing across an interrupted
            // wait; the next call reports the same descriptors again.
            if err.kind() == io::ErrorKind::Interrupted {
                return Ok(0);
            }
            return Err(err);
        }

        self.ready = res as usize;
        Ok(self.ready)
    }

    fn ready_at(&self, index: usize) -> RawFd {
        debug_assert!(index < self.ready);
        self.events[index].ident as RawFd
    }
}
