//! The bridge between a suspension point and a descriptor.

use std::future::Future;
use std::os::fd::RawFd;
use std::pin::Pin;
use std::rc::Rc;
use std::task::{Context, Poll};

use crate::server::Core;

/// Awaiting this parks the current task until `fd` is next reported
/// read-ready.
///
/// The first poll records `fd` in the dispatcher's suspension slot and
/// returns `Pending` unconditionally, even if the socket happens to be
/// readable right now: the task always goes through the table and the next
/// loop iteration. Resumption carries no payload; the awoken task re-reads
/// the socket itself.
pub(crate) struct Readiness {
    core: Rc<Core>,
    fd: RawFd,
    parked: bool,
}

impl Readiness {
    pub(crate) fn new(core: Rc<Core>, fd: RawFd) -> Self {
        Readiness {
            core,
            fd,
            parked: false,
        }
    }
}

impl Future for Readiness {
    type Output = ();

    fn poll(self: Pin<&mut Self>, _cx: &mut Context<'_>) -> Poll<()> {
        let this = self.get_mut();
        if this.parked {
            return Poll::Ready(());
        }

        this.parked = true;
        this.core.note_suspension(this.fd);
        Poll::Pending
    }
}
