//! This module contains the suspendable unit of work the dispatcher runs.
//!
//! A task is a fire-and-forget computation with no result: it is polled
//! immediately when spawned, runs to its first suspension point, and from
//! then on lives in the dispatcher's parked-task table until the descriptor
//! it awaits becomes ready. A panic escaping a task body is fatal to the
//! process; there is no per-task error channel.

mod readiness;

pub(crate) use readiness::Readiness;

use std::future::Future;
use std::pin::Pin;
use std::ptr;
use std::task::{RawWaker, RawWakerVTable, Waker};

/// The dispatcher works only with this type of suspended computation.
pub(crate) type Task = Pin<Box<dyn Future<Output = ()>>>;

const NOOP_VTABLE: RawWakerVTable = RawWakerVTable::new(
    |_| RawWaker::new(ptr::null(), &NOOP_VTABLE),
    |_| {},
    |_| {},
    |_| {},
);

/// Wakeups are driven by readiness alone, so the waker a task is polled with
/// never has to do anything.
pub(crate) fn noop_waker() -> Waker {
    unsafe { Waker::from_raw(RawWaker::new(ptr::null(), &NOOP_VTABLE)) }
}
