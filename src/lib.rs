//! A single-threaded TCP server that multiplexes many connections through one
//! readiness poller. Each connection is a suspendable task that parks on its
//! socket's read-readiness; the event loop resumes exactly one task per ready
//! descriptor. Whatever a peer sent is accumulated and handed to a [`Sink`]
//! when the peer closes.

pub mod error;
pub mod io;
pub mod net;
pub mod server;
pub mod sink;
pub(crate) mod task;

pub use error::ServerError;
pub use server::Server;
pub use sink::{Sink, StdoutSink};
