//! Fatal startup and dispatch errors. Recoverable per-connection conditions
//! (a failed accept, a failed read) never appear here: they are logged inside
//! the task that hit them and the task keeps waiting.

use std::io;
use thiserror::Error;

/// Unrecoverable failures. Any of these aborts the process.
#[derive(Debug, Error)]
pub enum ServerError {
    /// The readiness poller context could not be created.
    #[error("failed to create readiness poller: {0}")]
    PollerCreate(#[source] io::Error),

    /// The listening socket could not be opened, bound or put into listen mode.
    #[error("failed to listen on port {port}: {source}")]
    Listen {
        port: u16,
        #[source]
        source: io::Error,
    },

    /// Waiting on the readiness poller failed with something other than an
    /// interrupted call.
    #[error("readiness wait failed: {0}")]
    Wait(#[source] io::Error),
}
