//! The host-supplied notification seam, standing in for the out-of-scope
//! "signal/event mechanism".

use std::os::unix::io::RawFd;

use crate::client::ClientStatus;
use crate::error::SinkError;

/// Notifications the core emits to its embedding host. All three client
/// callbacks may be invoked from either the producer thread (`client_added`,
/// during `add`) or the I/O worker thread (`client_removed`,
/// `client_fd_removed`, during removal) — implementations must be `Send +
/// Sync` and thread-aware.
pub trait SinkObserver: Send + Sync {
    /// Emitted from the calling thread of `add`/`add_full`, after the
    /// descriptor is registered.
    fn client_added(&self, _fd: RawFd) {}

    /// Emitted with the core still owning `fd`; handlers may call
    /// `get_stats` but must not close `fd`.
    fn client_removed(&self, _fd: RawFd, _status: ClientStatus) {}

    /// Emitted once the core no longer references `fd`; handlers may close
    /// or reuse it.
    fn client_fd_removed(&self, _fd: RawFd) {}

    /// Emitted when the I/O loop hits an unrecoverable error and is about to
    /// exit.
    fn fatal_error(&self, _err: &SinkError) {}
}

/// Default no-op implementation for hosts uninterested in events.
#[derive(Debug, Default, Clone, Copy)]
pub struct NullObserver;

impl SinkObserver for NullObserver {}
