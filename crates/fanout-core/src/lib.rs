//! Core of a multi-client fan-out sink: one bounded buffer queue feeding an
//! arbitrary, dynamically-changing set of client descriptors, each at its
//! own pace, under a single non-blocking I/O thread.
//!
//! The crate never opens, connects, or closes a descriptor itself —
//! ownership is handed in by the caller via [`Sink::add`] /
//! [`Sink::add_full`] and handed back out via a [`SinkObserver`]
//! notification once the core no longer references it.

mod buffer;
mod caps;
mod client;
mod config;
mod error;
mod io_loop;
mod observer;
mod queue;
mod rawio;
mod recover_policy;
mod sink;
mod sync_policy;
mod table;
mod time;

pub use buffer::Buffer;
pub use client::{ClientStatus, RecoverPolicy, StatsSnapshot, SyncMethod};
pub use config::SinkConfig;
pub use error::SinkError;
pub use observer::{NullObserver, SinkObserver};
pub use queue::{Limit, Unit};
pub use sink::Sink;
pub use time::Nanos;
