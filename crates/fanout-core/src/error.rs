//! Fatal, system-wide errors. Per-client failures are modeled as
//! `ClientStatus`, never as `Result` propagation.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum SinkError {
    #[error("poll wait failed: {0}")]
    Poll(#[source] std::io::Error),

    #[error("failed to register waker with the poll set: {0}")]
    Waker(#[source] std::io::Error),

    #[error("i/o worker thread panicked or could not be spawned: {0}")]
    Worker(String),
}
