use thiserror::Error;

/// Errors surfaced by [`crate::BufferedEvent`] and its transports.
///
/// Retriable I/O (`EAGAIN`/`EWOULDBLOCK`/`EINTR`) never reaches this type:
/// it is swallowed inside the transport and simply produces
/// [`crate::transport::IoOutcome::WouldBlock`].
#[derive(Error, Debug)]
pub enum BufferedEventError {
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
    #[error(transparent)]
    Buffer(#[from] chain_buffer::ChainBufferError),
    #[error("filter rejected the data it was given")]
    FilterRejected,
    #[error("reactor registration failed: {0}")]
    Reactor(std::io::Error),
}
