use thiserror::Error;

/// Errors produced by [`crate::ChainBuffer`] operations.
///
/// Every variant here corresponds to an operation that leaves the buffer
/// completely unmodified: callers can retry, fall back, or propagate without
/// worrying about partial mutation.
#[derive(Error, Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChainBufferError {
    #[error("allocation failed while growing the buffer")]
    OutOfMemory,
    #[error("no line terminator present in the buffered data")]
    NoTerminator,
    #[error("requested {requested} bytes but only {available} are buffered")]
    NotEnoughData { requested: usize, available: usize },
    #[error("commit of {commit} bytes exceeds the {reserved}-byte reservation")]
    ReservationExceeded { reserved: usize, commit: usize },
}
