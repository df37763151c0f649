//! Segmented, variable-length byte queue optimized for socket I/O.
//!
//! A [`ChainBuffer`] is a list of [`chain::Chain`] regions rather than one
//! flat allocation: appends and prepends amortize by growing or splicing
//! chains instead of memmove-ing the whole buffer, `drain` frees whole
//! chains for free, and `add_buffer`/`remove_to` can transfer ownership of
//! entire chains between two buffers in O(1).

mod assert_macros;
mod buffer;
mod callback;
mod chain;
mod error;
mod eol;

pub use buffer::{ChainBuffer, ChainBufferOptions, Line};
pub use callback::{CallbackId, PendingRemovals};
pub use error::ChainBufferError;
pub use eol::EolStyle;

/// Floor on a chain's total byte capacity, including a freshly split
/// chain. Mirrors libevent's `MIN_BUFFER_SIZE`.
pub const MIN_CHAIN_SIZE: usize = 256;

/// Cap on how far a single append is allowed to grow the next chain by
/// doubling. Mirrors libevent's `EVBUFFER_CHAIN_MAX_AUTO_SIZE`.
pub const MAX_AUTO_GROWTH: usize = 4096;

/// Default read quantum used when a caller has no better estimate of how
/// much unread data is available. Mirrors libevent's `EVBUFFER_MAX_READ`.
pub const DEFAULT_READ_QUANTUM: usize = 4096;

/// Chains offered by `gather` I/O preparation in a single call, matching
/// `IOV_MAX`-style caps used by real `writev` callers.
pub const MAX_GATHER_CHAINS: usize = 16;
