//! Transport vtable: the pluggable "how do bytes actually move" half of a
//! [`crate::BufferedEvent`]. Mirrors libevent's `bufferevent_ops` plus the
//! socket-specific `bufferevent_readcb`/`writecb` glue, which in the
//! original is not part of the vtable but is specific to each transport
//! kind all the same.

pub mod filter;
pub mod socket;

use chain_buffer::ChainBuffer;

use crate::error::BufferedEventError;
use crate::flags::{EventFlags, FlushMode};

/// Result of a single non-blocking read or write attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IoOutcome {
    /// `n` bytes were moved; `n` may be 0 for a transport (like a filter)
    /// that made progress internally without moving new bytes in/out.
    Progress(usize),
    /// The operation would have blocked; try again once the reactor says
    /// so.
    WouldBlock,
    /// The peer (or, for a filter, the underlying stream) is done.
    Eof,
}

/// Summary of a [`Transport::flush`] call: how many bytes moved across the
/// requested direction(s), and whether the source was found exhausted
/// (EOF) along the way.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FlushOutcome {
    pub moved: usize,
    pub eof: bool,
}

/// Everything a [`crate::BufferedEvent`] needs from its concrete transport.
pub trait Transport {
    /// Arm or disarm reactor interest for the given directions.
    fn enable(&mut self, flags: EventFlags) -> Result<(), BufferedEventError>;
    fn disable(&mut self, flags: EventFlags) -> Result<(), BufferedEventError>;

    /// Attempt to read roughly `max` bytes into `input`. `max` already
    /// accounts for the read high watermark; a transport should size its
    /// read request to it, but (mirroring `evbuffer_read`'s own behavior)
    /// a single syscall may return somewhat more if the destination chain
    /// already had extra trailing space to spare.
    fn do_read(&mut self, input: &mut ChainBuffer, max: usize) -> Result<IoOutcome, BufferedEventError>;

    /// Attempt to drain and send bytes from `output`. Bytes actually
    /// accepted are drained from `output` by the transport itself, the
    /// same way `evbuffer_write` both writes and drains.
    fn do_write(&mut self, output: &mut ChainBuffer) -> Result<IoOutcome, BufferedEventError>;

    /// Push buffered data through regardless of the enabled/watermark
    /// state.
    fn flush(
        &mut self,
        iotype: EventFlags,
        mode: FlushMode,
        input: &mut ChainBuffer,
        output: &mut ChainBuffer,
    ) -> Result<FlushOutcome, BufferedEventError>;
}
