//! Shared fake [`crate::transport::Transport`] for unit tests, so
//! watermark/callback/filter logic can be exercised deterministically
//! without a real socket.

use std::collections::VecDeque;

use chain_buffer::ChainBuffer;

use crate::error::BufferedEventError;
use crate::flags::{EventFlags, FlushMode};
use crate::transport::{FlushOutcome, IoOutcome, Transport};

/// An in-memory peer: bytes queued in `inbound` are handed out by
/// `do_read` (optionally in short reads, via `read_chunk`); bytes
/// accepted by `do_write` accumulate in `sent`.
pub(crate) struct InMemoryTransport {
    pub(crate) inbound: VecDeque<u8>,
    pub(crate) sent: Vec<u8>,
    pub(crate) read_chunk: usize,
    pub(crate) enabled: EventFlags,
    /// Once `inbound` is drained, report [`IoOutcome::Eof`] instead of
    /// [`IoOutcome::WouldBlock`] — simulates a peer that has hung up.
    pub(crate) eof: bool,
    /// Simulates a fatal I/O error on the next `do_read`/`do_write` call.
    pub(crate) fail_io: bool,
}

impl InMemoryTransport {
    pub(crate) fn new() -> Self {
        InMemoryTransport {
            inbound: VecDeque::new(),
            sent: Vec::new(),
            read_chunk: usize::MAX,
            enabled: EventFlags::empty(),
            eof: false,
            fail_io: false,
        }
    }

    pub(crate) fn push_inbound(&mut self, bytes: &[u8]) {
        self.inbound.extend(bytes.iter().copied());
    }
}

impl Transport for InMemoryTransport {
    fn enable(&mut self, flags: EventFlags) -> Result<(), BufferedEventError> {
        self.enabled |= flags;
        Ok(())
    }

    fn disable(&mut self, flags: EventFlags) -> Result<(), BufferedEventError> {
        self.enabled &= !flags;
        Ok(())
    }

    fn do_read(&mut self, input: &mut ChainBuffer, max: usize) -> Result<IoOutcome, BufferedEventError> {
        if self.fail_io {
            return Err(BufferedEventError::Io(std::io::Error::other("simulated read failure")));
        }
        if self.inbound.is_empty() {
            return Ok(if self.eof { IoOutcome::Eof } else { IoOutcome::WouldBlock });
        }
        let take = max.min(self.read_chunk).min(self.inbound.len());
        let bytes: Vec<u8> = self.inbound.drain(..take).collect();
        input.append(&bytes)?;
        Ok(IoOutcome::Progress(bytes.len()))
    }

    fn do_write(&mut self, output: &mut ChainBuffer) -> Result<IoOutcome, BufferedEventError> {
        if self.fail_io {
            return Err(BufferedEventError::Io(std::io::Error::other("simulated write failure")));
        }
        if output.is_empty() {
            return Ok(IoOutcome::Progress(0));
        }
        let mut buf = vec![0_u8; output.len()];
        let n = output.remove(&mut buf);
        self.sent.extend_from_slice(&buf[..n]);
        Ok(IoOutcome::Progress(n))
    }

    fn flush(
        &mut self,
        _iotype: EventFlags,
        _mode: FlushMode,
        _input: &mut ChainBuffer,
        output: &mut ChainBuffer,
    ) -> Result<FlushOutcome, BufferedEventError> {
        let mut moved = 0;
        while !output.is_empty() {
            match self.do_write(output)? {
                IoOutcome::Progress(n) => moved += n,
                _ => break,
            }
        }
        Ok(FlushOutcome { moved, eof: false })
    }
}
