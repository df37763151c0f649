//! Filter transport: runs input/output through a pair of transform
//! functions before handing bytes to (or taking them from) an underlying
//! transport. Grounded on `examples/original_source/libevent/bufferevent_filter.c`'s
//! `be_filter_process_input`/`process_output` pump loops.

use chain_buffer::ChainBuffer;

use super::{FlushOutcome, IoOutcome, Transport};
use crate::error::BufferedEventError;
use crate::event::BufferedEvent;
use crate::flags::{EventFlags, FlushMode};

/// Outcome of a single filter invocation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FilterResult {
    /// Consumed what it needed and produced output; keep pumping.
    Ok,
    /// Needs more input than is currently available; stop until more
    /// arrives.
    NeedMore,
    /// The data is malformed; the bufferevent should report an error.
    Error,
}

/// `(source, destination, destination_limit, mode) -> result`. `dst_limit`
/// is the most the filter should write to `dst` this call (already
/// accounting for the outer watermark), mirroring
/// `bufferevent_filter_cb`'s `dst_limit` argument.
pub type FilterFn = Box<dyn FnMut(&mut ChainBuffer, &mut ChainBuffer, usize, FlushMode) -> FilterResult + Send>;

/// A [`Transport`] that pumps bytes through `input_filter`/`output_filter`
/// before/after an owned underlying [`BufferedEvent`].
///
/// Unlike libevent, which drives a filter by installing its own read/write
/// callbacks onto the underlying bufferevent, this owns the underlying
/// `BufferedEvent` outright and talks to its transport directly
/// (`do_read`/`do_write`), bypassing the underlying's own watermark and
/// callback dispatch entirely. All watermark/suspend/callback policy for
/// the filtered stream lives on the *outer* `BufferedEvent` that wraps
/// this transport, the same way it would for a plain socket transport.
pub struct FilterTransport<U: Transport> {
    underlying: BufferedEvent<U>,
    input_filter: FilterFn,
    output_filter: FilterFn,
    got_eof: bool,
    close_on_free: bool,
}

impl<U: Transport> FilterTransport<U> {
    pub fn new(
        underlying: BufferedEvent<U>,
        input_filter: FilterFn,
        output_filter: FilterFn,
        close_on_free: bool,
    ) -> Self {
        FilterTransport { underlying, input_filter, output_filter, got_eof: false, close_on_free }
    }

    /// Pull raw bytes from the underlying transport's input side into
    /// `input`, running them through `input_filter` as they arrive.
    /// Mirrors `be_filter_process_input`.
    fn pump_input(
        &mut self,
        dst: &mut ChainBuffer,
        dst_limit: usize,
        mode: FlushMode,
    ) -> Result<IoOutcome, BufferedEventError> {
        let mut total = 0;
        loop {
            if dst_limit != 0 && dst.len() >= dst_limit {
                break;
            }
            let before = dst.len();
            let underlying_input = self.underlying.input_mut();
            let result = (self.input_filter)(underlying_input, dst, dst_limit, mode);
            let produced = dst.len() - before;
            total += produced;
            match result {
                FilterResult::Error => return Err(BufferedEventError::FilterRejected),
                FilterResult::NeedMore => break,
                FilterResult::Ok if produced == 0 => break,
                FilterResult::Ok => continue,
            }
        }
        if total == 0 && self.got_eof && self.underlying.input().is_empty() {
            return Ok(IoOutcome::Eof);
        }
        Ok(IoOutcome::Progress(total))
    }

    /// Push bytes out of `src` through `output_filter` into the
    /// underlying's output buffer, then let the underlying transport drain
    /// it. Mirrors `be_filter_process_output`, including its reentrancy
    /// guard: the underlying's own output callback is never installed in
    /// the first place here, since we drive its transport directly rather
    /// than through its callback dispatch.
    fn pump_output(&mut self, src: &mut ChainBuffer, mode: FlushMode) -> Result<IoOutcome, BufferedEventError> {
        let mut total = 0;
        loop {
            if src.is_empty() {
                break;
            }
            let before = self.underlying.output_mut().len();
            let result = (self.output_filter)(src, self.underlying.output_mut(), 0, mode);
            let produced = self.underlying.output_mut().len() - before;
            total += produced;
            match result {
                FilterResult::Error => return Err(BufferedEventError::FilterRejected),
                FilterResult::NeedMore => break,
                FilterResult::Ok if produced == 0 => break,
                FilterResult::Ok => continue,
            }
        }
        let outcome = self.underlying.transport_write_once()?;
        match outcome {
            IoOutcome::Progress(_) => Ok(IoOutcome::Progress(total)),
            other => Ok(other),
        }
    }
}

impl<U: Transport> Transport for FilterTransport<U> {
    fn enable(&mut self, flags: EventFlags) -> Result<(), BufferedEventError> {
        self.underlying.transport_enable(flags)
    }

    fn disable(&mut self, flags: EventFlags) -> Result<(), BufferedEventError> {
        self.underlying.transport_disable(flags)
    }

    fn do_read(&mut self, input: &mut ChainBuffer, max: usize) -> Result<IoOutcome, BufferedEventError> {
        let raw_outcome = self.underlying.transport_read_once(max)?;
        if matches!(raw_outcome, IoOutcome::Eof) {
            self.got_eof = true;
        }
        let mode = if self.got_eof { FlushMode::Finished } else { FlushMode::Normal };
        let pumped = self.pump_input(input, max, mode)?;
        match (raw_outcome, pumped) {
            (IoOutcome::Eof, IoOutcome::Progress(0)) => Ok(IoOutcome::Eof),
            (_, outcome) => Ok(outcome),
        }
    }

    fn do_write(&mut self, output: &mut ChainBuffer) -> Result<IoOutcome, BufferedEventError> {
        self.pump_output(output, FlushMode::Normal)
    }

    fn flush(
        &mut self,
        iotype: EventFlags,
        mode: FlushMode,
        input: &mut ChainBuffer,
        output: &mut ChainBuffer,
    ) -> Result<FlushOutcome, BufferedEventError> {
        let mut moved = 0;
        if iotype.contains(EventFlags::WRITE) && !output.is_empty() {
            if let IoOutcome::Progress(n) = self.pump_output(output, mode)? {
                moved += n;
            }
        }
        let mut eof = false;
        if iotype.contains(EventFlags::READ) {
            match self.pump_input(input, 0, mode)? {
                IoOutcome::Progress(n) => moved += n,
                IoOutcome::Eof => {}
                IoOutcome::WouldBlock => {}
            }
            if self.got_eof && self.underlying.input().is_empty() {
                eof = true;
            }
        }
        let underlying_outcome = self.underlying.transport_flush_once(iotype, mode)?;
        moved += underlying_outcome.moved;
        eof |= underlying_outcome.eof;
        Ok(FlushOutcome { moved, eof })
    }
}

impl<U: Transport> Drop for FilterTransport<U> {
    fn drop(&mut self) {
        if self.close_on_free {
            let _ = self.underlying.transport_disable(EventFlags::READ | EventFlags::WRITE);
        }
    }
}
