//! [`BufferedEvent`]: a duplex stream built from an input/output
//! [`ChainBuffer`] pair plus a pluggable [`Transport`]. Grounded on
//! `examples/original_source/bufferevent.c`'s watermark/suspend state
//! machine and `bufferevent_sock.c`'s readcb/writecb callback-firing
//! rules.

use std::cell::Cell;
use std::marker::PhantomData;
use std::time::{Duration, Instant};

use chain_buffer::ChainBuffer;

use crate::error::BufferedEventError;
use crate::flags::{EventFlags, FlushMode};
use crate::transport::{FlushOutcome, IoOutcome, Transport};
use crate::watermark::Watermark;

pub type ReadCallback = Box<dyn FnMut(&mut ChainBuffer) + Send>;
pub type WriteCallback = Box<dyn FnMut() + Send>;
pub type ErrorCallback = Box<dyn FnMut(EventFlags) + Send>;

/// A duplex byte stream: an input buffer filled by the transport, an
/// output buffer drained by it, and watermark-gated callbacks notifying
/// the application of progress.
///
/// Not `Sync`: all mutation (including the callback-firing paths driven
/// by [`BufferedEvent::on_readable`]/[`on_writable`](Self::on_writable))
/// assumes single-threaded access to a given instance, the same way a
/// `bufferevent` is only ever touched from the thread running its
/// `event_base`.
pub struct BufferedEvent<T: Transport> {
    input: ChainBuffer,
    output: ChainBuffer,
    transport: T,
    enabled: EventFlags,
    read_suspended: bool,
    wm_read: Watermark,
    wm_write: Watermark,
    read_timeout: Option<Duration>,
    write_timeout: Option<Duration>,
    read_deadline: Option<Instant>,
    write_deadline: Option<Instant>,
    read_cb: Option<ReadCallback>,
    write_cb: Option<WriteCallback>,
    error_cb: Option<ErrorCallback>,
    _not_sync: PhantomData<Cell<()>>,
}

impl<T: Transport> BufferedEvent<T> {
    /// Write is logically enabled from construction (mirrors
    /// `bufferevent_init_common` setting `bufev->enabled = EV_WRITE` up
    /// front), though nothing is actually registered with a reactor until
    /// the first `enable`/`write` call asks the transport to arm it.
    pub fn new(transport: T) -> Self {
        BufferedEvent {
            input: ChainBuffer::new(),
            output: ChainBuffer::new(),
            transport,
            enabled: EventFlags::WRITE,
            read_suspended: false,
            wm_read: Watermark::default(),
            wm_write: Watermark::default(),
            read_timeout: None,
            write_timeout: None,
            read_deadline: None,
            write_deadline: None,
            read_cb: None,
            write_cb: None,
            error_cb: None,
            _not_sync: PhantomData,
        }
    }

    pub fn set_callbacks(
        &mut self,
        read: Option<ReadCallback>,
        write: Option<WriteCallback>,
        error: Option<ErrorCallback>,
    ) {
        self.read_cb = read;
        self.write_cb = write;
        self.error_cb = error;
    }

    pub fn input(&self) -> &ChainBuffer {
        &self.input
    }

    pub fn input_mut(&mut self) -> &mut ChainBuffer {
        &mut self.input
    }

    pub fn output(&self) -> &ChainBuffer {
        &self.output
    }

    pub fn output_mut(&mut self) -> &mut ChainBuffer {
        &mut self.output
    }

    pub fn transport_mut(&mut self) -> &mut T {
        &mut self.transport
    }

    pub fn set_watermarks(&mut self, read: Watermark, write: Watermark) -> Result<(), BufferedEventError> {
        self.wm_read = read;
        self.wm_write = write;
        self.maybe_unsuspend_read()?;
        if read.high != 0 && self.input.len() >= read.high {
            self.suspend_read()?;
        }
        Ok(())
    }

    pub fn set_timeouts(&mut self, read: Option<Duration>, write: Option<Duration>) {
        self.read_timeout = read;
        self.write_timeout = write;
        if self.enabled.contains(EventFlags::READ) {
            self.refresh_read_deadline();
        } else {
            self.read_deadline = None;
        }
        if self.enabled.contains(EventFlags::WRITE) {
            self.refresh_write_deadline();
        } else {
            self.write_deadline = None;
        }
    }

    pub fn read_timeout(&self) -> Option<Duration> {
        self.read_timeout
    }

    pub fn write_timeout(&self) -> Option<Duration> {
        self.write_timeout
    }

    pub fn enable(&mut self, flags: EventFlags) -> Result<(), BufferedEventError> {
        self.enabled |= flags;
        if flags.contains(EventFlags::READ) {
            self.refresh_read_deadline();
        }
        if flags.contains(EventFlags::WRITE) {
            self.refresh_write_deadline();
        }
        let armable = if self.read_suspended { flags & !EventFlags::READ } else { flags };
        self.transport.enable(armable)
    }

    pub fn disable(&mut self, flags: EventFlags) -> Result<(), BufferedEventError> {
        self.enabled &= !flags;
        if flags.contains(EventFlags::READ) {
            self.read_deadline = None;
        }
        if flags.contains(EventFlags::WRITE) {
            self.write_deadline = None;
        }
        self.transport.disable(flags)
    }

    pub fn is_enabled(&self, flags: EventFlags) -> bool {
        self.enabled.contains(flags)
    }

    /// Queue bytes for the transport to send. Never blocks; the reactor
    /// drains `output` on the next writable notification.
    pub fn write(&mut self, bytes: &[u8]) -> Result<(), BufferedEventError> {
        self.output.append(bytes)?;
        if self.enabled.contains(EventFlags::WRITE) {
            self.transport.enable(EventFlags::WRITE)?;
        }
        Ok(())
    }

    /// Queue an entire buffer's worth of bytes, emptying `src` in O(1).
    pub fn write_buffer(&mut self, src: &mut ChainBuffer) -> Result<(), BufferedEventError> {
        self.output.add_buffer(src);
        if self.enabled.contains(EventFlags::WRITE) {
            self.transport.enable(EventFlags::WRITE)?;
        }
        Ok(())
    }

    /// Copy up to `out.len()` bytes out of the input buffer.
    pub fn read(&mut self, out: &mut [u8]) -> Result<usize, BufferedEventError> {
        let n = self.input.remove(out);
        self.maybe_unsuspend_read()?;
        Ok(n)
    }

    /// Move up to `n` bytes from the input buffer into `dst` in O(1) for
    /// whole chains.
    pub fn read_buffer(&mut self, dst: &mut ChainBuffer, n: usize) -> Result<usize, BufferedEventError> {
        let moved = self.input.remove_to(dst, n)?;
        self.maybe_unsuspend_read()?;
        Ok(moved)
    }

    /// Push buffered data through the transport immediately, firing the
    /// same read/write/error callbacks a reactor-driven
    /// [`Self::on_readable`]/[`Self::on_writable`] would. Returns whether
    /// any bytes moved or an EOF was reached.
    pub fn flush(&mut self, iotype: EventFlags, mode: FlushMode) -> Result<bool, BufferedEventError> {
        let outcome = self.transport.flush(iotype, mode, &mut self.input, &mut self.output)?;
        if iotype.contains(EventFlags::READ) && outcome.moved > 0 && self.input.len() >= self.wm_read.low {
            self.fire_read_cb();
        }
        if iotype.contains(EventFlags::WRITE) && outcome.moved > 0 && self.output.len() <= self.wm_write.low {
            self.fire_write_cb();
        }
        if outcome.eof {
            let mut eof_flags = EventFlags::EOF;
            if iotype.contains(EventFlags::READ) {
                eof_flags |= EventFlags::READ;
            }
            if iotype.contains(EventFlags::WRITE) {
                eof_flags |= EventFlags::WRITE;
            }
            self.fire_error_cb(eof_flags);
        }
        Ok(outcome.moved > 0 || outcome.eof)
    }

    /// Run the transport's read once against our own input/output pair.
    /// Exists so a wrapping transport (like [`crate::FilterTransport`])
    /// that owns a whole `BufferedEvent` as its underlying can drive it
    /// without needing to borrow `transport` and a buffer field at once
    /// from outside this module.
    pub(crate) fn transport_read_once(&mut self, max: usize) -> Result<IoOutcome, BufferedEventError> {
        self.transport.do_read(&mut self.input, max)
    }

    pub(crate) fn transport_write_once(&mut self) -> Result<IoOutcome, BufferedEventError> {
        self.transport.do_write(&mut self.output)
    }

    pub(crate) fn transport_flush_once(
        &mut self,
        iotype: EventFlags,
        mode: FlushMode,
    ) -> Result<FlushOutcome, BufferedEventError> {
        self.transport.flush(iotype, mode, &mut self.input, &mut self.output)
    }

    pub(crate) fn transport_enable(&mut self, flags: EventFlags) -> Result<(), BufferedEventError> {
        self.transport.enable(flags)
    }

    pub(crate) fn transport_disable(&mut self, flags: EventFlags) -> Result<(), BufferedEventError> {
        self.transport.disable(flags)
    }

    fn suspend_read(&mut self) -> Result<(), BufferedEventError> {
        if !self.read_suspended {
            self.read_suspended = true;
            self.transport.disable(EventFlags::READ)?;
        }
        Ok(())
    }

    fn maybe_unsuspend_read(&mut self) -> Result<(), BufferedEventError> {
        if self.read_suspended && (self.wm_read.high == 0 || self.input.len() < self.wm_read.high) {
            self.read_suspended = false;
            if self.enabled.contains(EventFlags::READ) {
                self.transport.enable(EventFlags::READ)?;
            }
        }
        Ok(())
    }

    fn fire_read_cb(&mut self) {
        let BufferedEvent { ref mut input, ref mut read_cb, .. } = *self;
        if let Some(cb) = read_cb {
            cb(input);
        }
    }

    fn fire_write_cb(&mut self) {
        if let Some(cb) = self.write_cb.as_mut() {
            cb();
        }
    }

    fn fire_error_cb(&mut self, flags: EventFlags) {
        if let Some(cb) = self.error_cb.as_mut() {
            cb(flags);
        }
    }

    fn refresh_read_deadline(&mut self) {
        self.read_deadline = self.read_timeout.map(|d| Instant::now() + d);
    }

    fn refresh_write_deadline(&mut self) {
        self.write_deadline = self.write_timeout.map(|d| Instant::now() + d);
    }

    /// Check the read/write deadlines set via [`Self::set_timeouts`]
    /// against the current time, firing the error callback with
    /// `TIMEOUT | READ`/`TIMEOUT | WRITE` and detaching the expired
    /// direction. `mio` has no per-fd timer registration, so unlike
    /// `register_fd`, a deadline is tracked here and must be polled by the
    /// caller once per reactor tick rather than delivered as its own event.
    pub fn check_timeouts(&mut self) -> Result<(), BufferedEventError> {
        let now = Instant::now();
        if self.read_deadline.is_some_and(|deadline| now >= deadline) {
            self.read_deadline = None;
            self.fire_error_cb(EventFlags::TIMEOUT | EventFlags::READ);
            self.disable(EventFlags::READ)?;
        }
        if self.write_deadline.is_some_and(|deadline| now >= deadline) {
            self.write_deadline = None;
            self.fire_error_cb(EventFlags::TIMEOUT | EventFlags::WRITE);
            self.disable(EventFlags::WRITE)?;
        }
        Ok(())
    }

    /// Drive one round of reads from the transport, suspending past the
    /// read high watermark and firing the read callback whenever the
    /// input buffer crosses the low watermark. Call this when the reactor
    /// reports the underlying source as readable.
    pub fn on_readable(&mut self) -> Result<(), BufferedEventError> {
        loop {
            if self.read_suspended {
                break;
            }
            let max = if self.wm_read.high != 0 {
                self.wm_read.high.saturating_sub(self.input.len())
            } else {
                chain_buffer::DEFAULT_READ_QUANTUM
            };
            if max == 0 {
                self.suspend_read()?;
                break;
            }
            match self.transport.do_read(&mut self.input, max) {
                Ok(IoOutcome::Progress(0)) => break,
                Ok(IoOutcome::Progress(_)) => {
                    self.refresh_read_deadline();
                    if self.wm_read.high != 0 && self.input.len() >= self.wm_read.high {
                        self.suspend_read()?;
                    }
                    if self.input.len() >= self.wm_read.low {
                        self.fire_read_cb();
                    }
                }
                Ok(IoOutcome::WouldBlock) => break,
                Ok(IoOutcome::Eof) => {
                    self.fire_error_cb(EventFlags::EOF | EventFlags::READ);
                    self.disable(EventFlags::READ)?;
                    break;
                }
                Err(_) => {
                    self.fire_error_cb(EventFlags::ERROR | EventFlags::READ);
                    self.disable(EventFlags::READ)?;
                    break;
                }
            }
        }
        Ok(())
    }

    /// Drive one round of writes to the transport, firing the write
    /// callback whenever the output buffer drains down to the low
    /// watermark. Call this when the reactor reports the underlying sink
    /// as writable.
    pub fn on_writable(&mut self) -> Result<(), BufferedEventError> {
        loop {
            if self.output.is_empty() {
                break;
            }
            match self.transport.do_write(&mut self.output) {
                Ok(IoOutcome::Progress(0)) => break,
                Ok(IoOutcome::Progress(_)) => {
                    self.refresh_write_deadline();
                    if self.output.len() <= self.wm_write.low {
                        self.fire_write_cb();
                    }
                }
                Ok(IoOutcome::WouldBlock) => break,
                Ok(IoOutcome::Eof) => {
                    self.fire_error_cb(EventFlags::EOF | EventFlags::WRITE);
                    self.disable(EventFlags::WRITE)?;
                    break;
                }
                Err(_) => {
                    self.fire_error_cb(EventFlags::ERROR | EventFlags::WRITE);
                    self.disable(EventFlags::WRITE)?;
                    break;
                }
            }
        }
        if self.output.is_empty() {
            self.transport.disable(EventFlags::WRITE)?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use std::sync::{Arc, Mutex};

    use super::*;
    use crate::test_support::InMemoryTransport;

    fn bev() -> BufferedEvent<InMemoryTransport> {
        BufferedEvent::new(InMemoryTransport::new())
    }

    #[test]
    fn write_then_on_writable_moves_bytes_to_the_transport() {
        let mut b = bev();
        b.enable(EventFlags::WRITE).unwrap();
        b.write(b"hello").unwrap();
        b.on_writable().unwrap();
        assert_eq!(b.transport_mut().sent, b"hello");
        assert!(b.output().is_empty());
    }

    #[test]
    fn on_readable_pulls_inbound_bytes_into_the_input_buffer() {
        let mut b = bev();
        b.transport_mut().push_inbound(b"world");
        b.enable(EventFlags::READ).unwrap();
        b.on_readable().unwrap();
        let mut out = [0_u8; 5];
        assert_eq!(b.read(&mut out).unwrap(), 5);
        assert_eq!(&out, b"world");
    }

    #[test]
    fn read_high_watermark_suspends_reading_until_drained() {
        let mut b = bev();
        b.transport_mut().push_inbound(&[7_u8; 64]);
        b.set_watermarks(Watermark::new(0, 16), Watermark::default()).unwrap();
        b.enable(EventFlags::READ).unwrap();

        b.on_readable().unwrap();
        assert_eq!(b.input().len(), 16);
        assert!(b.read_suspended);

        let mut drained = vec![0_u8; 16];
        b.read(&mut drained).unwrap();
        assert!(!b.read_suspended);

        b.on_readable().unwrap();
        assert_eq!(b.input().len(), 16, "unsuspending pulls in exactly one more watermark-sized chunk");
    }

    #[test]
    fn read_callback_fires_once_per_read_past_the_low_watermark() {
        let mut b = bev();
        b.transport_mut().push_inbound(b"ab");
        b.set_watermarks(Watermark::new(1, 0), Watermark::default()).unwrap();
        let fired = Arc::new(Mutex::new(0));
        let fired_cb = Arc::clone(&fired);
        b.set_callbacks(Some(Box::new(move |_input: &mut ChainBuffer| *fired_cb.lock().unwrap() += 1)), None, None);
        b.enable(EventFlags::READ).unwrap();

        b.on_readable().unwrap();
        assert_eq!(*fired.lock().unwrap(), 1);
    }

    #[test]
    fn error_callback_fires_on_eof_and_read_is_disabled() {
        let mut b = bev();
        b.transport_mut().eof = true;
        b.enable(EventFlags::READ).unwrap();
        let saw_eof = Arc::new(Mutex::new(false));
        let saw_eof_cb = Arc::clone(&saw_eof);
        b.set_callbacks(None, None, Some(Box::new(move |flags: EventFlags| {
            if flags.contains(EventFlags::EOF) {
                *saw_eof_cb.lock().unwrap() = true;
            }
        })));

        b.on_readable().unwrap();
        assert!(*saw_eof.lock().unwrap());
        assert!(!b.is_enabled(EventFlags::READ));
    }

    #[test]
    fn io_error_during_on_readable_fires_error_callback_instead_of_propagating() {
        let mut b = bev();
        b.transport_mut().fail_io = true;
        b.enable(EventFlags::READ).unwrap();
        let seen = Arc::new(Mutex::new(EventFlags::empty()));
        let seen_cb = Arc::clone(&seen);
        b.set_callbacks(None, None, Some(Box::new(move |flags: EventFlags| *seen_cb.lock().unwrap() = flags)));

        b.on_readable().expect("a fatal transport error must not propagate out of on_readable");

        assert!(seen.lock().unwrap().contains(EventFlags::ERROR | EventFlags::READ));
        assert!(!b.is_enabled(EventFlags::READ));
    }

    #[test]
    fn io_error_during_on_writable_fires_error_callback_instead_of_propagating() {
        let mut b = bev();
        b.enable(EventFlags::WRITE).unwrap();
        b.write(b"hello").unwrap();
        b.transport_mut().fail_io = true;
        let seen = Arc::new(Mutex::new(EventFlags::empty()));
        let seen_cb = Arc::clone(&seen);
        b.set_callbacks(None, None, Some(Box::new(move |flags: EventFlags| *seen_cb.lock().unwrap() = flags)));

        b.on_writable().expect("a fatal transport error must not propagate out of on_writable");

        assert!(seen.lock().unwrap().contains(EventFlags::ERROR | EventFlags::WRITE));
        assert!(!b.is_enabled(EventFlags::WRITE));
    }

    #[test]
    fn on_writable_detaches_write_interest_once_output_drains() {
        let mut b = bev();
        b.enable(EventFlags::WRITE).unwrap();
        b.write(b"hi").unwrap();
        assert!(b.transport_mut().enabled.contains(EventFlags::WRITE));

        b.on_writable().unwrap();

        assert!(b.output().is_empty());
        assert!(
            !b.transport_mut().enabled.contains(EventFlags::WRITE),
            "transport must stop being armed for WRITE once output is empty"
        );
        assert!(b.is_enabled(EventFlags::WRITE), "the user's own enable state is untouched by the drain");

        b.write(b"again").unwrap();
        assert!(
            b.transport_mut().enabled.contains(EventFlags::WRITE),
            "queuing more output re-arms the transport"
        );
    }

    #[test]
    fn read_timeout_fires_error_callback_and_disables_read() {
        let mut b = bev();
        b.set_timeouts(Some(Duration::from_millis(10)), None);
        b.enable(EventFlags::READ).unwrap();
        let seen = Arc::new(Mutex::new(EventFlags::empty()));
        let seen_cb = Arc::clone(&seen);
        b.set_callbacks(None, None, Some(Box::new(move |flags: EventFlags| *seen_cb.lock().unwrap() = flags)));

        std::thread::sleep(Duration::from_millis(20));
        b.check_timeouts().unwrap();

        assert!(seen.lock().unwrap().contains(EventFlags::TIMEOUT | EventFlags::READ));
        assert!(!b.is_enabled(EventFlags::READ));
    }
}
