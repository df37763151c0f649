//! [`ChainBuffer`]: the segmented byte queue itself.

use std::collections::VecDeque;
use std::fmt;
use std::io::{self, IoSlice, IoSliceMut};

use crate::callback::CallbackRegistry;
use crate::chain::Chain;
use crate::error::ChainBufferError;
use crate::eol::{find_eol, EolStyle};
use crate::{CallbackId, MAX_AUTO_GROWTH, MAX_GATHER_CHAINS, MIN_CHAIN_SIZE};

/// Tunable knobs for chain sizing. Defaults mirror libevent's constants;
/// callers embedding many small buffers (or expecting unusually large
/// single reads) can override them via [`ChainBuffer::with_options`].
#[derive(Debug, Clone, Copy)]
pub struct ChainBufferOptions {
    pub min_chain_size: usize,
    pub max_auto_growth: usize,
}

impl Default for ChainBufferOptions {
    fn default() -> Self {
        ChainBufferOptions { min_chain_size: MIN_CHAIN_SIZE, max_auto_growth: MAX_AUTO_GROWTH }
    }
}

/// A line extracted by [`ChainBuffer::read_line`]: the line's bytes with
/// the terminator stripped, plus how many bytes (line + terminator) were
/// drained from the buffer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Line {
    pub bytes: Vec<u8>,
    pub drained: usize,
}

/// A segmented, variable-length byte queue. Not `Sync`: callers that need
/// to move buffered data across threads do so by handing over whole
/// chains via [`ChainBuffer::add_buffer`], not by sharing a `ChainBuffer`.
pub struct ChainBuffer {
    chains: VecDeque<Chain>,
    total_len: usize,
    reserved: usize,
    callbacks: CallbackRegistry,
    options: ChainBufferOptions,
}

impl Default for ChainBuffer {
    fn default() -> Self {
        Self::new()
    }
}

impl ChainBuffer {
    pub fn new() -> Self {
        Self::with_options(ChainBufferOptions::default())
    }

    pub fn with_options(options: ChainBufferOptions) -> Self {
        ChainBuffer {
            chains: VecDeque::new(),
            total_len: 0,
            reserved: 0,
            callbacks: CallbackRegistry::default(),
            options,
        }
    }

    pub fn len(&self) -> usize {
        self.total_len
    }

    pub fn is_empty(&self) -> bool {
        self.total_len == 0
    }

    /// Register a callback invoked as `(old_len, new_len)` whenever
    /// `len()` changes. Does not fire for no-op mutations.
    pub fn add_callback<F>(&mut self, callback: F) -> CallbackId
    where
        F: FnMut(usize, usize, &mut crate::PendingRemovals) + 'static,
    {
        self.callbacks.add(callback)
    }

    pub fn remove_callback(&mut self, id: CallbackId) {
        self.callbacks.remove(id);
    }

    pub fn set_callback_enabled(&mut self, id: CallbackId, enabled: bool) {
        self.callbacks.set_enabled(id, enabled);
    }

    fn fire(&mut self, old_len: usize, new_len: usize) {
        self.callbacks.fire(old_len, new_len);
    }

    fn debug_check_invariants(&self) {
        let sum: usize = self.chains.iter().map(Chain::off).sum();
        crate::safe_assert!(sum == self.total_len, "total_len {} != sum of chain offs {}", self.total_len, sum);
        let len = self.chains.len();
        for (i, c) in self.chains.iter().enumerate() {
            crate::safe_assert!(
                c.misalign() + c.off() <= c.buffer_len(),
                "chain {} misalign+off exceeds buffer_len",
                i
            );
            if i > 0 && i + 1 < len {
                crate::safe_assert!(c.off() > 0, "interior chain {} has off == 0", i);
            }
        }
    }

    /// Ensure the last chain (allocating one if the buffer is empty) has
    /// at least `min_bytes` of trailing room, realigning or growing a new
    /// chain as needed. Mirrors `evbuffer_expand`.
    ///
    /// Used by `reserve`/`prepare_read_vectors`, where the caller has no
    /// data to roll back if allocation fails; panics on allocation
    /// failure like the rest of `std` does, rather than threading a
    /// `Result` through read-preparation calls that cannot otherwise fail.
    fn ensure_tail_capacity(&mut self, min_bytes: usize) {
        if self.chains.is_empty() {
            self.chains.push_back(
                Chain::try_new_sized(min_bytes, self.options.min_chain_size).expect("allocation failed"),
            );
            return;
        }
        let last = self.chains.back_mut().expect("checked non-empty above");
        if last.trailing_space() >= min_bytes {
            return;
        }
        if last.is_empty() && last.misalign() > 0 {
            last.realign();
        }
        if last.trailing_space() < min_bytes {
            let previous_capacity = last.buffer_len();
            let grown = Chain::try_new_grown(
                min_bytes,
                previous_capacity,
                self.options.min_chain_size,
                self.options.max_auto_growth,
            )
            .expect("allocation failed");
            self.chains.push_back(grown);
        }
    }

    /// Append `bytes` to the end of the buffer.
    ///
    /// Mirrors `evbuffer_add`: if the last chain has no room at all, the
    /// replacement chain is sized off the *full* `bytes.len()` even though
    /// only the remainder (after filling whatever trailing space the
    /// chain did have) is copied into it. Preserved here rather than
    /// "fixed" because a caller appending in a tight loop depends on the
    /// resulting chain being large enough for the next append too.
    pub fn append(&mut self, bytes: &[u8]) -> Result<(), ChainBufferError> {
        if bytes.is_empty() {
            return Ok(());
        }
        let old_len = self.total_len;

        if let Some(last) = self.chains.back_mut() {
            let space = last.trailing_space();
            if space > 0 {
                let take = space.min(bytes.len());
                if take == bytes.len() {
                    last.append_bytes(&bytes[..take]);
                    self.total_len += bytes.len();
                    self.fire(old_len, self.total_len);
                    self.debug_check_invariants();
                    return Ok(());
                }
                let remainder = &bytes[take..];
                let previous_capacity = last.buffer_len();
                let mut grown = Chain::try_new_grown(
                    bytes.len(),
                    previous_capacity,
                    self.options.min_chain_size,
                    self.options.max_auto_growth,
                )
                .map_err(|_| ChainBufferError::OutOfMemory)?;
                // Only mutate existing state once the new chain is in hand,
                // so an allocation failure above leaves the buffer untouched.
                last.append_bytes(&bytes[..take]);
                grown.append_bytes(remainder);
                self.chains.push_back(grown);
                self.total_len += bytes.len();
                self.fire(old_len, self.total_len);
                self.debug_check_invariants();
                return Ok(());
            }
        }

        let mut fresh = Chain::try_new_sized(bytes.len(), self.options.min_chain_size)
            .map_err(|_| ChainBufferError::OutOfMemory)?;
        fresh.append_bytes(bytes);
        self.chains.push_back(fresh);
        self.total_len += bytes.len();
        self.fire(old_len, self.total_len);
        self.debug_check_invariants();
        Ok(())
    }

    /// Prepend `bytes` to the front of the buffer.
    ///
    /// Mirrors `evbuffer_prepend`: unlike append's new-chain path, a
    /// brand-new prepend chain is sized exactly to `bytes.len()` with no
    /// doubling, since a prepend chain typically only absorbs one write
    /// (a header glued onto an already-built payload).
    pub fn prepend(&mut self, bytes: &[u8]) -> Result<(), ChainBufferError> {
        if bytes.is_empty() {
            return Ok(());
        }
        let old_len = self.total_len;

        if let Some(first) = self.chains.front_mut() {
            if first.misalign() >= bytes.len() {
                first.prepend_bytes(bytes);
                self.total_len += bytes.len();
                self.fire(old_len, self.total_len);
                self.debug_check_invariants();
                return Ok(());
            }
            if first.misalign() > 0 {
                let room = first.misalign();
                let (head, tail) = bytes.split_at(bytes.len() - room);
                let mut fresh = Chain::try_new_for_prepend(head.len(), self.options.min_chain_size)
                    .map_err(|_| ChainBufferError::OutOfMemory)?;
                first.prepend_bytes(tail);
                fresh.prepend_bytes(head);
                self.chains.push_front(fresh);
                self.total_len += bytes.len();
                self.fire(old_len, self.total_len);
                self.debug_check_invariants();
                return Ok(());
            }
        }

        let mut fresh = Chain::try_new_for_prepend(bytes.len(), self.options.min_chain_size)
            .map_err(|_| ChainBufferError::OutOfMemory)?;
        fresh.prepend_bytes(bytes);
        self.chains.push_front(fresh);
        self.total_len += bytes.len();
        self.fire(old_len, self.total_len);
        self.debug_check_invariants();
        Ok(())
    }

    /// Drop the first `n` bytes (clamped to `len()`). Returns the number
    /// of bytes actually drained.
    pub fn drain(&mut self, n: usize) -> usize {
        let n = n.min(self.total_len);
        if n == 0 {
            return 0;
        }
        let old_len = self.total_len;
        if n == self.total_len {
            self.chains.clear();
            self.total_len = 0;
        } else {
            let mut remaining = n;
            while remaining > 0 {
                let front_off = self.chains.front().expect("n <= total_len").off();
                if front_off <= remaining {
                    self.chains.pop_front();
                    remaining -= front_off;
                } else {
                    self.chains.front_mut().expect("checked above").consume_front(remaining);
                    remaining = 0;
                }
            }
            self.total_len -= n;
        }
        self.fire(old_len, self.total_len);
        self.debug_check_invariants();
        n
    }

    /// Copy up to `out.len()` bytes out of the buffer and drain them.
    /// Returns the number of bytes copied.
    pub fn remove(&mut self, out: &mut [u8]) -> usize {
        let n = out.len().min(self.total_len);
        if n == 0 {
            return 0;
        }
        let mut copied = 0;
        for chain in self.chains.iter() {
            if copied >= n {
                break;
            }
            let valid = chain.valid();
            let take = valid.len().min(n - copied);
            out[copied..copied + take].copy_from_slice(&valid[..take]);
            copied += take;
        }
        self.drain(n);
        n
    }

    /// Move up to `n` bytes from the front of `self` onto the end of
    /// `dst`, splicing whole chains where possible and falling back to a
    /// byte copy only for the chain straddling the `n`-byte boundary.
    /// Fires `self`'s callback before `dst`'s, matching the order a
    /// caller observing both would expect: the source shrinks first.
    pub fn remove_to(&mut self, dst: &mut ChainBuffer, n: usize) -> Result<usize, ChainBufferError> {
        let n = n.min(self.total_len);
        if n == 0 {
            return Ok(0);
        }
        let src_old = self.total_len;
        let dst_old = dst.total_len;

        if n == self.total_len {
            dst.chains.append(&mut self.chains);
            dst.total_len += n;
            self.total_len = 0;
        } else {
            let mut remaining = n;
            while remaining > 0 {
                let front_off = self.chains.front().expect("n <= total_len").off();
                if front_off <= remaining {
                    let chain = self.chains.pop_front().expect("checked above");
                    remaining -= front_off;
                    dst.chains.push_back(chain);
                } else {
                    let boundary: Vec<u8> = self.chains.front().expect("checked above").valid()[..remaining].to_vec();
                    dst.append_no_fire(&boundary)?;
                    self.chains.front_mut().expect("checked above").consume_front(remaining);
                    remaining = 0;
                }
            }
            self.total_len -= n;
            dst.total_len += n;
        }

        self.fire(src_old, self.total_len);
        dst.fire(dst_old, dst.total_len);
        self.debug_check_invariants();
        dst.debug_check_invariants();
        Ok(n)
    }

    /// `append` without firing the change callback; used internally by
    /// `remove_to` so the caller-visible fire happens exactly once, after
    /// the whole transfer completes.
    fn append_no_fire(&mut self, bytes: &[u8]) -> Result<(), ChainBufferError> {
        if bytes.is_empty() {
            return Ok(());
        }
        if let Some(last) = self.chains.back_mut() {
            let space = last.trailing_space();
            if space > 0 {
                let take = space.min(bytes.len());
                if take == bytes.len() {
                    last.append_bytes(&bytes[..take]);
                    self.total_len += bytes.len();
                    return Ok(());
                }
                let remainder = &bytes[take..];
                let previous_capacity = last.buffer_len();
                let mut grown = Chain::try_new_grown(
                    bytes.len(),
                    previous_capacity,
                    self.options.min_chain_size,
                    self.options.max_auto_growth,
                )
                .map_err(|_| ChainBufferError::OutOfMemory)?;
                last.append_bytes(&bytes[..take]);
                grown.append_bytes(remainder);
                self.chains.push_back(grown);
                self.total_len += bytes.len();
                return Ok(());
            }
        }
        let mut fresh = Chain::try_new_sized(bytes.len(), self.options.min_chain_size)
            .map_err(|_| ChainBufferError::OutOfMemory)?;
        fresh.append_bytes(bytes);
        self.chains.push_back(fresh);
        self.total_len += bytes.len();
        Ok(())
    }

    /// Splice the entirety of `src`'s chains onto the end of `self` in
    /// O(1), leaving `src` empty.
    pub fn add_buffer(&mut self, src: &mut ChainBuffer) {
        let src_old = src.total_len;
        let dst_old = self.total_len;
        let moved = src.total_len;
        self.chains.append(&mut src.chains);
        self.total_len += moved;
        src.total_len = 0;
        src.fire(src_old, 0);
        self.fire(dst_old, self.total_len);
        self.debug_check_invariants();
        src.debug_check_invariants();
    }

    /// Splice the entirety of `src`'s chains onto the front of `self` in
    /// O(1), leaving `src` empty.
    pub fn prepend_buffer(&mut self, src: &mut ChainBuffer) {
        let src_old = src.total_len;
        let dst_old = self.total_len;
        let moved = src.total_len;
        let mut new_front = std::mem::take(&mut src.chains);
        new_front.append(&mut self.chains);
        self.chains = new_front;
        self.total_len += moved;
        src.total_len = 0;
        src.fire(src_old, 0);
        self.fire(dst_old, self.total_len);
        self.debug_check_invariants();
        src.debug_check_invariants();
    }

    /// Reserve at least `n` bytes of writable trailing space in the last
    /// chain, growing it if necessary, and return a slice into that
    /// space. The slice may be larger than `n`. Must be followed by
    /// exactly one [`ChainBuffer::commit`] call before any other mutating
    /// operation.
    pub fn reserve(&mut self, n: usize) -> &mut [u8] {
        self.ensure_tail_capacity(n);
        let last = self.chains.back_mut().expect("ensure_tail_capacity guarantees a last chain");
        self.reserved = last.trailing_space();
        last.trailing_space_mut()
    }

    /// Commit `written` bytes of the region handed back by `reserve` as
    /// valid data.
    pub fn commit(&mut self, written: usize) -> Result<(), ChainBufferError> {
        if written > self.reserved {
            return Err(ChainBufferError::ReservationExceeded { reserved: self.reserved, commit: written });
        }
        let old_len = self.total_len;
        if written > 0 {
            self.chains.back_mut().expect("reserve always leaves a last chain").grow_off(written);
        }
        self.total_len += written;
        self.reserved = 0;
        self.fire(old_len, self.total_len);
        self.debug_check_invariants();
        Ok(())
    }

    /// Guarantee the first `size` bytes (or the whole buffer when `size`
    /// is `None`) are contiguous in memory and return them as a slice.
    ///
    /// Mirrors `evbuffer_pullup`: when the first chain already has enough
    /// raw capacity after its current data, the consolidation reuses that
    /// chain's own allocation in place; otherwise a new chain sized
    /// exactly to `size` is allocated. Either way, every fully-consumed
    /// chain downstream of the boundary is dropped and the chain
    /// straddling the boundary (if any) is partially drained.
    pub fn pullup(&mut self, size: Option<usize>) -> Result<&[u8], ChainBufferError> {
        let size = size.unwrap_or(self.total_len);
        if size == 0 {
            return Ok(&[]);
        }
        if size > self.total_len {
            return Err(ChainBufferError::NotEnoughData { requested: size, available: self.total_len });
        }
        if self.chains.front().is_some_and(|c| c.off() >= size) {
            return Ok(&self.chains.front().expect("checked above").valid()[..size]);
        }

        let first_has_raw_room = self.chains.front().is_some_and(|c| c.buffer_len() - c.misalign() >= size);

        if first_has_raw_room {
            let mut head = self.chains.pop_front().expect("checked above");
            let mut write_pos = head.misalign() + head.off();
            let mut remaining = size - head.off();
            head.set_off(size);
            while remaining > 0 {
                let mut next = self.chains.pop_front().expect("total_len invariant guarantees enough data");
                let next_off = next.off();
                if next_off <= remaining {
                    head.write_at(write_pos, next.valid());
                    write_pos += next_off;
                    remaining -= next_off;
                } else {
                    head.write_at(write_pos, &next.valid()[..remaining]);
                    next.consume_front(remaining);
                    remaining = 0;
                    self.chains.push_front(next);
                }
            }
            self.chains.push_front(head);
        } else {
            let mut fresh =
                Chain::try_new_sized(size, self.options.min_chain_size).map_err(|_| ChainBufferError::OutOfMemory)?;
            let mut write_pos = 0;
            let mut remaining = size;
            while remaining > 0 {
                let mut next = self.chains.pop_front().expect("total_len invariant guarantees enough data");
                let next_off = next.off();
                if next_off <= remaining {
                    fresh.write_at(write_pos, next.valid());
                    write_pos += next_off;
                    remaining -= next_off;
                } else {
                    fresh.write_at(write_pos, &next.valid()[..remaining]);
                    next.consume_front(remaining);
                    remaining = 0;
                    self.chains.push_front(next);
                }
            }
            fresh.set_off(size);
            self.chains.push_front(fresh);
        }

        self.debug_check_invariants();
        Ok(&self.chains.front().expect("just pushed").valid()[..size])
    }

    /// Scan for the first line terminated per `style` and drain it
    /// (including the terminator) from the buffer.
    pub fn read_line(&mut self, style: EolStyle) -> Result<Line, ChainBufferError> {
        let snapshot = self.materialize();
        let (line_len, drained) = find_eol(&snapshot, style).ok_or(ChainBufferError::NoTerminator)?;
        let bytes = snapshot[..line_len].to_vec();
        self.drain(drained);
        Ok(Line { bytes, drained })
    }

    /// Byte offset of the first occurrence of `needle`, or `None` if it
    /// is not present in the buffered data. An empty needle matches at
    /// offset 0.
    pub fn search(&self, needle: &[u8]) -> Option<usize> {
        if needle.is_empty() {
            return Some(0);
        }
        if needle.len() > self.total_len {
            return None;
        }
        let snapshot = self.materialize();
        snapshot.windows(needle.len()).position(|w| w == needle)
    }

    fn materialize(&self) -> Vec<u8> {
        let mut out = Vec::with_capacity(self.total_len);
        for chain in &self.chains {
            out.extend_from_slice(chain.valid());
        }
        out
    }

    /// Build up to two [`IoSliceMut`]s covering the writable trailing
    /// space of the last chain (and the second-to-last, if it still has
    /// any) ready for a scatter read of at least `min_bytes`. Must be
    /// paired with exactly one [`ChainBuffer::account_read`] call using
    /// the number of bytes the read syscall actually returned, before any
    /// other mutating operation on this buffer.
    pub fn prepare_read_vectors(&mut self, min_bytes: usize) -> Vec<IoSliceMut<'_>> {
        self.ensure_tail_capacity(min_bytes.max(1));
        let chains = self.chains.make_contiguous();
        let len = chains.len();
        if len == 1 {
            return vec![IoSliceMut::new(chains[0].trailing_space_mut())];
        }
        let (head, tail) = chains.split_at_mut(len - 1);
        let previous_to_last = head.last_mut().expect("len >= 2");
        let mut vectors = Vec::with_capacity(2);
        let prev_space = previous_to_last.trailing_space_mut();
        if !prev_space.is_empty() {
            vectors.push(IoSliceMut::new(prev_space));
        }
        vectors.push(IoSliceMut::new(tail[0].trailing_space_mut()));
        vectors
    }

    /// Record that a scatter read filled `n` bytes of the window handed
    /// back by the most recent [`ChainBuffer::prepare_read_vectors`].
    pub fn account_read(&mut self, n: usize) {
        if n == 0 {
            return;
        }
        let old_len = self.total_len;
        let chains = self.chains.make_contiguous();
        let len = chains.len();
        if len == 1 {
            chains[0].grow_off(n);
        } else {
            let (head, tail) = chains.split_at_mut(len - 1);
            let previous_to_last = head.last_mut().expect("len >= 2");
            let prev_free = previous_to_last.trailing_space();
            let take_prev = n.min(prev_free);
            previous_to_last.grow_off(take_prev);
            tail[0].grow_off(n - take_prev);
        }
        self.total_len += n;
        self.fire(old_len, self.total_len);
        self.debug_check_invariants();
    }

    /// Build up to [`MAX_GATHER_CHAINS`] [`IoSlice`]s covering the
    /// buffer's valid bytes, capped at `max` total bytes, ready for a
    /// gather write. The caller drains the number of bytes the write
    /// syscall actually accepted via [`ChainBuffer::drain`].
    pub fn prepare_write_vectors(&self, max: usize) -> Vec<IoSlice<'_>> {
        let mut vectors = Vec::new();
        let mut budget = max;
        for chain in self.chains.iter() {
            if vectors.len() >= MAX_GATHER_CHAINS || budget == 0 {
                break;
            }
            let valid = chain.valid();
            if valid.is_empty() {
                continue;
            }
            let take = valid.len().min(budget);
            vectors.push(IoSlice::new(&valid[..take]));
            budget -= take;
        }
        vectors
    }
}

impl fmt::Write for ChainBuffer {
    fn write_str(&mut self, s: &str) -> fmt::Result {
        self.append(s.as_bytes()).map_err(|_| fmt::Error)
    }
}

impl io::Write for ChainBuffer {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.append(buf).map_err(|_| io::Error::other("allocation failed while growing the buffer"))?;
        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}

impl ChainBuffer {
    /// Best-effort formatted append, e.g. `buf.printf(format_args!("{n}
    /// items"))`.
    pub fn printf(&mut self, args: fmt::Arguments<'_>) -> Result<(), ChainBufferError> {
        use fmt::Write as _;
        self.write_fmt(args).map_err(|_| ChainBufferError::OutOfMemory)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn append_then_remove_round_trips() {
        let mut buf = ChainBuffer::new();
        buf.append(b"hello world").unwrap();
        assert_eq!(buf.len(), 11);
        let mut out = [0u8; 11];
        assert_eq!(buf.remove(&mut out), 11);
        assert_eq!(&out, b"hello world");
        assert!(buf.is_empty());
    }

    #[test]
    fn append_spans_multiple_chains_when_forced_small() {
        let mut buf = ChainBuffer::with_options(ChainBufferOptions { min_chain_size: 4, max_auto_growth: 8 });
        for _ in 0..50 {
            buf.append(b"xy").unwrap();
        }
        assert_eq!(buf.len(), 100);
        let mut out = vec![0u8; 100];
        assert_eq!(buf.remove(&mut out), 100);
        assert!(out.chunks(2).all(|c| c == b"xy"));
    }

    #[test]
    fn prepend_reuses_misalign_then_allocates() {
        let mut buf = ChainBuffer::with_options(ChainBufferOptions { min_chain_size: 16, max_auto_growth: 64 });
        buf.append(b"world").unwrap();
        buf.prepend(b" ").unwrap();
        buf.prepend(b"hello").unwrap();
        let mut out = vec![0u8; buf.len()];
        buf.remove(&mut out);
        assert_eq!(out, b"hello world");
    }

    #[test]
    fn pullup_consolidates_across_chains() {
        let mut buf = ChainBuffer::with_options(ChainBufferOptions { min_chain_size: 4, max_auto_growth: 8 });
        buf.append(b"ab").unwrap();
        buf.append(b"cd").unwrap();
        buf.append(b"ef").unwrap();
        assert!(buf.chains.len() > 1);
        let flat = buf.pullup(Some(6)).unwrap();
        assert_eq!(flat, b"abcdef");
    }

    #[test]
    fn pullup_requesting_more_than_available_errors() {
        let mut buf = ChainBuffer::new();
        buf.append(b"ab").unwrap();
        let err = buf.pullup(Some(10)).unwrap_err();
        assert_eq!(err, ChainBufferError::NotEnoughData { requested: 10, available: 2 });
    }

    #[test]
    fn reserve_commit_writes_in_place() {
        let mut buf = ChainBuffer::new();
        let slot = buf.reserve(4);
        slot[..4].copy_from_slice(b"data");
        buf.commit(4).unwrap();
        assert_eq!(buf.len(), 4);
        let mut out = [0u8; 4];
        buf.remove(&mut out);
        assert_eq!(&out, b"data");
    }

    #[test]
    fn commit_beyond_reservation_is_rejected() {
        let mut buf = ChainBuffer::new();
        buf.reserve(4);
        let err = buf.commit(5).unwrap_err();
        assert_eq!(err, ChainBufferError::ReservationExceeded { reserved: 4, commit: 5 });
    }

    #[test]
    fn read_line_strict_crlf() {
        let mut buf = ChainBuffer::new();
        buf.append(b"GET / HTTP/1.1\r\nHost: x\r\n").unwrap();
        let line = buf.read_line(EolStyle::CrlfStrict).unwrap();
        assert_eq!(line.bytes, b"GET / HTTP/1.1");
        assert_eq!(line.drained, 16);
        assert_eq!(buf.len(), 10);
    }

    #[test]
    fn read_line_without_terminator_errors_and_leaves_buffer_untouched() {
        let mut buf = ChainBuffer::new();
        buf.append(b"no newline here").unwrap();
        assert_eq!(buf.read_line(EolStyle::Lf).unwrap_err(), ChainBufferError::NoTerminator);
        assert_eq!(buf.len(), 15);
    }

    #[test]
    fn search_finds_needle_spanning_a_chain_boundary() {
        let mut buf = ChainBuffer::with_options(ChainBufferOptions { min_chain_size: 4, max_auto_growth: 8 });
        buf.append(b"ab").unwrap();
        buf.append(b"cd").unwrap();
        assert_eq!(buf.search(b"bc"), Some(1));
        assert_eq!(buf.search(b"zz"), None);
        assert_eq!(buf.search(b""), Some(0));
    }

    #[test]
    fn add_buffer_splices_and_empties_source() {
        let mut src = ChainBuffer::new();
        src.append(b"payload").unwrap();
        let mut dst = ChainBuffer::new();
        dst.append(b"prefix-").unwrap();
        dst.add_buffer(&mut src);
        assert!(src.is_empty());
        let mut out = vec![0u8; dst.len()];
        dst.remove(&mut out);
        assert_eq!(out, b"prefix-payload");
    }

    #[test]
    fn remove_to_splits_a_boundary_chain() {
        let mut src = ChainBuffer::with_options(ChainBufferOptions { min_chain_size: 4, max_auto_growth: 8 });
        src.append(b"ab").unwrap();
        src.append(b"cdef").unwrap();
        let mut dst = ChainBuffer::new();
        let moved = src.remove_to(&mut dst, 3).unwrap();
        assert_eq!(moved, 3);
        assert_eq!(src.len(), 3);
        assert_eq!(dst.len(), 3);
        let mut out = vec![0u8; 3];
        dst.remove(&mut out);
        assert_eq!(out, b"abc");
    }

    #[test]
    fn change_callback_sees_old_and_new_len() {
        let mut buf = ChainBuffer::new();
        let seen = std::rc::Rc::new(std::cell::RefCell::new(Vec::new()));
        let seen2 = seen.clone();
        buf.add_callback(move |old, new, _| seen2.borrow_mut().push((old, new)));
        buf.append(b"abc").unwrap();
        buf.drain(1);
        assert_eq!(*seen.borrow(), vec![(0, 3), (3, 2)]);
    }

    #[test]
    fn scatter_read_prep_and_accounting_round_trip() {
        let mut buf = ChainBuffer::new();
        buf.append(b"existing").unwrap();
        {
            let vecs = buf.prepare_read_vectors(16);
            assert!(!vecs.is_empty());
        }
        buf.account_read(5);
        assert_eq!(buf.len(), 13);
    }

    #[test]
    fn gather_write_prep_caps_at_max_bytes() {
        let mut buf = ChainBuffer::with_options(ChainBufferOptions { min_chain_size: 4, max_auto_growth: 8 });
        buf.append(b"ab").unwrap();
        buf.append(b"cd").unwrap();
        buf.append(b"ef").unwrap();
        let vecs = buf.prepare_write_vectors(3);
        let total: usize = vecs.iter().map(|v| v.len()).sum();
        assert_eq!(total, 3);
    }
}
