//! A single contiguous heap region with prefix/valid/suffix cursors.
//!
//! Useful bytes of a [`Chain`] live in `[misalign, misalign + off)`. Bytes
//! before `misalign` are spare prefix room reusable by a cheap `prepend`;
//! bytes after `misalign + off` are spare trailing room reusable by
//! `append`.

pub(crate) struct Chain {
    data: Vec<u8>,
    misalign: usize,
    off: usize,
}

impl Chain {
    /// Allocate a chain whose capacity is the next power of two at or
    /// above `requested`, floored at `min_size`.
    ///
    /// Mirrors `evbuffer_chain_new`: the original rounds `requested +
    /// EVBUFFER_CHAIN_SIZE` (the struct header) up to a power of two. A
    /// `Vec<u8>`-backed chain has no co-allocated header, so we round the
    /// payload size directly; see `DESIGN.md` for the rationale.
    ///
    /// Fallible: uses `try_reserve_exact` so a caller can roll back on
    /// allocation failure instead of aborting the process.
    pub(crate) fn try_new_sized(requested: usize, min_size: usize) -> Result<Self, ()> {
        let mut capacity = min_size.max(1);
        while capacity < requested {
            capacity <<= 1;
        }
        let mut data = Vec::new();
        data.try_reserve_exact(capacity).map_err(|_| ())?;
        data.resize(capacity, 0);
        Ok(Chain { data, misalign: 0, off: 0 })
    }

    /// Sizing for an append-driven chain growth: `max(requested, min(2 *
    /// previous_capacity, max_growth))`, then rounded to a power of two by
    /// [`Chain::try_new_sized`].
    pub(crate) fn try_new_grown(
        requested: usize,
        previous_capacity: usize,
        min_size: usize,
        max_growth: usize,
    ) -> Result<Self, ()> {
        let grown = (previous_capacity.saturating_mul(2)).min(max_growth);
        Self::try_new_sized(requested.max(grown), min_size)
    }

    #[cfg(test)]
    pub(crate) fn new_sized(requested: usize, min_size: usize) -> Self {
        Self::try_new_sized(requested, min_size).expect("test allocation should not fail")
    }

    #[cfg(test)]
    pub(crate) fn new_grown(requested: usize, previous_capacity: usize, min_size: usize, max_growth: usize) -> Self {
        Self::try_new_grown(requested, previous_capacity, min_size, max_growth)
            .expect("test allocation should not fail")
    }

    pub(crate) fn buffer_len(&self) -> usize {
        self.data.len()
    }

    pub(crate) fn off(&self) -> usize {
        self.off
    }

    pub(crate) fn misalign(&self) -> usize {
        self.misalign
    }

    pub(crate) fn is_empty(&self) -> bool {
        self.off == 0
    }

    /// Bytes of free room after the valid region.
    pub(crate) fn trailing_space(&self) -> usize {
        self.data.len() - self.misalign - self.off
    }

    pub(crate) fn valid(&self) -> &[u8] {
        &self.data[self.misalign..self.misalign + self.off]
    }

    pub(crate) fn valid_mut(&mut self) -> &mut [u8] {
        &mut self.data[self.misalign..self.misalign + self.off]
    }

    pub(crate) fn trailing_space_mut(&mut self) -> &mut [u8] {
        let start = self.misalign + self.off;
        &mut self.data[start..]
    }

    /// Copy `bytes` into trailing space. Caller guarantees
    /// `bytes.len() <= trailing_space()`.
    pub(crate) fn append_bytes(&mut self, bytes: &[u8]) {
        let start = self.misalign + self.off;
        self.data[start..start + bytes.len()].copy_from_slice(bytes);
        self.off += bytes.len();
    }

    /// Copy `bytes` into prefix space, growing `off` backwards. Caller
    /// guarantees `bytes.len() <= misalign`.
    pub(crate) fn prepend_bytes(&mut self, bytes: &[u8]) {
        self.misalign -= bytes.len();
        self.data[self.misalign..self.misalign + bytes.len()].copy_from_slice(bytes);
        self.off += bytes.len();
    }

    /// Collapse `misalign` to zero, shifting valid bytes to the start of
    /// the backing storage and reclaiming the prefix as trailing room.
    pub(crate) fn realign(&mut self) {
        if self.misalign == 0 {
            return;
        }
        self.data.copy_within(self.misalign..self.misalign + self.off, 0);
        self.misalign = 0;
    }

    /// Consume `n` bytes from the front of the valid region.
    pub(crate) fn consume_front(&mut self, n: usize) {
        debug_assert!(n <= self.off);
        self.misalign += n;
        self.off -= n;
    }

    /// Consume `n` bytes from the back of the valid region (used when
    /// splicing a boundary chain into another buffer).
    pub(crate) fn truncate_back(&mut self, n: usize) {
        debug_assert!(n <= self.off);
        self.off -= n;
    }

    /// Grow `off` by `n` after bytes were written directly into the
    /// trailing space (used by `commit` and `account_read`).
    pub(crate) fn grow_off(&mut self, n: usize) {
        debug_assert!(self.misalign + self.off + n <= self.data.len());
        self.off += n;
    }

    pub(crate) fn set_off(&mut self, off: usize) {
        debug_assert!(self.misalign + off <= self.data.len());
        self.off = off;
    }

    /// Write `bytes` at an absolute offset into the backing storage,
    /// bypassing `misalign`/`off` bookkeeping. Used by `pullup` while
    /// consolidating several chains into one.
    pub(crate) fn write_at(&mut self, pos: usize, bytes: &[u8]) {
        self.data[pos..pos + bytes.len()].copy_from_slice(bytes);
    }

    /// A new chain initialized so that the prefix fills the whole buffer
    /// except for `len` bytes at the end, ready for `prepend_bytes`.
    pub(crate) fn try_new_for_prepend(len: usize, min_size: usize) -> Result<Self, ()> {
        let mut chain = Self::try_new_sized(len, min_size)?;
        chain.misalign = chain.data.len() - len;
        Ok(chain)
    }

    #[cfg(test)]
    pub(crate) fn new_for_prepend(len: usize, min_size: usize) -> Self {
        Self::try_new_for_prepend(len, min_size).expect("test allocation should not fail")
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{MAX_AUTO_GROWTH, MIN_CHAIN_SIZE};

    #[test]
    fn new_sized_rounds_up_to_power_of_two_with_floor() {
        assert_eq!(Chain::new_sized(1, MIN_CHAIN_SIZE).buffer_len(), MIN_CHAIN_SIZE);
        assert_eq!(Chain::new_sized(MIN_CHAIN_SIZE, MIN_CHAIN_SIZE).buffer_len(), MIN_CHAIN_SIZE);
        assert_eq!(
            Chain::new_sized(MIN_CHAIN_SIZE + 1, MIN_CHAIN_SIZE).buffer_len(),
            MIN_CHAIN_SIZE * 2
        );
        assert_eq!(Chain::new_sized(1000, MIN_CHAIN_SIZE).buffer_len(), 1024);
    }

    #[test]
    fn new_grown_caps_auto_growth() {
        let c = Chain::new_grown(10, MAX_AUTO_GROWTH * 4, MIN_CHAIN_SIZE, MAX_AUTO_GROWTH);
        assert_eq!(c.buffer_len(), MAX_AUTO_GROWTH);
    }

    #[test]
    fn realign_reclaims_prefix_as_trailing_space() {
        let mut chain = Chain::new_for_prepend(4, MIN_CHAIN_SIZE);
        chain.prepend_bytes(b"abcd");
        assert_eq!(chain.misalign(), 0);
        chain.consume_front(4);
        assert_eq!(chain.off(), 0);
        assert!(chain.misalign() > 0);
        let before = chain.trailing_space();
        chain.realign();
        assert_eq!(chain.misalign(), 0);
        assert!(chain.trailing_space() > before);
    }
}
