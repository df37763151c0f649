bitflags::bitflags! {
    /// Direction/condition bits shared by `enable`/`disable`, the error
    /// callback, and `flush`. Mirrors libevent's `EV_READ`/`EV_WRITE`/
    /// `EVBUFFER_*` flags collapsed into one bitset.
    #[repr(transparent)]
    #[derive(Clone, Copy, Debug, PartialEq, Eq)]
    pub struct EventFlags: u8 {
        const READ      = 1 << 0;
        const WRITE     = 1 << 1;
        const TIMEOUT   = 1 << 2;
        const EOF       = 1 << 3;
        const ERROR     = 1 << 4;
        const CONNECTED = 1 << 5;
    }
}

/// How aggressively `flush` should push buffered data through a transport.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FlushMode {
    /// Only do work that would happen anyway (respecting watermarks and
    /// the enabled/disabled state).
    Normal,
    /// Push as much as possible right now, ignoring watermarks, but leave
    /// the bufferevent usable afterwards.
    Flush,
    /// Like `Flush`, but the bufferevent is being torn down: a filter
    /// transport treats an exhausted underlying input buffer as final.
    Finished,
}
