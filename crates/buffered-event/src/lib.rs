//! Watermark-driven duplex stream abstraction over a pair of
//! [`chain_buffer::ChainBuffer`]s, generalizing libevent's `bufferevent`
//! API: a [`BufferedEvent`] moves bytes through a pluggable [`Transport`]
//! (a real socket via [`transport::socket::SocketTransport`], or a
//! transform pipeline via [`transport::filter::FilterTransport`]) while
//! enforcing read/write watermarks and dispatching user callbacks.

mod error;
mod event;
mod flags;
#[cfg(test)]
mod test_support;
mod transport;
mod watermark;

pub use error::BufferedEventError;
pub use event::{BufferedEvent, ErrorCallback, ReadCallback, WriteCallback};
pub use flags::{EventFlags, FlushMode};
pub use transport::filter::{FilterFn, FilterResult, FilterTransport};
pub use transport::socket::{MioReactor, Reactor, SocketTransport, SocketTransportOptions};
pub use transport::{FlushOutcome, IoOutcome, Transport};
pub use watermark::Watermark;
