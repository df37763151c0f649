//! Socket-backed [`crate::transport::Transport`], grounded on
//! `flux_network::tcp::stream::TcpStream` and
//! `flux_network::tcp::connector::ConnectionManager`'s `mio::Poll`/
//! `Registry`/`Token` handling.

use std::io::{self, Read, Write};
use std::net::Shutdown;
use std::os::fd::AsRawFd;

use chain_buffer::{ChainBuffer, DEFAULT_READ_QUANTUM};
use mio::{Interest, Token};
use tracing::debug;

use super::{FlushOutcome, IoOutcome, Transport};
use crate::error::BufferedEventError;
use crate::flags::{EventFlags, FlushMode};

/// Registration surface a [`SocketTransport`] needs from an event loop.
/// Abstracts over `mio::Registry` so tests can substitute a fake reactor
/// without binding a real socket.
pub trait Reactor {
    fn register_fd(&self, stream: &mut mio::net::TcpStream, token: Token, interest: Interest) -> io::Result<()>;
    fn reregister_fd(&self, stream: &mut mio::net::TcpStream, token: Token, interest: Interest) -> io::Result<()>;
    fn cancel(&self, stream: &mut mio::net::TcpStream, token: Token) -> io::Result<()>;
    /// mio has no notion of event priority; implementations that don't
    /// support it can no-op. Kept in the trait because libevent's socket
    /// ops expose `bufferevent_priority_set` and a caller porting protocol
    /// code built on this crate may still want the knob available.
    fn set_priority(&self, _token: Token, _priority: u8) {}
    fn is_pending(&self, token: Token, interest: Interest) -> bool;
}

/// `mio::Registry`-backed [`Reactor`].
pub struct MioReactor {
    registry: mio::Registry,
    pending: std::cell::RefCell<std::collections::HashMap<Token, Interest>>,
}

impl MioReactor {
    pub fn new(registry: mio::Registry) -> Self {
        MioReactor { registry, pending: std::cell::RefCell::new(std::collections::HashMap::new()) }
    }
}

impl Reactor for MioReactor {
    fn register_fd(&self, stream: &mut mio::net::TcpStream, token: Token, interest: Interest) -> io::Result<()> {
        self.registry.register(stream, token, interest)?;
        self.pending.borrow_mut().insert(token, interest);
        Ok(())
    }

    fn reregister_fd(&self, stream: &mut mio::net::TcpStream, token: Token, interest: Interest) -> io::Result<()> {
        self.registry.reregister(stream, token, interest)?;
        self.pending.borrow_mut().insert(token, interest);
        Ok(())
    }

    fn cancel(&self, stream: &mut mio::net::TcpStream, token: Token) -> io::Result<()> {
        self.registry.deregister(stream)?;
        self.pending.borrow_mut().remove(&token);
        Ok(())
    }

    fn is_pending(&self, token: Token, interest: Interest) -> bool {
        self.pending
            .borrow()
            .get(&token)
            .is_some_and(|i| (i.is_readable() && interest.is_readable()) || (i.is_writable() && interest.is_writable()))
    }
}

/// Config knobs for [`SocketTransport::new`].
#[derive(Debug, Clone, Copy, Default)]
pub struct SocketTransportOptions {
    /// Shut the socket down on drop (the fd itself always closes via Rust
    /// ownership; this controls whether we proactively send a FIN instead
    /// of leaving that to whenever the kernel reclaims the descriptor).
    pub close_on_free: bool,
    pub recv_buf_size: Option<usize>,
    pub send_buf_size: Option<usize>,
    /// Reserved: batching callback dispatch across a whole reactor pass
    /// isn't implemented yet. Accepted for API parity so callers converting
    /// from a bufferevent-shaped config struct have somewhere to put it.
    pub defer_callbacks: bool,
}

/// Drives a `mio::net::TcpStream` as a [`crate::BufferedEvent`] transport.
pub struct SocketTransport<R: Reactor> {
    stream: mio::net::TcpStream,
    token: Token,
    reactor: R,
    read_armed: bool,
    write_armed: bool,
    registered: bool,
    close_on_free: bool,
}

impl<R: Reactor> SocketTransport<R> {
    pub fn new(
        stream: mio::net::TcpStream,
        token: Token,
        reactor: R,
        options: SocketTransportOptions,
    ) -> Result<Self, BufferedEventError> {
        stream.set_nodelay(true)?;
        if let Some(size) = options.send_buf_size.or(options.recv_buf_size) {
            set_socket_buf_size(&stream, size);
        }
        Ok(SocketTransport {
            stream,
            token,
            reactor,
            read_armed: false,
            write_armed: false,
            registered: false,
            close_on_free: options.close_on_free,
        })
    }

    fn sync_interest(&mut self) -> Result<(), BufferedEventError> {
        let interest = match (self.read_armed, self.write_armed) {
            (false, false) => None,
            (true, false) => Some(Interest::READABLE),
            (false, true) => Some(Interest::WRITABLE),
            (true, true) => Some(Interest::READABLE | Interest::WRITABLE),
        };
        match (interest, self.registered) {
            (None, true) => {
                self.reactor.cancel(&mut self.stream, self.token).map_err(BufferedEventError::Reactor)?;
                self.registered = false;
            }
            (None, false) => {}
            (Some(i), false) => {
                self.reactor.register_fd(&mut self.stream, self.token, i).map_err(BufferedEventError::Reactor)?;
                self.registered = true;
            }
            (Some(i), true) => {
                self.reactor.reregister_fd(&mut self.stream, self.token, i).map_err(BufferedEventError::Reactor)?;
            }
        }
        Ok(())
    }
}

impl<R: Reactor> Transport for SocketTransport<R> {
    fn enable(&mut self, flags: EventFlags) -> Result<(), BufferedEventError> {
        if flags.contains(EventFlags::READ) {
            self.read_armed = true;
        }
        if flags.contains(EventFlags::WRITE) {
            self.write_armed = true;
        }
        self.sync_interest()
    }

    fn disable(&mut self, flags: EventFlags) -> Result<(), BufferedEventError> {
        if flags.contains(EventFlags::READ) {
            self.read_armed = false;
        }
        if flags.contains(EventFlags::WRITE) {
            self.write_armed = false;
        }
        self.sync_interest()
    }

    fn do_read(&mut self, input: &mut ChainBuffer, max: usize) -> Result<IoOutcome, BufferedEventError> {
        let quantum = max.min(DEFAULT_READ_QUANTUM).max(1);
        let mut vecs = input.prepare_read_vectors(quantum);
        let result = self.stream.read_vectored(&mut vecs);
        drop(vecs);
        match result {
            Ok(0) => Ok(IoOutcome::Eof),
            Ok(n) => {
                input.account_read(n);
                Ok(IoOutcome::Progress(n))
            }
            Err(e) if matches!(e.kind(), io::ErrorKind::WouldBlock | io::ErrorKind::Interrupted) => {
                Ok(IoOutcome::WouldBlock)
            }
            Err(e) => {
                debug!(err = ?e, "socket transport read failed");
                Err(BufferedEventError::Io(e))
            }
        }
    }

    fn do_write(&mut self, output: &mut ChainBuffer) -> Result<IoOutcome, BufferedEventError> {
        if output.is_empty() {
            return Ok(IoOutcome::Progress(0));
        }
        let vecs = output.prepare_write_vectors(output.len());
        let result = self.stream.write_vectored(&vecs);
        drop(vecs);
        match result {
            Ok(0) => Ok(IoOutcome::Eof),
            Ok(n) => {
                output.drain(n);
                Ok(IoOutcome::Progress(n))
            }
            Err(e) if matches!(e.kind(), io::ErrorKind::WouldBlock | io::ErrorKind::Interrupted) => {
                Ok(IoOutcome::WouldBlock)
            }
            Err(e) => {
                debug!(err = ?e, "socket transport write failed");
                Err(BufferedEventError::Io(e))
            }
        }
    }

    fn flush(
        &mut self,
        iotype: EventFlags,
        mode: FlushMode,
        _input: &mut ChainBuffer,
        output: &mut ChainBuffer,
    ) -> Result<FlushOutcome, BufferedEventError> {
        if !iotype.contains(EventFlags::WRITE) || mode == FlushMode::Normal {
            return Ok(FlushOutcome { moved: 0, eof: false });
        }
        let mut moved = 0;
        loop {
            match self.do_write(output)? {
                IoOutcome::Progress(0) | IoOutcome::WouldBlock => break,
                IoOutcome::Progress(n) => moved += n,
                IoOutcome::Eof => return Ok(FlushOutcome { moved, eof: true }),
            }
            if output.is_empty() {
                break;
            }
        }
        Ok(FlushOutcome { moved, eof: false })
    }
}

impl<R: Reactor> Drop for SocketTransport<R> {
    fn drop(&mut self) {
        if self.registered {
            let _ = self.reactor.cancel(&mut self.stream, self.token);
        }
        if self.close_on_free {
            let _ = self.stream.shutdown(Shutdown::Both);
        }
    }
}

/// Set kernel `SO_SNDBUF`/`SO_RCVBUF` on a mio `TcpStream`.
pub fn set_socket_buf_size(stream: &mio::net::TcpStream, size: usize) {
    let fd = stream.as_raw_fd();
    let size = size as libc::c_int;
    unsafe {
        libc::setsockopt(
            fd,
            libc::SOL_SOCKET,
            libc::SO_SNDBUF,
            std::ptr::addr_of!(size).cast(),
            core::mem::size_of::<libc::c_int>() as libc::socklen_t,
        );
        libc::setsockopt(
            fd,
            libc::SOL_SOCKET,
            libc::SO_RCVBUF,
            std::ptr::addr_of!(size).cast(),
            core::mem::size_of::<libc::c_int>() as libc::socklen_t,
        );
    }
}
