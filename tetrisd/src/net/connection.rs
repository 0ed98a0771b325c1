//! Framed record exchange over a local stream socket.
//!
//! A [`Connection`] owns its socket and moves whole fixed-size records (see
//! [`crate::proto`]) in single read/write calls.  Records never fragment on a
//! local stream socket at these sizes, so a short transfer is a protocol
//! error and the peer gets disconnected rather than resynchronised.
//!
//! Two modes:
//! * **blocking** (fresh connections) — `recv` waits for a record, `send`
//!   waits until written.
//! * **non-blocking** (event-loop connections) — `recv` reports
//!   [`Received::Empty`] instead of blocking, `send` reports [`Sent::Retry`].

use std::io::{self, Read, Write};
use std::os::fd::{AsFd, AsRawFd, BorrowedFd, RawFd};
use std::os::unix::net::UnixStream;
use std::path::Path;

use thiserror::Error;

use crate::proto::{Frame, ProtocolError};

/// Outcome of a `recv`.
#[derive(Debug)]
pub enum Received<F> {
    /// A complete record; in non-blocking mode more may be pending.
    Frame(F),
    /// Non-blocking socket has nothing to read right now.
    Empty,
    /// The peer closed the connection.
    Closed,
}

/// Outcome of a `send`.
#[derive(Debug, PartialEq, Eq)]
pub enum Sent {
    Done,
    /// Non-blocking socket cannot take the record right now.
    Retry,
}

#[derive(Debug, Error)]
pub enum ConnectionError {
    /// The peer delivered a fraction of a record.
    #[error("short read: got {got} of {want} bytes")]
    ShortRead { got: usize, want: usize },

    #[error("short write: wrote {wrote} of {want} bytes")]
    ShortWrite { wrote: usize, want: usize },

    #[error(transparent)]
    Protocol(#[from] ProtocolError),

    #[error("socket I/O failed: {0}")]
    Io(#[from] io::Error),
}

/// One connected stream socket with exclusive ownership of its fd.
///
/// Not clonable; the fd is released when the value drops.
#[derive(Debug)]
pub struct Connection {
    stream: UnixStream,
    blocking: bool,
}

impl Connection {
    /// Connect (blocking) to the endpoint at `path`.
    pub fn connect(path: impl AsRef<Path>) -> io::Result<Self> {
        Ok(Connection {
            stream: UnixStream::connect(path)?,
            blocking: true,
        })
    }

    /// Adopt an accepted stream.  The stream is assumed blocking until
    /// [`set_nonblocking`](Self::set_nonblocking) is called.
    pub fn from_stream(stream: UnixStream) -> Self {
        Connection {
            stream,
            blocking: true,
        }
    }

    pub fn set_nonblocking(&mut self) -> io::Result<()> {
        self.stream.set_nonblocking(true)?;
        self.blocking = false;
        Ok(())
    }

    pub fn raw_fd(&self) -> RawFd {
        self.stream.as_raw_fd()
    }

    /// Read exactly one record.
    pub fn recv<F: Frame>(&mut self) -> Result<Received<F>, ConnectionError> {
        let mut buf = vec![0u8; F::LEN];

        loop {
            match self.stream.read(&mut buf) {
                Ok(0) => return Ok(Received::Closed),
                Ok(n) if n == F::LEN => return Ok(Received::Frame(F::decode(&buf)?)),
                Ok(n) => return Err(ConnectionError::ShortRead { got: n, want: F::LEN }),
                Err(e) if e.kind() == io::ErrorKind::WouldBlock && !self.blocking => {
                    return Ok(Received::Empty)
                }
                Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
                Err(e) => return Err(e.into()),
            }
        }
    }

    /// Write exactly one record.
    pub fn send<F: Frame>(&mut self, frame: &F) -> Result<Sent, ConnectionError> {
        let mut buf = vec![0u8; F::LEN];
        frame.encode(&mut buf)?;

        loop {
            match self.stream.write(&buf) {
                Ok(n) if n == F::LEN => return Ok(Sent::Done),
                Ok(n) => {
                    return Err(ConnectionError::ShortWrite {
                        wrote: n,
                        want: F::LEN,
                    })
                }
                Err(e) if e.kind() == io::ErrorKind::WouldBlock && !self.blocking => {
                    return Ok(Sent::Retry)
                }
                Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
                Err(e) => return Err(e.into()),
            }
        }
    }
}

impl AsFd for Connection {
    fn as_fd(&self) -> BorrowedFd<'_> {
        self.stream.as_fd()
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use crate::proto::TetrisData;

    fn pair() -> (Connection, Connection) {
        let (a, b) = UnixStream::pair().unwrap();
        (Connection::from_stream(a), Connection::from_stream(b))
    }

    #[test]
    fn record_crosses_the_socket_intact() {
        let (mut tx, mut rx) = pair();
        let frame = TetrisData::NewThread {
            tid: 7,
            name: "worker".to_string(),
        };

        assert_eq!(tx.send(&frame).unwrap(), Sent::Done);
        match rx.recv::<TetrisData>().unwrap() {
            Received::Frame(received) => assert_eq!(received, frame),
            other => panic!("expected a frame, got {other:?}"),
        }
    }

    #[test]
    fn nonblocking_recv_reports_empty_when_idle() {
        let (_tx, mut rx) = pair();
        rx.set_nonblocking().unwrap();

        assert!(matches!(
            rx.recv::<TetrisData>().unwrap(),
            Received::Empty
        ));
    }

    #[test]
    fn peer_hangup_reports_closed() {
        let (tx, mut rx) = pair();
        drop(tx);

        assert!(matches!(
            rx.recv::<TetrisData>().unwrap(),
            Received::Closed
        ));
    }

    #[test]
    fn queued_records_drain_in_order() {
        let (mut tx, mut rx) = pair();
        for tid in 0..3 {
            tx.send(&TetrisData::NewThread {
                tid,
                name: format!("t{tid}"),
            })
            .unwrap();
        }
        rx.set_nonblocking().unwrap();

        for tid in 0..3 {
            match rx.recv::<TetrisData>().unwrap() {
                Received::Frame(TetrisData::NewThread { tid: got, .. }) => {
                    assert_eq!(got, tid)
                }
                other => panic!("expected NewThread, got {other:?}"),
            }
        }
        assert!(matches!(
            rx.recv::<TetrisData>().unwrap(),
            Received::Empty
        ));
    }
}
