//! Listening endpoint bound to a filesystem path.
//!
//! The listener refuses a path that already exists (a second daemon must not
//! steal the socket of a running one) and unlinks the path again when it is
//! dropped, on every exit path.

use std::io;
use std::os::fd::{AsFd, AsRawFd, BorrowedFd};
use std::os::unix::net::{UnixListener, UnixStream};
use std::path::{Path, PathBuf};

use nix::sys::socket::{bind, listen, socket, AddressFamily, Backlog, SockFlag, SockType, UnixAddr};
use thiserror::Error;
use tracing::warn;

#[derive(Debug, Error)]
pub enum ListenError {
    #[error("socket path {0} is already taken")]
    PathTaken(PathBuf),

    #[error("failed to set up socket: {0}")]
    Os(#[from] nix::errno::Errno),

    #[error("failed to set up socket: {0}")]
    Io(#[from] io::Error),
}

/// Non-blocking listening socket that owns its filesystem path.
#[derive(Debug)]
pub struct Listener {
    listener: UnixListener,
    path: PathBuf,
}

impl Listener {
    /// Bind and listen on `path` with the platform-maximum backlog.
    pub fn bind(path: impl AsRef<Path>) -> Result<Self, ListenError> {
        let path = path.as_ref().to_path_buf();

        if path.exists() {
            return Err(ListenError::PathTaken(path));
        }

        let fd = socket(
            AddressFamily::Unix,
            SockType::Stream,
            SockFlag::SOCK_CLOEXEC,
            None,
        )?;
        let addr = UnixAddr::new(&path)?;
        bind(fd.as_raw_fd(), &addr)?;
        listen(&fd, Backlog::MAXCONN)?;

        let listener = UnixListener::from(fd);
        listener.set_nonblocking(true)?;

        Ok(Listener { listener, path })
    }

    /// Accept one pending connection, `None` when the queue is drained.
    pub fn accept(&self) -> io::Result<Option<UnixStream>> {
        match self.listener.accept() {
            Ok((stream, _)) => Ok(Some(stream)),
            Err(e) if e.kind() == io::ErrorKind::WouldBlock => Ok(None),
            Err(e) => Err(e),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl AsFd for Listener {
    fn as_fd(&self) -> BorrowedFd<'_> {
        self.listener.as_fd()
    }
}

impl Drop for Listener {
    fn drop(&mut self) {
        if let Err(e) = std::fs::remove_file(&self.path) {
            warn!(path = %self.path.display(), error = %e, "failed to unlink socket path");
        }
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn bind_creates_and_drop_removes_the_path() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("tetris.sock");

        let listener = Listener::bind(&path).unwrap();
        assert!(path.exists());

        drop(listener);
        assert!(!path.exists());
    }

    #[test]
    fn taken_path_is_refused() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("tetris.sock");

        let _first = Listener::bind(&path).unwrap();
        assert!(matches!(
            Listener::bind(&path),
            Err(ListenError::PathTaken(_))
        ));
    }

    #[test]
    fn accept_is_nonblocking() {
        let dir = tempdir().unwrap();
        let listener = Listener::bind(dir.path().join("tetris.sock")).unwrap();

        assert!(listener.accept().unwrap().is_none());
    }

    #[test]
    fn accept_returns_pending_connections() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("tetris.sock");
        let listener = Listener::bind(&path).unwrap();

        let _client = UnixStream::connect(&path).unwrap();
        assert!(listener.accept().unwrap().is_some());
        assert!(listener.accept().unwrap().is_none());
    }
}
