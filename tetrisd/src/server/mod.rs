//! Readiness-driven server core.
//!
//! One thread, one epoll instance, four kinds of file descriptors:
//!
//! | fd | on readiness |
//! |---|---|
//! | client listener | accept until drained, register connections as clients |
//! | control listener | accept, read one `ControlData`, dispatch, close |
//! | signalfd | USR1 → reload mappings, USR2 → dump registry, others → shut down |
//! | client connection | drain records through [`Manager::client_message`] |
//!
//! All monitored fds are non-blocking; the epoll wait is the only place the
//! daemon sleeps.  The manager, the registry and every connection are owned
//! by this thread, so dispatching never contends with anything.

use std::os::fd::{AsFd, AsRawFd, RawFd};
use std::path::PathBuf;

use anyhow::{Context, Result};
use nix::sys::epoll::{Epoll, EpollCreateFlags, EpollEvent, EpollFlags, EpollTimeout};
use nix::sys::signal::{sigprocmask, SigSet, SigmaskHow, Signal};
use nix::sys::signalfd::{SfdFlags, SignalFd};
use tracing::{debug, error, info, warn};

use crate::manager::Manager;
use crate::net::{Connection, Listener, Received};
use crate::proto::{ControlData, CONTROL_SOCKET, SERVER_SOCKET};

/// Upper bound on events taken from one epoll wait.
const MAX_EVENTS: usize = 100;

/// Signals routed through the signalfd.  USR1/USR2 trigger operations, the
/// rest terminate the loop cleanly.
const WATCHED_SIGNALS: [Signal; 7] = [
    Signal::SIGABRT,
    Signal::SIGHUP,
    Signal::SIGINT,
    Signal::SIGQUIT,
    Signal::SIGTERM,
    Signal::SIGUSR1,
    Signal::SIGUSR2,
];

/// Filesystem endpoints the server binds.
#[derive(Debug, Clone)]
pub struct ServerConfig {
    pub client_socket: PathBuf,
    pub control_socket: PathBuf,
}

impl Default for ServerConfig {
    fn default() -> Self {
        ServerConfig {
            client_socket: PathBuf::from(SERVER_SOCKET),
            control_socket: PathBuf::from(CONTROL_SOCKET),
        }
    }
}

/// The daemon core: listeners, signal source, epoll and the manager.
pub struct Server {
    manager: Manager,
    client_listener: Listener,
    control_listener: Listener,
    signals: SignalFd,
    epoll: Epoll,
}

impl Server {
    /// Bind both endpoints, set up signal routing and the epoll instance.
    ///
    /// Failures here are fatal: a daemon that cannot own its endpoints or
    /// its signal source has nothing to offer.
    pub fn bind(config: &ServerConfig, manager: Manager) -> Result<Self> {
        let client_listener =
            Listener::bind(&config.client_socket).context("failed to open server socket")?;
        let control_listener =
            Listener::bind(&config.control_socket).context("failed to open control socket")?;

        info!(
            server = %client_listener.path().display(),
            control = %control_listener.path().display(),
            "endpoints bound"
        );

        let mut mask = SigSet::empty();
        for signal in WATCHED_SIGNALS {
            mask.add(signal);
        }
        // Block delivery first, then receive the signals as fd readiness.
        sigprocmask(SigmaskHow::SIG_BLOCK, Some(&mask), None)
            .context("failed to block signals")?;
        let signals = SignalFd::with_flags(&mask, SfdFlags::SFD_NONBLOCK | SfdFlags::SFD_CLOEXEC)
            .context("failed to create signal fd")?;

        let epoll = Epoll::new(EpollCreateFlags::EPOLL_CLOEXEC)
            .context("failed to initialize epoll")?;
        for fd in [
            client_listener.as_fd().as_raw_fd(),
            control_listener.as_fd().as_raw_fd(),
            signals.as_fd().as_raw_fd(),
        ] {
            let borrowed = unsafe { std::os::fd::BorrowedFd::borrow_raw(fd) };
            epoll
                .add(borrowed, EpollEvent::new(EpollFlags::EPOLLIN, fd as u64))
                .context("failed to register fd with epoll")?;
        }

        Ok(Server {
            manager,
            client_listener,
            control_listener,
            signals,
            epoll,
        })
    }

    /// Run until a terminating signal arrives.
    pub fn run(&mut self) -> Result<()> {
        let client_fd = self.client_listener.as_fd().as_raw_fd();
        let control_fd = self.control_listener.as_fd().as_raw_fd();
        let signal_fd = self.signals.as_fd().as_raw_fd();

        let mut events = [EpollEvent::empty(); MAX_EVENTS];

        loop {
            let n = match self.epoll.wait(&mut events, EpollTimeout::NONE) {
                Ok(n) => n,
                Err(nix::errno::Errno::EINTR) => continue,
                Err(e) => return Err(e).context("epoll wait failed"),
            };

            for event in &events[..n] {
                let fd = event.data() as RawFd;

                if fd == client_fd {
                    self.accept_clients();
                } else if fd == control_fd {
                    self.accept_control();
                } else if fd == signal_fd {
                    if self.drain_signals() {
                        info!("exiting");
                        return Ok(());
                    }
                } else if event.events().contains(EpollFlags::EPOLLIN) {
                    debug!(fd, "client sent a message");
                    if self.manager.client_message(fd) {
                        info!(fd, "client disconnected");
                        self.manager.client_disconnect(fd);
                    }
                } else {
                    // EPOLLHUP / EPOLLERR without readable data.
                    info!(fd, "client disconnected");
                    self.manager.client_disconnect(fd);
                }
            }
        }
    }

    /// Accept pending client connections until the listener is drained.
    fn accept_clients(&mut self) {
        loop {
            match self.client_listener.accept() {
                Ok(Some(stream)) => {
                    let mut connection = Connection::from_stream(stream);
                    if let Err(e) = connection.set_nonblocking() {
                        error!(error = %e, "failed to make connection non-blocking");
                        continue;
                    }

                    let fd = connection.raw_fd();
                    let event = EpollEvent::new(EpollFlags::EPOLLIN, fd as u64);
                    match self.epoll.add(&connection, event) {
                        Ok(()) => {
                            info!(fd, "a new client connected");
                            self.manager.client_connect(fd, connection);
                        }
                        Err(e) => {
                            // Dropping the connection closes the fd.
                            error!(error = %e, "failed to add connection to epoll");
                        }
                    }
                }
                Ok(None) => break,
                Err(e) => {
                    error!(error = %e, "error while accepting a connection");
                    break;
                }
            }
        }
    }

    /// Accept pending control connections; each carries exactly one record.
    fn accept_control(&mut self) {
        loop {
            match self.control_listener.accept() {
                Ok(Some(stream)) => {
                    let mut connection = Connection::from_stream(stream);
                    match connection.recv::<ControlData>() {
                        Ok(Received::Frame(data)) => self.manager.control_message(data),
                        Ok(_) => warn!("control connection closed without a record"),
                        Err(e) => warn!(error = %e, "failed to read control record"),
                    }
                    // The connection drops here; control sessions are single-shot.
                }
                Ok(None) => break,
                Err(e) => {
                    error!(error = %e, "error while accepting a control connection");
                    break;
                }
            }
        }
    }

    /// Drain the signal fd.  Returns `true` when the loop should terminate.
    fn drain_signals(&mut self) -> bool {
        loop {
            match self.signals.read_signal() {
                Ok(Some(siginfo)) => {
                    info!(signal = siginfo.ssi_signo, "received a signal");
                    match Signal::try_from(siginfo.ssi_signo as i32) {
                        Ok(Signal::SIGUSR1) => self.manager.update_mappings(),
                        Ok(Signal::SIGUSR2) => self.manager.dump_registry(),
                        _ => return true,
                    }
                }
                Ok(None) => return false,
                Err(e) => {
                    error!(error = %e, "error reading from signal fd");
                    return false;
                }
            }
        }
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────
