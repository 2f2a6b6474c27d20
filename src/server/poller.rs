// src/server/poller.rs

//! A thin, level-triggered wrapper around a Linux epoll instance.

use std::io;
use std::os::fd::RawFd;
use std::sync::atomic::{AtomicI32, Ordering};
use tracing::warn;

/// Interest registered for every connection: readable data, and the peer
/// shutting down its write half.
const INTEREST: u32 = (libc::EPOLLIN | libc::EPOLLRDHUP) as u32;

/// Conditions that mean the connection is finished.
const HANGUP: u32 = (libc::EPOLLRDHUP | libc::EPOLLHUP | libc::EPOLLERR) as u32;

/// One readiness notification.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Readiness {
    pub token: u64,
    pub events: u32,
}

impl Readiness {
    /// Half-close, hang-up, or socket error.
    pub fn is_hangup(&self) -> bool {
        self.events & HANGUP != 0
    }

    pub fn is_readable(&self) -> bool {
        self.events & libc::EPOLLIN as u32 != 0
    }
}

/// A reusable buffer that `Poller::wait` fills.
pub struct Events {
    buf: Vec<libc::epoll_event>,
    len: usize,
}

impl Events {
    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            buf: vec![libc::epoll_event { events: 0, u64: 0 }; capacity.max(1)],
            len: 0,
        }
    }

    pub fn len(&self) -> usize {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    pub fn iter(&self) -> impl Iterator<Item = Readiness> + '_ {
        self.buf[..self.len].iter().map(|ev| {
            // Copy out of the (packed on some targets) struct before use.
            let events = ev.events;
            let token = ev.u64;
            Readiness { token, events }
        })
    }
}

/// Owns the epoll descriptor. `close` may race with `ctl` calls from worker
/// threads; once closed, those calls fail with `EBADF` instead of touching a
/// reused descriptor number.
pub struct Poller {
    epfd: AtomicI32,
}

impl Poller {
    pub fn new() -> io::Result<Self> {
        // SAFETY: plain syscall, no pointers involved.
        let fd = unsafe { libc::epoll_create1(libc::EPOLL_CLOEXEC) };
        if fd < 0 {
            return Err(io::Error::last_os_error());
        }
        Ok(Self {
            epfd: AtomicI32::new(fd),
        })
    }

    fn fd(&self) -> io::Result<RawFd> {
        match self.epfd.load(Ordering::Acquire) {
            fd if fd >= 0 => Ok(fd),
            _ => Err(io::Error::from_raw_os_error(libc::EBADF)),
        }
    }

    /// Starts watching `fd`; readiness reports carry `token`.
    pub fn add(&self, fd: RawFd, token: u64) -> io::Result<()> {
        let mut event = libc::epoll_event {
            events: INTEREST,
            u64: token,
        };
        // SAFETY: `event` is a valid, initialized epoll_event for the duration of the call.
        let rc = unsafe { libc::epoll_ctl(self.fd()?, libc::EPOLL_CTL_ADD, fd, &mut event) };
        if rc < 0 {
            return Err(io::Error::last_os_error());
        }
        Ok(())
    }

    pub fn delete(&self, fd: RawFd) -> io::Result<()> {
        // Kernels before 2.6.9 required a non-null event even for DEL.
        let mut event = libc::epoll_event { events: 0, u64: 0 };
        // SAFETY: as in `add`.
        let rc = unsafe { libc::epoll_ctl(self.fd()?, libc::EPOLL_CTL_DEL, fd, &mut event) };
        if rc < 0 {
            return Err(io::Error::last_os_error());
        }
        Ok(())
    }

    /// Waits up to `timeout_ms` (negative blocks indefinitely) and returns the
    /// number of ready events stored in `events`. An interrupted wait reports
    /// zero events.
    pub fn wait(&self, events: &mut Events, timeout_ms: i32) -> io::Result<usize> {
        let capacity = i32::try_from(events.buf.len()).unwrap_or(i32::MAX);
        // SAFETY: the buffer holds `capacity` initialized entries and outlives the call.
        let n = unsafe {
            libc::epoll_wait(self.fd()?, events.buf.as_mut_ptr(), capacity, timeout_ms)
        };
        if n < 0 {
            events.len = 0;
            let err = io::Error::last_os_error();
            if err.kind() == io::ErrorKind::Interrupted {
                return Ok(0);
            }
            return Err(err);
        }
        events.len = n as usize;
        Ok(events.len)
    }

    /// Closes the descriptor. Later calls are no-ops.
    pub fn close(&self) {
        let fd = self.epfd.swap(-1, Ordering::AcqRel);
        if fd >= 0 {
            // SAFETY: `fd` came from epoll_create1 and is closed exactly once thanks to the swap.
            if unsafe { libc::close(fd) } < 0 {
                warn!("Closing epoll fd {} failed: {}", fd, io::Error::last_os_error());
            }
        }
    }

    pub fn is_closed(&self) -> bool {
        self.epfd.load(Ordering::Acquire) < 0
    }
}

impl Drop for Poller {
    fn drop(&mut self) {
        self.close();
    }
}
