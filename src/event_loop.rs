//! Deadline-bounded readiness multiplexer over epoll.
//!
//! Every wait is bounded so callers can interleave "wait for input" with
//! periodic checks that must run even when nothing arrives.

use crate::error::{Error, Result};
use crate::signal::CancelFlag;
use std::cell::Cell;
use std::os::unix::io::{AsRawFd, FromRawFd, OwnedFd, RawFd};
use std::time::{Duration, Instant};

const MAX_EVENTS: usize = 8;

pub struct EventLoop {
    epoll: OwnedFd,
    running: Cell<bool>,
    cancel: CancelFlag,
}

impl EventLoop {
    pub fn new(cancel: CancelFlag) -> Result<Self> {
        let fd = unsafe { libc::epoll_create1(libc::EPOLL_CLOEXEC) };
        if fd < 0 {
            return Err(Error::EventLoop(format!(
                "could not create epoll instance: {}",
                std::io::Error::last_os_error()
            )));
        }

        Ok(EventLoop {
            epoll: unsafe { OwnedFd::from_raw_fd(fd) },
            running: Cell::new(false),
            cancel,
        })
    }

    /// Watch `fd` for readability
    pub fn add(&self, fd: &impl AsRawFd) -> Result<()> {
        let raw = fd.as_raw_fd();
        let mut event = libc::epoll_event {
            events: libc::EPOLLIN as u32,
            u64: raw as u64,
        };

        let ret = unsafe {
            libc::epoll_ctl(self.epoll.as_raw_fd(), libc::EPOLL_CTL_ADD, raw, &mut event)
        };
        if ret < 0 {
            return Err(Error::EventLoop(format!(
                "could not register fd {}: {}",
                raw,
                std::io::Error::last_os_error()
            )));
        }
        Ok(())
    }

    /// Wait once for readiness, calling `on_ready` for every ready fd.
    ///
    /// `None` waits without a deadline. Returns whether anything fired; an
    /// interrupted wait counts as nothing fired.
    pub fn run_once<F>(&self, mut on_ready: F, timeout: Option<Duration>) -> Result<bool>
    where
        F: FnMut(RawFd) -> Result<()>,
    {
        let mut events = [libc::epoll_event { events: 0, u64: 0 }; MAX_EVENTS];
        let ret = unsafe {
            libc::epoll_wait(
                self.epoll.as_raw_fd(),
                events.as_mut_ptr(),
                MAX_EVENTS as libc::c_int,
                timeout_ms(timeout),
            )
        };

        if ret < 0 {
            let err = std::io::Error::last_os_error();
            if err.raw_os_error() == Some(libc::EINTR) {
                return Ok(false);
            }
            return Err(Error::EventLoop(format!("epoll_wait failed: {}", err)));
        }

        for event in &events[..ret as usize] {
            let fd = event.u64 as RawFd;
            on_ready(fd)?;
        }

        Ok(ret > 0)
    }

    /// Dispatch readiness until `duration` elapses, then call `on_timeout`
    /// once.
    ///
    /// Returns early, without `on_timeout`, when stopped or cancelled.
    pub fn run_for<F, T>(&self, duration: Duration, mut on_ready: F, on_timeout: T) -> Result<()>
    where
        F: FnMut(RawFd) -> Result<()>,
        T: FnOnce(),
    {
        // A deadline past what Instant can represent never expires
        let deadline = Instant::now().checked_add(duration);
        self.running.set(true);

        loop {
            if !self.running.get() || self.cancel.is_cancelled() {
                return Ok(());
            }

            let remaining = match deadline {
                Some(deadline) => {
                    let now = Instant::now();
                    if now >= deadline {
                        on_timeout();
                        return Ok(());
                    }
                    Some(deadline - now)
                }
                None => None,
            };

            self.run_once(&mut on_ready, remaining)?;
        }
    }

    /// Dispatch readiness with no deadline until stopped or cancelled
    pub fn run_forever<F>(&self, mut on_ready: F) -> Result<()>
    where
        F: FnMut(RawFd) -> Result<()>,
    {
        self.running.set(true);

        while self.running.get() && !self.cancel.is_cancelled() {
            self.run_once(&mut on_ready, None)?;
        }
        Ok(())
    }

    /// Ask the running loop to return at its next check
    pub fn stop(&self) {
        self.running.set(false);
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancel.is_cancelled()
    }
}

/// epoll timeout in milliseconds, rounded up so a short remainder does not
/// turn into a busy poll
fn timeout_ms(timeout: Option<Duration>) -> libc::c_int {
    match timeout {
        None => -1,
        Some(t) => {
            let ms = t.as_micros().div_ceil(1000);
            ms.min(libc::c_int::MAX as u128) as libc::c_int
        }
    }
}
