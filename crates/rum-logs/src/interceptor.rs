// Copyright 2025-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

//! Capturing the process's error stream.
//!
//! [`StreamSource`] is the seam between the collector and the OS: the
//! collector only sees a byte reader and a passthrough writer, so its
//! buffering can be driven by an in-memory source in tests.
//!
//! [`StderrRedirect`] is the real implementation. It keeps a duplicate of the
//! original descriptor for passthrough and points fd 2 at a pipe. On detach
//! it points fd 2 back and closes a wake pipe, so the reader finishes even
//! when child processes still hold the inherited write end.

use crate::error::CollectorError;
use std::io::{ErrorKind, Read, Write};
use tracing::{debug, warn};

pub const READ_BUFFER_SIZE: usize = 2048;

/// The two halves of an active capture.
pub struct Capture {
    /// Bytes written to the captured stream.
    pub reader: Box<dyn Read + Send>,
    /// Where captured bytes are echoed so they stay visible on the console.
    pub passthrough: Box<dyn Write + Send>,
}

pub trait StreamSource: Send {
    /// Starts capturing. Must not be called twice without a `detach` in
    /// between.
    fn attach(&mut self) -> Result<Capture, CollectorError>;

    /// Restores the original stream and ends the capture: the reader returns
    /// what is already buffered, then end-of-stream. A source that is not
    /// attached does nothing.
    fn detach(&mut self) -> Result<(), CollectorError>;
}

/// Blocks on `capture.reader` until end-of-stream, echoing every chunk to
/// the passthrough writer before handing it to `on_chunk`.
pub(crate) fn read_loop(mut capture: Capture, mut on_chunk: impl FnMut(&[u8])) {
    let mut buf = [0u8; READ_BUFFER_SIZE];
    loop {
        match capture.reader.read(&mut buf) {
            Ok(0) => break,
            Ok(n) => {
                let chunk = &buf[..n];
                if let Err(e) = capture.passthrough.write_all(chunk) {
                    debug!("LOGS | Failed to echo captured output: {e}");
                }
                on_chunk(chunk);
            }
            Err(e) if e.kind() == ErrorKind::Interrupted => continue,
            Err(e) => {
                warn!("LOGS | Stopping stderr capture after read error: {e}");
                break;
            }
        }
    }
    debug!("LOGS | Stderr reader stopped");
}

#[cfg(unix)]
pub use self::unix::StderrRedirect;

#[cfg(unix)]
mod unix {
    use super::{Capture, StreamSource};
    use crate::error::CollectorError;
    use std::fs::{File, OpenOptions};
    use std::io::{self, Read};
    use std::os::fd::{AsRawFd, FromRawFd, OwnedFd, RawFd};
    use tracing::error;

    /// Bytes a woken reader still hands out before reporting end-of-stream.
    const DRAIN_LIMIT: usize = 64 * 1024;

    fn redirect_error(op: &'static str) -> CollectorError {
        CollectorError::Redirect {
            op,
            source: io::Error::last_os_error(),
        }
    }

    fn dup(fd: RawFd) -> Result<OwnedFd, CollectorError> {
        let duplicate = unsafe { libc::fcntl(fd, libc::F_DUPFD_CLOEXEC, 0) };
        if duplicate < 0 {
            return Err(redirect_error("dup"));
        }
        // SAFETY: `duplicate` is a freshly opened descriptor owned by nobody else.
        Ok(unsafe { OwnedFd::from_raw_fd(duplicate) })
    }

    #[cfg(any(target_os = "linux", target_os = "android"))]
    fn pipe() -> Result<(OwnedFd, OwnedFd), CollectorError> {
        let mut fds: [libc::c_int; 2] = [-1, -1];
        if unsafe { libc::pipe2(fds.as_mut_ptr(), libc::O_CLOEXEC) } < 0 {
            return Err(redirect_error("pipe2"));
        }
        // SAFETY: pipe2(2) succeeded, both descriptors are open and unowned.
        Ok(unsafe { (OwnedFd::from_raw_fd(fds[0]), OwnedFd::from_raw_fd(fds[1])) })
    }

    #[cfg(not(any(target_os = "linux", target_os = "android")))]
    fn set_cloexec(fd: &OwnedFd) -> Result<(), CollectorError> {
        let flags = unsafe { libc::fcntl(fd.as_raw_fd(), libc::F_GETFD) };
        if flags < 0 {
            return Err(redirect_error("fcntl"));
        }
        if unsafe { libc::fcntl(fd.as_raw_fd(), libc::F_SETFD, flags | libc::FD_CLOEXEC) } < 0 {
            return Err(redirect_error("fcntl"));
        }
        Ok(())
    }

    // No pipe2 here: a fork between pipe and fcntl can leak both ends.
    #[cfg(not(any(target_os = "linux", target_os = "android")))]
    fn pipe() -> Result<(OwnedFd, OwnedFd), CollectorError> {
        let mut fds: [libc::c_int; 2] = [-1, -1];
        if unsafe { libc::pipe(fds.as_mut_ptr()) } < 0 {
            return Err(redirect_error("pipe"));
        }
        // SAFETY: pipe(2) succeeded, both descriptors are open and unowned.
        let (read_end, write_end) =
            unsafe { (OwnedFd::from_raw_fd(fds[0]), OwnedFd::from_raw_fd(fds[1])) };
        set_cloexec(&read_end)?;
        set_cloexec(&write_end)?;
        Ok((read_end, write_end))
    }

    /// Points `target` at /dev/null. Whatever it referred to is released and
    /// the descriptor number stays taken.
    fn release_target(target: RawFd) -> io::Result<()> {
        let null = OpenOptions::new().write(true).open("/dev/null")?;
        if unsafe { libc::dup2(null.as_raw_fd(), target) } < 0 {
            return Err(io::Error::last_os_error());
        }
        Ok(())
    }

    /// Read side of the capture pipe.
    ///
    /// Blocks until the pipe has data or the wake pipe is closed. Once woken
    /// it stops blocking: bytes already in the pipe (up to [`DRAIN_LIMIT`])
    /// are returned, then end-of-stream, even if a child process still holds
    /// an inherited copy of the write end.
    struct PipeReader {
        pipe: File,
        wake: OwnedFd,
        drain_budget: Option<usize>,
    }

    impl PipeReader {
        /// Returns true once the wake pipe has been closed.
        fn wait(&self) -> io::Result<bool> {
            let mut fds = [
                libc::pollfd {
                    fd: self.pipe.as_raw_fd(),
                    events: libc::POLLIN,
                    revents: 0,
                },
                libc::pollfd {
                    fd: self.wake.as_raw_fd(),
                    events: libc::POLLIN,
                    revents: 0,
                },
            ];
            if unsafe { libc::poll(fds.as_mut_ptr(), fds.len() as libc::nfds_t, -1) } < 0 {
                return Err(io::Error::last_os_error());
            }
            Ok(fds[1].revents != 0)
        }

        fn set_nonblocking(&self) -> io::Result<()> {
            let fd = self.pipe.as_raw_fd();
            let flags = unsafe { libc::fcntl(fd, libc::F_GETFL) };
            if flags < 0 {
                return Err(io::Error::last_os_error());
            }
            if unsafe { libc::fcntl(fd, libc::F_SETFL, flags | libc::O_NONBLOCK) } < 0 {
                return Err(io::Error::last_os_error());
            }
            Ok(())
        }
    }

    impl Read for PipeReader {
        fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
            let budget = match self.drain_budget {
                Some(budget) => budget,
                None => {
                    if !self.wait()? {
                        return self.pipe.read(buf);
                    }
                    self.set_nonblocking()?;
                    self.drain_budget = Some(DRAIN_LIMIT);
                    DRAIN_LIMIT
                }
            };

            let len = buf.len().min(budget);
            if len == 0 {
                return Ok(0);
            }
            match self.pipe.read(&mut buf[..len]) {
                Ok(n) => {
                    self.drain_budget = Some(budget - n);
                    Ok(n)
                }
                Err(e) if e.kind() == io::ErrorKind::WouldBlock => {
                    self.drain_budget = Some(0);
                    Ok(0)
                }
                Err(e) => Err(e),
            }
        }
    }

    struct Redirected {
        saved: OwnedFd,
        write_end: OwnedFd,
        /// Closing this wakes the reader.
        wake: OwnedFd,
    }

    /// Redirects a descriptor (fd 2 unless told otherwise) into a pipe.
    pub struct StderrRedirect {
        target: RawFd,
        redirected: Option<Redirected>,
    }

    impl Default for StderrRedirect {
        fn default() -> Self {
            Self::new()
        }
    }

    impl StderrRedirect {
        #[must_use]
        pub fn new() -> Self {
            Self::with_target(libc::STDERR_FILENO)
        }

        /// Captures `target` instead of fd 2. The caller keeps ownership of
        /// `target` and must keep it open while attached.
        #[must_use]
        pub fn with_target(target: RawFd) -> Self {
            Self {
                target,
                redirected: None,
            }
        }

        pub fn is_attached(&self) -> bool {
            self.redirected.is_some()
        }
    }

    impl StreamSource for StderrRedirect {
        fn attach(&mut self) -> Result<Capture, CollectorError> {
            if self.redirected.is_some() {
                return Err(CollectorError::AlreadyStarted);
            }

            let saved = dup(self.target)?;
            let passthrough = saved.try_clone().map_err(|source| CollectorError::Redirect {
                op: "dup",
                source,
            })?;
            let (read_end, write_end) = pipe()?;
            let (wake_read, wake) = pipe()?;

            if unsafe { libc::dup2(write_end.as_raw_fd(), self.target) } < 0 {
                return Err(redirect_error("dup2"));
            }

            self.redirected = Some(Redirected {
                saved,
                write_end,
                wake,
            });
            Ok(Capture {
                reader: Box::new(PipeReader {
                    pipe: File::from(read_end),
                    wake: wake_read,
                    drain_budget: None,
                }),
                passthrough: Box::new(File::from(passthrough)),
            })
        }

        fn detach(&mut self) -> Result<(), CollectorError> {
            let Some(redirected) = self.redirected.take() else {
                return Ok(());
            };

            let result = unsafe { libc::dup2(redirected.saved.as_raw_fd(), self.target) };
            let restored = if result < 0 {
                let error = redirect_error("dup2");
                if let Err(e) = release_target(self.target) {
                    error!("LOGS | Failed to point fd {} at /dev/null: {e}", self.target);
                }
                Err(error)
            } else {
                Ok(())
            };

            drop(redirected.write_end);
            drop(redirected.saved);
            drop(redirected.wake);
            restored
        }
    }

    impl Drop for StderrRedirect {
        fn drop(&mut self) {
            if let Err(e) = self.detach() {
                error!("LOGS | Failed to restore fd {}: {e}", self.target);
            }
        }
    }

}
