//! Pseudo-terminal endpoint standing in for the guest's serial port.
//!
//! The bridge keeps the master side; the emulator is pointed at the slave
//! device path. The slave descriptor stays open for the endpoint's lifetime
//! so reads on the master never hit EIO while the emulator is detached.
//! Both descriptors are closed when the endpoint is dropped.

use std::fs::File;
use std::io::{self, Read, Write};
use std::os::fd::{AsRawFd, OwnedFd};
use std::path::{Path, PathBuf};
use std::pin::Pin;
use std::task::{ready, Context, Poll};

use nix::fcntl::{fcntl, FcntlArg, OFlag};
use nix::pty::{openpty, OpenptyResult};
use nix::sys::termios::{cfmakeraw, tcgetattr, tcsetattr, SetArg};
use nix::unistd::ttyname;
use tokio::io::unix::AsyncFd;
use tokio::io::{AsyncRead, AsyncWrite, ReadBuf};

use crate::error::Result;

pub struct PtyEndpoint {
    master: AsyncFd<File>,
    _slave: OwnedFd,
    slave_path: PathBuf,
}

impl PtyEndpoint {
    /// Allocate a PTY pair, put the slave in raw mode and register the
    /// master with the tokio reactor. Must be called inside a runtime.
    pub fn open() -> Result<Self> {
        let OpenptyResult { master, slave } = openpty(None, None)?;
        let slave_path = ttyname(&slave)?;

        // Raw mode: no echo of our replies back as input, no newline rewriting.
        let mut attrs = tcgetattr(&slave)?;
        cfmakeraw(&mut attrs);
        tcsetattr(&slave, SetArg::TCSANOW, &attrs)?;

        let flags = OFlag::from_bits_truncate(fcntl(master.as_raw_fd(), FcntlArg::F_GETFL)?);
        fcntl(master.as_raw_fd(), FcntlArg::F_SETFL(flags | OFlag::O_NONBLOCK))?;

        let master = AsyncFd::new(File::from(master))?;
        tracing::debug!(slave = %slave_path.display(), "PTY pair opened");
        Ok(Self { master, _slave: slave, slave_path })
    }

    /// Device path the emulator's serial port should be attached to.
    pub fn slave_path(&self) -> &Path {
        &self.slave_path
    }
}

impl AsyncRead for PtyEndpoint {
    fn poll_read(
        self: Pin<&mut Self>,
        cx: &mut Context<'_>,
        buf: &mut ReadBuf<'_>,
    ) -> Poll<io::Result<()>> {
        loop {
            let mut guard = ready!(self.master.poll_read_ready(cx))?;
            let unfilled = buf.initialize_unfilled();
            match guard.try_io(|inner| {
                let mut file: &File = inner.get_ref();
                file.read(unfilled)
            }) {
                Ok(Ok(len)) => {
                    buf.advance(len);
                    return Poll::Ready(Ok(()));
                }
                Ok(Err(err)) => return Poll::Ready(Err(err)),
                Err(_would_block) => continue,
            }
        }
    }
}

impl AsyncWrite for PtyEndpoint {
    fn poll_write(
        self: Pin<&mut Self>,
        cx: &mut Context<'_>,
        buf: &[u8],
    ) -> Poll<io::Result<usize>> {
        loop {
            let mut guard = ready!(self.master.poll_write_ready(cx))?;
            match guard.try_io(|inner| {
                let mut file: &File = inner.get_ref();
                file.write(buf)
            }) {
                Ok(result) => return Poll::Ready(result),
                Err(_would_block) => continue,
            }
        }
    }

    fn poll_flush(self: Pin<&mut Self>, _cx: &mut Context<'_>) -> Poll<io::Result<()>> {
        Poll::Ready(Ok(()))
    }

    fn poll_shutdown(self: Pin<&mut Self>, _cx: &mut Context<'_>) -> Poll<io::Result<()>> {
        Poll::Ready(Ok(()))
    }
}
