use std::fmt;
use std::io;
use std::net::{Shutdown, TcpStream};
use std::os::unix::io::AsRawFd;
use std::os::unix::net::UnixStream;
use std::time::Duration;

/// Duplex, blocking byte stream the relay can wait on.
pub trait ByteStream: fmt::Debug + io::Read + io::Write + AsRawFd + Send {
    /// shut down both directions, so every handle to the socket observes the close
    fn close(&self) -> io::Result<()>;
    /// `None` blocks indefinitely
    fn set_rw_timeout(&self, dur: Option<Duration>) -> io::Result<()>;
}

/// byte stream on tcp connection
impl ByteStream for TcpStream {
    fn close(&self) -> io::Result<()> {
        TcpStream::shutdown(self, Shutdown::Both)
    }
    fn set_rw_timeout(&self, dur: Option<Duration>) -> io::Result<()> {
        self.set_read_timeout(dur)?;
        self.set_write_timeout(dur)
    }
}

/// byte stream on unix domain socket
impl ByteStream for UnixStream {
    fn close(&self) -> io::Result<()> {
        UnixStream::shutdown(self, Shutdown::Both)
    }
    fn set_rw_timeout(&self, dur: Option<Duration>) -> io::Result<()> {
        self.set_read_timeout(dur)?;
        self.set_write_timeout(dur)
    }
}
