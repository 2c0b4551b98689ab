use std::io;
use std::net::{SocketAddr, TcpStream};
use std::time::Duration;

use log::*;

use crate::byte_stream::ByteStream;
use crate::model::{Address, Error};

pub trait Connector: Send {
    type B: ByteStream;
    /// Open a stream to `addr`.
    ///
    /// Returns the stream and its local address, the latter is what the client is told as
    /// BND.ADDR / BND.PORT.
    fn connect_byte_stream(&self, addr: SocketAddr) -> Result<(Self::B, SocketAddr), Error>;
}

#[derive(Debug, Clone)]
pub struct TcpConnector {
    connect_timeout: Option<Duration>,
    rw_timeout: Option<Duration>,
}

impl TcpConnector {
    pub fn new(connect_timeout: Option<Duration>, rw_timeout: Option<Duration>) -> Self {
        Self {
            connect_timeout,
            rw_timeout,
        }
    }
}

impl Connector for TcpConnector {
    type B = TcpStream;
    fn connect_byte_stream(&self, addr: SocketAddr) -> Result<(Self::B, SocketAddr), Error> {
        let strm = match self.connect_timeout {
            Some(timeout) => TcpStream::connect_timeout(&addr, timeout),
            None => TcpStream::connect(addr),
        }
        .map_err(|err| conn_error(err, addr))?;
        strm.set_read_timeout(self.rw_timeout)?;
        strm.set_write_timeout(self.rw_timeout)?;

        let local = strm.local_addr()?;
        debug!("connected: {} (local {})", addr, local);
        Ok((strm, local))
    }
}

fn conn_error(io_err: io::Error, addr: SocketAddr) -> Error {
    let addr = Address::from(addr);
    match io_err.kind() {
        io::ErrorKind::ConnectionRefused => return Error::connection_refused(addr),
        io::ErrorKind::TimedOut | io::ErrorKind::WouldBlock => {
            return Error::ConnectTimedOut { addr }
        }
        _ => {}
    }
    match io_err.raw_os_error() {
        Some(libc::ENETUNREACH) => Error::NetworkUnreachable { addr },
        Some(libc::EHOSTUNREACH) => Error::HostUnreachable { addr },
        Some(libc::ETIMEDOUT) => Error::ConnectTimedOut { addr },
        _ => io_err.into(),
    }
}

#[cfg(test)]
pub mod test {
    use super::*;
    use std::collections::BTreeMap;
    use std::iter::FromIterator;
    use std::os::unix::net::UnixStream;
    use std::sync::{Arc, Mutex};

    /// How a connection attempt to a registered address ends
    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    pub enum Outcome {
        Connect,
        Refuse,
        Unreachable,
        TimeOut,
    }

    /// Hands out one end of a unix socket pair per accepted address.
    /// The other end is kept as the destination and can be taken by the test.
    #[derive(Debug, Clone)]
    pub struct MapConnector {
        pub outcomes: BTreeMap<SocketAddr, Outcome>,
        pub local: SocketAddr,
        pub remotes: Arc<Mutex<Vec<(SocketAddr, UnixStream)>>>,
    }

    impl FromIterator<(SocketAddr, Outcome)> for MapConnector {
        fn from_iter<T>(iter: T) -> Self
        where
            T: IntoIterator<Item = (SocketAddr, Outcome)>,
        {
            Self {
                outcomes: iter.into_iter().collect(),
                local: "192.168.0.100:40000".parse().unwrap(),
                remotes: Arc::new(Mutex::new(vec![])),
            }
        }
    }

    impl MapConnector {
        /// destination side of the last connection
        pub fn take_remote(&self) -> Option<(SocketAddr, UnixStream)> {
            self.remotes.lock().unwrap().pop()
        }

        pub fn connections(&self) -> usize {
            self.remotes.lock().unwrap().len()
        }
    }

    impl Connector for MapConnector {
        type B = UnixStream;
        fn connect_byte_stream(&self, addr: SocketAddr) -> Result<(Self::B, SocketAddr), Error> {
            let into = Address::from(addr);
            match self.outcomes.get(&addr) {
                Some(Outcome::Connect) => {
                    let (near, far) = UnixStream::pair()?;
                    self.remotes.lock().unwrap().push((addr, far));
                    Ok((near, self.local))
                }
                Some(Outcome::Refuse) => Err(Error::connection_refused(into)),
                Some(Outcome::Unreachable) => Err(Error::HostUnreachable { addr: into }),
                Some(Outcome::TimeOut) => Err(Error::ConnectTimedOut { addr: into }),
                None => Err(Error::NetworkUnreachable { addr: into }),
            }
        }
    }

    #[test]
    fn connect_reports_local_address() {
        let listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
        let target = listener.local_addr().unwrap();
        let connector = TcpConnector::new(Some(Duration::from_secs(3)), None);
        let (strm, local) = connector.connect_byte_stream(target).unwrap();
        let (_accepted, peer) = listener.accept().unwrap();
        assert_eq!(local, peer);
        assert_eq!(strm.peer_addr().unwrap(), target);
    }

    #[test]
    fn connect_refused() {
        // bind then drop to find a port nobody listens on
        let target = {
            let listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
            listener.local_addr().unwrap()
        };
        let connector = TcpConnector::new(Some(Duration::from_secs(3)), None);
        let err = connector.connect_byte_stream(target).unwrap_err();
        assert!(matches!(err, Error::ConnectionRefused { .. }), "{:?}", err);
    }

    #[test]
    fn map_io_errors() {
        let addr: SocketAddr = "10.0.0.1:80".parse().unwrap();
        assert!(matches!(
            conn_error(io::Error::from_raw_os_error(libc::ENETUNREACH), addr),
            Error::NetworkUnreachable { .. }
        ));
        assert!(matches!(
            conn_error(io::Error::from_raw_os_error(libc::EHOSTUNREACH), addr),
            Error::HostUnreachable { .. }
        ));
        assert!(matches!(
            conn_error(io::ErrorKind::TimedOut.into(), addr),
            Error::ConnectTimedOut { .. }
        ));
        assert!(matches!(
            conn_error(io::ErrorKind::PermissionDenied.into(), addr),
            Error::Io(_)
        ));
    }
}
