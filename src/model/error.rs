use std::fmt;
use std::sync;

use crate::model::*;

pub type Result<T> = ::std::result::Result<T, Error>;

#[derive(thiserror::Error, Debug)]
pub enum Error {
    #[error("io error")]
    Io(#[source] anyhow::Error),
    #[error("poisoned error: {}", _0)]
    Poisoned(String),
    #[error("disconnected channel error: {}", name)]
    Disconnected { name: String },
    /// malformed or version-mismatched input from the client
    #[error("protocol error: {}", message)]
    Protocol { message: String },
    #[error("authentication error: general")]
    Authentication,
    #[error("authentication error: no acceptable method")]
    NoAcceptableMethod,
    #[error("command not supported: {:?}", cmd)]
    CommandNotSupported { cmd: Command },
    #[error("name not resolved: {}:{}", domain, port)]
    DomainNotResolved { domain: String, port: u16 },
    #[error("host unreachable: {}", addr)]
    HostUnreachable { addr: Address },
    #[error("network unreachable: {}", addr)]
    NetworkUnreachable { addr: Address },
    #[error("connect timed out: {}", addr)]
    ConnectTimedOut { addr: Address },
    /// rejected by external server
    #[error("connection refused: {}", addr)]
    ConnectionRefused { addr: Address },
    #[error("address already in use: {}", addr)]
    AddressAlreadyInUse { addr: SocketAddr },
    #[error("address not available: {}", addr)]
    AddressNotAvailable { addr: SocketAddr },
}

impl Error {
    pub fn disconnected<S: Into<String>>(name: S) -> Self {
        Self::Disconnected { name: name.into() }
    }

    pub fn protocol_fmt(message: fmt::Arguments) -> Self {
        Self::Protocol {
            message: message.to_string(),
        }
    }

    pub fn command_not_supported(cmd: Command) -> Self {
        Self::CommandNotSupported { cmd }
    }

    pub fn connection_refused(addr: Address) -> Self {
        Self::ConnectionRefused { addr }
    }

    /// The error was caused by the client's input rather than the proxy or the destination.
    pub fn is_client_error(&self) -> bool {
        use Error::*;
        matches!(
            self,
            Protocol { .. } | Authentication | NoAcceptableMethod | CommandNotSupported { .. }
        )
    }

    /// REP code answering a failed CONNECT
    pub fn cerr(&self) -> ConnectError {
        use ConnectError as CErr;
        use Error::*;
        match self {
            Io(_) => CErr::ServerFailure,
            Poisoned(_) => CErr::ServerFailure,
            Disconnected { .. } => CErr::ServerFailure,
            Protocol { .. } => CErr::ServerFailure,
            Authentication => CErr::ConnectionNotAllowed,
            NoAcceptableMethod => CErr::ConnectionNotAllowed,
            CommandNotSupported { .. } => CErr::CommandNotSupported,
            DomainNotResolved { .. } => CErr::HostUnreachable,
            HostUnreachable { .. } => CErr::HostUnreachable,
            NetworkUnreachable { .. } => CErr::NetworkUnreachable,
            ConnectTimedOut { .. } => CErr::TtlExpired,
            ConnectionRefused { .. } => CErr::ConnectionRefused,
            AddressAlreadyInUse { .. } => CErr::ServerFailure,
            AddressNotAvailable { .. } => CErr::ServerFailure,
        }
    }
}

impl From<std::io::Error> for Error {
    fn from(err: std::io::Error) -> Self {
        // a short read in the middle of a message is the client's fault
        if err.kind() == std::io::ErrorKind::UnexpectedEof {
            return Error::protocol_fmt(format_args!("unexpected end of stream"));
        }
        Error::Io(err.into())
    }
}

impl<T: fmt::Debug> From<sync::PoisonError<T>> for Error {
    fn from(error: sync::PoisonError<T>) -> Self {
        Error::Poisoned(format!("{:?}", error))
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use std::io;

    #[test]
    fn short_read_is_protocol_error() {
        let err: Error = io::Error::from(io::ErrorKind::UnexpectedEof).into();
        assert!(matches!(err, Error::Protocol { .. }));
        assert!(err.is_client_error());

        let err: Error = io::Error::from(io::ErrorKind::ConnectionReset).into();
        assert!(matches!(err, Error::Io(_)));
        assert!(!err.is_client_error());
    }

    #[test]
    fn reply_codes() {
        let addr: Address = "10.0.0.1:80".parse().unwrap();
        assert_eq!(
            Error::connection_refused(addr.clone()).cerr(),
            ConnectError::ConnectionRefused
        );
        assert_eq!(
            Error::ConnectTimedOut { addr: addr.clone() }.cerr(),
            ConnectError::TtlExpired
        );
        assert_eq!(
            Error::NetworkUnreachable { addr }.cerr(),
            ConnectError::NetworkUnreachable
        );
        assert_eq!(
            Error::DomainNotResolved {
                domain: "nowhere.invalid".into(),
                port: 80
            }
            .cerr(),
            ConnectError::HostUnreachable
        );
    }
}
