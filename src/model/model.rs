//! SOCKS5 message types exchanged between client and proxy.
//!
//! ```text
//! client            proxy            service
//!   |                 |                 |
//!   |---------------->|                 |
//!   |MethodCandidates |                 |
//!   |                 |                 |
//!   |<----------------|                 |
//!   |  MethodSelection|                 |
//!   |                 |                 |
//!   |---------------->|                 |   only if Method::UserPass
//!   |Credentials      |                 |   was selected (RFC1929)
//!   |<----------------|                 |
//!   |        AuthReply|                 |
//!   |                 |                 |
//!   |---------------->|                 |
//!   |ConnectRequest   |                 |
//!   |                 |---------------->|
//!   |                 |  TCP connect    |
//!   |<----------------|                 |
//!   |     ConnectReply|                 |
//!   |                 |                 |
//!   .                 .                 .
//!   | - - - - - - - ->| - - - - - - - ->|
//!   |            [[ Relay ]]            |
//!   |<- - - - - - - - |< - - - - - - - -|
//!   .                 .                 .
//! ```
//!
use std::fmt;
pub use std::net::{IpAddr, Ipv4Addr, Ipv6Addr, SocketAddr, SocketAddrV4, SocketAddrV6};
use std::str::FromStr;

use derive_more::{Display, From, Into};

pub const DEFAULT_PROTOCOL_VERSION: ProtocolVersion = ProtocolVersion(5);

/// Version of the username/password sub-negotiation (RFC1929)
pub const USER_PASS_VERSION: ProtocolVersion = ProtocolVersion(1);

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Into, From, Display)]
pub struct ProtocolVersion(u8);

/// Authentication Methods
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Display)]
pub enum Method {
    /// No Authentication
    NoAuth,
    /// GSSAPI
    GssApi,
    /// Authenticate with a username / password
    UserPass,
    /// IANA assigned method
    IANAMethod(u8),
    /// Reserved for private method
    Private(u8),
    /// No acceptable method
    NoMethods,
}

#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord)]
pub struct MethodCandidates {
    pub version: ProtocolVersion,
    pub method: Vec<Method>,
}

impl MethodCandidates {
    pub fn new(method: &[Method]) -> Self {
        Self {
            version: DEFAULT_PROTOCOL_VERSION,
            method: method.to_vec(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub struct MethodSelection {
    pub version: ProtocolVersion,
    pub method: Method,
}

/// Username/password sub-negotiation request
#[derive(Clone, PartialEq, Eq)]
pub struct Credentials {
    pub version: ProtocolVersion,
    pub username: String,
    pub password: String,
}

impl Credentials {
    pub fn new<U: Into<String>, P: Into<String>>(username: U, password: P) -> Self {
        Self {
            version: USER_PASS_VERSION,
            username: username.into(),
            password: password.into(),
        }
    }
}

impl fmt::Debug for Credentials {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.debug_struct("Credentials")
            .field("version", &self.version)
            .field("username", &self.username)
            .field("password", &"<redacted>")
            .finish()
    }
}

/// Username/password sub-negotiation reply
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AuthReply {
    pub version: ProtocolVersion,
    pub accepted: bool,
}

/// Outcome of method selection and (optional) authentication.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Negotiated {
    pub method: Method,
    /// present only when `Method::UserPass` was negotiated
    pub identity: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum Command {
    Connect,
    Bind,
    UdpAssociate,
}

/// ip address and port
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum Address {
    IpAddr(IpAddr, u16),
    Domain(String, u16),
}

impl fmt::Display for Address {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        use Address::*;
        match self {
            IpAddr(addr, port) => write!(f, "{}", SocketAddr::new(*addr, *port)),
            Domain(host, port) => write!(f, "{}:{}", host, port),
        }
    }
}

impl Address {
    pub fn port(&self) -> u16 {
        match self {
            Address::IpAddr(_, port) => *port,
            Address::Domain(_, port) => *port,
        }
    }

    /// `0.0.0.0:0`, the bound address sent along with failure replies
    pub fn unspecified() -> Self {
        Address::IpAddr(Ipv4Addr::UNSPECIFIED.into(), 0)
    }
}

impl From<SocketAddr> for Address {
    fn from(addr: SocketAddr) -> Self {
        Address::IpAddr(addr.ip(), addr.port())
    }
}

impl From<SocketAddrV4> for Address {
    fn from(addr: SocketAddrV4) -> Self {
        Address::IpAddr((*addr.ip()).into(), addr.port())
    }
}

impl From<SocketAddrV6> for Address {
    fn from(addr: SocketAddrV6) -> Self {
        Address::IpAddr((*addr.ip()).into(), addr.port())
    }
}

impl FromStr for Address {
    type Err = std::net::AddrParseError;
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let addr: SocketAddr = s.parse()?;
        Ok(addr.into())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord)]
pub struct ConnectRequest {
    pub version: ProtocolVersion,
    pub command: Command,
    pub connect_to: Address,
}

impl ConnectRequest {
    pub fn connect_to<A>(addr: A) -> Self
    where
        Address: From<A>,
    {
        Self::with_command(Command::Connect, addr)
    }

    pub fn bind<A>(addr: A) -> Self
    where
        Address: From<A>,
    {
        Self::with_command(Command::Bind, addr)
    }

    pub fn udp_associate<A>(addr: A) -> Self
    where
        Address: From<A>,
    {
        Self::with_command(Command::UdpAssociate, addr)
    }

    fn with_command<A>(command: Command, addr: A) -> Self
    where
        Address: From<A>,
    {
        Self {
            version: DEFAULT_PROTOCOL_VERSION,
            command,
            connect_to: addr.into(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Display)]
pub enum ConnectError {
    /// general server failure
    ServerFailure,
    ConnectionNotAllowed,
    NetworkUnreachable,
    HostUnreachable,
    ConnectionRefused,
    TtlExpired,
    CommandNotSupported,
    AddrTypeNotSupported,
}

impl std::error::Error for ConnectError {}

pub type ConnectResult = std::result::Result<(), ConnectError>;

#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord)]
pub struct ConnectReply {
    pub version: ProtocolVersion,
    pub connect_result: ConnectResult,
    /// BND.ADDR / BND.PORT
    pub bound_addr: Address,
}

impl ConnectReply {
    pub fn success(bound_addr: SocketAddr) -> Self {
        Self {
            version: DEFAULT_PROTOCOL_VERSION,
            connect_result: Ok(()),
            bound_addr: bound_addr.into(),
        }
    }

    pub fn failure(err: ConnectError) -> Self {
        Self {
            version: DEFAULT_PROTOCOL_VERSION,
            connect_result: Err(err),
            bound_addr: Address::unspecified(),
        }
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn address_display() {
        assert_eq!(
            Address::from_str("127.0.0.1:1080").unwrap().to_string(),
            "127.0.0.1:1080"
        );
        assert_eq!(
            Address::from_str("[::1]:443").unwrap().to_string(),
            "[::1]:443"
        );
        assert_eq!(
            Address::Domain("example.com".into(), 80).to_string(),
            "example.com:80"
        );
    }

    #[test]
    fn failure_reply_is_unspecified() {
        let reply = ConnectReply::failure(ConnectError::ConnectionRefused);
        assert_eq!(reply.bound_addr, "0.0.0.0:0".parse().unwrap());
        assert_eq!(reply.connect_result, Err(ConnectError::ConnectionRefused));
    }

    #[test]
    fn credentials_debug_hides_password() {
        let cred = Credentials::new("alice", "s3cret");
        let dbg = format!("{:?}", cred);
        assert!(dbg.contains("alice"));
        assert!(!dbg.contains("s3cret"));
    }
}
