//! RFC1928 / RFC1929 raw message types.
//! For each type structures correspond to the packet layout on the wire.
//!
use std::convert::{TryFrom, TryInto};
use std::fmt;
pub use std::net::{IpAddr, Ipv4Addr, Ipv6Addr};

use crate::model;

pub const RESERVED: u8 = 0x00;

/// Version of socks
pub use model::ProtocolVersion;

/// RFC1929 STATUS field
pub const AUTH_SUCCEEDED: u8 = 0x00;
pub const AUTH_FAILED: u8 = 0x01;

/// Section 6. Replies > Reply field value
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum ResponseCode {
    Success = 0x00,
    Failure = 0x01,
    RuleFailure = 0x02,
    NetworkUnreachable = 0x03,
    HostUnreachable = 0x04,
    ConnectionRefused = 0x05,
    TtlExpired = 0x06,
    CommandNotSupported = 0x07,
    AddrTypeNotSupported = 0x08,
}

impl From<model::ConnectResult> for ResponseCode {
    fn from(res: model::ConnectResult) -> Self {
        use model::ConnectError::*;
        match res {
            Ok(()) => ResponseCode::Success,
            Err(ServerFailure) => ResponseCode::Failure,
            Err(ConnectionNotAllowed) => ResponseCode::RuleFailure,
            Err(NetworkUnreachable) => ResponseCode::NetworkUnreachable,
            Err(HostUnreachable) => ResponseCode::HostUnreachable,
            Err(ConnectionRefused) => ResponseCode::ConnectionRefused,
            Err(TtlExpired) => ResponseCode::TtlExpired,
            Err(CommandNotSupported) => ResponseCode::CommandNotSupported,
            Err(AddrTypeNotSupported) => ResponseCode::AddrTypeNotSupported,
        }
    }
}

#[cfg(test)]
impl From<ResponseCode> for model::ConnectResult {
    fn from(res: ResponseCode) -> Self {
        use model::ConnectError as CErr;
        use ResponseCode::*;
        match res {
            Success => Ok(()),
            Failure => Err(CErr::ServerFailure),
            RuleFailure => Err(CErr::ConnectionNotAllowed),
            NetworkUnreachable => Err(CErr::NetworkUnreachable),
            HostUnreachable => Err(CErr::HostUnreachable),
            ConnectionRefused => Err(CErr::ConnectionRefused),
            TtlExpired => Err(CErr::TtlExpired),
            CommandNotSupported => Err(CErr::CommandNotSupported),
            AddrTypeNotSupported => Err(CErr::AddrTypeNotSupported),
        }
    }
}

impl ResponseCode {
    pub fn code(&self) -> u8 {
        *self as u8
    }
}

#[cfg(test)]
impl TryFrom<u8> for ResponseCode {
    type Error = TryFromU8Error;
    fn try_from(code: u8) -> Result<Self, Self::Error> {
        use ResponseCode::*;
        match code {
            0 => Ok(Success),
            1 => Ok(Failure),
            2 => Ok(RuleFailure),
            3 => Ok(NetworkUnreachable),
            4 => Ok(HostUnreachable),
            5 => Ok(ConnectionRefused),
            6 => Ok(TtlExpired),
            7 => Ok(CommandNotSupported),
            8 => Ok(AddrTypeNotSupported),
            c => Err(TryFromU8Error::new(c, "ResponseCode")),
        }
    }
}

impl fmt::Display for ResponseCode {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        use ResponseCode::*;
        match self {
            Success => write!(f, "succeeded"),
            Failure => write!(f, "general SOCKS server failure"),
            RuleFailure => write!(f, "connection not allowed by ruleset"),
            NetworkUnreachable => write!(f, "Network unreachable"),
            HostUnreachable => write!(f, "Host unreachable"),
            ConnectionRefused => write!(f, "Connection refused"),
            TtlExpired => write!(f, "TTL expired"),
            CommandNotSupported => write!(f, "Command not supported"),
            AddrTypeNotSupported => write!(f, "Address type not supported"),
        }
    }
}

/// Client Authentication Methods
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum AuthMethods {
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

impl AuthMethods {
    pub fn code(&self) -> u8 {
        use AuthMethods::*;
        match self {
            NoAuth => 0x00,
            GssApi => 0x01,
            UserPass => 0x02,
            IANAMethod(c) => *c,
            Private(c) => *c,
            NoMethods => 0xff,
        }
    }
}

impl From<AuthMethods> for model::Method {
    fn from(methods: AuthMethods) -> Self {
        use model::Method::*;
        match methods {
            AuthMethods::NoAuth => NoAuth,
            AuthMethods::GssApi => GssApi,
            AuthMethods::UserPass => UserPass,
            AuthMethods::IANAMethod(c) => IANAMethod(c),
            AuthMethods::Private(c) => Private(c),
            AuthMethods::NoMethods => NoMethods,
        }
    }
}

impl From<model::Method> for AuthMethods {
    fn from(method: model::Method) -> Self {
        use AuthMethods::*;
        match method {
            model::Method::NoAuth => NoAuth,
            model::Method::GssApi => GssApi,
            model::Method::UserPass => UserPass,
            model::Method::IANAMethod(c) => IANAMethod(c),
            model::Method::Private(c) => Private(c),
            model::Method::NoMethods => NoMethods,
        }
    }
}

impl From<u8> for AuthMethods {
    fn from(code: u8) -> Self {
        use AuthMethods::*;
        match code {
            0x00 => NoAuth,
            0x01 => GssApi,
            0x02 => UserPass,
            0x03..=0x7F => IANAMethod(code),
            0x80..=0xFE => Private(code),
            0xFF => NoMethods,
        }
    }
}

impl fmt::Display for AuthMethods {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        use AuthMethods::*;
        match self {
            NoAuth => write!(f, "No Authentication Required"),
            GssApi => write!(f, "GSSAPI"),
            UserPass => write!(f, "Username/Password"),
            IANAMethod(c) => write!(f, "IANA Assigned: {:#X}", c),
            Private(c) => write!(f, "Private Methods: {:#X}", c),
            NoMethods => write!(f, "No Acceptable Methods"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord)]
pub struct TryFromU8Error {
    /// source value
    value: u8,
    /// target type
    to: &'static str,
}

impl TryFromU8Error {
    fn new(value: u8, to: &'static str) -> Self {
        Self { value, to }
    }
}

impl fmt::Display for TryFromU8Error {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "unsupported {} value: {:#X}", self.to, self.value)
    }
}

impl std::error::Error for TryFromU8Error {}

impl From<TryFromU8Error> for model::Error {
    fn from(err: TryFromU8Error) -> Self {
        model::Error::protocol_fmt(format_args!("{}", err))
    }
}

/// ATYP
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum AddrType {
    V4 = 0x01,
    Domain = 0x03,
    V6 = 0x04,
}

impl TryFrom<u8> for AddrType {
    type Error = TryFromU8Error;
    fn try_from(n: u8) -> Result<AddrType, Self::Error> {
        match n {
            1 => Ok(AddrType::V4),
            3 => Ok(AddrType::Domain),
            4 => Ok(AddrType::V6),
            _ => Err(TryFromU8Error::new(n, "address type")),
        }
    }
}

impl fmt::Display for AddrType {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        use AddrType::*;
        match self {
            V4 => write!(f, "Version4 IP Address"),
            Domain => write!(f, "Fully Qualified Domain Name"),
            V6 => write!(f, "Version6 IP Address"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord)]
pub enum Addr {
    IpAddr(IpAddr),
    Domain(Vec<u8>),
}

impl Addr {
    pub fn atyp(&self) -> AddrType {
        match self {
            Addr::IpAddr(IpAddr::V4(_)) => AddrType::V4,
            Addr::IpAddr(IpAddr::V6(_)) => AddrType::V6,
            Addr::Domain(_) => AddrType::Domain,
        }
    }
}

impl From<IpAddr> for Addr {
    fn from(addr: IpAddr) -> Self {
        Addr::IpAddr(addr)
    }
}

/// split into DST.ADDR / DST.PORT
impl From<model::Address> for (Addr, u16) {
    fn from(addr: model::Address) -> Self {
        match addr {
            model::Address::IpAddr(addr, port) => (Addr::IpAddr(addr), port),
            model::Address::Domain(domain, port) => (Addr::Domain(domain.into_bytes()), port),
        }
    }
}

/// SOCK5 CMD Type
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum SockCommand {
    Connect = 0x01,
    Bind = 0x02,
    UdpAssociate = 0x3,
}

impl From<SockCommand> for model::Command {
    fn from(cmd: SockCommand) -> Self {
        use SockCommand::*;
        match cmd {
            Connect => model::Command::Connect,
            Bind => model::Command::Bind,
            UdpAssociate => model::Command::UdpAssociate,
        }
    }
}

impl From<model::Command> for SockCommand {
    fn from(cmd: model::Command) -> Self {
        use SockCommand::*;
        match cmd {
            model::Command::Connect => Connect,
            model::Command::Bind => Bind,
            model::Command::UdpAssociate => UdpAssociate,
        }
    }
}

impl TryFrom<u8> for SockCommand {
    type Error = TryFromU8Error;
    fn try_from(n: u8) -> Result<SockCommand, Self::Error> {
        match n {
            1 => Ok(SockCommand::Connect),
            2 => Ok(SockCommand::Bind),
            3 => Ok(SockCommand::UdpAssociate),
            _ => Err(TryFromU8Error::new(n, "command")),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord)]
pub struct MethodCandidates {
    pub ver: ProtocolVersion,
    pub methods: Vec<AuthMethods>,
}

impl From<MethodCandidates> for model::MethodCandidates {
    fn from(candidates: MethodCandidates) -> Self {
        model::MethodCandidates {
            version: candidates.ver,
            method: candidates.methods.into_iter().map(Into::into).collect(),
        }
    }
}

impl From<model::MethodCandidates> for MethodCandidates {
    fn from(candidates: model::MethodCandidates) -> Self {
        MethodCandidates {
            ver: candidates.version,
            methods: candidates.method.into_iter().map(Into::into).collect(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord)]
pub struct MethodSelection {
    pub ver: ProtocolVersion,
    pub method: AuthMethods,
}

impl From<model::MethodSelection> for MethodSelection {
    fn from(select: model::MethodSelection) -> Self {
        MethodSelection {
            ver: select.version,
            method: select.method.into(),
        }
    }
}

impl From<MethodSelection> for model::MethodSelection {
    fn from(select: MethodSelection) -> Self {
        model::MethodSelection {
            version: select.ver,
            method: select.method.into(),
        }
    }
}

/// RFC1929 username/password request
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UserPassRequest {
    pub ver: ProtocolVersion,
    pub uname: Vec<u8>,
    pub passwd: Vec<u8>,
}

impl From<UserPassRequest> for model::Credentials {
    fn from(req: UserPassRequest) -> Self {
        model::Credentials {
            version: req.ver,
            username: String::from_utf8_lossy(&req.uname).into_owned(),
            password: String::from_utf8_lossy(&req.passwd).into_owned(),
        }
    }
}

impl From<model::Credentials> for UserPassRequest {
    fn from(cred: model::Credentials) -> Self {
        UserPassRequest {
            ver: cred.version,
            uname: cred.username.into_bytes(),
            passwd: cred.password.into_bytes(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct UserPassReply {
    pub ver: ProtocolVersion,
    pub status: u8,
}

impl From<model::AuthReply> for UserPassReply {
    fn from(reply: model::AuthReply) -> Self {
        UserPassReply {
            ver: reply.version,
            status: if reply.accepted {
                AUTH_SUCCEEDED
            } else {
                AUTH_FAILED
            },
        }
    }
}

impl From<UserPassReply> for model::AuthReply {
    fn from(reply: UserPassReply) -> Self {
        model::AuthReply {
            version: reply.ver,
            accepted: reply.status == AUTH_SUCCEEDED,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord)]
pub struct ConnectRequest {
    pub ver: ProtocolVersion,
    pub cmd: SockCommand,
    pub rsv: u8,
    pub atyp: AddrType,
    pub dst_addr: Addr,
    pub dst_port: u16,
}

/// aux for impl TryFrom to model::Address
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AddrTriple {
    atyp: AddrType,
    addr: Addr,
    port: u16,
}

impl AddrTriple {
    pub fn new(atyp: AddrType, addr: Addr, port: u16) -> Self {
        Self { atyp, addr, port }
    }
}

impl TryFrom<AddrTriple> for model::Address {
    type Error = TryFromAddress;

    fn try_from(addr: AddrTriple) -> Result<Self, Self::Error> {
        use AddrType::*;
        let AddrTriple { atyp, addr, port } = addr;
        match (atyp, addr) {
            (V4, Addr::IpAddr(addr @ IpAddr::V4(_))) => Ok(model::Address::IpAddr(addr, port)),
            (V6, Addr::IpAddr(addr @ IpAddr::V6(_))) => Ok(model::Address::IpAddr(addr, port)),
            (Domain, Addr::Domain(domain)) => match String::from_utf8(domain) {
                Ok(domain) => Ok(model::Address::Domain(domain, port)),
                Err(err) => Err(TryFromAddress {
                    atyp,
                    addr: Addr::Domain(err.into_bytes()),
                    port,
                }),
            },
            (atyp, addr) => Err(TryFromAddress { atyp, addr, port }),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord)]
pub struct TryFromAddress {
    atyp: AddrType,
    addr: Addr,
    port: u16,
}

impl fmt::Display for TryFromAddress {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(
            f,
            "malformed address({}, {:?}, {})",
            self.atyp, self.addr, self.port
        )
    }
}

impl std::error::Error for TryFromAddress {}

impl From<TryFromAddress> for model::Error {
    fn from(err: TryFromAddress) -> Self {
        model::Error::protocol_fmt(format_args!("{}", err))
    }
}

impl TryFrom<ConnectRequest> for model::ConnectRequest {
    type Error = TryFromAddress;
    fn try_from(req: ConnectRequest) -> Result<Self, Self::Error> {
        let dst = AddrTriple::new(req.atyp, req.dst_addr, req.dst_port).try_into()?;
        Ok(model::ConnectRequest {
            version: req.ver,
            command: req.cmd.into(),
            connect_to: dst,
        })
    }
}

impl From<model::ConnectRequest> for ConnectRequest {
    fn from(req: model::ConnectRequest) -> Self {
        let (dst_addr, dst_port): (Addr, u16) = req.connect_to.into();
        ConnectRequest {
            ver: req.version,
            cmd: req.command.into(),
            rsv: RESERVED,
            atyp: dst_addr.atyp(),
            dst_addr,
            dst_port,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord)]
pub struct ConnectReply {
    pub ver: ProtocolVersion,
    pub rep: ResponseCode,
    pub rsv: u8,
    pub atyp: AddrType,
    pub bnd_addr: Addr,
    pub bnd_port: u16,
}

#[cfg(test)]
impl TryFrom<ConnectReply> for model::ConnectReply {
    type Error = TryFromAddress;
    fn try_from(rep: ConnectReply) -> Result<Self, Self::Error> {
        Ok(model::ConnectReply {
            version: rep.ver,
            connect_result: rep.rep.into(),
            bound_addr: AddrTriple::new(rep.atyp, rep.bnd_addr, rep.bnd_port).try_into()?,
        })
    }
}

impl From<model::ConnectReply> for ConnectReply {
    fn from(rep: model::ConnectReply) -> Self {
        let (bnd_addr, bnd_port): (Addr, u16) = rep.bound_addr.into();
        ConnectReply {
            ver: rep.version,
            rep: rep.connect_result.into(),
            rsv: RESERVED,
            atyp: bnd_addr.atyp(),
            bnd_addr,
            bnd_port,
        }
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn auth_method_codes() {
        for code in 0..=0xffu8 {
            assert_eq!(AuthMethods::from(code).code(), code);
        }
        assert_eq!(AuthMethods::from(0x02), AuthMethods::UserPass);
        assert_eq!(AuthMethods::from(0x80), AuthMethods::Private(0x80));
    }

    #[test]
    fn reject_unknown_codes() {
        assert!(AddrType::try_from(2).is_err());
        assert!(AddrType::try_from(5).is_err());
        assert!(SockCommand::try_from(0).is_err());
        assert!(SockCommand::try_from(4).is_err());
        assert_eq!(
            TryFromU8Error::new(9, "command").to_string(),
            "unsupported command value: 0x9"
        );
    }

    #[test]
    fn reply_carries_family_of_bound_addr() {
        let v4: ConnectReply = model::ConnectReply::success("10.1.2.3:4567".parse().unwrap()).into();
        assert_eq!(v4.atyp, AddrType::V4);
        assert_eq!(v4.rep, ResponseCode::Success);
        assert_eq!(v4.bnd_port, 4567);

        let v6: ConnectReply = model::ConnectReply::success("[fe80::1]:80".parse().unwrap()).into();
        assert_eq!(v6.atyp, AddrType::V6);
    }

    #[test]
    fn domain_must_be_utf8() {
        let triple = AddrTriple::new(AddrType::Domain, Addr::Domain(vec![0xff, 0xfe]), 80);
        assert!(model::Address::try_from(triple).is_err());
    }
}
