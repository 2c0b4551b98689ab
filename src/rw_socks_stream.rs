use std::fmt;
use std::io;
use std::slice;

use log::*;

use crate::model;
use crate::model::{Error, SocksStream, DEFAULT_PROTOCOL_VERSION, USER_PASS_VERSION};
use crate::raw_message::{self as raw, *};

trait ReadSocksExt {
    fn read_u8(&mut self) -> Result<u8, Error>;
    fn read_u16(&mut self) -> Result<u16, Error>;
    fn read_version(&mut self) -> Result<ProtocolVersion, Error>;
    fn read_methods(&mut self, nmethod: usize) -> Result<Vec<AuthMethods>, Error>;
    #[cfg(test)]
    fn read_rep(&mut self) -> Result<ResponseCode, Error>;
    fn read_cmd(&mut self) -> Result<SockCommand, Error>;
    fn read_atyp(&mut self) -> Result<AddrType, Error>;
    fn read_addr(&mut self, atyp: AddrType) -> Result<Addr, Error>;
    fn read_bytes(&mut self, len: usize) -> Result<Vec<u8>, Error>;
}

trait WriteSocksExt {
    fn write_u8(&mut self, v: u8) -> Result<(), Error>;
    fn write_u16(&mut self, v: u16) -> Result<(), Error>;
    #[cfg(test)]
    fn write_cmd(&mut self, cmd: SockCommand) -> Result<(), Error>;
    fn write_atyp(&mut self, atyp: AddrType) -> Result<(), Error>;
    fn write_addr(&mut self, addr: &Addr) -> Result<(), Error>;
    fn write_version(&mut self, version: ProtocolVersion) -> Result<(), Error>;
    #[cfg(test)]
    fn write_methods(&mut self, nmethods: &[AuthMethods]) -> Result<(), Error>;
    fn write_rep(&mut self, rep: ResponseCode) -> Result<(), Error>;
    fn write_bytes(&mut self, bytes: &[u8]) -> Result<(), Error>;
}

impl<T> ReadSocksExt for T
where
    T: io::Read,
{
    fn read_u8(&mut self) -> Result<u8, Error> {
        let mut buf = [0u8; 1];
        self.read_exact(&mut buf)?;
        Ok(buf[0])
    }

    fn read_u16(&mut self) -> Result<u16, Error> {
        let mut buf = [0u8; 2];
        self.read_exact(&mut buf)?;
        Ok(u16::from_be_bytes(buf))
    }

    fn read_version(&mut self) -> Result<ProtocolVersion, Error> {
        let version = self.read_u8()?.into();
        Ok(version)
    }

    fn read_methods(&mut self, nmethod: usize) -> Result<Vec<AuthMethods>, Error> {
        let mut methods = vec![0u8; nmethod];
        self.read_exact(&mut methods)?;
        Ok(methods.into_iter().map(Into::into).collect())
    }

    #[cfg(test)]
    fn read_rep(&mut self) -> Result<ResponseCode, Error> {
        Ok(self.read_u8()?.try_into()?)
    }

    fn read_cmd(&mut self) -> Result<SockCommand, Error> {
        Ok(self.read_u8()?.try_into()?)
    }

    fn read_atyp(&mut self) -> Result<AddrType, Error> {
        Ok(self.read_u8()?.try_into()?)
    }

    fn read_addr(&mut self, atyp: AddrType) -> Result<Addr, Error> {
        use AddrType::*;
        match atyp {
            V4 => {
                let mut buf = [0u8; 4];
                self.read_exact(&mut buf)?;
                Ok(Addr::IpAddr(Ipv4Addr::from(buf).into()))
            }
            Domain => {
                let len = self.read_u8()? as usize;
                Ok(Addr::Domain(self.read_bytes(len)?))
            }
            V6 => {
                let mut buf = [0u8; 16];
                self.read_exact(&mut buf)?;
                Ok(Addr::IpAddr(Ipv6Addr::from(buf).into()))
            }
        }
    }

    fn read_bytes(&mut self, len: usize) -> Result<Vec<u8>, Error> {
        let mut buf = vec![0u8; len];
        self.read_exact(&mut buf)?;
        Ok(buf)
    }
}

impl<T> WriteSocksExt for T
where
    T: io::Write,
{
    fn write_u8(&mut self, v: u8) -> Result<(), Error> {
        self.write_all(slice::from_ref(&v))?;
        Ok(())
    }
    fn write_u16(&mut self, v: u16) -> Result<(), Error> {
        self.write_all(&v.to_be_bytes())?;
        Ok(())
    }
    #[cfg(test)]
    fn write_cmd(&mut self, cmd: SockCommand) -> Result<(), Error> {
        self.write_u8(cmd as u8)
    }
    fn write_atyp(&mut self, atyp: AddrType) -> Result<(), Error> {
        self.write_u8(atyp as u8)
    }
    fn write_addr(&mut self, addr: &Addr) -> Result<(), Error> {
        match addr {
            Addr::IpAddr(IpAddr::V4(addr)) => self.write_all(&addr.octets())?,
            Addr::IpAddr(IpAddr::V6(addr)) => self.write_all(&addr.octets())?,
            Addr::Domain(domain) => self.write_bytes(domain)?,
        }
        Ok(())
    }
    fn write_version(&mut self, version: ProtocolVersion) -> Result<(), Error> {
        self.write_u8(version.into())
    }
    #[cfg(test)]
    fn write_methods(&mut self, nmethods: &[AuthMethods]) -> Result<(), Error> {
        let methods: Vec<u8> = nmethods.iter().map(|m| m.code()).collect();
        self.write_bytes(&methods)
    }
    fn write_rep(&mut self, rep: ResponseCode) -> Result<(), Error> {
        self.write_u8(rep.code())
    }
    /// length prefixed bytes
    fn write_bytes(&mut self, bytes: &[u8]) -> Result<(), Error> {
        if bytes.len() > u8::MAX as usize {
            return Err(io::Error::new(
                io::ErrorKind::InvalidInput,
                format!("field is too long: {} bytes", bytes.len()),
            )
            .into());
        }
        self.write_u8(bytes.len() as u8)?;
        self.write_all(bytes)?;
        Ok(())
    }
}

fn expect_version(
    actual: ProtocolVersion,
    expected: ProtocolVersion,
    what: &str,
) -> Result<(), Error> {
    if actual != expected {
        Err(Error::protocol_fmt(format_args!(
            "unsupported {} version: {}",
            what, actual
        )))
    } else {
        Ok(())
    }
}

/// Wrapper of Read/Write stream for impl SocksStream.
///
/// Every message is read with exact-length reads; nothing is buffered across messages.
pub struct ReadWriteStream<T> {
    strm: T,
}

impl<T: fmt::Debug> fmt::Debug for ReadWriteStream<T> {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "ReadWriteStream({:?})", self.strm)
    }
}

impl<T> ReadWriteStream<T>
where
    T: io::Read + io::Write,
{
    pub fn new(strm: T) -> Self {
        Self { strm }
    }

    pub fn into_inner(self) -> T {
        self.strm
    }
}

impl<T> SocksStream for ReadWriteStream<T>
where
    T: io::Read + io::Write,
{
    fn recv_method_candidates(&mut self) -> Result<model::MethodCandidates, Error> {
        trace!("recv_method_candidates");
        let ver = self.strm.read_version()?;
        expect_version(ver, DEFAULT_PROTOCOL_VERSION, "socks")?;
        let nmethods = self.strm.read_u8()?;
        if nmethods == 0 {
            return Err(Error::protocol_fmt(format_args!("no methods offered")));
        }
        let methods = self.strm.read_methods(nmethods as usize)?;
        Ok(raw::MethodCandidates { ver, methods }.into())
    }

    fn send_method_selection(
        &mut self,
        method_selection: model::MethodSelection,
    ) -> Result<(), Error> {
        trace!("send_method_selection: {:?}", method_selection);
        let method_selection: raw::MethodSelection = method_selection.into();
        let buf = [method_selection.ver.into(), method_selection.method.code()];
        self.strm.write_all(&buf)?;
        Ok(())
    }

    fn recv_credentials(&mut self) -> Result<model::Credentials, Error> {
        trace!("recv_credentials");
        let ver = self.strm.read_version()?;
        expect_version(ver, USER_PASS_VERSION, "username/password")?;
        let ulen = self.strm.read_u8()?;
        if ulen == 0 {
            return Err(Error::protocol_fmt(format_args!("empty username")));
        }
        let uname = self.strm.read_bytes(ulen as usize)?;
        let plen = self.strm.read_u8()?;
        let passwd = self.strm.read_bytes(plen as usize)?;
        Ok(raw::UserPassRequest { ver, uname, passwd }.into())
    }

    fn send_auth_reply(&mut self, reply: model::AuthReply) -> Result<(), Error> {
        trace!("send_auth_reply: {:?}", reply);
        let reply: raw::UserPassReply = reply.into();
        let buf = [reply.ver.into(), reply.status];
        self.strm.write_all(&buf)?;
        Ok(())
    }

    fn recv_connect_request(&mut self) -> Result<model::ConnectRequest, Error> {
        trace!("recv_connect_request");
        let ver = self.strm.read_version()?;
        expect_version(ver, DEFAULT_PROTOCOL_VERSION, "socks")?;
        let cmd = self.strm.read_cmd()?;
        let rsv = self.strm.read_u8()?;
        if rsv != RESERVED {
            debug!("ignore non-zero rsv: {:#X}", rsv);
        }
        let atyp = self.strm.read_atyp()?;
        let dst_addr = self.strm.read_addr(atyp)?;
        let dst_port = self.strm.read_u16()?;
        Ok(raw::ConnectRequest {
            ver,
            cmd,
            rsv,
            atyp,
            dst_addr,
            dst_port,
        }
        .try_into()?)
    }

    fn send_connect_reply(&mut self, connect_reply: model::ConnectReply) -> Result<(), Error> {
        trace!("send_connect_reply: {:?}", connect_reply);
        let connect_reply: raw::ConnectReply = connect_reply.into();
        // largest reply: 4 header bytes, 1 + 255 domain bytes, 2 port bytes
        let mut buf: [u8; 262] = [0; 262];
        let pos = {
            let mut cur = io::Cursor::new(&mut buf[..]);
            cur.write_version(connect_reply.ver)?;
            cur.write_rep(connect_reply.rep)?;
            cur.write_u8(connect_reply.rsv)?;
            cur.write_atyp(connect_reply.atyp)?;
            cur.write_addr(&connect_reply.bnd_addr)?;
            cur.write_u16(connect_reply.bnd_port)?;
            cur.position() as usize
        };
        self.strm.write_all(&buf[..pos])?;
        Ok(())
    }
}
