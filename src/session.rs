use std::fmt;
use std::net::SocketAddr;
use std::sync::mpsc::{self, SyncSender};
use std::thread;
use std::time::Duration;

use log::*;

use crate::auth_service::AuthService;
use crate::byte_stream::ByteStream;
use crate::connector::Connector;
use crate::model::dao::*;
use crate::model::model::*;
use crate::model::Error;
use crate::relay::{self, RelayStats};
use crate::resolver::Resolver;
use crate::rw_socks_stream::ReadWriteStream;
use crate::server_command::ServerCommand;

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct SessionId(pub u64);

impl From<u64> for SessionId {
    fn from(id: u64) -> Self {
        Self(id)
    }
}

impl fmt::Display for SessionId {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "SessionId({})", self.0)
    }
}

#[derive(Debug)]
pub struct SessionHandle {
    /// client address
    addr: SocketAddr,
    /// worker thread performs handshake and relay
    handle: thread::JoinHandle<Result<RelayStats, Error>>,
    /// Sender to send a termination message to the relay
    tx: SyncSender<()>,
}

impl SessionHandle {
    pub fn new(
        addr: SocketAddr,
        handle: thread::JoinHandle<Result<RelayStats, Error>>,
        tx: SyncSender<()>,
    ) -> Self {
        Self { addr, handle, tx }
    }

    pub fn client_addr(&self) -> SocketAddr {
        self.addr
    }

    pub fn stop(&self) {
        trace!("stop session: {}", self.addr);
        // full: a stop message is already pending.
        // disconnected: the worker has already finished.
        self.tx.try_send(()).ok();
    }

    pub fn join(self) -> thread::Result<Result<RelayStats, Error>> {
        trace!("join session: {}", self.addr);
        self.handle.join()
    }
}

/// Handshake and relay for one client connection.
///
/// `S` is the stream type carried by `ServerCommand`.
#[derive(Debug)]
pub struct Session<D, A, R, S> {
    pub id: SessionId,
    pub version: ProtocolVersion,
    pub dst_connector: D,
    pub authorizer: A,
    pub resolver: R,
    pub relay_idle_timeout: Option<Duration>,
    /// termination message receiver
    rx: mpsc::Receiver<()>,
    /// Send `Disconnect` command to the main thread when the session is dropped.
    _guard: DisconnectGuard<S>,
}

impl<D, A, R, S> Session<D, A, R, S>
where
    D: Connector,
    A: AuthService,
    R: Resolver,
{
    /// Returns Self and termination message sender.
    pub fn new(
        id: SessionId,
        dst_connector: D,
        authorizer: A,
        resolver: R,
        relay_idle_timeout: Option<Duration>,
        tx_cmd: mpsc::Sender<ServerCommand<S>>,
    ) -> (Self, mpsc::SyncSender<()>) {
        let (tx, rx) = mpsc::sync_channel(1);
        (
            Self {
                id,
                version: DEFAULT_PROTOCOL_VERSION,
                dst_connector,
                authorizer,
                resolver,
                relay_idle_timeout,
                rx,
                _guard: DisconnectGuard::new(id, tx_cmd),
            },
            tx,
        )
    }

    fn make_session<C>(&self, src_addr: SocketAddr, src_conn: C) -> Result<RelayStats, Error>
    where
        C: ByteStream,
    {
        let mut socks = ReadWriteStream::new(src_conn);

        let select = negotiate_auth_method(self.version, &self.authorizer, &mut socks)?;
        debug!("{}: auth method: {:?}", self.id, select.method);
        let negotiated = Negotiated {
            method: select.method,
            identity: self.authorizer.authorize(select.method, &mut socks)?,
        };
        if let Some(user) = &negotiated.identity {
            info!("{}: authenticated: {}", self.id, user);
        }

        let req = socks.recv_connect_request()?;
        debug!("{}: connect request: {:?}", self.id, req);
        match req.command {
            Command::Connect => {}
            cmd @ Command::Bind | cmd @ Command::UdpAssociate => {
                return Err(Error::command_not_supported(cmd));
            }
        }

        let (conn, dst_addr) = match self.connect(&req.connect_to) {
            Ok((conn, dst_addr, local_addr)) => {
                info!("{}: connected: {}: {}", self.id, req.connect_to, dst_addr);
                socks.send_connect_reply(ConnectReply::success(local_addr))?;
                (conn, dst_addr)
            }
            Err(err) => {
                error!("{}: connect error: {}", self.id, err);
                trace!("{}: connect error: {:?}", self.id, err);
                if let Err(reply_err) = socks.send_connect_reply(ConnectReply::failure(err.cerr()))
                {
                    debug!("{}: failure reply not sent: {}", self.id, reply_err);
                }
                return Err(err);
            }
        };

        // handshake timeouts do not apply to the relay
        let client = socks.into_inner();
        client.set_rw_timeout(None)?;
        relay::relay(
            self.id,
            src_addr,
            dst_addr,
            client,
            conn,
            &self.rx,
            self.relay_idle_timeout,
        )
    }

    /// Resolve `connect_to` if it is a domain name, then open the outbound stream.
    ///
    /// Returns the stream, the destination address and the local address of the stream.
    fn connect(&self, connect_to: &Address) -> Result<(D::B, SocketAddr, SocketAddr), Error> {
        let dst_addr = match connect_to {
            Address::IpAddr(addr, port) => SocketAddr::new(*addr, *port),
            Address::Domain(domain, port) => {
                let addr = self.resolver.resolve(domain, *port)?;
                debug!("{}: resolved: {}: {}", self.id, domain, addr);
                SocketAddr::new(addr, *port)
            }
        };
        let (conn, local_addr) = self.dst_connector.connect_byte_stream(dst_addr)?;
        Ok((conn, dst_addr, local_addr))
    }

    /// Run the session to the end. The client connection is closed on return.
    pub fn start<C>(self, src_addr: SocketAddr, src_conn: C) -> Result<RelayStats, Error>
    where
        C: ByteStream,
    {
        info!("{}: start: {}", self.id, src_addr);
        let result = self.make_session(src_addr, src_conn);
        match &result {
            Ok(_) => {}
            Err(err) if err.is_client_error() => info!("{}: client error: {}", self.id, err),
            Err(err) => error!("{}: session error: {}", self.id, err),
        }
        result
    }
}

fn negotiate_auth_method<A, S>(
    version: ProtocolVersion,
    auth: &A,
    socks: &mut S,
) -> Result<MethodSelection, Error>
where
    A: AuthService,
    S: SocksStream,
{
    let candidates = socks.recv_method_candidates()?;
    trace!("candidates: {:?}", candidates);

    let selection = auth.select(&candidates.method)?;
    trace!("selection: {:?}", selection);

    let method_sel = MethodSelection {
        version,
        method: selection.unwrap_or(Method::NoMethods),
    };
    socks.send_method_selection(method_sel)?;
    match method_sel.method {
        Method::NoMethods => Err(Error::NoAcceptableMethod),
        _ => Ok(method_sel),
    }
}

#[derive(Debug, Clone)]
pub struct DisconnectGuard<S> {
    id: SessionId,
    tx: mpsc::Sender<ServerCommand<S>>,
}

impl<S> DisconnectGuard<S> {
    pub fn new(id: SessionId, tx: mpsc::Sender<ServerCommand<S>>) -> Self {
        Self { id, tx }
    }
}

impl<S> Drop for DisconnectGuard<S> {
    fn drop(&mut self) {
        debug!("DisconnectGuard: {}", self.id);
        // the server may have shut down already
        self.tx.send(ServerCommand::Disconnect(self.id)).ok();
    }
}
