use std::collections::HashMap;
use std::net::TcpStream;
use std::sync::{
    mpsc::{self, Receiver, Sender, SyncSender},
    Arc, Mutex,
};
use std::thread;

use log::*;
use rand::prelude::*;
use rand::rngs::StdRng;

use crate::acceptor::{Binder, TcpBinder};
use crate::auth_service::{AuthService, UserPassService};
use crate::byte_stream::ByteStream;
use crate::config::ServerConfig;
use crate::connector::{Connector, TcpConnector};
use crate::error::Error;
use crate::model::SocketAddr;
use crate::resolver::{Resolver, SystemResolver};
use crate::server_command::ServerCommand;
use crate::session::{Session, SessionHandle, SessionId};
use crate::thread::spawn_thread;

pub struct Server<S, T, C, R> {
    config: ServerConfig,
    tx_cmd: Sender<ServerCommand<S>>,
    rx_cmd: Receiver<ServerCommand<S>>,
    /// bind server address
    binder: T,
    /// send termination message to the acceptor
    tx_acceptor_done: SyncSender<()>,
    /// make connection to service host
    connector: C,
    /// resolve domain names of connect requests
    resolver: R,
    session: HashMap<SessionId, SessionHandle>,
    /// random context for generating SessionIds
    id_rng: StdRng,
}

/// spawn a thread send accepted stream to `tx`
fn spawn_acceptor<S>(
    acceptor: impl Iterator<Item = (S, SocketAddr)> + Send + 'static,
    tx: Sender<ServerCommand<S>>,
) -> std::io::Result<thread::JoinHandle<()>>
where
    S: ByteStream + 'static,
{
    use ServerCommand::*;
    spawn_thread("acceptor", move || {
        for (strm, addr) in acceptor {
            if tx.send(Connect(strm, addr)).is_err() {
                info!("disconnected ServerCommand chan");
                break;
            }
        }
    })
}

/// spawn a thread perform `Session.start`
fn spawn_session<S, D, M, R>(
    session: Session<D, M, R, S>,
    // termination message sender
    tx: SyncSender<()>,
    addr: SocketAddr,
    strm: S,
) -> std::io::Result<SessionHandle>
where
    S: ByteStream + 'static,
    D: Connector + 'static,
    M: AuthService + 'static,
    R: Resolver + 'static,
{
    let name = format!("session-{}", session.id.0);
    let handle = spawn_thread(&name, move || session.start(addr, strm))?;
    Ok(SessionHandle::new(addr, handle, tx))
}

impl Server<TcpStream, TcpBinder, TcpConnector, SystemResolver> {
    pub fn new(config: ServerConfig) -> (Self, Sender<ServerCommand<TcpStream>>) {
        let (tx_done, rx_done) = mpsc::sync_channel(1);
        let binder = TcpBinder::new(
            config.client_rw_timeout,
            Arc::new(Mutex::new(rx_done)),
            config.accept_timeout,
        );
        let connector = TcpConnector::new(config.connect_timeout, config.server_rw_timeout);
        Server::with_binder(config, binder, tx_done, connector, SystemResolver::new())
    }
}

impl<S, T, C, R> Server<S, T, C, R>
where
    S: ByteStream + 'static,
    T: Binder<Stream = S>,
    C: Connector + Clone + 'static,
    R: Resolver + Clone + 'static,
{
    pub fn with_binder(
        config: ServerConfig,
        binder: T,
        tx_acceptor_done: SyncSender<()>,
        connector: C,
        resolver: R,
    ) -> (Self, Sender<ServerCommand<S>>) {
        let (tx, rx) = mpsc::channel();
        (
            Self {
                config,
                tx_cmd: tx.clone(),
                rx_cmd: rx,
                binder,
                tx_acceptor_done,
                connector,
                resolver,
                session: HashMap::new(),
                id_rng: StdRng::from_entropy(),
            },
            tx,
        )
    }

    fn next_session_id(&mut self) -> SessionId {
        loop {
            let next_candidate = self.id_rng.next_u64().into();
            if self.session.contains_key(&next_candidate) {
                continue;
            }
            debug!("next session id is issued: {}", next_candidate);
            return next_candidate;
        }
    }

    /// Serve until `ServerCommand::Terminate` is received.
    ///
    /// On termination the acceptor is stopped, every session is requested to stop
    /// and all worker threads are joined.
    pub fn serve(&mut self) -> Result<(), Error> {
        let acceptor = self.binder.bind(self.config.server_addr())?;
        let accept_th = spawn_acceptor(acceptor, self.tx_cmd.clone())?;

        while let Ok(cmd) = self.rx_cmd.recv() {
            use ServerCommand::*;
            debug!("cmd: {:?}", cmd);
            match cmd {
                Terminate => {
                    info!("terminate");
                    trace!("stopping accept thread...");
                    self.tx_acceptor_done.send(()).ok();
                    trace!("stopping session threads...");
                    self.session.values().for_each(|ss| ss.stop());
                    self.session.drain().for_each(|(id, ss)| {
                        report(id, ss);
                    });
                    trace!("session threads are stopped");
                    accept_th.join().ok();
                    trace!("accept thread is stopped");
                    break;
                }
                Connect(stream, addr) => {
                    let id = self.next_session_id();
                    info!("{}: accepted: {}", id, addr);
                    let (session, tx) = Session::new(
                        id,
                        self.connector.clone(),
                        UserPassService::new(),
                        self.resolver.clone(),
                        self.config.relay_idle_timeout,
                        self.tx_cmd.clone(),
                    );
                    match spawn_session(session, tx, addr, stream) {
                        Ok(handle) => {
                            self.session.insert(id, handle);
                        }
                        Err(err) => error!("{}: spawn session: {}", id, err),
                    }
                }
                Disconnect(id) => {
                    if let Some(session) = self.session.remove(&id) {
                        debug!("stopping session: {}", id);
                        session.stop();
                        report(id, session);
                    } else {
                        debug!("session not found: {}", id);
                    }
                }
            }
        }
        info!("server shutdown");
        Ok(())
    }
}

/// join a session and log how it ended
fn report(id: SessionId, session: SessionHandle) {
    let addr = session.client_addr();
    match session.join() {
        Ok(Ok(stats)) => info!("{}: session is stopped: {}: {:?}", id, addr, stats),
        Ok(Err(err)) => debug!("{}: session is stopped: {}: {}", id, addr, err),
        Err(err) => error!("{}: session panic: {}: {:?}", id, addr, err),
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::connector::test::{MapConnector, Outcome};
    use crate::model;
    use crate::resolver::test::CountingResolver;

    use std::io::{Read, Write};
    use std::iter::FromIterator;
    use std::ops::Deref;
    use std::os::unix::net::UnixStream;
    use std::time::{Duration, SystemTime};

    #[test]
    fn server_shutdown() {
        let mut config = ServerConfig::default();
        config.server_ip = "127.0.0.1".parse().unwrap();
        config.server_port = 0;
        let (tx_done, rx_done) = mpsc::sync_channel(1);

        let (mut server, tx) = Server::with_binder(
            config,
            TcpBinder::new(
                None,
                Arc::new(Mutex::new(rx_done)),
                Some(Duration::from_millis(100)),
            ),
            tx_done,
            TcpConnector::new(None, None),
            SystemResolver::new(),
        );
        let shutdown = Arc::new(Mutex::new(SystemTime::now()));
        let th = {
            let shutdown = shutdown.clone();
            thread::spawn(move || {
                server.serve().unwrap();
                *shutdown.lock().unwrap() = SystemTime::now();
            })
        };
        thread::sleep(Duration::from_millis(300));
        let req_shutdown = SystemTime::now();
        tx.send(ServerCommand::Terminate).unwrap();
        th.join().unwrap();
        assert!(shutdown.lock().unwrap().deref() > &req_shutdown);
    }

    /// Hands out a single prepared connection
    struct DummyBinder {
        stream: Mutex<Option<UnixStream>>,
        src_addr: SocketAddr,
    }

    impl Binder for DummyBinder {
        type Stream = UnixStream;
        type Iter = std::option::IntoIter<(Self::Stream, SocketAddr)>;
        fn bind(&self, addr: SocketAddr) -> Result<Self::Iter, model::Error> {
            println!("bind: {}", addr);
            let stream = self.stream.lock()?.take();
            Ok(stream.map(|strm| (strm, self.src_addr)).into_iter())
        }
    }

    #[test]
    fn terminate_stops_relay() {
        let (server_end, mut client) = UnixStream::pair().unwrap();
        let binder = DummyBinder {
            stream: Mutex::new(Some(server_end)),
            src_addr: "127.0.0.1:50000".parse().unwrap(),
        };
        let connector =
            MapConnector::from_iter(vec![("10.0.0.1:80".parse().unwrap(), Outcome::Connect)]);
        let (tx_done, _rx_done) = mpsc::sync_channel(1);
        let (mut server, tx) = Server::with_binder(
            ServerConfig::default(),
            binder,
            tx_done,
            connector.clone(),
            CountingResolver::default(),
        );
        let th = thread::spawn(move || server.serve());

        client
            .write_all(&[5, 1, 0, 5, 1, 0, 1, 10, 0, 0, 1, 0, 80])
            .unwrap();
        let mut reply = [0u8; 12];
        client.read_exact(&mut reply).unwrap();
        assert_eq!(reply[..4], [5, 0, 5, 0]);

        tx.send(ServerCommand::Terminate).unwrap();
        th.join().unwrap().unwrap();

        // the relay closed the client connection on its way out
        let mut rest = vec![];
        assert_eq!(client.read_to_end(&mut rest).unwrap(), 0);
    }
}
