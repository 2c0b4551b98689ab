#![cfg(test)]
use std::io::{self, Read, Write};
use std::net::{Shutdown, SocketAddr, TcpListener, TcpStream};
use std::sync::mpsc;
use std::thread;
use std::time::Duration;

use rand::distributions::Standard;
use rand::{thread_rng, Rng};
use socks::{Socks5Stream, TargetAddr};

use crate::config::ServerConfig;
use crate::error::Error;
use crate::server::Server;
use crate::server_command::ServerCommand;

const CLIENT_TIMEOUT: Duration = Duration::from_secs(5);

fn free_port() -> u16 {
    TcpListener::bind("127.0.0.1:0")
        .unwrap()
        .local_addr()
        .unwrap()
        .port()
}

fn gen_random_vec(size: usize) -> Vec<u8> {
    thread_rng().sample_iter(Standard).take(size).collect()
}

/// A running proxy, terminated on drop
struct Proxy {
    addr: SocketAddr,
    tx: mpsc::Sender<ServerCommand<TcpStream>>,
    th: Option<thread::JoinHandle<Result<(), Error>>>,
}

impl Proxy {
    fn start() -> Self {
        Self::start_with(|_| {})
    }

    fn start_with(tweak: impl FnOnce(&mut ServerConfig)) -> Self {
        let mut config = ServerConfig::new("127.0.0.1".parse().unwrap(), free_port());
        config.set_accept_timeout(Some(Duration::from_millis(100)));
        tweak(&mut config);
        let addr = config.server_addr();
        let (mut server, tx) = Server::new(config);
        let th = thread::spawn(move || server.serve());

        // wait for the listener
        for _ in 0..100 {
            if TcpStream::connect(addr).is_ok() {
                break;
            }
            thread::sleep(Duration::from_millis(20));
        }
        Self {
            addr,
            tx,
            th: Some(th),
        }
    }

    fn stop(&mut self) {
        if let Some(th) = self.th.take() {
            self.tx.send(ServerCommand::Terminate).unwrap();
            th.join().unwrap().unwrap();
        }
    }

    fn raw_client(&self) -> TcpStream {
        let strm = TcpStream::connect(self.addr).unwrap();
        strm.set_read_timeout(Some(CLIENT_TIMEOUT)).unwrap();
        strm
    }
}

impl Drop for Proxy {
    fn drop(&mut self) {
        self.stop();
    }
}

/// Echo server accepting a single connection.
/// The peer address it sees is sent to the returned receiver.
fn spawn_echo_server() -> (SocketAddr, mpsc::Receiver<SocketAddr>) {
    let listener = TcpListener::bind("127.0.0.1:0").unwrap();
    let addr = listener.local_addr().unwrap();
    let (tx, rx) = mpsc::channel();
    thread::spawn(move || {
        let (mut strm, peer) = listener.accept().unwrap();
        tx.send(peer).unwrap();
        let mut rd = strm.try_clone().unwrap();
        io::copy(&mut rd, &mut strm).ok();
    });
    (addr, rx)
}

fn echo_round_trip(conn: &mut Socks5Stream, size: usize) {
    let payload = gen_random_vec(size);
    let mut writer = conn.get_ref().try_clone().unwrap();
    let th = {
        let payload = payload.clone();
        thread::spawn(move || writer.write_all(&payload).unwrap())
    };
    let mut received = vec![0u8; size];
    conn.read_exact(&mut received).unwrap();
    th.join().unwrap();
    assert_eq!(received, payload);
}

fn assert_bound_to(conn: &Socks5Stream, peer: SocketAddr) {
    match conn.proxy_addr() {
        TargetAddr::Ip(addr) => assert_eq!(*addr, peer),
        other => panic!("unexpected bound address: {:?}", other),
    }
}

/// Read until the proxy closes the connection.
/// A reset is accepted as a close when the proxy left unread input behind.
fn read_until_close(strm: &mut TcpStream) -> Vec<u8> {
    let mut buf = vec![];
    match strm.read_to_end(&mut buf) {
        Ok(_) => {}
        Err(err) => assert_eq!(err.kind(), io::ErrorKind::ConnectionReset),
    }
    buf
}

#[test]
fn connect_no_auth() {
    let proxy = Proxy::start();
    let (target, rx_peer) = spawn_echo_server();

    let mut conn = Socks5Stream::connect(proxy.addr, target).unwrap();
    conn.get_ref().set_read_timeout(Some(CLIENT_TIMEOUT)).unwrap();
    // BND.ADDR/BND.PORT is the address the destination sees
    assert_bound_to(&conn, rx_peer.recv().unwrap());

    echo_round_trip(&mut conn, 3 * 4096 + 123);
    echo_round_trip(&mut conn, 1);
}

#[test]
fn connect_with_password() {
    let proxy = Proxy::start();
    let (target, rx_peer) = spawn_echo_server();

    let mut conn =
        Socks5Stream::connect_with_password(proxy.addr, target, "alice", "secret").unwrap();
    conn.get_ref().set_read_timeout(Some(CLIENT_TIMEOUT)).unwrap();
    assert_bound_to(&conn, rx_peer.recv().unwrap());
    echo_round_trip(&mut conn, 10_000);
}

#[test]
fn connect_domain() {
    let proxy = Proxy::start();
    let (target, rx_peer) = spawn_echo_server();

    let mut conn = Socks5Stream::connect(proxy.addr, ("localhost", target.port())).unwrap();
    conn.get_ref().set_read_timeout(Some(CLIENT_TIMEOUT)).unwrap();
    assert_bound_to(&conn, rx_peer.recv().unwrap());
    echo_round_trip(&mut conn, 5000);
}

#[test]
fn client_close_closes_destination() {
    let proxy = Proxy::start();
    let listener = TcpListener::bind("127.0.0.1:0").unwrap();
    let target = listener.local_addr().unwrap();

    let mut conn = Socks5Stream::connect(proxy.addr, target).unwrap();
    let (mut remote, _) = listener.accept().unwrap();
    remote.set_read_timeout(Some(CLIENT_TIMEOUT)).unwrap();

    conn.write_all(b"last words").unwrap();
    conn.get_ref().shutdown(Shutdown::Write).unwrap();
    let mut received = vec![];
    remote.read_to_end(&mut received).unwrap();
    assert_eq!(received, b"last words");
}

#[test]
fn no_acceptable_method() {
    let proxy = Proxy::start();
    let mut client = proxy.raw_client();
    // GSSAPI only
    client.write_all(&[5, 1, 1]).unwrap();
    assert_eq!(read_until_close(&mut client), [5, 0xff]);
}

#[test]
fn wrong_version_without_reply() {
    let proxy = Proxy::start();
    let mut client = proxy.raw_client();
    client.write_all(&[4, 1]).unwrap();
    assert!(read_until_close(&mut client).is_empty());
}

#[test]
fn bind_not_supported() {
    let proxy = Proxy::start();
    let mut client = proxy.raw_client();
    client
        .write_all(&[5, 1, 0, 5, 2, 0, 1, 127, 0, 0, 1, 0, 80])
        .unwrap();
    assert_eq!(read_until_close(&mut client), [5, 0]);
}

#[test]
fn connection_refused() {
    let proxy = Proxy::start();
    let port = free_port().to_be_bytes();
    let mut client = proxy.raw_client();
    client
        .write_all(&[5, 1, 0, 5, 1, 0, 1, 127, 0, 0, 1, port[0], port[1]])
        .unwrap();
    assert_eq!(
        read_until_close(&mut client),
        [5, 0, 5, 5, 0, 1, 0, 0, 0, 0, 0, 0]
    );
}

#[test]
fn relay_survives_slow_reader() {
    const SIZE: usize = 8 << 20;
    let proxy = Proxy::start_with(|config| {
        config.set_client_rw_timeout(Some(Duration::from_millis(300)));
    });
    let listener = TcpListener::bind("127.0.0.1:0").unwrap();
    let target = listener.local_addr().unwrap();
    let server = thread::spawn(move || {
        let (mut strm, _) = listener.accept().unwrap();
        strm.write_all(&vec![0xa5; SIZE]).unwrap();
    });

    let mut conn = Socks5Stream::connect(proxy.addr, target).unwrap();
    conn.get_ref().set_read_timeout(Some(CLIENT_TIMEOUT)).unwrap();
    // stop reading for longer than the handshake timeout
    thread::sleep(Duration::from_secs(1));
    let mut received = vec![];
    conn.read_to_end(&mut received).unwrap();
    server.join().unwrap();
    assert_eq!(received.len(), SIZE);
}

#[test]
fn terminate_closes_relay() {
    let mut proxy = Proxy::start();
    let (target, _rx_peer) = spawn_echo_server();
    let mut conn = Socks5Stream::connect(proxy.addr, target).unwrap();
    conn.get_ref().set_read_timeout(Some(CLIENT_TIMEOUT)).unwrap();
    echo_round_trip(&mut conn, 100);

    proxy.stop();
    let mut rest = vec![];
    assert_eq!(conn.read_to_end(&mut rest).unwrap(), 0);
}
