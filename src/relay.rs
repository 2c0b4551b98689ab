use std::io;
use std::net::SocketAddr;
use std::sync::mpsc;
use std::time::{Duration, Instant};

use log::*;

use crate::byte_stream::ByteStream;
use crate::model::Error;
use crate::readiness::wait_readable;
use crate::session::SessionId;

/// Upper bound of bytes moved per readable event
pub const RELAY_CHUNK_SIZE: usize = 4096;

/// The readiness wait wakes up at this interval to observe termination requests.
/// Waking up without traffic does not end the relay.
pub const RELAY_TICK: Duration = Duration::from_millis(500);

/// Why the relay stopped. None of these is an error of the proxy.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Termination {
    /// client sent EOF
    ClientClosed,
    /// destination sent EOF
    RemoteClosed,
    ReadFailed,
    WriteFailed,
    IdleTimeout,
    /// stop message from the server
    Requested,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RelayStats {
    pub termination: Termination,
    /// bytes client ==> destination
    pub outbound: u64,
    /// bytes client <== destination
    pub incoming: u64,
}

enum Halt {
    Eof,
    ReadFailed,
    WriteFailed,
}

/// Relay bytes between `client_conn` and `server_conn` until either side closes.
///
/// * `id`
///    Session the relay belongs to.
/// * `client_addr`
///    The address of the client of this session.
/// * `server_addr`
///    The address of the destination.
/// * `rx`
///    Relay termination message Receiver.
/// * `idle_timeout`
///    Stop when neither side has been readable for this long. `None` waits forever.
///
/// Both connections are shut down and dropped on return, whatever the reason.
pub fn relay<C, S>(
    id: SessionId,
    client_addr: SocketAddr,
    server_addr: SocketAddr,
    mut client_conn: C,
    mut server_conn: S,
    rx: &mpsc::Receiver<()>,
    idle_timeout: Option<Duration>,
) -> Result<RelayStats, Error>
where
    C: ByteStream,
    S: ByteStream,
{
    info!("{}: relay: {} <=> {}", id, client_addr, server_addr);
    let result = relay_loop(id, &mut client_conn, &mut server_conn, rx, idle_timeout);
    client_conn.close().ok();
    server_conn.close().ok();
    match &result {
        Ok(stats) => info!(
            "{}: relay finished: {:?}: {} ==> {}: {} bytes, {} <== {}: {} bytes",
            id,
            stats.termination,
            client_addr,
            server_addr,
            stats.outbound,
            client_addr,
            server_addr,
            stats.incoming
        ),
        Err(err) => error!("{}: relay error: {}", id, err),
    }
    result
}

fn relay_loop<C, S>(
    id: SessionId,
    client_conn: &mut C,
    server_conn: &mut S,
    rx: &mpsc::Receiver<()>,
    idle_timeout: Option<Duration>,
) -> Result<RelayStats, Error>
where
    C: ByteStream,
    S: ByteStream,
{
    let mut buf = vec![0u8; RELAY_CHUNK_SIZE];
    let mut outbound = 0;
    let mut incoming = 0;
    let mut last_active = Instant::now();
    let fds = [client_conn.as_raw_fd(), server_conn.as_raw_fd()];

    let termination = loop {
        if termination_requested(rx) {
            break Termination::Requested;
        }
        let wait = match idle_timeout {
            Some(idle) => idle.saturating_sub(last_active.elapsed()).min(RELAY_TICK),
            None => RELAY_TICK,
        };
        let [client_ready, server_ready] = wait_readable(fds, Some(wait))?;
        if !client_ready && !server_ready {
            if idle_timeout.map_or(false, |idle| last_active.elapsed() >= idle) {
                break Termination::IdleTimeout;
            }
            continue;
        }
        last_active = Instant::now();

        if client_ready {
            match forward(&mut *client_conn, &mut *server_conn, &mut buf) {
                Ok(size) => {
                    trace!("{}: ==> {} bytes", id, size);
                    outbound += size as u64;
                }
                Err(halt) => break halt.termination(Termination::ClientClosed),
            }
        }
        if server_ready {
            match forward(&mut *server_conn, &mut *client_conn, &mut buf) {
                Ok(size) => {
                    trace!("{}: <== {} bytes", id, size);
                    incoming += size as u64;
                }
                Err(halt) => break halt.termination(Termination::RemoteClosed),
            }
        }
    };
    Ok(RelayStats {
        termination,
        outbound,
        incoming,
    })
}

impl Halt {
    fn termination(self, on_eof: Termination) -> Termination {
        match self {
            Halt::Eof => on_eof,
            Halt::ReadFailed => Termination::ReadFailed,
            Halt::WriteFailed => Termination::WriteFailed,
        }
    }
}

/// Move one chunk from `src` to `dst`
fn forward(
    mut src: impl io::Read,
    mut dst: impl io::Write,
    buf: &mut [u8],
) -> Result<usize, Halt> {
    use io::ErrorKind as K;
    let size = match src.read(buf) {
        Ok(0) => return Err(Halt::Eof),
        Ok(size) => size,
        Err(err) if err.kind() == K::Interrupted || err.kind() == K::WouldBlock => return Ok(0),
        Err(err) => {
            debug!("relay read error: {}", err);
            return Err(Halt::ReadFailed);
        }
    };
    dst.write_all(&buf[..size]).map_err(|err| {
        debug!("relay write error: {}", err);
        Halt::WriteFailed
    })?;
    Ok(size)
}

/// A stop message was sent, or the server has gone away.
fn termination_requested(rx: &mpsc::Receiver<()>) -> bool {
    use mpsc::TryRecvError;
    match rx.try_recv() {
        Ok(()) => true,
        Err(TryRecvError::Empty) => false,
        Err(TryRecvError::Disconnected) => true,
    }
}
