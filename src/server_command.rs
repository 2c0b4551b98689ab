//! Server control command
//!
use std::fmt;
use std::net::SocketAddr;

use crate::session::SessionId;

pub enum ServerCommand<T> {
    /// stop accepting, stop every session and return from `Server::serve`
    Terminate,
    /// connected stream and client address
    Connect(T, SocketAddr),
    /// the session has finished
    Disconnect(SessionId),
}

impl<T> fmt::Debug for ServerCommand<T> {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        use ServerCommand::*;
        match self {
            Terminate => write!(f, "Terminate"),
            Connect(_, addr) => write!(f, "Connect(_, {})", addr),
            Disconnect(id) => write!(f, "Disconnect({})", id),
        }
    }
}
