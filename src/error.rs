#![allow(non_local_definitions)]

use std::net::SocketAddr;

use thiserror::Error;

use crate::model;

pub type Result<T> = ::std::result::Result<T, Error>;

/// Error of the public API (`Server::serve`, `ServerConfig::with_file`).
#[derive(Error, Debug)]
pub enum Error {
    #[error("io error: {0}")]
    Io(#[source] anyhow::Error),
    #[error("config error: {0:#}")]
    Config(#[source] anyhow::Error),
    #[error("cannot bind: {addr}")]
    Bind { addr: SocketAddr },
    /// anything else raised below the server loop
    #[error("{0}")]
    Session(#[source] model::Error),
}

impl From<std::io::Error> for Error {
    fn from(err: std::io::Error) -> Self {
        Error::Io(err.into())
    }
}

impl From<model::Error> for Error {
    fn from(err: model::Error) -> Self {
        match err {
            model::Error::Io(io_err) => Error::Io(io_err),
            model::Error::AddressAlreadyInUse { addr } => Error::Bind { addr },
            model::Error::AddressNotAvailable { addr } => Error::Bind { addr },
            err => Error::Session(err),
        }
    }
}
