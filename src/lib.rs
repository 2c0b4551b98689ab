//! This crate provides a library for constructing [SOCKS5](https://www.rfc-editor.org/rfc/rfc1928) proxy server.
//!
//! # Feature
//! ## Authentication
//!
//! Two methods are offered, in order of preference:
//!
//! * `X'02'` USERNAME/PASSWORD ([RFC1929](https://www.rfc-editor.org/rfc/rfc1929)).
//!   Any well-formed credentials are accepted, the user name identifies the session in logs.
//! * `X'00'` NO AUTHENTICATION REQUIRED
//!
//! A client offering neither is answered with `X'FF'` (NO ACCEPTABLE METHODS).
//!
//! ## Command
//!
//! Only `CONNECT` command is supported.
//! `BIND` and `UDP ASSOCIATE` requests end the session without a reply.
//!
//! Destinations are given as IPv4, IPv6 or domain name.
//! Domain names are resolved by the server, preferring IPv4 addresses.
//!
//! ## Relay
//!
//! After a successful `CONNECT`, bytes are relayed in both directions until either side closes.
//! An optional idle timeout ends relays with no traffic.
//!
//! # Usage
//!
//! ## Server
//!
//! Here is a minimum server example.
//!
//! ```rust
//! use std::{time::Duration, thread};
//! use ferry::*;
//! let mut config = ServerConfig::default();
//! config.server_port = 0; // any free port
//! let (mut server, tx) = Server::new(config);
//! let th = thread::spawn(move || server.serve());
//! thread::sleep(Duration::from_millis(100));
//! tx.send(ServerCommand::Terminate).unwrap();
//! th.join().unwrap().unwrap();
//! ```
//!
//! ## Logging
//!
//! Logs are emitted through the [`log`](https://docs.rs/log) facade.
//! Install a logger of your choice; `ferryd` uses `env_logger` and reads `RUST_LOG`.

pub mod acceptor;
mod auth_service;
mod byte_stream;
pub mod config;
pub mod connector;
pub mod error;
pub mod model;
mod raw_message;
mod readiness;
mod relay;
pub mod resolver;
mod rw_socks_stream;
pub mod server;
pub mod server_command;
mod session;
mod tcp_listener_ext;
mod test;
mod thread;

pub use config::*;
pub use model::model::*;
pub use server::*;
pub use server_command::*;
