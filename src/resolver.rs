use std::net::{IpAddr, ToSocketAddrs};

use log::*;

use crate::model::Error;

/// Name resolution used for `ATYP = 3` destinations.
pub trait Resolver: Send {
    fn resolve(&self, domain: &str, port: u16) -> Result<IpAddr, Error>;
}

/// Resolve with getaddrinfo(3).
///
/// An IPv4 address is preferred; IPv6 is used only when the name has no IPv4 address.
#[derive(Debug, Clone, Default)]
pub struct SystemResolver;

impl SystemResolver {
    pub fn new() -> Self {
        Self
    }
}

impl Resolver for SystemResolver {
    fn resolve(&self, domain: &str, port: u16) -> Result<IpAddr, Error> {
        let not_resolved = || Error::DomainNotResolved {
            domain: domain.to_owned(),
            port,
        };
        let addrs: Vec<IpAddr> = match (domain, port).to_socket_addrs() {
            Ok(addrs) => addrs.map(|addr| addr.ip()).collect(),
            Err(err) => {
                debug!("resolve {}: {}", domain, err);
                return Err(not_resolved());
            }
        };
        trace!("resolve {}: {:?}", domain, addrs);
        prefer_ipv4(&addrs).ok_or_else(not_resolved)
    }
}

fn prefer_ipv4(addrs: &[IpAddr]) -> Option<IpAddr> {
    addrs
        .iter()
        .find(|addr| addr.is_ipv4())
        .or_else(|| addrs.first())
        .copied()
}
