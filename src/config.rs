use std::fs::File;
use std::io;
use std::path::Path;
use std::time::Duration;

use anyhow::Context;
use serde::{Deserialize, Deserializer};

use crate::error::Error;
use crate::model::{IpAddr, Ipv4Addr, SocketAddr};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ServerConfig {
    pub server_ip: IpAddr,
    pub server_port: u16,
    /// read/write timeout of client connections during the handshake
    pub client_rw_timeout: Option<Duration>,
    /// timeout for connecting to the destination
    pub connect_timeout: Option<Duration>,
    /// read/write timeout of destination connections
    pub server_rw_timeout: Option<Duration>,
    /// interval the acceptor checks for termination
    pub accept_timeout: Option<Duration>,
    /// end a relay when neither side has sent anything for this long
    pub relay_idle_timeout: Option<Duration>,
}

/// Keys of the yaml config file. Timeouts are in milliseconds.
///
/// An absent key keeps the default, `null` waits indefinitely.
#[derive(Debug, Default, Deserialize, PartialEq)]
#[serde(default, deny_unknown_fields)]
struct ConfigFile {
    #[serde(deserialize_with = "present")]
    client_rw_timeout: Option<Option<u64>>,
    #[serde(deserialize_with = "present")]
    connect_timeout: Option<Option<u64>>,
    #[serde(deserialize_with = "present")]
    server_rw_timeout: Option<Option<u64>>,
    #[serde(deserialize_with = "present")]
    accept_timeout: Option<Option<u64>>,
    #[serde(deserialize_with = "present")]
    relay_idle_timeout: Option<Option<u64>>,
}

/// distinguish `key: null` from an absent key
fn present<'de, D>(de: D) -> Result<Option<Option<u64>>, D::Error>
where
    D: Deserializer<'de>,
{
    Option::<u64>::deserialize(de).map(Some)
}

fn override_timeout(slot: &mut Option<Duration>, millis: Option<Option<u64>>) {
    if let Some(millis) = millis {
        *slot = millis.map(Duration::from_millis);
    }
}

impl ServerConfig {
    pub fn new(server_ip: IpAddr, server_port: u16) -> Self {
        Self {
            server_ip,
            server_port,
            ..Self::default()
        }
    }

    pub fn with_file(server_ip: IpAddr, server_port: u16, path: &Path) -> Result<Self, Error> {
        let file = File::open(path)
            .with_context(|| format!("open {}", path.display()))
            .map_err(Error::Config)?;
        Self::from_reader(server_ip, server_port, file)
            .with_context(|| format!("load {}", path.display()))
            .map_err(Error::Config)
    }

    fn from_reader(
        server_ip: IpAddr,
        server_port: u16,
        mut rdr: impl io::Read,
    ) -> anyhow::Result<Self> {
        let mut yaml = String::new();
        rdr.read_to_string(&mut yaml)?;
        // an empty document overrides nothing
        let file: ConfigFile = if yaml.trim().is_empty() {
            ConfigFile::default()
        } else {
            serde_yaml::from_str(&yaml)?
        };
        let mut config = Self::new(server_ip, server_port);
        override_timeout(&mut config.client_rw_timeout, file.client_rw_timeout);
        override_timeout(&mut config.connect_timeout, file.connect_timeout);
        override_timeout(&mut config.server_rw_timeout, file.server_rw_timeout);
        override_timeout(&mut config.accept_timeout, file.accept_timeout);
        override_timeout(&mut config.relay_idle_timeout, file.relay_idle_timeout);
        Ok(config)
    }
}

impl Default for ServerConfig {
    fn default() -> Self {
        ServerConfig {
            server_ip: Ipv4Addr::new(0, 0, 0, 0).into(),
            server_port: 1080,
            client_rw_timeout: Some(Duration::from_secs(10)),
            connect_timeout: Some(Duration::from_secs(10)),
            server_rw_timeout: None,
            accept_timeout: Some(Duration::from_secs(3)),
            relay_idle_timeout: None,
        }
    }
}

impl ServerConfig {
    pub fn server_addr(&self) -> SocketAddr {
        SocketAddr::new(self.server_ip, self.server_port)
    }

    pub fn set_client_rw_timeout(&mut self, dur: Option<Duration>) -> &mut Self {
        self.client_rw_timeout = dur;
        self
    }

    pub fn set_connect_timeout(&mut self, dur: Option<Duration>) -> &mut Self {
        self.connect_timeout = dur;
        self
    }

    pub fn set_server_rw_timeout(&mut self, dur: Option<Duration>) -> &mut Self {
        self.server_rw_timeout = dur;
        self
    }

    /// `None` makes the acceptor block in accept(2), then `Terminate` is observed only
    /// after the next connection.
    pub fn set_accept_timeout(&mut self, dur: Option<Duration>) -> &mut Self {
        self.accept_timeout = dur;
        self
    }

    pub fn set_relay_idle_timeout(&mut self, dur: Option<Duration>) -> &mut Self {
        self.relay_idle_timeout = dur;
        self
    }
}
