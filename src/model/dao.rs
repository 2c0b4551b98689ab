use super::error::Error;
use super::model::*;

/// Message level access to a SOCKS5 client connection.
pub trait SocksStream {
    fn recv_method_candidates(&mut self) -> Result<MethodCandidates, Error>;
    fn send_method_selection(&mut self, method: MethodSelection) -> Result<(), Error>;
    fn recv_credentials(&mut self) -> Result<Credentials, Error>;
    fn send_auth_reply(&mut self, reply: AuthReply) -> Result<(), Error>;
    fn recv_connect_request(&mut self) -> Result<ConnectRequest, Error>;
    fn send_connect_reply(&mut self, reply: ConnectReply) -> Result<(), Error>;
}
