use log::*;

use crate::model::{AuthReply, Credentials, Error, Method, SocksStream, USER_PASS_VERSION};

pub trait AuthService: Send {
    /// decide auth method from candidates
    ///
    /// # Details
    /// returns `None` means that no acceptable methods.
    fn select(&self, candidates: &[Method]) -> Result<Option<Method>, Error> {
        Ok(self
            .supported()
            .iter()
            .find(|method| candidates.contains(method))
            .copied())
    }

    /// enumerate supported auth method in order of preference
    fn supported(&self) -> &[Method];

    /// check credentials sent by the client
    fn verify(&self, credentials: &Credentials) -> bool;

    /// perform the sub-negotiation of `method`
    ///
    /// returns the authenticated user name if the method identifies the client.
    fn authorize<S>(&self, method: Method, socks: &mut S) -> Result<Option<String>, Error>
    where
        S: SocksStream,
    {
        match method {
            Method::NoAuth => Ok(None),
            Method::UserPass => {
                let credentials = socks.recv_credentials()?;
                trace!("credentials: {:?}", credentials);
                let accepted = self.verify(&credentials);
                socks.send_auth_reply(AuthReply {
                    version: USER_PASS_VERSION,
                    accepted,
                })?;
                if accepted {
                    Ok(Some(credentials.username))
                } else {
                    Err(Error::Authentication)
                }
            }
            _ => Err(Error::NoAcceptableMethod),
        }
    }
}

/// Prefers username/password authentication, falls back to no authentication.
///
/// Any well-formed credentials are accepted.
/// The user name is only used to identify the session.
#[derive(Debug, Clone)]
pub struct UserPassService {
    methods: [Method; 2],
}

impl UserPassService {
    pub fn new() -> Self {
        Self {
            methods: [Method::UserPass, Method::NoAuth],
        }
    }
}

impl Default for UserPassService {
    fn default() -> Self {
        Self::new()
    }
}

impl AuthService for UserPassService {
    fn supported(&self) -> &[Method] {
        &self.methods
    }

    fn verify(&self, _credentials: &Credentials) -> bool {
        true
    }
}
