//! REGISTER handling, RFC 3261 section 10.3
//!
//! One binding per address-of-record. The contact host and port are taken
//! from where the REGISTER came from, not from what the client wrote, so a
//! client behind NAT is reached at its public address.

use std::net::SocketAddr;
use std::sync::Arc;

use async_trait::async_trait;
use sipwire_sip_core::{Address, HeaderAccess, HeaderName, Request, Response, StatusCode, Uri};
use sipwire_transaction_core::RequestError;
use tracing::debug;

use crate::auth::{self, AuthOutcome, Authorizers};
use crate::config::RegistrarConfig;
use crate::error::{RegistrarError, Result};
use crate::handler::RequestHandler;
use crate::registry::{Registration, Registry};

/// What a REGISTER asks for
#[derive(Debug, Clone)]
enum Intent {
    /// No Contact: report the current binding
    Query,
    /// Bind this contact for the requested lifetime
    Register { contact: Uri, expires: Option<u32> },
    /// `Expires: 0`, for one contact or `*`
    Unregister,
}

/// Handler for REGISTER requests
pub struct RegisterHandler {
    config: RegistrarConfig,
    registry: Arc<dyn Registry>,
    authorizers: Authorizers,
}

impl RegisterHandler {
    /// Handler binding into `registry`, with no authorization
    pub fn new(config: RegistrarConfig, registry: Arc<dyn Registry>) -> Self {
        Self::with_authorizers(config, registry, Authorizers::new())
    }

    /// Handler that requires credentials for one of `authorizers`
    pub fn with_authorizers(
        config: RegistrarConfig,
        registry: Arc<dyn Registry>,
        authorizers: Authorizers,
    ) -> Self {
        Self {
            config,
            registry,
            authorizers,
        }
    }

    /// Settings in use
    pub fn config(&self) -> &RegistrarConfig {
        &self.config
    }

    async fn process(&self, request: &Request, source: SocketAddr) -> Result<Response> {
        let to = request
            .to_address()
            .map_err(|error| RegistrarError::InvalidTo(error.to_string()))?;
        let logical = to.uri;

        match intent(request, source)? {
            Intent::Query => {
                let registration = self.registry.registration_info(&logical).await?;
                Ok(binding_response(request, &registration))
            }
            Intent::Register { contact, expires } => {
                let expires = self.config.grant(expires);
                let registration = self
                    .registry
                    .register_address(&request.uri, &logical, contact, expires)
                    .await?;
                Ok(binding_response(request, &registration))
            }
            Intent::Unregister => {
                let registration = self
                    .registry
                    .unregister_address(&request.uri, &logical)
                    .await?;
                Ok(binding_response(request, &registration))
            }
        }
    }
}

impl std::fmt::Debug for RegisterHandler {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let mut schemes: Vec<_> = self.authorizers.keys().collect();
        schemes.sort();
        f.debug_struct("RegisterHandler")
            .field("config", &self.config)
            .field("schemes", &schemes)
            .finish()
    }
}

#[async_trait]
impl RequestHandler for RegisterHandler {
    async fn handle(
        &self,
        request: &Request,
        source: SocketAddr,
    ) -> std::result::Result<Option<Response>, RequestError> {
        if let AuthOutcome::Challenge(challenge) =
            auth::check(request, source, &self.config.domain, &self.authorizers).await?
        {
            debug!(%source, "REGISTER without credentials challenged");
            return Ok(Some(challenge));
        }
        match self.process(request, source).await {
            Ok(response) => Ok(Some(response)),
            Err(error) => {
                debug!(%source, %error, "REGISTER refused");
                Err(error.into())
            }
        }
    }
}

fn intent(request: &Request, source: SocketAddr) -> Result<Intent> {
    let expires = match request.header(&HeaderName::EXPIRES) {
        Some(value) => Some(
            value
                .trim()
                .parse::<u32>()
                .map_err(|_| RegistrarError::InvalidExpires(value.to_string()))?,
        ),
        None => None,
    };
    let Some(contact) = request.header(&HeaderName::CONTACT) else {
        return Ok(Intent::Query);
    };

    if contact.trim() == "*" {
        return match expires {
            Some(0) => Ok(Intent::Unregister),
            _ => Err(RegistrarError::InvalidContact(
                "* requires Expires: 0".to_string(),
            )),
        };
    }
    let address: Address = contact
        .parse()
        .map_err(|_| RegistrarError::InvalidContact(contact.to_string()))?;
    let expires = expires.or_else(|| address.expires());
    if expires == Some(0) {
        return Ok(Intent::Unregister);
    }

    let mut uri = address.uri;
    uri.host = source.ip().to_string();
    uri.port = Some(source.port());
    Ok(Intent::Register {
        contact: uri,
        expires,
    })
}

/// 200 OK reporting `registration`
fn binding_response(request: &Request, registration: &Registration) -> Response {
    Response::from_request(StatusCode::OK, request)
        .with_header(HeaderName::CONTACT, format!("<{}>", registration.contact))
        .with_header(HeaderName::EXPIRES, registration.seconds_to_expiry.to_string())
}
