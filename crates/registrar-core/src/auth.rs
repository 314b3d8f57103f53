//! Authorization hook for REGISTER
//!
//! Authorizers are configured per scheme (`digest`, `basic`, ...) and passed
//! to the registrar at construction. No scheme is built in.

use std::collections::HashMap;
use std::net::SocketAddr;
use std::sync::Arc;

use async_trait::async_trait;
use sipwire_sip_core::{HeaderAccess, HeaderName, Request, Response, StatusCode};
use sipwire_transaction_core::ProtocolError;
use tracing::debug;

/// One authentication scheme
#[async_trait]
pub trait Authorizer: Send + Sync {
    /// Scheme-specific challenge parameters for `peer`, placed before the
    /// realm in `WWW-Authenticate`
    fn challenge(&self, peer: SocketAddr) -> Option<String>;

    /// Checks the credentials following the scheme token in
    /// `Authorization`. A rejection is answered with the returned error.
    async fn authorize(
        &self,
        credentials: &str,
        request: &Request,
        peer: SocketAddr,
    ) -> Result<(), ProtocolError>;
}

/// Authorizers by lower-case scheme name
pub type Authorizers = HashMap<String, Arc<dyn Authorizer>>;

/// Result of checking a request against the configured authorizers
#[derive(Debug)]
pub enum AuthOutcome {
    /// No authorizers configured, or the credentials were accepted
    Authorized,
    /// No credentials; send this 401
    Challenge(Response),
}

/// 401 carrying one challenge per configured scheme, in scheme order
pub fn unauthorized(
    request: &Request,
    peer: SocketAddr,
    realm: &str,
    authorizers: &Authorizers,
) -> Response {
    let mut response = Response::from_request(StatusCode::UNAUTHORIZED, request);
    let mut schemes: Vec<_> = authorizers.iter().collect();
    schemes.sort_by(|a, b| a.0.cmp(b.0));
    for (scheme, authorizer) in schemes {
        let value = match authorizer.challenge(peer) {
            Some(challenge) => format!("{} {challenge},realm=\"{realm}\"", title_case(scheme)),
            None => format!("{} realm=\"{realm}\"", title_case(scheme)),
        };
        response.headers.add(HeaderName::WWW_AUTHENTICATE, value);
    }
    response
}

/// Checks `request` against `authorizers`
pub async fn check(
    request: &Request,
    peer: SocketAddr,
    realm: &str,
    authorizers: &Authorizers,
) -> Result<AuthOutcome, ProtocolError> {
    if authorizers.is_empty() {
        return Ok(AuthOutcome::Authorized);
    }
    let Some(header) = request.header(&HeaderName::AUTHORIZATION) else {
        return Ok(AuthOutcome::Challenge(unauthorized(
            request,
            peer,
            realm,
            authorizers,
        )));
    };
    let (scheme, credentials) = header
        .trim()
        .split_once(char::is_whitespace)
        .unwrap_or((header.trim(), ""));
    let Some(authorizer) = authorizers.get(&scheme.to_ascii_lowercase()) else {
        debug!(%scheme, %peer, "unsupported authorization scheme");
        return Err(ProtocolError::new(StatusCode::NOT_IMPLEMENTED));
    };
    authorizer
        .authorize(credentials.trim(), request, peer)
        .await?;
    Ok(AuthOutcome::Authorized)
}

fn title_case(scheme: &str) -> String {
    let mut chars = scheme.chars();
    match chars.next() {
        Some(first) => first.to_uppercase().chain(chars.flat_map(char::to_lowercase)).collect(),
        None => String::new(),
    }
}
