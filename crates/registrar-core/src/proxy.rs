//! Stateless forwarding
//!
//! A [`Proxy`] forwards every request the registrar does not answer itself
//! to the contact its [`Locator`] reports for the Request-URI, and relays
//! the responses back along the Via path. It keeps no transaction state:
//! the branch it stamps is derived from the incoming request, so a
//! retransmission, its CANCEL and the ACK for a failure response all leave
//! with the branch of the original request.

use std::net::SocketAddr;
use std::sync::{Arc, OnceLock};

use async_trait::async_trait;
use sipwire_sip_core::{
    BRANCH_MAGIC_COOKIE, DEFAULT_SIP_PORT, HeaderAccess, HeaderName, Method, Request, Response,
    StatusCode, Via,
};
use sipwire_transaction_core::builders::DEFAULT_MAX_FORWARDS;
use sipwire_transaction_core::{LayerHandle, RequestError};
use tracing::{debug, trace, warn};
use uuid::Uuid;

use crate::handler::RequestHandler;
use crate::registry::Locator;

/// Forwards requests to located contacts without keeping transactions
pub struct Proxy {
    locator: Arc<dyn Locator>,
    layer: OnceLock<LayerHandle>,
}

impl Proxy {
    pub fn new(locator: Arc<dyn Locator>) -> Self {
        Self {
            locator,
            layer: OnceLock::new(),
        }
    }

    fn layer(&self) -> Result<&LayerHandle, RequestError> {
        self.layer
            .get()
            .ok_or_else(|| {
                RequestError::from(anyhow::anyhow!(
                    "proxy used before the transaction layer started"
                ))
            })
    }

    /// Forwards `request` to the contact bound to its Request-URI
    ///
    /// Returns the error response when the request cannot be forwarded:
    /// 482 when it already passed through this proxy, 483 when
    /// Max-Forwards ran out, 404 when the user cannot be located. An ACK
    /// that cannot be forwarded is dropped.
    pub async fn forward(
        &self,
        request: &Request,
        source: SocketAddr,
    ) -> Result<Option<Response>, RequestError> {
        let layer = self.layer()?;
        let vias = request.vias().map_err(|error| {
            RequestError::from(anyhow::anyhow!("unparsable Via reached the proxy: {error}"))
        })?;
        let Some(top) = vias.first() else {
            return Ok(refuse(request, StatusCode::BAD_REQUEST));
        };

        if vias.iter().any(|via| layer.is_local_via(via)) {
            warn!(%source, method = %request.method, uri = %request.uri, "request looped back to this proxy");
            return Ok(refuse(request, StatusCode::LOOP_DETECTED));
        }

        let max_forwards = match request.header(&HeaderName::MAX_FORWARDS) {
            None => DEFAULT_MAX_FORWARDS,
            Some(value) => match value.trim().parse::<u32>() {
                Ok(value) => value,
                Err(_) => return Ok(refuse(request, StatusCode::BAD_REQUEST)),
            },
        };
        if max_forwards == 0 {
            debug!(%source, method = %request.method, "Max-Forwards exhausted");
            return Ok(refuse(request, StatusCode::TOO_MANY_HOPS));
        }

        let contact = match self.locator.address(&request.uri).await {
            Ok(contact) => contact,
            Err(error) => {
                debug!(%source, uri = %request.uri, %error, "cannot locate target");
                return Ok(refuse(request, StatusCode::NOT_FOUND));
            }
        };
        let port = contact.port.unwrap_or(DEFAULT_SIP_PORT);
        let target = match layer.resolve(&contact.host, port).await {
            Ok(target) => target,
            Err(error) => {
                debug!(contact = %contact, %error, "cannot resolve located contact");
                return Ok(refuse(request, StatusCode::NOT_FOUND));
            }
        };

        let mut forwarded = request.clone();
        forwarded.uri = contact.clean_for_request_line();
        forwarded
            .headers
            .set(HeaderName::MAX_FORWARDS, (max_forwards - 1).to_string());
        let via = Via::new(layer.default_hostname(), Some(layer.port()))
            .with_branch(stateless_branch(layer, request, top));
        forwarded.push_via(&via);

        match layer.send_request(forwarded, target).await {
            Ok(()) => {
                debug!(%source, %target, method = %request.method, "request forwarded");
                Ok(None)
            }
            Err(error) => {
                warn!(%target, %error, "failed to forward request");
                Ok(refuse(request, StatusCode::SERVER_INTERNAL_ERROR))
            }
        }
    }

    /// Relays a response to a forwarded request: pops this proxy's Via and
    /// sends the response along the next one
    pub async fn relay_response(&self, mut response: Response) {
        let Ok(layer) = self.layer() else {
            return;
        };
        match response.top_via() {
            Ok(via) if layer.is_local_via(&via) => {}
            _ => {
                debug!(status = %response.status, "response not addressed to this proxy dropped");
                return;
            }
        }
        response.pop_via();
        if !response.has_header(&HeaderName::VIA) {
            debug!(status = %response.status, "response to a request this proxy originated");
            return;
        }
        if let Err(error) = layer.send_response(response).await {
            warn!(%error, "failed to relay response");
        }
    }
}

#[async_trait]
impl RequestHandler for Proxy {
    fn start(&self, layer: &LayerHandle) {
        let _ = self.layer.set(layer.clone());
    }

    async fn handle(
        &self,
        request: &Request,
        source: SocketAddr,
    ) -> Result<Option<Response>, RequestError> {
        self.forward(request, source).await
    }
}

impl std::fmt::Debug for Proxy {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Proxy")
            .field("started", &self.layer.get().is_some())
            .finish()
    }
}

fn refuse(request: &Request, status: StatusCode) -> Option<Response> {
    if request.method == Method::Ack {
        trace!(%status, "ACK dropped instead of answered");
        return None;
    }
    Some(Response::from_request(status, request))
}

/// Branch for the Via this proxy adds, a function of the request's own
/// branch (or, for RFC 2543 peers, of the fields that identify it)
fn stateless_branch(layer: &LayerHandle, request: &Request, top: &Via) -> String {
    let identity = if top.is_rfc3261_compliant() {
        top.branch.clone().unwrap_or_default()
    } else {
        format!(
            "{};{};{};{};{}",
            request.uri,
            request.call_id().unwrap_or_default(),
            request.from_tag().unwrap_or_default(),
            request.cseq().map(|cseq| cseq.seq).unwrap_or_default(),
            top,
        )
    };
    let key = format!("{}:{};{}", layer.default_hostname(), layer.port(), identity);
    let digest = Uuid::new_v5(&Uuid::NAMESPACE_OID, key.as_bytes());
    format!("{BRANCH_MAGIC_COOKIE}{}", digest.simple())
}
