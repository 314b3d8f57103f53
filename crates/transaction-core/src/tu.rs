//! The Transaction User contract
//!
//! The TU sits above the transaction layer (RFC 3261 section 5): it decides
//! how to answer new requests and consumes the responses to the requests
//! it sent. The layer awaits each callback on its own event loop, so
//! callbacks should not block; everything a TU does through a
//! [`LayerHandle`] or transaction handle only queues work and never waits
//! on the loop.

use std::fmt;
use std::net::SocketAddr;

use async_trait::async_trait;
use sipwire_sip_core::{Request, Response, StatusCode};
use thiserror::Error;

use crate::handle::{ClientTransaction, LayerHandle, ServerTransaction};

/// A failure that maps onto a SIP status code
///
/// Raised by the TU; the layer turns it into a response and sends it
/// through a fresh server transaction.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProtocolError {
    /// Status code of the response to send
    pub status: StatusCode,
    /// Reason phrase, the standard one when `None`
    pub reason: Option<String>,
}

impl ProtocolError {
    /// Error with the standard reason phrase
    pub fn new(status: StatusCode) -> Self {
        Self {
            status,
            reason: None,
        }
    }

    /// Error with a custom reason phrase
    pub fn with_reason(status: StatusCode, reason: impl Into<String>) -> Self {
        Self {
            status,
            reason: Some(reason.into()),
        }
    }

    /// Reason phrase to put on the status line
    pub fn reason(&self) -> &str {
        self.reason
            .as_deref()
            .unwrap_or_else(|| self.status.reason_phrase())
    }

    /// Response carrying this error back to the sender of `request`
    pub fn to_response(&self, request: &Request) -> Response {
        Response::from_request(self.status, request).with_reason(self.reason())
    }
}

impl fmt::Display for ProtocolError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {}", self.status, self.reason())
    }
}

impl std::error::Error for ProtocolError {}

impl From<StatusCode> for ProtocolError {
    fn from(status: StatusCode) -> Self {
        ProtocolError::new(status)
    }
}

/// Failure of [`TransactionUser::request_received`]
#[derive(Debug, Error)]
pub enum RequestError {
    /// Answered with the carried status code
    #[error("protocol error: {0}")]
    Protocol(#[from] ProtocolError),

    /// Anything else; answered with 500 Server Internal Error
    #[error("internal error: {0}")]
    Internal(#[from] anyhow::Error),
}

impl RequestError {
    /// The response the layer sends for this error
    pub fn to_response(&self, request: &Request) -> Response {
        match self {
            RequestError::Protocol(error) => error.to_response(request),
            RequestError::Internal(_) => {
                Response::from_request(StatusCode::SERVER_INTERNAL_ERROR, request)
            }
        }
    }
}

/// Outcome of [`TransactionUser::request_received`]: the server transaction
/// to keep for the request, or `None` when the request needs none (an ACK
/// for a 2xx, or a request answered statelessly)
pub type RequestOutcome = Result<Option<ServerTransaction>, RequestError>;

/// The layer above the transaction layer
#[async_trait]
pub trait TransactionUser: Send + Sync + 'static {
    /// Called once, before the layer processes any traffic
    fn start(&self, _layer: LayerHandle) {}

    /// A request that matched no existing server transaction
    ///
    /// `transaction` is a fresh server transaction for this request.
    /// Returning it registers it with the layer, so retransmissions are
    /// absorbed and responses sent through it are retransmitted as needed.
    /// For INVITE the layer sends 100 Trying right after registration.
    async fn request_received(
        &self,
        request: Request,
        source: SocketAddr,
        transaction: ServerTransaction,
    ) -> RequestOutcome;

    /// A response, together with the client transaction it belongs to.
    /// Responses that match no client transaction arrive with `None`.
    async fn response_received(&self, response: Response, transaction: Option<ClientTransaction>);

    /// A client transaction reached `Terminated`
    async fn client_transaction_terminated(&self, _transaction: ClientTransaction) {}
}

#[cfg(test)]
mod tests {
    use sipwire_sip_core::prelude::*;

    use super::*;
    use crate::transaction::test_support::request;

    #[test]
    fn test_protocol_error_response() {
        let register = request(Method::Register);
        let error = ProtocolError::new(StatusCode::NOT_FOUND);
        let response = error.to_response(&register);
        assert_eq!(response.status, StatusCode::NOT_FOUND);
        assert_eq!(response.reason, "Not Found");

        let custom = ProtocolError::with_reason(StatusCode::BAD_REQUEST, "Bad Expires");
        assert_eq!(custom.to_response(&register).reason, "Bad Expires");
        assert_eq!(custom.to_string(), "400 Bad Expires");
    }

    #[test]
    fn test_internal_error_is_500() {
        let register = request(Method::Register);
        let error = RequestError::from(anyhow::anyhow!("database unavailable"));
        assert_eq!(
            error.to_response(&register).status,
            StatusCode::SERVER_INTERNAL_ERROR
        );
    }
}
