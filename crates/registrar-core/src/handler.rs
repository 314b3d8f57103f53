//! Per-method request handlers
//!
//! Requests are dispatched on their method through a [`HandlerMap`]; methods
//! without a handler of their own go to the map's default handler, which
//! answers 501 Not Implemented unless replaced.

use std::collections::HashMap;
use std::fmt;
use std::net::SocketAddr;
use std::sync::Arc;

use async_trait::async_trait;
use sipwire_sip_core::{Method, Request, Response, StatusCode};
use sipwire_transaction_core::{LayerHandle, RequestError};
use tracing::trace;

/// Handles the requests of one method
///
/// `Ok(Some(response))` is sent through the request's server transaction;
/// `Ok(None)` absorbs the request without a transaction. Errors are
/// answered by the transaction layer.
#[async_trait]
pub trait RequestHandler: Send + Sync {
    /// The transaction layer the handler runs on has started
    fn start(&self, _layer: &LayerHandle) {}

    async fn handle(
        &self,
        request: &Request,
        source: SocketAddr,
    ) -> Result<Option<Response>, RequestError>;
}

/// Answers every request with 501 Not Implemented
#[derive(Debug, Default, Clone, Copy)]
pub struct NotImplemented;

#[async_trait]
impl RequestHandler for NotImplemented {
    async fn handle(
        &self,
        request: &Request,
        _source: SocketAddr,
    ) -> Result<Option<Response>, RequestError> {
        Ok(Some(Response::from_request(
            StatusCode::NOT_IMPLEMENTED,
            request,
        )))
    }
}

/// Absorbs ACKs. An ACK for a non-2xx final response is consumed by its
/// INVITE server transaction; one reaching a handler acknowledges a 2xx and
/// needs no answer.
#[derive(Debug, Default, Clone, Copy)]
pub struct AckHandler;

#[async_trait]
impl RequestHandler for AckHandler {
    async fn handle(
        &self,
        _request: &Request,
        source: SocketAddr,
    ) -> Result<Option<Response>, RequestError> {
        trace!(%source, "ACK absorbed");
        Ok(None)
    }
}

/// Method to handler mapping with a fallback
#[derive(Clone)]
pub struct HandlerMap {
    handlers: HashMap<Method, Arc<dyn RequestHandler>>,
    default: Arc<dyn RequestHandler>,
}

impl HandlerMap {
    /// Map with no handlers, falling back to [`NotImplemented`]
    pub fn new() -> Self {
        Self::with_default(Arc::new(NotImplemented))
    }

    /// Map with no handlers, falling back to `default`
    pub fn with_default(default: Arc<dyn RequestHandler>) -> Self {
        Self {
            handlers: HashMap::new(),
            default,
        }
    }

    /// Builder-style [`insert`](HandlerMap::insert)
    pub fn with_handler(mut self, method: Method, handler: Arc<dyn RequestHandler>) -> Self {
        self.insert(method, handler);
        self
    }

    /// Routes `method` to `handler`, returning the handler it replaces
    pub fn insert(
        &mut self,
        method: Method,
        handler: Arc<dyn RequestHandler>,
    ) -> Option<Arc<dyn RequestHandler>> {
        self.handlers.insert(method, handler)
    }

    /// Replaces the fallback handler
    pub fn set_default(&mut self, default: Arc<dyn RequestHandler>) {
        self.default = default;
    }

    /// Hands `layer` to every handler
    pub fn start(&self, layer: &LayerHandle) {
        self.default.start(layer);
        for handler in self.handlers.values() {
            handler.start(layer);
        }
    }

    /// Handler for `method`
    pub fn handler_for(&self, method: &Method) -> &Arc<dyn RequestHandler> {
        self.handlers.get(method).unwrap_or(&self.default)
    }

    /// Whether `method` has a handler of its own
    pub fn handles(&self, method: &Method) -> bool {
        self.handlers.contains_key(method)
    }
}

impl Default for HandlerMap {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for HandlerMap {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut methods: Vec<_> = self.handlers.keys().map(Method::as_str).collect();
        methods.sort_unstable();
        f.debug_struct("HandlerMap").field("methods", &methods).finish()
    }
}
