use std::net::SocketAddr;
use std::sync::{Arc, OnceLock};

use async_trait::async_trait;
use sipwire_sip_core::{Method, Request, Response};
use sipwire_transaction_core::{
    ClientTransaction, LayerHandle, RequestOutcome, ServerTransaction, TransactionUser,
};
use tracing::{debug, info, warn};

use crate::auth::Authorizers;
use crate::config::RegistrarConfig;
use crate::handler::{AckHandler, HandlerMap};
use crate::proxy::Proxy;
use crate::register::RegisterHandler;
use crate::registry::{Locator, Registry};

/// Transaction user serving REGISTER for one domain
///
/// Every other method is answered by the handler map's default, 501 Not
/// Implemented unless [`Registrar::with_handlers`] says otherwise, or
/// forwarded when [`Registrar::with_proxy`] is set.
#[derive(Debug)]
pub struct Registrar {
    domain: String,
    handlers: HandlerMap,
    proxy: Option<Arc<Proxy>>,
    layer: OnceLock<LayerHandle>,
}

impl Registrar {
    /// Registrar binding into `registry`, requiring credentials when
    /// `authorizers` is not empty
    pub fn new(
        config: RegistrarConfig,
        registry: Arc<dyn Registry>,
        authorizers: Authorizers,
    ) -> Self {
        let domain = config.domain.clone();
        let register = RegisterHandler::with_authorizers(config, registry, authorizers);
        let handlers = HandlerMap::new()
            .with_handler(Method::Register, Arc::new(register))
            .with_handler(Method::Ack, Arc::new(AckHandler));
        Self::with_handlers(domain, handlers)
    }

    /// Registrar dispatching through `handlers`
    pub fn with_handlers(domain: impl Into<String>, handlers: HandlerMap) -> Self {
        Self {
            domain: domain.into(),
            handlers,
            proxy: None,
            layer: OnceLock::new(),
        }
    }

    /// Forwards the requests no handler of its own takes, ACKs included, to
    /// the contacts `locator` reports, and relays their responses
    pub fn with_proxy(mut self, locator: Arc<dyn Locator>) -> Self {
        let proxy = Arc::new(Proxy::new(locator));
        self.handlers.set_default(proxy.clone());
        self.handlers.insert(Method::Ack, proxy.clone());
        self.proxy = Some(proxy);
        self
    }

    /// Whether requests are forwarded rather than refused
    pub fn is_proxy(&self) -> bool {
        self.proxy.is_some()
    }

    /// Domain served
    pub fn domain(&self) -> &str {
        &self.domain
    }

    /// Handler map in use
    pub fn handlers(&self) -> &HandlerMap {
        &self.handlers
    }

    /// The transaction layer, once started
    pub fn layer(&self) -> Option<&LayerHandle> {
        self.layer.get()
    }
}

#[async_trait]
impl TransactionUser for Registrar {
    fn start(&self, layer: LayerHandle) {
        info!(
            domain = %self.domain,
            hosts = ?layer.hosts(),
            port = layer.port(),
            proxy = self.is_proxy(),
            "registrar started"
        );
        self.handlers.start(&layer);
        if self.layer.set(layer).is_err() {
            warn!("registrar started twice; keeping the first layer");
        }
    }

    async fn request_received(
        &self,
        request: Request,
        source: SocketAddr,
        transaction: ServerTransaction,
    ) -> RequestOutcome {
        let handler = self.handlers.handler_for(&request.method);
        match handler.handle(&request, source).await? {
            Some(response) => {
                debug!(%source, method = %request.method, status = %response.status, "answering");
                transaction
                    .respond(response)
                    .map_err(anyhow::Error::from)?;
                Ok(Some(transaction))
            }
            None => Ok(None),
        }
    }

    async fn response_received(&self, response: Response, transaction: Option<ClientTransaction>) {
        if let (Some(proxy), None) = (&self.proxy, &transaction) {
            proxy.relay_response(response).await;
            return;
        }
        debug!(
            status = %response.status,
            matched = transaction.is_some(),
            "registrar ignores responses"
        );
    }
}
