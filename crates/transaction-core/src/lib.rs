//! SIP transaction layer for the sipwire stack
//!
//! This crate implements the four transaction state machines of RFC 3261
//! section 17 over an unreliable transport: INVITE and non-INVITE, client
//! and server. A [`TransactionLayer`] owns the machines of one transport,
//! matches incoming requests and responses to them, runs their
//! retransmission and timeout timers, and hands requests and responses to
//! a [`TransactionUser`].
//!
//! ```rust,no_run
//! use std::sync::Arc;
//!
//! use async_trait::async_trait;
//! use sipwire_sip_core::prelude::*;
//! use sipwire_sip_transport::bind_udp;
//! use sipwire_transaction_core::prelude::*;
//!
//! struct Echo;
//!
//! #[async_trait]
//! impl TransactionUser for Echo {
//!     async fn request_received(
//!         &self,
//!         request: Request,
//!         _source: std::net::SocketAddr,
//!         transaction: ServerTransaction,
//!     ) -> RequestOutcome {
//!         transaction
//!             .respond(Response::from_request(StatusCode::OK, &request))
//!             .map_err(anyhow::Error::from)?;
//!         Ok(Some(transaction))
//!     }
//!
//!     async fn response_received(&self, _response: Response, _tx: Option<ClientTransaction>) {}
//! }
//!
//! # async fn run() -> std::result::Result<(), Box<dyn std::error::Error>> {
//! let (transport, events) = bind_udp("0.0.0.0:5060".parse()?).await?;
//! let (layer, task) = TransactionLayer::start(
//!     TransactionLayerConfig::default(),
//!     Arc::new(transport),
//!     events,
//!     Arc::new(Echo),
//! )?;
//! task.await?;
//! # Ok(())
//! # }
//! ```

pub mod binding;
pub mod builders;
pub mod error;
pub mod handle;
pub mod layer;
pub mod timer;
pub mod transaction;
pub mod tu;

#[cfg(any(test, feature = "testing"))]
pub mod testing;

pub use binding::TransportBinding;
pub use error::{Error, Result};
pub use handle::{ClientTransaction, LayerHandle, ServerTransaction};
pub use layer::{TransactionLayer, TransactionLayerConfig};
pub use timer::{TimerSettings, TimerType};
pub use transaction::{TransactionId, TransactionKind, TransactionState};
pub use tu::{ProtocolError, RequestError, RequestOutcome, TransactionUser};

/// Re-export of common types for easier use
pub mod prelude {
    pub use crate::{
        ClientTransaction, Error, LayerHandle, ProtocolError, RequestError, RequestOutcome,
        Result, ServerTransaction, TimerSettings, TimerType, TransactionId, TransactionKind,
        TransactionLayer, TransactionLayerConfig, TransactionState, TransactionUser,
        TransportBinding,
    };
}
