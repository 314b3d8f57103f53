//! SIP registrar for the sipwire stack
//!
//! A [`Registrar`] is a transaction user: it sits on a
//! `sipwire_transaction_core::TransactionLayer`, dispatches each request on
//! its method through a [`HandlerMap`], and answers REGISTER from a
//! [`Registry`]. Bindings live in an [`InMemoryRegistry`] by default;
//! authorization is optional and pluggable per scheme. With a [`Proxy`]
//! installed, every other request is forwarded statelessly to the contact
//! its [`Locator`] reports.

pub mod auth;
pub mod config;
pub mod error;
pub mod handler;
pub mod proxy;
pub mod register;
pub mod registrar;
pub mod registry;

pub use auth::{Authorizer, Authorizers};
pub use config::RegistrarConfig;
pub use error::{RegistrarError, Result};
pub use handler::{AckHandler, HandlerMap, NotImplemented, RequestHandler};
pub use proxy::Proxy;
pub use register::RegisterHandler;
pub use registrar::Registrar;
pub use registry::{InMemoryRegistry, Locator, Registration, Registry};
