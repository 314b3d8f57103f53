//! nom based parsers for the SIP wire format
//!
//! [`parse_message`] is the entry point; the Via and URI grammars are reached
//! through the `FromStr` impls of [`Via`](crate::types::Via),
//! [`Uri`](crate::types::Uri) and [`Address`](crate::types::Address).

mod message;
pub(crate) mod uri;
pub(crate) mod via;
pub(crate) mod whitespace;

pub use message::parse_message;
