//! Name-addr / addr-spec values of `From`, `To` and `Contact`
//! ([RFC 3261 Section 20.10](https://datatracker.ietf.org/doc/html/rfc3261#section-20.10)).

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};
use crate::parser::uri::parse_address;
use crate::types::uri::Uri;

/// An address with optional display name and header parameters
///
/// In the bare `addr-spec` form every `;param` after the URI belongs to the
/// header, not to the URI, so `sip:bob@biloxi.com;tag=a6c85cf` carries a
/// `tag` header parameter.
///
/// ```rust
/// use sipwire_sip_core::prelude::*;
///
/// let to: Address = "\"Bob\" <sip:bob@biloxi.com>;tag=a6c85cf".parse().unwrap();
/// assert_eq!(to.display_name.as_deref(), Some("Bob"));
/// assert_eq!(to.tag(), Some("a6c85cf"));
///
/// let bare: Address = "sip:bob@biloxi.com;tag=a6c85cf".parse().unwrap();
/// assert_eq!(bare.tag(), Some("a6c85cf"));
/// assert!(bare.uri.params.is_empty());
/// ```
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Address {
    /// Display name, unquoted
    pub display_name: Option<String>,
    /// The addressed URI
    pub uri: Uri,
    /// Header parameters in order
    pub params: Vec<(String, Option<String>)>,
}

impl Address {
    /// Address without display name or parameters
    pub fn new(uri: Uri) -> Self {
        Address {
            display_name: None,
            uri,
            params: Vec::new(),
        }
    }

    /// Value of a header parameter; valueless parameters yield `Some(None)`
    pub fn param(&self, name: &str) -> Option<Option<&str>> {
        self.params
            .iter()
            .find(|(n, _)| n.eq_ignore_ascii_case(name))
            .map(|(_, value)| value.as_deref())
    }

    /// Sets or replaces a header parameter
    pub fn set_param(&mut self, name: impl Into<String>, value: Option<String>) {
        let name = name.into();
        match self.params.iter_mut().find(|(n, _)| n.eq_ignore_ascii_case(&name)) {
            Some(slot) => slot.1 = value,
            None => self.params.push((name, value)),
        }
    }

    /// The `tag` parameter
    pub fn tag(&self) -> Option<&str> {
        self.param("tag").flatten()
    }

    /// The `expires` parameter, when it is a number
    pub fn expires(&self) -> Option<u32> {
        self.param("expires").flatten().and_then(|v| v.parse().ok())
    }
}

impl fmt::Display for Address {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if let Some(name) = &self.display_name {
            write!(f, "\"{name}\" ")?;
        }
        write!(f, "<{}>", self.uri)?;
        for (name, value) in &self.params {
            match value {
                Some(value) => write!(f, ";{name}={value}")?,
                None => write!(f, ";{name}")?,
            }
        }
        Ok(())
    }
}

impl FromStr for Address {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        parse_address(s)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_name_addr_with_unquoted_name() {
        let addr: Address = "Alice <sip:alice@atlanta.com;transport=udp>;tag=1928301774".parse().unwrap();
        assert_eq!(addr.display_name.as_deref(), Some("Alice"));
        assert_eq!(addr.uri.transport.as_deref(), Some("udp"));
        assert_eq!(addr.tag(), Some("1928301774"));
        assert_eq!(
            addr.to_string(),
            "\"Alice\" <sip:alice@atlanta.com;transport=udp>;tag=1928301774"
        );
    }

    #[test]
    fn test_angle_without_name() {
        let addr: Address = "<sip:carol@chicago.com>;expires=3600".parse().unwrap();
        assert_eq!(addr.display_name, None);
        assert_eq!(addr.expires(), Some(3600));
        assert_eq!(addr.tag(), None);
    }

    #[test]
    fn test_set_param_replaces() {
        let mut addr: Address = "<sip:carol@chicago.com>;tag=a".parse().unwrap();
        addr.set_param("TAG", Some("b".to_string()));
        assert_eq!(addr.tag(), Some("b"));
        assert_eq!(addr.params.len(), 1);
    }

    #[test]
    fn test_invalid_addresses() {
        assert!("Bob <sip:bob@biloxi.com".parse::<Address>().is_err());
        assert!("Bob".parse::<Address>().is_err());
        assert!("<mailto:bob@biloxi.com>".parse::<Address>().is_err());
    }
}
