//! # SIP URIs
//!
//! `sip:` and `sips:` URIs ([RFC 3261 Section 19.1](https://datatracker.ietf.org/doc/html/rfc3261#section-19.1)).
//!
//! The well-known URI parameters (`transport`, `user`, `method`, `ttl`,
//! `maddr`, `tag`) are broken out into fields, everything else is kept as
//! opaque extension parameters in their original order.
//!
//! [`Uri`] deliberately does not implement `PartialEq`: SIP compares URIs
//! field by field under rules that depend on the context (request-line
//! cleaning, legacy transaction matching on the serialized form), so callers
//! state which fields they compare.
//!
//! ```rust
//! use sipwire_sip_core::prelude::*;
//!
//! let uri: Uri = "sip:alice:secret@atlanta.com:5070;transport=udp;lr?subject=hi".parse().unwrap();
//! assert_eq!(uri.user.as_deref(), Some("alice"));
//! assert_eq!(uri.port, Some(5070));
//! assert_eq!(uri.params, vec![("lr".to_string(), None)]);
//!
//! let clean = uri.clean_for_request_line();
//! assert_eq!(clean.to_string(), "sip:alice:secret@atlanta.com:5070;lr");
//! ```

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};
use crate::parser::uri::parse_uri;

/// URI scheme
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Scheme {
    /// `sip:`
    #[default]
    Sip,
    /// `sips:`
    Sips,
}

impl Scheme {
    /// Scheme name without the colon
    pub fn as_str(&self) -> &'static str {
        match self {
            Scheme::Sip => "sip",
            Scheme::Sips => "sips",
        }
    }
}

/// A SIP or SIPS URI
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Uri {
    /// `sip` or `sips`
    pub scheme: Scheme,
    /// User part
    pub user: Option<String>,
    /// Password following the user part
    pub password: Option<String>,
    /// Host name, IPv4 address, or IPv6 address without brackets
    pub host: String,
    /// Port
    pub port: Option<u16>,
    /// `transport=` parameter
    pub transport: Option<String>,
    /// `user=` parameter
    pub user_type: Option<String>,
    /// `method=` parameter
    pub method: Option<String>,
    /// `ttl=` parameter
    pub ttl: Option<u8>,
    /// `maddr=` parameter
    pub maddr: Option<String>,
    /// `tag=` parameter
    pub tag: Option<String>,
    /// Remaining URI parameters in order
    pub params: Vec<(String, Option<String>)>,
    /// `?name=value&...` header parameters
    pub headers: Vec<(String, String)>,
}

impl Uri {
    /// A `sip:` URI pointing at `host`
    pub fn new(host: impl Into<String>) -> Self {
        Uri {
            host: host.into(),
            ..Uri::default()
        }
    }

    /// Builder-style user setter
    pub fn with_user(mut self, user: impl Into<String>) -> Self {
        self.user = Some(user.into());
        self
    }

    /// Builder-style port setter
    pub fn with_port(mut self, port: u16) -> Self {
        self.port = Some(port);
        self
    }

    /// Copy suitable for a request line: transport, maddr, ttl and header
    /// parameters are dropped.
    pub fn clean_for_request_line(&self) -> Uri {
        Uri {
            transport: None,
            maddr: None,
            ttl: None,
            headers: Vec::new(),
            ..self.clone()
        }
    }

    /// Value of an extension parameter; valueless parameters yield `Some(None)`
    pub fn param(&self, name: &str) -> Option<Option<&str>> {
        self.params
            .iter()
            .find(|(n, _)| n.eq_ignore_ascii_case(name))
            .map(|(_, value)| value.as_deref())
    }
}

impl fmt::Display for Uri {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:", self.scheme.as_str())?;
        if let Some(user) = &self.user {
            f.write_str(user)?;
            if let Some(password) = &self.password {
                write!(f, ":{password}")?;
            }
            f.write_str("@")?;
        }
        if self.host.contains(':') {
            write!(f, "[{}]", self.host)?;
        } else {
            f.write_str(&self.host)?;
        }
        if let Some(port) = self.port {
            write!(f, ":{port}")?;
        }
        if let Some(user_type) = &self.user_type {
            write!(f, ";user={user_type}")?;
        }
        if let Some(transport) = &self.transport {
            write!(f, ";transport={transport}")?;
        }
        if let Some(ttl) = self.ttl {
            write!(f, ";ttl={ttl}")?;
        }
        if let Some(maddr) = &self.maddr {
            write!(f, ";maddr={maddr}")?;
        }
        if let Some(method) = &self.method {
            write!(f, ";method={method}")?;
        }
        if let Some(tag) = &self.tag {
            write!(f, ";tag={tag}")?;
        }
        for (name, value) in &self.params {
            match value {
                Some(value) => write!(f, ";{name}={value}")?,
                None => write!(f, ";{name}")?,
            }
        }
        for (index, (name, value)) in self.headers.iter().enumerate() {
            let separator = if index == 0 { '?' } else { '&' };
            write!(f, "{separator}{name}={value}")?;
        }
        Ok(())
    }
}

impl FromStr for Uri {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        parse_uri(s)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_minimal() {
        let uri: Uri = "sip:example.com".parse().unwrap();
        assert_eq!(uri.scheme, Scheme::Sip);
        assert_eq!(uri.user, None);
        assert_eq!(uri.host, "example.com");
        assert_eq!(uri.port, None);
        assert_eq!(uri.to_string(), "sip:example.com");
    }

    #[test]
    fn test_parse_known_params() {
        let uri: Uri =
            "sips:+1555@gw.example.com;user=phone;transport=udp;ttl=4;maddr=239.1.1.1;method=INVITE;tag=77;x=1"
                .parse()
                .unwrap();
        assert_eq!(uri.scheme, Scheme::Sips);
        assert_eq!(uri.user.as_deref(), Some("+1555"));
        assert_eq!(uri.user_type.as_deref(), Some("phone"));
        assert_eq!(uri.transport.as_deref(), Some("udp"));
        assert_eq!(uri.ttl, Some(4));
        assert_eq!(uri.maddr.as_deref(), Some("239.1.1.1"));
        assert_eq!(uri.method.as_deref(), Some("INVITE"));
        assert_eq!(uri.tag.as_deref(), Some("77"));
        assert_eq!(uri.param("x"), Some(Some("1")));
    }

    #[test]
    fn test_round_trip_canonical_order() {
        let text = "sip:bob:pw@biloxi.com:5061;user=ip;transport=udp;ttl=1;maddr=10.1.1.1;method=REGISTER;tag=a;lr;x=y?to=alice&priority=urgent";
        let uri: Uri = text.parse().unwrap();
        assert_eq!(uri.to_string(), text);
        assert_eq!(uri.headers.len(), 2);
    }

    #[test]
    fn test_ipv6_host() {
        let uri: Uri = "sip:[2001:db8::10]:5070".parse().unwrap();
        assert_eq!(uri.host, "2001:db8::10");
        assert_eq!(uri.port, Some(5070));
        assert_eq!(uri.to_string(), "sip:[2001:db8::10]:5070");
    }

    #[test]
    fn test_clean_for_request_line() {
        let uri: Uri = "sip:bob@biloxi.com;transport=tcp;maddr=1.1.1.1;ttl=5;tag=t?subject=x"
            .parse()
            .unwrap();
        assert_eq!(uri.clean_for_request_line().to_string(), "sip:bob@biloxi.com;tag=t");
    }

    #[test]
    fn test_invalid_uris() {
        assert!("tel:+15551234".parse::<Uri>().is_err());
        assert!("sip:".parse::<Uri>().is_err());
        assert!("sip:bob@".parse::<Uri>().is_err());
        assert!("sip:host:99999".parse::<Uri>().is_err());
        assert!("sip:host;ttl=abc".parse::<Uri>().is_err());
    }
}
