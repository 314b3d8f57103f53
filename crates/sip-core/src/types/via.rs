//! # SIP Via Header
//!
//! One routing segment of the `Via` header
//! ([RFC 3261 Section 20.42](https://datatracker.ietf.org/doc/html/rfc3261#section-20.42)),
//! with the NAT traversal parameters of [RFC 3581](https://datatracker.ietf.org/doc/html/rfc3581).
//!
//! ```text
//! Via: SIP/2.0/UDP pc33.atlanta.com:5060;branch=z9hG4bK776asdhds;rport
//! ```
//!
//! A `Via` value holds exactly one segment; a header line carrying several
//! comma-separated segments is split by the message parser into separate
//! values of the `Via` header.
//!
//! ## The rport ambiguity
//!
//! A bare `;rport` asks the server to answer to the source port of the
//! request; `;rport=5070` records the port the server actually saw. The two
//! are modeled as distinct [`Rport`] states so they survive a round trip.
//!
//! ```rust
//! use sipwire_sip_core::prelude::*;
//!
//! let mut via: Via = "SIP/2.0/UDP 10.0.0.1:5060;branch=z9hG4bKabc;rport".parse().unwrap();
//! assert_eq!(via.rport, Rport::Requested);
//! assert!(via.is_rfc3261_compliant());
//!
//! via.received = Some("203.0.113.7".to_string());
//! via.rport = Rport::Value(61000);
//! assert_eq!(
//!     via.to_string(),
//!     "SIP/2.0/UDP 10.0.0.1:5060;branch=z9hG4bKabc;received=203.0.113.7;rport=61000"
//! );
//! ```

use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};
use crate::parser::via::parse_via;

/// Branch prefix marking an RFC 3261 compliant transaction identifier
pub const BRANCH_MAGIC_COOKIE: &str = "z9hG4bK";

/// Port assumed when a Via or URI carries none
pub const DEFAULT_SIP_PORT: u16 = 5060;

/// Generates a fresh, RFC 3261 compliant branch token
pub fn generate_branch() -> String {
    format!("{}{}", BRANCH_MAGIC_COOKIE, uuid::Uuid::new_v4().simple())
}

/// State of the RFC 3581 `rport` parameter
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Rport {
    /// No `rport` parameter
    #[default]
    Absent,
    /// Bare `;rport`: the sender asks for symmetric response routing
    Requested,
    /// `;rport=N`: the port the request was observed to come from
    Value(u16),
}

/// A single Via segment
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Via {
    /// Transport tag of the sent-protocol, e.g. `UDP`
    pub transport: String,
    /// sent-by host
    pub host: String,
    /// sent-by port
    pub port: Option<u16>,
    /// Transaction identifier
    pub branch: Option<String>,
    /// Legacy `hidden` flag
    pub hidden: bool,
    /// Multicast time-to-live
    pub ttl: Option<u8>,
    /// Multicast address
    pub maddr: Option<String>,
    /// Source address observed by the receiving server
    pub received: Option<String>,
    /// RFC 3581 response port
    pub rport: Rport,
    /// Extension parameters; valueless ones map to `None`
    pub params: BTreeMap<String, Option<String>>,
}

impl Via {
    /// Creates a UDP segment with no parameters
    pub fn new(host: impl Into<String>, port: Option<u16>) -> Self {
        Via {
            transport: "UDP".to_string(),
            host: host.into(),
            port,
            branch: None,
            hidden: false,
            ttl: None,
            maddr: None,
            received: None,
            rport: Rport::Absent,
            params: BTreeMap::new(),
        }
    }

    /// Builder-style branch setter
    pub fn with_branch(mut self, branch: impl Into<String>) -> Self {
        self.branch = Some(branch.into());
        self
    }

    /// Builder-style request for symmetric response routing
    pub fn with_rport_requested(mut self) -> Self {
        self.rport = Rport::Requested;
        self
    }

    /// Whether the branch carries the `z9hG4bK` magic cookie
    pub fn is_rfc3261_compliant(&self) -> bool {
        self.branch
            .as_deref()
            .is_some_and(|branch| branch.starts_with(BRANCH_MAGIC_COOKIE))
    }

    /// The port the sender listens on, defaulting to 5060
    pub fn port_or_default(&self) -> u16 {
        self.port.unwrap_or(DEFAULT_SIP_PORT)
    }

    /// Host a response to this segment is sent to: `received` when present
    pub fn response_host(&self) -> &str {
        self.received.as_deref().unwrap_or(&self.host)
    }

    /// Port a response to this segment is sent to: the rport value, then the
    /// sent-by port, then 5060
    pub fn response_port(&self) -> u16 {
        match self.rport {
            Rport::Value(port) => port,
            _ => self.port_or_default(),
        }
    }
}

impl fmt::Display for Via {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "SIP/2.0/{} ", self.transport)?;
        if self.host.contains(':') && !self.host.starts_with('[') {
            write!(f, "[{}]", self.host)?;
        } else {
            f.write_str(&self.host)?;
        }
        if let Some(port) = self.port {
            write!(f, ":{port}")?;
        }
        if self.hidden {
            f.write_str(";hidden")?;
        }
        if let Some(ttl) = self.ttl {
            write!(f, ";ttl={ttl}")?;
        }
        if let Some(branch) = &self.branch {
            write!(f, ";branch={branch}")?;
        }
        if let Some(maddr) = &self.maddr {
            write!(f, ";maddr={maddr}")?;
        }
        if let Some(received) = &self.received {
            write!(f, ";received={received}")?;
        }
        match self.rport {
            Rport::Absent => {}
            Rport::Requested => f.write_str(";rport")?,
            Rport::Value(port) => write!(f, ";rport={port}")?,
        }
        for (name, value) in &self.params {
            match value {
                Some(value) => write!(f, ";{name}={value}")?,
                None => write!(f, ";{name}")?,
            }
        }
        Ok(())
    }
}

impl FromStr for Via {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        parse_via(s)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_full_segment() {
        let via: Via =
            "SIP/2.0/UDP example.com:5070;hidden;ttl=16;branch=z9hG4bK1;maddr=224.2.0.1;received=1.2.3.4;rport=5071;x=y;flag"
                .parse()
                .unwrap();
        assert_eq!(via.transport, "UDP");
        assert_eq!(via.host, "example.com");
        assert_eq!(via.port, Some(5070));
        assert!(via.hidden);
        assert_eq!(via.ttl, Some(16));
        assert_eq!(via.branch.as_deref(), Some("z9hG4bK1"));
        assert_eq!(via.maddr.as_deref(), Some("224.2.0.1"));
        assert_eq!(via.received.as_deref(), Some("1.2.3.4"));
        assert_eq!(via.rport, Rport::Value(5071));
        assert_eq!(via.params.get("x"), Some(&Some("y".to_string())));
        assert_eq!(via.params.get("flag"), Some(&None));
    }

    #[test]
    fn test_round_trip_exact_in_canonical_order() {
        let text = "SIP/2.0/UDP example.com:5070;hidden;ttl=16;branch=z9hG4bK1;maddr=224.2.0.1;received=1.2.3.4;rport=5071;a;b=c";
        let via: Via = text.parse().unwrap();
        assert_eq!(via.to_string(), text);
    }

    #[test]
    fn test_rport_requested_vs_value() {
        let requested: Via = "SIP/2.0/UDP h;rport".parse().unwrap();
        let known: Via = "SIP/2.0/UDP h;rport=1234".parse().unwrap();
        assert_eq!(requested.rport, Rport::Requested);
        assert_eq!(known.rport, Rport::Value(1234));
        assert_eq!(requested.to_string(), "SIP/2.0/UDP h;rport");
        assert_eq!(known.to_string(), "SIP/2.0/UDP h;rport=1234");
    }

    #[test]
    fn test_no_port_is_preserved() {
        let via: Via = "SIP/2.0/TCP example.com;branch=abc".parse().unwrap();
        assert_eq!(via.port, None);
        assert_eq!(via.port_or_default(), 5060);
        assert!(!via.is_rfc3261_compliant());
        assert_eq!(via.to_string(), "SIP/2.0/TCP example.com;branch=abc");
    }

    #[test]
    fn test_lenient_whitespace_and_comments() {
        let via: Via = "SIP / 2.0 / UDP   first.example.com:4000 ; ttl=16 ;branch=z9hG4bKx (comment)"
            .parse()
            .unwrap();
        assert_eq!(via.host, "first.example.com");
        assert_eq!(via.port, Some(4000));
        assert_eq!(via.ttl, Some(16));
        assert_eq!(via.branch.as_deref(), Some("z9hG4bKx"));
    }

    #[test]
    fn test_ipv6_sent_by() {
        let via: Via = "SIP/2.0/UDP [2001:db8::9:1]:5060;branch=z9hG4bKas3".parse().unwrap();
        assert_eq!(via.host, "2001:db8::9:1");
        assert_eq!(via.to_string(), "SIP/2.0/UDP [2001:db8::9:1]:5060;branch=z9hG4bKas3");
    }

    #[test]
    fn test_response_routing() {
        let mut via = Via::new("10.0.0.1", None);
        assert_eq!((via.response_host(), via.response_port()), ("10.0.0.1", 5060));
        via.rport = Rport::Requested;
        assert_eq!(via.response_port(), 5060);
        via.received = Some("198.51.100.4".to_string());
        via.rport = Rport::Value(40000);
        assert_eq!((via.response_host(), via.response_port()), ("198.51.100.4", 40000));
    }

    #[test]
    fn test_invalid_segments() {
        assert!("SIP/3.0/UDP h".parse::<Via>().is_err());
        assert!("SIP/2.0/UDP".parse::<Via>().is_err());
        assert!("SIP/2.0/UDP h:port".parse::<Via>().is_err());
        assert!("SIP/2.0/UDP h;ttl=x".parse::<Via>().is_err());
        assert!("SIP/2.0/UDP h;rport=99999".parse::<Via>().is_err());
    }

    #[test]
    fn test_generated_branch_is_compliant() {
        let a = generate_branch();
        let b = generate_branch();
        assert!(a.starts_with(BRANCH_MAGIC_COOKIE));
        assert_ne!(a, b);
        assert!(Via::new("h", None).with_branch(a).is_rfc3261_compliant());
    }
}
