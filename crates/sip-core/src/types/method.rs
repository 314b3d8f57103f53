//! # SIP Methods
//!
//! Request methods as used on the request line and in `CSeq`. The core
//! methods of RFC 3261 get their own variants; any other token survives as
//! [`Method::Extension`] so unknown requests can still be answered.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};

/// SIP request method
///
/// Methods are case-sensitive tokens on the wire, so `invite` is an
/// extension method, not `INVITE`.
///
/// ```rust
/// use sipwire_sip_core::prelude::*;
/// use std::str::FromStr;
///
/// assert_eq!(Method::from_str("INVITE").unwrap(), Method::Invite);
/// assert_eq!(Method::from_str("PUBLISH").unwrap().as_str(), "PUBLISH");
/// assert!(Method::from_str("BAD METHOD").is_err());
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Method {
    /// Session setup
    Invite,
    /// Acknowledges a final response to INVITE
    Ack,
    /// Session teardown
    Bye,
    /// Cancels a pending INVITE
    Cancel,
    /// Binds an address-of-record to contacts
    Register,
    /// Capability query
    Options,
    /// Session modification
    Update,
    /// Mid-session information
    Info,
    /// Provisional response acknowledgement
    Prack,
    /// Event subscription
    Subscribe,
    /// Event notification
    Notify,
    /// Call transfer
    Refer,
    /// Instant message
    Message,
    /// Any other method token
    Extension(String),
}

impl Method {
    /// Wire representation of the method
    pub fn as_str(&self) -> &str {
        match self {
            Method::Invite => "INVITE",
            Method::Ack => "ACK",
            Method::Bye => "BYE",
            Method::Cancel => "CANCEL",
            Method::Register => "REGISTER",
            Method::Options => "OPTIONS",
            Method::Update => "UPDATE",
            Method::Info => "INFO",
            Method::Prack => "PRACK",
            Method::Subscribe => "SUBSCRIBE",
            Method::Notify => "NOTIFY",
            Method::Refer => "REFER",
            Method::Message => "MESSAGE",
            Method::Extension(token) => token,
        }
    }

    /// Whether this method uses the INVITE transaction state machines
    pub fn is_invite(&self) -> bool {
        matches!(self, Method::Invite)
    }

    /// Method used to key a transaction: ACK and CANCEL share the branch
    /// of the INVITE they refer to, so they are looked up as INVITE.
    pub fn matching_method(&self) -> Method {
        match self {
            Method::Ack | Method::Cancel => Method::Invite,
            other => other.clone(),
        }
    }
}

pub(crate) fn is_token_char(c: char) -> bool {
    c.is_ascii_alphanumeric() || "-.!%*_+`'~".contains(c)
}

impl fmt::Display for Method {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Method {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        if s.is_empty() || !s.chars().all(is_token_char) {
            return Err(Error::InvalidMethod(s.to_string()));
        }
        Ok(match s {
            "INVITE" => Method::Invite,
            "ACK" => Method::Ack,
            "BYE" => Method::Bye,
            "CANCEL" => Method::Cancel,
            "REGISTER" => Method::Register,
            "OPTIONS" => Method::Options,
            "UPDATE" => Method::Update,
            "INFO" => Method::Info,
            "PRACK" => Method::Prack,
            "SUBSCRIBE" => Method::Subscribe,
            "NOTIFY" => Method::Notify,
            "REFER" => Method::Refer,
            "MESSAGE" => Method::Message,
            other => Method::Extension(other.to_string()),
        })
    }
}
