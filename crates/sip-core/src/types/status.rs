//! # SIP Status Codes
//!
//! Three-digit response codes ([RFC 3261 Section 21](https://datatracker.ietf.org/doc/html/rfc3261#section-21)).
//! The class is carried by the first digit:
//!
//! - `1xx`: provisional
//! - `2xx`: success
//! - `3xx`..`6xx`: final failures of increasing scope
//!
//! ```rust
//! use sipwire_sip_core::prelude::*;
//!
//! let busy = StatusCode::from_u16(486).unwrap();
//! assert_eq!(busy, StatusCode::BUSY_HERE);
//! assert_eq!(busy.reason_phrase(), "Busy Here");
//! assert!(busy.is_final() && !busy.is_success());
//! ```

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};

/// A SIP response status code in the range 100..=699
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct StatusCode(u16);

macro_rules! status_codes {
    ($(($code:expr, $name:ident, $phrase:expr);)+) => {
        impl StatusCode {
            $(
                #[doc = concat!("`", stringify!($code), " ", $phrase, "`")]
                pub const $name: StatusCode = StatusCode($code);
            )+

            /// Standard reason phrase, or `"Unknown"` for codes outside the table
            pub fn reason_phrase(&self) -> &'static str {
                match self.0 {
                    $($code => $phrase,)+
                    _ => "Unknown",
                }
            }
        }
    };
}

status_codes! {
    (100, TRYING, "Trying");
    (180, RINGING, "Ringing");
    (181, CALL_IS_BEING_FORWARDED, "Call Is Being Forwarded");
    (182, QUEUED, "Queued");
    (183, SESSION_PROGRESS, "Session Progress");
    (200, OK, "OK");
    (300, MULTIPLE_CHOICES, "Multiple Choices");
    (301, MOVED_PERMANENTLY, "Moved Permanently");
    (302, MOVED_TEMPORARILY, "Moved Temporarily");
    (303, SEE_OTHER, "See Other");
    (305, USE_PROXY, "Use Proxy");
    (380, ALTERNATIVE_SERVICE, "Alternative Service");
    (400, BAD_REQUEST, "Bad Request");
    (401, UNAUTHORIZED, "Unauthorized");
    (402, PAYMENT_REQUIRED, "Payment Required");
    (403, FORBIDDEN, "Forbidden");
    (404, NOT_FOUND, "Not Found");
    (405, METHOD_NOT_ALLOWED, "Method Not Allowed");
    (406, NOT_ACCEPTABLE, "Not Acceptable");
    (407, PROXY_AUTHENTICATION_REQUIRED, "Proxy Authentication Required");
    (408, REQUEST_TIMEOUT, "Request Timeout");
    (409, CONFLICT, "Conflict");
    (410, GONE, "Gone");
    (411, LENGTH_REQUIRED, "Length Required");
    (413, REQUEST_ENTITY_TOO_LARGE, "Request Entity Too Large");
    (414, REQUEST_URI_TOO_LARGE, "Request-URI Too Large");
    (415, UNSUPPORTED_MEDIA_TYPE, "Unsupported Media Type");
    (416, UNSUPPORTED_URI_SCHEME, "Unsupported URI Scheme");
    (420, BAD_EXTENSION, "Bad Extension");
    (421, EXTENSION_REQUIRED, "Extension Required");
    (423, INTERVAL_TOO_BRIEF, "Interval Too Brief");
    (480, TEMPORARILY_UNAVAILABLE, "Temporarily Unavailable");
    (481, CALL_TRANSACTION_DOES_NOT_EXIST, "Call/Transaction Does Not Exist");
    (482, LOOP_DETECTED, "Loop Detected");
    (483, TOO_MANY_HOPS, "Too Many Hops");
    (484, ADDRESS_INCOMPLETE, "Address Incomplete");
    (485, AMBIGUOUS, "Ambiguous");
    (486, BUSY_HERE, "Busy Here");
    (487, REQUEST_TERMINATED, "Request Terminated");
    (488, NOT_ACCEPTABLE_HERE, "Not Acceptable Here");
    (491, REQUEST_PENDING, "Request Pending");
    (493, UNDECIPHERABLE, "Undecipherable");
    (500, SERVER_INTERNAL_ERROR, "Internal Server Error");
    (501, NOT_IMPLEMENTED, "Not Implemented");
    (502, BAD_GATEWAY, "Bad Gateway");
    (503, SERVICE_UNAVAILABLE, "Service Unavailable");
    (504, SERVER_TIMEOUT, "Server Time-out");
    (505, VERSION_NOT_SUPPORTED, "SIP Version not supported");
    (513, MESSAGE_TOO_LARGE, "Message Too Large");
    (600, BUSY_EVERYWHERE, "Busy Everywhere");
    (603, DECLINE, "Decline");
    (604, DOES_NOT_EXIST_ANYWHERE, "Does not exist anywhere");
    (606, NOT_ACCEPTABLE_ANYWHERE, "Not Acceptable");
}

impl StatusCode {
    /// Builds a status code, rejecting values outside 100..=699
    pub fn from_u16(code: u16) -> Result<Self> {
        if (100..700).contains(&code) {
            Ok(StatusCode(code))
        } else {
            Err(Error::InvalidStatusCode(code))
        }
    }

    /// Numeric value
    pub fn as_u16(&self) -> u16 {
        self.0
    }

    /// `1xx`
    pub fn is_provisional(&self) -> bool {
        self.0 < 200
    }

    /// Any code of 200 and above
    pub fn is_final(&self) -> bool {
        self.0 >= 200
    }

    /// `2xx`
    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.0)
    }

    /// `3xx` through `6xx`
    pub fn is_failure(&self) -> bool {
        self.0 >= 300
    }
}

impl fmt::Display for StatusCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl FromStr for StatusCode {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        if s.len() != 3 || !s.bytes().all(|b| b.is_ascii_digit()) {
            return Err(Error::InvalidStartLine(format!("bad status code {s:?}")));
        }
        let code = s
            .parse::<u16>()
            .map_err(|_| Error::InvalidStartLine(format!("bad status code {s:?}")))?;
        StatusCode::from_u16(code)
    }
}

impl TryFrom<u16> for StatusCode {
    type Error = Error;

    fn try_from(code: u16) -> Result<Self> {
        StatusCode::from_u16(code)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_classes() {
        assert!(StatusCode::TRYING.is_provisional());
        assert!(!StatusCode::TRYING.is_final());
        assert!(StatusCode::OK.is_success());
        assert!(StatusCode::OK.is_final());
        assert!(StatusCode::MOVED_TEMPORARILY.is_failure());
        assert!(StatusCode::DECLINE.is_failure());
    }

    #[test]
    fn test_status_range() {
        assert!(StatusCode::from_u16(99).is_err());
        assert!(StatusCode::from_u16(700).is_err());
        assert_eq!(StatusCode::from_u16(699).unwrap().reason_phrase(), "Unknown");
    }

    #[test]
    fn test_status_from_str() {
        assert_eq!("408".parse::<StatusCode>().unwrap(), StatusCode::REQUEST_TIMEOUT);
        assert!("40".parse::<StatusCode>().is_err());
        assert!("4o8".parse::<StatusCode>().is_err());
    }

    #[test]
    fn test_reason_phrases() {
        assert_eq!(StatusCode::REQUEST_TIMEOUT.reason_phrase(), "Request Timeout");
        assert_eq!(StatusCode::SERVER_INTERNAL_ERROR.reason_phrase(), "Internal Server Error");
        assert_eq!(StatusCode::NOT_ACCEPTABLE_ANYWHERE.reason_phrase(), "Not Acceptable");
    }
}
