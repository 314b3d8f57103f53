use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};
use crate::types::method::Method;

/// `CSeq` header value: sequence number and method
///
/// ```rust
/// use sipwire_sip_core::prelude::*;
///
/// let cseq: CSeq = "314159 INVITE".parse().unwrap();
/// assert_eq!(cseq, CSeq::new(314159, Method::Invite));
/// assert_eq!(cseq.with_method(Method::Ack).to_string(), "314159 ACK");
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct CSeq {
    /// Sequence number
    pub seq: u32,
    /// Method of the request this sequence number belongs to
    pub method: Method,
}

impl CSeq {
    pub fn new(seq: u32, method: Method) -> Self {
        CSeq { seq, method }
    }

    /// Same sequence number with another method, as used by ACK and CANCEL
    pub fn with_method(&self, method: Method) -> Self {
        CSeq {
            seq: self.seq,
            method,
        }
    }
}

impl fmt::Display for CSeq {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {}", self.seq, self.method)
    }
}

impl FromStr for CSeq {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        let mut parts = s.split_whitespace();
        let (Some(seq), Some(method), None) = (parts.next(), parts.next(), parts.next()) else {
            return Err(Error::InvalidCSeq(s.to_string()));
        };
        let seq = seq
            .parse::<u32>()
            .map_err(|_| Error::InvalidCSeq(s.to_string()))?;
        Ok(CSeq::new(seq, method.parse()?))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cseq_parse() {
        assert_eq!(
            "  7   REGISTER ".parse::<CSeq>().unwrap(),
            CSeq::new(7, Method::Register)
        );
        assert!("INVITE".parse::<CSeq>().is_err());
        assert!("x INVITE".parse::<CSeq>().is_err());
        assert!("1 INVITE extra".parse::<CSeq>().is_err());
        assert!("4294967296 INVITE".parse::<CSeq>().is_err());
    }
}
