//! Transaction matching keys
//!
//! Requests whose top Via branch carries the `z9hG4bK` cookie are matched
//! exactly on [`ServerKey`]. Anything else comes from an RFC 2543 era
//! element and is matched field by field through [`matches_legacy`].

use std::fmt;

use sipwire_sip_core::{HeaderAccess, HeaderName, Method, Request, Response, Via};

/// Index of an RFC 3261 compliant server transaction
///
/// ACK and CANCEL share the branch of the INVITE they refer to, so their
/// method is folded to INVITE before lookup.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ServerKey {
    /// Top Via branch
    pub branch: String,
    /// Top Via sent-by host
    pub host: String,
    /// Top Via sent-by port
    pub port: Option<u16>,
    /// Request method, ACK and CANCEL folded to INVITE
    pub method: Method,
}

impl ServerKey {
    /// Key for `request` arriving with top Via `via`, or `None` when the
    /// branch lacks the magic cookie
    pub fn from_request(request: &Request, via: &Via) -> Option<Self> {
        if !via.is_rfc3261_compliant() {
            return None;
        }
        Some(ServerKey {
            branch: via.branch.clone()?,
            host: via.host.clone(),
            port: via.port,
            method: request.method.matching_method(),
        })
    }
}

impl fmt::Display for ServerKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.port {
            Some(port) => write!(f, "{}:{}:{}:{}", self.branch, self.host, port, self.method),
            None => write!(f, "{}:{}:{}", self.branch, self.host, self.method),
        }
    }
}

/// Index of a client transaction
///
/// A CANCEL reuses the branch of its INVITE but runs as a separate
/// transaction, so the CSeq method is part of the key.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ClientKey {
    /// Branch this transaction put in its Via
    pub branch: String,
    /// CSeq method of the request
    pub method: Method,
}

impl ClientKey {
    /// Creates a key
    pub fn new(branch: impl Into<String>, method: Method) -> Self {
        Self {
            branch: branch.into(),
            method,
        }
    }
}

impl fmt::Display for ClientKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.branch, self.method)
    }
}

fn cseq_number(request: &Request) -> Option<u32> {
    request.cseq().ok().map(|cseq| cseq.seq)
}

/// Legacy (RFC 2543) request matching, RFC 3261 section 17.2.3
///
/// `original` is the request that created the server transaction and
/// `last_response` the last response it sent. An INVITE transaction also
/// matches CANCEL and ACK; for ACK the To tag is compared against the
/// response, since that is where the server added its tag.
pub fn matches_legacy(original: &Request, last_response: Option<&Response>, incoming: &Request) -> bool {
    let expected_to_tag = if original.method == Method::Invite {
        match incoming.method {
            Method::Invite | Method::Cancel => original.to_tag(),
            Method::Ack => last_response.and_then(|response| response.to_tag()),
            _ => return false,
        }
    } else if original.method == incoming.method {
        original.to_tag()
    } else {
        return false;
    };

    original.uri.to_string() == incoming.uri.to_string()
        && incoming.to_tag().unwrap_or_default() == expected_to_tag.unwrap_or_default()
        && incoming.from_tag().unwrap_or_default() == original.from_tag().unwrap_or_default()
        && original.call_id() == incoming.call_id()
        && cseq_number(original).is_some()
        && cseq_number(original) == cseq_number(incoming)
        && original.header(&HeaderName::VIA) == incoming.header(&HeaderName::VIA)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::transaction::test_support::{request, response};

    fn legacy(method: Method) -> Request {
        let mut request = request(method);
        request
            .headers
            .set(HeaderName::VIA, "SIP/2.0/UDP old.example.com:5060");
        request
    }

    #[test]
    fn test_server_key_folds_ack_and_cancel() {
        let invite = request(Method::Invite);
        let via = invite.top_via().unwrap();
        let key = ServerKey::from_request(&invite, &via).unwrap();

        let mut ack = request(Method::Ack);
        ack.headers.set(HeaderName::CSEQ, "1 ACK");
        let ack_key = ServerKey::from_request(&ack, &ack.top_via().unwrap()).unwrap();
        assert_eq!(key, ack_key);

        let cancel = request(Method::Cancel);
        let cancel_key = ServerKey::from_request(&cancel, &cancel.top_via().unwrap()).unwrap();
        assert_eq!(key, cancel_key);

        let bye = request(Method::Bye);
        let bye_key = ServerKey::from_request(&bye, &bye.top_via().unwrap()).unwrap();
        assert_ne!(key, bye_key);
    }

    #[test]
    fn test_server_key_requires_cookie() {
        let request = legacy(Method::Options);
        assert!(ServerKey::from_request(&request, &request.top_via().unwrap()).is_none());
    }

    #[test]
    fn test_legacy_retransmission_matches() {
        let original = legacy(Method::Register);
        let retransmission = original.clone();
        assert!(matches_legacy(&original, None, &retransmission));
    }

    #[test]
    fn test_legacy_differences_do_not_match() {
        let original = legacy(Method::Register);

        let mut other_call = original.clone();
        other_call.headers.set(HeaderName::CALL_ID, "call-2@example.com");
        assert!(!matches_legacy(&original, None, &other_call));

        let mut next_cseq = original.clone();
        next_cseq.headers.set(HeaderName::CSEQ, "2 REGISTER");
        assert!(!matches_legacy(&original, None, &next_cseq));

        let mut other_via = original.clone();
        other_via
            .headers
            .set(HeaderName::VIA, "SIP/2.0/UDP elsewhere.example.com:5060");
        assert!(!matches_legacy(&original, None, &other_via));

        let mut other_from = original.clone();
        other_from
            .headers
            .set(HeaderName::FROM, "<sip:alice@example.com>;tag=other");
        assert!(!matches_legacy(&original, None, &other_from));

        let mut other_uri = original.clone();
        other_uri.uri = "sip:carol@example.com".parse().unwrap();
        assert!(!matches_legacy(&original, None, &other_uri));

        let options = legacy(Method::Options);
        assert!(!matches_legacy(&original, None, &options));
    }

    #[test]
    fn test_legacy_ack_uses_response_to_tag() {
        let invite = legacy(Method::Invite);
        let mut last = response(486, &invite);
        last.headers.set(HeaderName::TO, "<sip:bob@example.com>;tag=server9");

        let mut ack = invite.clone();
        ack.method = Method::Ack;
        ack.headers.set(HeaderName::CSEQ, "1 ACK");
        ack.headers.set(HeaderName::TO, "<sip:bob@example.com>;tag=server9");
        assert!(matches_legacy(&invite, Some(&last), &ack));

        ack.headers.set(HeaderName::TO, "<sip:bob@example.com>;tag=wrong");
        assert!(!matches_legacy(&invite, Some(&last), &ack));

        let mut cancel = invite.clone();
        cancel.method = Method::Cancel;
        cancel.headers.set(HeaderName::CSEQ, "1 CANCEL");
        assert!(matches_legacy(&invite, Some(&last), &cancel));
    }
}
