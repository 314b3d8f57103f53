//! Requests and responses the transaction layer synthesizes on its own
//!
//! - the ACK an INVITE client transaction sends for a failure response
//!   (RFC 3261 section 17.1.1.3)
//! - the CANCEL for a pending INVITE (section 9.1)
//! - the 408 handed to the TU when a client transaction times out

use sipwire_sip_core::{CSeq, HeaderAccess, HeaderName, Method, Request, Response, StatusCode};

use crate::error::{Error, Result};

/// Max-Forwards put on ACK and CANCEL requests
pub const DEFAULT_MAX_FORWARDS: u32 = 70;

/// ACK for a non-2xx final `response` to `invite`
///
/// From, Call-ID and Route come from the INVITE, To from the response (it
/// carries the server's tag), and the Via is the INVITE's top Via so the
/// ACK lands in the same server transaction.
pub fn ack_for_failure(invite: &Request, response: &Response) -> Result<Request> {
    let cseq = invite.cseq()?;
    let via = invite
        .header(&HeaderName::VIA)
        .ok_or(Error::MissingHeader("Via"))?;

    let mut ack = Request::new(Method::Ack, invite.uri.clone()).with_header(HeaderName::VIA, via);
    ack.headers
        .add(HeaderName::MAX_FORWARDS, DEFAULT_MAX_FORWARDS.to_string());
    for name in [HeaderName::FROM, HeaderName::CALL_ID, HeaderName::ROUTE] {
        for value in invite.headers.get_all(&name) {
            ack.headers.add(&name, value.as_str());
        }
    }
    for value in response.headers.get_all(&HeaderName::TO) {
        ack.headers.add(HeaderName::TO, value.as_str());
    }
    ack.headers
        .add(HeaderName::CSEQ, cseq.with_method(Method::Ack).to_string());
    ack.headers.add(HeaderName::CONTENT_LENGTH, "0");
    Ok(ack)
}

/// CANCEL for a pending `invite`
///
/// Shares Request-URI, From, To, Call-ID, the CSeq number and the top Via
/// (branch included) with the INVITE.
pub fn cancel_for(invite: &Request) -> Result<Request> {
    if invite.method != Method::Invite {
        return Err(Error::NotInvite);
    }
    let cseq = invite.cseq()?;
    let via = invite
        .header(&HeaderName::VIA)
        .ok_or(Error::MissingHeader("Via"))?;

    let mut cancel = Request::new(Method::Cancel, invite.uri.clone()).with_header(HeaderName::VIA, via);
    cancel
        .headers
        .add(HeaderName::MAX_FORWARDS, DEFAULT_MAX_FORWARDS.to_string());
    for name in [HeaderName::FROM, HeaderName::TO, HeaderName::CALL_ID] {
        let value = invite
            .header(&name)
            .ok_or(Error::MissingHeader(missing_name(&name)))?;
        cancel.headers.add(&name, value);
    }
    cancel.headers.add(
        HeaderName::CSEQ,
        CSeq::new(cseq.seq, Method::Cancel).to_string(),
    );
    cancel.headers.add(HeaderName::CONTENT_LENGTH, "0");
    Ok(cancel)
}

/// 408 Request Timeout reported to the TU when timer B or F fires
pub fn timeout_response(request: &Request) -> Response {
    Response::from_request(StatusCode::REQUEST_TIMEOUT, request)
}

fn missing_name(name: &HeaderName) -> &'static str {
    match name.as_str() {
        "from" => "From",
        "to" => "To",
        _ => "Call-ID",
    }
}
