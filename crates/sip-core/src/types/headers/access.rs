use crate::error::{Error, Result};
use crate::types::address::Address;
use crate::types::cseq::CSeq;
use crate::types::via::Via;

use super::{HeaderName, Headers};

/// Typed views over the header map of any SIP message
///
/// Implementors only provide [`headers`](HeaderAccess::headers) and
/// [`headers_mut`](HeaderAccess::headers_mut); the accessors parse the raw
/// values on demand, so a malformed header surfaces as an error at the point
/// of use rather than when the message is read.
pub trait HeaderAccess {
    /// Raw header map
    fn headers(&self) -> &Headers;

    /// Mutable raw header map
    fn headers_mut(&mut self) -> &mut Headers;

    /// First raw value of a header
    fn header(&self, name: &HeaderName) -> Option<&str> {
        self.headers().get(name)
    }

    /// Whether a header is present
    fn has_header(&self, name: &HeaderName) -> bool {
        self.headers().contains(name)
    }

    /// Topmost Via segment
    fn top_via(&self) -> Result<Via> {
        self.header(&HeaderName::VIA)
            .ok_or_else(|| Error::MissingHeader("Via".to_string()))?
            .parse()
    }

    /// Every Via segment, topmost first
    fn vias(&self) -> Result<Vec<Via>> {
        self.headers()
            .get_all(&HeaderName::VIA)
            .iter()
            .map(|value| value.parse())
            .collect()
    }

    /// Replaces the topmost Via segment, adding one if there is none
    fn set_top_via(&mut self, via: &Via) {
        self.headers_mut().set_first(HeaderName::VIA, via.to_string());
    }

    /// Pushes a new topmost Via segment
    fn push_via(&mut self, via: &Via) {
        self.headers_mut().insert_first(HeaderName::VIA, via.to_string());
    }

    /// Removes the topmost Via segment
    fn pop_via(&mut self) -> Option<String> {
        self.headers_mut().pop_first(&HeaderName::VIA)
    }

    /// Parsed `CSeq`
    fn cseq(&self) -> Result<CSeq> {
        self.header(&HeaderName::CSEQ)
            .ok_or_else(|| Error::MissingHeader("CSeq".to_string()))?
            .parse()
    }

    /// Raw `Call-ID`
    fn call_id(&self) -> Option<&str> {
        self.header(&HeaderName::CALL_ID)
    }

    /// Parsed `From`
    fn from_address(&self) -> Result<Address> {
        self.header(&HeaderName::FROM)
            .ok_or_else(|| Error::MissingHeader("From".to_string()))?
            .parse()
    }

    /// Parsed `To`
    fn to_address(&self) -> Result<Address> {
        self.header(&HeaderName::TO)
            .ok_or_else(|| Error::MissingHeader("To".to_string()))?
            .parse()
    }

    /// `tag` of the `From` header, `None` when absent or unparsable
    fn from_tag(&self) -> Option<String> {
        self.from_address().ok()?.tag().map(str::to_string)
    }

    /// `tag` of the `To` header, `None` when absent or unparsable
    fn to_tag(&self) -> Option<String> {
        self.to_address().ok()?.tag().map(str::to_string)
    }

    /// Parsed `Content-Length`, `None` when absent
    fn content_length(&self) -> Result<Option<usize>> {
        match self.header(&HeaderName::CONTENT_LENGTH) {
            None => Ok(None),
            Some(value) => value
                .trim()
                .parse()
                .map(Some)
                .map_err(|_| Error::InvalidContentLength(value.to_string())),
        }
    }
}
