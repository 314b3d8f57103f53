use std::borrow::Cow;
use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};
use crate::types::method::is_token_char;

/// A header field name in canonical lower-case long form
///
/// Header names are case-insensitive on the wire and several have a compact
/// single-letter form. Both spellings map onto the same `HeaderName`, so
/// `v`, `VIA` and `Via` all compare equal.
///
/// When written back to the wire the name is dash-capitalized
/// (`content-length` becomes `Content-Length`), except for the fixed spellings
/// `CSeq`, `Call-ID` and `WWW-Authenticate`.
///
/// # Examples
///
/// ```rust
/// use sipwire_sip_core::prelude::*;
///
/// let compact: HeaderName = "v".parse().unwrap();
/// assert_eq!(compact, HeaderName::VIA);
/// assert_eq!(HeaderName::CALL_ID.wire_name(), "Call-ID");
/// assert_eq!(HeaderName::new("x-trace-id").wire_name(), "X-Trace-Id");
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct HeaderName(Cow<'static, str>);

/// Compact form to long form, RFC 3261 Section 7.3.3
const COMPACT_FORMS: &[(&str, &str)] = &[
    ("i", "call-id"),
    ("m", "contact"),
    ("e", "content-encoding"),
    ("l", "content-length"),
    ("c", "content-type"),
    ("f", "from"),
    ("s", "subject"),
    ("t", "to"),
    ("v", "via"),
];

impl HeaderName {
    /// `Via`
    pub const VIA: HeaderName = HeaderName::from_static("via");
    /// `From`
    pub const FROM: HeaderName = HeaderName::from_static("from");
    /// `To`
    pub const TO: HeaderName = HeaderName::from_static("to");
    /// `Call-ID`
    pub const CALL_ID: HeaderName = HeaderName::from_static("call-id");
    /// `CSeq`
    pub const CSEQ: HeaderName = HeaderName::from_static("cseq");
    /// `Max-Forwards`
    pub const MAX_FORWARDS: HeaderName = HeaderName::from_static("max-forwards");
    /// `Contact`
    pub const CONTACT: HeaderName = HeaderName::from_static("contact");
    /// `Content-Length`
    pub const CONTENT_LENGTH: HeaderName = HeaderName::from_static("content-length");
    /// `Content-Type`
    pub const CONTENT_TYPE: HeaderName = HeaderName::from_static("content-type");
    /// `Content-Encoding`
    pub const CONTENT_ENCODING: HeaderName = HeaderName::from_static("content-encoding");
    /// `Subject`
    pub const SUBJECT: HeaderName = HeaderName::from_static("subject");
    /// `Route`
    pub const ROUTE: HeaderName = HeaderName::from_static("route");
    /// `Expires`
    pub const EXPIRES: HeaderName = HeaderName::from_static("expires");
    /// `Authorization`
    pub const AUTHORIZATION: HeaderName = HeaderName::from_static("authorization");
    /// `WWW-Authenticate`
    pub const WWW_AUTHENTICATE: HeaderName = HeaderName::from_static("www-authenticate");
    /// `Allow`
    pub const ALLOW: HeaderName = HeaderName::from_static("allow");

    const fn from_static(name: &'static str) -> Self {
        HeaderName(Cow::Borrowed(name))
    }

    /// Canonicalizes `name` without checking that it is a valid token.
    ///
    /// Use [`str::parse`] for names read from the network.
    pub fn new(name: &str) -> Self {
        let lower = name.trim().to_ascii_lowercase();
        if let Some((_, long)) = COMPACT_FORMS.iter().find(|(short, _)| *short == lower) {
            return HeaderName(Cow::Borrowed(*long));
        }
        HeaderName(Cow::Owned(lower))
    }

    /// Canonical lower-case long form
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Single-letter compact form, if the header has one
    pub fn compact_form(&self) -> Option<&'static str> {
        COMPACT_FORMS
            .iter()
            .find(|(_, long)| *long == self.as_str())
            .map(|(short, _)| *short)
    }

    /// Spelling used when serializing
    pub fn wire_name(&self) -> String {
        match self.as_str() {
            "cseq" => "CSeq".to_string(),
            "call-id" => "Call-ID".to_string(),
            "www-authenticate" => "WWW-Authenticate".to_string(),
            other => other
                .split('-')
                .map(capitalize)
                .collect::<Vec<_>>()
                .join("-"),
        }
    }
}

fn capitalize(word: &str) -> String {
    let mut chars = word.chars();
    match chars.next() {
        Some(first) => first.to_ascii_uppercase().to_string() + chars.as_str(),
        None => String::new(),
    }
}

impl fmt::Display for HeaderName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.wire_name())
    }
}

impl FromStr for HeaderName {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        let name = s.trim();
        if name.is_empty() || !name.chars().all(is_token_char) {
            return Err(Error::InvalidHeader(format!("bad header name {s:?}")));
        }
        Ok(HeaderName::new(name))
    }
}

impl From<&str> for HeaderName {
    fn from(name: &str) -> Self {
        HeaderName::new(name)
    }
}

impl From<&HeaderName> for HeaderName {
    fn from(name: &HeaderName) -> Self {
        name.clone()
    }
}
