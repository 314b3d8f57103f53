use nom::{
    branch::alt,
    bytes::complete::take_while1,
    character::complete::{char, digit1},
    combinator::{all_consuming, map_res, opt},
    sequence::{delimited, pair, preceded},
};

use super::whitespace::ParseResult;
use crate::error::{Error, Result};
use crate::types::address::Address;
use crate::types::uri::{Scheme, Uri};

type Params = Vec<(String, Option<String>)>;

fn ipv6_reference(input: &str) -> ParseResult<'_, &str> {
    delimited(
        char('['),
        take_while1(|c: char| c.is_ascii_hexdigit() || c == ':' || c == '.'),
        char(']'),
    )(input)
}

fn hostname(input: &str) -> ParseResult<'_, &str> {
    take_while1(|c: char| c.is_ascii_alphanumeric() || matches!(c, '.' | '-' | '_'))(input)
}

fn port(input: &str) -> ParseResult<'_, u16> {
    map_res(digit1, str::parse::<u16>)(input)
}

/// `host[:port]`, where host may be a bracketed IPv6 reference
pub(crate) fn host_port(input: &str) -> ParseResult<'_, (&str, Option<u16>)> {
    pair(alt((ipv6_reference, hostname)), opt(preceded(char(':'), port)))(input)
}

fn split_params(text: &str) -> Params {
    text.split(';')
        .map(str::trim)
        .filter(|param| !param.is_empty())
        .map(|param| match param.split_once('=') {
            Some((name, value)) => (name.trim().to_string(), Some(value.trim().to_string())),
            None => (param.to_string(), None),
        })
        .collect()
}

fn strip_prefix_ignore_case<'a>(text: &'a str, prefix: &str) -> Option<&'a str> {
    let head = text.get(..prefix.len())?;
    head.eq_ignore_ascii_case(prefix)
        .then(|| &text[prefix.len()..])
}

/// Parses a `sip:` or `sips:` URI
pub(crate) fn parse_uri(input: &str) -> Result<Uri> {
    let invalid = || Error::InvalidUri(input.to_string());
    let text = input.trim();
    let (scheme, rest) = if let Some(rest) = strip_prefix_ignore_case(text, "sips:") {
        (Scheme::Sips, rest)
    } else if let Some(rest) = strip_prefix_ignore_case(text, "sip:") {
        (Scheme::Sip, rest)
    } else {
        return Err(invalid());
    };

    let (rest, headers) = match rest.split_once('?') {
        Some((rest, headers)) => (rest, Some(headers)),
        None => (rest, None),
    };
    let (user_host, params) = match rest.split_once(';') {
        Some((user_host, params)) => (user_host, params),
        None => (rest, ""),
    };
    let (user_info, host_part) = match user_host.rsplit_once('@') {
        Some((user_info, host_part)) => (Some(user_info), host_part),
        None => (None, user_host),
    };

    let (_, (host, port)) = all_consuming(host_port)(host_part).map_err(|_| invalid())?;
    let mut uri = Uri::new(host);
    uri.scheme = scheme;
    uri.port = port;

    if let Some(user_info) = user_info {
        if user_info.is_empty() {
            return Err(invalid());
        }
        match user_info.split_once(':') {
            Some((user, password)) => {
                uri.user = Some(user.to_string());
                uri.password = Some(password.to_string());
            }
            None => uri.user = Some(user_info.to_string()),
        }
    }

    for (name, value) in split_params(params) {
        match (name.to_ascii_lowercase().as_str(), value) {
            ("user", Some(v)) => uri.user_type = Some(v),
            ("transport", Some(v)) => uri.transport = Some(v),
            ("ttl", Some(v)) => uri.ttl = Some(v.parse().map_err(|_| invalid())?),
            ("maddr", Some(v)) => uri.maddr = Some(v),
            ("method", Some(v)) => uri.method = Some(v),
            ("tag", Some(v)) => uri.tag = Some(v),
            (_, value) => uri.params.push((name, value)),
        }
    }

    if let Some(headers) = headers {
        for header in headers.split('&').filter(|h| !h.is_empty()) {
            let (name, value) = header.split_once('=').ok_or_else(invalid)?;
            uri.headers.push((name.to_string(), value.to_string()));
        }
    }
    Ok(uri)
}

fn unquote(name: &str) -> &str {
    name.strip_prefix('"')
        .and_then(|inner| inner.strip_suffix('"'))
        .unwrap_or(name)
}

/// Parses a `name-addr` or bare `addr-spec` header value
pub(crate) fn parse_address(input: &str) -> Result<Address> {
    let invalid = || Error::InvalidAddress(input.to_string());
    let text = input.trim();

    let (display_name, uri_text, params) = match text.split_once('<') {
        Some((name, rest)) => {
            let (uri_text, params) = rest.split_once('>').ok_or_else(invalid)?;
            let name = unquote(name.trim()).trim();
            let name = (!name.is_empty()).then(|| name.to_string());
            (name, uri_text, params)
        }
        None => match text.split_once(';') {
            Some((uri_text, params)) => (None, uri_text, params),
            None => (None, text, ""),
        },
    };

    let uri = parse_uri(uri_text).map_err(|_| invalid())?;
    Ok(Address {
        display_name,
        uri,
        params: split_params(params),
    })
}
