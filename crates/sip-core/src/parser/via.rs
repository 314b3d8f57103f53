use nom::{
    bytes::complete::{tag, take_until, take_while1},
    character::complete::char,
    combinator::{all_consuming, opt, recognize},
    multi::many0,
    sequence::{delimited, pair, preceded, tuple},
};

use super::uri::host_port;
use super::whitespace::{owsp, separator, token, wsp1, ParseResult};
use crate::error::{Error, Result};
use crate::types::method::is_token_char;
use crate::types::via::{Rport, Via};

type RawParam<'a> = (&'a str, Option<&'a str>);
type ViaParts<'a> = (&'a str, (&'a str, Option<u16>), Vec<RawParam<'a>>);

fn is_param_char(c: char) -> bool {
    is_token_char(c) || matches!(c, ':' | '[' | ']' | '/')
}

fn quoted_string(input: &str) -> ParseResult<'_, &str> {
    recognize(delimited(char('"'), take_until("\""), char('"')))(input)
}

fn param_value(input: &str) -> ParseResult<'_, &str> {
    nom::branch::alt((quoted_string, take_while1(is_param_char)))(input)
}

/// `;name[=value]` with optional whitespace around the separators
pub(crate) fn generic_param(input: &str) -> ParseResult<'_, RawParam<'_>> {
    preceded(
        separator(';'),
        pair(token, opt(preceded(separator('='), param_value))),
    )(input)
}

fn sent_protocol(input: &str) -> ParseResult<'_, &str> {
    preceded(
        tuple((tag("SIP"), separator('/'), tag("2.0"), separator('/'))),
        token,
    )(input)
}

fn comment(input: &str) -> ParseResult<'_, &str> {
    delimited(char('('), take_until(")"), char(')'))(input)
}

fn via_segment(input: &str) -> ParseResult<'_, ViaParts<'_>> {
    let (input, (_, transport, _, sent_by, params, _, _, _)) = tuple((
        owsp,
        sent_protocol,
        wsp1,
        host_port,
        many0(generic_param),
        owsp,
        opt(comment),
        owsp,
    ))(input)?;
    Ok((input, (transport, sent_by, params)))
}

/// Parses one Via segment: `SIP/2.0/TRANSPORT host[:port][;param[=value]]*`
pub(crate) fn parse_via(input: &str) -> Result<Via> {
    let invalid = || Error::InvalidVia(input.to_string());
    let (_, (transport, (host, port), params)) =
        all_consuming(via_segment)(input).map_err(|_| invalid())?;

    let mut via = Via::new(host, port);
    via.transport = transport.to_string();
    for (name, value) in params {
        match (name.to_ascii_lowercase().as_str(), value) {
            ("hidden", _) => via.hidden = true,
            ("ttl", Some(v)) => via.ttl = Some(v.parse().map_err(|_| invalid())?),
            ("branch", Some(v)) => via.branch = Some(v.to_string()),
            ("maddr", Some(v)) => via.maddr = Some(v.to_string()),
            ("received", Some(v)) => via.received = Some(v.to_string()),
            ("rport", None) => via.rport = Rport::Requested,
            ("rport", Some(v)) => via.rport = Rport::Value(v.parse().map_err(|_| invalid())?),
            _ => {
                via.params
                    .insert(name.to_string(), value.map(str::to_string));
            }
        }
    }
    Ok(via)
}
