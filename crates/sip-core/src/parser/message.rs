use bytes::Bytes;
use nom::{
    branch::alt,
    bytes::complete::{tag, take_while1, take_while_m_n},
    combinator::{all_consuming, eof, map, opt, rest},
    sequence::{pair, preceded, terminated, tuple},
};
use tracing::trace;

use super::whitespace::{hcolon, owsp, split_commas, token, unfold_lines, wsp1, ParseResult};
use crate::error::{Error, Result};
use crate::types::headers::{HeaderName, Headers};
use crate::types::message::Message;
use crate::types::sip_request::Request;
use crate::types::sip_response::Response;
use crate::types::status::StatusCode;

enum StartLine<'a> {
    Request { method: &'a str, uri: &'a str },
    Status { code: &'a str, reason: &'a str },
}

fn request_line(input: &str) -> ParseResult<'_, StartLine<'_>> {
    map(
        tuple((
            token,
            wsp1,
            take_while1(|c: char| !c.is_ascii_whitespace()),
            wsp1,
            tag("SIP/2.0"),
            owsp,
        )),
        |(method, _, uri, _, _, _)| StartLine::Request { method, uri },
    )(input)
}

fn status_line(input: &str) -> ParseResult<'_, StartLine<'_>> {
    map(
        preceded(
            terminated(tag("SIP/2.0"), wsp1),
            // Exactly three digits, then SP and the reason or the end
            pair(
                take_while_m_n(3, 3, |c: char| c.is_ascii_digit()),
                alt((preceded(wsp1, rest), eof)),
            ),
        ),
        |(code, reason)| StartLine::Status { code, reason },
    )(input)
}

fn start_line(input: &str) -> ParseResult<'_, StartLine<'_>> {
    all_consuming(alt((status_line, request_line)))(input)
}

fn header_line(input: &str) -> ParseResult<'_, (&str, &str)> {
    all_consuming(tuple((token, hcolon, opt(rest))))(input)
        .map(|(remaining, (name, _, value))| (remaining, (name, value.unwrap_or("").trim())))
}

/// Byte offsets of the end of the head and the start of the body
fn find_head_end(data: &[u8]) -> Option<(usize, usize)> {
    (0..data.len()).find_map(|index| {
        let tail = &data[index..];
        if tail.starts_with(b"\r\n\r\n") {
            Some((index, index + 4))
        } else if tail.starts_with(b"\n\n") {
            Some((index, index + 2))
        } else {
            None
        }
    })
}

/// Parses one SIP message from a datagram.
///
/// Leading CRLF keep-alives are skipped and folded header lines are joined.
/// A `Via` line carrying several comma-separated segments becomes several
/// `Via` values. When `Content-Length` is present the body is cut to that
/// length; a shorter body is an error. Without `Content-Length` the body is
/// the rest of the datagram.
///
/// ```rust
/// use sipwire_sip_core::prelude::*;
///
/// let raw = b"SIP/2.0 180 Ringing\r\n\
///             v: SIP/2.0/UDP a.example.com;branch=z9hG4bK1, SIP/2.0/UDP b.example.com\r\n\
///             l: 0\r\n\r\n";
/// let message = parse_message(raw).unwrap();
/// let response = message.as_response().unwrap();
/// assert_eq!(response.status, StatusCode::RINGING);
/// assert_eq!(response.vias().unwrap().len(), 2);
/// ```
pub fn parse_message(input: &[u8]) -> Result<Message> {
    let start = input
        .iter()
        .position(|b| *b != b'\r' && *b != b'\n')
        .ok_or(Error::Empty)?;
    let data = &input[start..];

    let (head_end, body_start) = find_head_end(data).ok_or(Error::UnterminatedHead)?;
    let head = std::str::from_utf8(&data[..head_end]).map_err(|_| Error::InvalidUtf8)?;
    let mut lines = unfold_lines(head).into_iter();
    let first = lines.next().ok_or(Error::Empty)?;

    let mut headers = Headers::new();
    for line in lines {
        let (_, (name, value)) =
            header_line(&line).map_err(|_| Error::InvalidHeader(line.clone()))?;
        let name: HeaderName = name.parse()?;
        if name == HeaderName::VIA {
            for segment in split_commas(value) {
                headers.add(&name, segment);
            }
        } else {
            headers.add(name, value);
        }
    }

    let mut body = &data[body_start..];
    if let Some(value) = headers.get(&HeaderName::CONTENT_LENGTH) {
        let expected: usize = value
            .trim()
            .parse()
            .map_err(|_| Error::InvalidContentLength(value.to_string()))?;
        if body.len() < expected {
            return Err(Error::ContentLengthMismatch {
                expected,
                actual: body.len(),
            });
        }
        if body.len() > expected {
            trace!(expected, actual = body.len(), "discarding bytes past Content-Length");
        }
        body = &body[..expected];
    }
    let body = Bytes::copy_from_slice(body);

    let (_, start) = start_line(&first).map_err(|_| Error::InvalidStartLine(first.clone()))?;
    let message = match start {
        StartLine::Request { method, uri } => Message::Request(Request {
            method: method.parse()?,
            uri: uri.parse()?,
            headers,
            body,
        }),
        StartLine::Status { code, reason } => {
            let status: StatusCode = code.parse()?;
            Message::Response(Response {
                status,
                reason: reason.trim_end().to_string(),
                headers,
                body,
            })
        }
    };
    Ok(message)
}
