//! Send primitives shared by the transaction layer and its TU
//!
//! [`TransportBinding`] wraps a [`Transport`] together with the identity the
//! layer advertises (host names and port). Outgoing requests get their top
//! Via stamped with that identity; responses are routed along their top
//! Via; both are held to the datagram ceiling.

use std::net::{IpAddr, SocketAddr};
use std::sync::Arc;

use sipwire_sip_core::{HeaderAccess, Message, Request, Response, Via};
use sipwire_sip_transport::{MAX_DATAGRAM_SIZE, Transport};
use tracing::trace;

use crate::error::{Error, Result};

/// A transport plus the host names and port this layer answers for
#[derive(Debug, Clone)]
pub struct TransportBinding {
    transport: Arc<dyn Transport>,
    hosts: Vec<String>,
    port: u16,
}

impl TransportBinding {
    /// Binds `transport` to the advertised `hosts` and `port`. The first
    /// host is the one stamped into outgoing Via headers.
    pub fn new(transport: Arc<dyn Transport>, hosts: Vec<String>, port: u16) -> Self {
        Self {
            transport,
            hosts,
            port,
        }
    }

    /// The underlying transport
    pub fn transport(&self) -> &Arc<dyn Transport> {
        &self.transport
    }

    /// Host names this layer answers for
    pub fn hosts(&self) -> &[String] {
        &self.hosts
    }

    /// Advertised port
    pub fn port(&self) -> u16 {
        self.port
    }

    /// Host put in outgoing Via headers
    pub fn default_hostname(&self) -> &str {
        self.hosts.first().map(String::as_str).unwrap_or_default()
    }

    /// Whether the transport guarantees delivery
    pub fn is_reliable(&self) -> bool {
        self.transport.is_reliable()
    }

    /// Whether a response's top Via names this layer
    pub fn is_local_via(&self, via: &Via) -> bool {
        via.port_or_default() == self.port && self.hosts.iter().any(|host| host.eq_ignore_ascii_case(&via.host))
    }

    /// Rewrites the top Via sent-by to this layer's host and port
    pub fn stamp_via(&self, request: &mut Request) -> Result<()> {
        let mut via = request.top_via().map_err(|_| Error::MissingHeader("Via"))?;
        via.host = self.default_hostname().to_string();
        via.port = Some(self.port);
        request.set_top_via(&via);
        Ok(())
    }

    /// Fails with [`Error::Oversize`] when the encoded message does not fit
    /// in one datagram
    pub fn check_size(&self, message: &Message) -> Result<usize> {
        let size = message.to_bytes().len();
        let limit = self
            .transport
            .max_message_size()
            .map_or(MAX_DATAGRAM_SIZE, |limit| limit.min(MAX_DATAGRAM_SIZE));
        if size > limit {
            return Err(Error::Oversize { size, limit });
        }
        Ok(size)
    }

    /// Stamps the top Via and sends `request` to `target`
    pub async fn send_request(&self, mut request: Request, target: SocketAddr) -> Result<()> {
        self.stamp_via(&mut request)?;
        let message = Message::Request(request);
        let size = self.check_size(&message)?;
        trace!(%target, size, message = %message.short_description(), "sending request");
        self.transport.send_message(message, target).await?;
        Ok(())
    }

    /// Sends `response` to the address its top Via designates. Via headers
    /// are sent as they are; popping them is up to the caller.
    pub async fn send_response(&self, response: Response) -> Result<()> {
        let destination = response_destination(&response).await?;
        let message = Message::Response(response);
        let size = self.check_size(&message)?;
        trace!(%destination, size, message = %message.short_description(), "sending response");
        self.transport.send_message(message, destination).await?;
        Ok(())
    }
}

/// Where a response goes, RFC 3261 section 18.2.2 with RFC 3581: the
/// `received` address if present, else the sent-by host; the `rport` value
/// if present, else the sent-by port, else 5060
pub async fn response_destination(response: &Response) -> Result<SocketAddr> {
    let via = response.top_via().map_err(|_| Error::MissingHeader("Via"))?;
    resolve(via.response_host(), via.response_port()).await
}

pub(crate) async fn resolve(host: &str, port: u16) -> Result<SocketAddr> {
    let literal = host.trim_start_matches('[').trim_end_matches(']');
    if let Ok(ip) = literal.parse::<IpAddr>() {
        return Ok(SocketAddr::new(ip, port));
    }
    tokio::net::lookup_host((host, port))
        .await
        .ok()
        .and_then(|mut addrs| addrs.next())
        .ok_or_else(|| Error::UnresolvableHost(host.to_string()))
}
