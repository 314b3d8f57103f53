//! Shared setup for the transaction layer integration tests

#![allow(dead_code)]

use std::net::SocketAddr;
use std::sync::Arc;

use sipwire_sip_core::prelude::*;
use sipwire_transaction_core::testing::{MockTransport, RecordingTu};
use sipwire_transaction_core::{LayerHandle, TransactionLayer, TransactionLayerConfig};

/// Address the layer under test is bound to
pub const LOCAL: &str = "127.0.0.1:5060";

/// Address of the remote party
pub const PEER: &str = "192.0.2.10:5060";

pub fn local() -> SocketAddr {
    LOCAL.parse().unwrap()
}

pub fn peer() -> SocketAddr {
    PEER.parse().unwrap()
}

pub fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter("sipwire_transaction_core=trace")
        .with_test_writer()
        .try_init();
}

/// Starts a layer over a mock transport on [`LOCAL`], answering for the
/// host `127.0.0.1`
pub fn start_layer(tu: Arc<RecordingTu>) -> (LayerHandle, Arc<MockTransport>) {
    init_tracing();
    let (mock, events) = MockTransport::new(local());
    let config = TransactionLayerConfig {
        hosts: vec!["127.0.0.1".to_string()],
        port: 5060,
        ..Default::default()
    };
    let (layer, _task) = TransactionLayer::start(config, mock.clone(), events, tu).unwrap();
    (layer, mock)
}

/// A request the TU would hand to `start_client`: no Via yet
pub fn outgoing(method: Method) -> Request {
    Request::new(method.clone(), "sip:bob@192.0.2.10".parse().unwrap())
        .with_header(HeaderName::MAX_FORWARDS, "70")
        .with_header(HeaderName::TO, "<sip:bob@example.com>")
        .with_header(HeaderName::FROM, "<sip:alice@example.com>;tag=a1")
        .with_header(HeaderName::CALL_ID, "out-1@127.0.0.1")
        .with_header(HeaderName::CSEQ, CSeq::new(1, method).to_string())
        .with_header(HeaderName::CONTENT_LENGTH, "0")
}

/// A request arriving from [`PEER`] with the given top Via
pub fn incoming_with_via(method: Method, via: &str) -> Request {
    Request::new(method.clone(), "sip:alice@127.0.0.1".parse().unwrap())
        .with_header(HeaderName::VIA, via)
        .with_header(HeaderName::MAX_FORWARDS, "70")
        .with_header(HeaderName::TO, "<sip:alice@example.com>")
        .with_header(HeaderName::FROM, "<sip:bob@example.com>;tag=b1")
        .with_header(HeaderName::CALL_ID, "in-1@192.0.2.10")
        .with_header(HeaderName::CSEQ, CSeq::new(1, method).to_string())
        .with_header(HeaderName::CONTENT_LENGTH, "0")
}

/// A request arriving from [`PEER`] with an RFC 3261 branch
pub fn incoming(method: Method, branch: &str) -> Request {
    incoming_with_via(method, &format!("SIP/2.0/UDP 192.0.2.10:5060;branch={branch}"))
}

/// The request inside a sent message
pub fn sent_request(message: &Message) -> Request {
    message.as_request().expect("expected a request").clone()
}

/// The response inside a sent message
pub fn sent_response(message: &Message) -> Response {
    message.as_response().expect("expected a response").clone()
}

/// Responses among everything the mock has sent
pub fn responses(mock: &MockTransport) -> Vec<Response> {
    mock.sent()
        .into_iter()
        .filter_map(|sent| sent.message.as_response().cloned())
        .collect()
}

/// Requests of `method` among everything the mock has sent
pub fn requests(mock: &MockTransport, method: Method) -> Vec<Request> {
    mock.sent()
        .into_iter()
        .filter_map(|sent| sent.message.as_request().cloned())
        .filter(|request| request.method == method)
        .collect()
}
