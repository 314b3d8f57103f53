//! Two layers talking over real UDP sockets on the loopback interface

use std::sync::Arc;
use std::time::Duration;

use sipwire_sip_core::prelude::*;
use sipwire_sip_transport::{Transport, bind_udp};
use sipwire_transaction_core::testing::RecordingTu;
use sipwire_transaction_core::{TransactionLayer, TransactionLayerConfig, TransactionState};
use tokio::time::timeout;

#[tokio::test]
async fn test_options_round_trip_over_udp() {
    let (server_transport, server_events) = bind_udp("127.0.0.1:0".parse().unwrap()).await.unwrap();
    let server_addr = server_transport.local_addr().unwrap();
    let server_tu = RecordingTu::answering(StatusCode::OK);
    let (_server, _server_task) = TransactionLayer::start(
        TransactionLayerConfig::default(),
        Arc::new(server_transport),
        server_events,
        server_tu.clone(),
    )
    .unwrap();

    let (client_transport, client_events) = bind_udp("127.0.0.1:0".parse().unwrap()).await.unwrap();
    let client_addr = client_transport.local_addr().unwrap();
    let client_tu = RecordingTu::new();
    let (client, _client_task) = TransactionLayer::start(
        TransactionLayerConfig::default(),
        Arc::new(client_transport),
        client_events,
        client_tu.clone(),
    )
    .unwrap();
    assert_eq!(client.hosts(), ["127.0.0.1".to_string()]);
    assert_eq!(client.port(), client_addr.port());

    let options = Request::new(Method::Options, format!("sip:{server_addr}").parse().unwrap())
        .with_header(HeaderName::MAX_FORWARDS, "70")
        .with_header(HeaderName::TO, format!("<sip:{server_addr}>"))
        .with_header(HeaderName::FROM, format!("<sip:{client_addr}>;tag=loop"))
        .with_header(HeaderName::CALL_ID, "loopback-1")
        .with_header(HeaderName::CSEQ, "1 OPTIONS")
        .with_header(HeaderName::CONTENT_LENGTH, "0");
    let transaction = client.start_client(options, server_addr).unwrap();

    let (request, _) = timeout(Duration::from_secs(5), server_tu.next_request())
        .await
        .unwrap()
        .unwrap();
    assert_eq!(request.method, Method::Options);

    let (response, matched) = timeout(Duration::from_secs(5), client_tu.next_response())
        .await
        .unwrap()
        .unwrap();
    assert_eq!(response.status, StatusCode::OK);
    assert_eq!(matched, Some(transaction.clone()));
    assert_eq!(transaction.state(), TransactionState::Completed);
}
