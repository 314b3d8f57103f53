//! Client transactions driven through a running layer on a mock transport
//!
//! Time is paused, so timer assertions are exact.

mod common;

use std::time::Duration;

use sipwire_sip_core::prelude::*;
use sipwire_transaction_core::testing::{MockTransport, RecordingTu, TuEvent};
use sipwire_transaction_core::{
    Error, TimerSettings, TransactionLayer, TransactionLayerConfig, TransactionState,
};
use tokio::time::{Instant, sleep, timeout};

use common::*;

#[tokio::test(start_paused = true)]
async fn test_non_invite_timeout_backs_off_then_408() {
    let tu = RecordingTu::new();
    let (layer, mock) = start_layer(tu.clone());
    let start = Instant::now();

    let transaction = layer.start_client(outgoing(Method::Options), peer()).unwrap();
    assert_eq!(transaction.state(), TransactionState::Trying);

    let (response, matched) = tu.next_response().await.unwrap();
    assert_eq!(response.status, StatusCode::REQUEST_TIMEOUT);
    assert_eq!(matched, Some(transaction.clone()));
    assert_eq!(start.elapsed(), Duration::from_secs(32));

    let sends: Vec<Instant> = mock.sent().iter().map(|sent| sent.at).collect();
    let gaps: Vec<u64> = sends
        .windows(2)
        .map(|pair| (pair[1] - pair[0]).as_millis() as u64)
        .collect();
    assert_eq!(
        gaps,
        vec![500, 1000, 2000, 4000, 4000, 4000, 4000, 4000, 4000, 4000]
    );
    assert!(mock.sent().iter().all(|sent| sent.destination == peer()));

    match tu.next_event().await.unwrap() {
        TuEvent::Terminated(terminated) => assert_eq!(terminated, transaction),
        other => panic!("expected termination, got {other:?}"),
    }
    assert!(transaction.is_terminated());
}

#[tokio::test(start_paused = true)]
async fn test_non_invite_final_response_stops_retransmission() {
    let tu = RecordingTu::new();
    let (layer, mock) = start_layer(tu.clone());

    let transaction = layer.start_client(outgoing(Method::Register), peer()).unwrap();
    let request = sent_request(&mock.next_sent().await.unwrap().message);
    let via = request.top_via().unwrap();
    assert_eq!(via.host, "127.0.0.1");
    assert_eq!(via.port, Some(5060));
    assert_eq!(via.branch.as_deref(), Some(transaction.branch()));
    assert!(transaction.branch().starts_with(BRANCH_MAGIC_COOKIE));

    sleep(Duration::from_millis(600)).await;
    mock.inject(Response::from_request(StatusCode::OK, &request), peer())
        .await;
    let (response, _) = tu.next_response().await.unwrap();
    assert_eq!(response.status, StatusCode::OK);
    assert_eq!(transaction.state(), TransactionState::Completed);

    // A retransmitted final response is absorbed
    mock.inject(Response::from_request(StatusCode::OK, &request), peer())
        .await;

    sleep(Duration::from_secs(10)).await;
    assert_eq!(requests(&mock, Method::Register).len(), 2);
    match tu.next_event().await.unwrap() {
        TuEvent::Terminated(terminated) => assert_eq!(terminated, transaction),
        other => panic!("expected termination, got {other:?}"),
    }
}

#[tokio::test(start_paused = true)]
async fn test_invite_success_is_not_acked() {
    let tu = RecordingTu::new();
    let (layer, mock) = start_layer(tu.clone());

    let transaction = layer.start_client(outgoing(Method::Invite), peer()).unwrap();
    assert_eq!(transaction.state(), TransactionState::Calling);
    let invite = sent_request(&mock.next_sent().await.unwrap().message);

    mock.inject(Response::from_request(StatusCode::TRYING, &invite), peer())
        .await;
    let (trying, _) = tu.next_response().await.unwrap();
    assert_eq!(trying.status, StatusCode::TRYING);
    assert_eq!(transaction.state(), TransactionState::Proceeding);

    mock.inject(Response::from_request(StatusCode::OK, &invite), peer())
        .await;
    let (ok, matched) = tu.next_response().await.unwrap();
    assert_eq!(ok.status, StatusCode::OK);
    assert_eq!(matched, Some(transaction.clone()));
    assert!(matches!(tu.next_event().await, Some(TuEvent::Terminated(_))));
    assert!(transaction.is_terminated());

    sleep(Duration::from_secs(64)).await;
    assert_eq!(mock.sent().len(), 1);
    assert!(requests(&mock, Method::Ack).is_empty());
}

#[tokio::test(start_paused = true)]
async fn test_invite_failure_is_acked_once_per_response() {
    let tu = RecordingTu::new();
    let (layer, mock) = start_layer(tu.clone());

    let transaction = layer.start_client(outgoing(Method::Invite), peer()).unwrap();
    let invite = sent_request(&mock.next_sent().await.unwrap().message);

    let mut busy = Response::from_request(StatusCode::BUSY_HERE, &invite);
    busy.headers.set(HeaderName::TO, "<sip:bob@example.com>;tag=callee");
    mock.inject(busy.clone(), peer()).await;
    let completed_at = Instant::now();

    let (response, _) = tu.next_response().await.unwrap();
    assert_eq!(response.status, StatusCode::BUSY_HERE);
    assert_eq!(transaction.state(), TransactionState::Completed);

    let acks = requests(&mock, Method::Ack);
    assert_eq!(acks.len(), 1);
    let ack = &acks[0];
    assert_eq!(ack.cseq().unwrap(), CSeq::new(1, Method::Ack));
    assert_eq!(ack.top_via().unwrap().branch, invite.top_via().unwrap().branch);
    assert_eq!(ack.to_tag().as_deref(), Some("callee"));
    assert_eq!(ack.header(&HeaderName::CALL_ID), invite.header(&HeaderName::CALL_ID));
    assert_eq!(ack.uri.to_string(), invite.uri.to_string());

    // Each retransmission of the failure is answered with the same ACK and
    // not passed up again
    mock.inject(busy, peer()).await;
    sleep(Duration::from_millis(10)).await;
    let acks = requests(&mock, Method::Ack);
    assert_eq!(acks.len(), 2);
    assert_eq!(acks[0].to_bytes(), acks[1].to_bytes());

    match tu.next_event().await.unwrap() {
        TuEvent::Terminated(terminated) => assert_eq!(terminated, transaction),
        other => panic!("expected termination, got {other:?}"),
    }
    assert_eq!(completed_at.elapsed(), Duration::from_secs(32));
    assert_eq!(requests(&mock, Method::Invite).len(), 1);
}

#[tokio::test(start_paused = true)]
async fn test_invite_timeout_after_timer_b() {
    let tu = RecordingTu::new();
    let (layer, mock) = start_layer(tu.clone());
    let start = Instant::now();

    let transaction = layer.start_client(outgoing(Method::Invite), peer()).unwrap();
    let (response, _) = tu.next_response().await.unwrap();
    assert_eq!(response.status, StatusCode::REQUEST_TIMEOUT);
    assert_eq!(start.elapsed(), Duration::from_secs(32));
    assert!(matches!(tu.next_event().await, Some(TuEvent::Terminated(_))));
    assert!(transaction.is_terminated());

    // Timer A doubles without a ceiling: 0, 0.5, 1.5, 3.5, 7.5, 15.5, 31.5
    assert_eq!(requests(&mock, Method::Invite).len(), 7);
}

#[tokio::test(start_paused = true)]
async fn test_cancel_runs_in_its_own_transaction() {
    let tu = RecordingTu::new();
    let (layer, mock) = start_layer(tu.clone());

    let invite_tx = layer.start_client(outgoing(Method::Invite), peer()).unwrap();
    let invite = sent_request(&mock.next_sent().await.unwrap().message);
    mock.inject(Response::from_request(StatusCode::RINGING, &invite), peer())
        .await;
    tu.next_response().await.unwrap();

    let cancel_tx = invite_tx.cancel().unwrap();
    let cancel = sent_request(&mock.next_sent().await.unwrap().message);
    assert_eq!(cancel.method, Method::Cancel);
    assert_eq!(cancel_tx.branch(), invite_tx.branch());
    assert_eq!(cancel.cseq().unwrap(), CSeq::new(1, Method::Cancel));
    assert_ne!(cancel_tx.id(), invite_tx.id());

    mock.inject(Response::from_request(StatusCode::OK, &cancel), peer())
        .await;
    let (ok, matched) = tu.next_response().await.unwrap();
    assert_eq!(ok.status, StatusCode::OK);
    assert_eq!(matched, Some(cancel_tx.clone()));
    assert_eq!(invite_tx.state(), TransactionState::Proceeding);

    mock.inject(
        Response::from_request(StatusCode::REQUEST_TERMINATED, &invite),
        peer(),
    )
    .await;
    let (terminated, matched) = tu.next_response().await.unwrap();
    assert_eq!(terminated.status, StatusCode::REQUEST_TERMINATED);
    assert_eq!(matched, Some(invite_tx.clone()));
    assert_eq!(requests(&mock, Method::Ack).len(), 1);
}

#[tokio::test(start_paused = true)]
async fn test_cancel_requires_invite() {
    let tu = RecordingTu::new();
    let (layer, _mock) = start_layer(tu);
    let options = layer.start_client(outgoing(Method::Options), peer()).unwrap();
    assert!(matches!(options.cancel(), Err(Error::NotInvite)));
}

#[tokio::test(start_paused = true)]
async fn test_unmatched_response_reaches_tu_without_transaction() {
    let tu = RecordingTu::new();
    let (_layer, mock) = start_layer(tu.clone());

    let stray = Response::new(StatusCode::OK)
        .with_header(HeaderName::VIA, "SIP/2.0/UDP 127.0.0.1:5060;branch=z9hG4bKunknown")
        .with_header(HeaderName::CSEQ, "4 OPTIONS")
        .with_header(HeaderName::CALL_ID, "stray@127.0.0.1");
    mock.inject(stray, peer()).await;

    let (response, matched) = tu.next_response().await.unwrap();
    assert_eq!(response.status, StatusCode::OK);
    assert!(matched.is_none());
}

#[tokio::test(start_paused = true)]
async fn test_misaddressed_response_is_dropped() {
    let tu = RecordingTu::new();
    let (layer, mock) = start_layer(tu.clone());

    let transaction = layer.start_client(outgoing(Method::Options), peer()).unwrap();
    let request = sent_request(&mock.next_sent().await.unwrap().message);

    let mut foreign = Response::from_request(StatusCode::OK, &request);
    let mut via = foreign.top_via().unwrap();
    via.host = "other.example.com".to_string();
    foreign.set_top_via(&via);
    mock.inject(foreign, peer()).await;

    let mut wrong_port = Response::from_request(StatusCode::OK, &request);
    let mut via = wrong_port.top_via().unwrap();
    via.port = Some(5080);
    wrong_port.set_top_via(&via);
    mock.inject(wrong_port, peer()).await;

    assert!(timeout(Duration::from_millis(400), tu.next_event()).await.is_err());
    assert_eq!(transaction.state(), TransactionState::Trying);
}

#[tokio::test(start_paused = true)]
async fn test_cseq_number_must_match() {
    let tu = RecordingTu::new();
    let (layer, mock) = start_layer(tu.clone());

    let transaction = layer.start_client(outgoing(Method::Options), peer()).unwrap();
    let request = sent_request(&mock.next_sent().await.unwrap().message);

    let mut response = Response::from_request(StatusCode::OK, &request);
    response.headers.set(HeaderName::CSEQ, "2 OPTIONS");
    mock.inject(response, peer()).await;

    let (_, matched) = tu.next_response().await.unwrap();
    assert!(matched.is_none());
    assert_eq!(transaction.state(), TransactionState::Trying);
}

#[tokio::test(start_paused = true)]
async fn test_start_client_validation() {
    let tu = RecordingTu::new();
    let (layer, mock) = start_layer(tu);

    let ack = outgoing(Method::Ack);
    assert!(matches!(
        layer.start_client(ack, peer()),
        Err(Error::MissingBranch)
    ));

    let big = outgoing(Method::Message).with_body(vec![b'x'; 1400]);
    assert!(matches!(
        layer.start_client(big, peer()),
        Err(Error::Oversize { limit: 1300, .. })
    ));

    sleep(Duration::from_millis(10)).await;
    assert!(mock.sent().is_empty());
}

#[tokio::test(start_paused = true)]
async fn test_shutdown_stops_the_layer() {
    let tu = RecordingTu::new();
    let (layer, mock) = start_layer(tu);
    layer.shutdown().unwrap();
    sleep(Duration::from_millis(10)).await;
    assert!(layer.is_closed());
    assert!(matches!(
        layer.start_client(outgoing(Method::Options), peer()),
        Err(Error::LayerClosed)
    ));
    assert!(mock.sent().is_empty());
}

#[tokio::test(start_paused = true)]
async fn test_start_rejects_zero_t1() {
    let (mock, events) = MockTransport::new(local());
    let config = TransactionLayerConfig {
        timers: TimerSettings {
            t1: Duration::ZERO,
            ..Default::default()
        },
        ..Default::default()
    };
    let started = TransactionLayer::start(config, mock.clone(), events, RecordingTu::new());
    assert!(matches!(started, Err(Error::InvalidTimers(_))));
}
