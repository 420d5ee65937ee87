//! The stateful session façade: which verbs are legal per state, the
//! transitions on subscribe/unsubscribe/begin/commit/abort, transaction
//! header injection, and draining of buffered consumer frames.

mod common;

use osmium_stomp::{AckMode, Client, Frame, StateKind, StatefulClient, StompError};

fn unconnected_stateful() -> StatefulClient {
    let client = Client::new("tcp://127.0.0.1:61613").unwrap();
    StatefulClient::new(client)
}

fn message_frame() -> Frame {
    Frame::new("MESSAGE")
        .header("message-id", "m-1")
        .header("subscription", "1")
}

// ============================================================================
// Legality of operations per state (no broker needed for forbidden ops)
// ============================================================================

#[tokio::test]
async fn producer_forbids_consumer_operations() {
    let mut stateful = unconnected_stateful();
    assert_eq!(stateful.state(), StateKind::Producer);

    let err = stateful.ack(&message_frame()).await.unwrap_err();
    match err {
        StompError::InvalidState { state, operation } => {
            assert_eq!(state, "producer");
            assert_eq!(operation, "ack");
        }
        other => panic!("expected InvalidState, got {other:?}"),
    }

    assert!(matches!(
        stateful.nack(&message_frame(), None).await.unwrap_err(),
        StompError::InvalidState { .. }
    ));
    assert!(matches!(
        stateful.read_frame().await.unwrap_err(),
        StompError::InvalidState { .. }
    ));
    assert!(matches!(
        stateful.commit().await.unwrap_err(),
        StompError::InvalidState { .. }
    ));
    assert!(matches!(
        stateful.abort().await.unwrap_err(),
        StompError::InvalidState { .. }
    ));
    assert!(matches!(
        stateful.unsubscribe(1).await.unwrap_err(),
        StompError::InvalidState { .. }
    ));
}

// ============================================================================
// Subscribe / unsubscribe transitions
// ============================================================================

#[tokio::test]
async fn subscribe_moves_producer_to_consumer_and_back() {
    let (listener, uri) = common::bind().await;
    let server = tokio::spawn(async move {
        let session = common::accept_session(&listener).await;
        let mut seen = Vec::new();
        common::auto_receipt_loop(session, |frame| seen.push(frame.clone())).await;
        seen
    });

    let mut client = Client::new(&uri).unwrap();
    client.connect().await.unwrap();
    let mut stateful = StatefulClient::new(client);

    let id = stateful.subscribe("/queue/a", AckMode::Auto).await.unwrap();
    assert_eq!(stateful.state(), StateKind::Consumer);
    assert_eq!(stateful.subscriptions().len(), 1);
    let subscription = stateful.subscriptions().get(id).expect("subscription");
    assert_eq!(subscription.destination(), "/queue/a");
    assert_eq!(subscription.ack(), AckMode::Auto);

    // matching by the frame's subscription header
    let inbound = Frame::new("MESSAGE").header("subscription", id.to_string());
    assert!(stateful.subscription_for(&inbound).is_some());
    let foreign = Frame::new("MESSAGE").header("subscription", "99999");
    assert!(stateful.subscription_for(&foreign).is_none());

    stateful.unsubscribe(id).await.unwrap();
    assert_eq!(stateful.state(), StateKind::Producer);
    assert!(stateful.subscriptions().is_empty());

    stateful.client_mut().disconnect().await;
    let seen = server.await.unwrap();
    assert_eq!(seen[0].command, "SUBSCRIBE");
    assert_eq!(seen[0].get_header("destination"), Some("/queue/a"));
    assert_eq!(seen[0].get_header("ack"), Some("auto"));
    assert_eq!(seen[0].get_header("id"), Some(id.to_string().as_str()));
    assert_eq!(seen[1].command, "UNSUBSCRIBE");
    assert_eq!(seen[1].get_header("id"), Some(id.to_string().as_str()));
}

#[tokio::test]
async fn unsubscribe_requires_a_known_subscription() {
    let (listener, uri) = common::bind().await;
    let server = tokio::spawn(async move {
        let session = common::accept_session(&listener).await;
        common::auto_receipt_loop(session, |_| {}).await;
    });

    let mut client = Client::new(&uri).unwrap();
    client.connect().await.unwrap();
    let mut stateful = StatefulClient::new(client);
    stateful.subscribe("/queue/a", AckMode::Auto).await.unwrap();

    let err = stateful.unsubscribe(424242).await.unwrap_err();
    assert!(matches!(err, StompError::Protocol(_)));
    // still a consumer; the real subscription is untouched
    assert_eq!(stateful.state(), StateKind::Consumer);
    assert_eq!(stateful.subscriptions().len(), 1);

    stateful.client_mut().disconnect().await;
    server.await.unwrap();
}

// ============================================================================
// Transactions
// ============================================================================

#[tokio::test]
async fn begin_send_commit_roundtrip() {
    let (listener, uri) = common::bind().await;
    let server = tokio::spawn(async move {
        let session = common::accept_session(&listener).await;
        let mut seen = Vec::new();
        common::auto_receipt_loop(session, |frame| seen.push(frame.clone())).await;
        seen
    });

    let mut client = Client::new(&uri).unwrap();
    client.connect().await.unwrap();
    let mut stateful = StatefulClient::new(client);

    stateful.begin().await.unwrap();
    assert_eq!(stateful.state(), StateKind::ProducerInTransaction);
    let tx = stateful.transaction_id().expect("transaction id");

    // nested transactions are rejected
    assert!(matches!(
        stateful.begin().await.unwrap_err(),
        StompError::InvalidState { .. }
    ));

    stateful
        .send("/queue/a", Frame::new("SEND").set_body(b"in-tx".to_vec()))
        .await
        .unwrap();

    stateful.commit().await.unwrap();
    assert_eq!(stateful.state(), StateKind::Producer);
    assert_eq!(stateful.transaction_id(), None);

    stateful.client_mut().disconnect().await;
    let seen = server.await.unwrap();
    assert_eq!(seen[0].command, "BEGIN");
    assert_eq!(seen[0].get_header("transaction"), Some(tx.to_string().as_str()));
    assert_eq!(seen[1].command, "SEND");
    assert_eq!(seen[1].get_header("transaction"), Some(tx.to_string().as_str()));
    assert_eq!(seen[2].command, "COMMIT");
    assert_eq!(seen[2].get_header("transaction"), Some(tx.to_string().as_str()));
}

#[tokio::test]
async fn abort_returns_to_producer() {
    let (listener, uri) = common::bind().await;
    let server = tokio::spawn(async move {
        let session = common::accept_session(&listener).await;
        let mut seen = Vec::new();
        common::auto_receipt_loop(session, |frame| seen.push(frame.clone())).await;
        seen
    });

    let mut client = Client::new(&uri).unwrap();
    client.connect().await.unwrap();
    let mut stateful = StatefulClient::new(client);

    stateful.begin().await.unwrap();
    stateful.abort().await.unwrap();
    assert_eq!(stateful.state(), StateKind::Producer);

    stateful.client_mut().disconnect().await;
    let seen = server.await.unwrap();
    assert_eq!(seen[1].command, "ABORT");
}

#[tokio::test]
async fn consumer_transaction_acks_carry_the_transaction() {
    let (listener, uri) = common::bind().await;
    let server = tokio::spawn(async move {
        let session = common::accept_session(&listener).await;
        let mut seen = Vec::new();
        common::auto_receipt_loop(session, |frame| seen.push(frame.clone())).await;
        seen
    });

    let mut client = Client::new(&uri).unwrap();
    client.connect().await.unwrap();
    let mut stateful = StatefulClient::new(client);

    stateful.subscribe("/queue/a", AckMode::Client).await.unwrap();
    stateful.begin().await.unwrap();
    assert_eq!(stateful.state(), StateKind::ConsumerInTransaction);
    let tx = stateful.transaction_id().unwrap();

    let inbound = Frame::new("MESSAGE")
        .header("message-id", "m-7")
        .header("ack", "a-7");
    stateful.ack(&inbound).await.unwrap();
    stateful.commit().await.unwrap();
    assert_eq!(stateful.state(), StateKind::Consumer);

    stateful.client_mut().disconnect().await;
    let seen = server.await.unwrap();
    let ack = seen.iter().find(|f| f.command == "ACK").expect("ACK frame");
    assert_eq!(ack.get_header("id"), Some("a-7"));
    assert_eq!(ack.get_header("transaction"), Some(tx.to_string().as_str()));
}

// ============================================================================
// Draining
// ============================================================================

async fn serve_with_injection(listener: tokio::net::TcpListener) {
    let mut session = common::accept_session(&listener).await;
    while let Some(frame) = session.next_frame().await {
        match frame.command.as_str() {
            "DISCONNECT" => break,
            "SEND" => {
                // two messages land before the SEND's receipt, so the
                // client buffers them while waiting
                session
                    .write(b"MESSAGE\nmessage-id:m-1\nsubscription:s\n\none\x00")
                    .await;
                session
                    .write(b"MESSAGE\nmessage-id:m-2\nsubscription:s\n\ntwo\x00")
                    .await;
                session.send_receipt_for(&frame).await;
            }
            _ => session.send_receipt_for(&frame).await,
        }
    }
}

#[tokio::test]
async fn unsubscribe_with_buffered_frames_drains_fifo_then_producer() {
    let (listener, uri) = common::bind().await;
    let server = tokio::spawn(serve_with_injection(listener));

    let mut client = Client::new(&uri).unwrap();
    client.connect().await.unwrap();
    let mut stateful = StatefulClient::new(client);

    let id = stateful.subscribe("/queue/a", AckMode::Auto).await.unwrap();
    stateful
        .send("/queue/a", Frame::new("SEND").set_body(b"trigger".to_vec()))
        .await
        .unwrap();
    assert!(stateful.client().has_buffered_frames());

    stateful.unsubscribe(id).await.unwrap();
    assert_eq!(stateful.state(), StateKind::DrainingConsumer);

    // only buffered reads and acks are allowed while draining
    assert!(matches!(
        stateful.subscribe("/queue/b", AckMode::Auto).await.unwrap_err(),
        StompError::Draining { .. }
    ));
    assert!(matches!(
        stateful.begin().await.unwrap_err(),
        StompError::Draining { .. }
    ));

    let first = stateful.read_frame().await.unwrap().expect("first buffered");
    assert_eq!(first.get_header("message-id"), Some("m-1"));
    let second = stateful.read_frame().await.unwrap().expect("second buffered");
    assert_eq!(second.get_header("message-id"), Some("m-2"));

    // the buffer is dry: the next read yields nothing and restores producer
    assert!(stateful.read_frame().await.unwrap().is_none());
    assert_eq!(stateful.state(), StateKind::Producer);

    stateful.client_mut().disconnect().await;
    server.await.unwrap();
}

#[tokio::test]
async fn draining_inside_a_transaction_returns_to_producer_in_transaction() {
    let (listener, uri) = common::bind().await;
    let server = tokio::spawn(serve_with_injection(listener));

    let mut client = Client::new(&uri).unwrap();
    client.connect().await.unwrap();
    let mut stateful = StatefulClient::new(client);

    let id = stateful.subscribe("/queue/a", AckMode::Client).await.unwrap();
    stateful.begin().await.unwrap();
    let tx = stateful.transaction_id().unwrap();

    stateful
        .send("/queue/a", Frame::new("SEND").set_body(b"trigger".to_vec()))
        .await
        .unwrap();
    stateful.unsubscribe(id).await.unwrap();
    assert_eq!(stateful.state(), StateKind::DrainingConsumerInTransaction);

    // sends and transaction boundaries are forbidden until drained
    assert!(matches!(
        stateful
            .send("/queue/a", Frame::new("SEND"))
            .await
            .unwrap_err(),
        StompError::Draining { .. }
    ));
    assert!(matches!(
        stateful.commit().await.unwrap_err(),
        StompError::Draining { .. }
    ));

    // acking while draining still carries the transaction
    let first = stateful.read_frame().await.unwrap().expect("first buffered");
    stateful.ack(&first).await.unwrap();

    assert!(stateful.read_frame().await.unwrap().is_some());
    assert!(stateful.read_frame().await.unwrap().is_none());
    assert_eq!(stateful.state(), StateKind::ProducerInTransaction);
    assert_eq!(stateful.transaction_id(), Some(tx));

    stateful.commit().await.unwrap();
    assert_eq!(stateful.state(), StateKind::Producer);

    stateful.client_mut().disconnect().await;
    server.await.unwrap();
}

#[tokio::test]
async fn subscribe_inside_transaction_becomes_consumer_in_transaction() {
    let (listener, uri) = common::bind().await;
    let server = tokio::spawn(async move {
        let session = common::accept_session(&listener).await;
        common::auto_receipt_loop(session, |_| {}).await;
    });

    let mut client = Client::new(&uri).unwrap();
    client.connect().await.unwrap();
    let mut stateful = StatefulClient::new(client);

    stateful.begin().await.unwrap();
    let id = stateful.subscribe("/queue/a", AckMode::Auto).await.unwrap();
    assert_eq!(stateful.state(), StateKind::ConsumerInTransaction);

    // buffer is empty, so unsubscribing goes straight back to the
    // producer-in-transaction state
    stateful.unsubscribe(id).await.unwrap();
    assert_eq!(stateful.state(), StateKind::ProducerInTransaction);

    stateful.abort().await.unwrap();
    assert_eq!(stateful.state(), StateKind::Producer);

    stateful.client_mut().disconnect().await;
    server.await.unwrap();
}
