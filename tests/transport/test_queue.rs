// Copyright (c) 2025 Fabstir
// SPDX-License-Identifier: BUSL-1.1
//! Queue transport with the side-channel handshake

use flight_courier::crypto::{encode, SessionKey};
use flight_courier::records::MemorySink;
use flight_courier::transport::{
    Channel, DeliveryOutcome, MemoryQueue, MessageQueue, QueueChannel, QueueReceiver,
    SideChannelListener,
};
use std::sync::Arc;

use super::fixtures::{flight, flight_numbers, flights};

#[tokio::test]
async fn test_delivery_before_handshake_is_rejected() {
    let queue = MemoryQueue::new("flights");
    let sink = MemorySink::new();
    let listener = SideChannelListener::bind("127.0.0.1:0").await.unwrap();

    let mut receiver = QueueReceiver::start(listener, Arc::new(queue.clone()), Arc::new(sink.clone()))
        .await
        .unwrap();

    // Sealed under a key the consumer has never seen
    let early = encode(&flight("EARLY"), &SessionKey::generate()).unwrap();
    queue.publish(early.to_bytes()).await.unwrap();

    assert_eq!(
        receiver.next_outcome().await,
        Some(DeliveryOutcome::RejectedNoKey)
    );
    assert!(!receiver.key_slot().is_ready().await);

    let stats = receiver.shutdown().await;
    assert_eq!(stats.rejected_no_key, 1);
    assert_eq!(stats.persisted, 0);
    assert_eq!(sink.count().await, 0);
}

#[tokio::test]
async fn test_records_persisted_after_handshake() {
    let queue = MemoryQueue::new("flights");
    let sink = MemorySink::new();
    let listener = SideChannelListener::bind("127.0.0.1:0").await.unwrap();
    let side_channel = listener.local_addr().unwrap().to_string();

    let mut receiver = QueueReceiver::start(listener, Arc::new(queue.clone()), Arc::new(sink.clone()))
        .await
        .unwrap();

    let mut channel = QueueChannel::new(side_channel, Arc::new(queue.clone()));
    channel.negotiate().await.unwrap();
    receiver.wait_for_handshake().await.unwrap();
    assert!(receiver.key_slot().is_ready().await);

    for record in flights(&["Q1", "Q2", "Q3"]) {
        channel.send(&record).await.unwrap();
    }
    for _ in 0..3 {
        assert_eq!(receiver.next_outcome().await, Some(DeliveryOutcome::Persisted));
    }
    channel.close().await.unwrap();
    assert_eq!(channel.sent(), 3);
    assert_eq!(queue.published(), 3);

    let stats = receiver.shutdown().await;
    assert_eq!(stats.received, 3);
    assert_eq!(stats.persisted, 3);
    assert_eq!(flight_numbers(&sink.records().await), vec!["Q1", "Q2", "Q3"]);

    // Shutdown destroys the key
    assert!(!receiver.key_slot().is_ready().await);
}

#[tokio::test]
async fn test_corrupted_message_dropped_and_session_continues() {
    let queue = MemoryQueue::new("flights");
    let sink = MemorySink::new();
    let listener = SideChannelListener::bind("127.0.0.1:0").await.unwrap();
    let side_channel = listener.local_addr().unwrap().to_string();

    let mut receiver = QueueReceiver::start(listener, Arc::new(queue.clone()), Arc::new(sink.clone()))
        .await
        .unwrap();
    let mut channel = Channel::Queue(QueueChannel::new(side_channel, Arc::new(queue.clone())));
    channel.negotiate().await.unwrap();
    receiver.wait_for_handshake().await.unwrap();

    queue.publish(vec![0u8; 40]).await.unwrap();
    channel.send(&flight("AFTER")).await.unwrap();

    assert!(matches!(
        receiver.next_outcome().await,
        Some(DeliveryOutcome::Dropped(_))
    ));
    assert_eq!(receiver.next_outcome().await, Some(DeliveryOutcome::Persisted));

    let stats = receiver.shutdown().await;
    assert_eq!(stats.dropped, 1);
    assert_eq!(stats.persisted, 1);
    assert_eq!(flight_numbers(&sink.records().await), vec!["AFTER"]);
}
