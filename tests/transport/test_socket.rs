// Copyright (c) 2025 Fabstir
// SPDX-License-Identifier: BUSL-1.1
//! Direct socket transport end to end

use flight_courier::crypto::CryptoError;
use flight_courier::protocol::{framed, HandshakeCarrier};
use flight_courier::records::MemorySink;
use flight_courier::transport::{Channel, SocketChannel, SocketServer, TransportError};
use std::sync::Arc;
use tokio::net::TcpStream;

use super::fixtures::{flight_numbers, flights};

#[tokio::test]
async fn test_records_persisted_in_send_order() {
    let sink = MemorySink::new();
    let mut server = SocketServer::new("127.0.0.1:0", Arc::new(sink.clone()))
        .start()
        .await
        .unwrap();

    let mut channel = SocketChannel::connect(&server.local_addr().to_string())
        .await
        .unwrap();
    channel.negotiate().await.unwrap();
    for record in flights(&["A", "B", "C"]) {
        channel.send(&record).await.unwrap();
    }
    channel.close().await.unwrap();

    let report = server.next_report().await.unwrap();
    let stats = report.result.unwrap();
    assert_eq!(stats.received, 3);
    assert_eq!(stats.persisted, 3);
    assert_eq!(stats.dropped, 0);

    assert_eq!(flight_numbers(&sink.records().await), vec!["A", "B", "C"]);
    server.shutdown().await;
}

#[tokio::test]
async fn test_send_all_reports_progress() {
    let sink = MemorySink::new();
    let mut server = SocketServer::new("127.0.0.1:0", Arc::new(sink.clone()))
        .start()
        .await
        .unwrap();

    let mut channel = Channel::Socket(
        SocketChannel::connect(&server.local_addr().to_string())
            .await
            .unwrap(),
    );
    let mut progress = Vec::new();
    let report = channel
        .send_all(&flights(&["SU100", "SU101", "SU102", "SU103"]), |n| {
            progress.push(n)
        })
        .await
        .unwrap();

    assert_eq!(progress, vec![1, 2, 3, 4]);
    assert_eq!(report.sent, 4);
    assert!(report.acks.is_none());

    let stats = server.next_report().await.unwrap().result.unwrap();
    assert_eq!(stats.persisted, 4);
    assert_eq!(sink.count().await, 4);

    // Closed channels refuse further sends
    let result = channel.send(&flights(&["SU104"])[0]).await;
    assert!(matches!(result, Err(TransportError::Closed)));
    server.shutdown().await;
}

#[tokio::test]
async fn test_garbage_wrapped_key_fails_session() {
    let sink = MemorySink::new();
    let mut server = SocketServer::new("127.0.0.1:0", Arc::new(sink.clone()))
        .start()
        .await
        .unwrap();

    let stream = TcpStream::connect(server.local_addr()).await.unwrap();
    let mut conn = framed(stream);
    let public_key = conn.recv_frame().await.unwrap().unwrap();
    assert!(!public_key.is_empty());
    conn.send_frame(&[7u8; 256]).await.unwrap();

    let report = server.next_report().await.unwrap();
    match report.result {
        Err(TransportError::Handshake(CryptoError::KeyUnwrap)) => {}
        other => panic!("Expected key unwrap failure, got {:?}", other),
    }
    assert_eq!(sink.count().await, 0);
    server.shutdown().await;
}

#[tokio::test]
async fn test_server_accepts_sessions_back_to_back() {
    let sink = MemorySink::new();
    let mut server = SocketServer::new("127.0.0.1:0", Arc::new(sink.clone()))
        .start()
        .await
        .unwrap();
    let address = server.local_addr().to_string();

    for batch in [["X1", "X2"], ["Y1", "Y2"]] {
        let mut channel = Channel::Socket(SocketChannel::connect(&address).await.unwrap());
        channel.send_all(&flights(&batch), |_| {}).await.unwrap();
        let stats = server.next_report().await.unwrap().result.unwrap();
        assert_eq!(stats.persisted, 2);
    }

    assert_eq!(
        flight_numbers(&sink.records().await),
        vec!["X1", "X2", "Y1", "Y2"]
    );
    server.shutdown().await;
}
