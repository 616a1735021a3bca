// Copyright (c) 2025 Fabstir
// SPDX-License-Identifier: BUSL-1.1
//! Streaming RPC transport end to end

use flight_courier::crypto::RsaKeyPair;
use flight_courier::records::MemorySink;
use flight_courier::transport::stream::proto::flight_service_client::FlightServiceClient;
use flight_courier::transport::stream::proto::flight_service_server::{
    FlightService, FlightServiceServer,
};
use flight_courier::transport::stream::proto::{
    Empty, EncryptedPacket, PublicKeyResponse, SessionKeyRequest, StatusResponse,
};
use flight_courier::transport::{Channel, StreamChannel, StreamServer, TransportError};
use std::pin::Pin;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::net::TcpListener;
use tokio_stream::wrappers::TcpListenerStream;
use tokio_stream::{Stream, StreamExt};
use tonic::{Request, Response, Status, Streaming};

use super::fixtures::{flight, flight_numbers, flights};

/// Accepts the key exchange but never finishes the stream
struct HangingService;

#[tonic::async_trait]
impl FlightService for HangingService {
    async fn get_public_key(
        &self,
        _request: Request<Empty>,
    ) -> Result<Response<PublicKeyResponse>, Status> {
        let pair = RsaKeyPair::generate().map_err(|e| Status::internal(e.to_string()))?;
        let pem_key = pair
            .public_key_der()
            .map_err(|e| Status::internal(e.to_string()))?;
        Ok(Response::new(PublicKeyResponse { pem_key }))
    }

    async fn set_session_key(
        &self,
        _request: Request<SessionKeyRequest>,
    ) -> Result<Response<StatusResponse>, Status> {
        Ok(Response::new(StatusResponse::ok("accepted")))
    }

    type StreamFlightsStream =
        Pin<Box<dyn Stream<Item = Result<StatusResponse, Status>> + Send + 'static>>;

    async fn stream_flights(
        &self,
        _request: Request<Streaming<EncryptedPacket>>,
    ) -> Result<Response<Self::StreamFlightsStream>, Status> {
        let stream = futures::stream::pending::<Result<StatusResponse, Status>>();
        Ok(Response::new(Box::pin(stream) as Self::StreamFlightsStream))
    }
}

#[tokio::test]
async fn test_records_acknowledged_and_persisted() {
    let sink = MemorySink::new();
    let mut server = StreamServer::new("127.0.0.1:0", Arc::new(sink.clone()))
        .start()
        .await
        .unwrap();

    let mut channel = Channel::Stream(
        StreamChannel::connect(&server.endpoint(), Duration::from_secs(10))
            .await
            .unwrap(),
    );
    let started = Instant::now();
    let report = channel
        .send_all(&flights(&["SU1402", "SU1403"]), |_| {})
        .await
        .unwrap();

    assert!(started.elapsed() < Duration::from_secs(10));
    assert_eq!(report.sent, 2);
    let acks = report.acks.unwrap();
    assert_eq!(acks.received, 2);
    assert_eq!(acks.succeeded, 2);
    assert_eq!(acks.failed, 0);

    assert_eq!(
        flight_numbers(&sink.records().await),
        vec!["SU1402", "SU1403"]
    );
    drop(channel);
    server.shutdown().await;
}

#[tokio::test]
async fn test_silent_server_times_out() {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let address = listener.local_addr().unwrap();
    let server = tokio::spawn(
        tonic::transport::Server::builder()
            .add_service(FlightServiceServer::new(HangingService))
            .serve_with_incoming(TcpListenerStream::new(listener)),
    );

    let timeout = Duration::from_millis(300);
    let mut channel = StreamChannel::connect(&format!("http://{}", address), timeout)
        .await
        .unwrap();
    channel.negotiate().await.unwrap();
    channel.send(&flight("SU1500")).await.unwrap();

    match channel.close().await {
        Err(TransportError::StreamTimeout { timeout: waited }) => assert_eq!(waited, timeout),
        other => panic!("Expected stream timeout, got {:?}", other),
    }
    assert!(channel.ack_summary().is_none());
    server.abort();
}

#[tokio::test]
async fn test_stream_without_key_exchange_refused() {
    let sink = MemorySink::new();
    let mut server = StreamServer::new("127.0.0.1:0", Arc::new(sink.clone()))
        .start()
        .await
        .unwrap();

    let mut client = FlightServiceClient::connect(server.endpoint()).await.unwrap();
    let packets = tokio_stream::iter(vec![EncryptedPacket {
        iv: vec![0u8; 16],
        encrypted_data: vec![0u8; 32],
    }]);
    let mut acks = client.stream_flights(packets).await.unwrap().into_inner();

    let mut statuses = Vec::new();
    while let Some(status) = acks.next().await {
        statuses.push(status.unwrap());
    }

    assert_eq!(statuses.len(), 1);
    assert!(!statuses[0].success);
    assert_eq!(sink.count().await, 0);
    drop(client);
    server.shutdown().await;
}
