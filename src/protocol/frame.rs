// Copyright (c) 2025 Fabstir
// SPDX-License-Identifier: BUSL-1.1
//! Length-prefixed framing for the socket transport and the side-channel
//!
//! Every frame is a 4-byte big-endian length followed by the payload.

use async_trait::async_trait;
use bytes::Bytes;
use futures::{SinkExt, StreamExt};
use std::io;
use tokio::io::{AsyncRead, AsyncWrite};
use tokio::net::TcpStream;
use tokio_util::codec::{Framed, LengthDelimitedCodec};

use crate::transport::TransportError;

/// Largest accepted frame payload (1 MiB)
pub const MAX_FRAME_LEN: usize = 1024 * 1024;

/// Codec used on every framed connection
pub fn frame_codec() -> LengthDelimitedCodec {
    LengthDelimitedCodec::builder()
        .length_field_length(4)
        .big_endian()
        .max_frame_length(MAX_FRAME_LEN)
        .new_codec()
}

/// A TCP connection speaking the frame protocol
pub type FramedConnection = Framed<TcpStream, LengthDelimitedCodec>;

pub fn framed<T: AsyncRead + AsyncWrite>(io: T) -> Framed<T, LengthDelimitedCodec> {
    Framed::new(io, frame_codec())
}

/// Anything that can carry the two handshake messages
#[async_trait]
pub trait HandshakeCarrier: Send {
    async fn send_frame(&mut self, payload: &[u8]) -> Result<(), TransportError>;

    /// `Ok(None)` when the peer closed cleanly at a frame boundary
    async fn recv_frame(&mut self) -> Result<Option<Vec<u8>>, TransportError>;
}

#[async_trait]
impl<T> HandshakeCarrier for Framed<T, LengthDelimitedCodec>
where
    T: AsyncRead + AsyncWrite + Unpin + Send,
{
    async fn send_frame(&mut self, payload: &[u8]) -> Result<(), TransportError> {
        self.send(Bytes::copy_from_slice(payload)).await?;
        Ok(())
    }

    async fn recv_frame(&mut self) -> Result<Option<Vec<u8>>, TransportError> {
        match self.next().await {
            Some(Ok(frame)) => Ok(Some(frame.to_vec())),
            Some(Err(e)) => Err(classify_read_error(e)),
            None => Ok(None),
        }
    }
}

/// Separate protocol violations from plain socket failures
///
/// The codec reports oversized frames as `InvalidData` and a stream that ends
/// mid-frame as `Other`.
pub fn classify_read_error(e: io::Error) -> TransportError {
    match e.kind() {
        io::ErrorKind::InvalidData | io::ErrorKind::Other => {
            TransportError::MalformedFrame(e.to_string())
        }
        _ => TransportError::Io(e),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::io::AsyncWriteExt;

    #[tokio::test]
    async fn test_frames_round_trip_in_order() {
        let (a, b) = tokio::io::duplex(4096);
        let mut left = framed(a);
        let mut right = framed(b);

        left.send_frame(b"first").await.unwrap();
        left.send_frame(b"second").await.unwrap();
        drop(left);

        assert_eq!(right.recv_frame().await.unwrap(), Some(b"first".to_vec()));
        assert_eq!(right.recv_frame().await.unwrap(), Some(b"second".to_vec()));
        assert_eq!(right.recv_frame().await.unwrap(), None);
    }

    #[tokio::test]
    async fn test_length_prefix_is_big_endian() {
        let (mut a, b) = tokio::io::duplex(64);
        let mut reader = framed(b);

        a.write_all(&[0, 0, 0, 3, b'a', b'b', b'c']).await.unwrap();
        assert_eq!(reader.recv_frame().await.unwrap(), Some(b"abc".to_vec()));
    }

    #[tokio::test]
    async fn test_truncated_frame_is_malformed() {
        let (mut a, b) = tokio::io::duplex(64);
        let mut reader = framed(b);

        a.write_all(&[0, 0, 0, 10, 1, 2, 3]).await.unwrap();
        drop(a);

        let result = reader.recv_frame().await;
        assert!(matches!(result, Err(TransportError::MalformedFrame(_))));
    }

    #[tokio::test]
    async fn test_oversized_frame_is_malformed() {
        let (mut a, b) = tokio::io::duplex(64);
        let mut reader = framed(b);

        let too_big = (MAX_FRAME_LEN as u32 + 1).to_be_bytes();
        a.write_all(&too_big).await.unwrap();

        let result = reader.recv_frame().await;
        assert!(matches!(result, Err(TransportError::MalformedFrame(_))));
    }
}
