// Copyright (c) 2025 Fabstir
// SPDX-License-Identifier: BUSL-1.1
//! Session Negotiation State Machine
//!
//! Server side, one instance per logical session:
//!
//! ```text
//! AwaitingPublicKey --begin()--> AwaitingWrappedKey --complete(ok)--> Established
//!                                        |
//!                                        +--complete(err)--> Failed
//! ```
//!
//! The client side is stateless: [`ClientNegotiator::respond`] takes the
//! server's public key and produces the session key together with its
//! wrapped form.
//!
//! The negotiator is transport agnostic. The socket binding and the queue
//! side-channel drive it over framed TCP; the streaming binding drives it from
//! two unary RPC calls.

use std::fmt;
use tracing::{debug, info, warn};

use super::frame::HandshakeCarrier;
use crate::crypto::{fingerprint, wrap_session_key, CryptoError, RsaKeyPair, SessionKey};
use crate::transport::TransportError;

/// Handshake progress of one session
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NegotiationState {
    /// Initial state, no key material exists yet
    AwaitingPublicKey,
    /// Public key sent, waiting for the client's wrapped session key
    AwaitingWrappedKey,
    /// Session key recovered; envelopes may now be accepted
    Established,
    /// Unwrap failed; the session must be aborted
    Failed,
}

impl fmt::Display for NegotiationState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            NegotiationState::AwaitingPublicKey => "awaiting_public_key",
            NegotiationState::AwaitingWrappedKey => "awaiting_wrapped_key",
            NegotiationState::Established => "established",
            NegotiationState::Failed => "failed",
        };
        f.write_str(name)
    }
}

/// Server half of the handshake
#[derive(Debug)]
pub struct ServerNegotiator {
    state: NegotiationState,
    key_pair: Option<RsaKeyPair>,
}

impl ServerNegotiator {
    pub fn new() -> Self {
        Self {
            state: NegotiationState::AwaitingPublicKey,
            key_pair: None,
        }
    }

    pub fn state(&self) -> NegotiationState {
        self.state
    }

    pub fn is_established(&self) -> bool {
        self.state == NegotiationState::Established
    }

    /// Generate the ephemeral key pair and return the DER public key to send
    pub fn begin(&mut self) -> Result<Vec<u8>, CryptoError> {
        self.expect_state(NegotiationState::AwaitingPublicKey, "begin")?;
        let key_pair = RsaKeyPair::generate()?;
        self.install(key_pair)
    }

    /// Same as [`begin`](Self::begin) but generates the key pair on the
    /// blocking pool so the async runtime is not stalled
    pub async fn begin_async(&mut self) -> Result<Vec<u8>, CryptoError> {
        self.expect_state(NegotiationState::AwaitingPublicKey, "begin")?;
        let key_pair = tokio::task::spawn_blocking(RsaKeyPair::generate)
            .await
            .map_err(|e| CryptoError::KeyGeneration(format!("key generation task failed: {}", e)))??;
        self.install(key_pair)
    }

    /// Unwrap the client's session key
    ///
    /// The private key is discarded whatever the outcome. On failure the
    /// negotiator is left in [`NegotiationState::Failed`].
    pub fn complete(&mut self, wrapped_key: &[u8]) -> Result<SessionKey, CryptoError> {
        self.expect_state(NegotiationState::AwaitingWrappedKey, "complete")?;

        let key_pair = match self.key_pair.take() {
            Some(pair) => pair,
            None => {
                self.state = NegotiationState::Failed;
                return Err(CryptoError::Handshake("key pair missing".to_string()));
            }
        };

        match key_pair.unwrap_session_key(wrapped_key) {
            Ok(key) => {
                self.state = NegotiationState::Established;
                info!("🔑 Session key negotiated");
                Ok(key)
            }
            Err(e) => {
                self.state = NegotiationState::Failed;
                warn!("Session key unwrap failed, aborting session");
                Err(e)
            }
        }
    }

    /// Same as [`complete`](Self::complete) but unwraps on the blocking pool;
    /// the negotiator is consumed along with its private key
    pub async fn complete_async(mut self, wrapped_key: Vec<u8>) -> Result<SessionKey, CryptoError> {
        tokio::task::spawn_blocking(move || self.complete(&wrapped_key))
            .await
            .map_err(|e| CryptoError::Handshake(format!("key unwrap task failed: {}", e)))?
    }

    fn install(&mut self, key_pair: RsaKeyPair) -> Result<Vec<u8>, CryptoError> {
        let der = key_pair.public_key_der()?;
        debug!("Generated ephemeral RSA key {}", fingerprint(&der));
        self.key_pair = Some(key_pair);
        self.state = NegotiationState::AwaitingWrappedKey;
        Ok(der)
    }

    fn expect_state(&self, expected: NegotiationState, operation: &str) -> Result<(), CryptoError> {
        if self.state != expected {
            return Err(CryptoError::Handshake(format!(
                "cannot {} in state {} (expected {})",
                operation, self.state, expected
            )));
        }
        Ok(())
    }
}

impl Default for ServerNegotiator {
    fn default() -> Self {
        Self::new()
    }
}

/// Client's answer to a server public key
pub struct ClientResponse {
    /// Locally generated session key, kept by the client
    pub session_key: SessionKey,
    /// The same key wrapped under the server's public key, sent to the server
    pub wrapped_key: Vec<u8>,
}

/// Client half of the handshake
pub struct ClientNegotiator;

impl ClientNegotiator {
    /// Generate a session key and wrap it under `public_key_der`
    ///
    /// The client does not wait for the server to confirm the unwrap before
    /// sending data on the socket and queue bindings.
    pub fn respond(public_key_der: &[u8]) -> Result<ClientResponse, CryptoError> {
        let session_key = SessionKey::generate();
        let wrapped_key = wrap_session_key(&session_key, public_key_der)?;
        debug!(
            "Wrapped session key for server key {}",
            fingerprint(public_key_der)
        );
        Ok(ClientResponse {
            session_key,
            wrapped_key,
        })
    }
}

/// Run the server half over a framed carrier
///
/// Frame 1 (out): DER public key. Frame 2 (in): wrapped session key.
pub async fn negotiate_server<C>(carrier: &mut C) -> Result<SessionKey, TransportError>
where
    C: HandshakeCarrier + ?Sized,
{
    let mut negotiator = ServerNegotiator::new();
    let public_key = negotiator.begin_async().await?;
    info!("Sending public key {}", fingerprint(&public_key));
    carrier.send_frame(&public_key).await?;

    let wrapped = carrier.recv_frame().await?.ok_or_else(|| {
        TransportError::MalformedFrame("peer closed before sending the wrapped key".to_string())
    })?;
    Ok(negotiator.complete(&wrapped)?)
}

/// Run the client half over a framed carrier
///
/// Returns as soon as the wrapped key is written; the server's unwrap
/// result is not awaited.
pub async fn negotiate_client<C>(carrier: &mut C) -> Result<SessionKey, TransportError>
where
    C: HandshakeCarrier + ?Sized,
{
    let public_key = carrier.recv_frame().await?.ok_or_else(|| {
        TransportError::HandshakeRejected("server closed before sending its public key".to_string())
    })?;
    info!("Received public key {}", fingerprint(&public_key));

    let response = ClientNegotiator::respond(&public_key)?;
    carrier.send_frame(&response.wrapped_key).await?;
    Ok(response.session_key)
}
