// Copyright (c) 2025 Fabstir
// SPDX-License-Identifier: BUSL-1.1
//! Session Key Slot
//!
//! One-shot cell shared between the side-channel handshake task (writer) and
//! the queue consumer task (reader). The two tasks race: a delivery may be
//! consumed before the handshake has finished, so an empty slot is a normal,
//! checkable state rather than an error to wait on.
//!
//! **Security**: The key lives in memory only and is zeroized when cleared.

use std::sync::Arc;
use thiserror::Error;
use tokio::sync::RwLock;

use crate::crypto::SessionKey;

/// The handshake has not produced a key yet (or the key was cleared)
#[derive(Error, Debug, Clone, Copy, PartialEq, Eq)]
#[error("Session key not negotiated yet")]
pub struct KeyNotReady;

/// The slot already holds a key; a second handshake cannot replace it
#[derive(Error, Debug, Clone, Copy, PartialEq, Eq)]
#[error("Session key already set")]
pub struct KeyAlreadySet;

/// Synchronised one-shot holder for the session key
///
/// ```ignore
/// let slot = SessionKeySlot::new();
/// assert!(slot.get().await.is_err());
/// slot.set(key).await?;
/// let key = slot.get().await?;
/// slot.clear().await;
/// ```
#[derive(Clone, Default)]
pub struct SessionKeySlot {
    key: Arc<RwLock<Option<SessionKey>>>,
}

impl SessionKeySlot {
    pub fn new() -> Self {
        Self::default()
    }

    /// Current key, or [`KeyNotReady`] without waiting
    pub async fn get(&self) -> Result<SessionKey, KeyNotReady> {
        self.key.read().await.clone().ok_or(KeyNotReady)
    }

    /// Store the negotiated key; only the first call succeeds
    pub async fn set(&self, key: SessionKey) -> Result<(), KeyAlreadySet> {
        let mut slot = self.key.write().await;
        if slot.is_some() {
            return Err(KeyAlreadySet);
        }
        *slot = Some(key);
        tracing::info!("🔑 Session key stored in slot");
        Ok(())
    }

    pub async fn is_ready(&self) -> bool {
        self.key.read().await.is_some()
    }

    /// Destroy the key; later reads see [`KeyNotReady`]
    pub async fn clear(&self) {
        if self.key.write().await.take().is_some() {
            tracing::info!("🗑️  Session key cleared from slot");
        }
    }
}

impl std::fmt::Debug for SessionKeySlot {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SessionKeySlot").finish_non_exhaustive()
    }
}
