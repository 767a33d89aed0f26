// Copyright (c) 2025 Fabstir
// SPDX-License-Identifier: BUSL-1.1

use async_trait::async_trait;
use tokio::sync::mpsc;

use crate::error::WalletError;
use crate::message::Message;

/// A message received from the transport, before origin validation.
#[derive(Debug, Clone)]
pub struct IncomingMessage {
    /// Origin/identity asserted by the transport for the sender. The
    /// communicator drops messages whose origin does not match the peer
    /// it opened.
    pub origin: String,
    pub message: Message,
}

/// Platform transport primitive for one remote peer: a spawned window, a
/// native companion app, or an in-process fake in tests.
///
/// Implementations deliver every raw incoming message through the sender
/// handed to [`open`](PeerTransport::open); the communicator owns
/// dispatch, correlation and origin validation.
#[async_trait]
pub trait PeerTransport: Send + Sync {
    /// Spawn or focus the peer. Idempotency is not required here; the
    /// communicator guarantees a single in-flight open.
    async fn open(
        &self,
        incoming: mpsc::UnboundedSender<IncomingMessage>,
    ) -> Result<(), WalletError>;

    /// Deliver one message to the peer. Fails with
    /// [`WalletError::NoPeer`] if no peer is open, or
    /// [`WalletError::PeerUnreachable`] if delivery fails.
    async fn send(&self, message: Message) -> Result<(), WalletError>;

    /// Close the peer handle. Must be safe to call repeatedly.
    async fn close(&self);
}
