// Copyright (c) 2025 Fabstir
// SPDX-License-Identifier: BUSL-1.1

//! Legacy relay signer variant.
//!
//! The long-lived relay protocol itself is an external collaborator; this
//! signer only adapts it to the shared [`Signer`] interface so the
//! selector can bind either variant behind the same trait object. The
//! relay's connection descriptor (scanned by the wallet to link the
//! session) is surfaced so the selector can announce it over the config
//! channel.

use async_trait::async_trait;
use serde_json::Value;
use std::sync::Arc;
use tracing::info;

use super::{AppMetadata, RequestArguments, Signer, UpdateListener};
use crate::error::WalletError;
use crate::storage::ScopedStore;

const ACCOUNTS_KEY: &str = "accounts";

/// Relay collaborator contract. Implementations own the relay wire
/// protocol end to end.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait RelayClient: Send + Sync {
    /// Connection descriptor for the current relay session, e.g. a URL
    /// rendered as a QR code by the wallet side.
    fn session_url(&self) -> String;

    /// Run the relay's account-authorization exchange.
    async fn request_accounts(&self, metadata: &AppMetadata)
        -> Result<Vec<String>, WalletError>;

    /// Execute one method call over the relay.
    async fn request(&self, args: RequestArguments) -> Result<Value, WalletError>;

    /// Destroy the relay session.
    async fn reset(&self);
}

pub struct LegacySigner {
    metadata: AppMetadata,
    relay: Arc<dyn RelayClient>,
    store: ScopedStore,
    listener: Arc<dyn UpdateListener>,
}

impl LegacySigner {
    pub fn new(
        metadata: AppMetadata,
        relay: Arc<dyn RelayClient>,
        store: ScopedStore,
        listener: Arc<dyn UpdateListener>,
    ) -> Self {
        Self {
            metadata,
            relay,
            store,
            listener,
        }
    }

    /// Descriptor the selector announces to the peer after this variant
    /// is chosen.
    pub fn session_url(&self) -> String {
        self.relay.session_url()
    }
}

#[async_trait]
impl Signer for LegacySigner {
    async fn handshake(&self) -> Result<Vec<String>, WalletError> {
        let accounts = self.relay.request_accounts(&self.metadata).await?;
        self.store.store_object(ACCOUNTS_KEY, &accounts).await?;
        info!(count = accounts.len(), "relay session established");
        self.listener.on_accounts_changed(accounts.clone());
        Ok(accounts)
    }

    async fn request(&self, args: RequestArguments) -> Result<Value, WalletError> {
        self.relay.request(args).await
    }

    async fn disconnect(&self) -> Result<(), WalletError> {
        self.store.clear().await?;
        self.relay.reset().await;
        Ok(())
    }

    async fn accounts(&self) -> Vec<String> {
        self.store
            .load_object(ACCOUNTS_KEY)
            .await
            .ok()
            .flatten()
            .unwrap_or_default()
    }
}
