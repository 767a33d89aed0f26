// Copyright (c) 2025 Fabstir
// SPDX-License-Identifier: BUSL-1.1

//! Signer-selection state machine.
//!
//! Decides once which signer variant answers calls, persists the choice,
//! and reinstates it on restart without any round trip. Any failure along
//! the selection path clears the persisted discriminator first, so a
//! broken selection is never resumed.

use serde_json::Value;
use std::str::FromStr;
use std::sync::Arc;
use tracing::{debug, info, warn};
use uuid::Uuid;

use super::{
    AppMetadata, EncryptedSessionSigner, LegacySigner, RelayClient, Signer, SignerKind,
    UpdateListener,
};
use crate::communicator::Communicator;
use crate::error::WalletError;
use crate::message::{ConfigEvent, ConfigMessage, Message};
use crate::storage::{KeyValueStore, ScopedStore};

const SIGNER_TYPE_KEY: &str = "signerType";

/// Application preference forwarded with the selection request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SignerPreference {
    All,
    ScwOnly,
}

impl SignerPreference {
    fn as_str(&self) -> &'static str {
        match self {
            SignerPreference::All => "all",
            SignerPreference::ScwOnly => "scwOnly",
        }
    }
}

pub struct SignerSelector {
    metadata: AppMetadata,
    preference: SignerPreference,
    communicator: Arc<Communicator>,
    backend: Arc<dyn KeyValueStore>,
    store: ScopedStore,
    listener: Arc<dyn UpdateListener>,
    relay: Arc<dyn RelayClient>,
}

impl SignerSelector {
    pub fn new(
        metadata: AppMetadata,
        preference: SignerPreference,
        communicator: Arc<Communicator>,
        backend: Arc<dyn KeyValueStore>,
        listener: Arc<dyn UpdateListener>,
        relay: Arc<dyn RelayClient>,
    ) -> Self {
        let store = ScopedStore::new(backend.clone(), "signer-selector");
        Self {
            metadata,
            preference,
            communicator,
            backend,
            store,
            listener,
            relay,
        }
    }

    /// Reinstate the signer recorded by a previous session, if any. Any
    /// failure clears the persisted discriminator before propagating.
    pub async fn restore_from_persisted_type(
        &self,
    ) -> Result<Option<Arc<dyn Signer>>, WalletError> {
        let result = async {
            match self.store.get(SIGNER_TYPE_KEY).await? {
                Some(raw) => {
                    let kind = SignerKind::from_str(&raw)?;
                    debug!(%kind, "restoring persisted signer");
                    Ok(Some(self.instantiate(kind).await?))
                }
                None => Ok(None),
            }
        }
        .await;

        if result.is_err() {
            self.on_disconnect().await;
        }
        result
    }

    /// Ask the wallet which signer variant the user chose, persist the
    /// answer and bind the signer. For the legacy variant, additionally
    /// announce the relay session descriptor over the same channel.
    pub async fn select_interactively(&self) -> Result<Arc<dyn Signer>, WalletError> {
        let result = self.select_inner().await;
        if result.is_err() {
            self.on_disconnect().await;
        }
        result
    }

    /// Forget the persisted choice. The signer's own state is cleared by
    /// the signer itself.
    pub async fn on_disconnect(&self) {
        if let Err(e) = self.store.remove(SIGNER_TYPE_KEY).await {
            warn!("failed to clear persisted signer type: {e}");
        }
    }

    async fn select_inner(&self) -> Result<Arc<dyn Signer>, WalletError> {
        let kind = self.request_signer_type().await?;
        self.store.set(SIGNER_TYPE_KEY, kind.as_str()).await?;
        let signer = self.instantiate(kind).await?;

        if kind == SignerKind::Legacy {
            // the wallet renders this as a QR code for the relay pairing
            let update = ConfigMessage::update(
                ConfigEvent::LegacySessionCreated,
                Some(serde_json::json!({ "url": self.relay.session_url() })),
            );
            self.communicator.send(update.into()).await?;
        }

        info!(%kind, "signer selected");
        Ok(signer)
    }

    async fn request_signer_type(&self) -> Result<SignerKind, WalletError> {
        self.communicator.open().await?;

        let update = ConfigMessage::update(
            ConfigEvent::SelectSignerType,
            Some(Value::String(self.preference.as_str().to_string())),
        );
        let request_id = update.id();
        let response =
            self.communicator
                .receive_matching(move |m| matches_config_response(m, request_id));
        self.communicator.send(update.into()).await?;

        let message = response.await?;
        let raw = match message {
            Message::Config(ConfigMessage::Response { response, .. }) => response,
            other => {
                return Err(WalletError::InvalidRequest(format!(
                    "unexpected selection response: {other:?}"
                )))
            }
        };
        let raw = raw.as_str().ok_or_else(|| {
            WalletError::UnknownSignerType(raw.to_string())
        })?;
        SignerKind::from_str(raw)
    }

    async fn instantiate(&self, kind: SignerKind) -> Result<Arc<dyn Signer>, WalletError> {
        Ok(match kind {
            SignerKind::Scw => Arc::new(
                EncryptedSessionSigner::new(
                    self.metadata.clone(),
                    self.communicator.clone(),
                    ScopedStore::new(self.backend.clone(), "scw-signer"),
                    self.listener.clone(),
                )
                .await?,
            ),
            SignerKind::Legacy => Arc::new(LegacySigner::new(
                self.metadata.clone(),
                self.relay.clone(),
                ScopedStore::new(self.backend.clone(), "legacy-signer"),
                self.listener.clone(),
            )),
        })
    }
}

fn matches_config_response(message: &Message, request_id: Uuid) -> bool {
    matches!(
        message,
        Message::Config(ConfigMessage::Response { .. })
    ) && message.request_id() == Some(request_id)
}
