// Copyright (c) 2025 Fabstir
// SPDX-License-Identifier: BUSL-1.1

//! Application-facing facade.
//!
//! Resolves the active signer through the selector (persisted choice
//! first, interactive selection otherwise) and forwards method calls to
//! it. Holds the trait object only; which variant answers is invisible to
//! the application.

use serde_json::Value;
use std::sync::Arc;
use tokio::sync::RwLock;
use tracing::info;

use crate::error::WalletError;
use crate::signer::{RequestArguments, Signer, SignerSelector};

pub struct WalletProvider {
    selector: SignerSelector,
    signer: RwLock<Option<Arc<dyn Signer>>>,
}

impl WalletProvider {
    pub fn new(selector: SignerSelector) -> Self {
        Self {
            selector,
            signer: RwLock::new(None),
        }
    }

    /// Bind a signer and make sure a session exists, running the
    /// variant's handshake when no accounts are known yet. Returns the
    /// authorized accounts.
    pub async fn connect(&self) -> Result<Vec<String>, WalletError> {
        let signer = self.resolve_signer().await?;
        let accounts = signer.accounts().await;
        if !accounts.is_empty() {
            return Ok(accounts);
        }
        signer.handshake().await
    }

    /// Forward one method call to the active signer.
    pub async fn request(&self, args: RequestArguments) -> Result<Value, WalletError> {
        let signer = {
            let guard = self.signer.read().await;
            guard.clone()
        };
        match signer {
            Some(signer) => signer.request(args).await,
            None => Err(WalletError::unauthorized_no_session()),
        }
    }

    /// Tear down the signer's session and the persisted selection.
    pub async fn disconnect(&self) -> Result<(), WalletError> {
        let signer = self.signer.write().await.take();
        if let Some(signer) = signer {
            signer.disconnect().await?;
        }
        self.selector.on_disconnect().await;
        info!("provider disconnected");
        Ok(())
    }

    async fn resolve_signer(&self) -> Result<Arc<dyn Signer>, WalletError> {
        {
            let guard = self.signer.read().await;
            if let Some(signer) = guard.as_ref() {
                return Ok(signer.clone());
            }
        }

        let mut guard = self.signer.write().await;
        // selection may have happened while the write lock was contended
        if let Some(signer) = guard.as_ref() {
            return Ok(signer.clone());
        }
        let signer = match self.selector.restore_from_persisted_type().await? {
            Some(signer) => signer,
            None => self.selector.select_interactively().await?,
        };
        *guard = Some(signer.clone());
        Ok(signer)
    }
}
